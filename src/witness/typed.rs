//! Typed views over witness variables.
//!
//! Handlers that care about a witness's meaning rather than its variable
//! bag decode it once here instead of repeating name lookups and sentinel
//! checks.

use serde::{Deserialize, Serialize};

use super::record::{WitnessError, WitnessKind, WitnessRecord};

/// `targetPosition` value meaning "no position".
pub const NO_POSITION: i64 = -1;

/// `targetCardRID` value meaning "no card".
pub const NO_CARD: i64 = 0;

/// What a used card was aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseTarget {
    /// Untargeted.
    None,
    /// A card on the field, by runtime id.
    Card(i64),
    /// A field slot (servant placement).
    Position(i64),
    /// A field slot plus a card (battlecry-style targeting on placement).
    PositionAndCard {
        /// Field slot.
        position: i64,
        /// Target runtime id.
        card: i64,
    },
}

impl UseTarget {
    /// Interpret the wire sentinels.
    #[must_use]
    pub fn from_raw(position: i64, card: i64) -> Self {
        match (position != NO_POSITION, card != NO_CARD) {
            (false, false) => UseTarget::None,
            (false, true) => UseTarget::Card(card),
            (true, false) => UseTarget::Position(position),
            (true, true) => UseTarget::PositionAndCard { position, card },
        }
    }

    /// Encode back to `(targetPosition, targetCardRID)`.
    #[must_use]
    pub fn to_raw(self) -> (i64, i64) {
        match self {
            UseTarget::None => (NO_POSITION, NO_CARD),
            UseTarget::Card(card) => (NO_POSITION, card),
            UseTarget::Position(position) => (position, NO_CARD),
            UseTarget::PositionAndCard { position, card } => (position, card),
        }
    }
}

/// Decoded `onUse` witness.
///
/// ## Example
///
/// ```
/// use card_sync::witness::{UseCard, UseTarget, WitnessKind, WitnessRecord};
///
/// let witness = WitnessRecord::builder(WitnessKind::OnUse)
///     .var("cardRID", 7i64)
///     .var("targetPosition", -1i64)
///     .var("targetCardRID", 12i64)
///     .build()
///     .unwrap();
///
/// let used = UseCard::from_witness(&witness).unwrap();
/// assert_eq!(used.card_rid, 7);
/// assert_eq!(used.target, UseTarget::Card(12));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCard {
    /// Runtime id of the used card.
    pub card_rid: i64,
    /// Definition id, when the producer revealed it.
    pub card_did: Option<i64>,
    /// Seat of the player who used it, when given.
    pub player_index: Option<i64>,
    /// Target.
    pub target: UseTarget,
}

impl UseCard {
    /// Decode an `onUse` witness.
    pub fn from_witness(witness: &WitnessRecord) -> Result<Self, WitnessError> {
        if witness.kind() != WitnessKind::OnUse {
            return Err(WitnessError::Schema {
                kind: witness.kind(),
                reason: format!("expected `{}`", WitnessKind::OnUse),
            });
        }

        let int = |name: &str| witness.get(name).and_then(|v| v.as_int());
        Ok(Self {
            card_rid: witness.int("cardRID", NO_CARD),
            card_did: int("cardDID"),
            player_index: int("playerIndex"),
            target: UseTarget::from_raw(
                witness.int("targetPosition", NO_POSITION),
                witness.int("targetCardRID", NO_CARD),
            ),
        })
    }

    /// Encode as an `onUse` witness.
    pub fn to_witness(&self) -> Result<WitnessRecord, WitnessError> {
        let (position, card) = self.target.to_raw();
        let mut builder = WitnessRecord::builder(WitnessKind::OnUse)
            .var("cardRID", self.card_rid)
            .var("targetPosition", position)
            .var("targetCardRID", card);
        if let Some(did) = self.card_did {
            builder = builder.var("cardDID", did);
        }
        if let Some(player) = self.player_index {
            builder = builder.var("playerIndex", player);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_sentinels() {
        assert_eq!(UseTarget::from_raw(-1, 0), UseTarget::None);
        assert_eq!(UseTarget::from_raw(-1, 9), UseTarget::Card(9));
        assert_eq!(UseTarget::from_raw(2, 0), UseTarget::Position(2));
        assert_eq!(
            UseTarget::from_raw(0, 9),
            UseTarget::PositionAndCard { position: 0, card: 9 }
        );
    }

    #[test]
    fn test_decode_with_optional_fields() {
        let witness = WitnessRecord::builder(WitnessKind::OnUse)
            .var("cardRID", 3i64)
            .var("cardDID", 1001i64)
            .var("playerIndex", 1i64)
            .var("targetPosition", 4i64)
            .var("targetCardRID", 0i64)
            .build()
            .unwrap();

        let used = UseCard::from_witness(&witness).unwrap();
        assert_eq!(used.card_did, Some(1001));
        assert_eq!(used.player_index, Some(1));
        assert_eq!(used.target, UseTarget::Position(4));
        assert_eq!(used.to_witness().unwrap(), witness);
    }

    #[test]
    fn test_decode_wrong_kind() {
        let witness = WitnessRecord::builder(WitnessKind::TurnEnd)
            .var("playerIndex", 0i64)
            .build()
            .unwrap();
        assert!(UseCard::from_witness(&witness).is_err());
    }
}
