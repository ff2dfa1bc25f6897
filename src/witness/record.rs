//! Witness records and their schemas.
//!
//! A witness is the authoritative simulation's record of one resolved,
//! game-affecting action. It is created once, never mutated, and carries
//! every variable a consumer needs to apply it without asking the producer
//! for more.
//!
//! The set of witness kinds is closed: [`WitnessKind`] enumerates them and
//! each kind owns a fixed schema. The string name (`"onUse"`) exists only
//! on the wire, in [`WitnessFrame`].

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::{ValueType, WitnessValue};

/// Errors raised while building or decoding witnesses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WitnessError {
    /// No handler can apply a witness with this name.
    #[error("unknown witness `{name}`")]
    UnknownWitness {
        /// Wire name as received.
        name: String,
    },

    /// The variables do not match the kind's schema.
    #[error("witness `{kind}` violates its schema: {reason}")]
    Schema {
        /// Kind being built.
        kind: WitnessKind,
        /// First violation found.
        reason: String,
    },
}

/// One entry of a witness schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableSpec {
    /// Variable name as it appears on the wire.
    pub name: &'static str,
    /// Expected value type.
    pub value_type: ValueType,
    /// Whether the variable must be present.
    pub required: bool,
}

const fn req(name: &'static str, value_type: ValueType) -> VariableSpec {
    VariableSpec { name, value_type, required: true }
}

const fn opt(name: &'static str, value_type: ValueType) -> VariableSpec {
    VariableSpec { name, value_type, required: false }
}

/// Known witness kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WitnessKind {
    /// A card was used (played), possibly with a target.
    OnUse,
    /// A player drew the opening hand.
    InitDraw,
    /// A player's turn began.
    TurnStart,
    /// A player's turn ended.
    TurnEnd,
    /// A player drew a card.
    Draw,
    /// A servant entered the field.
    Summon,
    /// A card attacked another.
    Attack,
    /// Cards took damage.
    Damage,
    /// Cards died.
    Death,
    /// A player surrendered.
    Surrender,
    /// The game ended.
    GameEnd,
}

impl WitnessKind {
    /// Every kind, in declaration order.
    pub const ALL: [WitnessKind; 11] = [
        WitnessKind::OnUse,
        WitnessKind::InitDraw,
        WitnessKind::TurnStart,
        WitnessKind::TurnEnd,
        WitnessKind::Draw,
        WitnessKind::Summon,
        WitnessKind::Attack,
        WitnessKind::Damage,
        WitnessKind::Death,
        WitnessKind::Surrender,
        WitnessKind::GameEnd,
    ];

    /// Name used on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            WitnessKind::OnUse => "onUse",
            WitnessKind::InitDraw => "initDraw",
            WitnessKind::TurnStart => "onTurnStart",
            WitnessKind::TurnEnd => "onTurnEnd",
            WitnessKind::Draw => "onDraw",
            WitnessKind::Summon => "onSummon",
            WitnessKind::Attack => "onAttack",
            WitnessKind::Damage => "onDamage",
            WitnessKind::Death => "onDeath",
            WitnessKind::Surrender => "onSurrender",
            WitnessKind::GameEnd => "onGameEnd",
        }
    }

    /// Variables a witness of this kind carries.
    ///
    /// Card ids are runtime ids (`RID`) unless suffixed `DID` (definition
    /// id). `targetPosition == -1` and `targetCardRID == 0` mean "none".
    #[must_use]
    pub fn schema(self) -> &'static [VariableSpec] {
        match self {
            WitnessKind::OnUse => schema::ON_USE,
            WitnessKind::InitDraw => schema::INIT_DRAW,
            WitnessKind::TurnStart | WitnessKind::TurnEnd | WitnessKind::Surrender => {
                schema::PLAYER_ONLY
            }
            WitnessKind::Draw => schema::DRAW,
            WitnessKind::Summon => schema::SUMMON,
            WitnessKind::Attack => schema::ATTACK,
            WitnessKind::Damage => schema::DAMAGE,
            WitnessKind::Death => schema::DEATH,
            WitnessKind::GameEnd => schema::GAME_END,
        }
    }
}

mod schema {
    use super::{opt, req, VariableSpec};
    use crate::witness::value::ValueType::{Int, IntList};

    pub(super) const ON_USE: &[VariableSpec] = &[
        req("cardRID", Int),
        req("targetPosition", Int),
        req("targetCardRID", Int),
        opt("playerIndex", Int),
        opt("cardDID", Int),
    ];
    pub(super) const INIT_DRAW: &[VariableSpec] = &[req("playerIndex", Int), req("cards", IntList)];
    pub(super) const PLAYER_ONLY: &[VariableSpec] = &[req("playerIndex", Int)];
    pub(super) const DRAW: &[VariableSpec] = &[
        req("playerIndex", Int),
        req("cardRID", Int),
        opt("cardDID", Int),
    ];
    pub(super) const SUMMON: &[VariableSpec] = &[
        req("playerIndex", Int),
        req("cardRID", Int),
        req("cardDID", Int),
        req("position", Int),
    ];
    pub(super) const ATTACK: &[VariableSpec] = &[req("cardRID", Int), req("targetCardRID", Int)];
    pub(super) const DAMAGE: &[VariableSpec] = &[req("cardRIDs", IntList), req("amounts", IntList)];
    pub(super) const DEATH: &[VariableSpec] = &[req("cardRIDs", IntList)];
    pub(super) const GAME_END: &[VariableSpec] = &[req("winnerIndexes", IntList)];
}

impl std::fmt::Display for WitnessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for WitnessKind {
    type Err = WitnessError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        WitnessKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == name)
            .ok_or_else(|| WitnessError::UnknownWitness { name: name.to_string() })
    }
}

/// Variable bag of a witness, ordered by name so encodings are stable.
pub type WitnessVariables = BTreeMap<String, WitnessValue>;

/// An immutable, schema-checked witness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessRecord {
    kind: WitnessKind,
    variables: WitnessVariables,
}

impl WitnessRecord {
    /// Build a witness, validating `variables` against the kind's schema.
    ///
    /// Variables the schema does not name are rejected too, so a typo on the
    /// producer side fails here rather than on some consumer.
    pub fn new(kind: WitnessKind, variables: WitnessVariables) -> Result<Self, WitnessError> {
        let schema = kind.schema();

        for spec in schema {
            match variables.get(spec.name) {
                Some(value) if value.value_type() != spec.value_type => {
                    return Err(WitnessError::Schema {
                        kind,
                        reason: format!(
                            "`{}` should be {}, got {}",
                            spec.name,
                            spec.value_type,
                            value.value_type()
                        ),
                    });
                }
                None if spec.required => {
                    return Err(WitnessError::Schema {
                        kind,
                        reason: format!("missing `{}`", spec.name),
                    });
                }
                _ => {}
            }
        }

        if let Some(extra) = variables.keys().find(|name| !schema.iter().any(|s| s.name == name.as_str())) {
            return Err(WitnessError::Schema {
                kind,
                reason: format!("unexpected variable `{extra}`"),
            });
        }

        Ok(Self { kind, variables })
    }

    /// Start building a witness of `kind`.
    pub fn builder(kind: WitnessKind) -> WitnessBuilder {
        WitnessBuilder {
            kind,
            variables: WitnessVariables::new(),
        }
    }

    /// The witness kind.
    #[must_use]
    pub fn kind(&self) -> WitnessKind {
        self.kind
    }

    /// The wire name of the witness kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.wire_name()
    }

    /// All variables.
    #[must_use]
    pub fn variables(&self) -> &WitnessVariables {
        &self.variables
    }

    /// Get a variable by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WitnessValue> {
        self.variables.get(name)
    }

    /// Get an integer variable, or `default` if absent.
    ///
    /// Types were checked at construction, so a present variable of the
    /// schema's integer type always decodes.
    #[must_use]
    pub fn int(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(WitnessValue::as_int).unwrap_or(default)
    }

    /// Get an integer-list variable, or an empty slice if absent.
    #[must_use]
    pub fn int_list(&self, name: &str) -> &[i64] {
        self.get(name).and_then(WitnessValue::as_int_list).unwrap_or(&[])
    }

    /// Wrap this witness for transmission.
    #[must_use]
    pub fn to_frame(&self, sequence: u64) -> WitnessFrame {
        WitnessFrame {
            sequence,
            name: self.kind.wire_name().to_string(),
            variables: self.variables.clone(),
        }
    }
}

/// Builder for [`WitnessRecord`]; validation happens in [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct WitnessBuilder {
    kind: WitnessKind,
    variables: WitnessVariables,
}

impl WitnessBuilder {
    /// Set a variable (builder pattern).
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<WitnessValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<WitnessRecord, WitnessError> {
        WitnessRecord::new(self.kind, self.variables)
    }
}

/// A witness as transmitted: wire name, variables, and the producer's
/// sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessFrame {
    /// Position in the producer's stream, starting at 0.
    pub sequence: u64,
    /// Wire name of the witness kind.
    pub name: String,
    /// Variables as produced.
    pub variables: WitnessVariables,
}

impl WitnessFrame {
    /// Decode into a checked record.
    ///
    /// Fails with [`WitnessError::UnknownWitness`] for names this build
    /// does not know and [`WitnessError::Schema`] for malformed variables.
    pub fn decode(&self) -> Result<WitnessRecord, WitnessError> {
        let kind: WitnessKind = self.name.parse()?;
        WitnessRecord::new(kind, self.variables.clone())
    }
}
