//! Room and player descriptions shared between host and guests.
//!
//! The host owns the authoritative [`RoomInfo`]; every other copy is a
//! mirror replaced wholesale by host pushes. Only the host-side mutators
//! (crate-private) bump [`RoomInfo::revision`].

use std::net::SocketAddr;

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, RoomId};

use super::options::{OptionChange, OptionError, RoomOptions};

/// A seated player.
///
/// `deck` is the well-known deck selection property; its first entry is the
/// chosen character.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomPlayerInfo {
    /// Assigned by the host on join. Whatever a joiner sends is replaced.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Selected deck, character first.
    pub deck: Vec<i64>,
}

impl RoomPlayerInfo {
    /// Describe a player who has not been seated yet.
    pub fn new(name: impl Into<String>, deck: Vec<i64>) -> Self {
        Self {
            id: PlayerId::new(0),
            name: name.into(),
            deck,
        }
    }

    /// The chosen character, if a deck was selected.
    #[must_use]
    pub fn character(&self) -> Option<i64> {
        self.deck.first().copied()
    }
}

/// One room as advertised by its host.
///
/// ## Example
///
/// ```
/// use card_sync::room::{RoomInfo, RoomOptions};
/// use card_sync::core::RoomId;
///
/// let room = RoomInfo::new(RoomId::new(1), "127.0.0.1:32810".parse().unwrap(), RoomOptions::default());
/// assert_eq!(room.player_count(), 0);
/// assert_eq!(room.revision, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Host-assigned identity.
    pub id: RoomId,
    /// Where the host listens.
    pub host: SocketAddr,
    /// Negotiated options.
    pub options: RoomOptions,
    /// Players in join order.
    pub players: Vector<RoomPlayerInfo>,
    /// Bumped by the host on every change.
    pub revision: u64,
}

impl RoomInfo {
    /// Create an empty room.
    #[must_use]
    pub fn new(id: RoomId, host: SocketAddr, options: RoomOptions) -> Self {
        Self {
            id,
            host,
            options,
            players: Vector::new(),
            revision: 0,
        }
    }

    /// Number of seated players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Look up a seated player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&RoomPlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Check whether `id` is seated.
    #[must_use]
    pub fn contains_player(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    /// Seated player ids in join order.
    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().map(|p| p.id)
    }

    /// Players in seating order: the explicit order when one is set,
    /// join order otherwise.
    #[must_use]
    pub fn seating(&self) -> Vec<&RoomPlayerInfo> {
        match &self.options.player_order {
            Some(order) => order.iter().filter_map(|id| self.player(*id)).collect(),
            None => self.players.iter().collect(),
        }
    }

    /// Players present in `self` but missing from `newer`.
    #[must_use]
    pub fn departed(&self, newer: &RoomInfo) -> Vec<PlayerId> {
        self.player_ids().filter(|id| !newer.contains_player(*id)).collect()
    }

    /// The change that locks (snapshots) or unlocks the seating order.
    #[must_use]
    pub fn lock_order_change(&self, lock: bool) -> OptionChange {
        OptionChange::PlayerOrder(lock.then(|| self.player_ids().collect()))
    }

    pub(crate) fn add_player(&mut self, player: RoomPlayerInfo) {
        if let Some(order) = &mut self.options.player_order {
            order.push(player.id);
        }
        self.players.push_back(player);
        self.revision += 1;
    }

    pub(crate) fn remove_player(&mut self, id: PlayerId) -> Option<RoomPlayerInfo> {
        let index = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(index);
        if let Some(order) = &mut self.options.player_order {
            order.retain(|p| *p != id);
        }
        self.revision += 1;
        Some(removed)
    }

    /// Apply an option edit. Returns `false` if it changed nothing.
    pub(crate) fn apply(&mut self, change: OptionChange) -> Result<bool, OptionError> {
        change.check()?;
        let options = &mut self.options;
        let changed = match change {
            OptionChange::RandomSeed(seed) => replace(&mut options.random_seed, seed),
            OptionChange::Shuffle(shuffle) => replace(&mut options.shuffle, shuffle),
            OptionChange::InitReplaceTimeout(seconds) => replace(&mut options.init_replace_timeout, seconds),
            OptionChange::TurnTimeout(seconds) => replace(&mut options.turn_timeout, seconds),
            OptionChange::PlayerOrder(order) => {
                if let Some(order) = &order {
                    check_permutation(order, &self.players)?;
                }
                replace(&mut options.player_order, order)
            }
        };
        if changed {
            self.revision += 1;
        }
        Ok(changed)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn check_permutation(order: &[PlayerId], players: &Vector<RoomPlayerInfo>) -> Result<(), OptionError> {
    if order.len() != players.len() {
        return Err(OptionError::InvalidPlayerOrder {
            reason: format!("{} ids for {} players", order.len(), players.len()),
        });
    }
    for (i, id) in order.iter().enumerate() {
        if order[..i].contains(id) {
            return Err(OptionError::InvalidPlayerOrder {
                reason: format!("{id} listed twice"),
            });
        }
        if !players.iter().any(|p| p.id == *id) {
            return Err(OptionError::InvalidPlayerOrder {
                reason: format!("{id} is not seated"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomInfo {
        RoomInfo::new(RoomId::new(9), "10.0.0.1:32810".parse().unwrap(), RoomOptions::default())
    }

    fn player(id: u32, name: &str) -> RoomPlayerInfo {
        RoomPlayerInfo {
            id: PlayerId::new(id),
            name: name.to_string(),
            deck: vec![100 + i64::from(id), 1, 2],
        }
    }

    #[test]
    fn test_character_is_first_deck_entry() {
        assert_eq!(player(1, "ana").character(), Some(101));
        assert_eq!(RoomPlayerInfo::new("bo", Vec::new()).character(), None);
    }

    #[test]
    fn test_roster_changes_bump_revision() {
        let mut room = room();
        room.add_player(player(1, "ana"));
        room.add_player(player(2, "bo"));
        assert_eq!(room.revision, 2);

        assert_eq!(room.remove_player(PlayerId::new(1)).map(|p| p.name), Some("ana".to_string()));
        assert_eq!(room.remove_player(PlayerId::new(1)), None);
        assert_eq!(room.revision, 3);
        assert_eq!(room.player_ids().collect::<Vec<_>>(), vec![PlayerId::new(2)]);
    }

    #[test]
    fn test_apply_unchanged_keeps_revision() {
        let mut room = room();
        assert_eq!(room.apply(OptionChange::Shuffle(true)), Ok(false));
        assert_eq!(room.revision, 0);
        assert_eq!(room.apply(OptionChange::TurnTimeout(45)), Ok(true));
        assert_eq!(room.options.turn_timeout, 45);
        assert_eq!(room.revision, 1);
    }

    #[test]
    fn test_rejected_timeout_leaves_room_untouched() {
        let mut room = room();
        assert!(room.apply(OptionChange::InitReplaceTimeout(3)).is_err());
        assert_eq!(room.options.init_replace_timeout, 15);
        assert_eq!(room.revision, 0);
    }

    #[test]
    fn test_seating_follows_locked_order() {
        let mut room = room();
        room.add_player(player(1, "ana"));
        room.add_player(player(2, "bo"));

        let reversed = OptionChange::PlayerOrder(Some(vec![PlayerId::new(2), PlayerId::new(1)]));
        room.apply(reversed).unwrap();
        let names: Vec<_> = room.seating().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bo", "ana"]);

        // Joins append to a locked order; leaves drop out of it.
        room.add_player(player(3, "cy"));
        room.remove_player(PlayerId::new(2));
        assert_eq!(
            room.options.player_order,
            Some(vec![PlayerId::new(1), PlayerId::new(3)])
        );
    }

    #[test]
    fn test_lock_order_snapshots_roster() {
        let mut room = room();
        room.add_player(player(4, "di"));
        room.add_player(player(2, "bo"));
        assert_eq!(
            room.lock_order_change(true),
            OptionChange::PlayerOrder(Some(vec![PlayerId::new(4), PlayerId::new(2)]))
        );
        assert_eq!(room.lock_order_change(false), OptionChange::PlayerOrder(None));
    }

    #[test]
    fn test_order_must_be_permutation() {
        let mut room = room();
        room.add_player(player(1, "ana"));
        room.add_player(player(2, "bo"));

        let missing = OptionChange::PlayerOrder(Some(vec![PlayerId::new(1)]));
        assert!(matches!(room.apply(missing), Err(OptionError::InvalidPlayerOrder { .. })));

        let twice = OptionChange::PlayerOrder(Some(vec![PlayerId::new(1), PlayerId::new(1)]));
        assert!(room.apply(twice).is_err());

        let stranger = OptionChange::PlayerOrder(Some(vec![PlayerId::new(1), PlayerId::new(7)]));
        assert!(room.apply(stranger).is_err());
        assert_eq!(room.options.player_order, None);
    }

    #[test]
    fn test_departed() {
        let mut before = room();
        before.add_player(player(1, "ana"));
        before.add_player(player(2, "bo"));
        let mut after = before.clone();
        after.remove_player(PlayerId::new(1));

        assert_eq!(before.departed(&after), vec![PlayerId::new(1)]);
        assert!(after.departed(&before).is_empty());
    }
}
