//! Seeded randomness for room identity and game seeds.
//!
//! Every random value the protocol needs (room ids, the per-room game seed)
//! comes from a [`SessionRng`] owned by the session. Production code seeds
//! it from OS entropy; tests seed it explicitly so runs are reproducible.
//!
//! ```
//! use card_sync::core::SessionRng;
//!
//! let mut a = SessionRng::new(42);
//! let mut b = SessionRng::new(42);
//! assert_eq!(a.next_room_id(), b.next_room_id());
//! assert_eq!(a.next_game_seed(), b.next_game_seed());
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::ids::RoomId;

/// Deterministic RNG for session-level identifiers.
///
/// Uses ChaCha8 like the game RNG, so a checkpointed state restores the
/// exact same sequence.
#[derive(Clone, Debug)]
pub struct SessionRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl SessionRng {
    /// Create an RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create an RNG seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    /// The seed this RNG was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw a fresh room id. Zero is never returned.
    pub fn next_room_id(&mut self) -> RoomId {
        loop {
            let id = self.inner.gen::<u64>();
            if id != 0 {
                return RoomId::new(id);
            }
        }
    }

    /// Draw a session-unique game seed for a newly opened room.
    pub fn next_game_seed(&mut self) -> i32 {
        self.inner.gen()
    }

    /// Get the current state for serialization.
    #[must_use]
    pub fn state(&self) -> SessionRngState {
        SessionRngState {
            seed: self.seed,
            word_pos: self.inner.get_word_pos(),
        }
    }

    /// Restore from a saved state.
    #[must_use]
    pub fn from_state(state: &SessionRngState) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(state.seed);
        inner.set_word_pos(state.word_pos);
        Self {
            inner,
            seed: state.seed,
        }
    }
}

/// Serializable RNG state for checkpointing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRngState {
    /// Original seed
    pub seed: u64,
    /// ChaCha8 word position (128-bit counter)
    pub word_pos: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = SessionRng::new(7);
        let mut rng2 = SessionRng::new(7);

        for _ in 0..50 {
            assert_eq!(rng1.next_room_id(), rng2.next_room_id());
            assert_eq!(rng1.next_game_seed(), rng2.next_game_seed());
        }
    }

    #[test]
    fn test_different_seeds() {
        let mut rng1 = SessionRng::new(1);
        let mut rng2 = SessionRng::new(2);

        let ids1: Vec<_> = (0..5).map(|_| rng1.next_room_id()).collect();
        let ids2: Vec<_> = (0..5).map(|_| rng2.next_room_id()).collect();
        assert_ne!(ids1, ids2);
    }

    #[test]
    fn test_room_ids_are_nonzero() {
        let mut rng = SessionRng::new(0);
        for _ in 0..1000 {
            assert_ne!(rng.next_room_id().raw(), 0);
        }
    }

    #[test]
    fn test_state_roundtrip() {
        let mut rng = SessionRng::new(99);
        for _ in 0..10 {
            rng.next_game_seed();
        }

        let state = rng.state();
        let expected: Vec<_> = (0..5).map(|_| rng.next_game_seed()).collect();

        let mut restored = SessionRng::from_state(&state);
        let actual: Vec<_> = (0..5).map(|_| restored.next_game_seed()).collect();
        assert_eq!(expected, actual);
    }
}
