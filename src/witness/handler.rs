//! Witness handler capability.
//!
//! A handler applies one kind of witness to local state (deck, board,
//! presentation queue). Its return value is the pacing signal: a handler
//! that starts an animation returns [`Handled::Deferred`] and the
//! dispatcher holds every later witness until the matching
//! [`CompletionTicket`] comes back through
//! [`WitnessDispatcher::complete`](super::WitnessDispatcher::complete).

use serde::{Deserialize, Serialize};

use super::record::{WitnessKind, WitnessRecord};

/// Outcome of a successful [`WitnessHandler::handle`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handled {
    /// The witness is fully applied; the dispatcher may continue.
    Consumed,
    /// Work is still running; the dispatcher waits for the ticket.
    Deferred,
}

/// Token identifying one deferred witness.
///
/// Handed to the handler on every call. Only the ticket of the witness the
/// dispatcher is currently waiting on releases it; tickets from before a
/// [`reset`](super::WitnessDispatcher::reset) are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionTicket {
    pub(crate) generation: u64,
    pub(crate) sequence: u64,
}

impl CompletionTicket {
    /// Stream position of the witness this ticket completes.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A handler failed to apply a witness.
///
/// Local state may now disagree with the producer's, so the dispatcher
/// treats this as a desynchronization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Applies witnesses of one kind to local state `S`.
pub trait WitnessHandler<S> {
    /// The kind of witness this handler consumes.
    fn kind(&self) -> WitnessKind;

    /// Apply `witness` to `state`.
    ///
    /// Return [`Handled::Deferred`] to hold the stream until `ticket` is
    /// passed to the dispatcher's `complete`.
    fn handle(
        &mut self,
        witness: &WitnessRecord,
        state: &mut S,
        ticket: CompletionTicket,
    ) -> Result<Handled, HandlerError>;
}

/// Adapter turning a closure into a handler.
///
/// ```
/// use card_sync::witness::{FnHandler, Handled, WitnessHandler, WitnessKind};
///
/// let handler = FnHandler::new(WitnessKind::TurnStart, |witness, turns: &mut Vec<i64>, _| {
///     turns.push(witness.int("playerIndex", -1));
///     Ok(Handled::Consumed)
/// });
/// assert_eq!(WitnessHandler::<Vec<i64>>::kind(&handler), WitnessKind::TurnStart);
/// ```
pub struct FnHandler<F> {
    kind: WitnessKind,
    apply: F,
}

impl<F> FnHandler<F> {
    /// Wrap `apply` as the handler for `kind`.
    pub fn new<S>(kind: WitnessKind, apply: F) -> Self
    where
        F: FnMut(&WitnessRecord, &mut S, CompletionTicket) -> Result<Handled, HandlerError>,
    {
        Self { kind, apply }
    }
}

impl<S, F> WitnessHandler<S> for FnHandler<F>
where
    F: FnMut(&WitnessRecord, &mut S, CompletionTicket) -> Result<Handled, HandlerError>,
{
    fn kind(&self) -> WitnessKind {
        self.kind
    }

    fn handle(
        &mut self,
        witness: &WitnessRecord,
        state: &mut S,
        ticket: CompletionTicket,
    ) -> Result<Handled, HandlerError> {
        (self.apply)(witness, state, ticket)
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").field("kind", &self.kind).finish_non_exhaustive()
    }
}
