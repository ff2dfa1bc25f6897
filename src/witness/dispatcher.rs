//! Ordered witness dispatch.
//!
//! The dispatcher is the only place witnesses are applied. It enforces:
//!
//! 1. **Order**: witness `n + 1` never starts before witness `n` finished,
//!    including deferred witnesses that finish later through
//!    [`WitnessDispatcher::complete`].
//! 2. **Idempotency**: a frame whose sequence was already applied or is
//!    already buffered is dropped, so at-least-once delivery is safe.
//! 3. **Gap tolerance**: frames that arrive ahead of a missing one wait in a
//!    bounded buffer.
//!
//! Unknown witnesses are skipped and reported. A failing handler, a
//! malformed frame or an overflowing reorder buffer halts the stream with a
//! [`DesyncError`]; nothing is applied again until [`reset`](WitnessDispatcher::reset).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::handler::{CompletionTicket, Handled, HandlerError};
use super::record::{WitnessError, WitnessFrame, WitnessKind, WitnessRecord};
use super::registry::WitnessHandlerRegistry;

/// Why the witness stream stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DesyncReason {
    /// A handler failed while applying the witness.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// The frame named a known kind but its variables were invalid.
    #[error("malformed witness: {0}")]
    Malformed(WitnessError),

    /// Too many frames arrived ahead of a missing one.
    #[error("more than {window} witnesses buffered ahead of the stream")]
    ReorderOverflow {
        /// Configured window.
        window: usize,
    },
}

/// Session-fatal failure of the witness stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("witness stream desynchronized at #{sequence}: {reason}")]
pub struct DesyncError {
    /// Sequence number of the witness that failed.
    pub sequence: u64,
    /// Kind of that witness, when known.
    pub kind: Option<WitnessKind>,
    /// What went wrong.
    pub reason: DesyncReason,
}

/// A witness that was skipped instead of applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedWitness {
    /// Sequence number of the skipped witness.
    pub sequence: u64,
    /// Always [`WitnessError::UnknownWitness`].
    pub error: WitnessError,
}

/// What a single `pump` or `complete` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Witnesses whose handler ran, in order.
    pub applied: Vec<(u64, WitnessKind)>,
    /// Witnesses skipped for lack of a handler.
    pub skipped: Vec<SkippedWitness>,
    /// Deferred witness the stream now waits on.
    pub waiting_on: Option<CompletionTicket>,
}

impl DispatchReport {
    /// True if nothing was applied or skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.skipped.is_empty()
    }
}

/// Outcome of offering a frame to the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ingest {
    /// Queued in an unbroken run from the next witness to start.
    Accepted,
    /// Queued behind a gap.
    Buffered,
    /// Already applied or already queued; dropped.
    Duplicate,
}

#[derive(Debug, Clone)]
enum Slot {
    Witness(WitnessRecord),
    Unknown(WitnessError),
    Malformed(WitnessKind, WitnessError),
}

/// Applies witnesses strictly in sequence order.
///
/// ## Example
///
/// ```
/// use card_sync::witness::{
///     FnHandler, Handled, WitnessDispatcher, WitnessHandlerRegistry, WitnessKind, WitnessRecord,
/// };
///
/// let registry = WitnessHandlerRegistry::<Vec<i64>>::new()
///     .with(FnHandler::new(WitnessKind::TurnStart, |w, turns: &mut Vec<i64>, _| {
///         turns.push(w.int("playerIndex", -1));
///         Ok(Handled::Consumed)
///     }))
///     .unwrap();
/// let mut dispatcher = WitnessDispatcher::new(registry, 64);
///
/// for player in [0i64, 1, 0] {
///     let witness = WitnessRecord::builder(WitnessKind::TurnStart)
///         .var("playerIndex", player)
///         .build()
///         .unwrap();
///     dispatcher.submit(witness);
/// }
///
/// let mut turns: Vec<i64> = Vec::new();
/// dispatcher.pump(&mut turns).unwrap();
/// assert_eq!(turns, vec![0, 1, 0]);
/// ```
pub struct WitnessDispatcher<S> {
    registry: WitnessHandlerRegistry<S>,
    /// Witnesses waiting for their turn, keyed by sequence.
    queue: BTreeMap<u64, Slot>,
    /// Sequence of the next witness to start.
    next_sequence: u64,
    /// First sequence at or after `next_sequence` that is not queued.
    /// Frames past it wait behind a gap.
    frontier: u64,
    /// Sequence assigned to the next locally submitted witness.
    next_submit: u64,
    /// Deferred witness currently holding the stream.
    awaiting: Option<CompletionTicket>,
    /// Bumped on every reset so stale tickets can be recognized.
    generation: u64,
    reorder_window: usize,
    desync: Option<DesyncError>,
}

impl<S> WitnessDispatcher<S> {
    /// Create a dispatcher over `registry` buffering at most
    /// `reorder_window` frames ahead of the stream.
    #[must_use]
    pub fn new(registry: WitnessHandlerRegistry<S>, reorder_window: usize) -> Self {
        Self {
            registry,
            queue: BTreeMap::new(),
            next_sequence: 0,
            frontier: 0,
            next_submit: 0,
            awaiting: None,
            generation: 0,
            reorder_window,
            desync: None,
        }
    }

    /// The handler registry.
    #[must_use]
    pub fn registry(&self) -> &WitnessHandlerRegistry<S> {
        &self.registry
    }

    /// Sequence number of the next witness to start.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of witnesses queued but not started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The deferred witness holding the stream, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<CompletionTicket> {
        self.awaiting
    }

    /// The failure that halted the stream, if any.
    #[must_use]
    pub fn desync(&self) -> Option<&DesyncError> {
        self.desync.as_ref()
    }

    /// True when nothing is queued, nothing is deferred and the stream is
    /// healthy.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.awaiting.is_none() && self.desync.is_none()
    }

    /// Queue a locally produced witness at the end of the stream.
    ///
    /// Returns the sequence number assigned to it, which is also the number
    /// to send to remote peers.
    pub fn submit(&mut self, witness: WitnessRecord) -> u64 {
        let sequence = self.next_submit;
        self.next_submit += 1;
        self.queue.insert(sequence, Slot::Witness(witness));
        self.advance_frontier();
        sequence
    }

    /// Offer a frame received from the producer.
    ///
    /// Frames that continue the queued run are always accepted, however long
    /// a deferred witness holds the stream. Only frames waiting behind a gap
    /// count against the reorder window.
    pub fn receive(&mut self, frame: &WitnessFrame) -> Result<Ingest, DesyncError> {
        if let Some(desync) = &self.desync {
            return Err(desync.clone());
        }

        let sequence = frame.sequence;
        if sequence < self.next_sequence || self.queue.contains_key(&sequence) {
            tracing::debug!(sequence, witness = %frame.name, "dropping duplicate witness");
            return Ok(Ingest::Duplicate);
        }

        if sequence > self.frontier && sequence - self.frontier >= self.reorder_window as u64 {
            return Err(self.halt(DesyncError {
                sequence,
                kind: frame.name.parse().ok(),
                reason: DesyncReason::ReorderOverflow {
                    window: self.reorder_window,
                },
            }));
        }

        let slot = match frame.decode() {
            Ok(witness) => Slot::Witness(witness),
            Err(err @ WitnessError::UnknownWitness { .. }) => Slot::Unknown(err),
            Err(err @ WitnessError::Schema { kind, .. }) => Slot::Malformed(kind, err),
        };
        self.queue.insert(sequence, slot);
        self.next_submit = self.next_submit.max(sequence + 1);

        if sequence == self.frontier {
            self.advance_frontier();
            Ok(Ingest::Accepted)
        } else {
            Ok(Ingest::Buffered)
        }
    }

    /// Apply queued witnesses in order until the queue runs dry, a handler
    /// defers, or the stream fails.
    pub fn pump(&mut self, state: &mut S) -> Result<DispatchReport, DesyncError> {
        let mut report = DispatchReport::default();
        if let Some(desync) = &self.desync {
            return Err(desync.clone());
        }

        while self.awaiting.is_none() {
            let sequence = self.next_sequence;
            let Some(slot) = self.queue.remove(&sequence) else {
                break;
            };
            self.next_sequence += 1;

            let witness = match slot {
                Slot::Witness(witness) => witness,
                Slot::Unknown(error) => {
                    tracing::warn!(sequence, %error, "skipping witness");
                    report.skipped.push(SkippedWitness { sequence, error });
                    continue;
                }
                Slot::Malformed(kind, error) => {
                    return Err(self.halt(DesyncError {
                        sequence,
                        kind: Some(kind),
                        reason: DesyncReason::Malformed(error),
                    }));
                }
            };

            let kind = witness.kind();
            let handler = match self.registry.resolve(kind) {
                Ok(handler) => handler,
                Err(error) => {
                    tracing::warn!(sequence, %error, "skipping witness");
                    report.skipped.push(SkippedWitness { sequence, error });
                    continue;
                }
            };

            let ticket = CompletionTicket {
                generation: self.generation,
                sequence,
            };
            match handler.handle(&witness, state, ticket) {
                Ok(Handled::Consumed) => report.applied.push((sequence, kind)),
                Ok(Handled::Deferred) => {
                    report.applied.push((sequence, kind));
                    self.awaiting = Some(ticket);
                }
                Err(err) => {
                    return Err(self.halt(DesyncError {
                        sequence,
                        kind: Some(kind),
                        reason: DesyncReason::Handler(err),
                    }));
                }
            }
        }

        report.waiting_on = self.awaiting;
        Ok(report)
    }

    /// Signal that the deferred witness identified by `ticket` finished, then
    /// keep applying.
    ///
    /// Tickets that do not match the witness currently awaited (late
    /// completions after a reset, double completions) are ignored.
    pub fn complete(&mut self, ticket: CompletionTicket, state: &mut S) -> Result<DispatchReport, DesyncError> {
        if self.awaiting != Some(ticket) {
            tracing::debug!(
                sequence = ticket.sequence,
                generation = ticket.generation,
                "ignoring stale completion"
            );
            return Ok(DispatchReport {
                waiting_on: self.awaiting,
                ..DispatchReport::default()
            });
        }
        self.awaiting = None;
        self.pump(state)
    }

    /// Drop all queued and deferred witnesses and start a fresh stream at
    /// sequence 0. Used when the room ends or the session tears down.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.awaiting = None;
        self.desync = None;
        self.next_sequence = 0;
        self.frontier = 0;
        self.next_submit = 0;
        self.generation += 1;
    }

    fn advance_frontier(&mut self) {
        while self.queue.contains_key(&self.frontier) {
            self.frontier += 1;
        }
    }

    fn halt(&mut self, desync: DesyncError) -> DesyncError {
        tracing::error!(
            sequence = desync.sequence,
            kind = ?desync.kind,
            error = %desync.reason,
            "witness stream desynchronized"
        );
        self.queue.clear();
        self.awaiting = None;
        self.frontier = self.next_sequence;
        self.desync = Some(desync.clone());
        desync
    }
}

impl<S> std::fmt::Debug for WitnessDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WitnessDispatcher")
            .field("registry", &self.registry)
            .field("next_sequence", &self.next_sequence)
            .field("pending", &self.queue.len())
            .field("awaiting", &self.awaiting)
            .field("desync", &self.desync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::witness::handler::FnHandler;
    use crate::witness::record::WitnessVariables;

    #[derive(Default)]
    struct Table {
        log: Vec<(u64, i64)>,
        tickets: Vec<CompletionTicket>,
    }

    fn turn(player: i64) -> WitnessRecord {
        WitnessRecord::builder(WitnessKind::TurnStart)
            .var("playerIndex", player)
            .build()
            .unwrap()
    }

    fn dispatcher() -> WitnessDispatcher<Table> {
        let registry = WitnessHandlerRegistry::<Table>::new()
            .with(FnHandler::new(WitnessKind::TurnStart, |w, table: &mut Table, ticket| {
                table.log.push((ticket.sequence(), w.int("playerIndex", -1)));
                Ok(Handled::Consumed)
            }))
            .unwrap()
            .with(FnHandler::new(WitnessKind::Draw, |_, table: &mut Table, ticket| {
                table.tickets.push(ticket);
                Ok(Handled::Deferred)
            }))
            .unwrap()
            .with(FnHandler::new(WitnessKind::Death, |_, _: &mut Table, _| {
                Err(HandlerError::new("card not on field"))
            }))
            .unwrap();
        WitnessDispatcher::new(registry, 4)
    }

    fn draw() -> WitnessRecord {
        WitnessRecord::builder(WitnessKind::Draw)
            .var("playerIndex", 0i64)
            .var("cardRID", 3i64)
            .build()
            .unwrap()
    }

    #[test]
    fn test_submit_assigns_sequences() {
        let mut dispatcher = dispatcher();
        assert_eq!(dispatcher.submit(turn(0)), 0);
        assert_eq!(dispatcher.submit(turn(1)), 1);
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn test_pump_applies_in_order() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        for player in 0..3 {
            dispatcher.submit(turn(player));
        }

        let report = dispatcher.pump(&mut table).unwrap();
        assert_eq!(report.applied.len(), 3);
        assert_eq!(table.log, vec![(0, 0), (1, 1), (2, 2)]);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_deferred_witness_blocks_stream() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.submit(draw());
        dispatcher.submit(turn(1));

        let report = dispatcher.pump(&mut table).unwrap();
        assert_eq!(report.applied, vec![(0, WitnessKind::Draw)]);
        assert!(table.log.is_empty());
        let ticket = report.waiting_on.unwrap();
        assert_eq!(ticket, table.tickets[0]);

        // Pumping again does not advance past the deferred witness.
        assert!(dispatcher.pump(&mut table).unwrap().is_empty());

        let report = dispatcher.complete(ticket, &mut table).unwrap();
        assert_eq!(report.applied, vec![(1, WitnessKind::TurnStart)]);
        assert_eq!(table.log, vec![(1, 1)]);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.submit(draw());
        dispatcher.submit(turn(0));
        let ticket = dispatcher.pump(&mut table).unwrap().waiting_on.unwrap();

        dispatcher.reset();
        dispatcher.submit(turn(5));
        let report = dispatcher.complete(ticket, &mut table).unwrap();
        assert!(report.is_empty());
        assert!(table.log.is_empty());
    }

    #[test]
    fn test_unregistered_kind_is_skipped() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.submit(
            WitnessRecord::builder(WitnessKind::OnUse)
                .var("cardRID", 7i64)
                .var("targetPosition", -1i64)
                .var("targetCardRID", 0i64)
                .build()
                .unwrap(),
        );
        dispatcher.submit(turn(0));

        let report = dispatcher.pump(&mut table).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].sequence, 0);
        assert_eq!(
            report.skipped[0].error,
            WitnessError::UnknownWitness { name: "onUse".to_string() }
        );
        assert_eq!(table.log, vec![(1, 0)]);
    }

    #[test]
    fn test_unknown_wire_name_is_skipped() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        let frame = WitnessFrame {
            sequence: 0,
            name: "onMulligan".to_string(),
            variables: WitnessVariables::new(),
        };
        assert_eq!(dispatcher.receive(&frame).unwrap(), Ingest::Accepted);
        dispatcher.receive(&turn(1).to_frame(1)).unwrap();

        let report = dispatcher.pump(&mut table).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(table.log, vec![(1, 1)]);
    }

    #[test]
    fn test_out_of_order_frames_wait_for_gap() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();

        assert_eq!(dispatcher.receive(&turn(2).to_frame(2)).unwrap(), Ingest::Buffered);
        assert_eq!(dispatcher.receive(&turn(1).to_frame(1)).unwrap(), Ingest::Buffered);
        assert!(dispatcher.pump(&mut table).unwrap().is_empty());

        assert_eq!(dispatcher.receive(&turn(0).to_frame(0)).unwrap(), Ingest::Accepted);
        dispatcher.pump(&mut table).unwrap();
        assert_eq!(table.log, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_duplicate_frames_are_dropped() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        let frame = turn(0).to_frame(0);

        assert_eq!(dispatcher.receive(&frame).unwrap(), Ingest::Accepted);
        assert_eq!(dispatcher.receive(&frame).unwrap(), Ingest::Duplicate);
        dispatcher.pump(&mut table).unwrap();
        assert_eq!(dispatcher.receive(&frame).unwrap(), Ingest::Duplicate);
        dispatcher.pump(&mut table).unwrap();

        assert_eq!(table.log.len(), 1);
    }

    #[test]
    fn test_in_order_frames_behind_deferred_witness_are_accepted() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.receive(&draw().to_frame(0)).unwrap();
        assert!(dispatcher.pump(&mut table).unwrap().waiting_on.is_some());

        for sequence in 1..10 {
            let ingest = dispatcher.receive(&turn(sequence as i64).to_frame(sequence)).unwrap();
            assert_eq!(ingest, Ingest::Accepted);
        }
        // A gap still counts from the end of the run.
        assert_eq!(dispatcher.receive(&turn(0).to_frame(12)).unwrap(), Ingest::Buffered);
        assert!(dispatcher.receive(&turn(0).to_frame(14)).is_err());
        assert!(table.log.is_empty());
        assert!(dispatcher.desync().is_some());
        assert!(dispatcher.pump(&mut table).is_err());
    }

    #[test]
    fn test_reorder_overflow_desyncs() {
        let mut dispatcher = dispatcher();
        let err = dispatcher.receive(&turn(0).to_frame(4)).unwrap_err();
        assert_eq!(err.reason, DesyncReason::ReorderOverflow { window: 4 });
        assert!(dispatcher.desync().is_some());
    }

    #[test]
    fn test_handler_failure_halts_stream() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.submit(
            WitnessRecord::builder(WitnessKind::Death)
                .var("cardRIDs", vec![4i64])
                .build()
                .unwrap(),
        );
        dispatcher.submit(turn(0));

        let err = dispatcher.pump(&mut table).unwrap_err();
        assert_eq!(err.sequence, 0);
        assert_eq!(err.kind, Some(WitnessKind::Death));
        assert!(matches!(err.reason, DesyncReason::Handler(_)));
        assert!(table.log.is_empty());

        // Stays halted until reset.
        assert!(dispatcher.pump(&mut table).is_err());
        dispatcher.reset();
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_malformed_frame_desyncs_in_turn() {
        let mut dispatcher = dispatcher();
        let mut table = Table::default();
        dispatcher.receive(&turn(0).to_frame(0)).unwrap();
        let malformed = WitnessFrame {
            sequence: 1,
            name: "onTurnStart".to_string(),
            variables: WitnessVariables::new(),
        };
        dispatcher.receive(&malformed).unwrap();

        let err = dispatcher.pump(&mut table).unwrap_err();
        assert_eq!(err.sequence, 1);
        assert!(matches!(err.reason, DesyncReason::Malformed(_)));
        assert_eq!(table.log, vec![(0, 0)]);
    }
}
