//! Integration point between the protocol, the transport and the game.
//!
//! [`NetworkCoordinator`] borrows the session, directory and dispatcher the
//! embedder constructed, plus the game state, a [`Transport`] and a
//! [`Presentation`]. It routes:
//!
//! - UI actions into [`RoomSession`] calls,
//! - inbound messages to the directory, the session or the dispatcher,
//! - session and directory output to the transport and the presentation,
//! - the simulation's witnesses into the dispatcher (and, on the host, out
//!   to every guest).
//!
//! It keeps no state of its own, so it is cheap to build for each call:
//!
//! ```
//! use card_sync::coordinator::NetworkCoordinator;
//! use card_sync::core::{NetworkConfig, SessionRng};
//! use card_sync::room::{RoomDirectory, RoomPlayerInfo, RoomSession, Role, SessionState};
//! use card_sync::transport::{Destination, Message, Transport, TransportError};
//! use card_sync::witness::{WitnessDispatcher, WitnessHandlerRegistry};
//!
//! #[derive(Default)]
//! struct Outbox(Vec<(Destination, Message)>);
//!
//! impl Transport for Outbox {
//!     fn send(&mut self, to: Destination, message: Message) -> Result<(), TransportError> {
//!         self.0.push((to, message));
//!         Ok(())
//!     }
//! }
//!
//! let config = NetworkConfig::default();
//! let mut session = RoomSession::new(config.clone(), SessionRng::new(1));
//! let mut directory = RoomDirectory::new(&config);
//! let mut dispatcher = WitnessDispatcher::new(WitnessHandlerRegistry::<()>::new(), config.reorder_window);
//! let mut game = ();
//! let mut outbox = Outbox::default();
//! let mut presentation = ();
//!
//! let mut coordinator = NetworkCoordinator::new(
//!     &mut session,
//!     &mut directory,
//!     &mut dispatcher,
//!     &mut game,
//!     &mut outbox,
//!     &mut presentation,
//! );
//! coordinator
//!     .create_room("127.0.0.1:32810".parse().unwrap(), RoomPlayerInfo::new("host", vec![1]))
//!     .unwrap();
//!
//! assert_eq!(session.state(), SessionState::RoomOpen(Role::Host));
//! assert_eq!(directory.hosted_room(), session.room().map(|room| room.id));
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use crate::core::{PeerId, PlayerId, RoomId};
use crate::error::Result;
use crate::room::{
    DirectoryEvent, DirectoryOutput, JoinRejection, OptionChange, QuitReason, RemovalReason, Role, RoomDirectory,
    RoomInfo, RoomPlayerInfo, RoomSession, SessionAction, SessionError, SessionEvent, SessionState,
};
use crate::transport::{Destination, Message, Outbound, Transport};
use crate::witness::{
    CompletionTicket, DesyncError, DispatchReport, SkippedWitness, WitnessDispatcher, WitnessFrame, WitnessRecord,
};

/// Callbacks into the presentation layer. Every method defaults to doing
/// nothing.
#[allow(unused_variables)]
pub trait Presentation {
    /// A room appeared in the directory.
    fn on_room_found(&mut self, room: &RoomInfo) {}

    /// A listed room changed.
    fn on_room_updated(&mut self, room: &RoomInfo) {}

    /// A room left the directory.
    fn on_room_removed(&mut self, room_id: RoomId, reason: RemovalReason) {}

    /// This process opened a room.
    fn on_room_opened(&mut self, room: &RoomInfo) {}

    /// The local player was seated.
    fn on_join_room(&mut self, room: &RoomInfo) {}

    /// A join attempt failed.
    fn on_join_failed(&mut self, error: &SessionError) {}

    /// The room changed.
    fn on_room_info_update(&mut self, previous: &RoomInfo, updated: &RoomInfo) {}

    /// A player left a running game; the game should treat it as a
    /// surrender.
    fn on_player_forfeit(&mut self, player: PlayerId) {}

    /// The game started.
    fn on_game_start(&mut self, room: &RoomInfo) {}

    /// The local side left the room.
    fn on_quit_room(&mut self, room_id: RoomId, reason: QuitReason) {}

    /// A witness was skipped for lack of a handler.
    fn on_witness_skipped(&mut self, skipped: &SkippedWitness) {}

    /// The witness stream desynchronized. The session is torn down right
    /// after this call.
    fn on_desync(&mut self, error: &DesyncError) {}
}

impl Presentation for () {}

/// Routes between the protocol components, the transport and the game.
pub struct NetworkCoordinator<'a, S, T, P> {
    session: &'a mut RoomSession,
    directory: &'a mut RoomDirectory,
    dispatcher: &'a mut WitnessDispatcher<S>,
    game: &'a mut S,
    transport: &'a mut T,
    presentation: &'a mut P,
}

impl<'a, S, T, P> NetworkCoordinator<'a, S, T, P>
where
    T: Transport,
    P: Presentation,
{
    /// Borrow the components for one round of work.
    pub fn new(
        session: &'a mut RoomSession,
        directory: &'a mut RoomDirectory,
        dispatcher: &'a mut WitnessDispatcher<S>,
        game: &'a mut S,
        transport: &'a mut T,
        presentation: &'a mut P,
    ) -> Self {
        Self {
            session,
            directory,
            dispatcher,
            game,
            transport,
            presentation,
        }
    }

    /// The room session.
    #[must_use]
    pub fn session(&self) -> &RoomSession {
        self.session
    }

    /// The room directory.
    #[must_use]
    pub fn directory(&self) -> &RoomDirectory {
        self.directory
    }

    /// The witness dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &WitnessDispatcher<S> {
        self.dispatcher
    }

    // =========================================================================
    // Loop
    // =========================================================================

    /// Advance discovery timers and the pending join.
    pub fn tick(&mut self, elapsed: Duration) {
        let output = self.directory.tick(elapsed);
        self.apply_directory(output);
        let actions = self.session.tick(elapsed);
        self.run(actions);
    }

    /// Route an inbound message.
    pub fn handle_message(&mut self, from: PeerId, message: Message) {
        match message {
            Message::DiscoverResponse { room } => {
                if let Some(event) = self.directory.on_discovered(room) {
                    self.present_directory(&event);
                }
            }
            Message::RefreshResponse { request_id, room } => {
                if let Some(event) = self.directory.on_refreshed(request_id, room) {
                    self.present_directory(&event);
                }
            }
            Message::Witness { frame } => self.receive_witness(from, &frame),
            message => {
                let actions = self.session.handle_message(from, message);
                self.run(actions);
            }
        }
    }

    /// A transport connection dropped.
    pub fn handle_disconnect(&mut self, peer: PeerId) {
        let actions = self.session.handle_disconnect(peer);
        self.run(actions);
    }

    // =========================================================================
    // UI actions
    // =========================================================================

    /// Start browsing rooms.
    pub fn find_rooms(&mut self) -> Result<()> {
        self.session.begin_search()?;
        let output = self.directory.start();
        self.apply_directory(output);
        Ok(())
    }

    /// Stop browsing rooms.
    pub fn stop_finding_rooms(&mut self) {
        self.directory.stop();
        self.session.stop_search();
    }

    /// Clear the room list and search again right away.
    pub fn flush_rooms(&mut self) {
        let output = self.directory.flush();
        self.apply_directory(output);
    }

    /// Open a room at `host` and seat the local `player` in it.
    pub fn create_room(&mut self, host: SocketAddr, player: RoomPlayerInfo) -> Result<RoomId> {
        if self.session.state() == SessionState::Searching {
            self.stop_finding_rooms();
        }
        let actions = self.session.open_room(host)?;
        self.run(actions);

        let room = self.session.room().cloned().ok_or(SessionError::InvalidState {
            state: self.session.state(),
            operation: "open a room",
        })?;
        let actions = self.session.join_room(&room, player)?;
        self.run(actions);
        Ok(room.id)
    }

    /// Join a room, usually one from the directory.
    pub fn join_room(&mut self, room: &RoomInfo, player: RoomPlayerInfo) -> Result<()> {
        let actions = self.session.join_room(room, player)?;
        self.run(actions);
        Ok(())
    }

    /// Edit a room option (a request when called on a guest).
    pub fn edit_option(&mut self, change: OptionChange) -> Result<()> {
        let actions = self.session.edit_option(change)?;
        self.run(actions);
        Ok(())
    }

    /// Lock or unlock the seating order.
    pub fn lock_player_order(&mut self, lock: bool) -> Result<()> {
        let actions = self.session.lock_player_order(lock)?;
        self.run(actions);
        Ok(())
    }

    /// Start the game (host only).
    pub fn start(&mut self) -> Result<()> {
        let actions = self.session.start()?;
        self.run(actions);
        Ok(())
    }

    /// Leave the current room.
    pub fn quit_room(&mut self) -> Result<()> {
        let actions = self.session.quit_room()?;
        self.run(actions);
        Ok(())
    }

    /// The game layer reported the end of the game; leave the room.
    pub fn game_ended(&mut self) -> Result<()> {
        let actions = self.session.end_game()?;
        self.run(actions);
        Ok(())
    }

    // =========================================================================
    // Witnesses
    // =========================================================================

    /// Feed a witness produced by the local authoritative simulation.
    ///
    /// Outside a room the witness is applied locally only. On the host of a
    /// running game it is also sent to every guest under the same sequence
    /// number. Guests do not produce witnesses, and a host's lobby has no
    /// stream yet.
    pub fn dispatch_witness(&mut self, witness: WitnessRecord) -> Result<DispatchReport> {
        let state = self.session.state();
        match state {
            SessionState::Idle | SessionState::Searching | SessionState::InGame(Role::Host) => {}
            SessionState::RoomOpen(Role::Guest) | SessionState::InGame(Role::Guest) => {
                return Err(SessionError::NotHost.into())
            }
            state => {
                return Err(SessionError::InvalidState {
                    state,
                    operation: "dispatch a witness",
                }
                .into())
            }
        }

        let frame = (state == SessionState::InGame(Role::Host)).then(|| witness.clone());
        let sequence = self.dispatcher.submit(witness);
        if let Some(witness) = frame {
            let frame = witness.to_frame(sequence);
            for peer in self.session.guest_peers() {
                self.send(Outbound::new(Destination::Peer(peer), Message::Witness { frame: frame.clone() }));
            }
        }
        Ok(self.pump()?)
    }

    /// A deferred witness finished (its animation ended, say).
    pub fn complete_witness(&mut self, ticket: CompletionTicket) -> Result<DispatchReport> {
        match self.dispatcher.complete(ticket, self.game) {
            Ok(report) => Ok(self.report(report)),
            Err(desync) => {
                self.desynchronized(&desync);
                Err(desync.into())
            }
        }
    }

    fn receive_witness(&mut self, from: PeerId, frame: &WitnessFrame) {
        if !self.session.is_host_peer(from) || !self.session.state().game_running() {
            tracing::warn!(peer = %from, sequence = frame.sequence, "ignoring witness outside a game with this host");
            return;
        }
        if let Err(desync) = self.dispatcher.receive(frame) {
            self.desynchronized(&desync);
            return;
        }
        // Desyncs are already reported and torn down inside `pump`.
        let _ = self.pump();
    }

    fn pump(&mut self) -> std::result::Result<DispatchReport, DesyncError> {
        match self.dispatcher.pump(self.game) {
            Ok(report) => Ok(self.report(report)),
            Err(desync) => {
                self.desynchronized(&desync);
                Err(desync)
            }
        }
    }

    fn report(&mut self, report: DispatchReport) -> DispatchReport {
        for skipped in &report.skipped {
            self.presentation.on_witness_skipped(skipped);
        }
        report
    }

    /// Surface a desync and tear the session down.
    fn desynchronized(&mut self, desync: &DesyncError) {
        self.presentation.on_desync(desync);
        match self.session.quit_room() {
            Ok(actions) => self.run(actions),
            Err(_) => self.dispatcher.reset(),
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn run(&mut self, actions: Vec<SessionAction>) {
        let mut queue: VecDeque<SessionAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Send(outbound) => {
                    let joining = matches!(outbound.message, Message::JoinRequest { .. });
                    if !self.send(outbound) && joining {
                        queue.extend(self.session.abort_join(JoinRejection::Unreachable));
                    }
                }
                SessionAction::Notify(event) => self.present(event),
            }
        }
    }

    /// Send, absorbing failures. Returns whether the transport accepted it.
    fn send(&mut self, outbound: Outbound) -> bool {
        let Outbound { to, message } = outbound;
        let label = message.label();
        match self.transport.send(to, message) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%to, message = label, %error, "send failed");
                false
            }
        }
    }

    fn apply_directory(&mut self, output: DirectoryOutput) {
        for outbound in output.outbound {
            self.send(outbound);
        }
        for event in &output.events {
            self.present_directory(event);
        }
    }

    fn present_directory(&mut self, event: &DirectoryEvent) {
        match event {
            DirectoryEvent::Found(room) => self.presentation.on_room_found(room),
            DirectoryEvent::Updated(room) => self.presentation.on_room_updated(room),
            DirectoryEvent::Removed { room_id, reason } => self.presentation.on_room_removed(*room_id, *reason),
        }
    }

    fn present(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::RoomOpened(room) => {
                self.dispatcher.reset();
                if let Some(event) = self.directory.set_hosted_room(Some(room.id)) {
                    self.present_directory(&event);
                }
                self.presentation.on_room_opened(&room);
            }
            SessionEvent::Joined(room) => {
                if self.session.role() == Some(Role::Guest) {
                    self.dispatcher.reset();
                    self.stop_finding_rooms();
                }
                self.presentation.on_join_room(&room);
            }
            SessionEvent::JoinFailed(error) => self.presentation.on_join_failed(&error),
            SessionEvent::RoomInfoUpdated { previous, updated } => {
                self.presentation.on_room_info_update(&previous, &updated);
            }
            SessionEvent::PlayerForfeited(player) => self.presentation.on_player_forfeit(player),
            SessionEvent::GameStarted(room) => self.presentation.on_game_start(&room),
            SessionEvent::Quit { room_id, reason } => {
                self.dispatcher.reset();
                if self.directory.hosted_room() == Some(room_id) {
                    self.directory.set_hosted_room(None);
                }
                if let Some(event) = self.directory.forget(room_id) {
                    self.present_directory(&event);
                }
                self.presentation.on_quit_room(room_id, reason);
            }
        }
    }
}

impl<S, T, P> std::fmt::Debug for NetworkCoordinator<'_, S, T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCoordinator")
            .field("session", &self.session.state())
            .field("rooms", &self.directory.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
