//! Room session state machine.
//!
//! One [`RoomSession`] per process owns the lifecycle of the room it is in,
//! on either side of the connection:
//!
//! ```text
//! Idle ──open_room──▶ Hosting ──join own room──▶ RoomOpen(Host)
//! Idle ⇄ Searching ──join_room──▶ Joining ──accepted──▶ RoomOpen(Guest)
//! RoomOpen(Host) ──start──▶ Starting(Host) ──all acks──▶ InGame(Host)
//! RoomOpen(Guest) ──start invoke──▶ InGame(Guest)
//! any room state ──quit / close / host lost──▶ Idle
//! ```
//!
//! The session is Sans-IO: every operation returns [`SessionAction`]s
//! (messages to send, events to surface) and never touches a socket.
//!
//! ## Authority
//!
//! The host holds the authoritative [`RoomInfo`] and is its only writer.
//! Guests hold a mirror that is replaced wholesale by newer pushes; an
//! option edit on a guest becomes a request to the host and takes effect
//! only when the host's push comes back.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{NetworkConfig, PeerId, PlayerId, RequestId, RequestIdAllocator, RoomId, SessionRng};
use crate::transport::{Destination, Message, Outbound, Procedure};

use super::info::{RoomInfo, RoomPlayerInfo};
use super::options::{OptionChange, OptionError, RoomOptions};

/// Which side of the room this process is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Owns the authoritative room.
    Host,
    /// Mirrors the host's room.
    Guest,
}

impl Role {
    /// Lowercase name, used as a log field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`RoomSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Not in a room and not looking for one.
    Idle,
    /// Browsing discovered rooms.
    Searching,
    /// A room is open but the local player is not seated in it yet.
    Hosting,
    /// Waiting for a host to answer a join request.
    Joining,
    /// Seated in a room that has not started.
    RoomOpen(Role),
    /// The host invoked start and waits for every guest's acknowledgement.
    /// Only ever `Starting(Role::Host)`: a guest goes straight from
    /// `RoomOpen` to `InGame` when it acknowledges.
    Starting(Role),
    /// The game is running.
    InGame(Role),
}

impl SessionState {
    /// The local role, once one exists.
    #[must_use]
    pub fn role(self) -> Option<Role> {
        match self {
            SessionState::Hosting => Some(Role::Host),
            SessionState::RoomOpen(role) | SessionState::Starting(role) | SessionState::InGame(role) => Some(role),
            SessionState::Idle | SessionState::Searching | SessionState::Joining => None,
        }
    }

    /// Seated in a room (open, starting or running).
    #[must_use]
    pub fn in_room(self) -> bool {
        matches!(
            self,
            SessionState::RoomOpen(_) | SessionState::Starting(_) | SessionState::InGame(_)
        )
    }

    /// A game is starting or running.
    #[must_use]
    pub fn game_running(self) -> bool {
        matches!(self, SessionState::Starting(_) | SessionState::InGame(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => f.write_str("Idle"),
            SessionState::Searching => f.write_str("Searching"),
            SessionState::Hosting => f.write_str("Hosting"),
            SessionState::Joining => f.write_str("Joining"),
            SessionState::RoomOpen(role) => write!(f, "RoomOpen({role})"),
            SessionState::Starting(role) => write!(f, "Starting({role})"),
            SessionState::InGame(role) => write!(f, "InGame({role})"),
        }
    }
}

/// Why a host refused (or a joiner gave up on) a join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum JoinRejection {
    /// The host does not have that room open.
    #[error("room not found")]
    RoomNotFound,
    /// Every seat is taken.
    #[error("room is full")]
    RoomFull,
    /// The room already started.
    #[error("game already in progress")]
    GameInProgress,
    /// No answer within the join timeout.
    #[error("join timed out")]
    Timeout,
    /// The host could not be reached.
    #[error("host unreachable")]
    Unreachable,
}

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The host refused the join, or it timed out.
    #[error("join rejected: {0}")]
    JoinRejected(JoinRejection),

    /// Already in a room; leave it first.
    #[error("already in room {room_id}")]
    AlreadyInRoom {
        /// The current room.
        room_id: RoomId,
    },

    /// The operation is not valid in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// State at the time of the call.
        state: SessionState,
        /// Attempted operation.
        operation: &'static str,
    },

    /// Only the host may do this.
    #[error("only the host can do this")]
    NotHost,

    /// Too few players to start.
    #[error("{count} players seated, {required} required")]
    NotEnoughPlayers {
        /// Seated players.
        count: usize,
        /// Configured minimum.
        required: usize,
    },

    /// An option edit was rejected.
    #[error(transparent)]
    InvalidOption(#[from] OptionError),
}

/// Why the local side left a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuitReason {
    /// The local player quit (the room closes if this side hosts it).
    Local,
    /// The game ended.
    GameEnded,
    /// The host closed the room.
    RoomClosed,
    /// The connection to the host was lost.
    HostLost,
}

/// Something the presentation layer should hear about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The local process opened a room as host.
    RoomOpened(RoomInfo),
    /// The local player was seated.
    Joined(RoomInfo),
    /// A join attempt failed; the session is back where it was.
    JoinFailed(SessionError),
    /// The room changed.
    RoomInfoUpdated {
        /// Copy before the change.
        previous: RoomInfo,
        /// Copy after the change.
        updated: RoomInfo,
    },
    /// A player left a running game and counts as surrendered.
    PlayerForfeited(PlayerId),
    /// The game started.
    GameStarted(RoomInfo),
    /// The local side left the room.
    Quit {
        /// Room left.
        room_id: RoomId,
        /// Why.
        reason: QuitReason,
    },
}

/// Output of a session operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a message.
    Send(Outbound),
    /// Surface an event.
    Notify(SessionEvent),
}

impl SessionAction {
    fn send(to: Destination, message: Message) -> Self {
        SessionAction::Send(Outbound::new(to, message))
    }

    /// The message, if this is a send.
    #[must_use]
    pub fn outbound(&self) -> Option<&Outbound> {
        match self {
            SessionAction::Send(outbound) => Some(outbound),
            SessionAction::Notify(_) => None,
        }
    }

    /// The event, if this is a notification.
    #[must_use]
    pub fn event(&self) -> Option<&SessionEvent> {
        match self {
            SessionAction::Notify(event) => Some(event),
            SessionAction::Send(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingJoin {
    request_id: RequestId,
    room_id: RoomId,
    elapsed: Duration,
    /// State to return to if the join fails.
    resume: SessionState,
}

#[derive(Clone, Debug)]
struct PendingStart {
    request_id: RequestId,
    waiting: BTreeSet<PeerId>,
}

/// One room's lifecycle, host or guest side.
///
/// ## Example
///
/// ```
/// use card_sync::core::{NetworkConfig, SessionRng};
/// use card_sync::room::{RoomPlayerInfo, RoomSession, Role, SessionState};
///
/// let mut host = RoomSession::new(NetworkConfig::default(), SessionRng::new(1));
/// host.open_room("127.0.0.1:32810".parse().unwrap()).unwrap();
/// assert_eq!(host.state(), SessionState::Hosting);
///
/// let room = host.room().unwrap().clone();
/// host.join_room(&room, RoomPlayerInfo::new("host", vec![3, 10, 11])).unwrap();
/// assert_eq!(host.state(), SessionState::RoomOpen(Role::Host));
/// assert_eq!(host.room().unwrap().player_count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct RoomSession {
    config: NetworkConfig,
    rng: SessionRng,
    requests: RequestIdAllocator,
    state: SessionState,
    /// Authoritative copy on the host, mirror on a guest.
    room: Option<RoomInfo>,
    local_player: Option<PlayerId>,

    /// Host: guest seats and their connections.
    seats: BTreeMap<PlayerId, PeerId>,
    next_player: u32,
    pending_start: Option<PendingStart>,

    /// Guest: connection to the host.
    host_peer: Option<PeerId>,
    pending_join: Option<PendingJoin>,
}

impl RoomSession {
    /// Create an idle session.
    #[must_use]
    pub fn new(config: NetworkConfig, rng: SessionRng) -> Self {
        Self {
            config,
            rng,
            requests: RequestIdAllocator::new(),
            state: SessionState::Idle,
            room: None,
            local_player: None,
            seats: BTreeMap::new(),
            next_player: 1,
            pending_start: None,
            host_peer: None,
            pending_join: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local role, if any.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.state.role()
    }

    /// The room: authoritative on the host, a mirror on guests.
    #[must_use]
    pub fn room(&self) -> Option<&RoomInfo> {
        self.room.as_ref()
    }

    /// The local player's seat.
    #[must_use]
    pub fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    /// The host connection, on a guest.
    #[must_use]
    pub fn host_peer(&self) -> Option<PeerId> {
        self.host_peer
    }

    /// Connections of every seated guest, on the host.
    #[must_use]
    pub fn guest_peers(&self) -> Vec<PeerId> {
        self.seats.values().copied().collect()
    }

    /// The configuration the session runs with.
    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Whether `peer` is this guest's host.
    #[must_use]
    pub fn is_host_peer(&self, peer: PeerId) -> bool {
        self.role() == Some(Role::Guest) && self.host_peer == Some(peer)
    }

    // =========================================================================
    // Searching
    // =========================================================================

    /// Start browsing rooms.
    pub fn begin_search(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Searching => {
                self.state = SessionState::Searching;
                Ok(())
            }
            state => Err(self.refuse(state, "search")),
        }
    }

    /// Stop browsing rooms. No effect outside `Searching`.
    pub fn stop_search(&mut self) {
        if self.state == SessionState::Searching {
            self.state = SessionState::Idle;
        }
    }

    // =========================================================================
    // Host operations
    // =========================================================================

    /// Open a room reachable at `host`, with a fresh id and game seed.
    pub fn open_room(&mut self, host: SocketAddr) -> Result<Vec<SessionAction>, SessionError> {
        if let Some(room) = &self.room {
            return Err(SessionError::AlreadyInRoom { room_id: room.id });
        }
        if self.state != SessionState::Idle {
            return Err(self.refuse(self.state, "open a room"));
        }

        let options = RoomOptions::new(self.rng.next_game_seed(), &self.config.room_defaults);
        let room = RoomInfo::new(self.rng.next_room_id(), host, options);
        tracing::info!(
            role = "host",
            room_id = %room.id,
            %host,
            seed = room.options.random_seed,
            "room opened"
        );

        self.room = Some(room.clone());
        self.state = SessionState::Hosting;
        self.next_player = 1;
        Ok(vec![SessionAction::Notify(SessionEvent::RoomOpened(room))])
    }

    /// Edit a room option.
    ///
    /// On the host the edit is applied and pushed to every guest. On a
    /// guest it becomes a request; the local mirror changes only when the
    /// host's push arrives.
    pub fn edit_option(&mut self, change: OptionChange) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Hosting | SessionState::RoomOpen(Role::Host) => self.apply_host_edit(change),
            SessionState::RoomOpen(Role::Guest) => {
                change.check()?;
                let (Some(room), Some(host)) = (&self.room, self.host_peer) else {
                    return Err(self.refuse(self.state, "edit options"));
                };
                tracing::debug!(role = "guest", room_id = %room.id, ?change, "requesting option change");
                Ok(vec![SessionAction::send(
                    Destination::Peer(host),
                    Message::OptionChangeRequest {
                        room_id: room.id,
                        change,
                    },
                )])
            }
            state => Err(self.refuse(state, "edit options")),
        }
    }

    /// Lock the seating order to the current roster, or unlock it.
    pub fn lock_player_order(&mut self, lock: bool) -> Result<Vec<SessionAction>, SessionError> {
        let Some(room) = &self.room else {
            return Err(self.refuse(self.state, "lock the player order"));
        };
        let change = room.lock_order_change(lock);
        self.edit_option(change)
    }

    /// Start the game: invoke [`Procedure::Start`] on every guest.
    ///
    /// The host enters `InGame` once every guest acknowledged; guests that
    /// leave meanwhile are not waited for.
    pub fn start(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::RoomOpen(Role::Host) => {}
            SessionState::RoomOpen(Role::Guest) => return Err(SessionError::NotHost),
            state => return Err(self.refuse(state, "start")),
        }
        let count = self.room.as_ref().map_or(0, RoomInfo::player_count);
        let required = self.config.min_players_to_start;
        if count < required {
            return Err(SessionError::NotEnoughPlayers { count, required });
        }

        let request_id = self.requests.allocate();
        let waiting: BTreeSet<PeerId> = self.seats.values().copied().collect();
        let mut actions: Vec<SessionAction> = waiting
            .iter()
            .map(|peer| {
                SessionAction::send(
                    Destination::Peer(*peer),
                    Message::Invoke {
                        request_id,
                        procedure: Procedure::Start,
                    },
                )
            })
            .collect();

        tracing::info!(role = "host", players = count, "starting game");
        self.state = SessionState::Starting(Role::Host);
        if waiting.is_empty() {
            actions.extend(self.enter_game_as_host());
        } else {
            self.pending_start = Some(PendingStart { request_id, waiting });
        }
        Ok(actions)
    }

    // =========================================================================
    // Joining and leaving
    // =========================================================================

    /// Join `room` as `player`.
    ///
    /// Joining the room this process hosts seats the player directly.
    /// Otherwise a join request goes to the room's host and the session
    /// waits in `Joining`.
    pub fn join_room(&mut self, room: &RoomInfo, player: RoomPlayerInfo) -> Result<Vec<SessionAction>, SessionError> {
        match (self.state, self.room.as_ref().map(|r| r.id)) {
            (SessionState::Hosting, Some(hosted)) if hosted == room.id => return Ok(self.seat_host_player(player)),
            (SessionState::Idle | SessionState::Searching, _) => {}
            (_, Some(room_id)) => return Err(SessionError::AlreadyInRoom { room_id }),
            (state, None) => return Err(self.refuse(state, "join a room")),
        }

        let request_id = self.requests.allocate();
        self.pending_join = Some(PendingJoin {
            request_id,
            room_id: room.id,
            elapsed: Duration::ZERO,
            resume: self.state,
        });
        self.state = SessionState::Joining;
        tracing::info!(role = "guest", room_id = %room.id, host = %room.host, "joining room");

        Ok(vec![SessionAction::send(
            Destination::Host(room.host),
            Message::JoinRequest {
                request_id,
                room_id: room.id,
                player,
            },
        )])
    }

    /// Fail the pending join, for example because the transport could not
    /// reach the host.
    pub fn abort_join(&mut self, reason: JoinRejection) -> Vec<SessionAction> {
        if self.state != SessionState::Joining {
            return Vec::new();
        }
        self.fail_join(reason)
    }

    /// Leave the current room. A host closes it for everyone; a guest only
    /// gives up its seat. Cancels a pending join.
    pub fn quit_room(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        self.quit_with(QuitReason::Local)
    }

    /// The game ended; leave the room.
    pub fn end_game(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if !self.state.game_running() {
            return Err(self.refuse(self.state, "end the game"));
        }
        self.quit_with(QuitReason::GameEnded)
    }

    /// Advance time; expires a pending join.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<SessionAction> {
        let timeout = self.config.join_timeout();
        let Some(pending) = &mut self.pending_join else {
            return Vec::new();
        };
        pending.elapsed += elapsed;
        if pending.elapsed < timeout {
            return Vec::new();
        }
        tracing::warn!(role = "guest", room_id = %pending.room_id, "join timed out");
        self.fail_join(JoinRejection::Timeout)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handle a protocol message from `from`.
    ///
    /// Discovery and refresh answers and witness frames are not session
    /// messages and are ignored here.
    pub fn handle_message(&mut self, from: PeerId, message: Message) -> Vec<SessionAction> {
        match message {
            Message::DiscoverRequest => self.on_discover(from),
            Message::RefreshRequest { request_id, room_id } => self.on_refresh(from, request_id, room_id),
            Message::JoinRequest {
                request_id,
                room_id,
                player,
            } => self.on_join_request(from, request_id, room_id, player),
            Message::JoinAccepted {
                request_id,
                player_id,
                room,
            } => self.on_join_accepted(from, request_id, player_id, room),
            Message::JoinRejected { request_id, reason } => self.on_join_rejected(request_id, reason),
            Message::QuitNotice { player_id } => self.on_quit_notice(from, player_id),
            Message::RoomInfoPush { room } => self.on_room_push(from, room),
            Message::RoomClosed { room_id } => self.on_room_closed(from, room_id),
            Message::Invoke { request_id, procedure } => self.on_invoke(from, request_id, procedure),
            Message::InvokeAck { request_id } => self.on_invoke_ack(from, request_id),
            Message::OptionChangeRequest { room_id, change } => self.on_option_request(from, room_id, change),
            other @ (Message::DiscoverResponse { .. } | Message::RefreshResponse { .. } | Message::Witness { .. }) => {
                tracing::debug!(peer = %from, message = other.label(), "not a session message");
                Vec::new()
            }
        }
    }

    /// A transport connection dropped.
    ///
    /// On the host a guest's disconnect counts as its quit. On a guest,
    /// losing the host counts as room closure.
    pub fn handle_disconnect(&mut self, peer: PeerId) -> Vec<SessionAction> {
        if self.is_host_peer(peer) {
            tracing::warn!(role = "guest", %peer, "lost connection to host");
            return self.leave(QuitReason::HostLost);
        }
        if self.role() == Some(Role::Host) {
            if let Some(player_id) = self.seat_of(peer) {
                tracing::info!(role = "host", %peer, %player_id, "guest disconnected");
                return self.remove_guest(player_id, peer);
            }
        }
        Vec::new()
    }

    fn on_discover(&self, from: PeerId) -> Vec<SessionAction> {
        match self.open_hosted_room() {
            Some(room) => vec![SessionAction::send(
                Destination::Peer(from),
                Message::DiscoverResponse { room: room.clone() },
            )],
            None => Vec::new(),
        }
    }

    fn on_refresh(&self, from: PeerId, request_id: RequestId, room_id: RoomId) -> Vec<SessionAction> {
        let room = self.open_hosted_room().filter(|room| room.id == room_id).cloned();
        vec![SessionAction::send(
            Destination::Peer(from),
            Message::RefreshResponse { request_id, room },
        )]
    }

    fn on_join_request(
        &mut self,
        from: PeerId,
        request_id: RequestId,
        room_id: RoomId,
        mut player: RoomPlayerInfo,
    ) -> Vec<SessionAction> {
        let reject = |reason: JoinRejection| {
            tracing::info!(role = "host", %room_id, peer = %from, %reason, "join rejected");
            vec![SessionAction::send(
                Destination::Peer(from),
                Message::JoinRejected { request_id, reason },
            )]
        };

        let Some(room) = self.room.as_ref().filter(|room| room.id == room_id && self.role() == Some(Role::Host))
        else {
            return reject(JoinRejection::RoomNotFound);
        };

        // A retransmitted request from a seated guest gets the same answer.
        if let Some(player_id) = self.seat_of(from) {
            return vec![SessionAction::send(
                Destination::Peer(from),
                Message::JoinAccepted {
                    request_id,
                    player_id,
                    room: room.clone(),
                },
            )];
        }
        if self.state.game_running() {
            return reject(JoinRejection::GameInProgress);
        }
        if room.player_count() >= self.config.max_players {
            return reject(JoinRejection::RoomFull);
        }

        player.id = self.allocate_player();
        let player_id = player.id;
        self.seats.insert(player_id, from);
        let Some((previous, updated)) = self.mutate_room(|room| room.add_player(player)) else {
            return Vec::new();
        };
        tracing::info!(role = "host", %room_id, %player_id, peer = %from, "player joined");

        let mut actions = vec![SessionAction::send(
            Destination::Peer(from),
            Message::JoinAccepted {
                request_id,
                player_id,
                room: updated.clone(),
            },
        )];
        actions.extend(self.push_to_guests(Some(from)));
        actions.push(SessionAction::Notify(SessionEvent::RoomInfoUpdated { previous, updated }));
        actions
    }

    fn on_join_accepted(
        &mut self,
        from: PeerId,
        request_id: RequestId,
        player_id: PlayerId,
        room: RoomInfo,
    ) -> Vec<SessionAction> {
        let expected = self.state == SessionState::Joining
            && self
                .pending_join
                .as_ref()
                .is_some_and(|pending| pending.request_id == request_id && pending.room_id == room.id);

        if !expected {
            if self.local_player == Some(player_id) && self.host_peer == Some(from) {
                return Vec::new();
            }
            // The host seated us after we gave up; give the seat back.
            tracing::warn!(role = "guest", room_id = %room.id, %player_id, "releasing seat from abandoned join");
            return vec![SessionAction::send(
                Destination::Peer(from),
                Message::QuitNotice { player_id },
            )];
        }

        tracing::info!(role = "guest", room_id = %room.id, %player_id, "joined room");
        self.pending_join = None;
        self.state = SessionState::RoomOpen(Role::Guest);
        self.local_player = Some(player_id);
        self.host_peer = Some(from);
        self.room = Some(room.clone());
        vec![SessionAction::Notify(SessionEvent::Joined(room))]
    }

    fn on_join_rejected(&mut self, request_id: RequestId, reason: JoinRejection) -> Vec<SessionAction> {
        let expected = self.state == SessionState::Joining
            && self.pending_join.as_ref().is_some_and(|p| p.request_id == request_id);
        if !expected {
            tracing::debug!(%request_id, "ignoring stale join rejection");
            return Vec::new();
        }
        self.fail_join(reason)
    }

    fn on_quit_notice(&mut self, from: PeerId, player_id: PlayerId) -> Vec<SessionAction> {
        if self.role() != Some(Role::Host) || self.seats.get(&player_id) != Some(&from) {
            tracing::warn!(peer = %from, %player_id, "ignoring quit notice for a seat the peer does not hold");
            return Vec::new();
        }
        tracing::info!(role = "host", %player_id, "player quit");
        self.remove_guest(player_id, from)
    }

    fn on_room_push(&mut self, from: PeerId, room: RoomInfo) -> Vec<SessionAction> {
        if !self.is_host_peer(from) {
            tracing::warn!(peer = %from, room_id = %room.id, "ignoring room push from a peer that is not our host");
            return Vec::new();
        }
        let Some(mirror) = &self.room else {
            return Vec::new();
        };
        if mirror.id != room.id || room.revision <= mirror.revision {
            tracing::debug!(room_id = %room.id, revision = room.revision, "ignoring stale room push");
            return Vec::new();
        }

        let departed = mirror.departed(&room);
        let Some(previous) = self.room.replace(room.clone()) else {
            return Vec::new();
        };
        tracing::debug!(role = "guest", room_id = %room.id, revision = room.revision, "room info updated");

        let mut actions = vec![SessionAction::Notify(SessionEvent::RoomInfoUpdated {
            previous,
            updated: room,
        })];
        if self.state.game_running() {
            for player_id in departed {
                tracing::info!(role = "guest", %player_id, "player left the game");
                actions.push(SessionAction::Notify(SessionEvent::PlayerForfeited(player_id)));
            }
        }
        actions
    }

    fn on_room_closed(&mut self, from: PeerId, room_id: RoomId) -> Vec<SessionAction> {
        if !self.is_host_peer(from) || self.room.as_ref().map(|r| r.id) != Some(room_id) {
            return Vec::new();
        }
        tracing::info!(role = "guest", %room_id, "host closed the room");
        self.leave(QuitReason::RoomClosed)
    }

    fn on_invoke(&mut self, from: PeerId, request_id: RequestId, procedure: Procedure) -> Vec<SessionAction> {
        if !self.is_host_peer(from) {
            tracing::warn!(peer = %from, procedure = procedure.name(), "ignoring invoke from a peer that is not our host");
            return Vec::new();
        }
        let ack = SessionAction::send(Destination::Peer(from), Message::InvokeAck { request_id });

        match (procedure, self.state) {
            (Procedure::Start, SessionState::RoomOpen(Role::Guest)) => {
                tracing::info!(role = "guest", "game started");
                self.state = SessionState::InGame(Role::Guest);
                let mut actions = Vec::with_capacity(2);
                if let Some(room) = &self.room {
                    actions.push(SessionAction::Notify(SessionEvent::GameStarted(room.clone())));
                }
                actions.push(ack);
                actions
            }
            // Retransmission: acknowledge again, nothing else.
            (Procedure::Start, SessionState::InGame(Role::Guest)) => vec![ack],
            (procedure, state) => {
                tracing::warn!(procedure = procedure.name(), %state, "ignoring invoke");
                Vec::new()
            }
        }
    }

    fn on_invoke_ack(&mut self, from: PeerId, request_id: RequestId) -> Vec<SessionAction> {
        let expected = self.pending_start.as_ref().is_some_and(|p| p.request_id == request_id);
        if !expected {
            tracing::debug!(peer = %from, %request_id, "ignoring unexpected invoke ack");
            return Vec::new();
        }
        self.release_start_wait(from)
    }

    fn on_option_request(&mut self, from: PeerId, room_id: RoomId, change: OptionChange) -> Vec<SessionAction> {
        let hosting = matches!(self.state, SessionState::Hosting | SessionState::RoomOpen(Role::Host));
        let for_this_room = self.room.as_ref().is_some_and(|room| room.id == room_id);
        if !hosting || !for_this_room || self.seat_of(from).is_none() {
            tracing::warn!(peer = %from, %room_id, "ignoring option request outside an open hosted room");
            return Vec::new();
        }
        if !self.config.accept_guest_option_requests {
            tracing::warn!(role = "host", peer = %from, ?change, "guest option requests are disabled");
            return Vec::new();
        }
        self.apply_host_edit(change).unwrap_or_default()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn refuse(&self, state: SessionState, operation: &'static str) -> SessionError {
        tracing::debug!(%state, operation, "operation refused");
        SessionError::InvalidState { state, operation }
    }

    fn allocate_player(&mut self) -> PlayerId {
        let id = PlayerId::new(self.next_player);
        self.next_player += 1;
        id
    }

    fn seat_of(&self, peer: PeerId) -> Option<PlayerId> {
        self.seats
            .iter()
            .find_map(|(player_id, seat)| (*seat == peer).then_some(*player_id))
    }

    /// The hosted room while it still takes players.
    fn open_hosted_room(&self) -> Option<&RoomInfo> {
        match self.state {
            SessionState::Hosting | SessionState::RoomOpen(Role::Host) => self.room.as_ref(),
            _ => None,
        }
    }

    /// Apply `mutate` to the authoritative room; returns the copies before
    /// and after.
    fn mutate_room(&mut self, mutate: impl FnOnce(&mut RoomInfo)) -> Option<(RoomInfo, RoomInfo)> {
        let room = self.room.as_mut()?;
        let previous = room.clone();
        mutate(&mut *room);
        Some((previous, room.clone()))
    }

    fn push_to_guests(&self, except: Option<PeerId>) -> Vec<SessionAction> {
        let Some(room) = &self.room else {
            return Vec::new();
        };
        self.seats
            .values()
            .filter(|peer| Some(**peer) != except)
            .map(|peer| SessionAction::send(Destination::Peer(*peer), Message::RoomInfoPush { room: room.clone() }))
            .collect()
    }

    fn seat_host_player(&mut self, mut player: RoomPlayerInfo) -> Vec<SessionAction> {
        player.id = self.allocate_player();
        let player_id = player.id;
        let Some((_, updated)) = self.mutate_room(|room| room.add_player(player)) else {
            return Vec::new();
        };
        tracing::info!(role = "host", room_id = %updated.id, %player_id, "host player seated");
        self.local_player = Some(player_id);
        self.state = SessionState::RoomOpen(Role::Host);

        let mut actions = self.push_to_guests(None);
        actions.push(SessionAction::Notify(SessionEvent::Joined(updated)));
        actions
    }

    fn apply_host_edit(&mut self, change: OptionChange) -> Result<Vec<SessionAction>, SessionError> {
        let state = self.state;
        let Some(room) = self.room.as_mut() else {
            return Err(SessionError::InvalidState {
                state,
                operation: "edit options",
            });
        };
        let previous = room.clone();
        let changed = room.apply(change).map_err(|err| {
            tracing::warn!(role = "host", error = %err, "option edit rejected");
            SessionError::from(err)
        })?;
        if !changed {
            return Ok(Vec::new());
        }
        let updated = room.clone();
        tracing::info!(role = "host", room_id = %updated.id, revision = updated.revision, "room options changed");

        let mut actions = self.push_to_guests(None);
        actions.push(SessionAction::Notify(SessionEvent::RoomInfoUpdated { previous, updated }));
        Ok(actions)
    }

    fn remove_guest(&mut self, player_id: PlayerId, peer: PeerId) -> Vec<SessionAction> {
        self.seats.remove(&player_id);
        let Some((previous, updated)) = self.mutate_room(|room| {
            room.remove_player(player_id);
        }) else {
            return Vec::new();
        };
        if previous == updated {
            return Vec::new();
        }

        let mut actions = self.push_to_guests(None);
        actions.push(SessionAction::Notify(SessionEvent::RoomInfoUpdated { previous, updated }));
        if self.state.game_running() {
            actions.push(SessionAction::Notify(SessionEvent::PlayerForfeited(player_id)));
        }
        if self.pending_start.is_some() {
            actions.extend(self.release_start_wait(peer));
        }
        actions
    }

    fn release_start_wait(&mut self, peer: PeerId) -> Vec<SessionAction> {
        let Some(pending) = &mut self.pending_start else {
            return Vec::new();
        };
        pending.waiting.remove(&peer);
        if pending.waiting.is_empty() {
            self.enter_game_as_host()
        } else {
            Vec::new()
        }
    }

    fn enter_game_as_host(&mut self) -> Vec<SessionAction> {
        self.pending_start = None;
        self.state = SessionState::InGame(Role::Host);
        tracing::info!(role = "host", "game started");
        self.room
            .iter()
            .map(|room| SessionAction::Notify(SessionEvent::GameStarted(room.clone())))
            .collect()
    }

    fn fail_join(&mut self, reason: JoinRejection) -> Vec<SessionAction> {
        let resume = self.pending_join.take().map_or(SessionState::Idle, |p| p.resume);
        self.state = resume;
        vec![SessionAction::Notify(SessionEvent::JoinFailed(SessionError::JoinRejected(reason)))]
    }

    fn quit_with(&mut self, reason: QuitReason) -> Result<Vec<SessionAction>, SessionError> {
        match self.state.role() {
            Some(Role::Host) => {
                let mut actions: Vec<SessionAction> = match &self.room {
                    Some(room) => self
                        .seats
                        .values()
                        .map(|peer| SessionAction::send(Destination::Peer(*peer), Message::RoomClosed { room_id: room.id }))
                        .collect(),
                    None => Vec::new(),
                };
                actions.extend(self.leave(reason));
                Ok(actions)
            }
            Some(Role::Guest) => {
                let mut actions = Vec::with_capacity(2);
                if let (Some(host), Some(player_id)) = (self.host_peer, self.local_player) {
                    actions.push(SessionAction::send(Destination::Peer(host), Message::QuitNotice { player_id }));
                }
                actions.extend(self.leave(reason));
                Ok(actions)
            }
            None if self.state == SessionState::Joining => {
                tracing::info!(role = "guest", "join cancelled");
                let resume = self.pending_join.take().map_or(SessionState::Idle, |p| p.resume);
                self.state = resume;
                Ok(Vec::new())
            }
            None => Err(self.refuse(self.state, "quit")),
        }
    }

    /// Drop every trace of the current room and return to `Idle`.
    fn leave(&mut self, reason: QuitReason) -> Vec<SessionAction> {
        let role = self.role().map_or("none", Role::as_str);
        let room_id = self.room.take().map(|room| room.id);
        self.state = SessionState::Idle;
        self.local_player = None;
        self.seats.clear();
        self.pending_start = None;
        self.host_peer = None;
        self.pending_join = None;

        match room_id {
            Some(room_id) => {
                tracing::info!(role, %room_id, ?reason, "left room");
                vec![SessionAction::Notify(SessionEvent::Quit { room_id, reason })]
            }
            None => Vec::new(),
        }
    }
}
