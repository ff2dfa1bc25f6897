//! LAN room discovery.
//!
//! The directory keeps the list of rooms a searching player can join. Two
//! independent timers drive it:
//!
//! - **Discovery**: broadcast a [`Message::DiscoverRequest`]; every
//!   advertised room is inserted or replaced in place by id.
//! - **Refresh**: ask each listed room's host for a fresh copy. A `None`
//!   answer, or no answer by the next refresh tick, removes the room.
//!
//! Answers are reconciled by room id, never by arrival order, and only
//! against rooms still listed: a late answer for a room that was removed in
//! the meantime changes nothing.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::{NetworkConfig, RequestId, RequestIdAllocator, RoomId, Timer};
use crate::transport::{Destination, Message, Outbound};

use super::info::RoomInfo;

/// Why a room left the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    /// The host answered a refresh with "closed" or did not answer at all.
    Unreachable,
    /// The room is the one this process hosts.
    HostedLocally,
    /// The list was flushed.
    Flushed,
    /// Removed by the caller (for example after quitting it).
    Forgotten,
}

/// Change to the directory listing, for presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// A room appeared.
    Found(RoomInfo),
    /// A listed room changed; it keeps its position.
    Updated(RoomInfo),
    /// A room disappeared.
    Removed {
        /// The removed room.
        room_id: RoomId,
        /// Why.
        reason: RemovalReason,
    },
}

/// Events and messages produced by one directory operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryOutput {
    /// Listing changes, in order.
    pub events: Vec<DirectoryEvent>,
    /// Messages to send.
    pub outbound: Vec<Outbound>,
}

impl DirectoryOutput {
    /// True if the operation produced nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.outbound.is_empty()
    }
}

/// The locally known set of discoverable rooms.
///
/// ## Example
///
/// ```
/// use card_sync::core::{NetworkConfig, RoomId};
/// use card_sync::room::{DirectoryEvent, RoomDirectory, RoomInfo, RoomOptions};
///
/// let mut directory = RoomDirectory::new(&NetworkConfig::default());
/// let start = directory.start();
/// assert_eq!(start.outbound.len(), 1); // immediate discovery broadcast
///
/// let room = RoomInfo::new(RoomId::new(1), "10.0.0.7:32810".parse().unwrap(), RoomOptions::default());
/// assert!(matches!(directory.on_discovered(room), Some(DirectoryEvent::Found(_))));
/// assert_eq!(directory.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct RoomDirectory {
    rooms: Vec<RoomInfo>,
    hosted_room: Option<RoomId>,
    port: u16,
    discovery: Timer,
    refresh: Timer,
    /// Outstanding refresh requests.
    pending: FxHashMap<RequestId, RoomId>,
    requests: RequestIdAllocator,
}

impl RoomDirectory {
    /// Create a stopped directory.
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            rooms: Vec::new(),
            hosted_room: None,
            port: config.discovery_port,
            discovery: Timer::new(config.discovery_interval()),
            refresh: Timer::new(config.refresh_interval()),
            pending: FxHashMap::default(),
            requests: RequestIdAllocator::new(),
        }
    }

    /// Listed rooms, in discovery order.
    #[must_use]
    pub fn rooms(&self) -> &[RoomInfo] {
        &self.rooms
    }

    /// Look up a listed room.
    #[must_use]
    pub fn get(&self, id: RoomId) -> Option<&RoomInfo> {
        self.rooms.iter().find(|room| room.id == id)
    }

    /// Number of listed rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True if no room is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Whether discovery is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.discovery.is_running()
    }

    /// The room this process hosts, never listed.
    #[must_use]
    pub fn hosted_room(&self) -> Option<RoomId> {
        self.hosted_room
    }

    /// Start discovery and refresh, broadcasting immediately.
    pub fn start(&mut self) -> DirectoryOutput {
        tracing::debug!(port = self.port, "room discovery started");
        self.discovery.start();
        self.refresh.start();
        DirectoryOutput {
            events: Vec::new(),
            outbound: vec![self.broadcast()],
        }
    }

    /// Stop both timers. Answers to requests already sent are ignored.
    pub fn stop(&mut self) {
        tracing::debug!("room discovery stopped");
        self.discovery.stop();
        self.refresh.stop();
        self.pending.clear();
    }

    /// Advance the timers.
    pub fn tick(&mut self, elapsed: Duration) -> DirectoryOutput {
        let mut output = DirectoryOutput::default();
        if self.discovery.advance(elapsed) {
            output.outbound.push(self.broadcast());
        }
        if self.refresh.advance(elapsed) {
            self.expire_unanswered(&mut output.events);
            for room in &self.rooms {
                let request_id = self.requests.allocate();
                self.pending.insert(request_id, room.id);
                output.outbound.push(Outbound::new(
                    Destination::Host(room.host),
                    Message::RefreshRequest {
                        request_id,
                        room_id: room.id,
                    },
                ));
            }
        }
        output
    }

    /// Reconcile a room advertised in answer to a broadcast.
    pub fn on_discovered(&mut self, room: RoomInfo) -> Option<DirectoryEvent> {
        if !self.is_running() {
            tracing::debug!(room_id = %room.id, "ignoring discovery answer while stopped");
            return None;
        }
        if Some(room.id) == self.hosted_room {
            return self.remove(room.id, RemovalReason::HostedLocally);
        }
        match self.position(room.id) {
            Some(index) if self.rooms[index] == room => None,
            Some(index) => {
                self.rooms[index] = room.clone();
                Some(DirectoryEvent::Updated(room))
            }
            None => {
                tracing::debug!(room_id = %room.id, host = %room.host, "room found");
                self.rooms.push(room.clone());
                Some(DirectoryEvent::Found(room))
            }
        }
    }

    /// Reconcile the answer to a refresh request.
    pub fn on_refreshed(&mut self, request_id: RequestId, room: Option<RoomInfo>) -> Option<DirectoryEvent> {
        let Some(room_id) = self.pending.remove(&request_id) else {
            tracing::debug!(%request_id, "ignoring unsolicited refresh answer");
            return None;
        };
        let index = self.position(room_id)?;

        match room {
            None => self.remove(room_id, RemovalReason::Unreachable),
            Some(room) if room.id != room_id => {
                tracing::warn!(%room_id, answered = %room.id, "refresh answered for another room");
                None
            }
            Some(room) if Some(room.id) == self.hosted_room => self.remove(room_id, RemovalReason::HostedLocally),
            Some(room) if self.rooms[index] == room => None,
            Some(room) => {
                self.rooms[index] = room.clone();
                Some(DirectoryEvent::Updated(room))
            }
        }
    }

    /// Record the room this process hosts (or `None` once it closes) and
    /// unlist it.
    pub fn set_hosted_room(&mut self, room_id: Option<RoomId>) -> Option<DirectoryEvent> {
        self.hosted_room = room_id;
        room_id.and_then(|id| self.remove(id, RemovalReason::HostedLocally))
    }

    /// Clear the list and broadcast right away.
    pub fn flush(&mut self) -> DirectoryOutput {
        self.pending.clear();
        let events = self
            .rooms
            .drain(..)
            .map(|room| DirectoryEvent::Removed {
                room_id: room.id,
                reason: RemovalReason::Flushed,
            })
            .collect();
        let mut outbound = Vec::new();
        if self.is_running() {
            self.discovery.start();
            outbound.push(self.broadcast());
        }
        DirectoryOutput { events, outbound }
    }

    /// Remove a room from outside (for example after quitting it).
    /// Answers already in flight for it become no-ops.
    pub fn forget(&mut self, room_id: RoomId) -> Option<DirectoryEvent> {
        self.remove(room_id, RemovalReason::Forgotten)
    }

    fn broadcast(&self) -> Outbound {
        Outbound::new(Destination::Broadcast { port: self.port }, Message::DiscoverRequest)
    }

    fn position(&self, room_id: RoomId) -> Option<usize> {
        self.rooms.iter().position(|room| room.id == room_id)
    }

    fn remove(&mut self, room_id: RoomId, reason: RemovalReason) -> Option<DirectoryEvent> {
        self.pending.retain(|_, pending| *pending != room_id);
        let index = self.position(room_id)?;
        self.rooms.remove(index);
        tracing::debug!(%room_id, ?reason, "room removed");
        Some(DirectoryEvent::Removed { room_id, reason })
    }

    /// Rooms whose previous refresh is still unanswered are gone.
    fn expire_unanswered(&mut self, events: &mut Vec<DirectoryEvent>) {
        let mut stale: Vec<RoomId> = self.pending.drain().map(|(_, room_id)| room_id).collect();
        stale.sort_unstable();
        stale.dedup();
        for room_id in stale {
            events.extend(self.remove(room_id, RemovalReason::Unreachable));
        }
    }
}
