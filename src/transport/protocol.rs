//! Protocol messages.
//!
//! Requests that expect an answer carry a [`RequestId`] the answer echoes,
//! so late or duplicated answers can be recognized and dropped.

use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, RequestId, RoomId};
use crate::room::{JoinRejection, OptionChange, RoomInfo, RoomPlayerInfo};
use crate::witness::WitnessFrame;

/// Remote procedures the host can invoke on guests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Procedure {
    /// Enter the game.
    Start,
}

impl Procedure {
    /// Name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Procedure::Start => "start",
        }
    }
}

/// Every message exchanged by the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// LAN broadcast asking hosts to advertise their rooms.
    DiscoverRequest,
    /// A host advertising its open room.
    DiscoverResponse {
        /// Current room description.
        room: RoomInfo,
    },

    /// Ask a host for a fresh copy of a room.
    RefreshRequest {
        /// Echoed in the response.
        request_id: RequestId,
        /// Room asked about.
        room_id: RoomId,
    },
    /// Answer to [`Message::RefreshRequest`]; `None` means closed or gone.
    RefreshResponse {
        /// Request being answered.
        request_id: RequestId,
        /// Fresh copy, if the room is still open.
        room: Option<RoomInfo>,
    },

    /// Ask to be seated.
    JoinRequest {
        /// Echoed in the answer.
        request_id: RequestId,
        /// Room to join.
        room_id: RoomId,
        /// Joining player (the host assigns the id).
        player: RoomPlayerInfo,
    },
    /// The joiner was seated.
    JoinAccepted {
        /// Request being answered.
        request_id: RequestId,
        /// Id the host assigned.
        player_id: PlayerId,
        /// Canonical room after seating.
        room: RoomInfo,
    },
    /// The joiner was not seated.
    JoinRejected {
        /// Request being answered.
        request_id: RequestId,
        /// Why.
        reason: JoinRejection,
    },

    /// A guest leaves the room.
    QuitNotice {
        /// Leaving player.
        player_id: PlayerId,
    },
    /// Host-pushed authoritative room copy.
    RoomInfoPush {
        /// Replaces the guest's mirror wholesale.
        room: RoomInfo,
    },
    /// The host closed the room.
    RoomClosed {
        /// Closed room.
        room_id: RoomId,
    },

    /// Host invoking a procedure on a guest.
    Invoke {
        /// Echoed in the acknowledgement.
        request_id: RequestId,
        /// Procedure to run.
        procedure: Procedure,
    },
    /// Guest acknowledging an invoke.
    InvokeAck {
        /// Invoke being acknowledged.
        request_id: RequestId,
    },

    /// Guest asking the host to change an option.
    OptionChangeRequest {
        /// Room the change is for.
        room_id: RoomId,
        /// Requested edit.
        change: OptionChange,
    },

    /// A witness in the host's stream.
    Witness {
        /// Frame with sequence number.
        frame: WitnessFrame,
    },
}

impl Message {
    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Message::DiscoverRequest => "discover_request",
            Message::DiscoverResponse { .. } => "discover_response",
            Message::RefreshRequest { .. } => "refresh_request",
            Message::RefreshResponse { .. } => "refresh_response",
            Message::JoinRequest { .. } => "join_request",
            Message::JoinAccepted { .. } => "join_accepted",
            Message::JoinRejected { .. } => "join_rejected",
            Message::QuitNotice { .. } => "quit_notice",
            Message::RoomInfoPush { .. } => "room_info_push",
            Message::RoomClosed { .. } => "room_closed",
            Message::Invoke { .. } => "invoke",
            Message::InvokeAck { .. } => "invoke_ack",
            Message::OptionChangeRequest { .. } => "option_change_request",
            Message::Witness { .. } => "witness",
        }
    }
}
