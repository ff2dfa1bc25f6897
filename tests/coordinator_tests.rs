//! Coordinator integration tests.
//!
//! Several processes, each with its own session, directory, dispatcher
//! and game board, talk over an in-memory network. Every process is seen
//! by the others as `PeerId(index + 1)`.

use std::net::SocketAddr;
use std::time::Duration;

use card_sync::coordinator::{NetworkCoordinator, Presentation};
use card_sync::core::{NetworkConfig, PeerId, PlayerId, RoomId, SessionRng};
use card_sync::room::{
    JoinRejection, QuitReason, RemovalReason, Role, RoomDirectory, RoomInfo, RoomPlayerInfo, RoomSession,
    SessionError, SessionState,
};
use card_sync::transport::{Destination, Message, Transport, TransportError};
use card_sync::witness::{
    CompletionTicket, DesyncError, FnHandler, Handled, SkippedWitness, WitnessDispatcher, WitnessFrame,
    WitnessHandlerRegistry, WitnessKind, WitnessRecord, WitnessVariables,
};
use card_sync::Error;

// =============================================================================
// Test harness
// =============================================================================

#[derive(Default)]
struct Board {
    applied: Vec<i64>,
    animations: Vec<CompletionTicket>,
}

/// What the presentation layer was told.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Seen {
    RoomFound(RoomId),
    RoomRemoved(RoomId, RemovalReason),
    RoomOpened(RoomId),
    Joined(RoomId),
    JoinFailed(SessionError),
    Forfeit(PlayerId),
    GameStart,
    Quit(RoomId, QuitReason),
    Skipped(u64),
    Desync(u64),
}

#[derive(Default)]
struct Log(Vec<Seen>);

impl Presentation for Log {
    fn on_room_found(&mut self, room: &RoomInfo) {
        self.0.push(Seen::RoomFound(room.id));
    }

    fn on_room_removed(&mut self, room_id: RoomId, reason: RemovalReason) {
        self.0.push(Seen::RoomRemoved(room_id, reason));
    }

    fn on_room_opened(&mut self, room: &RoomInfo) {
        self.0.push(Seen::RoomOpened(room.id));
    }

    fn on_join_room(&mut self, room: &RoomInfo) {
        self.0.push(Seen::Joined(room.id));
    }

    fn on_join_failed(&mut self, error: &SessionError) {
        self.0.push(Seen::JoinFailed(error.clone()));
    }

    fn on_player_forfeit(&mut self, player: PlayerId) {
        self.0.push(Seen::Forfeit(player));
    }

    fn on_game_start(&mut self, _room: &RoomInfo) {
        self.0.push(Seen::GameStart);
    }

    fn on_quit_room(&mut self, room_id: RoomId, reason: QuitReason) {
        self.0.push(Seen::Quit(room_id, reason));
    }

    fn on_witness_skipped(&mut self, skipped: &SkippedWitness) {
        self.0.push(Seen::Skipped(skipped.sequence));
    }

    fn on_desync(&mut self, error: &DesyncError) {
        self.0.push(Seen::Desync(error.sequence));
    }
}

/// Records sends; refuses hosts nobody listens on.
#[derive(Default)]
struct Outbox {
    listening: Vec<SocketAddr>,
    sent: Vec<(Destination, Message)>,
}

impl Transport for Outbox {
    fn send(&mut self, to: Destination, message: Message) -> Result<(), TransportError> {
        if let Destination::Host(addr) = to {
            if !self.listening.contains(&addr) {
                return Err(TransportError::Unreachable(to));
            }
        }
        self.sent.push((to, message));
        Ok(())
    }
}

struct Node {
    addr: SocketAddr,
    session: RoomSession,
    directory: RoomDirectory,
    dispatcher: WitnessDispatcher<Board>,
    board: Board,
    outbox: Outbox,
    log: Log,
}

impl Node {
    fn new(index: usize, config: &NetworkConfig) -> Self {
        let registry = WitnessHandlerRegistry::<Board>::new()
            .with(FnHandler::new(WitnessKind::TurnStart, |w, board: &mut Board, _| {
                board.applied.push(w.int("playerIndex", -1));
                Ok(Handled::Consumed)
            }))
            .unwrap()
            .with(FnHandler::new(WitnessKind::Draw, |w, board: &mut Board, ticket| {
                board.applied.push(w.int("cardRID", -1));
                board.animations.push(ticket);
                Ok(Handled::Deferred)
            }))
            .unwrap();

        Self {
            addr: format!("10.0.0.{}:40000", index + 1).parse().unwrap(),
            session: RoomSession::new(config.clone(), SessionRng::new(index as u64 + 1)),
            directory: RoomDirectory::new(config),
            dispatcher: WitnessDispatcher::new(registry, config.reorder_window),
            board: Board::default(),
            outbox: Outbox::default(),
            log: Log::default(),
        }
    }

    fn coordinator(&mut self) -> NetworkCoordinator<'_, Board, Outbox, Log> {
        NetworkCoordinator::new(
            &mut self.session,
            &mut self.directory,
            &mut self.dispatcher,
            &mut self.board,
            &mut self.outbox,
            &mut self.log,
        )
    }

    fn player(&self) -> RoomPlayerInfo {
        RoomPlayerInfo::new(self.addr.to_string(), vec![1, 2, 3])
    }

    /// Finish every open animation, oldest first.
    fn finish_animations(&mut self) {
        while !self.board.animations.is_empty() {
            let ticket = self.board.animations.remove(0);
            self.coordinator().complete_witness(ticket).unwrap();
        }
    }
}

struct Network {
    nodes: Vec<Node>,
}

impl Network {
    fn new(count: usize) -> Self {
        let config = NetworkConfig::default().with_discovery_port(40000);
        let mut nodes: Vec<Node> = (0..count).map(|index| Node::new(index, &config)).collect();
        let addrs: Vec<SocketAddr> = nodes.iter().map(|node| node.addr).collect();
        for node in &mut nodes {
            node.outbox.listening = addrs.clone();
        }
        Self { nodes }
    }

    fn peer(index: usize) -> PeerId {
        PeerId::new(index as u64 + 1)
    }

    fn targets(&self, sender: usize, to: Destination) -> Vec<usize> {
        match to {
            Destination::Host(addr) => self.nodes.iter().position(|node| node.addr == addr).into_iter().collect(),
            Destination::Peer(peer) => vec![peer.raw() as usize - 1],
            Destination::Broadcast { .. } => (0..self.nodes.len()).filter(|index| *index != sender).collect(),
        }
    }

    /// Deliver until every outbox is empty.
    fn settle(&mut self) {
        loop {
            let mut delivered = false;
            for sender in 0..self.nodes.len() {
                let sent = std::mem::take(&mut self.nodes[sender].outbox.sent);
                for (to, message) in sent {
                    delivered = true;
                    for target in self.targets(sender, to) {
                        self.nodes[target]
                            .coordinator()
                            .handle_message(Self::peer(sender), message.clone());
                    }
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Node 0 hosts; every other node finds the room and joins it.
    fn seated(count: usize) -> (Self, RoomId) {
        let mut net = Self::new(count);
        let host = net.nodes[0].player();
        let host_addr = net.nodes[0].addr;
        let room_id = net.nodes[0].coordinator().create_room(host_addr, host).unwrap();

        for index in 1..count {
            net.nodes[index].coordinator().find_rooms().unwrap();
            net.settle();
            let room = net.nodes[index].directory.get(room_id).cloned().unwrap();
            let player = net.nodes[index].player();
            net.nodes[index].coordinator().join_room(&room, player).unwrap();
            net.settle();
        }
        (net, room_id)
    }
}

fn turn_start(player: i64) -> WitnessRecord {
    WitnessRecord::builder(WitnessKind::TurnStart)
        .var("playerIndex", player)
        .build()
        .unwrap()
}

fn draw(card: i64) -> WitnessRecord {
    WitnessRecord::builder(WitnessKind::Draw)
        .var("playerIndex", 0i64)
        .var("cardRID", card)
        .build()
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

/// Test the whole lifecycle: discovery, join, start, witness replay, quit.
#[test]
fn test_full_game_over_loopback() {
    let (mut net, room_id) = Network::seated(3);

    for guest in &net.nodes[1..] {
        assert_eq!(guest.session.state(), SessionState::RoomOpen(Role::Guest));
        assert!(guest.log.0.contains(&Seen::RoomFound(room_id)));
        assert!(guest.log.0.contains(&Seen::Joined(room_id)));
        assert!(!guest.directory.is_running());
        assert_eq!(guest.session.room(), net.nodes[0].session.room());
    }
    assert_eq!(net.nodes[0].session.room().unwrap().player_count(), 3);

    net.nodes[0].coordinator().start().unwrap();
    net.settle();
    for node in &net.nodes {
        assert!(node.session.state().game_running());
        assert_eq!(node.log.0.iter().filter(|seen| **seen == Seen::GameStart).count(), 1);
    }
    assert_eq!(net.nodes[0].session.state(), SessionState::InGame(Role::Host));

    {
        let mut host = net.nodes[0].coordinator();
        host.dispatch_witness(turn_start(0)).unwrap();
        host.dispatch_witness(draw(5)).unwrap();
        // Queued behind the draw animation.
        host.dispatch_witness(turn_start(1)).unwrap();
    }
    net.settle();

    for node in &net.nodes {
        assert_eq!(node.board.applied, vec![0, 5]);
        assert_eq!(node.board.animations.len(), 1);
    }

    for node in &mut net.nodes {
        node.finish_animations();
        assert_eq!(node.board.applied, vec![0, 5, 1]);
        assert!(node.dispatcher.is_idle());
    }

    // A guest leaves mid-game: everyone else sees one forfeit.
    let leaving = net.nodes[2].session.local_player().unwrap();
    net.nodes[2].coordinator().quit_room().unwrap();
    net.settle();
    assert_eq!(net.nodes[2].session.state(), SessionState::Idle);
    for node in &net.nodes[..2] {
        assert_eq!(node.log.0.iter().filter(|seen| **seen == Seen::Forfeit(leaving)).count(), 1);
    }

    net.nodes[0].coordinator().game_ended().unwrap();
    net.settle();
    assert_eq!(net.nodes[0].log.0.last(), Some(&Seen::Quit(room_id, QuitReason::GameEnded)));
    assert_eq!(net.nodes[1].log.0.last(), Some(&Seen::Quit(room_id, QuitReason::RoomClosed)));
    assert!(net.nodes.iter().all(|node| node.session.state() == SessionState::Idle));
    assert_eq!(net.nodes[0].directory.hosted_room(), None);
}

#[test]
fn test_host_never_lists_own_room() {
    let mut net = Network::new(2);
    let host_addr = net.nodes[0].addr;
    let player = net.nodes[0].player();
    let room_id = net.nodes[0].coordinator().create_room(host_addr, player).unwrap();

    // The host answers discovery but never lists its own room.
    net.nodes[1].coordinator().find_rooms().unwrap();
    net.settle();
    assert!(net.nodes[0].directory.is_empty());
    assert_eq!(net.nodes[0].directory.hosted_room(), Some(room_id));
    assert!(net.nodes[1].directory.get(room_id).is_some());
}

#[test]
fn test_closed_room_leaves_directory_on_refresh() {
    let mut net = Network::new(2);
    let host_addr = net.nodes[0].addr;
    let player = net.nodes[0].player();
    let room_id = net.nodes[0].coordinator().create_room(host_addr, player).unwrap();

    net.nodes[1].coordinator().find_rooms().unwrap();
    net.settle();
    assert_eq!(net.nodes[1].directory.len(), 1);

    net.nodes[0].coordinator().quit_room().unwrap();
    net.nodes[1].coordinator().tick(Duration::from_millis(1000));
    net.settle();

    assert!(net.nodes[1].directory.is_empty());
    assert!(net.nodes[1]
        .log
        .0
        .contains(&Seen::RoomRemoved(room_id, RemovalReason::Unreachable)));
}

#[test]
fn test_unreachable_host_fails_join() {
    let mut net = Network::new(1);
    let elsewhere = RoomInfo::new(RoomId::new(77), "192.168.9.9:40000".parse().unwrap(), Default::default());
    let player = net.nodes[0].player();

    net.nodes[0].coordinator().join_room(&elsewhere, player).unwrap();

    assert_eq!(net.nodes[0].session.state(), SessionState::Idle);
    assert_eq!(
        net.nodes[0].log.0,
        vec![Seen::JoinFailed(SessionError::JoinRejected(JoinRejection::Unreachable))]
    );
}

#[test]
fn test_witness_rules_by_state() {
    let (mut net, _) = Network::seated(2);

    // Lobby: no stream yet.
    let err = net.nodes[0].coordinator().dispatch_witness(turn_start(0)).unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::InvalidState { .. })));

    // Guests never produce witnesses.
    let err = net.nodes[1].coordinator().dispatch_witness(turn_start(0)).unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::NotHost)));

    // Outside any room the stream is local.
    let mut solo = Network::new(1);
    solo.nodes[0].coordinator().dispatch_witness(turn_start(3)).unwrap();
    assert_eq!(solo.nodes[0].board.applied, vec![3]);
    assert!(solo.nodes[0].outbox.sent.is_empty());
}

#[test]
fn test_witness_from_non_host_is_ignored() {
    let (mut net, _) = Network::seated(3);
    net.nodes[0].coordinator().start().unwrap();
    net.settle();

    let frame = turn_start(9).to_frame(0);
    net.nodes[1]
        .coordinator()
        .handle_message(Network::peer(2), Message::Witness { frame });
    assert!(net.nodes[1].board.applied.is_empty());
    assert_eq!(net.nodes[1].dispatcher.next_sequence(), 0);
}

#[test]
fn test_unknown_witness_is_skipped_on_guest() {
    let (mut net, _) = Network::seated(2);
    net.nodes[0].coordinator().start().unwrap();
    net.settle();

    let unknown = WitnessFrame {
        sequence: 0,
        name: "onTeleport".to_string(),
        variables: WitnessVariables::new(),
    };
    let mut guest = net.nodes[1].coordinator();
    guest.handle_message(Network::peer(0), Message::Witness { frame: unknown });
    guest.handle_message(Network::peer(0), Message::Witness { frame: turn_start(4).to_frame(1) });
    drop(guest);

    assert_eq!(net.nodes[1].log.0.last(), Some(&Seen::Skipped(0)));
    assert_eq!(net.nodes[1].board.applied, vec![4]);
}

#[test]
fn test_desync_tears_session_down() {
    let (mut net, room_id) = Network::seated(2);
    net.nodes[0].coordinator().start().unwrap();
    net.settle();

    // An `onDraw` without its variables cannot be applied.
    let malformed = WitnessFrame {
        sequence: 0,
        name: "onDraw".to_string(),
        variables: WitnessVariables::new(),
    };
    net.nodes[1]
        .coordinator()
        .handle_message(Network::peer(0), Message::Witness { frame: malformed });

    let log = &net.nodes[1].log.0;
    let desync = log.iter().position(|seen| *seen == Seen::Desync(0)).unwrap();
    assert!(log[desync..].contains(&Seen::Quit(room_id, QuitReason::Local)));
    assert_eq!(net.nodes[1].session.state(), SessionState::Idle);
    assert!(net.nodes[1].dispatcher.desync().is_none());

    // The host sees the guest leave a running game.
    let guest_player = PlayerId::new(2);
    net.settle();
    assert!(net.nodes[0].log.0.contains(&Seen::Forfeit(guest_player)));
}
