use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use arena::event::{EventBus, EventKind, GameEvent};
use arena::match_state::MatchPhase;
use arena::net::{EndpointConfig, ServerEndpoint, SessionConfig, SessionState, TransportSession};
use arena::protocol::{InputPacket, Message, StateSnapshot};

fn endpoint() -> ServerEndpoint {
    ServerEndpoint::bind("127.0.0.1:0", EndpointConfig::default()).unwrap()
}

fn settle() {
    std::thread::sleep(Duration::from_millis(30));
}

#[test]
fn client_and_server_exchange_protocol_messages() {
    let mut server = endpoint();
    let mut session = TransportSession::new(
        server.local_addr().to_string(),
        SessionConfig::default(),
    );
    let mut bus = EventBus::new();

    let established = Rc::new(RefCell::new(false));
    let sink = Rc::clone(&established);
    bus.subscribe(EventKind::ConnectionEstablished, move |_| {
        *sink.borrow_mut() = true;
    });

    session.connect(0.0, &mut bus).unwrap();
    assert!(*established.borrow());
    settle();
    let joined = server.accept_new(0.0);
    assert_eq!(joined.len(), 1);
    let client_id = joined[0];

    // Client -> server: one input packet.
    let mut input = InputPacket::new(1, 1);
    input.movement_y = 1.0;
    input.client_timestamp_ms = 16.0;
    session.send(&Message::Input(input).encode()).unwrap();
    settle();

    let messages = server.poll_messages(1.0);
    assert_eq!(messages.len(), 1);
    let (from, frame) = &messages[0];
    assert_eq!(*from, client_id);
    match Message::decode(frame).unwrap() {
        Message::Input(decoded) => {
            assert_eq!(decoded.sequence_number, 1);
            assert!((decoded.movement_y - 1.0).abs() < 1.0 / 127.0);
        }
        other => panic!("expected input, got {other:?}"),
    }

    // Server -> client: a snapshot and an ack.
    let snapshot = StateSnapshot::new(7, 116.0, MatchPhase::Playing);
    server
        .send_to(client_id, &Message::Snapshot(snapshot).encode())
        .unwrap();
    server
        .send_to(
            client_id,
            &Message::InputAck { sequence_number: 1 }.encode(),
        )
        .unwrap();
    settle();

    let inbound = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&inbound);
    session.on_message(move |frame| {
        sink.borrow_mut().push(Message::decode(frame).unwrap());
    });
    session.update(50.0, &mut bus);

    let inbound = inbound.borrow();
    assert_eq!(inbound.len(), 2);
    assert!(matches!(&inbound[0], Message::Snapshot(s) if s.tick_number == 7));
    assert!(matches!(inbound[1], Message::InputAck { sequence_number: 1 }));
}

#[test]
fn keepalives_keep_a_quiet_client_alive() {
    let mut server = endpoint();
    let mut session = TransportSession::new(
        server.local_addr().to_string(),
        SessionConfig {
            keepalive_interval_ms: 50.0,
            ..Default::default()
        },
    );
    let mut bus = EventBus::new();
    session.connect(0.0, &mut bus).unwrap();
    settle();
    server.accept_new(0.0);

    // The client sends nothing but keepalives; the server keeps refreshing
    // its receive clock and never times the client out.
    for step in 1..=10 {
        session.update(step as f64 * 60.0, &mut bus);
        settle();
        let messages = server.poll_messages(step as f64 * 60.0);
        for (_, frame) in &messages {
            assert!(matches!(Message::decode(frame).unwrap(), Message::Keepalive));
        }
        assert!(server.take_disconnected(step as f64 * 60.0).is_empty());
    }
    assert_eq!(server.client_count(), 1);
}

#[test]
fn intentional_disconnect_is_permanent() {
    let mut server = endpoint();
    let mut session = TransportSession::new(
        server.local_addr().to_string(),
        SessionConfig::default(),
    );
    let mut bus = EventBus::new();

    let lost_reasons = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lost_reasons);
    bus.subscribe(EventKind::ConnectionLost, move |env| {
        if let GameEvent::ConnectionLost { reason } = &env.event {
            sink.borrow_mut().push(reason.clone());
        }
    });

    session.connect(0.0, &mut bus).unwrap();
    settle();
    server.accept_new(0.0);

    session.disconnect(100.0, &mut bus);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(lost_reasons.borrow().len(), 1);

    // No reconnection regardless of elapsed time.
    for hour in 1..=5 {
        session.update(100.0 + hour as f64 * 3_600_000.0, &mut bus);
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.stats().reconnect_attempts, 0);

    settle();
    server.poll_messages(200.0);
    assert_eq!(server.take_disconnected(200.0).len(), 1);
}

#[test]
fn server_loss_flips_session_to_reconnecting() {
    let mut server = endpoint();
    let mut session = TransportSession::new(
        server.local_addr().to_string(),
        SessionConfig::default(),
    );
    let mut bus = EventBus::new();

    let warnings = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&warnings);
    bus.subscribe(EventKind::NetworkWarning, move |env| {
        if let GameEvent::NetworkWarning { message } = &env.event {
            sink.borrow_mut().push(message.clone());
        }
    });

    session.connect(0.0, &mut bus).unwrap();
    settle();
    server.accept_new(0.0);
    drop(server);
    settle();

    session.update(50.0, &mut bus);
    assert_eq!(session.state(), SessionState::Reconnecting);
    assert_eq!(warnings.borrow().len(), 1);
}
