use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::NetError;
use crate::event::{EventBus, GameEvent};
use crate::protocol::Message;

use super::framing::{FrameDecoder, encode_frame};
use super::stats::NetworkStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    pub keepalive_interval_ms: f64,
    /// No inbound traffic for this long counts as a lost connection; the
    /// peer keepalives every `keepalive_interval_ms`.
    pub idle_timeout_ms: f64,
    pub reconnect_base_delay_ms: f64,
    pub reconnect_max_delay_ms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            keepalive_interval_ms: 1000.0,
            idle_timeout_ms: 5000.0,
            reconnect_base_delay_ms: 500.0,
            reconnect_max_delay_ms: 10_000.0,
        }
    }
}

type MessageHandler = Box<dyn FnMut(&[u8])>;

/// Client side of the reliable session: connect with a fixed deadline,
/// keepalive, handler fan-in, and exponential-backoff reconnect after an
/// unintentional loss. An explicit `disconnect` turns reconnection off for
/// good.
pub struct TransportSession {
    config: SessionConfig,
    server_addr: String,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    state: SessionState,
    reconnect_enabled: bool,
    reconnect_attempts: u32,
    next_reconnect_at_ms: f64,
    last_keepalive_sent_ms: f64,
    last_receive_ms: f64,
    handlers: Vec<MessageHandler>,
    stats: NetworkStats,
}

impl TransportSession {
    pub fn new(server_addr: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            config,
            server_addr: server_addr.into(),
            stream: None,
            decoder: FrameDecoder::new(),
            state: SessionState::Disconnected,
            reconnect_enabled: true,
            reconnect_attempts: 0,
            next_reconnect_at_ms: 0.0,
            last_keepalive_sent_ms: 0.0,
            last_receive_ms: 0.0,
            handlers: Vec::new(),
            stats: NetworkStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Every inbound frame payload is handed to every registered handler.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&[u8]) + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Establish the session, blocking up to the configured deadline.
    pub fn connect(&mut self, now_ms: f64, bus: &mut EventBus) -> Result<(), NetError> {
        self.state = SessionState::Connecting;
        match self.try_connect(now_ms) {
            Ok(()) => {
                self.reconnect_enabled = true;
                self.announce_connected(now_ms, bus);
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Intentional teardown: closes the stream and permanently disables
    /// reconnection.
    pub fn disconnect(&mut self, now_ms: f64, bus: &mut EventBus) {
        self.reconnect_enabled = false;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Disconnected;
            bus.publish(
                now_ms,
                GameEvent::ConnectionLost {
                    reason: "disconnect requested".into(),
                },
            );
        }
        self.decoder.clear();
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        if self.state != SessionState::Connected {
            return Err(NetError::NotConnected);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(NetError::NotConnected);
        };

        let frame = encode_frame(payload);
        match stream.write_all(&frame) {
            Ok(()) => {
                self.stats.record_send(frame.len());
                Ok(())
            }
            Err(err) => Err(NetError::SendFailed(err.to_string())),
        }
    }

    /// Drive I/O: read inbound frames, dispatch handlers, keepalive, and the
    /// reconnect schedule.
    pub fn update(&mut self, now_ms: f64, bus: &mut EventBus) {
        match self.state {
            SessionState::Connected => {
                self.pump_receive(now_ms, bus);

                if self.state != SessionState::Connected {
                    return;
                }

                if now_ms - self.last_receive_ms > self.config.idle_timeout_ms {
                    self.handle_loss("connection timed out", now_ms, bus);
                    return;
                }

                if now_ms - self.last_keepalive_sent_ms >= self.config.keepalive_interval_ms {
                    self.last_keepalive_sent_ms = now_ms;
                    if let Err(err) = self.send(&Message::Keepalive.encode()) {
                        self.handle_loss(&format!("keepalive failed: {err}"), now_ms, bus);
                    }
                }
            }
            SessionState::Reconnecting => {
                if now_ms >= self.next_reconnect_at_ms {
                    self.stats.reconnect_attempts += 1;
                    match self.try_connect(now_ms) {
                        Ok(()) => self.announce_connected(now_ms, bus),
                        Err(err) => {
                            self.reconnect_attempts += 1;
                            let delay = self.backoff_delay_ms();
                            self.next_reconnect_at_ms = now_ms + delay;
                            log::warn!(
                                "reconnect to {} failed ({err}), retrying in {delay:.0} ms",
                                self.server_addr
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn pump_receive(&mut self, now_ms: f64, bus: &mut EventBus) {
        let mut buf = [0u8; 4096];
        let mut frames = Vec::new();

        loop {
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            match stream.read(&mut buf) {
                Ok(0) => {
                    self.handle_loss("closed by peer", now_ms, bus);
                    return;
                }
                Ok(n) => {
                    self.stats.record_receive(n);
                    self.last_receive_ms = now_ms;
                    self.decoder.feed(&buf[..n]);
                    loop {
                        match self.decoder.next_frame() {
                            Ok(Some(frame)) => frames.push(frame),
                            Ok(None) => break,
                            Err(err) => {
                                self.handle_loss(&format!("bad frame: {err}"), now_ms, bus);
                                return;
                            }
                        }
                    }
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    self.handle_loss(&err.to_string(), now_ms, bus);
                    return;
                }
            }
        }

        for frame in frames {
            for handler in &mut self.handlers {
                handler(&frame);
            }
        }
    }

    fn try_connect(&mut self, now_ms: f64) -> Result<(), NetError> {
        let addr = resolve(&self.server_addr)?;
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| NetError::ConnectionFailed(e.to_string()))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| NetError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        self.stream = Some(stream);
        self.decoder.clear();
        self.state = SessionState::Connected;
        self.reconnect_attempts = 0;
        self.last_receive_ms = now_ms;
        self.last_keepalive_sent_ms = now_ms;
        Ok(())
    }

    fn announce_connected(&mut self, now_ms: f64, bus: &mut EventBus) {
        log::info!("connected to {}", self.server_addr);
        bus.publish(
            now_ms,
            GameEvent::ConnectionEstablished {
                player: None,
                rtt_ms: 0.0,
            },
        );
    }

    fn handle_loss(&mut self, reason: &str, now_ms: f64, bus: &mut EventBus) {
        log::warn!("connection lost: {reason}");
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.decoder.clear();
        bus.publish(
            now_ms,
            GameEvent::ConnectionLost {
                reason: reason.to_string(),
            },
        );

        if self.reconnect_enabled {
            self.state = SessionState::Reconnecting;
            self.reconnect_attempts = 0;
            let delay = self.backoff_delay_ms();
            self.next_reconnect_at_ms = now_ms + delay;
            bus.publish(
                now_ms,
                GameEvent::NetworkWarning {
                    message: format!("reconnecting in {delay:.0} ms"),
                },
            );
        } else {
            self.state = SessionState::Disconnected;
        }
    }

    fn backoff_delay_ms(&self) -> f64 {
        let exp = self.config.reconnect_base_delay_ms * 2f64.powi(self.reconnect_attempts as i32);
        exp.min(self.config.reconnect_max_delay_ms)
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, NetError> {
    addr.to_socket_addrs()
        .map_err(|e| NetError::ConnectionFailed(e.to_string()))?
        .next()
        .ok_or_else(|| NetError::ConnectionFailed(format!("could not resolve {addr}")))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn read_one_frame(stream: &mut TcpStream) -> Vec<u8> {
        stream.set_nonblocking(false).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            decoder.feed(&buf[..n]);
            if let Some(frame) = decoder.next_frame().unwrap() {
                return frame;
            }
        }
    }

    #[test]
    fn connect_send_and_receive() {
        let (listener, addr) = listener();
        let mut session = TransportSession::new(addr, SessionConfig::default());
        let mut bus = EventBus::new();

        session.connect(0.0, &mut bus).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        let (mut server_side, _) = listener.accept().unwrap();

        session.send(b"ping").unwrap();
        assert_eq!(read_one_frame(&mut server_side), b"ping");

        let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&received);
        session.on_message(move |frame| sink.borrow_mut().push(frame.to_vec()));

        server_side.write_all(&encode_frame(b"pong")).unwrap();
        server_side.flush().unwrap();

        // Give the kernel a moment, then pump.
        std::thread::sleep(Duration::from_millis(50));
        session.update(10.0, &mut bus);
        assert_eq!(*received.borrow(), vec![b"pong".to_vec()]);
    }

    #[test]
    fn send_requires_connection() {
        let mut session = TransportSession::new("127.0.0.1:9", SessionConfig::default());
        assert!(matches!(session.send(b"x"), Err(NetError::NotConnected)));
    }

    #[test]
    fn keepalive_flows_on_schedule() {
        let (listener, addr) = listener();
        let mut session = TransportSession::new(
            addr,
            SessionConfig {
                keepalive_interval_ms: 100.0,
                ..Default::default()
            },
        );
        let mut bus = EventBus::new();
        session.connect(0.0, &mut bus).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();

        session.update(150.0, &mut bus);
        assert_eq!(read_one_frame(&mut server_side), vec![0x0a]);
    }

    #[test]
    fn intentional_disconnect_disables_reconnect() {
        let (listener, addr) = listener();
        let mut session = TransportSession::new(addr, SessionConfig::default());
        let mut bus = EventBus::new();
        session.connect(0.0, &mut bus).unwrap();
        let _server_side = listener.accept().unwrap();

        session.disconnect(100.0, &mut bus);
        assert_eq!(session.state(), SessionState::Disconnected);

        // However long we wait, no reconnection attempt happens.
        for step in 0..100 {
            session.update(100.0 + step as f64 * 10_000.0, &mut bus);
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.stats().reconnect_attempts, 0);
    }

    #[test]
    fn peer_close_triggers_reconnecting_state() {
        let (listener, addr) = listener();
        let mut session = TransportSession::new(addr, SessionConfig::default());
        let mut bus = EventBus::new();
        session.connect(0.0, &mut bus).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        drop(server_side);

        std::thread::sleep(Duration::from_millis(50));
        session.update(10.0, &mut bus);
        assert_eq!(session.state(), SessionState::Reconnecting);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut session = TransportSession::new(
            "127.0.0.1:9",
            SessionConfig {
                reconnect_base_delay_ms: 500.0,
                reconnect_max_delay_ms: 3000.0,
                ..Default::default()
            },
        );

        session.reconnect_attempts = 0;
        assert_eq!(session.backoff_delay_ms(), 500.0);
        session.reconnect_attempts = 1;
        assert_eq!(session.backoff_delay_ms(), 1000.0);
        session.reconnect_attempts = 2;
        assert_eq!(session.backoff_delay_ms(), 2000.0);
        session.reconnect_attempts = 5;
        assert_eq!(session.backoff_delay_ms(), 3000.0);
    }
}
