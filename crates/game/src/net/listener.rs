use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::PlayerId;
use crate::error::NetError;

use super::framing::{FrameDecoder, encode_frame};
use super::stats::NetworkStats;

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub max_clients: usize,
    /// Clients are expected to keepalive well inside this window.
    pub client_timeout_ms: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_clients: 2,
            client_timeout_ms: 5000.0,
        }
    }
}

/// One accepted client connection.
struct ClientConn {
    stream: TcpStream,
    addr: SocketAddr,
    decoder: FrameDecoder,
    last_receive_ms: f64,
    dead: bool,
}

/// Non-blocking accept loop plus per-client framing for the server. Entity
/// ids are assigned at accept time and double as the player ids everywhere
/// else in the simulation.
pub struct ServerEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: EndpointConfig,
    clients: BTreeMap<PlayerId, ClientConn>,
    next_entity_id: PlayerId,
    stats: NetworkStats,
    disconnected: Vec<PlayerId>,
}

impl ServerEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: EndpointConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            config,
            clients: BTreeMap::new(),
            next_entity_id: 1,
            stats: NetworkStats::default(),
            disconnected: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.clients.keys().copied().collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Accept every pending connection, returning the new entity ids. Over
    /// capacity the socket is closed immediately.
    pub fn accept_new(&mut self, now_ms: f64) -> Vec<PlayerId> {
        let mut joined = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.clients.len() >= self.config.max_clients {
                        log::warn!("refusing {addr}: server full");
                        drop(stream);
                        continue;
                    }
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let _ = stream.set_nodelay(true);

                    let id = self.next_entity_id;
                    self.next_entity_id = self.next_entity_id.wrapping_add(1).max(1);
                    self.clients.insert(
                        id,
                        ClientConn {
                            stream,
                            addr,
                            decoder: FrameDecoder::new(),
                            last_receive_ms: now_ms,
                            dead: false,
                        },
                    );
                    log::info!("accepted {addr} as entity {id}");
                    joined.push(id);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    break;
                }
            }
        }
        joined
    }

    /// Read every client, returning complete frames in (entity, payload)
    /// pairs. Broken clients are queued on the disconnect list.
    pub fn poll_messages(&mut self, now_ms: f64) -> Vec<(PlayerId, Vec<u8>)> {
        let mut messages = Vec::new();
        let mut buf = [0u8; 4096];

        for (&id, conn) in self.clients.iter_mut() {
            loop {
                match conn.stream.read(&mut buf) {
                    Ok(0) => {
                        conn.dead = true;
                        break;
                    }
                    Ok(n) => {
                        self.stats.record_receive(n);
                        conn.last_receive_ms = now_ms;
                        conn.decoder.feed(&buf[..n]);
                        loop {
                            match conn.decoder.next_frame() {
                                Ok(Some(frame)) => messages.push((id, frame)),
                                Ok(None) => break,
                                Err(err) => {
                                    log::warn!("entity {id}: {err}");
                                    conn.dead = true;
                                    break;
                                }
                            }
                        }
                        if conn.dead {
                            break;
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        log::warn!("entity {id} read failed: {err}");
                        conn.dead = true;
                        break;
                    }
                }
            }
        }

        self.reap(now_ms);
        messages
    }

    pub fn send_to(&mut self, id: PlayerId, payload: &[u8]) -> Result<(), NetError> {
        let conn = self.clients.get_mut(&id).ok_or(NetError::NotConnected)?;
        let frame = encode_frame(payload);
        match conn.stream.write_all(&frame) {
            Ok(()) => {
                self.stats.record_send(frame.len());
                Ok(())
            }
            Err(err) => {
                conn.dead = true;
                Err(NetError::SendFailed(err.to_string()))
            }
        }
    }

    pub fn broadcast(&mut self, payload: &[u8]) {
        let ids = self.connected_ids();
        for id in ids {
            if let Err(err) = self.send_to(id, payload) {
                log::warn!("broadcast to {id} failed: {err}");
            }
        }
    }

    pub fn disconnect(&mut self, id: PlayerId) {
        if let Some(conn) = self.clients.remove(&id) {
            let _ = conn.stream.shutdown(std::net::Shutdown::Both);
            log::info!("entity {id} ({}) disconnected", conn.addr);
        }
    }

    /// Entities that dropped since the last call, from read errors, closed
    /// sockets, or keepalive timeouts.
    pub fn take_disconnected(&mut self, now_ms: f64) -> Vec<PlayerId> {
        let timeout = self.config.client_timeout_ms;
        for (&id, conn) in self.clients.iter_mut() {
            if now_ms - conn.last_receive_ms > timeout {
                log::info!("entity {id} timed out");
                conn.dead = true;
            }
        }
        self.reap(now_ms);
        std::mem::take(&mut self.disconnected)
    }

    fn reap(&mut self, _now_ms: f64) {
        let dead: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.dead)
            .map(|(&id, _)| id)
            .collect();
        for id in dead {
            if let Some(conn) = self.clients.remove(&id) {
                let _ = conn.stream.shutdown(std::net::Shutdown::Both);
            }
            self.disconnected.push(id);
        }
    }
}
