use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use arena::PlayerId;
use arena::event::{EventBus, EventKind, GameEvent};
use arena::map::ArenaMap;
use arena::protocol::{
    MatchEventKind, Message, NO_WINNER, PlayerEventKind, StateSnapshot,
};
use arena::sim::{TickProcessor, TickScheduler};
use arena::spawn::SpawnSystem;

use crate::config::ServerConfig;

/// The authoritative server: accepts up to two clients, feeds their inputs
/// to the tick processor, and broadcasts snapshots, acks and match events.
pub struct GameServer {
    endpoint: arena::net::ServerEndpoint,
    scheduler: TickScheduler,
    processor: TickProcessor,
    bus: EventBus,
    tick_duration_secs: f32,
    due_ticks: Rc<RefCell<Vec<u32>>>,
    wire_events: Rc<RefCell<VecDeque<GameEvent>>>,
    last_acked: HashMap<PlayerId, u32>,
    pending_full_state: Vec<PlayerId>,
    latest_snapshot: Option<StateSnapshot>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let endpoint = arena::net::ServerEndpoint::bind(bind_addr, config.endpoint.clone())?;

        let mut scheduler = TickScheduler::new(config.scheduler.clone());
        let due_ticks: Rc<RefCell<Vec<u32>>> = Rc::default();
        let sink = Rc::clone(&due_ticks);
        scheduler.on_tick(move |tick| {
            sink.borrow_mut().push(tick);
            Ok(())
        });
        let tick_duration_secs = (scheduler.tick_duration_ms() / 1000.0) as f32;
        scheduler.start();

        let processor = TickProcessor::new(
            config.engine.clone(),
            ArenaMap::duel_arena(),
            SpawnSystem::duel_arena_points(),
        );

        // Match lifecycle notifications go out on the wire as MATCH_EVENT
        // frames; collect them as they are published.
        let mut bus = EventBus::new();
        let wire_events: Rc<RefCell<VecDeque<GameEvent>>> = Rc::default();
        for kind in [
            EventKind::CountdownTick,
            EventKind::MatchStart,
            EventKind::MatchEnd,
        ] {
            let sink = Rc::clone(&wire_events);
            bus.subscribe(kind, move |envelope| {
                sink.borrow_mut().push_back(envelope.event.clone());
            });
        }

        bus.publish(0.0, GameEvent::SystemReady { system: "server" });

        Ok(Self {
            endpoint,
            scheduler,
            processor,
            bus,
            tick_duration_secs,
            due_ticks,
            wire_events,
            last_acked: HashMap::new(),
            pending_full_state: Vec::new(),
            latest_snapshot: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn current_tick(&self) -> u32 {
        self.scheduler.current_tick()
    }

    pub fn client_count(&self) -> usize {
        self.endpoint.client_count()
    }

    /// One pass of the outer loop: network in, due simulation ticks, network
    /// out. `now_ms` is milliseconds since server start.
    pub fn update(&mut self, now_ms: f64) {
        self.accept_clients(now_ms);
        self.pump_messages(now_ms);
        self.drop_disconnected(now_ms);

        self.scheduler.update(now_ms, &mut self.bus);
        let due: Vec<u32> = self.due_ticks.borrow_mut().drain(..).collect();
        for tick in due {
            self.step(tick, now_ms);
        }

        self.flush_wire_events();
        self.answer_full_state_requests();
    }

    fn accept_clients(&mut self, now_ms: f64) {
        for id in self.endpoint.accept_new(now_ms) {
            let spawn = match self.processor.select_spawn(id, now_ms, &mut self.bus) {
                Ok(spawn) => spawn,
                Err(err) => {
                    log::error!("no spawn for {id}: {err}");
                    self.endpoint.disconnect(id);
                    continue;
                }
            };
            if let Err(err) =
                self.processor
                    .add_player(id, spawn.position, now_ms, &mut self.bus)
            {
                log::error!("could not add player {id}: {err}");
                self.endpoint.disconnect(id);
                continue;
            }

            // The newcomer hears its own id first, then everyone else hears
            // about the newcomer.
            let joined = Message::PlayerEvent {
                kind: PlayerEventKind::Joined,
                entity_id: id,
            }
            .encode();
            if let Err(err) = self.endpoint.send_to(id, &joined) {
                log::warn!("welcome to {id} failed: {err}");
            }
            for other in self.endpoint.connected_ids() {
                if other != id {
                    let _ = self.endpoint.send_to(other, &joined);
                }
            }
            self.pending_full_state.push(id);
        }
    }

    fn pump_messages(&mut self, now_ms: f64) {
        for (id, frame) in self.endpoint.poll_messages(now_ms) {
            match Message::decode(&frame) {
                Ok(Message::Input(packet)) => {
                    self.processor.queue_input(id, packet, now_ms, &mut self.bus);
                }
                Ok(Message::ClockSyncRequest { client_send_ms }) => {
                    let reply = Message::ClockSyncResponse {
                        client_send_ms,
                        server_time_ms: now_ms,
                    };
                    let _ = self.endpoint.send_to(id, &reply.encode());
                }
                Ok(Message::FullStateRequest) => self.pending_full_state.push(id),
                Ok(Message::Keepalive) => {}
                Ok(other) => log::debug!("entity {id} sent unexpected {other:?}"),
                Err(err) => log::warn!("entity {id} sent garbage: {err}"),
            }
        }
    }

    fn drop_disconnected(&mut self, now_ms: f64) {
        for id in self.endpoint.take_disconnected(now_ms) {
            self.processor.remove_player(id, now_ms, &mut self.bus);
            self.last_acked.remove(&id);
            let left = Message::PlayerEvent {
                kind: PlayerEventKind::Left,
                entity_id: id,
            }
            .encode();
            self.endpoint.broadcast(&left);
        }
    }

    fn step(&mut self, tick: u32, now_ms: f64) {
        let snapshot =
            self.processor
                .process_tick(tick, self.tick_duration_secs, now_ms, &mut self.bus);

        for id in self.endpoint.connected_ids() {
            let Some(state) = self.processor.player_state(id) else {
                continue;
            };
            let seq = state.last_processed_sequence;
            if seq != 0 && self.last_acked.get(&id) != Some(&seq) {
                self.last_acked.insert(id, seq);
                let ack = Message::InputAck {
                    sequence_number: seq,
                };
                let _ = self.endpoint.send_to(id, &ack.encode());
            }
        }

        let frame = Message::Snapshot(snapshot.clone()).encode();
        self.endpoint.broadcast(&frame);
        self.latest_snapshot = Some(snapshot);

        for id in self.processor.take_pending_kicks() {
            let kicked = Message::PlayerEvent {
                kind: PlayerEventKind::Kicked,
                entity_id: id,
            }
            .encode();
            self.endpoint.broadcast(&kicked);
            self.endpoint.disconnect(id);
            self.processor.remove_player(id, now_ms, &mut self.bus);
            self.last_acked.remove(&id);
        }
    }

    fn flush_wire_events(&mut self) {
        loop {
            let event = self.wire_events.borrow_mut().pop_front();
            let Some(event) = event else { break };
            let message = match event {
                GameEvent::CountdownTick { seconds_left } => Message::MatchEvent {
                    kind: MatchEventKind::CountdownTick,
                    value: seconds_left,
                },
                GameEvent::MatchStart => Message::MatchEvent {
                    kind: MatchEventKind::Start,
                    value: 0,
                },
                GameEvent::MatchEnd { winner, .. } => Message::MatchEvent {
                    kind: MatchEventKind::End,
                    value: winner.unwrap_or(NO_WINNER) as u32,
                },
                _ => continue,
            };
            self.endpoint.broadcast(&message.encode());
        }
    }

    fn answer_full_state_requests(&mut self) {
        if self.pending_full_state.is_empty() {
            return;
        }
        let Some(snapshot) = &self.latest_snapshot else {
            return;
        };
        let frame = Message::Snapshot(snapshot.clone()).encode();
        for id in std::mem::take(&mut self.pending_full_state) {
            let _ = self.endpoint.send_to(id, &frame);
        }
    }
}
