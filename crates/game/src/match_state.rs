use std::collections::BTreeMap;

use crate::PlayerId;
use crate::event::{EventBus, GameEvent};

/// Phase of a single match session. The numeric values are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchPhase {
    Waiting = 0,
    Countdown = 1,
    Playing = 2,
    Ended = 3,
    Cleanup = 4,
}

impl MatchPhase {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Waiting),
            1 => Some(Self::Countdown),
            2 => Some(Self::Playing),
            3 => Some(Self::Ended),
            4 => Some(Self::Cleanup),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Playing => "playing",
            Self::Ended => "ended",
            Self::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub required_players: usize,
    pub countdown_duration_ms: f64,
    pub kills_to_win: u32,
    pub results_duration_ms: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            required_players: 2,
            countdown_duration_ms: 3000.0,
            kills_to_win: 10,
            results_duration_ms: 5000.0,
        }
    }
}

/// Drives the waiting → countdown → playing → ended → cleanup lifecycle.
/// Only the transitions implemented here are legal; everything else is
/// rejected by construction.
pub struct MatchStateMachine {
    config: MatchConfig,
    phase: MatchPhase,
    phase_started_ms: f64,
    connected: Vec<PlayerId>,
    scores: BTreeMap<PlayerId, u32>,
    winner: Option<PlayerId>,
    last_countdown_second: u32,
}

impl MatchStateMachine {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config,
            phase: MatchPhase::Waiting,
            phase_started_ms: 0.0,
            connected: Vec::new(),
            scores: BTreeMap::new(),
            winner: None,
            last_countdown_second: u32::MAX,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn winner_id(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.scores
    }

    pub fn score(&self, player: PlayerId) -> u32 {
        self.scores.get(&player).copied().unwrap_or(0)
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn player_connected(&mut self, player: PlayerId, now_ms: f64, bus: &mut EventBus) {
        if self.connected.contains(&player) {
            return;
        }
        self.connected.push(player);
        self.scores.insert(player, 0);
        bus.publish(now_ms, GameEvent::PlayerConnected { player });

        if self.phase == MatchPhase::Waiting && self.connected.len() >= self.config.required_players
        {
            self.transition(MatchPhase::Countdown, now_ms, bus);
        }
    }

    pub fn player_disconnected(&mut self, player: PlayerId, now_ms: f64, bus: &mut EventBus) {
        let Some(index) = self.connected.iter().position(|&p| p == player) else {
            return;
        };
        self.connected.remove(index);
        bus.publish(now_ms, GameEvent::PlayerDisconnected { player });

        match self.phase {
            MatchPhase::Countdown if self.connected.len() < self.config.required_players => {
                self.transition(MatchPhase::Waiting, now_ms, bus);
            }
            MatchPhase::Playing if self.connected.is_empty() => {
                // Nobody left to show results to.
                self.transition(MatchPhase::Ended, now_ms, bus);
                self.transition(MatchPhase::Cleanup, now_ms, bus);
            }
            MatchPhase::Playing if self.connected.len() < self.config.required_players => {
                self.winner = self.connected.first().copied();
                self.transition(MatchPhase::Ended, now_ms, bus);
            }
            _ => {}
        }
    }

    /// Kill recording is a no-op outside `playing`.
    pub fn record_kill(&mut self, killer: PlayerId, victim: PlayerId, now_ms: f64, bus: &mut EventBus) {
        if self.phase != MatchPhase::Playing {
            return;
        }

        let score = self.scores.entry(killer).or_insert(0);
        *score += 1;
        let score = *score;
        bus.publish(now_ms, GameEvent::KillConfirmed { killer, victim });

        if score >= self.config.kills_to_win {
            self.winner = Some(killer);
            self.transition(MatchPhase::Ended, now_ms, bus);
        }
    }

    pub fn update(&mut self, now_ms: f64, bus: &mut EventBus) {
        match self.phase {
            MatchPhase::Countdown => {
                let elapsed = now_ms - self.phase_started_ms;
                if elapsed >= self.config.countdown_duration_ms {
                    self.transition(MatchPhase::Playing, now_ms, bus);
                } else {
                    let remaining_ms = self.config.countdown_duration_ms - elapsed;
                    let seconds_left = (remaining_ms / 1000.0).ceil() as u32;
                    if seconds_left != self.last_countdown_second {
                        self.last_countdown_second = seconds_left;
                        bus.publish(now_ms, GameEvent::CountdownTick { seconds_left });
                    }
                }
            }
            MatchPhase::Ended => {
                if now_ms - self.phase_started_ms >= self.config.results_duration_ms {
                    self.transition(MatchPhase::Cleanup, now_ms, bus);
                }
            }
            _ => {}
        }
    }

    fn transition(&mut self, to: MatchPhase, now_ms: f64, bus: &mut EventBus) {
        let from = self.phase;
        debug_assert!(is_legal(from, to), "illegal transition {from:?} -> {to:?}");
        self.phase = to;
        self.phase_started_ms = now_ms;

        bus.publish(now_ms, GameEvent::MatchStateChanged { from, to });

        match to {
            MatchPhase::Countdown => {
                self.last_countdown_second = u32::MAX;
            }
            MatchPhase::Playing => {
                for score in self.scores.values_mut() {
                    *score = 0;
                }
                self.winner = None;
                bus.publish(now_ms, GameEvent::MatchStart);
            }
            MatchPhase::Ended => {
                bus.publish(
                    now_ms,
                    GameEvent::MatchEnd {
                        winner: self.winner,
                        scores: self.scores.iter().map(|(&id, &s)| (id, s)).collect(),
                    },
                );
            }
            _ => {}
        }
    }
}

fn is_legal(from: MatchPhase, to: MatchPhase) -> bool {
    matches!(
        (from, to),
        (MatchPhase::Waiting, MatchPhase::Countdown)
            | (MatchPhase::Countdown, MatchPhase::Waiting)
            | (MatchPhase::Countdown, MatchPhase::Playing)
            | (MatchPhase::Playing, MatchPhase::Ended)
            | (MatchPhase::Ended, MatchPhase::Cleanup)
    )
}
