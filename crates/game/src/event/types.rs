use glam::Vec3;

use crate::PlayerId;
use crate::match_state::MatchPhase;

/// Domain events fanned out by the core. Consumers (HUD, audio, logging)
/// subscribe by [`EventKind`]; the core never depends on them.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    SystemReady {
        system: &'static str,
    },
    SystemsReady,
    InitializationFailed {
        error: String,
    },

    MatchStateChanged {
        from: MatchPhase,
        to: MatchPhase,
    },
    MatchStart,
    MatchEnd {
        winner: Option<PlayerId>,
        scores: Vec<(PlayerId, u32)>,
    },
    CountdownTick {
        seconds_left: u32,
    },

    PlayerSpawned {
        player: PlayerId,
        position: Vec3,
    },
    PlayerDeath {
        player: PlayerId,
        killer: Option<PlayerId>,
    },
    PlayerDamaged {
        player: PlayerId,
        attacker: PlayerId,
        damage: u8,
        health_after: u8,
    },
    PlayerConnected {
        player: PlayerId,
    },
    PlayerDisconnected {
        player: PlayerId,
    },

    WeaponFired {
        player: PlayerId,
        origin: Vec3,
        direction: Vec3,
    },
    HitConfirmed {
        attacker: PlayerId,
        target: PlayerId,
        position: Vec3,
        damage: u8,
    },
    KillConfirmed {
        killer: PlayerId,
        victim: PlayerId,
    },

    ConnectionEstablished {
        player: Option<PlayerId>,
        rtt_ms: f64,
    },
    ConnectionLost {
        reason: String,
    },
    DesyncDetected {
        error_magnitude: f32,
    },
    Reconciliation {
        tick_number: u32,
        error_magnitude: f32,
        inputs_replayed: usize,
    },
    FullStateSync {
        tick_number: u32,
    },

    PointerLocked,
    PointerReleased,
    InputBufferOverflow {
        dropped_sequence: u32,
    },
    InputAcknowledged {
        sequence_number: u32,
    },

    ViolationDetected {
        player: PlayerId,
        reason: String,
        count: u32,
    },
    PlayerKicked {
        player: PlayerId,
        reason: String,
        violations: u32,
    },

    LandImpact {
        player: PlayerId,
        fall_speed: f32,
    },
    Jump {
        player: PlayerId,
    },

    ClockDriftDetected {
        drift_ms: f64,
    },
    ClockSyncComplete {
        offset_ms: f64,
        rtt_ms: f64,
    },

    TickCatchupWarning {
        skipped_ticks: u32,
    },
    TickHandlerError {
        tick_number: u32,
        error: String,
    },
    NetworkWarning {
        message: String,
    },
    HighLatency {
        rtt_ms: f64,
    },
}

macro_rules! event_kinds {
    ($(($variant:ident, $name:literal)),+ $(,)?) => {
        /// Discriminant-only view of [`GameEvent`], used as the subscription key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($variant),+
        }

        impl EventKind {
            /// Stable string discriminator; part of the external contract.
            pub fn type_name(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name),+
                }
            }
        }
    };
}

event_kinds! {
    (SystemReady, "system_ready"),
    (SystemsReady, "systems_ready"),
    (InitializationFailed, "initialization_failed"),
    (MatchStateChanged, "match_state_changed"),
    (MatchStart, "match_start"),
    (MatchEnd, "match_end"),
    (CountdownTick, "countdown_tick"),
    (PlayerSpawned, "player_spawned"),
    (PlayerDeath, "player_death"),
    (PlayerDamaged, "player_damaged"),
    (PlayerConnected, "player_connected"),
    (PlayerDisconnected, "player_disconnected"),
    (WeaponFired, "weapon_fired"),
    (HitConfirmed, "hit_confirmed"),
    (KillConfirmed, "kill_confirmed"),
    (ConnectionEstablished, "connection_established"),
    (ConnectionLost, "connection_lost"),
    (DesyncDetected, "desync_detected"),
    (Reconciliation, "reconciliation"),
    (FullStateSync, "full_state_sync"),
    (PointerLocked, "pointer_locked"),
    (PointerReleased, "pointer_released"),
    (InputBufferOverflow, "input_buffer_overflow"),
    (InputAcknowledged, "input_acknowledged"),
    (ViolationDetected, "violation_detected"),
    (PlayerKicked, "player_kicked"),
    (LandImpact, "land_impact"),
    (Jump, "jump"),
    (ClockDriftDetected, "clock_drift_detected"),
    (ClockSyncComplete, "clock_sync_complete"),
    (TickCatchupWarning, "tick_catchup_warning"),
    (TickHandlerError, "tick_handler_error"),
    (NetworkWarning, "network_warning"),
    (HighLatency, "high_latency"),
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::SystemReady { .. } => EventKind::SystemReady,
            GameEvent::SystemsReady => EventKind::SystemsReady,
            GameEvent::InitializationFailed { .. } => EventKind::InitializationFailed,
            GameEvent::MatchStateChanged { .. } => EventKind::MatchStateChanged,
            GameEvent::MatchStart => EventKind::MatchStart,
            GameEvent::MatchEnd { .. } => EventKind::MatchEnd,
            GameEvent::CountdownTick { .. } => EventKind::CountdownTick,
            GameEvent::PlayerSpawned { .. } => EventKind::PlayerSpawned,
            GameEvent::PlayerDeath { .. } => EventKind::PlayerDeath,
            GameEvent::PlayerDamaged { .. } => EventKind::PlayerDamaged,
            GameEvent::PlayerConnected { .. } => EventKind::PlayerConnected,
            GameEvent::PlayerDisconnected { .. } => EventKind::PlayerDisconnected,
            GameEvent::WeaponFired { .. } => EventKind::WeaponFired,
            GameEvent::HitConfirmed { .. } => EventKind::HitConfirmed,
            GameEvent::KillConfirmed { .. } => EventKind::KillConfirmed,
            GameEvent::ConnectionEstablished { .. } => EventKind::ConnectionEstablished,
            GameEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
            GameEvent::DesyncDetected { .. } => EventKind::DesyncDetected,
            GameEvent::Reconciliation { .. } => EventKind::Reconciliation,
            GameEvent::FullStateSync { .. } => EventKind::FullStateSync,
            GameEvent::PointerLocked => EventKind::PointerLocked,
            GameEvent::PointerReleased => EventKind::PointerReleased,
            GameEvent::InputBufferOverflow { .. } => EventKind::InputBufferOverflow,
            GameEvent::InputAcknowledged { .. } => EventKind::InputAcknowledged,
            GameEvent::ViolationDetected { .. } => EventKind::ViolationDetected,
            GameEvent::PlayerKicked { .. } => EventKind::PlayerKicked,
            GameEvent::LandImpact { .. } => EventKind::LandImpact,
            GameEvent::Jump { .. } => EventKind::Jump,
            GameEvent::ClockDriftDetected { .. } => EventKind::ClockDriftDetected,
            GameEvent::ClockSyncComplete { .. } => EventKind::ClockSyncComplete,
            GameEvent::TickCatchupWarning { .. } => EventKind::TickCatchupWarning,
            GameEvent::TickHandlerError { .. } => EventKind::TickHandlerError,
            GameEvent::NetworkWarning { .. } => EventKind::NetworkWarning,
            GameEvent::HighLatency { .. } => EventKind::HighLatency,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }
}
