pub mod anticheat;
pub mod clock;
pub mod combat;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod lagcomp;
pub mod map;
pub mod match_state;
pub mod net;
pub mod physics;
pub mod protocol;
pub mod sim;
pub mod spawn;

/// Entity ids double as player ids; they fit the u16 wire field.
pub type PlayerId = u16;

pub const DEFAULT_PORT: u16 = 27901;
pub const DEFAULT_TICK_RATE: u32 = 60;

pub use anticheat::{AntiCheat, AntiCheatConfig};
pub use clock::{ClockConfig, ClockSample, ClockSync};
pub use combat::{CombatConfig, CombatSystem, FireCommand, HitResult, PlayerCombatState};
pub use diagnostics::{FlightRecorder, RecorderConfig};
pub use error::{
    CombatError, EngineError, GameError, InitError, NetError, PhysicsError, ValidationError,
    WireError,
};
pub use event::{EventBus, EventEnvelope, EventKind, GameEvent, SubscriptionId};
pub use lagcomp::{Capsule, LagCompConfig, LagCompensation, WorldSnapshot};
pub use map::{Aabb, ArenaMap};
pub use match_state::{MatchConfig, MatchPhase, MatchStateMachine};
pub use net::{
    EndpointConfig, FrameDecoder, MAX_FRAME_SIZE, NetworkStats, ServerEndpoint, SessionConfig,
    SessionState, TransportSession, encode_frame,
};
pub use physics::{MoveInput, PhysicsConfig, PlayerPhysicsState, StepEffects};
pub use protocol::{
    InputButtons, InputPacket, MatchEventKind, Message, MessageKind, NO_WINNER, PlayerEventKind,
    PlayerStateData, StateFlags, StateSnapshot, sequence_greater_than,
};
pub use sim::{
    EngineConfig, InputQueue, MAX_INPUT_QUEUE_SIZE, PlayerServerState, ProcessorConfig,
    SchedulerConfig, TickHandlerId, TickProcessor, TickScheduler,
};
pub use spawn::{SpawnConfig, SpawnManifestEntry, SpawnPoint, SpawnSystem};
