use crate::PlayerId;

/// Serializer failures. Returned by every wire decoder; a `SchemaMismatch`
/// on a live session is grounds for dropping the connection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    #[error("wrong message type: expected {expected:#04x}, got {got:#04x}")]
    WrongType { expected: u8, got: u8 },
    #[error("invalid message type {0:#04x}")]
    InvalidMessageType(u8),
    #[error("invalid field value: {0}")]
    InvalidFieldValue(&'static str),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(&'static str),
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("operation timed out after {0} ms")]
    Timeout(u64),
    #[error("invalid message")]
    InvalidMessage(#[from] WireError),
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("clock sync failed: {0}")]
    ClockSyncFailed(String),
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        NetError::ConnectionFailed(err.to_string())
    }
}

/// Input/anti-cheat rejections. Always recoverable: the offending input is
/// discarded and the tick continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid input")]
    InvalidInput,
    #[error("speed violation: {speed:.2} m/s exceeds {max:.2} m/s")]
    SpeedViolation { speed: f32, max: f32 },
    #[error("invalid jump: airborne beyond coyote window")]
    InvalidJump,
    #[error("fire rate violation: {remaining_ms:.0} ms of cooldown remain")]
    FireRateViolation { remaining_ms: f64 },
    #[error("timestamp deviates from server clock by {deviation_ms:.0} ms")]
    TimestampViolation { deviation_ms: f64 },
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("invalid position: {0}")]
    InvalidPosition(&'static str),
    #[error("collision resolution failed")]
    CollisionResolutionFailed,
    #[error("invalid velocity: {0}")]
    InvalidVelocity(&'static str),
    #[error("map manifest load failed: {0}")]
    ManifestLoadFailed(String),
    #[error("raycast failed")]
    RaycastFailed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CombatError {
    #[error("unknown combatant {0}")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is dead")]
    PlayerDead(PlayerId),
    #[error(transparent)]
    Rejected(#[from] ValidationError),
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("match not found")]
    MatchNotFound,
    #[error("player {0} already exists")]
    PlayerAlreadyExists(PlayerId),
    #[error("player {0} is not in the match")]
    PlayerNotInMatch(PlayerId),
    #[error("illegal match state transition: {from} -> {to}")]
    InvalidMatchState {
        from: &'static str,
        to: &'static str,
    },
    #[error("spawn selection failed: no spawn points")]
    SpawnFailed,
    #[error(transparent)]
    Combat(#[from] CombatError),
    #[error("tick {tick} processing failed: {reason}")]
    TickProcessingFailed { tick: u32, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("system init failed: {0}")]
    SystemInitFailed(String),
    #[error("missing dependency: {0}")]
    DependencyMissing(&'static str),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("asset load failed: {0}")]
    AssetLoadFailed(String),
}

/// Workspace-wide aggregate. Errors are returned, never unwound through the
/// tick loop; the bus carries the user-visible notifications.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Init(#[from] InitError),
}

impl From<CombatError> for EngineError {
    fn from(err: CombatError) -> Self {
        EngineError::Game(GameError::Combat(err))
    }
}
