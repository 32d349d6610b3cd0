mod processor;
mod queue;
mod scheduler;

pub use processor::{EngineConfig, PlayerServerState, ProcessorConfig, TickProcessor};
pub use queue::{InputQueue, MAX_INPUT_QUEUE_SIZE};
pub use scheduler::{SchedulerConfig, TickHandlerId, TickScheduler};
