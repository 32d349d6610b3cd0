mod bus;
mod types;

pub use bus::{EventBus, EventEnvelope, SubscriptionId};
pub use types::{EventKind, GameEvent};
