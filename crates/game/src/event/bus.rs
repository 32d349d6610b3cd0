use std::collections::HashMap;

use super::types::{EventKind, GameEvent};

/// A published event plus the bus-assigned timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub timestamp_ms: f64,
    pub event: GameEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&EventEnvelope)>;

enum Filter {
    Kind(EventKind),
    All,
}

/// Typed publish/subscribe fan-out. Handlers run synchronously in
/// subscription order; publishers never observe subscriber state.
#[derive(Default)]
pub struct EventBus {
    by_kind: HashMap<EventKind, Vec<SubscriptionId>>,
    all: Vec<SubscriptionId>,
    handlers: HashMap<SubscriptionId, (Filter, Handler)>,
    next_id: u64,
    last_timestamp_ms: f64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&EventEnvelope) + 'static,
    {
        let id = self.allocate_id();
        self.by_kind.entry(kind).or_default().push(id);
        self.handlers.insert(id, (Filter::Kind(kind), Box::new(handler)));
        id
    }

    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&EventEnvelope) + 'static,
    {
        let id = self.allocate_id();
        self.all.push(id);
        self.handlers.insert(id, (Filter::All, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some((filter, _)) = self.handlers.remove(&id) else {
            return false;
        };
        match filter {
            Filter::Kind(kind) => {
                if let Some(ids) = self.by_kind.get_mut(&kind) {
                    ids.retain(|&i| i != id);
                }
            }
            Filter::All => self.all.retain(|&i| i != id),
        }
        true
    }

    /// Publish with a monotonic timestamp: a stamp never goes backwards even
    /// if the caller's clock does.
    pub fn publish(&mut self, now_ms: f64, event: GameEvent) {
        let timestamp_ms = now_ms.max(self.last_timestamp_ms);
        self.last_timestamp_ms = timestamp_ms;

        let envelope = EventEnvelope {
            timestamp_ms,
            event,
        };

        let kind = envelope.event.kind();
        let mut targets: Vec<SubscriptionId> = self
            .by_kind
            .get(&kind)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        targets.extend(self.all.iter().copied());

        for id in targets {
            if let Some((_, handler)) = self.handlers.get_mut(&id) {
                handler(&envelope);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }
}
