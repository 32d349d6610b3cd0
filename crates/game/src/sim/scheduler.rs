use crate::error::EngineError;
use crate::event::{EventBus, GameEvent};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_rate: u32,
    /// Most ticks dispatched from one update before the residual is dropped.
    pub max_catch_up_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_catch_up_ticks: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickHandlerId(u64);

type TickHandler = Box<dyn FnMut(u32) -> Result<(), EngineError>>;

/// Fixed-timestep driver. Wall clock irregularity lands in the accumulator;
/// each update dispatches at most `max_catch_up_ticks` ticks and discards the
/// rest with a warning, so a stalled host cannot spiral.
pub struct TickScheduler {
    tick_duration_ms: f64,
    max_catch_up_ticks: u32,
    accumulator_ms: f64,
    last_update_ms: Option<f64>,
    current_tick: u32,
    running: bool,
    handlers: Vec<(TickHandlerId, TickHandler)>,
    next_handler_id: u64,
}

impl TickScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            tick_duration_ms: 1000.0 / config.tick_rate as f64,
            max_catch_up_ticks: config.max_catch_up_ticks,
            accumulator_ms: 0.0,
            last_update_ms: None,
            current_tick: 0,
            running: false,
            handlers: Vec::new(),
            next_handler_id: 0,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_update_ms = None;
        self.accumulator_ms = 0.0;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    pub fn tick_duration_ms(&self) -> f64 {
        self.tick_duration_ms
    }

    pub fn on_tick<F>(&mut self, handler: F) -> TickHandlerId
    where
        F: FnMut(u32) -> Result<(), EngineError> + 'static,
    {
        let id = TickHandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: TickHandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Advance with the current wall clock; returns the number of ticks
    /// dispatched.
    pub fn update(&mut self, now_ms: f64, bus: &mut EventBus) -> u32 {
        if !self.running {
            return 0;
        }

        let last = self.last_update_ms.replace(now_ms).unwrap_or(now_ms);
        self.accumulator_ms += (now_ms - last).max(0.0);

        let mut dispatched = 0;
        while self.accumulator_ms >= self.tick_duration_ms && dispatched < self.max_catch_up_ticks {
            self.accumulator_ms -= self.tick_duration_ms;
            self.dispatch(now_ms, bus);
            dispatched += 1;
        }

        if self.accumulator_ms >= self.tick_duration_ms {
            let skipped_ticks = (self.accumulator_ms / self.tick_duration_ms) as u32;
            self.accumulator_ms = 0.0;
            bus.publish(now_ms, GameEvent::TickCatchupWarning { skipped_ticks });
        }

        dispatched
    }

    /// Dispatch exactly one tick outside the accumulator. Tests only.
    pub fn manual_tick(&mut self, now_ms: f64, bus: &mut EventBus) {
        self.dispatch(now_ms, bus);
    }

    fn dispatch(&mut self, now_ms: f64, bus: &mut EventBus) {
        let tick_number = self.current_tick;
        for (_, handler) in &mut self.handlers {
            if let Err(error) = handler(tick_number) {
                bus.publish(
                    now_ms,
                    GameEvent::TickHandlerError {
                        tick_number,
                        error: error.to_string(),
                    },
                );
            }
        }
        self.current_tick = self.current_tick.wrapping_add(1);
    }
}
