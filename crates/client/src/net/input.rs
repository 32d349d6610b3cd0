use arena::event::{EventBus, GameEvent};
use arena::protocol::{InputButtons, InputPacket};

/// Accumulates movement, look deltas and button state between ticks and
/// stamps outgoing packets with a monotonic sequence.
pub struct InputCapture {
    next_sequence: u32,
    movement_x: f32,
    movement_y: f32,
    look_accum_x: i32,
    look_accum_y: i32,
    buttons: InputButtons,
    pointer_locked: bool,
}

impl Default for InputCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl InputCapture {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            movement_x: 0.0,
            movement_y: 0.0,
            look_accum_x: 0,
            look_accum_y: 0,
            buttons: InputButtons::empty(),
            pointer_locked: false,
        }
    }

    /// Raw movement axes; diagonals are normalized so a packet never claims
    /// more than unit speed.
    pub fn set_movement(&mut self, x: f32, y: f32) {
        let length_sq = x * x + y * y;
        if length_sq > 1.0 {
            let length = length_sq.sqrt();
            self.movement_x = x / length;
            self.movement_y = y / length;
        } else {
            self.movement_x = x;
            self.movement_y = y;
        }
    }

    pub fn add_look_delta(&mut self, dx: i32, dy: i32) {
        if !self.pointer_locked {
            return;
        }
        self.look_accum_x = self.look_accum_x.saturating_add(dx);
        self.look_accum_y = self.look_accum_y.saturating_add(dy);
    }

    pub fn set_button(&mut self, button: InputButtons, pressed: bool) {
        self.buttons.set(button, pressed);
    }

    pub fn pointer_locked(&self) -> bool {
        self.pointer_locked
    }

    pub fn lock_pointer(&mut self, now_ms: f64, bus: &mut EventBus) {
        if !self.pointer_locked {
            self.pointer_locked = true;
            bus.publish(now_ms, GameEvent::PointerLocked);
        }
    }

    pub fn release_pointer(&mut self, now_ms: f64, bus: &mut EventBus) {
        if self.pointer_locked {
            self.pointer_locked = false;
            self.look_accum_x = 0;
            self.look_accum_y = 0;
            bus.publish(now_ms, GameEvent::PointerReleased);
        }
    }

    /// Consume the accumulated state into one wire packet.
    pub fn build_packet(&mut self, tick_number: u32, client_timestamp_ms: f64) -> InputPacket {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1).max(1);

        let look_x = self.look_accum_x.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let look_y = self.look_accum_y.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        self.look_accum_x = 0;
        self.look_accum_y = 0;

        InputPacket {
            sequence_number: sequence,
            tick_number,
            movement_x: self.movement_x,
            movement_y: self.movement_y,
            look_delta_x: look_x,
            look_delta_y: look_y,
            buttons: self.buttons,
            client_timestamp_ms,
        }
    }
}
