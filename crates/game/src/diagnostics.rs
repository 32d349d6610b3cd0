use serde::Serialize;
use serde_json::{Value, json};

use crate::protocol::{InputPacket, StateSnapshot};

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub max_recording_ms: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_recording_ms: 60_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RecordedInput {
    t: f64,
    sequence: u32,
    tick: u32,
    movement: [f32; 2],
    look: [i16; 2],
    buttons: u8,
}

#[derive(Debug, Clone, Serialize)]
struct RecordedPlayer {
    id: u16,
    position: [f32; 3],
    velocity: [f32; 3],
    health: u8,
}

#[derive(Debug, Clone, Serialize)]
struct RecordedSnapshot {
    t: f64,
    tick: u32,
    match_state: u8,
    players: Vec<RecordedPlayer>,
    scores: Vec<(u16, u32)>,
}

#[derive(Debug, Clone, Serialize)]
struct RecordedReconciliation {
    t: f64,
    tick: u32,
    error_magnitude: f32,
    inputs_replayed: usize,
}

/// Off-hot-path capture of inputs, snapshots and reconciliations for replay
/// analysis. Entries age out on every insert.
pub struct FlightRecorder {
    config: RecorderConfig,
    start_time_ms: Option<f64>,
    last_time_ms: f64,
    inputs: Vec<RecordedInput>,
    snapshots: Vec<RecordedSnapshot>,
    reconciliations: Vec<RecordedReconciliation>,
}

impl FlightRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            start_time_ms: None,
            last_time_ms: 0.0,
            inputs: Vec::new(),
            snapshots: Vec::new(),
            reconciliations: Vec::new(),
        }
    }

    pub fn record_input(&mut self, now_ms: f64, packet: &InputPacket) {
        self.touch(now_ms);
        self.inputs.push(RecordedInput {
            t: now_ms,
            sequence: packet.sequence_number,
            tick: packet.tick_number,
            movement: [packet.movement_x, packet.movement_y],
            look: [packet.look_delta_x, packet.look_delta_y],
            buttons: packet.buttons.bits(),
        });
        self.prune(now_ms);
    }

    pub fn record_snapshot(&mut self, now_ms: f64, snapshot: &StateSnapshot) {
        self.touch(now_ms);
        self.snapshots.push(RecordedSnapshot {
            t: now_ms,
            tick: snapshot.tick_number,
            match_state: snapshot.match_state as u8,
            players: snapshot
                .players
                .iter()
                .map(|p| RecordedPlayer {
                    id: p.entity_id,
                    position: p.position.into(),
                    velocity: p.velocity.into(),
                    health: p.health,
                })
                .collect(),
            scores: snapshot.scores.iter().map(|(&id, &s)| (id, s)).collect(),
        });
        self.prune(now_ms);
    }

    pub fn record_reconciliation(
        &mut self,
        now_ms: f64,
        tick: u32,
        error_magnitude: f32,
        inputs_replayed: usize,
    ) {
        self.touch(now_ms);
        self.reconciliations.push(RecordedReconciliation {
            t: now_ms,
            tick,
            error_magnitude,
            inputs_replayed,
        });
        self.prune(now_ms);
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Everything captured, as the export JSON object.
    pub fn export(&self, recorded_at_ms: f64) -> Value {
        let start = self.start_time_ms.unwrap_or(0.0);
        let max_prediction_error = self
            .reconciliations
            .iter()
            .map(|r| r.error_magnitude)
            .fold(None::<f32>, |acc, e| Some(acc.map_or(e, |a| a.max(e))));

        json!({
            "startTime": start,
            "endTime": self.last_time_ms,
            "durationMs": self.last_time_ms - start,
            "inputs": self.inputs,
            "snapshots": self.snapshots,
            "reconciliations": self.reconciliations,
            "metadata": {
                "version": env!("CARGO_PKG_VERSION"),
                "recordedAt": recorded_at_ms,
                "inputCount": self.inputs.len(),
                "snapshotCount": self.snapshots.len(),
                "reconciliationCount": self.reconciliations.len(),
                "maxPredictionError": max_prediction_error,
            }
        })
    }

    fn touch(&mut self, now_ms: f64) {
        if self.start_time_ms.is_none() {
            self.start_time_ms = Some(now_ms);
        }
        self.last_time_ms = self.last_time_ms.max(now_ms);
    }

    fn prune(&mut self, now_ms: f64) {
        let cutoff = now_ms - self.config.max_recording_ms;
        self.inputs.retain(|r| r.t >= cutoff);
        self.snapshots.retain(|r| r.t >= cutoff);
        self.reconciliations.retain(|r| r.t >= cutoff);
    }
}
