use std::collections::VecDeque;

use crate::event::{EventBus, GameEvent};

#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Samples kept and required before calibration.
    pub sample_count: usize,
    /// Absolute drift beyond which calibration is discarded.
    pub resync_threshold_ms: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sample_count: 10,
            resync_threshold_ms: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    pub offset_ms: f64,
    pub rtt_ms: f64,
}

/// NTP-style offset/RTT estimation against the server clock. Offset and RTT
/// medians are selected independently so a single delayed exchange cannot
/// poison either estimate.
pub struct ClockSync {
    config: ClockConfig,
    samples: VecDeque<ClockSample>,
    calibrated: bool,
    calibrated_offset_ms: f64,
    calibrated_rtt_ms: f64,
}

impl ClockSync {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
            calibrated: false,
            calibrated_offset_ms: 0.0,
            calibrated_rtt_ms: 0.0,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn offset_ms(&self) -> f64 {
        self.calibrated_offset_ms
    }

    pub fn rtt_ms(&self) -> f64 {
        self.calibrated_rtt_ms
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Record one sync exchange. `client_send`/`client_receive` are local
    /// clock readings around the round trip, `server_time` the remote stamp.
    pub fn add_sample(
        &mut self,
        client_send_ms: f64,
        server_time_ms: f64,
        client_receive_ms: f64,
        bus: &mut EventBus,
    ) -> ClockSample {
        let rtt_ms = (client_receive_ms - client_send_ms).max(0.0);
        let offset_ms = server_time_ms - (client_send_ms + rtt_ms / 2.0);
        let sample = ClockSample { offset_ms, rtt_ms };

        if self.samples.len() >= self.config.sample_count {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);

        if self.samples.len() >= self.config.sample_count {
            let newly_calibrated = !self.calibrated;
            self.calibrate();
            if newly_calibrated {
                bus.publish(
                    client_receive_ms,
                    GameEvent::ClockSyncComplete {
                        offset_ms: self.calibrated_offset_ms,
                        rtt_ms: self.calibrated_rtt_ms,
                    },
                );
            }
        }

        sample
    }

    pub fn server_to_local(&self, server_time_ms: f64) -> f64 {
        server_time_ms - self.calibrated_offset_ms
    }

    pub fn local_to_server(&self, local_time_ms: f64) -> f64 {
        local_time_ms + self.calibrated_offset_ms
    }

    /// Compare an authoritative stamp against the calibrated mapping. When
    /// drift exceeds the threshold, calibration is discarded so the next
    /// `sample_count` exchanges rebuild it from scratch.
    pub fn check_drift(&mut self, server_time_ms: f64, local_time_ms: f64, bus: &mut EventBus) -> bool {
        if !self.calibrated {
            return false;
        }

        let drift_ms = server_time_ms - self.local_to_server(local_time_ms);
        if drift_ms.abs() <= self.config.resync_threshold_ms {
            return false;
        }

        log::warn!("clock drift {drift_ms:.1} ms, forcing resync");
        bus.publish(local_time_ms, GameEvent::ClockDriftDetected { drift_ms });
        self.samples.clear();
        self.calibrated = false;
        true
    }

    fn calibrate(&mut self) {
        self.calibrated_offset_ms = median_by(&self.samples, |s| s.offset_ms);
        self.calibrated_rtt_ms = median_by(&self.samples, |s| s.rtt_ms);
        self.calibrated = true;
    }
}

fn median_by(samples: &VecDeque<ClockSample>, key: impl Fn(&ClockSample) -> f64) -> f64 {
    let mut values: Vec<f64> = samples.iter().map(key).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}
