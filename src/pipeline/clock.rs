//! Experiment time keeping.
//!
//! Two time bases are tracked:
//! - **experiment time** counts only while the experiment runs and pauses
//!   with it
//! - **linear time** runs on from the first start regardless of pauses
//!
//! Both come with the Unix epoch (in seconds) at which they read zero, so a
//! module can convert either base to wall-clock time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Timestamps shared by every module of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    /// Seconds of running time since the first start.
    pub experiment_time: f64,
    /// Seconds of wall time since the first start.
    pub linear_time: f64,
    /// Epoch seconds at which `experiment_time` was zero.
    pub experiment_reference_1970: f64,
    /// Epoch seconds of the first start.
    pub linear_reference_1970: f64,
}

/// Start/pause stopwatch behind [`TimeContext`].
#[derive(Debug, Clone, Default)]
pub struct ExperimentClock {
    first_start: Option<(Instant, DateTime<Utc>)>,
    accumulated: Duration,
    running_since: Option<Instant>,
}

fn epoch_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1e6
}

impl ExperimentClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn start(&mut self) {
        if self.running_since.is_some() {
            return;
        }
        let now = Instant::now();
        if self.first_start.is_none() {
            self.first_start = Some((now, Utc::now()));
        }
        self.running_since = Some(now);
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Forget all timing, as after clearing an experiment.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn experiment_time(&self) -> f64 {
        let running = self.running_since.map(|s| s.elapsed()).unwrap_or_default();
        (self.accumulated + running).as_secs_f64()
    }

    pub fn linear_time(&self) -> f64 {
        self.first_start
            .map(|(instant, _)| instant.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Capture the current timestamps.
    pub fn context(&self) -> TimeContext {
        let Some((_, started_at)) = self.first_start else {
            return TimeContext::default();
        };
        let linear_reference = epoch_secs(started_at);
        let linear_time = self.linear_time();
        let experiment_time = self.experiment_time();
        TimeContext {
            experiment_time,
            linear_time,
            experiment_reference_1970: linear_reference + (linear_time - experiment_time),
            linear_reference_1970: linear_reference,
        }
    }
}
