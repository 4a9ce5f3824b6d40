//! Per-point hooks run during a scan.

use log::{debug, info};

use crate::domain::{ScanSample, StatResult, Statistic};
use crate::stats::compute_stats;

/// Called once per acquired point, before the next point is requested.
pub trait ScanObserver {
    fn on_point(&mut self, index: usize, x: f64, y: f64, sample: &ScanSample);
}

/// Live statistics, recomputed every `update_every` points.
///
/// Statistics that need more points than have arrived are simply skipped
/// until enough data exists.
#[derive(Debug, Clone)]
pub struct LiveStat {
    stats: Vec<Statistic>,
    update_every: usize,
    result: Option<StatResult>,
    updates: usize,
}

impl LiveStat {
    pub fn new(stats: Vec<Statistic>, update_every: usize) -> Self {
        Self {
            stats,
            update_every: update_every.max(1),
            result: None,
            updates: 0,
        }
    }

    /// Latest successful result.
    pub fn result(&self) -> Option<&StatResult> {
        self.result.as_ref()
    }

    /// How many times the result has been recomputed.
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl ScanObserver for LiveStat {
    fn on_point(&mut self, index: usize, _x: f64, _y: f64, sample: &ScanSample) {
        if index % self.update_every != 0 {
            return;
        }
        match compute_stats(&self.stats, sample) {
            Ok(result) => {
                self.result = Some(result);
                self.updates += 1;
            }
            Err(err) => debug!("live stat skipped at point {index}: {err}"),
        }
    }
}

/// Logs each point as a table row.
#[derive(Debug, Clone)]
pub struct LogTable {
    motor: String,
    detector: String,
}

impl LogTable {
    pub fn new(motor: &str, detector: &str) -> Self {
        Self {
            motor: motor.to_string(),
            detector: detector.to_string(),
        }
    }
}

impl ScanObserver for LogTable {
    fn on_point(&mut self, index: usize, x: f64, y: f64, _sample: &ScanSample) {
        if index == 0 {
            info!("{:>5} | {:>14} | {:>14}", "seq", self.motor, self.detector);
        }
        info!("{:>5} | {:>14.6} | {:>14.4}", index + 1, x, y);
    }
}
