//! Session Telemetry Collector Module
//!
//! Samples the shared control value at a fixed cadence while a slot is
//! active and reduces the buffer to a compact statistical summary at
//! finalization. Sampling is pull-based: the collector holds a
//! latest-value register and captures it on each tick, which bounds write
//! and storage volume regardless of how often the client moves the
//! control.

use std::time::Duration;

use chrono::{DateTime, Utc};

use txanda_core::{SessionId, SessionSample, SessionSummary, SlotStatistics};

/// Telemetry capture configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fixed sampling period while a slot is active.
    pub sample_period: Duration,

    /// Keep every Nth sample in the persisted history.
    pub decimation_stride: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(250),
            decimation_stride: 10,
        }
    }
}

/// In-memory sample accumulator for one slot
///
/// Lives only in the collecting process; the returned summary is the only
/// persisted artifact.
#[derive(Debug)]
pub struct TelemetryCollector {
    session_id: SessionId,
    started_at: DateTime<Utc>,
    latest_value: Option<f64>,
    samples: Vec<SessionSample>,
    decimation_stride: usize,
}

impl TelemetryCollector {
    /// Begin collection for a freshly activated slot with an empty buffer.
    pub fn start(session_id: SessionId, started_at: DateTime<Utc>, config: &TelemetryConfig) -> Self {
        Self {
            session_id,
            started_at,
            latest_value: None,
            samples: Vec::new(),
            decimation_stride: config.decimation_stride.max(1),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Record the latest control value; it is captured on the next tick.
    pub fn update(&mut self, value: f64) {
        self.latest_value = Some(value);
    }

    /// One sampling tick. Ticks before the first `update` capture nothing,
    /// so a slot with zero control activity finalizes with zero samples.
    pub fn sample_tick(&mut self, now: DateTime<Utc>) -> Option<SessionSample> {
        let value = self.latest_value?;
        let sample = SessionSample {
            timestamp: now,
            value,
        };
        self.samples.push(sample.clone());
        Some(sample)
    }

    /// Reduce the buffer to a summary, or `None` when no samples were
    /// captured. Callers must not persist a `None` result.
    pub fn finalize(self, ended_at: DateTime<Utc>) -> Option<SessionSummary> {
        let values: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
        let statistics = statistics(&values)?;

        Some(SessionSummary {
            session_id: self.session_id,
            start_time: self.started_at,
            end_time: ended_at,
            duration_ms: (ended_at - self.started_at).num_milliseconds(),
            sample_count: self.samples.len(),
            statistics,
            sampled_history: decimate(&self.samples, self.decimation_stride),
        })
    }
}

/// Population statistics over the captured values (stddev divides by N).
fn statistics(values: &[f64]) -> Option<SlotStatistics> {
    if values.is_empty() {
        return None;
    }

    let count = values.len() as f64;
    let average = values.iter().sum::<f64>() / count;
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / count;

    Some(SlotStatistics {
        average,
        min,
        max,
        std_deviation: variance.sqrt(),
    })
}

/// Fixed-stride subsample bounding the persisted history size.
fn decimate(samples: &[SessionSample], stride: usize) -> Vec<SessionSample> {
    samples.iter().step_by(stride).cloned().collect()
}
