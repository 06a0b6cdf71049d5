//! Training-load statistics over a synthesized per-second power trace.
//!
//! Segments are expanded to one sample per second, ramps interpolated
//! linearly. From that trace we derive average power, normalized power
//! (30 s rolling average, fourth-power mean), intensity factor, TSS and the
//! best rolling average for a set of window lengths.

use crate::types::CourseSegment;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rolling window used by normalized power, in seconds
pub const NP_WINDOW_SECONDS: usize = 30;

/// Default best-effort windows, in minutes
pub const DEFAULT_POWER_WINDOWS: [u32; 4] = [1, 5, 20, 60];

/// Inputs shared by every course of a collection
#[derive(Clone, Debug, PartialEq)]
pub struct StatsBasis {
    pub ftp: f64,
    pub power_windows: Vec<u32>,
}

impl StatsBasis {
    pub fn new(ftp: f64) -> Self {
        Self {
            ftp,
            power_windows: DEFAULT_POWER_WINDOWS.to_vec(),
        }
    }
}

/// Best rolling averages keyed by window length in minutes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerAverages(pub Vec<(u32, Option<f64>)>);

impl PowerAverages {
    pub fn get(&self, minutes: u32) -> Option<f64> {
        self.0
            .iter()
            .find(|(m, _)| *m == minutes)
            .and_then(|(_, p)| *p)
    }
}

impl fmt::Display for PowerAverages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .filter_map(|(m, p)| p.map(|p| format!("{}'@{}W", m, p as i64)))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Statistics of one finalized course
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseStats {
    /// Total duration in minutes
    pub duration: f64,
    pub average: f64,
    pub normalized_power: f64,
    pub intensity_factor: f64,
    pub tss: u32,
    pub power_averages: PowerAverages,
}

impl CourseStats {
    /// Flattened `field → value` pairs, as used in export descriptions
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("time", (self.duration as i64).to_string()),
            ("average", self.average.to_string()),
            ("np", self.normalized_power.to_string()),
            ("ftpif", self.intensity_factor.to_string()),
            ("tss", self.tss.to_string()),
            ("power_averages", self.power_averages.to_string()),
        ]
    }
}

impl fmt::Display for CourseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// One power sample per second across all segments
pub fn power_by_second(segments: &[CourseSegment]) -> Vec<f64> {
    let mut trace = Vec::new();
    for seg in segments {
        let samples = (60.0 * seg.time).round().max(0.0) as usize;
        let diff = seg.power_end() - seg.power_start;
        trace.extend(
            (0..samples).map(|s| seg.power_start + s as f64 / samples as f64 * diff),
        );
    }
    trace
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Fourth root of the mean fourth power of every full 30 s rolling average.
///
/// `None` when the trace is shorter than one window.
pub fn normalized_power(trace: &[f64]) -> Option<f64> {
    if trace.len() < NP_WINDOW_SECONDS {
        return None;
    }
    let fourth_powers: Vec<f64> = trace
        .windows(NP_WINDOW_SECONDS)
        .map(|w| mean(w).powi(4))
        .collect();
    Some(mean(&fourth_powers).powf(0.25))
}

/// Highest mean power over any contiguous `minutes`-long stretch.
///
/// `None` when the trace is shorter than the window.
pub fn best_effort(trace: &[f64], minutes: u32) -> Option<f64> {
    let window = minutes as usize * 60;
    if window == 0 || trace.len() < window {
        return None;
    }

    let mut prefix_sum = vec![0.0; trace.len() + 1];
    for (i, &power) in trace.iter().enumerate() {
        prefix_sum[i + 1] = prefix_sum[i] + power;
    }

    (window..=trace.len())
        .map(|end| (prefix_sum[end] - prefix_sum[end - window]) / window as f64)
        .reduce(f64::max)
}

/// Compute the statistics of a segment sequence
pub fn compute(segments: &[CourseSegment], basis: &StatsBasis) -> Result<CourseStats> {
    if basis.ftp <= 0.0 {
        return Err(Error::Config(format!("FTP must be positive, got {}", basis.ftp)));
    }

    let trace = power_by_second(segments);
    if trace.is_empty() {
        return Err(Error::Statistics("course has no power samples".into()));
    }

    let duration = segments.last().map(|s| s.end_time()).unwrap_or(0.0);
    let average = mean(&trace);
    let np = match normalized_power(&trace) {
        Some(np) => np,
        None => {
            tracing::debug!(
                "Trace of {}s is shorter than the {}s NP window, using average power",
                trace.len(),
                NP_WINDOW_SECONDS
            );
            average
        }
    };

    let np = round_to(np, 2);
    let intensity_factor = round_to(np / basis.ftp, 2);
    let tss = (duration * 60.0 * np * intensity_factor) / (basis.ftp * 3600.0) * 100.0;

    let power_averages = PowerAverages(
        basis
            .power_windows
            .iter()
            .map(|&m| (m, best_effort(&trace, m)))
            .collect(),
    );

    Ok(CourseStats {
        duration: round_to(duration, 2),
        average: round_to(average, 2),
        normalized_power: np,
        intensity_factor,
        tss: tss as u32,
        power_averages,
    })
}
