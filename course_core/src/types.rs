//! Core domain types for trainer courses.
//!
//! This module defines the values shared by the parser, the course model
//! and the exporters:
//! - Course categories
//! - Segments and their derived timing/power
//! - Header and link records read from a sheet

use crate::grid::CellValue;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Category
// ============================================================================

/// Training category of a course; also the export sub-directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Anaerobic,
    Warmup,
    Cooldown,
    #[serde(rename = "Steady State")]
    SteadyState,
    #[serde(rename = "Sweet Spot")]
    SweetSpot,
    #[serde(rename = "Aerobic Base")]
    AerobicBase,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Anaerobic,
        Category::Warmup,
        Category::Cooldown,
        Category::SteadyState,
        Category::SweetSpot,
        Category::AerobicBase,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Anaerobic => "Anaerobic",
            Category::Warmup => "Warmup",
            Category::Cooldown => "Cooldown",
            Category::SteadyState => "Steady State",
            Category::SweetSpot => "Sweet Spot",
            Category::AerobicBase => "Aerobic Base",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Case-insensitive; spaces, hyphens and underscores are interchangeable
    fn from_str(s: &str) -> Result<Self> {
        let wanted = crate::region::snake_case(&s.trim().to_lowercase());
        Category::ALL
            .into_iter()
            .find(|c| crate::region::snake_case(&c.label().to_lowercase()) == wanted)
            .ok_or_else(|| Error::Validation {
                kind: "Header",
                message: format!("unknown category '{}'", s.trim()),
            })
    }
}

// ============================================================================
// Segments
// ============================================================================

/// One constant or ramped block of a course
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseSegment {
    /// Duration in minutes
    pub time: f64,
    /// Watts at the start of the segment
    pub power_start: f64,
    /// Ramp target in watts; constant power when absent
    pub ramp_to: Option<f64>,
    /// Drop this segment when it ends the final repeat
    #[serde(default)]
    pub exclude: bool,
    /// Minutes from course start; maintained by the owning course
    #[serde(default)]
    pub start_time: f64,
}

impl CourseSegment {
    pub fn new(time: f64, power_start: f64, ramp_to: Option<f64>) -> Self {
        Self {
            time,
            power_start,
            ramp_to,
            exclude: false,
            start_time: 0.0,
        }
    }

    /// Ramp of `seconds` from `from` to `to` watts, used to join two courses
    pub fn blend(seconds: u32, from: f64, to: f64) -> Self {
        let minutes = (seconds as f64 / 60.0 * 100.0).round() / 100.0;
        Self::new(minutes, from, Some(to))
    }

    pub fn power_end(&self) -> f64 {
        self.ramp_to.unwrap_or(self.power_start)
    }

    /// Midpoint of start and end power
    pub fn power(&self) -> f64 {
        (self.power_start + self.power_end()) / 2.0
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.time
    }

    /// Duration as `5'30"`
    pub fn time_label(&self) -> String {
        let minutes = self.time.trunc();
        let seconds = ((self.time - minutes) * 60.0).trunc();
        let mut label = String::new();
        if minutes > 0.0 {
            label.push_str(&format!("{}'", minutes as i64));
        }
        if seconds > 0.0 {
            label.push_str(&format!("{}\"", seconds as i64));
        }
        label
    }
}

impl fmt::Display for CourseSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}W", self.time_label(), self.power_start as i64)?;
        if let Some(ramp_to) = self.ramp_to {
            write!(f, "->{}W", ramp_to as i64)?;
        }
        Ok(())
    }
}

/// Rewrite every `start_time` as the running sum of earlier durations
pub fn recalc_start_times(segments: &mut [CourseSegment]) {
    let mut elapsed = 0.0;
    for segment in segments.iter_mut() {
        segment.start_time = elapsed;
        elapsed += segment.time;
    }
}

// ============================================================================
// Header and link records
// ============================================================================

/// The single header row of a course sheet
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub name: String,
    pub category: Category,
    pub comments: Option<String>,
    /// Raw repeat value, expanded by [`crate::course::parse_versions`]
    pub versions: CellValue,
}

/// A reference to another course to splice before or after this one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkRef {
    pub name: String,
    /// Seconds of ramp inserted when the junction powers differ
    pub blend: Option<u32>,
}
