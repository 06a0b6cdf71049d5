//! Error types for the course_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for course_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The workbook could not be opened or decoded
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// One or more required sections are absent from a sheet
    #[error("Sheet '{sheet}' is missing required sections: {}", missing.join(", "))]
    MissingSections { sheet: String, missing: Vec<String> },

    /// A record row could not be mapped onto its record kind
    #[error("Invalid {kind} record: {message}")]
    Validation { kind: &'static str, message: String },

    /// A prepend/append reference names a course that does not exist
    #[error(
        "Course '{course}' references unknown course '{target}'. Known courses: {}",
        known.join(", ")
    )]
    UnknownCourse {
        course: String,
        target: String,
        known: Vec<String>,
    },

    /// Linking revisited a course that is still being linked
    #[error("Cyclic course reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    /// A finalized course was asked to change its segments
    #[error("Course '{0}' is finalized and its segments can no longer change")]
    Finalized(String),

    /// Statistics could not be computed
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// Region name de-duplication ran past its bound
    #[error("Too many regions named '{name}' on row {row}")]
    NameCollision { name: String, row: u32 },

    /// A region header cannot be used as positional field names
    #[error("Invalid header for region '{region}': {header:?}")]
    InvalidHeader { region: String, header: Vec<String> },
}
