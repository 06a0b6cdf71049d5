#![forbid(unsafe_code)]

//! Core model and parsing for trainer-course workbooks.
//!
//! This crate provides:
//! - A grid-of-cells workbook model (xlsx and JSON snapshot loaders)
//! - Implicit named region discovery from merged cells
//! - Templated record parsing and course assembly
//! - Prepend/append linking between courses
//! - Power statistics (NP, IF, TSS, best efforts)
//! - ERG/MRC export and the library write-back

pub mod error;
pub mod logging;
pub mod config;
pub mod grid;
pub mod xlsx;
pub mod region;
pub mod types;
pub mod record;
pub mod stats;
pub mod course;
pub mod collection;
pub mod filter;
pub mod export;
pub mod library;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, ExportFormat};
pub use grid::{CellValue, Sheet, Workbook};
pub use region::{extract_regions, RegionKey, Regions};
pub use course::Course;
pub use collection::CourseCollection;
pub use filter::NameFilter;
pub use stats::{CourseStats, StatsBasis};
pub use export::ExportOptions;
