//! Training-file rendering and export layout.
//!
//! ERG files carry absolute watts; MRC files carry percent of FTP. Both
//! list each segment as two points, its start and its end, so ramps come
//! out as straight lines between them.

use crate::config::{ExportConfig, ExportFormat};
use crate::course::Course;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Header values shared by every exported file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub file_version: u32,
    pub header_ftp: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            format: config.format,
            file_version: config.file_version,
            header_ftp: config.header_ftp,
        }
    }
}

/// Bare integer when integral, otherwise one decimal
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let rounded = (value * 10.0).round() / 10.0;
        if rounded.fract() == 0.0 {
            format!("{}", rounded as i64)
        } else {
            format!("{:.1}", rounded)
        }
    }
}

/// Keep letters, digits, space, `_` and `-`; trim trailing whitespace
pub fn sanitize(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// `<category>/<display-name>.<ext>`, relative to the export root.
///
/// Fails when the display name has nothing left after sanitizing.
pub fn course_path(course: &Course, format: ExportFormat) -> Result<PathBuf> {
    let stem = sanitize(&course.display_name());
    if stem.trim().is_empty() {
        return Err(Error::Config(format!(
            "Course name '{}' has no characters usable in a file name",
            course.display_name()
        )));
    }
    let mut path = PathBuf::from(sanitize(course.category.label()));
    path.push(format!("{}.{}", stem, format.extension()));
    Ok(path)
}

fn description(course: &Course) -> Result<String> {
    let stats = course.statistics()?;
    let mut parts = vec![course.category.to_string()];
    parts.extend(
        stats
            .fields()
            .into_iter()
            .map(|(field, value)| format!("{}={}", field, value)),
    );
    Ok(parts.join(" "))
}

/// Full text of one course file
pub fn render(course: &Course, options: &ExportOptions) -> Result<String> {
    let ftp = course.basis().map(|b| b.ftp).ok_or_else(|| {
        Error::Statistics(format!("course '{}' is not finalized", course.display_name()))
    })?;

    let mut lines = vec![
        "[COURSE HEADER]".to_string(),
        format!("VERSION = {}", options.file_version),
        "UNITS = ENGLISH".to_string(),
        format!("DESCRIPTION = {}", description(course)?),
    ];
    match options.format {
        ExportFormat::Erg => {
            lines.push(format!("FILE NAME = {}", course.file_name()));
            lines.push(format!("FTP = {}", options.header_ftp));
            lines.push("MINUTES WATTS".to_string());
        }
        ExportFormat::Mrc => {
            lines.push(format!("FILE NAME = {}.mrc", course.name));
            lines.push("MINUTES PERCENT".to_string());
        }
    }
    lines.push("[END COURSE HEADER]".to_string());
    lines.push("[COURSE DATA]".to_string());

    let scale = |watts: f64| match options.format {
        ExportFormat::Erg => watts,
        ExportFormat::Mrc => watts / ftp * 100.0,
    };
    for seg in course.segments() {
        lines.push(format!(
            "{}\t{}",
            format_number(seg.start_time),
            format_number(scale(seg.power_start))
        ));
        lines.push(format!(
            "{}\t{}",
            format_number(seg.end_time()),
            format_number(scale(seg.power_end()))
        ));
    }
    lines.push("[END COURSE DATA]".to_string());

    Ok(lines.join("\n"))
}

/// Write one course under `root`, creating its category directory
pub fn write_course(root: &Path, course: &Course, options: &ExportOptions) -> Result<PathBuf> {
    let path = root.join(course_path(course, options.format)?);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, render(course, options)?)?;
    tracing::debug!("Exported '{}' to {:?}", course.display_name(), path);
    Ok(path)
}
