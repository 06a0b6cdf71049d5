//! Library write-back: one row of statistics per course.
//!
//! Rows live in the workbook's library sheet, keyed by the `Name` column.
//! Existing rows are updated in place and new courses are appended after
//! the last populated row. The sheet is mirrored to a CSV sidecar, written
//! under an exclusive lock and renamed into place.

use crate::collection::CourseCollection;
use crate::config::LibraryConfig;
use crate::course::Course;
use crate::grid::{CellValue, Sheet};
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Key column of the library sheet
pub const NAME_COLUMN: &str = "Name";

/// Counts from one write-back
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LibraryReport {
    pub updated: usize,
    pub appended: usize,
}

/// Column titles and values of one course's library row
fn library_row(course: &Course, tag: &str) -> Result<Vec<(String, CellValue)>> {
    let stats = course.statistics()?;
    let mut row = vec![
        (NAME_COLUMN.to_string(), CellValue::from(course.display_name())),
        ("Tag".to_string(), tag.into()),
        ("Category".to_string(), course.category.label().into()),
        ("time".to_string(), CellValue::Int(stats.duration as i64)),
        ("average".to_string(), stats.average.into()),
        ("np".to_string(), stats.normalized_power.into()),
        ("ftpif".to_string(), stats.intensity_factor.into()),
        ("tss".to_string(), CellValue::Int(stats.tss as i64)),
    ];
    row.extend(stats.power_averages.0.iter().map(|(minutes, power)| {
        (
            format!("{}'", minutes),
            power.map(|p| CellValue::Int(p as i64)).unwrap_or_default(),
        )
    }));
    Ok(row)
}

/// Row holding the `Name` title, or a fresh title row at the top
fn header_row(sheet: &mut Sheet) -> u32 {
    let found = (0..sheet.row_count()).find(|&r| {
        sheet.rows[r as usize]
            .iter()
            .any(|c| c.as_text().as_deref() == Some(NAME_COLUMN))
    });
    match found {
        Some(row) => row,
        None => {
            let row = sheet.last_populated_row().map(|r| r + 1).unwrap_or(0);
            sheet.set_cell(row, 0, NAME_COLUMN);
            row
        }
    }
}

/// Column of `title` on the header row, added at the right when absent
fn column(sheet: &mut Sheet, header: u32, title: &str) -> u32 {
    let titles = &sheet.rows[header as usize];
    if let Some(col) = titles
        .iter()
        .position(|c| c.as_text().as_deref() == Some(title))
    {
        return col as u32;
    }
    let col = titles
        .iter()
        .rposition(|c| !c.is_empty())
        .map(|c| c + 1)
        .unwrap_or(0) as u32;
    sheet.set_cell(header, col, title);
    col
}

/// Upsert one row per course into `sheet`
pub fn update_sheet<'a, I>(sheet: &mut Sheet, courses: I, tag: &str) -> Result<LibraryReport>
where
    I: IntoIterator<Item = &'a Course>,
{
    let header = header_row(sheet);
    let name_col = column(sheet, header, NAME_COLUMN);
    let mut report = LibraryReport::default();

    for course in courses {
        let values = library_row(course, tag)?;
        let name = course.display_name();

        let existing = (header + 1..sheet.row_count())
            .find(|&r| sheet.cell(r, name_col).as_text().as_deref() == Some(name.as_str()));
        let row = match existing {
            Some(row) => {
                report.updated += 1;
                row
            }
            None => {
                report.appended += 1;
                sheet.last_populated_row().map(|r| r + 1).unwrap_or(header + 1).max(header + 1)
            }
        };

        for (title, value) in values {
            let col = column(sheet, header, &title);
            sheet.set_cell(row, col, value);
        }
        tracing::debug!("Library row {} for '{}'", row, name);
    }

    Ok(report)
}

fn parse_field(field: &str) -> CellValue {
    if field.trim().is_empty() {
        CellValue::Empty
    } else if let Ok(i) = field.parse::<i64>() {
        CellValue::Int(i)
    } else if let Ok(f) = field.parse::<f64>() {
        CellValue::Float(f)
    } else {
        CellValue::Text(field.to_string())
    }
}

/// Read a library CSV into a sheet; a missing file gives an empty sheet
pub fn load_csv(path: &Path, title: &str) -> Result<Sheet> {
    let mut sheet = Sheet::new(title);
    if !path.exists() {
        tracing::info!("No library file at {:?}, starting empty", path);
        return Ok(sheet);
    }

    let file = File::open(path)?;
    file.lock_shared()?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(&file);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let _ = file.unlock();
                return Err(e.into());
            }
        };
        rows.push(record.iter().map(parse_field).collect::<Vec<_>>());
    }
    file.unlock()?;

    for (r, values) in rows.iter().enumerate() {
        sheet.write_row(r as u32, 0, values);
    }
    tracing::debug!("Loaded {} library rows from {:?}", rows.len(), path);
    Ok(sheet)
}

/// Write every populated row of `sheet` to `path` atomically
pub fn write_csv(sheet: &Sheet, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let temp = NamedTempFile::new_in(&dir)?;
    temp.as_file().lock_exclusive()?;

    let last = sheet.last_populated_row().map(|r| r as usize + 1).unwrap_or(0);
    let width = sheet.rows[..last]
        .iter()
        .map(|r| r.iter().rposition(|c| !c.is_empty()).map(|c| c + 1).unwrap_or(0))
        .max()
        .unwrap_or(0);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(temp.as_file());
        for r in 0..last {
            let fields: Vec<String> = (0..width)
                .map(|c| sheet.cell(r as u32, c as u32).to_string())
                .collect();
            writer.write_record(&fields)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::info!("Wrote {} library rows to {:?}", last, path);
    Ok(())
}

/// Default sidecar location: next to the source workbook
pub fn default_path(collection: &CourseCollection, config: &LibraryConfig) -> PathBuf {
    collection
        .source()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."))
        .join(&config.file)
}

/// Update the collection's library sheet and persist it.
///
/// An existing CSV seeds an absent sheet so earlier rows survive. Workbooks
/// opened from a JSON snapshot get the snapshot rewritten as well.
pub fn write_back(
    collection: &mut CourseCollection,
    config: &LibraryConfig,
    csv_path: &Path,
) -> Result<LibraryReport> {
    let existing = collection
        .workbook()
        .sheets
        .iter()
        .position(|s| s.title == config.sheet);
    let (index, mut sheet) = match existing {
        Some(index) => (index, collection.workbook_mut().sheets.remove(index)),
        None => (
            collection.workbook().sheets.len(),
            load_csv(csv_path, &config.sheet)?,
        ),
    };

    // The sheet is detached while the courses are read
    let report = update_sheet(&mut sheet, collection.courses(), &config.tag);
    collection.workbook_mut().sheets.insert(index, sheet);
    let report = report?;

    if let Some(library) = collection.workbook().sheet(&config.sheet) {
        write_csv(library, csv_path)?;
    }

    let snapshot = collection
        .source()
        .filter(|p| p.extension().map(|e| e.eq_ignore_ascii_case("json")).unwrap_or(false))
        .map(Path::to_path_buf);
    if let Some(snapshot) = snapshot {
        collection.workbook().save_json(&snapshot)?;
    }

    tracing::info!(
        "Library: {} updated, {} appended",
        report.updated,
        report.appended
    );
    Ok(report)
}
