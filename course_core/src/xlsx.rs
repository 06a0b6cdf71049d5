//! `.xlsx` loader backed by calamine.
//!
//! Reads every worksheet's used range and merged regions into the
//! [`Workbook`] model. Merges spanning several rows are anchored on their
//! top row, which is where the header text lives.

use crate::grid::{CellValue, Sheet, Workbook};
use crate::{Error, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;

pub fn load(path: &Path) -> Result<Workbook> {
    let mut source: Xlsx<_> = open_workbook(path)
        .map_err(|e| Error::Workbook(format!("Failed to open {}: {}", path.display(), e)))?;

    source
        .load_merged_regions()
        .map_err(|e| Error::Workbook(format!("Failed to read merged cells: {}", e)))?;

    let mut workbook = Workbook::default();
    for title in source.sheet_names() {
        let range = source
            .worksheet_range(&title)
            .map_err(|e| Error::Workbook(format!("Failed to read sheet '{}': {}", title, e)))?;

        let mut sheet = Sheet::new(title.clone());
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        for (row, col, value) in range.used_cells() {
            let value = convert(value);
            if !value.is_empty() {
                sheet.set_cell(row as u32 + row_offset, col as u32 + col_offset, value);
            }
        }

        for (_, _, dims) in source.merged_regions_by_sheet(&title) {
            sheet.merge(dims.start.0, dims.start.1, dims.end.1);
        }

        tracing::debug!(
            "Loaded sheet '{}' ({} rows, {} merges)",
            sheet.title,
            sheet.row_count(),
            sheet.merges.len()
        );
        workbook.sheets.push(sheet);
    }

    tracing::info!("Loaded {} sheets from {:?}", workbook.sheets.len(), path);
    Ok(workbook)
}

fn convert(value: &Data) -> CellValue {
    match value {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}
