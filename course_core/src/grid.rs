//! In-memory workbook model: sheets of cells plus merged-cell spans.
//!
//! This is the only view of a spreadsheet the rest of the crate sees. It is
//! populated from an `.xlsx` file (see [`crate::xlsx`]) or from a JSON
//! snapshot, and it carries the small write path used by the library
//! write-back.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

static EMPTY: CellValue = CellValue::Empty;

/// Value of a single cell
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Empty cells and whitespace-only text count as blank
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell; numeric text is accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Bool(_) | CellValue::Empty => None,
        }
    }

    /// Text view of the cell; `None` when blank
    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_string().trim().to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

/// A horizontal merge on one row, inclusive column bounds (0-based)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedSpan {
    pub row: u32,
    pub first_col: u32,
    pub last_col: u32,
}

/// One worksheet
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub title: String,
    #[serde(default)]
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub merges: Vec<MergedSpan>,
}

impl Sheet {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Cell at (row, col); cells outside the used area are empty
    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        self.rows
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .unwrap_or(&EMPTY)
    }

    /// Assign a cell, growing the grid as needed
    pub fn set_cell(&mut self, row: u32, col: u32, value: impl Into<CellValue>) {
        let (row, col) = (row as usize, col as usize);
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, CellValue::default);
        }
        cells[col] = value.into();
    }

    /// Write `values` left to right starting at (row, col)
    pub fn write_row(&mut self, row: u32, col: u32, values: &[CellValue]) {
        for (offset, value) in values.iter().enumerate() {
            self.set_cell(row, col + offset as u32, value.clone());
        }
    }

    /// Record a horizontal merge
    pub fn merge(&mut self, row: u32, first_col: u32, last_col: u32) {
        self.merges.push(MergedSpan {
            row,
            first_col,
            last_col,
        });
    }

    /// Number of rows in the used area
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Index of the last row holding any non-empty cell
    pub fn last_populated_row(&self) -> Option<u32> {
        self.rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_empty()))
            .map(|r| r as u32)
    }

    /// Merged spans grouped by row, each row's spans sorted by first column
    pub fn merged_spans_by_row(&self) -> BTreeMap<u32, Vec<(u32, u32)>> {
        let mut by_row: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
        for span in &self.merges {
            if span.last_col > span.first_col {
                by_row
                    .entry(span.row)
                    .or_default()
                    .push((span.first_col, span.last_col));
            }
        }
        for spans in by_row.values_mut() {
            spans.sort_unstable();
            spans.dedup();
        }
        by_row
    }
}

/// An ordered set of sheets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Open a workbook, choosing the loader by file extension
    ///
    /// `.json` files are snapshots of this model; everything else goes
    /// through the xlsx loader.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Workbook(format!(
                "File does not exist: {}",
                path.display()
            )));
        }
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::load_json(path)
        } else {
            crate::xlsx::load(path)
        }
    }

    /// Load a JSON snapshot
    pub fn load_json(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let workbook: Workbook = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Loaded {} sheets from snapshot {:?}",
            workbook.sheets.len(),
            path
        );
        Ok(workbook)
    }

    /// Save as a JSON snapshot
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved workbook snapshot to {:?}", path);
        Ok(())
    }

    pub fn sheet(&self, title: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.title == title)
    }

    pub fn sheet_mut(&mut self, title: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.title == title)
    }

    /// Sheet with the given title, appended when absent
    pub fn sheet_or_insert(&mut self, title: &str) -> &mut Sheet {
        let index = match self.sheets.iter().position(|s| s.title == title) {
            Some(index) => index,
            None => {
                self.sheets.push(Sheet::new(title));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[index]
    }

    pub fn sheet_titles(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.title.as_str()).collect()
    }
}
