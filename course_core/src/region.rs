//! Implicit named regions recovered from merged-cell layout.
//!
//! A region starts at a merged cell whose text names it. The row directly
//! beneath holds column titles and the data rows follow until the first row
//! that is empty across the merged column span. A merged cell sitting on the
//! row right under a wider merged cell, inside its columns, is a nested child.
//!
//! Detection runs in two passes over [`Sheet::merged_spans_by_row`]: the
//! first pass measures and names every region into an arena, the second links
//! parents to children by arena index.

use crate::grid::{CellValue, Sheet};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Upper bound on `-N` suffixes tried when two regions share a key
const MAX_NAME_COLLISIONS: u32 = 100;

/// Characters folded into `_` when building identifiers
const SEPARATORS: [char; 5] = ['/', '-', ' ', '\\', '&'];

/// Fold free text into a variable-safe token.
///
/// Runs of separators become one `_`, anything else that is not
/// alphanumeric is dropped, and a leading digit (or an empty result) gets a
/// `_` prefix.
pub fn var_name(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if SEPARATORS.contains(&c) {
            if !in_run {
                folded.push('_');
            }
            in_run = true;
        } else {
            in_run = false;
            if c.is_alphanumeric() || c == '_' {
                folded.push(c);
            }
        }
    }
    match folded.chars().next() {
        None => "_".to_string(),
        Some(c) if c.is_numeric() => format!("_{}", folded),
        Some(_) => folded,
    }
}

/// Lower-case, underscore-delimited form of `text`.
///
/// Word breaks are inserted before a capital letter that follows a lower-case
/// letter or digit, so `RampTo Power` and `ramp-to power` agree.
pub fn snake_case(text: &str) -> String {
    let token = var_name(text);
    let mut snake = String::with_capacity(token.len() + 4);
    let mut prev: Option<char> = None;
    for c in token.chars() {
        if c.is_uppercase() {
            if let Some(p) = prev {
                if p.is_lowercase() || p.is_numeric() {
                    snake.push('_');
                }
            }
        }
        snake.extend(c.to_lowercase());
        prev = Some(c);
    }
    snake
}

/// Title-cased words of the snake form, joined
pub fn camel_case(text: &str) -> String {
    snake_case(text)
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Identity of a region within one sheet
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionKey {
    pub name: String,
    /// Row of the merged header cell
    pub row: u32,
}

/// Bounds and nesting of one region. Rows and columns are inclusive and
/// 0-based; `min_row` is the column-title row.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub key: RegionKey,
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
    children: Vec<usize>,
}

impl Region {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn has_nested(&self) -> bool {
        !self.children.is_empty()
    }

    /// Rows below the merged header, title row included
    pub fn nrows(&self) -> u32 {
        (self.max_row + 1).saturating_sub(self.min_row)
    }
}

/// Which columns a dict projection keeps
#[derive(Clone, Copy, Debug)]
pub enum ElementKeys<'k> {
    /// Every column with a non-empty title
    Titled,
    /// Only columns whose title is listed
    Titles(&'k [&'k str]),
}

/// An ordered title → value projection of one data row
pub type RawRow = Vec<(String, CellValue)>;

/// Data rows of a region under validated positional field names
#[derive(Clone, Debug, PartialEq)]
pub struct PositionalRows {
    pub type_name: String,
    pub fields: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// One row of a region with its grid coordinates
#[derive(Clone, Debug)]
pub struct RegionRow<'a> {
    pub row: u32,
    pub first_col: u32,
    pub values: Vec<&'a CellValue>,
}

impl<'a> RegionRow<'a> {
    /// (row, col, value) for every cell in the row
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &'a CellValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.row, self.first_col + i as u32, *v))
    }
}

/// All regions discovered on one sheet
#[derive(Debug)]
pub struct Regions<'a> {
    sheet: &'a Sheet,
    arena: Vec<Region>,
    index: HashMap<RegionKey, usize>,
}

/// Discover every implicit named region on `sheet`
pub fn extract_regions(sheet: &Sheet) -> Result<Regions<'_>> {
    let spans = sheet.merged_spans_by_row();
    let mut arena = Vec::new();
    let mut index = HashMap::new();
    let mut by_anchor: HashMap<(u32, u32), usize> = HashMap::new();

    // Pass 1: measure and name
    for (&row, row_spans) in &spans {
        for &(start, end) in row_spans {
            let title = match sheet.cell(row, start).as_text() {
                Some(title) => title,
                None => {
                    tracing::debug!(
                        "Skipping untitled merge on '{}' row {} cols {}..={}",
                        sheet.title,
                        row,
                        start,
                        end
                    );
                    continue;
                }
            };

            let mut height = 0;
            while (start..=end).any(|col| !sheet.cell(row + height, col).is_empty()) {
                height += 1;
            }

            let key = unique_key(&index, &title, row)?;
            let region = Region {
                key: key.clone(),
                min_row: row + 1,
                max_row: row + height - 1,
                min_col: start,
                max_col: end,
                children: Vec::new(),
            };
            tracing::debug!(
                "Region '{}' on '{}': rows {}..={} cols {}..={}",
                key.name,
                sheet.title,
                region.min_row,
                region.max_row,
                start,
                end
            );
            by_anchor.insert((row, start), arena.len());
            index.insert(key, arena.len());
            arena.push(region);
        }
    }

    // Pass 2: attach children from the following row
    for parent in 0..arena.len() {
        let (row, start, end) = {
            let r = &arena[parent];
            (r.key.row, r.min_col, r.max_col)
        };
        let Some(next_spans) = spans.get(&(row + 1)) else {
            continue;
        };
        let children: Vec<usize> = next_spans
            .iter()
            .filter(|(s, _)| (start..=end).contains(s))
            .filter_map(|(s, _)| by_anchor.get(&(row + 1, *s)).copied())
            .collect();
        arena[parent].children = children;
    }

    tracing::debug!("Found {} regions on '{}'", arena.len(), sheet.title);
    Ok(Regions {
        sheet,
        arena,
        index,
    })
}

fn unique_key(index: &HashMap<RegionKey, usize>, title: &str, row: u32) -> Result<RegionKey> {
    let mut key = RegionKey {
        name: title.to_string(),
        row,
    };
    let mut suffix = 1;
    while index.contains_key(&key) {
        if suffix > MAX_NAME_COLLISIONS {
            return Err(Error::NameCollision {
                name: title.to_string(),
                row,
            });
        }
        key.name = format!("{}-{}", title, suffix);
        suffix += 1;
    }
    Ok(key)
}

impl<'a> Regions<'a> {
    pub fn sheet(&self) -> &'a Sheet {
        self.sheet
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Regions in discovery order (top to bottom, left to right)
    pub fn iter(&self) -> impl Iterator<Item = RegionRef<'_>> {
        self.arena.iter().map(move |region| RegionRef {
            regions: self,
            region,
        })
    }

    /// Regions that are not nested inside another region
    pub fn top_level(&self) -> impl Iterator<Item = RegionRef<'_>> {
        let nested: HashSet<usize> = self
            .arena
            .iter()
            .flat_map(|r| r.children.iter().copied())
            .collect();
        self.arena
            .iter()
            .enumerate()
            .filter(move |(i, _)| !nested.contains(i))
            .map(move |(_, region)| RegionRef {
                regions: self,
                region,
            })
    }

    pub fn get(&self, key: &RegionKey) -> Option<RegionRef<'_>> {
        self.index.get(key).map(|&i| RegionRef {
            regions: self,
            region: &self.arena[i],
        })
    }

    /// First region named `name`, searching rows top to bottom
    pub fn find(&self, name: &str) -> Option<RegionRef<'_>> {
        self.iter().find(|r| r.region.key.name == name)
    }
}

/// A region together with the sheet it reads from
#[derive(Clone, Copy, Debug)]
pub struct RegionRef<'r> {
    regions: &'r Regions<'r>,
    region: &'r Region,
}

impl<'r> RegionRef<'r> {
    pub fn region(&self) -> &'r Region {
        self.region
    }

    pub fn key(&self) -> &'r RegionKey {
        &self.region.key
    }

    pub fn name(&self) -> &'r str {
        self.region.name()
    }

    /// Rows of the region, `skip` rows past the title row, at most `take` rows
    pub fn iter_rows(&self, skip: u32, take: Option<u32>) -> impl Iterator<Item = RegionRow<'r>> {
        let region = self.region;
        let sheet = self.regions.sheet;
        let first = region.min_row + skip;
        let last = match take {
            Some(n) if n > 0 && first + n <= region.max_row => first + n - 1,
            _ => region.max_row,
        };
        (first..=last).map(move |row| RegionRow {
            row,
            first_col: region.min_col,
            values: (region.min_col..=region.max_col)
                .map(|col| sheet.cell(row, col))
                .collect(),
        })
    }

    /// Values of each row, see [`RegionRef::iter_rows`]
    pub fn iter_values(
        &self,
        skip: u32,
        take: Option<u32>,
    ) -> impl Iterator<Item = Vec<&'r CellValue>> {
        self.iter_rows(skip, take).map(|r| r.values)
    }

    /// Column titles as written
    pub fn top_row(&self) -> Vec<&'r CellValue> {
        self.iter_values(0, Some(1)).next().unwrap_or_default()
    }

    /// Column titles in snake form
    pub fn header(&self) -> Vec<String> {
        self.top_row()
            .iter()
            .map(|c| snake_case(&c.to_string()))
            .collect()
    }

    /// Project data rows into ordered title → value rows.
    ///
    /// Projection stops at the first row whose kept values are all empty,
    /// even when later rows hold data in other columns.
    pub fn list_dicts(&self, keys: ElementKeys<'_>, snake_case_keys: bool) -> Vec<RawRow> {
        let titles: Vec<String> = if snake_case_keys {
            self.header()
        } else {
            self.top_row().iter().map(|c| c.to_string()).collect()
        };
        let kept: Vec<usize> = self
            .top_row()
            .iter()
            .enumerate()
            .filter(|(i, title)| match keys {
                ElementKeys::Titled => !title.is_empty(),
                ElementKeys::Titles(wanted) => wanted.contains(&titles[*i].as_str()),
            })
            .map(|(i, _)| i)
            .collect();

        let mut rows = Vec::new();
        for values in self.iter_values(1, None) {
            let row: RawRow = kept
                .iter()
                .map(|&i| (titles[i].clone(), values[i].clone()))
                .collect();
            if row.iter().all(|(_, v)| v.is_empty()) {
                break;
            }
            rows.push(row);
        }
        rows
    }

    /// Every row of the region, title row included, as raw tuples
    pub fn list_tuples(&self) -> Vec<Vec<CellValue>> {
        self.iter_values(0, None)
            .map(|row| row.into_iter().cloned().collect())
            .collect()
    }

    /// Read the region as a two-column key/value table.
    ///
    /// Every row counts, the title row included; rows with a blank key are
    /// skipped.
    pub fn dict(&self, key_index: usize, value_index: usize, snake_case_keys: bool) -> RawRow {
        self.iter_values(0, None)
            .filter_map(|row| {
                let key = row.get(key_index)?.as_text()?;
                let value = row.get(value_index).map(|v| (*v).clone()).unwrap_or_default();
                let key = if snake_case_keys { snake_case(&key) } else { key };
                Some((key, value))
            })
            .collect()
    }

    /// Data rows under positional field names taken from the header.
    ///
    /// Fails when a title folds to an identifier that is empty, starts with a
    /// digit, or repeats another column.
    pub fn tuples(&self) -> Result<PositionalRows> {
        let fields = self.header();
        let valid = {
            let mut seen = HashSet::new();
            !fields.is_empty()
                && fields
                    .iter()
                    .all(|f| !f.starts_with('_') && seen.insert(f.as_str()))
        };
        if !valid {
            return Err(Error::InvalidHeader {
                region: self.name().to_string(),
                header: self.top_row().iter().map(|c| c.to_string()).collect(),
            });
        }
        Ok(PositionalRows {
            type_name: camel_case(self.name()),
            fields,
            rows: self
                .iter_values(1, None)
                .map(|row| row.into_iter().cloned().collect())
                .collect(),
        })
    }

    /// Nested children, resolved recursively into one flat map
    pub fn implicit_named_ranges(&self) -> BTreeMap<RegionKey, RegionRef<'r>> {
        let mut found = BTreeMap::new();
        for &child in &self.region.children {
            let child = RegionRef {
                regions: self.regions,
                region: &self.regions.arena[child],
            };
            found.insert(child.key().clone(), child);
            found.extend(child.implicit_named_ranges());
        }
        found
    }

    pub fn has_nested(&self) -> bool {
        self.region.has_nested()
    }
}
