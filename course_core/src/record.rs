//! Templated records: typed rows read from named sheet regions.
//!
//! Every record kind declares the region template it is found under, how
//! many rows it contributes to one course definition, and the mapping from
//! display column titles to semantic fields. Titles are compared in snake
//! form, so `Ramp-to Power` and `ramp to power` name the same column.

use crate::grid::CellValue;
use crate::region::{snake_case, RawRow};
use crate::types::{CourseSegment, Header, LinkRef};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Region name marking course-data sections; suffixes name variants
pub const COURSE_MARKER: &str = "Course";

/// The four kinds of record a course sheet holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Header,
    PrependedCourse,
    AppendedCourse,
    CourseSegment,
}

/// How many rows of a kind one course definition takes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    Singleton,
    List,
}

/// Static description of a record kind
#[derive(Debug)]
pub struct Template {
    pub kind: RecordKind,
    /// Text of the merged header cell that introduces the region
    pub template_name: &'static str,
    pub cardinality: Cardinality,
    /// Display title → field name
    pub columns: &'static [(&'static str, &'static str)],
    /// Fields that must be present on every row
    pub required: &'static [&'static str],
}

static TEMPLATES: [Template; 4] = [
    Template {
        kind: RecordKind::Header,
        template_name: "Header",
        cardinality: Cardinality::Singleton,
        columns: &[
            ("Name", "name"),
            ("Category", "category"),
            ("Repeat", "versions"),
            ("Comments", "comments"),
        ],
        required: &["name", "category"],
    },
    Template {
        kind: RecordKind::PrependedCourse,
        template_name: "Insert Before",
        cardinality: Cardinality::List,
        columns: &[("Name", "name"), ("Blend Seconds", "blend")],
        required: &["name"],
    },
    Template {
        kind: RecordKind::AppendedCourse,
        template_name: "Insert After",
        cardinality: Cardinality::List,
        columns: &[("Name", "name"), ("Blend Seconds", "blend")],
        required: &["name"],
    },
    Template {
        kind: RecordKind::CourseSegment,
        template_name: COURSE_MARKER,
        cardinality: Cardinality::List,
        columns: &[
            ("Time", "time"),
            ("Power", "power_start"),
            ("Ramp-to Power", "ramp_to"),
            ("Exclude from last repeat", "exclude"),
        ],
        required: &["time", "power_start"],
    },
];

/// Template lookup by region name, built once
static BY_TEMPLATE_NAME: Lazy<HashMap<&'static str, &'static Template>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|t| (t.template_name, t))
        .collect()
});

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Header => "Header",
            RecordKind::PrependedCourse => "PrependedCourse",
            RecordKind::AppendedCourse => "AppendedCourse",
            RecordKind::CourseSegment => "CourseSegment",
        }
    }

    pub fn template(&self) -> &'static Template {
        // TEMPLATES holds one entry per kind
        &TEMPLATES[match self {
            RecordKind::Header => 0,
            RecordKind::PrependedCourse => 1,
            RecordKind::AppendedCourse => 2,
            RecordKind::CourseSegment => 3,
        }]
    }

    /// Kind of record a region holds, judged by the region's name.
    ///
    /// Data sections are `Course` plus an optional variant suffix; the
    /// other kinds must match their template name exactly.
    pub fn from_region_name(name: &str) -> Option<RecordKind> {
        match BY_TEMPLATE_NAME.get(name) {
            Some(template) => Some(template.kind),
            None if name.starts_with(COURSE_MARKER) => Some(RecordKind::CourseSegment),
            None => None,
        }
    }
}

/// A parsed row, tagged by kind
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Header(Header),
    PrependedCourse(LinkRef),
    AppendedCourse(LinkRef),
    CourseSegment(CourseSegment),
}

/// Re-key `row` by field name and build a typed record.
///
/// Columns outside the kind's mapping are rejected, as is a row that lacks
/// a required field.
pub fn parse(kind: RecordKind, row: &RawRow) -> Result<Record> {
    let fields = remap(kind, row)?;
    let record = match kind {
        RecordKind::Header => Record::Header(Header {
            name: fields.required_text("name")?,
            category: fields.required_text("category")?.parse()?,
            comments: fields.text("comments"),
            versions: fields.raw("versions"),
        }),
        RecordKind::PrependedCourse => Record::PrependedCourse(fields.link()?),
        RecordKind::AppendedCourse => Record::AppendedCourse(fields.link()?),
        RecordKind::CourseSegment => {
            let mut segment = CourseSegment::new(
                fields.required_number("time")?,
                fields.required_number("power_start")?,
                fields.number("ramp_to")?,
            );
            segment.exclude = fields.flag("exclude")?.unwrap_or(false);
            Record::CourseSegment(segment)
        }
    };
    Ok(record)
}

fn remap(kind: RecordKind, row: &RawRow) -> Result<Fields> {
    let template = kind.template();
    let mut values = HashMap::new();
    for (title, value) in row {
        let wanted = snake_case(title);
        let field = template
            .columns
            .iter()
            .find(|(display, _)| snake_case(display) == wanted)
            .map(|(_, field)| *field)
            .ok_or_else(|| Error::Validation {
                kind: kind.name(),
                message: format!("unknown column '{}'", title),
            })?;
        values.insert(field, value.clone());
    }

    if let Some(missing) = template.required.iter().find(|f| !values.contains_key(*f)) {
        return Err(Error::Validation {
            kind: kind.name(),
            message: format!("missing column for field '{}'", missing),
        });
    }
    Ok(Fields { kind, values })
}

/// Field values of one row with typed accessors
struct Fields {
    kind: RecordKind,
    values: HashMap<&'static str, CellValue>,
}

impl Fields {
    fn invalid(&self, field: &str, expected: &str, value: &CellValue) -> Error {
        Error::Validation {
            kind: self.kind.name(),
            message: format!("field '{}' expects {}, got '{}'", field, expected, value),
        }
    }

    fn raw(&self, field: &str) -> CellValue {
        self.values.get(field).cloned().unwrap_or_default()
    }

    fn text(&self, field: &str) -> Option<String> {
        self.values.get(field).and_then(CellValue::as_text)
    }

    fn required_text(&self, field: &str) -> Result<String> {
        self.text(field)
            .ok_or_else(|| self.invalid(field, "text", &self.raw(field)))
    }

    fn number(&self, field: &str) -> Result<Option<f64>> {
        match self.values.get(field) {
            None => Ok(None),
            Some(v) if v.is_empty() => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(field, "a number", v)),
        }
    }

    fn required_number(&self, field: &str) -> Result<f64> {
        self.number(field)?
            .ok_or_else(|| self.invalid(field, "a number", &self.raw(field)))
    }

    fn flag(&self, field: &str) -> Result<Option<bool>> {
        let value = match self.values.get(field) {
            None => return Ok(None),
            Some(v) if v.is_empty() => return Ok(None),
            Some(v) => v,
        };
        match value {
            CellValue::Bool(b) => Ok(Some(*b)),
            CellValue::Int(i) => Ok(Some(*i != 0)),
            CellValue::Float(f) => Ok(Some(*f != 0.0)),
            CellValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "x" | "y" | "yes" | "true" | "1" => Ok(Some(true)),
                "n" | "no" | "false" | "0" => Ok(Some(false)),
                _ => Err(self.invalid(field, "a yes/no flag", value)),
            },
            CellValue::Empty => Ok(None),
        }
    }

    fn link(&self) -> Result<LinkRef> {
        let blend = self
            .number("blend")?
            .filter(|s| *s > 0.0)
            .map(|s| s.round() as u32);
        Ok(LinkRef {
            name: self.required_text("name")?,
            blend,
        })
    }
}
