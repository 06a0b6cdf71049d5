//! Courses: segment sequences assembled from one sheet's regions.
//!
//! A course sheet holds a `Header`, an `Insert Before` list, an
//! `Insert After` list and one or more `Course…` data sections. Each data
//! section is a variant of the base course, and each variant is instantiated
//! once per repeat count listed in the header's `Repeat` field.
//!
//! Lifecycle: constructed → linked (see [`crate::collection`]) → finalized.
//! Segments are frozen by [`Course::finalize`]; statistics are computed once
//! afterwards and memoized.

use crate::grid::CellValue;
use crate::record::{self, Cardinality, Record, RecordKind, COURSE_MARKER};
use crate::region::{ElementKeys, RegionRef, Regions};
use crate::stats::{self, CourseStats, StatsBasis};
use crate::types::{recalc_start_times, Category, CourseSegment, Header, LinkRef};
use crate::{Error, Result};
use once_cell::unsync::OnceCell;
use std::collections::HashSet;

/// A single course instance
#[derive(Debug)]
pub struct Course {
    pub name: String,
    /// Repeat count this instance was built with
    pub version: u32,
    /// Whether the display name carries the repeat count
    pub versioned: bool,
    pub category: Category,
    pub comments: Option<String>,
    segments: Vec<CourseSegment>,
    prepend: Vec<LinkRef>,
    append: Vec<LinkRef>,
    linked: bool,
    basis: Option<StatsBasis>,
    stats: OnceCell<CourseStats>,
}

impl Course {
    /// Build a course by repeating `template` `version` times.
    ///
    /// Only the last segment of the fully repeated list is dropped when it is
    /// marked excluded.
    pub fn new(
        name: impl Into<String>,
        category: Category,
        version: u32,
        template: &[CourseSegment],
    ) -> Self {
        let mut segments: Vec<CourseSegment> = (0..version)
            .flat_map(|_| template.iter().cloned())
            .collect();
        if segments.last().map(|s| s.exclude).unwrap_or(false) {
            segments.pop();
        }
        recalc_start_times(&mut segments);

        Self {
            name: name.into(),
            version,
            versioned: false,
            category,
            comments: None,
            segments,
            prepend: Vec::new(),
            append: Vec::new(),
            linked: false,
            basis: None,
            stats: OnceCell::new(),
        }
    }

    /// Set the references to splice before and after this course
    pub fn with_links(mut self, prepend: Vec<LinkRef>, append: Vec<LinkRef>) -> Self {
        self.prepend = prepend;
        self.append = append;
        self
    }

    /// Key of the course within its collection
    pub fn display_name(&self) -> String {
        if self.versioned {
            format!("{}-{}x", self.name, self.version)
        } else {
            self.name.clone()
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.erg", self.name)
    }

    pub fn segments(&self) -> &[CourseSegment] {
        &self.segments
    }

    pub fn prepend_links(&self) -> &[LinkRef] {
        &self.prepend
    }

    pub fn append_links(&self) -> &[LinkRef] {
        &self.append
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn is_finalized(&self) -> bool {
        self.basis.is_some()
    }

    /// FTP and windows the course was finalized with
    pub fn basis(&self) -> Option<&StatsBasis> {
        self.basis.as_ref()
    }

    /// Total duration in minutes
    pub fn total_time(&self) -> f64 {
        self.segments.last().map(|s| s.end_time()).unwrap_or(0.0)
    }

    /// Append one segment after the current last one
    pub fn push_segment(&mut self, mut segment: CourseSegment) -> Result<()> {
        self.ensure_mutable()?;
        segment.start_time = self.total_time();
        self.segments.push(segment);
        Ok(())
    }

    /// Replace the segments after linking; marks the course linked
    pub(crate) fn set_linked_segments(&mut self, mut segments: Vec<CourseSegment>) -> Result<()> {
        self.ensure_mutable()?;
        recalc_start_times(&mut segments);
        self.segments = segments;
        self.linked = true;
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_finalized() {
            Err(Error::Finalized(self.display_name()))
        } else {
            Ok(())
        }
    }

    /// Freeze the segments; statistics become available
    pub fn finalize(&mut self, basis: StatsBasis) {
        if self.basis.is_none() {
            self.basis = Some(basis);
        }
    }

    /// One power sample per second, recomputed on every call
    pub fn power_by_second(&self) -> Vec<f64> {
        stats::power_by_second(&self.segments)
    }

    /// Statistics of the finalized course, computed on first use
    pub fn statistics(&self) -> Result<&CourseStats> {
        let basis = self.basis.as_ref().ok_or_else(|| {
            Error::Statistics(format!("course '{}' is not finalized", self.display_name()))
        })?;
        self.stats
            .get_or_try_init(|| stats::compute(&self.segments, basis))
    }

    /// Multi-line summary: one line for the course, one per segment
    pub fn summary(&self, with_stats: bool) -> Result<String> {
        let comments = self.comments.as_deref().unwrap_or("");
        let mut lines = vec![if with_stats {
            format!(
                "{} : {}, {}, Comments : {}",
                self.category,
                self.display_name(),
                self.statistics()?,
                comments
            )
        } else {
            format!(
                "{} : {}-{}', Comments : {}",
                self.category,
                self.display_name(),
                self.total_time().round(),
                comments
            )
        }];
        lines.extend(self.segments.iter().map(|s| format!("\t{}", s)));
        Ok(lines.join("\n"))
    }
}

/// Join two segment lists, bridging a power step with a ramp of `blend`
/// seconds when one is requested.
///
/// Start times are left for the caller to recompute.
pub fn splice(
    mut earlier: Vec<CourseSegment>,
    later: Vec<CourseSegment>,
    blend: Option<u32>,
) -> Vec<CourseSegment> {
    if let (Some(seconds), Some(last), Some(first)) = (blend, earlier.last(), later.first()) {
        let (from, to) = (last.power_end(), first.power_start);
        if seconds > 0 && from != to {
            earlier.push(CourseSegment::blend(seconds, from, to));
        }
    }
    earlier.extend(later);
    earlier
}

/// Expand a header `Repeat` value into repeat counts.
///
/// Accepts a number (fractions truncate), `start-stop` (inclusive), or a
/// comma-separated list of either. Blank means a single repeat.
pub fn parse_versions(value: &CellValue) -> Result<Vec<u32>> {
    let invalid = |detail: String| Error::Validation {
        kind: "Header",
        message: format!("invalid Repeat value '{}': {}", value, detail),
    };
    let count = |n: f64| -> Result<u32> {
        if n.is_finite() && n.trunc() >= 1.0 {
            Ok(n.trunc() as u32)
        } else {
            Err(invalid(format!("repeat count {} is below 1", n)))
        }
    };

    match value {
        v if v.is_empty() => Ok(vec![1]),
        CellValue::Int(i) => Ok(vec![count(*i as f64)?]),
        CellValue::Float(f) => Ok(vec![count(*f)?]),
        CellValue::Bool(_) => Err(invalid("expected a number".into())),
        CellValue::Text(text) => {
            let mut versions = Vec::new();
            for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if let Ok(n) = part.parse::<f64>() {
                    versions.push(count(n)?);
                } else if let Some((start, stop)) = part.split_once('-') {
                    let parse = |s: &str| {
                        s.trim()
                            .parse::<f64>()
                            .map_err(|_| invalid(format!("'{}' is not a number", s.trim())))
                            .and_then(count)
                    };
                    let (start, stop) = (parse(start)?, parse(stop)?);
                    if start > stop {
                        return Err(invalid(format!("range {}-{} is reversed", start, stop)));
                    }
                    versions.extend(start..=stop);
                } else {
                    return Err(invalid(format!("'{}' is not a number or range", part)));
                }
            }
            if versions.is_empty() {
                versions.push(1);
            }
            Ok(versions)
        }
        CellValue::Empty => Ok(vec![1]),
    }
}

fn parse_rows(kind: RecordKind, region: &RegionRef<'_>) -> Result<Vec<Record>> {
    let rows = region.list_dicts(ElementKeys::Titled, false);
    let take = match kind.template().cardinality {
        Cardinality::Singleton => 1,
        Cardinality::List => rows.len(),
    };
    rows.iter()
        .take(take)
        .map(|row| record::parse(kind, row))
        .collect()
}

fn links(records: Vec<Record>) -> Vec<LinkRef> {
    records
        .into_iter()
        .filter_map(|r| match r {
            Record::PrependedCourse(link) | Record::AppendedCourse(link) => Some(link),
            _ => None,
        })
        .collect()
}

/// Name each course-data section from its merged title.
///
/// The text after the `Course` marker distinguishes variants. When a sheet
/// has several data sections, an unsuffixed first one becomes `V1` and later
/// unsuffixed ones continue as `V{n}`; any repeated name gets the next free
/// `V{n}`.
fn variant_names(base: &str, titles: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut names = Vec::with_capacity(titles.len());
    for (i, title) in titles.iter().enumerate() {
        let suffix = title
            .get(COURSE_MARKER.len()..)
            .unwrap_or("")
            .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '_');
        let mut name = if !suffix.is_empty() {
            format!("{} {}", base, suffix)
        } else if (i == 0 && titles.len() > 1) || taken.contains(&format!("{} V1", base)) {
            format!("{} V1", base)
        } else {
            base.to_string()
        };

        let mut n = 2;
        while taken.contains(&name) {
            name = with_version_token(&name, n);
            n += 1;
        }
        taken.insert(name.clone());
        names.push(name);
    }
    names
}

fn with_version_token(name: &str, n: u32) -> String {
    match name.rsplit_once(' ') {
        Some((head, last))
            if last.len() > 1
                && last.starts_with('V')
                && last[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            format!("{} V{}", head, n)
        }
        _ => format!("{} V{}", name, n),
    }
}

/// Build every course defined on one sheet
pub fn courses_from_regions(regions: &Regions<'_>) -> Result<Vec<Course>> {
    let sheet = regions.sheet().title.clone();

    let mut header_region = None;
    let mut prepend_region = None;
    let mut append_region = None;
    let mut data_regions: Vec<RegionRef<'_>> = Vec::new();
    for region in regions.iter() {
        match RecordKind::from_region_name(region.name()) {
            Some(RecordKind::Header) => {
                header_region.get_or_insert(region);
            }
            Some(RecordKind::PrependedCourse) => {
                prepend_region.get_or_insert(region);
            }
            Some(RecordKind::AppendedCourse) => {
                append_region.get_or_insert(region);
            }
            Some(RecordKind::CourseSegment) => data_regions.push(region),
            None => tracing::trace!("Ignoring region '{}' on '{}'", region.name(), sheet),
        }
    }
    let (Some(header_region), Some(prepend_region), Some(append_region)) =
        (header_region, prepend_region, append_region)
    else {
        let missing = [
            (RecordKind::Header, header_region.is_none()),
            (RecordKind::PrependedCourse, prepend_region.is_none()),
            (RecordKind::AppendedCourse, append_region.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(kind, _)| kind.template().template_name.to_string())
        .collect();
        return Err(Error::MissingSections { sheet, missing });
    };

    let header: Header = match parse_rows(RecordKind::Header, &header_region)?
        .into_iter()
        .next()
    {
        Some(Record::Header(header)) => header,
        _ => {
            return Err(Error::Validation {
                kind: "Header",
                message: format!("sheet '{}' has an empty Header section", sheet),
            })
        }
    };
    let prepend = links(parse_rows(RecordKind::PrependedCourse, &prepend_region)?);
    let append = links(parse_rows(RecordKind::AppendedCourse, &append_region)?);

    let titles: Vec<String> = data_regions
        .iter()
        .map(|r| {
            let region = r.region();
            regions
                .sheet()
                .cell(region.key.row, region.min_col)
                .as_text()
                .unwrap_or_else(|| r.name().to_string())
        })
        .collect();
    let versions = parse_versions(&header.versions)?;
    let versioned = versions.len() > 1;

    let mut courses = Vec::new();
    for (region, name) in data_regions.iter().zip(variant_names(&header.name, &titles)) {
        let template: Vec<CourseSegment> = parse_rows(RecordKind::CourseSegment, region)?
            .into_iter()
            .filter_map(|r| match r {
                Record::CourseSegment(seg) => Some(seg),
                _ => None,
            })
            .collect();

        for &version in &versions {
            let mut course = Course::new(name.clone(), header.category, version, &template)
                .with_links(prepend.clone(), append.clone());
            course.versioned = versioned;
            course.comments = header.comments.clone();
            tracing::debug!(
                "Built course '{}' from '{}' ({} segments)",
                course.display_name(),
                sheet,
                course.segments().len()
            );
            courses.push(course);
        }
    }

    tracing::info!("Sheet '{}' defines {} courses", sheet, courses.len());
    Ok(courses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Sheet;
    use crate::region::extract_regions;

    fn seg(time: f64, power: f64) -> CourseSegment {
        CourseSegment::new(time, power, None)
    }

    fn assert_start_times_consistent(segments: &[CourseSegment]) {
        let mut elapsed = 0.0;
        for s in segments {
            assert!((s.start_time - elapsed).abs() < 1e-9);
            elapsed += s.time;
        }
    }

    /// Lay out one section: merged title, column titles, rows
    fn section(
        sheet: &mut Sheet,
        col: u32,
        title: &str,
        columns: &[&str],
        rows: &[Vec<CellValue>],
    ) {
        sheet.set_cell(0, col, title);
        sheet.merge(0, col, col + columns.len() as u32 - 1);
        let titles: Vec<CellValue> = columns.iter().map(|c| (*c).into()).collect();
        sheet.write_row(1, col, &titles);
        for (i, row) in rows.iter().enumerate() {
            sheet.write_row(2 + i as u32, col, row);
        }
    }

    fn course_sheet(repeat: CellValue, data_titles: &[&str]) -> Sheet {
        let mut sheet = Sheet::new("Threshold");
        section(
            &mut sheet,
            0,
            "Header",
            &["Name", "Category", "Repeat", "Comments"],
            &[vec!["Over Unders".into(), "Sweet Spot".into(), repeat, "hard".into()]],
        );
        section(&mut sheet, 5, "Insert Before", &["Name", "Blend Seconds"], &[]);
        section(&mut sheet, 8, "Insert After", &["Name", "Blend Seconds"], &[]);
        let mut col = 11;
        for title in data_titles {
            section(
                &mut sheet,
                col,
                title,
                &["Time", "Power", "Ramp-to Power", "Exclude from last repeat"],
                &[
                    vec![CellValue::Int(4), CellValue::Int(250)],
                    vec![CellValue::Int(1), CellValue::Int(320), CellValue::Empty, "x".into()],
                ],
            );
            col += 5;
        }
        sheet
    }

    #[test]
    fn test_repeat_expansion_drops_final_excluded_segment() {
        let mut last = seg(1.0, 100.0);
        last.exclude = true;
        let template = vec![seg(2.0, 200.0), seg(3.0, 300.0), last];

        let course = Course::new("c", Category::Anaerobic, 4, &template);
        assert_eq!(course.segments().len(), 4 * 3 - 1);
        assert_start_times_consistent(course.segments());
        assert_eq!(course.total_time(), 4.0 * 6.0 - 1.0);

        let plain = vec![seg(2.0, 200.0), seg(3.0, 300.0), seg(1.0, 100.0)];
        let course = Course::new("c", Category::Anaerobic, 4, &plain);
        assert_eq!(course.segments().len(), 12);
        assert_start_times_consistent(course.segments());
    }

    #[test]
    fn test_excluded_segment_kept_inside_repeats() {
        let mut rest = seg(1.0, 100.0);
        rest.exclude = true;
        let course = Course::new("c", Category::Anaerobic, 2, &[seg(2.0, 200.0), rest]);
        let powers: Vec<f64> = course.segments().iter().map(|s| s.power_start).collect();
        assert_eq!(powers, vec![200.0, 100.0, 200.0]);
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(parse_versions(&"3".into()).unwrap(), vec![3]);
        assert_eq!(parse_versions(&"2-4".into()).unwrap(), vec![2, 3, 4]);
        assert_eq!(parse_versions(&"1,3,5".into()).unwrap(), vec![1, 3, 5]);
        assert_eq!(parse_versions(&"1, 4-5".into()).unwrap(), vec![1, 4, 5]);
        assert_eq!(parse_versions(&"2.7".into()).unwrap(), vec![2]);
        assert_eq!(parse_versions(&CellValue::Float(3.9)).unwrap(), vec![3]);
        assert_eq!(parse_versions(&CellValue::Int(6)).unwrap(), vec![6]);
        assert_eq!(parse_versions(&CellValue::Empty).unwrap(), vec![1]);
        assert_eq!(parse_versions(&"".into()).unwrap(), vec![1]);
        assert!(parse_versions(&"4-2".into()).is_err());
        assert!(parse_versions(&"lots".into()).is_err());
        assert!(parse_versions(&CellValue::Int(0)).is_err());
    }

    #[test]
    fn test_splice_inserts_blend_on_power_step() {
        let mut joined = splice(vec![seg(5.0, 100.0)], vec![seg(5.0, 250.0)], Some(30));
        recalc_start_times(&mut joined);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[1].time, 0.5);
        assert_eq!(joined[1].power_start, 100.0);
        assert_eq!(joined[1].power_end(), 250.0);
        assert_start_times_consistent(&joined);
    }

    #[test]
    fn test_splice_without_step_or_blend() {
        assert_eq!(splice(vec![seg(5.0, 200.0)], vec![seg(5.0, 200.0)], Some(30)).len(), 2);
        assert_eq!(splice(vec![seg(5.0, 100.0)], vec![seg(5.0, 200.0)], None).len(), 2);
        assert_eq!(splice(vec![], vec![seg(5.0, 200.0)], Some(30)).len(), 1);
    }

    #[test]
    fn test_finalized_course_rejects_mutation() {
        let mut course = Course::new("c", Category::Warmup, 1, &[seg(1.0, 100.0)]);
        course.push_segment(seg(1.0, 150.0)).unwrap();
        assert_eq!(course.segments()[1].start_time, 1.0);

        assert!(course.statistics().is_err());
        course.finalize(StatsBasis::new(200.0));
        assert!(matches!(
            course.push_segment(seg(1.0, 150.0)),
            Err(Error::Finalized(_))
        ));
        let first = course.statistics().unwrap() as *const CourseStats;
        let second = course.statistics().unwrap() as *const CourseStats;
        assert_eq!(first, second);
    }

    #[test]
    fn test_display_name_and_summary() {
        let mut course = Course::new("Over Unders", Category::SweetSpot, 3, &[seg(2.5, 200.0)]);
        assert_eq!(course.display_name(), "Over Unders");
        course.versioned = true;
        assert_eq!(course.display_name(), "Over Unders-3x");
        assert_eq!(course.file_name(), "Over Unders.erg");

        let summary = course.summary(false).unwrap();
        assert_eq!(
            summary,
            concat!(
                "Sweet Spot : Over Unders-3x-8', Comments : \n",
                "\t2'30\"@200W\n\t2'30\"@200W\n\t2'30\"@200W"
            )
        );
    }

    #[test]
    fn test_variant_names() {
        let titles: Vec<String> = ["Course", "Course Hard", "Course V1", "Course"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(
            variant_names("Tempo", &titles),
            vec!["Tempo V1", "Tempo Hard", "Tempo V2", "Tempo V3"]
        );
        assert_eq!(variant_names("Tempo", &titles[..1]), vec!["Tempo"]);

        let suffixed_first: Vec<String> = vec!["Course Hard".into(), "Course".into()];
        assert_eq!(variant_names("Tempo", &suffixed_first), vec!["Tempo Hard", "Tempo"]);
        assert_eq!(with_version_token("Tempo Hard", 2), "Tempo Hard V2");
    }

    #[test]
    fn test_duplicate_course_titles_on_one_row() {
        let sheet = course_sheet(CellValue::Empty, &["Course", "Course"]);
        let regions = extract_regions(&sheet).unwrap();
        let courses = courses_from_regions(&regions).unwrap();
        let names: Vec<_> = courses.iter().map(|c| c.display_name()).collect();
        assert_eq!(names, vec!["Over Unders V1", "Over Unders V2"]);
    }

    #[test]
    fn test_courses_from_sheet() {
        let sheet = course_sheet("2-3".into(), &["Course"]);
        let regions = extract_regions(&sheet).unwrap();
        let courses = courses_from_regions(&regions).unwrap();

        let names: Vec<_> = courses.iter().map(|c| c.display_name()).collect();
        assert_eq!(names, vec!["Over Unders-2x", "Over Unders-3x"]);
        assert_eq!(courses[0].segments().len(), 3);
        assert_eq!(courses[1].segments().len(), 5);
        assert_eq!(courses[1].category, Category::SweetSpot);
        assert_eq!(courses[1].comments.as_deref(), Some("hard"));
        assert!(courses[0].prepend_links().is_empty());
        for course in &courses {
            assert_start_times_consistent(course.segments());
        }
    }

    #[test]
    fn test_courses_from_sheet_with_variants() {
        let sheet = course_sheet(CellValue::Empty, &["Course", "Course Long"]);
        let regions = extract_regions(&sheet).unwrap();
        let courses = courses_from_regions(&regions).unwrap();

        let names: Vec<_> = courses.iter().map(|c| c.display_name()).collect();
        assert_eq!(names, vec!["Over Unders V1", "Over Unders Long"]);
        assert!(courses.iter().all(|c| !c.versioned && c.version == 1));
    }

    #[test]
    fn test_missing_sections_are_listed() {
        let mut sheet = Sheet::new("Broken");
        section(&mut sheet, 0, "Insert After", &["Name", "Blend Seconds"], &[]);
        let regions = extract_regions(&sheet).unwrap();
        match courses_from_regions(&regions).unwrap_err() {
            Error::MissingSections { sheet, missing } => {
                assert_eq!(sheet, "Broken");
                assert_eq!(missing, vec!["Header", "Insert Before"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
