//! A workbook's worth of courses, linked and finalized together.
//!
//! Opening a collection runs the whole pipeline once: every sheet except
//! `config` and the library sheet is read into courses, prepend/append
//! references are resolved, and every course is finalized against the
//! collection's FTP.

use crate::config::Config;
use crate::course::{courses_from_regions, splice, Course};
use crate::export::{self, ExportOptions};
use crate::filter::NameFilter;
use crate::grid::Workbook;
use crate::region::extract_regions;
use crate::stats::StatsBasis;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Sheet holding collection-wide settings
pub const CONFIG_SHEET: &str = "config";

/// Key/value region of the config sheet
const USER_PROFILE: &str = "User Profile";
const FTP_KEY: &str = "Functional Threshold Power";

/// Ordered courses keyed by display name
#[derive(Debug)]
pub struct CourseCollection {
    name: String,
    ftp: f64,
    courses: Vec<Course>,
    index: HashMap<String, usize>,
    workbook: Workbook,
    source: Option<PathBuf>,
}

impl CourseCollection {
    /// Open a workbook file and build its collection
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let workbook = Workbook::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "collection".to_string());
        let mut collection = Self::from_workbook(name, workbook, config)?;
        collection.source = Some(path.to_path_buf());
        Ok(collection)
    }

    /// Build, link and finalize every course of `workbook`
    pub fn from_workbook(
        name: impl Into<String>,
        workbook: Workbook,
        config: &Config,
    ) -> Result<Self> {
        let name = name.into();
        let ftp = match read_profile_ftp(&workbook)? {
            Some(ftp) => ftp,
            None => config.profile.ftp.ok_or_else(|| {
                Error::Config(format!(
                    "No FTP for '{}': add a '{}' sheet with a '{}' section or set profile.ftp",
                    name, CONFIG_SHEET, USER_PROFILE
                ))
            })?,
        };
        if ftp <= 0.0 {
            return Err(Error::Config(format!("FTP must be positive, got {}", ftp)));
        }

        let mut courses = Vec::new();
        for sheet in &workbook.sheets {
            if sheet.title == CONFIG_SHEET || sheet.title == config.library.sheet {
                tracing::debug!("Skipping sheet '{}'", sheet.title);
                continue;
            }
            let regions = extract_regions(sheet)?;
            courses.extend(courses_from_regions(&regions)?);
        }

        let mut index = HashMap::with_capacity(courses.len());
        for (i, course) in courses.iter().enumerate() {
            if index.insert(course.display_name(), i).is_some() {
                return Err(Error::Config(format!(
                    "Duplicate course name '{}' in '{}'",
                    course.display_name(),
                    name
                )));
            }
        }

        let mut collection = Self {
            name,
            ftp,
            courses,
            index,
            workbook,
            source: None,
        };
        collection.link_all()?;
        collection.finalize_all(StatsBasis {
            ftp,
            power_windows: config.stats.power_windows.clone(),
        });
        tracing::info!("Opened {}", collection);
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ftp(&self) -> f64 {
        self.ftp
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Courses in sheet and row order
    pub fn courses(&self) -> impl Iterator<Item = &Course> {
        self.courses.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Course> {
        self.index.get(name).map(|&i| &self.courses[i])
    }

    pub fn names(&self) -> Vec<String> {
        self.courses.iter().map(|c| c.display_name()).collect()
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    /// Path the workbook was read from, when opened from a file
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Courses whose display names pass `filter`, in collection order
    pub fn filter(&self, filter: &NameFilter) -> Vec<&Course> {
        let names = self.names();
        filter
            .apply(names.iter().map(String::as_str))
            .into_iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Resolve every course's references
    pub fn link_all(&mut self) -> Result<()> {
        for i in 0..self.courses.len() {
            self.link_index(i, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Resolve one course's references, linking its targets first
    pub fn link(&mut self, name: &str) -> Result<()> {
        let i = self.index.get(name).copied().ok_or_else(|| Error::UnknownCourse {
            course: self.name.clone(),
            target: name.to_string(),
            known: self.names(),
        })?;
        self.link_index(i, &mut Vec::new())
    }

    fn link_index(&mut self, i: usize, chain: &mut Vec<String>) -> Result<()> {
        if self.courses[i].is_linked() {
            return Ok(());
        }
        let name = self.courses[i].display_name();
        if chain.contains(&name) {
            chain.push(name);
            return Err(Error::CyclicReference {
                chain: chain.clone(),
            });
        }
        chain.push(name.clone());

        let prepend = self.courses[i].prepend_links().to_vec();
        let append = self.courses[i].append_links().to_vec();
        let mut segments = self.courses[i].segments().to_vec();

        // Each prepend lands in front of everything spliced so far
        for link in &prepend {
            let target = self.resolve(&name, &link.name, chain)?;
            segments = splice(self.courses[target].segments().to_vec(), segments, link.blend);
        }
        for link in &append {
            let target = self.resolve(&name, &link.name, chain)?;
            segments = splice(segments, self.courses[target].segments().to_vec(), link.blend);
        }

        chain.pop();
        if !prepend.is_empty() || !append.is_empty() {
            tracing::debug!(
                "Linked '{}': {} before, {} after, {} segments",
                name,
                prepend.len(),
                append.len(),
                segments.len()
            );
        }
        self.courses[i].set_linked_segments(segments)
    }

    fn resolve(&mut self, course: &str, target: &str, chain: &mut Vec<String>) -> Result<usize> {
        let t = self.index.get(target).copied().ok_or_else(|| Error::UnknownCourse {
            course: course.to_string(),
            target: target.to_string(),
            known: self.names(),
        })?;
        self.link_index(t, chain)?;
        Ok(t)
    }

    fn finalize_all(&mut self, basis: StatsBasis) {
        for course in &mut self.courses {
            course.finalize(basis.clone());
        }
    }

    /// Collection line followed by each filtered course's summary
    pub fn summary(&self, with_stats: bool, filter: &NameFilter) -> Result<String> {
        let mut parts = vec![self.to_string()];
        for course in self.filter(filter) {
            parts.push(course.summary(with_stats)?.replace('\n', "\n\t"));
        }
        Ok(parts.join("\n\t"))
    }

    /// Export every filtered course under `dst`.
    ///
    /// Nothing is written when two courses would share an output path.
    pub fn save(
        &self,
        dst: &Path,
        options: &ExportOptions,
        filter: &NameFilter,
    ) -> Result<Vec<PathBuf>> {
        let courses = self.filter(filter);
        let mut claimed: HashMap<PathBuf, String> = HashMap::with_capacity(courses.len());
        for course in &courses {
            let path = export::course_path(course, options.format)?;
            if let Some(other) = claimed.insert(path.clone(), course.display_name()) {
                return Err(Error::Config(format!(
                    "Courses '{}' and '{}' would both be exported to {:?}",
                    other,
                    course.display_name(),
                    path
                )));
            }
        }

        std::fs::create_dir_all(dst)?;
        let written = courses
            .into_iter()
            .map(|course| export::write_course(dst, course, options))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Exported {} courses to {:?}", written.len(), dst);
        Ok(written)
    }
}

impl fmt::Display for CourseCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CourseCollection({}, {} Courses)", self.name, self.courses.len())
    }
}

/// FTP from the `config` sheet's user profile, if the sheet exists
fn read_profile_ftp(workbook: &Workbook) -> Result<Option<f64>> {
    let Some(sheet) = workbook.sheet(CONFIG_SHEET) else {
        return Ok(None);
    };
    let regions = extract_regions(sheet)?;
    let Some(profile) = regions.find(USER_PROFILE) else {
        return Ok(None);
    };

    let entries = profile.dict(0, 1, false);
    let value = entries
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(FTP_KEY))
        .map(|(_, value)| value)
        .ok_or_else(|| Error::Validation {
            kind: "UserProfile",
            message: format!("missing '{}'", FTP_KEY),
        })?;
    let ftp = value.as_f64().ok_or_else(|| Error::Validation {
        kind: "UserProfile",
        message: format!("'{}' expects a number, got '{}'", FTP_KEY, value),
    })?;
    tracing::debug!("FTP {} from '{}' sheet", ftp, CONFIG_SHEET);
    Ok(Some(ftp))
}
