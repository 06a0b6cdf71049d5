//! Include/exclude name filtering with `*` wildcards.
//!
//! A pattern is matched case-insensitively against a whole name:
//! `*mid*` (contains), `*end` (suffix), `start*` (prefix) or an exact name.

/// One wildcard pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Contains(String),
    Suffix(String),
    Prefix(String),
    Exact(String),
}

impl Pattern {
    pub fn parse(pattern: &str) -> Self {
        let p = pattern.trim().to_lowercase();
        if p.len() >= 2 && p.starts_with('*') && p.ends_with('*') {
            Pattern::Contains(p[1..p.len() - 1].to_string())
        } else if let Some(rest) = p.strip_prefix('*') {
            Pattern::Suffix(rest.to_string())
        } else if let Some(rest) = p.strip_suffix('*') {
            Pattern::Prefix(rest.to_string())
        } else {
            Pattern::Exact(p)
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self {
            Pattern::Contains(s) => name.contains(s.as_str()),
            Pattern::Suffix(s) => name.ends_with(s.as_str()),
            Pattern::Prefix(s) => name.starts_with(s.as_str()),
            Pattern::Exact(s) => name == *s,
        }
    }
}

/// Include and exclude pattern lists
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    limit: Option<usize>,
}

impl NameFilter {
    /// An empty include list keeps every name
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: include.into_iter().map(|p| Pattern::parse(p.as_ref())).collect(),
            exclude: exclude.into_iter().map(|p| Pattern::parse(p.as_ref())).collect(),
            limit: None,
        }
    }

    /// Keep at most `limit` included names
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit).filter(|l| *l > 0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.limit.is_none()
    }

    fn included(&self, name: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|p| p.matches(name))
    }

    fn excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(name))
    }

    /// Names that pass, in input order.
    ///
    /// The limit applies to the include step, before exclusion.
    pub fn apply<'a, I>(&self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.included(name))
            .take(self.limit.unwrap_or(usize::MAX))
            .filter(|name| !self.excluded(name))
            .collect()
    }
}
