//! Rule matchers.
//!
//! A matcher is a predicate over one attribute of a [`ChangeCandidate`].
//! Matchers vary by attribute kind but share a uniform "does this candidate
//! satisfy me" contract; a rule matches a candidate iff every matcher it
//! carries is satisfied. Matching is pure and deterministic.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::candidate::{ChangeCandidate, Datasource, DependencyType, UpdateKind};

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compile a regex through the process-wide bounded cache.
///
/// Fragments routinely repeat the same patterns (shared presets), so
/// compilation is cached by the final pattern string, including any
/// case-insensitivity prefix.
pub(crate) fn cached_regex(pattern: &str) -> Result<Regex, String> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().map_err(|_| "regex cache lock poisoned".to_string())?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| e.to_string())?;

    let mut guard = cache.write().map_err(|_| "regex cache lock poisoned".to_string())?;

    if guard.len() >= REGEX_CACHE_MAX {
        // Keep the cache bounded to avoid unbounded memory usage.
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// A compiled pattern matcher, retaining the raw pattern for diagnostics.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    raw: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles a pattern, optionally case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error message if the pattern is invalid.
    pub fn compile(pattern: &str, case_insensitive: bool) -> Result<Self, String> {
        let effective = if case_insensitive {
            format!("(?i){pattern}")
        } else {
            pattern.to_string()
        };
        let regex = cached_regex(&effective)?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written by the fragment author.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Tests the pattern against a string.
    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

/// A predicate over one candidate attribute.
///
/// An absent matcher means "matches anything" for that attribute, so every
/// variant here is a positive constraint. Exact lists match by equality;
/// pattern lists match if any pattern matches (case-sensitive unless the
/// matcher was flagged case-insensitive at normalization).
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact package-name list.
    PackageNames(Vec<String>),
    /// Package-name regex patterns.
    PackagePatterns(Vec<CompiledPattern>),
    /// Datasource/ecosystem list.
    Datasources(Vec<Datasource>),
    /// Dependency-type list.
    DependencyTypes(Vec<DependencyType>),
    /// Update-classification list.
    UpdateKinds(Vec<UpdateKind>),
    /// Source repository URL regex patterns. A candidate with no known
    /// source URL never satisfies this matcher.
    SourceUrlPatterns(Vec<CompiledPattern>),
}

impl Matcher {
    /// Tests whether the candidate satisfies this matcher.
    #[must_use]
    pub fn matches(&self, candidate: &ChangeCandidate) -> bool {
        match self {
            Self::PackageNames(names) => names.iter().any(|n| n == &candidate.package_name),
            Self::PackagePatterns(patterns) => patterns
                .iter()
                .any(|p| p.is_match(&candidate.package_name)),
            Self::Datasources(sources) => sources.contains(&candidate.datasource),
            Self::DependencyTypes(types) => types.contains(&candidate.dependency_type),
            Self::UpdateKinds(kinds) => kinds.contains(&candidate.update_kind),
            Self::SourceUrlPatterns(patterns) => match candidate.source_url.as_deref() {
                Some(url) => patterns.iter().any(|p| p.is_match(url)),
                None => false,
            },
        }
    }

    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PackageNames(_) => "package_names",
            Self::PackagePatterns(_) => "package_patterns",
            Self::Datasources(_) => "datasources",
            Self::DependencyTypes(_) => "dependency_types",
            Self::UpdateKinds(_) => "update_kinds",
            Self::SourceUrlPatterns(_) => "source_url_patterns",
        }
    }
}
