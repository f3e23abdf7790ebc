//! Package rules: matcher/directive separation.
//!
//! A rule couples a set of matchers (which candidates does this apply to?)
//! with a partial set of directives (what should happen to them?). Raw serde
//! shapes ([`RuleSpec`]) are separate from compiled forms ([`PackageRule`]);
//! compilation happens in the fragment normalizer.

use serde::{Deserialize, Serialize};

use crate::candidate::{ChangeCandidate, Datasource, DependencyType, UpdateKind};
use crate::matcher::Matcher;
use crate::schedule::ScheduleSpec;

/// How an approved automerge is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomergeType {
    /// Open a pull request and merge it once checks pass.
    Pr,
    /// Push to the target branch directly, no pull request.
    Branch,
    /// Open a pull request and leave a merge-approval comment.
    PrComment,
}

/// Raw lockfile-maintenance directive block, as authored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LockfileMaintenanceSpec {
    /// Whether periodic lockfile refresh is enabled.
    pub enabled: Option<bool>,
    /// Schedule window strings restricting the refresh.
    pub schedule: Option<Vec<String>>,
    /// Whether refresh changes are automerged.
    pub automerge: Option<bool>,
}

/// Compiled lockfile-maintenance directive block.
///
/// All fields are partial; blocks from later rules merge onto earlier ones
/// field by field (scalars overwrite, the schedule list overwrites as a
/// whole).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockfileMaintenance {
    /// Whether periodic lockfile refresh is enabled.
    pub enabled: Option<bool>,
    /// Schedule restricting the refresh.
    pub schedule: Option<ScheduleSpec>,
    /// Whether refresh changes are automerged.
    pub automerge: Option<bool>,
}

impl LockfileMaintenance {
    /// Merges a later block onto this one, field by field.
    pub fn merge_from(&mut self, other: &Self) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.schedule.is_some() {
            self.schedule = other.schedule.clone();
        }
        if other.automerge.is_some() {
            self.automerge = other.automerge;
        }
    }
}

/// Raw package rule, as authored in a fragment.
///
/// All matcher fields are optional; an absent matcher matches anything for
/// that attribute. All directive fields are optional partial updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RuleSpec {
    /// Exact package-name list.
    pub match_package_names: Option<Vec<String>>,
    /// Package-name regex patterns.
    pub match_package_patterns: Option<Vec<String>>,
    /// Datasource list.
    pub match_datasources: Option<Vec<Datasource>>,
    /// Dependency-type list.
    pub match_dependency_types: Option<Vec<DependencyType>>,
    /// Update-classification list.
    pub match_update_kinds: Option<Vec<UpdateKind>>,
    /// Source-URL regex patterns.
    pub match_source_url_patterns: Option<Vec<String>>,
    /// Marks this rule's pattern matchers as case-insensitive.
    pub case_insensitive: bool,

    /// Group name for branch/PR coalescing.
    pub group_name: Option<String>,
    /// Automerge eligibility.
    pub automerge: Option<bool>,
    /// How automerge is carried out.
    pub automerge_type: Option<AutomergeType>,
    /// Minimum days a release must age before action. Validated non-negative
    /// at normalization; authored as signed so malformed input is rejected
    /// rather than silently wrapped.
    pub stability_days: Option<i64>,
    /// Labels contributed to the decision (set union).
    pub labels: Vec<String>,
    /// Schedule window strings (whole-list overwrite).
    pub schedule: Option<Vec<String>>,
    /// Nested lockfile-maintenance block (recursive merge).
    pub lockfile_maintenance: Option<LockfileMaintenanceSpec>,
}

/// Compiled directive set of one rule.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    /// Group name for branch/PR coalescing.
    pub group_name: Option<String>,
    /// Automerge eligibility.
    pub automerge: Option<bool>,
    /// How automerge is carried out.
    pub automerge_type: Option<AutomergeType>,
    /// Minimum days a release must age before action.
    pub stability_days: Option<u32>,
    /// Labels contributed to the decision.
    pub labels: Vec<String>,
    /// Schedule specification (whole-list overwrite).
    pub schedule: Option<ScheduleSpec>,
    /// Nested lockfile-maintenance block.
    pub lockfile_maintenance: Option<LockfileMaintenance>,
}

/// A compiled package rule: matchers plus directives.
#[derive(Debug, Clone)]
pub struct PackageRule {
    matchers: Vec<Matcher>,
    directives: Directives,
}

impl PackageRule {
    /// Creates a rule from compiled parts.
    #[must_use]
    pub fn new(matchers: Vec<Matcher>, directives: Directives) -> Self {
        Self { matchers, directives }
    }

    /// Tests whether every present matcher is satisfied by the candidate.
    ///
    /// A rule with zero matchers matches every candidate; fragments use this
    /// for blanket defaults.
    #[must_use]
    pub fn matches(&self, candidate: &ChangeCandidate) -> bool {
        self.matchers.iter().all(|m| m.matches(candidate))
    }

    /// The rule's matchers.
    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// The rule's directives.
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }
}
