//! Policy fragments and the fragment normalizer.
//!
//! A fragment is a named, ordered unit of policy composed via "extends"
//! layering. Fragments arrive as already-parsed [`FragmentSpec`] values (the
//! JSON/JSON5 front end is an external collaborator) and are normalized into
//! immutable, compiled [`PolicyFragment`]s with precedence indices assigned
//! by input order.
//!
//! Normalization fails closed: any invalid rule rejects the whole fragment,
//! and the error names the fragment and the offending rule index.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::matcher::{CompiledPattern, Matcher};
use crate::rate::RateLimits;
use crate::rule::{Directives, LockfileMaintenance, LockfileMaintenanceSpec, PackageRule, RuleSpec};
use crate::schedule::{parse_timezone, ScheduleSpec};

/// Raw policy fragment, as handed over by the parsing front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FragmentSpec {
    /// Fragment name. Required and unique within a stack.
    pub name: String,
    /// Optional version tag.
    pub version: Option<String>,
    /// Timezone schedules are evaluated in ('UTC' or a fixed offset).
    pub timezone: Option<String>,
    /// Labels unioned into every decision of the stack.
    pub default_labels: Vec<String>,
    /// Partial dispatch ceilings contributed by this fragment.
    pub pr_hourly_limit: Option<u32>,
    /// Partial dispatch ceilings contributed by this fragment.
    pub pr_concurrent_limit: Option<u32>,
    /// Fragment-wide lockfile-maintenance directive.
    pub lockfile_maintenance: Option<LockfileMaintenanceSpec>,
    /// Ordered package rules.
    pub rules: Vec<RuleSpec>,
}

impl FragmentSpec {
    /// Convenience constructor for a named fragment.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A normalized, immutable policy fragment.
#[derive(Debug, Clone)]
pub struct PolicyFragment {
    name: String,
    version: Option<String>,
    precedence: usize,
    timezone: Option<FixedOffset>,
    timezone_label: Option<String>,
    default_labels: Vec<String>,
    rate_limits: RateLimits,
    lockfile_maintenance: Option<LockfileMaintenance>,
    rules: Vec<PackageRule>,
}

impl PolicyFragment {
    /// Fragment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional version tag.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Position in the extends stack (0 = most foundational).
    #[must_use]
    pub const fn precedence(&self) -> usize {
        self.precedence
    }

    /// Declared timezone offset, if any.
    #[must_use]
    pub const fn timezone(&self) -> Option<FixedOffset> {
        self.timezone
    }

    /// Declared timezone string, if any.
    #[must_use]
    pub fn timezone_label(&self) -> Option<&str> {
        self.timezone_label.as_deref()
    }

    /// Labels unioned into every decision of the stack.
    #[must_use]
    pub fn default_labels(&self) -> &[String] {
        &self.default_labels
    }

    /// Partial dispatch ceilings contributed by this fragment.
    #[must_use]
    pub const fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }

    /// Fragment-wide lockfile-maintenance directive, if declared.
    #[must_use]
    pub fn lockfile_maintenance(&self) -> Option<&LockfileMaintenance> {
        self.lockfile_maintenance.as_ref()
    }

    /// Ordered compiled rules.
    #[must_use]
    pub fn rules(&self) -> &[PackageRule] {
        &self.rules
    }
}

/// Validates and compiles one fragment, assigning it a precedence index.
///
/// # Errors
///
/// Returns a [`ValidationError`] identifying the fragment and (for
/// rule-scoped failures) the offending rule index. The whole fragment is
/// rejected; partial application is disallowed.
pub fn normalize_fragment(
    spec: &FragmentSpec,
    precedence: usize,
) -> Result<PolicyFragment, ValidationError> {
    let name = spec.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyFragmentName);
    }

    let timezone = match &spec.timezone {
        Some(tz) => Some(parse_timezone(tz).ok_or_else(|| ValidationError::UnknownTimezone {
            fragment: name.to_string(),
            timezone: tz.clone(),
        })?),
        None => None,
    };

    for label in &spec.default_labels {
        if label.trim().is_empty() {
            return Err(ValidationError::EmptyDefaultLabel {
                fragment: name.to_string(),
            });
        }
    }

    let lockfile_maintenance = match &spec.lockfile_maintenance {
        Some(lm) => Some(compile_fragment_lockfile(name, lm)?),
        None => None,
    };

    let mut rules = Vec::with_capacity(spec.rules.len());
    for (rule_index, rule) in spec.rules.iter().enumerate() {
        rules.push(compile_rule(name, rule_index, rule)?);
    }

    Ok(PolicyFragment {
        name: name.to_string(),
        version: spec.version.clone(),
        precedence,
        timezone,
        timezone_label: spec.timezone.clone(),
        default_labels: spec.default_labels.clone(),
        rate_limits: RateLimits {
            pr_hourly_limit: spec.pr_hourly_limit,
            pr_concurrent_limit: spec.pr_concurrent_limit,
        },
        lockfile_maintenance,
        rules,
    })
}

fn compile_fragment_lockfile(
    fragment: &str,
    spec: &LockfileMaintenanceSpec,
) -> Result<LockfileMaintenance, ValidationError> {
    let schedule = match &spec.schedule {
        Some(strings) => Some(ScheduleSpec::parse(strings).map_err(|(bad, source)| {
            ValidationError::InvalidFragmentSchedule {
                fragment: fragment.to_string(),
                spec: bad,
                source,
            }
        })?),
        None => None,
    };
    Ok(LockfileMaintenance {
        enabled: spec.enabled,
        schedule,
        automerge: spec.automerge,
    })
}

fn compile_patterns(
    fragment: &str,
    rule_index: usize,
    patterns: &[String],
    case_insensitive: bool,
    matcher: &'static str,
) -> Result<Vec<CompiledPattern>, ValidationError> {
    if patterns.is_empty() {
        return Err(ValidationError::EmptyMatcherList {
            fragment: fragment.to_string(),
            rule_index,
            matcher,
        });
    }
    patterns
        .iter()
        .map(|p| {
            CompiledPattern::compile(p, case_insensitive).map_err(|reason| {
                ValidationError::InvalidPattern {
                    fragment: fragment.to_string(),
                    rule_index,
                    pattern: p.clone(),
                    reason,
                }
            })
        })
        .collect()
}

fn require_non_empty<T: Clone>(
    fragment: &str,
    rule_index: usize,
    values: &[T],
    matcher: &'static str,
) -> Result<Vec<T>, ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::EmptyMatcherList {
            fragment: fragment.to_string(),
            rule_index,
            matcher,
        });
    }
    Ok(values.to_vec())
}

fn compile_rule(
    fragment: &str,
    rule_index: usize,
    spec: &RuleSpec,
) -> Result<PackageRule, ValidationError> {
    let mut matchers = Vec::new();

    if let Some(names) = &spec.match_package_names {
        matchers.push(Matcher::PackageNames(require_non_empty(
            fragment,
            rule_index,
            names,
            "match_package_names",
        )?));
    }
    if let Some(patterns) = &spec.match_package_patterns {
        matchers.push(Matcher::PackagePatterns(compile_patterns(
            fragment,
            rule_index,
            patterns,
            spec.case_insensitive,
            "match_package_patterns",
        )?));
    }
    if let Some(sources) = &spec.match_datasources {
        matchers.push(Matcher::Datasources(require_non_empty(
            fragment,
            rule_index,
            sources,
            "match_datasources",
        )?));
    }
    if let Some(types) = &spec.match_dependency_types {
        matchers.push(Matcher::DependencyTypes(require_non_empty(
            fragment,
            rule_index,
            types,
            "match_dependency_types",
        )?));
    }
    if let Some(kinds) = &spec.match_update_kinds {
        matchers.push(Matcher::UpdateKinds(require_non_empty(
            fragment,
            rule_index,
            kinds,
            "match_update_kinds",
        )?));
    }
    if let Some(patterns) = &spec.match_source_url_patterns {
        matchers.push(Matcher::SourceUrlPatterns(compile_patterns(
            fragment,
            rule_index,
            patterns,
            spec.case_insensitive,
            "match_source_url_patterns",
        )?));
    }

    let stability_days = match spec.stability_days {
        Some(v) if v < 0 => {
            return Err(ValidationError::NegativeStabilityDays {
                fragment: fragment.to_string(),
                rule_index,
                value: v,
            });
        }
        Some(v) => Some(u32::try_from(v).map_err(|_| ValidationError::NegativeStabilityDays {
            fragment: fragment.to_string(),
            rule_index,
            value: v,
        })?),
        None => None,
    };

    for label in &spec.labels {
        if label.trim().is_empty() {
            return Err(ValidationError::EmptyLabel {
                fragment: fragment.to_string(),
                rule_index,
            });
        }
    }

    let schedule = match &spec.schedule {
        Some(strings) => Some(ScheduleSpec::parse(strings).map_err(|(bad, source)| {
            ValidationError::InvalidSchedule {
                fragment: fragment.to_string(),
                rule_index,
                spec: bad,
                source,
            }
        })?),
        None => None,
    };

    let lockfile_maintenance = match &spec.lockfile_maintenance {
        Some(lm) => {
            let schedule = match &lm.schedule {
                Some(strings) => Some(ScheduleSpec::parse(strings).map_err(|(bad, source)| {
                    ValidationError::InvalidSchedule {
                        fragment: fragment.to_string(),
                        rule_index,
                        spec: bad,
                        source,
                    }
                })?),
                None => None,
            };
            Some(LockfileMaintenance {
                enabled: lm.enabled,
                schedule,
                automerge: lm.automerge,
            })
        }
        None => None,
    };

    let directives = Directives {
        group_name: spec.group_name.clone(),
        automerge: spec.automerge,
        automerge_type: spec.automerge_type,
        stability_days,
        labels: spec.labels.clone(),
        schedule,
        lockfile_maintenance,
    };

    Ok(PackageRule::new(matchers, directives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{ChangeCandidate, Datasource, DependencyType, UpdateKind};

    fn rule_json(body: &str) -> RuleSpec {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_normalize_minimal_fragment() {
        let spec = FragmentSpec::named("base");
        let frag = normalize_fragment(&spec, 0).unwrap();
        assert_eq!(frag.name(), "base");
        assert_eq!(frag.precedence(), 0);
        assert!(frag.rules().is_empty());
        assert!(frag.rate_limits().is_unlimited());
    }

    #[test]
    fn test_empty_name_rejected() {
        let spec = FragmentSpec::named("   ");
        assert!(matches!(
            normalize_fragment(&spec, 0),
            Err(ValidationError::EmptyFragmentName)
        ));
    }

    #[test]
    fn test_negative_stability_days_rejects_fragment() {
        let mut spec = FragmentSpec::named("base");
        spec.rules.push(rule_json(r#"{"automerge": true}"#));
        spec.rules.push(rule_json(r#"{"stability_days": -1}"#));

        let err = normalize_fragment(&spec, 0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NegativeStabilityDays {
                rule_index: 1,
                value: -1,
                ..
            }
        ));
        assert_eq!(err.fragment(), Some("base"));
    }

    #[test]
    fn test_invalid_pattern_rejects_fragment() {
        let mut spec = FragmentSpec::named("base");
        spec.rules
            .push(rule_json(r#"{"match_package_patterns": ["([unclosed"]}"#));
        assert!(matches!(
            normalize_fragment(&spec, 0),
            Err(ValidationError::InvalidPattern { rule_index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_schedule_rejects_fragment() {
        let mut spec = FragmentSpec::named("base");
        spec.rules
            .push(rule_json(r#"{"schedule": ["after 02:00", "whenever"]}"#));
        let err = normalize_fragment(&spec, 0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidSchedule { ref spec, .. } if spec == "whenever"
        ));
    }

    #[test]
    fn test_empty_matcher_list_rejected() {
        let mut spec = FragmentSpec::named("base");
        spec.rules.push(rule_json(r#"{"match_package_names": []}"#));
        assert!(matches!(
            normalize_fragment(&spec, 0),
            Err(ValidationError::EmptyMatcherList {
                matcher: "match_package_names",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut spec = FragmentSpec::named("base");
        spec.timezone = Some("Mars/Olympus".to_string());
        assert!(matches!(
            normalize_fragment(&spec, 0),
            Err(ValidationError::UnknownTimezone { .. })
        ));
    }

    #[test]
    fn test_compiled_rule_matches() {
        let mut spec = FragmentSpec::named("base");
        spec.rules.push(rule_json(
            r#"{
                "match_datasources": ["crates-io"],
                "match_update_kinds": ["patch", "minor"],
                "automerge": true,
                "labels": ["rust"]
            }"#,
        ));
        let frag = normalize_fragment(&spec, 2).unwrap();
        assert_eq!(frag.precedence(), 2);

        let candidate = ChangeCandidate::new(
            "serde",
            Datasource::CratesIo,
            DependencyType::Runtime,
            UpdateKind::Patch,
        );
        assert!(frag.rules()[0].matches(&candidate));

        let major = ChangeCandidate::new(
            "serde",
            Datasource::CratesIo,
            DependencyType::Runtime,
            UpdateKind::Major,
        );
        assert!(!frag.rules()[0].matches(&major));
    }

    #[test]
    fn test_case_insensitive_flag_applies_to_patterns() {
        let mut spec = FragmentSpec::named("base");
        spec.rules.push(rule_json(
            r#"{"match_package_patterns": ["^SERDE$"], "case_insensitive": true}"#,
        ));
        let frag = normalize_fragment(&spec, 0).unwrap();

        let candidate = ChangeCandidate::new(
            "serde",
            Datasource::CratesIo,
            DependencyType::Runtime,
            UpdateKind::Patch,
        );
        assert!(frag.rules()[0].matches(&candidate));
    }

    #[test]
    fn test_fragment_lockfile_schedule_parse_error() {
        let mut spec = FragmentSpec::named("base");
        spec.lockfile_maintenance = Some(LockfileMaintenanceSpec {
            enabled: Some(true),
            schedule: Some(vec!["sometime".to_string()]),
            automerge: None,
        });
        assert!(matches!(
            normalize_fragment(&spec, 0),
            Err(ValidationError::InvalidFragmentSchedule { .. })
        ));
    }

    #[test]
    fn test_fragment_spec_round_trip() {
        let mut spec = FragmentSpec::named("ci");
        spec.version = Some("3".to_string());
        spec.default_labels = vec!["dependencies".to_string()];
        spec.pr_hourly_limit = Some(4);
        spec.rules.push(rule_json(r#"{"automerge": true}"#));

        let json = serde_json::to_string(&spec).unwrap();
        let back: FragmentSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
