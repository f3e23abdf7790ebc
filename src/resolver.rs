//! Merge/override resolver.
//!
//! Folds every matching rule, across every fragment, into one effective
//! policy. The fold is pure: no shared state, no I/O, fully deterministic
//! for a fixed `(stack, candidate)` pair.
//!
//! Merge semantics per field:
//! - scalars (group name, automerge, automerge type, stability days, the
//!   schedule list as a whole): overwrite, last applied wins;
//! - label sets: union, first-seen order;
//! - the nested lockfile-maintenance block: recursive field-by-field merge
//!   under the same two policies.
//!
//! Fragments are scanned in ascending precedence order, rules in list order
//! within each fragment. Matcher specificity never affects the outcome. A
//! candidate matching no rule at all resolves to the hard defaults; that is
//! the designed fallback, not an error.

use tracing::debug;

use crate::candidate::ChangeCandidate;
use crate::fragment::PolicyFragment;
use crate::rule::{AutomergeType, Directives, LockfileMaintenance};
use crate::schedule::ScheduleSpec;

/// The folded policy for one candidate, before the rate verdict is attached.
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    /// Group name for branch/PR coalescing, if any rule set one.
    pub group_name: Option<String>,
    /// Automerge eligibility. Hard default: false.
    pub automerge: bool,
    /// How automerge is carried out. Hard default: pull request.
    pub automerge_type: AutomergeType,
    /// Minimum days a release must age before action. Hard default: 0.
    pub stability_days: u32,
    /// Deduplicated labels in first-seen order.
    pub labels: Vec<String>,
    /// Schedule restriction. Hard default: unrestricted.
    pub schedule: ScheduleSpec,
    /// Merged lockfile-maintenance block, if any fragment configured one.
    pub lockfile_maintenance: Option<LockfileMaintenance>,
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        Self {
            group_name: None,
            automerge: false,
            automerge_type: AutomergeType::Pr,
            stability_days: 0,
            labels: Vec::new(),
            schedule: ScheduleSpec::default(),
            lockfile_maintenance: None,
        }
    }
}

impl ResolvedPolicy {
    fn union_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    fn merge_lockfile(&mut self, block: &LockfileMaintenance) {
        match &mut self.lockfile_maintenance {
            Some(current) => current.merge_from(block),
            None => self.lockfile_maintenance = Some(block.clone()),
        }
    }

    fn apply(&mut self, directives: &Directives) {
        if let Some(group) = &directives.group_name {
            self.group_name = Some(group.clone());
        }
        if let Some(automerge) = directives.automerge {
            self.automerge = automerge;
        }
        if let Some(automerge_type) = directives.automerge_type {
            self.automerge_type = automerge_type;
        }
        if let Some(days) = directives.stability_days {
            self.stability_days = days;
        }
        for label in &directives.labels {
            self.union_label(label);
        }
        if let Some(schedule) = &directives.schedule {
            self.schedule = schedule.clone();
        }
        if let Some(block) = &directives.lockfile_maintenance {
            self.merge_lockfile(block);
        }
    }
}

/// Folds all matching rules of all fragments into one effective policy.
///
/// `fragments` must be in ascending precedence order, as produced by stack
/// loading.
#[must_use]
pub fn resolve(fragments: &[PolicyFragment], candidate: &ChangeCandidate) -> ResolvedPolicy {
    let mut policy = ResolvedPolicy::default();

    for fragment in fragments {
        // Fragment-scoped defaults apply ahead of the fragment's own rules.
        for label in fragment.default_labels() {
            policy.union_label(label);
        }
        if let Some(block) = fragment.lockfile_maintenance() {
            policy.merge_lockfile(block);
        }

        for (rule_index, rule) in fragment.rules().iter().enumerate() {
            if rule.matches(candidate) {
                debug!(
                    fragment = fragment.name(),
                    rule_index,
                    candidate = %candidate,
                    "rule applied"
                );
                policy.apply(rule.directives());
            }
        }
    }

    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Datasource, DependencyType, UpdateKind};
    use crate::fragment::{normalize_fragment, FragmentSpec};

    fn fragment(name: &str, precedence: usize, body: &str) -> PolicyFragment {
        let mut spec: FragmentSpec = serde_json::from_str(body).unwrap();
        spec.name = name.to_string();
        normalize_fragment(&spec, precedence).unwrap()
    }

    fn patch_candidate() -> ChangeCandidate {
        ChangeCandidate::new(
            "serde",
            Datasource::CratesIo,
            DependencyType::Runtime,
            UpdateKind::Patch,
        )
    }

    #[test]
    fn test_hard_defaults_when_nothing_matches() {
        let policy = resolve(&[], &patch_candidate());
        assert!(!policy.automerge);
        assert_eq!(policy.stability_days, 0);
        assert!(policy.labels.is_empty());
        assert!(policy.schedule.is_unrestricted());
        assert!(policy.group_name.is_none());
    }

    #[test]
    fn test_last_fragment_wins_for_scalars() {
        let a = fragment(
            "a",
            0,
            r#"{"rules": [{"match_update_kinds": ["patch"], "automerge": false}]}"#,
        );
        let b = fragment(
            "b",
            1,
            r#"{"rules": [{"match_update_kinds": ["patch"], "automerge": true}]}"#,
        );

        let policy = resolve(&[a.clone(), b.clone()], &patch_candidate());
        assert!(policy.automerge);

        // Reversing the order reverses the outcome.
        let a = fragment(
            "a",
            1,
            r#"{"rules": [{"match_update_kinds": ["patch"], "automerge": false}]}"#,
        );
        let b = fragment(
            "b",
            0,
            r#"{"rules": [{"match_update_kinds": ["patch"], "automerge": true}]}"#,
        );
        let policy = resolve(&[b, a], &patch_candidate());
        assert!(!policy.automerge);
    }

    #[test]
    fn test_intra_fragment_rule_order_breaks_ties() {
        let f = fragment(
            "a",
            0,
            r#"{"rules": [
                {"match_update_kinds": ["patch"], "stability_days": 7},
                {"match_package_names": ["serde"], "stability_days": 2}
            ]}"#,
        );
        let policy = resolve(&[f], &patch_candidate());
        assert_eq!(policy.stability_days, 2);
    }

    #[test]
    fn test_label_union_idempotent() {
        let a = fragment(
            "a",
            0,
            r#"{"rules": [{"labels": ["security", "dependencies"]}]}"#,
        );
        let b = fragment("b", 1, r#"{"rules": [{"labels": ["security"]}]}"#);

        let policy = resolve(&[a, b], &patch_candidate());
        assert_eq!(policy.labels, vec!["security", "dependencies"]);
    }

    #[test]
    fn test_labels_never_removed() {
        let a = fragment("a", 0, r#"{"rules": [{"labels": ["pinned"]}]}"#);
        let b = fragment(
            "b",
            1,
            r#"{"rules": [{"labels": [], "automerge": true}]}"#,
        );
        let policy = resolve(&[a, b], &patch_candidate());
        assert_eq!(policy.labels, vec!["pinned"]);
        assert!(policy.automerge);
    }

    #[test]
    fn test_non_matching_rules_skipped() {
        let f = fragment(
            "a",
            0,
            r#"{"rules": [
                {"match_update_kinds": ["major"], "automerge": false, "labels": ["breaking"]},
                {"match_update_kinds": ["patch"], "automerge": true}
            ]}"#,
        );
        let policy = resolve(&[f], &patch_candidate());
        assert!(policy.automerge);
        assert!(policy.labels.is_empty());
    }

    #[test]
    fn test_schedule_list_overwrites_as_a_whole() {
        let a = fragment(
            "a",
            0,
            r#"{"rules": [{"schedule": ["after 22:00", "before 05:00"]}]}"#,
        );
        let b = fragment("b", 1, r#"{"rules": [{"schedule": ["after 02:00 on monday"]}]}"#);

        let policy = resolve(&[a, b], &patch_candidate());
        assert_eq!(policy.schedule.raw(), ["after 02:00 on monday"]);
    }

    #[test]
    fn test_fragment_default_labels_union() {
        let a = fragment("a", 0, r#"{"default_labels": ["dependencies"], "rules": []}"#);
        let b = fragment(
            "b",
            1,
            r#"{"default_labels": ["dependencies"], "rules": [{"labels": ["rust"]}]}"#,
        );
        let policy = resolve(&[a, b], &patch_candidate());
        assert_eq!(policy.labels, vec!["dependencies", "rust"]);
    }

    #[test]
    fn test_lockfile_block_merges_recursively() {
        let a = fragment(
            "a",
            0,
            r#"{"lockfile_maintenance": {"enabled": true, "schedule": ["before 05:00"]}, "rules": []}"#,
        );
        let b = fragment(
            "b",
            1,
            r#"{"rules": [{"lockfile_maintenance": {"automerge": true}}]}"#,
        );

        let policy = resolve(&[a, b], &patch_candidate());
        let lm = policy.lockfile_maintenance.unwrap();
        assert_eq!(lm.enabled, Some(true));
        assert_eq!(lm.automerge, Some(true));
        assert_eq!(lm.schedule.unwrap().raw(), ["before 05:00"]);
    }

    #[test]
    fn test_group_name_overwrite() {
        let a = fragment(
            "a",
            0,
            r#"{"rules": [{"group_name": "all non-major"}]}"#,
        );
        let b = fragment(
            "b",
            1,
            r#"{"rules": [{"match_package_names": ["serde"], "group_name": "serde family"}]}"#,
        );
        let policy = resolve(&[a, b], &patch_candidate());
        assert_eq!(policy.group_name.as_deref(), Some("serde family"));
    }

    #[test]
    fn test_determinism() {
        let a = fragment(
            "a",
            0,
            r#"{"default_labels": ["deps"], "rules": [
                {"match_update_kinds": ["patch"], "automerge": true, "stability_days": 3,
                 "labels": ["patch"], "schedule": ["after 02:00 on monday"]}
            ]}"#,
        );
        let stack = vec![a];
        let first = resolve(&stack, &patch_candidate());
        for _ in 0..10 {
            let again = resolve(&stack, &patch_candidate());
            assert_eq!(again.automerge, first.automerge);
            assert_eq!(again.stability_days, first.stability_days);
            assert_eq!(again.labels, first.labels);
            assert_eq!(again.schedule, first.schedule);
        }
    }
}
