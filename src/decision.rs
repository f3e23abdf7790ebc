//! Effective decisions emitted to the automation layer.
//!
//! An [`EffectiveDecision`] is produced fresh per candidate and never shared
//! or mutated after emission. The external automation layer uses it to
//! label, group, schedule, and (optionally) automerge; the engine itself
//! performs no Git or CI I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::AutomergeType;

/// Whether a dispatch may proceed now or must wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DispatchVerdict {
    /// Ceilings and schedule permit dispatching immediately.
    AllowNow,
    /// Deferred until the given instant; re-request admission then.
    /// Queued dispatches are never dropped.
    QueuedUntil {
        /// Earliest instant at which admission is projected to succeed.
        until: DateTime<Utc>,
    },
}

impl DispatchVerdict {
    /// Convenience constructor for the queued variant.
    #[must_use]
    pub const fn queued_until(until: DateTime<Utc>) -> Self {
        Self::QueuedUntil { until }
    }

    /// True if the dispatch may proceed now.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::AllowNow)
    }
}

/// Resolved lockfile-maintenance settings, with engine defaults applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LockfileDecision {
    /// Whether periodic lockfile refresh is enabled.
    pub enabled: bool,
    /// Schedule window strings restricting the refresh (empty = anytime).
    pub schedule: Vec<String>,
    /// Whether refresh changes are automerged.
    pub automerge: bool,
}

/// The single effective decision governing one change candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveDecision {
    /// Group name for branch/PR coalescing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Automerge eligibility.
    pub automerge: bool,
    /// How automerge is carried out.
    pub automerge_type: AutomergeType,
    /// Minimum days a release must age before automatic action.
    pub stability_days: u32,
    /// Deduplicated labels in first-seen order.
    pub labels: Vec<String>,
    /// Schedule window strings (empty = anytime).
    pub schedule: Vec<String>,
    /// Timezone the schedule is evaluated in, as declared by the stack.
    pub timezone: String,
    /// Resolved lockfile-maintenance settings, if any fragment configured
    /// them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockfile_maintenance: Option<LockfileDecision>,
    /// The rate controller's dispatch verdict for this candidate.
    pub verdict: DispatchVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_verdict_allowed() {
        assert!(DispatchVerdict::AllowNow.is_allowed());
        let t = Utc.with_ymd_and_hms(2026, 8, 24, 2, 0, 0).unwrap();
        assert!(!DispatchVerdict::queued_until(t).is_allowed());
    }

    #[test]
    fn test_verdict_serialization_tagged() {
        let json = serde_json::to_string(&DispatchVerdict::AllowNow).unwrap();
        assert!(json.contains("allow_now"));

        let t = Utc.with_ymd_and_hms(2026, 8, 24, 2, 0, 0).unwrap();
        let json = serde_json::to_string(&DispatchVerdict::queued_until(t)).unwrap();
        assert!(json.contains("queued_until"));
        let back: DispatchVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DispatchVerdict::queued_until(t));
    }

    #[test]
    fn test_decision_round_trip() {
        let decision = EffectiveDecision {
            group_name: Some("rust minor".to_string()),
            automerge: true,
            automerge_type: AutomergeType::Pr,
            stability_days: 3,
            labels: vec!["dependencies".to_string(), "security".to_string()],
            schedule: vec!["after 02:00 on monday".to_string()],
            timezone: "UTC".to_string(),
            lockfile_maintenance: None,
            verdict: DispatchVerdict::AllowNow,
        };

        let json = serde_json::to_string(&decision).unwrap();
        let back: EffectiveDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, back);
    }
}
