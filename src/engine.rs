//! Policy stack loading and the evaluation engine.
//!
//! [`PolicyStack::load`] is called once per policy-version change; it
//! normalizes every fragment, assigns precedence indices by input order, and
//! resolves stack-level settings (timezone, rate ceilings). Loading is
//! all-or-nothing: a single invalid fragment rejects the stack and leaves
//! any previously activated stack untouched.
//!
//! [`PolicyEngine::evaluate`] is called once per detected dependency update.
//! Resolution is a pure read of the immutable stack, so independent
//! candidates evaluate fully in parallel; only per-scope rate admission
//! serializes.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::candidate::ChangeCandidate;
use crate::decision::{EffectiveDecision, LockfileDecision};
use crate::error::{PolicyResult, ValidationError};
use crate::fragment::{normalize_fragment, FragmentSpec, PolicyFragment};
use crate::rate::{RateController, RateLimits};
use crate::resolver::resolve;

fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap_or_else(|| unreachable!("zero offset is always valid"))
}

/// A loaded, immutable stack of policy fragments.
#[derive(Debug, Clone)]
pub struct PolicyStack {
    fragments: Vec<PolicyFragment>,
    timezone: FixedOffset,
    timezone_label: String,
    rate_limits: RateLimits,
}

impl PolicyStack {
    /// Loads and normalizes an ordered fragment list.
    ///
    /// Precedence indices follow input order (0 = most foundational). The
    /// stack timezone and rate ceilings follow scalar overwrite semantics:
    /// the highest-precedence fragment declaring a value wins.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered; no partial stack
    /// is ever produced.
    pub fn load(specs: &[FragmentSpec]) -> PolicyResult<Self> {
        let mut fragments = Vec::with_capacity(specs.len());
        for (precedence, spec) in specs.iter().enumerate() {
            let fragment = normalize_fragment(spec, precedence)?;
            if fragments
                .iter()
                .any(|f: &PolicyFragment| f.name() == fragment.name())
            {
                return Err(ValidationError::DuplicateFragmentName {
                    fragment: fragment.name().to_string(),
                }
                .into());
            }
            fragments.push(fragment);
        }

        let mut timezone = utc_offset();
        let mut timezone_label = "UTC".to_string();
        let mut rate_limits = RateLimits::unlimited();
        for fragment in &fragments {
            if let (Some(tz), Some(label)) = (fragment.timezone(), fragment.timezone_label()) {
                timezone = tz;
                timezone_label = label.to_string();
            }
            rate_limits.merge_from(&fragment.rate_limits());
        }

        debug!(
            fragments = fragments.len(),
            timezone = %timezone_label,
            "policy stack loaded"
        );

        Ok(Self {
            fragments,
            timezone,
            timezone_label,
            rate_limits,
        })
    }

    /// Fragments in ascending precedence order.
    #[must_use]
    pub fn fragments(&self) -> &[PolicyFragment] {
        &self.fragments
    }

    /// Timezone schedules are evaluated in.
    #[must_use]
    pub const fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// The declared timezone string ("UTC" if none was declared).
    #[must_use]
    pub fn timezone_label(&self) -> &str {
        &self.timezone_label
    }

    /// Effective dispatch ceilings for the stack.
    #[must_use]
    pub const fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }
}

/// The evaluation engine for one governance scope (typically a repository).
///
/// Holds an immutable [`PolicyStack`] (swappable on policy-version changes)
/// and an injected [`RateController`], which may be shared across engines to
/// enforce process-wide ceilings per scope.
pub struct PolicyEngine {
    stack: RwLock<Arc<PolicyStack>>,
    rate: Arc<RateController>,
    scope: String,
}

impl PolicyEngine {
    /// Creates an engine with its own rate controller.
    #[must_use]
    pub fn new(stack: Arc<PolicyStack>, scope: impl Into<String>) -> Self {
        Self::with_rate_controller(stack, scope, Arc::new(RateController::new()))
    }

    /// Creates an engine using a shared rate controller.
    #[must_use]
    pub fn with_rate_controller(
        stack: Arc<PolicyStack>,
        scope: impl Into<String>,
        rate: Arc<RateController>,
    ) -> Self {
        let scope = scope.into();
        rate.configure_scope(scope.clone(), stack.rate_limits());
        Self {
            stack: RwLock::new(stack),
            rate,
            scope,
        }
    }

    /// The governance scope this engine dispatches under.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The currently active stack.
    #[must_use]
    pub fn stack(&self) -> Arc<PolicyStack> {
        Arc::clone(
            &self
                .stack
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// The rate controller admission state is shared through.
    #[must_use]
    pub fn rate_controller(&self) -> &Arc<RateController> {
        &self.rate
    }

    /// Activates a new stack, preserving rate counters for the scope.
    pub fn swap_stack(&self, stack: Arc<PolicyStack>) {
        self.rate
            .configure_scope(self.scope.clone(), stack.rate_limits());
        let mut guard = self
            .stack
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = stack;
    }

    /// Resolves the effective decision for one change candidate at `now`.
    ///
    /// Resolution itself never fails for a loaded stack; a candidate
    /// matching no rule yields the hard defaults with an admission verdict
    /// attached.
    #[must_use]
    pub fn evaluate(&self, candidate: &ChangeCandidate, now: DateTime<Utc>) -> EffectiveDecision {
        let stack = self.stack();
        let policy = resolve(stack.fragments(), candidate);
        let verdict = self
            .rate
            .admit(&self.scope, &policy.schedule, stack.timezone(), now);

        debug!(
            candidate = %candidate,
            automerge = policy.automerge,
            group = policy.group_name.as_deref().unwrap_or(""),
            allowed = verdict.is_allowed(),
            "decision emitted"
        );

        EffectiveDecision {
            group_name: policy.group_name,
            automerge: policy.automerge,
            automerge_type: policy.automerge_type,
            stability_days: policy.stability_days,
            labels: policy.labels,
            schedule: policy.schedule.raw().to_vec(),
            timezone: stack.timezone_label().to_string(),
            lockfile_maintenance: policy.lockfile_maintenance.map(|lm| LockfileDecision {
                enabled: lm.enabled.unwrap_or(false),
                schedule: lm
                    .schedule
                    .map(|s| s.raw().to_vec())
                    .unwrap_or_default(),
                automerge: lm.automerge.unwrap_or(false),
            }),
            verdict,
        }
    }

    /// Reports one open dispatch for this scope as resolved.
    pub fn release(&self) {
        self.rate.release(&self.scope);
    }
}
