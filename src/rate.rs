//! Rate controller: hourly and concurrency ceilings per scope.
//!
//! A scope is the governance boundary (typically one repository) over which
//! dispatch ceilings are enforced. Scopes are fully independent: each holds
//! its own counters behind its own mutex, and admissions for different
//! scopes never contend beyond the scope-map read lock.
//!
//! Check-and-increment is a single critical section; a queued verdict is
//! backpressure, never failure — queued candidates are re-evaluated on their
//! next admission attempt rather than via a standing timer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::DispatchVerdict;
use crate::schedule::ScheduleSpec;

/// Re-poll hint used when only the concurrency ceiling blocks admission and
/// nothing else projects a clearing instant. Concurrency clears via an
/// external `release`, which cannot be predicted.
fn concurrency_retry() -> Duration {
    Duration::minutes(5)
}

/// Dispatch ceilings for one scope. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RateLimits {
    /// Max dispatches within any trailing 60-minute window.
    pub pr_hourly_limit: Option<u32>,
    /// Max concurrently open dispatches.
    pub pr_concurrent_limit: Option<u32>,
}

impl RateLimits {
    /// No ceilings at all.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            pr_hourly_limit: None,
            pr_concurrent_limit: None,
        }
    }

    /// True if neither ceiling is configured.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.pr_hourly_limit.is_none() && self.pr_concurrent_limit.is_none()
    }

    /// Merges a higher-precedence partial onto this one (overwrite-if-set).
    pub fn merge_from(&mut self, other: &Self) {
        if other.pr_hourly_limit.is_some() {
            self.pr_hourly_limit = other.pr_hourly_limit;
        }
        if other.pr_concurrent_limit.is_some() {
            self.pr_concurrent_limit = other.pr_concurrent_limit;
        }
    }
}

/// Rolling counters for one scope.
#[derive(Debug, Default)]
struct ScopeState {
    /// Dispatch instants within the trailing hour, oldest first.
    hourly: VecDeque<DateTime<Utc>>,
    /// Currently open (unresolved) dispatches.
    open: u32,
}

impl ScopeState {
    /// Ages out dispatches older than the trailing 60-minute window.
    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(1);
        while self.hourly.front().map_or(false, |t| *t <= horizon) {
            self.hourly.pop_front();
        }
    }
}

#[derive(Debug)]
struct Scope {
    limits: RwLock<RateLimits>,
    state: Mutex<ScopeState>,
}

/// Process-wide rate controller, scoped per governance boundary.
///
/// A scope the controller has never been configured for has no ceilings:
/// admission for it is limited only by the decision's schedule. This is by
/// design, not an error.
#[derive(Debug, Default)]
pub struct RateController {
    scopes: RwLock<HashMap<String, Arc<Scope>>>,
}

impl RateController {
    /// Creates a controller with no configured scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ceilings for a scope, preserving any existing counters.
    pub fn configure_scope(&self, scope: impl Into<String>, limits: RateLimits) {
        let scope = scope.into();
        let mut map = self.scopes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        match map.get(&scope) {
            Some(existing) => {
                let mut guard = existing
                    .limits
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *guard = limits;
            }
            None => {
                map.insert(
                    scope,
                    Arc::new(Scope {
                        limits: RwLock::new(limits),
                        state: Mutex::new(ScopeState::default()),
                    }),
                );
            }
        }
    }

    fn scope(&self, scope: &str) -> Option<Arc<Scope>> {
        let map = self.scopes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.get(scope).cloned()
    }

    /// Requests admission of one dispatch under the given schedule.
    ///
    /// Admits immediately (and counts the dispatch) iff the instant is in
    /// the schedule window and both ceilings are clear. Otherwise returns
    /// the earliest projected instant at which the hourly ceiling clears or
    /// the next schedule window opens, whichever is later.
    pub fn admit(
        &self,
        scope: &str,
        schedule: &ScheduleSpec,
        tz: FixedOffset,
        now: DateTime<Utc>,
    ) -> DispatchVerdict {
        let in_win = schedule.in_window(tz, now);

        let Some(slot) = self.scope(scope) else {
            // Unknown scope: no ceilings configured, schedule still applies.
            if in_win {
                return DispatchVerdict::AllowNow;
            }
            let until = schedule
                .next_open(tz, now)
                .unwrap_or(now + concurrency_retry());
            return DispatchVerdict::QueuedUntil { until };
        };

        let limits = *slot
            .limits
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Check and increment under one lock; a check without an atomic
        // increment would let concurrent admissions exceed the ceilings.
        let mut state = slot
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.prune(now);

        let hourly_blocked = limits
            .pr_hourly_limit
            .map_or(false, |l| state.hourly.len() as u32 >= l);
        let concurrent_blocked = limits.pr_concurrent_limit.map_or(false, |l| state.open >= l);

        if in_win && !hourly_blocked && !concurrent_blocked {
            state.hourly.push_back(now);
            state.open += 1;
            debug!(scope, open = state.open, hourly = state.hourly.len(), "dispatch admitted");
            return DispatchVerdict::AllowNow;
        }

        let hourly_clear = if hourly_blocked {
            state.hourly.front().map(|t| *t + Duration::hours(1))
        } else {
            None
        };
        let window_open = if in_win { None } else { schedule.next_open(tz, now) };
        let concurrency_hint = if concurrent_blocked && hourly_clear.is_none() && window_open.is_none()
        {
            Some(now + concurrency_retry())
        } else {
            None
        };

        let until = [hourly_clear, window_open, concurrency_hint]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(now + concurrency_retry());

        debug!(
            scope,
            hourly_blocked,
            concurrent_blocked,
            in_window = in_win,
            %until,
            "dispatch queued"
        );
        DispatchVerdict::QueuedUntil { until }
    }

    /// Reports one open dispatch as resolved (merged or closed), freeing a
    /// concurrency slot. Unknown scopes are ignored; the count never goes
    /// below zero.
    pub fn release(&self, scope: &str) {
        if let Some(slot) = self.scope(scope) {
            let mut state = slot
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.open = state.open.saturating_sub(1);
        }
    }

    /// Currently open dispatch count for a scope (0 for unknown scopes).
    #[must_use]
    pub fn open_count(&self, scope: &str) -> u32 {
        self.scope(scope).map_or(0, |slot| {
            slot.state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .open
        })
    }
}
