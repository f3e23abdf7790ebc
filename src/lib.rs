//! # deppolicy - Layered Dependency-Update Policy Resolution
//!
//! deppolicy resolves what should happen to a proposed dependency update once
//! it is known: how it is grouped, whether it may automerge, when it may be
//! dispatched, which labels it carries, and how long it must age first.
//!
//! ## Core Concepts
//!
//! - **Fragment**: a named, ordered unit of policy composed via "extends"
//!   layering; later fragments override earlier ones field by field
//! - **Candidate**: one proposed dependency version change awaiting a decision
//! - **Matcher**: a predicate selecting which candidates a rule applies to
//! - **Directive**: the policy effect a matching rule contributes
//! - **Scope**: the governance boundary (e.g. one repository) rate ceilings
//!   are enforced over
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use deppolicy::{ChangeCandidate, Datasource, DependencyType, FragmentSpec,
//!     PolicyEngine, PolicyStack, UpdateKind};
//!
//! let specs: Vec<FragmentSpec> = serde_json::from_str(r#"[
//!     {"name": "base", "default_labels": ["dependencies"],
//!      "rules": [{"match_update_kinds": ["patch"], "automerge": true}]}
//! ]"#).unwrap();
//!
//! let stack = Arc::new(PolicyStack::load(&specs).unwrap());
//! let engine = PolicyEngine::new(stack, "my-org/my-repo");
//!
//! let candidate = ChangeCandidate::new(
//!     "serde", Datasource::CratesIo, DependencyType::Runtime, UpdateKind::Patch,
//! );
//! let decision = engine.evaluate(&candidate, Utc::now());
//! assert!(decision.automerge);
//! ```
//!
//! The engine performs no Git or CI I/O: the fragment-parsing front end and
//! the automation layer that opens and merges changes are external
//! collaborators.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod candidate;
pub mod decision;
pub mod error;
pub mod matcher;
pub mod rule;
pub mod schedule;

// Normalization, resolution, and admission
pub mod engine;
pub mod fragment;
pub mod rate;
pub mod resolver;

// Re-export primary types at crate root for convenience
pub use candidate::{ChangeCandidate, Datasource, DependencyType, UpdateKind};
pub use decision::{DispatchVerdict, EffectiveDecision, LockfileDecision};
pub use engine::{PolicyEngine, PolicyStack};
pub use error::{PolicyError, PolicyResult, ScheduleParseError, ValidationError};
pub use fragment::{FragmentSpec, PolicyFragment};
pub use matcher::Matcher;
pub use rate::{RateController, RateLimits};
pub use resolver::{resolve, ResolvedPolicy};
pub use rule::{AutomergeType, Directives, LockfileMaintenance, LockfileMaintenanceSpec, PackageRule, RuleSpec};
pub use schedule::{ScheduleSpec, ScheduleWindow};
