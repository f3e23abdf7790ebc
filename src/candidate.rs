//! Change-candidate descriptors.
//!
//! A [`ChangeCandidate`] describes one proposed dependency update awaiting a
//! policy decision. Candidates are produced by an external detector, consumed
//! once per evaluation, and never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The registry or ecosystem a dependency is resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datasource {
    /// crates.io (Rust).
    CratesIo,
    /// npm registry (JavaScript).
    Npm,
    /// PyPI (Python).
    Pypi,
    /// Maven Central and friends (JVM).
    Maven,
    /// Go module proxy.
    Go,
    /// Container image registries.
    Docker,
    /// GitHub release artifacts.
    GithubReleases,
    /// RubyGems.
    Rubygems,
    /// NuGet (.NET).
    Nuget,
    /// Any datasource not covered above.
    Other(String),
}

impl Datasource {
    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::CratesIo => "crates-io",
            Self::Npm => "npm",
            Self::Pypi => "pypi",
            Self::Maven => "maven",
            Self::Go => "go",
            Self::Docker => "docker",
            Self::GithubReleases => "github-releases",
            Self::Rubygems => "rubygems",
            Self::Nuget => "nuget",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a dependency is used by the consuming project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Needed at runtime.
    Runtime,
    /// Development-only (tests, tooling).
    Dev,
    /// Build-time (build scripts, plugins).
    Build,
    /// Peer dependency (host-provided).
    Peer,
    /// Optional dependency.
    Optional,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Runtime => "runtime",
            Self::Dev => "dev",
            Self::Build => "build",
            Self::Peer => "peer",
            Self::Optional => "optional",
        };
        write!(f, "{s}")
    }
}

/// Classification of the proposed version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Major version bump.
    Major,
    /// Minor version bump.
    Minor,
    /// Patch version bump.
    Patch,
    /// Content digest change with no version change (e.g. image digests).
    Digest,
    /// Pinning a range to an exact version.
    Pin,
    /// Downgrade to an earlier release.
    Rollback,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Digest => "digest",
            Self::Pin => "pin",
            Self::Rollback => "rollback",
        };
        write!(f, "{s}")
    }
}

/// One proposed dependency update awaiting a policy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCandidate {
    /// Package identity as known to its datasource.
    pub package_name: String,
    /// Where the package is resolved from.
    pub datasource: Datasource,
    /// How the consuming project uses the package.
    pub dependency_type: DependencyType,
    /// Classification of the version change.
    pub update_kind: UpdateKind,

    /// Upstream source repository URL, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ChangeCandidate {
    /// Creates a candidate with no source URL.
    #[must_use]
    pub fn new(
        package_name: impl Into<String>,
        datasource: Datasource,
        dependency_type: DependencyType,
        update_kind: UpdateKind,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            datasource,
            dependency_type,
            update_kind,
            source_url: None,
        }
    }

    /// Sets the source repository URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

impl fmt::Display for ChangeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {} {})",
            self.package_name, self.datasource, self.dependency_type, self.update_kind
        )
    }
}
