// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest layout.
//!
//! Specify the layout of manifest files to simplify the process of
//! serialization and deserialization. File I/O is left to the caller to
//! figure out.
//!
//! # General Layout
//!
//! A manifest lists the __sources__ that should be installed into a shared
//! install location, an optional __locked__ listing of the same shape that
//! records exact revisions, and optional named __groups__ of sources. The
//! resolver strategy decides how nested manifests of installed sources are
//! treated.

use serde::{Deserialize, Deserializer, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    str::FromStr,
};

/// Default install location relative to the manifest root.
pub const DEFAULT_LOCATION: &str = "gitman_sources";

/// Default revision to check out when a source does not name one.
pub const DEFAULT_REV: &str = "main";

/// Manifest file layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Install location relative to the manifest root.
    #[serde(default = "default_location")]
    pub location: String,

    /// Strategy used to treat nested manifests.
    #[serde(default)]
    pub resolver: Resolver,

    /// Declared dependencies.
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Frozen dependencies.
    #[serde(default)]
    pub sources_locked: Vec<Source>,

    /// Group selected when no explicit names are given.
    #[serde(default)]
    pub default_group: String,

    /// Named aliases for sets of sources.
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            location: default_location(),
            resolver: Resolver::default(),
            sources: Vec::new(),
            sources_locked: Vec::new(),
            default_group: String::new(),
            groups: Vec::new(),
        }
    }
}

impl Manifest {
    /// Normalize every source in both source listings.
    pub fn normalize(&mut self) {
        for source in self
            .sources
            .iter_mut()
            .chain(self.sources_locked.iter_mut())
        {
            source.normalize();
        }
    }

    /// Check for conflicts between source names and group names.
    ///
    /// A group member sharing a name with a source is fine. Only group names
    /// themselves must stay distinct from source names.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NameConflict`] if a source and a group share a
    ///   name.
    pub fn validate(&self) -> Result<()> {
        for source in &self.sources {
            if self.groups.iter().any(|group| group.name == source.name) {
                return Err(ConfigError::NameConflict(source.name.clone()));
            }
        }

        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        // INVARIANT: An empty document is an empty manifest.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut manifest: Manifest = serde_yaml::from_str(data)?;
        manifest.normalize();

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_yaml::to_string(self)
                .map_err(ConfigError::Yaml)?
                .as_str(),
        )
    }
}

fn default_location() -> String {
    DEFAULT_LOCATION.into()
}

/// Resolver strategy.
///
/// Unknown strategy names are not an error. They fall back to
/// [`Resolver::RecursiveNested`] when the manifest is parsed, and are never
/// re-checked afterwards.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Resolver {
    /// Each nested manifest installs into its own location, and no source
    /// name may repeat anywhere in the tree.
    #[default]
    #[serde(rename = "recursive-nested")]
    RecursiveNested,

    /// All nested manifests install into the top-level location. Identical
    /// repeats are allowed, conflicting ones are rejected.
    #[serde(rename = "recursive-flat")]
    RecursiveFlat,

    /// Only the top-level manifest is installed.
    #[serde(rename = "flat")]
    Flat,
}

impl Resolver {
    /// Name of strategy as written in manifest files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecursiveNested => "recursive-nested",
            Self::RecursiveFlat => "recursive-flat",
            Self::Flat => "flat",
        }
    }

    /// Parse strategy name, falling back to the default for anything unknown.
    pub fn parse_lenient(name: impl AsRef<str>) -> Self {
        match name.as_ref().trim() {
            "recursive-flat" => Self::RecursiveFlat,
            "flat" => Self::Flat,
            _ => Self::RecursiveNested,
        }
    }
}

impl Display for Resolver {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Resolver {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // INVARIANT: Any scalar, or null, is accepted and coerced.
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_yaml::Value::String(name) => Self::parse_lenient(name),
            _ => Self::RecursiveNested,
        })
    }
}

/// Dependency source.
///
/// Identity is the source name alone. Two sources with the same name compare
/// equal even when their repositories or revisions differ, so conflict
/// checks must compare [`Source::repo`] and [`Source::rev`] explicitly.
#[derive(Default, Debug, Clone, Deserialize, Serialize)]
pub struct Source {
    /// Repository location to clone from.
    pub repo: String,

    /// Directory name inside the install location.
    #[serde(default)]
    pub name: String,

    /// Revision to check out: branch, tag, or commit.
    #[serde(default)]
    pub rev: String,

    /// Links to create relative to the manifest root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    /// Shell commands to run inside the checkout after installation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<String>,

    /// Sparse checkout rules for the checkout.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sparse_paths: Vec<String>,
}

impl Source {
    /// Construct new source.
    pub fn new(repo: impl Into<String>, name: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            name: name.into(),
            rev: rev.into(),
            ..Default::default()
        }
    }

    /// Fill in defaults for missing fields.
    ///
    /// Missing names are inferred from the last segment of the repository,
    /// without any ".git" suffix. Missing revisions become [`DEFAULT_REV`].
    /// Applying this more than once changes nothing.
    pub fn normalize(&mut self) {
        self.repo = self.repo.trim().to_string();
        self.name = self.name.trim().to_string();
        self.rev = self.rev.trim().to_string();

        if self.name.is_empty() {
            let last = self
                .repo
                .trim_end_matches(['/', '\\'])
                .rsplit(['/', '\\', ':'])
                .next()
                .unwrap_or_default();
            self.name = last.strip_suffix(".git").unwrap_or(last).to_string();
        }

        if self.rev.is_empty() {
            self.rev = DEFAULT_REV.into();
        }
    }

    /// Check if other source names the same dependency at a different
    /// repository or revision.
    pub fn differs_from(&self, other: &Source) -> bool {
        self.repo != other.repo || self.rev != other.rev
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for Source {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "'{}' @ {} ({})", self.name, self.rev, self.repo)
    }
}

/// Link from manifest root into a checkout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Link {
    /// Path inside the checkout, empty for the checkout itself.
    #[serde(default)]
    pub source: String,

    /// Path of the link relative to the manifest root.
    pub target: String,
}

/// Named alias for a set of source names.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Group {
    /// Name of the group.
    pub name: String,

    /// Source names belonging to the group.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to (de)serialize manifest.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Source name collides with a group name.
    #[error("name conflict detected between source name and group name {0:?}")]
    NameConflict(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use simple_test_case::test_case;

    #[test]
    fn deserialize_manifest() -> anyhow::Result<()> {
        let result: Manifest = indoc! {r#"
            location: deps
            resolver: recursive-flat
            sources:
              - repo: https://example.com/foo.git
                rev: v1.0
                links:
                  - target: lib/foo
                scripts:
                  - make
              - repo: https://example.com/bar
                name: baz
            sources_locked:
              - repo: https://example.com/foo.git
                name: foo
                rev: 0123abcd
            default_group: core
            groups:
              - name: core
                members: [foo]
        "#}
        .parse()?;

        let mut foo = Source::new("https://example.com/foo.git", "foo", "v1.0");
        foo.links.push(Link {
            source: String::new(),
            target: "lib/foo".into(),
        });
        foo.scripts.push("make".into());

        assert_eq!(result.location, "deps");
        assert_eq!(result.resolver, Resolver::RecursiveFlat);
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].links, foo.links);
        assert_eq!(result.sources[0].scripts, foo.scripts);
        assert_eq!(result.sources[0].rev, "v1.0");
        assert_eq!(result.sources[1].name, "baz");
        assert_eq!(result.sources[1].rev, DEFAULT_REV);
        assert_eq!(result.sources_locked[0].rev, "0123abcd");
        assert_eq!(result.default_group, "core");
        assert_eq!(
            result.groups,
            vec![Group {
                name: "core".into(),
                members: vec!["foo".into()],
            }]
        );

        Ok(())
    }

    #[test]
    fn deserialize_empty_manifest() -> anyhow::Result<()> {
        let result: Manifest = "".parse()?;
        assert_eq!(result, Manifest::default());
        assert_eq!(result.location, DEFAULT_LOCATION);

        Ok(())
    }

    #[test_case("resolver: recursive-nested", Resolver::RecursiveNested; "nested")]
    #[test_case("resolver: recursive-flat", Resolver::RecursiveFlat; "recursive flat")]
    #[test_case("resolver: flat", Resolver::Flat; "flat")]
    #[test_case("resolver: sideways", Resolver::RecursiveNested; "unknown name")]
    #[test_case("resolver: 42", Resolver::RecursiveNested; "not a string")]
    #[test_case("resolver:", Resolver::RecursiveNested; "null")]
    #[test_case("location: deps", Resolver::RecursiveNested; "missing")]
    #[test]
    fn resolver_coercion(data: &str, expect: Resolver) -> anyhow::Result<()> {
        let manifest: Manifest = data.parse()?;
        assert_eq!(manifest.resolver, expect);

        // Coercion is idempotent across a save and reload.
        let reloaded: Manifest = manifest.to_string().parse()?;
        assert_eq!(reloaded.resolver, expect);

        Ok(())
    }

    #[test_case("https://example.com/foo.git", "foo"; "url with suffix")]
    #[test_case("https://example.com/foo/", "foo"; "trailing slash")]
    #[test_case("git@example.com:bar.git", "bar"; "scp style")]
    #[test_case("../local/baz", "baz"; "local path")]
    #[test]
    fn source_name_inferred_from_repo(repo: &str, expect: &str) {
        let mut source = Source::new(repo, "", "");
        source.normalize();
        assert_eq!(source.name, expect);
        assert_eq!(source.rev, DEFAULT_REV);

        let once = source.clone();
        source.normalize();
        assert_eq!(source.name, once.name);
        assert_eq!(source.rev, once.rev);
    }

    #[test]
    fn source_identity_is_name_only() {
        let a = Source::new("repo1", "a", "rev1");
        let b = Source::new("repo2", "a", "rev2");
        assert_eq!(a, b);
        assert!(a.differs_from(&b));
        assert!(!a.differs_from(&a.clone()));
    }

    #[test]
    fn validate_name_conflicts() {
        let mut manifest = Manifest::default();
        manifest.sources.push(Source::new("repo1", "a", "main"));
        manifest.groups.push(Group {
            name: "core".into(),
            members: vec!["a".into()],
        });
        assert!(manifest.validate().is_ok());

        manifest.groups.push(Group {
            name: "a".into(),
            members: vec![],
        });
        assert!(matches!(
            manifest.validate(),
            Err(ConfigError::NameConflict(name)) if name == "a"
        ));
    }

    #[test]
    fn serialize_manifest() {
        let mut manifest = Manifest::default();
        manifest.sources.push(Source::new("https://example.com/foo.git", "foo", "main"));
        let result = manifest.to_string();

        let expect = indoc! {r#"
            location: gitman_sources
            resolver: recursive-nested
            sources:
            - repo: https://example.com/foo.git
              name: foo
              rev: main
            sources_locked: []
            default_group: ''
            groups: []
        "#};

        assert_eq!(result, expect);
    }
}
