// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Conflict tracking across a traversal.

use crate::{
    config::{Resolver, Source},
    project::{ProjectError, Result},
};

use std::{collections::HashSet, path::Path};
use tracing::debug;

/// Registry of sources already processed by a traversal.
///
/// # Invariant
///
/// - Under [`Resolver::RecursiveFlat`] a repeated name is only a conflict if
///   its repository or revision differs. Identical repeats are accepted
///   without being registered twice.
/// - Under [`Resolver::RecursiveNested`] and [`Resolver::Flat`] any repeated
///   name is a conflict, even an identical one.
/// - A name is expanded into its nested manifest at most once.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    processed: Vec<Source>,
    descended: HashSet<String>,
}

impl Registry {
    /// Check sources against the registry, registering each one.
    ///
    /// Sources checked earlier in the same call count as processed.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Conflict`] for the first conflicting source.
    pub fn check(&mut self, resolver: Resolver, root: &Path, sources: &[Source]) -> Result<()> {
        for source in sources {
            let existing = self.processed.iter().position(|entry| entry == source);
            match (resolver, existing) {
                (_, None) => self.processed.push(source.clone()),
                (Resolver::RecursiveFlat, Some(index))
                    if !self.processed[index].differs_from(source) =>
                {
                    debug!("source {:?} already processed", source.name);
                }
                (_, Some(index)) => {
                    return Err(ProjectError::Conflict {
                        root: root.to_path_buf(),
                        existing: self.processed[index].to_string(),
                        incoming: source.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Mark source name as expanded into its nested manifest.
    ///
    /// Returns `false` if the name was already expanded, which happens when
    /// identical repeats form a cycle under [`Resolver::RecursiveFlat`].
    pub fn descend(&mut self, name: &str) -> bool {
        self.descended.insert(name.to_string())
    }

    /// Sources processed so far, in visiting order.
    pub fn processed(&self) -> &[Source] {
        self.processed.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(Resolver::RecursiveFlat, true; "recursive flat accepts identical")]
    #[test_case(Resolver::RecursiveNested, false; "recursive nested rejects identical")]
    #[test_case(Resolver::Flat, false; "flat rejects identical")]
    #[test]
    fn identical_repeat(resolver: Resolver, accepted: bool) {
        let mut registry = Registry::default();
        let sources = [Source::new("repo1", "a", "rev1")];
        assert!(registry.check(resolver, Path::new("/root"), &sources).is_ok());
        assert_eq!(
            registry.check(resolver, Path::new("/root"), &sources).is_ok(),
            accepted
        );
        assert_eq!(registry.processed().len(), 1);
    }

    #[test_case(Resolver::RecursiveFlat; "recursive flat")]
    #[test_case(Resolver::RecursiveNested; "recursive nested")]
    #[test_case(Resolver::Flat; "flat")]
    #[test]
    fn differing_repeat_always_conflicts(resolver: Resolver) {
        let mut registry = Registry::default();
        let sources = [
            Source::new("repo1", "a", "rev1"),
            Source::new("repo1", "a", "rev2"),
        ];

        match registry.check(resolver, Path::new("/root"), &sources) {
            Err(ProjectError::Conflict {
                root,
                existing,
                incoming,
            }) => {
                assert_eq!(root, Path::new("/root"));
                assert!(existing.contains("rev1"));
                assert!(incoming.contains("rev2"));
            }
            result => panic!("expected conflict, got {result:?}"),
        }
    }

    #[test]
    fn descend_once_per_name() {
        let mut registry = Registry::default();
        assert!(registry.descend("a"));
        assert!(registry.descend("b"));
        assert!(!registry.descend("a"));
    }

    #[test]
    fn distinct_names_never_conflict() {
        let mut registry = Registry::default();
        let sources = [
            Source::new("repo1", "a", "rev1"),
            Source::new("repo1", "b", "rev1"),
        ];
        assert!(registry
            .check(Resolver::RecursiveNested, Path::new("/root"), &sources)
            .is_ok());
        assert_eq!(registry.processed().len(), 2);
    }
}
