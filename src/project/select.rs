// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source selection and name filtering.

use crate::{
    config::{Resolver, Source},
    project::{Project, SourcesFilter},
};

use tracing::info;

impl Project {
    /// Merge source listings using the requested listing as the base.
    ///
    /// - `Some(true)` selects the locked listing, which may be empty.
    /// - `Some(false)` selects the declared listing.
    /// - `None` selects the locked listing if it has entries, and the declared
    ///   listing otherwise.
    ///
    /// Sources present in either listing but missing from the selected one are
    /// appended, except under [`Resolver::RecursiveFlat`].
    pub fn select_sources(&self, use_locked: Option<bool>) -> Vec<Source> {
        let declared = &self.manifest.sources;
        let locked = &self.manifest.sources_locked;

        let mut sources = match use_locked {
            Some(true) if locked.is_empty() => {
                info!("no locked sources, defaulting to none...");
                return Vec::new();
            }
            Some(true) => return locked.clone(),
            Some(false) => declared.clone(),
            None if locked.is_empty() => {
                info!("no locked sources, using latest...");
                declared.clone()
            }
            None => {
                info!("defaulting to locked sources...");
                locked.clone()
            }
        };

        // FIXME: Flat trees are never reconciled here, so sources visited
        // only through nested manifests are not picked up by a later lock.
        if self.resolver() == Resolver::RecursiveFlat {
            return sources;
        }

        let mut extras = Vec::new();
        for source in declared.iter().chain(locked.iter()) {
            if !sources.contains(source) {
                info!("source {:?} missing from selected section", source.name);
                extras.push(source.clone());
            }
        }
        sources.extend(extras);

        sources
    }

    /// Determine names selected by explicit names or groups.
    ///
    /// Without explicit names the default group is used, unless
    /// `skip_default_group` is set. Group names expand to their members, and
    /// names of candidate sources are kept as-is. If nothing is selected, every
    /// candidate source is.
    pub fn sources_filter(
        &self,
        names: &[String],
        sources: &[Source],
        skip_default_group: bool,
    ) -> SourcesFilter {
        let mut requested = names.to_vec();
        if requested.is_empty() && !skip_default_group {
            requested.push(self.manifest.default_group.clone());
        }

        let mut filter = self
            .manifest
            .groups
            .iter()
            .filter(|group| requested.contains(&group.name))
            .flat_map(|group| group.members.iter().cloned())
            .collect::<SourcesFilter>();

        filter.extend(
            sources
                .iter()
                .filter(|source| requested.contains(&source.name))
                .map(|source| source.name.clone()),
        );

        if filter.is_empty() {
            filter.extend(sources.iter().map(|source| source.name.clone()));
        }

        filter
    }
}
