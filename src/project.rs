// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dependency resolution and traversal.
//!
//! A [`Project`] is a loaded manifest anchored at a root directory. It decides
//! which sources apply to an operation, walks the dependency tree according to
//! its [`Resolver`] strategy, rejects conflicting sources, and freezes
//! resolved revisions into the locked listing of its manifest.
//!
//! # Nested Manifests
//!
//! Any installed source may carry a manifest of its own at the top of its
//! checkout. Unless the strategy is [`Resolver::Flat`], traversal descends
//! into those manifests. Under [`Resolver::RecursiveFlat`] the nested project
//! is forced to install into the top-level install location, collapsing the
//! whole tree into one directory. Under [`Resolver::RecursiveNested`] it keeps
//! its own settings, installing into its own location inside the checkout.
//!
//! # Conflicts
//!
//! One [`Registry`] of processed sources is threaded through the whole
//! traversal of a single operation, so sources visited in one branch are
//! visible to every branch visited after it. The project keeps that registry
//! between operations, except under [`Resolver::RecursiveFlat`]. There each
//! nested manifest is expanded once per operation, so repeated sources
//! cannot cycle forever.

mod conflict;
mod deps;
mod locate;
mod select;


pub use conflict::Registry;
pub use deps::Dependencies;
pub use locate::{load_project, load_project_from_cwd};

use crate::{
    config::{ConfigError, Group, Link, Manifest, Resolver, Source},
    path::{normalize, LOG_FILENAME},
    source::{SourceAccess, SourceError, UpdateOptions},
};

use std::{
    collections::HashSet,
    fs::{create_dir_all, remove_dir_all, remove_file, write, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument};

/// Default manifest file name used when writing new manifests.
pub const DEFAULT_FILENAME: &str = "gitman.yml";

/// Flags controlling installation traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Levels of nested manifests to process, `None` for no limit. A depth of
    /// zero skips the current level entirely.
    pub depth: Option<usize>,

    /// Install declared revisions instead of locked ones.
    pub update: bool,

    /// Keep updating nested manifests instead of using their locked sources.
    pub recurse: bool,

    /// Overwrite uncommitted changes and existing link targets.
    pub force: bool,

    /// Fetch from remotes before checking out.
    pub fetch: bool,

    /// Remove untracked files after checking out.
    pub clean: bool,

    /// Leave checkouts with uncommitted changes alone instead of failing.
    pub skip_changes: bool,

    /// Do not fall back to the default group without explicit names.
    pub skip_default_group: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            depth: None,
            update: true,
            recurse: false,
            force: false,
            fetch: false,
            clean: true,
            skip_changes: false,
            skip_default_group: false,
        }
    }
}

impl InstallOptions {
    fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            force: self.force,
            fetch: self.fetch,
            clean: self.clean,
            skip_changes: self.skip_changes,
        }
    }

    fn descend(&self) -> Self {
        Self {
            depth: next_depth(self.depth),
            update: self.update && self.recurse,
            ..*self
        }
    }
}

/// Loaded manifest anchored at a root directory.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    filename: String,
    location_path: PathBuf,
    manifest: Manifest,
    processed: Registry,
}

impl Project {
    /// Construct new project from manifest layout.
    ///
    /// Normalizes every source and derives the install location from the root
    /// before checking source names against group names.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Config`] if a source name collides with a
    ///   group name.
    pub fn new(
        root: impl Into<PathBuf>,
        filename: impl Into<String>,
        mut manifest: Manifest,
    ) -> Result<Self> {
        let root = root.into();
        manifest.normalize();
        manifest.validate()?;
        let location_path = normalize(root.join(&manifest.location));

        Ok(Self {
            root,
            filename: filename.into(),
            location_path,
            manifest,
            processed: Registry::default(),
        })
    }

    /// Write sample manifest into directory unless one is already present.
    ///
    /// Returns the new project, or `None` if a manifest already exists.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Path`] if the directory cannot be inspected.
    /// - Return [`ProjectError::Write`] if the manifest cannot be written.
    pub fn init(root: impl Into<PathBuf>) -> Result<Option<Self>> {
        let root = root.into();
        if let Some(existing) = crate::path::find_manifest_file(&root)? {
            info!("manifest already exists: {:?}", existing.display());
            return Ok(None);
        }

        let mut sample = Source::new(
            "https://github.com/githubtraining/hellogitworld",
            "sample_dependency",
            "master",
        );
        sample.links.push(Link {
            source: String::new(),
            target: "sample_dependency".into(),
        });

        let mut manifest = Manifest::default();
        manifest.sources.push(sample.clone());
        manifest.groups.push(Group {
            name: "sample_group".into(),
            members: vec![sample.name.clone()],
        });

        let project = Self::new(root, DEFAULT_FILENAME, manifest)?;
        project.save()?;
        info!("created manifest: {:?}", project.config_path().display());

        Ok(Some(project))
    }

    /// Root directory of the project.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Full path to the manifest file.
    pub fn config_path(&self) -> PathBuf {
        normalize(self.root.join(&self.filename))
    }

    /// Full path to the install location.
    pub fn location_path(&self) -> &Path {
        self.location_path.as_path()
    }

    /// Full path to the log file.
    pub fn log_path(&self) -> PathBuf {
        self.location_path.join(LOG_FILENAME)
    }

    /// Full path to installed dependency.
    pub fn dependency_path(&self, name: impl AsRef<str>) -> PathBuf {
        normalize(self.location_path.join(name.as_ref()))
    }

    /// Active resolver strategy.
    pub fn resolver(&self) -> Resolver {
        self.manifest.resolver
    }

    /// Manifest layout of the project.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Change install location relative to the root.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.manifest.location = location.into();
        self.location_path = normalize(self.root.join(&self.manifest.location));
    }

    /// Write manifest back to its file.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Write`] if the manifest cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = self.config_path();
        debug!("save manifest {:?}", path.display());
        write(&path, self.manifest.to_string()).map_err(|err| ProjectError::Write {
            source: err,
            path,
        })
    }

    /// Append a message to the log file.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Write`] if the log file cannot be written.
    pub fn log(&self, message: impl AsRef<str>) -> Result<()> {
        let path = self.log_path();
        let write_err = |err| ProjectError::Write {
            source: err,
            path: path.clone(),
        };

        create_dir_all(&self.location_path).map_err(write_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        writeln!(file, "{}", message.as_ref()).map_err(write_err)?;

        Ok(())
    }

    /// Download or update dependencies.
    ///
    /// Restricts the operation to the given names or groups, falling back to
    /// the default group and then to every source. Returns the number of
    /// sources installed across the whole traversal. Explicitly requested
    /// names that match nothing are reported, and force a count of zero.
    ///
    /// Under [`Resolver::RecursiveNested`] and [`Resolver::Flat`] the sources
    /// processed here stay registered on the project, so installing them again
    /// through the same project is a conflict. Under [`Resolver::RecursiveFlat`]
    /// every call starts from an empty registry.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Conflict`] if resolved sources conflict.
    /// - Return [`ProjectError::Source`] if materialization fails.
    pub fn install_dependencies(
        &mut self,
        access: &impl SourceAccess,
        names: &[String],
        opts: &InstallOptions,
    ) -> Result<usize> {
        let mut registry = match self.resolver() {
            Resolver::RecursiveFlat => Registry::default(),
            _ => std::mem::take(&mut self.processed),
        };
        let result = self.install_tree(access, names, opts, &mut registry);
        self.processed = registry;
        result
    }

    fn install_tree<A: SourceAccess>(
        &self,
        access: &A,
        names: &[String],
        opts: &InstallOptions,
        registry: &mut Registry,
    ) -> Result<usize> {
        if opts.depth == Some(0) {
            info!("skipped directory: {:?}", self.location_path.display());
            return Ok(0);
        }

        let sources = self.select_sources(if opts.update { Some(false) } else { None });
        let mut pending = self.sources_filter(names, &sources, opts.skip_default_group);
        registry.check(self.resolver(), &self.root, &sources)?;

        create_dir_all(&self.location_path).map_err(|err| ProjectError::Write {
            source: err,
            path: self.location_path.clone(),
        })?;

        let mut count = 0;
        for source in &sources {
            if !pending.remove(&source.name) {
                info!("skipped dependency: {:?}", source.name);
                continue;
            }

            access.update_files(source, &self.location_path, &opts.update_options())?;
            access.create_links(source, &self.location_path, &self.root, opts.force)?;
            count += 1;

            if !self.should_descend(&source.name, registry) {
                continue;
            }

            if let Some(child) = self.load_child(&source.name)? {
                count += child.install_tree(access, &[], &opts.descend(), registry)?;
            }
        }

        if !pending.is_empty() {
            let mut missing = pending.into_iter().collect::<Vec<_>>();
            missing.sort();
            error!("no such dependency: {}", missing.join(" "));
            return Ok(0);
        }

        Ok(count)
    }

    /// Run post-install scripts of dependencies.
    ///
    /// Nested manifests are processed before the scripts of the source that
    /// carries them. Returns the number of sources whose scripts ran.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Source`] if a script fails without `force`.
    #[instrument(skip(self, access), level = "debug")]
    pub fn run_scripts(
        &self,
        access: &impl SourceAccess,
        names: &[String],
        depth: Option<usize>,
        force: bool,
        show_stdout: bool,
    ) -> Result<usize> {
        let mut registry = Registry::default();
        self.run_tree_scripts(access, names, depth, force, show_stdout, &mut registry)
    }

    fn run_tree_scripts<A: SourceAccess>(
        &self,
        access: &A,
        names: &[String],
        depth: Option<usize>,
        force: bool,
        show_stdout: bool,
        registry: &mut Registry,
    ) -> Result<usize> {
        if depth == Some(0) {
            info!("skipped directory: {:?}", self.location_path.display());
            return Ok(0);
        }

        let sources = self.select_sources(None);
        let filter = self.sources_filter(names, &sources, false);

        let mut count = 0;
        for source in sources.iter().filter(|source| filter.contains(&source.name)) {
            if self.should_descend(&source.name, registry) {
                if let Some(child) = self.load_child(&source.name)? {
                    count += child.run_tree_scripts(
                        access,
                        &[],
                        next_depth(depth),
                        force,
                        show_stdout,
                        registry,
                    )?;
                }
            }

            access.run_scripts(source, &self.location_path, force, show_stdout)?;
            count += 1;
        }

        Ok(count)
    }

    /// Lock down the immediate dependency versions.
    ///
    /// Starts from the locked listing when `obey_existing` is set, and from
    /// the declared listing otherwise. Each selected source is snapshot at
    /// its current checked out revision, replacing any locked entry of the
    /// same name in place. The manifest is only written when something was
    /// locked. Returns the number of sources locked.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::NotInstalled`] if the install location is
    ///   missing.
    /// - Return [`ProjectError::Source`] if a snapshot fails.
    /// - Return [`ProjectError::Write`] if the manifest cannot be saved.
    pub fn lock_dependencies(
        &mut self,
        access: &impl SourceAccess,
        names: &[String],
        obey_existing: bool,
        skip_changes: bool,
    ) -> Result<usize> {
        let sources = self.select_sources(Some(obey_existing));
        let filter = self.sources_filter(names, &sources, false);

        if !self.location_path.is_dir() {
            return Err(ProjectError::NotInstalled {
                path: self.location_path.clone(),
            });
        }

        let mut count = 0;
        for source in &sources {
            if !filter.contains(&source.name) {
                info!("skipped dependency: {:?}", source.name);
                continue;
            }

            let Some(locked) = access.lock(source, &self.location_path, skip_changes)? else {
                continue;
            };

            let existing = self
                .manifest
                .sources_locked
                .iter()
                .position(|entry| entry == source);
            match existing {
                Some(index) => self.manifest.sources_locked[index] = locked,
                None => self.manifest.sources_locked.push(locked),
            }
            count += 1;
        }

        if count > 0 {
            self.save()?;
        }

        Ok(count)
    }

    /// Delete the install location.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Remove`] if deletion fails.
    pub fn uninstall_dependencies(&self) -> Result<()> {
        info!("uninstall {:?}", self.location_path.display());
        remove_path(&self.location_path)
    }

    /// Delete every top-level dependency and the log file, keeping the
    /// install location itself.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::Remove`] if deletion fails.
    pub fn clean_dependencies(&self) -> Result<()> {
        for path in self.top_level_dependencies() {
            if path == self.location_path {
                info!("skipped dependency: {:?}", path.display());
                continue;
            }

            remove_path(&path)?;
        }

        remove_path(&self.log_path())
    }

    /// Paths of declared top-level dependencies.
    ///
    /// Empty if the install location does not exist.
    pub fn top_level_dependencies(&self) -> Vec<PathBuf> {
        if !self.location_path.exists() {
            return Vec::new();
        }

        self.manifest
            .sources
            .iter()
            .map(|source| self.dependency_path(&source.name))
            .collect()
    }

    /// Lazily identify every installed dependency in depth-first pre-order.
    ///
    /// Every call starts a fresh traversal.
    pub fn get_dependencies<'a, A: SourceAccess>(
        &self,
        access: &'a A,
        depth: Option<usize>,
        allow_dirty: bool,
    ) -> Dependencies<'a, A> {
        Dependencies::new(self, access, depth, allow_dirty)
    }

    /// Check if traversal should expand the nested manifest of a source.
    ///
    /// Never under [`Resolver::Flat`]. Under [`Resolver::RecursiveFlat`] each
    /// name is expanded once per operation, since identical repeats would
    /// otherwise expand the same shared checkout forever.
    fn should_descend(&self, name: &str, registry: &mut Registry) -> bool {
        match self.resolver() {
            Resolver::Flat => false,
            Resolver::RecursiveFlat if !registry.descend(name) => {
                debug!("already expanded {name:?}");
                false
            }
            _ => true,
        }
    }

    /// Load nested manifest at the top of an installed dependency.
    ///
    /// Under [`Resolver::RecursiveFlat`] the nested project inherits the
    /// strategy and the install location of this project.
    fn load_child(&self, name: &str) -> Result<Option<Project>> {
        let Some(mut child) = load_project(self.dependency_path(name), false)? else {
            return Ok(None);
        };

        if self.resolver() == Resolver::RecursiveFlat {
            child.manifest.resolver = self.resolver();
            child.location_path = self.location_path.clone();
        }

        debug!("descend into {:?}", child.root.display());
        Ok(Some(child))
    }
}

fn next_depth(depth: Option<usize>) -> Option<usize> {
    depth.map(|depth| depth.saturating_sub(1))
}

fn remove_path(path: &Path) -> Result<()> {
    let removed = if path.is_dir() && !path.is_symlink() {
        remove_dir_all(path)
    } else if path.symlink_metadata().is_ok() {
        remove_file(path)
    } else {
        return Ok(());
    };

    removed.map_err(|err| ProjectError::Remove {
        source: err,
        path: path.to_path_buf(),
    })?;
    debug!("removed {:?}", path.display());

    Ok(())
}

/// Names selected for an operation.
pub type SourcesFilter = HashSet<String>;

/// Dependency resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// Two resolved sources of the same name disagree.
    #[error(
        "repo/rev conflict encountered while updating {:?}\nDetails: {existing} conflict with {incoming}",
        root.display()
    )]
    Conflict {
        root: PathBuf,
        existing: String,
        incoming: String,
    },

    /// Dependencies must be installed before this operation.
    #[error("no dependencies resolved at {:?}", path.display())]
    NotInstalled { path: PathBuf },

    /// Manifest file cannot be read.
    #[error("failed to read manifest {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest layout is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Manifest lookup fails.
    #[error(transparent)]
    Path(#[from] crate::path::PathError),

    /// Source materialization fails.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Friendly result alias :3
pub type Result<T, E = ProjectError> = std::result::Result<T, E>;
