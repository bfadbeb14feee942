// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source materialization.
//!
//! Every side effect the resolution engine performs on a single dependency
//! goes through the [`SourceAccess`] trait: cloning or updating the checkout,
//! linking it into the project, running its scripts, and identifying or
//! locking its current revision. The engine never changes the process working
//! directory. Instead, each operation receives the install location that
//! holds the checkout explicitly, and finds the checkout at
//! `location/<source name>`.
//!
//! [`Git2Source`] implements this access through libgit2.

pub mod sparse;

use crate::{config::Source, path::normalize, source::sparse::SparsityDrafter};

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    AutotagOption, Commit, FetchOptions, RemoteCallbacks, Repository, Status, StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, read_link, remove_dir_all, remove_file},
    path::{Path, PathBuf},
    process::Command,
    time,
};
use tracing::{debug, info, instrument, warn};

/// Flags controlling how a checkout is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Overwrite uncommitted changes and existing link targets.
    pub force: bool,

    /// Fetch from the remote before checking out.
    pub fetch: bool,

    /// Remove untracked files after checking out.
    pub clean: bool,

    /// Leave checkouts with uncommitted changes alone instead of failing.
    pub skip_changes: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            force: false,
            fetch: false,
            clean: true,
            skip_changes: false,
        }
    }
}

/// Identification record of an installed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Name of the source.
    pub name: String,

    /// Path to the checkout.
    pub path: PathBuf,

    /// Repository the checkout tracks.
    pub repo: String,

    /// Revision currently checked out.
    pub rev: String,
}

impl Display for Identity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {} @ {}", self.path.display(), self.repo, self.rev)
    }
}

/// Revision reported for sources without a checkout.
pub const MISSING_REV: &str = "<missing>";

/// Layer of indirection for source materialization.
pub trait SourceAccess {
    /// Clone or update checkout of source inside install location.
    fn update_files(&self, source: &Source, location: &Path, opts: &UpdateOptions) -> Result<()>;

    /// Create links of source relative to manifest root.
    fn create_links(&self, source: &Source, location: &Path, root: &Path, force: bool)
        -> Result<()>;

    /// Run post-install scripts of source inside its checkout.
    fn run_scripts(&self, source: &Source, location: &Path, force: bool, show_stdout: bool)
        -> Result<()>;

    /// Identify current state of checkout.
    fn identify(&self, source: &Source, location: &Path, allow_dirty: bool) -> Result<Identity>;

    /// Snapshot source at its current checked out revision.
    ///
    /// Returns `None` when the source declines to be locked.
    fn lock(&self, source: &Source, location: &Path, skip_changes: bool) -> Result<Option<Source>>;
}

/// Source access through libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Source;

impl Git2Source {
    /// Construct new libgit2 source access.
    pub fn new() -> Self {
        Self
    }

    fn clone_repo(&self, source: &Source, path: &Path) -> Result<Repository> {
        let url = shellexpand::full(&source.repo)?.into_owned();
        info!("clone {url:?} into {:?}", path.display());

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(source.name.clone());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(stats.total_objects() as u64);
                bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = RepoBuilder::new().fetch_options(fo).clone(&url, path);
        bar.finish_and_clear();

        Ok(result?)
    }

    #[instrument(skip(self, repo), level = "debug")]
    fn fetch(&self, repo: &Repository, name: &str) -> Result<()> {
        info!("fetch {name:?}");
        let mut remote = repo.find_remote("origin")?;
        let mut fo = FetchOptions::new();
        fo.download_tags(AutotagOption::All);
        remote.fetch(&["+refs/heads/*:refs/remotes/origin/*"], Some(&mut fo), None)?;

        Ok(())
    }

    fn checkout(&self, repo: &Repository, rev: &str, force: bool) -> Result<()> {
        let commit = resolve_commit(repo, rev)?;
        debug!("checkout {rev:?} at {}", commit.id());

        let mut cb = CheckoutBuilder::new();
        if force {
            cb.force();
        } else {
            cb.safe();
        }
        repo.checkout_tree(commit.as_object(), Some(&mut cb))?;
        repo.set_head_detached(commit.id())?;

        Ok(())
    }

    fn apply_sparse_paths(&self, source: &Source, repo: &Repository, path: &Path) -> Result<()> {
        if source.sparse_paths.is_empty() {
            return Ok(());
        }

        repo.config()?.set_bool("core.sparseCheckout", true)?;
        let drafter = SparsityDrafter::new(repo.path());
        if drafter.replace_rules(&source.sparse_paths)? {
            debug!("sparse rules of {:?} changed", source.name);
        }

        // INVARIANT: libgit2 ignores sparse rules, so let Git apply them.
        syscall_non_interactive("git", ["read-tree", "-mu", "HEAD"], path)?;

        Ok(())
    }

    fn clean(&self, repo: &Repository) -> Result<()> {
        let Some(workdir) = repo.workdir() else {
            return Ok(());
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .recurse_untracked_dirs(false);

        for entry in repo.statuses(Some(&mut opts))?.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }

            // INVARIANT: Untracked directories may hold nested install
            // locations, so only loose files are removed.
            let Some(relative) = entry.path() else {
                continue;
            };
            let path = workdir.join(relative);
            if path.is_file() || path.is_symlink() {
                debug!("remove untracked file {:?}", path.display());
                remove_file(&path).map_err(|err| SourceError::Remove {
                    source: err,
                    path: path.clone(),
                })?;
            }
        }

        Ok(())
    }
}

impl SourceAccess for Git2Source {
    #[instrument(skip(self, source, opts), fields(name = %source.name), level = "debug")]
    fn update_files(&self, source: &Source, location: &Path, opts: &UpdateOptions) -> Result<()> {
        let path = location.join(&source.name);
        let repo = if !path.exists() {
            self.clone_repo(source, &path)?
        } else {
            let repo = Repository::open(&path)?;
            if !opts.force && is_dirty(&repo)? {
                if opts.skip_changes {
                    warn!("skipped update of {:?} due to uncommitted changes", source.name);
                    return Ok(());
                }

                return Err(SourceError::UncommittedChanges { path });
            }

            if opts.fetch || resolve_commit(&repo, &source.rev).is_err() {
                self.fetch(&repo, &source.name)?;
            }

            repo
        };

        self.checkout(&repo, &source.rev, opts.force)?;
        if opts.clean {
            self.clean(&repo)?;
        }
        self.apply_sparse_paths(source, &repo, &path)?;
        info!("installed {source}");

        Ok(())
    }

    #[instrument(skip(self, source), fields(name = %source.name), level = "debug")]
    fn create_links(
        &self,
        source: &Source,
        location: &Path,
        root: &Path,
        force: bool,
    ) -> Result<()> {
        let checkout = location.join(&source.name);
        for link in &source.links {
            let target = normalize(root.join(shellexpand::full(&link.target)?.as_ref()));
            let origin = normalize(checkout.join(&link.source));

            if target.symlink_metadata().is_ok() {
                if read_link(&target).ok().as_deref() == Some(origin.as_path()) {
                    debug!("link {:?} already in place", target.display());
                    continue;
                }

                if !force {
                    return Err(SourceError::LinkExists { target });
                }

                let removed = if target.is_dir() && !target.is_symlink() {
                    remove_dir_all(&target)
                } else {
                    remove_file(&target)
                };
                removed.map_err(|err| SourceError::Remove {
                    source: err,
                    path: target.clone(),
                })?;
            }

            if let Some(parent) = target.parent() {
                create_dir_all(parent).map_err(|err| SourceError::Link {
                    source: err,
                    target: target.clone(),
                })?;
            }

            info!("link {:?} -> {:?}", target.display(), origin.display());
            symlink(&origin, &target).map_err(|err| SourceError::Link {
                source: err,
                target: target.clone(),
            })?;
        }

        Ok(())
    }

    #[instrument(skip(self, source), fields(name = %source.name), level = "debug")]
    fn run_scripts(
        &self,
        source: &Source,
        location: &Path,
        force: bool,
        show_stdout: bool,
    ) -> Result<()> {
        let checkout = location.join(&source.name);
        if source.scripts.is_empty() {
            return Ok(());
        }

        if !checkout.is_dir() {
            warn!("skipped scripts of {:?}, not installed", source.name);
            return Ok(());
        }

        for script in &source.scripts {
            info!("run {script:?} in {:?}", checkout.display());
            match syscall_non_interactive(SHELL, [SHELL_FLAG, script.as_str()], &checkout) {
                Ok(output) if show_stdout && !output.is_empty() => info!("{output}"),
                Ok(_) => {}
                Err(error) if force => warn!("ignored failing script {script:?}: {error}"),
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }

    #[instrument(skip(self, source), fields(name = %source.name), level = "debug")]
    fn identify(&self, source: &Source, location: &Path, allow_dirty: bool) -> Result<Identity> {
        let path = location.join(&source.name);
        if !path.is_dir() {
            return Ok(Identity {
                name: source.name.clone(),
                path,
                repo: source.repo.clone(),
                rev: MISSING_REV.into(),
            });
        }

        let repo = Repository::open(&path)?;
        if !allow_dirty && is_dirty(&repo)? {
            return Err(SourceError::UncommittedChanges { path });
        }

        let url = repo
            .find_remote("origin")
            .ok()
            .and_then(|remote| remote.url().map(str::to_owned))
            .unwrap_or_else(|| source.repo.clone());
        let rev = repo.head()?.peel_to_commit()?.id().to_string();

        Ok(Identity {
            name: source.name.clone(),
            path,
            repo: url,
            rev,
        })
    }

    #[instrument(skip(self, source), fields(name = %source.name), level = "debug")]
    fn lock(&self, source: &Source, location: &Path, skip_changes: bool) -> Result<Option<Source>> {
        let path = location.join(&source.name);
        if !path.is_dir() {
            info!("skipped lock of {:?}, not installed", source.name);
            return Ok(None);
        }

        let repo = Repository::open(&path)?;
        if !skip_changes && is_dirty(&repo)? {
            warn!("skipped lock of {:?} due to uncommitted changes", source.name);
            return Ok(None);
        }

        let mut locked = source.clone();
        locked.rev = repo.head()?.peel_to_commit()?.id().to_string();
        info!("locked {locked}");

        Ok(Some(locked))
    }
}

/// Check if checkout has uncommitted changes to tracked files.
fn is_dirty(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(false).include_ignored(false);
    Ok(!repo.statuses(Some(&mut opts))?.is_empty())
}

/// Resolve revision, preferring remote branches over local names.
fn resolve_commit<'r>(repo: &'r Repository, rev: &str) -> Result<Commit<'r>, git2::Error> {
    repo.revparse_single(&format!("refs/remotes/origin/{rev}"))
        .or_else(|_| repo.revparse_single(rev))?
        .peel_to_commit()
}

#[cfg(unix)]
const SHELL: &str = "sh";
#[cfg(unix)]
const SHELL_FLAG: &str = "-c";
#[cfg(windows)]
const SHELL: &str = "cmd";
#[cfg(windows)]
const SHELL_FLAG: &str = "/C";

#[cfg(unix)]
fn symlink(origin: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(origin, target)
}

#[cfg(windows)]
fn symlink(origin: &Path, target: &Path) -> std::io::Result<()> {
    if origin.is_dir() {
        std::os::windows::fs::symlink_dir(origin, target)
    } else {
        std::os::windows::fs::symlink_file(origin, target)
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: &Path,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(cwd)
        .output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(SourceError::Syscall(std::io::Error::other(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        ))));
    }

    Ok(message)
}

/// Source materialization error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Checkout has uncommitted changes.
    #[error("uncommitted changes in {:?}", path.display())]
    UncommittedChanges { path: PathBuf },

    /// Link target exists and is not the expected link.
    #[error("link target {:?} already exists", target.display())]
    LinkExists { target: PathBuf },

    /// Link cannot be created.
    #[error("failed to create link {:?}", target.display())]
    Link {
        #[source]
        source: std::io::Error,
        target: PathBuf,
    },

    /// Path cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Sparse checkout configuration file manipulation fails.
    #[error(transparent)]
    Sparse(#[from] crate::source::sparse::SparseError),

    /// Failed to perform shell expansion on a manifest path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// External command fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;
