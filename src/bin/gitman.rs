// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use gitman::{load_project, Git2Source, InstallOptions, Project};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "gitman [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory to start searching for a manifest from.
    #[arg(long, global = true, value_name = "path")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir()?.canonicalize()?,
        };

        match self.command {
            Command::Init => run_init(root),
            Command::Install(opts) => run_install(root, opts),
            Command::Update(opts) => run_update(root, opts),
            Command::List(opts) => run_list(root, opts),
            Command::Lock(opts) => run_lock(root, opts),
            Command::Uninstall(opts) => run_uninstall(root, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Generate a new manifest.
    #[command(override_usage = "gitman init")]
    Init,

    /// Get the specified dependencies, preferring locked revisions.
    #[command(override_usage = "gitman install [options] [<name>]...")]
    Install(InstallArgs),

    /// Update dependencies to their latest declared revisions.
    #[command(override_usage = "gitman update [options] [<name>]...")]
    Update(UpdateArgs),

    /// Display current revisions of installed dependencies.
    #[command(override_usage = "gitman list [options]")]
    List(ListArgs),

    /// Lock current revisions of dependencies.
    #[command(override_usage = "gitman lock [options] [<name>]...")]
    Lock(LockArgs),

    /// Delete installed dependencies.
    #[command(override_usage = "gitman uninstall [options]")]
    Uninstall(UninstallArgs),
}

#[derive(Args, Clone, Debug)]
struct InstallArgs {
    /// Names of dependencies or groups to operate on.
    #[arg(value_name = "name")]
    pub names: Vec<String>,

    /// Limit the number of nested manifest levels to process.
    #[arg(short, long, value_name = "count")]
    pub depth: Option<usize>,

    /// Overwrite uncommitted changes and existing links.
    #[arg(short, long)]
    pub force: bool,

    /// Always fetch the latest branches.
    #[arg(short = 'F', long)]
    pub fetch: bool,

    /// Keep untracked files in checkouts.
    #[arg(long)]
    pub no_clean: bool,

    /// Skip dependencies with uncommitted changes.
    #[arg(short, long)]
    pub skip_changes: bool,

    /// Do not fall back to the default group.
    #[arg(short = 'g', long)]
    pub skip_default_group: bool,

    /// Do not run scripts after installing.
    #[arg(long)]
    pub no_scripts: bool,
}

impl InstallArgs {
    fn options(&self, update: bool, recurse: bool) -> InstallOptions {
        InstallOptions {
            depth: self.depth,
            update,
            recurse,
            force: self.force,
            fetch: self.fetch,
            clean: !self.no_clean,
            skip_changes: self.skip_changes,
            skip_default_group: self.skip_default_group,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct UpdateArgs {
    #[command(flatten)]
    pub install: InstallArgs,

    /// Also update nested dependencies instead of using their locks.
    #[arg(short, long)]
    pub recurse: bool,

    /// Lock revisions after updating.
    #[arg(short, long, group = "locking")]
    pub lock: bool,

    /// Never lock revisions after updating.
    #[arg(short = 'L', long, group = "locking")]
    pub no_lock: bool,
}

#[derive(Args, Clone, Debug)]
struct ListArgs {
    /// Limit the number of nested manifest levels to display.
    #[arg(short, long, value_name = "count")]
    pub depth: Option<usize>,

    /// Fail on dependencies with uncommitted changes.
    #[arg(long)]
    pub fail_if_dirty: bool,
}

#[derive(Args, Clone, Debug)]
struct LockArgs {
    /// Names of dependencies or groups to lock.
    #[arg(value_name = "name")]
    pub names: Vec<String>,

    /// Lock dependencies even with uncommitted changes.
    #[arg(short, long)]
    pub skip_changes: bool,
}

#[derive(Args, Clone, Debug)]
struct UninstallArgs {
    /// Keep the install location and only delete its dependencies.
    #[arg(short, long)]
    pub keep_location: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn find_project(root: PathBuf) -> Result<Project> {
    load_project(&root, true)?
        .ok_or_else(|| anyhow!("no manifest found starting from {:?}", root.display()))
}

fn run_init(root: PathBuf) -> Result<()> {
    if Project::init(root)?.is_none() {
        info!("manifest left untouched");
    }

    Ok(())
}

fn run_install(root: PathBuf, opts: InstallArgs) -> Result<()> {
    let mut project = find_project(root)?;
    let access = Git2Source::new();

    let count = project.install_dependencies(&access, &opts.names, &opts.options(false, false))?;
    if count > 0 && !opts.no_scripts {
        project.run_scripts(&access, &opts.names, opts.depth, opts.force, true)?;
    }

    project.log(format!("install: {count} dependencies"))?;
    info!("installed {count} dependencies");

    Ok(())
}

fn run_update(root: PathBuf, opts: UpdateArgs) -> Result<()> {
    let mut project = find_project(root)?;
    let access = Git2Source::new();
    let was_locked = !project.manifest().sources_locked.is_empty();

    let install = &opts.install;
    let count =
        project.install_dependencies(&access, &install.names, &install.options(true, opts.recurse))?;
    if count > 0 && !install.no_scripts {
        project.run_scripts(&access, &install.names, install.depth, install.force, true)?;
    }
    project.log(format!("update: {count} dependencies"))?;
    info!("updated {count} dependencies");

    let lock = opts.lock || (was_locked && !opts.no_lock);
    if count > 0 && lock {
        let locked =
            project.lock_dependencies(&access, &install.names, false, install.skip_changes)?;
        project.log(format!("lock: {locked} dependencies"))?;
        info!("locked {locked} dependencies");
    }

    Ok(())
}

fn run_list(root: PathBuf, opts: ListArgs) -> Result<()> {
    let project = find_project(root)?;
    let access = Git2Source::new();

    for identity in project.get_dependencies(&access, opts.depth, !opts.fail_if_dirty) {
        println!("{}", identity?);
    }

    Ok(())
}

fn run_lock(root: PathBuf, opts: LockArgs) -> Result<()> {
    let mut project = find_project(root)?;
    let access = Git2Source::new();

    let count = project.lock_dependencies(&access, &opts.names, false, opts.skip_changes)?;
    project.log(format!("lock: {count} dependencies"))?;
    info!("locked {count} dependencies");

    Ok(())
}

fn run_uninstall(root: PathBuf, opts: UninstallArgs) -> Result<()> {
    let project = find_project(root)?;

    if opts.keep_location {
        project.clean_dependencies()?;
    } else {
        project.uninstall_dependencies()?;
    }
    info!("uninstalled dependencies of {:?}", project.root().display());

    Ok(())
}
