// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{checked_out_rev, RepoFixture};

use anyhow::Result;
use gitman::{
    load_project, project::ProjectError, Git2Source, InstallOptions, Project, Resolver,
};
use pretty_assertions::assert_eq;
use std::fs::{create_dir_all, read_to_string, write};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        create_dir_all(dir.path().join("project"))?;
        Ok(Self { dir })
    }

    fn root(&self) -> std::path::PathBuf {
        self.dir.path().join("project")
    }

    fn remote(&self, name: &str) -> Result<RepoFixture> {
        RepoFixture::new(self.dir.path().join("remotes").join(name))
    }

    fn write_manifest(&self, contents: &str) -> Result<()> {
        write(self.root().join("gitman.yml"), contents)?;
        Ok(())
    }

    fn project(&self) -> Result<Project> {
        Ok(load_project(self.root(), false)?.expect("manifest should exist"))
    }
}

#[test]
fn install_lock_and_reinstall_locked_revision() -> Result<()> {
    let workspace = Workspace::new()?;
    let foo = workspace.remote("foo")?;
    let first = foo.stage_and_commit("README.md", "first")?;

    workspace.write_manifest(&format!(
        "sources:\n  - repo: {}\n    name: foo\n    rev: main\n    links:\n      - target: vendor/foo\n",
        foo.url()
    ))?;

    let access = Git2Source::new();
    let mut project = workspace.project()?;
    let count = project.install_dependencies(&access, &[], &InstallOptions::default())?;
    assert_eq!(count, 1);

    let checkout = project.location_path().join("foo");
    assert_eq!(read_to_string(checkout.join("README.md"))?, "first");
    assert_eq!(checked_out_rev(&checkout)?, first.to_string());
    assert_eq!(
        read_to_string(workspace.root().join("vendor").join("foo").join("README.md"))?,
        "first"
    );

    assert_eq!(project.lock_dependencies(&access, &[], false, false)?, 1);
    let saved = workspace.project()?;
    assert_eq!(saved.manifest().sources_locked.len(), 1);
    assert_eq!(saved.manifest().sources_locked[0].rev, first.to_string());

    // Remote moves on, but the locked revision wins without updating.
    let second = foo.stage_and_commit("README.md", "second")?;
    let mut project = workspace.project()?;
    let opts = InstallOptions {
        update: false,
        fetch: true,
        ..Default::default()
    };
    assert_eq!(project.install_dependencies(&access, &[], &opts)?, 1);
    assert_eq!(checked_out_rev(&checkout)?, first.to_string());

    // Updating follows the declared branch.
    let mut project = workspace.project()?;
    let opts = InstallOptions {
        fetch: true,
        ..Default::default()
    };
    assert_eq!(project.install_dependencies(&access, &[], &opts)?, 1);
    assert_eq!(checked_out_rev(&checkout)?, second.to_string());
    assert_eq!(read_to_string(checkout.join("README.md"))?, "second");

    let identities = project
        .get_dependencies(&access, None, false)
        .collect::<Result<Vec<_>, ProjectError>>()?;
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].name, "foo");
    assert_eq!(identities[0].rev, second.to_string());

    Ok(())
}

#[test]
fn install_refuses_uncommitted_changes() -> Result<()> {
    let workspace = Workspace::new()?;
    let foo = workspace.remote("foo")?;
    foo.stage_and_commit("README.md", "first")?;
    workspace.write_manifest(&format!(
        "sources:\n  - repo: {}\n    name: foo\n",
        foo.url()
    ))?;

    let access = Git2Source::new();
    workspace
        .project()?
        .install_dependencies(&access, &[], &InstallOptions::default())?;

    let mut project = workspace.project()?;
    write(project.location_path().join("foo").join("README.md"), "dirty")?;
    assert!(matches!(
        project.install_dependencies(&access, &[], &InstallOptions::default()),
        Err(ProjectError::Source(_))
    ));

    // Dirty checkouts decline to be locked.
    assert_eq!(project.lock_dependencies(&access, &[], false, false)?, 0);

    let mut project = workspace.project()?;
    let opts = InstallOptions {
        force: true,
        ..Default::default()
    };
    assert_eq!(project.install_dependencies(&access, &[], &opts)?, 1);
    assert_eq!(
        read_to_string(project.location_path().join("foo").join("README.md"))?,
        "first"
    );

    Ok(())
}

#[test]
fn recursive_flat_tree_shares_one_location() -> Result<()> {
    let workspace = Workspace::new()?;
    let foo = workspace.remote("foo")?;
    foo.stage_and_commit("README.md", "foo")?;

    let bar = workspace.remote("bar")?;
    bar.stage_and_commit(
        "gitman.yml",
        format!(
            "sources:\n  - repo: {}\n    name: foo\n    rev: main\n",
            foo.url()
        ),
    )?;

    workspace.write_manifest(&format!(
        "resolver: recursive-flat\nsources:\n  - repo: {}\n    name: bar\n    rev: main\n  - repo: {}\n    name: foo\n    rev: main\n",
        bar.url(),
        foo.url()
    ))?;

    let access = Git2Source::new();
    let mut project = workspace.project()?;
    assert_eq!(project.resolver(), Resolver::RecursiveFlat);
    assert_eq!(
        project.install_dependencies(&access, &[], &InstallOptions::default())?,
        3
    );
    assert!(project.location_path().join("foo").join("README.md").is_file());
    assert!(!project
        .location_path()
        .join("bar")
        .join("gitman_sources")
        .exists());

    Ok(())
}

#[test]
fn recursive_nested_tree_rejects_repeated_names() -> Result<()> {
    let workspace = Workspace::new()?;
    let foo = workspace.remote("foo")?;
    foo.stage_and_commit("README.md", "foo")?;

    let bar = workspace.remote("bar")?;
    bar.stage_and_commit(
        "gitman.yml",
        format!("sources:\n  - repo: {}\n    name: foo\n", foo.url()),
    )?;

    workspace.write_manifest(&format!(
        "sources:\n  - repo: {}\n    name: bar\n  - repo: {}\n    name: foo\n",
        bar.url(),
        foo.url()
    ))?;

    let access = Git2Source::new();
    let mut project = workspace.project()?;
    assert!(matches!(
        project.install_dependencies(&access, &[], &InstallOptions::default()),
        Err(ProjectError::Conflict { .. })
    ));

    // Only the top level holds no repeats.
    let mut project = workspace.project()?;
    let opts = InstallOptions {
        depth: Some(1),
        ..Default::default()
    };
    assert_eq!(project.install_dependencies(&access, &[], &opts)?, 2);

    Ok(())
}
