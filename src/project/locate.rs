// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest discovery.

use crate::{
    config::Manifest,
    path::{find_manifest_file, normalize},
    project::{Project, ProjectError, Result},
};

use std::{fs::read_to_string, path::Path};
use tracing::debug;

/// Load project of the nearest manifest.
///
/// With `search` set, ancestors of `start` are checked in turn until a
/// manifest is found or the file system root is reached. Otherwise only
/// `start` itself is checked. The directory holding the manifest becomes the
/// project root.
///
/// # Errors
///
/// - Return [`ProjectError::Path`] if a directory holds several manifests.
/// - Return [`ProjectError::Read`] if a manifest cannot be read.
/// - Return [`ProjectError::Config`] if a manifest is invalid.
pub fn load_project(start: impl AsRef<Path>, search: bool) -> Result<Option<Project>> {
    let start = std::path::absolute(start.as_ref())
        .map(normalize)
        .map_err(|err| ProjectError::Read {
            source: err,
            path: start.as_ref().to_path_buf(),
        })?;

    if search {
        debug!("searching for manifest...");
    }

    let mut dir = Some(start.as_path());
    while let Some(path) = dir {
        debug!("looking for manifest in {:?}", path.display());
        if let Some(file) = find_manifest_file(path)? {
            let data = read_to_string(&file).map_err(|err| ProjectError::Read {
                source: err,
                path: file.clone(),
            })?;
            let manifest: Manifest = data.parse()?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            debug!("found manifest {:?}", file.display());
            return Project::new(path, filename, manifest).map(Some);
        }

        dir = if search { path.parent() } else { None };
    }

    debug!("no manifest found starting from {:?}", start.display());
    Ok(None)
}

/// Load project of the nearest manifest from the current working directory.
///
/// The working directory is resolved through any symbolic links first.
///
/// # Errors
///
/// - Return [`ProjectError::Read`] if the working directory cannot be
///   determined.
/// - Return any error of [`load_project`].
pub fn load_project_from_cwd(search: bool) -> Result<Option<Project>> {
    let cwd = std::env::current_dir()
        .and_then(|cwd| cwd.canonicalize())
        .map_err(|err| ProjectError::Read {
            source: err,
            path: ".".into(),
        })?;

    load_project(cwd, search)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolver;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    #[sealed_test]
    fn search_upward_from_cwd() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?.canonicalize()?;
        write(
            cwd.join("gitman.yml"),
            indoc! {r#"
                location: deps
                resolver: flat
            "#},
        )?;
        create_dir_all(cwd.join("nested").join("deeper"))?;
        std::env::set_current_dir(cwd.join("nested").join("deeper"))?;

        let project = load_project_from_cwd(true)?.expect("manifest should be found");
        assert_eq!(project.root(), cwd.as_path());
        assert_eq!(project.location_path(), cwd.join("deps").as_path());
        assert_eq!(project.resolver(), Resolver::Flat);
        assert_eq!(project.config_path(), cwd.join("gitman.yml"));

        assert!(load_project_from_cwd(false)?.is_none());

        Ok(())
    }

    #[test]
    fn load_from_exact_directory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(
            root.path().join(".GDM.yaml"),
            indoc! {r#"
                location: ../shared
                resolver: not-a-strategy
                sources:
                  - repo: https://example.com/a.git
            "#},
        )?;

        let project = load_project(root.path(), false)?.expect("manifest should be found");
        assert_eq!(project.resolver(), Resolver::RecursiveNested);
        assert_eq!(project.manifest().sources[0].name, "a");
        assert_eq!(
            project.location_path(),
            normalize(root.path().join("..").join("shared")).as_path()
        );

        Ok(())
    }

    #[test]
    fn load_rejects_name_conflict() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(
            root.path().join("gitman.yml"),
            indoc! {r#"
                sources:
                  - repo: https://example.com/a.git
                groups:
                  - name: a
                    members: [a]
            "#},
        )?;

        assert!(matches!(
            load_project(root.path(), false),
            Err(ProjectError::Config(_))
        ));

        Ok(())
    }
}
