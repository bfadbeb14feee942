// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for manifest files and install
//! locations. Nothing in here touches the process working directory.

use std::{
    fs::read_dir,
    path::{Component, Path, PathBuf},
};

/// Log file name placed inside the install location.
pub const LOG_FILENAME: &str = "gitman.log";

/// Lexically normalize a path.
///
/// Collapses `.` components, and resolves `..` against preceding normal
/// components without consulting the file system. Leading `..` components of
/// a relative path are kept as-is.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => continue,
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }

    parts.iter().collect()
}

/// Check if file name names a manifest file.
///
/// Manifest files are named `gitman` or `gdm` with a `yml` or `yaml`
/// extension. Matching is case-insensitive, and a leading dot is allowed.
pub fn is_manifest_filename(filename: impl AsRef<str>) -> bool {
    let filename = filename.as_ref().to_lowercase();
    let filename = filename.strip_prefix('.').unwrap_or(&filename);
    let Some((stem, ext)) = filename.rsplit_once('.') else {
        return false;
    };

    matches!(stem, "gitman" | "gdm") && matches!(ext, "yml" | "yaml")
}

/// Find manifest file in exactly one directory.
///
/// Returns `None` if the directory has no manifest file, or does not exist.
///
/// # Errors
///
/// - Return [`PathError::ReadDir`] if directory listing fails.
/// - Return [`PathError::MultipleManifests`] if more than one manifest file
///   is present.
pub fn find_manifest_file(dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(None);
    }

    let entries = read_dir(dir).map_err(|err| PathError::ReadDir {
        source: err,
        path: dir.to_path_buf(),
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PathError::ReadDir {
            source: err,
            path: dir.to_path_buf(),
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_manifest_filename(&name) && entry.path().is_file() {
            found.push(entry.path());
        }
    }

    found.sort();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        _ => Err(PathError::MultipleManifests {
            path: dir.to_path_buf(),
            found,
        }),
    }
}

/// Path utility error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Directory cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory holds more than one manifest file.
    #[error("multiple manifest files in {:?}: {found:?}", path.display())]
    MultipleManifests { path: PathBuf, found: Vec<PathBuf> },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::fs::write;

    #[test_case("/a/b/../c", "/a/c"; "parent directory")]
    #[test_case("/a/./b/./", "/a/b"; "current directory")]
    #[test_case("/../a", "/a"; "parent of root")]
    #[test_case("a/../../b", "../b"; "leading parent kept")]
    #[test_case("a/..", "."; "collapses to current")]
    #[test]
    fn normalize_lexically(input: &str, expect: &str) {
        assert_eq!(normalize(input), PathBuf::from(expect));
    }

    #[test_case("gitman.yml", true; "plain yml")]
    #[test_case("GDM.YAML", true; "uppercase yaml")]
    #[test_case(".gitman.yaml", true; "leading dot")]
    #[test_case("gitman.toml", false; "wrong extension")]
    #[test_case("other.yml", false; "wrong stem")]
    #[test_case("gitman", false; "no extension")]
    #[test]
    fn manifest_filename_matching(filename: &str, expect: bool) {
        assert_eq!(is_manifest_filename(filename), expect);
    }

    #[test]
    fn find_manifest_file_in_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(find_manifest_file(dir.path())?, None);

        write(dir.path().join("README.md"), "")?;
        write(dir.path().join("gdm.yml"), "")?;
        assert_eq!(
            find_manifest_file(dir.path())?,
            Some(dir.path().join("gdm.yml"))
        );

        write(dir.path().join("gitman.yaml"), "")?;
        assert!(matches!(
            find_manifest_file(dir.path()),
            Err(PathError::MultipleManifests { .. })
        ));

        Ok(())
    }
}
