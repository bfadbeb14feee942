// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sparse checkout rule handling.
//!
//! Sources may list __sparse paths__ to reduce their checkout to a subset of
//! tracked files. Git keeps these rules at `$gitdir/info/sparse-checkout`, one
//! rule per line, using gitignore syntax with inverted semantics: every rule
//! says what to _include_ instead of what to exclude. Git only honors the
//! file once `core.sparseCheckout` is enabled for the repository.
//!
//! # See Also
//!
//! - [Man page sparse checkout](https://git-scm.com/docs/git-sparse-checkout)

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, read_to_string, write},
    path::PathBuf,
};

/// Manage sparsity rules in sparse checkout file.
#[derive(Clone, Debug)]
pub struct SparsityDrafter {
    sparse_path: PathBuf,
}

impl SparsityDrafter {
    /// Construct new sparsity rule drafter for a git directory.
    pub fn new(gitdir: impl Into<PathBuf>) -> Self {
        Self {
            sparse_path: gitdir.into().join("info").join("sparse-checkout"),
        }
    }

    /// Edit sparsity rules.
    ///
    /// Read current rule set into [`SparsityEdit`] instance, and directly
    /// edit each rule before writing the results back into the sparse checkout
    /// configuration file. A missing file reads as an empty rule set.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::ReadSparseFile`] if sparse checkout
    ///   configuration file cannot be read.
    /// - Return [`SparseError::WriteSparseFile`] if rules cannot be written to
    ///   sparse checkout configuration file.
    pub fn edit<E>(&self, editor: E) -> Result<bool>
    where
        E: FnOnce(&mut SparsityEdit),
    {
        let content = if self.sparse_path.exists() {
            read_to_string(&self.sparse_path).map_err(|err| SparseError::ReadSparseFile {
                source: err,
                sparse_path: self.sparse_path.clone(),
            })?
        } else {
            String::new()
        };

        let mut rules = SparsityEdit::from(content);
        editor(&mut rules);

        if !rules.changed {
            return Ok(false);
        }

        let write_err = |err| SparseError::WriteSparseFile {
            source: err,
            sparse_path: self.sparse_path.clone(),
        };
        if let Some(parent) = self.sparse_path.parent() {
            create_dir_all(parent).map_err(write_err)?;
        }
        write(&self.sparse_path, rules.to_string().as_bytes()).map_err(write_err)?;

        Ok(true)
    }

    /// Replace entire rule set.
    ///
    /// Returns whether the file changed.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError`] if sparse checkout file cannot be accessed.
    pub fn replace_rules(&self, rules: impl IntoIterator<Item = impl Into<String>>) -> Result<bool> {
        let rules = rules.into_iter().map(Into::into).collect::<HashSet<String>>();
        self.edit(|edit| {
            if edit.rules != rules {
                edit.rules = rules;
                edit.changed = true;
            }
        })
    }
}

/// Sparsity rule editor.
///
/// # Invariant
///
/// - No duplicate sparsity rules.
/// - Rule insertion does not overwrite existing rules.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SparsityEdit {
    rules: HashSet<String>,
    changed: bool,
}

impl SparsityEdit {
    /// Insert a listing of sparsity rules.
    pub fn insert_rules(&mut self, rules: impl IntoIterator<Item = impl Into<String>>) {
        for rule in rules {
            if self.rules.insert(rule.into()) {
                self.changed = true;
            }
        }
    }

    /// Clear all sparsity rules.
    pub fn clear_rules(&mut self) {
        if !self.rules.is_empty() {
            self.rules.clear();
            self.changed = true;
        }
    }
}

impl Display for SparsityEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut rules: Vec<_> = self.rules.iter().collect();
        rules.sort();

        for rule in rules {
            writeln!(fmt, "{rule}")?;
        }

        Ok(())
    }
}

impl From<String> for SparsityEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

impl From<&str> for SparsityEdit {
    fn from(content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect::<HashSet<_>>();

        Self {
            rules,
            changed: false,
        }
    }
}

/// Sparsity rule management error types.
#[derive(Debug, thiserror::Error)]
pub enum SparseError {
    /// Sparse configuration file cannot be read from.
    #[error("failed to read from sparse file at {:?}", sparse_path.display())]
    ReadSparseFile {
        #[source]
        source: std::io::Error,
        sparse_path: PathBuf,
    },

    /// Sparse configuration file cannot be written to.
    #[error("failed to write to sparse file at {:?}", sparse_path.display())]
    WriteSparseFile {
        #[source]
        source: std::io::Error,
        sparse_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SparseError> = std::result::Result<T, E>;
