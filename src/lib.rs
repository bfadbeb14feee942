// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Multi-repository dependency manager.
//!
//! A __manifest__ declares the external repositories a project depends on,
//! each pinned to a revision, and the directory they get installed into.
//! Installed dependencies may carry manifests of their own, forming a tree
//! that gets walked according to the manifest's resolver strategy. Resolved
//! revisions can be frozen back into the manifest for reproducible installs.
//!
//! # See Also
//!
//! 1. [`config::Manifest`]
//! 2. [`project::Project`]
//! 3. [`source::SourceAccess`]

pub mod config;
pub mod path;
pub mod project;
pub mod source;

pub use config::{Group, Link, Manifest, Resolver, Source};
pub use project::{load_project, load_project_from_cwd, InstallOptions, Project};
pub use source::{Git2Source, Identity, SourceAccess, UpdateOptions};
