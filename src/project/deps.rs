// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lazy dependency enumeration.

use crate::{
    project::{load_project, next_depth, Project, Result},
    source::{Identity, SourceAccess},
};

use tracing::info;

/// Depth-first pre-order iterator over installed dependencies.
///
/// Yields the identification record of every declared source, descending
/// into nested manifests right after the source carrying them. Nested
/// manifests are only loaded once the traversal reaches them.
#[derive(Debug)]
pub struct Dependencies<'a, A: SourceAccess> {
    access: &'a A,
    allow_dirty: bool,
    stack: Vec<Frame>,
}

#[derive(Debug)]
struct Frame {
    project: Project,
    next: usize,
    depth: Option<usize>,
}

impl<'a, A: SourceAccess> Dependencies<'a, A> {
    pub(crate) fn new(
        project: &Project,
        access: &'a A,
        depth: Option<usize>,
        allow_dirty: bool,
    ) -> Self {
        let mut stack = Vec::new();
        if project.location_path.exists() {
            stack.push(Frame {
                project: project.clone(),
                next: 0,
                depth,
            });
        }

        Self {
            access,
            allow_dirty,
            stack,
        }
    }
}

impl<A: SourceAccess> Iterator for Dependencies<'_, A> {
    type Item = Result<Identity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(source) = frame.project.manifest.sources.get(frame.next).cloned() else {
                self.stack.pop();
                continue;
            };
            frame.next += 1;

            if frame.depth == Some(0) {
                info!("skipped dependency: {:?}", source.name);
                continue;
            }

            let location = frame.project.location_path.clone();
            let depth = next_depth(frame.depth);
            let identity = match self.access.identify(&source, &location, self.allow_dirty) {
                Ok(identity) => identity,
                Err(error) => return Some(Err(error.into())),
            };

            match load_project(location.join(&source.name), false) {
                Ok(Some(project)) if project.location_path.exists() => self.stack.push(Frame {
                    project,
                    next: 0,
                    depth,
                }),
                Ok(_) => {}
                Err(error) => return Some(Err(error)),
            }

            return Some(Ok(identity));
        }
    }
}
