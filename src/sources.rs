use crate::fs_ops;
use crate::{FwiError, FwiResult};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing::info;

/// Explicit worker rank, handed down from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub index: usize,
}

impl WorkerIdentity {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// Worker 0 does the once-per-inversion chores (reports, seeding).
    pub fn is_leader(&self) -> bool {
        self.index == 0
    }
}

/// Maps worker ranks to source names and working directories.
///
/// Sources are discovered from the input deck once per process and assumed
/// static for the rest of the run.
#[derive(Debug)]
pub struct SourceRegistry {
    data_path: PathBuf,
    wildcard: String,
    solver_root: PathBuf,
    names: OnceCell<Vec<String>>,
}

impl SourceRegistry {
    pub fn new(data_path: impl Into<PathBuf>, wildcard: impl Into<String>, solver_root: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            wildcard: wildcard.into(),
            solver_root: solver_root.into(),
            names: OnceCell::new(),
        }
    }

    /// Registry for files named `{prefix}_{source}`
    pub fn for_prefix(data_path: impl Into<PathBuf>, prefix: &str, solver_root: impl Into<PathBuf>) -> Self {
        Self::new(data_path, format!("{}_*", prefix), solver_root)
    }

    pub fn names(&self) -> FwiResult<&[String]> {
        self.names
            .get_or_try_init(|| resolve_sources(&self.data_path, &self.wildcard))
            .map(Vec::as_slice)
    }

    pub fn current_source(&self, worker: WorkerIdentity) -> FwiResult<&str> {
        let names = self.names()?;
        names
            .get(worker.index)
            .map(String::as_str)
            .ok_or(FwiError::WorkerOutOfRange { index: worker.index, sources: names.len() })
    }

    pub fn working_directory(&self, source: &str) -> PathBuf {
        self.solver_root.join(source)
    }
}

/// List files in `data_path` matching `wildcard` and return their source
/// names, sorted. The name is the basename minus the literal text that
/// precedes the first `*` in the wildcard.
pub fn resolve_sources(data_path: &Path, wildcard: &str) -> FwiResult<Vec<String>> {
    let literal_prefix = wildcard.split('*').next().unwrap_or("");

    let mut names = Vec::new();
    for path in fs_ops::matching(data_path, wildcard)? {
        if !path.is_file() {
            continue;
        }
        if let Some(base) = path.file_name().and_then(|n| n.to_str()) {
            let name = base.strip_prefix(literal_prefix).unwrap_or(base);
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }

    if names.is_empty() {
        return Err(FwiError::NoSourcesFound {
            path: data_path.to_path_buf(),
            wildcard: wildcard.to_string(),
        });
    }

    let names: Vec<String> = names.into_iter().sorted().dedup().collect();
    info!(count = names.len(), path = %data_path.display(), "resolved sources");
    Ok(names)
}
