use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::InstallerError;
use crate::WORKERS_LIMIT_ENV;

/// One file waiting to be copied into the store.
#[derive(Clone, Debug)]
pub(crate) struct CopyAction {
    pub(crate) from: PathBuf,
    pub(crate) to: PathBuf,
}

/// Removes a kept-in-place package's module folder ahead of relinking.
pub(crate) fn purge_node_modules(dest: &Path) -> Result<(), InstallerError> {
    let node_modules = dest.join("node_modules");
    match std::fs::symlink_metadata(&node_modules) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&node_modules)?,
        Ok(_) => std::fs::remove_file(&node_modules)?,
        Err(_) => {}
    }
    Ok(())
}

/// Walks a package's contents, creating destination directories eagerly
/// and returning the file copies left to perform. Top-level files whose
/// name appears in `files_to_exclude` are skipped. A location that does
/// not exist installs as an empty package.
pub(crate) fn scan_package(
    location: &Path,
    dest: &Path,
    files_to_exclude: &HashSet<String>,
) -> Result<Vec<CopyAction>, InstallerError> {
    let mut actions = Vec::new();
    std::fs::create_dir_all(dest)?;
    if !location.exists() {
        return Ok(actions);
    }
    for entry in WalkDir::new(location).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(location)
            .expect("walkdir only yields children of its root");
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(dest.join(relative))?;
        } else {
            if entry.depth() == 1
                && entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| files_to_exclude.contains(name))
                    .unwrap_or(false)
            {
                continue;
            }
            actions.push(CopyAction {
                from: entry.path().to_owned(),
                to: dest.join(relative),
            });
        }
    }
    Ok(actions)
}

/// Pool size for a given action count and configured cap.
pub(crate) fn worker_count(file_count: usize, configured: Option<usize>, fallback: usize) -> usize {
    configured.unwrap_or(fallback).max(1).min(file_count)
}

/// Executes the collected copy actions on a pool of workers, each owning
/// a disjoint slice of the list. The pool is capped by the configured
/// limit, the `WORKERS_LIMIT` environment variable, or the machine's
/// parallelism, in that order, and never exceeds the file count.
pub(crate) async fn run_copy_pool(
    actions: Vec<CopyAction>,
    configured_limit: Option<usize>,
) -> Result<(), InstallerError> {
    if actions.is_empty() {
        return Ok(());
    }
    let limit = configured_limit.or_else(|| {
        std::env::var(WORKERS_LIMIT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
    });
    let fallback = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    let workers = worker_count(actions.len(), limit, fallback);
    let chunk_size = (actions.len() + workers - 1) / workers;
    let mut handles = Vec::with_capacity(workers);
    for chunk in actions.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        handles.push(async_std::task::spawn(async move {
            for action in &chunk {
                async_std::fs::copy(&action.from, &action.to).await?;
            }
            Ok::<_, std::io::Error>(())
        }));
    }
    futures::future::try_join_all(handles).await?;
    Ok(())
}
