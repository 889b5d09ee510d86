//! Materializes a resolved dependency graph as an isolated on-disk store:
//! every package gets its own directory, its dependencies symlinked into
//! its `node_modules`, executable shims in `node_modules/.bin`, and its
//! lifecycle scripts run in dependency order over the strongly-connected
//! components of the final graph.
//!
//! All validation happens before the first disk mutation; all file copies
//! finish before the first symlink; all links and shims finish before the
//! first script.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

pub use condense::{condense, Component, Condensation};
pub use error::InstallerError;

mod condense;
mod copy;
mod error;
mod link;
mod scripts;
mod validate;

/// Cap on concurrently in-flight mkdir/symlink/shim operations, mostly to
/// stay clear of file-descriptor limits.
pub const DEFAULT_CONCURRENCY: usize = 300;

/// Environment variable capping the file-copy worker pool.
pub const WORKERS_LIMIT_ENV: &str = "WORKERS_LIMIT";

/// The graph an installer consumes. Keys are caller-chosen unique
/// identifiers; `location` points at each package's existing contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallGraph {
    pub nodes: Vec<InstallNode>,
    pub links: Vec<InstallLink>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallNode {
    pub key: String,
    pub name: String,
    pub location: PathBuf,
    /// Install into `location` itself instead of copying into the store.
    /// Used for packages that live inside the project.
    #[serde(default)]
    pub keep_in_place: bool,
    /// Executables this package exposes: bin name to a path relative to
    /// the package root.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bins: BTreeMap<String, PathBuf>,
}

impl InstallNode {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            location: location.into(),
            keep_in_place: false,
            bins: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallLink {
    pub source: String,
    pub target: String,
}

/// Builder-style installer.
#[derive(Clone, Debug)]
pub struct Installer {
    concurrency: usize,
    workers_limit: Option<usize>,
    files_to_exclude: HashSet<String>,
    ignore_bin_conflicts: bool,
}

impl Default for Installer {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            workers_limit: None,
            files_to_exclude: HashSet::new(),
            ignore_bin_conflicts: false,
        }
    }
}

impl Installer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps concurrently in-flight filesystem operations outside the copy
    /// pool.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Caps the file-copy worker pool, overriding the `WORKERS_LIMIT`
    /// environment variable.
    pub fn workers_limit(mut self, workers: usize) -> Self {
        self.workers_limit = Some(workers);
        self
    }

    /// Top-level file names that are never copied into the store.
    pub fn files_to_exclude(
        mut self,
        files: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.files_to_exclude = files.into_iter().map(Into::into).collect();
        self
    }

    /// When two linked dependencies expose the same bin name, keep one of
    /// the shims instead of failing validation.
    pub fn ignore_bin_conflicts(mut self, ignore: bool) -> Self {
        self.ignore_bin_conflicts = ignore;
        self
    }

    /// Installs `graph` into `store`, which must be an existing empty
    /// directory given as an absolute path. On failure the partial state
    /// on disk is left as-is.
    pub async fn install(
        &self,
        graph: &InstallGraph,
        store: impl AsRef<Path>,
    ) -> Result<(), InstallerError> {
        let store = store.as_ref();
        let plan = validate::validate(graph, store, self.ignore_bin_conflicts)?;

        let start = Instant::now();
        let destinations: BTreeMap<String, PathBuf> = plan
            .nodes
            .iter()
            .map(|(&key, node)| {
                let dest = if node.keep_in_place {
                    node.location.clone()
                } else {
                    store.join(key)
                };
                (key.to_owned(), dest)
            })
            .collect();

        // Stage contents: prepare every destination while collecting the
        // flat copy list, then drain the list through the worker pool.
        let staging: Vec<(PathBuf, PathBuf, bool)> = plan
            .nodes
            .values()
            .map(|node| {
                (
                    node.location.clone(),
                    destinations[node.key.as_str()].clone(),
                    node.keep_in_place,
                )
            })
            .collect();
        let staged: Vec<Vec<copy::CopyAction>> = futures::stream::iter(
            staging.into_iter().map(|(location, dest, keep_in_place)| {
                let files_to_exclude = self.files_to_exclude.clone();
                async move {
                    async_std::task::spawn_blocking(move || {
                        if keep_in_place {
                            copy::purge_node_modules(&dest)?;
                            Ok(Vec::new())
                        } else {
                            copy::scan_package(&location, &dest, &files_to_exclude)
                        }
                    })
                    .await
                }
            }),
        )
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await?;
        let actions: Vec<copy::CopyAction> = staged.into_iter().flatten().collect();
        let total_files = actions.len();
        copy::run_copy_pool(actions, self.workers_limit).await?;
        tracing::debug!(
            "Staged {} package(s), copying {total_files} file(s), in {}ms.",
            plan.nodes.len(),
            start.elapsed().as_millis()
        );

        let start = Instant::now();
        let link_jobs: Vec<link::LinkJob> = plan
            .links
            .iter()
            .map(|&(source, target)| {
                let target_node = plan.nodes[target];
                link::LinkJob {
                    link_path: destinations[source]
                        .join("node_modules")
                        .join(&target_node.name),
                    target_dest: destinations[target].clone(),
                }
            })
            .collect();
        let total_links = link_jobs.len();
        link::link_deps(link_jobs, self.concurrency).await?;

        let mut shim_jobs: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        for &(source, target) in &plan.links {
            let target_node = plan.nodes[target];
            for (bin_name, bin_path) in &target_node.bins {
                let shim = destinations[source]
                    .join("node_modules")
                    .join(".bin")
                    .join(bin_name);
                shim_jobs.insert(shim, destinations[target].join(bin_path));
            }
        }
        link::link_bins(shim_jobs, self.concurrency).await?;
        tracing::debug!(
            "Created {total_links} link(s) in {}ms.",
            start.elapsed().as_millis()
        );

        let start = Instant::now();
        let keys: Vec<&str> = plan.nodes.keys().copied().collect();
        let condensation = condense(&keys, &plan.links, |key| plan.nodes[key].keep_in_place);
        scripts::run_lifecycle_scripts(&condensation, &destinations).await?;
        tracing::debug!(
            "Ran lifecycle scripts for {} component(s) in {}ms.",
            condensation.components.len(),
            start.elapsed().as_millis()
        );

        Ok(())
    }
}
