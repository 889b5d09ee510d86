use std::collections::BTreeMap;
use std::path::PathBuf;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use trellis_common::BuildManifest;
use trellis_script::Script;

use crate::condense::Condensation;
use crate::error::InstallerError;

/// Lifecycle events run for every installed package, in order, each at
/// most once.
const EVENTS: [&str; 2] = ["install", "postinstall"];

/// Walks the component DAG: a component's scripts start only when every
/// component it depends on has finished, and members of one component run
/// concurrently. On failure no new components are scheduled, but
/// in-flight ones are left to finish.
pub(crate) async fn run_lifecycle_scripts(
    condensation: &Condensation,
    destinations: &BTreeMap<String, PathBuf>,
) -> Result<(), InstallerError> {
    let mut blockers: BTreeMap<usize, usize> = condensation
        .components
        .iter()
        .map(|(&id, component)| (id, component.dependencies.len()))
        .collect();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (&id, component) in &condensation.components {
        for &dep in &component.dependencies {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: Vec<usize> = blockers
        .iter()
        .filter(|(_, &waiting)| waiting == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut running = FuturesUnordered::new();
    let mut failure: Option<InstallerError> = None;

    loop {
        for id in ready.drain(..) {
            let dests: Vec<PathBuf> = condensation.components[&id]
                .keys
                .iter()
                .filter_map(|key| destinations.get(key).cloned())
                .collect();
            running.push(async move {
                let result =
                    futures::future::try_join_all(dests.into_iter().map(run_package_scripts))
                        .await
                        .map(drop);
                (id, result)
            });
        }
        let Some((id, result)) = running.next().await else {
            break;
        };
        match result {
            Ok(()) => {
                for &dependent in dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                    let waiting = blockers
                        .get_mut(&dependent)
                        .expect("every component has a blocker count");
                    *waiting -= 1;
                    if *waiting == 0 {
                        ready.push(dependent);
                    }
                }
            }
            Err(error) => {
                failure = Some(error);
                break;
            }
        }
    }

    if let Some(error) = failure {
        // Drain what was already running before surfacing the failure.
        while running.next().await.is_some() {}
        return Err(error);
    }
    Ok(())
}

/// Runs the package's declared lifecycle scripts, if its destination
/// carries a package.json at all.
async fn run_package_scripts(dest: PathBuf) -> Result<(), InstallerError> {
    let manifest_path = dest.join("package.json");
    if !manifest_path.is_file() {
        return Ok(());
    }
    let manifest = BuildManifest::from_path(&manifest_path)
        .map_err(|error| InstallerError::BuildManifestReadError(manifest_path, error))?;
    for event in EVENTS {
        if !manifest.scripts.contains_key(event) {
            continue;
        }
        let dir = dest.clone();
        tracing::debug!("Running {event} script in {}.", dir.display());
        async_std::task::spawn_blocking(move || {
            Script::new(dir, event)?.output()?;
            Ok::<_, trellis_script::ScriptError>(())
        })
        .await?;
    }
    Ok(())
}
