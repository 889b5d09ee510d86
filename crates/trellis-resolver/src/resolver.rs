use std::collections::{BTreeMap, VecDeque};

use node_semver::Range;
use petgraph::stable_graph::NodeIndex;
use trellis_common::{PackageManifest, ResolutionMap};

use crate::error::ResolverError;
use crate::graph::{Graph, PendingPeer, ResolvedGraph};

/// Outcome of hunting for a peer dependency's provider.
enum Provider {
    /// A concrete node will fulfill the peer.
    Found(NodeIndex),
    /// Nothing to do: a regular dependency shadows the peer, or the peer
    /// is optional and absent.
    Ignored,
    /// The parent is itself awaiting virtualization; try again once the
    /// queue has moved.
    RetryLater,
    /// Non-optional and unmet, with failure downgraded to a warning.
    Unmet,
}

/// Builds a dependency graph from manifests and a resolution table, then
/// drives peer-dependency resolution to a fixed point.
#[derive(Debug, Clone)]
pub struct Resolver {
    fail_on_missing_peer: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            fail_on_missing_peer: true,
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, an unmet non-optional peer dependency logs a warning
    /// instead of failing the whole resolution. Defaults to enabled.
    pub fn fail_on_missing_peer(mut self, fail: bool) -> Self {
        self.fail_on_missing_peer = fail;
        self
    }

    /// Resolves `manifests` against `resolutions` and projects the result
    /// to its public shape.
    pub fn resolve(
        &self,
        manifests: &[PackageManifest],
        resolutions: &ResolutionMap,
    ) -> Result<ResolvedGraph, ResolverError> {
        let mut graph = Graph::default();

        let sources: Vec<NodeIndex> = manifests
            .iter()
            .map(|manifest| {
                graph.add_node(
                    manifest.name.clone(),
                    manifest.version.clone(),
                    manifest.is_local,
                )
            })
            .collect();

        for (manifest, &source) in manifests.iter().zip(&sources) {
            for (name, range) in &manifest.dependencies {
                let target = lookup(&graph, name, range, resolutions)?;
                graph.add_link(source, target);
            }
        }

        // Dev dependencies only matter for packages that live in the
        // project itself.
        for (manifest, &source) in manifests.iter().zip(&sources) {
            if !manifest.is_local {
                continue;
            }
            for (name, range) in &manifest.dev_dependencies {
                let target = lookup(&graph, name, range, resolutions)?;
                graph.add_link(source, target);
            }
        }

        for (manifest, &source) in manifests.iter().zip(&sources) {
            for (name, range) in &manifest.optional_dependencies {
                let version = resolutions
                    .get(name)
                    .and_then(|ranges| ranges.get(range))
                    .ok_or_else(|| ResolverError::MissingResolution {
                        name: name.clone(),
                        range: range.clone(),
                    })?;
                // Optional dependencies whose package never made it into
                // the manifest set are dropped.
                match graph.get_base_node(name, version) {
                    Some(target) => graph.add_link(source, target),
                    None => tracing::debug!(
                        "skipping optional dependency {name}@{version}: no manifest provided"
                    ),
                }
            }
        }

        for (manifest, &source) in manifests.iter().zip(&sources) {
            // Names listed only in peerDependenciesMeta count as `*`
            // requirements; explicit ranges win.
            let mut peers: BTreeMap<&str, &str> = manifest
                .peer_dependencies_meta
                .keys()
                .map(|name| (name.as_str(), "*"))
                .collect();
            for (name, range) in &manifest.peer_dependencies {
                peers.insert(name, range);
            }
            for (name, range) in peers {
                let optional = manifest
                    .peer_dependencies_meta
                    .get(name)
                    .map(|meta| meta.optional)
                    .unwrap_or(false);
                graph.add_peer_link(source, name.to_owned(), range.to_owned(), optional);
            }
        }

        self.resolve_peers(&mut graph)?;

        Ok(graph.project())
    }

    /// The peer fixed point. Work items are `(parent, source)` pairs; each
    /// fulfilled peer replaces `source` under `parent` with a virtual
    /// duplicate, which may surface new work for the duplicate's own
    /// subtree. The watchdog counts a full fruitless revolution of the
    /// queue and bails out rather than spin on an unresolvable cycle.
    fn resolve_peers(&self, graph: &mut Graph) -> Result<(), ResolverError> {
        let mut queue: VecDeque<PendingPeer> = graph.peer_links().into();
        let mut watchdog = queue.len() + 1;

        while watchdog > 0 {
            let Some(pending) = queue.pop_front() else {
                break;
            };

            // The parent was rewired away from this source since the entry
            // was queued; the clone carries its own copy of the work.
            if !graph.has_link(pending.parent, pending.source) {
                watchdog = queue.len() + 1;
                continue;
            }

            match self.find_provider(graph, &pending)? {
                Provider::Ignored | Provider::Unmet => {}
                Provider::RetryLater => {
                    queue.push_back(pending);
                    watchdog -= 1;
                }
                Provider::Found(provider) => {
                    check_peer_range(graph, &pending, provider);
                    let fulfilled = match graph.find_virtual(pending.source, &pending.name, provider)
                    {
                        Some(existing) => existing,
                        None => {
                            let virt = graph.create_virtual(pending.source, &pending.name, provider);
                            for link in graph.pending_peers(virt) {
                                queue.push_back(PendingPeer {
                                    parent: pending.parent,
                                    source: virt,
                                    name: link.name.clone(),
                                    range: link.range.clone(),
                                    optional: link.optional,
                                });
                            }
                            // The clone's children now answer to a new
                            // parent, so their pending peers go back on the
                            // queue as well.
                            for child in graph.children(virt) {
                                for link in graph.pending_peers(child) {
                                    queue.push_back(PendingPeer {
                                        parent: virt,
                                        source: child,
                                        name: link.name.clone(),
                                        range: link.range.clone(),
                                        optional: link.optional,
                                    });
                                }
                            }
                            virt
                        }
                    };
                    graph.rewire(pending.parent, pending.source, fulfilled);
                    watchdog = queue.len() + 1;
                }
            }
        }

        if !queue.is_empty() {
            tracing::warn!(
                "abandoning {} peer link(s) after a full pass without progress",
                queue.len()
            );
        }

        Ok(())
    }

    fn find_provider(
        &self,
        graph: &Graph,
        pending: &PendingPeer,
    ) -> Result<Provider, ResolverError> {
        // A regular dependency with the peer's name always wins.
        if graph.child_by_name(pending.source, &pending.name).is_some() {
            return Ok(Provider::Ignored);
        }

        let mut candidates = graph.children(pending.parent);
        candidates.push(pending.parent);
        if let Some(found) = candidates
            .into_iter()
            .find(|&idx| graph[idx].name == pending.name)
        {
            return Ok(Provider::Found(found));
        }

        if pending.optional {
            return Ok(Provider::Ignored);
        }

        // The parent may itself get virtualized and replaced, at which
        // point the peer could become findable.
        if graph.has_peer_link(pending.parent) {
            return Ok(Provider::RetryLater);
        }

        let source = &graph[pending.source];
        let parent = &graph[pending.parent];
        if self.fail_on_missing_peer {
            return Err(ResolverError::UnmetPeerDependency {
                name: pending.name.clone(),
                source_pkg: format!("{}@{}", source.name, source.version),
                parent: format!("{}@{}", parent.name, parent.version),
            });
        }
        tracing::warn!(
            "unmet peer dependency, {} in {}@{} (parent: {}@{})",
            pending.name,
            source.name,
            source.version,
            parent.name,
            parent.version
        );
        Ok(Provider::Unmet)
    }
}

fn lookup(
    graph: &Graph,
    name: &str,
    range: &str,
    resolutions: &ResolutionMap,
) -> Result<NodeIndex, ResolverError> {
    let version = resolutions
        .get(name)
        .and_then(|ranges| ranges.get(range))
        .ok_or_else(|| ResolverError::MissingResolution {
            name: name.to_owned(),
            range: range.to_owned(),
        })?;
    graph
        .get_base_node(name, version)
        .ok_or_else(|| ResolverError::MissingManifest {
            name: name.to_owned(),
            version: version.clone(),
        })
}

/// A provider whose version falls outside the declared range is still
/// used, but loudly.
fn check_peer_range(graph: &Graph, pending: &PendingPeer, provider: NodeIndex) {
    let version = &graph[provider].version;
    let satisfied = Range::parse(&pending.range)
        .map(|range| range.satisfies(version))
        .unwrap_or(false);
    if !satisfied {
        let source = &graph[pending.source];
        let parent = &graph[pending.parent];
        tracing::warn!(
            "[WARNING] unmatching peer dependency, {} in {}@{} (parent: {}@{}) was resolved to version {} which does not satisfy the given range: {}",
            pending.name,
            source.name,
            source.version,
            parent.name,
            parent.version,
            version,
            pending.range
        );
    }
}
