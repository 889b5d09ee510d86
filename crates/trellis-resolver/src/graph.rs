use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::{Index, IndexMut};

use node_semver::Version;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// An in-memory package node. Multiple nodes may share a `(name, version)`
/// pair as long as their resolved peer sets differ; the unique one with an
/// empty peer set is the "base" node for that pair.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) version: Version,
    pub(crate) is_local: bool,
    /// Peer dependencies fulfilled so far, keyed by dependency name.
    pub(crate) peer_deps: BTreeMap<String, NodeIndex>,
    /// Declared peer dependencies still waiting for a provider.
    pub(crate) pending_peers: Vec<PeerLink>,
}

/// An unresolved peer dependency declared by one node.
#[derive(Debug, Clone)]
pub(crate) struct PeerLink {
    pub(crate) name: String,
    pub(crate) range: String,
    pub(crate) optional: bool,
}

/// A pending peer link paired with one reverse-neighbor of its source:
/// one unit of work for the resolver's fixed-point loop.
#[derive(Debug, Clone)]
pub(crate) struct PendingPeer {
    pub(crate) parent: NodeIndex,
    pub(crate) source: NodeIndex,
    pub(crate) name: String,
    pub(crate) range: String,
    pub(crate) optional: bool,
}

/// Mutable dependency graph, only ever touched by a single resolve pass.
/// Stored as an arena of nodes with paired forward/reverse edge indices;
/// edges have set semantics.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    pub(crate) inner: StableGraph<Node, ()>,
    /// `(name, version)` -> the node with no fulfilled peers.
    base_nodes: BTreeMap<(String, Version), NodeIndex>,
    /// `(name, version)` -> every node sharing the pair, in creation order.
    variants: BTreeMap<(String, Version), Vec<NodeIndex>>,
}

impl Index<NodeIndex> for Graph {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.inner[index]
    }
}

impl IndexMut<NodeIndex> for Graph {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        &mut self.inner[index]
    }
}

impl Graph {
    /// Adds the base node for `(name, version)`. Feeding two manifests
    /// with the same name and version is not supported; the later one
    /// shadows the earlier in the base index.
    pub(crate) fn add_node(&mut self, name: String, version: Version, is_local: bool) -> NodeIndex {
        let idx = self.inner.add_node(Node {
            name: name.clone(),
            version: version.clone(),
            is_local,
            peer_deps: BTreeMap::new(),
            pending_peers: Vec::new(),
        });
        self.base_nodes.insert((name.clone(), version.clone()), idx);
        self.variants.entry((name, version)).or_default().push(idx);
        idx
    }

    pub(crate) fn get_base_node(&self, name: &str, version: &Version) -> Option<NodeIndex> {
        self.base_nodes
            .get(&(name.to_owned(), version.clone()))
            .copied()
    }

    pub(crate) fn has_link(&self, source: NodeIndex, target: NodeIndex) -> bool {
        self.inner.find_edge(source, target).is_some()
    }

    /// Set-style edge insertion into both the forward and reverse index.
    pub(crate) fn add_link(&mut self, source: NodeIndex, target: NodeIndex) {
        if self.inner.find_edge(source, target).is_none() {
            self.inner.add_edge(source, target, ());
        }
    }

    pub(crate) fn add_peer_link(
        &mut self,
        source: NodeIndex,
        name: String,
        range: String,
        optional: bool,
    ) {
        self.inner[source]
            .pending_peers
            .push(PeerLink { name, range, optional });
    }

    pub(crate) fn has_peer_link(&self, idx: NodeIndex) -> bool {
        !self.inner[idx].pending_peers.is_empty()
    }

    pub(crate) fn pending_peers(&self, idx: NodeIndex) -> &[PeerLink] {
        &self.inner[idx].pending_peers
    }

    /// Every `(parent, source, ...)` pair with a pending peer link, for
    /// each reverse-neighbor of each source. Local sources are excluded:
    /// a local package never has its peers provided from above.
    pub(crate) fn peer_links(&self) -> Vec<PendingPeer> {
        let mut out = Vec::new();
        for source in self.inner.node_indices() {
            let node = &self.inner[source];
            if node.is_local || node.pending_peers.is_empty() {
                continue;
            }
            let mut parents: Vec<NodeIndex> = self
                .inner
                .neighbors_directed(source, Direction::Incoming)
                .collect();
            parents.sort_unstable();
            for parent in parents {
                for link in &node.pending_peers {
                    out.push(PendingPeer {
                        parent,
                        source,
                        name: link.name.clone(),
                        range: link.range.clone(),
                        optional: link.optional,
                    });
                }
            }
        }
        out
    }

    /// Forward neighbors, in ascending node order.
    pub(crate) fn children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .inner
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_unstable();
        children
    }

    pub(crate) fn child_by_name(&self, idx: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.children(idx)
            .into_iter()
            .find(|&child| self.inner[child].name == name)
    }

    /// Looks for an existing node equivalent to `source` with the peer
    /// `fulfilled_name -> fulfilled_target` additionally resolved. The
    /// dedup key is `(name, version, full peer map)`.
    pub(crate) fn find_virtual(
        &self,
        source: NodeIndex,
        fulfilled_name: &str,
        fulfilled_target: NodeIndex,
    ) -> Option<NodeIndex> {
        let src = &self.inner[source];
        let mut expected = src.peer_deps.clone();
        expected.insert(fulfilled_name.to_owned(), fulfilled_target);
        self.variants
            .get(&(src.name.clone(), src.version.clone()))?
            .iter()
            .copied()
            .find(|&idx| idx != source && self.inner[idx].peer_deps == expected)
    }

    /// Clones `source` into a new node with `fulfilled_name` resolved to
    /// `fulfilled_target`: same outbound links plus one to the provider,
    /// and the same pending peers minus the fulfilled name.
    pub(crate) fn create_virtual(
        &mut self,
        source: NodeIndex,
        fulfilled_name: &str,
        fulfilled_target: NodeIndex,
    ) -> NodeIndex {
        let src = self.inner[source].clone();
        let mut peer_deps = src.peer_deps;
        peer_deps.insert(fulfilled_name.to_owned(), fulfilled_target);
        let pending_peers = src
            .pending_peers
            .into_iter()
            .filter(|link| link.name != fulfilled_name)
            .collect();
        let idx = self.inner.add_node(Node {
            name: src.name.clone(),
            version: src.version.clone(),
            is_local: src.is_local,
            peer_deps,
            pending_peers,
        });
        self.variants
            .entry((src.name, src.version))
            .or_default()
            .push(idx);
        for child in self.children(source) {
            self.add_link(idx, child);
        }
        self.add_link(idx, fulfilled_target);
        idx
    }

    /// Replaces the edge `parent -> old_child` with `parent -> new_child`.
    pub(crate) fn rewire(&mut self, parent: NodeIndex, old_child: NodeIndex, new_child: NodeIndex) {
        if let Some(edge) = self.inner.find_edge(parent, old_child) {
            self.inner.remove_edge(edge);
        }
        self.add_link(parent, new_child);
    }

    /// Projects the graph to its public shape: only nodes reachable from a
    /// local root survive, densely renumbered in `(name, version)` order
    /// (creation order breaks ties between virtual duplicates), with links
    /// sorted by `(source_id, target_id)`.
    pub(crate) fn project(&self) -> ResolvedGraph {
        let mut stack: Vec<NodeIndex> = self
            .inner
            .node_indices()
            .filter(|&idx| self.inner[idx].is_local)
            .collect();
        let mut reachable: HashSet<NodeIndex> = stack.iter().copied().collect();
        while let Some(idx) = stack.pop() {
            for child in self.inner.neighbors_directed(idx, Direction::Outgoing) {
                if reachable.insert(child) {
                    stack.push(child);
                }
            }
        }

        let mut kept: Vec<NodeIndex> = reachable.iter().copied().collect();
        kept.sort_unstable_by(|&a, &b| {
            let (na, nb) = (&self.inner[a], &self.inner[b]);
            na.name
                .cmp(&nb.name)
                .then_with(|| na.version.cmp(&nb.version))
                .then(a.cmp(&b))
        });

        let ids: HashMap<NodeIndex, u32> = kept
            .iter()
            .enumerate()
            .map(|(id, &idx)| (idx, id as u32))
            .collect();

        let nodes = kept
            .iter()
            .map(|&idx| {
                let node = &self.inner[idx];
                ResolvedNode {
                    id: ids[&idx],
                    name: node.name.clone(),
                    version: node.version.clone(),
                }
            })
            .collect();

        let links: BTreeSet<(u32, u32)> = self
            .inner
            .edge_indices()
            .filter_map(|edge| self.inner.edge_endpoints(edge))
            .filter(|(source, _)| reachable.contains(source))
            .map(|(source, target)| (ids[&source], ids[&target]))
            .collect();

        ResolvedGraph {
            nodes,
            links: links
                .into_iter()
                .map(|(source_id, target_id)| ResolvedLink { source_id, target_id })
                .collect(),
        }
    }
}

/// The resolver's public output: a dependency graph reduced to what an
/// installer needs, with dense ids and a stable ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGraph {
    pub nodes: Vec<ResolvedNode>,
    pub links: Vec<ResolvedLink>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    pub id: u32,
    pub name: String,
    pub version: Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub source_id: u32,
    pub target_id: u32,
}
