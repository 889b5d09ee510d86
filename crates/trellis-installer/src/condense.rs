use std::collections::{BTreeMap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// One strongly-connected component of an installed package graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Component {
    /// Keys of the nodes in this component, sorted.
    pub keys: Vec<String>,
    /// Ids of the components this one depends on; never includes itself.
    pub dependencies: Vec<usize>,
}

/// A package graph condensed to a DAG of strongly-connected components.
///
/// Component ids are assigned dependencies-first: every component's id is
/// greater than the ids of all components it depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Condensation {
    pub components: BTreeMap<usize, Component>,
    /// Components containing at least one node the caller flagged as a
    /// root.
    pub root_components: Vec<usize>,
}

/// Condenses `links` over `keys` into the component DAG. Self-loops are
/// legal in the input and never produce a self-dependency.
pub fn condense(
    keys: &[&str],
    links: &[(&str, &str)],
    is_root: impl Fn(&str) -> bool,
) -> Condensation {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut indices: BTreeMap<&str, NodeIndex> = BTreeMap::new();
    for &key in keys {
        indices.entry(key).or_insert_with(|| graph.add_node(key));
    }
    for &(source, target) in links {
        if let (Some(&source), Some(&target)) = (indices.get(source), indices.get(target)) {
            graph.add_edge(source, target, ());
        }
    }

    // tarjan_scc yields components in reverse topological order, which
    // is exactly dependencies-first.
    let sccs = tarjan_scc(&graph);
    let mut component_of: HashMap<NodeIndex, usize> = HashMap::new();
    for (id, scc) in sccs.iter().enumerate() {
        for &idx in scc {
            component_of.insert(idx, id);
        }
    }

    let mut components = BTreeMap::new();
    let mut root_components = Vec::new();
    for (id, scc) in sccs.iter().enumerate() {
        let mut keys: Vec<String> = scc.iter().map(|&idx| graph[idx].to_owned()).collect();
        keys.sort_unstable();
        let mut dependencies: Vec<usize> = scc
            .iter()
            .flat_map(|&idx| graph.neighbors(idx))
            .map(|target| component_of[&target])
            .filter(|&dep| dep != id)
            .collect();
        dependencies.sort_unstable();
        dependencies.dedup();
        if scc.iter().any(|&idx| is_root(graph[idx])) {
            root_components.push(id);
        }
        components.insert(id, Component { keys, dependencies });
    }

    Condensation {
        components,
        root_components,
    }
}
