use std::collections::BTreeMap;

use maplit::btreemap;
use node_semver::Version;
use pretty_assertions::assert_eq;
use trellis_common::{PackageManifest, PeerDependencyMeta, ResolutionMap};
use trellis_resolver::{ResolvedGraph, ResolvedLink, ResolvedNode, Resolver, ResolverError};

fn version(v: &str) -> Version {
    v.parse().unwrap()
}

fn pkg(name: &str, v: &str) -> PackageManifest {
    PackageManifest::new(name, version(v))
}

fn deps(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, range)| (name.to_string(), range.to_string()))
        .collect()
}

fn node(id: u32, name: &str, v: &str) -> ResolvedNode {
    ResolvedNode {
        id,
        name: name.into(),
        version: version(v),
    }
}

fn link(source_id: u32, target_id: u32) -> ResolvedLink {
    ResolvedLink { source_id, target_id }
}

#[test]
fn basic_resolution() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1"), ("c", "^1")]);
    let manifests = vec![a, pkg("b", "1.1.0"), pkg("c", "1.0.1")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.1.0") },
        "c".into() => btreemap! { "^1".into() => version("1.0.1") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(
        graph,
        ResolvedGraph {
            nodes: vec![
                node(0, "a", "1.0.0"),
                node(1, "b", "1.1.0"),
                node(2, "c", "1.0.1"),
            ],
            links: vec![link(0, 1), link(0, 2)],
        }
    );
}

#[test]
fn missing_resolution_is_fatal() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let manifests = vec![a, pkg("b", "1.0.0")];

    let err = Resolver::new()
        .resolve(&manifests, &ResolutionMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        ResolverError::MissingResolution { ref name, ref range } if name == "b" && range == "^1"
    ));
}

#[test]
fn dev_dependencies_only_for_locals() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    a.dev_dependencies = deps(&[("c", "^1")]);
    let mut b = pkg("b", "1.0.0");
    // Non-local dev deps are ignored entirely, resolvable or not.
    b.dev_dependencies = deps(&[("missing", "^9")]);
    let manifests = vec![a, b, pkg("c", "1.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
        "c".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(
        graph.links,
        vec![link(0, 1), link(0, 2)],
        "local a links both b and c; b links nothing"
    );
}

#[test]
fn optional_dependency_without_manifest_is_skipped() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.optional_dependencies = deps(&[("b", "^1")]);
    let manifests = vec![a];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();
    assert_eq!(graph.nodes, vec![node(0, "a", "1.0.0")]);
    assert_eq!(graph.links, vec![]);
}

#[test]
fn optional_dependency_without_resolution_is_fatal() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.optional_dependencies = deps(&[("b", "^1")]);
    let manifests = vec![a];

    let err = Resolver::new()
        .resolve(&manifests, &ResolutionMap::new())
        .unwrap_err();
    assert!(matches!(err, ResolverError::MissingResolution { .. }));
}

#[test]
fn peer_provider_creates_virtual_node() {
    // a -> b, c, d@2; c -> b, d@1; b peer-depends on d. The b under a must
    // see d@2 while the b under c sees d@1, so b is virtualized twice.
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1"), ("c", "^1"), ("d", "^2")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("d", "*")]);
    let mut c = pkg("c", "1.0.0");
    c.dependencies = deps(&[("b", "^1"), ("d", "^1")]);
    let manifests = vec![a, b, c, pkg("d", "1.0.0"), pkg("d", "2.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
        "c".into() => btreemap! { "^1".into() => version("1.0.0") },
        "d".into() => btreemap! {
            "^1".into() => version("1.0.0"),
            "^2".into() => version("2.0.0"),
        },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(
        graph,
        ResolvedGraph {
            nodes: vec![
                node(0, "a", "1.0.0"),
                node(1, "b", "1.0.0"),
                node(2, "b", "1.0.0"),
                node(3, "c", "1.0.0"),
                node(4, "d", "1.0.0"),
                node(5, "d", "2.0.0"),
            ],
            // Node 1 is the virtual b resolved under a (it links d@2);
            // node 2 is the one under c (it links d@1).
            links: vec![
                link(0, 1),
                link(0, 3),
                link(0, 5),
                link(1, 5),
                link(2, 4),
                link(3, 2),
                link(3, 4),
            ],
        }
    );
}

#[test]
fn equivalent_virtual_nodes_are_deduplicated() {
    // Both a and c provide the same d to b, so a single virtual b serves
    // both parents.
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1"), ("c", "^1"), ("d", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("d", "^1")]);
    let mut c = pkg("c", "1.0.0");
    c.dependencies = deps(&[("b", "^1"), ("d", "^1")]);
    let manifests = vec![a, b, c, pkg("d", "1.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
        "c".into() => btreemap! { "^1".into() => version("1.0.0") },
        "d".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    // Exactly one b node survives: the shared virtual clone.
    assert_eq!(
        graph.nodes,
        vec![
            node(0, "a", "1.0.0"),
            node(1, "b", "1.0.0"),
            node(2, "c", "1.0.0"),
            node(3, "d", "1.0.0"),
        ]
    );
    assert_eq!(
        graph.links,
        vec![
            link(0, 1),
            link(0, 2),
            link(0, 3),
            link(1, 3),
            link(2, 1),
            link(2, 3),
        ]
    );
}

#[test]
fn regular_dependency_shadows_peer() {
    // b both depends on and peer-depends on d; the regular dependency
    // wins and no virtualization happens.
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.dependencies = deps(&[("d", "^1")]);
    b.peer_dependencies = deps(&[("d", "^1")]);
    let manifests = vec![a, b, pkg("d", "1.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
        "d".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(graph.nodes.len(), 3, "no virtual b");
    assert_eq!(graph.links, vec![link(0, 1), link(1, 2)]);
}

#[test]
fn virtualization_propagates_to_grandchildren() {
    // root -> a -> b; both a and b peer-depend on p, which only root
    // provides. Fulfilling a's peer must re-enqueue b's peer under the
    // new virtual a.
    let mut root = pkg("root", "1.0.0");
    root.is_local = true;
    root.dependencies = deps(&[("a", "^1"), ("p", "^1")]);
    let mut a = pkg("a", "1.0.0");
    a.dependencies = deps(&[("b", "^1")]);
    a.peer_dependencies = deps(&[("p", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("p", "^1")]);
    let manifests = vec![root, a, b, pkg("p", "1.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "a".into() => btreemap! { "^1".into() => version("1.0.0") },
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
        "p".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(
        graph.nodes,
        vec![
            node(0, "a", "1.0.0"),
            node(1, "b", "1.0.0"),
            node(2, "p", "1.0.0"),
            node(3, "root", "1.0.0"),
        ]
    );
    assert_eq!(
        graph.links,
        vec![
            link(0, 1),
            link(0, 2),
            link(1, 2),
            link(3, 0),
            link(3, 2),
        ]
    );
}

#[test]
fn unmet_peer_fails_by_default() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("ghost", "^1")]);
    let manifests = vec![a, b];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let err = Resolver::new().resolve(&manifests, &resolutions).unwrap_err();
    assert!(matches!(
        err,
        ResolverError::UnmetPeerDependency { ref name, .. } if name == "ghost"
    ));

    // Downgraded to a warning, the same input resolves.
    let graph = Resolver::new()
        .fail_on_missing_peer(false)
        .resolve(&manifests, &resolutions)
        .unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.links, vec![link(0, 1)]);
}

#[test]
fn optional_peer_is_ignored_when_absent() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies_meta = btreemap! {
        "ghost".into() => PeerDependencyMeta { optional: true },
    };
    let manifests = vec![a, b];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.links, vec![link(0, 1)]);
}

#[test]
fn parent_provides_itself_as_peer() {
    // b peer-depends on a, and its only parent *is* a.
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("a", "^1")]);
    let manifests = vec![a, b];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    assert_eq!(
        graph.links,
        vec![link(0, 1), link(1, 0)],
        "the virtual b links back to its providing parent"
    );
}

#[test]
fn stuck_peer_links_are_abandoned() {
    // b's peer can never be found, and its parent a forever keeps a
    // pending peer of its own (a is never a peer-link source because it
    // hangs off a local root that provides nothing). The watchdog must
    // notice the queue cycling without progress and stop.
    let mut root = pkg("root", "1.0.0");
    root.is_local = true;
    root.dependencies = deps(&[("a", "^1")]);
    let mut a = pkg("a", "1.0.0");
    a.dependencies = deps(&[("b", "^1")]);
    a.peer_dependencies = deps(&[("ghost", "^1")]);
    let mut b = pkg("b", "1.0.0");
    b.peer_dependencies = deps(&[("other", "^1")]);
    let manifests = vec![root, a, b];
    let resolutions: ResolutionMap = btreemap! {
        "a".into() => btreemap! { "^1".into() => version("1.0.0") },
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    // `b`'s peer keeps returning retry-later (parent a has pending
    // peers), while `a`'s own unmet peer fails first under the default.
    let err = Resolver::new().resolve(&manifests, &resolutions).unwrap_err();
    assert!(matches!(err, ResolverError::UnmetPeerDependency { .. }));

    let graph = Resolver::new()
        .fail_on_missing_peer(false)
        .resolve(&manifests, &resolutions)
        .unwrap();
    // Nothing resolvable: the graph comes out un-virtualized.
    assert_eq!(graph.nodes.len(), 3);
}

#[test]
fn resolving_projected_output_is_a_fixed_point() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1"), ("c", "^1")]);
    let mut b = pkg("b", "1.1.0");
    b.dependencies = deps(&[("c", "^1")]);
    let manifests = vec![a, b, pkg("c", "1.0.1")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.1.0") },
        "c".into() => btreemap! { "^1".into() => version("1.0.1") },
    };

    let first = Resolver::new().resolve(&manifests, &resolutions).unwrap();

    // Re-express the projection as exact-pinned manifests and resolve
    // again.
    let mut remanifests = Vec::new();
    let mut reresolutions = ResolutionMap::new();
    for n in &first.nodes {
        let mut manifest = PackageManifest::new(&n.name, n.version.clone());
        manifest.is_local = n.id == 0;
        for l in &first.links {
            if l.source_id == n.id {
                let target = &first.nodes[l.target_id as usize];
                let range = target.version.to_string();
                manifest.dependencies.insert(target.name.clone(), range.clone());
                reresolutions
                    .entry(target.name.clone())
                    .or_default()
                    .insert(range, target.version.clone());
            }
        }
        remanifests.push(manifest);
    }

    let second = Resolver::new()
        .resolve(&remanifests, &reresolutions)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn projected_output_serializes_to_the_public_shape() {
    let mut a = pkg("a", "1.0.0");
    a.is_local = true;
    a.dependencies = deps(&[("b", "^1")]);
    let manifests = vec![a, pkg("b", "1.0.0")];
    let resolutions: ResolutionMap = btreemap! {
        "b".into() => btreemap! { "^1".into() => version("1.0.0") },
    };

    let graph = Resolver::new().resolve(&manifests, &resolutions).unwrap();
    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "nodes": [
                { "id": 0, "name": "a", "version": "1.0.0" },
                { "id": 1, "name": "b", "version": "1.0.0" },
            ],
            "links": [
                { "sourceId": 0, "targetId": 1 },
            ],
        })
    );
}
