use std::collections::BTreeMap;

use node_semver::Version;
use serde::{Deserialize, Serialize};

/// A single package manifest, as handed to the resolver. This is the
/// subset of a package.json that dependency resolution cares about, with
/// every version requirement left as an uninterpreted range string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub version: Version,
    /// Local packages live inside the project. They act as reachability
    /// roots and never have their peer dependencies propagated upward.
    #[serde(default)]
    pub is_local: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
}

impl PackageManifest {
    /// A manifest with the given name and version and no dependencies of
    /// any kind.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            is_local: false,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            optional_dependencies: BTreeMap::new(),
            peer_dependencies: BTreeMap::new(),
            peer_dependencies_meta: BTreeMap::new(),
        }
    }
}

/// Per-name metadata attached to peer dependencies. A name that appears
/// here but not in `peer_dependencies` is treated as a `*` requirement.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

/// `name -> range -> concrete version`, as produced by whatever resolved
/// version ranges upstream of the resolver.
pub type ResolutionMap = BTreeMap<String, BTreeMap<String, Version>>;
