use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use unicase::UniCase;

use crate::error::InstallerError;
use crate::{InstallGraph, InstallNode};

/// Legal package names, scoped or not, per the npm registry rules.
static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[a-z0-9\-~][a-z0-9\-._~]*/)?[a-zA-Z0-9\-~][a-zA-Z0-9\-._~]*$")
        .expect("package name pattern is well-formed")
});

/// The validated view of an install request.
pub(crate) struct InstallPlan<'a> {
    pub(crate) nodes: BTreeMap<&'a str, &'a InstallNode>,
    /// Declared links plus the implicit self links, deduplicated and
    /// sorted by `(source, target)`.
    pub(crate) links: Vec<(&'a str, &'a str)>,
}

/// Checks the entire input before anything touches the disk. The first
/// violation wins.
pub(crate) fn validate<'a>(
    graph: &'a InstallGraph,
    store: &Path,
    ignore_bin_conflicts: bool,
) -> Result<InstallPlan<'a>, InstallerError> {
    if !store.is_absolute() {
        return Err(InstallerError::StoreNotAbsolute(display(store)));
    }
    let meta =
        std::fs::metadata(store).map_err(|_| InstallerError::StoreMissing(display(store)))?;
    if !meta.is_dir() {
        return Err(InstallerError::StoreNotDirectory(display(store)));
    }
    if std::fs::read_dir(store)?.next().is_some() {
        return Err(InstallerError::StoreNotEmpty(display(store)));
    }

    let mut nodes: BTreeMap<&str, &InstallNode> = BTreeMap::new();
    for node in &graph.nodes {
        if nodes.insert(node.key.as_str(), node).is_some() {
            return Err(InstallerError::DuplicateKey(node.key.clone()));
        }
    }

    for node in &graph.nodes {
        if !node.location.is_absolute() {
            return Err(InstallerError::NodeLocationNotAbsolute(display(
                &node.location,
            )));
        }
        // A location that doesn't exist yet is fine; the package installs
        // as empty.
        if let Ok(meta) = std::fs::metadata(&node.location) {
            if !meta.is_dir() {
                return Err(InstallerError::NodeLocationNotDirectory(display(
                    &node.location,
                )));
            }
        }
    }

    for node in &graph.nodes {
        if !PACKAGE_NAME.is_match(&node.name) {
            return Err(InstallerError::InvalidPackageName(node.name.clone()));
        }
    }

    for link in &graph.links {
        if !nodes.contains_key(link.source.as_str()) {
            return Err(InstallerError::InvalidLinkSource(link.source.clone()));
        }
        if !nodes.contains_key(link.target.as_str()) {
            return Err(InstallerError::InvalidLinkTarget(link.target.clone()));
        }
    }

    // A single node_modules directory cannot host two packages under one
    // name, nor, on the usual filesystems, two names differing only by
    // case.
    let mut names_by_source: BTreeMap<&str, BTreeMap<UniCase<&str>, &str>> = BTreeMap::new();
    for link in &graph.links {
        let target = nodes[link.target.as_str()];
        let named = names_by_source.entry(link.source.as_str()).or_default();
        match named.get(&UniCase::new(target.name.as_str())) {
            Some(&previous) if previous != link.target.as_str() => {
                return Err(InstallerError::DuplicateTargetName(
                    link.source.clone(),
                    target.name.clone(),
                ));
            }
            _ => {
                named.insert(UniCase::new(target.name.as_str()), link.target.as_str());
            }
        }
    }

    for node in &graph.nodes {
        for bin in node.bins.keys() {
            if bin.contains('/') || bin.contains('\\') || bin.contains('\n') {
                return Err(InstallerError::InvalidBinName(node.key.clone(), bin.clone()));
            }
        }
    }

    let mut links: BTreeSet<(&str, &str)> = graph
        .links
        .iter()
        .map(|link| (link.source.as_str(), link.target.as_str()))
        .collect();
    // Every package can resolve its own name, unless a dependency already
    // claims that name in its node_modules.
    for node in &graph.nodes {
        let own_name_taken = names_by_source
            .get(node.key.as_str())
            .map(|named| named.contains_key(&UniCase::new(node.name.as_str())))
            .unwrap_or(false);
        if !own_name_taken {
            links.insert((node.key.as_str(), node.key.as_str()));
        }
    }

    if !ignore_bin_conflicts {
        let mut bins_by_source: BTreeMap<&str, BTreeMap<UniCase<&str>, &str>> = BTreeMap::new();
        for &(source, target) in &links {
            let target_node = nodes[target];
            let owners = bins_by_source.entry(source).or_default();
            for bin in target_node.bins.keys() {
                match owners.get(&UniCase::new(bin.as_str())) {
                    Some(&previous) if previous != target => {
                        return Err(InstallerError::BinConflict(
                            bin.clone(),
                            source.to_owned(),
                        ));
                    }
                    _ => {
                        owners.insert(UniCase::new(bin.as_str()), target);
                    }
                }
            }
        }
    }

    Ok(InstallPlan {
        nodes,
        links: links.into_iter().collect(),
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
