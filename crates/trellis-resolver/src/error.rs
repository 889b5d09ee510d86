use miette::Diagnostic;
use node_semver::Version;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ResolverError {
    /// A declared dependency has no entry in the resolution map.
    #[error("No resolution found for dependency \"{name}@{range}\".")]
    #[diagnostic(code(trellis_resolver::missing_resolution))]
    MissingResolution { name: String, range: String },

    /// The resolution map names a concrete version for which no manifest
    /// was provided.
    #[error("No manifest provided for package \"{name}@{version}\".")]
    #[diagnostic(code(trellis_resolver::missing_manifest))]
    MissingManifest { name: String, version: Version },

    /// A non-optional peer dependency could not be provided by any parent.
    #[error("unmet peer dependency, {name} in {source_pkg} (parent: {parent})")]
    #[diagnostic(code(trellis_resolver::unmet_peer_dependency))]
    UnmetPeerDependency {
        name: String,
        source_pkg: String,
        parent: String,
    },
}
