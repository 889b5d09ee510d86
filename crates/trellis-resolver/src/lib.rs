//! Turns a flat set of package manifests plus a `name -> range -> version`
//! resolution table into a concrete dependency graph, duplicating
//! ("virtualizing") packages whose peer dependencies resolve differently
//! under different parents.
//!
//! The resolver performs no I/O and is fully deterministic: the same
//! manifests and resolutions always produce the same projected graph.

pub use error::ResolverError;
pub use graph::{ResolvedGraph, ResolvedLink, ResolvedNode};
pub use resolver::Resolver;

mod error;
mod graph;
mod resolver;
