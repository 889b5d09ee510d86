use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum InstallerError {
    #[error("Location is not an absolute path: \"{0}\"")]
    #[diagnostic(code(trellis_installer::store_not_absolute))]
    StoreNotAbsolute(String),

    #[error("Location does not exist: \"{0}\"")]
    #[diagnostic(code(trellis_installer::store_missing))]
    StoreMissing(String),

    #[error("Location is not a directory: \"{0}\"")]
    #[diagnostic(code(trellis_installer::store_not_directory))]
    StoreNotDirectory(String),

    #[error("Location is not an empty directory: \"{0}\"")]
    #[diagnostic(code(trellis_installer::store_not_empty))]
    StoreNotEmpty(String),

    #[error("Multiple nodes have the following key: \"{0}\"")]
    #[diagnostic(code(trellis_installer::duplicate_key))]
    DuplicateKey(String),

    #[error("Location of a node is not absolute: \"{0}\"")]
    #[diagnostic(code(trellis_installer::node_location_not_absolute))]
    NodeLocationNotAbsolute(String),

    #[error("Location of a node is not a directory: \"{0}\"")]
    #[diagnostic(code(trellis_installer::node_location_not_directory))]
    NodeLocationNotDirectory(String),

    #[error("Package name invalid: \"{0}\"")]
    #[diagnostic(code(trellis_installer::invalid_package_name))]
    InvalidPackageName(String),

    #[error("Invalid link source: \"{0}\"")]
    #[diagnostic(code(trellis_installer::invalid_link_source))]
    InvalidLinkSource(String),

    #[error("Invalid link target: \"{0}\"")]
    #[diagnostic(code(trellis_installer::invalid_link_target))]
    InvalidLinkTarget(String),

    #[error("Package \"{0}\" depends on multiple packages called \"{1}\"")]
    #[diagnostic(code(trellis_installer::duplicate_target_name))]
    DuplicateTargetName(String, String),

    #[error("Package \"{0}\" exposes a bin script with an invalid name: \"{1}\"")]
    #[diagnostic(code(trellis_installer::invalid_bin_name))]
    InvalidBinName(String, String),

    #[error("Several different scripts called \"{0}\" need to be installed at the same location ({1}).")]
    #[diagnostic(code(trellis_installer::bin_conflict))]
    BinConflict(String, String),

    /// package.json at an installed destination could not be read.
    #[error("Failed to read build manifest at {}.", .0.display())]
    #[diagnostic(code(trellis_installer::build_manifest_read_error))]
    BuildManifestReadError(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(trellis_installer::io_error))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ScriptError(#[from] trellis_script::ScriptError),
}
