use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuildManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bin: Option<Bin>,
    #[serde(default)]
    scripts: HashMap<String, String>,
}

/// The `bin` field of a package.json, in any of the shapes npm accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    Str(String),
    Hash(HashMap<String, PathBuf>),
    Array(Vec<PathBuf>),
}

/// The slice of a package.json that matters once a package is on disk:
/// its executables and its lifecycle scripts. Bins are normalized to a
/// plain `name -> relative path` map regardless of which shape the
/// manifest used.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    #[serde(default)]
    pub bin: HashMap<String, PathBuf>,
    #[serde(default)]
    pub scripts: HashMap<String, String>,
}

impl BuildManifest {
    /// Read and normalize the package.json at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw_str = std::fs::read_to_string(path.as_ref())?;
        let raw: RawBuildManifest = serde_json::from_str(&raw_str)?;
        Ok(Self::normalize(raw))
    }

    fn normalize(raw: RawBuildManifest) -> Self {
        let mut bin = HashMap::new();
        match raw.bin {
            Some(Bin::Str(path)) => {
                // A bare string bin is named after the package itself,
                // minus any scope.
                if let Some(name) = raw.name.as_deref() {
                    let name = name.rsplit('/').next().unwrap_or(name);
                    bin.insert(name.to_owned(), PathBuf::from(path));
                }
            }
            Some(Bin::Hash(bins)) => {
                for (name, path) in bins {
                    if let Some(name) = sanitized_bin_name(&name) {
                        bin.insert(name, path);
                    }
                }
            }
            Some(Bin::Array(bins)) => {
                for path in bins {
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned());
                    if let Some(name) = name {
                        bin.insert(name, path);
                    }
                }
            }
            None => {}
        }
        Self {
            bin,
            scripts: raw.scripts,
        }
    }
}

/// Strips any directory components from a declared bin name. Returns
/// `None` when nothing usable remains.
fn sanitized_bin_name(name: &str) -> Option<String> {
    let name = name.replace(['\\', ':'], "/");
    let base = name.rsplit('/').next()?;
    if base.is_empty() {
        None
    } else {
        Some(base.to_owned())
    }
}
