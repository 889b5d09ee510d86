use std::collections::BTreeMap;
use std::path::PathBuf;

use futures::{StreamExt, TryStreamExt};

use crate::error::InstallerError;

/// One `node_modules/<name>` entry to create.
pub(crate) struct LinkJob {
    pub(crate) link_path: PathBuf,
    pub(crate) target_dest: PathBuf,
}

/// Creates dependency symlinks, junction-style where real symlinks need
/// privileges.
pub(crate) async fn link_deps(
    jobs: Vec<LinkJob>,
    concurrency: usize,
) -> Result<(), InstallerError> {
    futures::stream::iter(jobs)
        .map(Ok)
        .try_for_each_concurrent(concurrency, |job| async move {
            let LinkJob {
                link_path,
                target_dest,
            } = job;
            let parent = link_path
                .parent()
                .expect("node_modules entries always have a parent")
                .to_path_buf();
            let relative = pathdiff::diff_paths(&target_dest, &parent)
                .expect("link and target are both absolute");
            async_std::task::spawn_blocking(move || {
                std::fs::create_dir_all(&parent)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&relative, &link_path)?;
                #[cfg(windows)]
                std::os::windows::fs::symlink_dir(&relative, &link_path)
                    .or_else(|_| junction::create(&target_dest, &link_path))?;
                tracing::trace!("Linked {}", link_path.display());
                Ok::<_, std::io::Error>(())
            })
            .await?;
            Ok(())
        })
        .await
}

/// Installs bin shims for every linked dependency that exposes one. Jobs
/// are keyed by shim path, so when conflicts are tolerated the surviving
/// entry is deterministic.
pub(crate) async fn link_bins(
    jobs: BTreeMap<PathBuf, PathBuf>,
    concurrency: usize,
) -> Result<(), InstallerError> {
    futures::stream::iter(jobs)
        .map(Ok)
        .try_for_each_concurrent(concurrency, |(shim, executable)| async move {
            async_std::task::spawn_blocking(move || {
                // A declared bin whose file never materialized is skipped.
                if !executable.is_file() {
                    return Ok(());
                }
                std::fs::create_dir_all(
                    shim.parent().expect(".bin entries always have a parent"),
                )?;
                trellis_shim_bin::shim_bin(&executable, &shim)?;
                tracing::trace!("Installed bin shim {}", shim.display());
                Ok::<_, std::io::Error>(())
            })
            .await?;
            Ok(())
        })
        .await
}
