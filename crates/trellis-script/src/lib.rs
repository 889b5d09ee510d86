//! Runs named package.json scripts in a package directory, through the
//! platform shell, with the package's `node_modules/.bin` chain on `PATH`.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Output, Stdio};

pub use error::ScriptError;
use error::Result;
use trellis_common::BuildManifest;

mod error;

/// Builder for one script invocation.
///
/// The script string comes from the `scripts` object of the package.json
/// found in `package_dir`, and runs with that directory as its working
/// directory. Every ancestor `node_modules/.bin` directory is prepended
/// to `PATH` so the package sees the bins its dependencies installed.
#[derive(Debug)]
pub struct Script {
    event: String,
    package_dir: PathBuf,
    bin_paths: Vec<PathBuf>,
    workspace_root: Option<PathBuf>,
    cmd: Command,
}

impl Script {
    pub fn new(package_dir: impl AsRef<Path>, event: impl AsRef<str>) -> Result<Self> {
        let package_dir = dunce::canonicalize(package_dir.as_ref())?;
        let shell = if cfg!(windows) {
            std::env::var_os("ComSpec").unwrap_or_else(|| OsString::from("cmd"))
        } else {
            OsString::from("sh")
        };
        let mut cmd = Command::new(shell);
        if cfg!(windows) {
            cmd.arg("/d");
            cmd.arg("/s");
            cmd.arg("/c");
        } else {
            cmd.arg("-c");
        }
        cmd.current_dir(&package_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        Ok(Self {
            event: event.as_ref().into(),
            package_dir,
            bin_paths: Vec::new(),
            workspace_root: None,
            cmd,
        })
    }

    /// `node_modules/.bin` directories above this path are not added to
    /// `PATH` when the script runs.
    pub fn workspace_root(mut self, path: impl AsRef<Path>) -> Self {
        self.workspace_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets an environment variable for the script process.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.cmd.env(key.as_ref(), value.as_ref());
        self
    }

    /// Runs the script to completion, collecting its output. A non-zero
    /// exit is an error carrying the captured stdout and stderr.
    pub fn output(self) -> Result<Output> {
        self.set_paths()?
            .set_script()?
            .cmd
            .output()
            .map_err(ScriptError::ScriptProcessError)
            .and_then(|out| {
                if out.status.success() {
                    Ok(out)
                } else {
                    Err(ScriptError::ScriptFailed(
                        out.status,
                        Some(out.stdout),
                        Some(out.stderr),
                    ))
                }
            })
    }

    /// Spawns the script as a child process.
    pub fn spawn(self) -> Result<ScriptChild> {
        self.set_paths()?
            .set_script()?
            .cmd
            .spawn()
            .map(ScriptChild::new)
            .map_err(ScriptError::SpawnError)
    }

    fn set_script(mut self) -> Result<Self> {
        let manifest = BuildManifest::from_path(self.package_dir.join("package.json"))?;
        let script = manifest
            .scripts
            .get(&self.event)
            .ok_or_else(|| ScriptError::MissingEvent(self.event.clone()))?;
        tracing::trace!(
            "Running `{}` script for package at {}: {script}",
            self.event,
            self.package_dir.display()
        );
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.cmd.raw_arg(script);
        }
        #[cfg(not(windows))]
        self.cmd.arg(script);
        Ok(self)
    }

    /// Local bins shadow anything already on `PATH`.
    fn set_paths(mut self) -> Result<Self> {
        for dir in self.package_dir.ancestors() {
            self.bin_paths.push(dir.join("node_modules").join(".bin"));
            if Some(dir) == self.workspace_root.as_deref() {
                break;
            }
        }
        let mut paths = std::mem::take(&mut self.bin_paths);
        paths.extend(existing_paths());
        let joined = std::env::join_paths(&paths)?;
        for (var, _) in path_vars() {
            self.cmd.env(var, &joined);
        }
        Ok(self)
    }
}

/// Every environment variable spelled `PATH`, in any casing. Windows
/// sometimes carries more than one.
fn path_vars() -> impl Iterator<Item = (OsString, OsString)> {
    std::env::vars_os().filter(|(var, _)| var.to_string_lossy().eq_ignore_ascii_case("path"))
}

fn existing_paths() -> Vec<PathBuf> {
    path_vars()
        .flat_map(|(_, val)| std::env::split_paths(&val).collect::<Vec<_>>())
        .collect()
}

/// Child process executing a script.
pub struct ScriptChild {
    child: Child,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl ScriptChild {
    fn new(mut child: Child) -> Self {
        Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
        }
    }

    /// The OS-assigned process id of the script.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Forces the script process to exit.
    pub fn kill(mut self) -> Result<()> {
        self.child.kill().map_err(ScriptError::ScriptProcessError)
    }

    /// Waits for the script to finish. A non-zero exit status becomes
    /// [`ScriptError::ScriptFailed`].
    pub fn wait(mut self) -> Result<()> {
        self.child
            .wait()
            .map_err(ScriptError::ScriptProcessError)
            .and_then(|status| {
                if status.success() {
                    Ok(())
                } else {
                    Err(ScriptError::ScriptFailed(status, None, None))
                }
            })
    }
}
