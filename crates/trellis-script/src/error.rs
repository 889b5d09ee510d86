use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScriptError {
    #[error(transparent)]
    #[diagnostic(code(trellis_script::io_error))]
    IoError(#[from] std::io::Error),

    #[error("Failed to spawn script process.")]
    #[diagnostic(code(trellis_script::spawn_error))]
    SpawnError(#[source] std::io::Error),

    #[error("No script named `{0}` in package.json.")]
    #[diagnostic(code(trellis_script::missing_event))]
    MissingEvent(String),

    #[error(transparent)]
    #[diagnostic(code(trellis_script::join_path_error))]
    JoinPathError(#[from] std::env::JoinPathsError),

    #[error("Error performing process operation on script.")]
    #[diagnostic(code(trellis_script::script_process_error))]
    ScriptProcessError(#[source] std::io::Error),

    /// Carries the exit status plus captured output, when collected.
    #[error("Script exited with code {}.", .0.code().unwrap_or(-1))]
    #[diagnostic(code(trellis_script::script_failure))]
    ScriptFailed(
        std::process::ExitStatus,
        Option<Vec<u8>>,
        Option<Vec<u8>>,
    ),
}

pub(crate) type Result<T> = std::result::Result<T, ScriptError>;
