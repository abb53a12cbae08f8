use thiserror::Error;

/// Errors raised while listing installed packages
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("package source error: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
