use std::fmt;
use std::time::Duration;

use tablestorm_engine::EngineError;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the workload harness
///
/// `Config` fails fast before any worker starts; `Engine` and `IdleCycle`
/// are the two fatal-abort paths a running workload can take. External
/// cancellation is not an error and never surfaces here.
#[derive(Debug)]
pub enum Error {
    /// I/O errors (report output, run directory)
    Io(std::io::Error),

    /// A storage-engine call failed; first one aborts the run
    Engine(EngineError),

    /// Malformed or contradictory run options
    Config(String),

    /// Idle-handle sweep exceeded the configured bound in fatal mode
    IdleCycle { observed: Duration, threshold: Duration },

    /// Latency accounting errors
    Stats(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Engine(e) => write!(f, "storage engine error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::IdleCycle { observed, threshold } => write!(
                f,
                "idle table handle cycle took {observed:?}, exceeding the configured bound {threshold:?}"
            ),
            Error::Stats(msg) => write!(f, "statistics error: {msg}"),
            Error::Other(msg) => write!(f, "error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Config(err.to_string())
    }
}
