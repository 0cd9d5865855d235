//! Error types for the tilt-mcp-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for tilt bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging to a Tilt instance.
#[derive(Error, Debug)]
pub enum Error {
    /// Tilt config file could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A socat relay failed to come up.
    #[error("port forward for port {port} failed to start: {detail}")]
    ForwardStartFailed { port: u16, detail: String },

    /// socat binary is required for forwarding but was not found.
    #[error("socat not found; install socat to enable port forwarding")]
    SocatNotFound,

    /// The named resource does not exist in the running Tilt instance.
    #[error("resource {0:?} not found in Tilt")]
    ResourceNotFound(String),

    /// Caller-supplied log filter is not a valid regular expression.
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    /// Caller-supplied arguments failed validation before any tilt call.
    #[error("{0}")]
    InvalidArgument(String),

    /// The tilt CLI exited non-zero for a reason we do not classify.
    #[error("tilt command failed: {0}")]
    CommandFailed(String),

    /// The tilt CLI did not respond within the execution deadline.
    #[error("tilt command timed out")]
    Timeout,

    /// Failed to parse tilt output.
    #[error("failed to parse tilt output: {0}")]
    ParseFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while resolving the Tilt config file to an API port.
///
/// Every variant is terminal for the calling operation; retrying ("tilt is
/// not up yet") is a caller concern.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file is absent, typically because tilt is not running.
    #[error("tilt config not found at {}; is `tilt up` running?", path.display())]
    NotFound { path: PathBuf },

    /// Config file exists but is not structurally valid.
    #[error("failed to parse tilt config: {0}")]
    Parse(String),

    /// No context with the expected name for the requested port.
    #[error("context {name:?} not found in tilt config (available: {available:?})")]
    ContextNotFound {
        name: String,
        available: Vec<String>,
    },

    /// Context references a cluster that is not defined.
    #[error("cluster {0:?} referenced by context but not defined in tilt config")]
    ClusterNotFound(String),

    /// Cluster server URL carries no parseable port.
    #[error("cannot extract API port from server url {0:?}")]
    PortExtraction(String),

    /// Home directory could not be determined.
    #[error("could not find home directory")]
    NoHomeDir,
}
