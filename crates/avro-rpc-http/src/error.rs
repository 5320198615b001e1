use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid settings or route registration.
    #[error("{0}")]
    Config(String),

    /// A configured file does not exist.
    #[error("No such file or directory: {}", .0.display())]
    MissingFile(PathBuf),

    /// The schema file could not be read.
    #[error("Failed to read schema file {}: {source}", path.display())]
    ReadSchema {
        /// Schema file.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The schema file did not yield a valid route.
    #[error("Failed to register route {service}: {source}")]
    Route {
        /// Service name.
        service: String,
        /// Underlying error.
        source: avro_rpc::Error,
    },

    /// A message was registered for a service without a route.
    #[error("Service '{0}' has no route defined.")]
    NoRoute(String),

    /// A handler could not be bound to its message.
    #[error("Failed to register message '{message}' for service '{service}': {source}")]
    Bind {
        /// Service name.
        service: String,
        /// Message name.
        message: String,
        /// Underlying error.
        source: avro_rpc::Error,
    },

    /// The protocol compiler could not be started.
    #[error("Failed to run protocol compiler: {0}")]
    CompilerSpawn(#[source] io::Error),

    /// The protocol compiler exited unsuccessfully.
    #[error("Protocol compiler failed for {}: {status}", protocol.display())]
    CompilerFailed {
        /// Protocol being compiled.
        protocol: PathBuf,
        /// Exit status.
        status: ExitStatus,
    },
}

impl Error {
    pub(crate) fn config(text: impl Into<String>) -> Self {
        Self::Config(text.into())
    }
}
