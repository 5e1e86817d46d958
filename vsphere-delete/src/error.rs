//! Error types for vsphere-delete.

use thiserror::Error;
use vsphere_api::LocalizedMethodFault;

/// Main error type for vsphere-delete.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// vSphere API error (transport, server faults, collector version)
    #[error("vSphere API error: {0}")]
    Api(#[from] vsphere_api::Error),

    /// Task reached the error state with a fault attached
    #[error("Task {task} failed: {fault}")]
    RemoteFault {
        task: String,
        fault: LocalizedMethodFault,
    },

    /// Name matches more than one entity
    #[error("Name [ {name} ] matches {} entities: {}", .matches.len(), .matches.join(", "))]
    AmbiguousName { name: String, matches: Vec<String> },

    /// Task was reported finished but its outcome could not be read
    #[error("Task error: {0}")]
    Task(String),
}

impl Error {
    /// Create a new task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Error::Task(msg.into())
    }
}

/// Result type alias for vsphere-delete.
pub type Result<T, E = Error> = std::result::Result<T, E>;
