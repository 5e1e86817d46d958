use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error within reqwest library
    #[error("vSphere API request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// Error returned by server without a decodable fault
    #[error("HTTP error from API: {0}")]
    HttpError(StatusCode),

    /// Base URL could not be used to build API paths
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Login was accepted but no session id came back
    #[error("Login did not return a session id")]
    MissingSession,

    /// The property collector rejected the update version we sent
    #[error("Invalid property collector version: {0}")]
    InvalidCollectorVersion(String),

    /// The watched object left the property filter, e.g. it was deleted
    #[error("Object {0} is no longer visible to the property filter")]
    ObjectRemoved(String),

    /// Timeout waiting for condition
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Fault raised by the server for a method call
    #[error("{kind}: {message}")]
    Fault { kind: String, message: String },
}

impl Error {
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Error::UnexpectedResponse(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
