use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::provisioning::types::FailureResponse;

/// Generic error type
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// MQTT transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived on either response topic in time
    #[error("Timed out after {waited:?} waiting for a response on {topic}")]
    Timeout {
        /// Accepted topic of the exchange
        topic: String,
        /// How long we waited
        waited: Duration,
    },

    /// The broker answered on a rejected topic
    #[error("Request rejected on {topic}: {failure}")]
    Rejected {
        /// Rejected topic the failure arrived on
        topic: String,
        /// Decoded failure payload
        failure: FailureResponse,
    },

    /// An operation was called before the step it depends on succeeded
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// CSR error
    #[error("CSR error: {0}")]
    Csr(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<rcgen::RcgenError> for Error {
    fn from(err: rcgen::RcgenError) -> Self {
        Error::Csr(err.to_string())
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Internal(err)
    }
}
