use std::fmt;
use serde::{Serialize, Deserialize};

/// Project-wide Result type
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// How the client reaches the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// MQTT over TLS with an X.509 client certificate
    X509,
    /// MQTT over a TLS websocket
    Websocket,
}

impl ConnectionMode {
    /// Port used when no override is given
    pub fn default_port(&self) -> u16 {
        match self {
            ConnectionMode::X509 => 8883,
            ConnectionMode::Websocket => 443,
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::X509 => write!(f, "x509"),
            ConnectionMode::Websocket => write!(f, "websocket"),
        }
    }
}

impl Default for ConnectionMode {
    fn default() -> Self {
        ConnectionMode::X509
    }
}
