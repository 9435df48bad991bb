pub mod mqtt;
pub mod mock;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::types::Result;

pub use mqtt::MqttTransport;
pub use mock::MockTransport;

/// Credentials used to open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Mutual TLS with a client certificate
    X509 {
        root_ca: PathBuf,
        certificate: PathBuf,
        private_key: PathBuf,
    },
    /// TLS websocket, server authentication only
    Websocket { root_ca: PathBuf },
}

impl Credentials {
    pub fn root_ca(&self) -> &PathBuf {
        match self {
            Credentials::X509 { root_ca, .. } => root_ca,
            Credentials::Websocket { root_ca } => root_ca,
        }
    }
}

/// MQTT operations the provisioning flow needs.
///
/// Messages arriving on subscribed topics are handed to the
/// [`ExchangeRouter`](crate::provisioning::ExchangeRouter) the transport was
/// built with.
#[async_trait]
pub trait Transport: Send {
    /// Open a session with the given credentials
    async fn connect(&mut self, credentials: &Credentials) -> Result<()>;

    /// Subscribe to a topic at QoS 1
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Publish a payload at QoS 1
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Close the session
    async fn disconnect(&mut self) -> Result<()>;
}
