use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
    TlsConfiguration, Transport as MqttWire,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{ConnectionSettings, MqttConfig};
use crate::error::Error;
use crate::provisioning::ExchangeRouter;
use crate::transport::{Credentials, Transport};
use crate::types::Result;

/// ALPN protocol that lets X.509 MQTT share port 443 with HTTPS
const ALPN_MQTT_CA: &[u8] = b"x-amzn-mqtt-ca";

/// Acknowledgements forwarded from the event loop task
#[derive(Debug)]
enum Ack {
    Connected,
    Subscribed { granted: bool },
    Published,
    Failed(String),
}

/// A live connection: client handle plus the task polling its event loop
struct Session {
    client: AsyncClient,
    acks: mpsc::UnboundedReceiver<Ack>,
    task: JoinHandle<()>,
}

/// [`Transport`] backed by `rumqttc`
pub struct MqttTransport {
    settings: ConnectionSettings,
    mqtt: MqttConfig,
    router: Arc<ExchangeRouter>,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(settings: ConnectionSettings, mqtt: MqttConfig, router: Arc<ExchangeRouter>) -> Self {
        Self {
            settings,
            mqtt,
            router,
            session: None,
        }
    }

    /// Build client options for the given credentials
    async fn build_options(&self, credentials: &Credentials) -> Result<MqttOptions> {
        let ca = tokio::fs::read(credentials.root_ca()).await?;

        let mut options = match credentials {
            Credentials::X509 { certificate, private_key, .. } => {
                let cert = tokio::fs::read(certificate).await?;
                let key = tokio::fs::read(private_key).await?;
                let mut options = MqttOptions::new(
                    self.settings.client_id.clone(),
                    self.settings.host.clone(),
                    self.settings.port,
                );
                options.set_transport(MqttWire::tls_with_config(tls_configuration(
                    ca,
                    Some((cert, key)),
                    self.settings.port,
                )));
                options
            }
            Credentials::Websocket { .. } => {
                let url = websocket_url(&self.settings.host, self.settings.port)?;
                let mut options = MqttOptions::new(
                    self.settings.client_id.clone(),
                    url.to_string(),
                    self.settings.port,
                );
                options.set_transport(MqttWire::wss_with_config(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                }));
                options
            }
        };

        options
            .set_keep_alive(Duration::from_secs(self.mqtt.keep_alive_secs))
            .set_clean_session(true)
            .set_max_packet_size(self.mqtt.max_packet_size, self.mqtt.max_packet_size);

        Ok(options)
    }

    /// Wait for an acknowledgement accepted by `matches`, skipping others
    async fn wait_for_ack<F>(&mut self, what: &str, timeout: Duration, mut matches: F) -> Result<Ack>
    where
        F: FnMut(&Ack) -> bool,
    {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("cannot {}: not connected", what)))?;

        let wait = async {
            loop {
                match session.acks.recv().await {
                    Some(Ack::Failed(reason)) => return Err(Error::Transport(reason)),
                    Some(ack) if matches(&ack) => return Ok(ack),
                    Some(other) => debug!("Ignoring {:?} while waiting to {}", other, what),
                    None => {
                        return Err(Error::Transport(format!(
                            "connection closed while waiting to {}",
                            what
                        )))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Transport(format!("timed out after {:?} waiting to {}", timeout, what)))?
    }

    fn client(&self) -> Result<&AsyncClient> {
        self.session
            .as_ref()
            .map(|session| &session.client)
            .ok_or_else(|| Error::Transport("not connected".to_string()))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        if self.session.is_some() {
            self.disconnect().await?;
        }

        info!(
            "Connecting to {}:{} as {} ({})",
            self.settings.host,
            self.settings.port,
            self.settings.client_id,
            match credentials {
                Credentials::X509 { .. } => "x509",
                Credentials::Websocket { .. } => "websocket",
            }
        );

        let options = self.build_options(credentials).await?;
        let (client, eventloop) = AsyncClient::new(options, self.mqtt.request_channel_capacity);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive_event_loop(
            eventloop,
            self.router.clone(),
            ack_tx,
            Duration::from_secs(self.mqtt.reconnect_delay_secs),
        ));

        self.session = Some(Session {
            client,
            acks: ack_rx,
            task,
        });

        let timeout = Duration::from_secs(self.mqtt.connect_timeout_secs);
        if let Err(e) = self
            .wait_for_ack("connect", timeout, |ack| matches!(ack, Ack::Connected))
            .await
        {
            if let Some(session) = self.session.take() {
                session.task.abort();
            }
            return Err(e);
        }

        info!("Connected to {}", self.settings.host);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.client()?.subscribe(topic, QoS::AtLeastOnce).await?;

        let timeout = Duration::from_secs(self.mqtt.operation_timeout_secs);
        let what = format!("subscribe to {}", topic);
        match self
            .wait_for_ack(&what, timeout, |ack| matches!(ack, Ack::Subscribed { .. }))
            .await?
        {
            Ack::Subscribed { granted: true } => Ok(()),
            _ => Err(Error::Transport(format!("subscription to {} was refused", topic))),
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;

        let timeout = Duration::from_secs(self.mqtt.operation_timeout_secs);
        let what = format!("publish to {}", topic);
        self.wait_for_ack(&what, timeout, |ack| matches!(ack, Ack::Published))
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let session = match self.session.take() {
            Some(session) => session,
            None => return Ok(()),
        };

        debug!("Disconnecting from {}", self.settings.host);
        if let Err(e) = session.client.disconnect().await {
            warn!("Disconnect request failed: {}", e);
        }

        let mut task = session.task;
        let timeout = Duration::from_secs(self.mqtt.operation_timeout_secs);
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            warn!("Event loop did not stop within {:?}, aborting it", timeout);
            task.abort();
        }

        info!("Disconnected from {}", self.settings.host);
        Ok(())
    }
}

/// Poll the event loop until the session is closed.
///
/// Inbound publishes go to the router; acknowledgements go to the waiting
/// operation. Errors before the first CONNACK end the task, later errors
/// are retried by polling again after `reconnect_delay`.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    router: Arc<ExchangeRouter>,
    acks: mpsc::UnboundedSender<Ack>,
    reconnect_delay: Duration,
) {
    let mut connected = false;

    loop {
        let ack = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;
                Some(Ack::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                info!("Received {} bytes on {}", publish.payload.len(), publish.topic);
                router.deliver(&publish.topic, publish.payload);
                None
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let granted = suback
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                Some(Ack::Subscribed { granted })
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => Some(Ack::Published),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => None,
            Err(e) if !connected => {
                error!("Connection failed: {}", e);
                let _ = acks.send(Ack::Failed(format!("connection failed: {}", e)));
                break;
            }
            Err(e) => {
                warn!("Connection error: {}, polling again in {:?}", e, reconnect_delay);
                tokio::time::sleep(reconnect_delay).await;
                None
            }
        };

        if let Some(ack) = ack {
            // Nobody listening means the transport was dropped
            if acks.send(ack).is_err() {
                break;
            }
        }
    }
}

/// TLS settings for an X.509 connection
fn tls_configuration(ca: Vec<u8>, client_auth: Option<(Vec<u8>, Vec<u8>)>, port: u16) -> TlsConfiguration {
    let alpn = if port == 443 {
        Some(vec![ALPN_MQTT_CA.to_vec()])
    } else {
        None
    };

    TlsConfiguration::Simple {
        ca,
        alpn,
        client_auth,
    }
}

/// Websocket endpoint URL for a broker host
fn websocket_url(host: &str, port: u16) -> Result<Url> {
    let url = Url::parse(&format!("wss://{}:{}/mqtt", host, port))?;
    if url.host_str().is_none() {
        return Err(Error::Config(format!("invalid broker host: {}", host)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(port: u16) -> ConnectionSettings {
        ConnectionSettings {
            host: "example-ats.iot.us-east-1.amazonaws.com".to_string(),
            port,
            client_id: "test-client".to_string(),
        }
    }

    #[test]
    fn test_alpn_only_on_port_443() {
        match tls_configuration(vec![1], None, 443) {
            TlsConfiguration::Simple { alpn, .. } => {
                assert_eq!(alpn, Some(vec![b"x-amzn-mqtt-ca".to_vec()]))
            }
            _ => panic!("expected simple TLS configuration"),
        }

        match tls_configuration(vec![1], None, 8883) {
            TlsConfiguration::Simple { alpn, .. } => assert!(alpn.is_none()),
            _ => panic!("expected simple TLS configuration"),
        }
    }

    #[test]
    fn test_websocket_url() {
        let url = websocket_url("broker.example.com", 443).unwrap();
        assert_eq!(url.as_str(), "wss://broker.example.com/mqtt");

        let url = websocket_url("broker.example.com", 8443).unwrap();
        assert_eq!(url.as_str(), "wss://broker.example.com:8443/mqtt");

        assert!(websocket_url("bad host", 443).is_err());
    }

    #[tokio::test]
    async fn test_operations_fail_when_not_connected() {
        let mut transport = MqttTransport::new(settings(8883), MqttConfig::default(), Arc::new(ExchangeRouter::new()));

        assert!(matches!(transport.subscribe("a/b").await, Err(Error::Transport(_))));
        assert!(matches!(transport.publish("a/b", vec![]).await, Err(Error::Transport(_))));
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_fails_on_missing_root_ca() {
        let mut transport = MqttTransport::new(settings(8883), MqttConfig::default(), Arc::new(ExchangeRouter::new()));
        let credentials = Credentials::Websocket {
            root_ca: "/nonexistent/AmazonRootCA1.pem".into(),
        };

        assert!(matches!(transport.connect(&credentials).await, Err(Error::Io(_))));
    }
}
