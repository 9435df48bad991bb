use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::Error;
use crate::provisioning::ExchangeRouter;
use crate::transport::{Credentials, Transport};
use crate::types::Result;

/// A message published through the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Payload decoded as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    connects: Vec<Credentials>,
    disconnects: usize,
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    /// request topic -> (response topic, payload)
    replies: HashMap<String, (String, Bytes)>,
}

/// In-memory transport for tests.
///
/// Clones share state, so a test can keep a handle while the sequencer owns
/// the transport. A publish on a scripted request topic is answered at once
/// by delivering the scripted payload to the router.
#[derive(Clone)]
pub struct MockTransport {
    router: Arc<ExchangeRouter>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(router: Arc<ExchangeRouter>) -> Self {
        Self {
            router,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Answer publishes on `request_topic` with `payload` on `response_topic`
    pub fn reply_to(&self, request_topic: &str, response_topic: &str, payload: impl Into<Bytes>) {
        self.lock().replies.insert(
            request_topic.to_string(),
            (response_topic.to_string(), payload.into()),
        );
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connects(&self) -> Vec<Credentials> {
        self.lock().connects.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        debug!("Mock transport: connecting with {:?}", credentials);
        let mut state = self.lock();
        state.connected = true;
        state.connects.push(credentials.clone());
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::Transport(format!("cannot subscribe to {}: not connected", topic)));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let reply = {
            let mut state = self.lock();
            if !state.connected {
                return Err(Error::Transport(format!("cannot publish to {}: not connected", topic)));
            }
            state.published.push(PublishedMessage {
                topic: topic.to_string(),
                payload,
            });
            state.replies.get(topic).cloned()
        };

        // Deliver outside the lock, the router may be observed by the test
        if let Some((response_topic, payload)) = reply {
            debug!("Mock transport: replying on {}", response_topic);
            self.router.deliver(&response_topic, payload);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }
}
