use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::Error;
use crate::types::Result;

/// Outcome of one request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Payload received on the accepted topic
    Accepted(Bytes),
    /// Payload received on the rejected topic
    Rejected(Bytes),
}

/// A pending exchange waiting for its response
struct PendingExchange {
    accepted: String,
    rejected: String,
    sender: oneshot::Sender<Delivery>,
}

/// Hands inbound publishes to the exchange waiting for them.
///
/// The transport's delivery task calls [`ExchangeRouter::deliver`]; the
/// sequencer registers with [`ExchangeRouter::expect`] before publishing a
/// request and then awaits the returned [`PendingResponse`].
#[derive(Default)]
pub struct ExchangeRouter {
    pending: Mutex<Vec<PendingExchange>>,
}

impl ExchangeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exchange answered on either `accepted` or `rejected`
    pub fn expect(&self, accepted: &str, rejected: &str) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.lock();

        // A newer request on the same topics supersedes the old one
        pending.retain(|exchange| exchange.accepted != accepted);
        pending.push(PendingExchange {
            accepted: accepted.to_string(),
            rejected: rejected.to_string(),
            sender,
        });

        PendingResponse {
            accepted: accepted.to_string(),
            receiver,
        }
    }

    /// Route an inbound publish. Returns false when nothing was waiting for it.
    pub fn deliver(&self, topic: &str, payload: Bytes) -> bool {
        let exchange = {
            let mut pending = self.lock();
            let position = pending
                .iter()
                .position(|exchange| exchange.accepted == topic || exchange.rejected == topic);
            match position {
                Some(index) => pending.swap_remove(index),
                None => {
                    warn!("Dropping message on {} ({} bytes): no pending exchange", topic, payload.len());
                    return false;
                }
            }
        };

        let delivery = if exchange.accepted == topic {
            Delivery::Accepted(payload)
        } else {
            Delivery::Rejected(payload)
        };

        debug!("Routing message on {} to pending exchange", topic);
        if exchange.sender.send(delivery).is_err() {
            warn!("Exchange for {} was abandoned before its response arrived", topic);
            return false;
        }
        true
    }

    /// Forget an exchange whose waiter gave up
    pub fn cancel(&self, accepted: &str) {
        self.lock().retain(|exchange| exchange.accepted != accepted);
    }

    /// Number of exchanges still waiting
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingExchange>> {
        // The guarded Vec stays consistent even if a holder panicked
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving half of a registered exchange
pub struct PendingResponse {
    accepted: String,
    receiver: oneshot::Receiver<Delivery>,
}

impl PendingResponse {
    /// Wait for the response, giving up after `timeout`
    pub async fn wait(self, router: &ExchangeRouter, timeout: Duration) -> Result<Delivery> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(delivery)) => Ok(delivery),
            Ok(Err(_)) => Err(Error::Internal(format!(
                "exchange on {} was superseded before a response arrived",
                self.accepted
            ))),
            Err(_) => {
                router.cancel(&self.accepted);
                Err(Error::Timeout {
                    topic: self.accepted,
                    waited: timeout,
                })
            }
        }
    }
}
