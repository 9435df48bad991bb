use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::provisioning::router::{Delivery, ExchangeRouter};
use crate::provisioning::storage::{self, IssuedCredentials};
use crate::provisioning::topics::ExchangeTopics;
use crate::provisioning::types::{
    CertificateResponse, CreateCertificateFromCsrRequest, FailureResponse, ProvisioningRequest,
    RegisterThingRequest, RegistrationResponse,
};
use crate::transport::{Credentials, Transport};
use crate::types::Result;

/// Tunables of the provisioning flow
#[derive(Debug, Clone)]
pub struct SequencerSettings {
    /// How long each exchange waits for its accepted/rejected response
    pub response_timeout: Duration,
    /// Where the issued key and certificate are written
    pub output_dir: PathBuf,
    /// Topic of the message published after reconnecting
    pub test_topic: String,
    /// Payload of that message
    pub test_message: String,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(10),
            output_dir: PathBuf::from("."),
            test_topic: "topic/test".to_string(),
            test_message: "Test Message".to_string(),
        }
    }
}

/// Drives the three provisioning exchanges over a [`Transport`]:
/// create a certificate from a CSR, register the thing, then reconnect
/// with the issued certificate.
pub struct ProvisioningSequencer<T: Transport> {
    transport: T,
    router: Arc<ExchangeRouter>,
    request: ProvisioningRequest,
    settings: SequencerSettings,
    /// Key of a locally generated CSR, used when the service returns none
    local_private_key: Option<String>,
    certificate: Option<CertificateResponse>,
    registration: Option<RegistrationResponse>,
    failure: Option<FailureResponse>,
}

impl<T: Transport> ProvisioningSequencer<T> {
    /// `router` must be the one `transport` delivers inbound messages to
    pub fn new(
        transport: T,
        router: Arc<ExchangeRouter>,
        request: ProvisioningRequest,
        settings: SequencerSettings,
    ) -> Self {
        Self {
            transport,
            router,
            request,
            settings,
            local_private_key: None,
            certificate: None,
            registration: None,
            failure: None,
        }
    }

    /// Remember the private key of a CSR generated on this device
    pub fn with_local_private_key(mut self, private_key_pem: Option<String>) -> Self {
        self.local_private_key = private_key_pem;
        self
    }

    pub async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        self.transport.connect(credentials).await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await
    }

    /// Subscribe to the accepted and rejected topics of both exchanges
    pub async fn subscribe_responses(&mut self) -> Result<()> {
        let exchanges = [
            ExchangeTopics::create_from_csr(),
            ExchangeTopics::register_thing(&self.request.template_name),
        ];

        for topics in exchanges {
            for topic in [&topics.accepted, &topics.rejected] {
                info!("Subscribing to topic: {}", topic);
                self.transport.subscribe(topic).await?;
            }
        }
        Ok(())
    }

    /// Publish the CSR and wait for the signed certificate
    pub async fn create_certificate_from_csr(&mut self, csr_pem: &str) -> Result<&CertificateResponse> {
        let topics = ExchangeTopics::create_from_csr();
        let request = CreateCertificateFromCsrRequest {
            certificate_signing_request: csr_pem.to_string(),
        };

        let response: CertificateResponse = self.exchange(&topics, &request).await?;
        info!("Received certificate {}", response.certificate_id);

        Ok(&*self.certificate.insert(response))
    }

    /// Register the thing with the ownership token of the issued certificate
    pub async fn register_thing(&mut self) -> Result<&RegistrationResponse> {
        let certificate = self.certificate.as_ref().ok_or_else(|| {
            Error::Precondition("CreateCertificateFromCsr did not succeed".to_string())
        })?;

        let topics = ExchangeTopics::register_thing(&self.request.template_name);
        let request = RegisterThingRequest {
            certificate_ownership_token: certificate.certificate_ownership_token.clone(),
            parameters: self.request.template_parameters.clone(),
        };

        let response: RegistrationResponse = self.exchange(&topics, &request).await?;
        info!(
            "Registered thing {} with template {}",
            response.thing_name.as_deref().unwrap_or("<unnamed>"),
            self.request.template_name
        );

        Ok(&*self.registration.insert(response))
    }

    /// Store the issued credentials, reconnect with them and publish a test
    /// message
    pub async fn connect_with_issued_credentials(&mut self, root_ca: &Path) -> Result<IssuedCredentials> {
        let certificate = self.certificate.as_ref().ok_or_else(|| {
            Error::Precondition("CreateCertificateFromCsr did not succeed".to_string())
        })?;

        let issued = storage::store_credentials(
            &self.settings.output_dir,
            certificate,
            self.local_private_key.as_deref(),
        )
        .await?;

        info!("Connecting with new certificate {}", certificate.certificate_id);
        let credentials = Credentials::X509 {
            root_ca: root_ca.to_path_buf(),
            certificate: issued.certificate.clone(),
            private_key: issued.private_key.clone(),
        };
        self.transport.connect(&credentials).await?;

        let test_topic = self.settings.test_topic.clone();
        self.transport
            .publish(&test_topic, self.settings.test_message.clone().into_bytes())
            .await?;
        info!("Published successfully to topic {}: {}", test_topic, self.settings.test_message);

        Ok(issued)
    }

    /// True once the registration was accepted
    pub fn is_done(&self) -> bool {
        self.registration.is_some()
    }

    pub fn certificate(&self) -> Option<&CertificateResponse> {
        self.certificate.as_ref()
    }

    pub fn registration(&self) -> Option<&RegistrationResponse> {
        self.registration.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureResponse> {
        self.failure.as_ref()
    }

    /// One request/response round trip.
    ///
    /// The exchange is registered with the router before publishing, so an
    /// immediate answer is not lost. A rejected answer fills the failure
    /// slot and is returned as [`Error::Rejected`].
    async fn exchange<Req, Resp>(&mut self, topics: &ExchangeTopics, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;
        let pending = self.router.expect(&topics.accepted, &topics.rejected);

        if let Err(e) = self.transport.publish(&topics.request, payload).await {
            self.router.cancel(&topics.accepted);
            return Err(e);
        }
        info!("Published to topic {}", topics.request);
        debug!("Waiting up to {:?} for a response on {}", self.settings.response_timeout, topics.accepted);

        match pending.wait(&self.router, self.settings.response_timeout).await? {
            Delivery::Accepted(payload) => Ok(serde_json::from_slice(&payload)?),
            Delivery::Rejected(payload) => {
                let failure = FailureResponse::from_payload(&payload);
                error!("Received error from topic {}: {}", topics.rejected, failure);
                self.failure = Some(failure.clone());
                Err(Error::Rejected {
                    topic: topics.rejected.clone(),
                    failure,
                })
            }
        }
    }
}
