//! The provisioning flow: topics, payloads, response routing, the
//! sequencer that drives the exchanges, and storage of issued credentials.

pub mod topics;
pub mod types;
pub mod router;
pub mod storage;
pub mod sequencer;

pub use router::{Delivery, ExchangeRouter};
pub use sequencer::{ProvisioningSequencer, SequencerSettings};
pub use storage::IssuedCredentials;
pub use types::{
    CertificateResponse, FailureResponse, ProvisioningRequest, RegistrationResponse,
    TemplateParameters,
};
