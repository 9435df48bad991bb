//! Fleet Provisioning - MQTT device provisioning client
//!
//! Signs a CSR through the provisioning service, registers the device
//! against a provisioning template and reconnects with the issued
//! certificate.

// Foundational layer
pub mod error;
pub mod types;
pub mod config;
pub mod utils;
pub mod telemetry;

// Core layer
pub mod ca;
pub mod transport;
pub mod provisioning;

// Interface layer
pub mod cli;

// Public key types
pub use crate::error::Error;
pub use crate::types::{ConnectionMode, Result};
pub use crate::provisioning::{ExchangeRouter, ProvisioningSequencer, SequencerSettings};
pub use crate::transport::{Credentials, MqttTransport, Transport};
