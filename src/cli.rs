//! Command line parsing and validation.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::config::ConnectionSettings;
use crate::provisioning::types::{parse_template_parameters, ProvisioningRequest, TemplateParameters};
use crate::transport::Credentials;
use crate::types::ConnectionMode;

/// Client id used when none is given
pub const DEFAULT_CLIENT_ID: &str = "FleetProvisioningRustSample";

/// Provision this device: sign a CSR, register it against a template and
/// reconnect with the issued certificate.
#[derive(Parser, Debug)]
#[command(name = "fleet-provisioning", version)]
pub struct Args {
    /// Broker endpoint host
    #[arg(short = 'e', long)]
    pub endpoint: String,

    /// Root CA file path
    #[arg(short = 'r', long, value_name = "PATH")]
    pub root_ca: PathBuf,

    /// Bootstrap certificate file path
    #[arg(short = 'c', long, value_name = "PATH", conflicts_with = "websocket")]
    pub cert: Option<PathBuf>,

    /// Bootstrap private key file path
    #[arg(short = 'k', long, value_name = "PATH", conflicts_with = "websocket")]
    pub key: Option<PathBuf>,

    /// Provisioning template name
    #[arg(short = 't', long)]
    pub template_name: String,

    /// Values for template parameters, as a JSON object of strings
    #[arg(long, value_name = "JSON", default_value = "{}", value_parser = parse_parameters)]
    pub template_parameters: TemplateParameters,

    /// Port number override
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Use MQTT over WebSocket. The server is verified against the root CA,
    /// but the client is not authenticated (no SigV4 signing), so the broker
    /// must accept unauthenticated websocket connections.
    #[arg(short = 'w', long)]
    pub websocket: bool,

    /// Targeted client id
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Certificate signing request file path
    #[arg(long, value_name = "PATH", required_unless_present = "generate_csr", conflicts_with = "generate_csr")]
    pub csr: Option<PathBuf>,

    /// Generate a key pair and CSR instead of reading one
    #[arg(long)]
    pub generate_csr: bool,

    /// Directory for the issued key and certificate
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Where the CSR comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrSource {
    File(PathBuf),
    Generate,
}

/// Arguments checked for consistency, ready to run the flow
#[derive(Debug, Clone)]
pub struct Invocation {
    pub connection: ConnectionSettings,
    pub bootstrap: Credentials,
    pub root_ca: PathBuf,
    pub request: ProvisioningRequest,
    pub csr: CsrSource,
    pub output_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

fn parse_parameters(raw: &str) -> Result<TemplateParameters, String> {
    parse_template_parameters(raw).map_err(|e| e.to_string())
}

impl Args {
    /// Check credential flags and resolve defaults.
    ///
    /// Errors are clap usage errors, which exit with status 2.
    pub fn validate(self) -> Result<Invocation, clap::Error> {
        let mode = if self.websocket {
            ConnectionMode::Websocket
        } else {
            ConnectionMode::X509
        };

        let bootstrap = match (mode, self.cert, self.key) {
            (ConnectionMode::Websocket, None, None) => Credentials::Websocket {
                root_ca: self.root_ca.clone(),
            },
            (ConnectionMode::Websocket, _, _) => {
                return Err(Args::command().error(
                    ErrorKind::ArgumentConflict,
                    "X.509 cert authentication and WebSocket are mutually exclusive. Please pick one.",
                ))
            }
            (ConnectionMode::X509, Some(certificate), Some(private_key)) => Credentials::X509 {
                root_ca: self.root_ca.clone(),
                certificate,
                private_key,
            },
            (ConnectionMode::X509, _, _) => {
                return Err(Args::command().error(
                    ErrorKind::MissingRequiredArgument,
                    "Missing credentials for authentication.",
                ))
            }
        };

        let csr = match (self.csr, self.generate_csr) {
            (Some(path), false) => CsrSource::File(path),
            (None, true) => CsrSource::Generate,
            _ => {
                return Err(Args::command().error(
                    ErrorKind::ArgumentConflict,
                    "Pass exactly one of --csr and --generate-csr.",
                ))
            }
        };

        Ok(Invocation {
            connection: ConnectionSettings {
                host: self.endpoint,
                port: self.port.unwrap_or_else(|| mode.default_port()),
                client_id: self.client_id.clone(),
            },
            bootstrap,
            root_ca: self.root_ca,
            request: ProvisioningRequest::new(self.client_id, self.template_name, self.template_parameters),
            csr,
            output_dir: self.output_dir,
            config: self.config,
        })
    }
}
