use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::types::Result;

/// Template parameters sent with a registration request
pub type TemplateParameters = BTreeMap<String, String>;

/// What this device asks the provisioning service for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Client token (the MQTT client id)
    pub client_token: String,
    /// Provisioning template name
    pub template_name: String,
    /// Values for the template's parameters
    pub template_parameters: TemplateParameters,
}

impl ProvisioningRequest {
    pub fn new(
        client_token: impl Into<String>,
        template_name: impl Into<String>,
        template_parameters: TemplateParameters,
    ) -> Self {
        Self {
            client_token: client_token.into(),
            template_name: template_name.into(),
            template_parameters,
        }
    }
}

/// Parse template parameters given as a JSON object of strings
pub fn parse_template_parameters(raw: &str) -> Result<TemplateParameters> {
    let value: Value = serde_json::from_str(raw)?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(Error::Config(format!(
                "template parameters must be a JSON object, got {}",
                other
            )))
        }
    };

    object
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            other => Err(Error::Config(format!(
                "template parameter {} must be a string, got {}",
                key, other
            ))),
        })
        .collect()
}

/// CreateCertificateFromCsr request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateFromCsrRequest {
    pub certificate_signing_request: String,
}

/// CreateCertificateFromCsr accepted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    /// Certificate ID
    pub certificate_id: String,
    /// Ownership token for the registration step
    pub certificate_ownership_token: String,
    /// Signed certificate PEM
    pub certificate_pem: String,
    /// Private key PEM, when the service returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// RegisterThing request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterThingRequest {
    pub certificate_ownership_token: String,
    pub parameters: TemplateParameters,
}

/// RegisterThing accepted payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Device configuration from the template
    #[serde(default)]
    pub device_configuration: BTreeMap<String, String>,
    /// Name of the registered thing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_name: Option<String>,
    /// Any other fields, kept as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload delivered on any rejected topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FailureResponse {
    /// Decode a rejected payload; undecodable bytes are kept as the message
    pub fn from_payload(payload: &[u8]) -> Self {
        match serde_json::from_slice(payload) {
            Ok(failure) => failure,
            Err(_) => Self {
                status_code: None,
                error_code: None,
                error_message: Some(String::from_utf8_lossy(payload).into_owned()),
                extra: Map::new(),
            },
        }
    }
}

impl fmt::Display for FailureResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[{}] ", code)?;
        }
        if let Some(error_code) = &self.error_code {
            write!(f, "{}: ", error_code)?;
        }
        write!(f, "{}", self.error_message.as_deref().unwrap_or("no error message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_parameters() {
        let params = parse_template_parameters(r#"{"SerialNumber": "1", "DeviceLocation": "Seattle"}"#).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["DeviceLocation"], "Seattle");
    }

    #[test]
    fn test_parse_template_parameters_rejects_non_objects() {
        assert!(parse_template_parameters("[1, 2]").is_err());
        assert!(parse_template_parameters(r#"{"SerialNumber": 1}"#).is_err());
        assert!(parse_template_parameters("not json").is_err());
    }

    #[test]
    fn test_certificate_response_without_private_key() {
        let json = r#"{
            "certificateId": "0123456789abcdef",
            "certificateOwnershipToken": "token",
            "certificatePem": "-----BEGIN CERTIFICATE-----"
        }"#;
        let response: CertificateResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.certificate_id, "0123456789abcdef");
        assert!(response.private_key.is_none());
    }

    #[test]
    fn test_registration_response_keeps_unknown_fields() {
        let json = r#"{"deviceConfiguration": {"Fallback": "false"}, "thingName": "thing-1", "extra": 7}"#;
        let response: RegistrationResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.thing_name.as_deref(), Some("thing-1"));
        assert_eq!(response.device_configuration["Fallback"], "false");
        assert_eq!(response.extra["extra"], 7);
    }

    #[test]
    fn test_failure_response_display() {
        let failure = FailureResponse::from_payload(
            br#"{"statusCode": 400, "errorCode": "InvalidCSR", "errorMessage": "bad csr"}"#,
        );
        assert_eq!(failure.to_string(), "[400] InvalidCSR: bad csr");

        let raw = FailureResponse::from_payload(b"plain text");
        assert_eq!(raw.error_message.as_deref(), Some("plain text"));
    }
}
