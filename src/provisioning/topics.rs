//! Fleet provisioning topic names.

/// CreateCertificateFromCsr request topic
pub const CREATE_FROM_CSR_REQUEST: &str = "$aws/certificates/create-from-csr/json";
/// CreateCertificateFromCsr accepted topic
pub const CREATE_FROM_CSR_ACCEPTED: &str = "$aws/certificates/create-from-csr/json/accepted";
/// CreateCertificateFromCsr rejected topic
pub const CREATE_FROM_CSR_REJECTED: &str = "$aws/certificates/create-from-csr/json/rejected";

/// RegisterThing request topic for a template
pub fn register_thing_request(template_name: &str) -> String {
    format!("$aws/provisioning-templates/{}/provision/json", template_name)
}

/// RegisterThing accepted topic for a template
pub fn register_thing_accepted(template_name: &str) -> String {
    format!("{}/accepted", register_thing_request(template_name))
}

/// RegisterThing rejected topic for a template
pub fn register_thing_rejected(template_name: &str) -> String {
    format!("{}/rejected", register_thing_request(template_name))
}

/// The request, accepted and rejected topics of one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeTopics {
    pub request: String,
    pub accepted: String,
    pub rejected: String,
}

impl ExchangeTopics {
    pub fn create_from_csr() -> Self {
        Self {
            request: CREATE_FROM_CSR_REQUEST.to_string(),
            accepted: CREATE_FROM_CSR_ACCEPTED.to_string(),
            rejected: CREATE_FROM_CSR_REJECTED.to_string(),
        }
    }

    pub fn register_thing(template_name: &str) -> Self {
        Self {
            request: register_thing_request(template_name),
            accepted: register_thing_accepted(template_name),
            rejected: register_thing_rejected(template_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_thing_topics_embed_template() {
        let topics = ExchangeTopics::register_thing("FactoryTemplate");

        assert_eq!(topics.request, "$aws/provisioning-templates/FactoryTemplate/provision/json");
        assert_eq!(topics.accepted, "$aws/provisioning-templates/FactoryTemplate/provision/json/accepted");
        assert_eq!(topics.rejected, "$aws/provisioning-templates/FactoryTemplate/provision/json/rejected");
    }

    #[test]
    fn test_create_from_csr_topics() {
        let topics = ExchangeTopics::create_from_csr();
        assert!(topics.accepted.starts_with(&topics.request));
        assert!(topics.rejected.ends_with("/rejected"));
    }
}
