use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::saml::SignatureAlgorithm;

/// Process-wide service provider settings shared by every tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceProviderConfig {
    /// URL scheme used when deriving the ACS URL from a tenant's host name.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Path of the assertion consumer service.
    #[serde(default = "default_acs_path")]
    pub acs_path: String,

    /// Signature algorithm used unless a tenant overrides it.
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,

    /// Sign AuthnRequests unless a tenant overrides it.
    #[serde(default = "default_true")]
    pub sign_requests: bool,

    /// NameID formats advertised in SP metadata.
    #[serde(default = "default_name_id_formats")]
    pub name_id_formats: Vec<String>,

    /// How long parsed IdP metadata and loaded signing credentials are reused.
    /// Values too large to represent as an instant never expire.
    #[serde(default = "default_metadata_cache_ttl_secs")]
    pub metadata_cache_ttl_secs: u64,
}

impl Default for ServiceProviderConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            acs_path: default_acs_path(),
            signature_algorithm: SignatureAlgorithm::default(),
            sign_requests: true,
            name_id_formats: default_name_id_formats(),
            metadata_cache_ttl_secs: default_metadata_cache_ttl_secs(),
        }
    }
}

impl ServiceProviderConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.scheme != "https" && self.scheme != "http" {
            return Err(ConfigError::Validation(format!(
                "service_provider.scheme must be 'http' or 'https', got '{}'",
                self.scheme
            )));
        }
        if !self.acs_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "service_provider.acs_path must start with '/', got '{}'",
                self.acs_path
            )));
        }
        Ok(())
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_acs_path() -> String {
    "/saml/acs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_name_id_formats() -> Vec<String> {
    vec![
        "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string(),
        "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent".to_string(),
    ]
}

fn default_metadata_cache_ttl_secs() -> u64 {
    3600
}
