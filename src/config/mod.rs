//! Configuration for the SAML service provider.
//!
//! The service provider is configured via a TOML file, with support for
//! environment variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [service_provider]
//! scheme = "https"
//! acs_path = "/saml/acs"
//!
//! [registry]
//! default_idp = "corporate"
//!
//! [[idps]]
//! id = "corporate"
//! name = "Corporate Okta"
//! sp_issuer_url = "https://cms.example.com/saml"
//! sp_endpoint_hostname = "cms.example.com"
//! private_key = { file = "/etc/saml/sp.key" }
//! public_cert = { file = "/etc/saml/sp.crt" }
//! idp_metadata = { file = "/etc/saml/okta-metadata.xml" }
//!
//! [idps.sites]
//! "8a7d5e23" = "cms.example.com"
//! ```

mod idp;
mod observability;
mod service_provider;

use std::{collections::HashSet, path::Path};

pub use idp::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use service_provider::*;

/// Root configuration.
///
/// All sections are optional with sensible defaults. IdP records listed here
/// seed the registry at startup; later changes go through the registry's
/// administrative operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SsoConfig {
    /// Process-wide service provider settings.
    #[serde(default)]
    pub service_provider: ServiceProviderConfig,

    /// Initial registry state (default IdP, disabled sites).
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-tenant IdP configurations.
    #[serde(default)]
    pub idps: Vec<IdpConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Initial registry state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Id of the IdP configuration used when a site has no explicit mapping.
    #[serde(default)]
    pub default_idp: Option<String>,

    /// Sites for which SSO is suppressed regardless of mapping.
    #[serde(default)]
    pub disabled_sites: Vec<String>,
}

impl SsoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: SsoConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service_provider.validate()?;

        let mut ids = HashSet::new();
        let mut claimed_sites = HashSet::new();
        for idp in &self.idps {
            idp.validate()?;
            if !ids.insert(idp.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate IdP configuration id '{}'",
                    idp.id
                )));
            }
            for site in idp.sites.keys() {
                if !claimed_sites.insert(site.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "site '{}' is mapped by more than one IdP configuration",
                        site
                    )));
                }
            }
        }

        if let Some(default_idp) = &self.registry.default_idp
            && !ids.contains(default_idp.as_str())
        {
            return Err(ConfigError::Validation(format!(
                "registry.default_idp '{}' does not match any configured IdP",
                default_idp
            )));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR}` references, leaving anything after a `#` comment marker untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SsoConfig::from_str("").unwrap();
        assert_eq!(config.service_provider.scheme, "https");
        assert_eq!(config.service_provider.acs_path, "/saml/acs");
        assert!(config.idps.is_empty());
        assert!(config.registry.default_idp.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = SsoConfig::from_str(
            r#"
            [service_provider]
            scheme = "http"
            acs_path = "/dotsaml/login"
            signature_algorithm = "rsa_sha512"

            [registry]
            default_idp = "okta"
            disabled_sites = ["site-b"]

            [[idps]]
            id = "okta"
            name = "Okta"
            sp_issuer_url = "https://cms.example.com/saml"
            sp_endpoint_hostname = "cms.example.com"
            idp_metadata = { file = "/etc/saml/okta.xml" }
            signature_validation = "metadata_signing_cert"

            [idps.properties]
            "authn.force" = "true"

            [idps.sites]
            "site-a" = "cms.example.com"
        "#,
        )
        .unwrap();

        assert_eq!(config.service_provider.scheme, "http");
        assert_eq!(
            config.service_provider.signature_algorithm,
            crate::saml::SignatureAlgorithm::RsaSha512
        );
        assert_eq!(config.registry.default_idp.as_deref(), Some("okta"));
        assert_eq!(config.registry.disabled_sites, vec!["site-b".to_string()]);

        let idp = &config.idps[0];
        assert!(idp.enabled);
        assert_eq!(
            idp.signature_validation,
            SignatureValidationMode::MetadataSigningCert
        );
        assert_eq!(idp.option_bool(IdpProperty::ForceAuthn), Some(true));
        assert_eq!(idp.sites.get("site-a").unwrap(), "cms.example.com");
        assert_eq!(
            idp.idp_metadata,
            Some(MaterialSource::File("/etc/saml/okta.xml".into()))
        );
    }

    #[test]
    fn test_unknown_default_idp_rejected() {
        let err = SsoConfig::from_str(
            r#"
            [registry]
            default_idp = "missing"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_site_mapped_twice_rejected() {
        let err = SsoConfig::from_str(
            r#"
            [[idps]]
            id = "a"
            name = "A"
            sp_issuer_url = "https://a.example.com"
            sp_endpoint_hostname = "a.example.com"
            [idps.sites]
            "shared" = "shared.example.com"

            [[idps]]
            id = "b"
            name = "B"
            sp_issuer_url = "https://b.example.com"
            sp_endpoint_hostname = "b.example.com"
            [idps.sites]
            "shared" = "shared.example.com"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("shared")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SsoConfig::from_str(
            r#"
            [[idps]]
            id = "a"
            name = "A"
            sp_issuer_url = "https://a.example.com"
            sp_endpoint_hostname = "a.example.com"

            [[idps]]
            id = "a"
            name = "A again"
            sp_issuer_url = "https://a.example.com"
            sp_endpoint_hostname = "a.example.com"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SsoConfig::from_str(
            r#"
            [service_provider]
            not_a_field = true
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TENANT_SAML_TEST_HOST", Some("sso.example.org"), || {
            let config = SsoConfig::from_str(
                r#"
                [[idps]]
                id = "env"
                name = "Env"
                sp_issuer_url = "https://${TENANT_SAML_TEST_HOST}/saml"
                sp_endpoint_hostname = "${TENANT_SAML_TEST_HOST}" # ${NOT_EXPANDED}
            "#,
            )
            .unwrap();
            assert_eq!(config.idps[0].sp_issuer_url, "https://sso.example.org/saml");
            assert_eq!(config.idps[0].sp_endpoint_hostname, "sso.example.org");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("TENANT_SAML_TEST_UNSET", || {
            let err = SsoConfig::from_str(
                r#"
                [service_provider]
                scheme = "${TENANT_SAML_TEST_UNSET}"
            "#,
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "TENANT_SAML_TEST_UNSET"));
        });
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sso.toml");
        std::fs::write(&path, "[service_provider]\nacs_path = \"/sso/acs\"\n").unwrap();

        let config = SsoConfig::from_file(&path).unwrap();
        assert_eq!(config.service_provider.acs_path, "/sso/acs");

        let err = SsoConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
