use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A per-tenant IdP configuration record.
///
/// Records are created and updated by the administrative subsystem and read by
/// the protocol engine. Whether a record is the default lives in registry
/// state, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdpConfig {
    /// Stable identifier.
    pub id: String,

    /// Display name of the IdP.
    pub name: String,

    /// Disabled records are never used to authenticate.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SP issuer (entity id) presented to this IdP.
    pub sp_issuer_url: String,

    /// Public host name of the SP, used to build the ACS URL.
    #[serde(default)]
    pub sp_endpoint_hostname: String,

    /// SP private key used to sign requests.
    #[serde(default)]
    pub private_key: Option<MaterialSource>,

    /// SP certificate matching `private_key`.
    #[serde(default)]
    pub public_cert: Option<MaterialSource>,

    /// IdP metadata document.
    #[serde(default)]
    pub idp_metadata: Option<MaterialSource>,

    /// How IdP signatures are validated on the response path.
    #[serde(default)]
    pub signature_validation: SignatureValidationMode,

    /// Free-form tenant options, see [`IdpProperty`].
    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Sites (site id -> site name) this configuration applies to.
    #[serde(default)]
    pub sites: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl IdpConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "IdP configuration id must not be empty".to_string(),
            ));
        }
        if self.sp_issuer_url.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "IdP configuration '{}' has no sp_issuer_url",
                self.id
            )));
        }
        Ok(())
    }

    /// Raw value of an optional property.
    pub fn option(&self, property: IdpProperty) -> Option<&str> {
        self.properties
            .get(property.key())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Boolean value of an optional property.
    ///
    /// Unparseable values are logged and treated as unset.
    pub fn option_bool(&self, property: IdpProperty) -> Option<bool> {
        let raw = self.option(property)?;
        match raw.to_ascii_lowercase().parse::<bool>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(
                    idp_id = %self.id,
                    property = property.key(),
                    value = raw,
                    "Ignoring non-boolean IdP property"
                );
                None
            }
        }
    }
}

/// Well-known keys of [`IdpConfig::properties`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpProperty {
    /// Drop any query string published on the IdP SSO endpoint before redirecting.
    ClearLocationQueryParams,
    /// `ForceAuthn` attribute of the AuthnRequest.
    ForceAuthn,
    /// `IsPassive` attribute of the AuthnRequest.
    IsPassive,
    /// Signature algorithm name overriding the SP default.
    SignatureAlgorithm,
    /// Whether requests to this IdP are signed (defaults to the SP setting).
    SignRequests,
    /// `NameIDPolicy/@Format` requested from the IdP.
    NameIdFormat,
    /// `NameIDPolicy/@AllowCreate`.
    AllowCreate,
    /// Protocol URN used to pick the IDPSSODescriptor in metadata.
    MetadataProtocol,
    /// Path of the assertion consumer service, overriding the SP default.
    AssertionConsumerPath,
}

impl IdpProperty {
    pub fn key(self) -> &'static str {
        match self {
            IdpProperty::ClearLocationQueryParams => "clear.location.query.params",
            IdpProperty::ForceAuthn => "authn.force",
            IdpProperty::IsPassive => "authn.passive",
            IdpProperty::SignatureAlgorithm => "signature.algorithm",
            IdpProperty::SignRequests => "authn.sign_requests",
            IdpProperty::NameIdFormat => "nameid.format",
            IdpProperty::AllowCreate => "nameid.allow_create",
            IdpProperty::MetadataProtocol => "metadata.protocol",
            IdpProperty::AssertionConsumerPath => "acs.path",
        }
    }
}

/// How the response path validates IdP signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureValidationMode {
    /// Signatures are not validated.
    None,
    /// Validate against the signing certificates published in IdP metadata.
    #[default]
    MetadataSigningCert,
    /// Validate against a certificate configured out of band.
    ConfiguredCert,
}

/// Where key, certificate or metadata bytes come from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialSource {
    /// Read from a file on every load.
    File(PathBuf),
    /// Held inline (PEM text or XML).
    Inline(String),
}

impl MaterialSource {
    /// Read the source bytes.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            MaterialSource::File(path) => tokio::fs::read(path).await,
            MaterialSource::Inline(value) => Ok(value.as_bytes().to_vec()),
        }
    }
}

// Inline values may be private keys; keep them out of logs.
impl fmt::Debug for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialSource::File(path) => f.debug_tuple("File").field(path).finish(),
            MaterialSource::Inline(value) => {
                write!(f, "Inline(<{} bytes>)", value.len())
            }
        }
    }
}

impl fmt::Display for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialSource::File(path) => write!(f, "{}", path.display()),
            MaterialSource::Inline(_) => write!(f, "<inline>"),
        }
    }
}
