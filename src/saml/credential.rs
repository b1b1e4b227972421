//! Signing credentials for AuthnRequests.
//!
//! Turns a tenant's configured key material into a private key and matching
//! certificate, and picks the signature algorithm. Key bytes never reach a
//! log line or a `Debug` impl.

use std::{fmt, str::FromStr};

use openssl::{
    hash::MessageDigest,
    pkey::{Id, PKey, PKeyRef, Private},
    x509::X509,
};
use serde::{Deserialize, Serialize};

use super::SamlError;
use crate::config::{IdpConfig, IdpProperty, MaterialSource, ServiceProviderConfig};

/// Signature algorithms usable with the HTTP-Redirect binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    RsaSha1,
    #[default]
    RsaSha256,
    RsaSha512,
    EcdsaSha256,
}

impl SignatureAlgorithm {
    /// XML-DSig algorithm identifier, sent as `SigAlg`.
    pub fn uri(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            SignatureAlgorithm::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            SignatureAlgorithm::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            SignatureAlgorithm::EcdsaSha256 => {
                "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"
            }
        }
    }

    pub fn digest(&self) -> MessageDigest {
        match self {
            SignatureAlgorithm::RsaSha1 => MessageDigest::sha1(),
            SignatureAlgorithm::RsaSha256 | SignatureAlgorithm::EcdsaSha256 => {
                MessageDigest::sha256()
            }
            SignatureAlgorithm::RsaSha512 => MessageDigest::sha512(),
        }
    }

    /// Whether a key of this type can produce this algorithm's signatures.
    pub fn supports_key(&self, key: &PKeyRef<Private>) -> bool {
        match self {
            SignatureAlgorithm::EcdsaSha256 => key.id() == Id::EC,
            _ => key.id() == Id::RSA,
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SamlError;

    /// Accepts the short names (`rsa_sha256`, any case, `-` or `_`) and the full URIs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let candidates = [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::EcdsaSha256,
        ];
        if let Some(alg) = candidates.iter().find(|alg| alg.uri() == s) {
            return Ok(*alg);
        }
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rsa_sha1" => Ok(SignatureAlgorithm::RsaSha1),
            "rsa_sha256" => Ok(SignatureAlgorithm::RsaSha256),
            "rsa_sha512" => Ok(SignatureAlgorithm::RsaSha512),
            "ecdsa_sha256" => Ok(SignatureAlgorithm::EcdsaSha256),
            _ => Err(SamlError::Encoding(format!(
                "unsupported signature algorithm '{}'",
                s
            ))),
        }
    }
}

/// A private key and the certificate carrying its public half.
#[derive(Clone)]
pub struct SigningCredential {
    private_key: PKey<Private>,
    certificate: X509,
}

impl SigningCredential {
    /// Pair a key with a certificate, rejecting pairs that do not match.
    pub fn new(private_key: PKey<Private>, certificate: X509) -> Result<Self, SamlError> {
        let public_key = certificate.public_key().map_err(|e| {
            SamlError::KeyMaterial(format!("certificate has no usable public key: {}", e))
        })?;
        if !public_key.public_eq(&private_key) {
            return Err(SamlError::KeyMaterial(
                "certificate does not match private key".to_string(),
            ));
        }
        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Parse a key (PKCS#8 or PKCS#1, PEM or DER) and a certificate (PEM or DER).
    pub fn from_bytes(key: &[u8], cert: &[u8]) -> Result<Self, SamlError> {
        let private_key = if is_pem(key) {
            PKey::private_key_from_pem(key)
        } else {
            PKey::private_key_from_der(key)
        }
        .map_err(|e| SamlError::KeyMaterial(format!("failed to parse private key: {}", e)))?;

        let certificate = if is_pem(cert) {
            X509::from_pem(cert)
        } else {
            X509::from_der(cert)
        }
        .map_err(|e| SamlError::KeyMaterial(format!("failed to parse certificate: {}", e)))?;

        Self::new(private_key, certificate)
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("private_key", &"<redacted>")
            .field("certificate_subject", &self.certificate.subject_name())
            .finish()
    }
}

/// Credential and algorithm for a single exchange.
#[derive(Debug, Clone)]
pub struct SecurityParameters {
    pub credential: SigningCredential,
    pub algorithm: SignatureAlgorithm,
}

pub(super) fn is_pem(bytes: &[u8]) -> bool {
    bytes.windows(11).any(|w| w == b"-----BEGIN ")
}

async fn read_material(
    config: &IdpConfig,
    source: Option<&MaterialSource>,
    what: &str,
) -> Result<Vec<u8>, SamlError> {
    let source = source.ok_or_else(|| {
        SamlError::KeyMaterial(format!(
            "IdP configuration '{}' has no {} configured",
            config.id, what
        ))
    })?;
    source
        .read()
        .await
        .map_err(|e| SamlError::KeyMaterial(format!("failed to read {} from {}: {}", what, source, e)))
}

/// Load the tenant's signing credential.
pub async fn load_credential(config: &IdpConfig) -> Result<SigningCredential, SamlError> {
    let key = read_material(config, config.private_key.as_ref(), "private key").await?;
    let cert = read_material(config, config.public_cert.as_ref(), "public certificate").await?;
    SigningCredential::from_bytes(&key, &cert)
}

/// Whether requests to this tenant's IdP are signed.
pub fn signing_enabled(config: &IdpConfig, sp: &ServiceProviderConfig) -> bool {
    config
        .option_bool(IdpProperty::SignRequests)
        .unwrap_or(sp.sign_requests)
}

/// Signature algorithm for a tenant: its `signature.algorithm` property, else the default.
pub fn signature_algorithm(
    config: &IdpConfig,
    default: SignatureAlgorithm,
) -> Result<SignatureAlgorithm, SamlError> {
    match config.option(IdpProperty::SignatureAlgorithm) {
        Some(name) => name.parse(),
        None => Ok(default),
    }
}

/// Pair a loaded credential with the tenant's signature algorithm for one exchange.
pub fn security_parameters(
    config: &IdpConfig,
    credential: SigningCredential,
    default_algorithm: SignatureAlgorithm,
) -> Result<SecurityParameters, SamlError> {
    let algorithm = signature_algorithm(config, default_algorithm)?;
    Ok(SecurityParameters {
        credential,
        algorithm,
    })
}
