//! IdP metadata parsing.
//!
//! Normalizes a published `EntityDescriptor` into a [`MetadataBean`]: the
//! entity id, every signing certificate, SSO endpoints keyed by binding and the
//! NameID formats the IdP supports.

use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::x509::X509;
use quick_xml::{Reader, events::Event};
use samael::metadata::{EntityDescriptor, IdpSsoDescriptor};

use super::SamlError;
use crate::{
    config::{IdpConfig, IdpProperty},
    observability::metrics,
};

/// SAML 2.0 protocol URN advertised in `protocolSupportEnumeration`.
pub const SAML2_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML bindings an IdP may publish an SSO endpoint for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Binding {
    HttpRedirect,
    HttpPost,
    HttpArtifact,
    Soap,
    Other(String),
}

impl Binding {
    pub fn from_uri(uri: &str) -> Self {
        match uri.trim() {
            samael::metadata::HTTP_REDIRECT_BINDING => Binding::HttpRedirect,
            samael::metadata::HTTP_POST_BINDING => Binding::HttpPost,
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact" => Binding::HttpArtifact,
            "urn:oasis:names:tc:SAML:2.0:bindings:SOAP" => Binding::Soap,
            other => Binding::Other(other.to_string()),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Binding::HttpRedirect => samael::metadata::HTTP_REDIRECT_BINDING,
            Binding::HttpPost => samael::metadata::HTTP_POST_BINDING,
            Binding::HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Binding::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
            Binding::Other(uri) => uri,
        }
    }
}

/// Parsed, read-only view of one IdP's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBean {
    pub entity_id: String,
    /// DER-encoded signing certificates in document order, without duplicates.
    pub certificates: Vec<Vec<u8>>,
    pub sso_endpoints: BTreeMap<Binding, String>,
    pub name_id_formats: Vec<String>,
}

impl MetadataBean {
    pub fn sso_endpoint(&self, binding: &Binding) -> Option<&str> {
        self.sso_endpoints.get(binding).map(String::as_str)
    }

    /// Single endpoint for callers that need exactly one: Redirect, then POST, then any.
    pub fn preferred_sso_endpoint(&self) -> Option<(&Binding, &str)> {
        [Binding::HttpRedirect, Binding::HttpPost]
            .iter()
            .find_map(|b| self.sso_endpoints.get_key_value(b))
            .or_else(|| self.sso_endpoints.iter().next())
            .map(|(b, location)| (b, location.as_str()))
    }

    /// Signing certificates as parsed X.509 objects.
    pub fn signing_certificates(&self) -> Result<Vec<X509>, SamlError> {
        self.certificates
            .iter()
            .map(|der| {
                X509::from_der(der).map_err(|e| {
                    SamlError::MetadataParse(format!("invalid signing certificate: {}", e))
                })
            })
            .collect()
    }
}

/// Parse an IdP metadata document.
pub fn parse_metadata(document: &[u8], config: &IdpConfig) -> Result<MetadataBean, SamlError> {
    let result = parse_document(document, config);
    metrics::record_metadata_parse(result.is_ok());
    if let Err(e) = &result {
        tracing::warn!(idp_id = %config.id, error = %e, "Rejected IdP metadata");
    }
    result
}

/// Read the tenant's configured metadata source and parse it.
pub async fn load_metadata(config: &IdpConfig) -> Result<MetadataBean, SamlError> {
    let source = config.idp_metadata.as_ref().ok_or_else(|| {
        SamlError::MetadataParse(format!(
            "IdP configuration '{}' has no metadata configured",
            config.id
        ))
    })?;
    let document = source.read().await.map_err(|e| {
        SamlError::MetadataParse(format!("failed to read metadata from {}: {}", source, e))
    })?;
    parse_metadata(&document, config)
}

fn parse_document(document: &[u8], config: &IdpConfig) -> Result<MetadataBean, SamlError> {
    let xml = std::str::from_utf8(document)
        .map_err(|e| SamlError::MetadataParse(format!("metadata is not UTF-8: {}", e)))?;
    check_root_element(xml)?;

    let entity: EntityDescriptor = samael::metadata::de::from_str(xml)
        .map_err(|e| SamlError::MetadataParse(format!("invalid metadata: {}", e)))?;

    let entity_id = entity
        .entity_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::MetadataParse("metadata missing entityID".to_string()))?
        .to_string();

    let protocol = config
        .option(IdpProperty::MetadataProtocol)
        .unwrap_or(SAML2_PROTOCOL);
    let descriptor = entity
        .idp_sso_descriptors
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|d| supports_protocol(d, protocol))
        .ok_or_else(|| {
            SamlError::MetadataParse(format!(
                "metadata has no IDPSSODescriptor supporting {}",
                protocol
            ))
        })?;

    let mut sso_endpoints = BTreeMap::new();
    for service in &descriptor.single_sign_on_services {
        sso_endpoints
            .entry(Binding::from_uri(&service.binding))
            .or_insert_with(|| service.location.trim().to_string());
    }
    if sso_endpoints.is_empty() {
        return Err(SamlError::MetadataParse(
            "metadata missing SingleSignOnService".to_string(),
        ));
    }

    Ok(MetadataBean {
        entity_id,
        certificates: signing_certificates(descriptor)?,
        sso_endpoints,
        name_id_formats: descriptor.name_id_formats.clone(),
    })
}

// EntitiesDescriptor aggregates are not accepted.
fn check_root_element(xml: &str) -> Result<(), SamlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                return if name.as_ref() == b"EntityDescriptor" {
                    Ok(())
                } else {
                    Err(SamlError::MetadataParse(format!(
                        "expected EntityDescriptor root element, found {}",
                        String::from_utf8_lossy(name.as_ref())
                    )))
                };
            }
            Ok(Event::Eof) => {
                return Err(SamlError::MetadataParse(
                    "metadata document has no root element".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(SamlError::MetadataParse(format!(
                    "ill-formed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }
}

fn supports_protocol(descriptor: &IdpSsoDescriptor, protocol: &str) -> bool {
    descriptor
        .protocol_support_enumeration
        .as_deref()
        .map(|p| p.split_whitespace().any(|token| token == protocol))
        .unwrap_or(false)
}

fn signing_certificates(descriptor: &IdpSsoDescriptor) -> Result<Vec<Vec<u8>>, SamlError> {
    let mut certificates: Vec<Vec<u8>> = Vec::new();
    for kd in &descriptor.key_descriptors {
        // use="signing" or no use at all
        let is_signing = kd
            .key_use
            .as_deref()
            .map(|u| u == "signing")
            .unwrap_or(true);
        let Some(x509_data) = kd.key_info.x509_data.as_ref().filter(|_| is_signing) else {
            continue;
        };
        for cert in &x509_data.certificates {
            let compact: String = cert.chars().filter(|c| !c.is_whitespace()).collect();
            let der = STANDARD.decode(compact.as_bytes()).map_err(|e| {
                SamlError::MetadataParse(format!("signing certificate is not base64: {}", e))
            })?;
            X509::from_der(&der).map_err(|e| {
                SamlError::MetadataParse(format!("invalid signing certificate: {}", e))
            })?;
            if !certificates.contains(&der) {
                certificates.push(der);
            }
        }
    }
    Ok(certificates)
}
