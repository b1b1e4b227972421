//! The service provider's own metadata, published to each tenant's IdP.

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::x509::X509;
use quick_xml::escape::escape;
use samael::metadata::{EntityDescriptor, HTTP_POST_BINDING};

use super::{
    SamlError,
    credential::{is_pem, signing_enabled},
    metadata::SAML2_PROTOCOL,
};
use crate::config::{IdpConfig, IdpProperty, ServiceProviderConfig, SignatureValidationMode};

/// Rendered SP metadata plus its parsed form.
#[derive(Debug, Clone)]
pub struct SpDescriptor {
    pub xml: String,
    pub entity_descriptor: EntityDescriptor,
}

/// Assertion consumer service URL for a tenant.
///
/// Built from the tenant's SP endpoint hostname, or `fallback_host` when the
/// hostname is not configured. A hostname that already carries a scheme is
/// used as the base as-is.
pub fn assertion_consumer_url(
    sp: &ServiceProviderConfig,
    idp: &IdpConfig,
    fallback_host: Option<&str>,
) -> Result<String, SamlError> {
    let host = Some(idp.sp_endpoint_hostname.trim())
        .filter(|h| !h.is_empty())
        .or(fallback_host.map(str::trim).filter(|h| !h.is_empty()))
        .ok_or_else(|| {
            SamlError::Initialization(format!(
                "IdP configuration '{}' has no SP endpoint hostname",
                idp.id
            ))
        })?;

    let path = idp
        .option(IdpProperty::AssertionConsumerPath)
        .unwrap_or(&sp.acs_path);
    let path = path.trim_start_matches('/');

    if host.contains("://") {
        Ok(format!("{}/{}", host.trim_end_matches('/'), path))
    } else {
        Ok(format!(
            "{}://{}/{}",
            sp.scheme,
            host.trim_end_matches('/'),
            path
        ))
    }
}

/// Build the SP metadata document for a tenant.
pub async fn build_sp_descriptor(
    sp: &ServiceProviderConfig,
    idp: &IdpConfig,
) -> Result<SpDescriptor, SamlError> {
    let acs_url = assertion_consumer_url(sp, idp, None)?;
    let certificate = sp_certificate_base64(idp).await?;
    let authn_requests_signed = signing_enabled(idp, sp);
    let want_assertions_signed = idp.signature_validation != SignatureValidationMode::None;

    let key_descriptors = certificate
        .map(|cert| {
            ["signing", "encryption"]
                .iter()
                .map(|key_use| {
                    format!(
                        r#"
    <md:KeyDescriptor use="{key_use}">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{cert}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#
                    )
                })
                .collect::<String>()
        })
        .unwrap_or_default();

    let name_id_formats: String = sp
        .name_id_formats
        .iter()
        .map(|format| {
            format!(
                "\n    <md:NameIDFormat>{}</md:NameIDFormat>",
                escape(format.as_str())
            )
        })
        .collect();

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="{authn_requests_signed}" WantAssertionsSigned="{want_assertions_signed}" protocolSupportEnumeration="{protocol}">{key_descriptors}{name_id_formats}
    <md:AssertionConsumerService Binding="{binding}" Location="{acs_url}" index="0" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
        entity_id = escape(idp.sp_issuer_url.as_str()),
        protocol = SAML2_PROTOCOL,
        binding = HTTP_POST_BINDING,
        acs_url = escape(acs_url.as_str()),
    );

    let entity_descriptor = samael::metadata::de::from_str(&xml)
        .map_err(|e| SamlError::Encoding(format!("generated SP metadata is invalid: {}", e)))?;

    tracing::trace!(idp_id = %idp.id, metadata = %xml, "Built SP metadata");

    Ok(SpDescriptor {
        xml,
        entity_descriptor,
    })
}

async fn sp_certificate_base64(idp: &IdpConfig) -> Result<Option<String>, SamlError> {
    let Some(source) = &idp.public_cert else {
        return Ok(None);
    };
    let bytes = source.read().await.map_err(|e| {
        SamlError::KeyMaterial(format!("failed to read public certificate from {}: {}", source, e))
    })?;
    let cert = if is_pem(&bytes) {
        X509::from_pem(&bytes)
    } else {
        X509::from_der(&bytes)
    }
    .map_err(|e| SamlError::KeyMaterial(format!("failed to parse certificate: {}", e)))?;
    let der = cert
        .to_der()
        .map_err(|e| SamlError::KeyMaterial(format!("failed to encode certificate: {}", e)))?;
    Ok(Some(STANDARD.encode(der)))
}
