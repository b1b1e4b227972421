//! Fixtures shared by the SAML unit tests.

use std::collections::HashMap;

use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{X509, X509Builder, X509NameBuilder},
};

use super::SigningCredential;
use crate::config::{IdpConfig, MaterialSource, SignatureValidationMode};

pub(crate) const REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
pub(crate) const POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

fn self_signed(common_name: &str, private_key: &PKey<Private>) -> X509 {
    let mut x509_name = X509NameBuilder::new().unwrap();
    x509_name.append_entry_by_text("CN", common_name).unwrap();
    let x509_name = x509_name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial_number = BigNum::from_u32(1).unwrap();
    builder
        .set_serial_number(&serial_number.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&x509_name).unwrap();
    builder.set_issuer_name(&x509_name).unwrap();
    builder.set_pubkey(private_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(private_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// Self-signed RSA certificate and PKCS#8 key, both PEM.
pub(crate) fn generate_test_certificate(common_name: &str) -> (String, String) {
    let rsa = Rsa::generate(2048).unwrap();
    let private_key = PKey::from_rsa(rsa).unwrap();
    let cert = self_signed(common_name, &private_key);

    let cert_pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
    let key_pem = String::from_utf8(private_key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    (cert_pem, key_pem)
}

/// P-256 credential for ECDSA signing.
pub(crate) fn generate_ec_credential() -> SigningCredential {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let ec = EcKey::generate(&group).unwrap();
    let private_key = PKey::from_ec_key(ec).unwrap();
    let cert = self_signed("ec.example.com", &private_key);
    SigningCredential::new(private_key, cert).unwrap()
}

/// Base64 body of a PEM certificate, as it appears in `ds:X509Certificate`.
pub(crate) fn pem_body(cert_pem: &str) -> String {
    cert_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("")
}

/// Minimal enabled configuration with no key material.
pub(crate) fn idp_config(id: &str) -> IdpConfig {
    IdpConfig {
        id: id.to_string(),
        name: format!("{} IdP", id),
        enabled: true,
        sp_issuer_url: format!("https://sp.example.com/{}", id),
        sp_endpoint_hostname: "sp.example.com".to_string(),
        private_key: None,
        public_cert: None,
        idp_metadata: None,
        signature_validation: SignatureValidationMode::default(),
        properties: HashMap::new(),
        sites: HashMap::new(),
    }
}

/// Configuration carrying a freshly generated key pair and the given metadata.
pub(crate) fn signing_idp_config(id: &str, metadata_xml: &str) -> IdpConfig {
    let (cert_pem, key_pem) = generate_test_certificate("sp.example.com");
    let mut config = idp_config(id);
    config.private_key = Some(MaterialSource::Inline(key_pem));
    config.public_cert = Some(MaterialSource::Inline(cert_pem));
    config.idp_metadata = Some(MaterialSource::Inline(metadata_xml.to_string()));
    config
}

/// IdP metadata with one signing key per certificate and the given SSO endpoints.
pub(crate) fn idp_metadata_xml(
    entity_id: &str,
    signing_certs: &[&str],
    endpoints: &[(&str, &str)],
) -> String {
    let key_descriptors: String = signing_certs
        .iter()
        .map(|pem| {
            format!(
                r#"
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#,
                pem_body(pem)
            )
        })
        .collect();

    let services: String = endpoints
        .iter()
        .map(|(binding, location)| {
            format!(
                r#"
    <md:SingleSignOnService Binding="{}" Location="{}"/>"#,
                binding, location
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">{key_descriptors}
    <md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>{services}
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#
    )
}
