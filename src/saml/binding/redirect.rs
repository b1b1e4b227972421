//! HTTP-Redirect binding (SAML Bindings 3.4).
//!
//! The message is DEFLATE-compressed, base64-encoded and carried in the
//! `SAMLRequest` query parameter. When signing, the signature covers the exact
//! octets `SAMLRequest=..&RelayState=..&SigAlg=..` as they appear in the URL.

use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, write::DeflateEncoder};
use openssl::sign::Signer;
use url::{Url, form_urlencoded};

use super::{MessageEncoder, RedirectTarget};
use crate::saml::{
    SamlError, SecurityParameters, authn_request::authn_request_xml,
    context::ProtocolExchangeContext, metadata::Binding,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpRedirectEncoder;

impl HttpRedirectEncoder {
    pub fn new() -> Self {
        Self
    }

    fn prepare(&self, context: &ProtocolExchangeContext) -> Result<Url, SamlError> {
        if context.peer.binding != Binding::HttpRedirect {
            return Err(SamlError::Initialization(format!(
                "peer endpoint uses binding {}, expected {}",
                context.peer.binding.uri(),
                Binding::HttpRedirect.uri()
            )));
        }
        let location = Url::parse(&context.peer.location).map_err(|e| {
            SamlError::Initialization(format!(
                "invalid peer endpoint '{}': {}",
                context.peer.location, e
            ))
        })?;
        if location.scheme() != "https" && location.scheme() != "http" {
            return Err(SamlError::Initialization(format!(
                "peer endpoint '{}' is not an HTTP URL",
                context.peer.location
            )));
        }
        Ok(location)
    }
}

impl MessageEncoder for HttpRedirectEncoder {
    fn binding(&self) -> Binding {
        Binding::HttpRedirect
    }

    fn encode(&self, context: ProtocolExchangeContext) -> Result<RedirectTarget, SamlError> {
        let mut location = self.prepare(&context)?;

        let xml = authn_request_xml(&context.message)?;
        tracing::trace!(request_id = %context.message.id, message = %xml, "Encoding AuthnRequest");

        let mut query = format!("SAMLRequest={}", url_encode(&deflate_and_encode(&xml)?));
        if let Some(relay_state) = &context.relay_state {
            query.push_str("&RelayState=");
            query.push_str(&url_encode(relay_state));
        }
        if let Some(security) = &context.security {
            query.push_str("&SigAlg=");
            query.push_str(&url_encode(security.algorithm.uri()));
            let signature = sign(query.as_bytes(), security)?;
            query.push_str("&Signature=");
            query.push_str(&url_encode(&signature));
        }

        let existing = location
            .query()
            .filter(|q| !q.is_empty() && !context.clear_destination_query)
            .map(str::to_string);
        let full_query = match existing {
            Some(existing) => format!("{}&{}", existing, query),
            None => query,
        };
        location.set_query(Some(&full_query));
        location.set_fragment(None);

        Ok(RedirectTarget { location })
    }
}

fn deflate_and_encode(xml: &str) -> Result<String, SamlError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SamlError::Encoding(format!("Failed to compress message: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SamlError::Encoding(format!("Failed to compress message: {}", e)))?;
    Ok(STANDARD.encode(compressed))
}

fn sign(data: &[u8], security: &SecurityParameters) -> Result<String, SamlError> {
    let key = security.credential.private_key();
    if !security.algorithm.supports_key(key) {
        return Err(SamlError::Encoding(format!(
            "signature algorithm {} does not match the {:?} signing key",
            security.algorithm.uri(),
            key.id()
        )));
    }

    let mut signer = Signer::new(security.algorithm.digest(), key)
        .map_err(|e| SamlError::Encoding(format!("Failed to create signer: {}", e)))?;
    signer
        .update(data)
        .map_err(|e| SamlError::Encoding(format!("Failed to update signer: {}", e)))?;
    let signature = signer
        .sign_to_vec()
        .map_err(|e| SamlError::Encoding(format!("Failed to sign: {}", e)))?;
    Ok(STANDARD.encode(signature))
}

fn url_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
