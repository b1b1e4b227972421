//! SP-initiated `AuthnRequest` construction.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use samael::{
    schema::{AuthnRequest, Issuer, NameIdPolicy},
    traits::ToXml,
};

use super::{
    SamlError,
    metadata::{Binding, MetadataBean},
    sp_descriptor::assertion_consumer_url,
};
use crate::config::{IdpConfig, IdpProperty, ServiceProviderConfig};

/// An inbound request to start SSO for a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoRequest {
    pub site_id: String,
    /// Host the request arrived on; used for the ACS URL when the tenant has no hostname.
    pub host: Option<String>,
    /// Opaque value the IdP echoes back with its response.
    pub relay_state: Option<String>,
}

/// Source of request identifiers.
pub trait RequestIdGenerator: Send + Sync {
    /// A fresh identifier, valid as an XML `ID`.
    fn generate(&self) -> String;
}

/// 160 random bits from the operating system, hex encoded with a leading `_`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureRandomIdGenerator;

impl RequestIdGenerator for SecureRandomIdGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 20];
        OsRng.fill_bytes(&mut bytes);
        format!("_{}", hex::encode(bytes))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Serialize an AuthnRequest to the XML sent over the wire.
pub fn authn_request_xml(request: &AuthnRequest) -> Result<String, SamlError> {
    request
        .to_string()
        .map_err(|e| SamlError::Encoding(format!("Failed to serialize AuthnRequest: {:?}", e)))
}

/// Builds AuthnRequests. Performs no I/O; output depends only on its inputs,
/// the id generator and the clock.
#[derive(Clone)]
pub struct AuthnRequestBuilder {
    ids: Arc<dyn RequestIdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Default for AuthnRequestBuilder {
    fn default() -> Self {
        Self::new(Arc::new(SecureRandomIdGenerator), Arc::new(SystemClock))
    }
}

impl fmt::Debug for AuthnRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthnRequestBuilder").finish_non_exhaustive()
    }
}

impl AuthnRequestBuilder {
    pub fn new(ids: Arc<dyn RequestIdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { ids, clock }
    }

    pub fn build(
        &self,
        request: &SsoRequest,
        idp: &IdpConfig,
        sp: &ServiceProviderConfig,
        metadata: &MetadataBean,
    ) -> Result<AuthnRequest, SamlError> {
        let binding = Binding::HttpRedirect;
        let destination = metadata
            .sso_endpoint(&binding)
            .ok_or_else(|| SamlError::NoSsoEndpoint {
                binding: binding.uri().to_string(),
            })?
            .to_string();

        let assertion_consumer_service_url =
            assertion_consumer_url(sp, idp, request.host.as_deref())?;

        let format = idp.option(IdpProperty::NameIdFormat).map(str::to_string);
        let allow_create = idp.option_bool(IdpProperty::AllowCreate);
        let name_id_policy = (format.is_some() || allow_create.is_some()).then(|| NameIdPolicy {
            format,
            allow_create,
            sp_name_qualifier: None,
        });

        Ok(AuthnRequest {
            id: self.ids.generate(),
            version: "2.0".to_string(),
            issue_instant: self.clock.now(),
            destination: Some(destination),
            issuer: Some(Issuer {
                value: Some(idp.sp_issuer_url.clone()),
                ..Default::default()
            }),
            protocol_binding: Some(binding.uri().to_string()),
            assertion_consumer_service_url: Some(assertion_consumer_service_url),
            force_authn: idp.option_bool(IdpProperty::ForceAuthn),
            is_passive: idp.option_bool(IdpProperty::IsPassive),
            name_id_policy,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashMap, HashSet},
        sync::atomic::{AtomicU32, Ordering},
    };

    use chrono::TimeZone;
    use quick_xml::{Reader, events::Event};

    use super::*;
    use crate::saml::test_support::idp_config;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct SequentialIds(AtomicU32);

    impl RequestIdGenerator for SequentialIds {
        fn generate(&self) -> String {
            format!("_req{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn fixed_builder() -> AuthnRequestBuilder {
        AuthnRequestBuilder::new(
            Arc::new(SequentialIds::default()),
            Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            )),
        )
    }

    fn metadata(endpoints: &[(Binding, &str)]) -> MetadataBean {
        MetadataBean {
            entity_id: "https://idp.example.com".to_string(),
            certificates: Vec::new(),
            sso_endpoints: endpoints
                .iter()
                .map(|(b, l)| (b.clone(), l.to_string()))
                .collect::<BTreeMap<_, _>>(),
            name_id_formats: Vec::new(),
        }
    }

    fn request() -> SsoRequest {
        SsoRequest {
            site_id: "site-a".to_string(),
            host: Some("a.example.com".to_string()),
            relay_state: None,
        }
    }

    fn xml(request: &AuthnRequest) -> String {
        authn_request_xml(request).unwrap()
    }

    fn attributes(xml: &str, element: &str) -> Option<HashMap<String, String>> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e)
                    if e.local_name().as_ref() == element.as_bytes() =>
                {
                    return Some(
                        e.attributes()
                            .map(|a| {
                                let a = a.unwrap();
                                (
                                    String::from_utf8(a.key.local_name().as_ref().to_vec())
                                        .unwrap(),
                                    a.unescape_value().unwrap().into_owned(),
                                )
                            })
                            .collect(),
                    );
                }
                Event::Eof => return None,
                _ => {}
            }
        }
    }

    fn element_text(xml: &str, element: &str) -> Option<String> {
        let mut reader = Reader::from_str(xml);
        let mut inside = false;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.local_name().as_ref() == element.as_bytes() => inside = true,
                Event::Text(t) if inside => return Some(t.unescape().unwrap().into_owned()),
                Event::Eof => return None,
                _ => {}
            }
        }
    }

    #[test]
    fn test_destination_is_redirect_endpoint() {
        let metadata = metadata(&[
            (Binding::HttpPost, "https://idp.example.com/post"),
            (
                Binding::HttpRedirect,
                "https://idp.example.com/sso?tenant=a&x=1",
            ),
        ]);
        let request = fixed_builder()
            .build(
                &request(),
                &idp_config("t"),
                &ServiceProviderConfig::default(),
                &metadata,
            )
            .unwrap();

        assert_eq!(
            request.destination.as_deref(),
            Some("https://idp.example.com/sso?tenant=a&x=1")
        );
        let attrs = attributes(&xml(&request), "AuthnRequest").unwrap();
        assert_eq!(attrs["Destination"], "https://idp.example.com/sso?tenant=a&x=1");
        assert_eq!(
            attrs["ProtocolBinding"],
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
        );
    }

    #[test]
    fn test_missing_redirect_endpoint() {
        let metadata = metadata(&[(Binding::HttpPost, "https://idp.example.com/post")]);
        let err = fixed_builder()
            .build(
                &request(),
                &idp_config("t"),
                &ServiceProviderConfig::default(),
                &metadata,
            )
            .unwrap_err();
        assert!(matches!(err, SamlError::NoSsoEndpoint { binding } if binding.ends_with("HTTP-Redirect")));
    }

    #[test]
    fn test_fields_and_serialization() {
        let mut idp = idp_config("t");
        idp.properties.extend([
            ("authn.force".to_string(), "true".to_string()),
            ("authn.passive".to_string(), "false".to_string()),
            (
                "nameid.format".to_string(),
                "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string(),
            ),
            ("nameid.allow_create".to_string(), "true".to_string()),
        ]);
        let metadata = metadata(&[(Binding::HttpRedirect, "https://idp.example.com/sso")]);

        let request = fixed_builder()
            .build(&request(), &idp, &ServiceProviderConfig::default(), &metadata)
            .unwrap();
        assert_eq!(request.id, "_req0");
        assert_eq!(request.version, "2.0");
        assert_eq!(
            request.issuer.as_ref().and_then(|i| i.value.as_deref()),
            Some("https://sp.example.com/t")
        );
        assert_eq!(request.force_authn, Some(true));
        assert_eq!(request.is_passive, Some(false));

        let xml = xml(&request);
        let attrs = attributes(&xml, "AuthnRequest").unwrap();
        assert_eq!(attrs["ID"], "_req0");
        assert_eq!(attrs["Version"], "2.0");
        assert_eq!(
            DateTime::parse_from_rfc3339(&attrs["IssueInstant"]).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
        );
        assert_eq!(
            attrs["AssertionConsumerServiceURL"],
            "https://sp.example.com/saml/acs"
        );
        assert_eq!(attrs["ForceAuthn"], "true");
        assert_eq!(attrs["IsPassive"], "false");
        assert_eq!(
            element_text(&xml, "Issuer").as_deref(),
            Some("https://sp.example.com/t")
        );

        let policy = attributes(&xml, "NameIDPolicy").unwrap();
        assert_eq!(
            policy["Format"],
            "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"
        );
        assert_eq!(policy["AllowCreate"], "true");
    }

    #[test]
    fn test_optional_flags_omitted() {
        let metadata = metadata(&[(Binding::HttpRedirect, "https://idp.example.com/sso")]);
        let xml = xml(&fixed_builder()
            .build(
                &request(),
                &idp_config("t"),
                &ServiceProviderConfig::default(),
                &metadata,
            )
            .unwrap());
        let attrs = attributes(&xml, "AuthnRequest").unwrap();
        assert!(!attrs.contains_key("ForceAuthn"));
        assert!(!attrs.contains_key("IsPassive"));
        assert!(attributes(&xml, "NameIDPolicy").is_none());
    }

    #[test]
    fn test_issuer_is_escaped() {
        let mut idp = idp_config("t");
        idp.sp_issuer_url = "https://sp.example.com/t?a=1&b=<2>".to_string();
        let metadata = metadata(&[(Binding::HttpRedirect, "https://idp.example.com/sso")]);
        let xml = xml(&fixed_builder()
            .build(&request(), &idp, &ServiceProviderConfig::default(), &metadata)
            .unwrap());
        assert!(!xml.contains("<2>"));
        assert_eq!(
            element_text(&xml, "Issuer").as_deref(),
            Some("https://sp.example.com/t?a=1&b=<2>")
        );
    }

    #[test]
    fn test_acs_falls_back_to_request_host() {
        let mut idp = idp_config("t");
        idp.sp_endpoint_hostname = String::new();
        let metadata = metadata(&[(Binding::HttpRedirect, "https://idp.example.com/sso")]);
        let request = fixed_builder()
            .build(&request(), &idp, &ServiceProviderConfig::default(), &metadata)
            .unwrap();
        assert_eq!(
            request.assertion_consumer_service_url.as_deref(),
            Some("https://a.example.com/saml/acs")
        );
    }

    #[test]
    fn test_deterministic_with_fixed_sources() {
        let metadata = metadata(&[(Binding::HttpRedirect, "https://idp.example.com/sso")]);
        let idp = idp_config("t");
        let sp = ServiceProviderConfig::default();
        let first = fixed_builder()
            .build(&request(), &idp, &sp, &metadata)
            .unwrap();
        let second = fixed_builder()
            .build(&request(), &idp, &sp, &metadata)
            .unwrap();
        assert_eq!(xml(&first), xml(&second));
    }

    #[test]
    fn test_secure_ids_are_unique() {
        let ids = SecureRandomIdGenerator;
        let generated: HashSet<String> = (0..10_000).map(|_| ids.generate()).collect();
        assert_eq!(generated.len(), 10_000);

        let id = ids.generate();
        assert!(id.starts_with('_'));
        assert_eq!(id.len(), 41);
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
