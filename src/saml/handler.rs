//! SP-initiated login: resolve the tenant, build the request, redirect.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use super::{
    AuthnRequestBuilder, IdpConfigRegistry, MetadataBean, SamlError, SigningCredential,
    SsoRequest,
    binding::{HttpRedirectEncoder, MessageEncoder, RedirectTarget},
    context::{PeerEndpoint, ProtocolExchangeContext},
    credential::{load_credential, security_parameters, signing_enabled},
    metadata::load_metadata,
    sp_descriptor::{SpDescriptor, build_sp_descriptor},
};
use crate::{
    config::{IdpConfig, IdpProperty, MaterialSource, ServiceProviderConfig},
    observability::metrics,
};

struct MetadataEntry {
    source: Option<MaterialSource>,
    bean: Arc<MetadataBean>,
    /// `None` never expires
    expires_at: Option<Instant>,
}

struct CredentialEntry {
    key_source: Option<MaterialSource>,
    cert_source: Option<MaterialSource>,
    credential: SigningCredential,
    expires_at: Option<Instant>,
}

fn is_fresh(expires_at: Option<Instant>) -> bool {
    expires_at.is_none_or(|at| Instant::now() < at)
}

/// Entry point for the outbound SSO path.
///
/// Shared across requests; every call works on its own state apart from the
/// registry and the caches of parsed metadata and signing credentials.
pub struct SamlService {
    registry: Arc<IdpConfigRegistry>,
    sp: ServiceProviderConfig,
    requests: AuthnRequestBuilder,
    encoder: Arc<dyn MessageEncoder>,
    /// config id -> parsed metadata
    metadata_cache: DashMap<String, MetadataEntry>,
    /// config id -> signing credential
    credential_cache: DashMap<String, CredentialEntry>,
}

impl SamlService {
    pub fn new(registry: Arc<IdpConfigRegistry>, sp: ServiceProviderConfig) -> Self {
        Self {
            registry,
            sp,
            requests: AuthnRequestBuilder::default(),
            encoder: Arc::new(HttpRedirectEncoder::new()),
            metadata_cache: DashMap::new(),
            credential_cache: DashMap::new(),
        }
    }

    /// Replace the request builder, e.g. to inject a fixed clock or id source.
    pub fn with_request_builder(mut self, requests: AuthnRequestBuilder) -> Self {
        self.requests = requests;
        self
    }

    pub fn registry(&self) -> &Arc<IdpConfigRegistry> {
        &self.registry
    }

    pub fn service_provider(&self) -> &ServiceProviderConfig {
        &self.sp
    }

    /// Start SSO for a site, returning where to send the user agent.
    #[tracing::instrument(
        name = "saml.authenticate",
        skip(self, request),
        fields(site = %request.site_id)
    )]
    pub async fn authenticate(&self, request: &SsoRequest) -> Result<RedirectTarget, SamlError> {
        let idp = self
            .registry
            .resolve(&request.site_id)
            .inspect_err(|e| self.record_failure(&request.site_id, None, e))?;

        match self.redirect(request, &idp).await {
            Ok(target) => {
                tracing::debug!(idp_id = %idp.id, "Redirecting to IdP");
                metrics::record_authn_request("redirected", "none");
                Ok(target)
            }
            Err(e) => {
                self.record_failure(&request.site_id, Some(&idp.id), &e);
                Err(e)
            }
        }
    }

    /// Start SSO for the site served on `host`.
    pub async fn authenticate_host(
        &self,
        host: &str,
        relay_state: Option<String>,
    ) -> Result<RedirectTarget, SamlError> {
        let site_id = self.registry.snapshot().site_for_host(host);
        self.authenticate(&SsoRequest {
            site_id,
            host: Some(host.to_string()),
            relay_state,
        })
        .await
    }

    /// SP metadata to publish to the IdP of configuration `idp_id`.
    ///
    /// Disabled configurations are not published.
    pub async fn sp_metadata(&self, idp_id: &str) -> Result<SpDescriptor, SamlError> {
        let idp = self
            .registry
            .get(idp_id)
            .filter(|idp| idp.enabled)
            .ok_or_else(|| SamlError::NoApplicableConfig {
                site: idp_id.to_string(),
            })?;
        build_sp_descriptor(&self.sp, &idp).await
    }

    /// Drop the cached metadata and credential of one configuration.
    pub fn invalidate_metadata(&self, idp_id: &str) {
        self.metadata_cache.remove(idp_id);
        self.credential_cache.remove(idp_id);
    }

    async fn redirect(
        &self,
        request: &SsoRequest,
        idp: &IdpConfig,
    ) -> Result<RedirectTarget, SamlError> {
        let metadata = self.metadata(idp).await?;
        let message = self.requests.build(request, idp, &self.sp, &metadata)?;
        let security = if signing_enabled(idp, &self.sp) {
            let credential = self.credential(idp).await?;
            Some(security_parameters(idp, credential, self.sp.signature_algorithm)?)
        } else {
            None
        };
        let location = message.destination.clone().ok_or_else(|| {
            SamlError::Initialization("AuthnRequest has no destination".to_string())
        })?;

        let context = ProtocolExchangeContext {
            peer: PeerEndpoint {
                entity_id: metadata.entity_id.clone(),
                location,
                binding: self.encoder.binding(),
            },
            message,
            security,
            relay_state: request.relay_state.clone(),
            clear_destination_query: idp
                .option_bool(IdpProperty::ClearLocationQueryParams)
                .unwrap_or(false),
        };
        self.encoder.encode(context)
    }

    async fn metadata(&self, idp: &IdpConfig) -> Result<Arc<MetadataBean>, SamlError> {
        if let Some(entry) = self.metadata_cache.get(&idp.id)
            && entry.source == idp.idp_metadata
            && is_fresh(entry.expires_at)
        {
            return Ok(entry.bean.clone());
        }

        let bean = Arc::new(load_metadata(idp).await?);
        self.metadata_cache.insert(
            idp.id.clone(),
            MetadataEntry {
                source: idp.idp_metadata.clone(),
                bean: bean.clone(),
                expires_at: self.expiry(),
            },
        );
        self.evict_deleted();
        tracing::debug!(idp_id = %idp.id, entity_id = %bean.entity_id, "Cached IdP metadata");
        Ok(bean)
    }

    async fn credential(&self, idp: &IdpConfig) -> Result<SigningCredential, SamlError> {
        if let Some(entry) = self.credential_cache.get(&idp.id)
            && entry.key_source == idp.private_key
            && entry.cert_source == idp.public_cert
            && is_fresh(entry.expires_at)
        {
            return Ok(entry.credential.clone());
        }

        let credential = load_credential(idp).await?;
        self.credential_cache.insert(
            idp.id.clone(),
            CredentialEntry {
                key_source: idp.private_key.clone(),
                cert_source: idp.public_cert.clone(),
                credential: credential.clone(),
                expires_at: self.expiry(),
            },
        );
        self.evict_deleted();
        tracing::debug!(idp_id = %idp.id, "Cached signing credential");
        Ok(credential)
    }

    fn expiry(&self) -> Option<Instant> {
        Instant::now().checked_add(Duration::from_secs(self.sp.metadata_cache_ttl_secs))
    }

    /// Drop cache entries of configurations no longer in the registry.
    fn evict_deleted(&self) {
        let snapshot = self.registry.snapshot();
        self.metadata_cache
            .retain(|id, _| snapshot.get(id).is_some());
        self.credential_cache
            .retain(|id, _| snapshot.get(id).is_some());
    }

    fn record_failure(&self, site: &str, idp_id: Option<&str>, error: &SamlError) {
        let kind = error.kind().as_str();
        match error {
            SamlError::NoApplicableConfig { .. } => tracing::warn!(
                site = %site,
                error_kind = kind,
                "No IdP configuration applies to site"
            ),
            _ => tracing::error!(
                site = %site,
                idp_id = idp_id.unwrap_or_default(),
                error_kind = kind,
                error = %error,
                "SAML authentication request failed"
            ),
        }
        metrics::record_authn_request("failed", kind);
    }
}
