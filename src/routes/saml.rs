use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::saml::{RedirectTarget, SamlError, SsoRequest};

/// Query parameters for SAML login.
#[derive(Debug, Deserialize)]
pub struct SamlLoginQuery {
    /// Site id; when absent the site is derived from the `Host` header
    #[serde(default)]
    pub site: Option<String>,
    /// Opaque state echoed back by the IdP
    #[serde(default)]
    pub relay_state: Option<String>,
}

/// SAML login endpoint - builds an AuthnRequest and redirects to the tenant's IdP.
#[tracing::instrument(name = "saml.login", skip(state, headers))]
pub async fn saml_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SamlLoginQuery>,
) -> Result<RedirectTarget, SamlError> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    match (query.site, host) {
        (Some(site_id), host) => {
            state
                .saml
                .authenticate(&SsoRequest {
                    site_id,
                    host,
                    relay_state: query.relay_state,
                })
                .await
        }
        (None, Some(host)) => {
            state
                .saml
                .authenticate_host(&host, query.relay_state)
                .await
        }
        (None, None) => Err(SamlError::NoApplicableConfig {
            site: String::new(),
        }),
    }
}

/// SP metadata for one IdP configuration, for import on the IdP side.
#[tracing::instrument(name = "saml.sp_metadata", skip(state))]
pub async fn sp_metadata(
    State(state): State<AppState>,
    Path(idp_id): Path<String>,
) -> Result<Response, SamlError> {
    let descriptor = state.saml.sp_metadata(&idp_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/samlmetadata+xml")],
        descriptor.xml,
    )
        .into_response())
}
