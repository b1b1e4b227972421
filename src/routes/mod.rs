//! HTTP surface for the outbound SSO path.

pub mod saml;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::saml::SamlService;

/// Shared state for the SAML routes.
#[derive(Clone)]
pub struct AppState {
    pub saml: Arc<SamlService>,
}

/// Router serving `/saml/login` and `/saml/metadata/{idp_id}`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/saml/login", get(saml::saml_login))
        .route("/saml/metadata/{idp_id}", get(saml::sp_metadata))
        .with_state(state)
}
