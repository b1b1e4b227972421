use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Errors raised while building or encoding an authentication request.
///
/// Every variant is scoped to one attempt: a tenant's broken configuration
/// never affects other tenants. Requests are deterministic, so callers
/// surface these instead of retrying.
#[derive(Debug, thiserror::Error)]
pub enum SamlError {
    /// Key or certificate absent, unreadable, or not a matching pair.
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// IdP metadata is ill-formed or incomplete.
    #[error("Failed to parse IdP metadata: {0}")]
    MetadataParse(String),

    /// IdP metadata has no SSO endpoint for the binding in use.
    #[error("IdP metadata has no SingleSignOnService for binding {binding}")]
    NoSsoEndpoint { binding: String },

    /// No enabled configuration applies to the site.
    #[error("No applicable IdP configuration for site '{site}'")]
    NoApplicableConfig { site: String },

    /// The encoder could not be prepared for the exchange.
    #[error("Failed to initialize message encoder: {0}")]
    Initialization(String),

    /// Serialization, compression or signing failed.
    #[error("Failed to encode SAML message: {0}")]
    Encoding(String),
}

/// Closed set of [`SamlError`] kinds, for branching and labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamlErrorKind {
    KeyMaterial,
    MetadataParse,
    NoSsoEndpoint,
    NoApplicableConfig,
    Initialization,
    Encoding,
}

impl SamlErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamlErrorKind::KeyMaterial => "key_material",
            SamlErrorKind::MetadataParse => "metadata_parse",
            SamlErrorKind::NoSsoEndpoint => "no_sso_endpoint",
            SamlErrorKind::NoApplicableConfig => "no_applicable_config",
            SamlErrorKind::Initialization => "initialization",
            SamlErrorKind::Encoding => "encoding",
        }
    }
}

impl SamlError {
    pub fn kind(&self) -> SamlErrorKind {
        match self {
            SamlError::KeyMaterial(_) => SamlErrorKind::KeyMaterial,
            SamlError::MetadataParse(_) => SamlErrorKind::MetadataParse,
            SamlError::NoSsoEndpoint { .. } => SamlErrorKind::NoSsoEndpoint,
            SamlError::NoApplicableConfig { .. } => SamlErrorKind::NoApplicableConfig,
            SamlError::Initialization(_) => SamlErrorKind::Initialization,
            SamlError::Encoding(_) => SamlErrorKind::Encoding,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SamlError::NoApplicableConfig { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type classification.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code.
    pub code: Option<String>,
}

impl IntoResponse for SamlError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: ErrorInfo {
                error_type: "authentication_error".to_string(),
                message: self.to_string(),
                code: Some(self.kind().as_str().to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}
