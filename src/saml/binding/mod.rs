//! Outbound message encoders, one per SAML binding.

mod redirect;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
pub use redirect::HttpRedirectEncoder;
use url::Url;

use super::{SamlError, context::ProtocolExchangeContext, metadata::Binding};

/// Encodes a protocol message for delivery over one binding.
pub trait MessageEncoder: Send + Sync {
    fn binding(&self) -> Binding;

    /// Encode the exchange. Either the complete target is returned or nothing is.
    fn encode(&self, context: ProtocolExchangeContext) -> Result<RedirectTarget, SamlError>;
}

/// Where the user agent is sent to reach the IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub location: Url,
}

impl IntoResponse for RedirectTarget {
    fn into_response(self) -> Response {
        (
            StatusCode::FOUND,
            [
                (header::LOCATION, self.location.to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            ],
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_response() {
        let target = RedirectTarget {
            location: Url::parse("https://idp.example.com/sso?SAMLRequest=abc").unwrap(),
        };
        let response = target.into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://idp.example.com/sso?SAMLRequest=abc"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
