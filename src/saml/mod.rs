//! SAML 2.0 service provider: outbound Web SSO for many tenants.
//!
//! A login attempt flows through the modules in order:
//!
//! 1. [`registry`] resolves the [`IdpConfig`](crate::config::IdpConfig) for the site
//! 2. [`metadata`] supplies the IdP's SSO endpoints, [`credential`] the signing key
//! 3. [`authn_request`] builds the `AuthnRequest`
//! 4. [`binding`] encodes it into an HTTP-Redirect [`RedirectTarget`]
//!
//! [`handler::SamlService`] ties these together. [`sp_descriptor`] renders the
//! metadata each IdP needs to trust this service provider.

pub mod authn_request;
pub mod binding;
pub mod context;
pub mod credential;
mod error;
pub mod handler;
pub mod metadata;
pub mod registry;
pub mod sp_descriptor;

#[cfg(test)]
pub(crate) mod test_support;

pub use authn_request::{
    AuthnRequestBuilder, Clock, RequestIdGenerator, SecureRandomIdGenerator, SsoRequest,
    SystemClock, authn_request_xml,
};
pub use binding::{HttpRedirectEncoder, MessageEncoder, RedirectTarget};
pub use context::{PeerEndpoint, ProtocolExchangeContext};
pub use credential::{
    SecurityParameters, SignatureAlgorithm, SigningCredential, load_credential,
    security_parameters,
};
pub use error::{ErrorInfo, ErrorResponse, SamlError, SamlErrorKind};
pub use handler::SamlService;
pub use metadata::{Binding, MetadataBean, load_metadata, parse_metadata};
pub use registry::{IdpConfigRegistry, RegistryError, RegistrySnapshot};
pub use sp_descriptor::{SpDescriptor, assertion_consumer_url, build_sp_descriptor};
