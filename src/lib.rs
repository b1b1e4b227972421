//! Multi-tenant SAML 2.0 service provider.
//!
//! Each tenant site binds to an identity provider described by its published
//! metadata. This crate resolves the IdP configuration for a site, builds a
//! signed `AuthnRequest` and sends the user agent to the IdP with the
//! HTTP-Redirect binding. It also renders the SP metadata every IdP imports.
//!
//! ```rust,ignore
//! let config = SsoConfig::from_file("saml.toml")?;
//! observability::init_tracing(&config.logging)?;
//!
//! let registry = Arc::new(IdpConfigRegistry::from_config(&config)?);
//! let saml = Arc::new(SamlService::new(registry, config.service_provider.clone()));
//! let app = routes::router(routes::AppState { saml });
//! ```

pub mod config;
pub mod observability;
pub mod routes;
pub mod saml;

pub use config::{ConfigError, IdpConfig, SsoConfig};
pub use saml::{IdpConfigRegistry, SamlError, SamlService};
