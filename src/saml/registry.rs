//! Registry of per-tenant IdP configurations.
//!
//! Decides which [`IdpConfig`] applies to a site. State lives in an immutable
//! [`RegistrySnapshot`]; writers build a new snapshot and swap it in, so a
//! reader always sees either the old or the new state in full.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = IdpConfigRegistry::from_config(&config)?;
//!
//! match registry.resolve("8a7d5e23") {
//!     Ok(idp) => { /* build the AuthnRequest for `idp` */ }
//!     Err(SamlError::NoApplicableConfig { .. }) => { /* SSO not active for the site */ }
//!     Err(e) => return Err(e),
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};

use super::SamlError;
use crate::config::{IdpConfig, SsoConfig};

/// Error type for administrative registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown IdP configuration '{0}'")]
    UnknownConfig(String),

    #[error("Invalid IdP configuration: {0}")]
    InvalidConfig(String),
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    configs: HashMap<String, Arc<IdpConfig>>,
    /// site id -> config id
    site_index: HashMap<String, String>,
    /// lowercased site name -> site id
    host_index: HashMap<String, String>,
    default_id: Option<String>,
    disabled_sites: HashSet<String>,
}

impl RegistrySnapshot {
    /// Configuration applying to a site.
    ///
    /// A disabled site never resolves. Otherwise the site's own enabled
    /// configuration wins, then the enabled default.
    pub fn resolve(&self, site_id: &str) -> Result<Arc<IdpConfig>, SamlError> {
        let no_config = || SamlError::NoApplicableConfig {
            site: site_id.to_string(),
        };

        if self.disabled_sites.contains(site_id) {
            return Err(no_config());
        }

        let mapped = self
            .site_index
            .get(site_id)
            .and_then(|id| self.configs.get(id))
            .filter(|config| config.enabled);
        if let Some(config) = mapped {
            return Ok(config.clone());
        }

        self.default_id
            .as_ref()
            .and_then(|id| self.configs.get(id))
            .filter(|config| config.enabled)
            .cloned()
            .ok_or_else(no_config)
    }

    /// Site id for a request host: a known site name, else the host itself.
    pub fn site_for_host(&self, host: &str) -> String {
        let host = normalize_host(host);
        self.host_index.get(&host).cloned().unwrap_or(host)
    }

    pub fn get(&self, id: &str) -> Option<Arc<IdpConfig>> {
        self.configs.get(id).cloned()
    }

    /// All configurations, ordered by id.
    pub fn list(&self) -> Vec<Arc<IdpConfig>> {
        let mut configs: Vec<_> = self.configs.values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn is_disabled(&self, site_id: &str) -> bool {
        self.disabled_sites.contains(site_id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn reindex(&mut self) {
        self.site_index.clear();
        self.host_index.clear();
        // Ordered so that site-name collisions resolve the same way every time
        let ordered: BTreeMap<_, _> = self.configs.iter().collect();
        for (id, config) in ordered {
            for (site_id, site_name) in &config.sites {
                self.site_index.insert(site_id.clone(), id.clone());
                let name = site_name.trim().to_ascii_lowercase();
                if !name.is_empty() {
                    self.host_index.entry(name).or_insert_with(|| site_id.clone());
                }
            }
        }
    }
}

/// Thread-safe registry of IdP configurations.
#[derive(Debug, Default)]
pub struct IdpConfigRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    /// Serializes writers; readers only contend with the pointer swap.
    writer: Mutex<()>,
}

impl IdpConfigRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from configuration.
    pub fn from_config(config: &SsoConfig) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for idp in &config.idps {
            registry.save(idp.clone())?;
        }
        if let Some(default_id) = &config.registry.default_idp {
            registry.set_default(default_id)?;
        }
        registry.disable(config.registry.disabled_sites.iter().cloned());

        tracing::debug!(
            configs = registry.len(),
            default_idp = ?config.registry.default_idp,
            disabled_sites = config.registry.disabled_sites.len(),
            "Initialized IdP configuration registry"
        );
        Ok(registry)
    }

    /// Current state. Holding the snapshot does not block writers.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut RegistrySnapshot) -> R) -> R {
        let _writer = self.writer.lock();
        let mut next = RegistrySnapshot::clone(&self.snapshot());
        let result = f(&mut next);
        *self.snapshot.write() = Arc::new(next);
        result
    }

    pub fn resolve(&self, site_id: &str) -> Result<Arc<IdpConfig>, SamlError> {
        self.snapshot().resolve(site_id)
    }

    /// Resolve by request host (port ignored, case-insensitive).
    pub fn resolve_host(&self, host: &str) -> Result<Arc<IdpConfig>, SamlError> {
        let snapshot = self.snapshot();
        snapshot.resolve(&snapshot.site_for_host(host))
    }

    pub fn set_default(&self, id: &str) -> Result<(), RegistryError> {
        self.update(|s| {
            if !s.configs.contains_key(id) {
                return Err(RegistryError::UnknownConfig(id.to_string()));
            }
            s.default_id = Some(id.to_string());
            Ok(())
        })?;
        tracing::info!(idp_id = %id, "Set default IdP configuration");
        Ok(())
    }

    pub fn clear_default(&self) {
        if let Some(previous) = self.update(|s| s.default_id.take()) {
            tracing::info!(idp_id = %previous, "Cleared default IdP configuration");
        }
    }

    pub fn default_id(&self) -> Option<String> {
        self.snapshot().default_id.clone()
    }

    pub fn is_disabled(&self, site_id: &str) -> bool {
        self.snapshot().is_disabled(site_id)
    }

    /// Suppress SSO for the given sites.
    pub fn disable(&self, sites: impl IntoIterator<Item = impl Into<String>>) {
        self.update(|s| s.disabled_sites.extend(sites.into_iter().map(Into::into)));
    }

    pub fn enable(&self, sites: impl IntoIterator<Item = impl AsRef<str>>) {
        self.update(|s| {
            for site in sites {
                s.disabled_sites.remove(site.as_ref());
            }
        });
    }

    /// Disabled sites, sorted.
    pub fn disabled_sites(&self) -> Vec<String> {
        let mut sites: Vec<_> = self.snapshot().disabled_sites.iter().cloned().collect();
        sites.sort();
        sites
    }

    /// Insert or replace a configuration.
    ///
    /// A site belongs to at most one configuration; sites claimed here are
    /// removed from whichever configuration held them before.
    pub fn save(&self, config: IdpConfig) -> Result<(), RegistryError> {
        if config.id.trim().is_empty() {
            return Err(RegistryError::InvalidConfig(
                "configuration id must not be empty".to_string(),
            ));
        }

        self.update(|s| {
            for (other_id, other) in s.configs.iter_mut() {
                if *other_id == config.id {
                    continue;
                }
                let taken: Vec<String> = other
                    .sites
                    .keys()
                    .filter(|site| config.sites.contains_key(*site))
                    .cloned()
                    .collect();
                if taken.is_empty() {
                    continue;
                }
                tracing::warn!(
                    idp_id = %config.id,
                    previous_idp_id = %other_id,
                    sites = ?taken,
                    "Site mapping moved to another IdP configuration"
                );
                let mut updated = (**other).clone();
                for site in &taken {
                    updated.sites.remove(site);
                }
                *other = Arc::new(updated);
            }
            s.configs.insert(config.id.clone(), Arc::new(config));
            s.reindex();
        });
        Ok(())
    }

    /// Remove a configuration with its site mappings; clears the default if it pointed here.
    pub fn delete(&self, id: &str) -> Option<Arc<IdpConfig>> {
        let removed = self.update(|s| {
            let removed = s.configs.remove(id)?;
            if s.default_id.as_deref() == Some(id) {
                s.default_id = None;
            }
            s.reindex();
            Some(removed)
        });
        if removed.is_some() {
            tracing::info!(idp_id = %id, "Deleted IdP configuration");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<IdpConfig>> {
        self.snapshot().get(id)
    }

    pub fn list(&self) -> Vec<Arc<IdpConfig>> {
        self.snapshot().list()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = match host.strip_prefix('[') {
        // [::1]:8080
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        },
    };
    without_port.to_ascii_lowercase()
}
