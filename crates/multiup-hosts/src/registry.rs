use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    Figment,
    providers::{Format, Toml},
};
use tracing::{debug, warn};

use crate::descriptor::HostDescriptor;
use crate::entry::HostEntry;
use crate::error::{HostError, Result};

/// The built-in host catalogue, layered under any user overrides.
pub const BUILTIN_HOSTS: &str = include_str!("builtin.toml");

/// Read-only set of validated host descriptors, keyed by host id.
///
/// Entries that fail validation are kept out of the registry and reported
/// through [`HostRegistry::rejected`] instead of failing the whole load.
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: BTreeMap<String, HostDescriptor>,
    rejected: Vec<HostError>,
}

impl HostRegistry {
    /// Registry with only the built-in catalogue.
    pub fn builtin() -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(BUILTIN_HOSTS)))
    }

    /// Built-in catalogue with an optional user override file merged on top.
    ///
    /// Overrides are merged key by key, so a user file can re-point a single
    /// endpoint or disable a host without restating the whole descriptor.
    pub fn load(overrides: Option<&Path>) -> Result<Self> {
        let mut fig = Figment::new().merge(Toml::string(BUILTIN_HOSTS));
        if let Some(path) = overrides {
            debug!(path = %path.display(), "layering host overrides");
            fig = fig.merge(Toml::file(path));
        }
        Self::from_figment(fig)
    }

    /// Registry built from a standalone TOML document with a `[hosts]` table.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(src)))
    }

    pub fn from_figment(fig: Figment) -> Result<Self> {
        let raw: BTreeMap<String, toml::Value> = fig.extract_inner("hosts")?;

        let mut registry = Self::default();
        for (id, value) in raw {
            let parsed = value
                .try_into::<HostEntry>()
                .map_err(|e| HostError::invalid(&id, e.to_string()))
                .and_then(|entry| entry.into_descriptor(&id));

            match parsed {
                Ok(descriptor) => {
                    registry.hosts.insert(id, descriptor);
                }
                Err(e) => {
                    warn!(host = %id, error = %e, "rejecting host descriptor");
                    registry.rejected.push(e);
                }
            }
        }

        debug!(
            loaded = registry.hosts.len(),
            rejected = registry.rejected.len(),
            "host registry ready"
        );
        Ok(registry)
    }

    /// Look up a descriptor by id, enabled or not.
    pub fn get(&self, id: &str) -> Result<&HostDescriptor> {
        self.hosts
            .get(id)
            .ok_or_else(|| HostError::NotFound(id.to_string()))
    }

    /// Every enabled descriptor, in id order.
    pub fn list_enabled(&self) -> Vec<&HostDescriptor> {
        self.hosts.values().filter(|h| h.enabled).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostDescriptor> {
        self.hosts.values()
    }

    pub fn rejected(&self) -> &[HostError] {
        &self.rejected
    }

    /// Add or replace a descriptor. Intended for embedding callers and tests
    /// that build descriptors in code.
    pub fn insert(&mut self, descriptor: HostDescriptor) {
        self.hosts.insert(descriptor.id.clone(), descriptor);
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AuthKind, ProtocolShape};

    #[test]
    fn builtin_catalogue_is_valid() {
        let registry = HostRegistry::builtin().unwrap();
        assert!(registry.rejected().is_empty(), "{:?}", registry.rejected());
        assert_eq!(registry.len(), 4);

        let kinds: Vec<_> = registry.iter().map(|h| (h.auth_kind, h.protocol)).collect();
        assert!(kinds.contains(&(AuthKind::ApiKey, ProtocolShape::SingleStep)));
        assert!(kinds.contains(&(AuthKind::TokenLogin, ProtocolShape::MultiStepWithPolling)));
        assert!(kinds.contains(&(AuthKind::SessionLogin, ProtocolShape::SingleStep)));
        assert!(kinds.contains(&(AuthKind::ApiKey, ProtocolShape::MultiStep)));
    }

    #[test]
    fn builtin_token_login_host_has_ttl() {
        let registry = HostRegistry::builtin().unwrap();
        let rg = registry.get("rapidgator").unwrap();
        assert_eq!(rg.token_ttl, 7200);
        assert!(rg.send_hash);
        assert!(rg.verifies_hash);
    }

    #[test]
    fn unknown_host_is_not_found() {
        let registry = HostRegistry::builtin().unwrap();
        assert!(matches!(registry.get("nope"), Err(HostError::NotFound(id)) if id == "nope"));
    }
}
