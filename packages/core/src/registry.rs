//! Provider registry: registration, capability queries and resolution.
//!
//! The registry is constructed once per process at startup, is immutable
//! afterwards, and is passed by reference to the dispatcher rather than
//! living as ambient global state. Adapters are constructed lazily on
//! first use and memoized by `(provider_name, config_fingerprint)`, so
//! re-resolution with different configuration yields a new instance
//! instead of mutating a shared one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{AtlasConfig, ProviderConfig};
use crate::error::Result;
use crate::model::{Capability, ProviderDescriptor};
use crate::provider::Provider;

/// Constructs an adapter from its (filtered) configuration.
pub type ProviderFactory = Box<dyn Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync>;

struct Registration {
    descriptor: ProviderDescriptor,
    factory: ProviderFactory,
}

/// Registry of available provider adapters, keyed by
/// `(continent, country, provider_name)`.
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
    config: AtlasConfig,
    instances: Mutex<HashMap<(String, String), Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            registrations: Vec::new(),
            config,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Register an adapter. Call during startup only; the registry is
    /// treated as immutable once dispatching begins.
    pub fn register<F>(&mut self, descriptor: ProviderDescriptor, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.registrations.push(Registration {
            descriptor,
            factory: Box::new(factory),
        });
    }

    /// All registered descriptors, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.registrations.iter().map(|r| &r.descriptor)
    }

    /// Descriptors covering a country, regardless of capability.
    #[must_use]
    pub fn providers_for(&self, country_code: &str) -> Vec<&ProviderDescriptor> {
        self.registrations
            .iter()
            .map(|r| &r.descriptor)
            .filter(|d| d.country_code == country_code)
            .collect()
    }

    /// Capability set of a named provider.
    #[must_use]
    pub fn capabilities_of(&self, name: &str) -> Option<&[Capability]> {
        self.registrations
            .iter()
            .find(|r| r.descriptor.name == name)
            .map(|r| r.descriptor.capabilities.as_slice())
    }

    /// Required configuration keys a provider is missing. Empty means
    /// the provider is resolvable.
    #[must_use]
    pub fn missing_config(&self, descriptor: &ProviderDescriptor) -> Vec<String> {
        self.config
            .for_provider(&descriptor.name)
            .missing_required(descriptor)
    }

    /// Resolve the ranked candidate adapters for a country/capability.
    ///
    /// Candidates are filtered on country, declared capability and
    /// configuration completeness (a provider missing a required key is
    /// excluded entirely, not skipped at call time), then ordered by
    /// descriptor priority, highest first; ties keep registration
    /// order. No matching provider yields an empty sequence, not an
    /// error: the dispatcher decides whether that is fatal.
    #[must_use]
    pub fn resolve(&self, country_code: &str, capability: Capability) -> Vec<Arc<dyn Provider>> {
        let mut eligible: Vec<&Registration> = self
            .registrations
            .iter()
            .filter(|r| r.descriptor.country_code == country_code)
            .filter(|r| r.descriptor.supports(capability))
            .collect();

        eligible.retain(|r| {
            let missing = self.missing_config(&r.descriptor);
            if missing.is_empty() {
                true
            } else {
                tracing::debug!(
                    provider = %r.descriptor.name,
                    ?missing,
                    "Excluding provider with incomplete configuration"
                );
                false
            }
        });

        // Stable sort keeps registration order within equal priorities.
        eligible.sort_by_key(|r| std::cmp::Reverse(r.descriptor.priority));

        eligible
            .into_iter()
            .filter_map(|r| self.instantiate(r))
            .collect()
    }

    /// Lazily construct (or reuse) the adapter for a registration.
    fn instantiate(&self, registration: &Registration) -> Option<Arc<dyn Provider>> {
        let descriptor = &registration.descriptor;
        let config = self
            .config
            .for_provider(&descriptor.name)
            .filtered(&descriptor.config_keys);
        let key = (descriptor.name.clone(), config.fingerprint());

        #[allow(clippy::expect_used)] // Mutex poisoning means a prior panic; propagate it
        let mut instances = self.instances.lock().expect("registry mutex poisoned");
        if let Some(existing) = instances.get(&key) {
            return Some(Arc::clone(existing));
        }

        match (registration.factory)(&config) {
            Ok(provider) => {
                let provider: Arc<dyn Provider> = Arc::from(provider);
                instances.insert(key, Arc::clone(&provider));
                Some(provider)
            }
            Err(e) => {
                tracing::warn!(
                    provider = %descriptor.name,
                    error = %e,
                    "Provider construction failed; excluding from candidates"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use serde_json::json;

    fn fixture_payload() -> serde_json::Value {
        json!({
            "name": "DANONE",
            "country_code": "FR",
            "identifiers": {"siren": "552032534"}
        })
    }

    fn register_static(
        registry: &mut ProviderRegistry,
        name: &'static str,
        priority: i32,
        capabilities: &'static [Capability],
        required_config: &[&str],
    ) {
        let descriptor = ProviderDescriptor::new(name, name, "static", "FR")
            .with_capabilities(capabilities)
            .with_config_keys(required_config, required_config)
            .with_priority(priority);
        registry.register(descriptor, move |_config| {
            Ok(Box::new(
                StaticProvider::new(name, "FR", priority)
                    .with_capabilities(capabilities)
                    .with_record(fixture_payload()),
            ))
        });
    }

    #[test]
    fn test_resolve_filters_by_capability() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(
            &mut registry,
            "with_docs",
            0,
            &[Capability::SearchByReference, Capability::GetDocuments],
            &[],
        );
        register_static(
            &mut registry,
            "search_only",
            0,
            &[Capability::SearchByReference],
            &[],
        );

        let candidates = registry.resolve("FR", Capability::GetDocuments);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].descriptor().name, "with_docs");
    }

    #[test]
    fn test_resolve_orders_by_priority() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(&mut registry, "paid", 10, &[Capability::SearchByReference], &[]);
        register_static(&mut registry, "official", 100, &[Capability::SearchByReference], &[]);

        let candidates = registry.resolve("FR", Capability::SearchByReference);
        let names: Vec<&str> = candidates
            .iter()
            .map(|c| c.descriptor().name.as_str())
            .collect();
        assert_eq!(names, vec!["official", "paid"]);
    }

    #[test]
    fn test_resolve_excludes_missing_required_config() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(
            &mut registry,
            "needs_key",
            0,
            &[Capability::SearchByReference],
            &["api_key"],
        );

        assert!(registry.resolve("FR", Capability::SearchByReference).is_empty());
    }

    #[test]
    fn test_resolve_includes_configured_provider() {
        let mut config = AtlasConfig::new();
        config.set("needs_key", "api_key", "secret");
        let mut registry = ProviderRegistry::new(config);
        register_static(
            &mut registry,
            "needs_key",
            0,
            &[Capability::SearchByReference],
            &["api_key"],
        );

        assert_eq!(registry.resolve("FR", Capability::SearchByReference).len(), 1);
    }

    #[test]
    fn test_resolve_unknown_country_is_empty_not_error() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(&mut registry, "fr_only", 0, &[Capability::SearchByReference], &[]);
        assert!(registry.resolve("DE", Capability::SearchByReference).is_empty());
    }

    #[test]
    fn test_instances_are_memoized() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(&mut registry, "memo", 0, &[Capability::SearchByReference], &[]);

        let first = registry.resolve("FR", Capability::SearchByReference);
        let second = registry.resolve("FR", Capability::SearchByReference);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    #[test]
    fn test_capability_queries() {
        let mut registry = ProviderRegistry::new(AtlasConfig::new());
        register_static(
            &mut registry,
            "q",
            0,
            &[Capability::SearchByName, Capability::GetOfficers],
            &[],
        );
        assert_eq!(registry.providers_for("FR").len(), 1);
        assert!(registry.providers_for("GB").is_empty());
        let caps = registry.capabilities_of("q").unwrap();
        assert!(caps.contains(&Capability::GetOfficers));
        assert!(registry.capabilities_of("absent").is_none());
    }
}
