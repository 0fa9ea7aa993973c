//! Default registry wiring for the bundled providers.

use companyatlas_core::config::AtlasConfig;
use companyatlas_core::model::ProviderDescriptor;
use companyatlas_core::registry::ProviderRegistry;

use crate::france::{bodacc, insee, pappers, recherche_entreprises};

/// Descriptors of every bundled provider, in priority order.
///
/// This is also the list [`AtlasConfig::from_env`] should be fed to pick
/// up `INSEE_API_KEY`-style variables at startup.
#[must_use]
pub fn default_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        recherche_entreprises::descriptor(),
        insee::descriptor(),
        bodacc::descriptor(),
        pappers::descriptor(),
    ]
}

/// Build the process-wide registry with every bundled provider.
///
/// Constructed once at startup; callers pass it by reference to the
/// dispatcher. Providers missing required configuration stay registered
/// (so they show up in status listings) but are excluded from
/// resolution.
#[must_use]
pub fn default_registry(config: AtlasConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(config);
    registry.register(recherche_entreprises::descriptor(), |config| {
        Ok(Box::new(
            recherche_entreprises::RechercheEntreprisesProvider::from_config(config)?,
        ))
    });
    registry.register(insee::descriptor(), |config| {
        Ok(Box::new(insee::InseeProvider::from_config(config)?))
    });
    registry.register(bodacc::descriptor(), |config| {
        Ok(Box::new(bodacc::BodaccProvider::from_config(config)?))
    });
    registry.register(pappers::descriptor(), |config| {
        Ok(Box::new(pappers::PappersProvider::from_config(config)?))
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use companyatlas_core::model::Capability;

    #[test]
    fn test_keyless_providers_resolve_without_configuration() {
        let registry = default_registry(AtlasConfig::new());
        let searchers = registry.resolve("FR", Capability::SearchByReference);
        // Only the keyless official source resolves out of the box.
        assert_eq!(searchers.len(), 1);
        assert_eq!(searchers[0].descriptor().name, "recherche_entreprises");

        let documenters = registry.resolve("FR", Capability::GetDocuments);
        assert_eq!(documenters.len(), 1);
        assert_eq!(documenters[0].descriptor().name, "bodacc");
    }

    #[test]
    fn test_configured_key_unlocks_provider() {
        let mut config = AtlasConfig::new();
        config.set("insee", "api_key", "test-key");
        let registry = default_registry(config);
        let searchers = registry.resolve("FR", Capability::SearchByReference);
        let names: Vec<&str> = searchers
            .iter()
            .map(|p| p.descriptor().name.as_str())
            .collect();
        assert_eq!(names, vec!["recherche_entreprises", "insee"]);
    }

    #[test]
    fn test_all_descriptors_cover_france() {
        for descriptor in default_descriptors() {
            assert_eq!(descriptor.country_code, "FR");
            assert_eq!(descriptor.continent, "europe");
        }
    }
}
