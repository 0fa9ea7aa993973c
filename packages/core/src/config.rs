//! Provider configuration: per-provider key/value maps, environment
//! loading with a per-provider prefix, and a configuration fingerprint
//! used to memoize adapter instances.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::model::ProviderDescriptor;

/// Default timeout for network-bound adapter calls, in seconds.
///
/// Every adapter call is bounded; exceeding this is a transient failure,
/// not a hang. Overridable per provider via the `timeout_secs` config key.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for one provider: the subset of key/value pairs the
/// provider's descriptor declares as recognized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    values: BTreeMap<String, String>,
}

impl ProviderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only the keys a descriptor declares as recognized, so one
    /// provider's configuration never bleeds into another's.
    #[must_use]
    pub fn filtered(&self, recognized: &[String]) -> Self {
        Self {
            values: self
                .values
                .iter()
                .filter(|(k, _)| recognized.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Declared-but-absent required keys for a descriptor.
    #[must_use]
    pub fn missing_required(&self, descriptor: &ProviderDescriptor) -> Vec<String> {
        descriptor
            .required_config
            .iter()
            .filter(|key| !self.values.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// SHA-256 over the sorted key/value pairs, hex encoded.
    ///
    /// Two configurations with the same pairs fingerprint identically;
    /// any difference yields a distinct adapter instance in the registry.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.values {
            hasher.update(key.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Configuration for the whole registry: provider name to its config.
#[derive(Debug, Clone, Default)]
pub struct AtlasConfig {
    providers: BTreeMap<String, ProviderConfig>,
}

impl AtlasConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        provider: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.providers
            .entry(provider.into())
            .or_default()
            .set(key, value);
    }

    pub fn insert(&mut self, provider: impl Into<String>, config: ProviderConfig) {
        self.providers.insert(provider.into(), config);
    }

    /// Configuration for one provider; empty if none was supplied.
    #[must_use]
    pub fn for_provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    /// Read provider configuration from the environment, once.
    ///
    /// For each descriptor, each recognized key is looked up as
    /// `<PROVIDER_NAME>_<KEY>` uppercased (e.g. `INSEE_API_KEY`,
    /// `PAPPERS_BASE_URL`). Unrelated variables are ignored. Call this
    /// at startup; the environment is not polled afterwards.
    #[must_use]
    pub fn from_env<'a>(descriptors: impl IntoIterator<Item = &'a ProviderDescriptor>) -> Self {
        let mut config = Self::new();
        for descriptor in descriptors {
            for key in &descriptor.config_keys {
                let var = format!(
                    "{}_{}",
                    descriptor.name.to_ascii_uppercase(),
                    key.to_ascii_uppercase()
                );
                if let Ok(value) = std::env::var(&var) {
                    config.set(descriptor.name.clone(), key.clone(), value);
                }
            }
        }
        config
    }
}
