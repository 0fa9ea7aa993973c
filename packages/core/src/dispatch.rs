//! Dispatch and fallback across ranked provider candidates.
//!
//! Single-result operations walk the ranked candidate list sequentially
//! and return the first successful normalized result; transient and
//! not-found failures are absorbed into the fallback loop and only
//! surface, aggregated, once every candidate has failed. Aggregating
//! operations fan out to every capable provider concurrently and report
//! partial failures alongside the data.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::{AtlasError, ProviderFailure, Result};
use crate::identifier::{self, IdentifierType};
use crate::model::{Address, Capability, CompanyEvent, CompanyRecord, Document, Officer, Subsidiary};
use crate::normalize;
use crate::provider::{Provider, SearchFilters};
use crate::registry::ProviderRegistry;

/// Caller-initiated cancellation signal, shared with in-flight dispatch.
///
/// Cancellation is checked before every candidate attempt and before
/// each aggregate worker issues its call; combined with the bounded
/// per-call timeout this means no work outlives the caller by more than
/// one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Dispatch policy knobs.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Try all candidates of a single-result operation in parallel and
    /// keep the highest-priority success. Off by default: speculative
    /// calls trade wasted network cost (and quota) for latency, which
    /// must be an explicit choice.
    pub speculative_parallel: bool,
    /// Cancellation signal shared with the caller.
    pub cancel: CancelToken,
}

/// Result of an aggregating fetch: the concatenated items plus the
/// sources that failed, so partial failure is never silent.
#[derive(Debug, Clone)]
pub struct Aggregate<T> {
    pub items: Vec<T>,
    pub failures: Vec<ProviderFailure>,
}

/// Fallback controller over an immutable [`ProviderRegistry`].
pub struct Dispatcher<'r> {
    registry: &'r ProviderRegistry,
    options: DispatchOptions,
    /// Providers that failed with a configuration error at call time;
    /// skipped for the rest of the process lifetime.
    quarantined: Mutex<HashSet<String>>,
}

impl<'r> Dispatcher<'r> {
    #[must_use]
    pub fn new(registry: &'r ProviderRegistry) -> Self {
        Self::with_options(registry, DispatchOptions::default())
    }

    #[must_use]
    pub fn with_options(registry: &'r ProviderRegistry, options: DispatchOptions) -> Self {
        Self {
            registry,
            options,
            quarantined: Mutex::new(HashSet::new()),
        }
    }

    /// Look up a single company by identifier.
    ///
    /// The identifier is classified before any provider is invoked; an
    /// invalid or ambiguous identifier surfaces immediately without
    /// consuming any provider quota. Without a country code the country
    /// is inferred from the (unambiguous) identifier format.
    pub fn lookup(&self, raw_identifier: &str, country: Option<&str>) -> Result<CompanyRecord> {
        let id_type = identifier::classify(raw_identifier, country)?;
        let country = resolved_country(country, id_type);
        let identifier = identifier::canonicalize(raw_identifier);
        let candidates = self.registry.resolve(&country, Capability::SearchByReference);
        self.first_success(&candidates, &|provider: &dyn Provider| {
            let raw = provider.search_by_reference(&identifier, id_type)?;
            normalize::normalize(&raw, provider.mapping(), provider.descriptor())
        })
    }

    /// Search companies by name in one country. First-success-wins: the
    /// result provenance is a single provider, never a merge.
    pub fn search(
        &self,
        query: &str,
        country: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<CompanyRecord>> {
        let candidates = self.registry.resolve(country, Capability::SearchByName);
        self.first_success(&candidates, &|provider: &dyn Provider| {
            let raws = provider.search_by_name(query, filters)?;
            raws.iter()
                .map(|raw| normalize::normalize(raw, provider.mapping(), provider.descriptor()))
                .collect()
        })
    }

    /// All documents across every capable source, deduplicated by
    /// `(document_type, issue_date, url)`.
    pub fn documents(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<Document>> {
        let mut aggregate = self.fetch_items(raw_identifier, country, Capability::GetDocuments, |provider, id| {
            let raws = provider.get_documents(id)?;
            normalize::normalize_documents(&raws, provider.mapping(), provider.descriptor())
        })?;
        let mut seen = HashSet::new();
        aggregate.items.retain(|d| seen.insert(d.dedup_key()));
        Ok(aggregate)
    }

    /// All known addresses across every capable source.
    pub fn addresses(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<Address>> {
        self.fetch_items(raw_identifier, country, Capability::GetAddresses, |provider, id| {
            let raws = provider.get_addresses(id)?;
            normalize::normalize_addresses(&raws, provider.mapping(), provider.descriptor())
        })
    }

    /// All known subsidiaries across every capable source.
    pub fn subsidiaries(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<Subsidiary>> {
        self.fetch_items(raw_identifier, country, Capability::GetSubsidiaries, |provider, id| {
            let raws = provider.get_subsidiaries(id)?;
            normalize::normalize_subsidiaries(&raws, provider.mapping(), provider.descriptor())
        })
    }

    /// All known officers across every capable source.
    pub fn officers(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<Officer>> {
        self.fetch_items(raw_identifier, country, Capability::GetOfficers, |provider, id| {
            let raws = provider.get_officers(id)?;
            normalize::normalize_officers(&raws, provider.mapping(), provider.descriptor(), false)
        })
    }

    /// All known ultimate beneficial owners across every capable source.
    pub fn beneficial_owners(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<Officer>> {
        self.fetch_items(
            raw_identifier,
            country,
            Capability::GetBeneficialOwners,
            |provider, id| {
                let raws = provider.get_beneficial_owners(id)?;
                normalize::normalize_officers(&raws, provider.mapping(), provider.descriptor(), true)
            },
        )
    }

    /// All registry events across every capable source.
    pub fn events(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
    ) -> Result<Aggregate<CompanyEvent>> {
        self.fetch_items(raw_identifier, country, Capability::GetEvents, |provider, id| {
            let raws = provider.get_events(id)?;
            normalize::normalize_events(&raws, provider.mapping(), provider.descriptor())
        })
    }

    /// Shared validate-resolve-aggregate path for the item fetches.
    fn fetch_items<T, F>(
        &self,
        raw_identifier: &str,
        country: Option<&str>,
        capability: Capability,
        op: F,
    ) -> Result<Aggregate<T>>
    where
        T: Send,
        F: Fn(&dyn Provider, &str) -> Result<Vec<T>> + Sync,
    {
        let id_type = identifier::classify(raw_identifier, country)?;
        let country = resolved_country(country, id_type);
        let identifier = identifier::canonicalize(raw_identifier);
        let candidates = self.registry.resolve(&country, capability);
        self.aggregate(&candidates, &|provider: &dyn Provider| op(provider, &identifier))
    }

    fn is_quarantined(&self, name: &str) -> bool {
        #[allow(clippy::expect_used)] // Mutex poisoning means a prior panic; propagate it
        let quarantined = self.quarantined.lock().expect("quarantine mutex poisoned");
        quarantined.contains(name)
    }

    fn quarantine(&self, name: &str) {
        #[allow(clippy::expect_used)] // Mutex poisoning means a prior panic; propagate it
        let mut quarantined = self.quarantined.lock().expect("quarantine mutex poisoned");
        quarantined.insert(name.to_string());
    }

    /// Record a failure and quarantine the provider if it reported a
    /// configuration problem at call time.
    fn note_failure(&self, name: &str, error: &AtlasError, attempts: &mut Vec<ProviderFailure>) {
        if matches!(error, AtlasError::MisconfiguredProvider { .. }) {
            tracing::warn!(provider = %name, "Quarantining misconfigured provider for this process");
            self.quarantine(name);
        } else {
            tracing::warn!(provider = %name, error = %error, "Provider failed");
        }
        attempts.push(ProviderFailure::new(name, error));
    }

    /// First-success-wins over the ranked candidates.
    fn first_success<T: Send>(
        &self,
        candidates: &[Arc<dyn Provider>],
        op: &(dyn Fn(&dyn Provider) -> Result<T> + Sync),
    ) -> Result<T> {
        if self.options.speculative_parallel {
            return self.first_success_parallel(candidates, op);
        }

        let mut attempts = Vec::new();
        for provider in candidates {
            if self.options.cancel.is_cancelled() {
                return Err(AtlasError::Cancelled);
            }
            let name = provider.descriptor().name.clone();
            if self.is_quarantined(&name) {
                tracing::debug!(provider = %name, "Skipping quarantined provider");
                continue;
            }
            match op(provider.as_ref()) {
                Ok(value) => return Ok(value),
                Err(AtlasError::Cancelled) => return Err(AtlasError::Cancelled),
                Err(error) => self.note_failure(&name, &error, &mut attempts),
            }
        }
        Err(AtlasError::NoProviderAvailable { attempts })
    }

    /// Speculative mode: every candidate runs concurrently; the winner
    /// is the highest-priority success, keeping results deterministic
    /// regardless of network timing.
    fn first_success_parallel<T: Send>(
        &self,
        candidates: &[Arc<dyn Provider>],
        op: &(dyn Fn(&dyn Provider) -> Result<T> + Sync),
    ) -> Result<T> {
        let active: Vec<&Arc<dyn Provider>> = candidates
            .iter()
            .filter(|p| !self.is_quarantined(&p.descriptor().name))
            .collect();

        let results: Vec<(String, Result<T>)> = thread::scope(|scope| {
            let cancel = &self.options.cancel;
            let handles: Vec<_> = active
                .iter()
                .map(|provider| {
                    let provider = Arc::clone(*provider);
                    scope.spawn(move || {
                        if cancel.is_cancelled() {
                            return Err(AtlasError::Cancelled);
                        }
                        op(provider.as_ref())
                    })
                })
                .collect();
            active
                .iter()
                .zip(handles)
                .map(|(provider, handle)| {
                    let name = provider.descriptor().name.clone();
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(AtlasError::Upstream {
                            provider: name.clone(),
                            message: "provider worker panicked".to_string(),
                        })
                    });
                    (name, result)
                })
                .collect()
        });

        let mut attempts = Vec::new();
        for (name, result) in results {
            match result {
                Ok(value) => return Ok(value),
                Err(AtlasError::Cancelled) => return Err(AtlasError::Cancelled),
                Err(error) => self.note_failure(&name, &error, &mut attempts),
            }
        }
        Err(AtlasError::NoProviderAvailable { attempts })
    }

    /// Fan out to every candidate concurrently and concatenate results
    /// in priority order.
    fn aggregate<T: Send>(
        &self,
        candidates: &[Arc<dyn Provider>],
        op: &(dyn Fn(&dyn Provider) -> Result<Vec<T>> + Sync),
    ) -> Result<Aggregate<T>> {
        if self.options.cancel.is_cancelled() {
            return Err(AtlasError::Cancelled);
        }
        if candidates.is_empty() {
            return Err(AtlasError::NoProviderAvailable { attempts: Vec::new() });
        }

        let active: Vec<&Arc<dyn Provider>> = candidates
            .iter()
            .filter(|p| !self.is_quarantined(&p.descriptor().name))
            .collect();

        let results: Vec<(String, Result<Vec<T>>)> = thread::scope(|scope| {
            let cancel = &self.options.cancel;
            let handles: Vec<_> = active
                .iter()
                .map(|provider| {
                    let provider = Arc::clone(*provider);
                    scope.spawn(move || {
                        if cancel.is_cancelled() {
                            return Err(AtlasError::Cancelled);
                        }
                        op(provider.as_ref())
                    })
                })
                .collect();
            active
                .iter()
                .zip(handles)
                .map(|(provider, handle)| {
                    let name = provider.descriptor().name.clone();
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(AtlasError::Upstream {
                            provider: name.clone(),
                            message: "provider worker panicked".to_string(),
                        })
                    });
                    (name, result)
                })
                .collect()
        });

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(batch) => items.extend(batch),
                Err(AtlasError::Cancelled) => return Err(AtlasError::Cancelled),
                Err(error) => self.note_failure(&name, &error, &mut failures),
            }
        }
        Ok(Aggregate { items, failures })
    }
}

/// The country to dispatch against: the caller's, or the one implied by
/// an unambiguous identifier format.
fn resolved_country(country: Option<&str>, id_type: IdentifierType) -> String {
    country
        .map(str::to_string)
        .unwrap_or_else(|| id_type.country_code().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_resolved_country() {
        assert_eq!(resolved_country(Some("GB"), IdentifierType::Siren), "GB");
        assert_eq!(resolved_country(None, IdentifierType::Siren), "FR");
        assert_eq!(resolved_country(None, IdentifierType::Ein), "US");
    }
}
