//! Fallback and aggregation behavior across ranked providers.
//!
//! Uses instrumented in-memory providers to verify the dispatch state
//! machine: first-success-wins, transient skip, quarantine, exhaustion
//! reporting, deduplication and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use companyatlas_core::config::AtlasConfig;
use companyatlas_core::dispatch::{CancelToken, DispatchOptions, Dispatcher};
use companyatlas_core::error::{AtlasError, Result};
use companyatlas_core::identifier::IdentifierType;
use companyatlas_core::model::{Capability, ProviderDescriptor};
use companyatlas_core::normalize::Mapping;
use companyatlas_core::provider::{Provider, RawRecord, SearchFilters, NATIVE_MAPPING};
use companyatlas_core::registry::ProviderRegistry;

/// Danone's SIREN; carries a valid Luhn checksum.
const SIREN: &str = "552032534";

/// What a scripted provider does when called.
#[derive(Clone)]
enum Script {
    Record(serde_json::Value),
    Documents(Vec<serde_json::Value>),
    NotFound,
    RateLimited,
    Timeout,
    Misconfigured,
}

/// Provider that follows a fixed script and counts its invocations.
struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(name: &str, priority: i32, capabilities: &[Capability], script: Script) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(name, name, "static", "FR")
                .with_capabilities(capabilities)
                .with_priority(priority),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn respond(&self) -> Result<RawRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self.descriptor.name.clone();
        match &self.script {
            Script::Record(payload) => Ok(RawRecord::new(name, payload.clone())),
            Script::Documents(_) => Ok(RawRecord::new(
                name,
                json!({"identifiers": {"siren": SIREN}}),
            )),
            Script::NotFound => Err(AtlasError::NotFound),
            Script::RateLimited => Err(AtlasError::RateLimited { provider: name }),
            Script::Timeout => Err(AtlasError::Timeout { provider: name }),
            Script::Misconfigured => Err(AtlasError::MisconfiguredProvider {
                provider: name,
                missing: vec!["api_key".to_string()],
            }),
        }
    }
}

impl Provider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &NATIVE_MAPPING
    }

    fn search_by_reference(&self, _identifier: &str, _id_type: IdentifierType) -> Result<RawRecord> {
        self.respond()
    }

    fn search_by_name(&self, _query: &str, _filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        self.respond().map(|raw| vec![raw])
    }

    fn get_documents(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self.descriptor.name.clone();
        match &self.script {
            Script::Documents(docs) => Ok(vec![RawRecord::new(
                name,
                json!({"documents": docs}),
            )]),
            Script::NotFound => Err(AtlasError::NotFound),
            Script::RateLimited => Err(AtlasError::RateLimited { provider: name }),
            Script::Timeout => Err(AtlasError::Timeout { provider: name }),
            Script::Misconfigured => Err(AtlasError::MisconfiguredProvider {
                provider: name,
                missing: vec!["api_key".to_string()],
            }),
            Script::Record(_) => Ok(Vec::new()),
        }
    }
}

/// Register scripted providers and hand back their call counters.
fn build_registry(
    providers: Vec<ScriptedProvider>,
) -> (ProviderRegistry, Vec<(String, Arc<AtomicUsize>)>) {
    let mut registry = ProviderRegistry::new(AtlasConfig::new());
    let mut counters = Vec::new();
    for provider in providers {
        counters.push((provider.descriptor.name.clone(), Arc::clone(&provider.calls)));
        let descriptor = provider.descriptor.clone();
        let shared = Arc::new(provider);
        registry.register(descriptor, move |_config| {
            Ok(Box::new(SharedProvider(Arc::clone(&shared))))
        });
    }
    (registry, counters)
}

/// Factory-friendly wrapper so one scripted instance (and its counter)
/// survives registry instantiation.
struct SharedProvider(Arc<ScriptedProvider>);

impl Provider for SharedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.0.descriptor()
    }
    fn mapping(&self) -> &Mapping {
        self.0.mapping()
    }
    fn search_by_reference(&self, identifier: &str, id_type: IdentifierType) -> Result<RawRecord> {
        self.0.search_by_reference(identifier, id_type)
    }
    fn search_by_name(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        self.0.search_by_name(query, filters)
    }
    fn get_documents(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.0.get_documents(identifier)
    }
}

fn calls(counters: &[(String, Arc<AtomicUsize>)], name: &str) -> usize {
    counters
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, c)| c.load(Ordering::SeqCst))
        .unwrap_or_else(|| panic!("no counter for {name}"))
}

fn company_payload(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "country_code": "FR",
        "identifiers": {"siren": SIREN}
    })
}

const LOOKUP_CAPS: &[Capability] = &[Capability::SearchByReference];

#[test]
fn first_success_wins_and_later_candidates_are_not_called() {
    let (registry, counters) = build_registry(vec![
        ScriptedProvider::new("first", 30, LOOKUP_CAPS, Script::NotFound),
        ScriptedProvider::new(
            "second",
            20,
            LOOKUP_CAPS,
            Script::Record(company_payload("DANONE")),
        ),
        ScriptedProvider::new(
            "third",
            10,
            LOOKUP_CAPS,
            Script::Record(company_payload("WRONG")),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let record = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    assert_eq!(record.name, "DANONE");
    assert_eq!(record.source.provider, "second");
    assert_eq!(calls(&counters, "first"), 1);
    assert_eq!(calls(&counters, "second"), 1);
    assert_eq!(calls(&counters, "third"), 0, "provider 3 must never be invoked");
}

#[test]
fn exhaustion_reports_every_candidate_failure() {
    let (registry, _) = build_registry(vec![
        ScriptedProvider::new("a", 3, LOOKUP_CAPS, Script::RateLimited),
        ScriptedProvider::new("b", 2, LOOKUP_CAPS, Script::RateLimited),
        ScriptedProvider::new("c", 1, LOOKUP_CAPS, Script::RateLimited),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let err = dispatcher.lookup(SIREN, Some("FR")).unwrap_err();
    match err {
        AtlasError::NoProviderAvailable { attempts } => {
            assert_eq!(attempts.len(), 3);
            let names: Vec<&str> = attempts.iter().map(|a| a.provider.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert!(attempts.iter().all(|a| a.error.contains("Rate limited")));
        }
        other => panic!("expected NoProviderAvailable, got {other}"),
    }
}

#[test]
fn transient_failures_fall_through_to_next_candidate() {
    let (registry, counters) = build_registry(vec![
        ScriptedProvider::new("limited", 30, LOOKUP_CAPS, Script::RateLimited),
        ScriptedProvider::new("slow", 20, LOOKUP_CAPS, Script::Timeout),
        ScriptedProvider::new(
            "works",
            10,
            LOOKUP_CAPS,
            Script::Record(company_payload("DANONE")),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let record = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    assert_eq!(record.source.provider, "works");
    assert_eq!(calls(&counters, "limited"), 1);
    assert_eq!(calls(&counters, "slow"), 1);
}

#[test]
fn normalization_failure_falls_through_like_not_found() {
    let (registry, _) = build_registry(vec![
        // Payload without a name: normalization fails.
        ScriptedProvider::new(
            "broken",
            30,
            LOOKUP_CAPS,
            Script::Record(json!({"identifiers": {"siren": SIREN}})),
        ),
        ScriptedProvider::new(
            "works",
            20,
            LOOKUP_CAPS,
            Script::Record(company_payload("DANONE")),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let record = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    assert_eq!(record.source.provider, "works");
}

#[test]
fn misconfigured_provider_is_quarantined_for_the_process() {
    let (registry, counters) = build_registry(vec![
        ScriptedProvider::new("broken_config", 30, LOOKUP_CAPS, Script::Misconfigured),
        ScriptedProvider::new(
            "works",
            20,
            LOOKUP_CAPS,
            Script::Record(company_payload("DANONE")),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    // First dispatch hits the misconfigured provider once, then falls back.
    assert!(dispatcher.lookup(SIREN, Some("FR")).is_ok());
    assert_eq!(calls(&counters, "broken_config"), 1);

    // Second dispatch skips it entirely.
    assert!(dispatcher.lookup(SIREN, Some("FR")).is_ok());
    assert_eq!(calls(&counters, "broken_config"), 1);
    assert_eq!(calls(&counters, "works"), 2);
}

#[test]
fn invalid_identifier_fails_before_any_provider_call() {
    let (registry, counters) = build_registry(vec![ScriptedProvider::new(
        "works",
        10,
        LOOKUP_CAPS,
        Script::Record(company_payload("DANONE")),
    )]);
    let dispatcher = Dispatcher::new(&registry);

    assert!(matches!(
        dispatcher.lookup("not-a-siren", Some("FR")),
        Err(AtlasError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        dispatcher.lookup(SIREN, None),
        Err(AtlasError::AmbiguousIdentifier { .. })
    ));
    assert_eq!(calls(&counters, "works"), 0);
}

#[test]
fn lookup_is_idempotent() {
    let (registry, _) = build_registry(vec![ScriptedProvider::new(
        "works",
        10,
        LOOKUP_CAPS,
        Script::Record(company_payload("DANONE")),
    )]);
    let dispatcher = Dispatcher::new(&registry);

    let first = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    let second = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn cancelled_dispatch_attempts_no_provider() {
    let (registry, counters) = build_registry(vec![ScriptedProvider::new(
        "works",
        10,
        LOOKUP_CAPS,
        Script::Record(company_payload("DANONE")),
    )]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let dispatcher = Dispatcher::with_options(
        &registry,
        DispatchOptions {
            cancel,
            ..Default::default()
        },
    );

    assert!(matches!(
        dispatcher.lookup(SIREN, Some("FR")),
        Err(AtlasError::Cancelled)
    ));
    assert_eq!(calls(&counters, "works"), 0);
}

#[test]
fn speculative_parallel_prefers_highest_priority_success() {
    let (registry, _) = build_registry(vec![
        ScriptedProvider::new("slowest", 5, LOOKUP_CAPS, Script::NotFound),
        ScriptedProvider::new(
            "official",
            100,
            LOOKUP_CAPS,
            Script::Record(company_payload("OFFICIAL NAME")),
        ),
        ScriptedProvider::new(
            "aggregator",
            10,
            LOOKUP_CAPS,
            Script::Record(company_payload("AGGREGATOR NAME")),
        ),
    ]);
    let dispatcher = Dispatcher::with_options(
        &registry,
        DispatchOptions {
            speculative_parallel: true,
            ..Default::default()
        },
    );

    let record = dispatcher.lookup(SIREN, Some("FR")).unwrap();
    assert_eq!(record.name, "OFFICIAL NAME");
}

#[test]
fn aggregate_documents_deduplicates_across_providers() {
    let overlapping = json!({
        "document_type": "bodacc_a",
        "issue_date": "2024-03-01",
        "url": "https://example.org/shared"
    });
    let unique = json!({
        "document_type": "bodacc_b",
        "issue_date": "2023-11-20",
        "url": "https://example.org/unique"
    });
    let (registry, _) = build_registry(vec![
        ScriptedProvider::new(
            "one",
            20,
            &[Capability::GetDocuments],
            Script::Documents(vec![overlapping.clone(), unique]),
        ),
        ScriptedProvider::new(
            "two",
            10,
            &[Capability::GetDocuments],
            Script::Documents(vec![overlapping]),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let aggregate = dispatcher.documents(SIREN, Some("FR")).unwrap();
    assert_eq!(aggregate.items.len(), 2);
    assert!(aggregate.failures.is_empty());
}

#[test]
fn aggregate_reports_partial_failures_alongside_data() {
    let doc = json!({
        "document_type": "bodacc_a",
        "issue_date": "2024-03-01",
        "url": "https://example.org/1"
    });
    let (registry, _) = build_registry(vec![
        ScriptedProvider::new(
            "healthy",
            20,
            &[Capability::GetDocuments],
            Script::Documents(vec![doc]),
        ),
        ScriptedProvider::new("failing", 10, &[Capability::GetDocuments], Script::RateLimited),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let aggregate = dispatcher.documents(SIREN, Some("FR")).unwrap();
    assert_eq!(aggregate.items.len(), 1);
    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].provider, "failing");
}

#[test]
fn aggregate_without_capable_provider_is_terminal() {
    let (registry, _) = build_registry(vec![ScriptedProvider::new(
        "search_only",
        10,
        LOOKUP_CAPS,
        Script::Record(company_payload("DANONE")),
    )]);
    let dispatcher = Dispatcher::new(&registry);

    assert!(matches!(
        dispatcher.documents(SIREN, Some("FR")),
        Err(AtlasError::NoProviderAvailable { .. })
    ));
}

#[test]
fn search_falls_back_like_lookup() {
    let (registry, counters) = build_registry(vec![
        ScriptedProvider::new("empty", 20, &[Capability::SearchByName], Script::NotFound),
        ScriptedProvider::new(
            "works",
            10,
            &[Capability::SearchByName],
            Script::Record(company_payload("DANONE")),
        ),
    ]);
    let dispatcher = Dispatcher::new(&registry);

    let records = dispatcher
        .search("danone", "FR", &SearchFilters::default())
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "DANONE");
    assert_eq!(calls(&counters, "empty"), 1);
}
