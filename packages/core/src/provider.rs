//! The provider capability contract.
//!
//! A provider is anything implementing the declared operation
//! signatures: a descriptor plus a set of operation implementations,
//! selected via composition rather than a class hierarchy. Operations
//! an adapter does not declare fall through to default bodies that fail
//! with `UnsupportedOperation`; the registry filters by capability
//! before dispatch, so those defaults should never be reached in a
//! correctly wired process.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{AtlasError, Result};
use crate::identifier::{self, IdentifierType};
use crate::model::{AddressRole, Capability, ProviderDescriptor};
use crate::normalize::{
    AddressBlock, CountryField, DocumentFields, EventFields, ItemBlock, Mapping, OfficerFields,
    SubsidiaryFields,
};

/// A raw provider payload, tagged with the provider that produced it.
/// Native response shapes never leak past normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub provider: String,
    pub payload: Value,
}

impl RawRecord {
    pub fn new(provider: impl Into<String>, payload: Value) -> Self {
        Self {
            provider: provider.into(),
            payload,
        }
    }
}

/// Optional filters for name searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Maximum number of results to request from the source.
    pub limit: Option<usize>,
    /// Only return companies still administratively active.
    pub active_only: bool,
    /// Restrict to a postal code, where the source supports it.
    pub postal_code: Option<String>,
}

fn unsupported(descriptor: &ProviderDescriptor, capability: Capability) -> AtlasError {
    AtlasError::UnsupportedOperation {
        provider: descriptor.name.clone(),
        capability,
    }
}

/// The fixed operation surface every adapter exposes.
///
/// Adapters own their retry policy and must translate source-specific
/// failures into the shared taxonomy before returning.
pub trait Provider: Send + Sync {
    /// Static metadata for this adapter.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Field mapping used to normalize this adapter's payloads.
    fn mapping(&self) -> &Mapping;

    fn search_by_name(&self, _query: &str, _filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::SearchByName))
    }

    fn search_by_reference(
        &self,
        _identifier: &str,
        _id_type: IdentifierType,
    ) -> Result<RawRecord> {
        Err(unsupported(self.descriptor(), Capability::SearchByReference))
    }

    fn get_documents(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetDocuments))
    }

    fn get_addresses(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetAddresses))
    }

    fn get_subsidiaries(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetSubsidiaries))
    }

    fn get_officers(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetOfficers))
    }

    fn get_beneficial_owners(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetBeneficialOwners))
    }

    fn get_events(&self, _identifier: &str) -> Result<Vec<RawRecord>> {
        Err(unsupported(self.descriptor(), Capability::GetEvents))
    }
}

/// Mapping for [`StaticProvider`] payloads, which already use the
/// canonical field names.
pub const NATIVE_MAPPING: Mapping = Mapping {
    name: &["/name"],
    country: CountryField::Pointer("/country_code"),
    identifiers: &[
        (IdentifierType::Siren, "/identifiers/siren"),
        (IdentifierType::Siret, "/identifiers/siret"),
        (IdentifierType::Rna, "/identifiers/rna"),
        (IdentifierType::Vat, "/identifiers/vat"),
        (IdentifierType::Crn, "/identifiers/crn"),
        (IdentifierType::Ein, "/identifiers/ein"),
    ],
    date_format: "%Y-%m-%d",
    addresses: &[AddressBlock {
        items: "/addresses",
        role: AddressRole::RegisteredOffice,
        street: &["/street"],
        city: "/city",
        postal_code: "/postal_code",
        country: Some("/country"),
        valid_from: Some("/valid_from"),
        valid_to: Some("/valid_to"),
    }],
    documents: Some(ItemBlock {
        items: "/documents",
        fields: DocumentFields {
            document_type: "/document_type",
            issue_date: "/issue_date",
            url: "/url",
        },
    }),
    officers: Some(ItemBlock {
        items: "/officers",
        fields: OfficerFields {
            name_parts: &["/name"],
            role: "/role",
            ownership_share: Some("/ownership_share"),
        },
    }),
    beneficial_owners: Some(ItemBlock {
        items: "/beneficial_owners",
        fields: OfficerFields {
            name_parts: &["/name"],
            role: "/role",
            ownership_share: Some("/ownership_share"),
        },
    }),
    subsidiaries: Some(ItemBlock {
        items: "/subsidiaries",
        fields: SubsidiaryFields {
            child_identifier: "/child_identifier",
            ownership_percentage: Some("/ownership_percentage"),
            role: Some("/role"),
            default_role: "subsidiary",
        },
    }),
    events: Some(ItemBlock {
        items: "/events",
        fields: EventFields {
            event_type: "/event_type",
            date: "/date",
            description: Some("/description"),
        },
    }),
};

/// In-memory provider over canned company payloads, keyed by identifier.
///
/// Serves offline fixtures and tests; payloads use the canonical field
/// names so [`NATIVE_MAPPING`] applies. Deterministic: the same query
/// always yields the same payload.
pub struct StaticProvider {
    descriptor: ProviderDescriptor,
    /// identifier (canonicalized) -> company payload
    records: HashMap<String, Value>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, country_code: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        let descriptor = ProviderDescriptor::new(
            name.clone(),
            name.clone(),
            "static",
            country_code,
        )
        .with_capabilities(&[
            Capability::SearchByName,
            Capability::SearchByReference,
            Capability::GetDocuments,
            Capability::GetAddresses,
            Capability::GetSubsidiaries,
            Capability::GetOfficers,
            Capability::GetBeneficialOwners,
            Capability::GetEvents,
        ])
        .with_priority(priority);
        Self {
            descriptor,
            records: HashMap::new(),
        }
    }

    /// Restrict the declared capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.descriptor.capabilities = capabilities.to_vec();
        self
    }

    /// Add a company payload, indexed under every identifier it carries.
    #[must_use]
    pub fn with_record(mut self, payload: Value) -> Self {
        if let Some(identifiers) = payload.pointer("/identifiers").and_then(Value::as_object) {
            let keys: Vec<String> = identifiers
                .values()
                .filter_map(Value::as_str)
                .map(identifier::canonicalize)
                .collect();
            for key in keys {
                self.records.insert(key, payload.clone());
            }
        }
        self
    }

    fn find(&self, identifier: &str) -> Option<&Value> {
        self.records.get(&identifier::canonicalize(identifier))
    }

    fn raw(&self, payload: &Value) -> RawRecord {
        RawRecord::new(self.descriptor.name.clone(), payload.clone())
    }
}

impl Provider for StaticProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &NATIVE_MAPPING
    }

    fn search_by_name(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        let needle = query.to_lowercase();
        let mut seen: Vec<&Value> = Vec::new();
        for payload in self.records.values() {
            let matches = payload
                .pointer("/name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if matches && !seen.contains(&payload) {
                seen.push(payload);
            }
        }
        // Stable output order regardless of HashMap iteration.
        seen.sort_by_key(|payload| {
            payload
                .pointer("/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
        if let Some(limit) = filters.limit {
            seen.truncate(limit);
        }
        Ok(seen.into_iter().map(|p| self.raw(p)).collect())
    }

    fn search_by_reference(&self, identifier: &str, _id_type: IdentifierType) -> Result<RawRecord> {
        self.find(identifier)
            .map(|p| self.raw(p))
            .ok_or(AtlasError::NotFound)
    }

    fn get_documents(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }

    fn get_addresses(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }

    fn get_subsidiaries(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }

    fn get_officers(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }

    fn get_beneficial_owners(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }

    fn get_events(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        Ok(self.find(identifier).map(|p| self.raw(p)).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> StaticProvider {
        StaticProvider::new("fixtures", "FR", 10).with_record(json!({
            "name": "DANONE",
            "country_code": "FR",
            "identifiers": {"siren": "552032534"},
            "documents": [
                {"document_type": "bodacc_a", "issue_date": "2024-03-01", "url": "https://example.org/1"}
            ]
        }))
    }

    #[test]
    fn test_search_by_reference_hits() {
        let provider = sample();
        let raw = provider
            .search_by_reference("552 032 534", IdentifierType::Siren)
            .unwrap();
        assert_eq!(raw.provider, "fixtures");
        assert_eq!(raw.payload.pointer("/name").and_then(Value::as_str), Some("DANONE"));
    }

    #[test]
    fn test_search_by_reference_not_found() {
        let provider = sample();
        assert!(matches!(
            provider.search_by_reference("552008443", IdentifierType::Siren),
            Err(AtlasError::NotFound)
        ));
    }

    #[test]
    fn test_search_by_name_filters_and_limits() {
        let provider = StaticProvider::new("fixtures", "FR", 10)
            .with_record(json!({
                "name": "ATELIER BLEU",
                "country_code": "FR",
                "identifiers": {"siren": "552032534"}
            }))
            .with_record(json!({
                "name": "ATELIER ROUGE",
                "country_code": "FR",
                "identifiers": {"siren": "552008443"}
            }));
        let all = provider
            .search_by_name("atelier", &SearchFilters::default())
            .unwrap();
        assert_eq!(all.len(), 2);

        let limited = provider
            .search_by_name(
                "atelier",
                &SearchFilters {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_undeclared_operation_is_unsupported() {
        struct Bare(ProviderDescriptor);
        impl Provider for Bare {
            fn descriptor(&self) -> &ProviderDescriptor {
                &self.0
            }
            fn mapping(&self) -> &Mapping {
                &NATIVE_MAPPING
            }
        }
        let bare = Bare(ProviderDescriptor::new("bare", "Bare", "static", "FR"));
        let err = bare.get_documents("552032534").unwrap_err();
        assert!(matches!(err, AtlasError::UnsupportedOperation { .. }));
        assert!(err.to_string().contains("get_documents"));
    }

    #[test]
    fn test_item_fetch_for_unknown_identifier_is_empty() {
        let provider = sample();
        assert!(provider.get_documents("552008443").unwrap().is_empty());
    }
}
