//! Adapter for the recherche-entreprises API (annuaire-entreprises,
//! data.gouv.fr). Free official source, no API key, highest priority
//! among the French providers.

use reqwest::blocking::Client;

use companyatlas_core::config::{ProviderConfig, DEFAULT_TIMEOUT_SECS};
use companyatlas_core::error::{AtlasError, Result};
use companyatlas_core::identifier::IdentifierType;
use companyatlas_core::model::{AddressRole, Capability, ProviderDescriptor};
use companyatlas_core::normalize::{AddressBlock, CountryField, ItemBlock, Mapping, OfficerFields};
use companyatlas_core::provider::{Provider, RawRecord, SearchFilters};

use crate::http;

pub const NAME: &str = "recherche_entreprises";

/// Default API endpoint; overridable via the `base_url` config key.
const API_URL: &str = "https://recherche-entreprises.api.gouv.fr";

/// Default result page size, matching the API's own default.
const DEFAULT_PAGE_SIZE: usize = 20;

pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(NAME, "Annuaire des Entreprises", "europe", "FR")
        .with_capabilities(&[
            Capability::SearchByName,
            Capability::SearchByReference,
            Capability::GetAddresses,
            Capability::GetOfficers,
        ])
        .with_config_keys(&["base_url", "timeout_secs"], &[])
        .with_priority(100)
        .with_urls(
            "https://recherche-entreprises.api.gouv.fr/docs",
            "https://annuaire-entreprises.data.gouv.fr",
        )
}

/// Field mapping for a `results[]` entry of the search endpoint.
pub const MAPPING: Mapping = Mapping {
    name: &["/nom_complet", "/nom_raison_sociale"],
    country: CountryField::Fixed("FR"),
    identifiers: &[
        (IdentifierType::Siren, "/siren"),
        (IdentifierType::Siret, "/siege/siret"),
    ],
    date_format: "%Y-%m-%d",
    addresses: &[
        AddressBlock {
            items: "/siege",
            role: AddressRole::RegisteredOffice,
            street: &[
                "/numero_voie",
                "/type_voie",
                "/libelle_voie",
            ],
            city: "/libelle_commune",
            postal_code: "/code_postal",
            country: None,
            valid_from: None,
            valid_to: None,
        },
        AddressBlock {
            items: "/matching_etablissements",
            role: AddressRole::Branch,
            street: &["/adresse"],
            city: "/libelle_commune",
            postal_code: "/code_postal",
            country: None,
            valid_from: None,
            valid_to: None,
        },
    ],
    documents: None,
    officers: Some(ItemBlock {
        items: "/dirigeants",
        fields: OfficerFields {
            name_parts: &["/prenoms", "/nom"],
            role: "/qualite",
            ownership_share: None,
        },
    }),
    beneficial_owners: None,
    subsidiaries: None,
    events: None,
};

pub struct RechercheEntreprisesProvider {
    descriptor: ProviderDescriptor,
    client: Client,
    base_url: String,
}

impl RechercheEntreprisesProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let timeout = config
            .get("timeout_secs")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            descriptor: descriptor(),
            client: http::create_client(NAME, timeout)?,
            base_url: config.get("base_url").unwrap_or(API_URL).to_string(),
        })
    }

    fn search(&self, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}/search", self.base_url);
        http::get_json(&self.client, NAME, &url, query, &[])
    }

    /// First search hit for an identifier-based operation.
    fn find_by_identifier(&self, identifier: &str) -> Result<serde_json::Value> {
        let payload = self.search(&[
            ("q", identifier.to_string()),
            ("page", "1".to_string()),
            ("per_page", "1".to_string()),
        ])?;
        payload
            .pointer("/results/0")
            .cloned()
            .ok_or(AtlasError::NotFound)
    }
}

impl Provider for RechercheEntreprisesProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &MAPPING
    }

    fn search_by_name(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        let per_page = filters.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(25);
        let mut params = vec![
            ("q", query.to_string()),
            ("page", "1".to_string()),
            ("per_page", per_page.to_string()),
        ];
        if filters.active_only {
            params.push(("etat_administratif", "A".to_string()));
        }
        if let Some(postal_code) = &filters.postal_code {
            params.push(("code_postal", postal_code.clone()));
        }
        let payload = self.search(&params)?;
        let results = payload
            .pointer("/results")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|item| RawRecord::new(NAME, item))
            .collect())
    }

    fn search_by_reference(&self, identifier: &str, id_type: IdentifierType) -> Result<RawRecord> {
        if !matches!(id_type, IdentifierType::Siren | IdentifierType::Siret) {
            tracing::debug!(provider = NAME, %id_type, "Identifier kind not indexed by this source");
            return Err(AtlasError::NotFound);
        }
        self.find_by_identifier(identifier)
            .map(|item| RawRecord::new(NAME, item))
    }

    fn get_addresses(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.find_by_identifier(identifier)
            .map(|item| vec![RawRecord::new(NAME, item)])
    }

    fn get_officers(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.find_by_identifier(identifier)
            .map(|item| vec![RawRecord::new(NAME, item)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companyatlas_core::normalize;
    use serde_json::json;

    #[test]
    fn test_descriptor_needs_no_configuration() {
        let d = descriptor();
        assert!(d.required_config.is_empty());
        assert!(d.supports(Capability::SearchByName));
        assert!(!d.supports(Capability::GetDocuments));
    }

    #[test]
    fn test_mapping_normalizes_search_hit() {
        let raw = RawRecord::new(
            NAME,
            json!({
                "nom_complet": "DANONE",
                "siren": "552032534",
                "siege": {
                    "siret": "55203253400042",
                    "numero_voie": "17",
                    "type_voie": "BD",
                    "libelle_voie": "HAUSSMANN",
                    "libelle_commune": "PARIS",
                    "code_postal": "75009"
                },
                "dirigeants": [
                    {"prenoms": "Antoine", "nom": "RIBOUD", "qualite": "President"}
                ]
            }),
        );
        let record = normalize::normalize(&raw, &MAPPING, &descriptor()).unwrap();
        assert_eq!(record.name, "DANONE");
        assert_eq!(record.country_code, "FR");
        assert_eq!(record.addresses.len(), 1);
        assert_eq!(record.addresses[0].street, "17 BD HAUSSMANN");
        assert_eq!(record.officers.len(), 1);
        assert_eq!(record.officers[0].name, "Antoine RIBOUD");
    }
}
