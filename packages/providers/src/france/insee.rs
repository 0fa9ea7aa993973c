//! Adapter for the INSEE Sirene 3.11 API, the official French company
//! register. Requires an API key (`INSEE_API_KEY`).

use reqwest::blocking::Client;

use companyatlas_core::config::{ProviderConfig, DEFAULT_TIMEOUT_SECS};
use companyatlas_core::error::{AtlasError, Result};
use companyatlas_core::identifier::IdentifierType;
use companyatlas_core::model::{AddressRole, Capability, ProviderDescriptor};
use companyatlas_core::normalize::{AddressBlock, CountryField, Mapping};
use companyatlas_core::provider::{Provider, RawRecord, SearchFilters};

use crate::http;

pub const NAME: &str = "insee";

/// Default API endpoint; overridable via the `base_url` config key.
const API_URL: &str = "https://api.insee.fr/api-sirene/3.11";

/// Header carrying the portal API key.
const API_KEY_HEADER: &str = "X-INSEE-Api-Key-Integration";

const DEFAULT_PAGE_SIZE: usize = 20;

pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(NAME, "INSEE Sirene", "europe", "FR")
        .with_capabilities(&[
            Capability::SearchByName,
            Capability::SearchByReference,
            Capability::GetAddresses,
        ])
        .with_config_keys(&["api_key", "base_url", "timeout_secs"], &["api_key"])
        .with_priority(90)
        .with_urls("https://portail-api.insee.fr", "https://www.insee.fr")
}

/// Field mapping for an `etablissements[]` entry of the siret endpoint.
pub const MAPPING: Mapping = Mapping {
    name: &[
        "/uniteLegale/denominationUniteLegale",
        "/uniteLegale/nomUniteLegale",
    ],
    country: CountryField::Fixed("FR"),
    identifiers: &[
        (IdentifierType::Siren, "/siren"),
        (IdentifierType::Siret, "/siret"),
    ],
    date_format: "%Y-%m-%d",
    addresses: &[AddressBlock {
        items: "/adresseEtablissement",
        role: AddressRole::RegisteredOffice,
        street: &[
            "/numeroVoieEtablissement",
            "/typeVoieEtablissement",
            "/libelleVoieEtablissement",
        ],
        city: "/libelleCommuneEtablissement",
        postal_code: "/codePostalEtablissement",
        country: None,
        valid_from: None,
        valid_to: None,
    }],
    documents: None,
    officers: None,
    beneficial_owners: None,
    subsidiaries: None,
    events: None,
};

#[derive(Debug)]
pub struct InseeProvider {
    descriptor: ProviderDescriptor,
    client: Client,
    base_url: String,
    api_key: String,
}

impl InseeProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .get("api_key")
            .ok_or_else(|| AtlasError::MisconfiguredProvider {
                provider: NAME.to_string(),
                missing: vec!["api_key".to_string()],
            })?
            .to_string();
        let timeout = config
            .get("timeout_secs")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            descriptor: descriptor(),
            client: http::create_client(NAME, timeout)?,
            base_url: config.get("base_url").unwrap_or(API_URL).to_string(),
            api_key,
        })
    }

    /// Run a Sirene query and return the `etablissements` array.
    fn query_siret(&self, q: String, count: usize) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/siret", self.base_url);
        let params = [
            ("q", q),
            ("nombre", count.to_string()),
            ("debut", "0".to_string()),
            ("masquerValeursNulles", "true".to_string()),
        ];
        let headers = [
            ("Accept", "application/json"),
            (API_KEY_HEADER, self.api_key.as_str()),
        ];
        let payload = http::get_json(&self.client, NAME, &url, &params, &headers)?;
        Ok(payload
            .pointer("/etablissements")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Sirene query term for a reference lookup, restricted to the
    /// head-office establishment of an active legal unit.
    fn reference_query(identifier: &str, id_type: IdentifierType) -> Option<String> {
        let field = match id_type {
            IdentifierType::Siren => "siren",
            IdentifierType::Siret => "siret",
            IdentifierType::Rna => "identifiantAssociationUniteLegale",
            _ => return None,
        };
        Some(format!(
            "{field}:{identifier} AND etablissementSiege:true AND etatAdministratifUniteLegale:A"
        ))
    }
}

impl Provider for InseeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &MAPPING
    }

    fn search_by_name(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        let count = filters.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut q = format!("denominationUniteLegale:\"{}\"", query.replace('"', ""));
        if filters.active_only {
            q.push_str(" AND etatAdministratifUniteLegale:A");
        }
        if let Some(postal_code) = &filters.postal_code {
            q.push_str(&format!(" AND codePostalEtablissement:{postal_code}"));
        }
        let results = self.query_siret(q, count)?;
        Ok(results
            .into_iter()
            .map(|item| RawRecord::new(NAME, item))
            .collect())
    }

    fn search_by_reference(&self, identifier: &str, id_type: IdentifierType) -> Result<RawRecord> {
        let Some(q) = Self::reference_query(identifier, id_type) else {
            tracing::debug!(provider = NAME, %id_type, "Identifier kind not indexed by this source");
            return Err(AtlasError::NotFound);
        };
        let mut results = self.query_siret(q, 1)?;
        if results.is_empty() {
            return Err(AtlasError::NotFound);
        }
        Ok(RawRecord::new(NAME, results.remove(0)))
    }

    fn get_addresses(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        // All establishments of the legal unit, head office included.
        let q = format!("siren:{identifier}");
        let results = self.query_siret(q, 100)?;
        Ok(results
            .into_iter()
            .map(|item| RawRecord::new(NAME, item))
            .collect())
    }
}
