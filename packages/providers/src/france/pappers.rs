//! Adapter for the Pappers v2 API, a paid French aggregator with
//! documents, officers, beneficial owners and subsidiaries. Requires an
//! API key (`PAPPERS_API_KEY`).

use reqwest::blocking::Client;

use companyatlas_core::config::{ProviderConfig, DEFAULT_TIMEOUT_SECS};
use companyatlas_core::error::{AtlasError, Result};
use companyatlas_core::identifier::IdentifierType;
use companyatlas_core::model::{AddressRole, Capability, ProviderDescriptor};
use companyatlas_core::normalize::{
    AddressBlock, CountryField, DocumentFields, ItemBlock, Mapping, OfficerFields,
    SubsidiaryFields,
};
use companyatlas_core::provider::{Provider, RawRecord, SearchFilters};

use crate::http;

pub const NAME: &str = "pappers";

/// Default API endpoint; overridable via the `base_url` config key.
const API_URL: &str = "https://api.pappers.fr/v2";

const API_KEY_HEADER: &str = "X-Api-Key";

const DEFAULT_PAGE_SIZE: usize = 20;

pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(NAME, "Pappers", "europe", "FR")
        .with_capabilities(&[
            Capability::SearchByName,
            Capability::SearchByReference,
            Capability::GetDocuments,
            Capability::GetOfficers,
            Capability::GetBeneficialOwners,
            Capability::GetSubsidiaries,
        ])
        .with_config_keys(&["api_key", "base_url", "timeout_secs"], &["api_key"])
        .with_priority(50)
        .with_urls("https://www.pappers.fr/api/documentation", "https://www.pappers.fr")
}

/// Field mapping for an `/entreprise` payload (search hits use the same
/// field names).
pub const MAPPING: Mapping = Mapping {
    name: &["/nom_entreprise", "/denomination"],
    country: CountryField::Fixed("FR"),
    identifiers: &[
        (IdentifierType::Siren, "/siren"),
        (IdentifierType::Vat, "/numero_tva_intracommunautaire"),
    ],
    date_format: "%Y-%m-%d",
    addresses: &[AddressBlock {
        items: "/siege",
        role: AddressRole::RegisteredOffice,
        street: &["/adresse_ligne_1"],
        city: "/ville",
        postal_code: "/code_postal",
        country: None,
        valid_from: None,
        valid_to: None,
    }],
    documents: Some(ItemBlock {
        items: "/publications_bodacc",
        fields: DocumentFields {
            document_type: "/type",
            issue_date: "/date",
            url: "/lien_annonce",
        },
    }),
    officers: Some(ItemBlock {
        items: "/representants",
        fields: OfficerFields {
            name_parts: &["/prenom", "/nom"],
            role: "/qualite",
            ownership_share: None,
        },
    }),
    beneficial_owners: Some(ItemBlock {
        items: "/beneficiaires_effectifs",
        fields: OfficerFields {
            name_parts: &["/prenom", "/nom"],
            role: "/qualite",
            ownership_share: Some("/pourcentage_parts"),
        },
    }),
    subsidiaries: Some(ItemBlock {
        items: "/filiales",
        fields: SubsidiaryFields {
            child_identifier: "/siren",
            ownership_percentage: Some("/pourcentage"),
            role: None,
            default_role: "subsidiary",
        },
    }),
    events: None,
};

pub struct PappersProvider {
    descriptor: ProviderDescriptor,
    client: Client,
    base_url: String,
    api_key: String,
}

impl PappersProvider {
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

    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = [(API_KEY_HEADER, self.api_key.as_str())];
        http::get_json(&self.client, NAME, &url, query, &headers)
    }

    /// Full company sheet; the carrier payload for every item fetch.
    fn entreprise(&self, identifier: &str) -> Result<serde_json::Value> {
        self.get("/entreprise", &[("siren", identifier.to_string())])
    }
}

impl Provider for PappersProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &MAPPING
    }

    fn search_by_name(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RawRecord>> {
        let per_page = filters.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut params = vec![
            ("q", query.to_string()),
            ("curseur", "*".to_string()),
            ("par_page", per_page.to_string()),
        ];
        if let Some(postal_code) = &filters.postal_code {
            params.push(("code_postal", postal_code.clone()));
        }
        let payload = self.get("/recherche", &params)?;
        let results = payload
            .pointer("/resultats")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|item| RawRecord::new(NAME, item))
            .collect())
    }

    fn search_by_reference(&self, identifier: &str, id_type: IdentifierType) -> Result<RawRecord> {
        if id_type != IdentifierType::Siren {
            tracing::debug!(provider = NAME, %id_type, "Identifier kind not indexed by this source");
            return Err(AtlasError::NotFound);
        }
        self.entreprise(identifier)
            .map(|payload| RawRecord::new(NAME, payload))
    }

    fn get_documents(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.entreprise(identifier)
            .map(|payload| vec![RawRecord::new(NAME, payload)])
    }

    fn get_officers(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.entreprise(identifier)
            .map(|payload| vec![RawRecord::new(NAME, payload)])
    }

    fn get_beneficial_owners(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.entreprise(identifier)
            .map(|payload| vec![RawRecord::new(NAME, payload)])
    }

    fn get_subsidiaries(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.entreprise(identifier)
            .map(|payload| vec![RawRecord::new(NAME, payload)])
    }
}
