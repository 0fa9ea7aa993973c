//! Adapter for BODACC (Bulletin Officiel des Annonces Civiles et
//! Commerciales), served through the opendatasoft explore API. Free, no
//! API key; the document and event source for French companies.

use reqwest::blocking::Client;

use companyatlas_core::config::{ProviderConfig, DEFAULT_TIMEOUT_SECS};
use companyatlas_core::error::Result;
use companyatlas_core::identifier::{self, IdentifierType};
use companyatlas_core::model::{Capability, ProviderDescriptor};
use companyatlas_core::normalize::{CountryField, DocumentFields, EventFields, ItemBlock, Mapping};
use companyatlas_core::provider::{Provider, RawRecord};

use crate::http;

pub const NAME: &str = "bodacc";

/// Default API endpoint; overridable via the `base_url` config key.
const API_URL: &str = "https://bodacc-datadila.opendatasoft.com/api/explore/v2.1";

/// Dataset holding the commercial announcements.
const DATASET: &str = "annonces-commerciales";

/// Announcements fetched per request.
const PAGE_SIZE: usize = 100;

pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(NAME, "BODACC", "europe", "FR")
        .with_capabilities(&[Capability::GetDocuments, Capability::GetEvents])
        .with_config_keys(&["base_url", "timeout_secs"], &[])
        .with_priority(80)
        .with_urls("https://www.data.gouv.fr/fr/datasets/bodacc/", "https://www.bodacc.fr")
}

/// Field mapping for the explore-API response (`results[]`).
pub const MAPPING: Mapping = Mapping {
    // BODACC carries announcements, not company sheets; the name
    // pointer only matters for the item blocks below.
    name: &["/commercant"],
    country: CountryField::Fixed("FR"),
    identifiers: &[],
    date_format: "%Y-%m-%d",
    addresses: &[],
    documents: Some(ItemBlock {
        items: "/results",
        fields: DocumentFields {
            document_type: "/familleavis_lib",
            issue_date: "/dateparution",
            url: "/url_complete",
        },
    }),
    officers: None,
    beneficial_owners: None,
    subsidiaries: None,
    events: Some(ItemBlock {
        items: "/results",
        fields: EventFields {
            event_type: "/typeavis_lib",
            date: "/dateparution",
            description: Some("/commercant"),
        },
    }),
};

pub struct BodaccProvider {
    descriptor: ProviderDescriptor,
    client: Client,
    base_url: String,
}

impl BodaccProvider {
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

    /// Announcements for a SIREN, newest first. Identifier kinds BODACC
    /// does not register yield an empty response.
    fn announcements(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        if !identifier::matches_format(IdentifierType::Siren, identifier) {
            tracing::debug!(provider = NAME, "BODACC only registers SIREN identifiers");
            return Ok(Vec::new());
        }
        let url = format!("{}/catalog/datasets/{}/records", self.base_url, DATASET);
        let params = [
            ("where", format!("registre LIKE \"{identifier}\"")),
            ("order_by", "dateparution desc".to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        let payload = http::get_json(&self.client, NAME, &url, &params, &[])?;
        Ok(vec![RawRecord::new(NAME, payload)])
    }
}

impl Provider for BodaccProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn mapping(&self) -> &Mapping {
        &MAPPING
    }

    fn get_documents(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.announcements(identifier)
    }

    fn get_events(&self, identifier: &str) -> Result<Vec<RawRecord>> {
        self.announcements(identifier)
    }
}
