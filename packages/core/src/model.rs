//! Canonical data model for company-registry data.
//!
//! Every adapter's heterogeneous response is mapped into these types;
//! they are the sole data shape crossing the boundary back to callers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identifier::IdentifierType;

/// Named operations an adapter may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SearchByName,
    SearchByReference,
    GetDocuments,
    GetAddresses,
    GetSubsidiaries,
    GetOfficers,
    GetBeneficialOwners,
    GetEvents,
}

impl Capability {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchByName => "search_by_name",
            Self::SearchByReference => "search_by_reference",
            Self::GetDocuments => "get_documents",
            Self::GetAddresses => "get_addresses",
            Self::GetSubsidiaries => "get_subsidiaries",
            Self::GetOfficers => "get_officers",
            Self::GetBeneficialOwners => "get_beneficial_owners",
            Self::GetEvents => "get_events",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an address within a company record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    Headquarters,
    Branch,
    RegisteredOffice,
    Historical,
}

/// A postal address attached to a company record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub role: AddressRole,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<NaiveDate>,
}

/// A parent/child ownership link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsidiary {
    pub child_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership_percentage: Option<f64>,
    pub role: String,
}

/// An official document or publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_type: String,
    pub issue_date: NaiveDate,
    pub url: String,
}

impl Document {
    /// Key used to deduplicate documents across providers.
    #[must_use]
    pub fn dedup_key(&self) -> (String, NaiveDate, String) {
        (self.document_type.clone(), self.issue_date, self.url.clone())
    }
}

/// A person or entity with a role in the company (officer or ultimate
/// beneficial owner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership_share: Option<f64>,
}

/// A registry event (status change, capital change, dissolution, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEvent {
    pub event_type: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Which provider produced a record, for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSource {
    pub provider: String,
}

/// The normalized company record every adapter response is mapped into.
///
/// The list fields are always present: an empty sequence means the
/// source was queried and returned nothing, which is distinct from a
/// source never having been asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub country_code: String,
    #[serde(default)]
    pub identifiers: BTreeMap<IdentifierType, String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub subsidiaries: Vec<Subsidiary>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub officers: Vec<Officer>,
    #[serde(default)]
    pub beneficial_owners: Vec<Officer>,
    #[serde(default)]
    pub events: Vec<CompanyEvent>,
    pub source: RawSource,
}

/// Static per-adapter metadata. Constructed once at registry
/// initialization and never mutated during a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Machine name, also the environment-variable prefix (uppercased).
    pub name: String,
    /// Human-friendly name for terminal output.
    pub display_name: String,
    /// Continent grouping (e.g. "europe"), mirroring the source layout.
    pub continent: String,
    /// ISO 3166-1 alpha-2 country the provider covers.
    pub country_code: String,
    /// Operations this adapter implements.
    pub capabilities: Vec<Capability>,
    /// Configuration keys the adapter recognizes (used to filter the
    /// supplied configuration).
    pub config_keys: Vec<String>,
    /// Subset of `config_keys` that must be present for the provider to
    /// be resolvable at all.
    pub required_config: Vec<String>,
    /// Resolution priority: higher is tried first. Free official
    /// registries sit above paid aggregators.
    pub priority: i32,
    pub documentation_url: Option<String>,
    pub site_url: Option<String>,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        continent: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            continent: continent.into(),
            country_code: country_code.into(),
            capabilities: Vec::new(),
            config_keys: Vec::new(),
            required_config: Vec::new(),
            priority: 0,
            documentation_url: None,
            site_url: None,
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    #[must_use]
    pub fn with_config_keys(mut self, recognized: &[&str], required: &[&str]) -> Self {
        self.config_keys = recognized.iter().map(|s| (*s).to_string()).collect();
        self.required_config = required.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_urls(mut self, documentation: &str, site: &str) -> Self {
        self.documentation_url = Some(documentation.to_string());
        self.site_url = Some(site.to_string());
        self
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// ISO 3166-1 alpha-2 assigned codes.
const ISO_ALPHA2: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX",
    "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ",
    "BR", "BS", "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK",
    "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR",
    "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS",
    "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN",
    "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV",
    "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ",
    "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI",
    "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM",
    "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW", "SA", "SB", "SC",
    "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS", "ST", "SV",
    "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR",
    "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Check whether a string is an assigned ISO 3166-1 alpha-2 code.
#[must_use]
pub fn is_valid_country_code(code: &str) -> bool {
    code.len() == 2
        && code.bytes().all(|b| b.is_ascii_uppercase())
        && ISO_ALPHA2.binary_search(&code).is_ok()
}
