//! Normalization of raw provider payloads into canonical records.
//!
//! Each adapter declares a [`Mapping`]: an explicit table of JSON
//! pointers describing where in its payload the canonical fields live,
//! plus a fixed date format. Normalization is a pure function over
//! `(payload, mapping, descriptor)` with no I/O and no retries; it is
//! the single place where field-name and unit inconsistencies across
//! sources are resolved.

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{AtlasError, Result};
use crate::identifier::{self, IdentifierType};
use crate::model::{
    Address, AddressRole, CompanyEvent, CompanyRecord, Document, Officer, ProviderDescriptor,
    RawSource, Subsidiary,
};
use crate::provider::RawRecord;

/// Where the record's country code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryField {
    /// The provider covers exactly one country; use it verbatim.
    Fixed(&'static str),
    /// Read the code from the payload.
    Pointer(&'static str),
}

/// One address list in the payload, mapped to a fixed role.
///
/// `items` may point at an array (one address per element) or at a
/// single object (exactly one address); an empty pointer means the
/// payload itself. A pointer that does not resolve yields no addresses.
#[derive(Debug, Clone, Copy)]
pub struct AddressBlock {
    pub items: &'static str,
    pub role: AddressRole,
    /// Street parts joined with a space, skipping absent fields
    /// (registries split house number, way type and way name).
    pub street: &'static [&'static str],
    pub city: &'static str,
    pub postal_code: &'static str,
    /// Country override; defaults to the record's country.
    pub country: Option<&'static str>,
    pub valid_from: Option<&'static str>,
    pub valid_to: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentFields {
    pub document_type: &'static str,
    pub issue_date: &'static str,
    pub url: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct OfficerFields {
    /// Name parts joined with a space ("prenom" + "nom").
    pub name_parts: &'static [&'static str],
    pub role: &'static str,
    pub ownership_share: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubsidiaryFields {
    pub child_identifier: &'static str,
    pub ownership_percentage: Option<&'static str>,
    /// Role pointer; `default_role` is used when absent.
    pub role: Option<&'static str>,
    pub default_role: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct EventFields {
    pub event_type: &'static str,
    pub date: &'static str,
    pub description: Option<&'static str>,
}

/// A list of items inside the payload plus the per-item field pointers.
#[derive(Debug, Clone, Copy)]
pub struct ItemBlock<F: 'static> {
    pub items: &'static str,
    pub fields: F,
}

/// Explicit per-provider field mapping. Declared as a `const` next to
/// each adapter; no implicit coercion happens beyond what is listed
/// here (string-to-date with `date_format`, number-to-string for
/// identifier values).
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    /// Fallback chain for the company name; first non-empty wins.
    pub name: &'static [&'static str],
    pub country: CountryField,
    pub identifiers: &'static [(IdentifierType, &'static str)],
    /// Fixed chrono format for every date this source emits.
    pub date_format: &'static str,
    pub addresses: &'static [AddressBlock],
    pub documents: Option<ItemBlock<DocumentFields>>,
    pub officers: Option<ItemBlock<OfficerFields>>,
    pub beneficial_owners: Option<ItemBlock<OfficerFields>>,
    pub subsidiaries: Option<ItemBlock<SubsidiaryFields>>,
    pub events: Option<ItemBlock<EventFields>>,
}

impl Mapping {
    /// A mapping with no optional blocks, for adapters that only search.
    #[must_use]
    pub const fn minimal(
        name: &'static [&'static str],
        country: CountryField,
        identifiers: &'static [(IdentifierType, &'static str)],
        date_format: &'static str,
    ) -> Self {
        Self {
            name,
            country,
            identifiers,
            date_format,
            addresses: &[],
            documents: None,
            officers: None,
            beneficial_owners: None,
            subsidiaries: None,
            events: None,
        }
    }
}

fn fail(descriptor: &ProviderDescriptor, reason: impl Into<String>) -> AtlasError {
    AtlasError::NormalizationError {
        provider: descriptor.name.clone(),
        reason: reason.into(),
    }
}

fn resolve<'v>(value: &'v Value, ptr: &str) -> Option<&'v Value> {
    if ptr.is_empty() {
        Some(value)
    } else {
        value.pointer(ptr)
    }
}

/// A scalar rendered as a string: strings pass through trimmed,
/// numbers are printed (registries disagree on quoting SIREN values).
fn scalar_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pointer_str(value: &Value, ptr: &str) -> Option<String> {
    resolve(value, ptr).and_then(scalar_str)
}

fn pointer_f64(value: &Value, ptr: &str) -> Option<f64> {
    match resolve(value, ptr)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_nonempty(value: &Value, ptrs: &[&str]) -> Option<String> {
    ptrs.iter().find_map(|ptr| pointer_str(value, ptr))
}

fn join_parts(value: &Value, ptrs: &[&str]) -> String {
    let parts: Vec<String> = ptrs
        .iter()
        .filter_map(|ptr| pointer_str(value, ptr))
        .collect();
    parts.join(" ")
}

/// Items addressed by a block pointer: an array yields its elements, a
/// lone object yields itself, anything else yields nothing.
fn items_at<'v>(value: &'v Value, ptr: &str) -> Vec<&'v Value> {
    match resolve(value, ptr) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

fn parse_date(raw: &str, format: &str, descriptor: &ProviderDescriptor) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, format)
        .map_err(|_| fail(descriptor, format!("unparseable date '{raw}' (expected {format})")))
}

fn address_from(
    item: &Value,
    block: &AddressBlock,
    record_country: &str,
    date_format: &str,
    descriptor: &ProviderDescriptor,
) -> Result<Address> {
    let valid_from = match block.valid_from.and_then(|ptr| pointer_str(item, ptr)) {
        Some(raw) => Some(parse_date(&raw, date_format, descriptor)?),
        None => None,
    };
    let valid_to = match block.valid_to.and_then(|ptr| pointer_str(item, ptr)) {
        Some(raw) => Some(parse_date(&raw, date_format, descriptor)?),
        None => None,
    };
    Ok(Address {
        role: block.role,
        street: join_parts(item, block.street),
        city: pointer_str(item, block.city).unwrap_or_default(),
        postal_code: pointer_str(item, block.postal_code).unwrap_or_default(),
        country: block
            .country
            .and_then(|ptr| pointer_str(item, ptr))
            .unwrap_or_else(|| record_country.to_string()),
        valid_from,
        valid_to,
    })
}

fn document_from(
    item: &Value,
    fields: &DocumentFields,
    date_format: &str,
    descriptor: &ProviderDescriptor,
) -> Result<Document> {
    let document_type = pointer_str(item, fields.document_type)
        .ok_or_else(|| fail(descriptor, "document without a type"))?;
    let raw_date = pointer_str(item, fields.issue_date)
        .ok_or_else(|| fail(descriptor, "document without an issue date"))?;
    Ok(Document {
        document_type,
        issue_date: parse_date(&raw_date, date_format, descriptor)?,
        url: pointer_str(item, fields.url).unwrap_or_default(),
    })
}

fn officer_from(
    item: &Value,
    fields: &OfficerFields,
    descriptor: &ProviderDescriptor,
) -> Result<Officer> {
    let name = join_parts(item, fields.name_parts);
    if name.is_empty() {
        return Err(fail(descriptor, "officer without a name"));
    }
    Ok(Officer {
        name,
        role: pointer_str(item, fields.role).unwrap_or_default(),
        ownership_share: fields
            .ownership_share
            .and_then(|ptr| pointer_f64(item, ptr)),
    })
}

fn subsidiary_from(
    item: &Value,
    fields: &SubsidiaryFields,
    descriptor: &ProviderDescriptor,
) -> Result<Subsidiary> {
    let child_identifier = pointer_str(item, fields.child_identifier)
        .ok_or_else(|| fail(descriptor, "subsidiary without an identifier"))?;
    Ok(Subsidiary {
        child_identifier,
        ownership_percentage: fields
            .ownership_percentage
            .and_then(|ptr| pointer_f64(item, ptr)),
        role: fields
            .role
            .and_then(|ptr| pointer_str(item, ptr))
            .unwrap_or_else(|| fields.default_role.to_string()),
    })
}

fn event_from(
    item: &Value,
    fields: &EventFields,
    date_format: &str,
    descriptor: &ProviderDescriptor,
) -> Result<CompanyEvent> {
    let event_type = pointer_str(item, fields.event_type)
        .ok_or_else(|| fail(descriptor, "event without a type"))?;
    let raw_date = pointer_str(item, fields.date)
        .ok_or_else(|| fail(descriptor, "event without a date"))?;
    Ok(CompanyEvent {
        event_type,
        date: parse_date(&raw_date, date_format, descriptor)?,
        description: fields.description.and_then(|ptr| pointer_str(item, ptr)),
    })
}

/// Map a raw provider payload into a canonical [`CompanyRecord`].
///
/// A payload missing `name` or a valid country code fails with
/// [`AtlasError::NormalizationError`] rather than producing a partial
/// record; identifier values are validated against their declared
/// format before acceptance. Optional blocks that do not resolve in the
/// payload become empty sequences, never absent fields.
pub fn normalize(
    raw: &RawRecord,
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
) -> Result<CompanyRecord> {
    let payload = &raw.payload;

    let name = first_nonempty(payload, mapping.name)
        .ok_or_else(|| fail(descriptor, "missing required field 'name'"))?;

    let country_code = match mapping.country {
        CountryField::Fixed(code) => code.to_string(),
        CountryField::Pointer(ptr) => pointer_str(payload, ptr)
            .ok_or_else(|| fail(descriptor, "missing required field 'country_code'"))?
            .to_ascii_uppercase(),
    };
    if !crate::model::is_valid_country_code(&country_code) {
        return Err(fail(
            descriptor,
            format!("invalid country code '{country_code}'"),
        ));
    }

    let mut identifiers = std::collections::BTreeMap::new();
    for (id_type, ptr) in mapping.identifiers {
        if let Some(value) = pointer_str(payload, ptr) {
            let cleaned = identifier::canonicalize(&value);
            if !identifier::matches_format(*id_type, &cleaned) {
                return Err(fail(
                    descriptor,
                    format!("identifier '{value}' does not match the {id_type} format"),
                ));
            }
            identifiers.insert(*id_type, cleaned);
        }
    }

    let mut addresses = Vec::new();
    for block in mapping.addresses {
        for item in items_at(payload, block.items) {
            addresses.push(address_from(
                item,
                block,
                &country_code,
                mapping.date_format,
                descriptor,
            )?);
        }
    }

    let mut documents = Vec::new();
    if let Some(block) = &mapping.documents {
        for item in items_at(payload, block.items) {
            documents.push(document_from(
                item,
                &block.fields,
                mapping.date_format,
                descriptor,
            )?);
        }
    }

    let mut officers = Vec::new();
    if let Some(block) = &mapping.officers {
        for item in items_at(payload, block.items) {
            officers.push(officer_from(item, &block.fields, descriptor)?);
        }
    }

    let mut beneficial_owners = Vec::new();
    if let Some(block) = &mapping.beneficial_owners {
        for item in items_at(payload, block.items) {
            beneficial_owners.push(officer_from(item, &block.fields, descriptor)?);
        }
    }

    let mut subsidiaries = Vec::new();
    if let Some(block) = &mapping.subsidiaries {
        for item in items_at(payload, block.items) {
            subsidiaries.push(subsidiary_from(item, &block.fields, descriptor)?);
        }
    }

    let mut events = Vec::new();
    if let Some(block) = &mapping.events {
        for item in items_at(payload, block.items) {
            events.push(event_from(
                item,
                &block.fields,
                mapping.date_format,
                descriptor,
            )?);
        }
    }

    Ok(CompanyRecord {
        name,
        country_code,
        identifiers,
        addresses,
        subsidiaries,
        documents,
        officers,
        beneficial_owners,
        events,
        source: RawSource {
            provider: descriptor.name.clone(),
        },
    })
}

/// Normalize the payloads of a document fetch.
pub fn normalize_documents(
    raws: &[RawRecord],
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
) -> Result<Vec<Document>> {
    let block = mapping
        .documents
        .as_ref()
        .ok_or_else(|| fail(descriptor, "no document mapping declared"))?;
    let mut out = Vec::new();
    for raw in raws {
        for item in items_at(&raw.payload, block.items) {
            out.push(document_from(
                item,
                &block.fields,
                mapping.date_format,
                descriptor,
            )?);
        }
    }
    Ok(out)
}

/// Normalize the payloads of an address fetch.
pub fn normalize_addresses(
    raws: &[RawRecord],
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
) -> Result<Vec<Address>> {
    let mut out = Vec::new();
    let record_country = match mapping.country {
        CountryField::Fixed(code) => code.to_string(),
        CountryField::Pointer(_) => descriptor.country_code.clone(),
    };
    for raw in raws {
        for block in mapping.addresses {
            for item in items_at(&raw.payload, block.items) {
                out.push(address_from(
                    item,
                    block,
                    &record_country,
                    mapping.date_format,
                    descriptor,
                )?);
            }
        }
    }
    Ok(out)
}

/// Normalize the payloads of an officers or beneficial-owners fetch.
pub fn normalize_officers(
    raws: &[RawRecord],
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
    beneficial: bool,
) -> Result<Vec<Officer>> {
    let block = if beneficial {
        mapping.beneficial_owners.as_ref()
    } else {
        mapping.officers.as_ref()
    }
    .ok_or_else(|| fail(descriptor, "no officer mapping declared"))?;
    let mut out = Vec::new();
    for raw in raws {
        for item in items_at(&raw.payload, block.items) {
            out.push(officer_from(item, &block.fields, descriptor)?);
        }
    }
    Ok(out)
}

/// Normalize the payloads of a subsidiaries fetch.
pub fn normalize_subsidiaries(
    raws: &[RawRecord],
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
) -> Result<Vec<Subsidiary>> {
    let block = mapping
        .subsidiaries
        .as_ref()
        .ok_or_else(|| fail(descriptor, "no subsidiary mapping declared"))?;
    let mut out = Vec::new();
    for raw in raws {
        for item in items_at(&raw.payload, block.items) {
            out.push(subsidiary_from(item, &block.fields, descriptor)?);
        }
    }
    Ok(out)
}

/// Normalize the payloads of an events fetch.
pub fn normalize_events(
    raws: &[RawRecord],
    mapping: &Mapping,
    descriptor: &ProviderDescriptor,
) -> Result<Vec<CompanyEvent>> {
    let block = mapping
        .events
        .as_ref()
        .ok_or_else(|| fail(descriptor, "no event mapping declared"))?;
    let mut out = Vec::new();
    for raw in raws {
        for item in items_at(&raw.payload, block.items) {
            out.push(event_from(
                item,
                &block.fields,
                mapping.date_format,
                descriptor,
            )?);
        }
    }
    Ok(out)
}
