//! Identifier validation and classification.
//!
//! Classifies a raw identifier string against a country's known formats
//! (9-digit SIREN, 14-digit SIRET, W-prefixed RNA, ...) without any
//! network access. Runs before any provider is invoked, so an invalid
//! identifier never consumes quota on a doomed request.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Country-specific identifier formats this crate can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    /// French company identifier, 9 digits with a Luhn checksum.
    Siren,
    /// French establishment identifier, 14 digits with a Luhn checksum.
    Siret,
    /// French association identifier, `W` followed by 8 digits.
    Rna,
    /// EU VAT number (French form: `FR` + 2 characters + 9 digits).
    Vat,
    /// UK company registration number, 8 digits or 2 letters + 6 digits.
    Crn,
    /// US employer identification number, 9 digits.
    Ein,
}

impl IdentifierType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Siren => "siren",
            Self::Siret => "siret",
            Self::Rna => "rna",
            Self::Vat => "vat",
            Self::Crn => "crn",
            Self::Ein => "ein",
        }
    }

    /// The country whose registry issues this identifier format.
    #[must_use]
    pub fn country_code(&self) -> &'static str {
        match self {
            Self::Siren | Self::Siret | Self::Rna | Self::Vat => "FR",
            Self::Crn => "GB",
            Self::Ein => "US",
        }
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip spaces and hyphens and uppercase, the way registries print
/// identifiers ("552 032 534", "12-3456789").
#[must_use]
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Luhn checksum over a digit string.
fn luhn_valid(digits: &str) -> bool {
    let mut total = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        let mut n = d;
        if i % 2 == 1 {
            n *= 2;
            if n > 9 {
                n -= 9;
            }
        }
        total += n;
    }
    total % 10 == 0
}

/// RNA pattern: W followed by 8 digits.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RNA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^W\d{8}$").expect("valid regex"));

/// French VAT pattern: FR + 2-character key + 9-digit SIREN.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static FR_VAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FR[0-9A-Z]{2}\d{9}$").expect("valid regex"));

/// CRN pattern: 8 digits, or a 2-letter prefix (SC, NI, OC, ...) + 6 digits.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CRN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8}|[A-Z]{2}\d{6})$").expect("valid regex"));

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_siren(s: &str) -> bool {
    s.len() == 9 && all_digits(s) && luhn_valid(s)
}

fn is_siret(s: &str) -> bool {
    s.len() == 14 && all_digits(s) && luhn_valid(s)
}

fn is_rna(s: &str) -> bool {
    RNA_PATTERN.is_match(s)
}

fn is_fr_vat(s: &str) -> bool {
    FR_VAT_PATTERN.is_match(s)
}

fn is_crn(s: &str) -> bool {
    CRN_PATTERN.is_match(s)
}

fn is_ein(s: &str) -> bool {
    s.len() == 9 && all_digits(s)
}

type FormatRule = (IdentifierType, fn(&str) -> bool);

const FR_RULES: &[FormatRule] = &[
    (IdentifierType::Siren, is_siren),
    (IdentifierType::Siret, is_siret),
    (IdentifierType::Rna, is_rna),
    (IdentifierType::Vat, is_fr_vat),
];

const GB_RULES: &[FormatRule] = &[(IdentifierType::Crn, is_crn)];

const US_RULES: &[FormatRule] = &[(IdentifierType::Ein, is_ein)];

const ALL_RULES: &[(&str, &[FormatRule])] = &[("FR", FR_RULES), ("GB", GB_RULES), ("US", US_RULES)];

/// Countries with a known identifier rule set.
#[must_use]
pub fn supported_countries() -> Vec<&'static str> {
    ALL_RULES.iter().map(|(c, _)| *c).collect()
}

fn rules_for(country_code: &str) -> Option<&'static [FormatRule]> {
    ALL_RULES
        .iter()
        .find(|(c, _)| *c == country_code)
        .map(|(_, rules)| *rules)
}

/// Classify a raw identifier against known formats.
///
/// With a country code, the identifier is matched against that
/// country's rules only. Without one, classification succeeds only when
/// the identifier matches exactly one format across all countries;
/// matching more than one fails with [`AtlasError::AmbiguousIdentifier`]
/// rather than guessing.
///
/// # Examples
/// ```
/// use companyatlas_core::identifier::{classify, IdentifierType};
///
/// assert_eq!(classify("552 032 534", Some("FR")).unwrap(), IdentifierType::Siren);
/// assert_eq!(classify("W12345678", None).unwrap(), IdentifierType::Rna);
/// // 9 Luhn-valid digits are a SIREN in France and an EIN in the US:
/// assert!(classify("552032534", None).is_err());
/// ```
pub fn classify(raw: &str, country_code: Option<&str>) -> Result<IdentifierType> {
    let cleaned = canonicalize(raw);
    if cleaned.is_empty() || !cleaned.is_ascii() {
        return Err(AtlasError::InvalidIdentifier(raw.to_string()));
    }

    if let Some(country) = country_code {
        let rules =
            rules_for(country).ok_or_else(|| AtlasError::InvalidIdentifier(raw.to_string()))?;
        return rules
            .iter()
            .find(|(_, matches)| matches(&cleaned))
            .map(|(id_type, _)| *id_type)
            .ok_or_else(|| AtlasError::InvalidIdentifier(raw.to_string()));
    }

    let mut matches: Vec<IdentifierType> = Vec::new();
    for (_, rules) in ALL_RULES {
        for (id_type, rule) in *rules {
            if rule(&cleaned) && !matches.contains(id_type) {
                matches.push(*id_type);
            }
        }
    }

    match matches.len() {
        0 => Err(AtlasError::InvalidIdentifier(raw.to_string())),
        1 => Ok(matches[0]),
        _ => Err(AtlasError::AmbiguousIdentifier {
            identifier: raw.to_string(),
            matches: matches.iter().map(|m| m.as_str().to_string()).collect(),
        }),
    }
}

/// Check a value against one specific identifier format.
///
/// Used by the normalizer to reject upstream payloads carrying malformed
/// identifiers before they reach a canonical record.
#[must_use]
pub fn matches_format(id_type: IdentifierType, raw: &str) -> bool {
    let cleaned = canonicalize(raw);
    if !cleaned.is_ascii() {
        return false;
    }
    let rule: fn(&str) -> bool = match id_type {
        IdentifierType::Siren => is_siren,
        IdentifierType::Siret => is_siret,
        IdentifierType::Rna => is_rna,
        IdentifierType::Vat => is_fr_vat,
        IdentifierType::Crn => is_crn,
        IdentifierType::Ein => is_ein,
    };
    rule(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // 552032534 and 552008443 carry valid Luhn checksums; 123456789 does not.

    #[test]
    fn test_classify_siren_with_country() {
        assert_eq!(classify("552032534", Some("FR")).unwrap(), IdentifierType::Siren);
        assert_eq!(classify("552 032 534", Some("FR")).unwrap(), IdentifierType::Siren);
        assert_eq!(classify("552-008-443", Some("FR")).unwrap(), IdentifierType::Siren);
    }

    #[test]
    fn test_classify_rejects_wrong_digit_count() {
        for bad in ["55203253", "5520325341", "", "5520325340004"] {
            assert!(
                matches!(classify(bad, Some("FR")), Err(AtlasError::InvalidIdentifier(_))),
                "expected InvalidIdentifier for {bad:?}"
            );
        }
    }

    #[test]
    fn test_classify_rejects_failed_checksum() {
        assert!(matches!(
            classify("123456789", Some("FR")),
            Err(AtlasError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_classify_siret() {
        assert_eq!(
            classify("55203253400042", Some("FR")).unwrap(),
            IdentifierType::Siret
        );
    }

    #[test]
    fn test_classify_rna() {
        assert_eq!(classify("W12345678", Some("FR")).unwrap(), IdentifierType::Rna);
        assert_eq!(classify("w12345678", None).unwrap(), IdentifierType::Rna);
    }

    #[test]
    fn test_classify_vat() {
        assert_eq!(classify("FR40552032534", Some("FR")).unwrap(), IdentifierType::Vat);
    }

    #[test]
    fn test_classify_crn() {
        assert_eq!(classify("01234567", Some("GB")).unwrap(), IdentifierType::Crn);
        assert_eq!(classify("SC123456", Some("GB")).unwrap(), IdentifierType::Crn);
    }

    #[test]
    fn test_classify_ein() {
        assert_eq!(classify("12-3456789", Some("US")).unwrap(), IdentifierType::Ein);
        // Fails the SIREN checksum, so the EIN reading is the only match.
        assert_eq!(classify("123456789", None).unwrap(), IdentifierType::Ein);
    }

    #[test]
    fn test_ambiguous_without_country() {
        // Luhn-valid 9 digits: SIREN (FR) and EIN (US) both match.
        let err = classify("552032534", None).unwrap_err();
        match err {
            AtlasError::AmbiguousIdentifier { matches, .. } => {
                assert!(matches.contains(&"siren".to_string()));
                assert!(matches.contains(&"ein".to_string()));
            }
            other => panic!("expected AmbiguousIdentifier, got {other}"),
        }
    }

    #[test]
    fn test_unambiguous_without_country() {
        assert_eq!(classify("W12345678", None).unwrap(), IdentifierType::Rna);
        assert_eq!(classify("SC123456", None).unwrap(), IdentifierType::Crn);
        assert_eq!(classify("55203253400042", None).unwrap(), IdentifierType::Siret);
    }

    #[test]
    fn test_unknown_country() {
        assert!(matches!(
            classify("552032534", Some("DE")),
            Err(AtlasError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_matches_format() {
        assert!(matches_format(IdentifierType::Siren, "552032534"));
        assert!(!matches_format(IdentifierType::Siren, "123456789"));
        assert!(matches_format(IdentifierType::Ein, "123456789"));
        assert!(!matches_format(IdentifierType::Crn, "1234567"));
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize(" 552 032-534 "), "552032534");
        assert_eq!(canonicalize("w 1234-5678"), "W12345678");
    }
}
