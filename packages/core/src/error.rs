//! Error types for the aggregation core.
//!
//! One shared taxonomy for every provider: adapters translate their
//! source-specific failures into these variants, so the dispatcher never
//! inspects source-specific error shapes.

use thiserror::Error;

use crate::model::Capability;

/// Per-provider failure entry collected during a fallback or aggregate
/// dispatch, surfaced for diagnostics when candidates are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Name of the provider that failed.
    pub provider: String,
    /// Rendered failure reason.
    pub error: String,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, error: &AtlasError) -> Self {
        Self {
            provider: provider.into(),
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Main error type for CompanyAtlas operations.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Identifier does not match any known format (validation-time, no
    /// network attempted).
    #[error("Invalid identifier: '{0}' does not match any known format")]
    InvalidIdentifier(String),

    /// Identifier matches the formats of more than one country; the
    /// caller must supply a country code.
    #[error("Ambiguous identifier: '{identifier}' matches {matches:?}; specify a country code")]
    AmbiguousIdentifier {
        identifier: String,
        matches: Vec<String>,
    },

    /// Source queried, no match. Not fatal to the overall dispatch.
    #[error("Not found")]
    NotFound,

    /// Upstream returned 429 or otherwise throttled us. Transient.
    #[error("Rate limited by provider '{provider}'")]
    RateLimited { provider: String },

    /// Request exceeded its bounded timeout. Transient.
    #[error("Timeout while querying provider '{provider}'")]
    Timeout { provider: String },

    /// Provider is missing required configuration and is excluded from
    /// this process's candidate pool.
    #[error("Provider '{provider}' is misconfigured: missing {missing:?}")]
    MisconfiguredProvider {
        provider: String,
        missing: Vec<String>,
    },

    /// Capability not implemented by the adapter. Filtered out by the
    /// registry before dispatch; seeing this means a wiring bug.
    #[error("Provider '{provider}' does not support {capability}")]
    UnsupportedOperation {
        provider: String,
        capability: Capability,
    },

    /// Malformed or incomplete upstream response.
    #[error("Normalization failed for provider '{provider}': {reason}")]
    NormalizationError { provider: String, reason: String },

    /// Upstream failure outside the shared taxonomy (exhausted retries
    /// on 5xx, body decode failure). Absorbed by the fallback loop.
    #[error("Upstream failure from provider '{provider}': {message}")]
    Upstream { provider: String, message: String },

    /// Every candidate exhausted or none existed.
    #[error("No provider available ({} candidate(s) failed)", attempts.len())]
    NoProviderAvailable { attempts: Vec<ProviderFailure> },

    /// Caller cancelled the dispatch.
    #[error("Dispatch cancelled by caller")]
    Cancelled,
}

impl AtlasError {
    /// Transient failures trigger fallback to the next candidate without
    /// surfacing the error unless the candidate list is exhausted.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Upstream { .. }
        )
    }
}

/// Result type alias for CompanyAtlas operations.
pub type Result<T> = std::result::Result<T, AtlasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AtlasError::InvalidIdentifier("ABC".to_string());
        assert!(err.to_string().contains("ABC"));
    }

    #[test]
    fn test_no_provider_available_counts_attempts() {
        let err = AtlasError::NoProviderAvailable {
            attempts: vec![
                ProviderFailure {
                    provider: "a".to_string(),
                    error: "Not found".to_string(),
                },
                ProviderFailure {
                    provider: "b".to_string(),
                    error: "Timeout".to_string(),
                },
            ],
        };
        assert_eq!(err.to_string(), "No provider available (2 candidate(s) failed)");
    }

    #[test]
    fn test_transient_classification() {
        assert!(AtlasError::RateLimited {
            provider: "x".to_string()
        }
        .is_transient());
        assert!(AtlasError::Timeout {
            provider: "x".to_string()
        }
        .is_transient());
        assert!(!AtlasError::NotFound.is_transient());
        assert!(!AtlasError::InvalidIdentifier("x".to_string()).is_transient());
    }
}
