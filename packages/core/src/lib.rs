//! CompanyAtlas core - aggregation and normalization of company-registry data.
//!
//! Aggregates company data (addresses, identifiers, subsidiaries,
//! officers, documents) from many country-specific sources behind one
//! normalized interface. This crate is the network-free core: the
//! canonical data model, the identifier validator, the provider
//! registry, the normalizer and the dispatch/fallback controller.
//! Concrete HTTP adapters live in `companyatlas-providers`.
//!
//! # Example
//!
//! ```
//! use companyatlas_core::config::AtlasConfig;
//! use companyatlas_core::dispatch::Dispatcher;
//! use companyatlas_core::model::Capability;
//! use companyatlas_core::provider::StaticProvider;
//! use companyatlas_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new(AtlasConfig::new());
//! let descriptor = companyatlas_core::model::ProviderDescriptor::new(
//!     "fixtures", "Fixtures", "static", "FR",
//! )
//! .with_capabilities(&[Capability::SearchByReference]);
//! registry.register(descriptor, |_config| {
//!     Ok(Box::new(StaticProvider::new("fixtures", "FR", 0).with_record(
//!         serde_json::json!({
//!             "name": "DANONE",
//!             "country_code": "FR",
//!             "identifiers": {"siren": "552032534"}
//!         }),
//!     )))
//! });
//!
//! let dispatcher = Dispatcher::new(&registry);
//! let record = dispatcher.lookup("552032534", Some("FR")).unwrap();
//! assert_eq!(record.name, "DANONE");
//! ```
//!
//! # Architecture
//!
//! - [`model`]: canonical company record, capabilities, descriptors
//! - [`identifier`]: identifier classification and validation
//! - [`error`]: shared error taxonomy and Result alias
//! - [`config`]: provider configuration and environment loading
//! - [`provider`]: the adapter capability contract
//! - [`registry`]: provider registration and resolution
//! - [`normalize`]: raw payload to canonical record mapping
//! - [`dispatch`]: fallback and aggregation across providers

pub mod config;
pub mod dispatch;
pub mod error;
pub mod identifier;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod registry;

// Re-export commonly used items
pub use config::{AtlasConfig, ProviderConfig};
pub use dispatch::{Aggregate, CancelToken, DispatchOptions, Dispatcher};
pub use error::{AtlasError, ProviderFailure, Result};
pub use identifier::{classify, IdentifierType};
pub use model::{Capability, CompanyRecord, ProviderDescriptor};
pub use normalize::{normalize, Mapping};
pub use provider::{Provider, RawRecord, SearchFilters, StaticProvider};
pub use registry::ProviderRegistry;
