//! French provider adapters.
//!
//! Ordered by priority: the free official sources (annuaire des
//! entreprises, INSEE, BODACC) sit above the paid aggregator (Pappers).

pub mod bodacc;
pub mod insee;
pub mod pappers;
pub mod recherche_entreprises;
