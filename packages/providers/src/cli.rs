//! Command-line interface for CompanyAtlas.
//!
//! Thin glue over the dispatcher: parses arguments, loads provider
//! configuration from the environment once, and renders canonical
//! records. Exit-code mapping happens in `main`.

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use companyatlas_core::config::AtlasConfig;
use companyatlas_core::dispatch::{Aggregate, DispatchOptions, Dispatcher};
use companyatlas_core::error::{ProviderFailure, Result};
use companyatlas_core::model::CompanyRecord;
use companyatlas_core::provider::SearchFilters;

use crate::registry::{default_descriptors, default_registry};

/// CompanyAtlas - company-registry data from official and commercial sources.
#[derive(Parser)]
#[command(name = "companyatlas")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Try fallback candidates in parallel instead of sequentially.
    #[arg(long, global = true)]
    pub speculative: bool,

    /// Print machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search companies by name.
    Search {
        /// Company name to search for (e.g. "tour eiffel")
        query: String,

        /// ISO country code to search in
        #[arg(short, long, default_value = "FR")]
        country: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only return active companies
        #[arg(long)]
        active: bool,
    },

    /// Look up one company by identifier (SIREN, SIRET, CRN, ...).
    Lookup {
        /// Registration identifier
        identifier: String,

        /// ISO country code; required when the identifier format is ambiguous
        #[arg(short, long)]
        country: Option<String>,
    },

    /// All official documents across every capable source.
    Documents {
        identifier: String,
        #[arg(short, long)]
        country: Option<String>,
    },

    /// All known officers across every capable source.
    Officers {
        identifier: String,
        #[arg(short, long)]
        country: Option<String>,
    },

    /// All registry events across every capable source.
    Events {
        identifier: String,
        #[arg(short, long)]
        country: Option<String>,
    },

    /// List registered providers and their configuration status.
    Providers,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Environment is read once, here; never polled afterwards.
    let descriptors = default_descriptors();
    let config = AtlasConfig::from_env(&descriptors);
    let registry = default_registry(config);
    let dispatcher = Dispatcher::with_options(
        &registry,
        DispatchOptions {
            speculative_parallel: cli.speculative,
            ..Default::default()
        },
    );

    match cli.command {
        Commands::Search {
            query,
            country,
            limit,
            active,
        } => {
            let filters = SearchFilters {
                limit,
                active_only: active,
                postal_code: None,
            };
            let records = with_spinner("Searching...", || {
                dispatcher.search(&query, &country, &filters)
            })?;
            if cli.json {
                print_json(&records)?;
            } else {
                println!(
                    "{} result(s) for {}",
                    style(records.len()).bold(),
                    style(&query).cyan()
                );
                for record in &records {
                    print_record_line(record);
                }
            }
        }
        Commands::Lookup {
            identifier,
            country,
        } => {
            let record = with_spinner("Looking up...", || {
                dispatcher.lookup(&identifier, country.as_deref())
            })?;
            if cli.json {
                print_json(&record)?;
            } else {
                print_record(&record);
            }
        }
        Commands::Documents {
            identifier,
            country,
        } => {
            let aggregate = with_spinner("Fetching documents...", || {
                dispatcher.documents(&identifier, country.as_deref())
            })?;
            if cli.json {
                print_aggregate_json(&aggregate)?;
            } else {
                for doc in &aggregate.items {
                    println!(
                        "{}  {}  {}",
                        style(doc.issue_date).green(),
                        doc.document_type,
                        style(&doc.url).dim()
                    );
                }
                print_failures(&aggregate.failures);
            }
        }
        Commands::Officers {
            identifier,
            country,
        } => {
            let aggregate = with_spinner("Fetching officers...", || {
                dispatcher.officers(&identifier, country.as_deref())
            })?;
            if cli.json {
                print_aggregate_json(&aggregate)?;
            } else {
                for officer in &aggregate.items {
                    match officer.ownership_share {
                        Some(share) => {
                            println!("{}  {} ({share}%)", style(&officer.name).bold(), officer.role);
                        }
                        None => println!("{}  {}", style(&officer.name).bold(), officer.role),
                    }
                }
                print_failures(&aggregate.failures);
            }
        }
        Commands::Events {
            identifier,
            country,
        } => {
            let aggregate = with_spinner("Fetching events...", || {
                dispatcher.events(&identifier, country.as_deref())
            })?;
            if cli.json {
                print_aggregate_json(&aggregate)?;
            } else {
                for event in &aggregate.items {
                    println!(
                        "{}  {}  {}",
                        style(event.date).green(),
                        event.event_type,
                        event.description.as_deref().unwrap_or("")
                    );
                }
                print_failures(&aggregate.failures);
            }
        }
        Commands::Providers => {
            for descriptor in registry.descriptors() {
                let missing = registry.missing_config(descriptor);
                let status = if missing.is_empty() {
                    style("available").green()
                } else {
                    style("missing config").yellow()
                };
                let capabilities: Vec<&str> = descriptor
                    .capabilities
                    .iter()
                    .map(|c| c.as_str())
                    .collect();
                println!(
                    "{:24} {} [{}] {}",
                    style(&descriptor.name).bold(),
                    descriptor.country_code,
                    capabilities.join(", "),
                    status
                );
                if !missing.is_empty() {
                    let vars: Vec<String> = missing
                        .iter()
                        .map(|key| {
                            format!(
                                "{}_{}",
                                descriptor.name.to_ascii_uppercase(),
                                key.to_ascii_uppercase()
                            )
                        })
                        .collect();
                    println!("{:24} set {}", "", style(vars.join(", ")).dim());
                }
            }
        }
    }

    Ok(())
}

/// Run a dispatch under a progress spinner.
fn with_spinner<T>(message: &'static str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    let result = op();
    pb.finish_and_clear();
    result
}

fn print_record_line(record: &CompanyRecord) {
    let identifiers: Vec<String> = record
        .identifiers
        .iter()
        .map(|(id_type, value)| format!("{id_type}: {value}"))
        .collect();
    println!(
        "  {} ({})",
        style(&record.name).bold(),
        identifiers.join(", ")
    );
}

fn print_record(record: &CompanyRecord) {
    println!("{}", style(&record.name).bold().cyan());
    println!("  Country: {}", record.country_code);
    for (id_type, value) in &record.identifiers {
        println!("  {}: {}", id_type, style(value).green());
    }
    for address in &record.addresses {
        println!(
            "  Address: {}, {} {} ({:?})",
            address.street, address.postal_code, address.city, address.role
        );
    }
    for officer in &record.officers {
        println!("  Officer: {} ({})", officer.name, officer.role);
    }
    println!("  Source: {}", style(&record.source.provider).dim());
}

fn print_failures(failures: &[ProviderFailure]) {
    for failure in failures {
        eprintln!(
            "{} {}",
            style("warning:").yellow().bold(),
            style(failure).dim()
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    #[allow(clippy::expect_used)] // Canonical records always serialize
    let rendered = serde_json::to_string_pretty(value).expect("serializable record");
    println!("{rendered}");
    Ok(())
}

fn print_aggregate_json<T: serde::Serialize>(aggregate: &Aggregate<T>) -> Result<()> {
    let failures: Vec<serde_json::Value> = aggregate
        .failures
        .iter()
        .map(|f| serde_json::json!({"provider": f.provider, "error": f.error}))
        .collect();
    print_json(&serde_json::json!({
        "items": &aggregate.items,
        "failures": failures,
    }))
}
