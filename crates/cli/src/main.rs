//! Operator CLI for the Casa media lifecycle.

use anyhow::{Context, Result};
use bytes::Bytes;
use casa_core::config::AppConfig;
use casa_lifecycle::{MigrationOptions, Services, metrics};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "casactl")]
#[command(about = "Operator CLI for the Casa media lifecycle")]
#[command(version)]
struct Cli {
    /// Config file path (optional; CASA_* environment variables override it)
    #[arg(long, env = "CASA_CONFIG", default_value = "casa.toml")]
    config: PathBuf,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, default_value_t = false)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every asset under an owner/entity prefix, then verify
    Cleanup {
        owner: String,
        entity: String,

        /// Skip the verification listing
        #[arg(long, default_value_t = false)]
        no_verify: bool,
    },
    /// Report assets remaining under an owner/entity prefix
    Verify { owner: String, entity: String },
    /// Move inline images out of records and into storage
    Migrate {
        /// Pause between records (overrides config)
        #[arg(long)]
        batch_pause_ms: Option<u64>,

        /// Report what would change without uploading or writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show migration progress without changing anything
    MigrationStatus,
    /// Attach an image file to a record
    Attach {
        record_id: String,
        file: PathBuf,

        /// Content type (guessed from the file extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Remove a record's image
    Clear { record_id: String },
    /// Resolve a stored reference to a display URL
    Url {
        reference: String,

        /// Produce a time-boxed signed URL
        #[arg(long, default_value_t = false)]
        signed: bool,

        /// Signed URL lifetime (overrides config)
        #[arg(long, requires = "signed")]
        ttl_secs: Option<u64>,
    },
    /// Check storage and record store connectivity
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    metrics::register_metrics();

    let services = Services::from_config(&config)
        .await
        .context("failed to initialize services")?;

    let ok = run(&services, cli.command).await?;

    if cli.print_metrics {
        eprint!("{}", metrics::render().context("failed to encode metrics")?);
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Load configuration from an optional TOML file plus `CASA_` environment variables.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CASA_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

/// Execute one command, printing its JSON result. Returns whether it succeeded.
async fn run(services: &Services, command: Commands) -> Result<bool> {
    match command {
        Commands::Cleanup {
            owner,
            entity,
            no_verify,
        } => {
            if no_verify {
                let report = services.cleanup.delete_all(&owner, &entity).await?;
                print_json(&report)?;
                Ok(report.success)
            } else {
                let checked = services.cleanup.delete_and_verify(&owner, &entity).await?;
                print_json(&checked)?;
                Ok(checked.is_clean())
            }
        }
        Commands::Verify { owner, entity } => {
            let report = services.cleanup.verify(&owner, &entity).await?;
            print_json(&report)?;
            Ok(report.is_clean)
        }
        Commands::Migrate {
            batch_pause_ms,
            dry_run,
        } => {
            let mut options: MigrationOptions = services.migration.default_options();
            if let Some(ms) = batch_pause_ms {
                options.batch_pause = Duration::from_millis(ms);
            }
            options.dry_run = dry_run;

            let stats = services.migration.run(options).await?;
            print_json(&stats)?;
            Ok(stats.errors.is_empty())
        }
        Commands::MigrationStatus => {
            let status = services.migration.status().await?;
            print_json(&status)?;
            Ok(true)
        }
        Commands::Attach {
            record_id,
            file,
            content_type,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&file));

            let outcome = services
                .sync
                .attach(&record_id, Bytes::from(data), &content_type)
                .await?;
            print_json(&outcome)?;
            Ok(true)
        }
        Commands::Clear { record_id } => {
            let outcome = services.sync.clear(&record_id).await?;
            print_json(&outcome)?;
            Ok(outcome.success)
        }
        Commands::Url {
            reference,
            signed,
            ttl_secs,
        } => {
            let url = if signed {
                services
                    .display
                    .signed(&reference, ttl_secs.map(Duration::from_secs))
                    .await
            } else {
                services.display.public(&reference)
            };
            print_json(&url)?;
            Ok(!url.is_placeholder)
        }
        Commands::Health => {
            let storage = services.store.health_check().await;
            let records = services.records.health_check().await;
            let report = HealthReport {
                backend: services.store.backend_name(),
                storage: status_of(&storage),
                records: status_of(&records),
                version: env!("CARGO_PKG_VERSION"),
            };
            print_json(&report)?;
            Ok(storage.is_ok() && records.is_ok())
        }
    }
}

#[derive(Serialize)]
struct HealthReport {
    backend: &'static str,
    storage: String,
    records: String,
    version: &'static str,
}

fn status_of<E: std::fmt::Display>(result: &std::result::Result<(), E>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    }
}

fn guess_content_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
