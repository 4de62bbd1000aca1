//! contact-lake - Contact Record Export Pipeline and Query Gateway
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use contact_lake::config::{CliArgs, Command, LakeConfig};
use contact_lake::engine::LocalEngine;
use contact_lake::export::{ExportOptions, Exporter};
use contact_lake::gateway::{AppState, GatewayOptions, QueryGateway, QueryNames};
use contact_lake::schema::SchemaSync;
use contact_lake::store::seed::demo_records;
use contact_lake::store::{RocksStore, SourceStore};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = LakeConfig::from_args(&args).context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(async {
        match args.command {
            Command::Seed { count } => seed(&config, count).await,
            Command::Bootstrap { sample_limit } => bootstrap(&config, sample_limit).await,
            Command::Export {
                range,
                lookback_hours,
                overwrite,
                page_size,
            } => export(&config, range, lookback_hours, overwrite, page_size).await,
            Command::Serve {
                port,
                bind,
                max_fetch_rows,
                download_ttl_secs,
                poll_budget_secs,
            } => {
                serve(
                    &config,
                    &bind,
                    port,
                    max_fetch_rows,
                    download_ttl_secs,
                    poll_budget_secs,
                )
                .await
            }
        }
    })
}

async fn seed(config: &LakeConfig, count: usize) -> Result<()> {
    let store = RocksStore::open(&config.store_path).context("Failed to open source store")?;

    let records = demo_records(
        count,
        &config.partition_attribute,
        &config.partition_value,
        &config.date_attribute,
        config.date_format,
        Utc::now(),
    );
    store
        .put_batch(&config.partition_value, &records)
        .context("Failed to write records")?;

    let stats = store.stats().context("Failed to read store stats")?;
    info!(
        seeded = count,
        total = stats.record_count,
        store = %config.store_path.display(),
        "Seed complete"
    );
    Ok(())
}

async fn bootstrap(config: &LakeConfig, sample_limit: usize) -> Result<()> {
    let store = RocksStore::open(&config.store_path).context("Failed to open source store")?;
    let sync = schema_sync(config).await?;

    let sample = store
        .sample(sample_limit)
        .context("Failed to sample source store")?;
    if sample.is_empty() {
        anyhow::bail!("source store is empty; run 'contact-lake seed' first");
    }

    let catalog = sync
        .bootstrap(&sample)
        .await
        .context("Failed to bootstrap lake table")?;
    info!(
        table = %config.table,
        columns = catalog.len(),
        sampled = sample.len(),
        "Bootstrap complete"
    );
    Ok(())
}

async fn export(
    config: &LakeConfig,
    range: contact_lake::export::DateRangeMode,
    lookback_hours: u32,
    overwrite: contact_lake::export::OverwriteMode,
    page_size: usize,
) -> Result<()> {
    let store = RocksStore::open(&config.store_path).context("Failed to open source store")?;
    let sync = schema_sync(config).await?;

    let options = ExportOptions {
        lake_dir: config.lake_dir.clone(),
        prefix: config.prefix.clone(),
        partition_value: config.partition_value.clone(),
        date_attribute: config.date_attribute.clone(),
        date_format: config.date_format,
        range_mode: range,
        lookback_hours,
        overwrite_mode: overwrite,
        page_size,
    };

    let exporter = Exporter::new(&store, &sync, options);
    let summary = exporter.export(Utc::now()).await.context("Export failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn serve(
    config: &LakeConfig,
    bind: &str,
    port: u16,
    max_fetch_rows: usize,
    download_ttl_secs: u64,
    poll_budget_secs: u64,
) -> Result<()> {
    let engine = Arc::new(
        LocalEngine::open(&config.lake_dir, &config.prefix, &config.table)
            .await
            .context("Failed to open lake")?,
    );

    // The unpivot view lives in the session, not on disk; rebuild it from
    // the persisted catalog before taking queries.
    let sync = SchemaSync::new(
        engine.clone(),
        &config.table,
        &config.view,
        &config.question_suffix,
        &config.date_column,
    );
    match sync.current_catalog().await {
        Ok(catalog) => sync
            .regenerate_qa_view(&catalog)
            .await
            .context("Failed to regenerate view")?,
        Err(contact_lake::error::SchemaError::CatalogMissing) => {
            tracing::warn!("Lake has no catalog yet; run 'contact-lake bootstrap' first");
        }
        Err(e) => return Err(e).context("Failed to read catalog"),
    }

    let gateway = QueryGateway::new(
        engine,
        GatewayOptions {
            names: QueryNames {
                table: config.table.clone(),
                view: config.view.clone(),
                date_column: config.date_column.clone(),
            },
            max_fetch_rows,
            download_ttl: Duration::from_secs(download_ttl_secs),
            poll_budget: Duration::from_secs(poll_budget_secs),
        },
    );

    let state = Arc::new(AppState { gateway });
    contact_lake::gateway::serve(state, bind, port)
        .await
        .context("Gateway failed")?;
    Ok(())
}

/// Build the schema sync wiring shared by bootstrap and export. Opening
/// the engine re-registers the lake table from the persisted catalog when
/// one exists.
async fn schema_sync(config: &LakeConfig) -> Result<SchemaSync> {
    let engine = Arc::new(
        LocalEngine::open(&config.lake_dir, &config.prefix, &config.table)
            .await
            .context("Failed to open lake")?,
    );
    Ok(SchemaSync::new(
        engine,
        &config.table,
        &config.view,
        &config.question_suffix,
        &config.date_column,
    ))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("contact_lake=debug,warn")
    } else {
        EnvFilter::new("contact_lake=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
