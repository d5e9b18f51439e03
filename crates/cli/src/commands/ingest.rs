//! Ingest command - load parcels from ArcGIS into the lots database

use anyhow::{Context, Result};
use everylot_adapters::{lots::SqliteLotStore, parcels::ArcGisParcelSource};
use everylot_domain::usecases::{Ingest, IngestConfig};
use std::path::PathBuf;

use crate::args::IngestArgs;
use crate::config::AppConfig;

pub async fn execute(args: IngestArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let database = args
        .db
        .unwrap_or_else(|| config.general.database_path.clone());
    let city = args.city.unwrap_or_else(|| config.ingest.city.clone());
    let start_pin = args.start_pin.or_else(|| config.general.start_pin.clone());

    tracing::info!(
        database = %database.display(),
        city = %city,
        start_pin = ?start_pin,
        reset = args.reset,
        "Starting ingestion"
    );

    let store = SqliteLotStore::create(&database)
        .await
        .with_context(|| format!("Failed to create lots database {}", database.display()))?;

    if args.reset {
        tracing::warn!(database = %database.display(), "Dropping existing lots");
        store.reset().await.context("Failed to reset lots table")?;
    }

    let source = ArcGisParcelSource::new(
        &config.ingest.feature_server_url,
        config.ingest.municipality_field.clone(),
        city.clone(),
    );

    let ingest_config = IngestConfig {
        batch_size: config.ingest.batch_size,
        address_contains: config.ingest.address_contains.clone(),
        default_locality: config.ingest.default_locality.clone(),
        start_pin,
        seed_platform: args.platform,
    };

    let report = Ingest::new(&source, &store, ingest_config)
        .run()
        .await
        .context("Ingestion failed")?;

    println!(
        "Fetched {} parcels for {}, kept {}, inserted {} new lots into {}",
        report.fetched,
        city,
        report.kept,
        report.inserted,
        database.display()
    );
    if report.seeded > 0 {
        println!(
            "Marked {} lots as posted to {}",
            report.seeded, args.platform
        );
    }

    Ok(())
}
