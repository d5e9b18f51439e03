//! Ingestion use case - pages parcels from a remote source into the lot store

use crate::{
    model::{Lot, Parcel, Platform},
    ports::{LotWriter, ParcelSource, ParcelSourceError, StoreError},
};

/// Configuration for an ingestion run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Page size requested from the parcel source
    pub batch_size: usize,
    /// Keep only addresses containing this text (case-insensitive); empty keeps all
    pub address_contains: String,
    /// City line used when a parcel has neither street nor city line
    pub default_locality: String,
    /// Seed every lot up to and including this id as already posted
    pub start_pin: Option<String>,
    /// Platform the start pin seeds
    pub seed_platform: Platform,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            address_contains: String::new(),
            default_locality: String::new(),
            start_pin: None,
            seed_platform: Platform::Bluesky,
        }
    }
}

/// Counts from a completed ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Parcels returned by the source
    pub fetched: usize,
    /// Parcels that passed the id and address filters
    pub kept: usize,
    /// Lots newly written (duplicates are ignored)
    pub inserted: usize,
    /// Lots marked by the start pin
    pub seeded: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to fetch parcels at offset {offset}: {source}")]
    Source {
        offset: usize,
        #[source]
        source: ParcelSourceError,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Compose the display address the way the bot posts it
pub fn compose_address(parcel: &Parcel, default_locality: &str) -> String {
    let street = parcel.street.trim();
    let city_line = parcel.city_state_zip.trim();

    if !street.is_empty() {
        return format!("{}, {}", street, city_line);
    }

    let city_line = if city_line.is_empty() {
        default_locality.trim()
    } else {
        city_line
    };
    format!("{}, {}", street, city_line)
        .trim_matches(|c| c == ',' || c == ' ')
        .to_string()
}

/// Convert a parcel into a lot, applying the id and address filters
pub fn parcel_to_lot(parcel: &Parcel, config: &IngestConfig) -> Option<Lot> {
    let id = parcel.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
    let address = compose_address(parcel, &config.default_locality);

    let needle = config.address_contains.trim().to_lowercase();
    if !needle.is_empty() && !address.to_lowercase().contains(&needle) {
        return None;
    }

    Some(Lot::new(id, address, parcel.lat, parcel.lon))
}

/// Ingestion orchestrator
pub struct Ingest<'a, P: ParcelSource + ?Sized, W: LotWriter + ?Sized> {
    source: &'a P,
    writer: &'a W,
    config: IngestConfig,
}

impl<'a, P: ParcelSource + ?Sized, W: LotWriter + ?Sized> Ingest<'a, P, W> {
    pub fn new(source: &'a P, writer: &'a W, config: IngestConfig) -> Self {
        Self {
            source,
            writer,
            config,
        }
    }

    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let batch_size = self.config.batch_size.max(1);
        let mut report = IngestReport::default();
        let mut offset = 0;

        loop {
            let page = self
                .source
                .fetch_page(offset, batch_size)
                .await
                .map_err(|source| IngestError::Source { offset, source })?;

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            report.fetched += page_len;
            offset += page_len;
            tracing::info!(batch = page_len, total = report.fetched, "Fetched parcels");

            let lots: Vec<Lot> = page
                .iter()
                .filter_map(|parcel| parcel_to_lot(parcel, &self.config))
                .collect();
            report.kept += lots.len();
            report.inserted += self.writer.insert_if_absent(&lots).await?;

            if page_len < batch_size {
                break;
            }
        }

        if let Some(pin) = self.config.start_pin.as_deref().filter(|p| !p.trim().is_empty()) {
            tracing::info!(
                start_pin = %pin,
                platform = %self.config.seed_platform,
                "Seeding lots up to start pin"
            );
            report.seeded = self
                .writer
                .seed_posted_through(pin, self.config.seed_platform)
                .await?;
        }

        tracing::info!(
            fetched = report.fetched,
            kept = report.kept,
            inserted = report.inserted,
            seeded = report.seeded,
            "Ingestion complete"
        );

        Ok(report)
    }
}
