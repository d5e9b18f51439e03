//! Post command - resolve the next lot and post it to every enabled platform

use anyhow::{Context, Result};
use everylot_adapters::{
    bluesky::BlueskyPublisher, imagery::StreetViewImageSource, lots::SqliteLotStore,
    x::XPublisher,
};
use everylot_domain::{
    Platform, Publisher,
    usecases::{ComposeConfig, PlatformOutcome, PostRun, PostRunConfig, RunReport},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::args::PostArgs;
use crate::commands::{load_env, load_secret};
use crate::config::AppConfig;

pub async fn execute(args: PostArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let dry_run = args.dry_run || config.general.dry_run;
    let database = args
        .database
        .clone()
        .unwrap_or_else(|| config.general.database_path.clone());
    let enabled_platforms = config.enabled_platforms();

    tracing::info!(
        dry_run = dry_run,
        database = %database.display(),
        platforms = ?enabled_platforms,
        id = ?args.id,
        "Starting everylot post"
    );

    let store = Arc::new(
        SqliteLotStore::open(&database)
            .await
            .with_context(|| format!("Failed to open lots database {}", database.display()))?,
    );

    let image_source = Arc::new(build_image_source(&config));

    let publishers = if dry_run {
        vec![]
    } else {
        build_publishers(&config, &enabled_platforms)
    };

    let run_config = PostRunConfig {
        enabled_platforms,
        start_pin: config.general.start_pin.clone(),
        dry_run,
        compose: ComposeConfig {
            print_format: args
                .print_format
                .unwrap_or_else(|| config.templates.print_format.clone()),
            search_format: args
                .search_format
                .unwrap_or_else(|| config.templates.search_format.clone()),
        },
        pitch_override: config.streetview.pitch,
        zoom: config.streetview.zoom,
    };

    let run = PostRun::new(store, image_source, publishers, run_config);
    let report = run.run_once(args.id).await?;

    print_report(&report, dry_run);
    Ok(())
}

/// The key is optional here; the image source refuses to fetch without one
fn build_image_source(config: &AppConfig) -> StreetViewImageSource {
    let api_key = load_secret(&config.streetview.api_key_env, "Street View")
        .inspect_err(|e| tracing::debug!(error = %e, "Street View key unavailable"))
        .ok();

    StreetViewImageSource::new(
        api_key,
        config.streetview.size.clone(),
        Duration::from_secs(config.streetview.timeout_secs),
    )
}

/// A platform whose credentials are missing gets no publisher and is
/// reported as failed, without stopping the other platforms
fn build_publishers(config: &AppConfig, platforms: &[Platform]) -> Vec<Arc<dyn Publisher>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();

    for platform in platforms {
        let publisher = match platform {
            Platform::Bluesky => build_bluesky_publisher(config),
            Platform::Twitter => build_x_publisher(config),
        };

        match publisher {
            Ok(publisher) => publishers.push(publisher),
            Err(e) => {
                tracing::error!(platform = %platform, error = %e, "Publisher unavailable")
            }
        }
    }

    publishers
}

fn build_bluesky_publisher(config: &AppConfig) -> Result<Arc<dyn Publisher>> {
    let identifier = load_env(&config.bluesky.identifier_env, "bluesky identifier")?;
    let password = load_secret(&config.bluesky.password_env, "bluesky password")?;

    Ok(Arc::new(BlueskyPublisher::new(
        config.bluesky.pds_url.clone(),
        identifier,
        password,
    )))
}

fn build_x_publisher(config: &AppConfig) -> Result<Arc<dyn Publisher>> {
    let user_token = load_secret(&config.twitter.user_token_env, "twitter")?;
    Ok(Arc::new(XPublisher::new(user_token, config.twitter.max_chars)))
}

fn print_report(report: &RunReport, dry_run: bool) {
    let prefix = if dry_run { "[DRY RUN] " } else { "" };
    println!(
        "{}Lot {} ({}): {}",
        prefix, report.lot_id, report.resolution, report.status
    );

    for (platform, outcome) in &report.outcomes {
        match outcome {
            PlatformOutcome::Posted { post_id } => println!("  {}: posted {}", platform, post_id),
            PlatformOutcome::AlreadyPosted { post_id } => {
                println!("  {}: already posted {}", platform, post_id)
            }
            PlatformOutcome::DryRun => println!("  {}: would post", platform),
            PlatformOutcome::Failed { error, post_id } => match post_id {
                Some(id) => println!("  {}: posted {} but not recorded: {}", platform, id, error),
                None => println!("  {}: failed: {}", platform, error),
            },
        }
    }

    if !dry_run && report.posted_count() == 0 {
        tracing::warn!(lot_id = %report.lot_id, "Nothing was posted");
    }
}
