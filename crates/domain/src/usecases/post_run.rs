//! Posting run use case - resolves one lot, composes it and posts it to
//! every enabled platform, marking each platform only on confirmed success

use std::sync::Arc;

use crate::{
    framing::aim_camera_at,
    model::{ComposedPost, ImageRequest, Lot, Platform, StreetImage},
    ports::{ImageError, ImageSource, LotStore, Publisher, StoreError},
    usecases::{
        compose::{ComposeConfig, ComposeError, Composer},
        resolve::{CursorResolver, Resolution, ResolveRequest},
    },
};

/// Configuration for a posting run
#[derive(Debug, Clone)]
pub struct PostRunConfig {
    /// Platforms to post to; the first in priority order drives the cursor
    pub enabled_platforms: Vec<Platform>,
    /// Boundary used only before any lot has been posted
    pub start_pin: Option<String>,
    /// Resolve and compose, but skip image fetch and all posting
    pub dry_run: bool,
    /// Templates for status text and image search
    pub compose: ComposeConfig,
    /// Overrides the heuristic pitch when set
    pub pitch_override: Option<f64>,
    /// Passed through to the image source when set
    pub zoom: Option<f64>,
}

impl Default for PostRunConfig {
    fn default() -> Self {
        Self {
            enabled_platforms: vec![Platform::Bluesky],
            start_pin: None,
            dry_run: true,
            compose: ComposeConfig::default(),
            pitch_override: None,
            zoom: None,
        }
    }
}

/// What happened on one platform during a run
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformOutcome {
    /// Posted and marked
    Posted { post_id: String },
    /// The lot already carries a marker for this platform
    AlreadyPosted { post_id: String },
    /// Dry run, nothing sent
    DryRun,
    /// The attempt failed; the marker is left unposted unless `post_id` is set
    Failed {
        error: String,
        post_id: Option<String>,
    },
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub lot_id: String,
    /// Decision path the resolver took
    pub resolution: &'static str,
    pub status: String,
    pub outcomes: Vec<(Platform, PlatformOutcome)>,
}

impl RunReport {
    pub fn posted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PlatformOutcome::Posted { .. }))
            .count()
    }
}

/// Errors that abort the run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("No platforms are enabled")]
    NoPlatformsEnabled,
    #[error(
        "No lot found: every lot after {} is posted to {platform}",
        .after.as_deref().unwrap_or("the start")
    )]
    NoLotFound {
        platform: Platform,
        after: Option<String>,
    },
    #[error("Start pin {0} does not exist in the lot store")]
    StartPinNotFound(String),
    #[error("Lot {0} does not exist in the lot store")]
    LotNotFound(String),
    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),
    #[error("Failed to fetch image: {0}")]
    Image(#[from] ImageError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Single-invocation posting orchestrator
pub struct PostRun<S, I>
where
    S: LotStore + ?Sized,
    I: ImageSource + ?Sized,
{
    store: Arc<S>,
    image_source: Arc<I>,
    publishers: Vec<Arc<dyn Publisher>>,
    config: PostRunConfig,
}

impl<S, I> PostRun<S, I>
where
    S: LotStore + ?Sized,
    I: ImageSource + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        image_source: Arc<I>,
        publishers: Vec<Arc<dyn Publisher>>,
        config: PostRunConfig,
    ) -> Self {
        Self {
            store,
            image_source,
            publishers,
            config,
        }
    }

    /// Enabled platforms in priority order, deduplicated
    fn platforms(&self) -> Vec<Platform> {
        Platform::PRIORITY
            .into_iter()
            .filter(|p| self.config.enabled_platforms.contains(p))
            .collect()
    }

    fn publisher_for(&self, platform: Platform) -> Option<&Arc<dyn Publisher>> {
        self.publishers.iter().find(|p| p.platform() == platform)
    }

    /// Resolve the target lot without side effects
    pub async fn resolve(&self, override_id: Option<String>) -> Result<Resolution, RunError> {
        let primary =
            Platform::primary(&self.config.enabled_platforms).ok_or(RunError::NoPlatformsEnabled)?;

        let request = ResolveRequest::new(primary)
            .with_override(override_id)
            .with_start_pin(self.config.start_pin.clone());

        Ok(CursorResolver::new(self.store.as_ref())
            .resolve(&request)
            .await?)
    }

    /// Run one invocation: at most one post per enabled platform
    pub async fn run_once(&self, override_id: Option<String>) -> Result<RunReport, RunError> {
        let platforms = self.platforms();
        if platforms.is_empty() {
            return Err(RunError::NoPlatformsEnabled);
        }

        // Templates are validated before touching the store
        let composer = Composer::new(&self.config.compose)?;

        let resolution = self.resolve(override_id).await?;
        let case = resolution.case();
        let lot = match resolution {
            Resolution::Exhausted { after } => {
                return Err(RunError::NoLotFound {
                    platform: platforms[0],
                    after,
                });
            }
            Resolution::PinNotFound { pin } => return Err(RunError::StartPinNotFound(pin)),
            Resolution::OverrideNotFound { id } => return Err(RunError::LotNotFound(id)),
            Resolution::ExplicitOverride(lot)
            | Resolution::ResumeFromHistory { lot, .. }
            | Resolution::ResumeFromPinPosted { lot, .. }
            | Resolution::ResumeFromPinUnposted(lot)
            | Resolution::ResumeFromStart(lot) => lot,
        };

        tracing::info!(
            lot_id = %lot.id,
            resolution = case,
            primary = %platforms[0],
            "Resolved lot"
        );
        tracing::debug!(
            lot_id = %lot.id,
            address = %lot.address,
            lat = lot.lat,
            lon = lot.lon,
            "Lot details"
        );

        let post = composer.compose(&lot)?;
        tracing::info!(lot_id = %lot.id, status = %post.status, "Post text");

        if self.config.dry_run {
            tracing::info!(platforms = ?platforms, "[DRY RUN] Skipping image fetch and posting");
            return Ok(RunReport {
                lot_id: lot.id,
                resolution: case,
                status: post.status,
                outcomes: platforms
                    .into_iter()
                    .map(|p| (p, PlatformOutcome::DryRun))
                    .collect(),
            });
        }

        let request = self.image_request(&composer, &lot)?;
        tracing::debug!(
            location = %request.location,
            fov = request.fov,
            pitch = request.pitch,
            "Fetching image"
        );
        let image = self.image_source.fetch_image(&request).await.inspect_err(|e| {
            tracing::error!(lot_id = %lot.id, error = %e, "Failed to fetch image");
        })?;

        let mut outcomes = Vec::with_capacity(platforms.len());
        for platform in platforms {
            let outcome = self.post_to(platform, &lot, &post, &image).await;
            outcomes.push((platform, outcome));
        }

        Ok(RunReport {
            lot_id: lot.id,
            resolution: case,
            status: post.status,
            outcomes,
        })
    }

    fn image_request(&self, composer: &Composer, lot: &Lot) -> Result<ImageRequest, RunError> {
        let framing = aim_camera_at(lot);
        let location = composer.image_location(lot).map_err(|e| match e {
            ComposeError::NoLocation(id) => RunError::Image(ImageError::NoLocation(id)),
            other => RunError::Compose(other),
        })?;

        Ok(ImageRequest {
            location,
            fov: framing.fov,
            pitch: self.config.pitch_override.unwrap_or(framing.pitch),
            zoom: self.config.zoom,
        })
    }

    /// Attempt one platform; failures are logged and contained here
    async fn post_to(
        &self,
        platform: Platform,
        lot: &Lot,
        post: &ComposedPost,
        image: &StreetImage,
    ) -> PlatformOutcome {
        if let Some(existing) = lot.posted_id(platform) {
            tracing::info!(
                lot_id = %lot.id,
                platform = %platform,
                post_id = %existing,
                "Already posted, skipping"
            );
            return PlatformOutcome::AlreadyPosted {
                post_id: existing.to_string(),
            };
        }

        let Some(publisher) = self.publisher_for(platform) else {
            tracing::error!(platform = %platform, "No publisher configured for enabled platform");
            return PlatformOutcome::Failed {
                error: format!("no publisher configured for {}", platform),
                post_id: None,
            };
        };

        let result = match publisher.publish(post, image).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    lot_id = %lot.id,
                    platform = %platform,
                    error = %e,
                    "Failed to post"
                );
                return PlatformOutcome::Failed {
                    error: e.to_string(),
                    post_id: None,
                };
            }
        };

        match self.store.mark_posted(&lot.id, platform, &result.id).await {
            Ok(()) => {
                tracing::info!(
                    lot_id = %lot.id,
                    platform = %platform,
                    post_id = %result.id,
                    url = ?result.url,
                    "Posted"
                );
                PlatformOutcome::Posted { post_id: result.id }
            }
            Err(e) => {
                tracing::error!(
                    lot_id = %lot.id,
                    platform = %platform,
                    post_id = %result.id,
                    error = %e,
                    "Posted but failed to record marker"
                );
                PlatformOutcome::Failed {
                    error: e.to_string(),
                    post_id: Some(result.id),
                }
            }
        }
    }
}
