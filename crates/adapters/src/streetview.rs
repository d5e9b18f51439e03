//! Google Street View Static API image source

use async_trait::async_trait;
use everylot_domain::{ImageError, ImageRequest, ImageSource, StreetImage};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

pub const STREETVIEW_BASE_URL: &str = "https://maps.googleapis.com/maps/api/streetview";

/// Fetches a single street-level image for a location
pub struct StreetViewImageSource {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    size: String,
}

impl StreetViewImageSource {
    pub fn new(api_key: Option<SecretString>, size: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(api_key, STREETVIEW_BASE_URL.to_string(), size, timeout)
    }

    pub fn with_base_url(
        api_key: Option<SecretString>,
        base_url: String,
        size: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            size: size.into(),
        }
    }

    fn api_key(&self) -> Result<&str, ImageError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ImageError::MissingCredential("Google Street View API key".to_string()))
    }

    /// The image endpoint answers with a grey placeholder when there is no
    /// panorama, so availability is checked against the metadata endpoint.
    async fn check_coverage(&self, location: &str, key: &str) -> Result<(), ImageError> {
        let url = format!("{}/metadata", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("location", location), ("key", key)])
            .send()
            .await
            .map_err(|e| ImageError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Api(format!(
                "metadata request failed ({}): {}",
                status, body
            )));
        }

        let metadata: MetadataResponse = response
            .json()
            .await
            .map_err(|e| ImageError::Api(format!("invalid metadata response: {}", e)))?;

        if metadata.status != "OK" {
            let detail = metadata
                .error_message
                .map(|m| format!(" ({})", m))
                .unwrap_or_default();
            return Err(ImageError::Api(format!(
                "no Street View imagery for '{}': {}{}",
                location, metadata.status, detail
            )));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct MetadataResponse {
    status: String,
    error_message: Option<String>,
}

#[async_trait]
impl ImageSource for StreetViewImageSource {
    async fn fetch_image(&self, request: &ImageRequest) -> Result<StreetImage, ImageError> {
        let key = self.api_key()?;

        if request.location.trim().is_empty() {
            return Err(ImageError::NoLocation(request.location.clone()));
        }

        self.check_coverage(&request.location, key).await?;

        let mut query = vec![
            ("location", request.location.clone()),
            ("key", key.to_string()),
            ("size", self.size.clone()),
            ("fov", request.fov.to_string()),
            ("pitch", request.pitch.to_string()),
        ];
        if let Some(zoom) = request.zoom {
            query.push(("zoom", zoom.to_string()));
        }

        tracing::debug!(
            location = %request.location,
            fov = request.fov,
            pitch = request.pitch,
            "Fetching Street View image"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ImageError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Api(format!(
                "image request failed ({}): {}",
                status, body
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();

        if !mime_type.starts_with("image/") {
            return Err(ImageError::InvalidImage(format!(
                "unexpected content type '{}'",
                mime_type
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Api(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ImageError::InvalidImage("empty image body".to_string()));
        }

        tracing::info!(bytes = bytes.len(), mime_type = %mime_type, "Fetched Street View image");

        Ok(StreetImage {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}
