//! X API v2 media upload

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use everylot_domain::{PublishError, StreetImage};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct MediaUploadRequest<'a> {
    media: String,
    media_category: &'a str,
    media_type: &'a str,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    data: MediaData,
}

#[derive(Deserialize)]
struct MediaData {
    id: String,
}

/// Upload an image in one request and return its media id
pub(crate) async fn upload_image(
    client: &Client,
    base_url: &str,
    user_token: &SecretString,
    image: &StreetImage,
) -> Result<String, PublishError> {
    let url = format!("{}/2/media/upload", base_url);

    let request = MediaUploadRequest {
        media: STANDARD.encode(&image.bytes),
        media_category: "tweet_image",
        media_type: &image.mime_type,
    };

    let response = client
        .post(&url)
        .header(
            "Authorization",
            format!("Bearer {}", user_token.expose_secret()),
        )
        .json(&request)
        .send()
        .await
        .map_err(|e| PublishError::Media(e.to_string()))?;

    if response.status() == 401 {
        return Err(PublishError::Auth("Invalid user token".to_string()));
    }

    if response.status() == 429 {
        return Err(PublishError::RateLimited);
    }

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PublishError::Media(format!(
            "Failed to upload media: {}",
            body
        )));
    }

    let upload: MediaUploadResponse = response
        .json()
        .await
        .map_err(|e| PublishError::Media(e.to_string()))?;

    tracing::debug!(media_id = %upload.data.id, size = image.bytes.len(), "Uploaded media to X");

    Ok(upload.data.id)
}
