//! Bluesky publisher over the ATProto XRPC API

use async_trait::async_trait;
use everylot_domain::{ComposedPost, Platform, PublishError, PublishResult, Publisher, StreetImage};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

/// Bluesky caps posts at 300 characters
pub const MAX_POST_CHARS: usize = 300;

const MAX_BLOB_SIZE: usize = 1_000_000;
const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Posts a lot with its image as an `app.bsky.feed.post` record
pub struct BlueskyPublisher {
    client: Client,
    pds_url: String,
    identifier: String,
    password: SecretString,
}

impl BlueskyPublisher {
    pub fn new(
        pds_url: impl Into<String>,
        identifier: impl Into<String>,
        password: SecretString,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            pds_url: pds_url.into().trim_end_matches('/').to_string(),
            identifier: identifier.into(),
            password,
        }
    }

    async fn create_session(&self) -> Result<Session, PublishError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            identifier: &'a str,
            password: &'a str,
        }

        let url = format!("{}/xrpc/com.atproto.server.createSession", self.pds_url);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                identifier: &self.identifier,
                password: self.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(PublishError::RateLimited);
            }
            return Err(PublishError::Auth(format!(
                "login failed ({}): {}",
                status, text
            )));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| PublishError::Auth(format!("invalid session response: {}", e)))?;
        tracing::debug!(did = %session.did, "authenticated with PDS");

        Ok(session)
    }

    async fn upload_blob(
        &self,
        session: &Session,
        image: &StreetImage,
    ) -> Result<serde_json::Value, PublishError> {
        let url = format!("{}/xrpc/com.atproto.repo.uploadBlob", self.pds_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", session.access_jwt))
            .header("Content-Type", image.mime_type.as_str())
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| PublishError::Media(e.to_string()))?;

        let uploaded: UploadBlobResponse = handle_response(response)
            .await
            .map_err(|e| match e {
                PublishError::Api(msg) => PublishError::Media(msg),
                other => other,
            })?;
        tracing::debug!(size = image.bytes.len(), mime_type = %image.mime_type, "uploaded blob");

        Ok(uploaded.blob)
    }

    async fn create_record(
        &self,
        session: &Session,
        record: serde_json::Value,
    ) -> Result<CreateRecordResponse, PublishError> {
        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.pds_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", session.access_jwt))
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        handle_response(response).await
    }
}

/// Map XRPC failures onto publish errors and parse a successful body
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PublishError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited);
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<XrpcError>(&text)
            .map(|e| format!("{}: {}", e.error, e.message.unwrap_or_default()))
            .unwrap_or(text);

        if status == StatusCode::UNAUTHORIZED {
            return Err(PublishError::Auth(detail));
        }
        return Err(PublishError::Api(format!(
            "request failed ({}): {}",
            status, detail
        )));
    }

    response
        .json()
        .await
        .map_err(|e| PublishError::Api(format!("invalid response: {}", e)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    did: String,
    access_jwt: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Deserialize)]
struct XrpcError {
    error: String,
    message: Option<String>,
}

fn validate_image(image: &StreetImage) -> Result<(), PublishError> {
    if !ALLOWED_MIME_TYPES.contains(&image.mime_type.as_str()) {
        return Err(PublishError::Media(format!(
            "unsupported image type '{}'",
            image.mime_type
        )));
    }
    if image.bytes.len() > MAX_BLOB_SIZE {
        return Err(PublishError::Media(format!(
            "image is {} bytes, limit is {}",
            image.bytes.len(),
            MAX_BLOB_SIZE
        )));
    }
    Ok(())
}

/// Build the post record with a single embedded image
fn post_record(
    post: &ComposedPost,
    blob: serde_json::Value,
    created_at: &str,
) -> serde_json::Value {
    serde_json::json!({
        "$type": "app.bsky.feed.post",
        "text": post.status,
        "createdAt": created_at,
        "embed": {
            "$type": "app.bsky.embed.images",
            "images": [
                { "alt": post.alt_text, "image": blob }
            ]
        }
    })
}

/// `at://did/collection/rkey` to the public web URL
fn web_url(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("at://")?;
    let mut parts = rest.split('/');
    let did = parts.next()?;
    let _collection = parts.next()?;
    let rkey = parts.next()?;
    Some(format!("https://bsky.app/profile/{}/post/{}", did, rkey))
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    async fn publish(
        &self,
        post: &ComposedPost,
        image: &StreetImage,
    ) -> Result<PublishResult, PublishError> {
        let len = post.status.chars().count();
        if len > MAX_POST_CHARS {
            return Err(PublishError::ContentTooLong {
                len,
                max: MAX_POST_CHARS,
            });
        }
        validate_image(image)?;

        let session = self.create_session().await?;
        let blob = self.upload_blob(&session, image).await?;

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| PublishError::Api(e.to_string()))?;
        let created = self
            .create_record(&session, post_record(post, blob, &created_at))
            .await?;

        tracing::info!(lot_id = %post.lot_id, uri = %created.uri, "Posted to Bluesky");

        Ok(PublishResult {
            url: web_url(&created.uri),
            id: created.uri,
        })
    }

    fn platform(&self) -> Platform {
        Platform::Bluesky
    }
}
