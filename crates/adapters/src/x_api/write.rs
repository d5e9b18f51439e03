//! X API write adapter for publishing posts

use async_trait::async_trait;
use everylot_domain::{ComposedPost, Platform, PublishError, PublishResult, Publisher, StreetImage};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::media;

pub const X_API_BASE_URL: &str = "https://api.x.com";
pub const DEFAULT_MAX_CHARS: usize = 280;

/// X API publisher for creating posts with a single image
pub struct XPublisher {
    client: Client,
    user_token: SecretString,
    base_url: String,
    max_chars: usize,
}

impl XPublisher {
    pub fn new(user_token: SecretString, max_chars: usize) -> Self {
        Self::with_base_url(user_token, X_API_BASE_URL.to_string(), max_chars)
    }

    pub fn with_base_url(user_token: SecretString, base_url: String, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            user_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chars,
        }
    }
}

#[derive(Serialize)]
struct CreateTweetRequest {
    text: String,
    media: TweetMedia,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(
        &self,
        post: &ComposedPost,
        image: &StreetImage,
    ) -> Result<PublishResult, PublishError> {
        let len = post.status.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let media_id =
            media::upload_image(&self.client, &self.base_url, &self.user_token, image).await?;

        let request = CreateTweetRequest {
            text: post.status.clone(),
            media: TweetMedia {
                media_ids: vec![media_id],
            },
        };

        let url = format!("{}/2/tweets", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.user_token.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        if response.status() == 401 {
            return Err(PublishError::Auth("Invalid user token".to_string()));
        }

        if response.status() == 429 {
            return Err(PublishError::RateLimited);
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!(
                "Failed to create tweet: {}",
                body
            )));
        }

        let tweet_response: CreateTweetResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        tracing::info!(lot_id = %post.lot_id, tweet_id = %tweet_response.data.id, "Posted to X");

        Ok(PublishResult {
            url: Some(format!("https://x.com/i/status/{}", tweet_response.data.id)),
            id: tweet_response.data.id,
        })
    }

    fn platform(&self) -> Platform {
        Platform::Twitter
    }
}
