//! Minimal X (Twitter) API v2 client used by the agent's `post_tweet` tool.

use anyhow::{Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

#[derive(Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct CreateTweetResponse {
    data: PostedTweet,
}

/// The tweet as acknowledged by the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostedTweet {
    pub id: String,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct TwitterClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl TwitterClient {
    /// `access_token` must be an OAuth 2.0 user-context token with `tweet.write` scope.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub async fn post_tweet(&self, text: &str) -> Result<PostedTweet> {
        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&CreateTweet { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("X API returned {}: {}", status, body);
        }

        let created: CreateTweetResponse = response.json().await?;
        info!(tweet_id = %created.data.id, "Tweet posted");
        Ok(created.data)
    }
}
