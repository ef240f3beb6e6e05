//! Microblog platform adapter
//!
//! Posts through the v2 create endpoint using an OAuth 1.0a user context.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MicroblogConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::oauth::{authorization_header, OAuthKeys};
use crate::platforms::{mismatch, PlatformAdapter, PlatformCredentials};
use crate::types::Platform;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct AppCredentials {
    consumer_key: String,
    consumer_secret: String,
}

pub struct MicroblogAdapter {
    client: Client,
    app: Option<AppCredentials>,
    api_base: String,
}

#[derive(Serialize)]
struct CreatePostRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CreatePostResponse {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
}

/// Account identity returned by credential verification
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub id_str: String,
    pub screen_name: String,
}

impl MicroblogAdapter {
    /// Build from the optional `[microblog]` section
    ///
    /// An absent or incomplete section yields an unconfigured adapter.
    pub fn new(config: Option<&MicroblogConfig>) -> Self {
        let app = config.filter(|c| c.is_complete()).map(|c| AppCredentials {
            consumer_key: c.consumer_key.clone(),
            consumer_secret: c.consumer_secret.clone(),
        });
        let api_base = config
            .map(|c| c.api_base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.twitter.com".to_string());

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            app,
            api_base,
        }
    }

    fn app(&self) -> Result<&AppCredentials> {
        self.app.as_ref().ok_or_else(|| {
            PlatformError::NotConfigured(
                "microblog consumer key, secret or callback URL is missing".to_string(),
            )
            .into()
        })
    }

    fn user_tokens<'a>(
        &self,
        credentials: &'a PlatformCredentials,
    ) -> Result<(&'a str, &'a str)> {
        match credentials {
            PlatformCredentials::Microblog { token, secret } => {
                Ok((token.expose_secret(), secret.expose_secret()))
            }
            _ => Err(mismatch(Platform::Microblog)),
        }
    }

    /// Check a token pair against the account endpoint
    pub async fn verify_credentials(
        &self,
        credentials: &PlatformCredentials,
    ) -> Result<AccountInfo> {
        let app = self.app()?;
        let (token, token_secret) = self.user_tokens(credentials)?;

        let url = format!("{}/1.1/account/verify_credentials.json", self.api_base);
        let keys = OAuthKeys {
            consumer_key: &app.consumer_key,
            consumer_secret: &app.consumer_secret,
            token,
            token_secret,
        };
        let header = authorization_header("GET", &url, &[], &keys)?;

        let response = self
            .client
            .get(&url)
            .header("Authorization", header)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let account = response
            .json::<AccountInfo>()
            .await
            .map_err(|e| PlatformError::Posting(format!("Unexpected response: {}", e)))?;

        Ok(account)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Authentication(format!("{}: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(body),
        _ => PlatformError::Posting(format!("{}: {}", status, body)),
    };

    Err(error.into())
}

#[async_trait]
impl PlatformAdapter for MicroblogAdapter {
    fn platform(&self) -> Platform {
        Platform::Microblog
    }

    fn is_configured(&self) -> bool {
        self.app.is_some()
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        content: &str,
        media: &[String],
    ) -> Result<String> {
        let app = self.app()?;
        let (token, token_secret) = self.user_tokens(credentials)?;

        if !media.is_empty() {
            // The create endpoint takes uploaded media ids, not references
            tracing::debug!(count = media.len(), "Ignoring media references for microblog");
        }

        let url = format!("{}/2/tweets", self.api_base);
        let keys = OAuthKeys {
            consumer_key: &app.consumer_key,
            consumer_secret: &app.consumer_secret,
            token,
            token_secret,
        };
        let header = authorization_header("POST", &url, &[], &keys)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", header)
            .json(&CreatePostRequest { text: content })
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let created = response
            .json::<CreatePostResponse>()
            .await
            .map_err(|e| PlatformError::Posting(format!("Unexpected response: {}", e)))?;

        tracing::debug!(id = %created.data.id, "Microblog post created");
        Ok(created.data.id)
    }
}
