use crate::error::PortError;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 bearer tokens for Google APIs.
pub enum AccessTokenSource {
    /// Token supplied through configuration; never refreshed
    Static(String),
    /// Token fetched from the GCE/Cloud Run metadata server and cached
    Metadata {
        http: reqwest::Client,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl AccessTokenSource {
    pub fn from_static(token: impl Into<String>) -> Self {
        AccessTokenSource::Static(token.into())
    }

    pub fn metadata(http: reqwest::Client) -> Self {
        AccessTokenSource::Metadata {
            http,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, PortError> {
        match self {
            AccessTokenSource::Static(token) => Ok(token.clone()),
            AccessTokenSource::Metadata { http, cached } => {
                let mut cached = cached.lock().await;
                if let Some((token, expires_at)) = cached.as_ref() {
                    if Instant::now() < *expires_at {
                        return Ok(token.clone());
                    }
                }

                let response = http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(format!(
                        "metadata server returned {} for access token",
                        response.status()
                    )
                    .into());
                }

                let body: TokenResponse = response.json().await?;
                let lifetime = Duration::from_secs(body.expires_in.unwrap_or(300));
                let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
                debug!(expires_in = ?lifetime, "Refreshed GCP access token");

                *cached = Some((body.access_token.clone(), expires_at));
                Ok(body.access_token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_is_returned_as_is() {
        let source = AccessTokenSource::from_static("ya29.token");
        assert_eq!(source.token().await.unwrap(), "ya29.token");
    }

    #[test]
    fn test_token_response_without_expiry() {
        let body: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(body.access_token, "abc");
        assert!(body.expires_in.is_none());
    }
}
