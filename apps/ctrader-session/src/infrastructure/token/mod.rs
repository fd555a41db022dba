//! HTTP Token Issuer
//!
//! Exchanges a refresh token for a new access token at the venue's OAuth
//! endpoint: `POST` with a form body, JSON response in camelCase.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::application::ports::{IssuedToken, RefreshError, RefreshRequest, TokenIssuer};

/// Response bodies longer than this are truncated in errors.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error_code: Option<String>,
    description: Option<String>,
}

/// Token issuer backed by the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    client: Client,
    url: String,
}

impl HttpTokenIssuer {
    /// Create an issuer posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RefreshError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Token endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn refresh(&self, request: RefreshRequest) -> Result<IssuedToken, RefreshError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", request.refresh_token.as_str()),
            ("client_id", request.client_id.as_str()),
            ("client_secret", request.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::Decode(e.to_string()))?;

        match parsed.access_token.filter(|token| !token.is_empty()) {
            Some(access_token) => Ok(IssuedToken {
                access_token,
                refresh_token: parsed.refresh_token.filter(|token| !token.is_empty()),
                expires_in: parsed.expires_in,
            }),
            None => Err(RefreshError::MissingToken {
                error_code: parsed.error_code,
                description: parsed.description,
            }),
        }
    }
}
