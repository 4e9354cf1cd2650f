//! Authorize using the client credentials flow.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::{
    config::Credentials,
    utils::{check_status, ServerError},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("form encoding: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("token endpoint rejected the credentials: {0}")]
    Rejected(#[from] ServerError),
    #[error("token endpoint responded without issuing an access token")]
    NoTokenIssued,
}

pub struct ClientCredentials {
    pub client: reqwest::Client,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub scope: String,
}

impl ClientCredentials {
    pub fn new(client: reqwest::Client, credentials: &Credentials) -> Self {
        Self {
            client,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            token_url: credentials.token_url.clone(),
            scope: credentials.scope.clone(),
        }
    }

    /// Perform the client credentials flow.
    pub async fn perform(&self) -> Result<AuthResponse, Error> {
        let params = &[
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let params = serde_urlencoded::to_string(params)?;

        let req = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(params)
            .build()?;

        debug!(message = "Requesting token", token_url = %self.token_url);

        let res = self.client.execute(req).await?;
        let res = check_status(res).await?;
        let login_response: AuthResponse = res.json().await?;

        match login_response.access_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(login_response),
            _ => Err(Error::NoTokenIssued),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// The requested access token.
    #[serde(default)]
    access_token: Option<String>,
    /// The amount of time that an access token is valid (in seconds).
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub issued_at: Instant,
    pub expires_in: Option<Duration>,
}

impl From<AuthResponse> for Token {
    fn from(auth: AuthResponse) -> Self {
        let AuthResponse {
            access_token,
            expires_in,
        } = auth;
        Self {
            access_token: access_token.unwrap_or_default(),
            issued_at: Instant::now(),
            expires_in: expires_in.map(Duration::from_secs),
        }
    }
}

#[async_trait::async_trait]
impl super::TokenProvider for ClientCredentials {
    type Token = Token;
    type Error = Error;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        let auth_response = self.perform().await?;
        let token = auth_response.into();
        Ok(token)
    }
}

impl super::Token for Token {
    fn access_token(&self) -> &str {
        self.access_token.as_str()
    }
}

impl super::ExpiringToken for Token {
    fn issued_at(&self) -> Instant {
        self.issued_at
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}
