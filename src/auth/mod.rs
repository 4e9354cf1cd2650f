//! Authorization logic.

pub mod client;
pub mod client_credentials;
pub mod token_manager;

#[cfg(test)]
pub(crate) mod testing;

use std::time::{Duration, Instant};

#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    type Token: Token;
    type Error: Send + Sync;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error>;
}

pub trait Token: Send {
    fn access_token(&self) -> &str;
}

/// A token that knows when it was issued and how long the issuer declared it valid for.
///
/// The lifetime is informational only: tokens are renewed when a downstream API
/// answers 401, never ahead of time.
pub trait ExpiringToken: Token {
    fn issued_at(&self) -> Instant;
    fn expires_in(&self) -> Option<Duration>;
}
