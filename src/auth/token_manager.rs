use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::TokenProvider;

/// Owns the single live bearer token of an adapter.
///
/// The cache lock is held while a token is being fetched, so concurrent callers
/// wait for the one in-flight acquisition instead of each calling the provider.
pub struct TokenManager<Provider>
where
    Provider: TokenProvider,
{
    provider: Provider,
    cached_token: Mutex<Option<Record>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<RenewalError> {
    #[error("token provider: {0}")]
    Provider(#[source] RenewalError),
}

#[derive(Debug, Clone)]
pub struct Record {
    pub access_token: String,
    pub issued_at: Instant,
    pub expires_in: Option<Duration>,
}

impl Record {
    pub fn from_expiring_token<T: super::ExpiringToken>(token: T) -> Self {
        Self {
            access_token: token.access_token().to_owned(),
            issued_at: token.issued_at(),
            expires_in: token.expires_in(),
        }
    }

    /// When the issuer said the token stops being valid. Used for logging only.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_in.map(|ttl| self.issued_at + ttl)
    }
}

impl<Provider> TokenManager<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: super::ExpiringToken,
{
    pub fn new(provider: Provider) -> Self {
        let cached_token = Mutex::const_new(None);
        Self {
            provider,
            cached_token,
        }
    }

    async fn fetch_new_token(&self) -> Result<Record, Error<Provider::Error>> {
        let token = self
            .provider
            .get_auth_token()
            .await
            .map_err(Error::Provider)?;
        let record = Record::from_expiring_token(token);
        Ok(record)
    }

    async fn replace_token(
        &self,
        cached_token: &mut MutexGuard<'_, Option<Record>>,
    ) -> Result<Record, Error<Provider::Error>> {
        let new_record = self.fetch_new_token().await?;
        cached_token.replace(new_record.clone());

        debug!(message = "Got new token", token_expires_at = ?new_record.expires_at());

        Ok(new_record)
    }

    /// Fetch a fresh token from the provider and make it the cached one.
    pub async fn acquire(&self) -> Result<Record, Error<Provider::Error>> {
        let mut cached_token = self.cached_token.lock().await;
        info!(
            message = "Acquiring a new token",
            token_is_stale = cached_token.is_some(),
        );
        self.replace_token(&mut cached_token).await
    }

    /// Return the cached token, acquiring one only when nothing is cached.
    ///
    /// This is a presence check: a cached token past its declared lifetime is
    /// still returned, staleness is discovered by the downstream API.
    pub async fn ensure_valid(&self) -> Result<Record, Error<Provider::Error>> {
        let mut cached_token = self.cached_token.lock().await;

        if let Some(cached_token) = &*cached_token {
            debug!(message = "Using preexisting token", token_expires_at = ?cached_token.expires_at());
            return Ok(cached_token.clone());
        }

        info!(message = "No token cached, about to get a new one");

        self.replace_token(&mut cached_token).await
    }

    /// Replace a token a downstream API has rejected.
    ///
    /// If the cached token no longer matches `rejected`, a concurrent request
    /// already renewed it and the current value is returned without calling the
    /// provider again.
    pub async fn renew(&self, rejected: &str) -> Result<Record, Error<Provider::Error>> {
        let mut cached_token = self.cached_token.lock().await;

        if let Some(current) = &*cached_token {
            if current.access_token != rejected {
                debug!(message = "Token already renewed by a concurrent request");
                return Ok(current.clone());
            }
        }

        info!(message = "Renewing rejected token");

        self.replace_token(&mut cached_token).await
    }

    /// The currently cached token, if any. Never contacts the provider.
    pub async fn cached(&self) -> Option<Record> {
        self.cached_token.lock().await.clone()
    }
}
