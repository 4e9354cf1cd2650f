//! Fake token provider for tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use super::client_credentials::Token;

#[derive(Debug, thiserror::Error)]
#[error("provider refused to issue a token")]
pub struct Refused;

#[derive(Clone, Default)]
pub struct IssueCounter(Arc<AtomicUsize>);

impl IssueCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Issues `token-1`, `token-2`, ... and counts every call.
pub struct SequenceProvider {
    issued: IssueCounter,
    ttl: Duration,
    fail: bool,
}

impl Default for SequenceProvider {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }
}

impl SequenceProvider {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            issued: IssueCounter::default(),
            ttl,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn counter(&self) -> IssueCounter {
        self.issued.clone()
    }
}

#[async_trait::async_trait]
impl super::TokenProvider for SequenceProvider {
    type Token = Token;
    type Error = Refused;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        let n = self.issued.0.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(Refused);
        }
        // Widen the window in which concurrent callers could race.
        tokio::task::yield_now().await;
        Ok(Token {
            access_token: format!("token-{n}"),
            issued_at: Instant::now(),
            expires_in: Some(self.ttl),
        })
    }
}
