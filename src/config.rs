//! Process configuration read from the environment at startup.

pub const DEFAULT_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";
pub const DEFAULT_AEM_SCOPE: &str =
    "openid,AdobeID,read_organizations,additional_info.projectedProductContext";
pub const DEFAULT_WORKFRONT_SCOPE: &str = "openid,AdobeID,workfront";
pub const DEFAULT_WORKFRONT_API_VERSION: &str = "v15.0";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("env var {0} is not set")]
    Missing(&'static str),
    #[error("env var {key} is not a usable base URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },
}

/// OAuth client-credentials settings, immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub scope: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AemConfig {
    pub host: reqwest::Url,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkfrontConfig {
    pub host: reqwest::Url,
    pub api_version: String,
    pub credentials: Credentials,
}

/// Reads variables through `lookup`, treating empty values as absent.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, Error> {
        self.optional(key).ok_or(Error::Missing(key))
    }

    fn url(&self, key: &'static str) -> Result<reqwest::Url, Error> {
        let raw = self.required(key)?;
        let url = reqwest::Url::parse(&raw).map_err(|err| Error::InvalidUrl {
            key,
            reason: err.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                key,
                reason: "not a hierarchical URL".into(),
            });
        }
        Ok(url)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_owned())
    }

    fn credentials(&self, prefix: &Prefix, default_scope: &str) -> Result<Credentials, Error> {
        Ok(Credentials {
            client_id: self.required(prefix.client_id)?,
            client_secret: self.required(prefix.client_secret)?,
            token_url: self.or(prefix.token_url, DEFAULT_TOKEN_URL),
            scope: self.or(prefix.scope, default_scope),
        })
    }
}

struct Prefix {
    client_id: &'static str,
    client_secret: &'static str,
    token_url: &'static str,
    scope: &'static str,
}

const AEM: Prefix = Prefix {
    client_id: "AEM_CLIENT_ID",
    client_secret: "AEM_CLIENT_SECRET",
    token_url: "AEM_TOKEN_URL",
    scope: "AEM_SCOPE",
};

const WORKFRONT: Prefix = Prefix {
    client_id: "WORKFRONT_CLIENT_ID",
    client_secret: "WORKFRONT_CLIENT_SECRET",
    token_url: "WORKFRONT_TOKEN_URL",
    scope: "WORKFRONT_SCOPE",
};

impl AemConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let env = Env(lookup);
        let credentials = env.credentials(&AEM, DEFAULT_AEM_SCOPE)?;
        let host = env.url("AEM_HOST")?;
        Ok(Self { host, credentials })
    }
}

impl WorkfrontConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let env = Env(lookup);
        let credentials = env.credentials(&WORKFRONT, DEFAULT_WORKFRONT_SCOPE)?;
        let host = env.url("WORKFRONT_HOST")?;
        let api_version = env.or("WORKFRONT_API_VERSION", DEFAULT_WORKFRONT_API_VERSION);
        Ok(Self {
            host,
            api_version,
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn aem_defaults_token_url_and_scope() {
        let config = AemConfig::from_lookup(lookup(&[
            ("AEM_HOST", "https://author-p1-e2.adobeaemcloud.com/"),
            ("AEM_CLIENT_ID", "id"),
            ("AEM_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.host.as_str(), "https://author-p1-e2.adobeaemcloud.com/");
        assert_eq!(config.credentials.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.credentials.scope, DEFAULT_AEM_SCOPE);
    }

    #[test]
    fn workfront_overrides() {
        let config = WorkfrontConfig::from_lookup(lookup(&[
            ("WORKFRONT_HOST", "https://acme.my.workfront.com"),
            ("WORKFRONT_CLIENT_ID", "id"),
            ("WORKFRONT_CLIENT_SECRET", "secret"),
            ("WORKFRONT_TOKEN_URL", "https://idp.example.com/token"),
            ("WORKFRONT_SCOPE", "custom"),
            ("WORKFRONT_API_VERSION", "v18.0"),
        ]))
        .unwrap();

        assert_eq!(config.api_version, "v18.0");
        assert_eq!(config.credentials.token_url, "https://idp.example.com/token");
        assert_eq!(config.credentials.scope, "custom");
    }

    /// Loads with every proper subset of `required` set and checks that the
    /// reported key is one of the absent ones.
    fn assert_missing_combinations_fail(
        required: [&'static str; 3],
        load: impl Fn(&[(&str, &str)]) -> Result<(), Error>,
    ) {
        for mask in 0..(1 << required.len()) - 1 {
            let present: Vec<_> = required
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, key)| (*key, "https://host.example.com"))
                .collect();

            let key = match load(&present) {
                Err(Error::Missing(key)) => key,
                other => panic!("unexpected result for {present:?}: {other:?}"),
            };
            assert!(required.contains(&key), "reported unrelated key {key}");
            assert!(
                !present.iter().any(|(k, _)| *k == key),
                "reported {key} missing although it was set"
            );
        }
    }

    #[test]
    fn every_missing_credential_combination_fails() {
        assert_missing_combinations_fail(
            ["AEM_HOST", "AEM_CLIENT_ID", "AEM_CLIENT_SECRET"],
            |vars| AemConfig::from_lookup(lookup(vars)).map(drop),
        );
        assert_missing_combinations_fail(
            ["WORKFRONT_HOST", "WORKFRONT_CLIENT_ID", "WORKFRONT_CLIENT_SECRET"],
            |vars| WorkfrontConfig::from_lookup(lookup(vars)).map(drop),
        );
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = WorkfrontConfig::from_lookup(lookup(&[
            ("WORKFRONT_HOST", "https://acme.my.workfront.com"),
            ("WORKFRONT_CLIENT_ID", "id"),
            ("WORKFRONT_CLIENT_SECRET", "  "),
        ]))
        .unwrap_err();

        assert_eq!(err, Error::Missing("WORKFRONT_CLIENT_SECRET"));
    }

    #[test]
    fn host_must_be_a_base_url() {
        let err = AemConfig::from_lookup(lookup(&[
            ("AEM_HOST", "mailto:ops@example.com"),
            ("AEM_CLIENT_ID", "id"),
            ("AEM_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { key: "AEM_HOST", .. }));

        let err = AemConfig::from_lookup(lookup(&[
            ("AEM_HOST", "author.example.com"),
            ("AEM_CLIENT_ID", "id"),
            ("AEM_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { key: "AEM_HOST", .. }));
    }

    #[test]
    fn debug_redacts_secret() {
        let credentials = Credentials {
            client_id: "id".into(),
            client_secret: "hunter2".into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            scope: DEFAULT_AEM_SCOPE.into(),
        };

        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
