//! Outbound API requests carrying the managed bearer token.

use reqwest::{header::HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    token_manager::{self, TokenManager},
    ExpiringToken, TokenProvider,
};
use crate::utils::{check_status, ServerError};

#[derive(Debug, thiserror::Error)]
pub enum Error<AuthError> {
    #[error("auth: {0}")]
    Auth(#[source] token_manager::Error<AuthError>),
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("server: {0}")]
    Server(#[from] ServerError),
}

/// Request body, kept around so the request can be re-issued after a renewal.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

pub struct AuthenticatedClient<Provider>
where
    Provider: TokenProvider,
{
    client: reqwest::Client,
    tokens: TokenManager<Provider>,
    headers: HeaderMap,
}

impl<Provider> AuthenticatedClient<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
{
    pub fn new(client: reqwest::Client, tokens: TokenManager<Provider>) -> Self {
        Self {
            client,
            tokens,
            headers: HeaderMap::new(),
        }
    }

    /// Headers added to every request next to `Authorization`.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn tokens(&self) -> &TokenManager<Provider> {
        &self.tokens
    }

    fn build_request(
        &self,
        auth_token: &str,
        method: Method,
        url: &str,
        payload: &Payload,
    ) -> Result<reqwest::Request, Error<Provider::Error>> {
        let builder = self
            .client
            .request(method.clone(), url)
            .headers(self.headers.clone())
            .bearer_auth(auth_token);

        let builder = match payload {
            Payload::Json(value) => builder.json(value),
            Payload::Form(fields) => builder.form(fields),
            Payload::Empty if method == Method::POST => {
                builder.header(reqwest::header::CONTENT_LENGTH, 0)
            }
            Payload::Empty => builder,
        };

        builder.build().map_err(Error::Reqwest)
    }

    /// Send a request with the current token.
    ///
    /// A 401 renews the token and re-sends the request exactly once; whatever
    /// the second attempt answers is final. Other non-success statuses are
    /// returned as [`Error::Server`] without retrying.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        payload: &Payload,
    ) -> Result<reqwest::Response, Error<Provider::Error>> {
        let token = self.tokens.ensure_valid().await.map_err(Error::Auth)?;
        let request = self.build_request(&token.access_token, method.clone(), url, payload)?;
        let res = self.client.execute(request).await?;

        if res.status() != StatusCode::UNAUTHORIZED {
            debug!(message = "Request completed", %method, %url, status = res.status().as_u16());
            return Ok(check_status(res).await?);
        }

        warn!(message = "Token rejected, renewing and retrying once", %method, %url);

        let token = self
            .tokens
            .renew(&token.access_token)
            .await
            .map_err(Error::Auth)?;
        let request = self.build_request(&token.access_token, method.clone(), url, payload)?;
        let res = self.client.execute(request).await?;

        debug!(message = "Retried request completed", %method, %url, status = res.status().as_u16());

        Ok(check_status(res).await?)
    }

    pub async fn send_json<T>(
        &self,
        method: Method,
        url: &str,
        payload: &Payload,
    ) -> Result<T, Error<Provider::Error>>
    where
        T: DeserializeOwned,
    {
        let res = self.send(method, url, payload).await?;
        res.json().await.map_err(Error::Reqwest)
    }

    pub async fn send_text(
        &self,
        method: Method,
        url: &str,
        payload: &Payload,
    ) -> Result<String, Error<Provider::Error>> {
        let res = self.send(method, url, payload).await?;
        res.text().await.map_err(Error::Reqwest)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::auth::testing::SequenceProvider;

    fn client(provider: SequenceProvider) -> AuthenticatedClient<SequenceProvider> {
        AuthenticatedClient::new(reqwest::Client::new(), TokenManager::new(provider))
    }

    #[tokio::test]
    async fn attaches_bearer_and_extra_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .match_header("authorization", "Bearer token-1")
            .match_header("x-api-key", "my-client")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("my-client"));
        let client = client(SequenceProvider::default()).with_headers(headers);

        let body = client
            .send_text(Method::GET, &format!("{}/thing", server.url()), &Payload::Empty)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn unauthorized_renews_and_retries_once() {
        let mut server = Server::new_async().await;
        let rejected = server
            .mock("POST", "/items")
            .match_header("authorization", "Bearer token-1")
            .match_body(Matcher::Json(json!({"name": "a"})))
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/items")
            .match_header("authorization", "Bearer token-2")
            .match_body(Matcher::Json(json!({"name": "a"})))
            .with_status(200)
            .with_body(r#"{"id":"42"}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = SequenceProvider::default();
        let issued = provider.counter();
        let client = client(provider);

        let body: serde_json::Value = client
            .send_json(
                Method::POST,
                &format!("{}/items", server.url()),
                &Payload::Json(json!({"name": "a"})),
            )
            .await
            .unwrap();

        rejected.assert_async().await;
        accepted.assert_async().await;
        assert_eq!(body, json!({"id": "42"}));
        assert_eq!(issued.get(), 2);
        assert_eq!(client.tokens().cached().await.unwrap().access_token, "token-2");
    }

    #[tokio::test]
    async fn second_unauthorized_is_final() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer token-1")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer token-2")
            .with_status(401)
            .with_body("still expired")
            .expect(1)
            .create_async()
            .await;
        let third = server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer token-3")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let provider = SequenceProvider::default();
        let issued = provider.counter();
        let client = client(provider);

        let err = client
            .send(Method::GET, &format!("{}/items", server.url()), &Payload::Empty)
            .await
            .unwrap_err();

        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
        match err {
            Error::Server(ServerError { status_code, body }) => {
                assert_eq!(status_code, 401);
                assert_eq!(body, "still expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(issued.get(), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/items/1")
            .with_status(503)
            .with_body("maintenance")
            .expect(1)
            .create_async()
            .await;

        let provider = SequenceProvider::default();
        let issued = provider.counter();
        let client = client(provider);

        let err = client
            .send(Method::DELETE, &format!("{}/items/1", server.url()), &Payload::Empty)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err,
            Error::Server(ServerError { status_code: 503, .. })
        ));
        assert_eq!(issued.get(), 1);
    }

    #[tokio::test]
    async fn retry_after_renewal_can_fail_with_other_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer token-1")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer token-2")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = client(SequenceProvider::default());

        let err = client
            .send(Method::GET, &format!("{}/items", server.url()), &Payload::Empty)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Server(ServerError { status_code: 403, .. })
        ));
    }

    #[tokio::test]
    async fn token_failure_sends_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/items")
            .expect(0)
            .create_async()
            .await;

        let client = client(SequenceProvider::failing());

        let err = client
            .send(Method::GET, &format!("{}/items", server.url()), &Payload::Empty)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn form_payload_is_url_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bin/replicate.json")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("cmd".into(), "Activate".into()),
                Matcher::UrlEncoded("path".into(), "/content/site/en".into()),
            ]))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let client = client(SequenceProvider::default());
        let payload = Payload::Form(vec![
            ("cmd".into(), "Activate".into()),
            ("path".into(), "/content/site/en".into()),
        ]);

        client
            .send(
                Method::POST,
                &format!("{}/bin/replicate.json", server.url()),
                &payload,
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
