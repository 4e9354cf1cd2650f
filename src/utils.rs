#[derive(Debug, thiserror::Error)]
#[error("{status_code} status code: {body}")]
pub struct ServerError {
    pub status_code: u16,
    pub body: String,
}

/// Pass successful responses through, turn anything else into a [`ServerError`]
/// carrying the status and the raw response body.
pub async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ServerError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(ServerError {
            status_code: status.as_u16(),
            body,
        });
    }
    Ok(res)
}

/// Append path segments to `base`, percent-encoding each one.
pub fn join_segments<'a>(
    base: &reqwest::Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> reqwest::Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
