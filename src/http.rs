use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

const USER_AGENT: &str = concat!("grading-watch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 6;
const PREVIEW_CHARS: usize = 180;

pub fn build_client(timeout_secs: u64) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs.max(1))))
        .build()
}

/// Sends a prepared GET once and decodes a JSON body.
pub async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, FetchError> {
    let response = request.send().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    let body = response.text().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            preview: preview(&body),
        });
    }
    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

pub fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let body = "é".repeat(400);
        let out = preview(&body);
        assert_eq!(out.chars().count(), 180);
        assert_eq!(preview("short"), "short");
    }
}
