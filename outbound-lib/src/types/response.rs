use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use url::Url;

/// A fully read response from an upstream host.
///
/// The body is buffered, so the response can be cloned and handed around
/// after the connection has been returned to the pool.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: Url,
    /// Raw response body
    pub body: Vec<u8>,
    /// Transport attempts it took to get this response
    pub attempts: u32,
}

impl UpstreamResponse {
    pub(crate) async fn from_response(
        response: reqwest::Response,
        attempts: u32,
    ) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?.to_vec();

        Ok(Self {
            status,
            headers,
            url,
            body,
            attempts,
        })
    }

    /// The body as text, replacing invalid UTF-8 sequences
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}
