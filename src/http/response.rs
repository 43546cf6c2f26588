//! Buffered HTTP response.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use url::Url;

/// HTTP response with its body already read.
///
/// The body is buffered inside the call so that reading it is covered by the
/// call's deadline and cancellation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    body: Bytes,
}

impl HttpResponse {
    /// Wrap a transport response together with the URL it was fetched from.
    pub fn from_parts(resp: http::Response<Bytes>, url: Url) -> Self {
        let (parts, body) = resp.into_parts();
        Self { status: parts.status, version: parts.version, headers: parts.headers, url, body }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The resolved URL the request was sent to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Decode the body as JSON.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        crate::codec::decode(&self.body)
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 4xx or 5xx.
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static [u8]) -> HttpResponse {
        let resp = http::Response::builder().status(status).body(Bytes::from_static(body)).unwrap();
        HttpResponse::from_parts(resp, Url::parse("http://example.com/x").unwrap())
    }

    #[test]
    fn test_classification() {
        assert!(response(204, b"").is_success());
        assert!(!response(204, b"").is_error());
        assert!(response(404, b"").is_error());
        assert!(response(503, b"").is_error());
        assert!(!response(302, b"").is_success());
        assert!(!response(302, b"").is_error());
    }

    #[test]
    fn test_text_and_url() {
        let resp = response(200, b"hello");
        assert_eq!(resp.text().unwrap(), "hello");
        assert_eq!(resp.url().path(), "/x");
        assert!(matches!(response(200, b"\xff\xfe").text(), Err(NetError::InvalidUtf8)));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_error_is_codec() {
        let err = response(200, b"not json").json::<serde_json::Value>().unwrap_err();
        assert!(err.is_codec());
        assert!(!err.is_transport());
    }
}
