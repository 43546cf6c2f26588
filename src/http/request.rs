//! Request value type and its builder.

use super::headers::parse_header;
use super::requestbody::RequestBody;
use crate::base::callcontext::CallContext;
use crate::base::neterror::NetError;
use crate::urlutil;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

/// Target of a request: absolute, or relative to a session base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestUrl {
    Absolute(Url),
    Relative(String),
}

impl RequestUrl {
    /// Parse an absolute URL or a relative reference.
    pub fn parse(raw: &str) -> Result<Self, NetError> {
        let invalid = |reason: String| NetError::InvalidUrl { url: raw.to_string(), reason };
        if raw.trim().is_empty() {
            return Err(invalid("empty URL".to_string()));
        }
        match Url::parse(raw) {
            Ok(url) => Ok(RequestUrl::Absolute(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                // Validate the reference against a throwaway base.
                let probe = Url::parse("http://relative.invalid/").map_err(|e| invalid(e.to_string()))?;
                probe.join(raw).map_err(|e| invalid(e.to_string()))?;
                Ok(RequestUrl::Relative(raw.to_string()))
            }
            Err(e) => Err(invalid(e.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestUrl::Absolute(url) => url.as_str(),
            RequestUrl::Relative(raw) => raw,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, RequestUrl::Relative(_))
    }

    fn with_query(self, params: &[(String, String)]) -> Self {
        match self {
            RequestUrl::Absolute(mut url) => {
                if !params.is_empty() {
                    url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (&**k, &**v)));
                }
                RequestUrl::Absolute(url)
            }
            RequestUrl::Relative(raw) => RequestUrl::Relative(urlutil::append_query(&raw, params)),
        }
    }
}

impl From<Url> for RequestUrl {
    fn from(url: Url) -> Self {
        RequestUrl::Absolute(url)
    }
}

/// A logical HTTP request.
///
/// The session layer reads the method, URL and body as given; it only adds
/// headers (in a merged copy) and records the resolved URL.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Option<RequestUrl>,
    resolved: Option<Url>,
    headers: HeaderMap,
    body: RequestBody,
    context: CallContext,
}

impl Default for Request {
    /// A GET with no URL. Executing it fails with [`NetError::MissingUrl`].
    fn default() -> Self {
        Self {
            method: Method::GET,
            url: None,
            resolved: None,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            context: CallContext::background(),
        }
    }
}

impl Request {
    pub fn new(method: Method, url: impl Into<RequestUrl>) -> Self {
        Self { method, url: Some(url.into()), ..Default::default() }
    }

    /// Start building a request. Errors surface from [`RequestBuilder::build`].
    pub fn builder<M>(method: M, url: &str) -> RequestBuilder
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        RequestBuilder::new(method, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL as built, possibly relative.
    pub fn url(&self) -> Option<&RequestUrl> {
        self.url.as_ref()
    }

    /// The absolute URL the session resolved for this request.
    pub fn resolved_url(&self) -> Option<&Url> {
        self.resolved.as_ref()
    }

    pub(crate) fn set_resolved_url(&mut self, url: Url) {
        self.resolved = Some(url);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn set_context(&mut self, context: CallContext) {
        self.context = context;
    }
}

/// Fluent builder for [`Request`].
///
/// The first error encountered is kept and returned by [`build`](Self::build).
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: Option<RequestUrl>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: RequestBody,
    context: CallContext,
    error: Option<NetError>,
}

impl RequestBuilder {
    pub fn new<M>(method: M, url: &str) -> Self
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        let mut error = None;
        let method = Method::try_from(method).unwrap_or_else(|e| {
            error = Some(NetError::InvalidMethod(e.into().to_string()));
            Method::GET
        });
        let url = match RequestUrl::parse(url) {
            Ok(url) => Some(url),
            Err(e) => {
                error.get_or_insert(e);
                None
            }
        };
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            context: CallContext::background(),
            error,
        }
    }

    fn record(
        &mut self,
        result: Result<(HeaderName, HeaderValue), NetError>,
    ) -> Option<(HeaderName, HeaderValue)> {
        match result {
            Ok(pair) => Some(pair),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Add a header value, keeping existing values for the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Some((name, value)) = self.record(parse_header(name, value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set a header, replacing this request's existing values for the name.
    ///
    /// Session default headers are merged separately and still appear.
    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        if let Some((name, value)) = self.record(parse_header(name, value)) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Encode `value` as the JSON body and default the content type.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Self {
        match crate::codec::encode(value) {
            Ok(bytes) => {
                self.body = RequestBody::Bytes(bytes);
                self.headers
                    .entry(http::header::CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static(crate::codec::CONTENT_TYPE_JSON));
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Attach a cancellation/deadline context.
    pub fn context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Result<Request, NetError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let url = self.url.ok_or(NetError::MissingUrl)?.with_query(&self.query);
        Ok(Request {
            method: self.method,
            url: Some(url),
            resolved: None,
            headers: self.headers,
            body: self.body,
            context: self.context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_and_relative() {
        assert!(matches!(RequestUrl::parse("https://host/a"), Ok(RequestUrl::Absolute(_))));
        assert_eq!(RequestUrl::parse("/foo").unwrap(), RequestUrl::Relative("/foo".to_string()));
        assert!(matches!(RequestUrl::parse(""), Err(NetError::InvalidUrl { .. })));
        assert!(matches!(RequestUrl::parse("http://[::1"), Err(NetError::InvalidUrl { .. })));
    }

    #[test]
    fn test_builder_headers_and_query() {
        let req = Request::builder("POST", "https://host/items")
            .header("X-Tag", "a")
            .header("X-Tag", "b")
            .set_header("X-Id", "1")
            .set_header("X-Id", "2")
            .query("page", "3")
            .body("payload")
            .build()
            .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.url().unwrap().as_str(), "https://host/items?page=3");
        assert_eq!(req.headers().get_all("x-tag").iter().count(), 2);
        let ids: Vec<_> = req.headers().get_all("x-id").iter().collect();
        assert_eq!(ids, vec!["2"]);
        assert_eq!(req.body().len(), Some(7));
    }

    #[test]
    fn test_builder_reports_first_error() {
        let err = Request::builder(Method::GET, "http://[bad").header("bad name", "x").build();
        assert!(matches!(err, Err(NetError::InvalidUrl { .. })));

        let err = Request::builder(Method::GET, "/ok").header("bad name", "x").build();
        assert!(matches!(err, Err(NetError::InvalidHeader { .. })));

        let err = Request::builder("BAD METHOD", "/ok").build();
        assert!(matches!(err, Err(NetError::InvalidMethod(_))));
    }

    #[test]
    fn test_relative_query() {
        let req = Request::builder(Method::GET, "/search").query("q", "a b").build().unwrap();
        assert_eq!(req.url().unwrap().as_str(), "/search?q=a+b");
    }

    #[test]
    fn test_default_request_has_no_url() {
        let req = Request::default();
        assert!(req.url().is_none());
        assert!(req.context().deadline().is_none());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_body_sets_content_type() {
        let req = Request::builder(Method::POST, "/items")
            .json(&serde_json::json!({"id": 1}))
            .build()
            .unwrap();
        assert_eq!(req.headers().get(http::header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(req.body().len(), Some(8));
    }
}
