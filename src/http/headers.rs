//! Header helpers: parsing, auth values and the session/request merge.

use crate::base::neterror::NetError;
use base64::{engine::general_purpose, Engine as _};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Parse a name/value pair, reporting the offending name on failure.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), NetError> {
    let invalid = || NetError::InvalidHeader { name: name.to_string() };
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((name, value))
}

/// `Authorization: Basic <base64(user:pass)>`.
pub fn basic_auth(user: &str, pass: &str) -> HeaderValue {
    let encoded = general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
    let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    value.set_sensitive(true);
    value
}

/// `Authorization: Bearer <token>`.
pub fn bearer_auth(token: &str) -> Result<HeaderValue, NetError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| NetError::InvalidHeader { name: http::header::AUTHORIZATION.to_string() })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Merge session defaults with request headers.
///
/// Every session value is appended first, then every request value. Nothing
/// is replaced: a name present at both levels carries both values, session
/// value first. `set_header` on a request only collapses values within the
/// request's own map.
pub fn merge_headers(session: &HeaderMap, request: &HeaderMap) -> HeaderMap {
    let mut merged = HeaderMap::with_capacity(session.len() + request.len());
    for (name, value) in session.iter().chain(request.iter()) {
        merged.append(name.clone(), value.clone());
    }
    merged
}
