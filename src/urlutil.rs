//! URL reference resolution and query building.

use crate::base::neterror::NetError;
use url::Url;

/// Resolve `reference` against `base`.
///
/// An absolute reference is returned unchanged; a relative one is completed
/// with standard reference resolution.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, NetError> {
    base.join(reference)
        .map_err(|e| NetError::InvalidUrl { url: reference.to_string(), reason: e.to_string() })
}

/// Parse `raw` and append `params` to its query string.
pub fn build_with_query<K, V>(raw: &str, params: &[(K, V)]) -> Result<Url, NetError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = Url::parse(raw)
        .map_err(|e| NetError::InvalidUrl { url: raw.to_string(), reason: e.to_string() })?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
    }
    Ok(url)
}

/// Append encoded `params` to a relative reference, keeping any fragment last.
pub(crate) fn append_query<K, V>(reference: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return reference.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish();
    let (head, fragment) = match reference.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (reference, None),
    };
    let sep = if !head.contains('?') {
        "?"
    } else if head.ends_with('?') || head.ends_with('&') {
        ""
    } else {
        "&"
    };
    match fragment {
        Some(fragment) => format!("{head}{sep}{encoded}#{fragment}"),
        None => format!("{head}{sep}{encoded}"),
    }
}
