use cookie::time::OffsetDateTime;
use cookie::Cookie;
use dashmap::DashMap;
use http::HeaderValue;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Maximum cookies per domain.
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Cookie storage consulted by a session on every call.
pub trait CookieJar: Send + Sync {
    /// Store the `Set-Cookie` values received from `url`.
    fn set_cookies(&self, url: &Url, set_cookie: &mut dyn Iterator<Item = &HeaderValue>);

    /// The `Cookie` header value to send to `url`, if any cookie matches.
    fn cookies(&self, url: &Url) -> Option<HeaderValue>;
}

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub host_only: bool,
    pub secure: bool,
    pub expires: Option<OffsetDateTime>,
    pub creation_time: OffsetDateTime,
}

impl StoredCookie {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|t| t <= now)
    }
}

/// In-memory cookie jar with RFC 6265 domain, path and secure matching.
#[derive(Clone, Default)]
pub struct MemoryCookieJar {
    // Map<Domain, List<Cookie>>
    store: Arc<DashMap<String, Vec<StoredCookie>>>,
}

impl std::fmt::Debug for MemoryCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCookieJar").field("cookies", &self.total_cookie_count()).finish()
    }
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `Set-Cookie` line received from `url` and store it.
    ///
    /// Returns false if the line was rejected.
    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) -> bool {
        let Ok(parsed) = Cookie::parse(cookie_line) else {
            debug!(cookie = %cookie_line, "failed to parse cookie");
            return false;
        };
        let host = url.host_str().unwrap_or("").to_lowercase();
        let now = OffsetDateTime::now_utc();

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_lowercase();
                // A response may only set cookies for its own domain or a parent.
                if !d.contains('.') || !Self::domain_matches(&d, &host, false) {
                    debug!(cookie = %parsed.name(), domain = %d, host = %host, "rejecting foreign cookie domain");
                    return false;
                }
                (d, false)
            }
            None => (host, true),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => Self::default_path(url.path()),
        };

        // Max-Age wins over Expires.
        let expires = match parsed.max_age() {
            Some(age) => Some(now + age),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        let cookie = StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            host_only,
            secure: parsed.secure().unwrap_or(false),
            expires,
            creation_time: now,
        };
        self.set_cookie(cookie, now);
        true
    }

    fn set_cookie(&self, cookie: StoredCookie, now: OffsetDateTime) {
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();

        // Remove existing if name/path match
        entry.retain(|c| c.name != cookie.name || c.path != cookie.path);

        // An already-expired cookie only deletes.
        if cookie.is_expired(now) {
            return;
        }

        // Evict the oldest when the domain is full
        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            match entry.iter().enumerate().min_by_key(|(_, c)| c.creation_time).map(|(i, _)| i) {
                Some(oldest_idx) => {
                    entry.remove(oldest_idx);
                }
                None => break,
            }
        }

        entry.push(cookie);
    }

    /// Get cookies matching the URL, longest path first.
    pub fn get_cookies_for_url(&self, url: &Url) -> Vec<StoredCookie> {
        let mut result = Vec::new();
        let host = url.host_str().unwrap_or("").to_lowercase();
        let now = OffsetDateTime::now_utc();

        for domain in Self::get_matching_domains(&host) {
            if let Some(entry) = self.store.get(&domain) {
                for cookie in entry.iter() {
                    if !Self::domain_matches(&cookie.domain, &host, cookie.host_only) {
                        continue;
                    }
                    if !Self::path_matches(&cookie.path, url.path()) {
                        continue;
                    }
                    if cookie.secure && url.scheme() != "https" {
                        continue;
                    }
                    if cookie.is_expired(now) {
                        continue;
                    }
                    result.push(cookie.clone());
                }
            }
        }

        result.sort_by(|a, b| {
            b.path.len().cmp(&a.path.len()).then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    /// Get total cookie count.
    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// RFC 6265 domain matching.
    fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
        if host_only {
            return cookie_domain.eq_ignore_ascii_case(request_host);
        }
        if request_host.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }
        request_host.len() > cookie_domain.len()
            && request_host.to_ascii_lowercase().ends_with(&format!(".{}", cookie_domain.to_ascii_lowercase()))
    }

    /// RFC 6265 path matching.
    fn path_matches(cookie_path: &str, request_path: &str) -> bool {
        if request_path == cookie_path {
            return true;
        }
        if let Some(rest) = request_path.strip_prefix(cookie_path) {
            return cookie_path.ends_with('/') || rest.starts_with('/');
        }
        false
    }

    /// RFC 6265 default-path: the request path up to its last `/`.
    fn default_path(request_path: &str) -> String {
        match request_path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => request_path[..idx].to_string(),
        }
    }

    /// The host itself and all parent domains.
    fn get_matching_domains(host: &str) -> Vec<String> {
        let mut domains = vec![host.to_string()];
        let parts: Vec<&str> = host.split('.').collect();
        for i in 1..parts.len().saturating_sub(1) {
            domains.push(parts[i..].join("."));
        }
        domains
    }
}

impl CookieJar for MemoryCookieJar {
    fn set_cookies(&self, url: &Url, set_cookie: &mut dyn Iterator<Item = &HeaderValue>) {
        for value in set_cookie {
            if let Ok(line) = value.to_str() {
                self.parse_and_save_cookie(url, line);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let cookies = self.get_cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        let header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}
