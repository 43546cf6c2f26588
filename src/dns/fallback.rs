//! Custom name-server resolver using hickory-dns.
//!
//! Each configured server gets its own single-server resolver. A lookup asks
//! the servers one at a time, in configuration order, and returns the first
//! non-empty answer. When every server fails the error names all of them.

use super::{Addrs, Name, Resolve, Resolving};
use crate::base::neterror::NetError;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::Duration,
};

const DNS_PORT: u16 = 53;
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

struct NameServer {
    addr: SocketAddr,
    resolver: OnceLock<TokioResolver>,
}

impl NameServer {
    /// The underlying resolver is built on first query so that configuring
    /// DNS servers never needs a running runtime.
    fn resolver(&self, timeout: Duration) -> &TokioResolver {
        self.resolver.get_or_init(|| {
            let group = NameServerConfigGroup::from_ips_clear(
                &[self.addr.ip()],
                self.addr.port(),
                true,
            );
            let config = ResolverConfig::from_parts(None, vec![], group);
            let mut builder =
                TokioResolver::builder_with_config(config, TokioConnectionProvider::default());
            builder.options_mut().timeout = timeout;
            builder.options_mut().attempts = 1;
            builder.build()
        })
    }
}

/// Resolver that tries each configured DNS server in order.
#[derive(Clone)]
pub struct FallbackResolver {
    servers: Arc<[NameServer]>,
    timeout: Duration,
}

impl FallbackResolver {
    /// Build a resolver from server entries such as `"10.0.0.2"` or
    /// `"10.0.0.2:5353"`. A missing port defaults to 53.
    pub fn new<I, S>(servers: I) -> Result<Self, NetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let servers = servers
            .into_iter()
            .map(|s| {
                let raw = s.as_ref();
                Self::parse_server(raw)
                    .map(|addr| NameServer {
                        addr,
                        resolver: OnceLock::new(),
                    })
                    .ok_or_else(|| NetError::InvalidDnsServer {
                        server: raw.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            servers: servers.into(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        })
    }

    /// Per-server query timeout. Only affects servers not yet queried.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse a server entry, defaulting the port to 53.
    pub fn parse_server(raw: &str) -> Option<SocketAddr> {
        let raw = raw.trim();
        if let Ok(addr) = raw.parse::<SocketAddr>() {
            return Some(addr);
        }
        let ip = raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .ok()?;
        Some(SocketAddr::new(ip, DNS_PORT))
    }

    /// Configured servers, in query order.
    pub fn servers(&self) -> Vec<SocketAddr> {
        self.servers.iter().map(|s| s.addr).collect()
    }

    /// Stable description used to key pooled connections.
    pub(crate) fn label(&self) -> String {
        self.servers
            .iter()
            .map(|s| s.addr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Resolve for FallbackResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let domain = name.as_str();
            let mut failures = Vec::with_capacity(this.servers.len());

            for server in this.servers.iter() {
                tracing::debug!(domain = %domain, server = %server.addr, "resolving via custom DNS server");
                match server.resolver(this.timeout).lookup_ip(domain).await {
                    Ok(lookup) => {
                        let addrs: Vec<SocketAddr> =
                            lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
                        if !addrs.is_empty() {
                            tracing::debug!(
                                domain = %domain,
                                server = %server.addr,
                                count = addrs.len(),
                                "custom DNS resolution complete"
                            );
                            return Ok(Box::new(addrs.into_iter()) as Addrs);
                        }
                        failures.push(format!("{}: no addresses returned", server.addr));
                    }
                    Err(e) => {
                        tracing::debug!(domain = %domain, server = %server.addr, error = %e, "DNS server failed");
                        failures.push(format!("{}: {}", server.addr, e));
                    }
                }
            }

            let reason = if failures.is_empty() {
                "no DNS servers configured".to_string()
            } else {
                failures.join("; ")
            };
            Err(NetError::NameNotResolved {
                host: domain.to_string(),
                servers: this.servers.iter().map(|s| s.addr.to_string()).collect(),
                reason,
            })
        })
    }
}

impl fmt::Debug for FallbackResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackResolver")
            .field("servers", &self.servers())
            .field("timeout", &self.timeout)
            .finish()
    }
}
