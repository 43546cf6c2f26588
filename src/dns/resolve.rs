//! The resolver seam shared by the system and custom-server resolvers.

use crate::base::neterror::NetError;
use std::{fmt, future::Future, net::SocketAddr, pin::Pin};

/// A hostname handed to a resolver.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    /// Wraps `host`. A trailing root dot is dropped so `example.com.` and
    /// `example.com` name the same host.
    pub fn new(host: impl Into<Box<str>>) -> Self {
        let host: Box<str> = host.into();
        match host.strip_suffix('.') {
            Some(bare) if !bare.is_empty() => Self { host: bare.into() },
            _ => Self { host },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// Resolved addresses, in the order the connect path should dial them.
pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Turns a hostname into addresses. Returned ports are 0.
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: Name) -> Resolving;
}

/// Resolve `host` and stamp `port` on every answer, keeping resolver order.
pub async fn lookup<R>(resolver: &R, host: &str, port: u16) -> Result<Vec<SocketAddr>, NetError>
where
    R: Resolve + ?Sized,
{
    let addrs = resolver.resolve(Name::new(host)).await?;
    Ok(addrs
        .map(|mut addr| {
            addr.set_port(port);
            addr
        })
        .collect())
}
