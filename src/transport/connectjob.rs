use crate::base::neterror::NetError;
use crate::dns::{lookup, FallbackResolver, GaiResolver, SocketAddrs};
use crate::transport::proxy::{ProxySettings, ProxyType};
use crate::transport::stream::SocketType;
use crate::transport::Protocol;
use boring::ssl::{SslConnector, SslMethod};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

const ALPN_H2_H1: &[u8] = b"\x02h2\x08http/1.1";
const ALPN_H1: &[u8] = b"\x08http/1.1";
const MAX_TUNNEL_RESPONSE: usize = 8 * 1024;

/// Network path overrides for a connection: proxy and custom DNS.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub proxy: Option<ProxySettings>,
    pub dns: Option<FallbackResolver>,
}

impl Route {
    /// Identity used to keep connections on different paths apart.
    pub(crate) fn label(&self) -> String {
        let proxy = self.proxy.as_ref().map(ProxySettings::label).unwrap_or_default();
        let dns = self.dns.as_ref().map(FallbackResolver::label).unwrap_or_default();
        format!("{proxy}|{dns}")
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, NetError> {
        if let Some(addrs) = SocketAddrs::try_parse(host, port) {
            return Ok(addrs.into_vec());
        }
        match &self.dns {
            Some(resolver) => lookup(resolver, host, port).await,
            None => lookup(&GaiResolver::new(), host, port).await,
        }
    }
}

/// A freshly established connection.
pub struct Connected {
    pub socket: SocketType,
    pub h2: bool,
}

/// Manages the connection process: DNS -> TCP -> proxy -> TLS.
pub struct ConnectJob<'a> {
    url: &'a Url,
    route: &'a Route,
    protocol: Protocol,
    connect_timeout: Duration,
}

impl<'a> ConnectJob<'a> {
    pub fn new(url: &'a Url, route: &'a Route, protocol: Protocol, connect_timeout: Duration) -> Self {
        Self { url, route, protocol, connect_timeout }
    }

    pub async fn connect(&self) -> Result<Connected, NetError> {
        let (target_host, target_port) = target_of(self.url)?;

        // With a proxy we dial the proxy and tunnel to the target.
        let (host, port) = match &self.route.proxy {
            Some(p) => p.host_port().ok_or_else(|| NetError::InvalidProxy {
                url: p.url.to_string(),
                reason: "missing host".to_string(),
            })?,
            None => (target_host, target_port),
        };

        // 1. DNS Resolution
        let addrs = self.route.resolve(host, port).await?;

        // 2. TCP Connect, each address in order
        let mut stream = self.dial(host, port, &addrs).await?;

        // 3. Proxy Handshake
        if let Some(p) = &self.route.proxy {
            match p.proxy_type() {
                ProxyType::Http => http_connect(&mut stream, p, target_host, target_port).await?,
                ProxyType::Socks5 => {
                    // Target is resolved here, the proxy only sees an address.
                    let resolved = self.route.resolve(target_host, target_port).await?;
                    let first = resolved.first().copied().ok_or_else(|| NetError::ConnectFailed {
                        host: target_host.to_string(),
                        port: target_port,
                        tried: Vec::new(),
                        reason: "no addresses".to_string(),
                    })?;
                    socks5_connect(&mut stream, p, &first.ip().to_string(), target_port).await?
                }
                ProxyType::Socks5h => {
                    socks5_connect(&mut stream, p, target_host, target_port).await?
                }
            }
            debug!(proxy = %p.label(), target = %target_host, "proxy tunnel established");
        }

        // 4. SSL Handshake (if https), after any tunnel is established
        if self.url.scheme() == "https" {
            let alpn = match self.protocol {
                Protocol::Http2 => ALPN_H2_H1,
                Protocol::Http1 => ALPN_H1,
            };
            let socket = tls_connect(stream, target_host, alpn).await?;
            let h2 = socket.negotiated_h2();
            debug!(host = %target_host, h2, "TLS handshake complete");
            Ok(Connected { socket, h2 })
        } else {
            Ok(Connected { socket: SocketType::Tcp(stream), h2: false })
        }
    }

    async fn dial(&self, host: &str, port: u16, addrs: &[SocketAddr]) -> Result<TcpStream, NetError> {
        let mut failures = Vec::with_capacity(addrs.len());
        for addr in addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    debug!(host = %host, addr = %addr, "TCP connection established");
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    debug!(host = %host, addr = %addr, error = %e, "TCP connect failed");
                    failures.push(format!("{addr}: {e}"));
                }
                Err(_) => {
                    debug!(host = %host, addr = %addr, "TCP connect timed out");
                    failures.push(format!("{addr}: timed out"));
                }
            }
        }

        let reason =
            if failures.is_empty() { "no addresses".to_string() } else { failures.join("; ") };
        Err(NetError::ConnectFailed { host: host.to_string(), port, tried: addrs.to_vec(), reason })
    }
}

fn target_of(url: &Url) -> Result<(&str, u16), NetError> {
    let invalid = |reason: &str| NetError::InvalidUrl { url: url.to_string(), reason: reason.to_string() };
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(NetError::UnknownUrlScheme(other.to_string())),
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;
    Ok((host, port))
}

async fn http_connect(
    stream: &mut TcpStream,
    proxy: &ProxySettings,
    host: &str,
    port: u16,
) -> Result<(), NetError> {
    let proxy_err =
        |reason: String| NetError::ProxyConnectionFailed { proxy: proxy.label(), reason };

    let target = format!("{}:{}", host, port);
    let mut connect_req = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
    if let Some(auth) = proxy.get_auth_header() {
        connect_req.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    connect_req.push_str("\r\n");

    stream.write_all(connect_req.as_bytes()).await.map_err(|e| proxy_err(e.to_string()))?;

    // Read the response head; the proxy sends nothing past it before we speak.
    let mut response = Vec::with_capacity(256);
    let mut buf = [0u8; 512];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.map_err(|e| proxy_err(e.to_string()))?;
        if n == 0 {
            return Err(proxy_err("connection closed during CONNECT".to_string()));
        }
        response.extend_from_slice(&buf[..n]);
        if response.len() > MAX_TUNNEL_RESPONSE {
            return Err(proxy_err("CONNECT response too large".to_string()));
        }
    }

    let head = String::from_utf8_lossy(&response);
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| proxy_err("malformed CONNECT response".to_string()))?;
    if status != 200 {
        return Err(NetError::TunnelConnectionFailed { status });
    }
    Ok(())
}

async fn socks5_connect(
    stream: &mut TcpStream,
    proxy: &ProxySettings,
    host: &str,
    port: u16,
) -> Result<(), NetError> {
    let label = proxy.label();
    let proxy_err = |reason: &str| NetError::ProxyConnectionFailed {
        proxy: label.clone(),
        reason: reason.to_string(),
    };
    let io_err = |e: std::io::Error| NetError::ProxyConnectionFailed {
        proxy: proxy.label(),
        reason: e.to_string(),
    };

    // Greeting
    let auth = proxy.get_socks5_auth();
    let greeting: &[u8] = if auth.is_some() { &[0x05, 0x02, 0x00, 0x02] } else { &[0x05, 0x01, 0x00] };
    stream.write_all(greeting).await.map_err(io_err)?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.map_err(io_err)?;
    if reply[0] != 0x05 {
        return Err(proxy_err("not a SOCKS5 proxy"));
    }
    match (reply[1], auth) {
        (0x00, _) => {}
        (0x02, Some((user, pass))) => {
            if user.len() > 255 || pass.len() > 255 {
                return Err(proxy_err("credentials too long"));
            }
            let mut msg = Vec::with_capacity(3 + user.len() + pass.len());
            msg.push(0x01);
            msg.push(user.len() as u8);
            msg.extend_from_slice(user.as_bytes());
            msg.push(pass.len() as u8);
            msg.extend_from_slice(pass.as_bytes());
            stream.write_all(&msg).await.map_err(io_err)?;

            let mut status = [0u8; 2];
            stream.read_exact(&mut status).await.map_err(io_err)?;
            if status[1] != 0x00 {
                return Err(proxy_err("authentication rejected"));
            }
        }
        _ => return Err(proxy_err("no acceptable authentication method")),
    }

    // CONNECT
    let mut msg = vec![0x05, 0x01, 0x00];
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            msg.push(0x01);
            msg.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            msg.push(0x04);
            msg.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            if host.len() > 255 {
                return Err(proxy_err("host name too long"));
            }
            msg.push(0x03);
            msg.push(host.len() as u8);
            msg.extend_from_slice(host.as_bytes());
        }
    }
    msg.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&msg).await.map_err(io_err)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.map_err(io_err)?;
    if head[1] != 0x00 {
        return Err(proxy_err(&format!("SOCKS5 connect failed with code {}", head[1])));
    }
    let remaining = match head[3] {
        0x01 => 4 + 2,
        0x04 => 16 + 2,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.map_err(io_err)?;
            len[0] as usize + 2
        }
        _ => return Err(proxy_err("malformed SOCKS5 reply")),
    };
    let mut bound = vec![0u8; remaining];
    stream.read_exact(&mut bound).await.map_err(io_err)?;
    Ok(())
}

async fn tls_connect(stream: TcpStream, host: &str, alpn: &[u8]) -> Result<SocketType, NetError> {
    let ssl_err = |e: boring::error::ErrorStack| NetError::SslProtocolError(e.to_string());

    let mut builder = SslConnector::builder(SslMethod::tls()).map_err(ssl_err)?;
    builder.set_alpn_protos(alpn).map_err(ssl_err)?;

    let connector = builder.build();
    let config = connector.configure().map_err(ssl_err)?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let tls_stream = tokio_boring::connect(config, host, stream)
        .await
        .map_err(|e| NetError::SslProtocolError(format!("{:?}", e)))?;

    Ok(SocketType::Ssl(tls_stream))
}
