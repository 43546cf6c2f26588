//! Local servers for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};

pub type Reply = BoxFuture<'static, Response<Full<Bytes>>>;

pub type Handler = Arc<dyn Fn(Request<Incoming>) -> Reply + Send + Sync>;

/// An HTTP/1.1 server on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));

        let server_hits = Arc::clone(&hits);
        let server_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                server_connections.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let hits = Arc::clone(&server_hits);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let fut = handler(req);
                        async move { Ok::<_, Infallible>(fut.await) }
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });

        Self { addr, hits, connections }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn text(status: u16, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .body(Full::new(body.into()))
        .unwrap()
}

/// Echoes the request line, every header line and the body.
pub fn echo() -> Handler {
    Arc::new(|req: Request<Incoming>| -> Reply {
        Box::pin(async move {
            let mut out = format!("{} {}\n", req.method(), req.uri());
            for (name, value) in req.headers() {
                out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("?")));
            }
            out.push('\n');
            let body = req.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();
            out.push_str(&String::from_utf8_lossy(&body));
            text(200, out)
        })
    })
}

/// Answers with each status in turn, repeating the last one.
pub fn statuses(sequence: Vec<u16>) -> Handler {
    let next = Arc::new(AtomicUsize::new(0));
    Arc::new(move |_req: Request<Incoming>| -> Reply {
        let i = next.fetch_add(1, Ordering::SeqCst);
        let status = sequence[i.min(sequence.len() - 1)];
        Box::pin(async move { text(status, format!("attempt {}", i + 1)) })
    })
}

/// Echoes like [`echo`] after `delay`.
pub fn slow_echo(delay: Duration) -> Handler {
    let inner = echo();
    Arc::new(move |req: Request<Incoming>| -> Reply {
        let reply = inner(req);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            reply.await
        })
    })
}

/// Answers 200 after `delay`.
pub fn delayed(delay: Duration) -> Handler {
    Arc::new(move |_req: Request<Incoming>| -> Reply {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            text(200, "late")
        })
    })
}

/// Answers with a fixed JSON body.
pub fn json(body: &'static str) -> Handler {
    Arc::new(move |_req: Request<Incoming>| -> Reply {
        Box::pin(async move {
            Response::builder()
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from_static(body.as_bytes())))
                .unwrap()
        })
    })
}

/// A port with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Accepts TCP connections and closes them without answering.
pub async fn hang_up_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (addr, accepted)
}

/// A UDP DNS server answering every A query with 127.0.0.1, or with
/// SERVFAIL when `fail` is set. Returns its address and a query counter.
pub async fn dns_server(fail: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    if fail {
        spawn_dns(None).await
    } else {
        spawn_dns(Some(vec![Ipv4Addr::LOCALHOST])).await
    }
}

/// A UDP DNS server answering every A query with `answers`, in order.
pub async fn dns_server_answering(answers: Vec<Ipv4Addr>) -> (SocketAddr, Arc<AtomicUsize>) {
    spawn_dns(Some(answers)).await
}

async fn spawn_dns(answers: Option<Vec<Ipv4Addr>>) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&queries);
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(reply) = dns_reply(&buf[..n], answers.as_deref()) {
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });
    (addr, queries)
}

/// `None` answers SERVFAIL.
fn dns_reply(query: &[u8], answers: Option<&[Ipv4Addr]>) -> Option<Vec<u8>> {
    if query.len() < 12 {
        return None;
    }
    // End of QNAME, then QTYPE and QCLASS.
    let mut pos = 12;
    while *query.get(pos)? != 0 {
        pos += 1 + query[pos] as usize;
    }
    let qtype = u16::from_be_bytes([*query.get(pos + 1)?, *query.get(pos + 2)?]);
    let question = query.get(12..pos + 5)?;

    let records: &[Ipv4Addr] = match answers {
        Some(ips) if qtype == 1 => ips,
        _ => &[],
    };
    let mut reply = Vec::with_capacity(64);
    reply.extend_from_slice(&query[..2]);
    reply.extend_from_slice(if answers.is_none() { &[0x81, 0x82] } else { &[0x81, 0x80] });
    reply.extend_from_slice(&[0, 1]);
    reply.extend_from_slice(&(records.len() as u16).to_be_bytes());
    reply.extend_from_slice(&[0, 0, 0, 0]);
    reply.extend_from_slice(question);
    for ip in records {
        reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4]);
        reply.extend_from_slice(&ip.octets());
    }
    Some(reply)
}
