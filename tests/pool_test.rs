//! Transport pool and session pool behavior.

mod common;

use common::TestServer;
use netsession::session::{Http2DefaultGuard, SessionFactory};
use netsession::{Protocol, Session, SessionPool, TransportPool};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_modes_never_cross() {
    let pool = Arc::new(TransportPool::new());
    let h1 = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    let h2 = Session::with_pool(Protocol::Http2, Arc::clone(&pool));
    let h1_id = h1.transport_id();
    let h2_id = h2.transport_id();
    drop(h1);
    drop(h2);

    assert_eq!(pool.free_count(Protocol::Http1), 1);
    assert_eq!(pool.free_count(Protocol::Http2), 1);

    let next_h2 = Session::with_pool(Protocol::Http2, Arc::clone(&pool));
    assert_eq!(next_h2.transport_id(), h2_id);
    let next_h1 = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    assert_eq!(next_h1.transport_id(), h1_id);
    assert_eq!(pool.created_count(), 2);
}

#[test]
fn test_protocol_toggle_moves_between_lists() {
    let pool = Arc::new(TransportPool::new());
    let session = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    session.with_http2(true);
    assert_eq!(pool.free_count(Protocol::Http1), 1);
    assert_eq!(pool.free_count(Protocol::Http2), 0);

    session.with_http2(false);
    assert_eq!(pool.free_count(Protocol::Http2), 1);
    assert_eq!(pool.free_count(Protocol::Http1), 0);
}

#[test]
fn test_reused_handle_has_default_settings() {
    let pool = Arc::new(TransportPool::new());
    let session = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    session.with_max_idle_conns(2).with_idle_timeout(Duration::from_secs(1));
    drop(session);

    let session = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    assert_eq!(session.transport_settings().max_idle_conns, 100);
    assert_eq!(session.transport_settings().idle_timeout, Duration::from_secs(90));
}

#[test]
fn test_session_new_follows_global_default() {
    let _guard = Http2DefaultGuard::set(true);
    assert!(Session::new().is_http2());
    assert!(SessionFactory::from_default().protocol().is_http2());
}

#[tokio::test]
async fn test_session_pool_recycles_clean_sessions() {
    let server = TestServer::start(common::echo()).await;
    let transports = Arc::new(TransportPool::new());
    let pool = SessionPool::new(SessionFactory::new(Protocol::Http1).with_pool(transports));

    let session = pool.acquire();
    session.with_base_url(&server.base()).with_header("X-Tenant", "acme");
    session.get("/").send().await.unwrap();
    pool.release(session);

    let session = pool.acquire();
    assert!(session.base_url().is_none());
    let body = session.get(&server.url("/")).send().await.unwrap().text().unwrap();
    assert!(!body.contains("x-tenant"));
}

#[tokio::test]
async fn test_concurrent_calls_share_session() {
    let server = TestServer::start(common::echo()).await;
    let session = Arc::new(Session::with_pool(Protocol::Http1, Arc::new(TransportPool::new())));
    session.with_base_url(&server.base());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.get(&format!("/task/{i}")).send().await.map(|r| r.status())
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 200);
    }
    assert_eq!(server.hits(), 8);
}

#[tokio::test]
async fn test_close_during_call_leaves_handle_unpooled() {
    let server = TestServer::start(common::delayed(Duration::from_millis(300))).await;
    let pool = Arc::new(TransportPool::new());
    let session = Session::with_pool(Protocol::Http1, Arc::clone(&pool));

    let (resp, ()) = tokio::join!(session.get(&server.url("/")).send(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close();
        assert_eq!(pool.free_count(Protocol::Http1), 0);
    });

    assert_eq!(resp.unwrap().status(), 200);
    assert!(session.is_closed());
    assert_eq!(pool.free_count(Protocol::Http1), 0);
}

#[tokio::test]
async fn test_mode_switch_during_call_leaves_old_handle_unpooled() {
    let server = TestServer::start(common::delayed(Duration::from_millis(300))).await;
    let pool = Arc::new(TransportPool::new());
    let session = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
    let original = session.transport_id();

    let (resp, ()) = tokio::join!(session.get(&server.url("/")).send(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.with_http2(true);
        assert_eq!(pool.free_count(Protocol::Http1), 0);
    });

    assert_eq!(resp.unwrap().status(), 200);
    assert!(session.is_http2());
    assert_ne!(session.transport_id(), original);
    assert_eq!(pool.free_count(Protocol::Http1), 0);
    assert_eq!(pool.created_count(), 2);
}
