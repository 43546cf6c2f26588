use super::handle::{Protocol, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::debug;

/// Free handles kept per protocol mode before extras are dropped.
const DEFAULT_MAX_FREE: usize = 64;

static GLOBAL_POOL: LazyLock<Arc<TransportPool>> =
    LazyLock::new(|| Arc::new(TransportPool::new()));

/// Two free-lists of transport handles, one per protocol mode.
///
/// `acquire` never blocks on I/O and never fails: an empty free-list yields a
/// freshly constructed handle with default settings. `release` files the
/// handle under the mode tagged on the handle itself, so a handle can never
/// land on the wrong list.
pub struct TransportPool {
    http1: Mutex<Vec<Arc<Transport>>>,
    http2: Mutex<Vec<Arc<Transport>>>,
    max_free: usize,
    created: AtomicUsize,
}

impl std::fmt::Debug for TransportPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPool")
            .field("free_http1", &self.free_count(Protocol::Http1))
            .field("free_http2", &self.free_count(Protocol::Http2))
            .field("max_free", &self.max_free)
            .field("created", &self.created_count())
            .finish()
    }
}

impl Default for TransportPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportPool {
    pub fn new() -> Self {
        Self::with_max_free(DEFAULT_MAX_FREE)
    }

    /// A pool that keeps at most `max_free` idle handles per mode.
    pub fn with_max_free(max_free: usize) -> Self {
        Self {
            http1: Mutex::new(Vec::new()),
            http2: Mutex::new(Vec::new()),
            max_free,
            created: AtomicUsize::new(0),
        }
    }

    /// The process-wide pool sessions use unless given another.
    pub fn global() -> Arc<TransportPool> {
        Arc::clone(&GLOBAL_POOL)
    }

    fn list(&self, protocol: Protocol) -> &Mutex<Vec<Arc<Transport>>> {
        match protocol {
            Protocol::Http1 => &self.http1,
            Protocol::Http2 => &self.http2,
        }
    }

    /// Check out a handle for `protocol`.
    pub fn acquire(&self, protocol: Protocol) -> Arc<Transport> {
        let reused = self.list(protocol).lock().unwrap_or_else(PoisonError::into_inner).pop();
        match reused {
            Some(handle) => {
                debug!(transport = handle.id(), ?protocol, "reusing pooled transport");
                handle
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                let handle = Arc::new(Transport::new(protocol));
                debug!(transport = handle.id(), ?protocol, "created transport");
                handle
            }
        }
    }

    /// Return a handle. `None` is a no-op.
    ///
    /// The handle's settings are reset before it is filed, so the next
    /// acquirer never observes the previous owner's tuning. A handle still
    /// referenced by an in-flight call is dropped instead of filed.
    pub fn release(&self, handle: impl Into<Option<Arc<Transport>>>) {
        let Some(handle) = handle.into() else {
            return;
        };
        if Arc::strong_count(&handle) > 1 {
            debug!(transport = handle.id(), "transport still in use, not pooling");
            return;
        }
        handle.reset();

        let protocol = handle.protocol();
        let mut list = self.list(protocol).lock().unwrap_or_else(PoisonError::into_inner);
        if list.len() >= self.max_free {
            debug!(transport = handle.id(), ?protocol, "free-list full, dropping transport");
            return;
        }
        debug!(transport = handle.id(), ?protocol, "released transport");
        list.push(handle);
    }

    /// Handles currently waiting in the free-list for `protocol`.
    pub fn free_count(&self, protocol: Protocol) -> usize {
        self.list(protocol).lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handles constructed by this pool so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportSettings;

    #[test]
    fn test_acquire_constructs_when_empty() {
        let pool = TransportPool::new();
        let handle = pool.acquire(Protocol::Http1);
        assert_eq!(handle.protocol(), Protocol::Http1);
        assert_eq!(handle.settings(), TransportSettings::default());
        assert_eq!(pool.created_count(), 1);
    }

    #[test]
    fn test_release_returns_to_matching_list() {
        let pool = TransportPool::new();
        let h2 = pool.acquire(Protocol::Http2);
        let h2_id = h2.id();
        pool.release(h2);

        assert_eq!(pool.free_count(Protocol::Http2), 1);
        assert_eq!(pool.free_count(Protocol::Http1), 0);

        let h1 = pool.acquire(Protocol::Http1);
        assert_ne!(h1.id(), h2_id);
        assert_eq!(h1.protocol(), Protocol::Http1);

        let again = pool.acquire(Protocol::Http2);
        assert_eq!(again.id(), h2_id);
    }

    #[test]
    fn test_release_none_is_noop() {
        let pool = TransportPool::new();
        pool.release(None::<Arc<Transport>>);
        assert_eq!(pool.free_count(Protocol::Http1), 0);
        assert_eq!(pool.free_count(Protocol::Http2), 0);
    }

    #[test]
    fn test_release_resets_settings() {
        let pool = TransportPool::new();
        let handle = pool.acquire(Protocol::Http1);
        handle.configure(TransportSettings { max_idle_conns: 3, ..Default::default() });
        pool.release(handle);

        let handle = pool.acquire(Protocol::Http1);
        assert_eq!(handle.settings(), TransportSettings::default());
    }

    #[test]
    fn test_shared_handle_is_not_pooled() {
        let pool = TransportPool::new();
        let handle = pool.acquire(Protocol::Http1);
        let in_flight = Arc::clone(&handle);
        pool.release(handle);
        assert_eq!(pool.free_count(Protocol::Http1), 0);
        drop(in_flight);
    }

    #[test]
    fn test_max_free_caps_list() {
        let pool = TransportPool::with_max_free(1);
        let a = pool.acquire(Protocol::Http1);
        let b = pool.acquire(Protocol::Http1);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free_count(Protocol::Http1), 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(TransportPool::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let protocol = Protocol::from_http2(i % 2 == 0);
                    for _ in 0..100 {
                        let handle = pool.acquire(protocol);
                        assert_eq!(handle.protocol(), protocol);
                        pool.release(handle);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(pool.free_count(Protocol::Http1) <= 4);
        assert!(pool.free_count(Protocol::Http2) <= 4);
    }
}
