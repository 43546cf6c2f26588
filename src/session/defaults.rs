//! Process-wide defaults: the HTTP/2 flag and the shared default session.
//!
//! New code should pass the protocol explicitly through a [`SessionFactory`].
//! The ambient flag only decides what [`Session::new`] and
//! [`default_session`] use.

use super::engine::Session;
use crate::transport::{Protocol, TransportPool};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

static HTTP2_DEFAULT: RwLock<bool> = RwLock::new(false);

static DEFAULT_SESSION: LazyLock<Session> = LazyLock::new(Session::new);

// Serializes holders of Http2DefaultGuard.
static GUARD_LOCK: Mutex<()> = Mutex::new(());

/// Whether new sessions start in HTTP/2 mode.
pub fn http2_default() -> bool {
    *HTTP2_DEFAULT.read().unwrap_or_else(PoisonError::into_inner)
}

/// Change the ambient HTTP/2 default and switch the shared default session
/// to match. Existing sessions keep their mode.
pub fn set_http2_default(enabled: bool) {
    *HTTP2_DEFAULT.write().unwrap_or_else(PoisonError::into_inner) = enabled;
    debug!(http2 = enabled, "changed process-wide HTTP/2 default");
    DEFAULT_SESSION.with_http2(enabled);
}

/// The shared process-wide session, created on first use.
pub fn default_session() -> &'static Session {
    &DEFAULT_SESSION
}

/// Sets the HTTP/2 default for a scope and restores the previous value on
/// drop.
///
/// Guards are mutually exclusive: a second `set` blocks until the first
/// guard is dropped, so tests that touch the flag do not interleave.
#[must_use = "the previous default is restored when the guard is dropped"]
pub struct Http2DefaultGuard {
    previous: bool,
    _lock: MutexGuard<'static, ()>,
}

impl Http2DefaultGuard {
    pub fn set(enabled: bool) -> Self {
        let lock = GUARD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = http2_default();
        set_http2_default(enabled);
        Self { previous, _lock: lock }
    }

    /// The value that will be restored.
    pub fn previous(&self) -> bool {
        self.previous
    }
}

impl std::fmt::Debug for Http2DefaultGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2DefaultGuard").field("previous", &self.previous).finish()
    }
}

impl Drop for Http2DefaultGuard {
    fn drop(&mut self) {
        set_http2_default(self.previous);
    }
}

/// Creates sessions with an explicit protocol mode and transport pool.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    protocol: Protocol,
    pool: Arc<TransportPool>,
}

impl SessionFactory {
    /// A factory on the global transport pool.
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol, pool: TransportPool::global() }
    }

    /// A factory using the ambient HTTP/2 default, read now.
    pub fn from_default() -> Self {
        Self::new(Protocol::from_http2(http2_default()))
    }

    pub fn with_pool(mut self, pool: Arc<TransportPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn pool(&self) -> &Arc<TransportPool> {
        &self.pool
    }

    pub fn create(&self) -> Session {
        Session::with_pool(self.protocol, Arc::clone(&self.pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_previous() {
        let before = http2_default();
        {
            let guard = Http2DefaultGuard::set(!before);
            assert_eq!(guard.previous(), before);
            assert_eq!(http2_default(), !before);
            assert_eq!(default_session().is_http2(), !before);
        }
        assert_eq!(http2_default(), before);
        assert_eq!(default_session().is_http2(), before);
    }

    #[test]
    fn test_new_session_reads_flag_at_construction() {
        let _guard = Http2DefaultGuard::set(true);
        let session = Session::new();
        assert!(session.is_http2());

        set_http2_default(false);
        assert!(session.is_http2());
        assert!(!Session::new().is_http2());
    }

    #[test]
    fn test_factory_is_explicit() {
        let _guard = Http2DefaultGuard::set(true);
        let pool = Arc::new(TransportPool::new());
        let factory = SessionFactory::new(Protocol::Http1).with_pool(Arc::clone(&pool));
        let session = factory.create();
        assert!(!session.is_http2());
        assert_eq!(pool.created_count(), 1);
    }
}
