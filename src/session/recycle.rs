//! Free-lists for short-lived objects and session shells.

use super::defaults::SessionFactory;
use super::engine::Session;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Objects that can be returned to a pool.
///
/// `reset` must clear every field so the next acquirer sees a fresh value.
pub trait Reset {
    fn reset(&mut self);
}

/// A bounded free-list of reusable values.
pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
    max_free: usize,
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool").field("max_free", &self.max_free).finish_non_exhaustive()
    }
}

impl<T: Reset + Default> ObjectPool<T> {
    pub const fn new(max_free: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_free }
    }

    /// Take a value, constructing one if the pool is empty.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let value = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        Pooled { value: value.unwrap_or_default(), pool: self }
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn put(&self, mut value: T) {
        value.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_free {
            free.push(value);
        }
    }
}

/// A value on loan from an [`ObjectPool`]; reset and returned on drop.
pub struct Pooled<'a, T: Reset + Default> {
    value: T,
    pool: &'a ObjectPool<T>,
}

impl<T: Reset + Default> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Reset + Default> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Reset + Default> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.value));
    }
}

/// Recycles [`Session`] shells.
///
/// `release` clears the session back to defaults (keeping the factory's
/// protocol mode) before it becomes available again.
pub struct SessionPool {
    free: Mutex<Vec<Session>>,
    factory: SessionFactory,
    max_free: usize,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("factory", &self.factory)
            .field("free", &self.free_count())
            .field("max_free", &self.max_free)
            .finish()
    }
}

impl SessionPool {
    pub fn new(factory: SessionFactory) -> Self {
        Self::with_max_free(factory, 32)
    }

    pub fn with_max_free(factory: SessionFactory, max_free: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), factory, max_free }
    }

    /// Take a session, creating one if none is free.
    pub fn acquire(&self) -> Session {
        let recycled = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match recycled {
            Some(session) => session,
            None => self.factory.create(),
        }
    }

    /// Return a session. Dropped (and its transport released) if the pool
    /// is full.
    pub fn release(&self, session: Session) {
        session.clear();
        session.with_http2(self.factory.protocol().is_http2());

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() >= self.max_free {
            debug!("session pool full, dropping session");
            return;
        }
        free.push(session);
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
