//! Interceptor chain around request execution.
//!
//! Middleware run in registration order on the way in and in reverse on the
//! way out: the first registered is the outermost. Each receives the request
//! and a [`Next`] for the rest of the chain. `Next` is consumed by
//! [`Next::run`], so a middleware can call the rest of the chain at most
//! once; not calling it short-circuits the chain.

use super::request::Request;
use super::response::HttpResponse;
use crate::base::neterror::NetError;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Outcome of a request pipeline stage.
pub type Handled<'a> = BoxFuture<'a, Result<HttpResponse, NetError>>;

/// Innermost stage of a chain.
pub type Endpoint<'a> = dyn Fn(Request) -> Handled<'a> + Send + Sync + 'a;

/// A request interceptor.
///
/// The retry loop and the transport run under the context of the request
/// that reaches the end of the chain, so a middleware can tighten a deadline
/// or attach cancellation with [`Request::set_context`].
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> Handled<'a>;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a Endpoint<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a Endpoint<'a>) -> Self {
        Self { chain, endpoint }
    }

    /// Pass the request to the rest of the chain.
    pub fn run(self, req: Request) -> Handled<'a> {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(req, Next { chain: rest, endpoint: self.endpoint }),
            None => (self.endpoint)(req),
        }
    }

    /// Middleware still ahead in the chain.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}
