use super::engine::Session;
use crate::base::callcontext::CallContext;
use crate::base::neterror::NetError;
use crate::http::{HttpResponse, Request, RequestBody, RequestBuilder};
use http::Method;

/// A request under construction, bound to the session that will send it.
///
/// Returned by [`Session::get`], [`Session::post`] and friends.
#[must_use = "a SessionRequest does nothing until `send` is awaited"]
#[derive(Debug)]
pub struct SessionRequest<'s> {
    session: &'s Session,
    builder: RequestBuilder,
}

impl<'s> SessionRequest<'s> {
    pub(crate) fn new(session: &'s Session, method: Method, url: &str) -> Self {
        Self { session, builder: RequestBuilder::new(method, url) }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.set_header(name, value);
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.builder = self.builder.query(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    pub fn context(mut self, context: CallContext) -> Self {
        self.builder = self.builder.context(context);
        self
    }

    /// Finish building without sending.
    pub fn build(self) -> Result<Request, NetError> {
        self.builder.build()
    }

    pub async fn send(self) -> Result<HttpResponse, NetError> {
        let req = self.builder.build()?;
        self.session.execute(req).await
    }
}
