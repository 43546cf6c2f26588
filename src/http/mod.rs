//! Request/response types and the execution pipeline stages.

pub mod headers;
pub mod middleware;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod retry;

// Re-exports for convenience
pub use headers::merge_headers;
pub use middleware::{Endpoint, Handled, Middleware, Next};
pub use request::{Request, RequestBuilder, RequestUrl};
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use retry::{RetryPolicy, RetryPredicate};
