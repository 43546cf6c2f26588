//! Request body for POST/PUT operations.
//!
//! Byte bodies are re-sent on every retry attempt. Stream bodies are read
//! at most once: an attempt after the stream was handed to the transport
//! fails with [`NetError::BodyNotReplayable`].

use crate::base::neterror::NetError;
use crate::transport::TransportBody;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};

/// Request body for HTTP methods that send data.
#[derive(Default)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Body with raw bytes.
    Bytes(Bytes),
    /// Single-read byte stream.
    Stream(Mutex<Option<TransportBody>>),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::from(s.to_owned()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl RequestBody {
    /// Wrap a stream of chunks. The stream is consumed by the first attempt.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        let body = StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync();
        RequestBody::Stream(Mutex::new(Some(body)))
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Length in bytes, if known up front.
    pub fn len(&self) -> Option<usize> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(b) => Some(b.len()),
            RequestBody::Stream(_) => None,
        }
    }

    /// True if every attempt can send this body again.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Stream(_))
    }

    /// Produce the body for one attempt.
    pub(crate) fn for_attempt(&self) -> Result<TransportBody, NetError> {
        match self {
            RequestBody::Empty => Ok(Empty::<Bytes>::new().map_err(unreachable).boxed_unsync()),
            RequestBody::Bytes(b) => Ok(Full::new(b.clone()).map_err(unreachable).boxed_unsync()),
            RequestBody::Stream(slot) => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or(NetError::BodyNotReplayable),
        }
    }
}

fn unreachable(never: Infallible) -> std::io::Error {
    match never {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body() {
        let body = RequestBody::Empty;
        assert!(body.is_empty());
        assert_eq!(body.len(), Some(0));
    }

    #[test]
    fn test_from_str() {
        let body: RequestBody = "test".into();
        assert_eq!(body.len(), Some(4));
        assert!(body.is_replayable());
    }

    #[tokio::test]
    async fn test_bytes_body_replays() {
        let body = RequestBody::from("hello");
        for _ in 0..2 {
            let sent = body.for_attempt().unwrap().collect().await.unwrap().to_bytes();
            assert_eq!(sent, Bytes::from("hello"));
        }
    }

    #[tokio::test]
    async fn test_stream_body_single_read() {
        let chunks = vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))];
        let body = RequestBody::stream(futures::stream::iter(chunks));
        assert!(!body.is_replayable());
        assert_eq!(body.len(), None);

        let sent = body.for_attempt().unwrap().collect().await.unwrap().to_bytes();
        assert_eq!(sent, Bytes::from("ab"));
        assert!(matches!(body.for_attempt(), Err(NetError::BodyNotReplayable)));
    }
}
