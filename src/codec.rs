//! JSON payload codec.
//!
//! Failures map to [`NetError::Encode`] and [`NetError::Decode`], never to a
//! transport error, so callers can tell a local payload problem apart from a
//! network one.

use crate::base::neterror::NetError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Serialize `value` to JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, NetError> {
    serde_json::to_vec(value).map(Bytes::from).map_err(NetError::encode)
}

/// Deserialize JSON bytes into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NetError> {
    serde_json::from_slice(bytes).map_err(NetError::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    #[test]
    fn test_decode() {
        let item: Item = decode(br#"{"id": 7}"#).unwrap();
        assert_eq!(item, Item { id: 7 });
    }

    #[test]
    fn test_errors_are_distinct() {
        assert!(matches!(encode(&Unencodable), Err(NetError::Encode { .. })));
        assert!(matches!(decode::<Item>(b"{"), Err(NetError::Decode { .. })));
    }
}
