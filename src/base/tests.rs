use crate::base::neterror::NetError;
use std::net::SocketAddr;

#[test]
fn test_connect_failure_lists_every_address() {
    let tried: Vec<SocketAddr> = vec![
        "10.0.0.1:443".parse().unwrap(),
        "10.0.0.2:443".parse().unwrap(),
    ];
    let err = NetError::ConnectFailed {
        host: "api.internal".into(),
        port: 443,
        tried,
        reason: "connection refused".into(),
    };

    let msg = err.to_string();
    assert!(msg.contains("10.0.0.1:443"));
    assert!(msg.contains("10.0.0.2:443"));
    assert!(msg.contains("api.internal:443"));
}

#[test]
fn test_dns_failure_lists_every_server() {
    let err = NetError::NameNotResolved {
        host: "example.com".into(),
        servers: vec!["10.1.1.1:53".into(), "10.1.1.2:53".into()],
        reason: "timed out".into(),
    };

    let msg = err.to_string();
    assert!(msg.contains("10.1.1.1:53, 10.1.1.2:53"));
    assert!(msg.contains("example.com"));
}

#[test]
fn test_classification() {
    assert!(NetError::Cancelled.is_cancelled());
    assert!(NetError::Cancelled.is_context_error());
    assert!(NetError::DeadlineExceeded.is_timeout());
    assert!(NetError::ConnectionClosed.is_transport());

    let encode = NetError::encode(std::io::Error::other("bad payload"));
    assert!(encode.is_codec());
    assert!(!encode.is_transport());

    assert!(!NetError::BodyNotReplayable.is_transport());
    assert!(!NetError::MissingUrl.is_transport());
}
