use rdslogs_sync::{ErrorScope, SyncError};

#[test]
fn config_error_display() {
    let err = SyncError::Config("DBNAME is not set".into());
    assert_eq!(err.to_string(), "invalid configuration: DBNAME is not set");
}

#[test]
fn remote_unavailable_display() {
    let err = SyncError::RemoteUnavailable("throttled".into());
    assert_eq!(err.to_string(), "log enumeration failed: throttled");
}

#[test]
fn destination_unavailable_display() {
    let err = SyncError::DestinationUnavailable {
        path: "error/a.log".into(),
        reason: "access denied".into(),
    };
    assert_eq!(
        err.to_string(),
        "destination unavailable for error/a.log: access denied"
    );
}

#[test]
fn fetch_error_display() {
    let err = SyncError::Fetch {
        status: 403,
        excerpt: "<Code>AccessDenied</Code>".into(),
    };
    assert_eq!(
        err.to_string(),
        "log download failed with HTTP 403: <Code>AccessDenied</Code>"
    );
}

#[test]
fn credential_expired_display() {
    assert_eq!(SyncError::CredentialExpired.to_string(), "credentials expired");
}

#[test]
fn timed_out_display() {
    assert_eq!(SyncError::TimedOut.to_string(), "abandoned at run deadline");
}

#[test]
fn serialization_error_from_serde() {
    let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: SyncError = serde_err.into();
    assert!(err.to_string().starts_with("serialization error:"));
}

#[test]
fn run_scoped_errors() {
    for err in [
        SyncError::Config("x".into()),
        SyncError::RemoteUnavailable("x".into()),
        SyncError::Signing("x".into()),
        SyncError::CredentialExpired,
    ] {
        assert_eq!(err.scope(), ErrorScope::Run, "{err}");
    }
}

#[test]
fn file_scoped_errors() {
    for err in [
        SyncError::DestinationUnavailable {
            path: "p".into(),
            reason: "r".into(),
        },
        SyncError::Fetch {
            status: 500,
            excerpt: String::new(),
        },
        SyncError::FetchTransport("reset".into()),
        SyncError::TimedOut,
    ] {
        assert_eq!(err.scope(), ErrorScope::File, "{err}");
    }
}

#[test]
fn only_429_and_503_are_throttled() {
    let fetch = |status| SyncError::Fetch {
        status,
        excerpt: String::new(),
    };
    assert!(fetch(429).is_throttled());
    assert!(fetch(503).is_throttled());
    assert!(!fetch(500).is_throttled());
    assert!(!fetch(403).is_throttled());
    assert!(!SyncError::FetchTransport("reset".into()).is_throttled());
}
