mod support;

use pretty_assertions::assert_eq;
use rdslogs_sync::catalog::LogCatalog;
use rdslogs_sync::error::{ErrorScope, SyncError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support::*;

#[tokio::test]
async fn single_page_is_listed_in_service_order() {
    let source = Arc::new(FakeLogSource::single(&[
        ("error/postgresql.log.2024-01-01-00", 120),
        ("error/postgresql.log.2024-01-01-01", 0),
    ]));
    let catalog = LogCatalog::new(source.clone());

    let files = catalog.list_log_files(DB).await.unwrap();

    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["error/postgresql.log.2024-01-01-00", "error/postgresql.log.2024-01-01-01"]
    );
    assert_eq!(files[0].size, 120);
    assert!(files.iter().all(|f| f.db_instance_id == DB));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pagination_is_drained() {
    let source = Arc::new(FakeLogSource::paged(vec![
        vec![("a.log", 1), ("b.log", 2)],
        vec![("c.log", 3)],
        vec![("d.log", 4), ("e.log", 5)],
    ]));
    let catalog = LogCatalog::new(source.clone());

    let files = catalog.list_log_files(DB).await.unwrap();

    assert_eq!(files.len(), 5);
    assert_eq!(files[4].name, "e.log");
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn empty_instance_lists_nothing() {
    let catalog = LogCatalog::new(Arc::new(FakeLogSource::single(&[])));
    assert!(catalog.list_log_files(DB).await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_failure_becomes_remote_unavailable() {
    let catalog = LogCatalog::new(Arc::new(FakeLogSource::failing()));

    let err = catalog.list_log_files(DB).await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    assert_eq!(err.scope(), ErrorScope::Run);
    assert!(err.to_string().contains("connection reset"));
}
