mod helpers;

use bytes::Bytes;
use helpers::{service, CountingScanner, FakeScanner, RecordingStore, EICAR, PDF};
use stash_core::FileStatus;
use stash_processing::{ScanError, ValidationError};
use stash_services::{IngestError, MemoryObjectStore, QuarantineError, RetentionSweeper};
use stash_storage::{ObjectStore, StoreOp};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PRIMARY: &str = "attachments";
const QUARANTINE: &str = "attachments-quarantine";

fn total_calls(store: &MemoryObjectStore) -> usize {
    [
        StoreOp::Put,
        StoreOp::Get,
        StoreOp::Delete,
        StoreOp::List,
        StoreOp::Head,
    ]
    .into_iter()
    .map(|op| store.calls(op))
    .sum()
}

#[tokio::test]
async fn clean_payload_round_trips() {
    let store = Arc::new(MemoryObjectStore::new());
    let scanner = CountingScanner::new(FakeScanner::Eicar);
    let service = service(store.clone(), scanner.clone());

    let id = service
        .ingest(Bytes::from_static(PDF), "PDF", &CancellationToken::new())
        .await
        .unwrap();

    let (data, ext) = service.download(id.as_str()).await.unwrap();
    assert_eq!(&data[..], PDF);
    assert_eq!(ext, ".pdf");

    let (data, _) = service.download(&format!("{}.pdf", id)).await.unwrap();
    assert_eq!(&data[..], PDF);
    assert_eq!(scanner.calls(), 1);
}

#[tokio::test]
async fn oversized_payload_is_rejected_before_any_io() {
    let store = Arc::new(MemoryObjectStore::new());
    let scanner = CountingScanner::new(FakeScanner::Eicar);
    let service = service(store.clone(), scanner.clone());

    let at_limit = Bytes::from(vec![b'a'; 1024]);
    assert!(service
        .ingest(at_limit, "txt", &CancellationToken::new())
        .await
        .is_ok());
    let puts_before = store.calls(StoreOp::Put);

    let over = Bytes::from(vec![b'a'; 1025]);
    let err = service
        .ingest(over, "txt", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::TooLarge { size: 1025, max: 1024 })
    ));
    assert_eq!(store.calls(StoreOp::Put), puts_before);
    assert_eq!(scanner.calls(), 1);
}

#[tokio::test]
async fn disallowed_extension_never_reaches_the_backend() {
    let store = Arc::new(MemoryObjectStore::new());
    let scanner = CountingScanner::new(FakeScanner::Eicar);
    let service = service(store.clone(), scanner.clone());
    let id = stash_core::FileId::generate();
    let reference = format!("{}.exe", id);

    let err = service
        .ingest(Bytes::from_static(b"MZ"), ".exe", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::DisallowedExtension { .. })
    ));

    let err = service.download(&reference).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::DisallowedExtension { .. })
    ));

    let err = service.delete(&reference).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::DisallowedExtension { .. })
    ));

    assert_eq!(total_calls(&store), 0);
    assert_eq!(scanner.calls(), 0);
}

#[tokio::test]
async fn infected_payload_goes_to_quarantine_only() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));

    let err = service
        .ingest(Bytes::from_static(EICAR), "txt", &CancellationToken::new())
        .await
        .unwrap_err();

    let quarantine_id = match &err {
        IngestError::Infected {
            signature,
            quarantine_id,
        } => {
            assert_eq!(signature, "Eicar-Test-Signature");
            quarantine_id.clone().unwrap()
        }
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(err.to_string().contains("quarantined"));
    assert!(err.is_rejection());

    assert!(store.keys(PRIMARY).is_empty());
    let key = format!("{}.txt", quarantine_id);
    assert_eq!(store.keys(QUARANTINE), vec![key.clone()]);
    assert_eq!(&store.get(QUARANTINE, &key).await.unwrap()[..], EICAR);
}

#[tokio::test]
async fn scanner_error_is_handled_like_an_infection() {
    let store = Arc::new(MemoryObjectStore::new());
    let scanner = CountingScanner::new(FakeScanner::Fails(ScanError::Transport(
        "connection refused".to_string(),
    )));
    let service = service(store.clone(), scanner);

    let err = service
        .ingest(Bytes::from_static(PDF), "pdf", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Unscannable {
            reason: ScanError::Transport(_),
            quarantine_id: Some(_),
        }
    ));
    assert!(err.to_string().contains("quarantined"));
    assert!(store.keys(PRIMARY).is_empty());
    assert_eq!(store.keys(QUARANTINE).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scanner_timeout_is_handled_like_an_infection() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Hangs));

    let err = service
        .ingest(Bytes::from_static(PDF), "pdf", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Unscannable {
            reason: ScanError::Timeout(_),
            ..
        }
    ));
    assert!(store.keys(PRIMARY).is_empty());
    assert_eq!(store.keys(QUARANTINE).len(), 1);
}

#[tokio::test]
async fn rejection_stands_when_quarantine_write_fails() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    store.fail_next(StoreOp::Put, 1);

    let err = service
        .ingest(Bytes::from_static(EICAR), "txt", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Infected {
            quarantine_id: None,
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.contains("quarantine write failed, payload dropped"), "{message}");
    assert!(!message.contains("was quarantined"), "{message}");
    assert!(store.keys(PRIMARY).is_empty());
    assert!(store.keys(QUARANTINE).is_empty());
}

#[tokio::test]
async fn rejection_message_names_the_quarantine_id() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));

    let err = service
        .ingest(Bytes::from_static(EICAR), "txt", &CancellationToken::new())
        .await
        .unwrap_err();

    let IngestError::Infected {
        quarantine_id: Some(id),
        ..
    } = &err
    else {
        panic!("unexpected error: {err:?}");
    };
    assert!(err
        .to_string()
        .ends_with(&format!("the payload was quarantined as {}", id)));
}

#[tokio::test]
async fn manual_quarantine_reports_primary_copy_left_behind() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    let id = service
        .ingest(Bytes::from_static(b"minutes"), "txt", &CancellationToken::new())
        .await
        .unwrap();
    let key = format!("{}.txt", id);
    store.fail_key(StoreOp::Delete, key.clone());

    let err = service.quarantine(id.as_str()).await.unwrap_err();

    assert!(matches!(
        err,
        IngestError::Quarantine(QuarantineError::PrimaryDeleteFailed { .. })
    ));
    assert!(!err.is_rejection());
    // Still served from primary, and the copy is in quarantine.
    assert!(service.download(id.as_str()).await.is_ok());
    assert!(store.contains(QUARANTINE, &key));

    // Once the backend recovers, repeating the request finishes the move.
    store.clear_faults();
    service.quarantine(id.as_str()).await.unwrap();
    assert!(service.download(id.as_str()).await.unwrap_err().is_not_found());
    assert!(store.contains(QUARANTINE, &key));
}

#[tokio::test]
async fn manual_quarantine_moves_stored_file() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    let id = service
        .ingest(Bytes::from_static(b"minutes"), "txt", &CancellationToken::new())
        .await
        .unwrap();

    service.quarantine(id.as_str()).await.unwrap();

    assert!(service.download(id.as_str()).await.unwrap_err().is_not_found());
    let key = format!("{}.txt", id);
    assert_eq!(&store.get(QUARANTINE, &key).await.unwrap()[..], b"minutes");

    // Again, after the move: still fine.
    service.quarantine(id.as_str()).await.unwrap();
    let listed = service.list_quarantined().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].status, FileStatus::Quarantined);
    assert!(service.list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_then_download_is_not_found() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    let id = service
        .ingest(Bytes::from_static(b"bye"), "txt", &CancellationToken::new())
        .await
        .unwrap();

    service.delete(id.as_str()).await.unwrap();

    assert!(service.download(id.as_str()).await.unwrap_err().is_not_found());
    assert!(service.delete(id.as_str()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn malformed_reference_is_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));

    for reference in ["", "../etc/passwd", "abc/def.txt", "abc."] {
        let err = service.download(reference).await.unwrap_err();
        assert!(
            matches!(err, IngestError::InvalidReference(_)),
            "{reference:?} gave {err:?}"
        );
    }
    assert_eq!(total_calls(&store), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_put_failures_are_retried_with_growing_delays() {
    let store = Arc::new(RecordingStore::default());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    store.inner.fail_next(StoreOp::Put, 2);

    let id = service
        .ingest(Bytes::from_static(PDF), "pdf", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.inner.calls(StoreOp::Put), 3);
    let gaps = store.put_gaps();
    assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert!(gaps[0] < gaps[1]);
    assert!(store.inner.contains(PRIMARY, &format!("{}.pdf", id)));
}

#[tokio::test]
async fn retention_sweep_over_ingested_files() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = service(store.clone(), CountingScanner::new(FakeScanner::Eicar));
    let token = CancellationToken::new();
    let now = chrono::Utc::now();

    let mut ids = Vec::new();
    for days in [40, 31, 10] {
        let id = service
            .ingest(Bytes::from_static(b"note"), "txt", &token)
            .await
            .unwrap();
        store.set_last_modified(
            PRIMARY,
            &format!("{}.txt", id),
            now - chrono::Duration::days(days),
        );
        ids.push(id);
    }

    let sweeper = RetentionSweeper::from_config(service.storage().clone(), &helpers::test_config());
    let listed = service.list_files().await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|f| f.status == FileStatus::Stored));

    let report = sweeper.sweep_once(now).await.unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(report.retained, 1);
    assert!(service.download(ids[0].as_str()).await.unwrap_err().is_not_found());
    assert!(service.download(ids[1].as_str()).await.unwrap_err().is_not_found());
    assert!(service.download(ids[2].as_str()).await.is_ok());
}
