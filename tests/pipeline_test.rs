mod common;

use common::{
    FlakyStorage, MIB, pdf, start_pipeline, test_config, wait_for_documents, wait_for_terminal,
};
use mirage_upload::models::RawFile;
use mirage_upload::services::session::{FailureReason, SessionState};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_accepted_pdf_is_uploaded_and_registered() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());
    assert!(pipeline.session().is_none());

    let (file, bytes) = pdf("thesis.pdf", 2 * MIB);
    let session = pipeline.submit(file, bytes.clone()).await.unwrap();
    assert_eq!(session.state, SessionState::Transferring);

    let finished = wait_for_terminal(&pipeline, session.id).await;
    assert_eq!(
        finished.history(),
        &[
            SessionState::Idle,
            SessionState::Validating,
            SessionState::Transferring,
            SessionState::Succeeded,
        ]
    );
    assert_eq!(finished.percent(), 100);
    assert_eq!(finished.status_message.as_deref(), Some("Upload successful!"));

    wait_for_documents(&pipeline, 1).await;
    let documents = pipeline.documents();
    assert_eq!(documents.len(), 1);

    let descriptor = &documents[0];
    assert_eq!(descriptor.display_name, "thesis.pdf");
    assert_eq!(descriptor.byte_size, 2_097_152);
    assert_eq!(descriptor.size_mib(), "2.00");
    assert!(descriptor.storage_path.starts_with("pdfs/"));
    assert!(descriptor.storage_path.ends_with("_thesis.pdf"));
    assert_eq!(
        descriptor.locator,
        format!("memory://uploads/{}", descriptor.storage_path)
    );
    assert_eq!(storage.inner.object(&descriptor.storage_path).unwrap(), bytes);
}

#[tokio::test]
async fn test_oversized_file_fails_without_network() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());

    let (file, bytes) = pdf("scan.pdf", 11 * MIB);
    let session = pipeline.submit(file, bytes).await.unwrap();

    assert_eq!(session.state, SessionState::Failed(FailureReason::TooLarge));
    assert_eq!(
        session.history(),
        &[
            SessionState::Idle,
            SessionState::Validating,
            SessionState::Failed(FailureReason::TooLarge),
        ]
    );
    assert_eq!(
        session.status_message.as_deref(),
        Some("File size must be less than 10MB")
    );
    assert_eq!(storage.calls(), 0);
    assert!(pipeline.documents().is_empty());
}

#[tokio::test]
async fn test_wrong_media_type_fails_immediately() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());

    let file = RawFile::new("notes.txt", 12, "text/plain");
    let session = pipeline
        .submit(file, Bytes::from_static(b"hello, world"))
        .await
        .unwrap();

    assert_eq!(
        session.state,
        SessionState::Failed(FailureReason::WrongMediaType)
    );
    assert_eq!(
        session.status_message.as_deref(),
        Some("Please upload only PDF files")
    );
    assert_eq!(pipeline.session().unwrap().id, session.id);
    assert_eq!(storage.calls(), 0);
}

#[tokio::test]
async fn test_transfer_failure_then_fresh_attempt_succeeds() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());
    storage.fail_next_parts(1);

    let (file, bytes) = pdf("draft.pdf", MIB);
    let first = pipeline.submit(file.clone(), bytes.clone()).await.unwrap();
    let failed = wait_for_terminal(&pipeline, first.id).await;

    assert_eq!(
        failed.state,
        SessionState::Failed(FailureReason::TransferError)
    );
    assert_eq!(
        failed.status_message.as_deref(),
        Some("Upload failed. Please try again.")
    );
    assert!(pipeline.documents().is_empty());
    assert_eq!(storage.inner.pending_uploads(), 0);

    let second = pipeline.submit(file, bytes).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.history().len(), 3);

    let succeeded = wait_for_terminal(&pipeline, second.id).await;
    assert_eq!(succeeded.state, SessionState::Succeeded);
    wait_for_documents(&pipeline, 1).await;
    assert_eq!(pipeline.documents().len(), 1);
}

#[tokio::test]
async fn test_locator_failure_leaves_registry_unchanged() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());
    storage.fail_locator(true);

    let (file, bytes) = pdf("orphan.pdf", 300 * 1024);
    let session = pipeline.submit(file, bytes).await.unwrap();
    let finished = wait_for_terminal(&pipeline, session.id).await;

    assert_eq!(
        finished.state,
        SessionState::Failed(FailureReason::LocatorResolutionError)
    );
    assert!(pipeline.documents().is_empty());
    // The object itself was written
    assert_eq!(storage.inner.object_keys().len(), 1);
}

#[tokio::test]
async fn test_registry_grows_only_on_success() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());

    let (a, a_bytes) = pdf("same.pdf", 1000);
    let s = pipeline.submit(a.clone(), a_bytes.clone()).await.unwrap();
    wait_for_terminal(&pipeline, s.id).await;
    assert_eq!(pipeline.documents().len(), 1);

    let (big, big_bytes) = pdf("big.pdf", 10 * MIB + 1);
    pipeline.submit(big, big_bytes).await.unwrap();
    assert_eq!(pipeline.documents().len(), 1);

    storage.fail_next_parts(1);
    let s = pipeline.submit(a.clone(), a_bytes.clone()).await.unwrap();
    wait_for_terminal(&pipeline, s.id).await;
    assert_eq!(pipeline.documents().len(), 1);

    // Ensure the second upload of the same name lands in a different millisecond
    tokio::time::sleep(Duration::from_millis(5)).await;
    let s = pipeline.submit(a, a_bytes).await.unwrap();
    wait_for_terminal(&pipeline, s.id).await;
    wait_for_documents(&pipeline, 2).await;

    let documents = pipeline.documents();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].display_name, "same.pdf");
    assert_eq!(documents[1].display_name, "same.pdf");
    assert_ne!(documents[0].storage_path, documents[1].storage_path);
}

#[tokio::test]
async fn test_progress_snapshots_are_monotonic() {
    let storage = Arc::new(FlakyStorage::with_part_delay(Duration::from_millis(2)));
    let (pipeline, _shutdown) = start_pipeline(storage, &test_config());
    let mut sessions = pipeline.subscribe_session();

    let (file, bytes) = pdf("long.pdf", 2 * MIB);
    let session = pipeline.submit(file, bytes).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let snapshot = sessions.borrow_and_update().clone().unwrap();
        if snapshot.id == session.id {
            if let Some(progress) = snapshot.progress {
                seen.push(progress);
            }
            if snapshot.state.is_terminal() {
                break;
            }
        }
        tokio::time::timeout(Duration::from_secs(30), sessions.changed())
            .await
            .expect("timed out")
            .expect("coordinator stopped");
    }

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0].bytes_sent <= w[1].bytes_sent));
    assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(seen.last().unwrap().percent, 100);
}

#[tokio::test(start_paused = true)]
async fn test_success_status_clears_after_display_window() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage, &test_config());

    let (file, bytes) = pdf("brief.pdf", 1024);
    let session = pipeline.submit(file, bytes).await.unwrap();
    let finished = wait_for_terminal(&pipeline, session.id).await;
    assert_eq!(finished.status_message.as_deref(), Some("Upload successful!"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let shown = pipeline.session().unwrap();
    assert_eq!(shown.status_message.as_deref(), Some("Upload successful!"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let shown = pipeline.session().unwrap();
    assert_eq!(shown.id, session.id);
    assert_eq!(shown.state, SessionState::Succeeded);
    assert_eq!(shown.status_message, None);
    assert_eq!(shown.progress, None);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_transfer_still_registers() {
    let storage = Arc::new(FlakyStorage::with_part_delay(Duration::from_millis(100)));
    let (pipeline, _shutdown) = start_pipeline(storage, &test_config());

    let (first, first_bytes) = pdf("first.pdf", 768 * 1024);
    // One more part than the first, so it finishes strictly later
    let (second, second_bytes) = pdf("second.pdf", 1024 * 1024);

    let a = pipeline.submit(first, first_bytes).await.unwrap();
    let b = pipeline.submit(second, second_bytes).await.unwrap();
    assert_eq!(a.state, SessionState::Transferring);
    assert_eq!(pipeline.session().unwrap().id, b.id);

    let finished = wait_for_terminal(&pipeline, b.id).await;
    assert_eq!(finished.state, SessionState::Succeeded);
    wait_for_documents(&pipeline, 2).await;

    let names: Vec<String> = pipeline
        .documents()
        .iter()
        .map(|d| d.display_name.clone())
        .collect();
    assert_eq!(names, vec!["first.pdf", "second.pdf"]);
    // The displayed session never switches back to the superseded one
    assert_eq!(pipeline.session().unwrap().id, b.id);
}

#[tokio::test]
async fn test_declared_size_is_corrected_to_payload() {
    let storage = Arc::new(FlakyStorage::new());
    let (pipeline, _shutdown) = start_pipeline(storage.clone(), &test_config());

    // Claims to be tiny but carries 11 MiB
    let file = RawFile::new("liar.pdf", 10, "application/pdf");
    let session = pipeline
        .submit(file, Bytes::from(vec![0u8; 11 * MIB]))
        .await
        .unwrap();

    assert_eq!(session.state, SessionState::Failed(FailureReason::TooLarge));
    assert_eq!(storage.calls(), 0);
}
