//! Integration tests for the check command.

use receipt_guard::commands::Command;
use receipt_guard::commands::check::Checker;
use receipt_guard::error::Error;
use receipt_guard::services::detector::{MatchKind, Submission};
use receipt_guard::services::record::Provenance;
use receipt_guard::services::store::{HashStore, JsonFileHashStore};

use crate::common::{assert_path_exists, receipt_png, resave_jpeg, temp_dir, write_file};

#[tokio::test]
async fn test_checker_records_then_flags_resubmission() {
    let tmp = temp_dir();
    let store = tmp.path().join("hashes.json");
    let image = write_file(tmp.path(), "receipt.png", &receipt_png(1));
    let submission = Submission::new().with_provenance(Provenance {
        user_id: Some("user-7".into()),
        ..Provenance::default()
    });

    let checker = Checker::new(image, store.clone(), submission, false, true);

    let first = checker.run().await.unwrap();
    assert!(!first.is_duplicate());
    assert_path_exists(&store);

    let second = checker.run().await.unwrap();
    assert_eq!(second.kind(), Some(MatchKind::Exact));
    assert_eq!(
        second.matched().unwrap().provenance.user_id.as_deref(),
        Some("user-7")
    );
}

#[tokio::test]
async fn test_checker_flags_recompressed_copy() {
    let tmp = temp_dir();
    let store = tmp.path().join("hashes.json");
    let original = receipt_png(2);
    let original_path = write_file(tmp.path(), "original.png", &original);
    let copy_path = write_file(tmp.path(), "forwarded.jpg", &resave_jpeg(&original, 70));

    Checker::new(original_path, store.clone(), Submission::new(), false, true)
        .run()
        .await
        .unwrap();
    let verdict = Checker::new(copy_path, store.clone(), Submission::new(), false, true)
        .run()
        .await
        .unwrap();

    assert_eq!(verdict.kind(), Some(MatchKind::Similar));
    let reopened = JsonFileHashStore::open(&store).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_checker_missing_image() {
    let tmp = temp_dir();
    let checker = Checker::new(
        tmp.path().join("nope.png"),
        tmp.path().join("hashes.json"),
        Submission::new(),
        false,
        true,
    );

    let result = checker.run().await;
    assert!(matches!(result, Err(Error::PathNotFound(_))));
}

#[tokio::test]
async fn test_checker_executes_with_json_output() {
    let tmp = temp_dir();
    let image = write_file(tmp.path(), "receipt.png", &receipt_png(3));
    let checker = Checker::new(
        image,
        tmp.path().join("hashes.json"),
        Submission::new(),
        true,
        false,
    );

    assert!(checker.execute().await.is_ok());
}
