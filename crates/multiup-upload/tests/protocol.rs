mod common;

use std::sync::Arc;

use common::{MockTransport, config, engine, gallery};
use multiup_upload::{
    CancelFlag, EngineError, ErrorKind, GalleryRequest, UploadCallbacks, UploadOutcome, sha256_file,
};

const LOGIN: &str = r#"{"token":"tok-A"}"#;
const INIT: &str = r#"{"upload_url":"https://poll.test/transfer","upload_id":"u1"}"#;

fn poll_mock() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new());
    mock.always("poll.test/login", 200, LOGIN);
    mock
}

#[tokio::test]
async fn known_file_is_deduplicated_without_transfer() {
    let mock = poll_mock();
    mock.always(
        "poll.test/init",
        200,
        r#"{"existing":"https://dl.test/already","url":"https://dl.test/already"}"#,
    );
    let (_dir, files) = gallery(&["a.jpg"]);
    let expected_hash = sha256_file(&files[0].path).await.unwrap();

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("dedupe", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    let result = &report.per_host["poll"][0];
    match &result.outcome {
        UploadOutcome::Completed(success) => {
            assert!(success.deduplicated);
            assert_eq!(success.bytes_uploaded, 0);
            assert_eq!(success.download_url, "https://dl.test/already");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.total_bytes, 0);
    assert!(mock.calls().iter().all(|c| !c.upload));

    let init = mock.calls().into_iter().find(|c| c.url == "https://poll.test/init").unwrap();
    assert_eq!(init.field("name"), Some("a.jpg"));
    assert_eq!(init.field("size"), Some("1000"));
    assert_eq!(init.field("hash"), Some(expected_hash.as_str()));
    assert_eq!(init.field("token"), Some("tok-A"));
}

#[tokio::test]
async fn polling_waits_for_processing_to_finish() {
    let mock = poll_mock();
    mock.always("poll.test/init", 200, INIT)
        .always("poll.test/transfer", 200, "{}")
        .once("poll.test/status/u1", 200, r#"{"state":"processing"}"#)
        .always("poll.test/status/u1", 200, r#"{"state":"done","url":"https://dl.test/a"}"#);
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("poll", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.links("poll"), vec!["https://dl.test/a"]);
    assert_eq!(mock.count("poll.test/status/u1"), 2);

    let calls = mock.calls();
    let transfer = calls.iter().find(|c| c.upload).unwrap();
    assert_eq!(transfer.url, "https://poll.test/transfer");
    assert_eq!(transfer.field("token"), None, "pre-authorized transfer carries no token");
    let poll = calls.iter().find(|c| c.url.ends_with("/status/u1")).unwrap();
    assert_eq!(poll.field("token"), Some("tok-A"));
}

#[tokio::test]
async fn polling_timeout_is_retried_once_then_reported() {
    let mock = poll_mock();
    mock.always("poll.test/init", 200, INIT)
        .always("poll.test/transfer", 200, "{}")
        .always("poll.test/status/u1", 200, r#"{"state":"processing"}"#);
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config().max_retries(1))
        .upload_gallery(GalleryRequest::new("slow", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    let failure = report.per_host["poll"][0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert!(failure.retries_exhausted);
    assert_eq!(mock.count("poll.test/init"), 2);
    assert_eq!(mock.count("poll.test/status/u1"), 6);
    assert_eq!(mock.count("poll.test/login"), 1);
}

#[tokio::test]
async fn host_side_processing_failure_is_a_server_error() {
    let mock = poll_mock();
    mock.always("poll.test/init", 200, INIT)
        .always("poll.test/transfer", 200, "{}")
        .always("poll.test/status/u1", 200, r#"{"state":"failed"}"#);
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config().max_retries(0))
        .upload_gallery(GalleryRequest::new("bad", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    let failure = report.per_host["poll"][0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Server);
    assert!(failure.message.contains("u1"), "{}", failure.message);
    assert_eq!(mock.count("poll.test/status/u1"), 1);
}

#[tokio::test]
async fn mismatched_remote_hash_is_rejected() {
    let mock = poll_mock();
    mock.always("poll.test/init", 200, INIT)
        .always("poll.test/transfer", 200, "{}")
        .always(
            "poll.test/status/u1",
            200,
            r#"{"state":"done","url":"https://dl.test/a","sha256":"deadbeef"}"#,
        );
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("hash", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    let failure = report.per_host["poll"][0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Client);
    assert!(failure.message.contains("deadbeef"));
    assert_eq!(mock.count("poll.test/init"), 1);
}

#[tokio::test]
async fn matching_remote_hash_is_accepted() {
    let (_dir, files) = gallery(&["a.jpg"]);
    let hash = sha256_file(&files[0].path).await.unwrap();

    let mock = poll_mock();
    mock.always("poll.test/init", 200, INIT)
        .always("poll.test/transfer", 200, "{}")
        .always(
            "poll.test/status/u1",
            200,
            &format!(r#"{{"state":"done","url":"https://dl.test/a","sha256":"{}"}}"#, hash.to_uppercase()),
        );

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("hash", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.total_bytes, 1000);
}

#[tokio::test]
async fn init_without_upload_url_fails_as_client_error() {
    let mock = poll_mock();
    mock.always("poll.test/init", 200, r#"{"message":"quota reached"}"#);
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("quota", files).host("poll"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    let failure = report.per_host["poll"][0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Client);
    assert!(failure.message.contains("upload url"), "{}", failure.message);
    assert_eq!(mock.count("poll.test/init"), 1);
}

#[tokio::test]
async fn deduplicated_gallery_creation_keeps_the_new_gallery_id() {
    let mock = Arc::new(MockTransport::new());
    mock.always(
        "mgal.test/init",
        200,
        r#"{"existing":"https://dl.test/a","url":"https://dl.test/a","gallery_id":"MG1"}"#,
    );
    let (_dir, files) = gallery(&["a.jpg"]);

    let report = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("album", files).host("mgal"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.gallery_ids.get("mgal").map(String::as_str), Some("MG1"));
    let init = &mock.calls()[0];
    assert_eq!(init.field("gallery_name"), Some("album"));
}

#[tokio::test]
async fn deduplicated_gallery_creation_without_an_id_is_a_client_error() {
    let mock = Arc::new(MockTransport::new());
    mock.always("mgal.test/init", 200, r#"{"existing":"https://dl.test/a","url":"https://dl.test/a"}"#);
    let (_dir, files) = gallery(&["a.jpg", "b.jpg"]);

    let err = engine(&mock, config())
        .upload_gallery(GalleryRequest::new("album", files).host("mgal"), UploadCallbacks::new(), CancelFlag::new())
        .await
        .unwrap_err();

    match err {
        EngineError::GalleryCreation { host, source, .. } => {
            assert_eq!(host, "mgal");
            assert_eq!(source.kind(), ErrorKind::Client);
            assert!(source.to_string().contains("no gallery id"), "{source}");
            assert!(source.body().is_some_and(|b| b.contains("dl.test/a")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.count("mgal.test/init"), 1);
}
