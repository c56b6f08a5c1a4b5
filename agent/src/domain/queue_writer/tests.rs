//! Queue writer serialization and commit behaviour.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mockall::predicate::eq;
use rstest::rstest;
use serde_json::Value;

use super::*;
use crate::domain::ports::{
    MockDeferredSyncScheduler, MockQueueStore, NoOpReplayMetrics, SyncRegistrationError,
};
use crate::test_support::MutableClock;

const TARGET: &str = "http://localhost:8000/api/v1/items/42";
const BOUNDARY_BODY: &str =
    "--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--XyZ--\r\n";

fn put_request() -> InterceptedRequest {
    InterceptedRequest::new("PUT", TARGET)
        .with_header("Content-Type", "application/json")
        .with_header("Authorization", "Bearer abc")
        .with_header("Host", "localhost:8000")
        .with_header("Content-Length", "17")
        .with_body(br#"{"result":"FAIL"}"#.to_vec())
}

fn writer(store: MockQueueStore, scheduler: MockDeferredSyncScheduler) -> QueueWriter {
    let clock = MutableClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).single().expect("ts"));
    QueueWriter::new(
        QueueWriterPorts {
            store: Arc::new(store),
            scheduler: Arc::new(scheduler),
            metrics: Arc::new(NoOpReplayMetrics),
        },
        Arc::new(clock),
        false,
    )
}

fn accepting_scheduler() -> MockDeferredSyncScheduler {
    let mut scheduler = MockDeferredSyncScheduler::new();
    scheduler.expect_register().returning(|_| Ok(()));
    scheduler
}

#[test]
fn serializes_a_put_with_lowercased_headers_and_text_body() {
    let record = serialize_mutation(&put_request(), false).expect("serializable");

    assert_eq!(record.method, MutationMethod::Put);
    assert_eq!(record.url.as_str(), TARGET);
    assert_eq!(
        record.headers.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["authorization", "content-type"]
    );
    assert_eq!(
        record.body,
        Some(MutationBody::Text(r#"{"result":"FAIL"}"#.to_owned()))
    );
}

#[test]
fn empty_bodies_are_stored_as_none() {
    let request = InterceptedRequest::new("DELETE", TARGET);
    let record = serialize_mutation(&request, false).expect("serializable");
    assert_eq!(record.body, None);
}

#[test]
fn multipart_bodies_drop_their_content_type() {
    let request = InterceptedRequest::new("POST", TARGET)
        .with_header("content-type", "multipart/form-data; boundary=XyZ")
        .with_body(BOUNDARY_BODY.as_bytes().to_vec());

    let record = serialize_mutation(&request, false).expect("serializable");

    assert!(!record.headers.contains_key("content-type"));
    assert_eq!(
        record.body,
        Some(MutationBody::Multipart(BOUNDARY_BODY.to_owned()))
    );
}

#[test]
fn stamps_an_idempotency_key_unless_one_is_present() {
    let stamped = serialize_mutation(&put_request(), true).expect("serializable");
    let key = stamped
        .headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .expect("stamped key");
    assert!(Uuid::parse_str(key).is_ok());

    let supplied = put_request().with_header("Idempotency-Key", "client-chosen");
    let kept = serialize_mutation(&supplied, true).expect("serializable");
    assert_eq!(
        kept.headers.get(IDEMPOTENCY_KEY_HEADER).map(String::as_str),
        Some("client-chosen")
    );
}

#[rstest]
#[case::binary_body(
    InterceptedRequest::new("POST", TARGET).with_body(vec![0xff, 0xfe, 0x00]),
    "not valid UTF-8"
)]
#[case::relative_url(InterceptedRequest::new("POST", "/items"), "invalid url")]
#[case::read_verb(InterceptedRequest::new("GET", TARGET), "not a mutating method")]
#[case::multipart_without_boundary(
    InterceptedRequest::new("POST", TARGET)
        .with_header("content-type", "multipart/form-data")
        .with_body(b"no delimiter here".to_vec()),
    "boundary"
)]
fn rejects_requests_without_a_durable_form(
    #[case] request: InterceptedRequest,
    #[case] fragment: &str,
) {
    let error = serialize_mutation(&request, false).expect_err("must be rejected");
    assert!(
        matches!(&error, EnqueueError::Unserializable(message) if message.contains(fragment)),
        "unexpected error: {error}"
    );
}

#[rstest]
#[case("--abc\r\nrest", Some("abc"))]
#[case("--abc\nrest", Some("abc"))]
#[case("--\r\n", None)]
#[case("abc\r\n", None)]
#[case("", None)]
fn reads_the_boundary_from_the_first_line(#[case] body: &str, #[case] expected: Option<&str>) {
    assert_eq!(multipart_boundary(body), expected);
}

#[tokio::test]
async fn commits_then_registers_both_sync_tags() {
    let mut store = MockQueueStore::new();
    store
        .expect_append()
        .times(1)
        .returning(|_| Ok(SequenceKey::new(1)));
    let mut scheduler = MockDeferredSyncScheduler::new();
    scheduler
        .expect_register()
        .with(eq(SyncTag::Api))
        .times(1)
        .returning(|_| Ok(()));
    scheduler
        .expect_register()
        .with(eq(SyncTag::Photos))
        .times(1)
        .returning(|_| Ok(()));

    let ack = writer(store, scheduler)
        .enqueue_mutation(&put_request())
        .await
        .expect("queued");

    assert_eq!(
        ack,
        QueuedAck {
            kind: QueueKind::Mutation,
            key: SequenceKey::new(1)
        }
    );
}

#[tokio::test]
async fn registration_failure_does_not_fail_the_enqueue() {
    let mut store = MockQueueStore::new();
    store.expect_append().returning(|_| Ok(SequenceKey::new(3)));
    let mut scheduler = MockDeferredSyncScheduler::new();
    scheduler
        .expect_register()
        .returning(|_| Err(SyncRegistrationError::unavailable("stopped")));

    let ack = writer(store, scheduler)
        .enqueue_mutation(&put_request())
        .await
        .expect("queued despite registration failure");

    assert_eq!(ack.key, SequenceKey::new(3));
}

#[tokio::test]
async fn storage_failure_surfaces_and_skips_registration() {
    let mut store = MockQueueStore::new();
    store
        .expect_append()
        .returning(|_| Err(QueueStoreError::write("database or disk is full")));
    let mut scheduler = MockDeferredSyncScheduler::new();
    scheduler.expect_register().never();

    let error = writer(store, scheduler)
        .enqueue_mutation(&put_request())
        .await
        .expect_err("storage failure");

    assert!(matches!(error, EnqueueError::Storage(_)));
    assert_eq!(error.into_response().status, 507);
}

#[tokio::test]
async fn photos_are_stamped_with_the_clock_and_keep_their_bytes() {
    let mut store = MockQueueStore::new();
    store
        .expect_append()
        .withf(|record| match record {
            QueuedRecord::Photo(photo) => {
                photo.file == vec![0x89, b'P', b'N', b'G', 0x00]
                    && photo.created_at == Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
                    && photo.url.as_str() == "http://localhost:8000/api/v1/audit-items/12/photos"
                    && photo.caption.as_deref() == Some("crack in wall")
                    && !photo.headers.contains_key("content-type")
            }
            QueuedRecord::Mutation(_) => false,
        })
        .returning(|_| Ok(SequenceKey::new(5)));

    let base = Url::parse("http://localhost:8000/api/v1/").expect("url");
    let upload = PhotoUpload::for_audit_item(
        &base,
        12,
        vec![0x89, b'P', b'N', b'G', 0x00],
        "wall.png",
        "image/png",
    )
    .expect("join")
    .with_caption("crack in wall")
    .with_header("Content-Type", "image/png")
    .with_header("Authorization", "Bearer abc");

    let ack = writer(store, accepting_scheduler())
        .enqueue_photo(upload)
        .await
        .expect("queued");

    assert_eq!(ack.kind, QueueKind::Photo);
}

#[test]
fn empty_photos_are_rejected() {
    let base = Url::parse("http://localhost:8000/api/v1/").expect("url");
    let upload =
        PhotoUpload::for_audit_item(&base, 1, Vec::new(), "a.jpg", "image/jpeg").expect("join");
    assert!(matches!(
        serialize_photo(upload, Utc::now()),
        Err(EnqueueError::Unserializable(_))
    ));
}

#[rstest]
#[case::garbage("not a mime type")]
#[case::missing_subtype("image")]
#[case::spaces_in_type("image png")]
fn malformed_photo_content_types_are_rejected(#[case] content_type: &str) {
    let base = Url::parse("http://localhost:8000/api/v1/").expect("url");
    let upload = PhotoUpload::for_audit_item(&base, 1, vec![1, 2, 3], "a.jpg", content_type)
        .expect("join");

    let error = serialize_photo(upload, Utc::now()).expect_err("rejected");

    assert!(matches!(error, EnqueueError::Unserializable(_)));
    assert_eq!(error.into_response().status, 422);
}

#[rstest]
#[case::blank("  ", "application/octet-stream")]
#[case::padded(" image/jpeg ", "image/jpeg")]
#[case::parameters("image/png; q=1", "image/png; q=1")]
fn valid_photo_content_types_are_kept(#[case] content_type: &str, #[case] stored: &str) {
    let base = Url::parse("http://localhost:8000/api/v1/").expect("url");
    let upload = PhotoUpload::for_audit_item(&base, 1, vec![1, 2, 3], "a.jpg", content_type)
        .expect("join");

    let photo = serialize_photo(upload, Utc::now()).expect("serialized");

    assert_eq!(photo.content_type, stored);
}

#[test]
fn acknowledgement_is_distinguishable_from_upstream_success() {
    let response = QueuedAck {
        kind: QueueKind::Mutation,
        key: SequenceKey::new(1),
    }
    .into_response();

    assert_eq!(response.status, 200);
    assert_eq!(response.header(QUEUED_HEADER), Some("1"));
    let body: Value = serde_json::from_slice(&response.body).expect("json");
    insta::assert_json_snapshot!(body, @r#"
    {
      "key": 1,
      "offline": true,
      "queued": true
    }
    "#);
}

#[test]
fn unserializable_requests_answer_422() {
    let response = EnqueueError::Unserializable("binary".to_owned()).into_response();
    assert_eq!(response.status, 422);
    let body: Value = serde_json::from_slice(&response.body).expect("json");
    assert_eq!(body["queued"], Value::Bool(false));
}
