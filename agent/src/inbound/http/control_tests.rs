//! Tests for the control endpoints.

use actix_web::http::StatusCode;
use actix_web::test as actix_test;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::domain::http::UpstreamBody;
use crate::domain::ports::QueueStore;
use crate::domain::records::{QueuedRecord, StoredEntry};
use crate::domain::{AgentResponse, QueueKind, SequenceKey};
use crate::inbound::http::test_utils::test_agent;

fn put_item() -> actix_test::TestRequest {
    actix_test::TestRequest::put()
        .uri("/api/v1/items/42")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"result":"FAIL"}"#)
}

#[actix_web::test]
async fn status_reports_counts_lifecycle_and_state() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;
    actix_test::call_service(&app, put_item().to_request()).await;

    let body: Value = actix_test::call_and_read_body_json(
        &app,
        actix_test::TestRequest::get()
            .uri("/__offline/status")
            .to_request(),
    )
    .await;

    insta::assert_json_snapshot!(body, @r#"
    {
      "lifecycle": "stopped",
      "online": false,
      "pending_mutations": 1,
      "pending_photos": 0,
      "state": "offline_saved_locally",
      "version": "v2.2.5"
    }
    "#);
}

#[actix_web::test]
async fn sync_replays_the_queue_and_reports_each_drain() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;
    actix_test::call_service(&app, put_item().to_request()).await;
    agent.transport.push(Ok(AgentResponse::new(200, "{}")));

    let body: Value = actix_test::call_and_read_body_json(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/sync")
            .to_request(),
    )
    .await;

    insta::assert_json_snapshot!(body, @r#"
    {
      "reports": [
        {
          "abandoned": 0,
          "delivered": 1,
          "discarded": 0,
          "queue": "api-queue",
          "remaining": 0,
          "status": "completed"
        },
        {
          "abandoned": 0,
          "delivered": 0,
          "discarded": 0,
          "queue": "photo-queue",
          "remaining": 0,
          "status": "completed"
        }
      ],
      "status": {
        "online": true,
        "pending_mutations": 0,
        "pending_photos": 0,
        "state": "fully_synchronized"
      }
    }
    "#);
    let replayed = agent.transport.requests().pop().expect("replayed request");
    assert_eq!(replayed.method(), "PUT");
    assert_eq!(
        replayed.body,
        UpstreamBody::Text(r#"{"result":"FAIL"}"#.to_owned())
    );
}

#[actix_web::test]
async fn sync_reports_where_a_drain_halted() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;
    actix_test::call_service(&app, put_item().to_request()).await;
    actix_test::call_service(&app, put_item().to_request()).await;

    let body: Value = actix_test::call_and_read_body_json(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/sync")
            .to_request(),
    )
    .await;

    assert_eq!(
        body["reports"][0],
        json!({
            "queue": "api-queue",
            "status": "halted",
            "delivered": 0,
            "discarded": 0,
            "abandoned": 0,
            "remaining": 2,
            "halted_at": 1,
            "reason": "upstream unreachable: network down",
        })
    );
    assert_eq!(
        agent.store.live_keys(QueueKind::Mutation),
        vec![SequenceKey::new(1), SequenceKey::new(2)]
    );
}

#[actix_web::test]
async fn activate_records_the_current_version() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let body: Value = actix_test::call_and_read_body_json(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/activate")
            .to_request(),
    )
    .await;

    assert_eq!(body, json!({ "version": "v2.2.5", "purged": [] }));
    assert_eq!(agent.agent.lifecycle(), Lifecycle::Active);
}

#[rstest]
#[case::online(true, "fully_synchronized")]
#[case::offline(false, "offline_saved_locally")]
#[actix_web::test]
async fn connectivity_reports_update_the_state(#[case] online: bool, #[case] state: &str) {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let body: Value = actix_test::call_and_read_body_json(
        &app,
        actix_test::TestRequest::put()
            .uri("/__offline/connectivity")
            .set_json(json!({ "online": online }))
            .to_request(),
    )
    .await;

    assert_eq!(body["state"], state);
    assert_eq!(agent.agent.is_online(), online);
}

#[actix_web::test]
async fn photos_are_queued_with_their_bytes_and_token() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/photos?audit_item_id=7&name=site.jpg&caption=north%20wall")
            .insert_header(("content-type", "image/jpeg"))
            .insert_header(("authorization", "Bearer abc"))
            .set_payload(&b"\xff\xd8JPEG"[..])
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(agent.store.live_keys(QueueKind::Photo), vec![SequenceKey::new(1)]);

    agent.transport.push(Ok(AgentResponse::new(201, "{}")));
    agent.agent.sync_now().await;
    let upload = agent.transport.requests().pop().expect("upload");
    assert_eq!(
        upload.url.as_str(),
        "http://localhost:8000/api/v1/audit-items/7/photos"
    );
    assert_eq!(upload.header("authorization"), Some("Bearer abc"));
    let UpstreamBody::PhotoForm(form) = upload.body else {
        panic!("expected a photo form, got {:?}", upload.body);
    };
    assert_eq!(form.file, b"\xff\xd8JPEG".to_vec());
    assert_eq!(form.file_name, "site.jpg");
    assert_eq!(form.content_type, "image/jpeg");
    assert_eq!(form.caption.as_deref(), Some("north wall"));
}

#[actix_web::test]
async fn empty_photos_are_refused_and_not_saved() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/photos?audit_item_id=7&name=site.jpg")
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["queued"], false);
    assert!(agent.store.live_keys(QueueKind::Photo).is_empty());
}

#[actix_web::test]
async fn photos_larger_than_the_default_extractor_limit_are_stored_whole() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;
    let file = vec![0xAB_u8; 300 * 1024];

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/photos?audit_item_id=7&name=site.jpg")
            .insert_header(("content-type", "image/jpeg"))
            .set_payload(file.clone())
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let entries = agent.store.snapshot(QueueKind::Photo).await.expect("snapshot");
    let [StoredEntry::Valid {
        record: QueuedRecord::Photo(photo),
        ..
    }] = entries.as_slice()
    else {
        panic!("expected one queued photo, got {entries:?}");
    };
    assert_eq!(photo.file.len(), file.len());
}

#[actix_web::test]
async fn photos_with_a_malformed_content_type_are_refused() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/photos?audit_item_id=7&name=site.jpg")
            .insert_header(("content-type", "garbage"))
            .set_payload(&b"\xff\xd8JPEG"[..])
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["code"], "not_queueable");
    assert!(agent.store.live_keys(QueueKind::Photo).is_empty());
}

#[actix_web::test]
async fn photo_requests_without_an_item_id_are_rejected() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/__offline/photos?name=site.jpg")
            .set_payload("x")
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn storage_halts_have_no_key() {
    let report = DrainReport {
        kind: QueueKind::Photo,
        status: DrainStatus::Halted(HaltReason::Storage {
            message: "disk I/O error".to_owned(),
        }),
        delivered: 0,
        discarded: 0,
        abandoned: 0,
        remaining: 0,
    };

    let body = DrainReportBody::from(&report);

    assert_eq!(body.status, "halted");
    assert_eq!(body.halted_at, None);
    assert_eq!(body.reason.as_deref(), Some("disk I/O error"));
}

#[actix_web::test]
async fn rejected_replays_name_the_status() {
    let agent = test_agent();
    let app = actix_test::init_service(agent.app()).await;
    actix_test::call_service(&app, put_item().to_request()).await;
    agent.transport.set_default(Ok(AgentResponse::new(409, "conflict")));

    let reports = agent.agent.sync_now().await;
    let body = DrainReportBody::from(&reports[0]);

    assert_eq!(body.reason.as_deref(), Some("upstream answered 409"));
    assert_eq!(body.halted_at, Some(1));
}
