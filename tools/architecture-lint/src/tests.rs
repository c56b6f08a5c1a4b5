//! Unit tests for the architecture lint.

use std::path::PathBuf;

use rstest::rstest;

use super::*;

fn lint_one(file: &str, contents: &str) -> Result<(), ArchitectureLintError> {
    lint_sources(&[LintSource {
        file: PathBuf::from(file),
        contents: contents.to_owned(),
    }])
}

#[rstest]
#[case::inbound_uses_domain(
    "inbound/http/proxy.rs",
    "use crate::domain::InterceptedRequest; fn handler() { let _ = InterceptedRequest::new(\"GET\", \"/\"); }",
    true
)]
#[case(
    "inbound/http/proxy.rs",
    "use crate::outbound::persistence::SqliteQueueStore; fn handler() { let _ = SqliteQueueStore::new; }",
    false
)]
#[case(
    "inbound/http/proxy.rs",
    "use outbound::http::ReqwestTransport; fn handler() { let _ = ReqwestTransport::new; }",
    false
)]
#[case(
    "inbound/http/proxy.rs",
    "use offline_agent::outbound::sync::InProcessSyncRegistry; fn handler() {}",
    false
)]
#[case("inbound/http/control.rs", "use diesel::prelude::*; fn handler() {}", false)]
#[case(
    "inbound/http/control.rs",
    "fn handler() { let _ = reqwest::Client::new(); }",
    false
)]
#[case(
    "domain/replay/mod.rs",
    "use crate::inbound::http; fn thing() { let _ = 1; }",
    false
)]
#[case(
    "domain/agent/mod.rs",
    "use prometheus::IntCounter; fn thing() {}",
    false
)]
#[case(
    "domain/ports/queue_store.rs",
    "use async_trait::async_trait; use crate::domain::QueueKind; fn thing() {}",
    true
)]
#[case(
    "outbound/persistence/queue_store.rs",
    "use crate::inbound::http; fn thing() { let _ = 1; }",
    false
)]
#[case(
    "outbound/http/reqwest_transport.rs",
    "use actix_web::HttpResponse; fn thing() {}",
    false
)]
#[case(
    "outbound/http/reqwest_transport.rs",
    "use reqwest::Client; #[cfg(test)] mod tests { use actix_web::HttpServer; }",
    true
)]
#[case(
    "outbound/http/reqwest_transport_tests.rs",
    "use actix_web::HttpServer;",
    true
)]
fn layer_rules(#[case] file: &str, #[case] contents: &str, #[case] ok: bool) {
    let result = lint_one(file, contents);
    assert_eq!(result.is_ok(), ok, "result: {result:?}");
}

#[test]
fn files_outside_the_layers_are_rejected() {
    let result = lint_one("server/mod.rs", "fn main() {}");
    assert!(
        matches!(result, Err(ArchitectureLintError::Parse { .. })),
        "result: {result:?}"
    );
}

#[test]
fn each_forbidden_root_is_reported_once_per_file() {
    let result = lint_one(
        "domain/records.rs",
        "use diesel::prelude::*; use diesel::sql_types::Text; fn thing() { let _ = diesel::insert_into; }",
    );
    let Err(ArchitectureLintError::Violations(violations)) = result else {
        panic!("expected violations, got {result:?}");
    };
    assert_eq!(violations.len(), 1);
    assert_eq!(
        violations[0].message,
        "domain module must not depend on external crate `diesel`"
    );
}
