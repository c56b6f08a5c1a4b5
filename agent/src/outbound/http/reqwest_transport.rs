//! Reqwest-backed upstream transport.
//!
//! This adapter owns transport details only: building the request, the
//! timeout, encoding the photo form and mapping client failures onto
//! [`TransportError`]. Any status upstream returns is a response, not an
//! error; the domain decides what a 4xx or 5xx means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, redirect};

use crate::domain::http::{
    AgentResponse, HeaderList, PhotoForm, UpstreamBody, UpstreamRequest, is_transport_managed,
};
use crate::domain::ports::{TransportError, UpstreamTransport};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport sending requests with a shared reqwest client.
///
/// Redirects are returned to the caller rather than followed, so the
/// application sees the same responses it would without the agent.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<AgentResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            TransportError::invalid_request(format!("invalid method `{}`", request.method))
        })?;
        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            UpstreamBody::Empty => builder,
            UpstreamBody::Bytes(bytes) => builder.body(bytes),
            UpstreamBody::Text(text) => builder.body(text),
            UpstreamBody::PhotoForm(form) => builder.multipart(photo_form(form)?),
        };

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        let body = response.bytes().await.map_err(map_transport_error)?;
        Ok(AgentResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

fn photo_form(form: PhotoForm) -> Result<Form, TransportError> {
    let photo = Part::bytes(form.file)
        .file_name(form.file_name)
        .mime_str(&form.content_type)
        .map_err(|error| {
            TransportError::invalid_request(format!(
                "invalid photo content type `{}`: {error}",
                form.content_type
            ))
        })?;
    let mut multipart = Form::new().part("photo", photo);
    if let Some(caption) = form.caption {
        multipart = multipart.text("caption", caption);
    }
    Ok(multipart.text("taken_at", form.taken_at))
}

fn response_headers(headers: &reqwest::header::HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter(|(name, _)| !is_transport_managed(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_builder() {
        TransportError::invalid_request(error.to_string())
    } else {
        TransportError::unreachable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Exercises the adapter against a local actix-web upstream.

    use std::net::TcpListener;

    use actix_web::dev::ServerHandle;
    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use serde_json::{Value, json};
    use url::Url;

    use super::*;

    async fn echo(request: HttpRequest, body: web::Bytes) -> HttpResponse {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        };
        HttpResponse::Ok()
            .insert_header(("x-upstream", "echo"))
            .json(json!({
                "method": request.method().as_str(),
                "path": request.uri().to_string(),
                "authorization": header("authorization"),
                "content_type": header("content-type"),
                "body": String::from_utf8_lossy(&body),
            }))
    }

    async fn moved() -> HttpResponse {
        HttpResponse::Found()
            .insert_header(("location", "/elsewhere"))
            .finish()
    }

    async fn slow() -> HttpResponse {
        tokio::time::sleep(Duration::from_secs(2)).await;
        HttpResponse::Ok().finish()
    }

    async fn spawn_upstream() -> (Url, ServerHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let server = HttpServer::new(|| {
            App::new()
                .route("/moved", web::get().to(moved))
                .route("/slow", web::get().to(slow))
                .default_service(web::to(echo))
        })
        .disable_signals()
        .workers(1)
        .listen(listener)
        .expect("bind test server")
        .run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (
            Url::parse(&format!("http://{addr}/")).expect("base url"),
            handle,
        )
    }

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(DEFAULT_REQUEST_TIMEOUT).expect("client")
    }

    fn json_body(response: &AgentResponse) -> Value {
        serde_json::from_slice(&response.body).expect("json body")
    }

    #[actix_web::test]
    async fn sends_method_headers_and_body() {
        let (base, handle) = spawn_upstream().await;
        let request = UpstreamRequest {
            method: "PUT".to_owned(),
            url: base.join("api/v1/items/42?draft=1").expect("url"),
            headers: vec![
                ("authorization".to_owned(), "Bearer abc".to_owned()),
                ("content-type".to_owned(), "application/json".to_owned()),
            ],
            body: UpstreamBody::Text(r#"{"result":"FAIL"}"#.to_owned()),
        };

        let response = transport().send(request).await.expect("response");

        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-upstream"), Some("echo"));
        assert_eq!(response.header("content-length"), None);
        assert_eq!(
            json_body(&response),
            json!({
                "method": "PUT",
                "path": "/api/v1/items/42?draft=1",
                "authorization": "Bearer abc",
                "content_type": "application/json",
                "body": r#"{"result":"FAIL"}"#,
            })
        );
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn encodes_photos_as_multipart_forms() {
        let (base, handle) = spawn_upstream().await;
        let request = UpstreamRequest {
            method: "POST".to_owned(),
            url: base.join("api/v1/audit-items/7/photos").expect("url"),
            headers: Vec::new(),
            body: UpstreamBody::PhotoForm(PhotoForm {
                file: b"JPEGDATA".to_vec(),
                file_name: "site.jpg".to_owned(),
                content_type: "image/jpeg".to_owned(),
                caption: Some("north wall".to_owned()),
                taken_at: "2024-05-01T09:00:00+00:00".to_owned(),
            }),
        };

        let response = transport().send(request).await.expect("response");

        let echoed = json_body(&response);
        let content_type = echoed["content_type"].as_str().expect("content type");
        let body = echoed["body"].as_str().expect("body");
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(body.contains(r#"name="photo"; filename="site.jpg""#));
        assert!(body.contains("JPEGDATA"));
        assert!(body.contains(r#"name="caption""#));
        assert!(body.contains("north wall"));
        assert!(body.contains(r#"name="taken_at""#));
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn returns_redirects_instead_of_following_them() {
        let (base, handle) = spawn_upstream().await;

        let response = transport()
            .send(UpstreamRequest::get(base.join("moved").expect("url")))
            .await
            .expect("response");

        assert_eq!(response.status, 302);
        assert_eq!(response.header("location"), Some("/elsewhere"));
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn slow_upstreams_time_out() {
        let (base, handle) = spawn_upstream().await;
        let transport = ReqwestTransport::new(Duration::from_millis(100)).expect("client");

        let error = transport
            .send(UpstreamRequest::get(base.join("slow").expect("url")))
            .await
            .expect_err("timeout");

        assert!(matches!(error, TransportError::Timeout { .. }));
        assert!(error.is_connectivity());
        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn refused_connections_are_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let error = transport()
            .send(UpstreamRequest::get(
                Url::parse(&format!("http://{addr}/")).expect("url"),
            ))
            .await
            .expect_err("refused");

        assert!(matches!(error, TransportError::Unreachable { .. }));
    }

    #[actix_web::test]
    async fn invalid_header_values_are_invalid_requests() {
        let request = UpstreamRequest {
            method: "POST".to_owned(),
            url: Url::parse("http://127.0.0.1:9/").expect("url"),
            headers: vec![("x-bad".to_owned(), "line\nbreak".to_owned())],
            body: UpstreamBody::Empty,
        };

        let error = transport().send(request).await.expect_err("builder error");

        assert!(matches!(error, TransportError::InvalidRequest { .. }));
        assert!(!error.is_connectivity());
    }
}
