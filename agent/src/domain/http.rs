//! Transport-neutral request and response shapes.
//!
//! The inbound adapter converts framework requests into
//! [`InterceptedRequest`]; the agent answers with [`AgentResponse`] and talks
//! to upstream through [`UpstreamRequest`].

use serde_json::{Value, json};
use url::Url;

/// Header set as an ordered list; duplicate names are allowed.
pub type HeaderList = Vec<(String, String)>;

/// Headers the transport manages itself. Never stored, never forwarded.
const TRANSPORT_MANAGED: [&str; 10] = [
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Whether `name` is a header the HTTP transport owns.
#[must_use]
pub fn is_transport_managed(name: &str) -> bool {
    TRANSPORT_MANAGED
        .iter()
        .any(|managed| managed.eq_ignore_ascii_case(name))
}

/// A call issued by the application and handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    /// Absolute target URL as received; may be malformed.
    pub url: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl InterceptedRequest {
    /// Build a request with no headers and no body.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Clone into an upstream request, dropping transport-managed headers.
    ///
    /// Returns `None` when the target is not an absolute URL.
    #[must_use]
    pub fn to_upstream(&self) -> Option<UpstreamRequest> {
        let url = Url::parse(&self.url).ok()?;
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| !is_transport_managed(name))
            .cloned()
            .collect();
        let body = if self.body.is_empty() {
            UpstreamBody::Empty
        } else {
            UpstreamBody::Bytes(self.body.clone())
        };
        Some(UpstreamRequest {
            method: self.method.to_ascii_uppercase(),
            url,
            headers,
            body,
        })
    }
}

/// Body variants the upstream transport knows how to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamBody {
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    PhotoForm(PhotoForm),
}

/// Multipart photo form: `photo` file part, optional `caption`, `taken_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoForm {
    pub file: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub caption: Option<String>,
    pub taken_at: String,
}

/// Request sent to an upstream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub method: String,
    pub url: Url,
    pub headers: HeaderList,
    pub body: UpstreamBody,
}

impl UpstreamRequest {
    /// Plain `GET` without headers.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_owned(),
            url,
            headers: Vec::new(),
            body: UpstreamBody::Empty,
        }
    }

    /// Upper-case verb.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// First value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response returned to the application, whether fetched, cached or
/// synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl AgentResponse {
    /// Response with a body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// JSON response with `content-type: application/json`.
    #[must_use]
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    /// Envelope served for API reads made offline with nothing cached.
    #[must_use]
    pub fn offline_envelope() -> Self {
        Self::json(200, &json!({ "data": [], "offline": true }))
    }

    /// Last-resort page response when neither network nor cache can help.
    #[must_use]
    pub fn offline_unavailable() -> Self {
        Self::new(503, "Offline - content not available")
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    /// Append or replace a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// First value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
