//! Request classification.
//!
//! Decides, from the method and target alone, whether the agent touches a
//! request at all and which path it takes. Pure and allocation-light; called
//! once per intercepted request.

use url::{Origin, Url};

/// Routing decision for one intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not the agent's business; forwarded untouched.
    Ignore,
    /// Read that may be served from cache when offline.
    CacheableGet,
    /// Write that is queued when the network fails.
    DurableMutation,
}

/// Origin and path rules applied by [`RequestClassifier::classify`].
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    api_origins: Vec<Origin>,
    auth_prefix: String,
}

impl RequestClassifier {
    /// Build a classifier trusting `api_origins` besides the page origin.
    ///
    /// `auth_prefix` is matched on whole path segments, so `/api/v1/auth`
    /// covers `/api/v1/auth/login` but not `/api/v1/authors`.
    pub fn new<'a>(api_origins: impl IntoIterator<Item = &'a Url>, auth_prefix: &str) -> Self {
        Self {
            api_origins: api_origins.into_iter().map(Url::origin).collect(),
            auth_prefix: auth_prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Classify `method` against `target`, relative to the page's origin.
    ///
    /// Malformed URLs and opaque origins classify as
    /// [`Classification::Ignore`].
    ///
    /// # Examples
    /// ```
    /// use offline_agent::domain::{Classification, RequestClassifier};
    /// use url::Url;
    ///
    /// let api = Url::parse("http://localhost:8000").expect("url");
    /// let classifier = RequestClassifier::new([&api], "/api/v1/auth");
    /// assert_eq!(
    ///     classifier.classify("PUT", "http://localhost:8000/api/v1/items/42", "http://localhost:5173"),
    ///     Classification::DurableMutation,
    /// );
    /// ```
    #[must_use]
    pub fn classify(&self, method: &str, target: &str, page_origin: &str) -> Classification {
        let (Ok(target), Ok(page)) = (Url::parse(target), Url::parse(page_origin)) else {
            return Classification::Ignore;
        };
        let origin = target.origin();
        if !origin.is_tuple() {
            return Classification::Ignore;
        }
        if origin != page.origin() && !self.api_origins.contains(&origin) {
            return Classification::Ignore;
        }
        if self.is_auth_path(target.path()) {
            return Classification::Ignore;
        }
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Classification::CacheableGet,
            "POST" | "PUT" | "PATCH" | "DELETE" => Classification::DurableMutation,
            _ => Classification::Ignore,
        }
    }

    fn is_auth_path(&self, path: &str) -> bool {
        if self.auth_prefix.is_empty() {
            return false;
        }
        path.strip_prefix(self.auth_prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}
