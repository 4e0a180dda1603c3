//! Upstream forwarding
//!
//! Rewrites an inbound request onto the fixed upstream host and relays the
//! answer. Only `content-type` crosses over from the inbound headers; the
//! upstream key is injected fresh, so caller cookies, authorization and
//! tracing headers never reach the upstream.
//!
//! Request and response bodies are both streamed through without buffering.

use std::sync::{Arc, OnceLock};

use axum::{
    body::{Body, HttpBody},
    http::{
        header::{CONNECTION, CONTENT_ENCODING, CONTENT_TYPE, REFERRER_POLICY, TRANSFER_ENCODING},
        HeaderMap, HeaderName, HeaderValue, Method, Uri,
    },
    response::Response,
};
use futures::TryStreamExt;
use reqwest::Client;
use thiserror::Error;

/// Header carrying the API key, both inbound (caller secret) and upstream (pool key)
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Response headers tied to the upstream hop that must not be relayed
static STRIPPED_RESPONSE_HEADERS: [HeaderName; 4] = [
    TRANSFER_ENCODING,
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    CONTENT_ENCODING,
];

/// Errors that can occur when calling the upstream API
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream key is not a valid header value")]
    InvalidKey,

    /// The inbound body failed while it was being streamed upstream
    #[error("Failed to read the request body: {0}")]
    InboundBody(String),
}

/// Forwards requests to the upstream API
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: Client,
    base_url: String,
}

impl UpstreamForwarder {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base><path><?query>` with path and query copied verbatim
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Send the request upstream with `key` injected and relay the response
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        content_type: Option<HeaderValue>,
        body: Body,
        key: &str,
    ) -> Result<Response, ForwardError> {
        let url = self.target_url(uri);

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key).map_err(|_| ForwardError::InvalidKey)?;
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, content_type);
        }

        tracing::debug!(method = %method, url = %url, "Forwarding request upstream");

        let mut request = self.client.request(method, url.as_str()).headers(headers);

        // Set when the caller's side of the stream breaks, so that failure is
        // told apart from the upstream connection failing.
        let inbound_error: Arc<OnceLock<String>> = Arc::new(OnceLock::new());

        if body.size_hint().exact() != Some(0) {
            let recorder = Arc::clone(&inbound_error);
            let stream = body.into_data_stream().map_err(move |e| {
                let _ = recorder.set(e.to_string());
                e
            });
            request = request.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream = match request.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                return Err(match inbound_error.get() {
                    Some(detail) => ForwardError::InboundBody(detail.clone()),
                    None => ForwardError::Http(e),
                });
            }
        };

        tracing::debug!(status = upstream.status().as_u16(), "Upstream responded");

        Ok(relay(upstream))
    }
}

/// Drop hop-specific headers from an upstream response header set
pub fn strip_response_headers(headers: &mut HeaderMap) {
    for name in &STRIPPED_RESPONSE_HEADERS {
        headers.remove(name);
    }
}

/// Stream the upstream response back with sanitized headers
fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_response_headers(&mut headers);
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
