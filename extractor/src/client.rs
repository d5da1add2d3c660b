//! HTTP pagination client.
//!
//! [`RestClient::paginate`] drives the request/response loop for one
//! resource-run and returns a [`RecordStream`], a pull-based record
//! iterator: each `try_next` may block on a network round-trip, and page
//! N+1 is never requested before page N's records are consumed. That
//! ordering is required because paginators compute their next request from
//! the current response.

use crate::auth::Authenticator;
use crate::incremental::Incremental;
use crate::jsonpath::extract_value;
use crate::paginator::{PageContext, Paginator};
use extractor_core::config::HttpSettings;
use extractor_core::{Error, Result};
use futures::Stream;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// The mutable parts of an outgoing request, in the shape paginators and
/// authenticators manipulate before each send.
pub struct RequestParts {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub json: Option<Value>,
}

impl RequestParts {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: HeaderMap::new(),
            json: None,
        }
    }

    /// Set a query parameter, replacing any existing value for the name.
    pub fn set_query(&mut self, name: &str, value: &str) {
        self.query.retain(|(k, _)| k != name);
        self.query.push((name.to_string(), value.to_string()));
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Validation(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Validation(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(())
    }
}

/// What to do with a response matching a status/content rule. Only
/// `ignore` exists: a matching response becomes a silent empty page.
/// Transient retry stays the connector modules' concern, outside the
/// generic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseActionKind {
    Ignore,
}

/// A vendor-quirk absorber: e.g. "404 means empty result set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAction {
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Substring matched against the raw response body.
    #[serde(default)]
    pub content: Option<String>,
    pub action: ResponseActionKind,
}

impl ResponseAction {
    fn matches(&self, status: u16, body: &str) -> bool {
        if let Some(expected) = self.status_code {
            if status != expected {
                return false;
            }
        }
        if let Some(needle) = &self.content {
            if !body.contains(needle.as_str()) {
                return false;
            }
        }
        self.status_code.is_some() || self.content.is_some()
    }
}

/// Everything that defines one paginated fetch of one resource.
pub struct PaginateRequest {
    pub path: String,
    pub method: Method,
    pub params: Vec<(String, String)>,
    pub json: Option<Value>,
    pub paginator: Box<dyn Paginator>,
    pub data_selector: Option<String>,
    pub response_actions: Vec<ResponseAction>,
    pub incremental: Option<Arc<Incremental>>,
}

/// Shared per-connector HTTP plumbing: base URL, default headers, auth.
/// One client is built per resource-run; the paginator it drives is owned
/// by the returned stream and never shared.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    auth: Option<Arc<dyn Authenticator>>,
    resource_name: String,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        default_headers: HeaderMap,
        auth: Option<Arc<dyn Authenticator>>,
        http_settings: &HttpSettings,
        resource_name: impl Into<String>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(http_settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(http_settings.connect_timeout_secs))
            .user_agent(http_settings.user_agent.as_str())
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            base_url,
            default_headers,
            auth,
            resource_name: resource_name.into(),
        })
    }

    fn join_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|e| Error::Config(format!("invalid path url '{}': {}", path, e)));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| Error::Config(format!("invalid url '{}': {}", joined, e)))
    }

    /// Start the pagination loop. No request is sent until the stream is
    /// first polled.
    pub fn paginate(self, request: PaginateRequest) -> Result<RecordStream> {
        let url = self.join_url(&request.path)?;
        Ok(RecordStream {
            client: self,
            url,
            method: request.method,
            params: request.params,
            json: request.json,
            paginator: request.paginator,
            data_selector: request.data_selector,
            response_actions: request.response_actions,
            incremental: request.incremental,
            buffer: VecDeque::new(),
            pages_fetched: 0,
            done: false,
        })
    }
}

enum PageOutcome {
    Records(Vec<Value>),
    EndOfStream,
}

/// Lazy record sequence over a paginated endpoint. Purely a generator:
/// nothing beyond the HTTP calls themselves, and abandoning the stream
/// simply stops pagination.
pub struct RecordStream {
    client: RestClient,
    url: Url,
    method: Method,
    params: Vec<(String, String)>,
    json: Option<Value>,
    paginator: Box<dyn Paginator>,
    data_selector: Option<String>,
    response_actions: Vec<ResponseAction>,
    incremental: Option<Arc<Incremental>>,
    buffer: VecDeque<Value>,
    pages_fetched: u64,
    done: bool,
}

impl RecordStream {
    /// Pull the next record, fetching the next page when the current one
    /// is drained. Returns `Ok(None)` at end-of-stream.
    pub async fn try_next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                if let Some(incremental) = &self.incremental {
                    incremental.update(&record);
                }
                counter!("extractor_records_yielded", "resource" => self.client.resource_name.clone())
                    .increment(1);
                return Ok(Some(record));
            }

            if self.done {
                return Ok(None);
            }

            if self.pages_fetched > 0 && !self.paginator.has_next_page() {
                self.done = true;
                continue;
            }

            match self.fetch_page().await? {
                PageOutcome::EndOfStream => {
                    self.done = true;
                }
                PageOutcome::Records(records) => {
                    // Defensive stop: an empty page ends the stream even if
                    // the paginator still claims a next page.
                    if records.is_empty() {
                        self.done = true;
                    } else {
                        self.buffer.extend(records);
                    }
                }
            }
        }
    }

    async fn fetch_page(&mut self) -> Result<PageOutcome> {
        let mut parts = RequestParts::new(self.method.clone(), self.url.clone());
        parts.headers = self.client.default_headers.clone();
        parts.query = self.params.clone();
        parts.json = self.json.clone();

        self.paginator.update_request(&mut parts);

        if let Some(auth) = &self.client.auth {
            auth.apply(&mut parts).await?;
        }

        let mut builder = self
            .client
            .http
            .request(parts.method.clone(), parts.url.clone())
            .headers(parts.headers);
        if !parts.query.is_empty() {
            builder = builder.query(&parts.query);
        }
        if let Some(body) = &parts.json {
            builder = builder.json(body);
        }

        debug!(
            resource = %self.client.resource_name,
            url = %parts.url,
            page = self.pages_fetched + 1,
            "Fetching page"
        );

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;
        histogram!("extractor_request_duration_ms", "resource" => self.client.resource_name.clone())
            .record(started.elapsed().as_millis() as f64);

        self.pages_fetched += 1;
        counter!("extractor_pages_fetched", "resource" => self.client.resource_name.clone())
            .increment(1);

        // Configured response actions absorb known vendor quirks before
        // generic status handling.
        if let Some(action) = self
            .response_actions
            .iter()
            .find(|a| a.matches(status, &text))
        {
            match action.action {
                ResponseActionKind::Ignore => {
                    info!(
                        resource = %self.client.resource_name,
                        status,
                        "Response matched ignore rule, ending stream"
                    );
                    return Ok(PageOutcome::EndOfStream);
                }
            }
        }

        if !(200..300).contains(&status) {
            return Err(Error::HttpStatus {
                status,
                url: parts.url.to_string(),
                body: text.chars().take(512).collect(),
            });
        }

        // A body that fails JSON parsing ends the stream without error.
        // Deliberately preserved behavior; the warn makes it observable.
        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    resource = %self.client.resource_name,
                    url = %parts.url,
                    error = %e,
                    "Response body is not valid JSON, treating as end of data"
                );
                return Ok(PageOutcome::EndOfStream);
            }
        };

        let records = match extract_value(&body, self.data_selector.as_deref()) {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(single) => vec![single],
        };

        let ctx = PageContext {
            status,
            headers: &headers,
            body: &body,
            records: &records,
        };
        self.paginator.update_state(&ctx);

        debug!(
            resource = %self.client.resource_name,
            records = records.len(),
            has_next = self.paginator.has_next_page(),
            "Processed page"
        );

        Ok(PageOutcome::Records(records))
    }

    /// Adapt into a `futures::Stream` for combinator-style consumption.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            match stream.try_next().await? {
                Some(record) => Ok(Some((record, stream))),
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_query_replaces_existing_value() {
        let mut parts = RequestParts::new(
            Method::GET,
            Url::parse("https://api.example.com/items").unwrap(),
        );
        parts.set_query("offset", "0");
        parts.set_query("offset", "2");
        assert_eq!(parts.query, vec![("offset".to_string(), "2".to_string())]);
    }

    #[test]
    fn response_action_matching() {
        let action = ResponseAction {
            status_code: Some(404),
            content: None,
            action: ResponseActionKind::Ignore,
        };
        assert!(action.matches(404, "not found"));
        assert!(!action.matches(500, "boom"));

        let content_rule = ResponseAction {
            status_code: None,
            content: Some("no such account".into()),
            action: ResponseActionKind::Ignore,
        };
        assert!(content_rule.matches(400, "error: no such account here"));
        assert!(!content_rule.matches(400, "other error"));

        // A rule with no condition matches nothing rather than everything.
        let empty = ResponseAction {
            status_code: None,
            content: None,
            action: ResponseActionKind::Ignore,
        };
        assert!(!empty.matches(200, ""));
    }

    #[test]
    fn retry_action_is_rejected_at_parse_time() {
        let parsed: std::result::Result<ResponseAction, _> =
            serde_json::from_value(serde_json::json!({
                "status_code": 429,
                "action": "retry"
            }));
        assert!(parsed.is_err());
    }
}
