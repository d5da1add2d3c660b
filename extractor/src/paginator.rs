//! Pagination strategies.
//!
//! A [`Paginator`] mutates the outgoing request before every send
//! (`update_request`) and inspects every response afterwards
//! (`update_state`) to decide whether a next page exists. One fresh
//! instance is built per resource-run; instances are never shared across
//! runs, since their state is the pagination position itself.
//!
//! Termination never relies solely on "page had zero items": each strategy
//! reads whatever end-of-data signal its API actually provides (total
//! count, null cursor, missing `rel="next"`). The client layer adds its own
//! defensive stop on empty pages on top.

use crate::client::RequestParts;
use crate::jsonpath::extract_value;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Everything a paginator may inspect after a page is fetched.
pub struct PageContext<'a> {
    pub status: u16,
    pub headers: &'a HeaderMap,
    pub body: &'a Value,
    pub records: &'a [Value],
}

pub trait Paginator: Send {
    /// Attach pagination parameters to the next request. Called before
    /// every send, including the first.
    fn update_request(&mut self, req: &mut RequestParts);

    /// Observe a response and prepare state for the next request. Receives
    /// the full parsed body, not just the extracted records, so pagination
    /// metadata can live anywhere in the response.
    fn update_state(&mut self, ctx: &PageContext<'_>);

    fn has_next_page(&self) -> bool;
}

/// Builds a fresh vendor-custom paginator for each run. Wrapping a factory
/// rather than an instance keeps the one-paginator-per-run invariant even
/// when a connector config value is reused across syncs.
#[derive(Clone)]
pub struct PaginatorFactory(pub Arc<dyn Fn() -> Box<dyn Paginator> + Send + Sync>);

impl PaginatorFactory {
    pub fn new<P, F>(factory: F) -> Self
    where
        P: Paginator + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self(Arc::new(move || Box::new(factory())))
    }
}

impl std::fmt::Debug for PaginatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PaginatorFactory")
    }
}

/// Declarative paginator selection; the tag string only exists at parse
/// time, after which a concrete strategy instance is constructed per run.
/// The `Custom` variant carries a vendor paginator factory set in code by
/// connector modules and is never part of serialized configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginatorConfig {
    SinglePage,
    Offset {
        #[serde(default)]
        offset: u64,
        limit: u64,
        #[serde(default = "default_offset_param")]
        offset_param: String,
        #[serde(default = "default_limit_param")]
        limit_param: String,
        #[serde(default = "default_total_path")]
        total_path: Option<String>,
    },
    PageNumber {
        #[serde(default = "default_base_page")]
        base_page: u64,
        #[serde(default = "default_page_param")]
        page_param: String,
        #[serde(default)]
        page_size: Option<u64>,
        #[serde(default = "default_size_param")]
        size_param: String,
        #[serde(default)]
        total_path: Option<String>,
    },
    Cursor {
        cursor_path: String,
        #[serde(default = "default_cursor_param")]
        cursor_param: String,
    },
    JsonLink {
        #[serde(default = "default_next_url_path")]
        next_url_path: String,
    },
    LinkHeader,
    #[serde(skip)]
    Custom(PaginatorFactory),
}

fn default_offset_param() -> String {
    "offset".to_string()
}
fn default_limit_param() -> String {
    "limit".to_string()
}
fn default_total_path() -> Option<String> {
    Some("total".to_string())
}
fn default_base_page() -> u64 {
    1
}
fn default_page_param() -> String {
    "page".to_string()
}
fn default_size_param() -> String {
    "per_page".to_string()
}
fn default_cursor_param() -> String {
    "cursor".to_string()
}
fn default_next_url_path() -> String {
    "next".to_string()
}

impl PaginatorConfig {
    /// Construct a fresh paginator for one resource-run.
    pub fn build(&self) -> Box<dyn Paginator> {
        match self {
            PaginatorConfig::SinglePage => Box::new(SinglePagePaginator::new()),
            PaginatorConfig::Offset {
                offset,
                limit,
                offset_param,
                limit_param,
                total_path,
            } => Box::new(OffsetPaginator {
                offset: *offset,
                limit: *limit,
                offset_param: offset_param.clone(),
                limit_param: limit_param.clone(),
                total_path: total_path.clone(),
                has_next: true,
            }),
            PaginatorConfig::PageNumber {
                base_page,
                page_param,
                page_size,
                size_param,
                total_path,
            } => Box::new(PageNumberPaginator {
                page: *base_page,
                page_param: page_param.clone(),
                page_size: *page_size,
                size_param: size_param.clone(),
                total_path: total_path.clone(),
                has_next: true,
            }),
            PaginatorConfig::Cursor {
                cursor_path,
                cursor_param,
            } => Box::new(JsonCursorPaginator {
                cursor_path: cursor_path.clone(),
                cursor_param: cursor_param.clone(),
                cursor: None,
                has_next: true,
            }),
            PaginatorConfig::JsonLink { next_url_path } => Box::new(JsonLinkPaginator {
                next_url_path: next_url_path.clone(),
                next_url: None,
                has_next: true,
            }),
            PaginatorConfig::LinkHeader => Box::new(LinkHeaderPaginator {
                next_url: None,
                has_next: true,
            }),
            PaginatorConfig::Custom(factory) => (factory.0)(),
        }
    }
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        PaginatorConfig::SinglePage
    }
}

/// Exactly one request, regardless of response content.
pub struct SinglePagePaginator {
    has_next: bool,
}

impl SinglePagePaginator {
    pub fn new() -> Self {
        Self { has_next: true }
    }
}

impl Default for SinglePagePaginator {
    fn default() -> Self {
        Self::new()
    }
}

impl Paginator for SinglePagePaginator {
    fn update_request(&mut self, _req: &mut RequestParts) {}

    fn update_state(&mut self, _ctx: &PageContext<'_>) {
        self.has_next = false;
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// `offset`/`limit` windowing. Stops when the offset passes the reported
/// total, or on a short page when the API reports no total.
pub struct OffsetPaginator {
    offset: u64,
    limit: u64,
    offset_param: String,
    limit_param: String,
    total_path: Option<String>,
    has_next: bool,
}

impl Paginator for OffsetPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        req.set_query(&self.offset_param, &self.offset.to_string());
        req.set_query(&self.limit_param, &self.limit.to_string());
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.offset += self.limit;

        let total = self
            .total_path
            .as_deref()
            .and_then(|p| extract_value(ctx.body, Some(p)))
            .and_then(|v| v.as_u64());

        self.has_next = match total {
            Some(total) => self.offset < total,
            None => ctx.records.len() as u64 >= self.limit,
        };
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// `page=N` pagination. Stops past the reported page count, or on a short
/// page when no total is available.
pub struct PageNumberPaginator {
    page: u64,
    page_param: String,
    page_size: Option<u64>,
    size_param: String,
    total_path: Option<String>,
    has_next: bool,
}

impl Paginator for PageNumberPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        req.set_query(&self.page_param, &self.page.to_string());
        if let Some(size) = self.page_size {
            req.set_query(&self.size_param, &size.to_string());
        }
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.page += 1;

        let total_pages = self
            .total_path
            .as_deref()
            .and_then(|p| extract_value(ctx.body, Some(p)))
            .and_then(|v| v.as_u64());

        self.has_next = match (total_pages, self.page_size) {
            (Some(total), _) => self.page <= total,
            (None, Some(size)) => ctx.records.len() as u64 >= size,
            // No signal at all: rely on the client's empty-page stop.
            (None, None) => !ctx.records.is_empty(),
        };
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Opaque cursor extracted from the response body. Stops when the cursor
/// field is missing, null or empty.
pub struct JsonCursorPaginator {
    cursor_path: String,
    cursor_param: String,
    cursor: Option<String>,
    has_next: bool,
}

impl Paginator for JsonCursorPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        if let Some(cursor) = &self.cursor {
            req.set_query(&self.cursor_param, cursor);
        }
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.cursor = match extract_value(ctx.body, Some(&self.cursor_path)) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        self.has_next = self.cursor.is_some();
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Full next-page URL embedded in the response body. Stops when the field
/// is missing or null.
pub struct JsonLinkPaginator {
    next_url_path: String,
    next_url: Option<String>,
    has_next: bool,
}

impl Paginator for JsonLinkPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        if let Some(next) = &self.next_url {
            apply_next_url(req, next);
        }
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.next_url = match extract_value(ctx.body, Some(&self.next_url_path)) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        self.has_next = self.next_url.is_some();
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// RFC-5988 `Link` response header, `rel="next"`.
pub struct LinkHeaderPaginator {
    next_url: Option<String>,
    has_next: bool,
}

impl Paginator for LinkHeaderPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        if let Some(next) = &self.next_url {
            apply_next_url(req, next);
        }
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.next_url = parse_link_header(ctx.headers);
        self.has_next = self.next_url.is_some();
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Replace the request target with a server-provided next URL. The next
/// URL carries its own query string, so accumulated query params are
/// dropped; auth runs after this and re-signs the request.
pub(crate) fn apply_next_url(req: &mut RequestParts, next: &str) {
    let resolved = match Url::parse(next) {
        Ok(url) => Some(url),
        // Relative next links resolve against the current request URL.
        Err(url::ParseError::RelativeUrlWithoutBase) => req.url.join(next).ok(),
        Err(_) => None,
    };
    if let Some(url) = resolved {
        req.url = url;
        req.query.clear();
    }
}

/// Extract the `rel="next"` target from a `Link` header, if any.
pub fn parse_link_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(reqwest::header::LINK)?.to_str().ok()?;

    for part in value.split(',') {
        let mut sections = part.split(';');
        let target = sections.next()?.trim();
        let is_next = sections.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if is_next && target.starts_with('<') && target.ends_with('>') {
            return Some(target[1..target.len() - 1].to_string());
        }
    }
    None
}
