//! Zendesk connector policy.
//!
//! Incremental export endpoints page on a `start_time` epoch cursor: each
//! response carries the `end_time` to use as the next `start_time` and an
//! `end_of_stream` flag. A full page with `end_of_stream: true` is the
//! normal last page, which is exactly why termination cannot rely on a
//! short or empty page.

use crate::auth::AuthConfig;
use crate::client::RequestParts;
use crate::paginator::{PageContext, Paginator, PaginatorConfig, PaginatorFactory};
use crate::resource::{ClientConfig, ResourceDecl, RestApiConfig};
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct ZendeskPaginator {
    start_time_param: String,
    next_start_time: Option<i64>,
    has_next: bool,
}

impl ZendeskPaginator {
    pub fn new(start_time_param: impl Into<String>) -> Self {
        Self {
            start_time_param: start_time_param.into(),
            next_start_time: None,
            has_next: true,
        }
    }
}

impl Paginator for ZendeskPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        if let Some(start_time) = self.next_start_time {
            req.set_query(&self.start_time_param, &start_time.to_string());
        }
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        let end_of_stream = ctx
            .body
            .get("end_of_stream")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        self.next_start_time = ctx.body.get("end_time").and_then(Value::as_i64);
        self.has_next = !end_of_stream && self.next_start_time.is_some();
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Incremental ticket export for one Zendesk subdomain, authenticated with
/// an API token (Zendesk's token flavor of HTTP basic).
///
/// The watermark tracks `generated_timestamp`, the epoch-seconds field in
/// the same unit as the `start_time` request param. `updated_at` is an
/// ISO-8601 string and cannot seed the next run's `start_time`.
pub fn zendesk_config(subdomain: &str, email: &str, api_token: &str) -> RestApiConfig {
    let resource: ResourceDecl = serde_json::from_value(json!({
        "name": "tickets",
        "primary_key": "id",
        "write_disposition": "merge",
        "endpoint": {
            "path": "api/v2/incremental/tickets.json",
            "data_selector": "tickets",
            "incremental": {
                "cursor_path": "generated_timestamp",
                "start_param": "start_time",
                "initial_value": 0,
            },
        },
        "columns": {"updated_at": "timestamp", "created_at": "timestamp"},
    }))
    .expect("static zendesk resource config is valid");

    RestApiConfig {
        client: ClientConfig {
            base_url: format!("https://{}.zendesk.com", subdomain),
            headers: HashMap::new(),
            auth: Some(AuthConfig::HttpBasic {
                username: format!("{}/token", email),
                password: api_token.to_string(),
            }),
            paginator: Some(PaginatorConfig::Custom(PaginatorFactory::new(|| {
                ZendeskPaginator::new("start_time")
            }))),
            request_timeout_secs: Some(30),
        },
        resource_defaults: Default::default(),
        resources: vec![resource],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use reqwest::Method;
    use url::Url;

    #[test]
    fn pages_on_end_time_until_end_of_stream() {
        let mut p = ZendeskPaginator::new("start_time");
        let headers = HeaderMap::new();
        let records = vec![json!({"id": 1})];

        let body = json!({"end_time": 1000, "end_of_stream": false});
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(p.has_next_page());

        let mut req = RequestParts::new(
            Method::GET,
            Url::parse("https://acme.zendesk.com/api/v2/incremental/tickets.json").unwrap(),
        );
        req.set_query("start_time", "0");
        p.update_request(&mut req);
        assert_eq!(
            req.query,
            vec![("start_time".to_string(), "1000".to_string())]
        );

        // Final page: full of records but explicitly end-of-stream
        let body = json!({"end_time": 2000, "end_of_stream": true});
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(!p.has_next_page());
    }

    #[test]
    fn config_builds_and_normalizes() {
        let config = zendesk_config("acme", "ops@acme.com", "tok");
        let run = crate::executor::rest_api_resources(&config, 1, "job", Some(json!(500))).unwrap();
        assert_eq!(run.name, "tickets");
        // Resume value seeds the watermark
        assert_eq!(run.incremental.unwrap().last_value(), Some(json!(500)));
    }

    #[test]
    fn watermark_advances_past_the_resume_seed() {
        let config = zendesk_config("acme", "ops@acme.com", "tok");
        let run = crate::executor::rest_api_resources(&config, 1, "job", Some(json!(500))).unwrap();
        let tracker = run.incremental.unwrap();

        // The cursor field must be epoch seconds so it compares against the
        // seeded start_time value; a record's updated_at string would not.
        tracker.update(&json!({
            "id": 1,
            "updated_at": "2024-06-01T00:00:00Z",
            "generated_timestamp": 900,
        }));
        tracker.update(&json!({
            "id": 2,
            "updated_at": "2024-06-02T00:00:00Z",
            "generated_timestamp": 750,
        }));

        assert_eq!(tracker.last_value(), Some(json!(900)));
    }
}
