//! TikTok Ads connector policy.
//!
//! The reporting API authenticates with an `Access-Token` header, pages
//! through `data.page_info`, and limits report queries to a 30-day window,
//! so a long backfill is split into sequential date chunks, each run as
//! its own resource. Rate-limited keys are held for 5 minutes, which sets
//! the retry floor.

use crate::auth::AuthConfig;
use crate::client::RequestParts;
use crate::executor::rest_api_resources;
use crate::paginator::{PageContext, Paginator, PaginatorConfig, PaginatorFactory};
use crate::resource::{ClientConfig, ResourceDecl, RestApiConfig};
use backoff::backoff::Backoff;
use chrono::NaiveDate;
use extractor_core::backoff::create_backoff;
use extractor_core::config::RetrySettings;
use extractor_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

const MAX_WINDOW_DAYS: i64 = 30;
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(300);

/// TikTok vendor error codes worth retrying (throttling and transient
/// server-side failures).
const RETRYABLE_CODES: &[&str] = &["40100", "50000", "50002"];

pub struct TikTokPaginator {
    page: u64,
    has_next: bool,
}

impl TikTokPaginator {
    pub fn new() -> Self {
        Self {
            page: 1,
            has_next: true,
        }
    }
}

impl Default for TikTokPaginator {
    fn default() -> Self {
        Self::new()
    }
}

impl Paginator for TikTokPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        req.set_query("page", &self.page.to_string());
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        self.page += 1;
        let total_page = ctx
            .body
            .pointer("/data/page_info/total_page")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        self.has_next = self.page <= total_page;
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Split `[start, end]` into consecutive windows of at most
/// [`MAX_WINDOW_DAYS`] days each.
pub fn date_chunks(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut chunks = Vec::new();
    let mut chunk_start = start;
    while chunk_start <= end {
        let chunk_end = (chunk_start + chrono::Duration::days(MAX_WINDOW_DAYS - 1)).min(end);
        chunks.push((chunk_start, chunk_end));
        chunk_start = chunk_end + chrono::Duration::days(1);
    }
    chunks
}

fn is_retryable_tiktok_error(err: &Error) -> bool {
    if err.is_retryable() {
        return true;
    }
    match err {
        Error::HttpStatus { body, .. } => RETRYABLE_CODES
            .iter()
            .any(|code| body.contains(code)),
        _ => false,
    }
}

/// Config for one report window of one advertiser.
pub fn tiktok_ads_config(
    advertiser_id: &str,
    access_token: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> RestApiConfig {
    let resource: ResourceDecl = serde_json::from_value(json!({
        "name": "campaign_report",
        "table_name": "tiktok_campaign_report",
        "primary_key": ["campaign_id", "stat_time_day"],
        "write_disposition": "merge",
        "endpoint": {
            "path": "open_api/v1.3/report/integrated/get/",
            "data_selector": "data.list",
            "params": {
                "advertiser_id": advertiser_id,
                "report_type": "BASIC",
                "data_level": "AUCTION_CAMPAIGN",
                "dimensions": "[\"campaign_id\",\"stat_time_day\"]",
                "start_date": start_date.format("%Y-%m-%d").to_string(),
                "end_date": end_date.format("%Y-%m-%d").to_string(),
                "page_size": 1000,
            },
        },
        "columns": {"stat_time_day": "date"},
    }))
    .expect("static tiktok resource config is valid");

    RestApiConfig {
        client: ClientConfig {
            base_url: "https://business-api.tiktok.com".to_string(),
            headers: HashMap::new(),
            auth: Some(AuthConfig::ApiKey {
                name: "Access-Token".to_string(),
                api_key: access_token.to_string(),
                location: crate::auth::ApiKeyLocation::Header,
            }),
            paginator: Some(PaginatorConfig::Custom(PaginatorFactory::new(
                TikTokPaginator::new,
            ))),
            request_timeout_secs: Some(30),
        },
        resource_defaults: Default::default(),
        resources: vec![resource],
    }
}

async fn fetch_chunk(
    advertiser_id: &str,
    access_token: &str,
    chunk_start: NaiveDate,
    chunk_end: NaiveDate,
    team_id: u64,
    job_id: &str,
) -> Result<Vec<Value>> {
    let config = tiktok_ads_config(advertiser_id, access_token, chunk_start, chunk_end);
    let mut run = rest_api_resources(&config, team_id, job_id, None)?;
    let mut records = Vec::new();
    while let Some(record) = run.stream.try_next().await? {
        records.push(record);
    }
    Ok(records)
}

fn is_rate_limited(err: &Error) -> bool {
    match err {
        Error::RateLimit { .. } => true,
        Error::HttpStatus { status, body, .. } => *status == 429 || body.contains("40100"),
        _ => false,
    }
}

/// Backfill a date range: one sub-resource per ≤30-day chunk, each chunk
/// retried with exponential backoff per the engine's retry settings. Only
/// errors classified as retryable are retried; rate-limited attempts wait
/// at least the documented 5-minute cooldown. Gives up and re-raises after
/// `retry.max_retries` attempts on a chunk.
#[instrument(skip(access_token))]
pub async fn backfill_campaign_report(
    advertiser_id: &str,
    access_token: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    team_id: u64,
    job_id: &str,
    retry: &RetrySettings,
) -> Result<Vec<Value>> {
    let mut records = Vec::new();

    for (chunk_start, chunk_end) in date_chunks(start_date, end_date) {
        info!(
            advertiser_id,
            start = %chunk_start,
            end = %chunk_end,
            "Fetching report chunk"
        );

        let mut backoff = create_backoff(retry.max_retries, retry.base_delay_ms);
        let mut attempts = 0u32;
        let chunk = loop {
            attempts += 1;
            match fetch_chunk(
                advertiser_id,
                access_token,
                chunk_start,
                chunk_end,
                team_id,
                job_id,
            )
            .await
            {
                Ok(chunk) => break chunk,
                Err(e) if attempts < retry.max_retries && is_retryable_tiktok_error(&e) => {
                    let mut delay = backoff.next_backoff().unwrap_or(RATE_LIMIT_COOLDOWN);
                    if is_rate_limited(&e) {
                        delay = delay.max(RATE_LIMIT_COOLDOWN);
                    }
                    warn!(
                        attempt = attempts,
                        retry_after_ms = delay.as_millis(),
                        error = %e,
                        "Report chunk failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        records.extend(chunk);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn date_chunks_respect_30_day_windows() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let chunks = date_chunks(start, end);

        assert_eq!(
            chunks,
            vec![
                (
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 1, 30).unwrap()
                ),
                (
                    NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
                ),
                (
                    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
                ),
            ]
        );
        // Chunks are contiguous and cover the whole range
        for window in chunks.windows(2) {
            assert_eq!(window[0].1 + chrono::Duration::days(1), window[1].0);
        }
    }

    #[test]
    fn single_day_range_is_one_chunk() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(date_chunks(day, day), vec![(day, day)]);
    }

    #[test]
    fn paginator_reads_page_info() {
        let mut p = TikTokPaginator::new();
        let headers = HeaderMap::new();
        let records = vec![json!({})];

        let body = json!({"data": {"page_info": {"page": 1, "total_page": 2}}});
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(p.has_next_page());

        let body = json!({"data": {"page_info": {"page": 2, "total_page": 2}}});
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(!p.has_next_page());
    }

    #[test]
    fn retryable_classification_includes_vendor_codes() {
        let rate_limited = Error::HttpStatus {
            status: 200,
            url: "https://business-api.tiktok.com".into(),
            body: r#"{"code": 40100, "message": "rate limit"}"#.into(),
        };
        assert!(is_retryable_tiktok_error(&rate_limited));

        let bad_params = Error::HttpStatus {
            status: 400,
            url: "https://business-api.tiktok.com".into(),
            body: r#"{"code": 40002, "message": "invalid params"}"#.into(),
        };
        assert!(!is_retryable_tiktok_error(&bad_params));
    }
}
