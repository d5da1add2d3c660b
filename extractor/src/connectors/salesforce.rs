//! Salesforce connector policy.
//!
//! Auth is OAuth refresh-token flow: the access token is obtained
//! out-of-band before signing, cached for the life of the run, and never
//! refreshed in reaction to a 401 (a stale token surfaces as a generic
//! HTTP error, like every other vendor). Queries are SOQL via the query
//! string; pagination is Id-ordered keyset paging, which keeps a stable
//! order even while records are being modified mid-export.

use crate::auth::{AuthConfig, Authenticator, CustomAuth};
use crate::client::RequestParts;
use crate::paginator::{PageContext, Paginator, PaginatorConfig, PaginatorFactory};
use crate::resource::{ClientConfig, ResourceDecl, RestApiConfig};
use async_trait::async_trait;
use extractor_core::backoff::retry_with_backoff;
use extractor_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::OnceCell;

const TOKEN_MAX_RETRIES: u32 = 3;
const TOKEN_RETRY_DELAY_MS: u64 = 500;

pub struct SalesforceAuth {
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    access_token: OnceCell<String>,
}

impl SalesforceAuth {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            access_token: OnceCell::new(),
        }
    }

    async fn fetch_access_token(&self) -> Result<String> {
        let response = reqwest::Client::new()
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Extraction {
                source_name: "salesforce".to_string(),
                details: format!("token refresh returned no access_token (status {})", status),
            })
    }
}

#[async_trait]
impl Authenticator for SalesforceAuth {
    async fn apply(&self, req: &mut RequestParts) -> Result<()> {
        let token = self
            .access_token
            .get_or_try_init(|| {
                retry_with_backoff(
                    || self.fetch_access_token(),
                    TOKEN_MAX_RETRIES,
                    TOKEN_RETRY_DELAY_MS,
                    "salesforce_token_refresh",
                )
            })
            .await?;
        req.set_header("Authorization", &format!("Bearer {}", token))?;
        Ok(())
    }
}

/// Keyset pagination over a SOQL query: each page re-issues the query with
/// `WHERE Id > <last seen Id>`, ordered by Id. A page shorter than the
/// limit is the last one.
pub struct SalesforceIdPaginator {
    base_soql: String,
    limit: u64,
    last_id: Option<String>,
    has_next: bool,
}

impl SalesforceIdPaginator {
    pub fn new(base_soql: impl Into<String>, limit: u64) -> Self {
        Self {
            base_soql: base_soql.into(),
            limit,
            last_id: None,
            has_next: true,
        }
    }

    fn soql(&self) -> String {
        match self.last_id.as_deref() {
            Some(id) => format!(
                "{} WHERE Id > '{}' ORDER BY Id LIMIT {}",
                self.base_soql, id, self.limit
            ),
            None => format!("{} ORDER BY Id LIMIT {}", self.base_soql, self.limit),
        }
    }
}

impl Paginator for SalesforceIdPaginator {
    fn update_request(&mut self, req: &mut RequestParts) {
        req.set_query("q", &self.soql());
    }

    fn update_state(&mut self, ctx: &PageContext<'_>) {
        if let Some(id) = ctx
            .records
            .last()
            .and_then(|record| record.get("Id"))
            .and_then(Value::as_str)
        {
            self.last_id = Some(id.to_string());
        }
        self.has_next = ctx.records.len() as u64 >= self.limit;
    }

    fn has_next_page(&self) -> bool {
        self.has_next
    }
}

/// Export one sObject (e.g. `Account`) through the query endpoint.
pub fn salesforce_config(
    instance_url: &str,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
    sobject: &str,
    fields: &[&str],
    page_size: u64,
) -> RestApiConfig {
    let soql = format!("SELECT {} FROM {}", fields.join(", "), sobject);

    let resource: ResourceDecl = serde_json::from_value(json!({
        "name": sobject.to_lowercase(),
        "table_name": format!("salesforce_{}", sobject.to_lowercase()),
        "primary_key": "Id",
        "write_disposition": "merge",
        "endpoint": {
            "path": "services/data/v61.0/query",
            "data_selector": "records",
        },
        "columns": {"SystemModstamp": "timestamp", "CreatedDate": "timestamp"},
    }))
    .expect("static salesforce resource config is valid");

    RestApiConfig {
        client: ClientConfig {
            base_url: instance_url.to_string(),
            headers: HashMap::new(),
            auth: Some(AuthConfig::Custom(CustomAuth(std::sync::Arc::new(
                SalesforceAuth::new(token_url, client_id, client_secret, refresh_token),
            )))),
            paginator: Some(PaginatorConfig::Custom({
                let soql = soql.clone();
                PaginatorFactory::new(move || SalesforceIdPaginator::new(soql.clone(), page_size))
            })),
            request_timeout_secs: Some(60),
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
    fn first_page_has_no_keyset_predicate() {
        let mut p = SalesforceIdPaginator::new("SELECT Id, Name FROM Account", 200);
        let mut req = RequestParts::new(
            Method::GET,
            Url::parse("https://example.my.salesforce.com/services/data/v61.0/query").unwrap(),
        );
        p.update_request(&mut req);
        assert_eq!(
            req.query[0].1,
            "SELECT Id, Name FROM Account ORDER BY Id LIMIT 200"
        );
    }

    #[test]
    fn keyset_advances_from_last_record_id() {
        let mut p = SalesforceIdPaginator::new("SELECT Id FROM Account", 2);
        let headers = HeaderMap::new();
        let body = json!({});
        let records = vec![json!({"Id": "001A"}), json!({"Id": "001B"})];
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(p.has_next_page());

        let mut req = RequestParts::new(
            Method::GET,
            Url::parse("https://example.my.salesforce.com/services/data/v61.0/query").unwrap(),
        );
        p.update_request(&mut req);
        assert_eq!(
            req.query[0].1,
            "SELECT Id FROM Account WHERE Id > '001B' ORDER BY Id LIMIT 2"
        );
    }

    #[test]
    fn short_page_terminates() {
        let mut p = SalesforceIdPaginator::new("SELECT Id FROM Account", 2);
        let headers = HeaderMap::new();
        let body = json!({});
        let records = vec![json!({"Id": "001C"})];
        p.update_state(&PageContext {
            status: 200,
            headers: &headers,
            body: &body,
            records: &records,
        });
        assert!(!p.has_next_page());
    }
}
