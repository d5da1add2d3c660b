//! Resource executor: the composition root.
//!
//! Wires a normalized resource, a fresh authenticator and paginator, and
//! the run's incremental cursor into a [`RestClient`] pagination loop,
//! returning a lazy record stream plus the [`Incremental`] handle the
//! scheduler reads back after the run to persist the new watermark.

use crate::client::{PaginateRequest, RecordStream, RestClient};
use crate::convert::{convert_types, ColumnType};
use crate::incremental::Incremental;
use crate::paginator::PaginatorConfig;
use crate::resource::{
    dependency_order, make_endpoint_resource, EndpointResource, RestApiConfig, WriteDisposition,
};
use extractor_core::config::HttpSettings;
use extractor_core::{Error, Result};
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// One running resource extraction: the record stream, and the incremental
/// handle whose `last_value` is the watermark to persist on success.
pub struct ResourceRun {
    pub stream: ResourceStream,
    pub incremental: Option<Arc<Incremental>>,
    pub name: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    pub write_disposition: WriteDisposition,
}

impl std::fmt::Debug for ResourceRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRun")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("write_disposition", &self.write_disposition)
            .finish_non_exhaustive()
    }
}

/// Record stream with the resource's declared-column type conversion
/// applied to each record before it is yielded.
pub struct ResourceStream {
    inner: RecordStream,
    columns: HashMap<String, ColumnType>,
}

impl ResourceStream {
    pub async fn try_next(&mut self) -> Result<Option<Value>> {
        match self.inner.try_next().await? {
            Some(mut record) => {
                if !self.columns.is_empty() {
                    convert_types(&mut record, &self.columns);
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            match stream.try_next().await? {
                Some(record) => Ok(Some((record, stream))),
                None => Ok(None),
            }
        })
    }
}

/// Build the record stream for a declarative connector configuration.
///
/// `db_incremental_field_last_value` is the watermark persisted by the
/// scheduler after the previous successful run; it takes precedence over
/// the configured `initial_value`. Only the first declared resource is
/// executed; the rest of the config is still fully validated, dependency
/// graph included.
pub fn rest_api_resources(
    config: &RestApiConfig,
    team_id: u64,
    job_id: &str,
    db_incremental_field_last_value: Option<Value>,
) -> Result<ResourceRun> {
    rest_api_resources_with_settings(
        config,
        &HttpSettings::default(),
        team_id,
        job_id,
        db_incremental_field_last_value,
    )
}

/// Same as [`rest_api_resources`] but with explicit engine HTTP settings
/// (timeouts, user agent), as loaded by the CLI. A connector-level
/// `request_timeout_secs` still overrides the engine default.
pub fn rest_api_resources_with_settings(
    config: &RestApiConfig,
    http_settings: &HttpSettings,
    team_id: u64,
    job_id: &str,
    db_incremental_field_last_value: Option<Value>,
) -> Result<ResourceRun> {
    let resources: Vec<EndpointResource> = config
        .resources
        .iter()
        .map(|decl| make_endpoint_resource(decl, &config.resource_defaults))
        .collect::<Result<_>>()?;

    // Pre-flight graph validation: cycles and missing parents fail here,
    // before any request.
    dependency_order(&resources)?;

    let Some(resource) = resources.into_iter().next() else {
        return Err(Error::Config("no resources declared".into()));
    };
    if !resource.endpoint.resolved_params.is_empty() {
        return Err(Error::Config(format!(
            "resource '{}' resolves params from a parent and cannot run first",
            resource.name
        )));
    }

    info!(
        team_id,
        job_id,
        resource = %resource.name,
        path = %resource.endpoint.path,
        "Starting resource extraction"
    );

    let endpoint = &resource.endpoint;
    let mut params = endpoint.params.clone();

    // Seed the incremental cursor and inject the window bounds.
    let incremental = endpoint.incremental.as_ref().map(|inc| {
        Arc::new(Incremental::new(
            inc.cursor_path.clone(),
            inc.initial_value.clone(),
            inc.end_value.clone(),
        ))
    });

    if let (Some(inc_config), Some(tracker)) = (&endpoint.incremental, &incremental) {
        tracker.seed(db_incremental_field_last_value);

        let convert = inc_config.convert.unwrap_or(|v: &Value| v.clone());
        if let Some(start) = tracker.last_value() {
            set_param(&mut params, &inc_config.start_param, &convert(&start));
        }
        if let (Some(end_param), Some(end_value)) = (&inc_config.end_param, &inc_config.end_value)
        {
            set_param(&mut params, end_param, &convert(end_value));
        }
    }

    let headers = build_headers(&config.client.headers)?;
    let auth = config.client.auth.as_ref().map(|a| a.build());

    // A fresh paginator per run; a shared instance would leak pagination
    // state across runs.
    let paginator_config = endpoint
        .paginator
        .clone()
        .or_else(|| config.client.paginator.clone())
        .unwrap_or(PaginatorConfig::SinglePage);

    let mut http_settings = http_settings.clone();
    if let Some(secs) = config.client.request_timeout_secs {
        http_settings.request_timeout_secs = secs;
    }

    let client = RestClient::new(
        &config.client.base_url,
        headers,
        auth,
        &http_settings,
        resource.name.clone(),
    )?;

    let stream = client.paginate(PaginateRequest {
        path: endpoint.path.clone(),
        method: endpoint.method.as_method(),
        params,
        json: endpoint.json.clone(),
        paginator: paginator_config.build(),
        data_selector: endpoint.data_selector.clone(),
        response_actions: endpoint.response_actions.clone(),
        incremental: incremental.clone(),
    })?;

    Ok(ResourceRun {
        stream: ResourceStream {
            inner: stream,
            columns: resource.columns,
        },
        incremental,
        name: resource.name,
        table_name: resource.table_name,
        primary_key: resource.primary_key,
        write_disposition: resource.write_disposition,
    })
}

fn set_param(params: &mut Vec<(String, String)>, name: &str, value: &Value) {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    params.retain(|(k, _)| k != name);
    params.push((name.to_string(), rendered));
}

fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid header value for '{:?}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}
