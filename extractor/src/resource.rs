//! Declarative resource configuration and its normalizer.
//!
//! A connector declares resources tersely: a bare string, a partial map,
//! or a full endpoint description. Normalization merges each declaration
//! against the connector's `resource_defaults`, binds `{token}` path
//! parameters, classifies single-entity endpoints, and validates the
//! resource dependency graph. All configuration errors are raised here,
//! before any network call.

use crate::auth::AuthConfig;
use crate::client::ResponseAction;
use crate::convert::ColumnType;
use crate::incremental::ConvertFn;
use crate::paginator::PaginatorConfig;
use extractor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Top-level declarative connector configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RestApiConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub resource_defaults: ResourceDefaults,
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Connector-wide default paginator, used when an endpoint declares
    /// none of its own.
    #[serde(default)]
    pub paginator: Option<PaginatorConfig>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Defaults merged under every resource declaration. Same shape as a
/// resource, minus the name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceDefaults {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default)]
    pub endpoint: Option<EndpointDecl>,
    #[serde(default)]
    pub columns: Option<HashMap<String, ColumnType>>,
}

/// A resource as written in connector config: bare-string shorthand or a
/// full declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResourceDecl {
    Name(String),
    Full(ResourceConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default)]
    pub endpoint: Option<EndpointDecl>,
    #[serde(default)]
    pub columns: Option<HashMap<String, ColumnType>>,
    #[serde(default)]
    pub include_from_parent: Vec<String>,
}

/// `endpoint` accepts a bare path string as shorthand for `{path: ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EndpointDecl {
    Path(String),
    Full(EndpointConfig),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub paginator: Option<PaginatorConfig>,
    #[serde(default)]
    pub data_selector: Option<String>,
    #[serde(default)]
    pub response_actions: Vec<ResponseAction>,
    #[serde(default)]
    pub incremental: Option<IncrementalConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PrimaryKey::Single(key) => vec![key],
            PrimaryKey::Composite(keys) => keys,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    #[default]
    Replace,
    Merge,
}

/// Endpoint-level incremental declaration: which record field carries the
/// watermark and which request params receive the window bounds.
#[derive(Clone, Deserialize)]
pub struct IncrementalConfig {
    pub cursor_path: String,
    pub start_param: String,
    #[serde(default)]
    pub end_param: Option<String>,
    #[serde(default)]
    pub initial_value: Option<Value>,
    #[serde(default)]
    pub end_value: Option<Value>,
    /// Transform applied to the watermark before injection; set by
    /// connector modules in code, never deserialized.
    #[serde(skip)]
    pub convert: Option<ConvertFn>,
}

impl std::fmt::Debug for IncrementalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalConfig")
            .field("cursor_path", &self.cursor_path)
            .field("start_param", &self.start_param)
            .field("end_param", &self.end_param)
            .field("initial_value", &self.initial_value)
            .field("end_value", &self.end_value)
            .field("convert", &self.convert.map(|_| "fn"))
            .finish()
    }
}

/// A request parameter whose value comes from a field of a parent
/// resource's record (producer/consumer resource dependency). Written in
/// config as `{"type": "resolve", "resource": ..., "field": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedParam {
    pub resource: String,
    /// JSONPath into the parent record.
    pub field: String,
}

/// Typed view over a raw param value. Literal params go into the query
/// string; `resolve` params bind path tokens to parent records;
/// `incremental` params are an inline alternative to the endpoint-level
/// incremental block, where the param name itself is the start param.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Literal(Value),
    Resolve(ResolvedParam),
    Incremental(IncrementalConfig),
}

fn classify_param(name: &str, raw: &Value) -> Result<ParamValue> {
    let Some(obj) = raw.as_object() else {
        return Ok(ParamValue::Literal(raw.clone()));
    };
    match obj.get("type").and_then(Value::as_str) {
        Some("resolve") => {
            let resource = obj
                .get("resource")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Config(format!("resolve param '{}' is missing 'resource'", name))
                })?
                .to_string();
            let field = obj
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Config(format!("resolve param '{}' is missing 'field'", name))
                })?
                .to_string();
            Ok(ParamValue::Resolve(ResolvedParam { resource, field }))
        }
        Some("incremental") => {
            let cursor_path = obj
                .get("cursor_path")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "incremental param '{}' is missing 'cursor_path'",
                        name
                    ))
                })?
                .to_string();
            Ok(ParamValue::Incremental(IncrementalConfig {
                cursor_path,
                start_param: name.to_string(),
                end_param: obj
                    .get("end_param")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                initial_value: obj.get("initial_value").cloned(),
                end_value: obj.get("end_value").cloned(),
                convert: None,
            }))
        }
        Some(other) => Err(Error::Config(format!(
            "unknown param type '{}' for param '{}'",
            other, name
        ))),
        // A plain object without a type tag is a literal (e.g. a JSON
        // filter blob serialized into the query).
        None => Ok(ParamValue::Literal(raw.clone())),
    }
}

/// A fully normalized resource, ready for execution.
#[derive(Debug, Clone)]
pub struct EndpointResource {
    pub name: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    pub write_disposition: WriteDisposition,
    pub endpoint: NormalizedEndpoint,
    pub columns: HashMap<String, ColumnType>,
    pub include_from_parent: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NormalizedEndpoint {
    /// Path with literal params substituted; resolve-param tokens remain
    /// as `{token}` placeholders until a parent record is known.
    pub path: String,
    pub method: HttpMethod,
    /// Literal query params that survived path binding.
    pub params: Vec<(String, String)>,
    pub json: Option<Value>,
    pub paginator: Option<PaginatorConfig>,
    pub data_selector: Option<String>,
    pub response_actions: Vec<ResponseAction>,
    pub incremental: Option<IncrementalConfig>,
    /// Path tokens bound to parent-record fields.
    pub resolved_params: Vec<(String, ResolvedParam)>,
    /// Heuristic: the endpoint returns one object rather than a
    /// collection, so it cannot be paginated.
    pub single_entity: bool,
}

/// Expand shorthand, merge defaults, bind path params and classify the
/// endpoint. Fails on any configuration inconsistency.
pub fn make_endpoint_resource(
    decl: &ResourceDecl,
    defaults: &ResourceDefaults,
) -> Result<EndpointResource> {
    let config = match decl {
        ResourceDecl::Name(name) => ResourceConfig {
            name: name.clone(),
            table_name: None,
            primary_key: None,
            write_disposition: None,
            endpoint: Some(EndpointDecl::Path(name.clone())),
            columns: None,
            include_from_parent: Vec::new(),
        },
        ResourceDecl::Full(config) => config.clone(),
    };

    if config.name.is_empty() {
        return Err(Error::Config("resource name must not be empty".into()));
    }

    let default_endpoint = match &defaults.endpoint {
        Some(EndpointDecl::Full(e)) => e.clone(),
        Some(EndpointDecl::Path(p)) => EndpointConfig {
            path: Some(p.clone()),
            ..EndpointConfig::default()
        },
        None => EndpointConfig::default(),
    };

    let own_endpoint = match config.endpoint {
        Some(EndpointDecl::Full(e)) => e,
        Some(EndpointDecl::Path(p)) => EndpointConfig {
            path: Some(p.clone()),
            ..EndpointConfig::default()
        },
        None => EndpointConfig::default(),
    };

    let endpoint = merge_endpoint(default_endpoint, own_endpoint);

    let path = endpoint
        .path
        .clone()
        .unwrap_or_else(|| config.name.clone());

    // Classify params and locate the (at most one) incremental source.
    let mut literal_params: Vec<(String, Value)> = Vec::new();
    let mut resolve_params: Vec<(String, ResolvedParam)> = Vec::new();
    let mut incremental: Option<IncrementalConfig> = endpoint.incremental.clone();

    for (name, raw) in &endpoint.params {
        match classify_param(name, raw)? {
            ParamValue::Literal(value) => literal_params.push((name.clone(), value)),
            ParamValue::Resolve(resolved) => resolve_params.push((name.clone(), resolved)),
            ParamValue::Incremental(config) => {
                if incremental.is_some() {
                    return Err(Error::Config(format!(
                        "endpoint '{}' declares more than one incremental param",
                        path
                    )));
                }
                incremental = Some(config);
            }
        }
    }

    let (path, query_params, resolved_params) =
        bind_path_params(&path, literal_params, resolve_params)?;

    let single_entity = is_single_entity_path(&path);

    let columns = merge_columns(defaults.columns.as_ref(), config.columns.as_ref());

    let data_selector = endpoint.data_selector.clone().or_else(|| {
        // Single-object responses have no wrapper to select into.
        single_entity.then(|| "$".to_string())
    });

    let paginator = endpoint.paginator.clone().or_else(|| {
        // A single-entity endpoint cannot be paginated.
        single_entity.then_some(PaginatorConfig::SinglePage)
    });

    Ok(EndpointResource {
        table_name: config.table_name.or_else(|| defaults.table_name.clone()).unwrap_or_else(|| config.name.clone()),
        primary_key: config
            .primary_key
            .or_else(|| defaults.primary_key.clone())
            .map(PrimaryKey::into_vec)
            .unwrap_or_default(),
        write_disposition: config
            .write_disposition
            .or(defaults.write_disposition)
            .unwrap_or_default(),
        endpoint: NormalizedEndpoint {
            path,
            method: endpoint.method.unwrap_or_default(),
            params: query_params
                .into_iter()
                .map(|(k, v)| (k, render_param(&v)))
                .collect(),
            json: endpoint.json,
            paginator,
            data_selector,
            response_actions: endpoint.response_actions,
            incremental,
            resolved_params,
            single_entity,
        },
        columns,
        include_from_parent: config.include_from_parent,
        name: config.name,
    })
}

/// Scalar fields shallow-override; `params` and `json` merge key-wise with
/// the specific resource winning on conflict.
fn merge_endpoint(defaults: EndpointConfig, specific: EndpointConfig) -> EndpointConfig {
    let mut params = defaults.params;
    for (k, v) in specific.params {
        params.insert(k, v);
    }

    let json = match (defaults.json, specific.json) {
        (Some(Value::Object(mut base)), Some(Value::Object(own))) => {
            for (k, v) in own {
                base.insert(k, v);
            }
            Some(Value::Object(base))
        }
        (base, None) => base,
        (_, own) => own,
    };

    EndpointConfig {
        path: specific.path.or(defaults.path),
        method: specific.method.or(defaults.method),
        params,
        json,
        paginator: specific.paginator.or(defaults.paginator),
        data_selector: specific.data_selector.or(defaults.data_selector),
        response_actions: if specific.response_actions.is_empty() {
            defaults.response_actions
        } else {
            specific.response_actions
        },
        incremental: specific.incremental.or(defaults.incremental),
    }
}

/// Combine column type hints from defaults and the specific resource; the
/// resource's hints win per column.
fn merge_columns(
    defaults: Option<&HashMap<String, ColumnType>>,
    specific: Option<&HashMap<String, ColumnType>>,
) -> HashMap<String, ColumnType> {
    let mut merged = defaults.cloned().unwrap_or_default();
    if let Some(own) = specific {
        for (k, v) in own {
            merged.insert(k.clone(), *v);
        }
    }
    merged
}

fn render_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn path_tokens(path: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        tokens.push(rest[start + 1..start + end].to_string());
        rest = &rest[start + end + 1..];
    }
    tokens
}

/// Bind every `{token}` in the path: literal params are substituted into
/// the URL (and removed from the query), resolve params keep their
/// placeholder for later substitution from a parent record. Unsatisfied
/// tokens and resolve params not referenced in the path are fatal.
fn bind_path_params(
    path: &str,
    literal_params: Vec<(String, Value)>,
    resolve_params: Vec<(String, ResolvedParam)>,
) -> Result<(String, Vec<(String, Value)>, Vec<(String, ResolvedParam)>)> {
    let tokens = path_tokens(path);
    let mut bound_path = path.to_string();
    let mut remaining = literal_params;
    let mut bound_resolved = Vec::new();

    for token in &tokens {
        if let Some(pos) = remaining.iter().position(|(name, _)| name == token) {
            let (_, value) = remaining.remove(pos);
            bound_path = bound_path.replace(&format!("{{{}}}", token), &render_param(&value));
        } else if let Some((name, resolved)) =
            resolve_params.iter().find(|(name, _)| name == token)
        {
            bound_resolved.push((name.clone(), resolved.clone()));
        } else {
            return Err(Error::Config(format!(
                "path param '{{{}}}' in '{}' has no matching param",
                token, path
            )));
        }
    }

    for (name, _) in &resolve_params {
        if !tokens.iter().any(|t| t == name) {
            return Err(Error::Config(format!(
                "resolve param '{}' is not referenced in path '{}'",
                name, path
            )));
        }
    }

    Ok((bound_path, remaining, bound_resolved))
}

/// Heuristic single-entity detection: a path whose last segment is a
/// numeric ID or an unbound `{token}` returns one object, not a
/// collection.
fn is_single_entity_path(path: &str) -> bool {
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if last.is_empty() {
        return false;
    }
    (last.starts_with('{') && last.ends_with('}'))
        || last.chars().all(|c| c.is_ascii_digit())
}

/// Validate the resolve-param dependency graph and return resource indexes
/// in topological order. Cycles and missing parents are fatal.
pub fn dependency_order(resources: &[EndpointResource]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.as_str(), i))
        .collect();

    if index.len() != resources.len() {
        return Err(Error::Config("duplicate resource names".into()));
    }

    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
    for (i, resource) in resources.iter().enumerate() {
        for (_, resolved) in &resource.endpoint.resolved_params {
            let parent = *index.get(resolved.resource.as_str()).ok_or_else(|| {
                Error::Config(format!(
                    "resource '{}' depends on unknown resource '{}'",
                    resource.name, resolved.resource
                ))
            })?;
            parents[i].push(parent);
        }
    }

    // Kahn's algorithm
    let mut in_degree: Vec<usize> = parents.iter().map(Vec::len).collect();
    let mut ready: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(resources.len());
    let mut visited = HashSet::new();

    while let Some(node) = ready.pop() {
        order.push(node);
        visited.insert(node);
        for (child, child_parents) in parents.iter().enumerate() {
            if visited.contains(&child) {
                continue;
            }
            // A child may resolve several params from the same parent.
            let edges = child_parents.iter().filter(|p| **p == node).count();
            if edges > 0 {
                in_degree[child] -= edges;
                if in_degree[child] == 0 {
                    ready.push(child);
                }
            }
        }
    }

    if order.len() != resources.len() {
        return Err(Error::Config(
            "resource dependency cycle detected".into(),
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse_decl(value: Value) -> ResourceDecl {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn bare_string_shorthand_expands() {
        let decl = parse_decl(json!("contacts"));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.name, "contacts");
        assert_eq!(resource.table_name, "contacts");
        assert_eq!(resource.endpoint.path, "contacts");
        assert_eq!(resource.endpoint.method, HttpMethod::Get);
    }

    #[test]
    fn endpoint_string_is_path() {
        let decl = parse_decl(json!({"name": "tickets", "endpoint": "v2/tickets.json"}));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.endpoint.path, "v2/tickets.json");
    }

    #[test]
    fn missing_path_defaults_to_name() {
        let decl = parse_decl(json!({
            "name": "users",
            "endpoint": {"data_selector": "data"}
        }));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.endpoint.path, "users");
        assert_eq!(resource.endpoint.data_selector.as_deref(), Some("data"));
    }

    #[test]
    fn defaults_merge_params_keywise() {
        let defaults: ResourceDefaults = serde_json::from_value(json!({
            "primary_key": "id",
            "write_disposition": "merge",
            "endpoint": {"params": {"per_page": 100, "sort": "asc"}}
        }))
        .unwrap();
        let decl = parse_decl(json!({
            "name": "issues",
            "endpoint": {"path": "issues", "params": {"sort": "desc"}}
        }));
        let resource = make_endpoint_resource(&decl, &defaults).unwrap();
        assert_eq!(resource.primary_key, vec!["id".to_string()]);
        assert_eq!(resource.write_disposition, WriteDisposition::Merge);

        let mut params = resource.endpoint.params.clone();
        params.sort();
        assert_eq!(
            params,
            vec![
                ("per_page".to_string(), "100".to_string()),
                ("sort".to_string(), "desc".to_string()),
            ]
        );
    }

    #[test]
    fn literal_path_param_is_bound_and_popped() {
        let decl = parse_decl(json!({
            "name": "repo_issues",
            "endpoint": {
                "path": "repos/{owner}/{repo}/issues",
                "params": {"owner": "posthog", "repo": "posthog", "state": "all"}
            }
        }));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.endpoint.path, "repos/posthog/posthog/issues");
        assert_eq!(
            resource.endpoint.params,
            vec![("state".to_string(), "all".to_string())]
        );
    }

    #[test]
    fn unresolved_path_token_is_fatal() {
        let decl = parse_decl(json!({
            "name": "tasks",
            "endpoint": {"path": "boards/{board_id}/tasks"}
        }));
        let err = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("board_id"));
    }

    #[test]
    fn resolve_param_keeps_placeholder() {
        let decl = parse_decl(json!({
            "name": "tasks",
            "endpoint": {
                "path": "boards/{board_id}/tasks",
                "params": {
                    "board_id": {"type": "resolve", "resource": "boards", "field": "id"}
                }
            }
        }));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.endpoint.path, "boards/{board_id}/tasks");
        assert_eq!(resource.endpoint.resolved_params.len(), 1);
        assert_eq!(resource.endpoint.resolved_params[0].1.resource, "boards");
    }

    #[test]
    fn unreferenced_resolve_param_is_fatal() {
        let decl = parse_decl(json!({
            "name": "tasks",
            "endpoint": {
                "path": "tasks",
                "params": {
                    "board_id": {"type": "resolve", "resource": "boards", "field": "id"}
                }
            }
        }));
        let err = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("not referenced"));
    }

    #[test]
    fn double_incremental_is_fatal() {
        let decl = parse_decl(json!({
            "name": "events",
            "endpoint": {
                "path": "events",
                "incremental": {"cursor_path": "ts", "start_param": "since"},
                "params": {
                    "after": {"type": "incremental", "cursor_path": "ts"}
                }
            }
        }));
        let err = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("incremental"));
    }

    #[test]
    fn incremental_param_uses_param_name_as_start_param() {
        let decl = parse_decl(json!({
            "name": "events",
            "endpoint": {
                "path": "events",
                "params": {
                    "since": {"type": "incremental", "cursor_path": "ts", "initial_value": 0}
                }
            }
        }));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        let incremental = resource.endpoint.incremental.unwrap();
        assert_eq!(incremental.start_param, "since");
        assert_eq!(incremental.cursor_path, "ts");
        assert_eq!(incremental.initial_value, Some(json!(0)));
    }

    #[test]
    fn single_entity_detection() {
        for (path, expected) in [
            ("users/123", true),
            ("users/{id}", true),
            ("users", false),
            ("boards/{board_id}/tasks", false),
        ] {
            assert_eq!(is_single_entity_path(path), expected, "path {}", path);
        }

        let decl = parse_decl(json!({
            "name": "me",
            "endpoint": {
                "path": "users/{id}",
                "params": {"id": 42}
            }
        }));
        let resource = make_endpoint_resource(&decl, &ResourceDefaults::default()).unwrap();
        assert_eq!(resource.endpoint.path, "users/42");
        assert!(resource.endpoint.single_entity);
        assert_eq!(resource.endpoint.data_selector.as_deref(), Some("$"));
        assert!(matches!(
            resource.endpoint.paginator,
            Some(PaginatorConfig::SinglePage)
        ));
    }

    #[test]
    fn dependency_order_roots_first() {
        let defaults = ResourceDefaults::default();
        let boards =
            make_endpoint_resource(&parse_decl(json!("boards")), &defaults).unwrap();
        let tasks = make_endpoint_resource(
            &parse_decl(json!({
                "name": "tasks",
                "endpoint": {
                    "path": "boards/{board_id}/tasks",
                    "params": {
                        "board_id": {"type": "resolve", "resource": "boards", "field": "id"}
                    }
                }
            })),
            &defaults,
        )
        .unwrap();

        let order = dependency_order(&[tasks, boards]).unwrap();
        // boards (index 1) must come before tasks (index 0)
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn missing_parent_is_fatal() {
        let defaults = ResourceDefaults::default();
        let tasks = make_endpoint_resource(
            &parse_decl(json!({
                "name": "tasks",
                "endpoint": {
                    "path": "boards/{board_id}/tasks",
                    "params": {
                        "board_id": {"type": "resolve", "resource": "boards", "field": "id"}
                    }
                }
            })),
            &defaults,
        )
        .unwrap();
        assert!(dependency_order(&[tasks]).is_err());
    }

    #[test]
    fn cycle_is_fatal() {
        let defaults = ResourceDefaults::default();
        let a = make_endpoint_resource(
            &parse_decl(json!({
                "name": "a",
                "endpoint": {
                    "path": "a/{b_id}",
                    "params": {"b_id": {"type": "resolve", "resource": "b", "field": "id"}}
                }
            })),
            &defaults,
        )
        .unwrap();
        let b = make_endpoint_resource(
            &parse_decl(json!({
                "name": "b",
                "endpoint": {
                    "path": "b/{a_id}",
                    "params": {"a_id": {"type": "resolve", "resource": "a", "field": "id"}}
                }
            })),
            &defaults,
        )
        .unwrap();
        let err = dependency_order(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
