//! Declarative REST API extraction engine.
//!
//! A connector is described by a [`resource::RestApiConfig`]: base URL,
//! auth scheme, pagination strategy and a list of endpoint resources. The
//! [`executor`] turns that description into a lazy, incrementally resumable
//! stream of JSON records; vendor modules under [`connectors`] supply the
//! per-API policy (custom paginators, auth, retry).

pub mod auth;
pub mod client;
pub mod connectors;
pub mod convert;
pub mod executor;
pub mod incremental;
pub mod jsonpath;
pub mod paginator;
pub mod resource;

pub use client::{RecordStream, RestClient};
pub use executor::{rest_api_resources, rest_api_resources_with_settings};
pub use incremental::Incremental;
pub use resource::RestApiConfig;

/// One extracted row: a flat JSON object as returned by the vendor API.
pub type Record = serde_json::Map<String, serde_json::Value>;
