//! Vendor policy modules.
//!
//! Each connector supplies a declarative [`crate::resource::RestApiConfig`]
//! plus whatever vendor-specific paginator or authenticator its API needs,
//! and consumes the shared executor. No extraction logic lives here, only
//! policy: URL templates, auth schemes, pagination quirks, retry rules.

pub mod github;
pub mod salesforce;
pub mod tiktok_ads;
pub mod zendesk;
