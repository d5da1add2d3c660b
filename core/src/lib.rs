pub mod backoff;
pub mod config;
pub mod error;
pub mod telemetry;

pub use config::Settings;
pub use error::{Error, Result};
