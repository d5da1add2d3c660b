use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("extraction error from {source_name}: {details}")]
    Extraction {
        source_name: String,
        details: String,
    },

    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimit { retry_after_secs: u64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimit { .. } | Error::Io(_) => true,
            Error::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::RateLimit {
            retry_after_secs: 300
        }
        .is_retryable());
        assert!(Error::HttpStatus {
            status: 503,
            url: "https://api.example.com".into(),
            body: String::new(),
        }
        .is_retryable());
        assert!(!Error::HttpStatus {
            status: 404,
            url: "https://api.example.com".into(),
            body: String::new(),
        }
        .is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::Config("missing base_url".into()).is_fatal());
        assert!(!Error::Internal("oops".into()).is_fatal());
    }
}
