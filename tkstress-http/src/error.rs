use std::time::Duration;

use tkstress_core::ScenarioError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),

    #[error("unexpected status {status} from {endpoint}: {detail}")]
    Status {
        status: u16,
        endpoint: &'static str,
        detail: String,
    },

    #[error("malformed response body from {endpoint}: {source}")]
    Json {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("not authenticated")]
    NotAuthenticated,
}

impl From<Error> for ScenarioError {
    fn from(err: Error) -> Self {
        match err {
            Error::Status { status, detail, .. } => ScenarioError::status(status, detail),
            Error::Request(_)
            | Error::Timeout(_)
            | Error::BodyRead(_)
            | Error::InvalidUrl(_)
            | Error::UnsupportedScheme(_) => ScenarioError::transport(err.to_string()),
            Error::RequestBuild(_)
            | Error::HeaderValue(_)
            | Error::Json { .. }
            | Error::NotAuthenticated => ScenarioError::other(err.to_string()),
        }
    }
}
