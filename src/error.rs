use std::fmt;

use reqwest::header::HeaderMap;

use crate::RetryCondition;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum PipedreamError {
    /// Invalid client or call configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// HTTP 401 returned by the API.
    #[error("authentication error {0}")]
    Authentication(ApiFailure),
    /// HTTP 429 returned by the API.
    #[error("rate limit error {0}")]
    RateLimit(ApiFailure),
    /// Any other non-success status except 422.
    #[error("api error {0}")]
    Api(ApiFailure),
    /// Body served as JSON that could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),
}

impl PipedreamError {
    /// Classifies a captured response.
    ///
    /// 2xx statuses pass through, as does 422, which the API uses for
    /// validation results the caller inspects itself.
    pub(crate) fn classify(response: RawResponse) -> Result<RawResponse, Self> {
        let status = response.status;
        if (200..300).contains(&status) || status == 422 {
            return Ok(response);
        }

        let failure = ApiFailure {
            message: response.text(),
            status,
            response,
        };
        Err(match status {
            401 => Self::Authentication(failure),
            429 => Self::RateLimit(failure),
            _ => Self::Api(failure),
        })
    }

    /// HTTP status of an API failure.
    pub fn status(&self) -> Option<u16> {
        self.failure().map(|failure| failure.status)
    }

    /// Response captured for an API failure.
    pub fn response(&self) -> Option<&RawResponse> {
        self.failure().map(|failure| &failure.response)
    }

    /// The retry condition naming this error's kind, if it has one.
    pub fn retry_condition(&self) -> Option<RetryCondition> {
        match self {
            Self::Transport(_) => Some(RetryCondition::Transport),
            Self::Authentication(_) => Some(RetryCondition::Authentication),
            Self::RateLimit(_) => Some(RetryCondition::RateLimit),
            Self::Api(_) => Some(RetryCondition::Api),
            Self::Config(_) | Self::Decode(_) => None,
        }
    }

    fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Authentication(failure) | Self::RateLimit(failure) | Self::Api(failure) => {
                Some(failure)
            }
            _ => None,
        }
    }
}

/// Details of a non-success API response.
#[derive(Clone, Debug)]
pub struct ApiFailure {
    /// Raw response body as text.
    pub message: String,
    /// Numeric HTTP status code.
    pub status: u16,
    /// The full response, for introspection.
    pub response: RawResponse,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.status, self.message, self.response)
    }
}

/// Response captured from the wire with its body fully read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns a header value if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<response [{}] {} ({} bytes)>",
            self.status,
            self.url,
            self.body.len()
        )
    }
}
