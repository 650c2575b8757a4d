use std::fmt;

use reqwest::header::HeaderMap;

use crate::RetryCondition;

/// Only version 1 of the REST API is supported.
pub const API_VERSION: u32 = 1;

/// Construction-time configuration for [`crate::PipedreamClient`].
#[derive(Clone, Eq, PartialEq)]
pub struct ClientOptions {
    /// Bearer token sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Default headers. These override the built-in ones.
    pub headers: HeaderMap,
    /// Options handed to the HTTP transport.
    pub transport: TransportOptions,
    /// Failures that trigger an automatic retry.
    pub retry_on: Vec<RetryCondition>,
    /// Maximum number of retries after the initial attempt, per page.
    pub max_retries: u32,
    pub api_version: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            token: None,
            headers: HeaderMap::new(),
            transport: TransportOptions::default(),
            retry_on: Vec::new(),
            max_retries: 0,
            api_version: API_VERSION,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("transport", &self.transport)
            .field("retry_on", &self.retry_on)
            .field("max_retries", &self.max_retries)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Transport behavior forwarded to `reqwest`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-request timeout in milliseconds. `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    /// Follow HTTP redirects. Native targets only.
    pub follow_redirects: bool,
    /// Skip TLS certificate verification. Native targets only.
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            follow_redirects: true,
            accept_invalid_certs: false,
        }
    }
}
