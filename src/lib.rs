//! `pipedreamer` is an async HTTP client for the Pipedream REST API.
//!
//! Every endpoint method funnels through [`PipedreamClient::execute`], which
//! handles:
//! - bearer authentication and default headers
//! - JSON, multipart and raw attachment payloads
//! - error classification ([`PipedreamError`])
//! - configurable retries with `Retry-After` backoff ([`RetryPolicy`])
//! - `next_page` cursor pagination with page merging
//! - response normalization ([`Output`])

mod api;
mod batch;
mod call;
mod client;
mod decode;
mod error;
mod options;
mod policy;
mod types;

pub use api::{AutoSubscriptionQuery, EventSummariesQuery, SubscriptionQuery, WebhookQuery};
pub use batch::{batch, DEFAULT_BATCH_SIZE};
pub use call::{
    Body, Call, CallOptions, FilePart, Query, QueryField, QueryValue, RetryOverride, Select,
    JSON_MIME,
};
pub use client::{PipedreamClient, DEFAULT_BASE_URL};
pub use error::{ApiFailure, PipedreamError, RawResponse};
pub use options::{ClientOptions, TransportOptions, API_VERSION};
pub use policy::{RetryCondition, RetryPolicy};
pub use types::{CompleteResponse, Content, Output};

/// Re-exported so callers can build calls without depending on `reqwest`.
pub use reqwest::{header, Method};

pub type Result<T> = std::result::Result<T, PipedreamError>;
