use reqwest::Method;
use serde::Serialize;

use crate::{PipedreamError, Result, RetryCondition};

/// Default MIME type for request payloads.
pub const JSON_MIME: &str = "application/json";

/// Query parameters with unique keys, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, replacing any existing value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Layers every entry of `other` on top of this query.
    pub fn extend(&mut self, other: Query) {
        for (key, value) in other.0 {
            self.insert(key, value);
        }
    }

    /// Value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Removes every parameter.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K, V> FromIterator<(K, V)> for Query
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::new();
        for (key, value) in iter {
            query.insert(key, value);
        }
        query
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Query
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Value of an extra query parameter. Lists are sent comma-joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    pub(crate) fn into_param(self) -> String {
        match self {
            Self::One(value) => value,
            Self::Many(values) => values.join(","),
        }
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_owned())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::One(value.to_string())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::One(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::One(value.to_string())
    }
}

impl<T: ToString> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for QueryValue {
    fn from(values: [T; N]) -> Self {
        Self::Many(values.iter().map(ToString::to_string).collect())
    }
}

/// A named optional endpoint parameter.
///
/// Yields `None` for falsy values (empty strings, zero, `false`) so they are
/// left out of the query.
pub trait QueryField {
    fn into_field(self) -> Option<String>;
}

impl QueryField for String {
    fn into_field(self) -> Option<String> {
        (!self.is_empty()).then_some(self)
    }
}

impl QueryField for &str {
    fn into_field(self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_owned())
    }
}

impl QueryField for u32 {
    fn into_field(self) -> Option<String> {
        (self != 0).then(|| self.to_string())
    }
}

impl QueryField for u64 {
    fn into_field(self) -> Option<String> {
        (self != 0).then(|| self.to_string())
    }
}

impl QueryField for bool {
    fn into_field(self) -> Option<String> {
        self.then(|| "true".to_owned())
    }
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Structured data. Sent as JSON, as form fields for multipart uploads,
    /// and form-encoded on GET/DELETE or with a non-JSON MIME type.
    Json(serde_json::Value),
    /// Raw bytes, typically an attachment upload.
    Bytes(Vec<u8>),
}

impl Body {
    /// Serializes any value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| PipedreamError::Config(format!("body is not serializable: {err}")))
    }

    /// Flattens a JSON object into text fields. Other payloads yield none.
    pub(crate) fn form_fields(&self) -> Vec<(String, String)> {
        match self {
            Self::Json(serde_json::Value::Object(map)) => map
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Payload as raw bytes. JSON strings are sent without quotes.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(serde_json::Value::String(text)) => text.clone().into_bytes(),
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Bytes(bytes) => bytes.clone(),
        }
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A file sent as one part of a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FilePart {
    /// Creates a file part without an explicit MIME type.
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime_type: None,
        }
    }

    /// Sets the MIME type of the part.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Selects which part of the final response a call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Select {
    Content,
    Code,
    Location,
    Headers,
}

/// Retry policy applied to a single call only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryOverride {
    pub retry_on: Vec<RetryCondition>,
    pub max_retries: u32,
}

/// Per-call configuration shared by every endpoint method.
#[derive(Clone, Debug, PartialEq)]
pub struct CallOptions {
    /// Query parameters, layered over [`CallOptions::params`].
    pub query: Query,
    /// Extra query parameters.
    pub params: Vec<(String, QueryValue)>,
    /// Files for a multipart upload.
    pub files: Vec<FilePart>,
    /// Follow `next_page` cursors and merge every page.
    pub get_all_pages: bool,
    /// Return [`crate::CompleteResponse`] for the first page.
    pub complete_response: bool,
    pub retry: Option<RetryOverride>,
    /// Pre-encoded query string starting with `?`. Replaces every other
    /// query parameter.
    pub raw_query: Option<String>,
    pub select: Option<Select>,
    pub mime_type: String,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            query: Query::new(),
            params: Vec::new(),
            files: Vec::new(),
            get_all_pages: false,
            complete_response: false,
            retry: None,
            raw_query: None,
            select: None,
            mime_type: JSON_MIME.to_owned(),
        }
    }
}

impl CallOptions {
    /// Options with every default: single page, JSON payload, auto selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the query map.
    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = query.into();
        self
    }

    /// Adds an extra query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Attaches a file, switching the call to a multipart upload.
    pub fn file(mut self, file: FilePart) -> Self {
        self.files.push(file);
        self
    }

    /// Follows `next_page` cursors and merges every page.
    pub fn all_pages(mut self) -> Self {
        self.get_all_pages = true;
        self
    }

    /// Returns the first page with its raw response.
    pub fn complete_response(mut self) -> Self {
        self.complete_response = true;
        self
    }

    /// Overrides the retry policy for this call only.
    pub fn retry<I>(mut self, retry_on: I, max_retries: u32) -> Self
    where
        I: IntoIterator<Item = RetryCondition>,
    {
        self.retry = Some(RetryOverride {
            retry_on: retry_on.into_iter().collect(),
            max_retries,
        });
        self
    }

    /// Sends a pre-encoded query string instead of the structured query.
    pub fn raw_query(mut self, raw_query: impl Into<String>) -> Self {
        self.raw_query = Some(raw_query.into());
        self
    }

    /// Selects which part of the response is returned.
    pub fn select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }

    /// MIME type of the payload. Non-JSON types send the body as an attachment.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Final query: extra parameters first, the query map on top.
    pub(crate) fn merged_query(&self) -> Query {
        let mut merged: Query = self
            .params
            .iter()
            .cloned()
            .map(|(key, value)| (key, value.into_param()))
            .collect();
        merged.extend(self.query.clone());
        merged
    }
}

/// A single request handed to [`crate::PipedreamClient::execute`].
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub method: Method,
    /// Path appended to the base URL, e.g. `/users/me`.
    pub path: String,
    pub body: Option<Body>,
    pub options: CallOptions,
}

impl Call {
    /// Creates a call without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: CallOptions::default(),
        }
    }

    /// A GET call.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST call carrying `body`.
    pub fn post(path: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    /// A PUT call carrying `body`.
    pub fn put(path: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::PUT, path).body(body)
    }

    /// A DELETE call.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets the payload.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Replaces the per-call options.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Layers a named optional parameter over the caller's query when it is
    /// set and truthy.
    pub fn layer<F: QueryField>(mut self, key: &str, value: Option<F>) -> Self {
        if let Some(value) = value.and_then(QueryField::into_field) {
            self.options.query.insert(key, value);
        }
        self
    }
}
