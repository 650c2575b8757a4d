use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::{PipedreamError, RawResponse, Result};

/// Parsed response content.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Json(serde_json::Value),
    /// Body that was empty, not JSON, or unparseable text.
    Raw(Vec<u8>),
}

impl Content {
    /// `false` for null, `false`, zero, empty strings/arrays/objects and
    /// empty raw bodies.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Json(value) => match value {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(flag) => *flag,
                serde_json::Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
                serde_json::Value::String(text) => !text.is_empty(),
                serde_json::Value::Array(items) => !items.is_empty(),
                serde_json::Value::Object(map) => !map.is_empty(),
            },
            Self::Raw(bytes) => !bytes.is_empty(),
        }
    }

    /// The JSON value, if the content parsed as JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// First-page bundle returned when `complete_response` is requested.
#[derive(Clone, Debug, PartialEq)]
pub struct CompleteResponse {
    pub response: RawResponse,
    pub content: Content,
    pub status: u16,
}

/// Value returned by [`crate::PipedreamClient::execute`].
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// The `location` header, e.g. the URL of a created resource.
    Location(Option<String>),
    Content(Content),
    /// Bare status code, returned when nothing more useful is available.
    Status(u16),
    Headers(HeaderMap),
    Complete(CompleteResponse),
}

impl Output {
    /// JSON content, if that is what the call returned.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Content(content) => content.as_json(),
            Self::Complete(complete) => complete.content.as_json(),
            _ => None,
        }
    }

    /// Consumes the output and returns its JSON content.
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Content(Content::Json(value)) => Some(value),
            Self::Complete(CompleteResponse {
                content: Content::Json(value),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    /// Deserializes JSON content into a typed value.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        let value = self
            .into_json()
            .ok_or_else(|| PipedreamError::Decode("response carried no JSON content".to_owned()))?;
        serde_json::from_value(value)
            .map_err(|err| PipedreamError::Decode(format!("unexpected response shape: {err}")))
    }

    /// The status code carried by the output.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Complete(complete) => Some(complete.status),
            _ => None,
        }
    }

    /// The `location` header, if that is what the call returned.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Location(location) => location.as_deref(),
            _ => None,
        }
    }
}
