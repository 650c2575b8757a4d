use std::{collections::HashSet, fmt, str::FromStr};

use crate::{PipedreamError, Result};

/// A failure that may be configured to trigger an automatic retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryCondition {
    /// Connection-level failure before any HTTP response.
    Transport,
    /// HTTP 401 failures.
    Authentication,
    /// HTTP 429 failures.
    RateLimit,
    /// Any other classified API failure.
    Api,
    /// A specific HTTP status outside 200–299.
    Status(u16),
}

impl RetryCondition {
    fn validate(self) -> Result<Self> {
        match self {
            Self::Status(code) if (200..300).contains(&code) => Err(PipedreamError::Config(
                format!(
                    "retry_on must contain only non-2xx HTTP codes or failure kinds, got {code}"
                ),
            )),
            other => Ok(other),
        }
    }
}

impl From<u16> for RetryCondition {
    fn from(code: u16) -> Self {
        Self::Status(code)
    }
}

impl FromStr for RetryCondition {
    type Err = PipedreamError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        let condition = match value.to_ascii_lowercase().as_str() {
            "transport" => Self::Transport,
            "authentication" => Self::Authentication,
            "rate_limit" => Self::RateLimit,
            "api" => Self::Api,
            other => other.parse::<u16>().map(Self::Status).map_err(|_| {
                PipedreamError::Config(format!("unknown retry condition '{value}'"))
            })?,
        };
        condition.validate()
    }
}

impl fmt::Display for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Authentication => f.write_str("authentication"),
            Self::RateLimit => f.write_str("rate_limit"),
            Self::Api => f.write_str("api"),
            Self::Status(code) => write!(f, "{code}"),
        }
    }
}

/// Retryable conditions plus the retry budget per request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_on: HashSet<RetryCondition>,
    max_retries: u32,
}

impl RetryPolicy {
    /// Builds a validated policy.
    pub fn new<I>(retry_on: I, max_retries: u32) -> Result<Self>
    where
        I: IntoIterator<Item = RetryCondition>,
    {
        let mut policy = Self::default();
        policy.set_retry_on(retry_on)?;
        policy.max_retries = max_retries;
        Ok(policy)
    }

    /// Conditions that trigger a retry.
    pub fn retry_on(&self) -> &HashSet<RetryCondition> {
        &self.retry_on
    }

    /// Retries allowed per page after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Replaces the retry set. Rejected wholesale if any entry is invalid.
    pub fn set_retry_on<I>(&mut self, value: I) -> Result<()>
    where
        I: IntoIterator<Item = RetryCondition>,
    {
        let retry_on = value
            .into_iter()
            .map(RetryCondition::validate)
            .collect::<Result<HashSet<_>>>()?;
        self.retry_on = retry_on;
        Ok(())
    }

    /// Sets the retry budget. The old value is kept on error.
    pub fn set_max_retries<T: TryInto<u32>>(&mut self, value: T) -> Result<()> {
        self.max_retries = value.try_into().map_err(|_| {
            PipedreamError::Config("max_retries must be non-negative integer".to_owned())
        })?;
        Ok(())
    }

    /// Empties the condition set.
    pub fn clear_retry_on(&mut self) {
        self.retry_on.clear();
    }

    /// Resets the budget to zero.
    pub fn reset_max_retries(&mut self) {
        self.max_retries = 0;
    }

    /// Whether `err` is listed as retryable.
    ///
    /// API failures match on their exact kind or their status code;
    /// transport failures match only [`RetryCondition::Transport`].
    pub fn allows(&self, err: &PipedreamError) -> bool {
        let Some(kind) = err.retry_condition() else {
            return false;
        };
        if self.retry_on.contains(&kind) {
            return true;
        }
        err.status()
            .is_some_and(|code| self.retry_on.contains(&RetryCondition::Status(code)))
    }
}

/// Parses a comma separated list such as `"rate_limit,503"`.
pub(crate) fn parse_retry_on(value: &str) -> Result<Vec<RetryCondition>> {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect()
}
