use std::{
    collections::HashSet,
    fmt,
    ops::{Deref, DerefMut},
    time::Duration,
};

use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    multipart, Method,
};

// tokio::time::sleep is only available on non-WASM targets.
#[cfg(not(target_arch = "wasm32"))]
use tokio::time::sleep;

use crate::{
    decode::{decode_page, merge_pages},
    policy::RetryPolicy,
    Body, Call, ClientOptions, CompleteResponse, Content, FilePart, Output, PipedreamError, Query,
    RawResponse, Result, RetryCondition, RetryOverride, Select, TransportOptions, API_VERSION,
    JSON_MIME,
};

/// Base URL of version 1 of the Pipedream REST API.
pub const DEFAULT_BASE_URL: &str = "https://api.pipedream.com/v1";

const USER_AGENT: &str = concat!("pipedreamer/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
/// HTTP client for the Pipedream REST API.
///
/// Every endpoint method funnels through [`PipedreamClient::execute`], which
/// builds the request, classifies the response, retries per the configured
/// [`RetryPolicy`] and follows `next_page` cursors.
///
/// Calls take `&mut self`: the default header map is updated by each call's
/// encoding decision. Clone the client to issue requests concurrently; clones
/// share the connection pool.
pub struct PipedreamClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    token: Option<String>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl fmt::Debug for PipedreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipedreamClient")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How the body of a call is put on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Multipart,
    Json,
    /// Attachment upload with a caller supplied content type.
    Raw,
    Plain,
}

impl PipedreamClient {
    /// Creates a client authenticated with a bearer token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::from_options(ClientOptions {
            token: Some(token.into()),
            ..ClientOptions::default()
        })
    }

    /// Creates a client from explicit options.
    ///
    /// Fails with [`PipedreamError::Config`] for an unsupported API version,
    /// an invalid retry entry or a token that is not a valid header value.
    pub fn from_options(opts: ClientOptions) -> Result<Self> {
        if opts.api_version != API_VERSION {
            return Err(PipedreamError::Config(format!(
                "unsupported Pipedream API version: {}",
                opts.api_version
            )));
        }

        let retry = RetryPolicy::new(opts.retry_on, opts.max_retries)?;
        let http = build_http(&opts.transport)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.extend(opts.headers);

        let mut client = Self {
            http,
            base_url: DEFAULT_BASE_URL.to_owned(),
            headers,
            token: None,
            retry,
            timeout: opts.transport.timeout_ms.map(Duration::from_millis),
        };
        if let Some(token) = opts.token {
            client.set_token(token)?;
        }
        Ok(client)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `PIPEDREAM_TOKEN`: API token (required)
    /// - `PIPEDREAM_MAX_RETRIES`: retry budget per request
    /// - `PIPEDREAM_RETRY_ON`: comma separated retry conditions, e.g.
    ///   `transport,rate_limit,503`
    ///
    /// **Not available on `wasm32` targets**. Environment variables do not
    /// exist in browser runtimes.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pipedreamer::PipedreamClient;
    ///
    /// let client = PipedreamClient::from_env().expect("missing PIPEDREAM_TOKEN");
    /// ```
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("PIPEDREAM_TOKEN").map_err(|_| {
            PipedreamError::Config("missing PIPEDREAM_TOKEN environment variable".to_owned())
        })?;
        if token.trim().is_empty() {
            return Err(PipedreamError::Config(
                "PIPEDREAM_TOKEN is set but empty".to_owned(),
            ));
        }

        let mut options = ClientOptions {
            token: Some(token.trim().to_owned()),
            ..ClientOptions::default()
        };
        if let Ok(value) = std::env::var("PIPEDREAM_MAX_RETRIES") {
            options.max_retries = value
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|parsed| u32::try_from(parsed).ok())
                .ok_or_else(|| {
                    PipedreamError::Config(format!(
                        "PIPEDREAM_MAX_RETRIES must be non-negative integer, got '{value}'"
                    ))
                })?;
        }
        if let Ok(value) = std::env::var("PIPEDREAM_RETRY_ON") {
            options.retry_on = crate::policy::parse_retry_on(&value)?;
        }
        Self::from_options(options)
    }

    /// Points the client at another base URL, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Base URL every call path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the default headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The current bearer token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Stores the token and sends it as `Authorization: Bearer <token>`.
    ///
    /// An empty token clears it without touching the header map.
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if token.is_empty() {
            self.clear_token();
            return Ok(());
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| {
            PipedreamError::Config(format!("token is not a valid header value: {err}"))
        })?;
        value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, value);
        self.token = Some(token);
        Ok(())
    }

    /// Forgets the token. A previously sent `Authorization` header stays in
    /// the header map until removed through [`PipedreamClient::headers_mut`].
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// The instance retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Conditions that trigger an automatic retry.
    pub fn retry_on(&self) -> &HashSet<RetryCondition> {
        self.retry.retry_on()
    }

    /// Replaces the retryable conditions.
    ///
    /// Accepts `None`, a single condition (`Some(..)` or `[..]`) or any
    /// iterable. Nothing changes if one entry is invalid.
    pub fn set_retry_on<I>(&mut self, value: I) -> Result<()>
    where
        I: IntoIterator<Item = RetryCondition>,
    {
        self.retry.set_retry_on(value)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(retry_on = ?self.retry.retry_on(), "retry conditions updated");
        Ok(())
    }

    /// Disables retries by emptying the condition set.
    pub fn clear_retry_on(&mut self) {
        self.retry.clear_retry_on();
    }

    /// Retries allowed per page after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries()
    }

    /// Sets the retry budget. Negative or out of range values are rejected
    /// and the previous value is kept.
    pub fn set_max_retries<T: TryInto<u32>>(&mut self, value: T) -> Result<()> {
        self.retry.set_max_retries(value)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(max_retries = self.retry.max_retries(), "retry budget updated");
        Ok(())
    }

    /// Resets the retry budget to zero.
    pub fn reset_max_retries(&mut self) {
        self.retry.reset_max_retries();
    }

    /// Executes a call and normalizes its response.
    ///
    /// With a per-call retry override, the instance policy is swapped for the
    /// duration of the call and restored afterwards, even when the call fails.
    /// The override only applies when it names at least one condition and a
    /// non-zero budget.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pipedreamer::{Call, CallOptions, PipedreamClient, RetryCondition};
    ///
    /// # async fn run() -> pipedreamer::Result<()> {
    /// let mut client = PipedreamClient::new("my-token")?;
    /// let sources = client
    ///     .execute(
    ///         Call::get("/users/me/sources/").with_options(
    ///             CallOptions::new()
    ///                 .all_pages()
    ///                 .retry([RetryCondition::RateLimit], 3),
    ///         ),
    ///     )
    ///     .await?;
    /// println!("{:?}", sources.json());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(&mut self, mut call: Call) -> Result<Output> {
        match call.options.retry.take() {
            Some(RetryOverride {
                retry_on,
                max_retries,
            }) if !retry_on.is_empty() && max_retries > 0 => {
                let policy = RetryPolicy::new(retry_on, max_retries)?;
                let mut scope = RetryScope::enter(self, policy);
                scope.run(call).await
            }
            _ => self.run(call).await,
        }
    }

    async fn run(&mut self, call: Call) -> Result<Output> {
        let Call {
            method,
            path,
            body,
            options,
        } = call;

        let mut url = format!("{}{}", self.base_url, path);
        let mut query = options.merged_query();
        if let Some(raw_query) = options.raw_query.as_deref().filter(|raw| !raw.is_empty()) {
            url.push_str(raw_query);
            query.clear();
        }

        let encoding = self.prepare_encoding(&method, !options.files.is_empty(), &options.mime_type)?;

        let mut pages = Vec::new();
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!(method = %method, url = %url, attempt, "sending request");

            let request =
                self.build_request(&method, &url, &query, encoding, body.as_ref(), &options.files)?;
            let response = match self.dispatch(request).await {
                Ok(response) => response,
                Err(err) => {
                    if attempt <= self.retry.max_retries() {
                        self.handle_retry(err).await?;
                        continue;
                    }
                    return Err(err);
                }
            };

            let page = decode_page(&response)?;

            if options.complete_response {
                return Ok(Output::Complete(CompleteResponse {
                    status: response.status,
                    content: page.content,
                    response,
                }));
            }

            pages.push(page.content);
            match page.next_page {
                Some(next_page) if options.get_all_pages => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(next_page = %next_page, pages = pages.len(), "following cursor");

                    // The cursor URL carries its own query string.
                    url = next_page;
                    query.clear();
                    attempt = 0;
                }
                _ => return Ok(select_output(options.select, response, merge_pages(pages))),
            }
        }
    }

    /// Decides the body encoding and updates the default `Content-Type`.
    fn prepare_encoding(
        &mut self,
        method: &Method,
        has_files: bool,
        mime_type: &str,
    ) -> Result<Encoding> {
        let writes = *method == Method::POST || *method == Method::PUT;
        let encoding = if has_files {
            Encoding::Multipart
        } else if writes && mime_type == JSON_MIME {
            Encoding::Json
        } else if writes {
            Encoding::Raw
        } else {
            Encoding::Plain
        };

        if encoding == Encoding::Raw {
            let value = HeaderValue::from_str(mime_type).map_err(|err| {
                PipedreamError::Config(format!("invalid MIME type '{mime_type}': {err}"))
            })?;
            self.headers.insert(header::CONTENT_TYPE, value);
        } else {
            // reqwest sets the JSON and multipart content types itself.
            self.headers.remove(header::CONTENT_TYPE);
        }
        Ok(encoding)
    }

    fn build_request(
        &self,
        method: &Method,
        url: &str,
        query: &Query,
        encoding: Encoding,
        body: Option<&Body>,
        files: &[FilePart],
    ) -> Result<reqwest::RequestBuilder> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(self.headers.clone());
        if !query.is_empty() {
            request = request.query(query.pairs());
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let request = match (encoding, body) {
            (Encoding::Multipart, body) => request.multipart(build_form(body, files)?),
            (Encoding::Json, Some(Body::Json(value))) => request.json(value),
            // The caller's MIME type stays: `form` only fills in a missing Content-Type.
            (Encoding::Raw, Some(body @ Body::Json(serde_json::Value::Object(_)))) => {
                request.form(&body.form_fields())
            }
            (Encoding::Json | Encoding::Raw, Some(body)) => request.body(body.to_bytes()),
            (Encoding::Plain, Some(body @ Body::Json(serde_json::Value::Object(_)))) => {
                request.form(&body.form_fields())
            }
            (Encoding::Plain, Some(Body::Bytes(bytes))) => request.body(bytes.clone()),
            (Encoding::Plain, Some(Body::Json(_))) | (_, None) => request,
        };
        Ok(request)
    }

    /// Sends one attempt and reads the whole body.
    async fn dispatch(&self, request: reqwest::RequestBuilder) -> Result<RawResponse> {
        let response = request.send().await.map_err(PipedreamError::Transport)?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(PipedreamError::Transport)?
            .to_vec();

        PipedreamError::classify(RawResponse {
            status,
            url,
            headers,
            body,
        })
    }

    /// Decides whether a failed attempt is retried.
    ///
    /// Returns `Ok(())` to retry, after honoring any `Retry-After` header on
    /// the failed response. Otherwise the failure is handed back unchanged.
    async fn handle_retry(&self, failure: PipedreamError) -> Result<()> {
        if !self.retry.allows(&failure) {
            return Err(failure);
        }

        let delay = failure
            .response()
            .and_then(|response| retry_after(&response.headers));

        #[cfg(feature = "tracing")]
        tracing::debug!(error = %failure, ?delay, "retrying request");

        if let Some(delay) = delay {
            self.wait_before_retry(delay).await;
        }
        Ok(())
    }

    /// Waits before the next retry attempt.
    ///
    /// On WASM targets this is a no-op: `tokio::time::sleep` is not
    /// available there.
    async fn wait_before_retry(&self, delay: Duration) {
        #[cfg(not(target_arch = "wasm32"))]
        sleep(delay).await;

        #[cfg(target_arch = "wasm32")]
        let _ = delay;
    }
}

/// Swaps in a one-call retry policy and puts the previous one back on drop.
struct RetryScope<'a> {
    client: &'a mut PipedreamClient,
    saved: RetryPolicy,
}

impl<'a> RetryScope<'a> {
    fn enter(client: &'a mut PipedreamClient, policy: RetryPolicy) -> Self {
        let saved = std::mem::replace(&mut client.retry, policy);
        Self { client, saved }
    }
}

impl Deref for RetryScope<'_> {
    type Target = PipedreamClient;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl DerefMut for RetryScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
    }
}

impl Drop for RetryScope<'_> {
    fn drop(&mut self) {
        std::mem::swap(&mut self.client.retry, &mut self.saved);
    }
}

fn build_http(transport: &TransportOptions) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder();

    #[cfg(not(target_arch = "wasm32"))]
    let builder = {
        let redirect = if transport.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };
        builder
            .redirect(redirect)
            .danger_accept_invalid_certs(transport.accept_invalid_certs)
    };

    // Redirects and TLS are handled by the browser on WASM.
    #[cfg(target_arch = "wasm32")]
    let _ = transport;

    builder
        .build()
        .map_err(|err| PipedreamError::Config(format!("failed to build HTTP client: {err}")))
}

fn build_form(body: Option<&Body>, files: &[FilePart]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    if let Some(body) = body {
        for (name, value) in body.form_fields() {
            form = form.text(name, value);
        }
    }
    for file in files {
        let mut part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part.mime_str(mime_type).map_err(|err| {
                PipedreamError::Config(format!("invalid MIME type '{mime_type}': {err}"))
            })?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

/// Parses `Retry-After` as fractional seconds. Malformed, negative or
/// unrepresentable values yield `None`.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

/// Picks the return value of a finished call.
///
/// Without a selector: the `location` header if set, else truthy content,
/// else the bare status code.
fn select_output(select: Option<Select>, response: RawResponse, content: Content) -> Output {
    let location = response
        .header(header::LOCATION.as_str())
        .map(str::to_owned);
    match select {
        Some(Select::Content) => Output::Content(content),
        Some(Select::Code) => Output::Status(response.status),
        Some(Select::Location) => Output::Location(location),
        Some(Select::Headers) => Output::Headers(response.headers),
        None => match location {
            Some(location) if !location.is_empty() => Output::Location(Some(location)),
            _ if content.is_truthy() => Output::Content(content),
            _ => Output::Status(response.status),
        },
    }
}
