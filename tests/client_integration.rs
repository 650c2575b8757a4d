use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::Response,
    Router,
};
use pipedreamer::{
    Body, Call, CallOptions, ClientOptions, Content, EventSummariesQuery, FilePart, Output,
    PipedreamClient, PipedreamError, RetryCondition, Select,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            headers: vec![("content-type", "application/json".to_owned())],
            body: body.to_string(),
        }
    }

    fn text(status: StatusCode, content_type: &str, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type", content_type.to_owned())],
            body: body.to_owned(),
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key.to_owned(), value.to_owned())
            })
            .collect();
        pairs.sort();
        pairs
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(Recorded {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            headers,
            body: body.to_vec(),
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(*name, value.as_str());
    }
    builder
        .body(axum::body::Body::from(response.body))
        .expect("mock response must build")
}

struct TestServer {
    base_url: String,
    state: MockState,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn api_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    fn client(&self) -> PipedreamClient {
        PipedreamClient::new("test-token")
            .expect("client must build")
            .with_base_url(self.api_url())
    }

    fn client_with(&self, options: ClientOptions) -> PipedreamClient {
        PipedreamClient::from_options(options)
            .expect("client must build")
            .with_base_url(self.api_url())
    }

    fn requests(&self) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }

    fn hits(&self) -> usize {
        self.requests().len()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        state,
        task,
    }
}

#[tokio::test]
async fn get_returns_json_content_with_bearer_auth() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"data": {"id": "u_123"}}),
    )])
    .await;
    let mut client = server.client();

    let output = client
        .users_me(CallOptions::new())
        .await
        .expect("users/me must succeed");

    assert_eq!(output.json(), Some(&json!({"data": {"id": "u_123"}})));
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/v1/users/me");
    assert_eq!(requests[0].query, None);
    assert_eq!(requests[0].header("authorization"), Some("Bearer test-token"));
    assert_eq!(requests[0].header("content-type"), None);
}

#[tokio::test]
async fn all_pages_follows_cursor_without_original_query() {
    let server = spawn_server(Vec::new()).await;
    let next_page = format!("{}/users/me/sources/?cursor=p2", server.api_url());
    server.state.responses.lock().expect("queue").extend([
        MockResponse::json(
            StatusCode::OK,
            json!({"data": [1, 2], "page_info": {"count": 2}, "next_page": next_page}),
        ),
        MockResponse::json(
            StatusCode::OK,
            json!({"data": [3], "page_info": {"count": 1}, "next_page": null}),
        ),
    ]);
    let mut client = server.client();

    let output = client
        .users_me_sources(CallOptions::new().query([("limit", "2")]).all_pages())
        .await
        .expect("listing must succeed");

    assert_eq!(
        output.into_json(),
        Some(json!({"data": [1, 2, 3], "page_info": {"count": 1}, "next_page": null}))
    );
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].query.as_deref(), Some("limit=2"));
    assert_eq!(requests[1].path, "/v1/users/me/sources/");
    assert_eq!(requests[1].query.as_deref(), Some("cursor=p2"));
}

#[tokio::test]
async fn single_page_by_default() {
    let server = spawn_server(Vec::new()).await;
    let next_page = format!("{}/users/me/webhooks?cursor=p2", server.api_url());
    server
        .state
        .responses
        .lock()
        .expect("queue")
        .push_back(MockResponse::json(
            StatusCode::OK,
            json!({"data": ["w1"], "next_page": next_page.clone()}),
        ));
    let mut client = server.client();

    let output = client
        .users_me_webhooks(CallOptions::new())
        .await
        .expect("listing must succeed");

    let json = output.into_json().expect("json content");
    assert_eq!(json["data"], json!(["w1"]));
    assert_eq!(json["next_page"], json!(next_page));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn complete_response_stops_after_first_page() {
    let server = spawn_server(Vec::new()).await;
    let next_page = format!("{}/users/me/subscriptions?cursor=p2", server.api_url());
    server
        .state
        .responses
        .lock()
        .expect("queue")
        .push_back(
            MockResponse::json(StatusCode::OK, json!({"data": [], "next_page": next_page}))
                .with_header("x-request-id", "req-1"),
        );
    let mut client = server.client();

    let output = client
        .users_me_subscriptions(CallOptions::new().all_pages().complete_response())
        .await
        .expect("listing must succeed");

    match output {
        Output::Complete(complete) => {
            assert_eq!(complete.status, 200);
            assert_eq!(complete.response.header("x-request-id"), Some("req-1"));
            assert!(matches!(complete.content, Content::Json(_)));
        }
        other => panic!("expected complete response, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn authentication_failure_retries_until_budget_is_spent() {
    let server = spawn_server(vec![
        MockResponse::text(StatusCode::UNAUTHORIZED, "text/plain", "denied-1"),
        MockResponse::text(StatusCode::UNAUTHORIZED, "text/plain", "denied-2"),
        MockResponse::text(StatusCode::UNAUTHORIZED, "text/plain", "denied-3"),
    ])
    .await;
    let mut client = server.client_with(ClientOptions {
        token: Some("expired".to_owned()),
        retry_on: vec![RetryCondition::Authentication],
        max_retries: 2,
        ..ClientOptions::default()
    });

    let err = client
        .users_me(CallOptions::new())
        .await
        .expect_err("must fail after retries");

    match err {
        PipedreamError::Authentication(failure) => {
            assert_eq!(failure.status, 401);
            assert_eq!(failure.message, "denied-3");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn non_retryable_failure_makes_one_attempt() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"data": {}})),
    ])
    .await;
    let mut client = server.client_with(ClientOptions {
        retry_on: vec![RetryCondition::RateLimit],
        max_retries: 5,
        ..ClientOptions::default()
    });

    let err = client
        .component_show("sc_1", CallOptions::new())
        .await
        .expect_err("500 is not retryable here");

    assert!(matches!(err, PipedreamError::Api(_)));
    assert_eq!(err.status(), Some(500));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn rate_limit_waits_for_retry_after() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"}))
            .with_header("retry-after", "0.3"),
        MockResponse::json(StatusCode::OK, json!({"data": {"id": "dc_1"}})),
    ])
    .await;
    let mut client = server.client_with(ClientOptions {
        retry_on: vec![RetryCondition::Status(429)],
        max_retries: 1,
        ..ClientOptions::default()
    });

    let started = Instant::now();
    let output = client
        .orgs_sources_list("o_1", CallOptions::new())
        .await
        .expect("must succeed after one retry");

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(output.json(), Some(&json!({"data": {"id": "dc_1"}})));
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn per_call_retry_override_is_restored_after_failure() {
    let server = spawn_server(vec![
        MockResponse::empty(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::empty(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::empty(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::json(StatusCode::OK, json!({"data": []})),
    ])
    .await;
    let mut client = server.client_with(ClientOptions {
        retry_on: vec![RetryCondition::Transport],
        ..ClientOptions::default()
    });
    let before = client.retry_policy().clone();

    let err = client
        .orgs_subscriptions_list(
            "o_1",
            CallOptions::new().retry([RetryCondition::Status(503)], 1),
        )
        .await
        .expect_err("both attempts fail");
    assert_eq!(err.status(), Some(503));
    assert_eq!(server.hits(), 2);
    assert_eq!(client.retry_policy(), &before);

    let output = client
        .orgs_subscriptions_list(
            "o_1",
            CallOptions::new().retry([RetryCondition::Status(503)], 1),
        )
        .await
        .expect("second attempt succeeds");
    assert_eq!(output.json(), Some(&json!({"data": []})));
    assert_eq!(server.hits(), 4);
    assert_eq!(client.retry_policy(), &before);
}

#[tokio::test]
async fn raw_query_replaces_structured_query() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"ok": true}))]).await;
    let mut client = server.client();

    client
        .execute(
            Call::get("/sources/dc_1/event_summaries").with_options(
                CallOptions::new()
                    .query([("bar", "3")])
                    .param("baz", "4")
                    .raw_query("?foo=1&foo=2"),
            ),
        )
        .await
        .expect("call must succeed");

    let requests = server.requests();
    assert_eq!(requests[0].path, "/v1/sources/dc_1/event_summaries");
    assert_eq!(requests[0].query.as_deref(), Some("foo=1&foo=2"));
}

#[tokio::test]
async fn named_optionals_layer_over_caller_query() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"data": [1]}))]).await;
    let mut client = server.client();

    client
        .source_event_summaries(
            "dc_1",
            EventSummariesQuery {
                expand: Some("event".to_owned()),
                limit: Some(10),
            },
            CallOptions::new()
                .query([("limit", "5"), ("since", "x")])
                .param("ids", vec!["a", "b"])
                .param("since", "overridden"),
        )
        .await
        .expect("call must succeed");

    let requests = server.requests();
    assert_eq!(
        requests[0].query_pairs(),
        vec![
            ("expand".to_owned(), "event".to_owned()),
            ("ids".to_owned(), "a%2Cb".to_owned()),
            ("limit".to_owned(), "10".to_owned()),
            ("since".to_owned(), "x".to_owned()),
        ]
    );
}

#[tokio::test]
async fn empty_no_content_response_returns_status() {
    let server = spawn_server(vec![MockResponse::empty(StatusCode::NO_CONTENT)]).await;
    let mut client = server.client();

    let output = client
        .source_delete("dc_1", CallOptions::new())
        .await
        .expect("delete must succeed");

    assert_eq!(output, Output::Status(204));
    let requests = server.requests();
    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].path, "/v1/sources/dc_1");
}

#[tokio::test]
async fn creation_prefers_location_header() {
    let server = spawn_server(Vec::new()).await;
    let location = format!("{}/sources/dc_9", server.api_url());
    server
        .state
        .responses
        .lock()
        .expect("queue")
        .push_back(
            MockResponse::json(StatusCode::CREATED, json!({"data": {"id": "dc_9"}}))
                .with_header("location", location.clone()),
        );
    let mut client = server.client();

    let output = client
        .sources_create(json!({"key": "http-new-requests", "name": "hooks"}), CallOptions::new())
        .await
        .expect("create must succeed");

    assert_eq!(output, Output::Location(Some(location)));
    let requests = server.requests();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    let sent: JsonValue = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(sent, json!({"key": "http-new-requests", "name": "hooks"}));
}

#[tokio::test]
async fn selector_returns_content_instead_of_location() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::CREATED,
        json!({"data": {"id": "hook_1"}}),
    )
    .with_header("location", "https://api.pipedream.com/v1/webhooks/hook_1")])
    .await;
    let mut client = server.client();

    let output = client
        .webhook_create(
            json!({}),
            pipedreamer::WebhookQuery {
                name: Some("alerts".to_owned()),
                url: Some("https://example.com/hook".to_owned()),
                description: None,
            },
            CallOptions::new().select(Select::Content),
        )
        .await
        .expect("create must succeed");

    assert_eq!(output.json(), Some(&json!({"data": {"id": "hook_1"}})));
    let pairs = server.requests()[0].query_pairs();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0], ("name".to_owned(), "alerts".to_owned()));
}

#[tokio::test]
async fn unprocessable_entity_is_returned_as_content() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({"errors": ["name is taken"]}),
    )])
    .await;
    let mut client = server.client();

    let output = client
        .source_update("dc_1", json!({"name": "dup"}), CallOptions::new())
        .await
        .expect("422 is not an error");

    assert_eq!(output.json(), Some(&json!({"errors": ["name is taken"]})));
    assert_eq!(server.requests()[0].method, Method::PUT);
}

#[tokio::test]
async fn attachment_upload_sets_mime_then_later_calls_clear_it() {
    let server = spawn_server(vec![
        MockResponse::text(StatusCode::OK, "text/plain", "stored"),
        MockResponse::json(StatusCode::OK, json!({"data": {}})),
    ])
    .await;
    let mut client = server.client();

    let output = client
        .execute(
            Call::post("/components", Body::Bytes(b"export default {}".to_vec()))
                .with_options(CallOptions::new().mime_type("application/javascript")),
        )
        .await
        .expect("upload must succeed");
    assert_eq!(output, Output::Content(Content::Raw(b"stored".to_vec())));

    client
        .users_me(CallOptions::new())
        .await
        .expect("follow-up must succeed");

    let requests = server.requests();
    assert_eq!(
        requests[0].header("content-type"),
        Some("application/javascript")
    );
    assert_eq!(requests[0].body, b"export default {}".to_vec());
    assert_eq!(requests[1].header("content-type"), None);
    assert!(!client.headers().contains_key("content-type"));
}

#[tokio::test]
async fn files_are_sent_as_multipart() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"ok": true}))]).await;
    let mut client = server.client();

    client
        .component_create(
            json!({"name": "my-component"}),
            CallOptions::new().file(
                FilePart::new("component_code", "component.mjs", b"export default {}".to_vec())
                    .with_mime_type("text/javascript"),
            ),
        )
        .await
        .expect("upload must succeed");

    let requests = server.requests();
    let content_type = requests[0].header("content-type").expect("content type");
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"name\""));
    assert!(body.contains("my-component"));
    assert!(body.contains("filename=\"component.mjs\""));
    assert!(body.contains("export default {}"));
}

#[tokio::test]
async fn text_content_type_is_parsed_leniently() {
    let server = spawn_server(vec![
        MockResponse::text(StatusCode::OK, "text/plain", r#"{"data": {"key": "k"}}"#),
        MockResponse::text(StatusCode::OK, "text/html", "<p>hello</p>"),
    ])
    .await;
    let mut client = server.client();

    let output = client
        .components_registry_show("k", CallOptions::new())
        .await
        .expect("must succeed");
    assert_eq!(output.json(), Some(&json!({"data": {"key": "k"}})));

    let output = client
        .components_registry_show("k", CallOptions::new())
        .await
        .expect("must succeed");
    assert_eq!(output, Output::Content(Content::Raw(b"<p>hello</p>".to_vec())));
}

#[tokio::test]
async fn invalid_json_body_is_a_decode_error() {
    let server = spawn_server(vec![MockResponse::text(
        StatusCode::OK,
        "application/json",
        "{not json",
    )])
    .await;
    let mut client = server.client();

    let err = client
        .users_me(CallOptions::new())
        .await
        .expect_err("must fail to decode");
    assert!(matches!(err, PipedreamError::Decode(_)));
}

#[tokio::test]
async fn transport_failure_surfaces_after_retries() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let mut client = PipedreamClient::from_options(ClientOptions {
        retry_on: vec![RetryCondition::Transport],
        max_retries: 2,
        ..ClientOptions::default()
    })
    .expect("client must build")
    .with_base_url(format!("http://{address}/v1"));

    let err = client
        .users_me(CallOptions::new())
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, PipedreamError::Transport(_)));
}

#[tokio::test]
async fn retry_budget_is_counted_per_page() {
    let server = spawn_server(Vec::new()).await;
    let next_page = format!("{}/users/me/sources/?cursor=p2", server.api_url());
    server.state.responses.lock().expect("queue").extend([
        MockResponse::empty(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::json(StatusCode::OK, json!({"data": [1], "next_page": next_page})),
        MockResponse::empty(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::json(StatusCode::OK, json!({"data": [2]})),
    ]);
    let mut client = server.client_with(ClientOptions {
        retry_on: vec![RetryCondition::Status(503)],
        max_retries: 1,
        ..ClientOptions::default()
    });

    let output = client
        .users_me_sources(CallOptions::new().all_pages())
        .await
        .expect("each page fits in its own retry budget");

    assert_eq!(output.into_json(), Some(json!({"data": [1, 2]})));
    assert_eq!(server.hits(), 4);
}

#[tokio::test]
async fn object_body_with_custom_mime_is_form_encoded() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"ok": true}))]).await;
    let mut client = server.client();

    client
        .execute(
            Call::post("/webhooks", json!({"name": "hook", "size": 2}))
                .with_options(CallOptions::new().mime_type("text/plain")),
        )
        .await
        .expect("upload must succeed");

    let requests = server.requests();
    assert_eq!(requests[0].header("content-type"), Some("text/plain"));
    assert_eq!(requests[0].body, b"name=hook&size=2".to_vec());
}
