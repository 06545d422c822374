use super::*;
use crate::auth::MemoryTokenStore;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub(crate) struct CapturedRequest {
    pub(crate) request_line: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl CapturedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn query(&self) -> Option<&str> {
        let target = self.request_line.split(' ').nth(1)?;
        target.split_once('?').map(|(_, query)| query)
    }
}

pub(crate) enum Reply {
    Fixed {
        status: &'static str,
        content_type: &'static str,
        body: String,
    },
    Chunked {
        chunks: Vec<&'static str>,
        pause: Duration,
        hold_open: bool,
    },
}

impl Reply {
    pub(crate) fn json(status: &'static str, body: &str) -> Self {
        Reply::Fixed {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn text(status: &'static str, body: &str) -> Self {
        Reply::Fixed {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub(crate) fn stream(chunks: Vec<&'static str>) -> Self {
        Reply::Chunked {
            chunks,
            pause: Duration::from_millis(50),
            hold_open: false,
        }
    }
}

pub(crate) async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or("missing header terminator")?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

pub(crate) async fn write_reply(stream: &mut TcpStream, reply: Reply) -> Result<(), String> {
    match reply {
        Reply::Fixed {
            status,
            content_type,
            body,
        } => {
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
        }
        Reply::Chunked {
            chunks,
            pause,
            hold_open,
        } => {
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .map_err(|err| err.to_string())?;
            for chunk in chunks {
                let frame = format!("{:x}\r\n{chunk}\r\n", chunk.len());
                stream
                    .write_all(frame.as_bytes())
                    .await
                    .map_err(|err| err.to_string())?;
                stream.flush().await.map_err(|err| err.to_string())?;
                tokio::time::sleep(pause).await;
            }
            if hold_open {
                // Park until the client hangs up.
                let mut peek = [0_u8; 1];
                let _ = stream.read(&mut peek).await;
                return Ok(());
            }
            stream
                .write_all(b"0\r\n\r\n")
                .await
                .map_err(|err| err.to_string())?;
        }
    }
    stream.flush().await.map_err(|err| err.to_string())
}

pub(crate) async fn serve_once(reply: Reply) -> (String, JoinHandle<Result<CapturedRequest, String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
        let captured = read_http_request(&mut stream).await?;
        write_reply(&mut stream, reply).await?;
        Ok(captured)
    });

    (format!("http://{addr}/api"), server)
}

pub(crate) fn test_client(base_url: &str, tokens: Arc<dyn TokenStore>) -> HttpClient {
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build");
    HttpClient::with_client(client, base_url, tokens)
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryTokenStore,
    removals: AtomicUsize,
}

impl CountingStore {
    fn with_token(token: &str) -> Arc<Self> {
        let store = Self::default();
        store.inner.set_token(token);
        Arc::new(store)
    }

    fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl TokenStore for CountingStore {
    fn get_token(&self) -> Option<String> {
        self.inner.get_token()
    }

    fn set_token(&self, token: &str) {
        self.inner.set_token(token);
    }

    fn remove_token(&self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_token();
    }
}

fn progress_recorder() -> (
    Arc<Mutex<Vec<String>>>,
    impl FnMut(&ProgressEvent<'_>) + Send + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &ProgressEvent<'_>| {
        sink.lock().unwrap().push(event.text.to_string());
    })
}

#[test]
fn query_flattening_drops_nulls_and_stringifies_values() {
    let mut url = Url::parse("http://localhost/api/items").unwrap();
    append_query(
        &mut url,
        &json!({"a": 1, "b": null, "c": "x", "d": {"k": true}, "e": [1, 2]}),
    );

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), "1".to_string()),
            ("c".to_string(), "x".to_string()),
            ("d".to_string(), "{\"k\":true}".to_string()),
            ("e".to_string(), "[1,2]".to_string()),
        ]
    );
}

#[test]
fn query_flattening_leaves_url_alone_without_entries() {
    let mut url = Url::parse("http://localhost/api/items").unwrap();
    append_query(&mut url, &json!({"only": null}));
    append_query(&mut url, &json!("not an object"));
    assert_eq!(url.as_str(), "http://localhost/api/items");
}

#[tokio::test]
async fn get_sends_payload_as_query_without_body() {
    let (base_url, server) =
        serve_once(Reply::json("200 OK", r#"{"status":"Success","message":"","data":null}"#)).await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));

    client
        .get(RequestOptions::new("/items").payload(json!({"a": 1, "b": null, "c": "x"})))
        .await
        .expect("request should succeed");

    let captured = server.await.unwrap().expect("server should capture");
    assert!(captured.request_line.starts_with("GET /api/items?"));
    assert_eq!(captured.query(), Some("a=1&c=x"));
    assert!(captured.body.is_empty());
    assert_eq!(captured.header("content-type"), None);
    assert_eq!(captured.header("authorization"), None);
}

#[tokio::test]
async fn post_sends_json_body_with_bearer_token() {
    let (base_url, server) =
        serve_once(Reply::json("200 OK", r#"{"status":"Success","message":"ok","data":{"n":1}}"#)).await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::with_token("t1")));

    let response = client
        .post(RequestOptions::new("chat-process").payload(json!({"prompt": "hi"})))
        .await
        .expect("request should succeed");

    let captured = server.await.unwrap().expect("server should capture");
    assert!(captured.request_line.starts_with("POST /api/chat-process "));
    assert_eq!(captured.header("authorization"), Some("Bearer t1"));
    assert_eq!(captured.header("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body, json!({"prompt": "hi"}));

    assert_eq!(response.status(), StatusCode::OK);
    let record = response.record().expect("record");
    assert_eq!(record.origin, RecordOrigin::Document);
    assert_eq!(response.json::<Value>().unwrap()["data"]["n"], json!(1));
}

#[tokio::test]
async fn caller_content_type_is_kept_and_producer_runs() {
    let (base_url, server) = serve_once(Reply::json("200 OK", "{}")).await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.chat+json"));
    client
        .request(
            RequestOptions::new("/verify")
                .method(Method::Put)
                .headers(headers)
                .payload_with(|| json!({"token": "abc"})),
        )
        .await
        .expect("request should succeed");

    let captured = server.await.unwrap().expect("server should capture");
    assert!(captured.request_line.starts_with("PUT /api/verify "));
    assert_eq!(
        captured.header("content-type"),
        Some("application/vnd.chat+json")
    );
    let body: Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body, json!({"token": "abc"}));
}

#[tokio::test]
async fn absolute_url_ignores_base() {
    let (base_url, server) = serve_once(Reply::json("200 OK", "{}")).await;
    let client = test_client("http://unused.invalid/base", Arc::new(MemoryTokenStore::new()));

    client
        .post(RequestOptions::new(format!("{base_url}/session")))
        .await
        .expect("request should succeed");

    let captured = server.await.unwrap().expect("server should capture");
    assert!(captured.request_line.starts_with("POST /api/session "));
}

#[tokio::test]
async fn streamed_chunks_arrive_as_cumulative_snapshots() {
    let (base_url, server) = serve_once(Reply::stream(vec!["A", "B", "C"])).await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));
    let (seen, on_progress) = progress_recorder();

    let response = client
        .post(RequestOptions::new("/chat-process").on_progress(on_progress))
        .await
        .expect("request should succeed");

    server.await.unwrap().expect("server should capture");
    assert_eq!(response.text(), "ABC");
    assert!(response.record().is_none());
    assert_eq!(*seen.lock().unwrap(), vec!["A", "AB", "ABC"]);
}

#[tokio::test]
async fn ndjson_stream_uses_last_line_as_terminal_record() {
    let (base_url, server) = serve_once(Reply::stream(vec![
        "{\"delta\":\"Hel\"}\n",
        "{\"delta\":\"lo\"}\n",
        "{\"status\":\"Success\",\"data\":{\"text\":\"Hello\"}}\n",
    ]))
    .await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));

    let response = client
        .post(RequestOptions::new("/chat-process"))
        .await
        .expect("request should succeed");

    server.await.unwrap().expect("server should capture");
    let record = response.record().expect("record");
    assert_eq!(record.origin, RecordOrigin::Line);
    assert_eq!(record.value["data"]["text"], json!("Hello"));
}

#[tokio::test]
async fn unauthorized_tag_in_ok_response_clears_token_once() {
    let (base_url, server) = serve_once(Reply::stream(vec![
        "{\"id\":\"1\",\"text\":\"hi\"}\n",
        "{\"status\":\"Unauthorized\",\"message\":\"Error: No access rights\",\"data\":null}",
    ]))
    .await;
    let tokens = CountingStore::with_token("t1");
    let client = test_client(&base_url, tokens.clone());

    let err = client
        .post(RequestOptions::new("/chat-process"))
        .await
        .expect_err("request should fail");

    server.await.unwrap().expect("server should capture");
    assert!(err.is_unauthorized());
    assert!(err.to_string().contains("Unauthorized"));
    assert!(err.to_string().contains("No access rights"));
    assert_eq!(tokens.removals(), 1);
    assert_eq!(tokens.get_token(), None);
}

#[tokio::test]
async fn http_401_is_unauthorized_even_without_payload() {
    let (base_url, server) = serve_once(Reply::text("401 Unauthorized", "nope")).await;
    let tokens = CountingStore::with_token("t1");
    let client = test_client(&base_url, tokens.clone());

    let err = client
        .post(RequestOptions::new("/session"))
        .await
        .expect_err("request should fail");

    server.await.unwrap().expect("server should capture");
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Unauthorized: Unauthorized");
    assert_eq!(tokens.removals(), 1);
}

#[tokio::test]
async fn server_error_uses_payload_message_and_clears_token() {
    let (base_url, server) = serve_once(Reply::json(
        "500 Internal Server Error",
        r#"{"status":"Fail","message":"upstream exploded","data":null}"#,
    ))
    .await;
    let tokens = CountingStore::with_token("t1");
    let client = test_client(&base_url, tokens.clone());

    let err = client
        .post(RequestOptions::new("/chat-process"))
        .await
        .expect_err("request should fail");

    server.await.unwrap().expect("server should capture");
    assert!(matches!(err, RequestError::Transport { .. }));
    assert_eq!(err.http_status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.to_string(), "upstream exploded");
    assert_eq!(tokens.removals(), 1);
}

#[tokio::test]
async fn server_error_without_json_falls_back_to_status_text() {
    let (base_url, server) = serve_once(Reply::text("502 Bad Gateway", "<html>oops</html>")).await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));

    let err = client
        .post(RequestOptions::new("/config"))
        .await
        .expect_err("request should fail");

    server.await.unwrap().expect("server should capture");
    assert_eq!(err.to_string(), "Bad Gateway");
}

#[tokio::test]
async fn failing_status_tag_in_ok_stream_is_application_error() {
    let (base_url, server) = serve_once(Reply::stream(vec![
        "{\"id\":\"1\",\"text\":\"par\"}\n",
        "{\"message\":\"quota exceeded\",\"data\":null,\"status\":\"Fail\"}",
    ]))
    .await;
    let tokens = CountingStore::with_token("t1");
    let client = test_client(&base_url, tokens.clone());
    let (seen, on_progress) = progress_recorder();

    let err = client
        .post(RequestOptions::new("/chat-process").on_progress(on_progress))
        .await
        .expect_err("request should fail");

    server.await.unwrap().expect("server should capture");
    match &err {
        RequestError::Application { status, message } => {
            assert_eq!(*status, ResponseStatus::Fail);
            assert_eq!(message, "quota exceeded");
        }
        other => panic!("expected application error, got {other:?}"),
    }
    assert_eq!(tokens.removals(), 0);
    assert_eq!(tokens.get_token().as_deref(), Some("t1"));
    assert_eq!(seen.lock().unwrap()[0], "{\"id\":\"1\",\"text\":\"par\"}\n");
}

#[tokio::test]
async fn cancel_mid_stream_reports_canceled_without_touching_token() {
    let (base_url, server) = serve_once(Reply::Chunked {
        chunks: vec!["{\"id\":\"1\",\"text\":\"par\"}\n"],
        pause: Duration::from_millis(10),
        hold_open: true,
    })
    .await;
    let tokens = CountingStore::with_token("t1");
    let client = test_client(&base_url, tokens.clone());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let after_calls = Arc::new(AtomicUsize::new(0));
    let after_counter = Arc::clone(&after_calls);

    let err = client
        .post(
            RequestOptions::new("/chat-process")
                .cancel(cancel)
                .on_progress(move |_event: &ProgressEvent<'_>| trigger.cancel())
                .after_request(move || {
                    after_counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .expect_err("request should be canceled");

    assert!(err.is_canceled());
    assert_eq!(tokens.removals(), 0);
    assert_eq!(tokens.get_token().as_deref(), Some("t1"));
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    server.abort();
}

#[tokio::test]
async fn already_canceled_token_short_circuits_with_hooks() {
    let client = test_client("http://127.0.0.1:9/api", Arc::new(MemoryTokenStore::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let events = Arc::new(Mutex::new(Vec::new()));
    let before_events = Arc::clone(&events);
    let after_events = Arc::clone(&events);

    let err = client
        .post(
            RequestOptions::new("/chat-process")
                .cancel(cancel)
                .before_request(move || before_events.lock().unwrap().push("before"))
                .after_request(move || after_events.lock().unwrap().push("after")),
        )
        .await
        .expect_err("request should be canceled");

    assert!(err.is_canceled());
    assert_eq!(*events.lock().unwrap(), vec!["before", "after"]);
}

#[tokio::test]
async fn network_failure_runs_hooks_and_keeps_token() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let tokens = CountingStore::with_token("t1");
    let client = test_client(&format!("http://{addr}/api"), tokens.clone());
    let events = Arc::new(Mutex::new(Vec::new()));
    let before_events = Arc::clone(&events);
    let after_events = Arc::clone(&events);

    let err = client
        .post(
            RequestOptions::new("/session")
                .before_request(move || before_events.lock().unwrap().push("before"))
                .after_request(move || after_events.lock().unwrap().push("after")),
        )
        .await
        .expect_err("connection should be refused");

    match &err {
        RequestError::Transport { status, source, .. } => {
            assert!(status.is_none());
            assert!(source.is_some());
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(tokens.removals(), 0);
    assert_eq!(*events.lock().unwrap(), vec!["before", "after"]);
}

#[tokio::test]
async fn empty_body_still_reports_one_progress_event() {
    let (base_url, server) = serve_once(Reply::Fixed {
        status: "204 No Content",
        content_type: "text/plain",
        body: String::new(),
    })
    .await;
    let client = test_client(&base_url, Arc::new(MemoryTokenStore::new()));
    let (seen, on_progress) = progress_recorder();

    let response = client
        .post(RequestOptions::new("/session").on_progress(on_progress))
        .await
        .expect("request should succeed");

    server.await.unwrap().expect("server should capture");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.text(), "");
    assert!(response.record().is_none());
    assert_eq!(*seen.lock().unwrap(), vec![""]);
}

#[tokio::test]
async fn relative_url_without_base_is_rejected() {
    let client = test_client("", Arc::new(MemoryTokenStore::new()));

    let err = client
        .post(RequestOptions::new("/session"))
        .await
        .expect_err("url should be invalid");

    assert!(matches!(err, RequestError::InvalidUrl { .. }));
}
