use std::{
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use flate2::{
    write::{GzEncoder, ZlibEncoder},
    Compression,
};
use mirror_engine_http::{
    CustomHeader, RequestEngine, RequestOptions, ReqwestTransport, RetryPolicy, Transport,
    TransportFuture, TransportRequest,
};
use reqwest::Url;

const ORIGIN: &str = "https://mock.test";

#[derive(Clone)]
struct MockState {
    hits: Arc<AtomicUsize>,
    flaky_hits: Arc<AtomicUsize>,
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("must compress");
    encoder.finish().expect("must finish gzip")
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("must compress");
    encoder.finish().expect("must finish zlib")
}

fn redirect(status: StatusCode, location: &str) -> Response {
    (status, [(header::LOCATION, location.to_owned())], "moved").into_response()
}

fn header_or_dash(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_owned()
}

async fn dispatch(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let path = uri.path();

    if let Some(remaining) = path.strip_prefix("/hop/") {
        let remaining: u32 = remaining.parse().unwrap_or(0);
        return if remaining == 0 {
            "landed".into_response()
        } else {
            redirect(StatusCode::FOUND, &format!("/hop/{}", remaining - 1))
        };
    }

    match (method.as_str(), path) {
        ("GET", "/plain") => "abcd\n".into_response(),
        ("GET", "/gzip") => (
            [(header::CONTENT_ENCODING, "gzip")],
            gzip(b"gzip over the wire"),
        )
            .into_response(),
        ("GET", "/deflate") => (
            [(header::CONTENT_ENCODING, "deflate")],
            zlib(b"deflate over the wire"),
        )
            .into_response(),
        ("GET", "/brotli") => ([(header::CONTENT_ENCODING, "br")], "opaque").into_response(),
        ("GET", "/missing") => (StatusCode::NOT_FOUND, "not here").into_response(),
        ("GET", "/absolute") => redirect(StatusCode::MOVED_PERMANENTLY, "https://mock.test/plain"),
        ("GET", "/temporary") => redirect(StatusCode::TEMPORARY_REDIRECT, "/plain"),
        ("GET", "/evil") => redirect(StatusCode::FOUND, "http://evil.example/"),
        ("GET", "/flaky") => {
            if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
            } else {
                "steady".into_response()
            }
        }
        ("GET", "/headers") => format!(
            "{}|{}|{}|{}",
            header_or_dash(&headers, header::CACHE_CONTROL),
            header_or_dash(&headers, header::ACCEPT),
            header_or_dash(&headers, header::ACCEPT_ENCODING),
            header_or_dash(&headers, header::USER_AGENT),
        )
        .into_response(),
        ("POST" | "PUT", "/echo") => format!("{method} {body}").into_response(),
        _ => (StatusCode::NOT_FOUND, "no route").into_response(),
    }
}

struct TestServer {
    base_url: Url,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn spawn_server() -> TestServer {
    let state = MockState {
        hits: Arc::new(AtomicUsize::new(0)),
        flaky_hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new().fallback(dispatch).with_state(state.clone());

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
        base_url: Url::parse(&format!("http://{address}")).expect("must parse base url"),
        hits: state.hits,
        task,
    }
}

/// Sends `https://mock.test/...` requests to the local plaintext listener
/// through the real reqwest transport.
struct LoopbackTransport {
    inner: ReqwestTransport,
    base_url: Url,
}

impl Transport for LoopbackTransport {
    fn send(&self, mut request: TransportRequest) -> TransportFuture<'_> {
        let mut url = self.base_url.clone();
        url.set_path(request.url.path());
        url.set_query(request.url.query());
        request.url = url;
        self.inner.send(request)
    }
}

fn engine_for(server: &TestServer) -> RequestEngine<LoopbackTransport> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RequestEngine::with_transport(LoopbackTransport {
        inner: ReqwestTransport::new().expect("must build reqwest transport"),
        base_url: server.base_url.clone(),
    })
}

fn link(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

#[tokio::test]
async fn get_returns_identity_body() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine.get(&link("/plain"), RequestOptions::default()).await;

    assert_eq!(result.text(), Some("abcd\n"));
    assert_eq!(result.status(), Some(StatusCode::OK));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gzip_and_deflate_bodies_are_decoded() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let gzip = engine.get(&link("/gzip"), RequestOptions::default()).await;
    let deflate = engine.get(&link("/deflate"), RequestOptions::default()).await;

    assert_eq!(gzip.text(), Some("gzip over the wire"));
    assert_eq!(deflate.text(), Some("deflate over the wire"));
}

#[tokio::test]
async fn unknown_encoding_keeps_head_without_text() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine.get(&link("/brotli"), RequestOptions::default()).await;

    assert_eq!(result.status(), Some(StatusCode::OK));
    assert!(result.text().is_none());
    assert!(!result.redirect_refused());
}

#[tokio::test]
async fn not_found_requires_stubborn_for_text() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let strict = engine.get(&link("/missing"), RequestOptions::default()).await;
    let stubborn = engine
        .get(&link("/missing"), RequestOptions::new().stubborn())
        .await;

    assert_eq!(strict.status(), Some(StatusCode::NOT_FOUND));
    assert!(strict.text().is_none());
    assert_eq!(stubborn.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(stubborn.text(), Some("not here"));
}

#[tokio::test]
async fn plaintext_link_is_never_sent() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine
        .get("http://mock.test/plain", RequestOptions::new().error_suppress())
        .await;

    assert!(result.head().is_none());
    assert!(result.text().is_none());
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn absolute_and_temporary_redirects_are_followed() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let absolute = engine.get(&link("/absolute"), RequestOptions::default()).await;
    let temporary = engine.get(&link("/temporary"), RequestOptions::default()).await;

    assert_eq!(absolute.text(), Some("abcd\n"));
    assert_eq!(temporary.text(), Some("abcd\n"));
    assert_eq!(server.hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn four_hops_land_and_five_are_refused() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let landed = engine.get(&link("/hop/4"), RequestOptions::default()).await;
    assert_eq!(landed.text(), Some("landed"));
    assert_eq!(server.hits.load(Ordering::SeqCst), 5);

    let refused = engine.get(&link("/hop/5"), RequestOptions::default()).await;
    assert!(refused.redirect_refused());
    assert_eq!(refused.status(), Some(StatusCode::FOUND));
    assert!(refused.text().is_none());
    assert_eq!(server.hits.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn redirect_to_plaintext_is_refused_without_following() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine.get(&link("/evil"), RequestOptions::default()).await;

    assert!(result.redirect_refused());
    assert_eq!(result.status(), Some(StatusCode::FOUND));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_after_delay_recovers() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine
        .get(
            &link("/flaky"),
            RequestOptions::new().with_retry(RetryPolicy::tokio(Duration::from_millis(5))),
        )
        .await;

    assert_eq!(result.text(), Some("steady"));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert_eq!(engine.pending_requests(), 0);
}

#[tokio::test]
async fn failure_without_retry_is_final() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let result = engine.get(&link("/flaky"), RequestOptions::default()).await;

    assert_eq!(result.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(result.text().is_none());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_and_custom_headers_reach_the_server() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let defaults = engine.get(&link("/headers"), RequestOptions::default()).await;
    assert_eq!(
        defaults.text(),
        Some("no-cache|text/plain, text/*, */*;q=0.9|deflate, gzip, identity|-")
    );

    engine
        .set_header(CustomHeader::UserAgent, "mirror-engine/0.1")
        .expect("valid header");
    engine
        .set_header(CustomHeader::Accept, "application/vnd.github.v3.raw")
        .expect("valid header");
    let custom = engine.get(&link("/headers"), RequestOptions::default()).await;
    assert_eq!(
        custom.text(),
        Some("no-cache|application/vnd.github.v3.raw|deflate, gzip, identity|mirror-engine/0.1")
    );
}

#[tokio::test]
async fn post_and_put_send_payloads() {
    let server = spawn_server().await;
    let engine = engine_for(&server);

    let posted = engine
        .post(&link("/echo"), "plain body", RequestOptions::default())
        .await;
    let put = engine
        .put(
            &link("/echo"),
            serde_json::json!({"message": "sync"}),
            RequestOptions::default(),
        )
        .await;

    assert_eq!(posted.text(), Some("POST plain body"));
    assert_eq!(put.text(), Some(r#"PUT {"message":"sync"}"#));
}
