use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anthropic_api::{
    AnthropicApiClient, AnthropicApiConfig, AnthropicApiError, MessagePayload, MessagesRequest,
    MessagesStreamEvent,
};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("ANTHROPIC_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn client_for(server: &ScriptedServer) -> AnthropicApiClient {
    let config = AnthropicApiConfig::new("sk-test").with_base_url(&server.base_url);
    AnthropicApiClient::new(config).expect("client should build")
}

fn request() -> MessagesRequest {
    MessagesRequest::new("test-model", 1024).with_messages([MessagePayload::new("user", "hi")])
}

#[tokio::test]
async fn stream_integration_yields_text_deltas_and_message_stop() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(&[
        r##"{"type":"message_start","message":{"id":"msg_1","model":"test-model"}}"##,
        r##"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hello"}}"##,
        r##"{"type":"message_stop"}"##,
    ])])
    .await;

    let client = client_for(&server);
    let (mut events, handle) = client
        .stream_messages(&request())
        .await
        .expect("stream should open");

    let mut collected = Vec::new();
    while let Some(event) = events.next().await {
        collected.push(event.expect("scripted stream should not error"));
    }

    assert!(collected
        .iter()
        .any(|event| matches!(event, MessagesStreamEvent::TextDelta { text } if text == "hello")));
    assert_eq!(collected.last(), Some(&MessagesStreamEvent::MessageStop));

    handle.shutdown().await;
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_retryable_then_success() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(
            529,
            r##"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"##,
        ),
        response_sse(&[r##"{"type":"message_stop"}"##]),
    ])
    .await;

    let client = client_for(&server);
    let (mut events, handle) = timeout(Duration::from_secs(12), client.stream_messages(&request()))
        .await
        .expect("retry path should be bounded")
        .expect("stream should eventually open");

    let last = events.next().await;
    assert!(matches!(last, Some(Ok(MessagesStreamEvent::MessageStop))));
    assert_eq!(server.request_count(), 2);

    handle.shutdown().await;
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_non_retryable_status_fails_explicitly() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        400,
        r##"{"type":"error","error":{"type":"invalid_request_error","message":"bad request"}}"##,
    )])
    .await;

    let client = client_for(&server);
    let error = client
        .stream_messages(&request())
        .await
        .expect_err("stream should fail");

    assert!(
        matches!(error, AnthropicApiError::Status(code, message) if code.as_u16() == 400 && message == "bad request")
    );
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_error_frame_surfaces_as_stream_failure() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(&[
        r##"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"##,
        r##"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"##,
    ])])
    .await;

    let client = client_for(&server);
    let (mut events, handle) = client
        .stream_messages(&request())
        .await
        .expect("stream should open");

    assert!(matches!(
        events.next().await,
        Some(Ok(MessagesStreamEvent::TextDelta { text })) if text == "partial"
    ));
    assert!(matches!(
        events.next().await,
        Some(Err(AnthropicApiError::StreamFailed { message, .. })) if message == "Overloaded"
    ));
    assert!(events.next().await.is_none(), "stream ends after failure");

    handle.shutdown().await;
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_shutdown_stops_delivery_mid_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[
                    r##"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"early"}}"##,
                ]),
            },
            ResponseChunk {
                delay_ms: 300,
                bytes: sse_frames(&[
                    r##"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"late"}}"##,
                    r##"{"type":"message_stop"}"##,
                ]),
            },
        ],
    }])
    .await;

    let client = client_for(&server);
    let (mut events, handle) = client
        .stream_messages(&request())
        .await
        .expect("stream should open");

    assert!(matches!(
        events.next().await,
        Some(Ok(MessagesStreamEvent::TextDelta { text })) if text == "early"
    ));

    handle.shutdown().await;

    // The forwarding task is gone; the channel drains without the late delta.
    sleep(Duration::from_millis(400)).await;
    assert!(events.next().await.is_none());

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        429 => "Too Many Requests",
        529 => "Overloaded",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r##"{"error":"unexpected request"}"##));

    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        response.status,
        status_reason(response.status),
        response.content_type,
    );

    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
