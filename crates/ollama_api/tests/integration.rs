use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use ollama_api::{ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("OLLAMA_API_ALLOW_LOCAL_INTEGRATION")
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

fn ndjson_response(status: u16, lines: &[&str]) -> ScriptedResponse {
    let mut body = String::new();
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }

    ScriptedResponse {
        status,
        content_type: "application/x-ndjson",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.into_bytes(),
        }],
    }
}

fn client_for(server: &ScriptedServer) -> ChatApiClient {
    ChatApiClient::new(ChatApiConfig::new(&server.base_url)).expect("client")
}

#[tokio::test]
async fn stream_integration_collects_deltas_in_order() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ndjson_response(
        200,
        &[
            r#"{"message":{"role":"assistant","content":"Hel"}}"#,
            r#"{"message":{"role":"assistant","content":"lo"}}"#,
            r#"{"done":true}"#,
        ],
    )])
    .await;

    let request = ChatRequest::user_turn("llama3", "hi");
    let outcome = client_for(&server)
        .stream(&request, None)
        .await
        .expect("stream should succeed");

    assert_eq!(outcome.deltas, vec!["Hel", "lo"]);
    assert_eq!(outcome.stats.deltas, 2);
    assert_eq!(outcome.stats.skipped, 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_reassembles_record_split_across_network_chunks() {
    if !allow_local_integration() {
        return;
    }

    // One record split mid-line and mid-UTF-8 ("é" is 0xC3 0xA9).
    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "application/x-ndjson",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: b"{\"message\":{\"content\":\"caf\xC3".to_vec(),
            },
            ResponseChunk {
                delay_ms: 20,
                bytes: b"\xA9\"}}\n{\"done\":true}\n".to_vec(),
            },
        ],
    }])
    .await;

    let request = ChatRequest::user_turn("llama3", "hi");
    let outcome = client_for(&server)
        .stream(&request, None)
        .await
        .expect("stream should succeed");

    assert_eq!(outcome.deltas, vec!["caf\u{e9}"]);
    assert_eq!(outcome.stats.malformed, 0);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_skips_malformed_lines_and_continues() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ndjson_response(
        200,
        &[
            r#"{"message":{"content":"A"}}"#,
            "not json",
            r#"{"message":{"content":"B"}}"#,
        ],
    )])
    .await;

    let request = ChatRequest::user_turn("llama3", "hi");
    let outcome = client_for(&server)
        .stream(&request, None)
        .await
        .expect("stream should succeed");

    assert_eq!(outcome.deltas, vec!["A", "B"]);
    assert_eq!(outcome.stats.malformed, 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_error_status_surfaces_error_body() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ndjson_response(
        404,
        &[r#"{"error":"model 'llama3' not found"}"#],
    )])
    .await;

    let request = ChatRequest::user_turn("llama3", "hi");
    let error = client_for(&server)
        .stream(&request, None)
        .await
        .expect_err("stream should fail");

    assert!(
        matches!(error, ChatApiError::Status(code, ref message) if code.as_u16() == 404 && message.contains("not found"))
    );
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_cancellation_during_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "application/x-ndjson",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: b"{\"message\":{\"content\":\"stream\"}}\n".to_vec(),
            },
            ResponseChunk {
                delay_ms: 300,
                bytes: b"{\"done\":true}\n".to_vec(),
            },
        ],
    }])
    .await;

    let client = Arc::new(client_for(&server));
    let request = ChatRequest::user_turn("llama3", "hi");

    let cancellation = Arc::new(AtomicBool::new(false));
    let stream_task = tokio::spawn({
        let client = Arc::clone(&client);
        let request = request.clone();
        let cancellation = Arc::clone(&cancellation);
        async move { client.stream(&request, Some(&cancellation)).await }
    });

    sleep(Duration::from_millis(120)).await;
    cancellation.store(true, Ordering::Release);

    let result = timeout(Duration::from_secs(5), stream_task)
        .await
        .expect("stream task should resolve")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort stream");

    assert!(matches!(result, ChatApiError::Cancelled));
    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
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
    let response = scripts.get(index).cloned().unwrap_or_else(|| ScriptedResponse {
        status: 500,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: br#"{"error":"unexpected request"}"#.to_vec(),
        }],
    });

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
