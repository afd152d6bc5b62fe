use std::net::SocketAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use colloquy::{
    BedrockTransport, BufferRenderer, ConversationSession, Error, History, InferenceTransport,
    LanguageDirective, ProviderCatalog, RequestAdapter, extract_text,
};

/// Encodes an event-stream frame with string headers.  CRCs are left zero.
fn frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }
    let total = 12 + header_bytes.len() + payload.len() + 4;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}

fn chunk_frame(json: &str) -> Vec<u8> {
    let payload = format!(r#"{{"bytes":"{}"}}"#, STANDARD.encode(json));
    frame(
        &[(":message-type", "event"), (":event-type", "chunk")],
        payload.as_bytes(),
    )
}

fn exception_frame(kind: &str, message: &str) -> Vec<u8> {
    let payload = format!(r#"{{"message":"{message}"}}"#);
    frame(
        &[(":message-type", "exception"), (":exception-type", kind)],
        payload.as_bytes(),
    )
}

/// The request as seen by the server.
struct Captured {
    head: String,
    body: Vec<u8>,
}

/// Serves exactly one HTTP response and reports the request it answered.
async fn serve_once(
    status: &'static str,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
) -> (SocketAddr, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        let (head, body_start) = loop {
            let n = socket.read(&mut tmp).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break (String::from_utf8_lossy(&buf[..pos]).into_owned(), pos + 4);
            }
        };
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < body_start + content_length {
            let n = socket.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
        }
        let request_body = buf[body_start..].to_vec();

        let mut response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
        let _ = tx.send(Captured {
            head,
            body: request_body,
        });
    });
    (addr, rx)
}

fn transport(addr: SocketAddr) -> BedrockTransport {
    BedrockTransport::with_options(Some("test-token".to_string()), Some(format!("http://{addr}/")), None)
        .unwrap()
}

#[tokio::test]
async fn streams_chunks_over_http() {
    let mut body = chunk_frame(r#"{"generation":"你"}"#);
    body.extend(frame(&[(":message-type", "event"), (":event-type", "metadata")], b"{}"));
    body.extend(chunk_frame(r#"{"generation":"好"}"#));
    let (addr, captured) = serve_once(
        "200 OK",
        vec![("content-type", "application/vnd.amazon.eventstream".to_string())],
        body,
    )
    .await;

    let spec = ProviderCatalog::global()
        .lookup("meta.llama3-8b-instruct-v1:0")
        .unwrap();
    let payload = RequestAdapter::new(LanguageDirective::disabled())
        .build_payload(spec, "hi", &History::default(), None)
        .unwrap();
    let stream = transport(addr).open_stream(spec, &payload).await.unwrap();
    let chunks: Vec<_> = stream.collect().await;
    let texts: Vec<String> = chunks
        .into_iter()
        .map(|chunk| extract_text(spec, chunk.unwrap().as_bytes()).unwrap())
        .collect();
    assert_eq!(texts, vec!["你", "好"]);

    let captured = captured.await.unwrap();
    let head = captured.head.to_ascii_lowercase();
    assert!(head.starts_with(
        "post /model/meta.llama3-8b-instruct-v1:0/invoke-with-response-stream http/1.1"
    ));
    assert!(head.contains("authorization: bearer test-token"));
    assert!(head.contains("x-amzn-bedrock-accept: application/json"));
    assert!(head.contains("content-type: application/json"));
    let sent: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(sent, serde_json::to_value(&payload).unwrap());
}

#[tokio::test]
async fn session_over_http() {
    let mut body = chunk_frame(r#"{"outputText":"Hello"}"#);
    body.extend(chunk_frame(r#"{"outputText":" there"}"#));
    let (addr, _captured) = serve_once("200 OK", Vec::new(), body).await;

    let spec = ProviderCatalog::global()
        .lookup("amazon.titan-text-lite-v1")
        .unwrap()
        .clone();
    let mut session = ConversationSession::new(spec, std::sync::Arc::new(transport(addr)));
    let mut renderer = BufferRenderer::new();
    let outcome = session.process_turn("hi", &mut renderer).await.unwrap();
    assert_eq!(outcome.reply, "Hello there");
    assert_eq!(renderer.fragments, vec!["Hello", " there"]);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn exception_frame_ends_the_stream_with_an_error() {
    let mut body = chunk_frame(r#"{"completion":" partial"}"#);
    body.extend(exception_frame("throttlingException", "Too many requests"));
    let (addr, _captured) = serve_once("200 OK", Vec::new(), body).await;

    let spec = ProviderCatalog::global()
        .lookup("anthropic.claude-instant-v1")
        .unwrap()
        .clone();
    let mut session = ConversationSession::new(spec, std::sync::Arc::new(transport(addr)));
    let mut renderer = BufferRenderer::new();
    let err = session.process_turn("hi", &mut renderer).await.unwrap_err();
    assert!(matches!(err, Error::RateLimit { .. }), "{err:?}");
    assert_eq!(renderer.text(), " partial");
    assert_eq!(session.history().turns()[1].content, " partial");
}

#[tokio::test]
async fn error_status_maps_to_error_kind() {
    let cases = [
        ("403 Forbidden", "AccessDeniedException", "denied"),
        ("429 Too Many Requests", "ThrottlingException", "slow down"),
        ("400 Bad Request", "ValidationException", "bad body"),
    ];
    for (status, kind, message) in cases {
        let (addr, _captured) = serve_once(
            status,
            vec![
                ("x-amzn-errortype", format!("{kind}:http://internal.amazon.com/")),
                ("x-amzn-requestid", "req-1".to_string()),
                ("content-type", "application/json".to_string()),
            ],
            format!(r#"{{"message":"{message}"}}"#).into_bytes(),
        )
        .await;
        let spec = ProviderCatalog::global()
            .lookup("amazon.titan-text-express-v1")
            .unwrap();
        let payload = RequestAdapter::default()
            .build_payload(spec, "hi", &History::default(), None)
            .unwrap();
        let err = match transport(addr).open_stream(spec, &payload).await {
            Ok(_) => panic!("{status} should fail"),
            Err(err) => err,
        };
        assert!(err.is_transport(), "{status}: {err:?}");
        assert!(err.to_string().contains(message), "{status}: {err}");
        match status {
            "403 Forbidden" => assert!(matches!(err, Error::Permission { .. })),
            "429 Too Many Requests" => assert!(matches!(err, Error::RateLimit { .. })),
            _ => assert!(matches!(err, Error::BadRequest { .. })),
        }
    }
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let spec = ProviderCatalog::global()
        .lookup("amazon.titan-text-express-v1")
        .unwrap();
    let payload = RequestAdapter::default()
        .build_payload(spec, "hi", &History::default(), None)
        .unwrap();
    let err = match transport(addr).open_stream(spec, &payload).await {
        Ok(_) => panic!("nothing is listening"),
        Err(err) => err,
    };
    assert!(err.is_transport(), "{err:?}");
}
