//! HTTP status mapping, error-body sanitization, and transport failures,
//! exercised against a canned TCP listener.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use draftsmith::conversation::state::{Role, Turn};
use draftsmith::service::{CallError, DraftBackend, HttpDraftService, ModelReply};

const CLARIFICATION_BODY: &str =
    r#"{"type":"clarification","questions":["Who is it for?","What platform?"]}"#;

fn idea_turns() -> Vec<Turn> {
    vec![Turn::new(Role::User, "a doorbell for dogs".to_owned())]
}

async fn serve_once(status_line: &str, body: &str) -> String {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };

    let status_line_owned = status_line.to_owned();
    let body_owned = body.to_owned();
    tokio::spawn(async move {
        let accepted = listener.accept().await;
        if let Ok((mut socket, _)) = accepted {
            drain_request(&mut socket).await;

            let response = format!(
                "HTTP/1.1 {status_line_owned}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
                body_owned.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{addr}/")
}

/// Read the whole request (headers plus declared body) before answering, so
/// the client never sees a reset from unread bytes.
async fn drain_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        received.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = header_end(&received) {
            if received.len().saturating_sub(header_end) >= declared_content_length(&received) {
                break;
            }
        }
    }
}

fn header_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|index| index.saturating_add(4))
}

fn declared_content_length(bytes: &[u8]) -> usize {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn clarification_reply_round_trips_over_http() {
    let url = serve_once("200 OK", CLARIFICATION_BODY).await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    match reply {
        Ok(ModelReply::Clarification { questions }) => assert_eq!(questions.len(), 2),
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limited_status_surfaces_as_http_429() {
    let url = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    assert_eq!(reply, Err(CallError::Http { status: 429 }));
}

#[tokio::test]
async fn server_error_status_surfaces_as_http_500() {
    let url = serve_once("500 Internal Server Error", "boom").await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    assert_eq!(reply, Err(CallError::Http { status: 500 }));
}

#[tokio::test]
async fn unprocessable_payload_reads_as_malformed_with_redaction() {
    let raw_token = "sk-abcdefghijklmnop1234";
    let body = format!("rejected request carrying {raw_token}");
    let url = serve_once("422 Unprocessable Entity", &body).await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    match reply {
        Err(CallError::Malformed(snippet)) => {
            assert!(!snippet.contains(raw_token));
            assert!(snippet.contains("[REDACTED]"));
        }
        other => panic!("expected malformed, got {other:?}"),
    }
}

#[tokio::test]
async fn long_error_body_is_truncated() {
    let body = "x".repeat(400);
    let url = serve_once("422 Unprocessable Entity", &body).await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    match reply {
        Err(CallError::Malformed(snippet)) => assert!(snippet.ends_with("...[truncated]")),
        other => panic!("expected malformed, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let url = serve_once("200 OK", "here is your document: it went great").await;
    let service = HttpDraftService::new(url, "test-key".to_owned());

    let reply = service.exchange(&idea_turns(), None).await;
    assert!(matches!(reply, Err(CallError::Malformed(_))));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };
    drop(listener);

    let service = HttpDraftService::new(format!("http://{addr}"), "test-key".to_owned());
    let reply = service.exchange(&idea_turns(), None).await;
    assert!(matches!(reply, Err(CallError::Network(_))));
}
