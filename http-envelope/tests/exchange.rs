// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! End to end exchanges against a loopback server holding the private key.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto::{
    decrypt,
    rsa::{PaddingMode, RSAKeyPair},
    WrapType,
};
use http_envelope::{
    config::PaddingRange,
    envelope::seal_reply,
    key_manager::{fingerprint, KeyOrigin},
    Body, EnvelopeClientBuilder, EnvelopeConfig, Error, KeyState,
};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use zeroize::Zeroizing;

const KEY_PATH: &str = "/v1/init";

fn server_keypair() -> &'static RSAKeyPair {
    static KEYPAIR: OnceLock<RSAKeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| RSAKeyPair::with_bits(1024).expect("generate rsa key"))
}

/// The PEM as the key endpoint puts it on the wire: newlines escaped.
fn wire_pem() -> String {
    server_keypair()
        .public_key_pem()
        .expect("export pem")
        .replace('\n', "\\n")
}

struct RawRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

impl RawRequest {
    fn unwrap_header(&self, name: &str) -> Vec<u8> {
        let wrapped = STANDARD.decode(&self.headers[name]).expect("header is base64");
        server_keypair()
            .decrypt(PaddingMode::OAEP, &wrapped)
            .expect("unwrap header")
    }

    fn material(&self) -> (Vec<u8>, Vec<u8>) {
        (
            self.unwrap_header("x-request-context"),
            self.unwrap_header("x-client-ref"),
        )
    }

    fn opened_body(&self) -> Value {
        let (key, iv) = self.material();
        let ciphertext = STANDARD.decode(&self.body).expect("body is base64");
        let plaintext = decrypt(Zeroizing::new(key), ciphertext, iv, WrapType::Aes256Gcm)
            .expect("open request body");
        let plaintext = String::from_utf8(plaintext).unwrap();
        let (payload, _padding) = plaintext.split_once("||").unwrap();
        serde_json::from_str(payload).unwrap()
    }
}

struct RawResponse {
    status: &'static str,
    headers: Vec<(String, String)>,
    body: String,
}

impl RawResponse {
    fn empty(status: &'static str) -> Self {
        Self {
            status,
            headers: vec![],
            body: String::new(),
        }
    }

    fn public_key() -> Self {
        Self {
            status: "200 OK",
            headers: vec![("X-Client-Init".into(), wire_pem())],
            body: String::new(),
        }
    }

    /// Seal `payload` for the client that sent `request`.
    fn sealed(status: &'static str, request: &RawRequest, payload: Value) -> Self {
        let (key, iv) = request.material();
        let body = seal_reply(&payload, &key, &iv, PaddingRange::default()).unwrap();
        Self {
            status,
            headers: vec![
                ("X-Request-Context".into(), STANDARD.encode(&key)),
                ("X-Client-Ref".into(), STANDARD.encode(&iv)),
                ("Content-Type".into(), "text/plain".into()),
            ],
            body,
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RawRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|len| len.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RawRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

async fn write_response(stream: &mut TcpStream, response: RawResponse) {
    let mut out = format!("HTTP/1.1 {}\r\n", response.status);
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.body.len(),
        response.body
    ));
    let _ = stream.write_all(out.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Serve `handler` on a loopback port. Returns the base url and a counter
/// of handled requests.
async fn serve<F>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(RawRequest) -> RawResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handled = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let counter = handled.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut stream).await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    write_response(&mut stream, handler(request)).await;
                }
            });
        }
    });

    (format!("http://{addr}"), handled)
}

fn remote_config(base: &str) -> EnvelopeConfig {
    EnvelopeConfig {
        key_endpoint: Some(format!("{base}{KEY_PATH}")),
        public_key_hash: Some(fingerprint(&wire_pem())),
        include_endpoints: vec!["/v1/private/*".into(), "/v1/users/{ignore}/orders".into()],
        skip_endpoints: vec!["/v1/private/health".into()],
        ..Default::default()
    }
}

#[tokio::test]
async fn fetch_key_and_open_sealed_reply() {
    let (base, _) = serve(|request| match request.path.as_str() {
        KEY_PATH => RawResponse::public_key(),
        "/v1/private/data" => {
            assert_eq!(request.method, "GET");
            RawResponse::sealed("200 OK", &request, json!({"balance": 42}))
        }
        _ => RawResponse::empty("404 Not Found"),
    })
    .await;

    let client = EnvelopeClientBuilder::new(remote_config(&base))
        .build()
        .unwrap();
    client.initialize().await.unwrap();

    let manager = client.key_manager();
    assert_eq!(manager.state(), KeyState::Ready);
    assert_eq!(manager.active_key().unwrap().origin, KeyOrigin::Remote);

    let res = client
        .get(&format!("{base}/v1/private/data"))
        .await
        .unwrap();
    assert_eq!(res.status.as_u16(), 200);
    assert_eq!(res.body, Body::Json(json!({"balance": 42})));
}

#[tokio::test]
async fn sealed_post_with_sealed_error() {
    let (base, _) = serve(|request| match request.path.as_str() {
        KEY_PATH => RawResponse::public_key(),
        "/v1/users/7/orders" => {
            assert_eq!(request.headers["content-type"], "text/plain");
            assert_eq!(request.opened_body(), json!({"amount": -5}));
            RawResponse::sealed(
                "400 Bad Request",
                &request,
                json!({"code": "INVALID_AMOUNT", "message": "amount must be positive"}),
            )
        }
        _ => RawResponse::empty("404 Not Found"),
    })
    .await;

    let client = EnvelopeClientBuilder::new(remote_config(&base))
        .build()
        .unwrap();
    client.initialize().await.unwrap();

    let err = client
        .post_json(&format!("{base}/v1/users/7/orders"), &json!({"amount": -5}))
        .await
        .unwrap_err();
    let Error::Status(err) = err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(err.status.as_u16(), 400);
    assert_eq!(err.field("code"), Some(&json!("INVALID_AMOUNT")));
    assert_eq!(err.field("message"), Some(&json!("amount must be positive")));
}

#[tokio::test]
async fn skipped_endpoint_stays_plain() {
    let (base, _) = serve(|request| match request.path.as_str() {
        KEY_PATH => RawResponse::public_key(),
        "/v1/private/health" => {
            assert!(!request.headers.contains_key("x-request-context"));
            assert_eq!(request.body, r#"{"ping":true}"#);
            RawResponse {
                status: "200 OK",
                headers: vec![("Content-Type".into(), "application/json".into())],
                body: r#"{"ok":true}"#.into(),
            }
        }
        _ => RawResponse::empty("404 Not Found"),
    })
    .await;

    let client = EnvelopeClientBuilder::new(remote_config(&base))
        .build()
        .unwrap();
    client.initialize().await.unwrap();

    let res = client
        .post_json(&format!("{base}/v1/private/health"), &json!({"ping": true}))
        .await
        .unwrap();
    assert_eq!(res.body, Body::Json(json!({"ok": true})));
}

#[tokio::test]
async fn missing_key_header_is_not_retried() {
    let (base, handled) = serve(|_| RawResponse::empty("200 OK")).await;

    let client = EnvelopeClientBuilder::new(remote_config(&base))
        .build()
        .unwrap();
    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, Error::MissingKeyHeader { .. }), "{err}");
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(client.key_manager().state(), KeyState::Failed);

    let res = client
        .post_json(&format!("{base}/v1/private/data"), &json!({"a": 1}))
        .await;
    assert!(matches!(res, Err(Error::KeyUnavailable(KeyState::Failed))));
}
