//! Cleartext HTTP integration tests against a real listener.

mod http_test_support;

use http_test_support::{read_response, roundtrip, TestServer};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_cleartext_get_serves_home_page() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    let res = roundtrip(&mut stream, "GET / HTTP/1.1\r\nHost:x\r\n\r\n").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("text/html"));
    assert_eq!(res.body_text(), "<h1>hi</h1>");
    assert!(res
        .header("server")
        .is_some_and(|v| v.starts_with("lpbackend/")));

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_keep_alive_gets_are_byte_identical() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    let first = roundtrip(&mut stream, "GET /home.html HTTP/1.1\r\n\r\n").await;
    let second = roundtrip(&mut stream, "GET /home.html HTTP/1.1\r\n\r\n").await;
    assert_eq!(first.status, 200);
    assert_eq!(second.status, 200);
    assert_eq!(first.body, second.body);

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    let res = roundtrip(&mut stream, "GET /../etc/passwd HTTP/1.1\r\n\r\n").await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body_text(), "Illegal request-target");

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_missing_file_is_404_naming_the_target() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    let res = roundtrip(&mut stream, "GET /nope HTTP/1.1\r\n\r\n").await;
    assert_eq!(res.status, 404);
    assert!(res.body_text().contains("/nope"));

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_head_advertises_length_without_body() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    stream
        .write_all(b"HEAD /home.html HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let res = read_response(&mut stream, true).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-length"), Some("11"));
    assert!(res.body.is_empty());

    // The connection stays aligned: a follow-up GET works.
    let res = roundtrip(&mut stream, "GET /home.html HTTP/1.1\r\n\r\n").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "<h1>hi</h1>");

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_method_is_bad_request() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;

    let res = roundtrip(&mut stream, "DELETE / HTTP/1.1\r\n\r\n").await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body_text(), "Unknown HTTP-method");

    drop(stream);
    server.stop().await;
}
