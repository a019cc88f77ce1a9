//! Test utilities for server integration tests.
//!
//! Provides a wrapper that runs a real server on an ephemeral port, plus
//! a small HTTP client for asserting on raw responses.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use lpbackend::config::Config;
use lpbackend::server::{Server, Shutdown};

/// A server running on an ephemeral port, torn down via [`stop`].
///
/// The document root is a temporary directory pre-seeded with a
/// `home.html` containing `<h1>hi</h1>`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Server,
    pub doc_root: PathBuf,
    _dir: TempDir,
    handle: JoinHandle<Result<Shutdown, std::io::Error>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Starts a server after letting `configure` adjust the defaults.
    /// TLS material referenced by the configuration must already exist.
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.networking.listen_address = "127.0.0.1".to_string();
        config.http.doc_root = dir.path().join("docroot");
        configure(&mut config);

        let doc_root = config.http.doc_root.clone();
        std::fs::create_dir_all(&doc_root).unwrap();
        std::fs::write(doc_root.join("home.html"), "<h1>hi</h1>").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Server::new(config).unwrap();
        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.run(listener).await })
        };

        TestServer {
            addr,
            server,
            doc_root,
            _dir: dir,
            handle,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Opens a TLS connection that accepts whatever certificate the
    /// server presents.
    pub async fn connect_tls(&self) -> TlsStream<TcpStream> {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let stream = TcpStream::connect(self.addr).await.unwrap();
        connector
            .connect(ServerName::try_from("localhost".to_string()).unwrap(), stream)
            .await
            .unwrap()
    }

    /// Gracefully stops the server and returns how the run ended.
    pub async fn stop(self) -> Shutdown {
        self.server.stop().await;
        self.handle.await.unwrap().unwrap()
    }
}

/// Writes self-signed TLS material for `localhost` into `dir` and returns
/// the certificate and key paths.
pub fn write_self_signed_cert(dir: &std::path::Path) -> (PathBuf, PathBuf) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.cert.pem()).unwrap();
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();
    (cert_path, key_path)
}

/// A parsed HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

/// Sends `request` and reads one full response (head plus declared body).
pub async fn roundtrip<S>(stream: &mut S, request: &str) -> HttpResponse
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await.unwrap();
    read_response(stream, false).await
}

/// Reads one response off the stream. For responses to `HEAD` requests
/// pass `head_only` so the declared `Content-Length` is not read.
pub async fn read_response<S>(stream: &mut S, head_only: bool) -> HttpResponse
where
    S: AsyncRead + Unpin,
{
    try_read_response(stream, head_only)
        .await
        .expect("stream closed before a response arrived")
}

/// Like [`read_response`], but returns `None` when the stream closes
/// before the first response byte. A close in the middle of a response
/// still panics: a started response must always arrive complete.
pub async fn try_read_response<S>(stream: &mut S, head_only: bool) -> Option<HttpResponse>
where
    S: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let mut chunk = [0u8; 4096];
        // A connection torn down between responses (EOF, or a reset when
        // the peer closed with a pipelined request in flight) is a clean
        // "no response"; anything after response bytes started is not.
        let n = match stream.read(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                assert!(raw.is_empty(), "read failed mid-head: {}", e);
                return None;
            }
        };
        if n == 0 {
            assert!(raw.is_empty(), "stream closed mid-head: {:?}", raw);
            return None;
        }
        raw.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
    let mut lines = head.lines();
    let status_line = lines.next().unwrap();
    let status: u16 = status_line
        .split(' ')
        .nth(1)
        .expect("status line should carry a code")
        .parse()
        .unwrap();
    let headers: Vec<(String, String)> = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| {
            line.split_once(':')
                .map(|(n, v)| (n.to_string(), v.trim().to_string()))
        })
        .collect();

    let mut body = raw[head_end..].to_vec();
    if !head_only {
        let content_length: usize = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse().unwrap())
            .unwrap_or(0);
        while body.len() < content_length {
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream closed before response body completed");
            body.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(body.len(), content_length, "body overrun");
    }

    Some(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Certificate verifier that accepts anything; only for tests against a
/// server using a freshly generated self-signed certificate.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
