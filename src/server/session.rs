//! Per-connection session pipeline.
//!
//! Each accepted socket runs one session: protocol detection on the
//! opening bytes, an optional TLS handshake, then a keep-alive HTTP
//! request/response loop until the peer closes, keep-alive ends, or the
//! session is cancelled.
//!
//! ## Cancellation posture
//!
//! A cooperative (total) stop is only polled between requests: a response
//! that is being written always completes, and the TLS close sequence
//! still runs after the loop exits. Terminal cancellation races every
//! await through [`ChildToken::abortable`] and surfaces as
//! [`SessionError::Aborted`].

mod error;

pub use error::SessionError;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::http::request::Request;
use crate::http::response::{Response, Status};
use crate::http::ParseError;
use crate::server::detect::{detect_tls, ReplayStream};
use crate::server::handler;
use crate::task_group::ChildToken;

/// Wall-clock bound on protocol detection and the TLS handshake. Expiry
/// is handled like a client disconnect.
const DETECT_DEADLINE: Duration = Duration::from_secs(30);

/// Chunk size used when discarding request bodies.
const BODY_DISCARD_CHUNK: usize = 8 * 1024;

/// The collaborators a session needs, shared across all sessions.
pub struct SessionContext {
    pub doc_root: PathBuf,
    pub fallback_file: String,
    pub force_ssl: bool,
    pub tls: Option<TlsAcceptor>,
}

/// Runs a full session on an accepted socket: detect, handshake, serve,
/// clean up.
pub async fn serve(
    socket: TcpStream,
    ctx: &SessionContext,
    token: ChildToken,
) -> Result<(), SessionError> {
    let mut stream = socket;
    let mut sniff = BytesMut::with_capacity(1024);

    // One deadline covers the whole pre-HTTP phase: sniffing and, for TLS
    // connections, the handshake that follows.
    let detect_deadline = Instant::now() + DETECT_DEADLINE;

    let detected = match token
        .abortable(timeout_at(detect_deadline, detect_tls(&mut stream, &mut sniff)))
        .await
    {
        None => return Err(SessionError::Aborted),
        Some(Err(_)) => {
            debug!("protocol detection timed out");
            return Ok(());
        }
        Some(Ok(Err(e))) => return Err(e.into()),
        Some(Ok(Ok(detected))) => detected,
    };

    if detected {
        let Some(acceptor) = ctx.tls.clone() else {
            error!("closing TLS connection: HTTPS is disabled");
            return Ok(());
        };
        let replay = ReplayStream::new(sniff, stream);
        let mut tls_stream = match token
            .abortable(timeout_at(detect_deadline, acceptor.accept(replay)))
            .await
        {
            None => return Err(SessionError::Aborted),
            Some(Err(_)) => {
                debug!("TLS handshake timed out");
                return Ok(());
            }
            Some(Ok(Err(e))) => return Err(e.into()),
            Some(Ok(Ok(stream))) => stream,
        };

        info!("accepting incoming HTTPS connection");
        let served = run_http(&mut tls_stream, BytesMut::new(), ctx, &token).await;
        let shut = shutdown_tls(&mut tls_stream, &token).await;
        served.and(shut)
    } else if !ctx.force_ssl {
        info!("accepting incoming HTTP connection");
        run_http(&mut stream, sniff, ctx, &token).await
    } else {
        error!("rejecting incoming HTTP connection (forcing SSL)");
        let _ = stream.shutdown().await;
        Ok(())
    }
}

/// The keep-alive HTTP loop. `buf` carries any bytes the detector already
/// pulled off the wire.
async fn run_http<S>(
    stream: &mut S,
    mut buf: BytesMut,
    ctx: &SessionContext,
    token: &ChildToken,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while !token.is_cancelled() {
        let req = match read_request(stream, &mut buf, token).await? {
            ReadOutcome::Eof => return Ok(()),
            ReadOutcome::Malformed(e) => {
                debug!("malformed request: {}", e);
                let mut res = Response::text(Status::BadRequest, "Bad request", false);
                write_response(stream, &mut res, token).await?;
                return Ok(());
            }
            ReadOutcome::Request(req) => req,
        };

        if req.is_upgrade() {
            // WebSocket sessions are not handled yet; this is the hook
            // where an upgrade handler would take over the stream.
            debug!("closing connection on websocket upgrade request");
            return Ok(());
        }

        let mut res = handler::build_response(&req, &ctx.doc_root, &ctx.fallback_file).await;
        let keep_alive = res.keep_alive;
        write_response(stream, &mut res, token).await?;
        if !keep_alive {
            return Ok(());
        }
    }
    Ok(())
}

enum ReadOutcome {
    Request(Request),
    /// The peer closed cleanly between requests.
    Eof,
    /// The head could not be parsed; answered with a 400 and close.
    Malformed(ParseError),
}

async fn read_request<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    token: &ChildToken,
) -> Result<ReadOutcome, SessionError>
where
    S: AsyncRead + Unpin,
{
    let req = loop {
        match Request::parse(buf) {
            Err(e) => return Ok(ReadOutcome::Malformed(e)),
            Ok(Some(req)) => break req,
            Ok(None) => {
                let n = match token.abortable(stream.read_buf(buf)).await {
                    None => return Err(SessionError::Aborted),
                    Some(n) => n?,
                };
                if n == 0 {
                    if buf.is_empty() {
                        return Ok(ReadOutcome::Eof);
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-request",
                    )
                    .into());
                }
            }
        }
    };

    if req.is_chunked() {
        return Ok(ReadOutcome::Malformed(ParseError::UnsupportedTransferEncoding));
    }
    let body_len = match req.content_length() {
        Ok(len) => len,
        Err(e) => return Ok(ReadOutcome::Malformed(e)),
    };
    drain_body(stream, buf, body_len, token).await?;
    Ok(ReadOutcome::Request(req))
}

/// Discards a declared request body so keep-alive framing stays aligned.
async fn drain_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    mut remaining: u64,
    token: &ChildToken,
) -> Result<(), SessionError>
where
    S: AsyncRead + Unpin,
{
    let buffered = remaining.min(buf.len() as u64) as usize;
    buf.advance(buffered);
    remaining -= buffered as u64;

    let mut chunk = [0u8; BODY_DISCARD_CHUNK];
    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        let n = match token.abortable(stream.read(&mut chunk[..want])).await {
            None => return Err(SessionError::Aborted),
            Some(n) => n?,
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            )
            .into());
        }
        remaining -= n as u64;
    }
    Ok(())
}

async fn write_response<S>(
    stream: &mut S,
    res: &mut Response,
    token: &ChildToken,
) -> Result<(), SessionError>
where
    S: AsyncWrite + Unpin,
{
    match token.abortable(res.write_to(stream)).await {
        None => Err(SessionError::Aborted),
        Some(result) => result.map_err(Into::into),
    }
}

/// Closes the TLS layer. A peer that drops the connection without a
/// close_notify surfaces as a truncated stream and counts as success.
async fn shutdown_tls<S>(stream: &mut S, token: &ChildToken) -> Result<(), SessionError>
where
    S: AsyncWrite + Unpin,
{
    match token.abortable(stream.shutdown()).await {
        None => Err(SessionError::Aborted),
        Some(Ok(())) => Ok(()),
        Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
        Some(Err(e)) => Err(e.into()),
    }
}
