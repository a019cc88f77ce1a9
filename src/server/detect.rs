//! TLS ClientHello detection on a freshly accepted socket.
//!
//! The detector reads just enough of the connection's opening bytes into a
//! sniff buffer to decide whether the peer is starting a TLS handshake or
//! speaking cleartext HTTP. The buffer is never consumed on behalf of the
//! downstream protocol stack: cleartext sessions take it over as their
//! initial read buffer, and TLS handshakes run over a [`ReplayStream`]
//! that serves the sniffed bytes before touching the socket again.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// TLS record content type of a handshake record.
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
/// Major byte of the record-layer protocol version (all of SSL 3.0
/// through TLS 1.3).
const RECORD_VERSION_MAJOR: u8 = 0x03;
/// Highest plausible minor byte of the record-layer version.
const RECORD_VERSION_MINOR_MAX: u8 = 0x04;
/// TLS handshake message type of a ClientHello.
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
/// Bytes needed for a definitive verdict: the 5-byte record header plus
/// the handshake message type.
const SNIFF_LEN: usize = 6;

/// Reads from `stream` into `buf` until the opening bytes classify as a
/// TLS ClientHello (`Ok(true)`) or as anything else (`Ok(false)`).
///
/// A peer that closes before sending enough bytes for a verdict is
/// classified as non-TLS. Bytes accumulated in `buf` are left untouched
/// for the caller to replay.
pub async fn detect_tls<S>(stream: &mut S, buf: &mut BytesMut) -> io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(verdict) = classify(buf) {
            return Ok(verdict);
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(false);
        }
    }
}

/// Classifies the buffered opening bytes, or returns `None` if more bytes
/// are needed. Rejects eagerly: the first byte that cannot belong to a
/// ClientHello settles the verdict.
fn classify(buf: &[u8]) -> Option<bool> {
    if buf.is_empty() {
        return None;
    }
    if buf[0] != CONTENT_TYPE_HANDSHAKE {
        return Some(false);
    }
    if buf.len() >= 2 && buf[1] != RECORD_VERSION_MAJOR {
        return Some(false);
    }
    if buf.len() >= 3 && buf[2] > RECORD_VERSION_MINOR_MAX {
        return Some(false);
    }
    if buf.len() < SNIFF_LEN {
        return None;
    }
    Some(buf[5] == HANDSHAKE_CLIENT_HELLO)
}

/// A stream adapter that yields buffered bytes before reading from the
/// inner stream. Writes pass straight through.
///
/// Used to hand the sniffed ClientHello to the TLS handshake exactly as it
/// arrived off the wire.
pub struct ReplayStream<S> {
    prefix: BytesMut,
    inner: S,
}

impl<S> ReplayStream<S> {
    pub fn new(prefix: BytesMut, inner: S) -> Self {
        Self { prefix, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
