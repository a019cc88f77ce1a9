use std::io;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// `Server` header value advertised on every response.
pub const SERVER_NAME: &str = concat!("lpbackend/", env!("CARGO_PKG_VERSION"));

/// Chunk size used when streaming a file body to the peer.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Response status. Only the statuses the serving path produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Response payload.
///
/// A response is one of three shapes: no body (HEAD), an in-memory text
/// body (error pages), or a file streamed from disk (GET). Writing is a
/// single capability on [`Response`] regardless of the shape.
pub enum Body {
    Empty,
    Text(String),
    File(File),
}

/// A response ready to be written to the peer.
pub struct Response {
    pub status: Status,
    pub content_type: String,
    pub content_length: u64,
    pub keep_alive: bool,
    pub body: Body,
}

impl Response {
    /// An error or diagnostic page with an in-memory body.
    pub fn text(status: Status, body: impl Into<String>, keep_alive: bool) -> Response {
        let body = body.into();
        Response {
            status,
            content_type: "text/html".to_string(),
            content_length: body.len() as u64,
            keep_alive,
            body: Body::Text(body),
        }
    }

    /// A `200 OK` streaming the given file as its body.
    pub fn file(file: File, len: u64, content_type: String, keep_alive: bool) -> Response {
        Response {
            status: Status::Ok,
            content_type,
            content_length: len,
            keep_alive,
            body: Body::File(file),
        }
    }

    /// A `200 OK` advertising `len` bytes without sending them (HEAD).
    pub fn empty(len: u64, content_type: String, keep_alive: bool) -> Response {
        Response {
            status: Status::Ok,
            content_type,
            content_length: len,
            keep_alive,
            body: Body::Empty,
        }
    }

    /// Writes the complete response, head then body, and flushes.
    ///
    /// File bodies are streamed in chunks and never fully buffered. At most
    /// `content_length` bytes are sent even if the file has grown since it
    /// was opened, so keep-alive framing stays intact.
    pub async fn write_to<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let head = format!(
            "HTTP/1.1 {} {}\r\nServer: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            SERVER_NAME,
            self.content_type,
            self.content_length,
            if self.keep_alive { "keep-alive" } else { "close" },
        );
        stream.write_all(head.as_bytes()).await?;

        match &mut self.body {
            Body::Empty => {}
            Body::Text(text) => stream.write_all(text.as_bytes()).await?,
            Body::File(file) => {
                let mut remaining = self.content_length;
                let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
                while remaining > 0 {
                    let want = remaining.min(chunk.len() as u64) as usize;
                    let n = file.read(&mut chunk[..want]).await?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "file shrank while streaming response body",
                        ));
                    }
                    stream.write_all(&chunk[..n]).await?;
                    remaining -= n as u64;
                }
            }
        }

        stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn render(mut res: Response) -> String {
        let mut out = Cursor::new(Vec::new());
        res.write_to(&mut out).await.unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_text_response_framing() {
        let out = render(Response::text(Status::NotFound, "missing", true)).await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Content-Type: text/html\r\n"));
        assert!(out.contains("Content-Length: 7\r\n"));
        assert!(out.contains("Connection: keep-alive\r\n"));
        assert!(out.ends_with("\r\n\r\nmissing"));
    }

    #[tokio::test]
    async fn test_empty_response_advertises_length_without_body() {
        let out = render(Response::empty(1234, "text/plain".to_string(), false)).await;
        assert!(out.contains("Content-Length: 1234\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_file_response_streams_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.txt");
        std::fs::write(&path, b"0123456789").unwrap();

        let file = File::open(&path).await.unwrap();
        let out = render(Response::file(file, 10, "text/plain".to_string(), true)).await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\n0123456789"));
    }
}
