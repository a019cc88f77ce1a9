use bytes::BytesMut;

use crate::http::ParseError;

/// Maximum size of a request head (request line plus headers) in bytes.
/// Requests whose head grows beyond this are rejected before parsing.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Request method. Anything other than `GET`/`HEAD` is carried verbatim so
/// the response builder can reject it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        }
    }
}

/// Protocol version of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// A parsed HTTP/1.1 request head.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Raw request target, exactly as received (no percent-decoding, query
    /// string included).
    pub target: String,
    pub version: Version,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Attempts to parse one request head from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the head is not complete yet; the caller
    /// should read more bytes and retry. On success the head (including the
    /// terminating blank line) is consumed from `buf`; any body bytes and
    /// pipelined data stay in place.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Request>, ParseError> {
        let head_len = match find_head_end(buf)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let head = buf.split_to(head_len + 4);
        let text =
            std::str::from_utf8(&head[..head_len]).map_err(|_| ParseError::InvalidHeader)?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::InvalidRequestLine)?;
        let mut parts = request_line.split(' ');
        let method = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        let target = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        let version = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        if method.is_empty() || parts.next().is_some() {
            return Err(ParseError::InvalidRequestLine);
        }
        let version = match version {
            "HTTP/1.0" => Version::Http10,
            "HTTP/1.1" => Version::Http11,
            other => return Err(ParseError::UnsupportedVersion(other.to_string())),
        };

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
            if name.is_empty() || name.contains(' ') {
                return Err(ParseError::InvalidHeader);
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Some(Request {
            method: Method::parse(method),
            target: target.to_string(),
            version,
            headers,
        }))
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the connection should be kept open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless the client sends
    /// `Connection: close`; HTTP/1.0 defaults to close unless the client
    /// sends `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        if self.connection_contains("close") {
            return false;
        }
        if self.connection_contains("keep-alive") {
            return true;
        }
        self.version == Version::Http11
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
            && self.connection_contains("upgrade")
    }

    /// Declared body length. Absent header means no body.
    pub fn content_length(&self) -> Result<u64, ParseError> {
        match self.header("content-length") {
            None => Ok(0),
            Some(v) => v.trim().parse().map_err(|_| ParseError::InvalidContentLength),
        }
    }

    /// Whether the request declares a chunked body.
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    fn connection_contains(&self, token: &str) -> bool {
        self.header("connection").is_some_and(|v| {
            v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
        })
    }
}

/// Finds the end of the request head (the offset of `\r\n\r\n`) if fully
/// buffered, enforcing [`MAX_HEAD_SIZE`] on both complete and still-growing
/// heads.
fn find_head_end(buf: &BytesMut) -> Result<Option<usize>, ParseError> {
    match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) if pos + 4 > MAX_HEAD_SIZE => Err(ParseError::HeadTooLarge),
        Some(pos) => Ok(Some(pos)),
        None if buf.len() > MAX_HEAD_SIZE => Err(ParseError::HeadTooLarge),
        None => Ok(None),
    }
}
