//! Raw HTTP/1.1 heads read off a byte stream.
//!
//! Used wherever a connection is handled below the HTTP machinery: the
//! WebSocket handshake on both sides and the dispatcher reading an upstream's
//! switching-protocols answer. Bytes after the blank line stay in the reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::ws::WsError;

/// Upper bound for a request or response head.
pub const MAX_HEAD_LEN: usize = 16 * 1024;
pub const MAX_HEADERS: usize = 64;

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl RequestHead {
    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn parse(head: &[u8]) -> Result<Self, WsError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) => Ok(Self {
                method: req.method.unwrap_or("GET").to_string(),
                path: req.path.unwrap_or("/").to_string(),
                headers: owned_headers(req.headers),
            }),
            Ok(httparse::Status::Partial) => {
                Err(WsError::MalformedHttp("incomplete request head".into()))
            }
            Err(e) => Err(WsError::MalformedHttp(e.to_string())),
        }
    }
}

/// Parsed status line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn parse(head: &[u8]) -> Result<Self, WsError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);
        match resp.parse(head) {
            Ok(httparse::Status::Complete(_)) => Ok(Self {
                status: resp.code.unwrap_or_default(),
                headers: owned_headers(resp.headers),
            }),
            Ok(httparse::Status::Partial) => {
                Err(WsError::MalformedHttp("incomplete response head".into()))
            }
            Err(e) => Err(WsError::MalformedHttp(e.to_string())),
        }
    }
}

/// Read up to and including the blank line ending an HTTP head.
pub async fn read_head<R>(reader: &mut R) -> Result<Vec<u8>, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    loop {
        // At most one byte past the cap, so an endless line still terminates.
        let budget = (MAX_HEAD_LEN + 1 - head.len()) as u64;
        let read = (&mut *reader).take(budget).read_until(b'\n', &mut head).await?;
        if read == 0 {
            return Err(WsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before end of HTTP head",
            )));
        }
        if head.len() > MAX_HEAD_LEN {
            return Err(WsError::MalformedHttp(format!(
                "head exceeds {} bytes",
                MAX_HEAD_LEN
            )));
        }
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            return Ok(head);
        }
    }
}

pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestHead, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader).await?;
    RequestHead::parse(&head)
}

pub async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader).await?;
    ResponseHead::parse(&head)
}

/// `sec-websocket-key` → `Sec-Websocket-Key`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

fn owned_headers(headers: &[httparse::Header<'_>]) -> Vec<(String, Vec<u8>)> {
    headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect()
}

fn find_header<'a>(headers: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| std::str::from_utf8(v).ok())
        .map(str::trim)
}
