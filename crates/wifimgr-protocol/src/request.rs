//! HTTP/1.x request parsing.
//!
//! Grammar accepted by the portal:
//!
//! ```text
//! request      = request-line *( header-line ) [ CRLF body ]
//! request-line = method SP origin-form SP "HTTP/1." DIGIT CRLF
//! header-line  = name ":" OWS value CRLF
//! origin-form  = "/" path [ "?" query ]
//! ```
//!
//! A buffer without the blank line that ends the head is parsed as a head
//! with no body, so a client that stalls after its headers can still be
//! answered. Anything outside the grammar is a [`RequestError`].

use crate::codec::{find_header_end, HEADER_TERMINATOR};
use thiserror::Error;

/// Errors for requests that do not fit the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Empty request")]
    Empty,

    #[error("No HTTP marker in request")]
    NotHttp,

    #[error("Request head is not valid UTF-8")]
    Encoding,

    #[error("Malformed request line: {0:?}")]
    RequestLine(String),

    #[error("Unsupported protocol version: {0:?}")]
    Version(String),

    #[error("Request target is not an absolute path: {0:?}")]
    Target(String),

    #[error("Malformed header line: {0:?}")]
    Header(String),

    #[error("Invalid Content-Length: {0:?}")]
    ContentLength(String),

    #[error("Request exceeds {0} bytes")]
    TooLarge(usize),
}

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Option<Self> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_uppercase()) {
            return None;
        }
        Some(match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            other => Method::Other(other.to_string()),
        })
    }

    /// Whether requests with this method usually carry a body.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Other(token) => token,
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path component of the target, including the leading `/`.
    pub path: String,
    /// Query string without the `?`.
    pub query: Option<String>,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length.
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.header("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| RequestError::ContentLength(value.to_string())),
            None => Ok(None),
        }
    }

    /// Route for this request's path.
    pub fn route(&self) -> Route {
        Route::resolve(&self.path)
    }
}

/// Portal routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Network selection form.
    Root,
    /// Credential submission.
    Configure,
    /// Anything else, carrying the normalized path.
    NotFound(String),
}

impl Route {
    /// Resolve a path. Leading and trailing slashes are ignored.
    pub fn resolve(path: &str) -> Self {
        match route_key(path) {
            "" => Route::Root,
            "configure" => Route::Configure,
            other => Route::NotFound(other.to_string()),
        }
    }
}

/// Path with leading and trailing slashes stripped.
pub fn route_key(path: &str) -> &str {
    path.trim_matches('/')
}

/// Parse a complete or head-only request buffer.
pub fn parse_request(bytes: &[u8]) -> Result<Request, RequestError> {
    if bytes.is_empty() {
        return Err(RequestError::Empty);
    }

    let (head, body) = match find_header_end(bytes) {
        Some(end) => (&bytes[..end], &bytes[end + HEADER_TERMINATOR.len()..]),
        None => (bytes, &[][..]),
    };
    let head = std::str::from_utf8(head).map_err(|_| RequestError::Encoding)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, path, query, version) = parse_request_line(request_line)?;

    let mut headers = Vec::new();
    for line in lines {
        // A head cut short by a timeout may end on a bare CRLF.
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .filter(|(name, _)| is_token(name))
            .ok_or_else(|| RequestError::Header(line.to_string()))?;
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut request = Request {
        method,
        path,
        query,
        version,
        headers,
        body: body.to_vec(),
    };

    if let Some(length) = request.content_length()? {
        request.body.truncate(length);
    }

    Ok(request)
}

fn parse_request_line(
    line: &str,
) -> Result<(Method, String, Option<String>, String), RequestError> {
    let malformed = || RequestError::RequestLine(line.to_string());

    let mut parts = line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) => (method, target, version),
        _ => return Err(malformed()),
    };

    let method = Method::parse(method).ok_or_else(malformed)?;

    if !is_http1(version) {
        return Err(RequestError::Version(version.to_string()));
    }

    if !target.starts_with('/') {
        return Err(RequestError::Target(target.to_string()));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    Ok((method, path, query, version.to_string()))
}

fn is_http1(version: &str) -> bool {
    match version.strip_prefix("HTTP/1.") {
        Some(minor) => minor.len() == 1 && minor.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
