//! HTTP/1.0 responses.

/// Status codes the portal answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
        }
    }
}

/// A complete response. The portal always knows the body up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            body: body.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BadRequest,
            body: message.into(),
        }
    }

    /// 404 naming the normalized path.
    pub fn not_found(path: &str) -> Self {
        Self {
            status: StatusCode::NotFound,
            body: format!("Path not found: {}", path),
        }
    }

    /// Serialize status line, headers and body.
    pub fn encode(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.0 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status.as_u16(),
            self.status.reason(),
            self.body.len()
        );
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_not_found() {
        let response = Response::not_found("foo/bar");
        let encoded = String::from_utf8(response.encode()).unwrap();

        assert_eq!(
            encoded,
            "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\nContent-Length: 23\r\nConnection: close\r\n\r\nPath not found: foo/bar"
        );
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let encoded = String::from_utf8(Response::ok("café").encode()).unwrap();
        assert!(encoded.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(encoded.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn test_bad_request_status_line() {
        let encoded = Response::bad_request("SSID must be provided").encode();
        assert!(encoded.starts_with(b"HTTP/1.0 400 Bad Request\r\n"));
    }
}
