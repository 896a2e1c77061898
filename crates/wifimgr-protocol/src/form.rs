//! Form decoding for credential submissions.
//!
//! Decoding is split from request parsing: [`percent_decode`] works on one
//! already-delimited value, [`FormFields`] splits an encoded string into
//! pairs, and [`Submission`] pulls the `ssid`/`password` fields out of a
//! parsed request.

use crate::request::Request;
use thiserror::Error;
use wifimgr_core::credentials::validate_entry;

/// Errors while decoding a form value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Decoded value is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode a `application/x-www-form-urlencoded` value.
///
/// `%XX` becomes the byte `XX` and `+` becomes a space. A `%` not followed
/// by two hex digits is kept as-is.
pub fn percent_decode(value: &str) -> Result<String, FormError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (hex_value(bytes.get(i + 1)), hex_value(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
                _ => out.push(b'%'),
            },
            b'+' => out.push(b' '),
            other => out.push(other),
        }
        i += 1;
    }

    String::from_utf8(out).map_err(|_| FormError::InvalidUtf8)
}

fn hex_value(byte: Option<&u8>) -> Option<u8> {
    match *byte? {
        b @ b'0'..=b'9' => Some(b - b'0'),
        b @ b'a'..=b'f' => Some(b - b'a' + 10),
        b @ b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Encoded `key=value&key=value` pairs.
///
/// Values stay encoded until asked for, so a broken field does not spoil
/// the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn parse(encoded: &str) -> Self {
        let pairs = encoded
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// Decoded value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<Result<String, FormError>> {
        self.pairs
            .iter()
            .find(|(k, _)| percent_decode(k).map(|k| k == key).unwrap_or(false))
            .map(|(_, v)| percent_decode(v))
    }
}

/// Errors for credential submissions the portal cannot act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Parameters not found")]
    MissingFields,

    #[error("SSID must be provided")]
    EmptySsid,

    #[error("SSID and/or password not provided")]
    Encoding(#[from] FormError),

    #[error("SSID or password contains unsupported characters")]
    UnsupportedCharacters,
}

/// Credentials submitted through the portal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub ssid: String,
    pub password: String,
}

impl Submission {
    /// Extract a submission from the request body, falling back to the
    /// query string for fields the body lacks.
    pub fn from_request(request: &Request) -> Result<Self, SubmissionError> {
        let body = String::from_utf8_lossy(&request.body);
        let body = FormFields::parse(body.trim());
        let query = FormFields::parse(request.query.as_deref().unwrap_or_default());

        let field = |key: &str| body.get(key).or_else(|| query.get(key)).transpose();

        let ssid = field("ssid")?;
        let password = field("password")?;
        let (ssid, password) = match (ssid, password) {
            (Some(ssid), Some(password)) => (ssid, password),
            _ => return Err(SubmissionError::MissingFields),
        };

        if ssid.is_empty() {
            return Err(SubmissionError::EmptySsid);
        }
        if validate_entry(&ssid, &password).is_err() {
            return Err(SubmissionError::UnsupportedCharacters);
        }

        Ok(Self { ssid, password })
    }
}
