//! # wifimgr-protocol
//!
//! Wire formats of the provisioning portal.
//!
//! This crate parses HTTP/1.x requests with one explicit grammar, decodes
//! form submissions, renders the portal pages and encodes HTTP/1.0
//! responses. It performs no I/O.

pub mod codec;
pub mod form;
pub mod pages;
pub mod request;
pub mod response;

pub use codec::{body_expectation, find_header_end, looks_like_http, BodyExpectation};
pub use form::{percent_decode, FormError, FormFields, Submission, SubmissionError};
pub use request::{parse_request, Method, Request, RequestError, Route};
pub use response::{Response, StatusCode};
