//! Transport contract between the engine and whatever carries the bytes.
//!
//! The engine never touches sockets or HTTP. A [`Transport`] hands it one
//! raw request and accepts one raw response; everything else (sessions,
//! headers, authentication) stays on the transport side.

mod io;

use std::io as stdio;

use crate::sniff::ContentKind;

pub use self::io::{DEFAULT_MAX_REQUEST_BYTES, IoTransport, normalize_encoding};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Request as delivered by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Request body.
    pub body: String,
    /// Default namespace for bare method names, such as a REST path.
    pub namespace_hint: Option<String>,
}

impl RawRequest {
    /// Builds an undeclared request.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Declares the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Supplies a namespace hint.
    #[must_use]
    pub fn with_namespace_hint(mut self, hint: impl Into<String>) -> Self {
        self.namespace_hint = Some(hint.into());
        self
    }

    /// Wire format declared by the content type, if any.
    #[must_use]
    pub fn declared_kind(&self) -> Option<ContentKind> {
        self.content_type
            .as_deref()
            .and_then(ContentKind::from_content_type)
    }
}

/// Carrier of one request/response exchange.
pub trait Transport {
    /// Reads the request. `declared` is the protocol the caller expects, if
    /// it knows one; transports echo it as the content type when the request
    /// itself declares none.
    ///
    /// # Errors
    ///
    /// Returns the I/O failure; the dispatcher logs it and sends nothing.
    fn read_request(&mut self, declared: Option<ContentKind>) -> stdio::Result<RawRequest>;

    /// Whether the caller may invoke `method`. Refusal ends the exchange
    /// without a response; the transport reports it its own way.
    fn check_authorization(&self, method: &str) -> bool;

    /// Writes the response body.
    ///
    /// # Errors
    ///
    /// Returns the I/O failure; the dispatcher traces it and does not retry.
    fn write_response(&mut self, content_type: &str, body: &str, chunked: bool)
    -> stdio::Result<()>;

    /// Character encoding of the exchange, if known.
    fn encoding(&self) -> Option<String>;

    /// Sets the character encoding.
    fn set_encoding(&mut self, encoding: &str);
}

impl<T> Transport for &mut T
where
    T: Transport + ?Sized,
{
    fn read_request(&mut self, declared: Option<ContentKind>) -> stdio::Result<RawRequest> {
        (**self).read_request(declared)
    }

    fn check_authorization(&self, method: &str) -> bool {
        (**self).check_authorization(method)
    }

    fn write_response(
        &mut self,
        content_type: &str,
        body: &str,
        chunked: bool,
    ) -> stdio::Result<()> {
        (**self).write_response(content_type, body, chunked)
    }

    fn encoding(&self) -> Option<String> {
        (**self).encoding()
    }

    fn set_encoding(&mut self, encoding: &str) {
        (**self).set_encoding(encoding);
    }
}
