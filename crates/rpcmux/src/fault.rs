//! Fault taxonomy shared by every protocol.
//!
//! A [`Fault`] is the only failure shape that crosses the protocol boundary.
//! Each fault carries a [`FaultKind`] that fixes its numeric code, a
//! human-readable message, and optional structured detail. Codecs decide how
//! much of the detail survives on the wire: JSON-RPC keeps it as `data`, SOAP
//! renders it into `detail`, XML-RPC drops it.

use serde_json::Value;
use thiserror::Error;

/// Payload could not be decoded as the detected format.
pub const PARSE_ERROR: i32 = -32700;
/// Payload decoded but required fields are missing.
pub const INVALID_REQUEST: i32 = -32600;
/// Handler or method name does not resolve.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// No overload accepts the supplied arguments.
pub const INVALID_PARAMS: i32 = -32602;
/// Resolver or dispatcher internal failure.
pub const INTERNAL_ERROR: i32 = -32603;
/// Upper bound of the server error range.
pub const SERVER_ERROR_START: i32 = -32000;
/// Lower bound of the server error range.
pub const SERVER_ERROR_END: i32 = -32099;
/// Code assigned to unclassified handler failures.
pub const DEFAULT_SERVER_ERROR: i32 = SERVER_ERROR_START - 1;

/// Message rendered when a fault carries no message of its own.
pub const DEFAULT_FAULT_MESSAGE: &str = "Service exception";

/// Classification of a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The payload could not be decoded.
    ParseError,
    /// The payload decoded but lacks required fields.
    InvalidRequest,
    /// The handler or method does not resolve.
    MethodNotFound,
    /// No overload matches the arguments.
    InvalidParams,
    /// Engine-internal failure.
    InternalError,
    /// Application failure within the server error range.
    ServerError(i32),
    /// Fault raised explicitly by handler code with a caller-chosen code.
    RemoteApplication(i32),
}

impl FaultKind {
    /// Returns the numeric code carried on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => PARSE_ERROR,
            Self::InvalidRequest => INVALID_REQUEST,
            Self::MethodNotFound => METHOD_NOT_FOUND,
            Self::InvalidParams => INVALID_PARAMS,
            Self::InternalError => INTERNAL_ERROR,
            Self::ServerError(code) | Self::RemoteApplication(code) => code,
        }
    }

    /// Classifies a code read back from the wire.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            PARSE_ERROR => Self::ParseError,
            INVALID_REQUEST => Self::InvalidRequest,
            METHOD_NOT_FOUND => Self::MethodNotFound,
            INVALID_PARAMS => Self::InvalidParams,
            INTERNAL_ERROR => Self::InternalError,
            SERVER_ERROR_END..=SERVER_ERROR_START => Self::ServerError(code),
            _ => Self::RemoteApplication(code),
        }
    }

    /// Machine-readable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
            Self::ServerError(_) => "server_error",
            Self::RemoteApplication(_) => "remote_application_error",
        }
    }
}

/// A classified, protocol-renderable failure.
///
/// Handlers raise a `Fault` (usually through
/// [`Fault::remote`]) to control the code, message and detail sent to the
/// caller. Any other failure returned by a handler is wrapped with
/// [`Fault::from_failure`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
    detail: Option<Value>,
}

impl Fault {
    /// Builds a fault of the given kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Builds a parse error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ParseError, message)
    }

    /// Builds an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidRequest, message)
    }

    /// Builds a method-not-found error.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::MethodNotFound, message)
    }

    /// Builds an invalid params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidParams, message)
    }

    /// Builds an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InternalError, message)
    }

    /// Builds a server error with an explicit code.
    pub fn server(code: i32, message: impl Into<String>) -> Self {
        Self::new(FaultKind::ServerError(code), message)
    }

    /// Builds an application fault whose code, message and detail pass
    /// through every codec unchanged.
    pub fn remote(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: FaultKind::RemoteApplication(code),
            message: message.into(),
            detail: data,
        }
    }

    /// Rebuilds a fault from a code read off the wire.
    pub fn from_wire(code: i32, message: impl Into<String>, detail: Option<Value>) -> Self {
        Self {
            kind: FaultKind::from_code(code),
            message: message.into(),
            detail,
        }
    }

    /// Attaches diagnostic detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Removes diagnostic detail.
    #[must_use]
    pub fn without_detail(mut self) -> Self {
        self.detail = None;
        self
    }

    /// Classifies a handler failure.
    ///
    /// A `Fault` anywhere in the error chain is returned unchanged. Any other
    /// failure becomes a server error with code [`DEFAULT_SERVER_ERROR`],
    /// the failure's message, and (when `with_detail` is set) the rendered
    /// failure chain as detail.
    #[must_use]
    pub fn from_failure(error: &anyhow::Error, with_detail: bool) -> Self {
        if let Some(fault) = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<Self>())
        {
            return fault.clone();
        }

        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = format!("{error:?}");
        }
        let fault = Self::server(DEFAULT_SERVER_ERROR, message);
        if with_detail {
            fault.with_detail(format!("{error:?}"))
        } else {
            fault
        }
    }

    /// Returns the fault classification.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the numeric code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Returns the message as constructed.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the message to render, falling back to
    /// [`DEFAULT_FAULT_MESSAGE`] when empty.
    #[must_use]
    pub fn display_message(&self) -> &str {
        if self.message.is_empty() {
            DEFAULT_FAULT_MESSAGE
        } else {
            &self.message
        }
    }

    /// Returns the structured detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    /// Renders the detail as text for formats with a textual detail field.
    #[must_use]
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}
