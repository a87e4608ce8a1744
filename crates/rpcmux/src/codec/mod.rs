//! Wire codecs for the supported protocols.
//!
//! A codec turns a raw request body into an [`RpcCall`] and turns results
//! and faults back into a body in the same wire format. Every codec also
//! implements the client half (`encode_request` / `decode_response`) so a
//! fault encoded by the server decodes back to the same code and message.

pub mod jsonrpc;
pub mod soap;
pub(crate) mod xml;
pub mod xmlrpc;

use serde_json::Value;
use thiserror::Error;

use crate::fault::Fault;
use crate::sniff::ContentKind;

pub use self::jsonrpc::JsonRpcCodec;
pub use self::soap::SoapCodec;
pub use self::xml::normalize_text;
pub use self::xmlrpc::XmlRpcCodec;

/// Decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// Correlation id. `None` when the protocol has none or it was never read.
    pub id: Option<Value>,
    /// Method name exactly as sent; may still lack a namespace.
    pub method: String,
    /// Positional arguments.
    pub params: Vec<Value>,
}

impl RpcCall {
    /// Builds a call without a correlation id.
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Request that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    /// Fault to send back.
    pub fault: Fault,
    /// Correlation id, if it was read before decoding failed.
    pub id: Option<Value>,
}

impl DecodeFailure {
    pub(crate) fn new(fault: Fault) -> Self {
        Self { fault, id: None }
    }

    pub(crate) fn with_id(fault: Fault, id: Option<Value>) -> Self {
        Self { fault, id }
    }
}

/// Per-response details supplied by the dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseContext<'a> {
    /// Correlation id echoed by protocols that carry one.
    pub id: Option<&'a Value>,
    /// Character encoding declared by the transport.
    pub encoding: Option<&'a str>,
}

/// Errors raised while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON text could not be produced or read.
    #[error("json processing failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The XML reader rejected the document.
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The document is well formed but does not have the expected shape.
    #[error("malformed {protocol} message: {message}")]
    Malformed {
        /// Protocol being processed.
        protocol: ContentKind,
        /// What was wrong.
        message: String,
    },
}

impl CodecError {
    /// Creates a shape error.
    pub fn malformed(protocol: ContentKind, message: impl Into<String>) -> Self {
        Self::Malformed {
            protocol,
            message: message.into(),
        }
    }
}

/// One wire format.
pub trait ProtocolCodec: Send + Sync {
    /// Protocol handled by this codec.
    fn kind(&self) -> ContentKind;

    /// Content type of responses.
    fn content_type(&self) -> &'static str;

    /// Whether responses must be sent with chunked transfer encoding.
    fn chunked(&self) -> bool;

    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns a parse-error fault for unreadable bodies and an
    /// invalid-request fault for bodies missing required parts.
    fn decode_request(&self, body: &str) -> Result<RpcCall, DecodeFailure>;

    /// Encodes a successful result.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the result cannot be rendered.
    fn encode_result(
        &self,
        context: &ResponseContext<'_>,
        result: &Value,
    ) -> Result<String, CodecError>;

    /// Encodes a fault.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the fault detail cannot be rendered.
    fn encode_fault(&self, context: &ResponseContext<'_>, fault: &Fault)
    -> Result<String, CodecError>;

    /// Encodes an outgoing request.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when an argument cannot be rendered.
    fn encode_request(&self, call: &RpcCall, encoding: Option<&str>) -> Result<String, CodecError>;

    /// Decodes a response into the result or the fault it carries.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the body is not a response of this
    /// protocol.
    fn decode_response(&self, body: &str) -> Result<Result<Value, Fault>, CodecError>;
}

static JSON_RPC: JsonRpcCodec = JsonRpcCodec;
static XML_RPC: XmlRpcCodec = XmlRpcCodec;
static SOAP: SoapCodec = SoapCodec;

/// Returns the codec for `kind`.
#[must_use]
pub fn codec_for(kind: ContentKind) -> &'static dyn ProtocolCodec {
    match kind {
        ContentKind::Json => &JSON_RPC,
        ContentKind::XmlRpc => &XML_RPC,
        ContentKind::Soap => &SOAP,
    }
}

/// Writes the XML declaration, naming `encoding` when known.
pub(crate) fn xml_declaration(out: &mut String, encoding: Option<&str>) {
    match encoding.filter(|name| !name.is_empty()) {
        Some(name) => {
            out.push_str("<?xml version=\"1.0\" encoding=\"");
            out.push_str(name);
            out.push_str("\"?>");
        }
        None => out.push_str("<?xml version=\"1.0\"?>"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case::json(ContentKind::Json, "application/json", false)]
    #[case::xmlrpc(ContentKind::XmlRpc, "text/xml", false)]
    #[case::soap(ContentKind::Soap, "text/xml", true)]
    fn codecs_declare_response_framing(
        #[case] kind: ContentKind,
        #[case] content_type: &str,
        #[case] chunked: bool,
    ) {
        let codec = codec_for(kind);
        assert_eq!(codec.kind(), kind);
        assert_eq!(codec.content_type(), content_type);
        assert_eq!(codec.chunked(), chunked);
    }

    #[rstest]
    #[case::json(ContentKind::Json)]
    #[case::xmlrpc(ContentKind::XmlRpc)]
    #[case::soap(ContentKind::Soap)]
    fn faults_round_trip_code_and_message(
        #[case] kind: ContentKind,
        #[values(
            Fault::method_not_found("method missing() not found"),
            Fault::remote(1001, "quota <exceeded> & \"blocked\"", Some(json!("tenant 7"))),
            Fault::server(-32001, "disk full").with_detail("io error")
        )]
        fault: Fault,
    ) {
        let codec = codec_for(kind);
        let id = json!(9);
        let context = ResponseContext {
            id: Some(&id),
            encoding: Some("UTF-8"),
        };
        let body = codec.encode_fault(&context, &fault).expect("encode fault");
        let decoded = codec
            .decode_response(&body)
            .expect("decode response")
            .expect_err("fault expected");
        assert_eq!(decoded.code(), fault.code());
        assert_eq!(decoded.message(), fault.message());
    }

    #[rstest]
    #[case::json(ContentKind::Json)]
    #[case::xmlrpc(ContentKind::XmlRpc)]
    #[case::soap(ContentKind::Soap)]
    fn requests_round_trip_through_client_encoding(#[case] kind: ContentKind) {
        let codec = codec_for(kind);
        let call = RpcCall::new("TEST.echo", vec![json!("World"), json!(5), json!([1, 2])])
            .with_id(1);
        let body = codec.encode_request(&call, None).expect("encode request");
        let decoded = codec.decode_request(&body).expect("decode request");
        assert_eq!(decoded.method, call.method);
        assert_eq!(decoded.params, call.params);
    }

    #[rstest]
    #[case::json(ContentKind::Json)]
    #[case::xmlrpc(ContentKind::XmlRpc)]
    #[case::soap(ContentKind::Soap)]
    fn results_round_trip_through_client_decoding(#[case] kind: ContentKind) {
        let codec = codec_for(kind);
        let result = json!({"name": "Ada", "tags": ["x", "y"], "age": 36, "ok": true});
        let body = codec
            .encode_result(&ResponseContext::default(), &result)
            .expect("encode result");
        let decoded = codec
            .decode_response(&body)
            .expect("decode response")
            .expect("result expected");
        assert_eq!(decoded, result);
    }
}
