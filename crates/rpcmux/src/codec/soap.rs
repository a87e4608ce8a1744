//! SOAP 1.1 codec.
//!
//! The body carries an `execute` element with a `method` name and an `args`
//! element holding the arguments as JSON text. Results travel the same way:
//! the JSON rendering of the result, XML-normalised, inside
//! `executeResponse/executeReturn`.

use serde_json::Value;

use super::xml::{Element, normalize_text, parse_document};
use super::{CodecError, DecodeFailure, ProtocolCodec, ResponseContext, RpcCall};
use crate::fault::{DEFAULT_SERVER_ERROR, Fault};
use crate::sniff::ContentKind;

const PROTOCOL: ContentKind = ContentKind::Soap;

const ENVELOPE_OPEN: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
    <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
    xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" \
    xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"><s:Body>";
const ENVELOPE_CLOSE: &str = "</s:Body></s:Envelope>";

/// Namespace of the `execute` operation.
pub const SERVICE_NAMESPACE: &str = "http://soap.rpc.org";

/// Codec for SOAP envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoapCodec;

impl ProtocolCodec for SoapCodec {
    fn kind(&self) -> ContentKind {
        PROTOCOL
    }

    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn chunked(&self) -> bool {
        true
    }

    fn decode_request(&self, body: &str) -> Result<RpcCall, DecodeFailure> {
        let unparseable =
            || DecodeFailure::new(Fault::parse_error("unable to parse soap-rpc request"));
        let root = parse_document(body, PROTOCOL).map_err(|_| unparseable())?;
        let unreadable = || DecodeFailure::new(Fault::invalid_request("unable to read request"));

        let operation = body_element(&root)
            .and_then(|body| body.children().first())
            .ok_or_else(unreadable)?;
        let method = operation
            .child("method")
            .map(|method| method.text().trim().to_owned())
            .filter(|method| !method.is_empty())
            .ok_or_else(unreadable)?;
        let params = match operation.child("args") {
            Some(args) => parse_args(args.text()).ok_or_else(unparseable)?,
            None => Vec::new(),
        };
        Ok(RpcCall::new(method, params))
    }

    fn encode_result(
        &self,
        _context: &ResponseContext<'_>,
        result: &Value,
    ) -> Result<String, CodecError> {
        let rendered = normalize_text(&serde_json::to_string(result)?);
        let mut out = String::with_capacity(ENVELOPE_OPEN.len() + rendered.len() + 96);
        out.push_str(ENVELOPE_OPEN);
        out.push_str("<executeResponse xmlns=\"");
        out.push_str(SERVICE_NAMESPACE);
        out.push_str("\"><executeReturn>");
        out.push_str(&rendered);
        out.push_str("</executeReturn></executeResponse>");
        out.push_str(ENVELOPE_CLOSE);
        Ok(out)
    }

    fn encode_fault(
        &self,
        _context: &ResponseContext<'_>,
        fault: &Fault,
    ) -> Result<String, CodecError> {
        let detail = fault.detail_text().map(|detail| normalize_text(&detail));
        let mut out = String::with_capacity(ENVELOPE_OPEN.len() + 160);
        out.push_str(ENVELOPE_OPEN);
        out.push_str("<s:Fault><faultcode>");
        out.push_str(&fault.code().to_string());
        out.push_str("</faultcode><faultstring>");
        out.push_str(&normalize_text(fault.display_message()));
        out.push_str("</faultstring><detail>");
        out.push_str(detail.as_deref().unwrap_or_default());
        out.push_str("</detail></s:Fault>");
        out.push_str(ENVELOPE_CLOSE);
        Ok(out)
    }

    fn encode_request(&self, call: &RpcCall, _encoding: Option<&str>) -> Result<String, CodecError> {
        let args = normalize_text(&serde_json::to_string(&call.params)?);
        let mut out = String::with_capacity(ENVELOPE_OPEN.len() + args.len() + 128);
        out.push_str(ENVELOPE_OPEN);
        out.push_str("<execute xmlns=\"");
        out.push_str(SERVICE_NAMESPACE);
        out.push_str("\"><method>");
        out.push_str(&normalize_text(&call.method));
        out.push_str("</method><args>");
        out.push_str(&args);
        out.push_str("</args></execute>");
        out.push_str(ENVELOPE_CLOSE);
        Ok(out)
    }

    fn decode_response(&self, body: &str) -> Result<Result<Value, Fault>, CodecError> {
        let root = parse_document(body, PROTOCOL)?;
        let body = body_element(&root)
            .ok_or_else(|| CodecError::malformed(PROTOCOL, "missing Envelope/Body"))?;
        if let Some(fault) = body.child("Fault") {
            return Ok(Err(read_fault(fault)));
        }
        let returned = body
            .descend(&["executeResponse", "executeReturn"])
            .ok_or_else(|| CodecError::malformed(PROTOCOL, "missing executeReturn"))?;
        let text = returned.text().trim();
        if text.is_empty() {
            return Ok(Ok(Value::Null));
        }
        Ok(Ok(serde_json::from_str(text)?))
    }
}

fn body_element(root: &Element) -> Option<&Element> {
    (root.name() == "Envelope")
        .then(|| root.child("Body"))
        .flatten()
}

/// Reads the JSON argument blob. `None` when it is not valid JSON.
fn parse_args(text: &str) -> Option<Vec<Value>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Vec::new());
    }
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(items),
        single => Some(vec![single]),
    }
}

fn read_fault(fault: &Element) -> Fault {
    let code = fault
        .child("faultcode")
        .and_then(|code| code.text().trim().parse::<i32>().ok())
        .unwrap_or(DEFAULT_SERVER_ERROR);
    let message = fault
        .child("faultstring")
        .map(|message| message.text().to_owned())
        .unwrap_or_default();
    let detail = fault
        .child("detail")
        .map(Element::text)
        .filter(|detail| !detail.is_empty())
        .map(|detail| Value::String(detail.to_owned()));
    Fault::from_wire(code, message, detail)
}
