//! XML-RPC codec.
//!
//! Requests are `methodCall` documents; values use the standard XML-RPC type
//! tags. `base64` and `dateTime.iso8601` payloads are kept as text. Faults
//! carry only `faultCode` and `faultString`, so fault detail never reaches
//! the wire.

use serde_json::{Map, Number, Value};

use super::xml::{Element, normalize_text, parse_document};
use super::{
    CodecError, DecodeFailure, ProtocolCodec, ResponseContext, RpcCall, xml_declaration,
};
use crate::fault::Fault;
use crate::sniff::ContentKind;

const PROTOCOL: ContentKind = ContentKind::XmlRpc;

/// Codec for XML-RPC.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlRpcCodec;

impl ProtocolCodec for XmlRpcCodec {
    fn kind(&self) -> ContentKind {
        PROTOCOL
    }

    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn chunked(&self) -> bool {
        false
    }

    fn decode_request(&self, body: &str) -> Result<RpcCall, DecodeFailure> {
        let unparseable = |_| {
            DecodeFailure::new(Fault::parse_error("unable to parse xml-rpc request"))
        };
        let root = parse_document(body, PROTOCOL).map_err(unparseable)?;
        let unreadable = || DecodeFailure::new(Fault::invalid_request("unable to read request"));

        if root.name() != "methodCall" {
            return Err(unreadable());
        }
        let method = root
            .child("methodName")
            .map(|name| name.text().trim().to_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(unreadable)?;
        let params = match root.child("params") {
            Some(params) => read_params(params).map_err(unparseable)?,
            None => Vec::new(),
        };
        Ok(RpcCall::new(method, params))
    }

    fn encode_result(
        &self,
        context: &ResponseContext<'_>,
        result: &Value,
    ) -> Result<String, CodecError> {
        let mut out = String::with_capacity(128);
        xml_declaration(&mut out, context.encoding);
        out.push_str("<methodResponse><params><param>");
        write_value(&mut out, result);
        out.push_str("</param></params></methodResponse>");
        Ok(out)
    }

    fn encode_fault(
        &self,
        context: &ResponseContext<'_>,
        fault: &Fault,
    ) -> Result<String, CodecError> {
        let mut out = String::with_capacity(256);
        xml_declaration(&mut out, context.encoding);
        out.push_str(
            "<methodResponse><fault><value><struct><member><name>faultString</name><value>",
        );
        out.push_str(&normalize_text(fault.display_message()));
        out.push_str("</value></member><member><name>faultCode</name><value><int>");
        out.push_str(&fault.code().to_string());
        out.push_str("</int></value></member></struct></value></fault></methodResponse>");
        Ok(out)
    }

    fn encode_request(&self, call: &RpcCall, encoding: Option<&str>) -> Result<String, CodecError> {
        let mut out = String::with_capacity(128);
        xml_declaration(&mut out, encoding);
        out.push_str("<methodCall><methodName>");
        out.push_str(&normalize_text(&call.method));
        out.push_str("</methodName><params>");
        for param in &call.params {
            out.push_str("<param>");
            write_value(&mut out, param);
            out.push_str("</param>");
        }
        out.push_str("</params></methodCall>");
        Ok(out)
    }

    fn decode_response(&self, body: &str) -> Result<Result<Value, Fault>, CodecError> {
        let root = parse_document(body, PROTOCOL)?;
        if root.name() != "methodResponse" {
            return Err(CodecError::malformed(PROTOCOL, "expected methodResponse"));
        }
        if let Some(value) = root.descend(&["fault", "value"]) {
            return read_fault(value).map(Err);
        }
        let value = root
            .descend(&["params", "param", "value"])
            .ok_or_else(|| CodecError::malformed(PROTOCOL, "response has no value"))?;
        read_value(value).map(Ok)
    }
}

fn read_params(params: &Element) -> Result<Vec<Value>, CodecError> {
    params
        .children()
        .iter()
        .filter(|param| param.name() == "param")
        .map(|param| {
            param
                .child("value")
                .ok_or_else(|| CodecError::malformed(PROTOCOL, "param without value"))
                .and_then(read_value)
        })
        .collect()
}

fn read_fault(value: &Element) -> Result<Fault, CodecError> {
    let Value::Object(mut members) = read_value(value)? else {
        return Err(CodecError::malformed(PROTOCOL, "fault is not a struct"));
    };
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| CodecError::malformed(PROTOCOL, "fault without integer faultCode"))?;
    let message = match members.remove("faultString") {
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok(Fault::from_wire(code, message, None))
}

/// Decodes a `<value>` element.
pub(crate) fn read_value(value: &Element) -> Result<Value, CodecError> {
    let Some(typed) = value.children().first() else {
        return Ok(Value::String(value.text().to_owned()));
    };
    let text = typed.text();
    match typed.name() {
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid_scalar(typed)),
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid_scalar(typed)),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(invalid_scalar(typed)),
        },
        "string" | "base64" | "dateTime.iso8601" => Ok(Value::String(text.to_owned())),
        "nil" => Ok(Value::Null),
        "array" => typed
            .child("data")
            .map(Element::children)
            .unwrap_or_default()
            .iter()
            .filter(|item| item.name() == "value")
            .map(read_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "struct" => read_struct(typed).map(Value::Object),
        other => Err(CodecError::malformed(
            PROTOCOL,
            format!("unsupported value type {other}"),
        )),
    }
}

fn read_struct(element: &Element) -> Result<Map<String, Value>, CodecError> {
    let mut members = Map::new();
    for member in element.children().iter().filter(|m| m.name() == "member") {
        let name = member
            .child("name")
            .ok_or_else(|| CodecError::malformed(PROTOCOL, "member without name"))?;
        let value = match member.child("value") {
            Some(value) => read_value(value)?,
            None => Value::Null,
        };
        members.insert(name.text().to_owned(), value);
    }
    Ok(members)
}

fn invalid_scalar(element: &Element) -> CodecError {
    CodecError::malformed(
        PROTOCOL,
        format!("invalid {} value {:?}", element.name(), element.text()),
    )
}

/// Encodes `value` as a `<value>` element.
pub(crate) fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(flag) => {
            out.push_str(if *flag {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        Value::Number(number) => write_number(out, number),
        Value::String(text) => {
            out.push_str("<string>");
            out.push_str(&normalize_text(text));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&normalize_text(name));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn write_number(out: &mut String, number: &Number) {
    let (tag, text) = match number.as_i64() {
        Some(int) if i32::try_from(int).is_ok() => ("int", int.to_string()),
        Some(int) => ("i8", int.to_string()),
        None => ("double", number.as_f64().unwrap_or_default().to_string()),
    };
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::fault::FaultKind;

    const HELLO: &str = "<?xml version=\"1.0\"?><methodCall><methodName>TEST.hello</methodName>\
        <params><param><value><string>World</string></value></param></params></methodCall>";

    #[test]
    fn decodes_method_call() {
        let call = XmlRpcCodec.decode_request(HELLO).expect("decode");
        assert_eq!(call.method, "TEST.hello");
        assert_eq!(call.params, [json!("World")]);
        assert_eq!(call.id, None);
    }

    #[rstest]
    #[case::int("<int>5</int>", json!(5))]
    #[case::i4("<i4>-7</i4>", json!(-7))]
    #[case::i8("<i8>9000000000</i8>", json!(9_000_000_000_i64))]
    #[case::double("<double>2.5</double>", json!(2.5))]
    #[case::boolean("<boolean>1</boolean>", json!(true))]
    #[case::untyped("plain text", json!("plain text"))]
    #[case::base64("<base64>aGk=</base64>", json!("aGk="))]
    #[case::date("<dateTime.iso8601>20240101T10:00:00</dateTime.iso8601>", json!("20240101T10:00:00"))]
    #[case::nil("<nil/>", json!(null))]
    #[case::array("<array><data><value><int>1</int></value><value>a</value></data></array>", json!([1, "a"]))]
    #[case::nested_struct(
        "<struct><member><name>p</name><value><struct><member><name>x</name><value><int>1</int></value></member></struct></value></member></struct>",
        json!({"p": {"x": 1}})
    )]
    fn decodes_value_types(#[case] inner: &str, #[case] expected: Value) {
        let body = format!(
            "<methodCall><methodName>T.m</methodName><params><param><value>{inner}</value></param></params></methodCall>"
        );
        let call = XmlRpcCodec.decode_request(&body).expect("decode");
        assert_eq!(call.params, [expected]);
    }

    #[rstest]
    #[case::broken_xml("<methodCall><methodName>x", FaultKind::ParseError)]
    #[case::bad_int(
        "<methodCall><methodName>T.m</methodName><params><param><value><int>x</int></value></param></params></methodCall>",
        FaultKind::ParseError
    )]
    #[case::wrong_root("<methodResponse/>", FaultKind::InvalidRequest)]
    #[case::no_method("<methodCall><params/></methodCall>", FaultKind::InvalidRequest)]
    fn rejects_bad_requests(#[case] body: &str, #[case] expected: FaultKind) {
        let failure = XmlRpcCodec.decode_request(body).expect_err("bad request");
        assert_eq!(failure.fault.kind(), expected);
        assert_eq!(failure.id, None);
    }

    #[test]
    fn missing_params_decode_as_no_arguments() {
        let call = XmlRpcCodec
            .decode_request("<methodCall><methodName>T.m</methodName></methodCall>")
            .expect("decode");
        assert!(call.params.is_empty());
    }

    #[test]
    fn result_declares_transport_encoding() {
        let context = ResponseContext {
            id: None,
            encoding: Some("ISO-8859-1"),
        };
        let body = XmlRpcCodec
            .encode_result(&context, &json!("Hello World!"))
            .expect("encode");
        assert_eq!(
            body,
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><methodResponse><params><param>\
             <value><string>Hello World!</string></value></param></params></methodResponse>"
        );
    }

    #[test]
    fn fault_drops_detail() {
        let fault = Fault::server(-32001, "a < b").with_detail("stack");
        let body = XmlRpcCodec
            .encode_fault(&ResponseContext::default(), &fault)
            .expect("encode");
        assert_eq!(
            body,
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
             <member><name>faultString</name><value>a &lt; b</value></member>\
             <member><name>faultCode</name><value><int>-32001</int></value></member>\
             </struct></value></fault></methodResponse>"
        );
    }

    #[test]
    fn large_integers_use_i8() {
        let mut out = String::new();
        write_value(&mut out, &json!(5_000_000_000_i64));
        assert_eq!(out, "<value><i8>5000000000</i8></value>");
    }
}
