//! JSON-RPC 2.0 codec.

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{CodecError, DecodeFailure, ProtocolCodec, ResponseContext, RpcCall};
use crate::fault::Fault;
use crate::sniff::ContentKind;

const PROTOCOL: ContentKind = ContentKind::Json;
const VERSION: &str = "2.0";

/// Codec for JSON-RPC 2.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRpcCodec;

#[derive(Serialize)]
struct ResponseEnvelope<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a Value>,
    #[serde(flatten)]
    outcome: Outcome<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome<'a> {
    Result(&'a Value),
    Error(ErrorObject<'a>),
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    code: i32,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

impl JsonRpcCodec {
    fn render(context: &ResponseContext<'_>, outcome: Outcome<'_>) -> Result<String, CodecError> {
        let envelope = ResponseEnvelope {
            jsonrpc: VERSION,
            id: context.id,
            outcome,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

impl ProtocolCodec for JsonRpcCodec {
    fn kind(&self) -> ContentKind {
        PROTOCOL
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn chunked(&self) -> bool {
        false
    }

    fn decode_request(&self, body: &str) -> Result<RpcCall, DecodeFailure> {
        let unparseable = |detail: String| {
            DecodeFailure::new(
                Fault::parse_error("unable to parse json-rpc request").with_detail(detail),
            )
        };
        let request = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(request)) => request,
            Ok(other) => return Err(unparseable(format!("expected an object, found {other}"))),
            Err(error) => return Err(unparseable(error.to_string())),
        };
        read_call(&request)
    }

    fn encode_result(
        &self,
        context: &ResponseContext<'_>,
        result: &Value,
    ) -> Result<String, CodecError> {
        Self::render(context, Outcome::Result(result))
    }

    fn encode_fault(
        &self,
        context: &ResponseContext<'_>,
        fault: &Fault,
    ) -> Result<String, CodecError> {
        Self::render(
            context,
            Outcome::Error(ErrorObject {
                code: fault.code(),
                message: fault.display_message(),
                data: fault.detail(),
            }),
        )
    }

    fn encode_request(&self, call: &RpcCall, _encoding: Option<&str>) -> Result<String, CodecError> {
        let request = json!({
            "jsonrpc": VERSION,
            "method": call.method,
            "params": call.params,
            "id": call.id.clone().unwrap_or(Value::Null),
        });
        Ok(serde_json::to_string(&request)?)
    }

    fn decode_response(&self, body: &str) -> Result<Result<Value, Fault>, CodecError> {
        let Value::Object(mut response) = serde_json::from_str::<Value>(body)? else {
            return Err(CodecError::malformed(PROTOCOL, "response is not an object"));
        };
        match response.remove("error") {
            Some(Value::Object(error)) => read_error(error).map(Err),
            Some(Value::Null) | None => response
                .remove("result")
                .map(Ok)
                .ok_or_else(|| CodecError::malformed(PROTOCOL, "response has no result")),
            Some(_) => Err(CodecError::malformed(PROTOCOL, "error is not an object")),
        }
    }
}

fn read_call(request: &Map<String, Value>) -> Result<RpcCall, DecodeFailure> {
    let unreadable = |id: Option<Value>, detail: &str| {
        DecodeFailure::with_id(
            Fault::invalid_request("unable to read request").with_detail(detail),
            id,
        )
    };

    let Some(id) = request.get("id").cloned() else {
        return Err(unreadable(None, "missing id"));
    };
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return Err(unreadable(Some(id), "method must be a string"));
    };
    let params = match request.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(params)) => params.clone(),
        Some(_) => return Err(unreadable(Some(id), "params must be an array")),
    };

    Ok(RpcCall {
        id: Some(id),
        method: method.to_owned(),
        params,
    })
}

fn read_error(mut error: Map<String, Value>) -> Result<Fault, CodecError> {
    let code = error
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| CodecError::malformed(PROTOCOL, "error without integer code"))?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let data = error.remove("data").filter(|data| !data.is_null());
    Ok(Fault::from_wire(code, message, data))
}
