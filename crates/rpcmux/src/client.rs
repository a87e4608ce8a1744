//! Client side of the codecs.
//!
//! [`Invoker`] encodes a call, hands it to a [`ClientTransport`], and
//! decodes the response into the result or the remote [`Fault`]. The
//! [`Loopback`] transport feeds requests straight into an in-process
//! [`Dispatcher`], which is how the engine exercises itself end to end.

use std::io::{self, Cursor};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::codec::{CodecError, RpcCall, codec_for};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::fault::Fault;
use crate::sniff::ContentKind;
use crate::transport::IoTransport;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Carries an encoded request to a server and returns the raw response.
pub trait ClientTransport {
    /// Sends `body` declared as `content_type`.
    ///
    /// # Errors
    ///
    /// Returns the I/O failure when no response is received.
    fn call(&mut self, content_type: &str, body: &str) -> io::Result<String>;
}

/// Errors raised by [`Invoker::invoke`].
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The server answered with a fault.
    #[error("remote fault {code}: {message}", code = .0.code(), message = .0.message())]
    Fault(#[from] Fault),
    /// The call could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),
    /// The response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[source] CodecError),
    /// The transport failed.
    #[error("transport failed: {0}")]
    Transport(#[from] io::Error),
}

impl InvokeError {
    /// The remote fault, when the server answered with one.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Issues calls in one protocol over a [`ClientTransport`].
#[derive(Debug)]
pub struct Invoker<T> {
    transport: T,
    protocol: ContentKind,
    encoding: Option<String>,
    next_id: u64,
}

impl<T: ClientTransport> Invoker<T> {
    /// Creates an invoker speaking `protocol`.
    pub fn new(protocol: ContentKind, transport: T) -> Self {
        Self {
            transport,
            protocol,
            encoding: None,
            next_id: 1,
        }
    }

    /// Declares `encoding` in XML request documents.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Protocol spoken by this invoker.
    #[must_use]
    pub fn protocol(&self) -> ContentKind {
        self.protocol
    }

    /// Calls `method` with positional `params`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Fault`] when the server reports a fault, and
    /// the other variants when the exchange itself fails.
    pub fn invoke(&mut self, method: &str, params: Vec<Value>) -> Result<Value, InvokeError> {
        let codec = codec_for(self.protocol);
        let call = RpcCall::new(method, params).with_id(self.next_id);
        self.next_id += 1;

        let request = codec
            .encode_request(&call, self.encoding.as_deref())
            .map_err(InvokeError::Encode)?;
        debug!(
            target: CLIENT_TARGET,
            protocol = %self.protocol,
            method,
            "invoking remote method"
        );
        let response = self
            .transport
            .call(self.protocol.mime_type(), &request)?;
        let outcome = codec
            .decode_response(&response)
            .map_err(InvokeError::Decode)?;
        Ok(outcome?)
    }

    /// Releases the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Client transport that dispatches in process.
#[derive(Debug)]
pub struct Loopback<'a> {
    dispatcher: &'a Dispatcher,
}

impl<'a> Loopback<'a> {
    /// Routes calls into `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher }
    }
}

impl ClientTransport for Loopback<'_> {
    fn call(&mut self, content_type: &str, body: &str) -> io::Result<String> {
        let mut transport = IoTransport::new(Cursor::new(body.as_bytes()), Vec::new());
        let declared = ContentKind::from_content_type(content_type);
        match self.dispatcher.dispatch_with(&mut transport, declared) {
            DispatchOutcome::Answered(_) | DispatchOutcome::Faulted(..) => {
                String::from_utf8(transport.into_writer())
                    .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
            }
            outcome => Err(io::Error::other(format!("no response: {outcome:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use mockall::mock;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::fault::FaultKind;

    mock! {
        Wire {}
        impl ClientTransport for Wire {
            fn call(&mut self, content_type: &str, body: &str) -> io::Result<String>;
        }
    }

    #[test]
    fn decodes_result_and_increments_ids() {
        let mut ids = VecDeque::from([1, 2]);
        let mut wire = MockWire::new();
        wire.expect_call()
            .withf(|content_type, _| content_type == "application/json")
            .times(2)
            .returning(move |_, body| {
                let request: Value = serde_json::from_str(body).expect("json request");
                assert_eq!(request["id"], json!(ids.pop_front().expect("id")));
                Ok(format!(
                    r#"{{"jsonrpc":"2.0","id":{},"result":"ok"}}"#,
                    request["id"]
                ))
            });

        let mut invoker = Invoker::new(ContentKind::Json, wire);
        assert_eq!(invoker.invoke("T.a", vec![]).expect("first"), json!("ok"));
        assert_eq!(invoker.invoke("T.b", vec![]).expect("second"), json!("ok"));
    }

    #[rstest]
    #[case::xmlrpc(ContentKind::XmlRpc)]
    #[case::soap(ContentKind::Soap)]
    fn surfaces_remote_faults(#[case] protocol: ContentKind) {
        let body = codec_for(protocol)
            .encode_fault(&Default::default(), &Fault::invalid_params("bad"))
            .expect("encode");
        let mut wire = MockWire::new();
        wire.expect_call()
            .returning(move |_, _| Ok(body.clone()));

        let error = Invoker::new(protocol, wire)
            .invoke("T.a", vec![json!(1)])
            .expect_err("fault");
        let fault = error.fault().expect("remote fault");
        assert_eq!(fault.kind(), FaultKind::InvalidParams);
        assert_eq!(fault.message(), "bad");
    }

    #[test]
    fn transport_failures_are_reported() {
        let mut wire = MockWire::new();
        wire.expect_call()
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
        let error = Invoker::new(ContentKind::Json, wire)
            .invoke("T.a", vec![])
            .expect_err("transport failure");
        assert!(matches!(error, InvokeError::Transport(_)));
    }
}
