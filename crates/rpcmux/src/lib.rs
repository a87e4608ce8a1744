//! Transport-agnostic RPC engine.
//!
//! `rpcmux` answers JSON-RPC 2.0, XML-RPC and a minimal SOAP envelope over
//! whatever carrier the embedding process provides. A [`Transport`] hands
//! the engine one raw request at a time; the [`Dispatcher`] works out the
//! protocol, decodes the call, resolves it against the handlers in a
//! [`HandlerRegistry`], invokes it and writes back the encoded result or
//! [`Fault`].
//!
//! Handlers publish their methods through a [`MethodTable`]. Overloads are
//! allowed: the resolver first looks for a strict match on the JSON value
//! types, then falls back to a loose pass that coerces scalars.
//!
//! ```
//! use std::io::Cursor;
//!
//! use rpcmux::{Dispatcher, HandlerRegistry, IoTransport, MethodTable, Service};
//!
//! struct Greeter;
//!
//! let registry = HandlerRegistry::new();
//! registry
//!     .add_handler(
//!         "TEST",
//!         Service::new(
//!             Greeter,
//!             MethodTable::new().method("hello", |_: &Greeter, name: String| {
//!                 Ok::<_, anyhow::Error>(format!("Hello {name}!"))
//!             }),
//!         ),
//!     )
//!     .expect("register");
//!
//! let request = r#"{"jsonrpc":"2.0","id":1,"method":"TEST.hello","params":["World"]}"#;
//! let mut transport = IoTransport::new(Cursor::new(request), Vec::new());
//! Dispatcher::new(registry.into()).dispatch(&mut transport);
//!
//! let response = String::from_utf8(transport.into_writer()).expect("utf-8");
//! assert_eq!(response, r#"{"jsonrpc":"2.0","id":1,"result":"Hello World!"}"#);
//! ```
//!
//! ## Hooks
//!
//! An [`Audit`] implementation sees every invocation before and after it
//! runs and may replace its outcome. A [`Tracer`] receives each request
//! together with the response written for it. Both are optional; the
//! default tracer logs through `tracing`.

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod fault;
pub mod handler;
pub mod hooks;
pub mod registry;
pub mod resolver;
pub mod sniff;
pub mod telemetry;
pub mod transport;
pub mod value;

pub use client::{ClientTransport, InvokeError, Invoker, Loopback};
pub use dispatch::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use fault::{Fault, FaultKind};
pub use handler::{MethodTable, RpcHandler, Service};
pub use hooks::{Audit, AuditContext, StructuredTracer, TraceRecord, Tracer};
pub use registry::{HandlerRef, HandlerRegistry, NamingService, RegistryError};
pub use resolver::{MethodResolver, QualifiedName};
pub use rpcmux_config::{EngineConfig, ExchangeLogging, LogFormat};
pub use serde_json::Value;
pub use sniff::{ContentKind, classify};
pub use transport::{IoTransport, RawRequest, Transport};

#[cfg(test)]
mod tests;
