//! The dispatcher and its builder.

use std::fmt;
use std::sync::Arc;

use rpcmux_config::EngineConfig;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::DISPATCH_TARGET;
use super::invoke::invoke_audited;
use crate::codec::{ProtocolCodec, ResponseContext, codec_for};
use crate::fault::Fault;
use crate::hooks::{Audit, StructuredTracer, TraceRecord, Tracer};
use crate::registry::HandlerRegistry;
use crate::resolver::{MethodResolver, QualifiedName};
use crate::sniff::{ContentKind, classify};
use crate::transport::{RawRequest, Transport};

/// How an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A result was written.
    Answered(ContentKind),
    /// A fault with the given code was written.
    Faulted(ContentKind, i32),
    /// The request could not be read; nothing was written.
    Unread,
    /// The transport refused the method; nothing was written.
    Refused(ContentKind),
    /// No response body could be produced; nothing was written.
    Unencodable(ContentKind),
    /// The response could not be written.
    WriteFailed(ContentKind),
}

/// Runs request/response exchanges against a shared handler registry.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    resolver: MethodResolver,
    audit: Option<Arc<dyn Audit>>,
    tracer: Arc<dyn Tracer>,
    config: EngineConfig,
    protocol: Option<ContentKind>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("audit", &self.audit.is_some())
            .field("config", &self.config)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: Option<Arc<HandlerRegistry>>,
    audit: Option<Arc<dyn Audit>>,
    tracer: Option<Arc<dyn Tracer>>,
    config: EngineConfig,
    protocol: Option<ContentKind>,
}

impl DispatcherBuilder {
    /// Uses a shared registry instead of a fresh one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Installs the audit hook.
    #[must_use]
    pub fn audit(mut self, audit: impl Audit + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Replaces the default [`StructuredTracer`].
    #[must_use]
    pub fn tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    /// Applies engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Pins the dispatcher to one protocol, ignoring declarations and
    /// skipping content sniffing.
    #[must_use]
    pub fn protocol(mut self, protocol: ContentKind) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Builds the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        let registry = self.registry.unwrap_or_default();
        Dispatcher {
            resolver: MethodResolver::new(Arc::clone(&registry)),
            registry,
            audit: self.audit,
            tracer: self
                .tracer
                .unwrap_or_else(|| Arc::new(StructuredTracer::new())),
            config: self.config,
            protocol: self.protocol,
        }
    }
}

/// Per-exchange state once the protocol is known.
struct Exchange<'a> {
    codec: &'static dyn ProtocolCodec,
    request: &'a RawRequest,
    encoding: Option<String>,
}

impl Exchange<'_> {
    fn kind(&self) -> ContentKind {
        self.codec.kind()
    }

    fn context<'c>(&'c self, id: Option<&'c Value>) -> ResponseContext<'c> {
        ResponseContext {
            id,
            encoding: self.encoding.as_deref(),
        }
    }
}

impl Dispatcher {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Creates a multi-protocol dispatcher over `registry` with default
    /// configuration, no audit, and the [`StructuredTracer`].
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::builder().registry(registry).build()
    }

    /// Registry consulted by this dispatcher.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Runs one exchange, relying on the transport's declaration or on
    /// sniffing to pick the protocol.
    pub fn dispatch(&self, transport: &mut dyn Transport) -> DispatchOutcome {
        self.dispatch_with(transport, None)
    }

    /// Runs one exchange for a caller that already knows the protocol.
    pub fn dispatch_with(
        &self,
        transport: &mut dyn Transport,
        declared: Option<ContentKind>,
    ) -> DispatchOutcome {
        let declared = self.protocol.or(declared);
        let request = match transport.read_request(declared) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                return DispatchOutcome::Unread;
            }
        };

        let kind = declared
            .or_else(|| request.declared_kind())
            .unwrap_or_else(|| classify(&request.body));
        let exchange = Exchange {
            codec: codec_for(kind),
            request: &request,
            encoding: transport
                .encoding()
                .filter(|name| !name.trim().is_empty())
                .or_else(|| self.config.default_encoding().map(str::to_owned)),
        };
        debug!(target: DISPATCH_TARGET, protocol = %kind, "dispatching request");
        self.run(transport, &exchange)
    }

    fn run(&self, transport: &mut dyn Transport, exchange: &Exchange<'_>) -> DispatchOutcome {
        let call = match exchange.codec.decode_request(&exchange.request.body) {
            Ok(call) => call,
            Err(failure) => {
                warn!(
                    target: DISPATCH_TARGET,
                    protocol = %exchange.kind(),
                    code = failure.fault.code(),
                    message = failure.fault.message(),
                    "rejected request"
                );
                self.trace_failure(exchange, None, failure.fault.message());
                let fault = self.scrub(failure.fault);
                return self.send_fault(transport, exchange, failure.id.as_ref(), None, &fault);
            }
        };

        let method = if QualifiedName::is_qualified(&call.method) {
            call.method.clone()
        } else {
            QualifiedName::complete(&call.method, exchange.request.namespace_hint.as_deref())
        };

        if !transport.check_authorization(&method) {
            warn!(target: DISPATCH_TARGET, method = %method, "method not authorised");
            return DispatchOutcome::Refused(exchange.kind());
        }

        let resolved = match self.resolver.resolve(&method, &call.params) {
            Ok(resolved) => resolved,
            Err(fault) => {
                warn!(
                    target: DISPATCH_TARGET,
                    method = %method,
                    code = fault.code(),
                    message = fault.message(),
                    "resolution failed"
                );
                self.trace_failure(exchange, Some(&method), fault.message());
                return self.send_fault(transport, exchange, call.id.as_ref(), Some(&method), &fault);
            }
        };

        match invoke_audited(self.audit.as_deref(), &resolved) {
            Ok(result) => self.send_result(transport, exchange, call.id.as_ref(), &method, &result),
            Err(failure) => {
                let fault = Fault::from_failure(&failure, self.config.failure_detail());
                debug!(
                    target: DISPATCH_TARGET,
                    method = %method,
                    code = fault.code(),
                    error = %format!("{failure:#}"),
                    "invocation failed"
                );
                self.trace_failure(exchange, Some(&method), &format!("{failure:#}"));
                self.send_fault(transport, exchange, call.id.as_ref(), Some(&method), &fault)
            }
        }
    }

    /// Drops engine-generated detail when configured to.
    fn scrub(&self, fault: Fault) -> Fault {
        if self.config.failure_detail() {
            fault
        } else {
            fault.without_detail()
        }
    }

    fn send_result(
        &self,
        transport: &mut dyn Transport,
        exchange: &Exchange<'_>,
        id: Option<&Value>,
        method: &str,
        result: &Value,
    ) -> DispatchOutcome {
        match exchange.codec.encode_result(&exchange.context(id), result) {
            Ok(body) => self.send(
                transport,
                exchange,
                Some(method),
                &body,
                DispatchOutcome::Answered(exchange.kind()),
            ),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, method, %error, "failed to encode result");
                let fault = Fault::internal(format!("unable to encode result: {error}"));
                self.send_fault(transport, exchange, id, Some(method), &fault)
            }
        }
    }

    fn send_fault(
        &self,
        transport: &mut dyn Transport,
        exchange: &Exchange<'_>,
        id: Option<&Value>,
        method: Option<&str>,
        fault: &Fault,
    ) -> DispatchOutcome {
        match exchange.codec.encode_fault(&exchange.context(id), fault) {
            Ok(body) => self.send(
                transport,
                exchange,
                method,
                &body,
                DispatchOutcome::Faulted(exchange.kind(), fault.code()),
            ),
            Err(encode_error) => {
                error!(
                    target: DISPATCH_TARGET,
                    error = %encode_error,
                    code = fault.code(),
                    "failed to encode fault"
                );
                DispatchOutcome::Unencodable(exchange.kind())
            }
        }
    }

    fn send(
        &self,
        transport: &mut dyn Transport,
        exchange: &Exchange<'_>,
        method: Option<&str>,
        body: &str,
        outcome: DispatchOutcome,
    ) -> DispatchOutcome {
        self.trace(&TraceRecord {
            protocol: exchange.kind(),
            request: &exchange.request.body,
            response: Some(body),
            method,
            failure: None,
        });

        let written =
            transport.write_response(exchange.codec.content_type(), body, exchange.codec.chunked());
        match written {
            Ok(()) => outcome,
            Err(write_error) => {
                warn!(target: DISPATCH_TARGET, error = %write_error, "failed to write response");
                let failure = write_error.to_string();
                self.trace(&TraceRecord {
                    protocol: exchange.kind(),
                    request: &exchange.request.body,
                    response: Some(body),
                    method,
                    failure: Some(&failure),
                });
                DispatchOutcome::WriteFailed(exchange.kind())
            }
        }
    }

    fn trace_failure(&self, exchange: &Exchange<'_>, method: Option<&str>, failure: &str) {
        self.trace(&TraceRecord {
            protocol: exchange.kind(),
            request: &exchange.request.body,
            response: None,
            method,
            failure: Some(failure),
        });
    }

    fn trace(&self, record: &TraceRecord<'_>) {
        if let Err(trace_error) = self.tracer.trace(record) {
            warn!(
                target: DISPATCH_TARGET,
                error = %format!("{trace_error:#}"),
                "tracer failed"
            );
        }
    }
}
