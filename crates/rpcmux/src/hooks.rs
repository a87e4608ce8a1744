//! Audit and trace extension points around invocation.
//!
//! [`Audit`] sees every invocation and may override its outcome. [`Tracer`]
//! observes each composed response; it is best effort and its failures are
//! logged and otherwise ignored.

use std::sync::Arc;
use std::time::Instant;

use rpcmux_config::EXCHANGE_TARGET as TRACE_TARGET;
use serde_json::Value;

use crate::handler::RpcHandler;
use crate::sniff::ContentKind;

/// Invocation visible to audit hooks.
#[derive(Clone, Copy)]
pub struct AuditContext<'a> {
    /// Registered handler name.
    pub handler_name: &'a str,
    /// Method name without namespace.
    pub method_name: &'a str,
    /// Handler about to be, or just, invoked.
    pub handler: &'a dyn RpcHandler,
    /// Coerced arguments.
    pub args: &'a [Value],
}

/// Pre and post invocation hook.
pub trait Audit: Send + Sync {
    /// Invoked after resolution, before the handler runs.
    ///
    /// Returning `Ok(Some(value))` skips the invocation and makes `value`
    /// the result.
    ///
    /// # Errors
    ///
    /// An error becomes the invocation outcome.
    fn before_invoke(&self, context: &AuditContext<'_>) -> anyhow::Result<Option<Value>>;

    /// Invoked with the outcome of the handler.
    ///
    /// Returning `Ok(Some(value))` replaces the outcome with a success.
    ///
    /// # Errors
    ///
    /// On a successful invocation the error becomes the outcome. When the
    /// invocation had already failed, the original failure is kept.
    fn after_invoke(
        &self,
        context: &AuditContext<'_>,
        started: Instant,
        outcome: Result<&Value, &anyhow::Error>,
    ) -> anyhow::Result<Option<Value>>;
}

impl<T> Audit for Arc<T>
where
    T: Audit + ?Sized,
{
    fn before_invoke(&self, context: &AuditContext<'_>) -> anyhow::Result<Option<Value>> {
        (**self).before_invoke(context)
    }

    fn after_invoke(
        &self,
        context: &AuditContext<'_>,
        started: Instant,
        outcome: Result<&Value, &anyhow::Error>,
    ) -> anyhow::Result<Option<Value>> {
        (**self).after_invoke(context, started, outcome)
    }
}

/// One request/response exchange as seen by a [`Tracer`].
#[derive(Debug, Clone, Copy)]
pub struct TraceRecord<'a> {
    /// Protocol of the exchange.
    pub protocol: ContentKind,
    /// Raw request body.
    pub request: &'a str,
    /// Raw response body, when one was composed.
    pub response: Option<&'a str>,
    /// Qualified method name, when decoding got that far.
    pub method: Option<&'a str>,
    /// Failure description, for decode, invocation and write failures.
    pub failure: Option<&'a str>,
}

/// Observational hook receiving each exchange.
pub trait Tracer: Send + Sync {
    /// Records an exchange.
    ///
    /// # Errors
    ///
    /// Errors are logged by the dispatcher and never change the response.
    fn trace(&self, record: &TraceRecord<'_>) -> anyhow::Result<()>;
}

impl<T> Tracer for Arc<T>
where
    T: Tracer + ?Sized,
{
    fn trace(&self, record: &TraceRecord<'_>) -> anyhow::Result<()> {
        (**self).trace(record)
    }
}

/// Tracer that records exchanges through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredTracer;

impl StructuredTracer {
    /// Builds a new tracer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Tracer for StructuredTracer {
    fn trace(&self, record: &TraceRecord<'_>) -> anyhow::Result<()> {
        match record.failure {
            Some(failure) => tracing::warn!(
                target: TRACE_TARGET,
                protocol = %record.protocol,
                method = record.method.unwrap_or_default(),
                request = record.request,
                response = record.response.unwrap_or_default(),
                failure,
                "rpc exchange failed"
            ),
            None => tracing::debug!(
                target: TRACE_TARGET,
                protocol = %record.protocol,
                method = record.method.unwrap_or_default(),
                request = record.request,
                response = record.response.unwrap_or_default(),
                "rpc exchange"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_tracer_never_fails() {
        let tracer = StructuredTracer::new();
        let record = TraceRecord {
            protocol: ContentKind::Json,
            request: "{}",
            response: None,
            method: None,
            failure: Some("unable to parse json-rpc request"),
        };
        assert!(tracer.trace(&record).is_ok());
        assert!(Arc::new(tracer).trace(&record).is_ok());
    }
}
