//! Invocation wrapped by the audit hook.

use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use super::DISPATCH_TARGET;
use crate::hooks::{Audit, AuditContext};
use crate::resolver::ResolvedInvocation;

/// Invokes `resolved`, letting `audit` short-circuit or override the outcome.
///
/// `after_invoke` runs once per invocation. When it fails while reviewing a
/// failed invocation, the invocation's own failure is returned.
pub(super) fn invoke_audited(
    audit: Option<&dyn Audit>,
    resolved: &ResolvedInvocation,
) -> anyhow::Result<Value> {
    let Some(audit) = audit else {
        return resolved.invoke();
    };

    let context = AuditContext {
        handler_name: resolved.handler_name(),
        method_name: resolved.method_name(),
        handler: resolved.handler(),
        args: resolved.args(),
    };
    let started = Instant::now();

    let invoked = match audit.before_invoke(&context) {
        Ok(Some(overridden)) => return Ok(overridden),
        Ok(None) => resolved.invoke(),
        Err(error) => Err(error),
    };

    match invoked {
        Ok(value) => Ok(audit
            .after_invoke(&context, started, Ok(&value))?
            .unwrap_or(value)),
        Err(error) => match audit.after_invoke(&context, started, Err(&error)) {
            Ok(Some(replacement)) => Ok(replacement),
            Ok(None) => Err(error),
            Err(audit_error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    handler = context.handler_name,
                    method = context.method_name,
                    error = %format!("{audit_error:#}"),
                    "audit failed while reviewing a failed invocation"
                );
                Err(error)
            }
        },
    }
}
