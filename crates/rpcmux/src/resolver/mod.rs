//! Qualified-name splitting, handler lookup and overload resolution.
//!
//! Resolution runs in two steps. The handler named by the qualified method
//! name is looked up in the [`HandlerRegistry`], performing the naming
//! service lookup for deferred entries. The handler's signatures are then
//! scanned in declaration order: the first overload that binds strictly
//! wins; failing that, only the *last* same-named overload is retried with
//! loose coercion.

mod coerce;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::fault::Fault;
use crate::handler::{RpcHandler, Signature};
use crate::registry::{HandlerRegistry, RegistryError};
use crate::value::{render_args, type_label};

pub use self::coerce::MatchPass;

const RESOLVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resolver");

/// Separator between handler and method names.
pub const NAMESPACE_SEPARATOR: char = '.';

/// A `<handler>.<method>` name split on its first separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    handler: String,
    method: String,
}

impl QualifiedName {
    /// Splits `name` on its first separator.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request [`Fault`] when the name is empty, has no
    /// separator, or has an empty handler part.
    pub fn parse(name: &str) -> Result<Self, Fault> {
        match name.split_once(NAMESPACE_SEPARATOR) {
            Some((handler, method)) if !handler.is_empty() => Ok(Self {
                handler: handler.to_owned(),
                method: method.to_owned(),
            }),
            _ => Err(Fault::invalid_request("invalid method name")),
        }
    }

    /// Whether `name` already carries a namespace.
    #[must_use]
    pub fn is_qualified(name: &str) -> bool {
        name.contains(NAMESPACE_SEPARATOR)
    }

    /// Prefixes a bare method name with a namespace hint such as a REST
    /// path. Leading slashes of the hint are ignored; an empty hint leaves
    /// the name unchanged.
    #[must_use]
    pub fn complete(method: &str, namespace_hint: Option<&str>) -> String {
        match namespace_hint.map(|hint| hint.trim_start_matches('/')) {
            Some(hint) if !hint.is_empty() => format!("{hint}{NAMESPACE_SEPARATOR}{method}"),
            _ => method.to_owned(),
        }
    }

    /// Handler part.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Method part.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}{NAMESPACE_SEPARATOR}{}",
            self.handler, self.method
        )
    }
}

/// Overload chosen for a call and its coerced arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Index of the chosen signature in the handler's table.
    pub index: usize,
    /// Arguments coerced to the chosen signature.
    pub args: Vec<Value>,
    /// Pass that produced the binding.
    pub pass: MatchPass,
}

/// Handler, overload and arguments ready for invocation.
pub struct ResolvedInvocation {
    name: QualifiedName,
    handler: Arc<dyn RpcHandler>,
    signature: Signature,
    binding: Binding,
}

impl ResolvedInvocation {
    /// Registered handler name.
    #[must_use]
    pub fn handler_name(&self) -> &str {
        self.name.handler()
    }

    /// Method name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        self.name.method()
    }

    /// Handler instance.
    #[must_use]
    pub fn handler(&self) -> &dyn RpcHandler {
        self.handler.as_ref()
    }

    /// Chosen signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Coerced arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.binding.args
    }

    /// Pass that bound the arguments.
    #[must_use]
    pub fn pass(&self) -> MatchPass {
        self.binding.pass
    }

    /// Calls the chosen method.
    ///
    /// # Errors
    ///
    /// Returns the handler's failure unchanged.
    pub fn invoke(&self) -> anyhow::Result<Value> {
        self.handler
            .invoke(self.binding.index, self.binding.args.clone())
    }
}

impl fmt::Debug for ResolvedInvocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResolvedInvocation")
            .field("name", &self.name)
            .field("handler", &self.handler.type_name())
            .field("signature", &self.signature)
            .field("binding", &self.binding)
            .finish()
    }
}

/// Resolves qualified method names against a registry.
#[derive(Debug, Clone)]
pub struct MethodResolver {
    registry: Arc<HandlerRegistry>,
}

impl MethodResolver {
    /// Creates a resolver over `registry`.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves `qualified_name` and binds `args`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request [`Fault`] for malformed names, an
    /// internal-error fault when the registry is unusable, and a
    /// method-not-found fault when the handler, the lookup, or the method
    /// fails.
    pub fn resolve(
        &self,
        qualified_name: &str,
        args: &[Value],
    ) -> Result<ResolvedInvocation, Fault> {
        let name = QualifiedName::parse(qualified_name)?;
        let handler = self.lookup_handler(name.handler())?;
        let binding = resolve_method(handler.as_ref(), name.method(), args)?;
        let signature = handler
            .signatures()
            .get(binding.index)
            .cloned()
            .ok_or_else(|| Fault::internal("resolved signature disappeared"))?;

        debug!(
            target: RESOLVER_TARGET,
            handler = name.handler(),
            signature = %signature,
            pass = ?binding.pass,
            "resolved method"
        );

        Ok(ResolvedInvocation {
            name,
            handler,
            signature,
            binding,
        })
    }

    fn lookup_handler(&self, handler_name: &str) -> Result<Arc<dyn RpcHandler>, Fault> {
        let entry = self
            .registry
            .get(handler_name)
            .map_err(|error: RegistryError| Fault::internal(error.to_string()))?;
        let Some(entry) = entry else {
            return Err(Fault::method_not_found(format!(
                "handler {handler_name} not found"
            )));
        };
        entry.resolve().map_err(|error| {
            warn!(
                target: RESOLVER_TARGET,
                handler = handler_name,
                error = %format!("{error:#}"),
                "handler lookup failed"
            );
            Fault::method_not_found(format!("handler {handler_name} not available"))
        })
    }
}

/// Picks the overload of `method` on `handler` that accepts `args`.
///
/// # Errors
///
/// Returns a method-not-found [`Fault`] whose message names the method and
/// renders the original arguments.
pub fn resolve_method(
    handler: &dyn RpcHandler,
    method: &str,
    args: &[Value],
) -> Result<Binding, Fault> {
    let mut last_same_name = None;
    for (index, signature) in handler.signatures().iter().enumerate() {
        if signature.name() != method {
            continue;
        }
        last_same_name = Some((index, signature));
        if let Some(bound) = coerce::bind(signature.params(), args, MatchPass::Strict) {
            return Ok(Binding {
                index,
                args: bound,
                pass: MatchPass::Strict,
            });
        }
    }

    last_same_name
        .and_then(|(index, signature)| {
            coerce::bind(signature.params(), args, MatchPass::Loose).map(|bound| Binding {
                index,
                args: bound,
                pass: MatchPass::Loose,
            })
        })
        .ok_or_else(|| {
            debug!(
                target: RESOLVER_TARGET,
                method,
                argument_types = ?args.iter().map(type_label).collect::<Vec<_>>(),
                "no overload accepts the arguments"
            );
            Fault::method_not_found(format!("method {method}({}) not found", render_args(args)))
        })
}
