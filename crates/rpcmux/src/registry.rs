//! Named handler registry shared by dispatchers.
//!
//! The registry maps handler names to [`HandlerRef`]s. Entries are either
//! live handler instances or deferred keys resolved through a
//! [`NamingService`] each time a request names them. Mutations take the write
//! lock, so duplicate detection and insertion are atomic with respect to
//! every other mutation and enumeration.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::handler::{RpcHandler, Service};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// External lookup service for deferred handlers.
pub trait NamingService: Send + Sync {
    /// Resolves `key` to a handler instance.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is unknown or the lookup fails. The
    /// error is logged by the resolver and never shown to callers.
    fn lookup(&self, key: &str) -> anyhow::Result<Arc<dyn RpcHandler>>;
}

/// Registered handler reference.
#[derive(Clone)]
pub enum HandlerRef {
    /// Live handler instance.
    Direct(Arc<dyn RpcHandler>),
    /// Key resolved through a naming service at call time.
    Deferred {
        /// Lookup key.
        key: String,
        /// Service performing the lookup.
        naming: Arc<dyn NamingService>,
    },
}

impl HandlerRef {
    /// Wraps a live handler.
    pub fn direct(handler: impl RpcHandler + 'static) -> Self {
        Self::Direct(Arc::new(handler))
    }

    /// Builds a deferred reference.
    pub fn deferred(key: impl Into<String>, naming: Arc<dyn NamingService>) -> Self {
        Self::Deferred {
            key: key.into(),
            naming,
        }
    }

    /// Produces the handler instance, performing the lookup for deferred
    /// references.
    ///
    /// # Errors
    ///
    /// Propagates the naming service failure.
    pub fn resolve(&self) -> anyhow::Result<Arc<dyn RpcHandler>> {
        match self {
            Self::Direct(handler) => Ok(Arc::clone(handler)),
            Self::Deferred { key, naming } => naming.lookup(key),
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(handler) => formatter
                .debug_tuple("Direct")
                .field(&handler.type_name())
                .finish(),
            Self::Deferred { key, .. } => formatter
                .debug_struct("Deferred")
                .field("key", key)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Arc<dyn RpcHandler>> for HandlerRef {
    fn from(handler: Arc<dyn RpcHandler>) -> Self {
        Self::Direct(handler)
    }
}

impl<H> From<Service<H>> for HandlerRef
where
    H: Send + Sync + 'static,
{
    fn from(service: Service<H>) -> Self {
        Self::direct(service)
    }
}

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A handler is already registered under the name.
    #[error("handler {name} already exists")]
    Duplicate { name: String },
    /// A thread panicked while holding the registry lock.
    #[error("handler registry lock poisoned")]
    Poisoned,
}

/// Name → handler mapping.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, HandlerRef>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] without touching the existing
    /// entry when `name` is taken.
    pub fn add_handler(
        &self,
        name: impl Into<String>,
        handler: impl Into<HandlerRef>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut handlers = self.handlers.write().map_err(|_| RegistryError::Poisoned)?;
        if handlers.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        debug!(target: REGISTRY_TARGET, handler = %name, "registering handler");
        handlers.insert(name, handler.into());
        Ok(())
    }

    /// Removes the handler registered under `name`, if any.
    ///
    /// Returns whether an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if the lock is poisoned.
    pub fn remove_handler(&self, name: &str) -> Result<bool, RegistryError> {
        let mut handlers = self.handlers.write().map_err(|_| RegistryError::Poisoned)?;
        let removed = handlers.remove(name).is_some();
        if removed {
            debug!(target: REGISTRY_TARGET, handler = %name, "removed handler");
        }
        Ok(removed)
    }

    /// Looks up the reference registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if the lock is poisoned.
    pub fn get(&self, name: &str) -> Result<Option<HandlerRef>, RegistryError> {
        let handlers = self.handlers.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(handlers.get(name).cloned())
    }

    /// Registered names in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if the lock is poisoned.
    pub fn names(&self) -> Result<Vec<String>, RegistryError> {
        let handlers = self.handlers.read().map_err(|_| RegistryError::Poisoned)?;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = formatter.debug_struct("HandlerRegistry");
        match self.names() {
            Ok(names) => debug.field("handlers", &names),
            Err(_) => debug.field("handlers", &"<poisoned>"),
        };
        debug.finish()
    }
}
