//! Request dispatch across the supported protocols.
//!
//! A [`Dispatcher`] runs one exchange per call:
//!
//! 1. read the raw request from the [`Transport`](crate::transport::Transport);
//! 2. pick the protocol (pinned, declared, or sniffed from the body);
//! 3. decode, completing bare method names with the namespace hint;
//! 4. ask the transport to authorise the method;
//! 5. resolve the handler and overload;
//! 6. invoke, wrapped by the [`Audit`](crate::hooks::Audit) hook;
//! 7. encode the result or fault, trace it, and write it back.
//!
//! Every failure after step 2 is answered with a fault in the request's own
//! protocol. Read failures and authorisation refusals end the exchange
//! without a response.

mod dispatcher;
mod invoke;
#[cfg(test)]
pub(crate) mod test_utils;

pub use self::dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
