//! Handler capability tables.
//!
//! Handlers expose their callable methods through a [`MethodTable`]: an
//! ordered list of signatures (parameter kinds) paired with type-erased
//! invokers. Method resolution works purely on the signature data; the
//! invoker converts the already-coerced argument values into the native
//! parameter types with `serde` and calls the method.
//!
//! ```
//! use rpcmux::handler::{MethodTable, Service};
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn hello(&self, name: String) -> anyhow::Result<String> {
//!         Ok(format!("Hello {name}!"))
//!     }
//! }
//!
//! let service = Service::new(Greeter, MethodTable::new().method("hello", Greeter::hello));
//! # let _ = service;
//! ```

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fault::Fault;

/// Declared kind of a method parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Accepts any value unchanged.
    Any,
    /// Boolean.
    Bool,
    /// Whole number within the given range.
    Integer(IntRange),
    /// Floating point number of the given width.
    Float(FloatWidth),
    /// String.
    Text,
    /// Array whose elements have the given kind.
    Sequence(Box<ParamKind>),
    /// Object with arbitrary members.
    Mapping,
    /// Object deserialisable into a concrete type.
    Structured(StructuredKind),
    /// Null or the inner kind.
    Optional(Box<ParamKind>),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => formatter.write_str("any"),
            Self::Bool => formatter.write_str("bool"),
            Self::Integer(range) => range.fmt(formatter),
            Self::Float(FloatWidth::Single) => formatter.write_str("float"),
            Self::Float(FloatWidth::Double) => formatter.write_str("double"),
            Self::Text => formatter.write_str("string"),
            Self::Sequence(element) => write!(formatter, "list<{element}>"),
            Self::Mapping => formatter.write_str("map"),
            Self::Structured(kind) => formatter.write_str(kind.type_name()),
            Self::Optional(inner) => write!(formatter, "{inner}?"),
        }
    }
}

/// Inclusive bounds of an integer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    min: i128,
    max: i128,
}

impl IntRange {
    /// Range of `i32`.
    pub const I32: Self = Self::new(i32::MIN as i128, i32::MAX as i128);
    /// Range of `i64`.
    pub const I64: Self = Self::new(i64::MIN as i128, i64::MAX as i128);
    /// Range of `u64`.
    pub const U64: Self = Self::new(0, u64::MAX as i128);

    /// Builds the range `min..=max`.
    #[must_use]
    pub const fn new(min: i128, max: i128) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the range.
    #[must_use]
    pub const fn contains(self, value: i128) -> bool {
        self.min <= value && value <= self.max
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self
            .max
            .checked_add(1)
            .filter(|bound| bound.count_ones() == 1)
            .map(i128::trailing_zeros);
        match (self.min, bits) {
            (0, Some(bits)) => write!(formatter, "u{bits}"),
            (min, Some(bits)) if min == -self.max - 1 => write!(formatter, "i{}", bits + 1),
            (min, _) => write!(formatter, "int[{min}..={}]", self.max),
        }
    }
}

/// Width of a floating point parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    /// `f32`; finite values beyond `f32::MAX` are rejected.
    Single,
    /// `f64`.
    Double,
}

/// Descriptor of a structured parameter type.
#[derive(Clone, Copy)]
pub struct StructuredKind {
    type_name: &'static str,
    accepts: fn(&Value) -> bool,
}

impl StructuredKind {
    /// Builds the descriptor for `T`.
    #[must_use]
    pub fn of<T: DeserializeOwned>() -> Self {
        Self {
            type_name: type_name::<T>(),
            accepts: accepts_as::<T>,
        }
    }

    /// Name of the target type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether `value` deserialises into the target type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        (self.accepts)(value)
    }
}

impl fmt::Debug for StructuredKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StructuredKind")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for StructuredKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

fn accepts_as<T: DeserializeOwned>(value: &Value) -> bool {
    serde_json::from_value::<T>(value.clone()).is_ok()
}

/// Native types usable as method parameters.
pub trait RpcParam: DeserializeOwned {
    /// Parameter kind advertised in the method signature.
    fn kind() -> ParamKind;
}

macro_rules! impl_rpc_param {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl RpcParam for $ty {
                fn kind() -> ParamKind {
                    $kind
                }
            }
        )+
    };
}

impl_rpc_param!(ParamKind::Bool => bool);
macro_rules! impl_rpc_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl RpcParam for $ty {
                fn kind() -> ParamKind {
                    ParamKind::Integer(IntRange::new(<$ty>::MIN as i128, <$ty>::MAX as i128))
                }
            }
        )+
    };
}

impl_rpc_integer!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
impl_rpc_param!(ParamKind::Float(FloatWidth::Single) => f32);
impl_rpc_param!(ParamKind::Float(FloatWidth::Double) => f64);
impl_rpc_param!(ParamKind::Text => String);
impl_rpc_param!(ParamKind::Any => Value);
impl_rpc_param!(ParamKind::Mapping => Map<String, Value>);

impl<T: RpcParam> RpcParam for Vec<T> {
    fn kind() -> ParamKind {
        ParamKind::Sequence(Box::new(T::kind()))
    }
}

impl<T: RpcParam> RpcParam for Option<T> {
    fn kind() -> ParamKind {
        ParamKind::Optional(Box::new(T::kind()))
    }
}

impl<T: DeserializeOwned> RpcParam for HashMap<String, T> {
    fn kind() -> ParamKind {
        ParamKind::Mapping
    }
}

impl<T: DeserializeOwned> RpcParam for BTreeMap<String, T> {
    fn kind() -> ParamKind {
        ParamKind::Mapping
    }
}

/// Wrapper marking a parameter as a structured object of type `T`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Structured<T>(pub T);

impl<T: DeserializeOwned> RpcParam for Structured<T> {
    fn kind() -> ParamKind {
        ParamKind::Structured(StructuredKind::of::<T>())
    }
}

/// Name and parameter kinds of one callable method.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<ParamKind>,
}

impl Signature {
    /// Builds a signature.
    pub fn new(name: impl Into<String>, params: Vec<ParamKind>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter kinds in order.
    #[must_use]
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                formatter.write_str(", ")?;
            }
            write!(formatter, "{param}")?;
        }
        formatter.write_str(")")
    }
}

/// Type-erased method body.
pub type Invoker<H> = Box<dyn Fn(&H, Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Conversion of a native method or closure into a table entry.
///
/// Implemented for every `Fn(&H, A1, .., An) -> Result<R, E>` with up to
/// eight parameters, where each `Ai` is an [`RpcParam`], `R` is
/// `Serialize` and `E` converts into `anyhow::Error`.
pub trait IntoMethod<H, Args>: Send + Sync + 'static {
    /// Parameter kinds in declaration order.
    fn params() -> Vec<ParamKind>;

    /// Erases the method into an invoker.
    fn into_invoker(self) -> Invoker<H>;
}

fn next_arg<T: RpcParam>(
    args: &mut impl Iterator<Item = (usize, Value)>,
    position: usize,
) -> anyhow::Result<T> {
    let Some((index, value)) = args.next() else {
        return Err(Fault::invalid_params(format!("missing argument {position}")).into());
    };
    serde_json::from_value(value).map_err(|error| {
        Fault::invalid_params(format!("invalid argument {index}: {error}")).into()
    })
}

macro_rules! impl_into_method {
    ($($ty:ident $var:ident $pos:literal),*) => {
        impl<H, F, R, E, $($ty,)*> IntoMethod<H, ($($ty,)*)> for F
        where
            H: 'static,
            F: Fn(&H, $($ty),*) -> Result<R, E> + Send + Sync + 'static,
            R: Serialize + 'static,
            E: Into<anyhow::Error> + 'static,
            $($ty: RpcParam + 'static,)*
        {
            fn params() -> Vec<ParamKind> {
                vec![$($ty::kind()),*]
            }

            fn into_invoker(self) -> Invoker<H> {
                Box::new(move |handler: &H, args: Vec<Value>| -> anyhow::Result<Value> {
                    #[allow(unused_mut, unused_variables, reason = "zero-arity methods read no arguments")]
                    let mut args = args.into_iter().enumerate();
                    $(let $var = next_arg::<$ty>(&mut args, $pos)?;)*
                    let output = (self)(handler, $($var),*).map_err(Into::into)?;
                    Ok(serde_json::to_value(output)?)
                })
            }
        }
    };
}

impl_into_method!();
impl_into_method!(A1 a1 0);
impl_into_method!(A1 a1 0, A2 a2 1);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4, A6 a6 5);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4, A6 a6 5, A7 a7 6);
impl_into_method!(A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4, A6 a6 5, A7 a7 6, A8 a8 7);

/// Ordered method table for handler type `H`.
///
/// Declaration order is significant: overload resolution prefers the first
/// strict match and falls back to the last same-named entry.
pub struct MethodTable<H> {
    signatures: Vec<Signature>,
    invokers: Vec<Invoker<H>>,
}

impl<H> MethodTable<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signatures: Vec::new(),
            invokers: Vec::new(),
        }
    }

    /// Appends a method.
    #[must_use]
    pub fn method<Args, F>(mut self, name: &str, method: F) -> Self
    where
        F: IntoMethod<H, Args>,
    {
        self.signatures.push(Signature::new(name, F::params()));
        self.invokers.push(method.into_invoker());
        self
    }

    /// Appends a method whose arguments are handled as raw values.
    ///
    /// Useful for variadic methods: the invoker receives exactly the coerced
    /// argument list matching `params`.
    #[must_use]
    pub fn raw_method<F>(mut self, name: &str, params: Vec<ParamKind>, method: F) -> Self
    where
        F: Fn(&H, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.signatures.push(Signature::new(name, params));
        self.invokers.push(Box::new(method));
        self
    }

    /// Signatures in declaration order.
    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Number of methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    fn invoke(&self, handler: &H, index: usize, args: Vec<Value>) -> anyhow::Result<Value> {
        let Some(invoker) = self.invokers.get(index) else {
            return Err(Fault::internal(format!("no method at table index {index}")).into());
        };
        invoker(handler, args)
    }
}

impl<H> Default for MethodTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for MethodTable<H> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodTable")
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a registered handler.
///
/// Handlers are shared by every concurrent request that names them, hence
/// the `Send + Sync` bound; interior mutability is the implementor's
/// responsibility.
pub trait RpcHandler: Send + Sync {
    /// Name of the handler type, used in logs.
    fn type_name(&self) -> &str;

    /// Public methods in declaration order.
    fn signatures(&self) -> &[Signature];

    /// Invokes the method at `index` of [`RpcHandler::signatures`] with
    /// already-coerced arguments.
    ///
    /// # Errors
    ///
    /// Returns whatever the method returns, or an invalid-params [`Fault`]
    /// when an argument cannot be converted to its native type.
    fn invoke(&self, index: usize, args: Vec<Value>) -> anyhow::Result<Value>;
}

/// A handler instance paired with its method table.
pub struct Service<H> {
    instance: H,
    table: Arc<MethodTable<H>>,
}

impl<H> Service<H> {
    /// Wraps `instance` with a freshly built table.
    pub fn new(instance: H, table: MethodTable<H>) -> Self {
        Self::with_table(instance, Arc::new(table))
    }

    /// Wraps `instance` with a table shared between instances of `H`.
    pub fn with_table(instance: H, table: Arc<MethodTable<H>>) -> Self {
        Self { instance, table }
    }

    /// Borrows the wrapped instance.
    pub fn instance(&self) -> &H {
        &self.instance
    }
}

impl<H> RpcHandler for Service<H>
where
    H: Send + Sync + 'static,
{
    fn type_name(&self) -> &str {
        type_name::<H>()
    }

    fn signatures(&self) -> &[Signature] {
        self.table.signatures()
    }

    fn invoke(&self, index: usize, args: Vec<Value>) -> anyhow::Result<Value> {
        self.table.invoke(&self.instance, index, args)
    }
}

impl<H> fmt::Debug for Service<H> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Service")
            .field("type", &type_name::<H>())
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
