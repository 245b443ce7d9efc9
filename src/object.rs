//! Capability lookup for property, method and index access.
//!
//! Every value that can be the target of `.name`, `.name(args)` or `[key]`
//! exposes a [`Capabilities`] table: a list of named callables with declared
//! parameter kinds. Built-in values (strings, lists, maps, integers,
//! booleans) use tables from [`crate::builtins`]; caller types implement
//! [`HostObject`] and register their own.
//!
//! ```ignore
//! static PERSON: Lazy<Capabilities> = Lazy::new(|| {
//!     Capabilities::builder("Person")
//!         .method("getName", &[], |p: &Person, _| Ok(p.name.clone().into()))
//!         .build()
//! });
//! ```

use crate::builtins;
use crate::error::EvaluationErrorKind;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Access to the concrete type behind a `dyn HostObject`.
///
/// Implemented for every `'static` type; call it on `&dyn HostObject`, never
/// on the `Arc` holding it.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A caller-defined value usable in templates.
///
/// `Display` is how the object renders, and also what `==` compares.
pub trait HostObject: AsAny + fmt::Debug + fmt::Display + Send + Sync {
    fn type_name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    /// Objects behaving like collections can report emptiness here.
    fn is_truthy(&self) -> bool {
        true
    }
}

/// Failure reported by a host method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvokeError(String);

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Declared kind of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Any,
    Bool,
    Int,
    String,
    List,
    Map,
    Object,
}

impl Param {
    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Param::Any, _)
                | (Param::Bool, Value::Bool(_))
                | (Param::Int, Value::Int(_))
                | (Param::String, Value::String(_) | Value::Null)
                | (Param::List, Value::List(_) | Value::Null)
                | (Param::Map, Value::Map(_) | Value::Null)
                | (Param::Object, Value::Object(_) | Value::Null)
        )
    }

    fn at_least_as_narrow_as(self, other: Param) -> bool {
        self == other || other == Param::Any
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Param::Any => "any",
            Param::Bool => "boolean",
            Param::Int => "int",
            Param::String => "string",
            Param::List => "list",
            Param::Map => "map",
            Param::Object => "object",
        })
    }
}

/// Where a method comes from relative to the receiver's own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Declared (or overridden) by the type itself.
    Declared,
    /// Inherited from an ancestor this many levels up.
    Inherited(u8),
    /// Compiler-generated forwarding shim; only used when nothing else applies.
    Bridge,
}

impl Origin {
    fn rank(self) -> u16 {
        match self {
            Origin::Declared => 0,
            Origin::Inherited(depth) => u16::from(depth) + 1,
            Origin::Bridge => u16::MAX,
        }
    }
}

type Invoke = Box<dyn Fn(&dyn Any, &[Value]) -> Result<Value, InvokeError> + Send + Sync>;

pub struct Method {
    name: String,
    params: Vec<Param>,
    origin: Origin,
    invoke: Invoke,
}

impl Method {
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        let origin = match self.origin {
            Origin::Declared => String::new(),
            Origin::Inherited(depth) => format!(" (inherited, depth {depth})"),
            Origin::Bridge => " (bridge)".to_string(),
        };
        format!("{}({}){}", self.name, params.join(", "), origin)
    }

    fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(p, a)| p.accepts(a))
    }

    /// Strictly preferable to `other` for the same call.
    fn dominates(&self, other: &Method) -> bool {
        if self.params == other.params {
            return self.origin.rank() < other.origin.rank();
        }
        self.params
            .iter()
            .zip(&other.params)
            .all(|(a, b)| a.at_least_as_narrow_as(*b))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Outcome of looking a call up in a [`Capabilities`] table.
#[derive(Debug)]
pub enum Resolution<'a> {
    Found(&'a Method),
    Missing,
    Ambiguous(Vec<&'a Method>),
}

/// The methods one type exposes to templates.
pub struct Capabilities {
    type_name: String,
    methods: Vec<Method>,
}

impl Capabilities {
    pub fn builder(type_name: impl Into<String>) -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            caps: Capabilities {
                type_name: type_name.into(),
                methods: Vec::new(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn has(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    /// Pick the single most specific method `name` that accepts `args`.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Resolution<'_> {
        let applicable: Vec<&Method> = self
            .methods
            .iter()
            .filter(|m| m.name == name && m.accepts(args))
            .collect();

        // Bridges only count when nothing real applies.
        let candidates: Vec<&Method> = if applicable.iter().any(|m| m.origin != Origin::Bridge) {
            applicable
                .into_iter()
                .filter(|m| m.origin != Origin::Bridge)
                .collect()
        } else {
            applicable
        };

        let best: Vec<&Method> = candidates
            .iter()
            .copied()
            .filter(|m| !candidates.iter().any(|other| other.dominates(m)))
            .collect();

        match best.as_slice() {
            [] => Resolution::Missing,
            [only] => Resolution::Found(only),
            _ => Resolution::Ambiguous(best),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("type_name", &self.type_name)
            .field("methods", &self.methods)
            .finish()
    }
}

pub struct CapabilitiesBuilder {
    caps: Capabilities,
}

impl CapabilitiesBuilder {
    /// A method the type declares itself.
    pub fn method<T, F>(self, name: &str, params: &[Param], f: F) -> Self
    where
        T: Any,
        F: Fn(&T, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.with_origin(Origin::Declared, name, params, f)
    }

    /// A method inherited from an ancestor `depth` levels up.
    pub fn inherited<T, F>(self, depth: u8, name: &str, params: &[Param], f: F) -> Self
    where
        T: Any,
        F: Fn(&T, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.with_origin(Origin::Inherited(depth), name, params, f)
    }

    /// A synthetic forwarding method, shadowed by any real candidate.
    pub fn bridge<T, F>(self, name: &str, params: &[Param], f: F) -> Self
    where
        T: Any,
        F: Fn(&T, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.with_origin(Origin::Bridge, name, params, f)
    }

    pub fn with_origin<T, F>(mut self, origin: Origin, name: &str, params: &[Param], f: F) -> Self
    where
        T: Any,
        F: Fn(&T, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        let type_name = self.caps.type_name.clone();
        let invoke: Invoke = Box::new(move |receiver, args| {
            let this = receiver.downcast_ref::<T>().ok_or_else(|| {
                InvokeError::new(format!("receiver is not a `{type_name}`"))
            })?;
            f(this, args)
        });
        self.caps.methods.push(Method {
            name: name.to_string(),
            params: params.to_vec(),
            origin,
            invoke,
        });
        self
    }

    pub fn build(self) -> Capabilities {
        self.caps
    }
}

/// The table and receiver for a value; `None` for null.
fn lookup(value: &Value) -> Option<(&Capabilities, &dyn Any)> {
    match value {
        Value::Object(object) => {
            let object: &dyn HostObject = &**object;
            Some((object.capabilities(), object.as_any()))
        }
        _ => builtins::lookup(value),
    }
}

fn call(
    method: &Method,
    value: &Value,
    receiver: &dyn Any,
    args: &[Value],
) -> Result<Value, EvaluationErrorKind> {
    tracing::trace!(
        type_name = value.type_name(),
        method = %method.signature(),
        "dispatching"
    );
    (method.invoke)(receiver, args).map_err(|e| EvaluationErrorKind::Invocation {
        method: format!("{}.{}", value.type_name(), method.name),
        message: e.to_string(),
    })
}

fn ambiguous(value: &Value, name: &str, methods: &[&Method]) -> EvaluationErrorKind {
    EvaluationErrorKind::AmbiguousMethod {
        type_name: value.type_name().to_string(),
        name: name.to_string(),
        candidates: methods.iter().map(|m| m.signature()).collect(),
    }
}

fn no_such_method(value: &Value, name: &str, args: &[Value]) -> EvaluationErrorKind {
    let arguments: Vec<&str> = args.iter().map(Value::type_name).collect();
    EvaluationErrorKind::NoSuchMethod {
        type_name: value.type_name().to_string(),
        name: name.to_string(),
        arguments: arguments.join(", "),
    }
}

/// `$value.name(args)`
pub(crate) fn invoke(value: &Value, name: &str, args: &[Value]) -> Result<Value, EvaluationErrorKind> {
    let Some((caps, receiver)) = lookup(value) else {
        return Err(no_such_method(value, name, args));
    };
    match caps.resolve(name, args) {
        Resolution::Found(method) => call(method, value, receiver, args),
        Resolution::Ambiguous(methods) => Err(ambiguous(value, name, &methods)),
        Resolution::Missing => Err(no_such_method(value, name, args)),
    }
}

/// `$value.name`: a getter, or `get("name")` for map-like values.
pub(crate) fn property(value: &Value, name: &str) -> Result<Value, EvaluationErrorKind> {
    let missing = || EvaluationErrorKind::NoSuchProperty {
        type_name: value.type_name().to_string(),
        name: name.to_string(),
    };
    let Some((caps, receiver)) = lookup(value) else {
        return Err(missing());
    };

    let capitalized = capitalize(name);
    let getters = [
        format!("get{capitalized}"),
        format!("get{name}"),
        format!("is{capitalized}"),
    ];
    for getter in &getters {
        match caps.resolve(getter, &[]) {
            Resolution::Found(method) => return call(method, value, receiver, &[]),
            Resolution::Ambiguous(methods) => return Err(ambiguous(value, getter, &methods)),
            Resolution::Missing => {}
        }
    }

    let key = [Value::String(name.to_string())];
    match caps.resolve("get", &key) {
        Resolution::Found(method) => call(method, value, receiver, &key),
        Resolution::Ambiguous(methods) => Err(ambiguous(value, "get", &methods)),
        Resolution::Missing => Err(missing()),
    }
}

/// `$value[key]`: whatever one-argument `get` the value exposes.
pub(crate) fn index(value: &Value, key: Value) -> Result<Value, EvaluationErrorKind> {
    let not_indexable = || EvaluationErrorKind::NotIndexable {
        type_name: value.type_name().to_string(),
    };
    let Some((caps, receiver)) = lookup(value) else {
        return Err(not_indexable());
    };
    if !caps.has("get") {
        return Err(not_indexable());
    }
    let args = [key];
    match caps.resolve("get", &args) {
        Resolution::Found(method) => call(method, value, receiver, &args),
        Resolution::Ambiguous(methods) => Err(ambiguous(value, "get", &methods)),
        Resolution::Missing => Err(no_such_method(value, "get", &args)),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
