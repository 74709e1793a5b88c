pub mod serializer;

pub use serializer::to_value;

use crate::error::{Error, Result};
use crate::tpl::lambda::LambdaHelper;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Data handed to templates.
///
/// Anything implementing `Serialize` converts into this via [`to_value`];
/// objects and lambdas have to be built by hand.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(Arc<dyn Object>),
    Lambda(Lambda),
}

/// Outcome of a property lookup on an [`Object`].
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Undefined,
    Public(Value),
    /// Exists but is not visible to templates.
    Private,
}

/// A context value with behavior of its own.
///
/// Lookups try `method`, then `property`, then `offset`. A private property
/// does not stop the lookup, so `offset` may still answer for that name.
pub trait Object: Send + Sync {
    /// A method callable with no arguments from a template, or with
    /// arguments through an array-style callable.
    fn method(&self, _name: &str) -> Option<Lambda> {
        None
    }

    fn property(&self, _name: &str) -> Property {
        Property::Undefined
    }

    /// Indexed access (`object[key]`). A `Null` here counts as absent, so
    /// unlike a public property it does not mask lower context frames.
    fn offset(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Makes the object itself callable.
    fn invoke(&self) -> Option<Lambda> {
        None
    }

    /// Makes the object iterable by sections.
    fn iter(&self) -> Option<Vec<Value>> {
        None
    }

    /// Interpolated form; objects without one render as an empty string.
    fn display(&self) -> Option<String> {
        None
    }
}

type LambdaFn = dyn Fn(&[Value], Option<&LambdaHelper<'_>>) -> Result<Value> + Send + Sync;

/// A callable context value.
///
/// Interpolation calls it with no arguments, a filter with the filtered
/// value, and a section with the raw section text plus a [`LambdaHelper`].
#[derive(Clone)]
pub struct Lambda(Arc<LambdaFn>);

impl Lambda {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value], Option<&LambdaHelper<'_>>) -> Result<Value> + Send + Sync + 'static,
    {
        Lambda(Arc::new(f))
    }

    /// A lambda ignoring its arguments.
    pub fn value<F, V>(f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Lambda::new(move |_, _| Ok(f().into()))
    }

    /// A one-argument lambda, the shape filters expect.
    pub fn filter<F, V>(f: F) -> Self
    where
        F: Fn(&Value) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Lambda::new(move |args, _| Ok(f(args.first().unwrap_or(&Value::Null)).into()))
    }

    /// A section lambda receiving the unrendered section text.
    pub fn section<F>(f: F) -> Self
    where
        F: Fn(&str, &LambdaHelper<'_>) -> Result<String> + Send + Sync + 'static,
    {
        Lambda::new(move |args, helper| {
            let helper = helper.ok_or_else(|| {
                Error::InvalidArgument("section lambda called outside a section".to_string())
            })?;
            let text = args.first().map(Value::to_text).unwrap_or_default();
            Ok(Value::Str(f(&text, helper)?))
        })
    }

    pub fn call(&self, args: &[Value], helper: Option<&LambdaHelper<'_>>) -> Result<Value> {
        (self.0)(args, helper)
    }

    pub fn ptr_eq(&self, other: &Lambda) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lambda(..)")
    }
}

impl Value {
    /// Falsy values skip sections and trigger inverted sections.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty() || s == "0",
            Value::List(list) => list.is_empty(),
            Value::Map(map) => map.is_empty(),
            Value::Object(_) | Value::Lambda(_) => false,
        }
    }

    /// The text a variable tag writes for this value.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null | Value::Bool(false) => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Object(obj) => obj.display().unwrap_or_default(),
            Value::List(_) | Value::Map(_) | Value::Lambda(_) => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Single-level lookup of `key` inside this value.
    ///
    /// `Ok(None)` means the key is absent. A present key holding `Null` is
    /// `Ok(Some(Value::Null))` unless `skip_null` is set, in which case null
    /// entries count as absent.
    pub fn lookup(&self, key: &str, skip_null: bool) -> Result<Option<Value>> {
        let found = match self {
            Value::Map(map) => map.get(key).cloned(),
            Value::List(list) => key.parse::<usize>().ok().and_then(|i| list.get(i).cloned()),
            Value::Object(obj) => {
                if let Some(method) = obj.method(key) {
                    return method.call(&[], None).map(Some);
                }
                match obj.property(key) {
                    Property::Public(v) if !(skip_null && v.is_null()) => return Ok(Some(v)),
                    _ => obj.offset(key).filter(|v| !v.is_null()),
                }
            }
            _ => None,
        };

        Ok(found.filter(|v| !(skip_null && v.is_null())))
    }

    /// The elements a section iterates over, if this value is iterable.
    pub fn iterable(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.clone()),
            Value::Object(obj) => obj.iter(),
            _ => None,
        }
    }

    /// The lambda to invoke if this value is callable.
    ///
    /// `[object, "method"]` pairs count only when `strict` is off.
    pub fn callable(&self, strict: bool) -> Option<Lambda> {
        match self {
            Value::Lambda(lambda) => Some(lambda.clone()),
            Value::Object(obj) => obj.invoke(),
            Value::List(pair) if !strict && pair.len() == 2 => match (&pair[0], &pair[1]) {
                (Value::Object(obj), Value::Str(method)) => obj.method(method),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::List(list) => f.debug_tuple("List").field(list).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Object(_) => f.write_str("Object(..)"),
            Value::Lambda(_) => f.write_str("Lambda(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<Lambda> for Value {
    fn from(v: Lambda) -> Self {
        Value::Lambda(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Build a `Value::Map` from `key => value` pairs.
#[macro_export]
macro_rules! map {
    () => {
        $crate::value::Value::Map($crate::indexmap::IndexMap::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::indexmap::IndexMap::new();
        $(map.insert(::std::string::String::from($key), $crate::value::Value::from($value));)+
        $crate::value::Value::Map(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dog {
        name: &'static str,
    }

    impl Object for Dog {
        fn method(&self, name: &str) -> Option<Lambda> {
            match name {
                "bark" => Some(Lambda::value(|| "woof")),
                _ => None,
            }
        }

        fn property(&self, name: &str) -> Property {
            match name {
                "name" => Property::Public(self.name.into()),
                "owner" => Property::Public(Value::Null),
                "secret" => Property::Private,
                _ => Property::Undefined,
            }
        }

        fn offset(&self, key: &str) -> Option<Value> {
            Some(Value::Str(format!("offset {}", key)))
        }
    }

    #[test]
    fn test_emptiness() {
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::Float(0.0),
            Value::from(""),
            Value::from("0"),
            Value::List(vec![]),
            map! {},
        ] {
            assert!(v.is_empty(), "{:?}", v);
        }
        assert!(!Value::from(" ").is_empty());
        assert!(!Value::Lambda(Lambda::value(|| "")).is_empty());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Bool(true).to_text(), "1");
        assert_eq!(Value::Bool(false).to_text(), "");
        assert_eq!(Value::Int(42).to_text(), "42");
        assert_eq!(Value::Float(1.5).to_text(), "1.5");
        assert_eq!(Value::from(vec![1, 2]).to_text(), "");
    }

    #[test]
    fn test_lookup_priority() {
        let dog = Value::Object(Arc::new(Dog { name: "Rex" }));
        assert_eq!(dog.lookup("bark", false).unwrap(), Some("woof".into()));
        assert_eq!(dog.lookup("name", false).unwrap(), Some("Rex".into()));
        assert_eq!(dog.lookup("owner", false).unwrap(), Some(Value::Null));
        assert_eq!(
            dog.lookup("owner", true).unwrap(),
            Some("offset owner".into())
        );
        // private properties fall through to indexed access
        assert_eq!(
            dog.lookup("secret", false).unwrap(),
            Some("offset secret".into())
        );
    }

    #[test]
    fn test_lookup_containers() {
        let data = map! { "a" => Value::Null, "b" => 1 };
        assert_eq!(data.lookup("a", false).unwrap(), Some(Value::Null));
        assert_eq!(data.lookup("a", true).unwrap(), None);
        assert_eq!(data.lookup("c", false).unwrap(), None);

        let list = Value::from(vec!["x", "y"]);
        assert_eq!(list.lookup("1", false).unwrap(), Some("y".into()));
        assert_eq!(list.lookup("2", false).unwrap(), None);
        assert_eq!(Value::from("str").lookup("len", false).unwrap(), None);
    }

    #[test]
    fn test_callables() {
        let dog: Arc<dyn Object> = Arc::new(Dog { name: "Rex" });
        let pair = Value::List(vec![Value::Object(dog), "bark".into()]);
        assert!(pair.callable(true).is_none());
        let bark = pair.callable(false).unwrap();
        assert_eq!(bark.call(&[], None).unwrap(), "woof".into());

        assert!(Value::from("strtoupper").callable(false).is_none());

        let upper = Lambda::filter(|v| v.to_text().to_uppercase());
        assert_eq!(upper.call(&["yo".into()], None).unwrap(), "YO".into());

        let section = Lambda::section(|text, _| Ok(text.to_string()));
        assert!(section.call(&["x".into()], None).is_err());
    }
}
