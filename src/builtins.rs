//! Capability tables for the built-in value kinds.
//!
//! Method names follow Velocity's Java host objects so existing
//! templates (`$s.indexOf("x")`, `$list.size()`, `$map.keySet()`) keep
//! working. String positions count characters.

use crate::object::{Capabilities, InvokeError, Param};
use crate::value::{Key, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::any::Any;

type Map = IndexMap<Key, Value>;

pub(crate) fn lookup(value: &Value) -> Option<(&'static Capabilities, &dyn Any)> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::Bool(b) => Some((&*BOOL, b as &dyn Any)),
        Value::Int(i) => Some((&*INT, i as &dyn Any)),
        Value::String(s) => Some((&*STRING, s as &dyn Any)),
        Value::List(l) => Some((&*LIST, l as &dyn Any)),
        Value::Map(m) => Some((&*MAP, m as &dyn Any)),
    }
}

fn str_arg(args: &[Value], i: usize) -> Result<&str, InvokeError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) => Err(InvokeError::new(format!("argument {} is null", i + 1))),
        _ => Err(InvokeError::new(format!("argument {} is not a string", i + 1))),
    }
}

fn int_arg(args: &[Value], i: usize) -> Result<i32, InvokeError> {
    match args.get(i) {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err(InvokeError::new(format!("argument {} is not an int", i + 1))),
    }
}

fn size(n: usize) -> Result<Value, InvokeError> {
    i32::try_from(n)
        .map(Value::Int)
        .map_err(|_| InvokeError::new(format!("size {n} does not fit in an int")))
}

fn out_of_bounds(index: i32, len: usize) -> InvokeError {
    InvokeError::new(format!("index {index} out of bounds for length {len}"))
}

/// Byte offset of character `index`, or the end when past it.
fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(b, _)| b)
}

fn char_index(s: &str, byte: usize) -> Result<Value, InvokeError> {
    size(s[..byte].chars().count())
}

fn position(s: &str, found: Option<usize>) -> Result<Value, InvokeError> {
    match found {
        Some(byte) => char_index(s, byte),
        None => Ok(Value::Int(-1)),
    }
}

fn substring(s: &str, begin: i32, end: i32) -> Result<Value, InvokeError> {
    let len = s.chars().count();
    if begin < 0 || end < begin || end as usize > len {
        return Err(InvokeError::new(format!(
            "range [{begin}, {end}) out of bounds for length {len}"
        )));
    }
    let (b, e) = (byte_offset(s, begin as usize), byte_offset(s, end as usize));
    Ok(s[b..e].into())
}

static STRING: Lazy<Capabilities> = Lazy::new(|| {
    use Param::{Int, String as Str};
    Capabilities::builder("string")
        .method("length", &[], |s: &String, _| size(s.chars().count()))
        .method("isEmpty", &[], |s: &String, _| Ok(s.is_empty().into()))
        .method("charAt", &[Int], |s: &String, args| {
            let i = int_arg(args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|u| s.chars().nth(u))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| out_of_bounds(i, s.chars().count()))
        })
        .method("indexOf", &[Str], |s: &String, args| {
            position(s, s.find(str_arg(args, 0)?))
        })
        .method("indexOf", &[Str, Int], |s: &String, args| {
            let needle = str_arg(args, 0)?;
            let from = byte_offset(s, int_arg(args, 1)?.max(0) as usize);
            position(s, s[from..].find(needle).map(|b| from + b))
        })
        .method("lastIndexOf", &[Str], |s: &String, args| {
            position(s, s.rfind(str_arg(args, 0)?))
        })
        .method("contains", &[Str], |s: &String, args| {
            Ok(s.contains(str_arg(args, 0)?).into())
        })
        .method("startsWith", &[Str], |s: &String, args| {
            Ok(s.starts_with(str_arg(args, 0)?).into())
        })
        .method("endsWith", &[Str], |s: &String, args| {
            Ok(s.ends_with(str_arg(args, 0)?).into())
        })
        .method("substring", &[Int], |s: &String, args| {
            let end = i32::try_from(s.chars().count()).unwrap_or(i32::MAX);
            substring(s, int_arg(args, 0)?, end)
        })
        .method("substring", &[Int, Int], |s: &String, args| {
            substring(s, int_arg(args, 0)?, int_arg(args, 1)?)
        })
        .method("toUpperCase", &[], |s: &String, _| Ok(s.to_uppercase().into()))
        .method("toLowerCase", &[], |s: &String, _| Ok(s.to_lowercase().into()))
        .method("trim", &[], |s: &String, _| Ok(s.trim().into()))
        .method("concat", &[Str], |s: &String, args| {
            Ok(format!("{s}{}", str_arg(args, 0)?).into())
        })
        .method("replace", &[Str, Str], |s: &String, args| {
            Ok(s.replace(str_arg(args, 0)?, str_arg(args, 1)?).into())
        })
        .method("equals", &[Param::Any], |s: &String, args| {
            Ok(matches!(args.first(), Some(Value::String(o)) if o == s).into())
        })
        .method("toString", &[], |s: &String, _| Ok(s.clone().into()))
        .build()
});

static LIST: Lazy<Capabilities> = Lazy::new(|| {
    Capabilities::builder("list")
        .method("size", &[], |l: &Vec<Value>, _| size(l.len()))
        .method("isEmpty", &[], |l: &Vec<Value>, _| Ok(l.is_empty().into()))
        .method("get", &[Param::Int], |l: &Vec<Value>, args| {
            let i = int_arg(args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|u| l.get(u))
                .cloned()
                .ok_or_else(|| out_of_bounds(i, l.len()))
        })
        .method("contains", &[Param::Any], |l: &Vec<Value>, args| {
            Ok(args.first().is_some_and(|a| l.contains(a)).into())
        })
        .method("indexOf", &[Param::Any], |l: &Vec<Value>, args| {
            match args.first().and_then(|a| l.iter().position(|v| v == a)) {
                Some(i) => size(i),
                None => Ok(Value::Int(-1)),
            }
        })
        .method("toString", &[], |l: &Vec<Value>, _| {
            Ok(Value::List(l.clone()).to_string().into())
        })
        .build()
});

static MAP: Lazy<Capabilities> = Lazy::new(|| {
    Capabilities::builder("map")
        .method("size", &[], |m: &Map, _| size(m.len()))
        .method("isEmpty", &[], |m: &Map, _| Ok(m.is_empty().into()))
        .method("get", &[Param::Any], |m: &Map, args| {
            Ok(args
                .first()
                .and_then(Key::from_value)
                .and_then(|k| m.get(&k))
                .cloned()
                .unwrap_or(Value::Null))
        })
        .method("containsKey", &[Param::Any], |m: &Map, args| {
            let key = args.first().and_then(Key::from_value);
            Ok(key.is_some_and(|k| m.contains_key(&k)).into())
        })
        .method("containsValue", &[Param::Any], |m: &Map, args| {
            Ok(args.first().is_some_and(|a| m.values().any(|v| v == a)).into())
        })
        .method("keySet", &[], |m: &Map, _| {
            Ok(Value::List(m.keys().cloned().map(Value::from).collect()))
        })
        .method("values", &[], |m: &Map, _| {
            Ok(Value::List(m.values().cloned().collect()))
        })
        .method("toString", &[], |m: &Map, _| {
            Ok(Value::Map(m.clone()).to_string().into())
        })
        .build()
});

static INT: Lazy<Capabilities> = Lazy::new(|| {
    Capabilities::builder("int")
        .method("toString", &[], |i: &i32, _| Ok(i.to_string().into()))
        .method("equals", &[Param::Any], |i: &i32, args| {
            Ok(matches!(args.first(), Some(Value::Int(o)) if o == i).into())
        })
        .build()
});

static BOOL: Lazy<Capabilities> = Lazy::new(|| {
    Capabilities::builder("boolean")
        .method("toString", &[], |b: &bool, _| Ok(b.to_string().into()))
        .method("equals", &[Param::Any], |b: &bool, args| {
            Ok(matches!(args.first(), Some(Value::Bool(o)) if o == b).into())
        })
        .build()
});
