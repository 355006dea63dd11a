//! Builtin functions and the methods of strings, lists and maps.

use scriptwrap_core::logging::SCRIPT_TARGET;
use tracing::info;

use crate::errors::RuntimeError;
use crate::interpreter::{list_too_large, string_too_large};
use crate::value::{MAX_LIST_LEN, MAX_STRING_LEN, Value};

fn arity(name: &str, args: &[Value], expected: usize, line: usize) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::eval(
            line,
            format!("{name}() expects {expected} argument(s), got {}", args.len()),
        ))
    }
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or_default()
}

fn int_arg(name: &str, value: &Value, line: usize) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::eval(line, format!("{name}() expects an int, got {}", value.kind()))
    })
}

fn str_arg<'a>(name: &str, value: &'a Value, line: usize) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::eval(line, format!("{name}() expects a string, got {}", value.kind()))
    })
}

/// Call the builtin function `name`.
pub(crate) fn call_function(
    script: &str,
    name: &str,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, RuntimeError> {
    match name {
        "println" => {
            let text = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            info!(target: SCRIPT_TARGET, script, "{text}");
            Ok(Value::Null)
        }
        "fail" => Err(RuntimeError::Raised {
            message: args
                .first()
                .map_or_else(|| "fail() called".to_string(), ToString::to_string),
            line,
        }),
        "str" => {
            arity(name, &args, 1, line)?;
            Ok(Value::string(first(args).to_string()))
        }
        "int" => {
            arity(name, &args, 1, line)?;
            to_int(&first(args), line)
        }
        "float" => {
            arity(name, &args, 1, line)?;
            to_float(&first(args), line)
        }
        "len" => {
            arity(name, &args, 1, line)?;
            length(&first(args), line)
        }
        "type_of" => {
            arity(name, &args, 1, line)?;
            Ok(Value::string(first(args).kind().to_string()))
        }
        "keys" => {
            arity(name, &args, 1, line)?;
            match first(args) {
                Value::Map(entries) => Ok(key_list(&entries.lock())),
                other => Err(RuntimeError::eval(
                    line,
                    format!("keys() expects a map, got {}", other.kind()),
                )),
            }
        }
        "range" => {
            let (start, end) = match args.as_slice() {
                [end] => (0, int_arg(name, end, line)?),
                [start, end] => (int_arg(name, start, line)?, int_arg(name, end, line)?),
                _ => return arity(name, &args, 2, line).map(|()| Value::Null),
            };
            if end <= start {
                return Ok(Value::list(Vec::new()));
            }
            let span = end.checked_sub(start).and_then(|n| usize::try_from(n).ok());
            match span {
                Some(n) if n <= MAX_LIST_LEN => Ok(Value::list((start..end).map(Value::Int).collect())),
                _ => Err(list_too_large(line)),
            }
        }
        _ => Err(RuntimeError::eval(line, format!("undefined function '{name}'"))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: &Value, line: usize) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(x) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RuntimeError::eval(line, format!("cannot convert '{s}' to int"))),
        other => Err(RuntimeError::eval(
            line,
            format!("cannot convert {} to int", other.kind()),
        )),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &Value, line: usize) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::eval(line, format!("cannot convert '{s}' to float"))),
        other => Err(RuntimeError::eval(
            line,
            format!("cannot convert {} to float", other.kind()),
        )),
    }
}

fn count(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn length(value: &Value, line: usize) -> Result<Value, RuntimeError> {
    match value {
        Value::Str(s) => Ok(count(s.chars().count())),
        Value::List(items) => Ok(count(items.lock().len())),
        Value::Map(entries) => Ok(count(entries.lock().len())),
        other => Err(RuntimeError::eval(
            line,
            format!("{} has no length", other.kind()),
        )),
    }
}

fn key_list(entries: &std::collections::BTreeMap<String, Value>) -> Value {
    Value::list(entries.keys().map(|k| Value::string(k.as_str())).collect())
}

/// Call `receiver.name(args...)`.
pub(crate) fn call_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Object(host) => host
            .call_method(name, args)
            .map_err(|e| RuntimeError::eval(line, e.to_string())),
        Value::Str(s) => string_method(s, name, &args, line),
        Value::List(_) => list_method(receiver, name, args, line),
        Value::Map(_) => map_method(receiver, name, args, line),
        other => Err(no_method(other, name, line)),
    }
}

fn no_method(receiver: &Value, name: &str, line: usize) -> RuntimeError {
    RuntimeError::eval(line, format!("{} has no method '{name}'", receiver.kind()))
}

fn text_at<'a>(name: &str, args: &'a [Value], i: usize, line: usize) -> Result<&'a str, RuntimeError> {
    match args.get(i) {
        Some(value) => str_arg(name, value, line),
        None => Err(RuntimeError::eval(line, format!("{name}() is missing an argument"))),
    }
}

fn string_method(s: &str, name: &str, args: &[Value], line: usize) -> Result<Value, RuntimeError> {
    match name {
        "len" | "size" => Ok(count(s.chars().count())),
        "is_empty" => Ok(Value::Bool(s.is_empty())),
        "upper" => Ok(Value::string(s.to_uppercase())),
        "lower" => Ok(Value::string(s.to_lowercase())),
        "trim" => Ok(Value::string(s.trim())),
        "contains" => Ok(Value::Bool(s.contains(text_at(name, args, 0, line)?))),
        "starts_with" => Ok(Value::Bool(s.starts_with(text_at(name, args, 0, line)?))),
        "ends_with" => Ok(Value::Bool(s.ends_with(text_at(name, args, 0, line)?))),
        "replace" => {
            let (from, to) = (text_at(name, args, 0, line)?, text_at(name, args, 1, line)?);
            let hits = if from.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(from).count()
            };
            match hits.checked_mul(to.len()).and_then(|n| n.checked_add(s.len())) {
                Some(bound) if bound <= MAX_STRING_LEN => Ok(Value::string(s.replace(from, to))),
                _ => Err(string_too_large(line)),
            }
        }
        "split" => {
            let parts: Vec<Value> = if args.is_empty() {
                s.split_whitespace().map(Value::from).collect()
            } else {
                s.split(text_at(name, args, 0, line)?).map(Value::from).collect()
            };
            Ok(Value::list(parts))
        }
        _ => Err(RuntimeError::eval(line, format!("string has no method '{name}'"))),
    }
}

fn list_method(receiver: &Value, name: &str, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
    let Value::List(items) = receiver else {
        return Err(no_method(receiver, name, line));
    };
    match name {
        "len" | "size" => Ok(count(items.lock().len())),
        "is_empty" => Ok(Value::Bool(items.lock().is_empty())),
        "push" | "add" => {
            arity(name, &args, 1, line)?;
            items.lock().push(first(args));
            Ok(Value::Null)
        }
        "pop" => Ok(items.lock().pop().unwrap_or_default()),
        "first" => Ok(items.lock().first().cloned().unwrap_or_default()),
        "last" => Ok(items.lock().last().cloned().unwrap_or_default()),
        "contains" => {
            arity(name, &args, 1, line)?;
            let needle = first(args);
            let snapshot = items.lock().clone();
            Ok(Value::Bool(snapshot.contains(&needle)))
        }
        "index_of" => {
            arity(name, &args, 1, line)?;
            let needle = first(args);
            let snapshot = items.lock().clone();
            Ok(snapshot
                .iter()
                .position(|v| *v == needle)
                .map_or(Value::Int(-1), count))
        }
        "get" => {
            arity(name, &args, 1, line)?;
            let index = int_arg(name, &args[0], line)?;
            let items = items.lock();
            Ok(usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default())
        }
        "join" => {
            let separator = match args.first() {
                Some(sep) => str_arg(name, sep, line)?.to_string(),
                None => ",".to_string(),
            };
            let snapshot = items.lock().clone();
            let mut joined = String::new();
            for (i, item) in snapshot.iter().enumerate() {
                if i > 0 {
                    joined.push_str(&separator);
                }
                joined.push_str(&item.to_string());
                if joined.len() > MAX_STRING_LEN {
                    return Err(string_too_large(line));
                }
            }
            Ok(Value::string(joined))
        }
        _ => Err(no_method(receiver, name, line)),
    }
}

fn map_method(receiver: &Value, name: &str, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
    let Value::Map(entries) = receiver else {
        return Err(no_method(receiver, name, line));
    };
    let key = |i: usize| -> Result<String, RuntimeError> {
        match args.get(i) {
            Some(Value::Str(s)) => Ok(s.to_string()),
            Some(v @ (Value::Int(_) | Value::Bool(_))) => Ok(v.to_string()),
            Some(other) => Err(RuntimeError::eval(
                line,
                format!("map keys must be strings, got {}", other.kind()),
            )),
            None => Err(RuntimeError::eval(line, format!("{name}() expects a key"))),
        }
    };
    match name {
        "len" | "size" => Ok(count(entries.lock().len())),
        "is_empty" => Ok(Value::Bool(entries.lock().is_empty())),
        "keys" => Ok(key_list(&entries.lock())),
        "values" => Ok(Value::list(entries.lock().values().cloned().collect())),
        "contains" | "contains_key" => {
            let key = key(0)?;
            Ok(Value::Bool(entries.lock().contains_key(&key)))
        }
        "get" => {
            let key = key(0)?;
            let found = entries.lock().get(&key).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or_default()))
        }
        "put" => {
            arity(name, &args, 2, line)?;
            let key = key(0)?;
            let value = args[1].clone();
            Ok(entries.lock().insert(key, value).unwrap_or_default())
        }
        "remove" => {
            let key = key(0)?;
            Ok(entries.lock().remove(&key).unwrap_or_default())
        }
        _ => Err(no_method(receiver, name, line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptwrap_core::logging::capture_logs;
    use std::collections::BTreeMap;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        call_function("test", name, args, 1)
    }

    #[test]
    fn println_logs_under_script_target() {
        let (logs, _guard) = capture_logs();
        let _ = call("println", vec![Value::from("hello"), Value::Int(3)]).unwrap();
        let events = logs.events_for_target(SCRIPT_TARGET);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "hello 3");
        assert_eq!(events[0].field("script"), Some("test"));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(2.9)]).unwrap(), Value::Int(2));
        assert_eq!(call("float", vec![Value::Int(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("str", vec![Value::list(vec![Value::Int(1)])]).unwrap(), Value::from("[1]"));
        assert!(call("int", vec![Value::from("x")]).unwrap_err().to_string().contains("'x'"));
    }

    #[test]
    fn len_and_type_of() {
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call("type_of", vec![Value::Null]).unwrap(), Value::from("null"));
        assert!(call("len", vec![Value::Int(1)]).is_err());
        assert!(call("len", vec![]).unwrap_err().to_string().contains("expects 1 argument"));
    }

    #[test]
    fn range_forms() {
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap().to_string(), "[0, 1, 2]");
        assert_eq!(call("range", vec![Value::Int(2), Value::Int(4)]).unwrap().to_string(), "[2, 3]");
        assert_eq!(call("range", vec![Value::Int(3), Value::Int(1)]).unwrap().to_string(), "[]");
        assert!(call("range", vec![]).is_err());
    }

    #[test]
    fn range_rejects_huge_spans() {
        let huge = call("range", vec![Value::Int(0), Value::Int(4_611_686_018_427_387_904)]);
        assert!(huge.unwrap_err().to_string().contains("list too large"));
        let wide = call("range", vec![Value::Int(i64::MIN), Value::Int(i64::MAX)]);
        assert!(wide.is_err());
        let reversed = call("range", vec![Value::Int(i64::MAX), Value::Int(i64::MIN)]).unwrap();
        assert_eq!(reversed.to_string(), "[]");
        let limit = i64::try_from(MAX_LIST_LEN).unwrap();
        assert!(call("range", vec![Value::Int(limit + 1)]).is_err());
    }

    #[test]
    fn replace_and_join_are_size_checked() {
        let big = Value::from("x".repeat(MAX_STRING_LEN / 2));
        let grow = call_method(&big, "replace", vec![Value::from(""), Value::from("yy")], 3);
        assert!(grow.unwrap_err().to_string().contains("string too large"));
        let shrink = call_method(&big, "replace", vec![Value::from("x"), Value::from("")], 3);
        assert_eq!(shrink.unwrap(), Value::from(""));

        let list = Value::list(vec![big.clone(), big.clone(), big]);
        let joined = call_method(&list, "join", vec![], 4);
        assert!(joined.unwrap_err().to_string().contains("string too large"));
    }

    #[test]
    fn fail_raises() {
        let err = call("fail", vec![Value::from("stop")]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Raised {
                message: "stop".into(),
                line: 1
            }
        );
    }

    #[test]
    fn unknown_function() {
        assert!(call("nope", vec![]).unwrap_err().to_string().contains("undefined function 'nope'"));
    }

    #[test]
    fn string_methods() {
        let s = Value::from("a,b,c");
        let m = |name: &str, args: Vec<Value>| call_method(&s, name, args, 1).unwrap();
        assert_eq!(m("split", vec![Value::from(",")]).to_string(), "[a, b, c]");
        assert_eq!(m("upper", vec![]), Value::from("A,B,C"));
        assert_eq!(m("replace", vec![Value::from(","), Value::from("-")]), Value::from("a-b-c"));
        assert_eq!(m("starts_with", vec![Value::from("a,")]), Value::Bool(true));
        let err = call_method(&s, "explode", vec![], 4).unwrap_err();
        assert_eq!(err.to_string(), "string has no method 'explode' (line 4)");
    }

    #[test]
    fn list_methods_mutate_in_place() {
        let list = Value::list(vec![]);
        let m = |name: &str, args: Vec<Value>| call_method(&list, name, args, 1).unwrap();
        let _ = m("push", vec![Value::Int(1)]);
        let _ = m("add", vec![Value::from("x")]);
        assert_eq!(m("len", vec![]), Value::Int(2));
        assert_eq!(m("join", vec![Value::from("|")]), Value::from("1|x"));
        assert_eq!(m("index_of", vec![Value::from("x")]), Value::Int(1));
        assert_eq!(m("get", vec![Value::Int(9)]), Value::Null);
        assert_eq!(m("pop", vec![]), Value::from("x"));
        assert_eq!(list.to_string(), "[1]");
    }

    #[test]
    fn map_methods() {
        let map = Value::map(BTreeMap::new());
        let m = |name: &str, args: Vec<Value>| call_method(&map, name, args, 1).unwrap();
        assert_eq!(m("put", vec![Value::from("k"), Value::Int(1)]), Value::Null);
        assert_eq!(m("put", vec![Value::from("k"), Value::Int(2)]), Value::Int(1));
        assert_eq!(m("get", vec![Value::from("k")]), Value::Int(2));
        assert_eq!(m("get", vec![Value::from("z"), Value::from("dflt")]), Value::from("dflt"));
        assert_eq!(m("contains", vec![Value::from("k")]), Value::Bool(true));
        assert_eq!(m("keys", vec![]).to_string(), "[k]");
        assert_eq!(m("remove", vec![Value::from("k")]), Value::Int(2));
        assert_eq!(m("is_empty", vec![]), Value::Bool(true));
    }

    #[test]
    fn scalars_have_no_methods() {
        let err = call_method(&Value::Int(1), "abs", vec![], 2).unwrap_err();
        assert_eq!(err.to_string(), "int has no method 'abs' (line 2)");
    }
}
