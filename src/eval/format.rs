// Rendering of evaluation results into bounded operator text

use crate::eval::error::RuntimeError;
use crate::eval::interp::Interpreter;
use crate::eval::parser::is_identifier;
use crate::eval::value::{Function, Property, Value, error_text, number_to_string};
use crate::output::{OutputManager, truncate};
use serde_json::{Map, Number};

/// Longest callable source shown inline
const MAX_SOURCE_CHARS: usize = 200;
/// Nesting shown by the structural dump
const DUMP_DEPTH: usize = 3;
const DUMP_ARRAY_ITEMS: usize = 100;
/// Nesting shown for `console.log` arguments and thrown values
const INLINE_DEPTH: usize = 2;

#[derive(Debug)]
pub enum JsonError {
    Circular,
    Unsupported(&'static str),
    Getter(RuntimeError),
}

/// Operator text for `value`, without any length bound
///
/// Tries, in order: literal tokens for absent values and scalars, callable
/// source, pretty JSON, the structural dump and finally `[object Type]`.
pub fn format_value(interp: &Interpreter, value: &Value) -> String {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::Str(_) => {
            value.to_display()
        }
        Value::Function(f) => callable_text(f),
        _ => {
            if let Ok(Some(json)) = to_json(interp, value, true) {
                if let Ok(text) = serde_json::to_string_pretty(&json) {
                    return text;
                }
            }
            let mut seen = Vec::new();
            match dump(interp, value, 0, DUMP_DEPTH, &mut seen, true) {
                Ok(text) => text,
                Err(_) => format!("[object {}]", value.class_name()),
            }
        }
    }
}

/// [`format_value`] bounded to `cap` characters
///
/// When `spill` is given and the text is over the cap, the full text is
/// also written to a side file whose path is appended to the reply.
pub fn render_value(
    interp: &Interpreter,
    value: &Value,
    cap: usize,
    spill: Option<(&OutputManager, &str)>,
) -> String {
    let text = format_value(interp, value);
    let (mut visible, truncated) = truncate(&text, cap);
    if truncated {
        if let Some(path) = spill.and_then(|(output, command)| output.spill(command, &text)) {
            visible.push_str(&format!("\nFull output saved to {}", path.display()));
        }
    }
    visible
}

/// Callable source capped at 200 characters, or the native marker
pub fn callable_text(f: &Function) -> String {
    if f.is_native() {
        return format!("function {}() {{ [native code] }}", f.name);
    }
    let source = f.source();
    if source.chars().count() > MAX_SOURCE_CHARS {
        format!("{}...", source.chars().take(MAX_SOURCE_CHARS).collect::<String>())
    } else {
        source
    }
}

/// Node-style one-line rendering; never fails
pub fn inline(interp: &Interpreter, value: &Value) -> String {
    let mut seen = Vec::new();
    match dump(interp, value, 0, INLINE_DEPTH, &mut seen, false) {
        Ok(text) => text,
        Err(_) => format!("[object {}]", value.class_name()),
    }
}

/// Convert to JSON
///
/// `Ok(None)` means the value has no JSON form (`undefined`, or a function
/// when not `strict`). In `strict` mode functions and promises anywhere in
/// the structure are an error instead of being skipped.
pub fn to_json(interp: &Interpreter, value: &Value, strict: bool) -> Result<Option<serde_json::Value>, JsonError> {
    let mut stack = Vec::new();
    to_json_inner(interp, value, strict, &mut stack)
}

fn to_json_inner(
    interp: &Interpreter,
    value: &Value,
    strict: bool,
    stack: &mut Vec<usize>,
) -> Result<Option<serde_json::Value>, JsonError> {
    Ok(Some(match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => json_number(*n),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Function(_) if strict => return Err(JsonError::Unsupported("function")),
        Value::Function(_) => return Ok(None),
        Value::Promise(_) if strict => return Err(JsonError::Unsupported("Promise")),
        Value::Array(items) => {
            let id = enter(value, stack)?;
            let items = items.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(to_json_inner(interp, item, strict, stack)?.unwrap_or(serde_json::Value::Null));
            }
            leave(stack, id);
            serde_json::Value::Array(out)
        }
        Value::Object(obj) => {
            let id = enter(value, stack)?;
            let mut map = Map::new();
            for key in obj.keys() {
                let member = match obj.get_own(&key) {
                    Some(Property::Data(v)) => v,
                    Some(Property::Accessor(getter)) => interp
                        .call_sync(&Value::Function(getter), value.clone(), Vec::new())
                        .map_err(JsonError::Getter)?,
                    None => continue,
                };
                if let Some(json) = to_json_inner(interp, &member, strict, stack)? {
                    map.insert(key, json);
                }
            }
            leave(stack, id);
            serde_json::Value::Object(map)
        }
        Value::Promise(_) => serde_json::Value::Object(Map::new()),
    }))
}

fn enter(value: &Value, stack: &mut Vec<usize>) -> Result<usize, JsonError> {
    let id = value.identity().unwrap_or_default();
    if stack.contains(&id) {
        return Err(JsonError::Circular);
    }
    stack.push(id);
    Ok(id)
}

fn leave(stack: &mut Vec<usize>, id: usize) {
    if stack.last() == Some(&id) {
        stack.pop();
    }
}

/// Integral values serialize without a fraction; non-finite become null
fn json_number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

pub fn json_with_indent(json: &serde_json::Value, indent: usize) -> String {
    use serde::Serialize;
    let spaces = " ".repeat(indent);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match json.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => json.to_string(),
    }
}

pub fn from_json(interp: &Interpreter, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => {
            Value::array(items.iter().map(|item| from_json(interp, item)).collect())
        }
        serde_json::Value::Object(map) => {
            let obj = interp.new_object();
            for (key, item) in map {
                obj.set(key, from_json(interp, item));
            }
            Value::Object(obj)
        }
    }
}

/// Structural dump in the style of Node's `util.inspect`
///
/// With `strict`, a throwing getter fails the whole dump.
fn dump(
    interp: &Interpreter,
    value: &Value,
    depth: usize,
    max_depth: usize,
    seen: &mut Vec<usize>,
    strict: bool,
) -> Result<String, RuntimeError> {
    Ok(match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) => value.to_display(),
        Value::Str(s) => quote(s),
        Value::Function(f) => match (f.is_async, f.name.is_empty()) {
            (false, true) => "[Function (anonymous)]".to_string(),
            (false, false) => format!("[Function: {}]", f.name),
            (true, true) => "[AsyncFunction (anonymous)]".to_string(),
            (true, false) => format!("[AsyncFunction: {}]", f.name),
        },
        Value::Promise(p) => match p.peek() {
            Some(Ok(settled)) => format!(
                "Promise {{ {} }}",
                dump(interp, &settled, depth + 1, max_depth, seen, strict)?
            ),
            Some(Err(err)) => format!("Promise {{ <rejected> {} }}", err),
            None => "Promise { <pending> }".to_string(),
        },
        Value::Array(_) | Value::Object(_) => {
            let id = value.identity().unwrap_or_default();
            if seen.contains(&id) {
                return Ok("[Circular]".to_string());
            }
            if depth >= max_depth {
                return Ok(match value {
                    Value::Array(_) => "[Array]".to_string(),
                    _ => format!("[{}]", value.class_name()),
                });
            }
            seen.push(id);
            let text = dump_structured(interp, value, depth, max_depth, seen, strict);
            seen.pop();
            text?
        }
    })
}

fn dump_structured(
    interp: &Interpreter,
    value: &Value,
    depth: usize,
    max_depth: usize,
    seen: &mut Vec<usize>,
    strict: bool,
) -> Result<String, RuntimeError> {
    let mut parts = Vec::new();
    match value {
        Value::Array(items) => {
            let items = items.borrow().clone();
            for item in items.iter().take(DUMP_ARRAY_ITEMS) {
                parts.push(dump(interp, item, depth + 1, max_depth, seen, strict)?);
            }
            if items.len() > DUMP_ARRAY_ITEMS {
                parts.push(format!("... {} more items", items.len() - DUMP_ARRAY_ITEMS));
            }
            return Ok(if parts.is_empty() {
                "[]".to_string()
            } else {
                format!("[ {} ]", parts.join(", "))
            });
        }
        Value::Object(obj) => {
            if obj.class.ends_with("Error") {
                return Ok(format!("[{}]", error_text(obj)));
            }
            for key in obj.keys() {
                let rendered = match obj.get_own(&key) {
                    Some(Property::Data(v)) => dump(interp, &v, depth + 1, max_depth, seen, strict)?,
                    Some(Property::Accessor(getter)) => {
                        match interp.call_sync(&Value::Function(getter), value.clone(), Vec::new()) {
                            Ok(v) => dump(interp, &v, depth + 1, max_depth, seen, strict)?,
                            Err(err) if strict => return Err(err),
                            Err(err) => format!("[Getter: {}]", err),
                        }
                    }
                    None => continue,
                };
                let key = if is_identifier(&key) { key } else { quote(&key) };
                parts.push(format!("{}: {}", key, rendered));
            }
            let prefix = match obj.class.as_str() {
                "Object" if obj.prototype().is_some() => String::new(),
                "Object" => "[Object: null prototype] ".to_string(),
                class => format!("{} ", class),
            };
            Ok(if parts.is_empty() {
                format!("{}{{}}", prefix)
            } else {
                format!("{}{{ {} }}", prefix, parts.join(", "))
            })
        }
        other => Ok(other.to_display()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
}

/// Literal text of a scalar member, strings quoted
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        Value::Str(s) => quote(s),
        other => other.to_display(),
    }
}
