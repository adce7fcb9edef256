// Global objects and prototype methods available to every snippet

use crate::eval::error::{EvalResult, RuntimeError};
use crate::eval::format::{self, JsonError};
use crate::eval::interp::{Interpreter, enumerable_keys};
use crate::eval::value::{ArrayRef, Function, Object, Value, number_to_string};
use futures::FutureExt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Native whose body never suspends
pub fn sync_fn(
    name: &str,
    params: &str,
    f: impl Fn(&Interpreter, &Value, &[Value]) -> EvalResult<Value> + 'static,
) -> Value {
    Value::Function(Function::native(
        name,
        params,
        false,
        Rc::new(move |interp, this, args| futures::future::ready(f(&interp, &this, &args)).boxed_local()),
    ))
}

/// Native that may call back into the interpreter; the call completes
/// before the caller continues
pub fn method<F, Fut>(name: &str, params: &str, f: F) -> Value
where
    F: Fn(Interpreter, Value, Vec<Value>) -> Fut + 'static,
    Fut: Future<Output = EvalResult<Value>> + 'static,
{
    Value::Function(Function::native(
        name,
        params,
        false,
        Rc::new(move |interp, this, args| f(interp, this, args).boxed_local()),
    ))
}

/// Native returning a promise; its body runs when awaited
pub fn async_fn<F, Fut>(name: &str, params: &str, f: F) -> Value
where
    F: Fn(Interpreter, Value, Vec<Value>) -> Fut + 'static,
    Fut: Future<Output = EvalResult<Value>> + 'static,
{
    Value::Function(Function::native(
        name,
        params,
        true,
        Rc::new(move |interp, this, args| f(interp, this, args).boxed_local()),
    ))
}

pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Build an object from `(key, value)` pairs
pub fn object(interp: &Interpreter, class: &str, fields: Vec<(&str, Value)>) -> Value {
    let obj = Object::new(class, Some(interp.realm().object_proto.clone()));
    for (key, value) in fields {
        obj.set(key, value);
    }
    Value::Object(obj)
}

pub fn install(interp: &Interpreter) {
    install_prototypes(interp);

    let globals = interp.globals();
    let define = |name: &str, value: Value| globals.declare(name, value, false);

    define(
        "console",
        object(
            interp,
            "Console",
            vec![
                ("log", console_fn("log")),
                ("info", console_fn("info")),
                ("warn", console_fn("warn")),
                ("error", console_fn("error")),
            ],
        ),
    );
    define("Object", object_namespace(interp));
    define("JSON", json_namespace(interp));
    define("Math", math_namespace(interp));
    define(
        "Array",
        object(
            interp,
            "Function",
            vec![
                (
                    "isArray",
                    sync_fn("isArray", "value", |_, _, args| {
                        Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
                    }),
                ),
                (
                    "from",
                    sync_fn("from", "items", |_, _, args| match arg(args, 0) {
                        Value::Array(items) => Ok(Value::array(items.borrow().clone())),
                        Value::Str(s) => Ok(Value::array(s.chars().map(|c| Value::from(c.to_string())).collect())),
                        _ => Ok(Value::array(Vec::new())),
                    }),
                ),
            ],
        ),
    );
    define(
        "Date",
        object(
            interp,
            "Function",
            vec![(
                "now",
                sync_fn("now", "", |_, _, _| {
                    Ok(Value::Number(chrono::Utc::now().timestamp_millis() as f64))
                }),
            )],
        ),
    );

    define(
        "String",
        sync_fn("String", "value", |_, _, args| {
            Ok(Value::from(args.first().map(Value::to_display).unwrap_or_default()))
        }),
    );
    define(
        "Number",
        sync_fn("Number", "value", |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
    );
    define(
        "Boolean",
        sync_fn("Boolean", "value", |_, _, args| Ok(Value::Bool(arg(args, 0).truthy()))),
    );
    define(
        "parseInt",
        sync_fn("parseInt", "string, radix", |_, _, args| {
            let radix = match arg(args, 1) {
                Value::Undefined => None,
                r => Some(r.to_number() as u32),
            };
            Ok(Value::Number(parse_int(&arg(args, 0).to_display(), radix)))
        }),
    );
    define(
        "parseFloat",
        sync_fn("parseFloat", "string", |_, _, args| {
            Ok(Value::Number(parse_float(&arg(args, 0).to_display())))
        }),
    );
    define(
        "isNaN",
        sync_fn("isNaN", "value", |_, _, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
    );
    define(
        "isFinite",
        sync_fn("isFinite", "value", |_, _, args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_finite()))
        }),
    );
    for kind in ["Error", "TypeError", "RangeError"] {
        define(
            kind,
            sync_fn(kind, "message", move |interp, _, args| {
                let message = match arg(args, 0) {
                    Value::Undefined => String::new(),
                    m => m.to_display(),
                };
                Ok(interp.new_error(kind, &message))
            }),
        );
    }
    define(
        "sleep",
        async_fn("sleep", "ms", |_, _, args| async move {
            let ms = arg(&args, 0).to_number();
            let ms = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Value::Undefined)
        }),
    );
}

fn console_fn(level: &'static str) -> Value {
    sync_fn(level, "...data", move |interp, _, args| {
        let line = args
            .iter()
            .map(|v| match v {
                Value::Str(s) => s.to_string(),
                other => format::inline(interp, other),
            })
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            "warn" | "error" => interp.log(format!("[{}] {}", level, line)),
            _ => interp.log(line),
        }
        Ok(Value::Undefined)
    })
}

// ---- namespaces ----

fn object_namespace(interp: &Interpreter) -> Value {
    object(
        interp,
        "Function",
        vec![
            (
                "keys",
                sync_fn("keys", "object", |_, _, args| {
                    Ok(Value::array(
                        enumerable_keys(&arg(args, 0)).into_iter().map(Value::from).collect(),
                    ))
                }),
            ),
            (
                "values",
                method("values", "object", |interp, _, args| async move {
                    let subject = arg(&args, 0);
                    let mut values = Vec::new();
                    for key in enumerable_keys(&subject) {
                        values.push(interp.get_member(&subject, &key).await?);
                    }
                    Ok(Value::array(values))
                }),
            ),
            (
                "entries",
                method("entries", "object", |interp, _, args| async move {
                    let subject = arg(&args, 0);
                    let mut entries = Vec::new();
                    for key in enumerable_keys(&subject) {
                        let value = interp.get_member(&subject, &key).await?;
                        entries.push(Value::array(vec![Value::from(key), value]));
                    }
                    Ok(Value::array(entries))
                }),
            ),
            (
                "create",
                sync_fn("create", "proto", |_, _, args| match arg(args, 0) {
                    Value::Object(proto) => Ok(Value::Object(Object::new("Object", Some(proto)))),
                    Value::Null => Ok(Value::Object(Object::new("Object", None))),
                    _ => Err(RuntimeError::type_error(
                        "Object prototype may only be an Object or null",
                    )),
                }),
            ),
            (
                "assign",
                method("assign", "target, ...sources", |interp, _, args| async move {
                    let target = arg(&args, 0);
                    for source in args.iter().skip(1) {
                        for key in enumerable_keys(source) {
                            let value = interp.get_member(source, &key).await?;
                            interp.set_member(&target, &key, value)?;
                        }
                    }
                    Ok(target)
                }),
            ),
            (
                "getPrototypeOf",
                sync_fn("getPrototypeOf", "object", |interp, _, args| {
                    Ok(match arg(args, 0) {
                        Value::Object(obj) => obj.prototype().map_or(Value::Null, Value::Object),
                        Value::Array(_) => Value::Object(interp.realm().array_proto.clone()),
                        _ => Value::Null,
                    })
                }),
            ),
        ],
    )
}

fn json_namespace(interp: &Interpreter) -> Value {
    object(
        interp,
        "JSON",
        vec![
            (
                "stringify",
                sync_fn("stringify", "value, replacer, space", |interp, _, args| {
                    let json = match format::to_json(interp, &arg(args, 0), false) {
                        Ok(Some(json)) => json,
                        Ok(None) => return Ok(Value::Undefined),
                        Err(JsonError::Circular) => {
                            return Err(RuntimeError::type_error(
                                "Converting circular structure to JSON",
                            ));
                        }
                        Err(JsonError::Unsupported(what)) => {
                            return Err(RuntimeError::type_error(format!(
                                "Cannot serialize {} to JSON",
                                what
                            )));
                        }
                        Err(JsonError::Getter(err)) => return Err(err),
                    };
                    let indent = arg(args, 2).to_number();
                    let text = if indent.is_finite() && indent >= 1.0 {
                        format::json_with_indent(&json, indent.min(10.0) as usize)
                    } else {
                        json.to_string()
                    };
                    Ok(Value::from(text))
                }),
            ),
            (
                "parse",
                sync_fn("parse", "text", |interp, _, args| {
                    let text = arg(args, 0).to_display();
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(|json| format::from_json(interp, &json))
                        .map_err(|e| RuntimeError::new("SyntaxError", format!("Invalid JSON: {}", e)))
                }),
            ),
        ],
    )
}

fn math_namespace(interp: &Interpreter) -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
        (
            name,
            sync_fn(name, "x", move |_, _, args| Ok(Value::Number(f(arg(args, 0).to_number())))),
        )
    }
    let round = |x: f64| (x + 0.5).floor();
    let mut fields = vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", round),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("trunc", f64::trunc),
        unary("log", f64::ln),
        unary("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        (
            "pow",
            sync_fn("pow", "base, exponent", |_, _, args| {
                Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
            }),
        ),
        (
            "random",
            sync_fn("random", "", |_, _, _| Ok(Value::Number(rand::random::<f64>()))),
        ),
    ];
    fields.push((
        "max",
        sync_fn("max", "...values", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::NEG_INFINITY,
                |acc, x| if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.max(x) },
            )))
        }),
    ));
    fields.push((
        "min",
        sync_fn("min", "...values", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::INFINITY,
                |acc, x| if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.min(x) },
            )))
        }),
    ));
    object(interp, "Math", fields)
}

// ---- prototypes ----

fn install_prototypes(interp: &Interpreter) {
    let realm = interp.realm();

    realm.object_proto.set(
        "hasOwnProperty",
        sync_fn("hasOwnProperty", "key", |_, this, args| {
            let key = arg(args, 0).to_display();
            Ok(Value::Bool(match this {
                Value::Object(obj) => obj.get_own(&key).is_some(),
                Value::Array(items) => key.parse::<usize>().is_ok_and(|i| i < items.borrow().len()),
                _ => false,
            }))
        }),
    );
    realm.object_proto.set(
        "toString",
        sync_fn("toString", "", |_, this, _| Ok(Value::from(this.to_display()))),
    );

    realm.number_proto.set(
        "toFixed",
        sync_fn("toFixed", "digits", |_, this, args| {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_finite() { digits.clamp(0.0, 20.0) as usize } else { 0 };
            Ok(Value::from(format!("{:.*}", digits, this.to_number())))
        }),
    );
    realm.number_proto.set(
        "toString",
        sync_fn("toString", "", |_, this, _| Ok(Value::from(number_to_string(this.to_number())))),
    );

    for (name, value) in array_methods() {
        realm.array_proto.set(name, value);
    }
    for (name, value) in string_methods() {
        realm.string_proto.set(name, value);
    }
}

fn this_array(this: &Value, method: &str) -> EvalResult<ArrayRef> {
    match this {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(RuntimeError::type_error(format!(
            "Array.prototype.{} called on a non-array",
            method
        ))),
    }
}

/// Snapshot of the receiver's items, so callbacks may mutate it
fn items_of(this: &Value, method: &str) -> EvalResult<Vec<Value>> {
    Ok(this_array(this, method)?.borrow().clone())
}

async fn callback(interp: &Interpreter, f: &Value, item: Value, index: usize, this: &Value) -> EvalResult<Value> {
    interp
        .call(f, Value::Undefined, vec![item, Value::Number(index as f64), this.clone()])
        .await
}

/// Resolve a possibly negative index against `len`
fn relative(index: &Value, len: usize, default: usize) -> usize {
    if matches!(index, Value::Undefined) {
        return default;
    }
    let n = index.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn array_methods() -> Vec<(&'static str, Value)> {
    vec![
        (
            "push",
            sync_fn("push", "...items", |_, this, args| {
                let items = this_array(this, "push")?;
                items.borrow_mut().extend(args.iter().cloned());
                Ok(Value::Number(items.borrow().len() as f64))
            }),
        ),
        (
            "pop",
            sync_fn("pop", "", |_, this, _| {
                Ok(this_array(this, "pop")?.borrow_mut().pop().unwrap_or_default())
            }),
        ),
        (
            "shift",
            sync_fn("shift", "", |_, this, _| {
                let items = this_array(this, "shift")?;
                let mut items = items.borrow_mut();
                Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
            }),
        ),
        (
            "map",
            method("map", "callbackfn", |interp, this, args| async move {
                let f = arg(&args, 0);
                let mut out = Vec::new();
                for (i, item) in items_of(&this, "map")?.into_iter().enumerate() {
                    out.push(callback(&interp, &f, item, i, &this).await?);
                }
                Ok(Value::array(out))
            }),
        ),
        (
            "filter",
            method("filter", "predicate", |interp, this, args| async move {
                let f = arg(&args, 0);
                let mut out = Vec::new();
                for (i, item) in items_of(&this, "filter")?.into_iter().enumerate() {
                    if callback(&interp, &f, item.clone(), i, &this).await?.truthy() {
                        out.push(item);
                    }
                }
                Ok(Value::array(out))
            }),
        ),
        (
            "forEach",
            method("forEach", "callbackfn", |interp, this, args| async move {
                let f = arg(&args, 0);
                for (i, item) in items_of(&this, "forEach")?.into_iter().enumerate() {
                    callback(&interp, &f, item, i, &this).await?;
                }
                Ok(Value::Undefined)
            }),
        ),
        (
            "find",
            method("find", "predicate", |interp, this, args| async move {
                let f = arg(&args, 0);
                for (i, item) in items_of(&this, "find")?.into_iter().enumerate() {
                    if callback(&interp, &f, item.clone(), i, &this).await?.truthy() {
                        return Ok(item);
                    }
                }
                Ok(Value::Undefined)
            }),
        ),
        (
            "some",
            method("some", "predicate", |interp, this, args| async move {
                let f = arg(&args, 0);
                for (i, item) in items_of(&this, "some")?.into_iter().enumerate() {
                    if callback(&interp, &f, item, i, &this).await?.truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }),
        ),
        (
            "every",
            method("every", "predicate", |interp, this, args| async move {
                let f = arg(&args, 0);
                for (i, item) in items_of(&this, "every")?.into_iter().enumerate() {
                    if !callback(&interp, &f, item, i, &this).await?.truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }),
        ),
        (
            "reduce",
            method("reduce", "callbackfn, initialValue", |interp, this, args| async move {
                let f = arg(&args, 0);
                let mut items = items_of(&this, "reduce")?.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match items.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(RuntimeError::type_error(
                                "Reduce of empty array with no initial value",
                            ));
                        }
                    },
                };
                for (i, item) in items {
                    acc = interp
                        .call(&f, Value::Undefined, vec![acc, item, Value::Number(i as f64), this.clone()])
                        .await?;
                }
                Ok(acc)
            }),
        ),
        (
            "sort",
            method("sort", "compareFn", |interp, this, args| async move {
                let items = this_array(&this, "sort")?;
                let compare = arg(&args, 0);
                let snapshot = items.borrow().clone();
                let mut sorted: Vec<Value> = Vec::with_capacity(snapshot.len());
                for item in snapshot {
                    // Insertion sort keeps the comparator calls awaitable
                    let mut at = sorted.len();
                    while at > 0 {
                        let before = match &compare {
                            Value::Function(_) => {
                                interp
                                    .call(&compare, Value::Undefined, vec![sorted[at - 1].clone(), item.clone()])
                                    .await?
                                    .to_number()
                                    > 0.0
                            }
                            _ => sorted[at - 1].to_display() > item.to_display(),
                        };
                        if !before {
                            break;
                        }
                        at -= 1;
                    }
                    sorted.insert(at, item);
                }
                *items.borrow_mut() = sorted;
                Ok(this)
            }),
        ),
        (
            "reverse",
            sync_fn("reverse", "", |_, this, _| {
                this_array(this, "reverse")?.borrow_mut().reverse();
                Ok(this.clone())
            }),
        ),
        (
            "join",
            sync_fn("join", "separator", |_, this, args| {
                let separator = match arg(args, 0) {
                    Value::Undefined => ",".to_string(),
                    s => s.to_display(),
                };
                let text = items_of(this, "join")?
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                    .collect::<Vec<_>>()
                    .join(&separator);
                Ok(Value::from(text))
            }),
        ),
        (
            "slice",
            sync_fn("slice", "start, end", |_, this, args| {
                let items = items_of(this, "slice")?;
                let start = relative(&arg(args, 0), items.len(), 0);
                let end = relative(&arg(args, 1), items.len(), items.len());
                Ok(Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
            }),
        ),
        (
            "concat",
            sync_fn("concat", "...items", |_, this, args| {
                let mut items = items_of(this, "concat")?;
                for extra in args {
                    match extra {
                        Value::Array(more) => items.extend(more.borrow().iter().cloned()),
                        other => items.push(other.clone()),
                    }
                }
                Ok(Value::array(items))
            }),
        ),
        (
            "includes",
            sync_fn("includes", "searchElement", |_, this, args| {
                let needle = arg(args, 0);
                Ok(Value::Bool(items_of(this, "includes")?.iter().any(|v| {
                    v.strict_equals(&needle)
                        || matches!((v, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
                })))
            }),
        ),
        (
            "indexOf",
            sync_fn("indexOf", "searchElement", |_, this, args| {
                let needle = arg(args, 0);
                Ok(Value::Number(
                    items_of(this, "indexOf")?
                        .iter()
                        .position(|v| v.strict_equals(&needle))
                        .map_or(-1.0, |i| i as f64),
                ))
            }),
        ),
    ]
}

fn this_str(this: &Value) -> Rc<str> {
    match this {
        Value::Str(s) => s.clone(),
        other => Rc::from(other.to_display().as_str()),
    }
}

fn string_methods() -> Vec<(&'static str, Value)> {
    fn text_fn(name: &'static str, f: fn(&str) -> String) -> (&'static str, Value) {
        (
            name,
            sync_fn(name, "", move |_, this, _| Ok(Value::from(f(&this_str(this))))),
        )
    }
    fn test_fn(name: &'static str, f: fn(&str, &str) -> bool) -> (&'static str, Value) {
        (
            name,
            sync_fn(name, "searchString", move |_, this, args| {
                Ok(Value::Bool(f(&this_str(this), &arg(args, 0).to_display())))
            }),
        )
    }

    vec![
        text_fn("toUpperCase", str::to_uppercase),
        text_fn("toLowerCase", str::to_lowercase),
        text_fn("trim", |s| s.trim().to_string()),
        text_fn("trimStart", |s| s.trim_start().to_string()),
        text_fn("trimEnd", |s| s.trim_end().to_string()),
        test_fn("includes", |s, needle| s.contains(needle)),
        test_fn("startsWith", |s, needle| s.starts_with(needle)),
        test_fn("endsWith", |s, needle| s.ends_with(needle)),
        (
            "indexOf",
            sync_fn("indexOf", "searchString", |_, this, args| {
                let s = this_str(this);
                let needle = arg(args, 0).to_display();
                Ok(Value::Number(
                    s.find(&needle).map_or(-1.0, |byte| s[..byte].chars().count() as f64),
                ))
            }),
        ),
        (
            "split",
            sync_fn("split", "separator", |_, this, args| {
                let s = this_str(this);
                let parts: Vec<Value> = match arg(args, 0) {
                    Value::Undefined => vec![Value::Str(s.clone())],
                    sep => {
                        let sep = sep.to_display();
                        if sep.is_empty() {
                            s.chars().map(|c| Value::from(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::from).collect()
                        }
                    }
                };
                Ok(Value::array(parts))
            }),
        ),
        (
            "slice",
            sync_fn("slice", "start, end", |_, this, args| {
                let chars: Vec<char> = this_str(this).chars().collect();
                let start = relative(&arg(args, 0), chars.len(), 0);
                let end = relative(&arg(args, 1), chars.len(), chars.len());
                Ok(Value::from(chars.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>()))
            }),
        ),
        (
            "substring",
            sync_fn("substring", "start, end", |_, this, args| {
                let chars: Vec<char> = this_str(this).chars().collect();
                let clamp = |v: Value, default: usize| match v {
                    Value::Undefined => default,
                    v => {
                        let n = v.to_number();
                        if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(chars.len()) }
                    }
                };
                let a = clamp(arg(args, 0), 0);
                let b = clamp(arg(args, 1), chars.len());
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Ok(Value::from(chars[start..end].iter().collect::<String>()))
            }),
        ),
        (
            "charAt",
            sync_fn("charAt", "pos", |_, this, args| {
                let index = arg(args, 0).to_number();
                let index = if index.is_nan() { 0.0 } else { index };
                Ok(Value::from(if index < 0.0 {
                    String::new()
                } else {
                    this_str(this).chars().nth(index as usize).map(String::from).unwrap_or_default()
                }))
            }),
        ),
        (
            "replace",
            sync_fn("replace", "pattern, replacement", |_, this, args| {
                let s = this_str(this);
                let pattern = arg(args, 0).to_display();
                let replacement = arg(args, 1).to_display();
                Ok(Value::from(s.replacen(pattern.as_str(), &replacement, 1)))
            }),
        ),
        (
            "replaceAll",
            sync_fn("replaceAll", "pattern, replacement", |_, this, args| {
                let s = this_str(this);
                let pattern = arg(args, 0).to_display();
                let replacement = arg(args, 1).to_display();
                Ok(Value::from(s.replace(pattern.as_str(), &replacement)))
            }),
        ),
        (
            "repeat",
            sync_fn("repeat", "count", |_, this, args| {
                let count = arg(args, 0).to_number();
                if !(0.0..1e6).contains(&count) {
                    return Err(RuntimeError::range_error(format!(
                        "Invalid count value: {}",
                        number_to_string(count)
                    )));
                }
                Ok(Value::from(this_str(this).repeat(count as usize)))
            }),
        ),
        (
            "padStart",
            sync_fn("padStart", "maxLength, fillString", |_, this, args| {
                Ok(Value::from(pad(&this_str(this), args, true)))
            }),
        ),
        (
            "padEnd",
            sync_fn("padEnd", "maxLength, fillString", |_, this, args| {
                Ok(Value::from(pad(&this_str(this), args, false)))
            }),
        ),
    ]
}

fn pad(s: &str, args: &[Value], start: bool) -> String {
    let target = arg(args, 0).to_number();
    let fill = match arg(args, 1) {
        Value::Undefined => " ".to_string(),
        f => f.to_display(),
    };
    let len = s.chars().count();
    if !target.is_finite() || target as usize <= len || fill.is_empty() {
        return s.to_string();
    }
    let padding: String = fill.chars().cycle().take(target as usize - len).collect();
    if start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut s = text.trim();
    let negative = s.starts_with('-');
    s = s.trim_start_matches(['-', '+']);
    let radix = match radix {
        Some(0) | None if s.starts_with("0x") || s.starts_with("0X") => {
            s = &s[2..];
            16
        }
        Some(r @ 2..=36) => r,
        Some(0) | None => 10,
        Some(_) => return f64::NAN,
    };
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .fold(0.0, |acc, c| acc * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64);
    if negative { -value } else { value }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    if s.starts_with("Infinity") || s.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses as a number
    let candidates = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| s[..end].chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)));
    candidates
        .filter_map(|end| s[..end].parse::<f64>().ok())
        .last()
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("-0x1f", None), -31.0);
        assert_eq!(parse_int("101", Some(2)), 5.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.25kg"), 3.25);
        assert_eq!(parse_float("  -1e3"), -1000.0);
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn test_pad_and_relative() {
        assert_eq!(pad("7", &[Value::Number(3.0), Value::str("0")], true), "007");
        assert_eq!(relative(&Value::Number(-1.0), 5, 0), 4);
        assert_eq!(relative(&Value::Undefined, 5, 5), 5);
    }
}
