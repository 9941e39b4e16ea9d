//! Builtin function registry.
//!
//! One table, sorted by name and aligned with the resolver's builtin list in
//! `ember_compiler`. Builtins receive the machine so higher-order ones can
//! invoke callables; the iteration builtins (`each`, `fold`, `reduce`,
//! `scan`) are the catch boundary for the `break` signal.

use crate::machine::{Exec, Machine, Signal, value_iter};
use ember_core::RuntimeError;
use ember_runtime::value::Memoized;
use ember_runtime::{BuiltinRef, RangeValue, Value, ops};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

type BuiltinFn = fn(&mut Machine, Vec<Value>) -> Exec<Value>;

/// A registered builtin.
struct BuiltinDef {
    name: &'static str,
    func: BuiltinFn,
}

/// Registry, sorted by name. Must stay aligned with
/// `ember_compiler::scope::BUILTIN_NAMES`.
static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef { name: "abs", func: builtin_abs },
    BuiltinDef { name: "each", func: builtin_each },
    BuiltinDef { name: "filter", func: builtin_filter },
    BuiltinDef { name: "first", func: builtin_first },
    BuiltinDef { name: "fold", func: builtin_fold },
    BuiltinDef { name: "get", func: builtin_get },
    BuiltinDef { name: "keys", func: builtin_keys },
    BuiltinDef { name: "list", func: builtin_list },
    BuiltinDef { name: "map", func: builtin_map },
    BuiltinDef { name: "max", func: builtin_max },
    BuiltinDef { name: "memoize", func: builtin_memoize },
    BuiltinDef { name: "min", func: builtin_min },
    BuiltinDef { name: "push", func: builtin_push },
    BuiltinDef { name: "puts", func: builtin_puts },
    BuiltinDef { name: "reduce", func: builtin_reduce },
    BuiltinDef { name: "rest", func: builtin_rest },
    BuiltinDef { name: "scan", func: builtin_scan },
    BuiltinDef { name: "size", func: builtin_size },
    BuiltinDef { name: "skip", func: builtin_skip },
    BuiltinDef { name: "take", func: builtin_take },
    BuiltinDef { name: "type", func: builtin_type },
    BuiltinDef { name: "values", func: builtin_values },
];

/// Look up a builtin by name, returning its reference value.
#[must_use]
pub fn lookup(name: &str) -> Option<Value> {
    let index = BUILTINS
        .binary_search_by(|def| def.name.cmp(name))
        .ok()?;
    Some(Value::Builtin(BuiltinRef {
        name: Rc::from(name),
        index: index as u16,
    }))
}

/// Invoke a builtin by registry index.
pub fn call(machine: &mut Machine, index: u16, args: Vec<Value>) -> Exec<Value> {
    let def = &BUILTINS[index as usize];
    (def.func)(machine, args)
}

// =============================================================================
// Helpers
// =============================================================================

fn expect_arity(name: &str, expected: usize, args: &[Value]) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::new(format!(
            "{name} expects {expected} arguments, got {}",
            args.len()
        )))
    }
}

fn expect_dict<'a>(name: &str, value: &'a Value) -> Result<&'a BTreeMap<Value, Value>, RuntimeError> {
    match value {
        Value::Dict(entries) => Ok(entries),
        other => Err(RuntimeError::new(format!(
            "{name} expects a dict, got {}",
            other.type_name()
        ))),
    }
}

fn is_unbounded_range(value: &Value) -> bool {
    matches!(value, Value::Range(r) if r.end.is_none())
}

fn require_bounded(name: &str, value: &Value) -> Result<(), RuntimeError> {
    if is_unbounded_range(value) {
        Err(RuntimeError::new(format!(
            "{name} cannot consume an unbounded range"
        )))
    } else {
        Ok(())
    }
}

// =============================================================================
// Builtins
// =============================================================================

fn builtin_abs(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("abs", 1, &args)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.abs())),
        Value::Decimal(n) => Ok(Value::decimal(n.0.abs())),
        other => Err(RuntimeError::new(format!(
            "abs expects a number, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// `each(f, coll)`: invoke `f` per element for effect. A `break` inside the
/// callback stops iteration and becomes the result; otherwise nil.
fn builtin_each(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("each", 2, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    for value in value_iter(&coll)? {
        match machine.invoke(f.clone(), vec![value]) {
            Ok(_) => {}
            Err(Signal::Break(value)) => return Ok(value),
            Err(e) => return Err(e),
        }
    }
    Ok(Value::Nil)
}

/// `filter(f, coll)`: keeps the collection's shape for sets and dicts,
/// returns a list otherwise.
fn builtin_filter(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("filter", 2, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    require_bounded("filter", &coll)?;

    match &coll {
        Value::Set(items) => {
            let mut kept = std::collections::BTreeSet::new();
            for value in items.iter() {
                if machine.invoke(f.clone(), vec![value.clone()])?.is_truthy() {
                    kept.insert(value.clone());
                }
            }
            Ok(Value::Set(Rc::new(kept)))
        }
        Value::Dict(entries) => {
            let mut kept = BTreeMap::new();
            for (k, v) in entries.iter() {
                let pair = Value::list(vec![k.clone(), v.clone()]);
                if machine.invoke(f.clone(), vec![pair])?.is_truthy() {
                    kept.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Dict(Rc::new(kept)))
        }
        _ => {
            let mut kept = Vec::new();
            for value in value_iter(&coll)? {
                if machine.invoke(f.clone(), vec![value.clone()])?.is_truthy() {
                    kept.push(value);
                }
            }
            Ok(Value::list(kept))
        }
    }
}

fn builtin_first(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("first", 1, &args)?;
    match &args[0] {
        Value::List(items) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        Value::Str(s) => Ok(s
            .chars()
            .next()
            .map(|c| Value::Str(Rc::from(c.to_string().as_str())))
            .unwrap_or(Value::Nil)),
        Value::Range(r) => {
            if r.is_empty() {
                Ok(Value::Nil)
            } else {
                Ok(Value::Int(r.start))
            }
        }
        Value::Set(items) => Ok(items.iter().next().cloned().unwrap_or(Value::Nil)),
        other => Err(RuntimeError::new(format!(
            "first expects a collection, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// `fold(initial, f, coll)`: left fold. A `break` inside the folder stops
/// iteration and its value becomes the fold's result.
fn builtin_fold(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("fold", 3, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    let mut acc = args.pop().expect("checked arity");
    for value in value_iter(&coll)? {
        match machine.invoke(f.clone(), vec![acc.clone(), value]) {
            Ok(next) => acc = next,
            Err(Signal::Break(value)) => return Ok(value),
            Err(e) => return Err(e),
        }
    }
    Ok(acc)
}

fn builtin_get(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("get", 2, &args)?;
    Ok(ops::index(&args[1], &args[0])?)
}

fn builtin_keys(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("keys", 1, &args)?;
    let entries = expect_dict("keys", &args[0])?;
    Ok(Value::list(entries.keys().cloned().collect()))
}

fn builtin_list(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("list", 1, &args)?;
    require_bounded("list", &args[0])?;
    Ok(Value::list(value_iter(&args[0])?.collect()))
}

/// `map(f, coll)`: always produces a list.
fn builtin_map(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("map", 2, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    require_bounded("map", &coll)?;
    let mut mapped = Vec::new();
    for value in value_iter(&coll)? {
        mapped.push(machine.invoke(f.clone(), vec![value])?);
    }
    Ok(Value::list(mapped))
}

fn builtin_max(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    extremum(machine, "max", ">", args)
}

fn builtin_min(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    extremum(machine, "min", "<", args)
}

/// Shared `min`/`max`: over one collection argument or over the arguments
/// themselves.
fn extremum(_machine: &mut Machine, name: &str, op: &str, args: Vec<Value>) -> Exec<Value> {
    if args.is_empty() {
        return Err(RuntimeError::new(format!("{name} expects at least 1 argument")).into());
    }
    let candidates: Vec<Value> = if args.len() == 1 {
        require_bounded(name, &args[0])?;
        value_iter(&args[0])?.collect()
    } else {
        args
    };
    let mut best: Option<Value> = None;
    for value in candidates {
        best = Some(match best {
            None => value,
            Some(current) => {
                if ops::compare(op, &value, &current)?.is_truthy() {
                    value
                } else {
                    current
                }
            }
        });
    }
    Ok(best.unwrap_or(Value::Nil))
}

/// `memoize(f)`: wrap a callable with an argument-keyed result cache. The
/// wrapper is itself callable, so `let fib = memoize(|n| ... fib(...) ...)`
/// caches every recursive step through the forward-boxed binding.
fn builtin_memoize(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("memoize", 1, &args)?;
    let target = args.into_iter().next().expect("checked arity");
    if !target.is_callable() {
        return Err(RuntimeError::new(format!(
            "memoize expects a function, got {}",
            target.type_name()
        ))
        .into());
    }
    Ok(Value::Memoized(Rc::new(Memoized {
        target,
        cache: RefCell::new(BTreeMap::new()),
    })))
}

/// `push(value, coll)`: structural append; the original is unchanged.
fn builtin_push(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("push", 2, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let value = args.pop().expect("checked arity");
    match coll {
        Value::List(items) => {
            let mut items = (*items).clone();
            items.push(value);
            Ok(Value::list(items))
        }
        Value::Set(items) => {
            if !value.is_hashable() {
                return Err(RuntimeError::new(format!(
                    "unhashable type: {}",
                    value.type_name()
                ))
                .into());
            }
            let mut items = (*items).clone();
            items.insert(value);
            Ok(Value::Set(Rc::new(items)))
        }
        other => Err(RuntimeError::new(format!(
            "push expects a list or set, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn builtin_puts(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
    println!("{}", rendered.join(" "));
    Ok(Value::Nil)
}

/// `reduce(f, coll)`: fold seeded by the first element.
fn builtin_reduce(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("reduce", 2, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    let mut iter = value_iter(&coll)?;
    let Some(mut acc) = iter.next() else {
        return Err(RuntimeError::new("reduce of an empty collection").into());
    };
    for value in iter {
        match machine.invoke(f.clone(), vec![acc.clone(), value]) {
            Ok(next) => acc = next,
            Err(Signal::Break(value)) => return Ok(value),
            Err(e) => return Err(e),
        }
    }
    Ok(acc)
}

fn builtin_rest(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("rest", 1, &args)?;
    match &args[0] {
        Value::List(items) => Ok(Value::list(items.iter().skip(1).cloned().collect())),
        Value::Str(s) => {
            let mut chars = s.chars();
            chars.next();
            Ok(Value::str(chars.as_str()))
        }
        Value::Range(r) => Ok(Value::Range(Rc::new(RangeValue {
            start: r.start + 1,
            end: r.end,
            inclusive: r.inclusive,
        }))),
        other => Err(RuntimeError::new(format!(
            "rest expects a collection, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// `scan(initial, f, coll)`: the list of successive accumulators, starting
/// with the initial value. A `break` appends its value and stops.
fn builtin_scan(machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("scan", 3, &args)?;
    let mut args = args;
    let coll = args.pop().expect("checked arity");
    let f = args.pop().expect("checked arity");
    let mut acc = args.pop().expect("checked arity");
    let mut accs = vec![acc.clone()];
    for value in value_iter(&coll)? {
        match machine.invoke(f.clone(), vec![acc.clone(), value]) {
            Ok(next) => {
                acc = next;
                accs.push(acc.clone());
            }
            Err(Signal::Break(value)) => {
                accs.push(value);
                return Ok(Value::list(accs));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Value::list(accs))
}

fn builtin_size(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("size", 1, &args)?;
    Ok(ops::len(&args[0])?)
}

/// `skip(n, coll)`: drop the first `n` elements. Skipping an unbounded range
/// shifts its start.
fn builtin_skip(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("skip", 2, &args)?;
    let Value::Int(n) = args[0] else {
        return Err(RuntimeError::new("skip expects an integer count").into());
    };
    let n = n.max(0);
    match &args[1] {
        Value::Range(r) => Ok(Value::Range(Rc::new(RangeValue {
            start: r.start + n,
            end: r.end,
            inclusive: r.inclusive,
        }))),
        coll => {
            require_bounded("skip", coll)?;
            Ok(Value::list(
                value_iter(coll)?.skip(n as usize).collect(),
            ))
        }
    }
}

/// `take(n, coll)`: the first `n` elements as a list; this is the bounded
/// window into an unbounded range.
fn builtin_take(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("take", 2, &args)?;
    let Value::Int(n) = args[0] else {
        return Err(RuntimeError::new("take expects an integer count").into());
    };
    let n = n.max(0) as usize;
    Ok(Value::list(value_iter(&args[1])?.take(n).collect()))
}

fn builtin_type(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("type", 1, &args)?;
    Ok(Value::str(args[0].type_name()))
}

fn builtin_values(_machine: &mut Machine, args: Vec<Value>) -> Exec<Value> {
    expect_arity("values", 1, &args)?;
    let entries = expect_dict("values", &args[0])?;
    Ok(Value::list(entries.values().cloned().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_sorted() {
        let names: Vec<&str> = BUILTINS.iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted, "binary_search requires a sorted registry");
    }

    #[test]
    fn test_registry_matches_resolver_table() {
        let names: Vec<&str> = BUILTINS.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            ember_compiler::scope::BUILTIN_NAMES.to_vec(),
            "the VM registry and the resolver's builtin table must agree"
        );
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("map").is_some());
        assert!(lookup("no_such_builtin").is_none());
    }
}
