//! Value-contract operations.
//!
//! Every operator instruction the generator emits dispatches into one of
//! these functions; the VM never inlines value semantics. All operations are
//! total over the value domain: unsupported combinations produce a
//! `RuntimeError`, equality never fails.

use crate::value::{RangeValue, Value};
use ember_core::RuntimeError;
use ordered_float::OrderedFloat;
use std::rc::Rc;

type OpResult = Result<Value, RuntimeError>;

fn type_error(op: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "unsupported operand types for `{op}`: {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn uninit_error() -> RuntimeError {
    RuntimeError::new("value used before initialization")
}

fn check_init(value: &Value) -> Result<(), RuntimeError> {
    if matches!(value, Value::Uninit) {
        Err(uninit_error())
    } else {
        Ok(())
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

/// `a + b`: numeric addition (int/decimal coercion), string or list
/// concatenation, set union, dict merge (right wins).
pub fn add(left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::new("integer overflow in `+`")),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(*a + *b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Value::Decimal(OrderedFloat(*a as f64) + *b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(Value::Decimal(*a + OrderedFloat(*b as f64))),
        (Value::Str(a), Value::Str(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::Str(Rc::from(s.as_str())))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = (**a).clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(Rc::new(items)))
        }
        (Value::Set(a), Value::Set(b)) => {
            let mut items = (**a).clone();
            items.extend(b.iter().cloned());
            Ok(Value::Set(Rc::new(items)))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            let mut entries = (**a).clone();
            for (k, v) in b.iter() {
                entries.insert(k.clone(), v.clone());
            }
            Ok(Value::Dict(Rc::new(entries)))
        }
        _ => {
            check_init(left)?;
            check_init(right)?;
            Err(type_error("+", left, right))
        }
    }
}

/// `a - b`: numeric subtraction, set difference.
pub fn sub(left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::new("integer overflow in `-`")),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(*a - *b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Value::Decimal(OrderedFloat(*a as f64) - *b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(Value::Decimal(*a - OrderedFloat(*b as f64))),
        (Value::Set(a), Value::Set(b)) => {
            let items = a.iter().filter(|v| !b.contains(v)).cloned().collect();
            Ok(Value::Set(Rc::new(items)))
        }
        _ => {
            check_init(left)?;
            check_init(right)?;
            Err(type_error("-", left, right))
        }
    }
}

/// `a * b`: numeric multiplication.
pub fn mul(left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::new("integer overflow in `*`")),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(*a * *b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Value::Decimal(OrderedFloat(*a as f64) * *b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(Value::Decimal(*a * OrderedFloat(*b as f64))),
        _ => {
            check_init(left)?;
            check_init(right)?;
            Err(type_error("*", left, right))
        }
    }
}

/// `a / b`: integer division truncates; any decimal operand divides as
/// decimals. Division by zero is a runtime error.
pub fn div(left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::new("division by zero")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(*a / *b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Value::Decimal(OrderedFloat(*a as f64) / *b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(Value::Decimal(*a / OrderedFloat(*b as f64))),
        _ => {
            check_init(left)?;
            check_init(right)?;
            Err(type_error("/", left, right))
        }
    }
}

/// `a % b`: integer remainder.
pub fn rem(left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::new("modulo by zero")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
        _ => {
            check_init(left)?;
            check_init(right)?;
            Err(type_error("%", left, right))
        }
    }
}

/// Unary `-`.
pub fn neg(value: &Value) -> OpResult {
    match value {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::new("integer overflow in unary `-`")),
        Value::Decimal(n) => Ok(Value::Decimal(-*n)),
        Value::Uninit => Err(uninit_error()),
        other => Err(RuntimeError::new(format!(
            "unsupported operand type for unary `-`: {}",
            other.type_name()
        ))),
    }
}

/// Unary `!`: logical negation of truthiness; never fails.
pub fn not(value: &Value) -> Value {
    Value::Bool(!value.is_truthy())
}

// =============================================================================
// Comparison
// =============================================================================

/// Structural equality; never fails. Ints and decimals are distinct types
/// and compare unequal.
pub fn eq(left: &Value, right: &Value) -> Value {
    Value::Bool(left == right)
}

/// Ordering comparisons: numeric (with coercion) and string-to-string.
pub fn compare(op: &str, left: &Value, right: &Value) -> OpResult {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
        (Value::Int(a), Value::Decimal(b)) => OrderedFloat(*a as f64).cmp(b),
        (Value::Decimal(a), Value::Int(b)) => a.cmp(&OrderedFloat(*b as f64)),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            check_init(left)?;
            check_init(right)?;
            return Err(type_error(op, left, right));
        }
    };
    Ok(Value::Bool(match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        other => panic!("internal error: unknown comparison `{other}`"),
    }))
}

// =============================================================================
// Collections
// =============================================================================

/// `collection[key]`: list/string indexing (negative wraps from the end,
/// out of range yields nil), dict lookup (missing key yields nil).
pub fn index(collection: &Value, key: &Value) -> OpResult {
    match (collection, key) {
        (Value::List(items), Value::Int(i)) => {
            Ok(list_index(items, *i).cloned().unwrap_or(Value::Nil))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = wrap_index(*i, chars.len());
            Ok(idx
                .and_then(|i| chars.get(i))
                .map(|c| Value::Str(Rc::from(c.to_string().as_str())))
                .unwrap_or(Value::Nil))
        }
        (Value::Dict(entries), key) => Ok(entries.get(key).cloned().unwrap_or(Value::Nil)),
        (Value::Set(items), key) => Ok(Value::Bool(items.contains(key))),
        _ => {
            check_init(collection)?;
            Err(RuntimeError::new(format!(
                "cannot index {} with {}",
                collection.type_name(),
                key.type_name()
            )))
        }
    }
}

fn wrap_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn list_index(items: &[Value], i: i64) -> Option<&Value> {
    wrap_index(i, items.len()).map(|idx| &items[idx])
}

/// `list[start..end]`; `end` nil means "to the end". Bounds are clamped.
pub fn slice(collection: &Value, start: &Value, end: &Value) -> OpResult {
    let Value::List(items) = collection else {
        check_init(collection)?;
        return Err(RuntimeError::new(format!(
            "cannot slice {}",
            collection.type_name()
        )));
    };
    let Value::Int(start) = start else {
        return Err(RuntimeError::new("slice bounds must be integers"));
    };
    let end = match end {
        Value::Nil => items.len() as i64,
        Value::Int(e) => *e,
        _ => return Err(RuntimeError::new("slice bounds must be integers")),
    };
    let len = items.len() as i64;
    let start = (*start).clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        return Ok(Value::list(Vec::new()));
    }
    Ok(Value::list(items[start..end].to_vec()))
}

/// Element count of a collection.
pub fn len(value: &Value) -> OpResult {
    match value {
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Set(items) => Ok(Value::Int(items.len() as i64)),
        Value::Dict(entries) => Ok(Value::Int(entries.len() as i64)),
        Value::Range(r) => r.len().map(Value::Int).ok_or_else(|| {
            RuntimeError::new("cannot take the size of an unbounded range")
        }),
        _ => {
            check_init(value)?;
            Err(RuntimeError::new(format!(
                "cannot take the size of {}",
                value.type_name()
            )))
        }
    }
}

/// Construct a range value; bounds must be integers.
pub fn make_range(start: &Value, end: &Value, inclusive: bool) -> OpResult {
    let Value::Int(start) = start else {
        check_init(start)?;
        return Err(RuntimeError::new("range bounds must be integers"));
    };
    let end = match end {
        Value::Nil => None,
        Value::Int(e) => Some(*e),
        other => {
            check_init(other)?;
            return Err(RuntimeError::new("range bounds must be integers"));
        }
    };
    Ok(Value::Range(Rc::new(RangeValue {
        start: *start,
        end,
        inclusive,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_addition_and_coercion() {
        assert_eq!(add(&Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            add(&Value::Int(2), &Value::decimal(0.5)).unwrap(),
            Value::decimal(2.5)
        );
    }

    #[test]
    fn test_string_and_list_concat() {
        assert_eq!(
            add(&Value::str("ab"), &Value::str("cd")).unwrap(),
            Value::str("abcd")
        );
        assert_eq!(
            add(
                &Value::list(vec![Value::Int(1)]),
                &Value::list(vec![Value::Int(2)])
            )
            .unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_type_errors_name_both_types() {
        let err = add(&Value::Int(1), &Value::str("x")).unwrap_err();
        assert!(err.message.contains("int"));
        assert!(err.message.contains("string"));
    }

    #[test]
    fn test_division() {
        assert_eq!(div(&Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
        assert!(div(&Value::Int(1), &Value::Int(0)).is_err());
        assert_eq!(
            div(&Value::decimal(1.0), &Value::Int(2)).unwrap(),
            Value::decimal(0.5)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            compare("<", &Value::Int(1), &Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            compare(">=", &Value::str("b"), &Value::str("a")).unwrap(),
            Value::Bool(true)
        );
        assert!(compare("<", &Value::Int(1), &Value::str("a")).is_err());
    }

    #[test]
    fn test_index_semantics() {
        let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(index(&list, &Value::Int(0)).unwrap(), Value::Int(10));
        assert_eq!(index(&list, &Value::Int(-1)).unwrap(), Value::Int(20));
        assert_eq!(index(&list, &Value::Int(5)).unwrap(), Value::Nil);
    }

    #[test]
    fn test_slice_clamps() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            slice(&list, &Value::Int(1), &Value::Nil).unwrap(),
            Value::list(vec![Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            slice(&list, &Value::Int(2), &Value::Int(100)).unwrap(),
            Value::list(vec![Value::Int(3)])
        );
        assert_eq!(
            slice(&list, &Value::Int(3), &Value::Nil).unwrap(),
            Value::list(vec![])
        );
    }

    #[test]
    fn test_uninit_operand_reports_initialization() {
        let err = add(&Value::Uninit, &Value::Int(1)).unwrap_err();
        assert!(err.message.contains("before initialization"));
    }
}
