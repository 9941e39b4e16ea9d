//! Value representation.
//!
//! Immutable data values share structure through `Rc`; decimals use
//! `OrderedFloat` so every data value has a total order, which is what makes
//! sets, dict keys and memoization caches work over `BTreeMap` without a
//! separate hashing story.
//!
//! A `Cell` is the shared mutable indirection behind `let mut` captures and
//! forward-reference boxing: the defining scope and every closure that
//! captured the cell observe the same storage. `Uninit` is the absence marker
//! a forward-reference cell holds before its defining `let` runs; any
//! operation on it (other than replacing it) is a runtime error.

use ember_compiler::bytecode::CodeUnit;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// `nil`
    Nil,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit decimal with a total order.
    Decimal(OrderedFloat<f64>),
    /// Immutable string.
    Str(Rc<str>),
    /// List.
    List(Rc<Vec<Value>>),
    /// Ordered set.
    Set(Rc<BTreeSet<Value>>),
    /// Ordered dictionary.
    Dict(Rc<BTreeMap<Value, Value>>),
    /// Integer range, possibly unbounded.
    Range(Rc<RangeValue>),
    /// Compiled closure.
    Closure(Rc<Closure>),
    /// Builtin function reference; the VM maps the index to an
    /// implementation.
    Builtin(BuiltinRef),
    /// Memoizing wrapper around another callable.
    Memoized(Rc<Memoized>),
    /// Shared mutable cell (capture indirection).
    Cell(Rc<RefCell<Value>>),
    /// Absence marker inside a forward-reference cell.
    Uninit,
}

/// An integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RangeValue {
    /// Inclusive start.
    pub start: i64,
    /// End bound; `None` for an unbounded range.
    pub end: Option<i64>,
    /// Whether the end bound is inclusive.
    pub inclusive: bool,
}

impl RangeValue {
    /// The exclusive upper bound, if the range is bounded.
    #[must_use]
    pub fn exclusive_end(&self) -> Option<i64> {
        self.end
            .map(|e| if self.inclusive { e.saturating_add(1) } else { e })
    }

    /// Number of elements, if bounded.
    #[must_use]
    pub fn len(&self) -> Option<i64> {
        self.exclusive_end().map(|e| (e - self.start).max(0))
    }

    /// Whether the range contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Iterate the range. Unbounded ranges iterate forever; callers bound
    /// them (`take`) or escape via `break`.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        let end = self.exclusive_end();
        let mut current = self.start;
        std::iter::from_fn(move || {
            if let Some(end) = end {
                if current >= end {
                    return None;
                }
            }
            let value = current;
            current += 1;
            Some(value)
        })
    }
}

/// A compiled closure: a function-table index into its code unit plus the
/// captured values (cells travel as cells).
#[derive(Debug)]
pub struct Closure {
    /// Index into `unit.functions`.
    pub function: u16,
    /// The owning code unit.
    pub unit: Arc<CodeUnit>,
    /// Captured values, ordered per the function's capture template.
    pub captures: Vec<Value>,
}

/// Reference to a builtin function.
#[derive(Debug, Clone)]
pub struct BuiltinRef {
    /// Builtin name, for display and errors.
    pub name: Rc<str>,
    /// Index into the VM's builtin registry.
    pub index: u16,
}

/// A memoizing wrapper: results cached per argument list.
#[derive(Debug)]
pub struct Memoized {
    /// The wrapped callable.
    pub target: Value,
    /// Cache keyed by the full argument list.
    pub cache: RefCell<BTreeMap<Vec<Value>, Value>>,
}

impl Value {
    /// Convenience constructor for decimals.
    #[must_use]
    pub fn decimal(value: f64) -> Value {
        Value::Decimal(OrderedFloat(value))
    }

    /// Convenience constructor for strings.
    #[must_use]
    pub fn str(value: &str) -> Value {
        Value::Str(Rc::from(value))
    }

    /// Convenience constructor for lists.
    #[must_use]
    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(values))
    }

    /// Truthiness: `nil` and `false` are falsy, everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Whether the value may be a set element or dict key: data values only,
    /// never function-like values or cells.
    #[must_use]
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::Nil
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Decimal(_)
            | Value::Str(_)
            | Value::Range(_) => true,
            Value::List(items) => items.iter().all(Value::is_hashable),
            Value::Set(items) => items.iter().all(Value::is_hashable),
            Value::Dict(entries) => entries.values().all(Value::is_hashable),
            Value::Closure(_)
            | Value::Builtin(_)
            | Value::Memoized(_)
            | Value::Cell(_)
            | Value::Uninit => false,
        }
    }

    /// Whether the value can be invoked.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Closure(_) | Value::Builtin(_) | Value::Memoized(_)
        )
    }

    /// The value's type name, for errors and the `type` builtin.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Closure(_) | Value::Memoized(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Cell(_) => "cell",
            Value::Uninit => "uninitialized",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Decimal(_) => 3,
            Value::Str(_) => 4,
            Value::List(_) => 5,
            Value::Set(_) => 6,
            Value::Dict(_) => 7,
            Value::Range(_) => 8,
            Value::Closure(_) => 9,
            Value::Builtin(_) => 10,
            Value::Memoized(_) => 11,
            Value::Cell(_) => 12,
            Value::Uninit => 13,
        }
    }
}

// Total order over all values: data values compare structurally, function
// values by identity. Required for BTree-backed sets, dicts and memoization
// caches; cross-type comparisons order by type rank.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Uninit, Value::Uninit) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Dict(a), Value::Dict(b)) => a.cmp(b),
            (Value::Range(a), Value::Range(b)) => a.cmp(b),
            (Value::Closure(a), Value::Closure(b)) => {
                (Rc::as_ptr(a) as usize).cmp(&(Rc::as_ptr(b) as usize))
            }
            (Value::Builtin(a), Value::Builtin(b)) => a.index.cmp(&b.index),
            (Value::Memoized(a), Value::Memoized(b)) => {
                (Rc::as_ptr(a) as usize).cmp(&(Rc::as_ptr(b) as usize))
            }
            (Value::Cell(a), Value::Cell(b)) => {
                (Rc::as_ptr(a) as usize).cmp(&(Rc::as_ptr(b) as usize))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => fmt_value(other, f),
        }
    }
}

/// Shared formatter: strings are quoted inside collections but bare at top
/// level (`Display` above special-cases them).
fn fmt_value(value: &Value, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match value {
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(n) => write!(f, "{n}"),
        Value::Decimal(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                write!(f, "{:.1}", n.0)
            } else {
                write!(f, "{}", n.0)
            }
        }
        Value::Str(s) => write!(f, "{s:?}"),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(item, f)?;
            }
            write!(f, "]")
        }
        Value::Set(items) => {
            write!(f, "{{")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(item, f)?;
            }
            write!(f, "}}")
        }
        Value::Dict(entries) => {
            write!(f, "#{{")?;
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(k, f)?;
                write!(f, ": ")?;
                fmt_value(v, f)?;
            }
            write!(f, "}}")
        }
        Value::Range(r) => match (r.end, r.inclusive) {
            (Some(end), true) => write!(f, "{}..={}", r.start, end),
            (Some(end), false) => write!(f, "{}..{}", r.start, end),
            (None, _) => write!(f, "{}..", r.start),
        },
        Value::Closure(c) => {
            let name = &c.unit.function(c.function).name;
            write!(f, "<function {name}>")
        }
        Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
        Value::Memoized(_) => write!(f, "<memoized function>"),
        Value::Cell(inner) => fmt_value(&inner.borrow(), f),
        Value::Uninit => write!(f, "<uninitialized>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn test_equality_is_structural_for_data() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Int(4));
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("a")]),
            Value::list(vec![Value::Int(1), Value::str("a")]),
        );
        // Cross-type numerics are distinct values.
        assert_ne!(Value::Int(1), Value::decimal(1.0));
    }

    #[test]
    fn test_hashability() {
        assert!(Value::Int(1).is_hashable());
        assert!(Value::list(vec![Value::Int(1)]).is_hashable());
        assert!(!Value::Uninit.is_hashable());
        let nested_fn = Value::list(vec![Value::Builtin(BuiltinRef {
            name: Rc::from("map"),
            index: 0,
        })]);
        assert!(!nested_fn.is_hashable());
    }

    #[test]
    fn test_range_iteration() {
        let r = RangeValue {
            start: 1,
            end: Some(4),
            inclusive: false,
        };
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(r.len(), Some(3));

        let inclusive = RangeValue {
            start: 1,
            end: Some(3),
            inclusive: true,
        };
        assert_eq!(inclusive.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        let unbounded = RangeValue {
            start: 0,
            end: None,
            inclusive: false,
        };
        assert_eq!(unbounded.iter().take(3).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::decimal(2.0).to_string(), "2.0");
        assert_eq!(Value::str("hi").to_string(), "hi");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("a")]).to_string(),
            "[1, \"a\"]"
        );
    }

    #[test]
    fn test_cell_shares_mutation() {
        let cell = Rc::new(RefCell::new(Value::Int(1)));
        let a = Value::Cell(cell.clone());
        let b = Value::Cell(cell.clone());
        *cell.borrow_mut() = Value::Int(2);
        let Value::Cell(inner) = &a else { unreachable!() };
        assert_eq!(*inner.borrow(), Value::Int(2));
        let Value::Cell(inner) = &b else { unreachable!() };
        assert_eq!(*inner.borrow(), Value::Int(2));
    }
}
