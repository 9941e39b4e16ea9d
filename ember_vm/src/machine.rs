//! Frame execution.
//!
//! Each function invocation gets a fresh frame: a locals array sized by the
//! compiler plus an operand stack. Invocation recurses through ordinary Rust
//! call frames except where tail-call compilation substituted a loop, so a
//! tail-recursive ember function runs in constant stack space.
//!
//! `return` is the frame-return instruction; `break` travels as
//! [`Signal::Break`] through the interpreter result channel — a non-error
//! control signal, unwound without any trace capture, caught by the nearest
//! breakable-iteration builtin. A break escaping to [`Machine::run`] is a
//! resolver-prevented condition and reports an internal invariant violation.

use crate::builtins;
use ember_compiler::bytecode::{CaptureSource, CodeUnit, Constant, FunctionUnit, Instruction};
use ember_core::{EmberError, EmberResult, RuntimeError};
use ember_runtime::value::Memoized;
use ember_runtime::{Closure, RangeValue, Value, ops};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Maximum ordinary call depth before a runtime error. Tail-call-compiled
/// recursion does not consume call depth.
pub const MAX_CALL_DEPTH: usize = 1_000;

/// Non-local outcome of executing instructions.
#[derive(Debug)]
pub enum Signal {
    /// A runtime failure; surfaces to the caller as an error.
    Error(RuntimeError),
    /// The `break` control signal carrying its value; part of normal control
    /// flow, never surfaced to callers.
    Break(Value),
}

impl From<RuntimeError> for Signal {
    fn from(e: RuntimeError) -> Self {
        Signal::Error(e)
    }
}

/// Result channel for the interpreter.
pub type Exec<T> = Result<T, Signal>;

/// The virtual machine: one loaded code unit plus execution state.
pub struct Machine {
    unit: Arc<CodeUnit>,
    sections: FxHashMap<Arc<str>, Value>,
    test_sections: Vec<FxHashMap<Arc<str>, Value>>,
    depth: usize,
}

impl Machine {
    /// Load a compiled unit.
    #[must_use]
    pub fn new(unit: Arc<CodeUnit>) -> Self {
        let test_count = unit.test_count as usize;
        Self {
            unit,
            sections: FxHashMap::default(),
            test_sections: vec![FxHashMap::default(); test_count],
            depth: 0,
        }
    }

    /// Execute the top-level program and return its value.
    pub fn run(&mut self) -> EmberResult<Value> {
        let unit = self.unit.clone();
        match self.exec(&unit, None, &[], Vec::new()) {
            Ok(value) => Ok(value),
            Err(Signal::Error(e)) => Err(EmberError::Runtime(e)),
            Err(Signal::Break(_)) => {
                debug_assert!(false, "break signal escaped its iteration boundary");
                Err(EmberError::Runtime(RuntimeError::new(
                    "internal error: break signal escaped its iteration boundary",
                )))
            }
        }
    }

    /// Invoke a registered section thunk by name. The program must have been
    /// [`run`](Self::run) first so its sections are bound.
    pub fn run_section(&mut self, name: &str) -> EmberResult<Value> {
        let thunk = self.sections.get(name).cloned().ok_or_else(|| {
            EmberError::Runtime(RuntimeError::new(format!("unknown section `{name}`")))
        })?;
        match self.invoke(thunk, Vec::new()) {
            Ok(value) => Ok(value),
            Err(Signal::Error(e)) => Err(EmberError::Runtime(e)),
            Err(Signal::Break(_)) => {
                debug_assert!(false, "break signal escaped its iteration boundary");
                Err(EmberError::Runtime(RuntimeError::new(
                    "internal error: break signal escaped its iteration boundary",
                )))
            }
        }
    }

    /// Invoke a test-group section thunk by group index and name.
    pub fn run_test_section(&mut self, group: u16, name: &str) -> EmberResult<Value> {
        let thunk = self
            .test_sections
            .get(group as usize)
            .and_then(|m| m.get(name))
            .cloned()
            .ok_or_else(|| {
                EmberError::Runtime(RuntimeError::new(format!(
                    "unknown section `{name}` in test {group}"
                )))
            })?;
        match self.invoke(thunk, Vec::new()) {
            Ok(value) => Ok(value),
            Err(Signal::Error(e)) => Err(EmberError::Runtime(e)),
            Err(Signal::Break(_)) => Err(EmberError::Runtime(RuntimeError::new(
                "internal error: break signal escaped its iteration boundary",
            ))),
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Invoke any callable value with the given arguments.
    pub fn invoke(&mut self, callee: Value, args: Vec<Value>) -> Exec<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new("maximum call depth exceeded").into());
        }
        self.depth += 1;
        let result = self.invoke_inner(callee, args);
        self.depth -= 1;
        result
    }

    fn invoke_inner(&mut self, callee: Value, args: Vec<Value>) -> Exec<Value> {
        match callee {
            Value::Closure(closure) => {
                let unit = closure.unit.clone();
                self.exec(&unit, Some(closure.function), &closure.captures, args)
            }
            Value::Builtin(builtin) => builtins::call(self, builtin.index, args),
            Value::Memoized(memo) => self.invoke_memoized(&memo, args),
            Value::Uninit => Err(RuntimeError::new("value used before initialization").into()),
            other => Err(RuntimeError::new(format!(
                "{} is not callable",
                other.type_name()
            ))
            .into()),
        }
    }

    fn invoke_memoized(&mut self, memo: &Memoized, args: Vec<Value>) -> Exec<Value> {
        if let Some(cached) = memo.cache.borrow().get(&args) {
            return Ok(cached.clone());
        }
        let result = self.invoke(memo.target.clone(), args.clone())?;
        memo.cache.borrow_mut().insert(args, result.clone());
        Ok(result)
    }

    // =========================================================================
    // Frame execution
    // =========================================================================

    /// Execute one function frame. `function_index` is `None` for the
    /// top-level program.
    fn exec(
        &mut self,
        unit: &Arc<CodeUnit>,
        function_index: Option<u16>,
        captures: &[Value],
        mut args: Vec<Value>,
    ) -> Exec<Value> {
        let function: &FunctionUnit = match function_index {
            None => &unit.main,
            Some(i) => unit.function(i),
        };

        // Bind arguments to the leading local slots; a rest parameter
        // collects the overflow into a list.
        if !function.accepts(args.len()) {
            return Err(arity_error(function, args.len()).into());
        }
        if function.has_rest {
            let rest = args.split_off(function.arity as usize - 1);
            args.push(Value::list(rest));
        }

        let mut locals = vec![Value::Nil; function.local_count as usize];
        for (slot, arg) in args.into_iter().enumerate() {
            locals[slot] = arg;
        }

        let mut stack: Vec<Value> = Vec::new();
        let code = &function.instructions;
        let mut ip = 0usize;

        macro_rules! pop {
            () => {
                stack.pop().expect("operand stack underflow")
            };
        }

        loop {
            let inst = code[ip];
            ip += 1;

            match inst {
                Instruction::Const(i) => {
                    let value = match &function.constants[i as usize] {
                        Constant::Int(n) => Value::Int(*n),
                        Constant::Decimal(n) => Value::decimal(*n),
                        Constant::Str(s) => Value::Str(Rc::from(&**s)),
                    };
                    stack.push(value);
                }
                Instruction::Nil => stack.push(Value::Nil),
                Instruction::True => stack.push(Value::Bool(true)),
                Instruction::False => stack.push(Value::Bool(false)),
                Instruction::Uninit => stack.push(Value::Uninit),

                Instruction::Pop => {
                    pop!();
                }
                Instruction::Dup => {
                    let top = stack.last().expect("operand stack underflow").clone();
                    stack.push(top);
                }

                Instruction::LoadLocal(slot) => stack.push(locals[slot as usize].clone()),
                Instruction::StoreLocal(slot) => locals[slot as usize] = pop!(),
                Instruction::LoadCapture(i) => stack.push(captures[i as usize].clone()),
                Instruction::LoadGlobal(i) => {
                    let name = &function.names[i as usize];
                    match builtins::lookup(name) {
                        Some(value) => stack.push(value),
                        None => panic!("internal error: unknown global `{name}`"),
                    }
                }

                Instruction::NewCell => {
                    let value = pop!();
                    stack.push(Value::Cell(Rc::new(RefCell::new(value))));
                }
                Instruction::CellGet => {
                    let Value::Cell(cell) = pop!() else {
                        panic!("internal error: cell_get on a non-cell value")
                    };
                    let value = cell.borrow().clone();
                    stack.push(value);
                }
                Instruction::CellSet => {
                    let Value::Cell(cell) = pop!() else {
                        panic!("internal error: cell_set on a non-cell value")
                    };
                    let value = pop!();
                    *cell.borrow_mut() = value.clone();
                    stack.push(value);
                }

                Instruction::Neg => {
                    let v = pop!();
                    stack.push(ops::neg(&v)?);
                }
                Instruction::Not => {
                    let v = pop!();
                    stack.push(ops::not(&v));
                }
                Instruction::Add => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::add(&a, &b)?);
                }
                Instruction::Sub => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::sub(&a, &b)?);
                }
                Instruction::Mul => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::mul(&a, &b)?);
                }
                Instruction::Div => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::div(&a, &b)?);
                }
                Instruction::Rem => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::rem(&a, &b)?);
                }
                Instruction::Eq => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::eq(&a, &b));
                }
                Instruction::Ne => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::not(&ops::eq(&a, &b)));
                }
                Instruction::Lt => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::compare("<", &a, &b)?);
                }
                Instruction::Le => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::compare("<=", &a, &b)?);
                }
                Instruction::Gt => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::compare(">", &a, &b)?);
                }
                Instruction::Ge => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(ops::compare(">=", &a, &b)?);
                }
                Instruction::Index => {
                    let key = pop!();
                    let coll = pop!();
                    stack.push(ops::index(&coll, &key)?);
                }
                Instruction::Slice => {
                    let end = pop!();
                    let start = pop!();
                    let coll = pop!();
                    stack.push(ops::slice(&coll, &start, &end)?);
                }
                Instruction::Len => {
                    let v = pop!();
                    stack.push(ops::len(&v)?);
                }
                Instruction::IsList => {
                    let v = pop!();
                    stack.push(Value::Bool(matches!(v, Value::List(_))));
                }
                Instruction::IsInt => {
                    let v = pop!();
                    stack.push(Value::Bool(matches!(v, Value::Int(_))));
                }

                Instruction::NewList => stack.push(Value::List(Rc::new(Vec::new()))),
                Instruction::ListPush => {
                    let v = pop!();
                    let Value::List(mut items) = pop!() else {
                        panic!("internal error: list_push on a non-list value")
                    };
                    Rc::make_mut(&mut items).push(v);
                    stack.push(Value::List(items));
                }
                Instruction::ListExtend => {
                    let source = pop!();
                    let Value::List(mut items) = pop!() else {
                        panic!("internal error: list_extend on a non-list value")
                    };
                    Rc::make_mut(&mut items).extend(spread_values(&source)?);
                    stack.push(Value::List(items));
                }
                Instruction::NewSet => {
                    stack.push(Value::Set(Rc::new(std::collections::BTreeSet::new())));
                }
                Instruction::SetAdd => {
                    let v = pop!();
                    require_hashable(&v)?;
                    let Value::Set(mut items) = pop!() else {
                        panic!("internal error: set_add on a non-set value")
                    };
                    Rc::make_mut(&mut items).insert(v);
                    stack.push(Value::Set(items));
                }
                Instruction::SetExtend => {
                    let source = pop!();
                    let Value::Set(mut items) = pop!() else {
                        panic!("internal error: set_extend on a non-set value")
                    };
                    for v in spread_values(&source)? {
                        require_hashable(&v)?;
                        Rc::make_mut(&mut items).insert(v);
                    }
                    stack.push(Value::Set(items));
                }
                Instruction::NewDict => {
                    stack.push(Value::Dict(Rc::new(std::collections::BTreeMap::new())));
                }
                Instruction::DictInsert => {
                    let value = pop!();
                    let key = pop!();
                    require_hashable(&key)?;
                    let Value::Dict(mut entries) = pop!() else {
                        panic!("internal error: dict_insert on a non-dict value")
                    };
                    Rc::make_mut(&mut entries).insert(key, value);
                    stack.push(Value::Dict(entries));
                }
                Instruction::DictExtend => {
                    let source = pop!();
                    let Value::Dict(other) = source else {
                        return Err(RuntimeError::new(format!(
                            "cannot merge {} into a dict",
                            source.type_name()
                        ))
                        .into());
                    };
                    let Value::Dict(mut entries) = pop!() else {
                        panic!("internal error: dict_extend on a non-dict value")
                    };
                    for (k, v) in other.iter() {
                        Rc::make_mut(&mut entries).insert(k.clone(), v.clone());
                    }
                    stack.push(Value::Dict(entries));
                }
                Instruction::MakeRange { inclusive } => {
                    let end = pop!();
                    let start = pop!();
                    stack.push(ops::make_range(&start, &end, inclusive)?);
                }

                Instruction::Jump(target) => ip = target as usize,
                Instruction::JumpIfFalse(target) => {
                    if !pop!().is_truthy() {
                        ip = target as usize;
                    }
                }
                Instruction::JumpIfTrue(target) => {
                    if pop!().is_truthy() {
                        ip = target as usize;
                    }
                }

                Instruction::Call(argc) => {
                    let split = stack.len() - argc as usize;
                    let call_args = stack.split_off(split);
                    let callee = pop!();
                    let result = self.invoke(callee, call_args)?;
                    stack.push(result);
                }

                Instruction::MakeClosure(index) => {
                    let template = &unit.function(index).captures;
                    let mut closure_captures = Vec::with_capacity(template.len());
                    for source in template.iter() {
                        closure_captures.push(match source {
                            CaptureSource::Local(slot) => locals[*slot as usize].clone(),
                            CaptureSource::Capture(i) => captures[*i as usize].clone(),
                        });
                    }
                    stack.push(Value::Closure(Rc::new(Closure {
                        function: index,
                        unit: unit.clone(),
                        captures: closure_captures,
                    })));
                }

                Instruction::Return => return Ok(pop!()),
                Instruction::Break => return Err(Signal::Break(pop!())),
                Instruction::NoMatch => {
                    return Err(
                        RuntimeError::new("value did not match any pattern").into()
                    );
                }

                Instruction::BindSection(index) => {
                    let thunk = pop!();
                    let def = &unit.sections[index as usize];
                    match def.test_group {
                        None => {
                            self.sections.insert(def.name.clone(), thunk);
                        }
                        Some(group) => {
                            self.test_sections[group as usize]
                                .insert(def.name.clone(), thunk);
                        }
                    }
                }
            }
        }
    }
}

fn arity_error(function: &FunctionUnit, got: usize) -> RuntimeError {
    let expected = if function.has_rest {
        format!("at least {}", function.arity.saturating_sub(1))
    } else {
        function.arity.to_string()
    };
    RuntimeError::new(format!(
        "{} expects {expected} arguments, got {got}",
        function.name
    ))
}

fn require_hashable(value: &Value) -> Result<(), RuntimeError> {
    if value.is_hashable() {
        Ok(())
    } else {
        Err(RuntimeError::new(format!(
            "unhashable type: {}",
            value.type_name()
        )))
    }
}

/// Materialise a spread source. Unbounded ranges cannot be spread.
fn spread_values(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) => Ok((**items).clone()),
        Value::Set(items) => Ok(items.iter().cloned().collect()),
        Value::Range(r) => {
            if r.end.is_none() {
                return Err(RuntimeError::new("cannot spread an unbounded range"));
            }
            Ok(r.iter().map(Value::Int).collect())
        }
        other => Err(RuntimeError::new(format!(
            "cannot spread {}",
            other.type_name()
        ))),
    }
}

/// Owning iterator over any iterable value, used by the iteration builtins.
pub(crate) enum ValueIter {
    List(Rc<Vec<Value>>, usize),
    Items(std::vec::IntoIter<Value>),
    Range(RangeValue, i64),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::List(items, i) => {
                let value = items.get(*i)?.clone();
                *i += 1;
                Some(value)
            }
            ValueIter::Items(iter) => iter.next(),
            ValueIter::Range(range, current) => {
                if let Some(end) = range.exclusive_end() {
                    if *current >= end {
                        return None;
                    }
                }
                let value = Value::Int(*current);
                *current += 1;
                Some(value)
            }
        }
    }
}

/// Iterate a collection: lists and ranges in order, sets in their order,
/// dicts as `[key, value]` pairs, strings as one-character strings.
pub(crate) fn value_iter(value: &Value) -> Result<ValueIter, RuntimeError> {
    match value {
        Value::List(items) => Ok(ValueIter::List(items.clone(), 0)),
        Value::Set(items) => Ok(ValueIter::Items(
            items.iter().cloned().collect::<Vec<_>>().into_iter(),
        )),
        Value::Dict(entries) => Ok(ValueIter::Items(
            entries
                .iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()]))
                .collect::<Vec<_>>()
                .into_iter(),
        )),
        Value::Range(r) => Ok(ValueIter::Range(**r, r.start)),
        Value::Str(s) => Ok(ValueIter::Items(
            s.chars()
                .map(|c| Value::Str(Rc::from(c.to_string().as_str())))
                .collect::<Vec<_>>()
                .into_iter(),
        )),
        other => Err(RuntimeError::new(format!(
            "{} is not iterable",
            other.type_name()
        ))),
    }
}
