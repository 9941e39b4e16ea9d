//! The ember virtual machine.
//!
//! Loads a compiled [`ember_compiler::bytecode::CodeUnit`] from memory and
//! executes it: a locals array plus operand stack per frame, dispatching
//! every value operation through the `ember_runtime` contract. Compile once,
//! execute many times, never touch disk.

pub mod builtins;
pub mod machine;

pub use machine::{Machine, Signal};

use ember_core::EmberResult;
use ember_runtime::Value;

/// Compile and run source text, returning the program's final value.
pub fn eval(source: &str) -> EmberResult<Value> {
    let unit = ember_compiler::compile_source(source)?;
    Machine::new(unit).run()
}
