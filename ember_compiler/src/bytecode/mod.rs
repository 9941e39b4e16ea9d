//! Stack-discipline bytecode.
//!
//! The execution model is a locals array plus an operand stack per frame:
//! every compiled expression leaves exactly one value on the operand stack.
//! Key components:
//!
//! - [`Instruction`] — enum-with-payload instruction set
//! - [`FunctionUnit`] / [`CodeUnit`] — immutable compiled artifacts
//! - [`FunctionBuilder`] — emission API with labels and constant dedup

mod builder;
mod code_unit;
mod instruction;

pub use builder::{FunctionBuilder, Label};
pub use code_unit::{CaptureSource, CodeUnit, Constant, FunctionUnit, SectionDef, disassemble};
pub use instruction::Instruction;
