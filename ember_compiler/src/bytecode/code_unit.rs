//! Compiled code units.
//!
//! A [`CodeUnit`] is the self-contained, in-memory executable artifact for one
//! program: the top-level `FunctionUnit` plus one `FunctionUnit` per function
//! literal, addressed by index and carrying synthetic, collision-free names.
//! Units are immutable once built and shared via `Arc`; one compile produces
//! one unit consumed independently per execution.

use super::instruction::Instruction;
use ember_core::Span;
use std::sync::Arc;

/// A constant-pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer constant.
    Int(i64),
    /// Decimal constant.
    Decimal(f64),
    /// String constant.
    Str(Arc<str>),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Decimal(n) => write!(f, "{n}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Where a closure's capture slot is filled from when `MakeClosure` runs in
/// the enclosing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Copy the enclosing frame's local slot.
    Local(u16),
    /// Copy the enclosing closure's capture slot (transitive capture).
    Capture(u16),
}

/// A compiled function: the top-level program or one function literal.
#[derive(Debug, Clone)]
pub struct FunctionUnit {
    /// Display name: `<main>`, a binding name, or a synthetic `<lambda:N>`.
    pub name: Arc<str>,
    /// Number of declared parameters (a rest parameter counts as one).
    pub arity: u8,
    /// Whether the final parameter collects remaining arguments into a list.
    pub has_rest: bool,
    /// Number of local slots the frame needs (parameters included).
    pub local_count: u16,
    /// Instruction stream.
    pub instructions: Box<[Instruction]>,
    /// Constant pool.
    pub constants: Box<[Constant]>,
    /// Builtin names referenced by `LoadGlobal`.
    pub names: Box<[Arc<str>]>,
    /// Capture template, resolved against the enclosing frame at
    /// `MakeClosure` time. Cell-ness is a property of the captured value
    /// itself (a cell travels as a cell).
    pub captures: Box<[CaptureSource]>,
    /// Span of the source construct this unit was compiled from.
    pub span: Span,
}

impl FunctionUnit {
    /// Whether an argument count is acceptable for this function.
    #[must_use]
    pub fn accepts(&self, argc: usize) -> bool {
        if self.has_rest {
            argc + 1 >= self.arity as usize
        } else {
            argc == self.arity as usize
        }
    }
}

/// A section registered by the top-level program.
#[derive(Debug, Clone)]
pub struct SectionDef {
    /// Section name.
    pub name: Arc<str>,
    /// `None` for a top-level section; `Some(group)` for a test-block entry.
    pub test_group: Option<u16>,
}

/// The complete compiled artifact for one program.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    /// Top-level program code.
    pub main: FunctionUnit,
    /// Function literals, indexed by `MakeClosure`.
    pub functions: Box<[FunctionUnit]>,
    /// Sections, indexed by `BindSection`.
    pub sections: Box<[SectionDef]>,
    /// Number of test groups.
    pub test_count: u16,
}

impl CodeUnit {
    /// Look up a function by `MakeClosure` index.
    ///
    /// Indexes are compiler-generated; an out-of-range index is an internal
    /// invariant violation, not a user error.
    #[must_use]
    pub fn function(&self, index: u16) -> &FunctionUnit {
        &self.functions[index as usize]
    }
}

/// Render a whole code unit as text, main first. Deterministic; the
/// determinism test compares two compiles through this.
#[must_use]
pub fn disassemble(unit: &CodeUnit) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    disassemble_function(&mut out, &unit.main);
    for function in unit.functions.iter() {
        out.push('\n');
        disassemble_function(&mut out, function);
    }
    if !unit.sections.is_empty() {
        out.push_str("\nsections:\n");
        for (i, section) in unit.sections.iter().enumerate() {
            match section.test_group {
                None => writeln!(out, "  {i:4}: {}", section.name).unwrap(),
                Some(group) => {
                    writeln!(out, "  {i:4}: {} (test {group})", section.name).unwrap();
                }
            }
        }
    }
    out
}

fn disassemble_function(out: &mut String, function: &FunctionUnit) {
    use std::fmt::Write;

    writeln!(
        out,
        "function {} (arity {}{}, locals {}, captures {})",
        function.name,
        function.arity,
        if function.has_rest { "+rest" } else { "" },
        function.local_count,
        function.captures.len(),
    )
    .unwrap();
    if !function.constants.is_empty() {
        writeln!(out, "  constants:").unwrap();
        for (i, c) in function.constants.iter().enumerate() {
            writeln!(out, "    {i:4}: {c}").unwrap();
        }
    }
    for (i, inst) in function.instructions.iter().enumerate() {
        writeln!(out, "  {i:4}: {inst}").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_with_arity(arity: u8, has_rest: bool) -> FunctionUnit {
        FunctionUnit {
            name: Arc::from("<test>"),
            arity,
            has_rest,
            local_count: arity as u16,
            instructions: Box::new([]),
            constants: Box::new([]),
            names: Box::new([]),
            captures: Box::new([]),
            span: Span::default(),
        }
    }

    #[test]
    fn test_accepts_exact_arity() {
        let f = unit_with_arity(2, false);
        assert!(f.accepts(2));
        assert!(!f.accepts(1));
        assert!(!f.accepts(3));
    }

    #[test]
    fn test_accepts_rest_arity() {
        let f = unit_with_arity(2, true);
        assert!(f.accepts(1)); // rest gets []
        assert!(f.accepts(4));
        assert!(!f.accepts(0));
    }
}
