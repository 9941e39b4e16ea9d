//! Function builder: instruction emission with labels and constant dedup.

use super::code_unit::{CaptureSource, Constant, FunctionUnit};
use super::instruction::Instruction;
use ember_core::Span;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A jump target, patched when the builder finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// Key type for constant deduplication. Decimals compare by bit pattern so
/// `0.0` and `-0.0` stay distinct constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Int(i64),
    Decimal(u64),
    Str(Arc<str>),
}

/// Builder for one [`FunctionUnit`].
pub struct FunctionBuilder {
    name: Arc<str>,
    arity: u8,
    has_rest: bool,
    span: Span,

    instructions: Vec<Instruction>,

    constants: Vec<Constant>,
    constant_map: FxHashMap<ConstantKey, u16>,

    names: Vec<Arc<str>>,
    name_map: FxHashMap<Arc<str>, u16>,

    captures: Vec<CaptureSource>,

    next_local: u16,

    /// Bound position per label; `u32::MAX` until bound.
    labels: Vec<u32>,
    /// Instruction indexes whose jump target is a label still to patch.
    forward_refs: Vec<(usize, Label)>,
}

impl FunctionBuilder {
    /// Create a builder for a function with the given signature.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, arity: u8, has_rest: bool, span: Span) -> Self {
        Self {
            name: name.into(),
            arity,
            has_rest,
            span,
            instructions: Vec::new(),
            constants: Vec::new(),
            constant_map: FxHashMap::default(),
            names: Vec::new(),
            name_map: FxHashMap::default(),
            captures: Vec::new(),
            next_local: 0,
            labels: Vec::new(),
            forward_refs: Vec::new(),
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Append an instruction.
    #[inline]
    pub fn emit(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    /// Current instruction index.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.instructions.len() as u32
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Intern an integer constant.
    pub fn add_int(&mut self, value: i64) -> u16 {
        self.add_constant(ConstantKey::Int(value), Constant::Int(value))
    }

    /// Intern a decimal constant.
    pub fn add_decimal(&mut self, value: f64) -> u16 {
        self.add_constant(ConstantKey::Decimal(value.to_bits()), Constant::Decimal(value))
    }

    /// Intern a string constant.
    pub fn add_str(&mut self, value: Arc<str>) -> u16 {
        self.add_constant(ConstantKey::Str(value.clone()), Constant::Str(value))
    }

    fn add_constant(&mut self, key: ConstantKey, value: Constant) -> u16 {
        if let Some(&idx) = self.constant_map.get(&key) {
            return idx;
        }
        let idx = self.constants.len() as u16;
        self.constants.push(value);
        self.constant_map.insert(key, idx);
        idx
    }

    /// Intern a builtin name for `LoadGlobal`.
    pub fn add_name(&mut self, name: Arc<str>) -> u16 {
        if let Some(&idx) = self.name_map.get(&name) {
            return idx;
        }
        let idx = self.names.len() as u16;
        self.name_map.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    /// Append a capture-template entry; returns its capture slot.
    pub fn add_capture(&mut self, source: CaptureSource) -> u16 {
        let idx = self.captures.len() as u16;
        self.captures.push(source);
        idx
    }

    // =========================================================================
    // Locals
    // =========================================================================

    /// Allocate a fresh local slot. Slots are never reused; shadowed bindings
    /// each get their own slot so closures keep the value they captured.
    pub fn alloc_local(&mut self) -> u16 {
        let slot = self.next_local;
        self.next_local = self
            .next_local
            .checked_add(1)
            .expect("local slot overflow");
        slot
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create an unbound label.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(u32::MAX);
        label
    }

    /// Bind a label to the current position.
    pub fn bind_label(&mut self, label: Label) {
        self.labels[label.0 as usize] = self.offset();
    }

    /// Emit an unconditional jump to `label`.
    pub fn emit_jump(&mut self, label: Label) {
        self.forward_refs.push((self.instructions.len(), label));
        self.emit(Instruction::Jump(u32::MAX));
    }

    /// Emit a pop-and-jump-if-falsy to `label`.
    pub fn emit_jump_if_false(&mut self, label: Label) {
        self.forward_refs.push((self.instructions.len(), label));
        self.emit(Instruction::JumpIfFalse(u32::MAX));
    }

    /// Emit a pop-and-jump-if-truthy to `label`.
    pub fn emit_jump_if_true(&mut self, label: Label) {
        self.forward_refs.push((self.instructions.len(), label));
        self.emit(Instruction::JumpIfTrue(u32::MAX));
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Patch all jumps and produce the finished unit.
    #[must_use]
    pub fn finish(mut self) -> FunctionUnit {
        for (index, label) in self.forward_refs.drain(..) {
            let target = self.labels[label.0 as usize];
            debug_assert_ne!(target, u32::MAX, "unbound label {label:?}");
            self.instructions[index] = match self.instructions[index] {
                Instruction::Jump(_) => Instruction::Jump(target),
                Instruction::JumpIfFalse(_) => Instruction::JumpIfFalse(target),
                Instruction::JumpIfTrue(_) => Instruction::JumpIfTrue(target),
                other => panic!("forward ref on non-jump instruction {other:?}"),
            };
        }

        FunctionUnit {
            name: self.name,
            arity: self.arity,
            has_rest: self.has_rest,
            local_count: self.next_local,
            instructions: self.instructions.into_boxed_slice(),
            constants: self.constants.into_boxed_slice(),
            names: self.names.into_boxed_slice(),
            captures: self.captures.into_boxed_slice(),
            span: self.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_deduplication() {
        let mut b = FunctionBuilder::new("t", 0, false, Span::default());
        let a = b.add_int(42);
        let c = b.add_int(42);
        let d = b.add_int(7);
        assert_eq!(a, c);
        assert_ne!(a, d);

        let s1 = b.add_str(Arc::from("x"));
        let s2 = b.add_str(Arc::from("x"));
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_label_patching() {
        let mut b = FunctionBuilder::new("t", 0, false, Span::default());
        let end = b.create_label();
        b.emit(Instruction::True);
        b.emit_jump_if_false(end);
        b.emit(Instruction::Nil);
        b.bind_label(end);
        b.emit(Instruction::Return);

        let unit = b.finish();
        assert_eq!(unit.instructions[1], Instruction::JumpIfFalse(3));
    }

    #[test]
    fn test_local_slots_are_unique() {
        let mut b = FunctionBuilder::new("t", 0, false, Span::default());
        assert_eq!(b.alloc_local(), 0);
        assert_eq!(b.alloc_local(), 1);
        assert_eq!(b.alloc_local(), 2);
        let unit = b.finish();
        assert_eq!(unit.local_count, 3);
    }
}
