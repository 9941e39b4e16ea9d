//! Bytecode generation.
//!
//! A single recursive walk over the desugared, resolved AST. Every compiled
//! expression leaves exactly one value on the operand stack. Beyond plain
//! emission the generator owns four responsibilities:
//!
//! - **Capture compilation.** Free variables of a function literal become
//!   capture slots, added lazily on first reference and resolved transitively
//!   through enclosing function contexts. A capture carries a shared cell
//!   exactly when its source binding is cell-allocated.
//! - **Forward-reference boxing.** Top-level section names and
//!   function-valued bindings are pre-allocated as cells holding the absence
//!   marker, so closures created before the defining `let` runs capture the
//!   cell and observe the final value.
//! - **Cell allocation for mutable captures.** A `let mut` binding whose name
//!   is captured by any closure in its block lives in a cell; reads and
//!   writes on both sides go through the indirection, so mutation through one
//!   closure is visible through all.
//! - **Tail-call compilation.** When the analyzer produced a plan, argument
//!   slots are written once at entry (by the frame) and every planned site
//!   re-evaluates its arguments, stores them back into the same slots and
//!   jumps to the body start.
//!
//! Generation cannot fail on resolver-validated input; an unexpected node in
//! any branch is an internal invariant violation and panics.

use crate::analysis;
use crate::bytecode::{
    CaptureSource, CodeUnit, FunctionBuilder, FunctionUnit, Instruction, Label, SectionDef,
};
use crate::scope::is_function_binding;
use crate::tailcall;
use ember_core::Span;
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, InfixOp, Param, ParamKind, Pattern, PatternKind, PrefixOp,
    Program, Stmt, StmtKind,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Generate a code unit from a desugared, resolved program.
#[must_use]
pub fn generate(program: &Program) -> CodeUnit {
    let mut generator = CodeGenerator::new(program.span);
    generator.hoist_top_level(&program.stmts);
    generator.compile_stmts(&program.stmts, false);
    generator.emit(Instruction::Return);

    let main_ctx = generator.ctxs.pop().expect("main context missing");
    CodeUnit {
        main: main_ctx.builder.finish(),
        functions: generator.functions.into_boxed_slice(),
        sections: generator.sections.into_boxed_slice(),
        test_count: generator.test_count,
    }
}

/// Where a name resolves to at generation time.
#[derive(Debug, Clone, Copy)]
enum NameRef {
    Local { slot: u16, cell: bool },
    Capture { index: u16, cell: bool },
    Global,
}

/// A name declared in the current function's scopes.
#[derive(Debug, Clone, Copy)]
struct LocalBinding {
    slot: u16,
    is_cell: bool,
    hoisted: bool,
}

/// One capture slot of the function being compiled.
struct CaptureInfo {
    name: Arc<str>,
    is_cell: bool,
}

/// Tail-call rewrite state for the function being compiled.
struct TcoState {
    self_name: Arc<str>,
    param_slots: Vec<u16>,
    loop_start: Label,
}

/// Per-function compilation context.
struct FnCtx {
    builder: FunctionBuilder,
    scopes: Vec<FxHashMap<Arc<str>, LocalBinding>>,
    captures: Vec<CaptureInfo>,
    tco: Option<TcoState>,
}

impl FnCtx {
    fn new(builder: FunctionBuilder) -> Self {
        Self {
            builder,
            scopes: vec![FxHashMap::default()],
            captures: Vec::new(),
            tco: None,
        }
    }
}

/// How pattern bindings are allocated.
struct BindPolicy<'a> {
    /// Mutable-capture set for `let mut` destructures; `None` binds plain
    /// immutable values (match arms, `if let`).
    cell_muts: Option<&'a FxHashSet<Arc<str>>>,
}

impl BindPolicy<'_> {
    fn is_cell(&self, name: &str) -> bool {
        self.cell_muts.is_some_and(|set| set.contains(name))
    }
}

struct CodeGenerator {
    ctxs: Vec<FnCtx>,
    functions: Vec<FunctionUnit>,
    sections: Vec<SectionDef>,
    test_count: u16,
    lambda_counter: u32,
}

impl CodeGenerator {
    fn new(span: Span) -> Self {
        Self {
            ctxs: vec![FnCtx::new(FunctionBuilder::new("<main>", 0, false, span))],
            functions: Vec::new(),
            sections: Vec::new(),
            test_count: 0,
            lambda_counter: 0,
        }
    }

    // =========================================================================
    // Context helpers
    // =========================================================================

    fn ctx(&mut self) -> &mut FnCtx {
        self.ctxs.last_mut().expect("function context underflow")
    }

    fn builder(&mut self) -> &mut FunctionBuilder {
        &mut self.ctx().builder
    }

    #[inline]
    fn emit(&mut self, inst: Instruction) {
        self.builder().emit(inst);
    }

    fn declare(&mut self, name: Arc<str>, binding: LocalBinding) {
        self.ctx()
            .scopes
            .last_mut()
            .expect("scope underflow")
            .insert(name, binding);
    }

    fn find_local(ctx: &FnCtx, name: &str) -> Option<LocalBinding> {
        ctx.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn resolve_name(&mut self, name: &Arc<str>) -> NameRef {
        let top = self.ctxs.len() - 1;
        if let Some(binding) = Self::find_local(&self.ctxs[top], name) {
            return NameRef::Local {
                slot: binding.slot,
                cell: binding.is_cell,
            };
        }
        match self.resolve_capture(top, name) {
            Some((index, cell)) => NameRef::Capture { index, cell },
            None => NameRef::Global,
        }
    }

    /// Ensure `name` is a capture of `ctxs[ctx_idx]`, adding transitive
    /// capture slots through every intermediate function.
    fn resolve_capture(&mut self, ctx_idx: usize, name: &Arc<str>) -> Option<(u16, bool)> {
        if let Some(pos) = self.ctxs[ctx_idx]
            .captures
            .iter()
            .position(|c| c.name == *name)
        {
            let cell = self.ctxs[ctx_idx].captures[pos].is_cell;
            return Some((pos as u16, cell));
        }
        if ctx_idx == 0 {
            return None;
        }

        let parent = ctx_idx - 1;
        if let Some(binding) = Self::find_local(&self.ctxs[parent], name) {
            let index = self.ctxs[ctx_idx]
                .builder
                .add_capture(CaptureSource::Local(binding.slot));
            self.ctxs[ctx_idx].captures.push(CaptureInfo {
                name: name.clone(),
                is_cell: binding.is_cell,
            });
            return Some((index, binding.is_cell));
        }
        if let Some((parent_index, cell)) = self.resolve_capture(parent, name) {
            let index = self.ctxs[ctx_idx]
                .builder
                .add_capture(CaptureSource::Capture(parent_index));
            self.ctxs[ctx_idx].captures.push(CaptureInfo {
                name: name.clone(),
                is_cell: cell,
            });
            return Some((index, cell));
        }
        None
    }

    fn emit_load(&mut self, name: &Arc<str>) {
        match self.resolve_name(name) {
            NameRef::Local { slot, cell } => {
                self.emit(Instruction::LoadLocal(slot));
                if cell {
                    self.emit(Instruction::CellGet);
                }
            }
            NameRef::Capture { index, cell } => {
                self.emit(Instruction::LoadCapture(index));
                if cell {
                    self.emit(Instruction::CellGet);
                }
            }
            NameRef::Global => {
                let idx = self.builder().add_name(name.clone());
                self.emit(Instruction::LoadGlobal(idx));
            }
        }
    }

    // =========================================================================
    // Top-level hoisting (forward-reference boxing)
    // =========================================================================

    /// Allocate a cell local, initialized to the absence marker, for every
    /// top-level section name and function-valued binding.
    fn hoist_top_level(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            let name = match &stmt.kind {
                StmtKind::Section { name, .. } => Some(name),
                StmtKind::Let { pattern, value, .. } => match &pattern.kind {
                    PatternKind::Ident(name) if is_function_binding(value) => Some(name),
                    _ => None,
                },
                _ => None,
            };
            let Some(name) = name else { continue };
            if Self::find_local(self.ctx(), name).is_some() {
                continue; // second binding of the same name reuses the cell
            }
            let slot = self.builder().alloc_local();
            self.emit(Instruction::Uninit);
            self.emit(Instruction::NewCell);
            self.emit(Instruction::StoreLocal(slot));
            self.declare(
                name.clone(),
                LocalBinding {
                    slot,
                    is_cell: true,
                    hoisted: true,
                },
            );
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Compile a statement list as a block body: every statement leaves one
    /// value, all but the last are popped, an empty list yields nil.
    fn compile_stmts(&mut self, stmts: &[Stmt], tail: bool) {
        if stmts.is_empty() {
            self.emit(Instruction::Nil);
            return;
        }
        let cell_muts = analysis::closure_captured_names(stmts);
        let last = stmts.len() - 1;
        for (i, stmt) in stmts.iter().enumerate() {
            self.compile_stmt(stmt, tail && i == last, &cell_muts);
            if i != last {
                self.emit(Instruction::Pop);
            }
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt, tail: bool, cell_muts: &FxHashSet<Arc<str>>) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.compile_expr(e, tail),

            StmtKind::Let {
                mutable,
                pattern,
                value,
            } => self.compile_let(*mutable, pattern, value, cell_muts),

            StmtKind::Return(value) => {
                // The returned value is in tail position: it flows straight
                // to the caller.
                match value {
                    Some(v) => self.compile_expr(v, true),
                    None => self.emit(Instruction::Nil),
                }
                self.emit(Instruction::Return);
                self.emit(Instruction::Nil); // dead; keeps stack accounting uniform
            }

            StmtKind::Break(value) => {
                match value {
                    Some(v) => self.compile_expr(v, false),
                    None => self.emit(Instruction::Nil),
                }
                self.emit(Instruction::Break);
                self.emit(Instruction::Nil); // dead
            }

            StmtKind::Section { name, value } => {
                self.compile_section(name, value, stmt.span);
                self.emit(Instruction::Nil);
            }

            StmtKind::TestBlock { entries } => {
                let group = self.test_count;
                self.test_count += 1;
                for entry in entries {
                    let idx = self.sections.len() as u16;
                    self.sections.push(SectionDef {
                        name: entry.name.clone(),
                        test_group: Some(group),
                    });
                    self.compile_thunk(entry.name.clone(), &entry.value, entry.span);
                    self.emit(Instruction::BindSection(idx));
                }
                self.emit(Instruction::Nil);
            }
        }
    }

    fn compile_let(
        &mut self,
        mutable: bool,
        pattern: &Pattern,
        value: &Expr,
        cell_muts: &FxHashSet<Arc<str>>,
    ) {
        if let PatternKind::Ident(name) = &pattern.kind {
            // Initialization of a phase-1 hoisted cell.
            let hoisted = self
                .ctx()
                .scopes
                .last()
                .and_then(|s| s.get(name))
                .filter(|b| b.hoisted)
                .copied();
            if let Some(binding) = hoisted {
                self.compile_let_value(Some(name), value);
                self.emit(Instruction::LoadLocal(binding.slot));
                self.emit(Instruction::CellSet);
                self.emit(Instruction::Pop);
                self.emit(Instruction::Nil);
                return;
            }

            // A binding whose own value references its name needs the cell
            // to exist before the value is evaluated.
            if is_function_binding(value) && analysis::references_name(name, value) {
                let slot = self.builder().alloc_local();
                self.emit(Instruction::Uninit);
                self.emit(Instruction::NewCell);
                self.emit(Instruction::StoreLocal(slot));
                self.declare(
                    name.clone(),
                    LocalBinding {
                        slot,
                        is_cell: true,
                        hoisted: false,
                    },
                );
                self.compile_let_value(Some(name), value);
                self.emit(Instruction::LoadLocal(slot));
                self.emit(Instruction::CellSet);
                self.emit(Instruction::Pop);
                self.emit(Instruction::Nil);
                return;
            }

            // Ordinary binding: value first (so references hit an outer
            // shadowed name), then declare.
            self.compile_let_value(Some(name), value);
            let needs_cell = mutable && cell_muts.contains(name);
            if needs_cell {
                self.emit(Instruction::NewCell);
            }
            let slot = self.builder().alloc_local();
            self.emit(Instruction::StoreLocal(slot));
            self.declare(
                name.clone(),
                LocalBinding {
                    slot,
                    is_cell: needs_cell,
                    hoisted: false,
                },
            );
            self.emit(Instruction::Nil);
            return;
        }

        // Destructuring let: evaluate, test, bind; no arm to fall through to.
        self.compile_expr(value, false);
        let subject = self.builder().alloc_local();
        self.emit(Instruction::StoreLocal(subject));
        let fail = self.builder().create_label();
        let ok = self.builder().create_label();
        let policy = BindPolicy {
            cell_muts: mutable.then_some(cell_muts),
        };
        self.emit_pattern(pattern, subject, fail, &policy);
        self.builder().emit_jump(ok);
        self.builder().bind_label(fail);
        self.emit(Instruction::NoMatch);
        self.builder().bind_label(ok);
        self.emit(Instruction::Nil);
    }

    /// Compile a `let` value, routing direct function literals through
    /// [`Self::compile_function`] so the binding name drives naming and
    /// tail-call analysis.
    fn compile_let_value(&mut self, bind_name: Option<&Arc<str>>, value: &Expr) {
        if let ExprKind::Function { params, body } = &value.kind {
            let display = bind_name.cloned().unwrap_or_else(|| self.lambda_name());
            self.compile_function(display, bind_name, params, body, value.span);
        } else {
            self.compile_expr(value, false);
        }
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn compile_section(&mut self, name: &Arc<str>, value: &Expr, span: Span) {
        let idx = self.sections.len() as u16;
        self.sections.push(SectionDef {
            name: name.clone(),
            test_group: None,
        });
        self.compile_thunk(name.clone(), value, span);

        // Sections are hoisted bindings: store the thunk into the cell, then
        // register it.
        match self.resolve_name(name) {
            NameRef::Local { slot, cell: true } => {
                self.emit(Instruction::LoadLocal(slot));
                self.emit(Instruction::CellSet);
            }
            other => panic!("internal error: section `{name}` resolved to {other:?}"),
        }
        self.emit(Instruction::BindSection(idx));
    }

    /// Compile a zero-parameter thunk for a section or test entry and leave
    /// the closure on the stack.
    fn compile_thunk(&mut self, display: Arc<str>, body: &Expr, span: Span) {
        self.compile_function(display, None, &[], body, span);
    }

    // =========================================================================
    // Function literals
    // =========================================================================

    fn lambda_name(&mut self) -> Arc<str> {
        let n = self.lambda_counter;
        self.lambda_counter += 1;
        Arc::from(format!("<lambda:{n}>").as_str())
    }

    fn compile_function(
        &mut self,
        display: Arc<str>,
        tco_name: Option<&Arc<str>>,
        params: &[Param],
        body: &Expr,
        span: Span,
    ) {
        let arity = params.len() as u8;
        let has_rest = params
            .last()
            .is_some_and(|p| matches!(p.kind, ParamKind::Rest(_)));

        let mut builder = FunctionBuilder::new(display, arity, has_rest, span);
        let mut scope = FxHashMap::default();
        let mut param_slots = Vec::with_capacity(params.len());
        for param in params {
            let slot = builder.alloc_local();
            param_slots.push(slot);
            match &param.kind {
                ParamKind::Named(name) | ParamKind::Rest(name) => {
                    scope.insert(
                        name.clone(),
                        LocalBinding {
                            slot,
                            is_cell: false,
                            hoisted: false,
                        },
                    );
                }
                ParamKind::Placeholder => {}
                ParamKind::Pattern(_) => {
                    panic!("internal error: pattern parameter survived desugaring")
                }
            }
        }

        let plan = tco_name.and_then(|name| tailcall::analyze(name, params, body));

        let mut ctx = FnCtx::new(builder);
        ctx.scopes[0] = scope;
        self.ctxs.push(ctx);

        if let Some(info) = plan {
            let loop_start = self.builder().create_label();
            self.builder().bind_label(loop_start);
            self.ctx().tco = Some(TcoState {
                self_name: info.name,
                param_slots,
                loop_start,
            });
        }

        self.compile_expr(body, true);
        self.emit(Instruction::Return);

        let ctx = self.ctxs.pop().expect("function context underflow");
        let unit = ctx.builder.finish();
        let index = self.functions.len() as u16;
        self.functions.push(unit);
        self.emit(Instruction::MakeClosure(index));
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr, tail: bool) {
        match &expr.kind {
            ExprKind::Int(n) => {
                let idx = self.builder().add_int(*n);
                self.emit(Instruction::Const(idx));
            }
            ExprKind::Decimal(n) => {
                let idx = self.builder().add_decimal(*n);
                self.emit(Instruction::Const(idx));
            }
            ExprKind::Str(s) => {
                let idx = self.builder().add_str(s.clone());
                self.emit(Instruction::Const(idx));
            }
            ExprKind::Bool(true) => self.emit(Instruction::True),
            ExprKind::Bool(false) => self.emit(Instruction::False),
            ExprKind::Nil => self.emit(Instruction::Nil),

            ExprKind::Ident(name) => self.emit_load(name),

            ExprKind::Placeholder | ExprKind::OperatorRef(_) => {
                panic!("internal error: sugar node reached codegen: {expr:?}")
            }

            ExprKind::Prefix { op, operand } => {
                self.compile_expr(operand, false);
                match op {
                    PrefixOp::Neg => self.emit(Instruction::Neg),
                    PrefixOp::Not => self.emit(Instruction::Not),
                }
            }

            ExprKind::Infix { op, left, right } => self.compile_infix(*op, left, right),

            ExprKind::Assign { name, value } => {
                self.compile_expr(value, false);
                match self.resolve_name(name) {
                    NameRef::Local { slot, cell: false } => {
                        self.emit(Instruction::Dup);
                        self.emit(Instruction::StoreLocal(slot));
                    }
                    NameRef::Local { slot, cell: true } => {
                        self.emit(Instruction::LoadLocal(slot));
                        self.emit(Instruction::CellSet);
                    }
                    NameRef::Capture { index, cell: true } => {
                        self.emit(Instruction::LoadCapture(index));
                        self.emit(Instruction::CellSet);
                    }
                    NameRef::Capture { cell: false, .. } => {
                        panic!("internal error: assignment to a by-value capture `{name}`")
                    }
                    NameRef::Global => {
                        panic!("internal error: assignment to unresolved name `{name}`")
                    }
                }
            }

            ExprKind::Call { callee, args } => {
                if tail && self.try_compile_tail_call(callee, args) {
                    return;
                }
                self.compile_expr(callee, false);
                for arg in args {
                    self.compile_expr(arg, false);
                }
                self.emit(Instruction::Call(args.len() as u8));
            }

            ExprKind::Index { collection, index } => {
                self.compile_expr(collection, false);
                self.compile_expr(index, false);
                self.emit(Instruction::Index);
            }

            ExprKind::Range {
                start,
                end,
                inclusive,
            } => {
                self.compile_expr(start, false);
                match end {
                    Some(e) => self.compile_expr(e, false),
                    None => self.emit(Instruction::Nil),
                }
                self.emit(Instruction::MakeRange {
                    inclusive: *inclusive,
                });
            }

            ExprKind::List(items) => {
                self.emit(Instruction::NewList);
                for item in items {
                    if let ExprKind::Spread(inner) = &item.kind {
                        self.compile_expr(inner, false);
                        self.emit(Instruction::ListExtend);
                    } else {
                        self.compile_expr(item, false);
                        self.emit(Instruction::ListPush);
                    }
                }
            }

            ExprKind::Set(items) => {
                self.emit(Instruction::NewSet);
                for item in items {
                    if let ExprKind::Spread(inner) = &item.kind {
                        self.compile_expr(inner, false);
                        self.emit(Instruction::SetExtend);
                    } else {
                        self.compile_expr(item, false);
                        self.emit(Instruction::SetAdd);
                    }
                }
            }

            ExprKind::Dict(entries) => {
                self.emit(Instruction::NewDict);
                for entry in entries {
                    match entry {
                        DictEntry::Pair(k, v) => {
                            self.compile_expr(k, false);
                            self.compile_expr(v, false);
                            self.emit(Instruction::DictInsert);
                        }
                        DictEntry::Spread(e) => {
                            self.compile_expr(e, false);
                            self.emit(Instruction::DictExtend);
                        }
                    }
                }
            }

            ExprKind::Spread(_) => {
                panic!("internal error: spread outside a collection literal")
            }

            ExprKind::Function { params, body } => {
                let display = self.lambda_name();
                self.compile_function(display, None, params, body, expr.span);
            }

            ExprKind::Block(stmts) => {
                self.ctx().scopes.push(FxHashMap::default());
                self.compile_stmts(stmts, tail);
                self.ctx().scopes.pop();
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.builder().create_label();
                let end_label = self.builder().create_label();

                self.compile_expr(condition, false);
                self.builder().emit_jump_if_false(else_label);
                self.compile_expr(then_branch, tail);
                self.builder().emit_jump(end_label);
                self.builder().bind_label(else_label);
                match else_branch {
                    Some(e) => self.compile_expr(e, tail),
                    None => self.emit(Instruction::Nil),
                }
                self.builder().bind_label(end_label);
            }

            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(value, false);
                let subject = self.builder().alloc_local();
                self.emit(Instruction::StoreLocal(subject));

                let fail = self.builder().create_label();
                let end_label = self.builder().create_label();
                let policy = BindPolicy { cell_muts: None };

                self.ctx().scopes.push(FxHashMap::default());
                self.emit_pattern(pattern, subject, fail, &policy);
                self.compile_expr(then_branch, tail);
                self.ctx().scopes.pop();
                self.builder().emit_jump(end_label);

                self.builder().bind_label(fail);
                match else_branch {
                    Some(e) => self.compile_expr(e, tail),
                    None => self.emit(Instruction::Nil),
                }
                self.builder().bind_label(end_label);
            }

            ExprKind::Match { subject, arms } => {
                self.compile_expr(subject, false);
                let subject_slot = self.builder().alloc_local();
                self.emit(Instruction::StoreLocal(subject_slot));

                let end_label = self.builder().create_label();
                for arm in arms {
                    let fail = self.builder().create_label();
                    let policy = BindPolicy { cell_muts: None };

                    self.ctx().scopes.push(FxHashMap::default());
                    self.emit_pattern(&arm.pattern, subject_slot, fail, &policy);
                    if let Some(guard) = &arm.guard {
                        self.compile_expr(guard, false);
                        self.builder().emit_jump_if_false(fail);
                    }
                    self.compile_expr(&arm.body, tail);
                    self.ctx().scopes.pop();
                    self.builder().emit_jump(end_label);
                    self.builder().bind_label(fail);
                }
                self.emit(Instruction::NoMatch);
                self.emit(Instruction::Nil); // dead
                self.builder().bind_label(end_label);
            }
        }
    }

    fn compile_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr) {
        match op {
            InfixOp::And => {
                let end_label = self.builder().create_label();
                self.compile_expr(left, false);
                self.emit(Instruction::Dup);
                self.builder().emit_jump_if_false(end_label);
                self.emit(Instruction::Pop);
                self.compile_expr(right, false);
                self.builder().bind_label(end_label);
            }
            InfixOp::Or => {
                let end_label = self.builder().create_label();
                self.compile_expr(left, false);
                self.emit(Instruction::Dup);
                self.builder().emit_jump_if_true(end_label);
                self.emit(Instruction::Pop);
                self.compile_expr(right, false);
                self.builder().bind_label(end_label);
            }
            InfixOp::Pipeline | InfixOp::Compose => {
                panic!("internal error: pipeline operator reached codegen")
            }
            _ => {
                self.compile_expr(left, false);
                self.compile_expr(right, false);
                let inst = match op {
                    InfixOp::Add => Instruction::Add,
                    InfixOp::Sub => Instruction::Sub,
                    InfixOp::Mul => Instruction::Mul,
                    InfixOp::Div => Instruction::Div,
                    InfixOp::Rem => Instruction::Rem,
                    InfixOp::Eq => Instruction::Eq,
                    InfixOp::Ne => Instruction::Ne,
                    InfixOp::Lt => Instruction::Lt,
                    InfixOp::Le => Instruction::Le,
                    InfixOp::Gt => Instruction::Gt,
                    InfixOp::Ge => Instruction::Ge,
                    InfixOp::And
                    | InfixOp::Or
                    | InfixOp::Pipeline
                    | InfixOp::Compose => unreachable!("handled above"),
                };
                self.emit(inst);
            }
        }
    }

    /// Compile a planned tail self-call as store-args-and-jump. Returns false
    /// when this call is not a rewrite site (no plan, shadowed name, arity
    /// mismatch) and ordinary call emission should proceed.
    fn try_compile_tail_call(&mut self, callee: &Expr, args: &[Expr]) -> bool {
        let ExprKind::Ident(name) = &callee.kind else {
            return false;
        };
        let Some(tco) = &self.ctx().tco else {
            return false;
        };
        if tco.self_name != *name || args.len() != tco.param_slots.len() {
            return false;
        }
        if Self::find_local(self.ctx(), name).is_some() {
            return false; // shadowed inside the function
        }

        // Evaluate every argument before touching the parameter slots, then
        // store back in reverse and restart the body.
        for arg in args {
            self.compile_expr(arg, false);
        }
        let tco = self.ctx().tco.as_ref().expect("tco state vanished");
        let slots: Vec<u16> = tco.param_slots.clone();
        let loop_start = tco.loop_start;
        for slot in slots.into_iter().rev() {
            self.emit(Instruction::StoreLocal(slot));
        }
        self.builder().emit_jump(loop_start);
        true
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    /// Emit a test of `pattern` against the value in `subject` that jumps to
    /// `fail` when it does not match, binding pattern names as it goes.
    fn emit_pattern(
        &mut self,
        pattern: &Pattern,
        subject: u16,
        fail: Label,
        policy: &BindPolicy<'_>,
    ) {
        match &pattern.kind {
            PatternKind::Wildcard | PatternKind::Rest(None) => {}

            PatternKind::Ident(name) => {
                self.emit(Instruction::LoadLocal(subject));
                self.bind_from_stack(name, policy);
            }

            PatternKind::Int(n) => {
                self.emit(Instruction::LoadLocal(subject));
                let idx = self.builder().add_int(*n);
                self.emit(Instruction::Const(idx));
                self.emit(Instruction::Eq);
                self.builder().emit_jump_if_false(fail);
            }

            PatternKind::Str(s) => {
                self.emit(Instruction::LoadLocal(subject));
                let idx = self.builder().add_str(s.clone());
                self.emit(Instruction::Const(idx));
                self.emit(Instruction::Eq);
                self.builder().emit_jump_if_false(fail);
            }

            PatternKind::Bool(b) => {
                self.emit(Instruction::LoadLocal(subject));
                self.emit(if *b {
                    Instruction::True
                } else {
                    Instruction::False
                });
                self.emit(Instruction::Eq);
                self.builder().emit_jump_if_false(fail);
            }

            PatternKind::Nil => {
                self.emit(Instruction::LoadLocal(subject));
                self.emit(Instruction::Nil);
                self.emit(Instruction::Eq);
                self.builder().emit_jump_if_false(fail);
            }

            PatternKind::Range {
                start,
                end,
                inclusive,
            } => {
                self.emit(Instruction::LoadLocal(subject));
                self.emit(Instruction::IsInt);
                self.builder().emit_jump_if_false(fail);

                self.emit(Instruction::LoadLocal(subject));
                let idx = self.builder().add_int(*start);
                self.emit(Instruction::Const(idx));
                self.emit(Instruction::Ge);
                self.builder().emit_jump_if_false(fail);

                self.emit(Instruction::LoadLocal(subject));
                let idx = self.builder().add_int(*end);
                self.emit(Instruction::Const(idx));
                self.emit(if *inclusive {
                    Instruction::Le
                } else {
                    Instruction::Lt
                });
                self.builder().emit_jump_if_false(fail);
            }

            PatternKind::List(items) => self.emit_list_pattern(items, subject, fail, policy),

            PatternKind::Rest(Some(_)) => {
                panic!("internal error: rest pattern outside a list pattern")
            }
        }
    }

    fn emit_list_pattern(
        &mut self,
        items: &[Pattern],
        subject: u16,
        fail: Label,
        policy: &BindPolicy<'_>,
    ) {
        self.emit(Instruction::LoadLocal(subject));
        self.emit(Instruction::IsList);
        self.builder().emit_jump_if_false(fail);

        let rest_pos = items
            .iter()
            .position(|p| matches!(p.kind, PatternKind::Rest(_)));

        match rest_pos {
            None => {
                self.emit(Instruction::LoadLocal(subject));
                self.emit(Instruction::Len);
                let idx = self.builder().add_int(items.len() as i64);
                self.emit(Instruction::Const(idx));
                self.emit(Instruction::Eq);
                self.builder().emit_jump_if_false(fail);

                for (i, item) in items.iter().enumerate() {
                    self.emit_element(item, subject, i as i64, fail, policy);
                }
            }
            Some(r) => {
                let before = r;
                let after = items.len() - r - 1;

                self.emit(Instruction::LoadLocal(subject));
                self.emit(Instruction::Len);
                let idx = self.builder().add_int((before + after) as i64);
                self.emit(Instruction::Const(idx));
                self.emit(Instruction::Ge);
                self.builder().emit_jump_if_false(fail);

                for (i, item) in items[..before].iter().enumerate() {
                    self.emit_element(item, subject, i as i64, fail, policy);
                }

                if let PatternKind::Rest(Some(name)) = &items[r].kind {
                    // subject[before .. len - after]
                    self.emit(Instruction::LoadLocal(subject));
                    let start_idx = self.builder().add_int(before as i64);
                    self.emit(Instruction::Const(start_idx));
                    self.emit(Instruction::LoadLocal(subject));
                    self.emit(Instruction::Len);
                    let after_idx = self.builder().add_int(after as i64);
                    self.emit(Instruction::Const(after_idx));
                    self.emit(Instruction::Sub);
                    self.emit(Instruction::Slice);
                    self.bind_from_stack(name, policy);
                }

                for (j, item) in items[r + 1..].iter().enumerate() {
                    // index = len - (after - j)
                    self.emit(Instruction::LoadLocal(subject));
                    self.emit(Instruction::LoadLocal(subject));
                    self.emit(Instruction::Len);
                    let off = self.builder().add_int((after - j) as i64);
                    self.emit(Instruction::Const(off));
                    self.emit(Instruction::Sub);
                    self.emit(Instruction::Index);
                    let slot = self.builder().alloc_local();
                    self.emit(Instruction::StoreLocal(slot));
                    self.emit_pattern(item, slot, fail, policy);
                }
            }
        }
    }

    fn emit_element(
        &mut self,
        item: &Pattern,
        subject: u16,
        index: i64,
        fail: Label,
        policy: &BindPolicy<'_>,
    ) {
        self.emit(Instruction::LoadLocal(subject));
        let idx = self.builder().add_int(index);
        self.emit(Instruction::Const(idx));
        self.emit(Instruction::Index);
        let slot = self.builder().alloc_local();
        self.emit(Instruction::StoreLocal(slot));
        self.emit_pattern(item, slot, fail, policy);
    }

    /// Bind the value on top of the stack to `name` in the current scope.
    fn bind_from_stack(&mut self, name: &Arc<str>, policy: &BindPolicy<'_>) {
        let is_cell = policy.is_cell(name);
        if is_cell {
            self.emit(Instruction::NewCell);
        }
        let slot = self.builder().alloc_local();
        self.emit(Instruction::StoreLocal(slot));
        self.declare(
            name.clone(),
            LocalBinding {
                slot,
                is_cell,
                hoisted: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassemble;
    use crate::desugar::desugar;
    use crate::scope::resolve;
    use ember_parser::parse;

    fn compile(source: &str) -> CodeUnit {
        let program = desugar(parse(source).expect("parse error"));
        resolve(&program).expect("resolve error");
        generate(&program)
    }

    #[test]
    fn test_simple_expression_compiles() {
        let unit = compile("1 + 2");
        assert!(!unit.main.instructions.is_empty());
        assert!(unit.functions.is_empty());
    }

    #[test]
    fn test_lambda_becomes_function_unit() {
        let unit = compile("let inc = |x| x + 1; inc(5)");
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].arity, 1);
        assert_eq!(unit.functions[0].name.as_ref(), "inc");
    }

    #[test]
    fn test_anonymous_lambdas_get_synthetic_names() {
        let unit = compile("map(|x| x, map(|y| y, [1]))");
        let names: Vec<&str> = unit.functions.iter().map(|f| f.name.as_ref()).collect();
        assert!(names.iter().all(|n| n.starts_with("<lambda:")));
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_capture_by_value() {
        let unit = compile("let x = 10; let f = || x; f()");
        let f = unit
            .functions
            .iter()
            .find(|f| f.name.as_ref() == "f")
            .expect("function f");
        assert_eq!(f.captures.len(), 1);
        // x is immutable and not forward-boxed: captured as a plain value.
        assert!(matches!(f.captures[0], CaptureSource::Local(_)));
        assert!(!f.instructions.contains(&Instruction::CellGet));
    }

    #[test]
    fn test_mutable_captured_binding_uses_cell() {
        let unit = compile("let mut n = 0; let bump = || n = n + 1; bump()");
        let bump = unit
            .functions
            .iter()
            .find(|f| f.name.as_ref() == "bump")
            .expect("function bump");
        assert!(bump.instructions.contains(&Instruction::CellSet));
        // The defining scope goes through the same indirection.
        assert!(unit.main.instructions.contains(&Instruction::NewCell));
    }

    #[test]
    fn test_immutable_uncaptured_binding_has_no_cell() {
        let unit = compile("let x = 1; x + 1");
        assert!(!unit.main.instructions.contains(&Instruction::NewCell));
    }

    #[test]
    fn test_top_level_function_binding_is_boxed() {
        let unit = compile("let f = |n| n; f(1)");
        // Hoisting allocates a cell before the definition runs.
        assert_eq!(unit.main.instructions[0], Instruction::Uninit);
        assert_eq!(unit.main.instructions[1], Instruction::NewCell);
    }

    #[test]
    fn test_tail_recursive_function_compiles_to_loop() {
        let unit = compile("let f = |n, acc| if n == 0 { acc } else { f(n - 1, acc + n) }; f(5, 0)");
        let f = unit
            .functions
            .iter()
            .find(|f| f.name.as_ref() == "f")
            .expect("function f");
        // The planned site jumps back to instruction 0 instead of calling.
        assert!(f.instructions.contains(&Instruction::Jump(0)));
        // No self-call remains inside the rewritten body.
        assert!(!f.instructions.iter().any(|i| matches!(i, Instruction::Call(2))));
    }

    #[test]
    fn test_non_tail_recursion_stays_a_call() {
        let unit =
            compile("let fact = |n| if n == 0 { 1 } else { n * fact(n - 1) }; fact(5)");
        let fact = unit
            .functions
            .iter()
            .find(|f| f.name.as_ref() == "fact")
            .expect("function fact");
        assert!(!fact.instructions.contains(&Instruction::Jump(0)));
        assert!(fact.instructions.contains(&Instruction::Call(1)));
    }

    #[test]
    fn test_builtin_loads_as_global() {
        let unit = compile("map(|x| x, [1])");
        assert!(unit
            .main
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::LoadGlobal(_))));
        assert_eq!(unit.main.names[0].as_ref(), "map");
    }

    #[test]
    fn test_shadowed_builtin_loads_locally() {
        let unit = compile("let map = 5; map");
        assert!(!unit
            .main
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::LoadGlobal(_))));
    }

    #[test]
    fn test_sections_register_thunks() {
        let unit = compile("input: 1\npart_one: input");
        assert_eq!(unit.sections.len(), 2);
        assert_eq!(unit.sections[0].name.as_ref(), "input");
        assert!(unit.sections.iter().all(|s| s.test_group.is_none()));
        assert_eq!(
            unit.main
                .instructions
                .iter()
                .filter(|i| matches!(i, Instruction::BindSection(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_test_block_entries_grouped() {
        let unit = compile("test: { input: 1, part_one: 2 }\ntest: { input: 3 }");
        assert_eq!(unit.test_count, 2);
        assert_eq!(unit.sections.len(), 3);
        assert_eq!(unit.sections[0].test_group, Some(0));
        assert_eq!(unit.sections[2].test_group, Some(1));
    }

    #[test]
    fn test_deterministic_compilation() {
        let source = "let mut acc = 0;\
                      let add = |x| acc = acc + x;\
                      [1, 2, 3] |> map(_ * 2) |> fold(0, +)";
        let a = disassemble(&compile(source));
        let b = disassemble(&compile(source));
        assert_eq!(a, b);
    }

    #[test]
    fn test_transitive_capture_chain() {
        let unit = compile("let x = 1; let f = || || x; f()()");
        // The inner lambda captures through the outer one.
        let inner = unit
            .functions
            .iter()
            .find(|f| f.name.starts_with("<lambda:"))
            .expect("inner lambda");
        assert!(matches!(inner.captures[0], CaptureSource::Capture(0)));
    }

    #[test]
    fn test_match_emits_no_match_fallback() {
        let unit = compile("match 1 { 0 { \"a\" }, _ { \"b\" } }");
        assert!(unit.main.instructions.contains(&Instruction::NoMatch));
    }

    #[test]
    fn test_rest_pattern_uses_slice() {
        let unit = compile("let [a, ..rest] = [1, 2, 3]; rest");
        assert!(unit.main.instructions.contains(&Instruction::Slice));
    }
}
