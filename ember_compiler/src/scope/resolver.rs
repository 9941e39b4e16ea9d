//! Two-phase lexical resolution.
//!
//! Phase 1 hoists top-level section names and top-level bindings whose value
//! is a function literal (directly, or wrapped one call deep — the memoize
//! idiom), so forward references and mutual recursion resolve. Phase 2 walks
//! every expression, pushing a scope per construct, and hard-errors on any
//! unresolved identifier, misplaced `return`/`break`, or assignment to an
//! immutable binding.
//!
//! The resolver runs on the desugared AST; sugar nodes reaching it are an
//! internal invariant violation, not a user error.

use super::symbol::{Binding, BindingFlags, Scope, ScopeKind, is_breakable, is_builtin};
use ember_core::{EmberError, EmberResult, Span};
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, Param, ParamKind, Program, Stmt, StmtKind,
};
use smallvec::SmallVec;

/// Validate a desugared program.
pub fn resolve(program: &Program) -> EmberResult<()> {
    Resolver::new().resolve_program(program)
}

/// Whether a binding's value makes it eligible for forward-reference
/// hoisting: a function literal, or a call with a function literal somewhere
/// in an argument. Over-triggering only costs an indirection, so ambiguity
/// hoists.
#[must_use]
pub(crate) fn is_function_binding(value: &Expr) -> bool {
    match &value.kind {
        ExprKind::Function { .. } => true,
        ExprKind::Call { args, .. } => args.iter().any(contains_function_literal),
        _ => false,
    }
}

fn contains_function_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Function { .. } => true,
        ExprKind::Int(_)
        | ExprKind::Decimal(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Nil
        | ExprKind::Ident(_)
        | ExprKind::Placeholder
        | ExprKind::OperatorRef(_) => false,
        ExprKind::Prefix { operand, .. } => contains_function_literal(operand),
        ExprKind::Infix { left, right, .. } => {
            contains_function_literal(left) || contains_function_literal(right)
        }
        ExprKind::Assign { value, .. } => contains_function_literal(value),
        ExprKind::Call { callee, args } => {
            contains_function_literal(callee) || args.iter().any(contains_function_literal)
        }
        ExprKind::Index { collection, index } => {
            contains_function_literal(collection) || contains_function_literal(index)
        }
        ExprKind::Range { start, end, .. } => {
            contains_function_literal(start)
                || end.as_deref().is_some_and(contains_function_literal)
        }
        ExprKind::List(items) | ExprKind::Set(items) => {
            items.iter().any(contains_function_literal)
        }
        ExprKind::Dict(entries) => entries.iter().any(|e| match e {
            DictEntry::Pair(k, v) => {
                contains_function_literal(k) || contains_function_literal(v)
            }
            DictEntry::Spread(e) => contains_function_literal(e),
        }),
        ExprKind::Spread(inner) => contains_function_literal(inner),
        ExprKind::Block(stmts) => stmts.iter().any(|s| match &s.kind {
            StmtKind::Expr(e) | StmtKind::Section { value: e, .. } => {
                contains_function_literal(e)
            }
            StmtKind::Let { value, .. } => contains_function_literal(value),
            StmtKind::Return(v) | StmtKind::Break(v) => {
                v.as_deref().is_some_and(contains_function_literal)
            }
            StmtKind::TestBlock { entries } => {
                entries.iter().any(|e| contains_function_literal(&e.value))
            }
        }),
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            contains_function_literal(condition)
                || contains_function_literal(then_branch)
                || else_branch.as_deref().is_some_and(contains_function_literal)
        }
        ExprKind::IfLet {
            value,
            then_branch,
            else_branch,
            ..
        } => {
            contains_function_literal(value)
                || contains_function_literal(then_branch)
                || else_branch.as_deref().is_some_and(contains_function_literal)
        }
        ExprKind::Match { subject, arms } => {
            contains_function_literal(subject)
                || arms.iter().any(|arm| {
                    arm.guard.as_ref().is_some_and(contains_function_literal)
                        || contains_function_literal(&arm.body)
                })
        }
    }
}

/// Resolver state: a scope stack plus `return`/`break` legality depths.
pub struct Resolver {
    scopes: SmallVec<[Scope; 8]>,
    function_depth: u32,
    breakable_depth: u32,
}

impl Resolver {
    /// Create a resolver with an empty scope stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: SmallVec::new(),
            function_depth: 0,
            breakable_depth: 0,
        }
    }

    /// Resolve a whole program.
    pub fn resolve_program(mut self, program: &Program) -> EmberResult<()> {
        self.scopes.push(Scope::new(ScopeKind::Program));

        // Phase 1: hoist section names and function-valued top-level lets.
        for stmt in &program.stmts {
            match &stmt.kind {
                StmtKind::Section { name, .. } => {
                    self.current_scope().declare(
                        name.clone(),
                        BindingFlags::HOISTED | BindingFlags::SECTION,
                    );
                }
                StmtKind::Let {
                    mutable,
                    pattern,
                    value,
                } => {
                    if let ember_parser::ast::PatternKind::Ident(name) = &pattern.kind {
                        if is_function_binding(value) {
                            let mut flags = BindingFlags::HOISTED | BindingFlags::FUNCTION;
                            if *mutable {
                                flags |= BindingFlags::MUT;
                            }
                            self.current_scope().declare(name.clone(), flags);
                        }
                    }
                }
                StmtKind::Expr(_)
                | StmtKind::Return(_)
                | StmtKind::Break(_)
                | StmtKind::TestBlock { .. } => {}
            }
        }

        // Phase 2: full resolution.
        for stmt in &program.stmts {
            self.visit_stmt(stmt)?;
        }

        self.scopes.pop();
        Ok(())
    }

    fn current_scope(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack underflow")
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.lookup(name))
    }

    fn err(message: String, span: Span) -> EmberError {
        EmberError::Resolve { message, span }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn visit_stmt(&mut self, stmt: &Stmt) -> EmberResult<()> {
        match &stmt.kind {
            StmtKind::Expr(e) => self.visit_expr(e),

            StmtKind::Let {
                mutable,
                pattern,
                value,
            } => {
                let mut flags = BindingFlags::NONE;
                if *mutable {
                    flags |= BindingFlags::MUT;
                }

                if let ember_parser::ast::PatternKind::Ident(name) = &pattern.kind {
                    let pre_declared = self
                        .current_scope()
                        .lookup(name)
                        .is_some_and(|b| b.flags.contains(BindingFlags::HOISTED));

                    if pre_declared {
                        // Phase 1 already made the name visible.
                        self.visit_expr(value)?;
                    } else if is_function_binding(value) {
                        // Declare before the value so a local recursive let
                        // can reference itself.
                        self.current_scope()
                            .declare(name.clone(), flags | BindingFlags::FUNCTION);
                        self.visit_expr(value)?;
                    } else {
                        // Ordinary bindings cannot reference themselves.
                        self.visit_expr(value)?;
                        self.current_scope().declare(name.clone(), flags);
                    }
                    return Ok(());
                }

                // Destructuring let: value first, then all bound names.
                self.visit_expr(value)?;
                let mut names = Vec::new();
                pattern.kind.collect_bindings(&mut names);
                for name in names {
                    self.current_scope().declare(name, flags);
                }
                Ok(())
            }

            StmtKind::Return(value) => {
                if self.function_depth == 0 {
                    return Err(Self::err(
                        "`return` outside of a function body".to_string(),
                        stmt.span,
                    ));
                }
                if let Some(v) = value {
                    self.visit_expr(v)?;
                }
                Ok(())
            }

            StmtKind::Break(value) => {
                if self.breakable_depth == 0 {
                    return Err(Self::err(
                        "`break` outside of a breakable iteration call".to_string(),
                        stmt.span,
                    ));
                }
                if let Some(v) = value {
                    self.visit_expr(v)?;
                }
                Ok(())
            }

            StmtKind::Section { value, .. } => self.visit_expr(value),

            StmtKind::TestBlock { entries } => {
                for entry in entries {
                    // Each test entry gets its own scope; entry names are
                    // table labels, not bindings.
                    self.scopes.push(Scope::new(ScopeKind::TestEntry));
                    let result = self.visit_expr(&entry.value);
                    self.scopes.pop();
                    result?;
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn visit_expr(&mut self, expr: &Expr) -> EmberResult<()> {
        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Decimal(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Nil => Ok(()),

            ExprKind::Placeholder | ExprKind::OperatorRef(_) => {
                panic!("internal error: sugar node survived desugaring: {expr:?}")
            }

            ExprKind::Ident(name) => {
                if self.lookup(name).is_some() || is_builtin(name) {
                    Ok(())
                } else {
                    Err(Self::err(
                        format!("unresolved identifier `{name}`"),
                        expr.span,
                    ))
                }
            }

            ExprKind::Assign { name, value } => {
                self.visit_expr(value)?;
                match self.lookup(name) {
                    Some(binding) if binding.is_mutable() => Ok(()),
                    Some(_) => Err(Self::err(
                        format!("cannot assign to immutable binding `{name}`"),
                        expr.span,
                    )),
                    None if is_builtin(name) => Err(Self::err(
                        format!("cannot assign to builtin `{name}`"),
                        expr.span,
                    )),
                    None => Err(Self::err(
                        format!("unresolved identifier `{name}`"),
                        expr.span,
                    )),
                }
            }

            ExprKind::Prefix { operand, .. } => self.visit_expr(operand),

            ExprKind::Infix { left, right, .. } => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }

            ExprKind::Call { callee, args } => {
                self.visit_expr(callee)?;
                // Arguments of an unshadowed breakable builtin call are a
                // legal home for `break`.
                let breakable = matches!(&callee.kind, ExprKind::Ident(name)
                    if is_breakable(name) && self.lookup(name).is_none());
                if breakable {
                    self.breakable_depth += 1;
                }
                let result = args.iter().try_for_each(|a| self.visit_expr(a));
                if breakable {
                    self.breakable_depth -= 1;
                }
                result
            }

            ExprKind::Index { collection, index } => {
                self.visit_expr(collection)?;
                self.visit_expr(index)
            }

            ExprKind::Range { start, end, .. } => {
                self.visit_expr(start)?;
                if let Some(e) = end {
                    self.visit_expr(e)?;
                }
                Ok(())
            }

            ExprKind::List(items) | ExprKind::Set(items) => {
                items.iter().try_for_each(|e| self.visit_expr(e))
            }

            ExprKind::Dict(entries) => entries.iter().try_for_each(|entry| match entry {
                DictEntry::Pair(k, v) => {
                    self.visit_expr(k)?;
                    self.visit_expr(v)
                }
                DictEntry::Spread(e) => self.visit_expr(e),
            }),

            ExprKind::Spread(inner) => self.visit_expr(inner),

            ExprKind::Function { params, body } => {
                if let Some(pos) = params
                    .iter()
                    .position(|p| matches!(p.kind, ParamKind::Rest(_)))
                {
                    if pos != params.len() - 1 {
                        return Err(Self::err(
                            "rest parameter must be the last parameter".to_string(),
                            params[pos].span,
                        ));
                    }
                }
                self.scopes.push(Scope::new(ScopeKind::Function));
                self.declare_params(params);
                self.function_depth += 1;
                let result = self.visit_expr(body);
                self.function_depth -= 1;
                self.scopes.pop();
                result
            }

            ExprKind::Block(stmts) => {
                self.scopes.push(Scope::new(ScopeKind::Block));
                let result = stmts.iter().try_for_each(|s| self.visit_stmt(s));
                self.scopes.pop();
                result
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(condition)?;
                self.visit_expr(then_branch)?;
                if let Some(e) = else_branch {
                    self.visit_expr(e)?;
                }
                Ok(())
            }

            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(value)?;
                self.scopes.push(Scope::new(ScopeKind::IfLet));
                let mut names = Vec::new();
                pattern.kind.collect_bindings(&mut names);
                for name in names {
                    self.current_scope().declare(name, BindingFlags::NONE);
                }
                let result = self.visit_expr(then_branch);
                self.scopes.pop();
                result?;
                if let Some(e) = else_branch {
                    self.visit_expr(e)?;
                }
                Ok(())
            }

            ExprKind::Match { subject, arms } => {
                self.visit_expr(subject)?;
                for arm in arms {
                    self.scopes.push(Scope::new(ScopeKind::MatchArm));
                    let mut names = Vec::new();
                    arm.pattern.kind.collect_bindings(&mut names);
                    for name in names {
                        self.current_scope().declare(name, BindingFlags::NONE);
                    }
                    let result = (|| {
                        if let Some(guard) = &arm.guard {
                            self.visit_expr(guard)?;
                        }
                        self.visit_expr(&arm.body)
                    })();
                    self.scopes.pop();
                    result?;
                }
                Ok(())
            }
        }
    }

    fn declare_params(&mut self, params: &[Param]) {
        for param in params {
            match &param.kind {
                ParamKind::Named(name) | ParamKind::Rest(name) => {
                    self.current_scope().declare(name.clone(), BindingFlags::NONE);
                }
                ParamKind::Placeholder => {}
                ParamKind::Pattern(pattern) => {
                    // Eliminated by desugaring; still resolved for totality.
                    let mut names = Vec::new();
                    pattern.kind.collect_bindings(&mut names);
                    for name in names {
                        self.current_scope().declare(name, BindingFlags::NONE);
                    }
                }
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use ember_parser::parse;

    fn resolve_source(source: &str) -> EmberResult<()> {
        let program = desugar(parse(source).expect("parse error"));
        resolve(&program)
    }

    #[test]
    fn test_simple_let_and_use() {
        assert!(resolve_source("let x = 1; x + 1").is_ok());
    }

    #[test]
    fn test_unresolved_identifier() {
        let err = resolve_source("let x = 1; y").unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
        assert!(err.message().contains('y'));
        assert!(err.span().is_some());
    }

    #[test]
    fn test_ordinary_binding_cannot_self_reference() {
        let err = resolve_source("let x = x + 1").unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_recursive_function_binding() {
        assert!(resolve_source(
            "let f = |n| if n == 0 { 1 } else { n * f(n - 1) }; f(5)"
        )
        .is_ok());
    }

    #[test]
    fn test_mutual_recursion_resolves_in_either_order() {
        let source = "let even = |n| if n == 0 { true } else { odd(n - 1) };\
                      let odd = |n| if n == 0 { false } else { even(n - 1) };\
                      even(10)";
        assert!(resolve_source(source).is_ok());
        let flipped = "let odd = |n| if n == 0 { false } else { even(n - 1) };\
                       let even = |n| if n == 0 { true } else { odd(n - 1) };\
                       odd(9)";
        assert!(resolve_source(flipped).is_ok());
    }

    #[test]
    fn test_memoize_wrapper_self_reference() {
        assert!(resolve_source(
            "let fib = memoize(|n| if n < 2 { n } else { fib(n - 1) + fib(n - 2) }); fib(10)"
        )
        .is_ok());
    }

    #[test]
    fn test_local_recursive_let() {
        assert!(resolve_source(
            "let outer = || { let f = |n| if n == 0 { 0 } else { f(n - 1) }; f(3) }; outer()"
        )
        .is_ok());
    }

    #[test]
    fn test_local_mutual_recursion_is_an_error() {
        // Forward references are a top-level affordance only.
        let err = resolve_source(
            "let outer = || { let f = |n| g(n); let g = |n| n; f(1) }; outer()",
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_return_outside_function() {
        let err = resolve_source("return 1").unwrap_err();
        assert!(err.message().contains("return"));
    }

    #[test]
    fn test_return_inside_function() {
        assert!(resolve_source("let f = |x| { return x; }; f(1)").is_ok());
    }

    #[test]
    fn test_break_outside_breakable() {
        let err = resolve_source("break 1").unwrap_err();
        assert!(err.message().contains("break"));
    }

    #[test]
    fn test_break_inside_fold_lambda() {
        assert!(resolve_source(
            "fold(0, |acc, x| if x > 3 { break acc } else { acc + x }, [1, 2, 3])"
        )
        .is_ok());
    }

    #[test]
    fn test_break_not_legal_in_map() {
        let err = resolve_source("map(|x| { break x }, [1])").unwrap_err();
        assert!(err.message().contains("break"));
    }

    #[test]
    fn test_shadowed_breakable_builtin_is_not_breakable() {
        let err = resolve_source(
            "let fold = |a, b, c| a; fold(0, |acc, x| { break acc }, [1])",
        )
        .unwrap_err();
        assert!(err.message().contains("break"));
    }

    #[test]
    fn test_assign_immutable_rejected() {
        let err = resolve_source("let x = 1; x = 2").unwrap_err();
        assert!(err.message().contains("immutable"));
    }

    #[test]
    fn test_assign_mutable_ok() {
        assert!(resolve_source("let mut x = 1; x = 2").is_ok());
    }

    #[test]
    fn test_assign_captured_mutable_ok() {
        assert!(resolve_source("let mut x = 1; let f = || x = x + 1; f()").is_ok());
    }

    #[test]
    fn test_builtin_may_be_shadowed() {
        assert!(resolve_source("let map = 5; map + 1").is_ok());
    }

    #[test]
    fn test_scopes_do_not_leak() {
        let err = resolve_source("let f = || { let y = 1; y }; y").unwrap_err();
        assert!(err.message().contains('y'));
    }

    #[test]
    fn test_match_arm_bindings_scoped_to_arm() {
        assert!(resolve_source("match [1, 2] { [a, b] { a + b }, _ { 0 } }").is_ok());
        let err = resolve_source("match [1] { [a] { a }, _ { 0 } }; a").unwrap_err();
        assert!(err.message().contains('a'));
    }

    #[test]
    fn test_if_let_bindings_scoped_to_then_branch() {
        assert!(resolve_source("if let [x] = [1] { x } else { 0 }").is_ok());
        let err = resolve_source("if let [x] = [1] { x } else { x }").unwrap_err();
        assert!(err.message().contains('x'));
    }

    #[test]
    fn test_sections_hoisted() {
        assert!(resolve_source("part_one: part_two\npart_two: 42").is_ok());
    }

    #[test]
    fn test_test_entries_have_own_scope() {
        // Entry names are labels, not bindings.
        let err = resolve_source("test: { input: \"x\" }\ninput").unwrap_err();
        assert!(err.message().contains("input"));
    }

    #[test]
    fn test_use_before_definition_of_plain_binding() {
        let err = resolve_source("x; let x = 1").unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_top_level_function_forward_reference() {
        // `f` is hoisted, so the earlier expression sees it.
        assert!(resolve_source("let g = || f(); let f = || 1; g()").is_ok());
    }
}
