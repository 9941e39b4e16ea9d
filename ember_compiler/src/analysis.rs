//! Capture analysis used by the code generator.
//!
//! Three questions, each answered once per function literal or block at
//! generation time:
//!
//! - which names are free in a function literal (its capture set, in first
//!   occurrence order);
//! - whether a binding's value expression contains a nested function literal
//!   that references the binding's own name (a self-referential binding, the
//!   memoize idiom);
//! - which names are captured by any function literal inside a block (used to
//!   decide which `let mut` bindings need a shared cell).
//!
//! The collectors are name-based. A shadowed name can over-trigger cell
//! boxing; over-boxing only costs one indirection, under-boxing breaks
//! recursion, so ambiguity boxes.

use ember_parser::ast::{
    DictEntry, Expr, ExprKind, Param, ParamKind, PatternKind, Stmt, StmtKind,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::scope::is_function_binding;

/// Free variables of a function literal, in first-occurrence order.
///
/// Builtin names are included when unbound; the generator filters them by
/// resolution (a name bound nowhere in the context chain loads as a global).
#[must_use]
pub fn free_variables(params: &[Param], body: &Expr) -> Vec<Arc<str>> {
    let mut walker = FreeWalker::default();
    walker.push_scope();
    for param in params {
        walker.bind_param(param);
    }
    walker.walk_expr(body);
    walker.pop_scope();
    walker.found
}

/// Whether `value` references `name` anywhere among its free variables.
///
/// Decides self-referential bindings: plain recursion
/// (`let f = |n| ... f(...) ...`), the memoize idiom
/// (`let fib = memoize(|n| ... fib(...) ...)`), and any other wrapper that
/// passes the binding's own name along. Such bindings need cell indirection
/// so uses observe the final bound value; a reference that turns out dead
/// only costs the indirection, so ambiguity boxes.
#[must_use]
pub fn references_name(name: &str, value: &Expr) -> bool {
    free_variables(&[], value).iter().any(|n| n.as_ref() == name)
}

/// Names referenced freely by any function literal within `stmts`.
///
/// A `let mut` binding whose name lands in this set is captured by a closure
/// and must live in a shared cell.
#[must_use]
pub fn closure_captured_names(stmts: &[Stmt]) -> FxHashSet<Arc<str>> {
    let mut captured = FxHashSet::default();
    let mut collect = |expr: &Expr| {
        if let ExprKind::Function { params, body } = &expr.kind {
            captured.extend(free_variables(params, body));
        }
    };
    for stmt in stmts {
        visit_stmt_exprs(stmt, &mut |e| visit_deep(e, &mut collect));
    }
    captured
}

fn visit_deep(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    f(expr);
    visit_children(expr, &mut |e| visit_deep(e, f));
}

fn visit_stmt_exprs(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Section { value: e, .. } => f(e),
        StmtKind::Let { value, .. } => f(value),
        StmtKind::Return(v) | StmtKind::Break(v) => {
            if let Some(e) = v {
                f(e);
            }
        }
        StmtKind::TestBlock { entries } => {
            for entry in entries {
                f(&entry.value);
            }
        }
    }
}

/// Invoke `f` on every direct child expression of `expr`.
fn visit_children(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Decimal(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Nil
        | ExprKind::Ident(_)
        | ExprKind::Placeholder
        | ExprKind::OperatorRef(_) => {}
        ExprKind::Prefix { operand, .. } => f(operand),
        ExprKind::Infix { left, right, .. } => {
            f(left);
            f(right);
        }
        ExprKind::Assign { value, .. } => f(value),
        ExprKind::Call { callee, args } => {
            f(callee);
            args.iter().for_each(&mut *f);
        }
        ExprKind::Index { collection, index } => {
            f(collection);
            f(index);
        }
        ExprKind::Range { start, end, .. } => {
            f(start);
            if let Some(e) = end {
                f(e);
            }
        }
        ExprKind::List(items) | ExprKind::Set(items) => items.iter().for_each(&mut *f),
        ExprKind::Dict(entries) => {
            for entry in entries {
                match entry {
                    DictEntry::Pair(k, v) => {
                        f(k);
                        f(v);
                    }
                    DictEntry::Spread(e) => f(e),
                }
            }
        }
        ExprKind::Spread(inner) => f(inner),
        ExprKind::Function { body, .. } => f(body),
        ExprKind::Block(stmts) => {
            for stmt in stmts {
                visit_stmt_exprs(stmt, f);
            }
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            f(condition);
            f(then_branch);
            if let Some(e) = else_branch {
                f(e);
            }
        }
        ExprKind::IfLet {
            value,
            then_branch,
            else_branch,
            ..
        } => {
            f(value);
            f(then_branch);
            if let Some(e) = else_branch {
                f(e);
            }
        }
        ExprKind::Match { subject, arms } => {
            f(subject);
            for arm in arms {
                if let Some(g) = &arm.guard {
                    f(g);
                }
                f(&arm.body);
            }
        }
    }
}

// =============================================================================
// Free-variable walker
// =============================================================================

#[derive(Default)]
struct FreeWalker {
    scopes: Vec<FxHashSet<Arc<str>>>,
    seen: FxHashSet<Arc<str>>,
    found: Vec<Arc<str>>,
}

impl FreeWalker {
    fn push_scope(&mut self) {
        self.scopes.push(FxHashSet::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: Arc<str>) {
        self.scopes
            .last_mut()
            .expect("free walker scope underflow")
            .insert(name);
    }

    fn bind_param(&mut self, param: &Param) {
        match &param.kind {
            ParamKind::Named(name) | ParamKind::Rest(name) => self.bind(name.clone()),
            ParamKind::Placeholder => {}
            ParamKind::Pattern(pattern) => self.bind_pattern(&pattern.kind),
        }
    }

    fn bind_pattern(&mut self, pattern: &PatternKind) {
        let mut names = Vec::new();
        pattern.collect_bindings(&mut names);
        for name in names {
            self.bind(name);
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn record(&mut self, name: &Arc<str>) {
        if !self.is_bound(name) && self.seen.insert(name.clone()) {
            self.found.push(name.clone());
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Section { value: e, .. } => self.walk_expr(e),
            StmtKind::Let { pattern, value, .. } => {
                // Mirror the resolver: a function-valued binding is visible
                // inside its own value expression.
                if let PatternKind::Ident(name) = &pattern.kind {
                    if is_function_binding(value) {
                        self.bind(name.clone());
                        self.walk_expr(value);
                        return;
                    }
                }
                self.walk_expr(value);
                self.bind_pattern(&pattern.kind);
            }
            StmtKind::Return(v) | StmtKind::Break(v) => {
                if let Some(e) = v {
                    self.walk_expr(e);
                }
            }
            StmtKind::TestBlock { entries } => {
                for entry in entries {
                    self.push_scope();
                    self.walk_expr(&entry.value);
                    self.pop_scope();
                }
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.record(name),
            ExprKind::Assign { name, value } => {
                // A write is a use: assigning an outer name captures it.
                self.record(name);
                self.walk_expr(value);
            }
            ExprKind::Function { params, body } => {
                self.push_scope();
                for param in params {
                    self.bind_param(param);
                }
                self.walk_expr(body);
                self.pop_scope();
            }
            ExprKind::Block(stmts) => {
                self.push_scope();
                for stmt in stmts {
                    self.walk_stmt(stmt);
                }
                self.pop_scope();
            }
            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(value);
                self.push_scope();
                self.bind_pattern(&pattern.kind);
                self.walk_expr(then_branch);
                self.pop_scope();
                if let Some(e) = else_branch {
                    self.walk_expr(e);
                }
            }
            ExprKind::Match { subject, arms } => {
                self.walk_expr(subject);
                for arm in arms {
                    self.push_scope();
                    self.bind_pattern(&arm.pattern.kind);
                    if let Some(g) = &arm.guard {
                        self.walk_expr(g);
                    }
                    self.walk_expr(&arm.body);
                    self.pop_scope();
                }
            }
            _ => visit_children(expr, &mut |e| self.walk_expr(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use ember_parser::parse;

    fn body_of_first_fn(source: &str) -> (Vec<Param>, Expr) {
        let program = desugar(parse(source).expect("parse error"));
        let StmtKind::Let { value, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Function { params, body } = &value.kind else {
            panic!("expected function");
        };
        (params.clone(), (**body).clone())
    }

    #[test]
    fn test_free_variables_exclude_params_and_locals() {
        let (params, body) = body_of_first_fn("let f = |a| { let b = a; a + b + c }");
        let free = free_variables(&params, &body);
        let free: Vec<&str> = free.iter().map(|n| n.as_ref()).collect();
        assert_eq!(free, vec!["c"]);
    }

    #[test]
    fn test_free_variables_through_nested_function() {
        let (params, body) = body_of_first_fn("let f = |a| |b| a + b + x");
        let free = free_variables(&params, &body);
        let free: Vec<&str> = free.iter().map(|n| n.as_ref()).collect();
        assert_eq!(free, vec!["x"]);
    }

    #[test]
    fn test_free_variables_first_occurrence_order() {
        let (params, body) = body_of_first_fn("let f = || b + a + b");
        let free = free_variables(&params, &body);
        let free: Vec<&str> = free.iter().map(|n| n.as_ref()).collect();
        assert_eq!(free, vec!["b", "a"]);
    }

    #[test]
    fn test_assignment_counts_as_use() {
        let (params, body) = body_of_first_fn("let f = || x = 1");
        let free = free_variables(&params, &body);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].as_ref(), "x");
    }

    #[test]
    fn test_references_name_memoize_idiom() {
        let program = desugar(
            parse("let fib = memoize(|n| if n < 2 { n } else { fib(n - 1) })")
                .expect("parse error"),
        );
        let StmtKind::Let { value, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        assert!(references_name("fib", value));
        assert!(!references_name("other", value));
    }

    #[test]
    fn test_references_name_sees_direct_argument_use() {
        let program = desugar(parse("let f = wrap(f, |x| x)").expect("parse error"));
        let StmtKind::Let { value, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        // Referenced directly as an argument, not inside the literal.
        assert!(references_name("f", value));
    }

    #[test]
    fn test_references_name_ignores_bound_occurrences() {
        let program = desugar(parse("let f = |f| f(1)").expect("parse error"));
        let StmtKind::Let { value, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        // The parameter shadows the binding name.
        assert!(!references_name("f", value));
    }

    #[test]
    fn test_closure_captured_names() {
        let program = desugar(
            parse("let mut count = 0; let bump = || count = count + 1; let plain = 1")
                .expect("parse error"),
        );
        let captured = closure_captured_names(&program.stmts);
        assert!(captured.contains("count"));
        assert!(!captured.contains("plain"));
    }
}
