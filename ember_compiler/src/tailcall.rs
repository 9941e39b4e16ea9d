//! Tail-call analysis.
//!
//! Given a binding name and its function body, decide whether every
//! self-call is in tail position. Tail position is structural: the last
//! expression of a block, both branches of a tail-positioned `if`/`if-let`,
//! every arm body of a tail-positioned `match`, and the value of a `return`.
//! Guards, operands, call arguments and `let` values are never tail.
//!
//! A self-call is a call whose callee is exactly the analyzed name — not
//! shadowed by an inner binding, not an alias — with an argument count
//! matching the function's arity. A bare reference to the name (passing the
//! function as a value) does not disqualify the analysis: only the direct
//! call sites are rewritten, every other use goes through the ordinary
//! binding.
//!
//! The output is the transformation plan for the generator: the ordered tail
//! self-call sites. `None` means ordinary (stack-growing) codegen applies —
//! either there is no self-call at all, or some self-call is not in tail
//! position (an operand, an argument, a `let` value).

use ember_core::Span;
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, Param, ParamKind, Stmt, StmtKind,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// The transformation plan for one tail-recursive function.
#[derive(Debug, Clone)]
pub struct TailRecursionInfo {
    /// The analyzed binding name.
    pub name: Arc<str>,
    /// Spans of every tail self-call site, in source order.
    pub sites: Vec<Span>,
}

/// Analyze `name = |params| body`.
///
/// Returns the plan when at least one self-call exists and every self-call is
/// a tail call; `None` otherwise.
#[must_use]
pub fn analyze(name: &Arc<str>, params: &[Param], body: &Expr) -> Option<TailRecursionInfo> {
    // A rest parameter re-binds a variable number of slots; those functions
    // always compile with ordinary calls.
    if params
        .iter()
        .any(|p| matches!(p.kind, ParamKind::Rest(_) | ParamKind::Pattern(_)))
    {
        return None;
    }

    let mut walker = Walker {
        name: name.as_ref(),
        arity: params.len(),
        sites: Vec::new(),
        non_tail_self_call: false,
        shadows: Vec::new(),
    };
    // The function's own parameters shadow the binding name.
    walker.shadows.push(FxHashSet::default());
    for param in params {
        if let ParamKind::Named(n) = &param.kind {
            walker.shadow(n.clone());
        }
    }
    walker.walk_expr(body, true);

    if walker.non_tail_self_call || walker.sites.is_empty() {
        None
    } else {
        Some(TailRecursionInfo {
            name: name.clone(),
            sites: walker.sites,
        })
    }
}

struct Walker<'a> {
    name: &'a str,
    arity: usize,
    sites: Vec<Span>,
    non_tail_self_call: bool,
    shadows: Vec<FxHashSet<Arc<str>>>,
}

impl Walker<'_> {
    fn shadowed(&self, name: &str) -> bool {
        self.shadows.iter().any(|s| s.contains(name))
    }

    fn shadow(&mut self, name: Arc<str>) {
        if let Some(scope) = self.shadows.last_mut() {
            scope.insert(name);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, tail: bool) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.walk_expr(e, tail),
            StmtKind::Let { pattern, value, .. } => {
                self.walk_expr(value, false);
                let mut names = Vec::new();
                pattern.kind.collect_bindings(&mut names);
                for name in names {
                    self.shadow(name);
                }
            }
            // The returned value flows straight to the caller.
            StmtKind::Return(v) => {
                if let Some(e) = v {
                    self.walk_expr(e, true);
                }
            }
            StmtKind::Break(v) => {
                if let Some(e) = v {
                    self.walk_expr(e, false);
                }
            }
            StmtKind::Section { value, .. } => self.walk_expr(value, false),
            StmtKind::TestBlock { entries } => {
                for entry in entries {
                    self.walk_expr(&entry.value, false);
                }
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr, tail: bool) {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                if let ExprKind::Ident(callee_name) = &callee.kind {
                    if callee_name.as_ref() == self.name
                        && !self.shadowed(callee_name)
                        && args.len() == self.arity
                    {
                        if tail {
                            self.sites.push(expr.span);
                        } else {
                            self.non_tail_self_call = true;
                        }
                        for arg in args {
                            self.walk_expr(arg, false);
                        }
                        return;
                    }
                }
                self.walk_expr(callee, false);
                for arg in args {
                    self.walk_expr(arg, false);
                }
            }

            ExprKind::Block(stmts) => {
                self.shadows.push(FxHashSet::default());
                let last = stmts.len().saturating_sub(1);
                for (i, stmt) in stmts.iter().enumerate() {
                    self.walk_stmt(stmt, tail && i == last);
                }
                self.shadows.pop();
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(condition, false);
                self.walk_expr(then_branch, tail);
                if let Some(e) = else_branch {
                    self.walk_expr(e, tail);
                }
            }

            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(value, false);
                self.shadows.push(FxHashSet::default());
                let mut names = Vec::new();
                pattern.kind.collect_bindings(&mut names);
                for name in names {
                    self.shadow(name);
                }
                self.walk_expr(then_branch, tail);
                self.shadows.pop();
                if let Some(e) = else_branch {
                    self.walk_expr(e, tail);
                }
            }

            ExprKind::Match { subject, arms } => {
                self.walk_expr(subject, false);
                for arm in arms {
                    self.shadows.push(FxHashSet::default());
                    let mut names = Vec::new();
                    arm.pattern.kind.collect_bindings(&mut names);
                    for name in names {
                        self.shadow(name);
                    }
                    if let Some(g) = &arm.guard {
                        self.walk_expr(g, false);
                    }
                    self.walk_expr(&arm.body, tail);
                    self.shadows.pop();
                }
            }

            ExprKind::Function { params, body } => {
                // A different frame: self-calls inside are never our tail
                // calls, and its parameters shadow.
                self.shadows.push(FxHashSet::default());
                for param in params {
                    match &param.kind {
                        ParamKind::Named(n) | ParamKind::Rest(n) => self.shadow(n.clone()),
                        ParamKind::Placeholder => {}
                        ParamKind::Pattern(p) => {
                            let mut names = Vec::new();
                            p.kind.collect_bindings(&mut names);
                            for name in names {
                                self.shadow(name);
                            }
                        }
                    }
                }
                self.walk_expr(body, false);
                self.shadows.pop();
            }

            // === Never tail positions ===
            ExprKind::Prefix { operand, .. } => self.walk_expr(operand, false),
            ExprKind::Infix { left, right, .. } => {
                self.walk_expr(left, false);
                self.walk_expr(right, false);
            }
            ExprKind::Assign { value, .. } => self.walk_expr(value, false),
            ExprKind::Index { collection, index } => {
                self.walk_expr(collection, false);
                self.walk_expr(index, false);
            }
            ExprKind::Range { start, end, .. } => {
                self.walk_expr(start, false);
                if let Some(e) = end {
                    self.walk_expr(e, false);
                }
            }
            ExprKind::List(items) | ExprKind::Set(items) => {
                for item in items {
                    self.walk_expr(item, false);
                }
            }
            ExprKind::Dict(entries) => {
                for entry in entries {
                    match entry {
                        DictEntry::Pair(k, v) => {
                            self.walk_expr(k, false);
                            self.walk_expr(v, false);
                        }
                        DictEntry::Spread(e) => self.walk_expr(e, false),
                    }
                }
            }
            ExprKind::Spread(inner) => self.walk_expr(inner, false),

            // === Leaves ===
            ExprKind::Int(_)
            | ExprKind::Decimal(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Nil
            | ExprKind::Ident(_)
            | ExprKind::Placeholder
            | ExprKind::OperatorRef(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use ember_parser::parse;

    fn analyze_binding(source: &str) -> Option<TailRecursionInfo> {
        let program = desugar(parse(source).expect("parse error"));
        let StmtKind::Let { pattern, value, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        let ember_parser::ast::PatternKind::Ident(name) = &pattern.kind else {
            panic!("expected identifier binding");
        };
        let ExprKind::Function { params, body } = &value.kind else {
            panic!("expected function literal");
        };
        analyze(name, params, body)
    }

    #[test]
    fn test_accumulator_recursion_is_tail() {
        let info = analyze_binding(
            "let f = |n, acc| if n == 0 { acc } else { f(n - 1, acc + n) }",
        )
        .expect("should be tail recursive");
        assert_eq!(info.name.as_ref(), "f");
        assert_eq!(info.sites.len(), 1);
    }

    #[test]
    fn test_operand_recursion_is_not_tail() {
        // The multiply happens after the call returns.
        assert!(analyze_binding(
            "let factorial = |n| if n == 0 { 1 } else { n * factorial(n - 1) }"
        )
        .is_none());
    }

    #[test]
    fn test_no_self_call_yields_nothing() {
        assert!(analyze_binding("let f = |n| n + 1").is_none());
    }

    #[test]
    fn test_both_if_branches_count() {
        let info = analyze_binding(
            "let f = |n| if n % 2 == 0 { f(n - 2) } else { if n == 1 { 0 } else { f(n - 1) } }",
        )
        .expect("should be tail recursive");
        assert_eq!(info.sites.len(), 2);
    }

    #[test]
    fn test_match_arm_bodies_are_tail() {
        let info = analyze_binding(
            "let f = |n| match n { 0 { 0 }, _ { f(n - 1) } }",
        )
        .expect("should be tail recursive");
        assert_eq!(info.sites.len(), 1);
    }

    #[test]
    fn test_guard_is_not_tail() {
        assert!(analyze_binding(
            "let f = |n| match n { x if f(x - 1) == 0 { 0 }, _ { f(n - 1) } }"
        )
        .is_none());
    }

    #[test]
    fn test_call_argument_is_not_tail() {
        assert!(analyze_binding("let f = |n| g(f(n - 1))").is_none());
    }

    #[test]
    fn test_let_bound_self_call_is_not_tail() {
        assert!(analyze_binding(
            "let f = |n| { let x = f(n - 1); x }"
        )
        .is_none());
    }

    #[test]
    fn test_return_value_is_tail() {
        let info = analyze_binding(
            "let f = |n| { if n == 0 { return 0 }; return f(n - 1) }",
        )
        .expect("should be tail recursive");
        assert_eq!(info.sites.len(), 1);
    }

    #[test]
    fn test_shadowed_name_is_not_a_self_call() {
        assert!(analyze_binding(
            "let f = |n| { let f = |x| x; f(n) }"
        )
        .is_none());
    }

    #[test]
    fn test_nested_function_self_call_disqualifies() {
        assert!(analyze_binding("let f = |n| { let g = || f(n - 1); g() }").is_none());
    }

    #[test]
    fn test_bare_reference_does_not_disqualify() {
        // Passing the function as a value is allowed alongside tail calls.
        let info = analyze_binding(
            "let f = |n| if n == 0 { puts(f) } else { f(n - 1) }",
        )
        .expect("should be tail recursive");
        assert_eq!(info.sites.len(), 1);
    }

    #[test]
    fn test_wrong_arity_call_is_ignored() {
        // `f(1, 2)` is not a rewrite candidate; the only real self-call is
        // tail, so the plan still forms.
        let info = analyze_binding(
            "let f = |n| if n == 0 { f(1, 2) } else { f(n - 1) }",
        )
        .expect("arity-mismatched call is not a plan site");
        assert_eq!(info.sites.len(), 1);
    }

    #[test]
    fn test_rest_parameter_disables_plan() {
        assert!(analyze_binding("let f = |..xs| f(xs)").is_none());
    }
}
