//! AST desugaring.
//!
//! Three independent, composable passes in a fixed order:
//!
//! 1. [`placeholders`] — implicit-parameter `_` and bare-operator references
//!    become function literals.
//! 2. [`pipeline`] — `|>` and `>>` become ordinary calls / function literals.
//! 3. [`patterns`] — destructuring parameters become a synthetic parameter
//!    plus a prepended `let`-destructure.
//!
//! Each pass is a total AST-to-AST rewrite: it handles every node variant and
//! preserves source spans. Synthetic names carry a `$` sigil, which the lexer
//! can never produce, so they are collision-free against user identifiers.

pub mod patterns;
pub mod pipeline;
pub mod placeholders;

use ember_parser::ast::Program;

/// Run all three passes in order.
#[must_use]
pub fn desugar(program: Program) -> Program {
    let program = placeholders::desugar_placeholders(program);
    let program = pipeline::desugar_pipeline(program);
    patterns::desugar_pattern_params(program)
}

/// Deterministic synthetic-name generator.
///
/// Names are `$<prefix><counter>`; one generator per pass invocation keeps
/// compilation deterministic.
pub(crate) struct Gensym {
    prefix: &'static str,
    next: u32,
}

impl Gensym {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub(crate) fn fresh(&mut self) -> std::sync::Arc<str> {
        let name = format!("${}{}", self.prefix, self.next);
        self.next += 1;
        std::sync::Arc::from(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_parser::ast::{Expr, ExprKind, Stmt, StmtKind};
    use ember_parser::parse;

    /// Walk every expression in a program, failing if `f` returns true.
    pub(crate) fn any_expr(program: &Program, f: &dyn Fn(&Expr) -> bool) -> bool {
        fn walk_stmt(stmt: &Stmt, f: &dyn Fn(&Expr) -> bool) -> bool {
            match &stmt.kind {
                StmtKind::Expr(e) => walk(e, f),
                StmtKind::Let { value, .. } => walk(value, f),
                StmtKind::Return(v) | StmtKind::Break(v) => {
                    v.as_ref().is_some_and(|e| walk(e, f))
                }
                StmtKind::Section { value, .. } => walk(value, f),
                StmtKind::TestBlock { entries } => {
                    entries.iter().any(|e| walk(&e.value, f))
                }
            }
        }
        fn walk(expr: &Expr, f: &dyn Fn(&Expr) -> bool) -> bool {
            if f(expr) {
                return true;
            }
            match &expr.kind {
                ExprKind::Int(_)
                | ExprKind::Decimal(_)
                | ExprKind::Str(_)
                | ExprKind::Bool(_)
                | ExprKind::Nil
                | ExprKind::Ident(_)
                | ExprKind::Placeholder
                | ExprKind::OperatorRef(_) => false,
                ExprKind::Prefix { operand, .. } => walk(operand, f),
                ExprKind::Infix { left, right, .. } => walk(left, f) || walk(right, f),
                ExprKind::Assign { value, .. } => walk(value, f),
                ExprKind::Call { callee, args } => {
                    walk(callee, f) || args.iter().any(|a| walk(a, f))
                }
                ExprKind::Index { collection, index } => {
                    walk(collection, f) || walk(index, f)
                }
                ExprKind::Range { start, end, .. } => {
                    walk(start, f) || end.as_ref().is_some_and(|e| walk(e, f))
                }
                ExprKind::List(items) | ExprKind::Set(items) => {
                    items.iter().any(|e| walk(e, f))
                }
                ExprKind::Dict(entries) => entries.iter().any(|entry| match entry {
                    ember_parser::ast::DictEntry::Pair(k, v) => walk(k, f) || walk(v, f),
                    ember_parser::ast::DictEntry::Spread(e) => walk(e, f),
                }),
                ExprKind::Spread(inner) => walk(inner, f),
                ExprKind::Function { body, .. } => walk(body, f),
                ExprKind::Block(stmts) => stmts.iter().any(|s| walk_stmt(s, f)),
                ExprKind::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    walk(condition, f)
                        || walk(then_branch, f)
                        || else_branch.as_ref().is_some_and(|e| walk(e, f))
                }
                ExprKind::IfLet {
                    value,
                    then_branch,
                    else_branch,
                    ..
                } => {
                    walk(value, f)
                        || walk(then_branch, f)
                        || else_branch.as_ref().is_some_and(|e| walk(e, f))
                }
                ExprKind::Match { subject, arms } => {
                    walk(subject, f)
                        || arms.iter().any(|arm| {
                            arm.guard.as_ref().is_some_and(|g| walk(g, f))
                                || walk(&arm.body, f)
                        })
                }
            }
        }
        program.stmts.iter().any(|s| walk_stmt(s, f))
    }

    #[test]
    fn test_full_desugar_removes_all_sugar() {
        let program = parse(
            "let add = |[a, b]| a + b; [1, 2] |> map(_ * 2) |> fold(0, +)",
        )
        .expect("parse error");
        let program = desugar(program);
        assert!(!any_expr(&program, &|e| matches!(
            e.kind,
            ExprKind::Placeholder | ExprKind::OperatorRef(_)
        )));
        assert!(!any_expr(&program, &|e| matches!(
            e.kind,
            ExprKind::Infix {
                op: ember_parser::ast::InfixOp::Pipeline
                    | ember_parser::ast::InfixOp::Compose,
                ..
            }
        )));
    }
}
