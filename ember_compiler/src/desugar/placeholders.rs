//! Placeholder desugaring.
//!
//! A bare `_` inside an expression denotes an implicit parameter of a
//! synthesized function literal. Scanning outward from a placeholder stops at
//! syntactic scope boundaries: function literals, blocks, `if`, `match`, each
//! call argument position, and each side of `|>` / `>>`. The expression
//! between boundaries becomes a lambda whose parameters are the placeholders
//! in left-to-right order.
//!
//! A bare operator in value position (`fold(0, +)`) becomes a fixed
//! two-parameter lambda applying that operator.
//!
//! The pass is idempotent: after one run, no placeholder or operator-reference
//! node remains anywhere in the tree.

use super::Gensym;
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, MatchArm, Param, ParamKind, Program, SectionEntry, Stmt,
    StmtKind,
};

/// Run the placeholder pass over a whole program.
#[must_use]
pub fn desugar_placeholders(program: Program) -> Program {
    let mut gensym = Gensym::new("");
    let stmts = program
        .stmts
        .into_iter()
        .map(|s| rewrite_stmt(s, &mut gensym))
        .collect();
    Program {
        stmts,
        span: program.span,
    }
}

/// Rewrite a statement; every expression it owns is a region root.
fn rewrite_stmt(stmt: Stmt, gensym: &mut Gensym) -> Stmt {
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(Box::new(lift(*e, gensym))),
        StmtKind::Let {
            mutable,
            pattern,
            value,
        } => StmtKind::Let {
            mutable,
            pattern,
            value: Box::new(lift(*value, gensym)),
        },
        StmtKind::Return(v) => StmtKind::Return(v.map(|e| Box::new(lift(*e, gensym)))),
        StmtKind::Break(v) => StmtKind::Break(v.map(|e| Box::new(lift(*e, gensym)))),
        StmtKind::Section { name, value } => StmtKind::Section {
            name,
            value: Box::new(lift(*value, gensym)),
        },
        StmtKind::TestBlock { entries } => StmtKind::TestBlock {
            entries: entries
                .into_iter()
                .map(|e| SectionEntry {
                    name: e.name,
                    value: lift(e.value, gensym),
                    span: e.span,
                })
                .collect(),
        },
    };
    Stmt::new(kind, stmt.span)
}

/// Rewrite a region root: collect its direct placeholders, and wrap the
/// result in a function literal when any were found.
fn lift(expr: Expr, gensym: &mut Gensym) -> Expr {
    let span = expr.span;
    let mut params = Vec::new();
    let rewritten = collect(expr, gensym, &mut params);
    if params.is_empty() {
        rewritten
    } else {
        Expr::new(
            ExprKind::Function {
                params,
                body: Box::new(rewritten),
            },
            span,
        )
    }
}

/// Rewrite within a region. Placeholders become fresh parameters of the
/// region; boundary children start their own regions via [`lift`].
fn collect(expr: Expr, gensym: &mut Gensym, params: &mut Vec<Param>) -> Expr {
    let span = expr.span;
    let kind = match expr.kind {
        // === The sugar itself ===
        ExprKind::Placeholder => {
            let name = gensym.fresh();
            params.push(Param {
                kind: ParamKind::Named(name.clone()),
                span,
            });
            ExprKind::Ident(name)
        }
        ExprKind::OperatorRef(op) => {
            // `+` as a value: |$a, $b| $a + $b
            let left = gensym.fresh();
            let right = gensym.fresh();
            ExprKind::Function {
                params: vec![
                    Param {
                        kind: ParamKind::Named(left.clone()),
                        span,
                    },
                    Param {
                        kind: ParamKind::Named(right.clone()),
                        span,
                    },
                ],
                body: Box::new(Expr::new(
                    ExprKind::Infix {
                        op,
                        left: Box::new(Expr::new(ExprKind::Ident(left), span)),
                        right: Box::new(Expr::new(ExprKind::Ident(right), span)),
                    },
                    span,
                )),
            }
        }

        // === Leaves ===
        ExprKind::Int(_)
        | ExprKind::Decimal(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Nil
        | ExprKind::Ident(_) => expr.kind,

        // === Transparent nodes: placeholders bubble up through these ===
        ExprKind::Prefix { op, operand } => ExprKind::Prefix {
            op,
            operand: Box::new(collect(*operand, gensym, params)),
        },
        ExprKind::Infix { op, left, right }
            if !matches!(
                op,
                ember_parser::ast::InfixOp::Pipeline | ember_parser::ast::InfixOp::Compose
            ) =>
        {
            ExprKind::Infix {
                op,
                left: Box::new(collect(*left, gensym, params)),
                right: Box::new(collect(*right, gensym, params)),
            }
        }
        // Each side of `|>` and `>>` is an independently-arity'd region.
        ExprKind::Infix { op, left, right } => ExprKind::Infix {
            op,
            left: Box::new(lift(*left, gensym)),
            right: Box::new(lift(*right, gensym)),
        },
        ExprKind::Assign { name, value } => ExprKind::Assign {
            name,
            value: Box::new(collect(*value, gensym, params)),
        },
        ExprKind::Index { collection, index } => ExprKind::Index {
            collection: Box::new(collect(*collection, gensym, params)),
            index: Box::new(collect(*index, gensym, params)),
        },
        ExprKind::Range {
            start,
            end,
            inclusive,
        } => ExprKind::Range {
            start: Box::new(collect(*start, gensym, params)),
            end: end.map(|e| Box::new(collect(*e, gensym, params))),
            inclusive,
        },
        ExprKind::List(items) => ExprKind::List(
            items
                .into_iter()
                .map(|e| collect(e, gensym, params))
                .collect(),
        ),
        ExprKind::Set(items) => ExprKind::Set(
            items
                .into_iter()
                .map(|e| collect(e, gensym, params))
                .collect(),
        ),
        ExprKind::Dict(entries) => ExprKind::Dict(
            entries
                .into_iter()
                .map(|entry| match entry {
                    DictEntry::Pair(k, v) => DictEntry::Pair(
                        collect(k, gensym, params),
                        collect(v, gensym, params),
                    ),
                    DictEntry::Spread(e) => DictEntry::Spread(collect(e, gensym, params)),
                })
                .collect(),
        ),
        ExprKind::Spread(inner) => ExprKind::Spread(Box::new(collect(*inner, gensym, params))),

        // === Calls: the callee is transparent, each argument is a boundary ===
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(collect(*callee, gensym, params)),
            args: args.into_iter().map(|a| lift(a, gensym)).collect(),
        },

        // === Scope boundaries ===
        ExprKind::Function {
            params: fn_params,
            body,
        } => ExprKind::Function {
            params: fn_params,
            body: Box::new(lift(*body, gensym)),
        },
        ExprKind::Block(stmts) => ExprKind::Block(
            stmts
                .into_iter()
                .map(|s| rewrite_stmt(s, gensym))
                .collect(),
        ),
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => ExprKind::If {
            condition: Box::new(lift(*condition, gensym)),
            then_branch: Box::new(lift(*then_branch, gensym)),
            else_branch: else_branch.map(|e| Box::new(lift(*e, gensym))),
        },
        ExprKind::IfLet {
            pattern,
            value,
            then_branch,
            else_branch,
        } => ExprKind::IfLet {
            pattern,
            value: Box::new(lift(*value, gensym)),
            then_branch: Box::new(lift(*then_branch, gensym)),
            else_branch: else_branch.map(|e| Box::new(lift(*e, gensym))),
        },
        ExprKind::Match { subject, arms } => ExprKind::Match {
            subject: Box::new(lift(*subject, gensym)),
            arms: arms
                .into_iter()
                .map(|arm| MatchArm {
                    pattern: arm.pattern,
                    guard: arm.guard.map(|g| lift(g, gensym)),
                    body: lift(arm.body, gensym),
                    span: arm.span,
                })
                .collect(),
        },
    };
    Expr::new(kind, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::tests::any_expr;
    use ember_parser::ast::InfixOp;
    use ember_parser::parse;

    fn desugared(source: &str) -> Program {
        desugar_placeholders(parse(source).expect("parse error"))
    }

    fn first_expr(program: &Program) -> &Expr {
        let StmtKind::Expr(e) = &program.stmts[0].kind else {
            panic!("expected expression statement");
        };
        e
    }

    #[test]
    fn test_single_placeholder_becomes_unary_lambda() {
        let program = desugared("_ + 1");
        let ExprKind::Function { params, body } = &first_expr(&program).kind else {
            panic!("expected synthesized lambda");
        };
        assert_eq!(params.len(), 1);
        let ExprKind::Infix { op, left, .. } = &body.kind else {
            panic!("expected infix body");
        };
        assert_eq!(*op, InfixOp::Add);
        assert!(matches!(left.kind, ExprKind::Ident(_)));
    }

    #[test]
    fn test_two_placeholders_become_binary_lambda() {
        let program = desugared("_ + _");
        let ExprKind::Function { params, .. } = &first_expr(&program).kind else {
            panic!("expected synthesized lambda");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_call_argument_is_its_own_boundary() {
        // map(_ * 2): the argument becomes a lambda, the call does not.
        let program = desugared("map(_ * 2)");
        let ExprKind::Call { args, .. } = &first_expr(&program).kind else {
            panic!("expected call to survive");
        };
        assert!(matches!(args[0].kind, ExprKind::Function { .. }));
    }

    #[test]
    fn test_pipeline_sides_are_independent_regions() {
        let program = desugared("_ + 1 |> f");
        let ExprKind::Infix { op, left, .. } = &first_expr(&program).kind else {
            panic!("expected pipeline to survive this pass");
        };
        assert_eq!(*op, InfixOp::Pipeline);
        assert!(matches!(left.kind, ExprKind::Function { .. }));
    }

    #[test]
    fn test_operator_reference_expands() {
        let program = desugared("fold(0, +)");
        let ExprKind::Call { args, .. } = &first_expr(&program).kind else {
            panic!("expected call");
        };
        let ExprKind::Function { params, body } = &args[1].kind else {
            panic!("expected operator lambda");
        };
        assert_eq!(params.len(), 2);
        assert!(matches!(
            body.kind,
            ExprKind::Infix {
                op: InfixOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_placeholder_inside_if_does_not_escape() {
        let program = desugared("if _ { 1 } else { 2 }");
        // The `if` itself survives; its condition became a lambda.
        let ExprKind::If { condition, .. } = &first_expr(&program).kind else {
            panic!("expected if to survive");
        };
        assert!(matches!(condition.kind, ExprKind::Function { .. }));
    }

    #[test]
    fn test_idempotence() {
        let once = desugared("let inc = _ + 1; [_, 2]; map(_ * _)");
        assert!(!any_expr(&once, &|e| matches!(
            e.kind,
            ExprKind::Placeholder | ExprKind::OperatorRef(_)
        )));
        // Running the pass again is a no-op.
        let twice = desugar_placeholders(once.clone());
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }

    #[test]
    fn test_spans_preserved() {
        let source = "_ + 1";
        let program = desugared(source);
        let lambda = first_expr(&program);
        assert_eq!(lambda.span.start, 0);
        assert_eq!(lambda.span.end as usize, source.len());
    }
}
