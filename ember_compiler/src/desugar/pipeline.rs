//! Pipeline and composition desugaring.
//!
//! `|>` follows the static-rewrite policy: when the right side is a call
//! expression the piped value is appended as its final positional argument
//! (`v |> f(a)` becomes `f(a, v)`, the partial-application idiom); otherwise
//! the right side is invoked as a one-argument function (`v |> f` becomes
//! `f(v)`). `f >> g` becomes `|$cN| g(f($cN))`.
//!
//! The rewrite is bottom-up, so chained pipelines nest naturally:
//! `a |> f |> g` becomes `g(f(a))`.

use super::Gensym;
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, InfixOp, MatchArm, Param, ParamKind, Program, SectionEntry,
    Stmt, StmtKind,
};

/// Run the pipeline pass over a whole program.
#[must_use]
pub fn desugar_pipeline(program: Program) -> Program {
    let mut gensym = Gensym::new("c");
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

fn rewrite_stmt(stmt: Stmt, gensym: &mut Gensym) -> Stmt {
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(Box::new(rewrite(*e, gensym))),
        StmtKind::Let {
            mutable,
            pattern,
            value,
        } => StmtKind::Let {
            mutable,
            pattern,
            value: Box::new(rewrite(*value, gensym)),
        },
        StmtKind::Return(v) => StmtKind::Return(v.map(|e| Box::new(rewrite(*e, gensym)))),
        StmtKind::Break(v) => StmtKind::Break(v.map(|e| Box::new(rewrite(*e, gensym)))),
        StmtKind::Section { name, value } => StmtKind::Section {
            name,
            value: Box::new(rewrite(*value, gensym)),
        },
        StmtKind::TestBlock { entries } => StmtKind::TestBlock {
            entries: entries
                .into_iter()
                .map(|e| SectionEntry {
                    name: e.name,
                    value: rewrite(e.value, gensym),
                    span: e.span,
                })
                .collect(),
        },
    };
    Stmt::new(kind, stmt.span)
}

fn rewrite(expr: Expr, gensym: &mut Gensym) -> Expr {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Infix {
            op: InfixOp::Pipeline,
            left,
            right,
        } => {
            let value = rewrite(*left, gensym);
            let target = rewrite(*right, gensym);
            match target.kind {
                // Static rewrite: append as the final positional argument.
                ExprKind::Call { callee, mut args } => {
                    args.push(value);
                    ExprKind::Call { callee, args }
                }
                // Anything else is invoked as a one-argument function.
                _ => ExprKind::Call {
                    callee: Box::new(target),
                    args: vec![value],
                },
            }
        }
        ExprKind::Infix {
            op: InfixOp::Compose,
            left,
            right,
        } => {
            // f >> g: |$c| g(f($c))
            let f = rewrite(*left, gensym);
            let g = rewrite(*right, gensym);
            let param = gensym.fresh();
            let inner = Expr::new(
                ExprKind::Call {
                    callee: Box::new(f),
                    args: vec![Expr::new(ExprKind::Ident(param.clone()), span)],
                },
                span,
            );
            ExprKind::Function {
                params: vec![Param {
                    kind: ParamKind::Named(param),
                    span,
                }],
                body: Box::new(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(g),
                        args: vec![inner],
                    },
                    span,
                )),
            }
        }

        // === Everything else: rewrite children ===
        ExprKind::Int(_)
        | ExprKind::Decimal(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Nil
        | ExprKind::Ident(_)
        | ExprKind::Placeholder
        | ExprKind::OperatorRef(_) => expr.kind,
        ExprKind::Prefix { op, operand } => ExprKind::Prefix {
            op,
            operand: Box::new(rewrite(*operand, gensym)),
        },
        ExprKind::Infix { op, left, right } => ExprKind::Infix {
            op,
            left: Box::new(rewrite(*left, gensym)),
            right: Box::new(rewrite(*right, gensym)),
        },
        ExprKind::Assign { name, value } => ExprKind::Assign {
            name,
            value: Box::new(rewrite(*value, gensym)),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(rewrite(*callee, gensym)),
            args: args.into_iter().map(|a| rewrite(a, gensym)).collect(),
        },
        ExprKind::Index { collection, index } => ExprKind::Index {
            collection: Box::new(rewrite(*collection, gensym)),
            index: Box::new(rewrite(*index, gensym)),
        },
        ExprKind::Range {
            start,
            end,
            inclusive,
        } => ExprKind::Range {
            start: Box::new(rewrite(*start, gensym)),
            end: end.map(|e| Box::new(rewrite(*e, gensym))),
            inclusive,
        },
        ExprKind::List(items) => {
            ExprKind::List(items.into_iter().map(|e| rewrite(e, gensym)).collect())
        }
        ExprKind::Set(items) => {
            ExprKind::Set(items.into_iter().map(|e| rewrite(e, gensym)).collect())
        }
        ExprKind::Dict(entries) => ExprKind::Dict(
            entries
                .into_iter()
                .map(|entry| match entry {
                    DictEntry::Pair(k, v) => {
                        DictEntry::Pair(rewrite(k, gensym), rewrite(v, gensym))
                    }
                    DictEntry::Spread(e) => DictEntry::Spread(rewrite(e, gensym)),
                })
                .collect(),
        ),
        ExprKind::Spread(inner) => ExprKind::Spread(Box::new(rewrite(*inner, gensym))),
        ExprKind::Function { params, body } => ExprKind::Function {
            params,
            body: Box::new(rewrite(*body, gensym)),
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
            condition: Box::new(rewrite(*condition, gensym)),
            then_branch: Box::new(rewrite(*then_branch, gensym)),
            else_branch: else_branch.map(|e| Box::new(rewrite(*e, gensym))),
        },
        ExprKind::IfLet {
            pattern,
            value,
            then_branch,
            else_branch,
        } => ExprKind::IfLet {
            pattern,
            value: Box::new(rewrite(*value, gensym)),
            then_branch: Box::new(rewrite(*then_branch, gensym)),
            else_branch: else_branch.map(|e| Box::new(rewrite(*e, gensym))),
        },
        ExprKind::Match { subject, arms } => ExprKind::Match {
            subject: Box::new(rewrite(*subject, gensym)),
            arms: arms
                .into_iter()
                .map(|arm| MatchArm {
                    pattern: arm.pattern,
                    guard: arm.guard.map(|g| rewrite(g, gensym)),
                    body: rewrite(arm.body, gensym),
                    span: arm.span,
                })
                .collect(),
        },
    };
    Expr::new(kind, span)
}
