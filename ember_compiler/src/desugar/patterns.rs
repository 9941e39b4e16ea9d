//! Pattern-parameter desugaring.
//!
//! A destructuring parameter is rewritten to a single ordinary parameter
//! bound to a synthetic name, with a `let`-destructure of that name prepended
//! to the function body:
//!
//! `|[a, b], c| body` becomes `|$d0, c| { let [a, b] = $d0; body }`.

use super::Gensym;
use ember_parser::ast::{
    DictEntry, Expr, ExprKind, MatchArm, Param, ParamKind, Program, SectionEntry, Stmt,
    StmtKind,
};

/// Run the pattern-parameter pass over a whole program.
#[must_use]
pub fn desugar_pattern_params(program: Program) -> Program {
    let mut gensym = Gensym::new("d");
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
        ExprKind::Function { params, body } => {
            let body = rewrite(*body, gensym);
            rewrite_function(params, body, gensym)
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

/// Replace destructuring parameters and prepend their `let`-destructures.
fn rewrite_function(params: Vec<Param>, body: Expr, gensym: &mut Gensym) -> ExprKind {
    let mut new_params = Vec::with_capacity(params.len());
    let mut prelude: Vec<Stmt> = Vec::new();

    for param in params {
        match param.kind {
            ParamKind::Pattern(pattern) => {
                let name = gensym.fresh();
                let span = param.span;
                new_params.push(Param {
                    kind: ParamKind::Named(name.clone()),
                    span,
                });
                prelude.push(Stmt::new(
                    StmtKind::Let {
                        mutable: false,
                        pattern,
                        value: Box::new(Expr::new(ExprKind::Ident(name), span)),
                    },
                    span,
                ));
            }
            other => new_params.push(Param {
                kind: other,
                span: param.span,
            }),
        }
    }

    if prelude.is_empty() {
        return ExprKind::Function {
            params: new_params,
            body: Box::new(body),
        };
    }

    let body_span = body.span;
    let body = match body.kind {
        // Splice into an existing block so the original statements keep their
        // statement positions.
        ExprKind::Block(stmts) => {
            prelude.extend(stmts);
            Expr::new(ExprKind::Block(prelude), body_span)
        }
        _ => {
            prelude.push(Stmt::new(StmtKind::Expr(Box::new(body)), body_span));
            Expr::new(ExprKind::Block(prelude), body_span)
        }
    };

    ExprKind::Function {
        params: new_params,
        body: Box::new(body),
    }
}
