//! Recursive-descent parser with Pratt-style expression precedence.
//!
//! Grammar notes that matter to later stages:
//! - `{ ... }` in expression position is a set literal; braces are blocks only
//!   where a body is expected (function bodies, `if`/`else`, match arms,
//!   section values).
//! - A bare infix operator directly before `,`, `)`, `]`, `}` or `;` parses as
//!   an operator reference (`fold(0, +)`).
//! - `name: expr` at top level is a section; `test: { ... }` is a test block.

use crate::ast::{
    DictEntry, Expr, ExprKind, InfixOp, MatchArm, Param, ParamKind, Pattern, PatternKind,
    PrefixOp, Program, SectionEntry, Stmt, StmtKind,
};
use crate::token::{Token, TokenKind};
use ember_core::{EmberError, EmberResult, Span};
use std::sync::Arc;

/// Binding powers, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,
    Pipe,
    Or,
    And,
    Equality,
    Comparison,
    Range,
    Term,
    Factor,
    Postfix,
}

/// Token-stream parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over a token stream (must end with `Eof`).
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // =========================================================================
    // Token access
    // =========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> EmberResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {} {}, found {}",
                kind.describe(),
                context,
                self.current().kind.describe()
            )))
        }
    }

    fn error(&self, message: String) -> EmberError {
        EmberError::Parse {
            message,
            span: self.current().span,
        }
    }

    // =========================================================================
    // Program and statements
    // =========================================================================

    /// Parse a whole program.
    pub fn parse_program(mut self) -> EmberResult<Program> {
        let start = self.current().span;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_stmt(true)?);
            while self.eat(&TokenKind::Semi) {}
        }
        let span = stmts
            .iter()
            .fold(start, |acc: Span, s: &Stmt| acc.join(s.span));
        Ok(Program::new(stmts, span))
    }

    fn parse_stmt(&mut self, top_level: bool) -> EmberResult<Stmt> {
        let start = self.current().span;
        match &self.current().kind {
            TokenKind::Let => self.parse_let(),
            TokenKind::Return => {
                self.advance();
                let value = if self.stmt_ends_here() {
                    None
                } else {
                    Some(Box::new(self.parse_expr(Precedence::Lowest)?))
                };
                let span = value.as_ref().map_or(start, |v| start.join(v.span));
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::Break => {
                self.advance();
                let value = if self.stmt_ends_here() {
                    None
                } else {
                    Some(Box::new(self.parse_expr(Precedence::Lowest)?))
                };
                let span = value.as_ref().map_or(start, |v| start.join(v.span));
                Ok(Stmt::new(StmtKind::Break(value), span))
            }
            TokenKind::Ident(_) if top_level && self.peek().kind == TokenKind::Colon => {
                self.parse_section()
            }
            _ => {
                let expr = self.parse_expr(Precedence::Lowest)?;
                let span = expr.span;
                Ok(Stmt::new(StmtKind::Expr(Box::new(expr)), span))
            }
        }
    }

    fn stmt_ends_here(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
        )
    }

    fn parse_let(&mut self) -> EmberResult<Stmt> {
        let start = self.advance().span; // `let`
        let mutable = self.eat(&TokenKind::Mut);
        let pattern = self.parse_binding_pattern()?;
        self.expect(&TokenKind::Assign, "after let pattern")?;
        let value = self.parse_expr(Precedence::Lowest)?;
        let span = start.join(value.span);
        Ok(Stmt::new(
            StmtKind::Let {
                mutable,
                pattern,
                value: Box::new(value),
            },
            span,
        ))
    }

    /// A `let` target: identifier, `_`, or list destructure.
    fn parse_binding_pattern(&mut self) -> EmberResult<Pattern> {
        match &self.current().kind {
            TokenKind::Ident(_) | TokenKind::Placeholder | TokenKind::LBracket => {
                self.parse_pattern()
            }
            other => Err(self.error(format!(
                "expected binding pattern after `let`, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_section(&mut self) -> EmberResult<Stmt> {
        let name_token = self.advance();
        let start = name_token.span;
        let TokenKind::Ident(name) = name_token.kind else {
            unreachable!("caller checked for an identifier");
        };
        self.expect(&TokenKind::Colon, "after section name")?;

        if name.as_ref() == "test" && self.check(&TokenKind::LBrace) {
            self.advance(); // `{`
            let mut entries = Vec::new();
            while !self.check(&TokenKind::RBrace) {
                let entry_token = self.expect(
                    &TokenKind::Ident(Arc::from("")),
                    "as test entry name",
                )?;
                let TokenKind::Ident(entry_name) = entry_token.kind else {
                    unreachable!("expect() returned a non-identifier");
                };
                self.expect(&TokenKind::Colon, "after test entry name")?;
                let value = self.parse_body_expr()?;
                let span = entry_token.span.join(value.span);
                entries.push(SectionEntry {
                    name: entry_name,
                    value,
                    span,
                });
                while self.eat(&TokenKind::Comma) || self.eat(&TokenKind::Semi) {}
            }
            let end = self.advance().span; // `}`
            return Ok(Stmt::new(
                StmtKind::TestBlock { entries },
                start.join(end),
            ));
        }

        let value = self.parse_body_expr()?;
        let span = start.join(value.span);
        Ok(Stmt::new(
            StmtKind::Section {
                name,
                value: Box::new(value),
            },
            span,
        ))
    }

    /// An expression in a body position: braces mean a block here.
    fn parse_body_expr(&mut self) -> EmberResult<Expr> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_expr(Precedence::Lowest)
        }
    }

    fn parse_block(&mut self) -> EmberResult<Expr> {
        let start = self.expect(&TokenKind::LBrace, "to open block")?.span;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_stmt(false)?);
            while self.eat(&TokenKind::Semi) {}
        }
        let end = self.expect(&TokenKind::RBrace, "to close block")?.span;
        Ok(Expr::new(ExprKind::Block(stmts), start.join(end)))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self, min_prec: Precedence) -> EmberResult<Expr> {
        let mut left = self.parse_prefix()?;

        loop {
            let prec = match self.infix_precedence() {
                Some(p) if p > min_prec => p,
                _ => break,
            };
            left = self.parse_infix(left, prec)?;
        }

        Ok(left)
    }

    fn infix_precedence(&self) -> Option<Precedence> {
        Some(match self.current().kind {
            TokenKind::Assign => Precedence::Assign,
            TokenKind::PipeGt | TokenKind::GtGt => Precedence::Pipe,
            TokenKind::PipePipe => Precedence::Or,
            TokenKind::AmpAmp => Precedence::And,
            TokenKind::EqEq | TokenKind::BangEq => Precedence::Equality,
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                Precedence::Comparison
            }
            TokenKind::DotDot | TokenKind::DotDotEq => Precedence::Range,
            TokenKind::Plus | TokenKind::Minus => Precedence::Term,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
            TokenKind::LParen | TokenKind::LBracket => Precedence::Postfix,
            _ => return None,
        })
    }

    fn parse_infix(&mut self, left: Expr, prec: Precedence) -> EmberResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Assign => {
                self.advance();
                let ExprKind::Ident(name) = left.kind else {
                    return Err(EmberError::Parse {
                        message: "assignment target must be an identifier".to_string(),
                        span: left.span,
                    });
                };
                let value = self.parse_expr(Precedence::Lowest)?;
                let span = left.span.join(value.span);
                Ok(Expr::new(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let mut args = Vec::new();
                while !self.check(&TokenKind::RParen) {
                    args.push(self.parse_expr(Precedence::Lowest)?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RParen, "to close call arguments")?.span;
                let span = left.span.join(end);
                Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(left),
                        args,
                    },
                    span,
                ))
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr(Precedence::Lowest)?;
                let end = self.expect(&TokenKind::RBracket, "to close index")?.span;
                let span = left.span.join(end);
                Ok(Expr::new(
                    ExprKind::Index {
                        collection: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }
            TokenKind::DotDot | TokenKind::DotDotEq => {
                let inclusive = token.kind == TokenKind::DotDotEq;
                self.advance();
                if inclusive || self.expr_starts_here() {
                    let end = self.parse_expr(Precedence::Range)?;
                    let span = left.span.join(end.span);
                    Ok(Expr::new(
                        ExprKind::Range {
                            start: Box::new(left),
                            end: Some(Box::new(end)),
                            inclusive,
                        },
                        span,
                    ))
                } else {
                    let span = left.span.join(token.span);
                    Ok(Expr::new(
                        ExprKind::Range {
                            start: Box::new(left),
                            end: None,
                            inclusive: false,
                        },
                        span,
                    ))
                }
            }
            _ => {
                let op = match token.kind {
                    TokenKind::Plus => InfixOp::Add,
                    TokenKind::Minus => InfixOp::Sub,
                    TokenKind::Star => InfixOp::Mul,
                    TokenKind::Slash => InfixOp::Div,
                    TokenKind::Percent => InfixOp::Rem,
                    TokenKind::EqEq => InfixOp::Eq,
                    TokenKind::BangEq => InfixOp::Ne,
                    TokenKind::Lt => InfixOp::Lt,
                    TokenKind::Le => InfixOp::Le,
                    TokenKind::Gt => InfixOp::Gt,
                    TokenKind::Ge => InfixOp::Ge,
                    TokenKind::AmpAmp => InfixOp::And,
                    TokenKind::PipePipe => InfixOp::Or,
                    TokenKind::PipeGt => InfixOp::Pipeline,
                    TokenKind::GtGt => InfixOp::Compose,
                    other => {
                        return Err(self.error(format!(
                            "unexpected {} in expression",
                            other.describe()
                        )));
                    }
                };
                self.advance();
                let right = self.parse_expr(prec)?;
                let span = left.span.join(right.span);
                Ok(Expr::new(
                    ExprKind::Infix {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    /// Whether the current token can begin an expression.
    fn expr_starts_here(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Int(_)
                | TokenKind::Decimal(_)
                | TokenKind::Str(_)
                | TokenKind::Ident(_)
                | TokenKind::Placeholder
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Nil
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::HashBrace
                | TokenKind::Pipe
                | TokenKind::PipePipe
                | TokenKind::If
                | TokenKind::Match
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    fn parse_prefix(&mut self) -> EmberResult<Expr> {
        let token = self.current().clone();
        let span = token.span;

        // A bare operator directly before an argument/list terminator is an
        // operator reference.
        if let Some(op) = Self::operator_ref(&token.kind) {
            if matches!(
                self.peek().kind,
                TokenKind::Comma
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::Semi
                    | TokenKind::Eof
            ) {
                self.advance();
                return Ok(Expr::new(ExprKind::OperatorRef(op), span));
            }
        }

        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), span))
            }
            TokenKind::Decimal(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Decimal(n), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::new(ExprKind::Nil, span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Ident(name), span))
            }
            TokenKind::Placeholder => {
                self.advance();
                Ok(Expr::new(ExprKind::Placeholder, span))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_expr(Precedence::Factor)?;
                let span = span.join(operand.span);
                Ok(Expr::new(
                    ExprKind::Prefix {
                        op: PrefixOp::Neg,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_expr(Precedence::Factor)?;
                let span = span.join(operand.span);
                Ok(Expr::new(
                    ExprKind::Prefix {
                        op: PrefixOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(Precedence::Lowest)?;
                self.expect(&TokenKind::RParen, "to close parenthesised expression")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_set(),
            TokenKind::HashBrace => self.parse_dict(),
            TokenKind::Pipe | TokenKind::PipePipe => self.parse_function(),
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            other => Err(self.error(format!(
                "expected an expression, found {}",
                other.describe()
            ))),
        }
    }

    fn operator_ref(kind: &TokenKind) -> Option<InfixOp> {
        Some(match kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Sub,
            TokenKind::Star => InfixOp::Mul,
            TokenKind::Slash => InfixOp::Div,
            TokenKind::Percent => InfixOp::Rem,
            TokenKind::EqEq => InfixOp::Eq,
            TokenKind::BangEq => InfixOp::Ne,
            TokenKind::Lt => InfixOp::Lt,
            TokenKind::Le => InfixOp::Le,
            TokenKind::Gt => InfixOp::Gt,
            TokenKind::Ge => InfixOp::Ge,
            _ => return None,
        })
    }

    fn parse_list(&mut self) -> EmberResult<Expr> {
        let start = self.advance().span; // `[`
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_element()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket, "to close list literal")?.span;
        Ok(Expr::new(ExprKind::List(elements), start.join(end)))
    }

    fn parse_set(&mut self) -> EmberResult<Expr> {
        let start = self.advance().span; // `{`
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            elements.push(self.parse_element()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "to close set literal")?.span;
        Ok(Expr::new(ExprKind::Set(elements), start.join(end)))
    }

    /// A list/set element: an expression or a `..spread`.
    fn parse_element(&mut self) -> EmberResult<Expr> {
        if self.check(&TokenKind::DotDot) {
            let start = self.advance().span;
            let inner = self.parse_expr(Precedence::Lowest)?;
            let span = start.join(inner.span);
            Ok(Expr::new(ExprKind::Spread(Box::new(inner)), span))
        } else {
            self.parse_expr(Precedence::Lowest)
        }
    }

    fn parse_dict(&mut self) -> EmberResult<Expr> {
        let start = self.advance().span; // `#{`
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::DotDot) {
                self.advance();
                entries.push(DictEntry::Spread(self.parse_expr(Precedence::Lowest)?));
            } else {
                let key = self.parse_expr(Precedence::Lowest)?;
                self.expect(&TokenKind::Colon, "after dict key")?;
                let value = self.parse_expr(Precedence::Lowest)?;
                entries.push(DictEntry::Pair(key, value));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "to close dict literal")?.span;
        Ok(Expr::new(ExprKind::Dict(entries), start.join(end)))
    }

    fn parse_function(&mut self) -> EmberResult<Expr> {
        let start = self.current().span;
        let mut params = Vec::new();

        if self.check(&TokenKind::PipePipe) {
            self.advance();
        } else {
            self.advance(); // `|`
            while !self.check(&TokenKind::Pipe) {
                params.push(self.parse_param()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Pipe, "to close parameter list")?;
        }

        let body = self.parse_body_expr()?;
        let span = start.join(body.span);
        Ok(Expr::new(
            ExprKind::Function {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_param(&mut self) -> EmberResult<Param> {
        let token = self.current().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Param {
                    kind: ParamKind::Named(name),
                    span,
                })
            }
            TokenKind::Placeholder => {
                self.advance();
                Ok(Param {
                    kind: ParamKind::Placeholder,
                    span,
                })
            }
            TokenKind::DotDot => {
                self.advance();
                let name_token = self.expect(
                    &TokenKind::Ident(Arc::from("")),
                    "as rest parameter name",
                )?;
                let TokenKind::Ident(name) = name_token.kind else {
                    unreachable!("expect() returned a non-identifier");
                };
                Ok(Param {
                    kind: ParamKind::Rest(name),
                    span: span.join(name_token.span),
                })
            }
            TokenKind::LBracket => {
                let pattern = self.parse_pattern()?;
                let span = pattern.span;
                Ok(Param {
                    kind: ParamKind::Pattern(pattern),
                    span,
                })
            }
            other => Err(self.error(format!(
                "expected a parameter, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_if(&mut self) -> EmberResult<Expr> {
        let start = self.advance().span; // `if`

        if self.eat(&TokenKind::Let) {
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::Assign, "after if-let pattern")?;
            let value = self.parse_expr(Precedence::Lowest)?;
            let then_branch = self.parse_block()?;
            let else_branch = self.parse_else()?;
            let span = else_branch
                .as_ref()
                .map_or(start.join(then_branch.span), |e: &Expr| start.join(e.span));
            return Ok(Expr::new(
                ExprKind::IfLet {
                    pattern,
                    value: Box::new(value),
                    then_branch: Box::new(then_branch),
                    else_branch: else_branch.map(Box::new),
                },
                span,
            ));
        }

        let condition = self.parse_expr(Precedence::Lowest)?;
        let then_branch = self.parse_block()?;
        let else_branch = self.parse_else()?;
        let span = else_branch
            .as_ref()
            .map_or(start.join(then_branch.span), |e: &Expr| start.join(e.span));
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            span,
        ))
    }

    fn parse_else(&mut self) -> EmberResult<Option<Expr>> {
        if !self.eat(&TokenKind::Else) {
            return Ok(None);
        }
        if self.check(&TokenKind::If) {
            Ok(Some(self.parse_if()?))
        } else {
            Ok(Some(self.parse_block()?))
        }
    }

    fn parse_match(&mut self) -> EmberResult<Expr> {
        let start = self.advance().span; // `match`
        let subject = self.parse_expr(Precedence::Lowest)?;
        self.expect(&TokenKind::LBrace, "to open match arms")?;

        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let pattern = self.parse_pattern()?;
            let guard = if self.eat(&TokenKind::If) {
                Some(self.parse_expr(Precedence::Lowest)?)
            } else {
                None
            };
            let body = self.parse_block()?;
            let span = pattern.span.join(body.span);
            arms.push(MatchArm {
                pattern,
                guard,
                body,
                span,
            });
            while self.eat(&TokenKind::Comma) {}
        }

        let end = self.expect(&TokenKind::RBrace, "to close match arms")?.span;
        if arms.is_empty() {
            return Err(EmberError::Parse {
                message: "match expression has no arms".to_string(),
                span: start.join(end),
            });
        }
        Ok(Expr::new(
            ExprKind::Match {
                subject: Box::new(subject),
                arms,
            },
            start.join(end),
        ))
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    fn parse_pattern(&mut self) -> EmberResult<Pattern> {
        let token = self.current().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Placeholder => {
                self.advance();
                Ok(Pattern::new(PatternKind::Wildcard, span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Pattern::new(PatternKind::Ident(name), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Pattern::new(PatternKind::Str(s), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Pattern::new(PatternKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Pattern::new(PatternKind::Bool(false), span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Pattern::new(PatternKind::Nil, span))
            }
            TokenKind::Int(_) | TokenKind::Minus => self.parse_int_pattern(),
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                let mut saw_rest = false;
                while !self.check(&TokenKind::RBracket) {
                    if self.check(&TokenKind::DotDot) {
                        let rest_start = self.advance().span;
                        if saw_rest {
                            return Err(EmberError::Parse {
                                message: "list pattern may contain at most one rest"
                                    .to_string(),
                                span: rest_start,
                            });
                        }
                        saw_rest = true;
                        let name = if let TokenKind::Ident(name) = &self.current().kind {
                            let name = name.clone();
                            self.advance();
                            Some(name)
                        } else {
                            None
                        };
                        items.push(Pattern::new(PatternKind::Rest(name), rest_start));
                    } else {
                        items.push(self.parse_pattern()?);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self
                    .expect(&TokenKind::RBracket, "to close list pattern")?
                    .span;
                Ok(Pattern::new(PatternKind::List(items), span.join(end)))
            }
            other => Err(self.error(format!(
                "expected a pattern, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_int_pattern(&mut self) -> EmberResult<Pattern> {
        let start = self.current().span;
        let value = self.parse_pattern_int()?;

        if self.check(&TokenKind::DotDot) || self.check(&TokenKind::DotDotEq) {
            let inclusive = self.advance().kind == TokenKind::DotDotEq;
            let end_start = self.current().span;
            let end = self.parse_pattern_int()?;
            return Ok(Pattern::new(
                PatternKind::Range {
                    start: value,
                    end,
                    inclusive,
                },
                start.join(end_start),
            ));
        }

        Ok(Pattern::new(PatternKind::Int(value), start))
    }

    fn parse_pattern_int(&mut self) -> EmberResult<i64> {
        let negative = self.eat(&TokenKind::Minus);
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(if negative { -n } else { n }),
            other => Err(EmberError::Parse {
                message: format!("expected integer in pattern, found {}", other.describe()),
                span: token.span,
            }),
        }
    }
}
