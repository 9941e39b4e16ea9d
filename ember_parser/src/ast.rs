//! Abstract syntax tree definitions.
//!
//! Every node owns its children and carries a source span. Trees are
//! immutable once constructed: the desugar passes build new trees rather than
//! mutating in place. All enums here are closed variant sets — every consumer
//! matches exhaustively so that a new node kind is a compile error downstream,
//! never a silent miss.

use ember_core::Span;
use std::sync::Arc;

// =============================================================================
// Program
// =============================================================================

/// A whole source file.
#[derive(Debug, Clone)]
pub struct Program {
    /// Top-level statements.
    pub stmts: Vec<Stmt>,
    /// Span of the whole input.
    pub span: Span,
}

impl Program {
    /// Create a new program.
    #[must_use]
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { stmts, span }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// A statement node.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// The statement kind.
    pub kind: StmtKind,
    /// Source span.
    pub span: Span,
}

impl Stmt {
    /// Create a new statement.
    #[must_use]
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement kinds.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Expression statement; the last one in a block is the block's value.
    Expr(Box<Expr>),
    /// `let` / `let mut` binding with an optional destructuring pattern.
    Let {
        /// Whether the binding may be reassigned.
        mutable: bool,
        /// Binding pattern (identifier or list destructure).
        pattern: Pattern,
        /// Bound value.
        value: Box<Expr>,
    },
    /// `return expr?` — legal only inside a function literal.
    Return(Option<Box<Expr>>),
    /// `break expr?` — legal only inside a breakable builtin's argument.
    Break(Option<Box<Expr>>),
    /// Top-level `name: expr` section.
    Section {
        /// Section name.
        name: Arc<str>,
        /// Section value expression (compiled to a thunk).
        value: Box<Expr>,
    },
    /// Top-level `test: { name: expr, ... }` block.
    TestBlock {
        /// Entries, each with its own scope.
        entries: Vec<SectionEntry>,
    },
}

/// One `name: expr` entry inside a test block.
#[derive(Debug, Clone)]
pub struct SectionEntry {
    /// Entry name.
    pub name: Arc<str>,
    /// Entry value expression.
    pub value: Expr,
    /// Source span of the whole entry.
    pub span: Span,
}

// =============================================================================
// Expressions
// =============================================================================

/// An expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    /// The expression kind.
    pub kind: ExprKind,
    /// Source span.
    pub span: Span,
}

impl Expr {
    /// Create a new expression.
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    // === Literals ===
    /// Integer literal.
    Int(i64),
    /// Decimal literal.
    Decimal(f64),
    /// String literal.
    Str(Arc<str>),
    /// Boolean literal.
    Bool(bool),
    /// `nil`.
    Nil,

    // === Names and sugar ===
    /// Identifier reference.
    Ident(Arc<str>),
    /// The placeholder `_`; eliminated by the placeholder desugar pass.
    Placeholder,
    /// A bare operator in value position (`fold(0, +)`); eliminated by the
    /// placeholder desugar pass.
    OperatorRef(InfixOp),

    // === Operators ===
    /// Prefix operation.
    Prefix {
        /// The operator.
        op: PrefixOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Infix operation. `Pipeline` and `Compose` only survive until the
    /// pipeline desugar pass.
    Infix {
        /// The operator.
        op: InfixOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Assignment to a `let mut` binding; evaluates to the assigned value.
    Assign {
        /// Target binding name.
        name: Arc<str>,
        /// New value.
        value: Box<Expr>,
    },

    // === Composite values ===
    /// Function call.
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Positional arguments.
        args: Vec<Expr>,
    },
    /// Collection indexing.
    Index {
        /// The collection.
        collection: Box<Expr>,
        /// The key or index.
        index: Box<Expr>,
    },
    /// Range literal `a..b`, `a..=b` or unbounded `a..`.
    Range {
        /// Start bound.
        start: Box<Expr>,
        /// End bound; `None` for an unbounded range.
        end: Option<Box<Expr>>,
        /// Whether the end is inclusive.
        inclusive: bool,
    },
    /// List literal; elements may be `Spread`.
    List(Vec<Expr>),
    /// Set literal; elements may be `Spread`.
    Set(Vec<Expr>),
    /// Dict literal.
    Dict(Vec<DictEntry>),
    /// `..expr` inside a list/set literal.
    Spread(Box<Expr>),

    // === Functions and control flow ===
    /// Function literal.
    Function {
        /// Ordered parameter list.
        params: Vec<Param>,
        /// Body expression (commonly a block).
        body: Box<Expr>,
    },
    /// Block expression; value of the last statement.
    Block(Vec<Stmt>),
    /// `if cond { .. } else { .. }` — an expression.
    If {
        /// Condition.
        condition: Box<Expr>,
        /// Then branch.
        then_branch: Box<Expr>,
        /// Else branch (`else if` nests another `If` here).
        else_branch: Option<Box<Expr>>,
    },
    /// `if let pat = value { .. } else { .. }`.
    IfLet {
        /// Pattern to test.
        pattern: Pattern,
        /// Scrutinised value.
        value: Box<Expr>,
        /// Branch taken when the pattern matches; pattern names are in scope.
        then_branch: Box<Expr>,
        /// Branch taken otherwise.
        else_branch: Option<Box<Expr>>,
    },
    /// `match subject { pattern [if guard] { .. }, ... }`.
    Match {
        /// Scrutinised value.
        subject: Box<Expr>,
        /// Arms, tried in order.
        arms: Vec<MatchArm>,
    },
}

/// One entry of a dict literal.
#[derive(Debug, Clone)]
pub enum DictEntry {
    /// `key: value`.
    Pair(Expr, Expr),
    /// `..expr` merging another dict.
    Spread(Expr),
}

/// One arm of a match expression.
#[derive(Debug, Clone)]
pub struct MatchArm {
    /// Pattern to test against the subject.
    pub pattern: Pattern,
    /// Optional guard, evaluated with the pattern's bindings in scope.
    pub guard: Option<Expr>,
    /// Arm body.
    pub body: Expr,
    /// Source span of the whole arm.
    pub span: Span,
}

// =============================================================================
// Parameters
// =============================================================================

/// A function-literal parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// The parameter kind.
    pub kind: ParamKind,
    /// Source span.
    pub span: Span,
}

/// Parameter kinds.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// Ordinary named parameter.
    Named(Arc<str>),
    /// Rest parameter `..name`, collecting remaining arguments into a list.
    Rest(Arc<str>),
    /// Ignored parameter `_`.
    Placeholder,
    /// Destructuring parameter; eliminated by the pattern-parameter desugar
    /// pass.
    Pattern(Pattern),
}

// =============================================================================
// Patterns
// =============================================================================

/// A pattern node, used by `let` destructuring, `if let` and `match`.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The pattern kind.
    pub kind: PatternKind,
    /// Source span.
    pub span: Span,
}

impl Pattern {
    /// Create a new pattern.
    #[must_use]
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Pattern kinds.
#[derive(Debug, Clone)]
pub enum PatternKind {
    /// `_` — matches anything, binds nothing.
    Wildcard,
    /// Binds the matched value to a name.
    Ident(Arc<str>),
    /// Integer literal pattern.
    Int(i64),
    /// String literal pattern.
    Str(Arc<str>),
    /// Boolean literal pattern.
    Bool(bool),
    /// `nil` pattern.
    Nil,
    /// Integer range pattern `lo..hi` / `lo..=hi`.
    Range {
        /// Lower bound (inclusive).
        start: i64,
        /// Upper bound.
        end: i64,
        /// Whether the upper bound is inclusive.
        inclusive: bool,
    },
    /// List destructure; at most one `Rest` item.
    List(Vec<Pattern>),
    /// `..` or `..name` inside a list pattern.
    Rest(Option<Arc<str>>),
}

impl PatternKind {
    /// Names bound by this pattern, in binding order.
    pub fn collect_bindings(&self, out: &mut Vec<Arc<str>>) {
        match self {
            PatternKind::Ident(name) => out.push(name.clone()),
            PatternKind::Rest(Some(name)) => out.push(name.clone()),
            PatternKind::List(items) => {
                for item in items {
                    item.kind.collect_bindings(out);
                }
            }
            PatternKind::Wildcard
            | PatternKind::Int(_)
            | PatternKind::Str(_)
            | PatternKind::Bool(_)
            | PatternKind::Nil
            | PatternKind::Range { .. }
            | PatternKind::Rest(None) => {}
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// Numeric negation.
    Neg,
    /// Logical not.
    Not,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` (short-circuit)
    And,
    /// `||` (short-circuit)
    Or,
    /// `|>` — eliminated by the pipeline desugar pass.
    Pipeline,
    /// `>>` — eliminated by the pipeline desugar pass.
    Compose,
}

impl InfixOp {
    /// Surface symbol, used in error messages and synthesized lambda display.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Rem => "%",
            InfixOp::Eq => "==",
            InfixOp::Ne => "!=",
            InfixOp::Lt => "<",
            InfixOp::Le => "<=",
            InfixOp::Gt => ">",
            InfixOp::Ge => ">=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
            InfixOp::Pipeline => "|>",
            InfixOp::Compose => ">>",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_bindings_in_order() {
        let span = Span::default();
        let pat = PatternKind::List(vec![
            Pattern::new(PatternKind::Ident(Arc::from("a")), span),
            Pattern::new(PatternKind::Wildcard, span),
            Pattern::new(PatternKind::Rest(Some(Arc::from("rest"))), span),
        ]);
        let mut names = Vec::new();
        pat.collect_bindings(&mut names);
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, vec!["a", "rest"]);
    }
}
