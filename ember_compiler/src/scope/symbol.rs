//! Scope and binding bookkeeping, plus the fixed builtin name table.

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The kind of construct that opened a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level program scope.
    Program,
    /// Function-literal body.
    Function,
    /// Plain block.
    Block,
    /// Match arm.
    MatchArm,
    /// `if let` then-branch.
    IfLet,
    /// One test-block entry.
    TestEntry,
}

/// Flags for binding classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingFlags(u16);

impl BindingFlags {
    /// No flags.
    pub const NONE: BindingFlags = BindingFlags(0);
    /// Declared by a `let` or parameter.
    pub const DEF: BindingFlags = BindingFlags(1 << 0);
    /// Declared `mut`.
    pub const MUT: BindingFlags = BindingFlags(1 << 1);
    /// Pre-declared by resolver phase 1 (forward-reference support).
    pub const HOISTED: BindingFlags = BindingFlags(1 << 2);
    /// Value is a function literal (or a call wrapping one).
    pub const FUNCTION: BindingFlags = BindingFlags(1 << 3);
    /// A top-level section name.
    pub const SECTION: BindingFlags = BindingFlags(1 << 4);

    /// Check whether all bits of `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: BindingFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BindingFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        BindingFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BindingFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One declared name.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Classification flags.
    pub flags: BindingFlags,
}

impl Binding {
    /// Whether the binding may be assigned to.
    #[inline]
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(BindingFlags::MUT)
    }
}

/// A set of declared names for one lexical construct.
#[derive(Debug)]
pub struct Scope {
    /// Scope kind.
    pub kind: ScopeKind,
    /// Declared names.
    pub names: FxHashMap<Arc<str>, Binding>,
}

impl Scope {
    /// Create an empty scope.
    #[must_use]
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            names: FxHashMap::default(),
        }
    }

    /// Declare a name, merging flags on redeclaration.
    pub fn declare(&mut self, name: Arc<str>, flags: BindingFlags) {
        self.names
            .entry(name)
            .and_modify(|b| b.flags = flags | BindingFlags::DEF)
            .or_insert(Binding {
                flags: flags | BindingFlags::DEF,
            });
    }

    /// Look up a name in this scope only.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.names.get(name)
    }
}

/// Builtin names known to the resolver. User bindings may shadow these —
/// deliberate compatibility behavior, the scope stack always wins.
pub const BUILTIN_NAMES: &[&str] = &[
    "abs", "each", "filter", "first", "fold", "get", "keys", "list", "map", "max", "memoize",
    "min", "push", "puts", "reduce", "rest", "scan", "size", "skip", "take", "type", "values",
];

/// The iteration builtins whose call arguments form a `break` boundary.
pub const BREAKABLE_BUILTINS: &[&str] = &["each", "fold", "reduce", "scan"];

/// Whether `name` is a builtin.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.binary_search(&name).is_ok()
}

/// Whether `name` is a breakable iteration builtin.
#[must_use]
pub fn is_breakable(name: &str) -> bool {
    BREAKABLE_BUILTINS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_sorted() {
        let mut sorted = BUILTIN_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, BUILTIN_NAMES, "binary_search requires sorted names");
    }

    #[test]
    fn test_breakable_is_subset_of_builtins() {
        for name in BREAKABLE_BUILTINS {
            assert!(is_builtin(name), "{name} must be a builtin");
        }
    }

    #[test]
    fn test_binding_flags() {
        let flags = BindingFlags::DEF | BindingFlags::MUT;
        assert!(flags.contains(BindingFlags::MUT));
        assert!(!flags.contains(BindingFlags::HOISTED));
    }

    #[test]
    fn test_scope_declare_and_lookup() {
        let mut scope = Scope::new(ScopeKind::Block);
        scope.declare(Arc::from("x"), BindingFlags::MUT);
        assert!(scope.lookup("x").unwrap().is_mutable());
        assert!(scope.lookup("y").is_none());
    }
}
