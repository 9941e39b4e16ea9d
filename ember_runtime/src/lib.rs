//! Runtime value contract.
//!
//! The compiled code never re-implements value semantics: every arithmetic,
//! comparison, collection and truthiness decision dispatches through this
//! crate. The VM in `ember_vm` executes instructions against these
//! operations; the compiler knows nothing beyond the contract's existence.

pub mod ops;
pub mod value;

pub use value::{BuiltinRef, Closure, Memoized, RangeValue, Value};
