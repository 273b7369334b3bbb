//! Sandboxed interpreter for the Python subset used by the micro-challenges.
//!
//! The pipeline is the usual one: [`parse`] runs the ruff parser and lowers its
//! tree into the interpreter's own [`ast`] (this is also the syntax check, nothing
//! is executed), and [`eval`] walks the tree. Output from `print()` goes through a [`PrintWriter`]
//! so callers can capture it; runaway programs are stopped by [`ResourceLimits`].
//!
//! The interpreter has no filesystem, network, process or import machinery
//! beyond a tiny `math` module, so student code cannot reach the host.

pub mod ast;
mod builtins;
mod error;
mod eval;
mod format;
mod io;
mod num;
pub mod parse;
mod resource;
mod value;

pub use error::{ExcType, Exception, SyntaxError};
pub use eval::{Fault, Interpreter, RunOutput};
pub use io::{CollectedOutput, PrintWriter};
pub use resource::ResourceLimits;
pub use value::Value;

/// Parses `source` without executing it.
///
/// Used by the validator for syntax checks and realtime feedback.
pub fn check_syntax(source: &str) -> Result<(), SyntaxError> {
    parse::parse(source).map(|_| ())
}
