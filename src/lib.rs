//! An embeddable Forth-83 style interpreter.
//!
//! All interpreter state lives in a single flat 64K byte image: registers,
//! input buffer, both stacks, and a linked dictionary of definitions. The
//! host surface is intentionally small: feed a line of source text to
//! [`ForthRuntime::interpret`], read results back with
//! [`ForthRuntime::pop`], and receive every character of output through the
//! write sink supplied at construction.
//!
//! ```
//! use f83::ForthRuntime;
//!
//! let mut forth = ForthRuntime::with_output(Box::new(|_| ()));
//! forth.cold_start();
//! forth.interpret(": sq DUP * ;  6 sq");
//! assert_eq!(forth.pop().unwrap(), 36.0);
//! ```

pub mod error;
pub mod kernel;
pub mod runtime;

mod internals;

pub use error::VmError;
pub use runtime::ForthRuntime;
