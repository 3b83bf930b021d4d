//! Tendril: a declarative pattern language for matching, extracting
//! from, and rewriting JSON-shaped trees.
//!
//! A pattern compiles once into an immutable [`Pattern`]; running it
//! against a [`Value`] yields a lazy [`SolutionStream`] of
//! [`Solution`]s: variable bindings plus precise occurrence references
//! back into the tree. Solutions drive projections (`extract`),
//! predicates (`matches`) and immutable rewrites (`replace_all`,
//! `edit`).
//!
//! ```
//! use tendril::{compile, tree};
//!
//! let pattern = compile("{ name: $x, % }").unwrap();
//! let data = tree!({"name": "Alice", "role": "admin"});
//! let bindings = pattern.extract(&data).unwrap().unwrap();
//! assert_eq!(bindings["x"], tree!("Alice"));
//! ```

pub mod ast;
pub mod edit;
pub mod error;
pub mod guard;
pub mod intern;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod matcher;
pub mod occurrence;
pub mod options;
pub mod parser;
pub mod pattern;
pub mod solution;
pub mod stream;
pub mod token;
pub mod value;

pub mod test_utils;

pub use edit::{Edit, EditOp, Plan};
pub use error::{
    CompileError, LowerError, LowerErrorKind, MatchError, MatchResult, ParseError, ParseErrorKind,
};
pub use occurrence::{OccurrenceRef, Path, Step};
pub use options::NormalForm;
pub use pattern::{compile, Pattern};
pub use solution::{Bindings, Solution};
pub use stream::SolutionStream;
pub use value::Value;

#[doc(hidden)]
pub use serde_json as __serde_json;
