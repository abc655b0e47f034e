//! # ddlc
//!
//! A front-end for a small data-description language. Source files declare
//! structs, unions, enums, flag sets and procedure signatures; `ddlc` turns
//! them into one resolved declaration graph and hands each top-level
//! declaration to user-supplied generator callbacks. Writing the generated
//! code is up to the callbacks.
//!
//! ## Core Components
//!
//! - **Lexer** (`lexer`): Splits source text into tokens that borrow from the buffer.
//! - **Parser** (`parser`): Builds declaration nodes into a [`Context`], recovering after syntax errors.
//! - **AST** (`ast`) and **Context** (`context`): The node arena, symbol table and error stack.
//! - **Patch** (`patch`): Links type references to declarations once every file is parsed.
//! - **Materialize** (`materialize`): Copies names out of the source buffers.
//! - **Generators** (`generators`): The callback trait and the dispatcher.
//! - **Driver** (`driver`): Runs the phases in order and reports errors.
//!
//! ## Example
//!
//! ```rust
//! use ddlc::driver::{ExitStatus, RunOptions, Session};
//! use ddlc::generators::outline::OutlineGenerator;
//!
//! let mut outline = OutlineGenerator::new(Vec::<u8>::new(), None);
//! let mut session = Session::new(RunOptions::default(), &mut outline, Vec::<String>::new());
//!
//! session.parse_source("shapes.ddl", "Shape: struct { kind: Kind; size: f32; }");
//! session.parse_source("kinds.ddl", "Kind: enum { Circle, Square }");
//!
//! let report = session.finish().unwrap();
//! assert_eq!(report.status, ExitStatus::Success);
//!
//! let text = String::from_utf8(outline.into_inner()).unwrap();
//! assert!(text.starts_with("struct Shape\n    kind: Kind\n"));
//! ```

pub mod ast;
pub mod context;
pub mod driver;
pub mod error;
pub mod generators;
pub mod lexer;
pub mod materialize;
pub mod parser;
pub mod patch;

pub use ast::{NodeId, NodeKind, NodeRef};
pub use context::{Context, ContextConfig};
pub use driver::{ExitPolicy, ExitStatus, RunOptions, Session, run};
pub use generators::{Generator, GeneratorError};
