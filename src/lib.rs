//! Ahead-of-time compiler for `data` / `do` / `route` / `migration` blocks.
//!
//! Source files are tokenized, parsed and merged across imports ([`dsl`]),
//! then lowered into a generated server module with inlined validators and
//! dialect-specific SQL, plus a type-declaration artifact ([`codegen`]).

pub mod codegen;
pub mod describe;
pub mod dsl;
pub mod error;
pub mod logging;
pub mod paths;
pub mod project;
pub mod settings;
