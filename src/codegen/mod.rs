//! Back end: lowers a merged [`SyntaxTree`] into a generated server module
//! and a type-declaration artifact.
//!
//! Everything here is a pure function of the tree and [`EmitOptions`]:
//! same input, byte-identical output.

pub mod dialect;
pub mod migrations;
pub mod server;
pub mod statements;
pub mod types;
pub mod validate;
pub mod writer;

use std::collections::HashSet;

use thiserror::Error;
use tracing::info;

use crate::dsl::ast::{HttpVerb, PipelineStep, SyntaxTree};

pub use dialect::Dialect;

/// Default import specifier of the runtime contract the generated module uses.
pub const DEFAULT_RUNTIME_MODULE: &str = "blocksmith/runtime";

/// Header line of every generated artifact.
pub const GENERATED_HEADER: &str = "// Generated by blocksmith. Do not edit.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("[emit] route {verb} {path}: unknown schema `{schema}` in validate step")]
    UnknownSchema { verb: HttpVerb, path: String, schema: String },

    #[error("[emit] route {verb} {path}: unknown action `{action}`")]
    UnknownAction { verb: HttpVerb, path: String, action: String },

    #[error("[emit] route {verb} {path}: pipeline has no action step")]
    EmptyPipeline { verb: HttpVerb, path: String },

    #[error("[emit] table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },

    #[error("[emit] migration {version}: no schema declares table `{table}`")]
    UnknownTable { version: String, table: String },

    #[error("[emit] {schema}.{field}: invalid pattern: {message}")]
    InvalidPattern { schema: String, field: String, message: String },

    #[error("[emit] {schema}.{field}: unknown format `{format}` (expected email, url or uuid)")]
    UnknownFormat { schema: String, field: String, format: String },

    #[error("[emit] action `{action}` (line {line}): {reason}")]
    InvalidActionName { action: String, line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    pub dialect: Dialect,
    /// Module specifier the generated code imports its runtime helpers from.
    pub runtime_module: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            runtime_module: DEFAULT_RUNTIME_MODULE.to_string(),
        }
    }
}

/// The two generated artifacts. Writing them is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub server_source: String,
    pub type_declarations: String,
}

/// Lower the whole tree. Fails before producing any text if a route
/// references an unknown schema or action, or has no action step, or if an
/// action's name or parameters cannot be declared in the generated module.
pub fn emit(tree: &SyntaxTree, options: &EmitOptions) -> Result<Artifacts, EmitError> {
    check_routes(tree)?;
    check_actions(tree)?;

    let server_source = server::emit_server(tree, options)?;
    let type_declarations = types::emit_type_declarations(tree);

    info!(
        dialect = %options.dialect,
        schemas = tree.schemas.len(),
        actions = tree.actions.len(),
        routes = tree.routes.len(),
        bytes = server_source.len(),
        "emitted server module"
    );

    Ok(Artifacts {
        server_source,
        type_declarations,
    })
}

/// Names in scope where route handlers call actions.
const HANDLER_LOCALS: [&str; 5] = ["db", "tables", "req", "ctx", "data"];

fn check_actions(tree: &SyntaxTree) -> Result<(), EmitError> {
    let mut generated: HashSet<String> = ["prepareTables", "createHandlers", "migrations"]
        .into_iter()
        .chain(server::RUNTIME_IMPORTS)
        .chain(HANDLER_LOCALS)
        .map(str::to_string)
        .collect();
    for schema in &tree.schemas {
        generated.insert(validate::validator_name(&schema.name));
        generated.insert(statements::statements_name(&schema.name));
        generated.insert(statements::columns_name(&schema.name));
        generated.insert(statements::list_query_name(&schema.name));
    }

    for action in &tree.actions {
        let invalid = |reason: String| EmitError::InvalidActionName {
            action: action.name.clone(),
            line: action.line,
            reason,
        };
        if writer::is_reserved_word(&action.name) {
            return Err(invalid(format!("`{}` is a reserved word", action.name)));
        }
        if generated.contains(&action.name) {
            return Err(invalid(format!("`{}` clashes with a generated name", action.name)));
        }
        let mut seen = HashSet::new();
        for param in &action.params {
            if writer::is_reserved_word(param) {
                return Err(invalid(format!("parameter `{param}` is a reserved word")));
            }
            if !seen.insert(param.as_str()) {
                return Err(invalid(format!("parameter `{param}` is declared twice")));
            }
        }
    }
    Ok(())
}

fn check_routes(tree: &SyntaxTree) -> Result<(), EmitError> {
    for route in &tree.routes {
        let mut actions = 0;
        for step in &route.pipeline {
            match step {
                PipelineStep::Auth => {}
                PipelineStep::Validate { schema } => {
                    if tree.schema(schema).is_none() {
                        return Err(EmitError::UnknownSchema {
                            verb: route.verb,
                            path: route.path.clone(),
                            schema: schema.clone(),
                        });
                    }
                }
                PipelineStep::Action { name } => {
                    if tree.action(name).is_none() {
                        return Err(EmitError::UnknownAction {
                            verb: route.verb,
                            path: route.path.clone(),
                            action: name.clone(),
                        });
                    }
                    actions += 1;
                }
            }
        }
        if actions == 0 {
            return Err(EmitError::EmptyPipeline {
                verb: route.verb,
                path: route.path.clone(),
            });
        }
    }
    Ok(())
}
