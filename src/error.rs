use std::path::PathBuf;

use thiserror::Error;

use crate::codegen::EmitError;
use crate::dsl::error::SyntaxError;
use crate::dsl::resolver::ResolveError;
use crate::settings::ConfigError;

/// Everything that can fail a build. Each stage keeps its own error type and
/// converts into this one at the orchestration layer.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sample {}: {message}", path.display())]
    Sample { path: PathBuf, message: String },

    #[error("unknown schema `{0}`")]
    UnknownSchema(String),
}

impl BuildError {
    /// Process exit code for the CLI: 2 for problems in the sources, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Resolve(_) | BuildError::Syntax(_) | BuildError::Emit(_) | BuildError::UnknownSchema(_) => 2,
            BuildError::Config(_) | BuildError::Write { .. } | BuildError::Sample { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::HttpVerb;

    #[test]
    fn stage_errors_convert_and_keep_their_message() {
        let emit = EmitError::EmptyPipeline {
            verb: HttpVerb::Get,
            path: "/x".into(),
        };
        let message = emit.to_string();
        let err: BuildError = emit.into();
        assert_eq!(err.to_string(), message);
        assert_eq!(err.exit_code(), 2);
    }
}
