use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tsincr_diagnostic::StructuredError;

/// Failure of the resolve capability.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Cannot find module '{specifier}' from '{}'", .context.display())]
    NotFound { specifier: String, context: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    PackageJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("error while reading config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("instance '{instance}' already exists with different options")]
    ConflictingOptions { instance: String },

    #[error("could not load compiler '{name}'")]
    UnknownCompiler { name: String },

    #[error("cannot resolve '{specifier}' imported from {}: {source}", .from.display())]
    Resolve {
        specifier: String,
        from: PathBuf,
        #[source]
        source: ResolveError,
    },

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no output produced for {}", .path.display())]
    NoOutput { path: PathBuf },

    #[error(
        "could not find output file {} for {} from a referenced project; build the referenced project first",
        .output.display(),
        .input.display()
    )]
    ReferencedOutputMissing { input: PathBuf, output: PathBuf },
}

impl EngineError {
    /// The file the error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            EngineError::Config { path, .. }
            | EngineError::Read { path, .. }
            | EngineError::NoOutput { path } => Some(path),
            EngineError::Resolve { from, .. } => Some(from),
            EngineError::ReferencedOutputMissing { input, .. } => Some(input),
            EngineError::ConflictingOptions { .. } | EngineError::UnknownCompiler { .. } => None,
        }
    }

    pub fn to_structured_error(&self, context: &Path) -> StructuredError {
        StructuredError::engine(
            self.to_string(),
            self.path().map(|path| path.display().to_string()),
            context,
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
