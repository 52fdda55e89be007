//! Build error taxonomy
//!
//! Route-level failures (`ConfigConflict`, `UnsupportedValue`) are isolated to
//! the route that produced them. `UnsafeRuntimeConstruct` aborts a production
//! build. `Internal` marks a logic bug and is never recovered from.

use std::fmt;

use thiserror::Error;

/// Errors produced while planning or post-processing a build
#[derive(Debug, Error)]
pub enum BuildError {
    /// Two mutually exclusive exports or settings in a single module
    #[error("{page}: {message}")]
    ConfigConflict { page: String, message: String },

    /// An exported config value that cannot be evaluated statically
    #[error("can't recognize the exported `{export}` field in \"{page}\": {reason}")]
    UnsupportedValue {
        page: String,
        export: String,
        reason: String,
    },

    /// Dynamic code evaluation or a Node.js API inside an edge bundle
    #[error("{module}: {message}")]
    UnsafeRuntimeConstruct {
        module: String,
        message: String,
        allow_listed: bool,
    },

    /// An import that could not be resolved, with the chain of importers
    #[error("Module not found: Can't resolve '{request}' in '{importer}'{}", ImportTraceDisplay(.import_trace))]
    ModuleNotFound {
        request: String,
        importer: String,
        import_trace: Vec<String>,
    },

    /// Invariant violation inside the build pipeline
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    pub fn conflict(page: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError::ConfigConflict {
            page: page.into(),
            message: message.into(),
        }
    }

    /// Whether this error only affects the route it was raised for
    pub fn is_route_scoped(&self) -> bool {
        matches!(
            self,
            BuildError::ConfigConflict { .. }
                | BuildError::UnsupportedValue { .. }
                | BuildError::ModuleNotFound { .. }
                | BuildError::Io(_)
        )
    }
}

struct ImportTraceDisplay<'a>(&'a [String]);

impl fmt::Display for ImportTraceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "\n\nImport trace for requested module:")?;
        for module in self.0 {
            write!(f, "\n{}", module)?;
        }
        Ok(())
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
