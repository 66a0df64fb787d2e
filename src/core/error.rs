//! Error types for the Schematron compiler.
//!
//! Uses thiserror for structured errors with context. The three kinds a caller
//! has to tell apart are:
//! - [`ConfigurationError`]: bad setup, raised before anything is compiled
//! - [`CompilationError`]: loading, resolving, running or binding the pipeline failed
//! - [`ValidationError`]: running a document through a built validator failed
//!
//! The remaining types are the causes those kinds wrap.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum SchematronError {
    /// Invalid setup.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The schema could not be compiled.
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    /// A document could not be validated.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O failure outside document loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors in how a compiler instance was set up.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// No schema was given to the builder.
    #[error("A schema source is required")]
    MissingSchema,

    /// The schema's `queryBinding` names no known dialect.
    #[error("Unsupported query language: '{query_binding}'")]
    UnsupportedDialect {
        /// The rejected binding token.
        query_binding: String,
    },

    /// A configuration value is malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("Failed to read configuration file {path}: {error}")]
    ConfigFile {
        /// The file.
        path: PathBuf,
        /// Reason it was rejected.
        error: String,
    },
}

/// Errors raised while turning a schema into a validation program.
#[derive(Error, Debug)]
pub enum CompilationError {
    /// The schema source could not be loaded.
    #[error("Error loading the schema: {0}")]
    Load(#[source] TreeError),

    /// A stage identifier could not be resolved.
    #[error("Error resolving pipeline stage '{stage}': {source}")]
    Resolution {
        /// The unresolved stage identifier.
        stage: String,
        /// Why resolution failed.
        #[source]
        source: StageError,
    },

    /// A stage failed while running.
    #[error("Error compiling schema to validation program: {0}")]
    Stage(#[from] PipelineError),

    /// The compiled artifact could not be bound.
    #[error("Error compiling validation program: {0}")]
    Binding(#[from] ProgramError),
}

/// Errors raised while validating a document with a built validator.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The instance document could not be loaded.
    #[error("Error loading document: {0}")]
    Load(#[from] TreeError),

    /// A rule expression failed at run time.
    #[error("Error evaluating '{expression}': {source}")]
    Evaluation {
        /// The failing expression.
        expression: String,
        /// Evaluation failure.
        #[source]
        source: XPathError,
    },
}

/// Errors loading or parsing an XML tree.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The file could not be read.
    #[error("Failed to read {path}: {error}")]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The text is not well-formed XML.
    #[error("Malformed XML{}: {message}", .origin.as_ref().map(|o| format!(" in {}", o)).unwrap_or_default())]
    Parse {
        /// System identifier of the text, when known.
        origin: Option<String>,
        /// Parser message.
        message: String,
    },
}

/// Errors raised by a single pipeline stage, or while resolving one.
#[derive(Error, Debug)]
pub enum StageError {
    /// Nothing is registered under the identifier.
    #[error("No stage registered for '{id}'")]
    NotFound {
        /// The requested identifier.
        id: String,
    },

    /// The stage is registered but disabled.
    #[error("Stage '{id}' is disabled")]
    Disabled {
        /// The disabled identifier.
        id: String,
    },

    /// An included document could not be loaded.
    #[error("Cannot include '{href}': {reason}")]
    Include {
        /// The reference as written.
        href: String,
        /// Why loading failed.
        reason: String,
    },

    /// Includes or extends form a cycle.
    #[error("Circular reference through '{0}'")]
    Cycle(String),

    /// The schema structure is invalid.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The requested phase is not declared.
    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    /// Any other stage failure.
    #[error("{0}")]
    Failed(String),
}

/// A stage failure with the position of the stage in its pipeline.
#[derive(Error, Debug)]
#[error("stage {index} ('{stage}') failed: {source}")]
pub struct PipelineError {
    /// Position of the failing stage.
    pub index: usize,
    /// Identifier of the failing stage.
    pub stage: String,
    /// What went wrong.
    #[source]
    pub source: StageError,
}

/// Errors binding a compiled artifact into an executable program.
#[derive(Error, Debug)]
pub enum ProgramError {
    /// The artifact does not have the program structure.
    #[error("Malformed validation program: {0}")]
    Malformed(String),

    /// An expression in the program does not compile.
    #[error("Invalid expression '{expression}': {source}")]
    Expression {
        /// The expression text.
        expression: String,
        /// Parse failure.
        #[source]
        source: XPathError,
    },

    /// The program names an unsupported dialect.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Errors from parsing or evaluating an XPath expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    /// The expression does not parse.
    #[error("Syntax error at offset {position}: {message}")]
    Syntax {
        /// Byte offset of the error.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// No such function in the dialect.
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of arguments.
    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Accepted argument counts.
        expected: String,
        /// Arguments given.
        got: usize,
    },

    /// Reference to an unbound variable.
    #[error("Variable '${0}' is not bound")]
    UnboundVariable(String),

    /// Reference to an undeclared prefix.
    #[error("Namespace prefix '{0}' is not declared")]
    UnknownPrefix(String),

    /// A node-set was required.
    #[error("Expected a node-set, got {0}")]
    NotANodeSet(String),

    /// Nesting exceeds the depth limit.
    #[error("Expression nesting exceeds {0} levels")]
    DepthExceeded(usize),
}

impl XPathError {
    /// Shorthand for a syntax error at `position`.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        XPathError::Syntax {
            position,
            message: message.into(),
        }
    }
}

impl CompilationError {
    /// Identifier of the stage involved, if the failure is tied to one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            CompilationError::Resolution { stage, .. } => Some(stage),
            CompilationError::Stage(e) => Some(&e.stage),
            _ => None,
        }
    }
}

impl SchematronError {
    /// Whether this error came from the configuration rather than from the schema content.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SchematronError::Configuration(_))
    }

    /// Whether this error came from compiling the schema.
    pub fn is_compilation(&self) -> bool {
        matches!(self, SchematronError::Compilation(_))
    }
}

/// Result type alias for top-level operations.
pub type SchematronResult<T> = Result<T, SchematronError>;

/// Result type alias for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type alias for expression operations.
pub type XPathResult<T> = Result<T, XPathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_stage() {
        let error = CompilationError::Stage(PipelineError {
            index: 1,
            stage: "urn:test:expand".to_string(),
            source: StageError::Failed("boom".to_string()),
        });
        assert_eq!(error.stage(), Some("urn:test:expand"));
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_error_kinds() {
        let error: SchematronError = ConfigurationError::UnsupportedDialect {
            query_binding: "xslt4".to_string(),
        }
        .into();
        assert!(error.is_configuration());
        assert!(!error.is_compilation());
        assert!(error.to_string().contains("xslt4"));
    }

    #[test]
    fn test_parse_error_display() {
        let error = TreeError::Parse {
            origin: Some("a.sch".to_string()),
            message: "unexpected end".to_string(),
        };
        assert_eq!(error.to_string(), "Malformed XML in a.sch: unexpected end");
    }
}
