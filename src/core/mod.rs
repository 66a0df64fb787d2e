//! Core types for the Schematron compiler.
//!
//! This module contains the foundational pieces every other module builds on:
//! - Error types
//! - Parameter values and option maps
//! - The owned XML tree
//! - Document sources and locator resolution

pub mod error;
pub mod source;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use error::{
    CompilationError, ConfigurationError, PipelineError, ProgramError, SchematronError, StageError,
    TreeError, ValidationError, XPathError,
};
pub use source::Source;
pub use tree::{Document, NodeId, QName};
pub use types::{CompilerOptions, Parameters, Value};
