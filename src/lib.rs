//! # Schematron - Rule-based XML validation
//!
//! Schematron compiles a rule schema once, through an ordered pipeline of
//! rewriting stages, into a validation program, and validates any number of
//! XML documents with it.
//!
//! ## Features
//!
//! - **Dialect selection**: the schema's `queryBinding` picks the stage list
//! - **Pluggable stages**: stage identifiers are resolved through a [`StageResolver`](stages::StageResolver)
//! - **Option broadcast**: every compiler option reaches every stage
//! - **Lazy, shared validator**: built once per compiled schema, safe to use from many threads
//! - **SVRL reports**: findings are also rendered as an SVRL tree
//!
//! ## Quick Start
//!
//! ```rust
//! use schematron::prelude::*;
//!
//! let schema = Source::from_xml(
//!     r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
//!          <pattern id="orders">
//!            <rule context="item">
//!              <assert test="@qty &gt; 0">Item <value-of select="@sku"/> needs a quantity</assert>
//!            </rule>
//!          </pattern>
//!        </schema>"#,
//! );
//!
//! let compiled = Schematron::new(schema).unwrap();
//! assert_eq!(compiled.dialect(), Dialect::Legacy);
//!
//! let result = compiled
//!     .validate(&Source::from_xml(r#"<order><item sku="a1" qty="0"/></order>"#))
//!     .unwrap();
//! assert!(!result.is_valid());
//! assert_eq!(result.failed_asserts[0].message, "Item a1 needs a quantity");
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: errors, parameter values, the XML tree and document sources
//! - [`pipeline`]: dialect selection, stages and the sequential executor
//! - [`stages`]: the stage registry and the built-in include, expand and compile stages
//! - [`xpath`]: the expression language used by rules
//! - [`validation`]: program binding, the validator, its cache and reports
//! - [`engine`]: the shared handle that loads, resolves and binds
//! - [`schematron`]: the compiler tying it together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod discovery;
pub mod engine;
pub mod pipeline;
pub mod schematron;
pub mod stages;
pub mod validation;
pub mod xpath;

pub use crate::schematron::{Schematron, SchematronBuilder};

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust
/// use schematron::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::source::Source;
    pub use crate::core::tree::Document;
    pub use crate::core::types::{CompilerOptions, Parameters, Value};

    // Errors
    pub use crate::core::error::{
        CompilationError, ConfigurationError, SchematronError, StageError, ValidationError,
    };

    // Pipeline
    pub use crate::pipeline::{Dialect, Pipeline, Stage, StageProgram};
    pub use crate::stages::{StageRegistry, StageResolver};

    // Compiler and validation
    pub use crate::engine::TransformEngine;
    pub use crate::schematron::{Schematron, SchematronBuilder};
    pub use crate::validation::{Finding, ValidationResult, Validator};

    // Configuration
    pub use crate::config::SchematronConfig;
    pub use crate::discovery::DocumentDiscovery;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "schematron");
    }

    #[test]
    fn test_default_registry_covers_both_dialects() {
        let registry = StageRegistry::with_builtins();
        for dialect in [Dialect::Legacy, Dialect::Modern] {
            for id in dialect.steps() {
                assert!(registry.contains(id), "missing stage {}", id);
            }
        }
    }

    #[test]
    fn test_modern_schema_end_to_end() {
        let schema = Source::from_xml(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron" queryBinding="xslt2">
                 <pattern>
                   <rule context="item">
                     <report test="ends-with(@sku, '-old')">Item <value-of select="upper-case(@sku)"/> is retired</report>
                   </rule>
                 </pattern>
               </schema>"#,
        );
        let compiled = Schematron::new(schema).unwrap();
        assert_eq!(compiled.dialect(), Dialect::Modern);

        let result = compiled
            .validate(&Source::from_xml(r#"<order><item sku="a1"/><item sku="b2-old"/></order>"#))
            .unwrap();
        assert_eq!(result.successful_reports.len(), 1);
        assert_eq!(result.successful_reports[0].message, "Item B2-OLD is retired");
    }
}
