//! Query-binding detection and stage selection.

use crate::core::error::ConfigurationError;
use crate::core::tree::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute on the schema root that declares the query language.
pub const QUERY_BINDING: &str = "queryBinding";

const LEGACY_STEPS: [&str; 3] = [
    "urn:schematron:pipeline:1.0:include",
    "urn:schematron:pipeline:1.0:expand",
    "urn:schematron:pipeline:1.0:compile",
];

const MODERN_STEPS: [&str; 3] = [
    "urn:schematron:pipeline:2.0:include",
    "urn:schematron:pipeline:2.0:expand",
    "urn:schematron:pipeline:2.0:compile",
];

/// The rule-expression sub-language a schema declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `queryBinding` absent or `xslt`: XPath 1.0 expressions.
    Legacy,
    /// `queryBinding` `xslt2` or `xslt3`: XPath 2.0 style expressions.
    Modern,
}

impl Dialect {
    /// Map a query-binding token (case-insensitive) to a dialect.
    pub fn from_query_binding(token: &str) -> Result<Self, ConfigurationError> {
        match token.to_lowercase().as_str() {
            "" | "xslt" => Ok(Dialect::Legacy),
            "xslt2" | "xslt3" => Ok(Dialect::Modern),
            other => Err(ConfigurationError::UnsupportedDialect {
                query_binding: other.to_string(),
            }),
        }
    }

    /// Read the dialect off the schema's document element.
    pub fn detect(schema: &Document) -> Result<Self, ConfigurationError> {
        Self::from_query_binding(query_binding(schema))
    }

    /// Ordered stage identifiers for this dialect.
    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            Dialect::Legacy => &LEGACY_STEPS,
            Dialect::Modern => &MODERN_STEPS,
        }
    }

    /// Canonical query-binding token.
    pub fn token(&self) -> &'static str {
        match self {
            Dialect::Legacy => "xslt",
            Dialect::Modern => "xslt2",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

fn query_binding(schema: &Document) -> &str {
    schema
        .document_element()
        .and_then(|root| schema.attribute(root, QUERY_BINDING))
        .unwrap_or("")
}

/// Choose the dialect and its step list for a loaded schema.
pub fn select_steps(schema: &Document) -> Result<(Dialect, Vec<String>), ConfigurationError> {
    let binding = query_binding(schema).to_lowercase();
    let dialect = Dialect::from_query_binding(&binding)?;
    let steps: Vec<String> = dialect.steps().iter().map(|s| s.to_string()).collect();

    log::info!(
        "Query binding '{}' found, using {}",
        binding,
        steps.join(", ")
    );

    Ok((dialect, steps))
}
