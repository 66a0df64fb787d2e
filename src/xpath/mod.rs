//! XPath expression engine used by validation programs.
//!
//! Expressions are compiled once against a [`StaticContext`] (dialect and
//! namespace bindings) and evaluated many times with an [`Evaluator`].
//!
//! # Example
//!
//! ```
//! use schematron::core::tree::Document;
//! use schematron::pipeline::Dialect;
//! use schematron::xpath::{Evaluator, NodeRef, StaticContext, Variables, XPath};
//!
//! let doc = Document::parse("<order><item qty='2'/><item qty='3'/></order>", None).unwrap();
//! let total = XPath::compile("sum(//item/@qty)", &StaticContext::new(Dialect::Legacy)).unwrap();
//! let value = Evaluator::new(&doc)
//!     .evaluate(&total, NodeRef::Node(doc.root()), &Variables::new())
//!     .unwrap();
//! assert_eq!(value, schematron::xpath::XValue::Number(5.0));
//! ```

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use eval::{Evaluator, NodeRef, Variables, XValue};
pub use parser::Expr;

use crate::core::error::XPathResult;
use crate::core::tree::XML_NS;
use crate::pipeline::Dialect;
use indexmap::IndexMap;
use lexer::Lexer;
use parser::{PathExpr, PathStart, Parser, Step};
use std::fmt;

/// Maximum nesting depth for parsing and evaluation.
pub const MAX_DEPTH: usize = 128;

/// Compile-time context: dialect and in-scope namespace prefixes.
#[derive(Debug, Clone)]
pub struct StaticContext {
    /// Dialect deciding which functions are available
    pub dialect: Dialect,
    namespaces: IndexMap<String, String>,
}

impl StaticContext {
    /// A context with only the `xml` prefix bound.
    pub fn new(dialect: Dialect) -> Self {
        let mut namespaces = IndexMap::new();
        namespaces.insert("xml".to_string(), XML_NS.to_string());
        Self { dialect, namespaces }
    }

    /// Bind `prefix` to `uri`, replacing an earlier binding.
    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    /// URI bound to `prefix`.
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// All prefix bindings in declaration order.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// A compiled expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    /// Tokenize, parse and check `source`.
    pub fn compile(source: &str, context: &StaticContext) -> XPathResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        let expr = Parser::new(tokens, context).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Compile `source` as a match pattern; see [`XPath::as_pattern`].
    pub fn compile_pattern(source: &str, context: &StaticContext) -> XPathResult<Self> {
        Ok(Self::compile(source, context)?.as_pattern())
    }

    /// The expression text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Rewrite into a selection of every node the pattern matches.
    ///
    /// Relative location paths are anchored at the root with a leading
    /// `descendant-or-self::node()` step, so `item` selects the same nodes as
    /// `//item`. Absolute paths and other expressions are kept as written.
    /// Union branches are rewritten independently.
    pub fn as_pattern(&self) -> Self {
        Self {
            source: self.source.clone(),
            expr: anchor(self.expr.clone()),
        }
    }
}

fn anchor(expr: Expr) -> Expr {
    match expr {
        Expr::Union(left, right) => Expr::Union(Box::new(anchor(*left)), Box::new(anchor(*right))),
        Expr::Path(PathExpr {
            start: PathStart::Context,
            steps,
        }) => {
            let mut anchored = Vec::with_capacity(steps.len() + 1);
            anchored.push(Step::descendant_or_self());
            anchored.extend(steps);
            Expr::Path(PathExpr {
                start: PathStart::Root,
                steps: anchored,
            })
        }
        other => other,
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::Document;

    #[test]
    fn test_pattern_anchoring() {
        let context = StaticContext::new(Dialect::Legacy);
        let doc = Document::parse("<a><b/><c><b/></c></a>", None).unwrap();
        let evaluator = Evaluator::new(&doc);
        let root = NodeRef::Node(doc.root());
        let vars = Variables::new();

        let relative = XPath::compile_pattern("b", &context).unwrap();
        assert_eq!(evaluator.select(&relative, root, &vars).unwrap().len(), 2);

        let absolute = XPath::compile_pattern("/a/b", &context).unwrap();
        assert_eq!(evaluator.select(&absolute, root, &vars).unwrap().len(), 1);

        let union = XPath::compile_pattern("a | c/b", &context).unwrap();
        assert_eq!(evaluator.select(&union, root, &vars).unwrap().len(), 2);
        assert_eq!(union.source(), "a | c/b");
    }

    #[test]
    fn test_xml_prefix_always_bound() {
        let context = StaticContext::new(Dialect::Legacy);
        assert_eq!(context.namespace("xml"), Some(XML_NS));
        assert!(XPath::compile("@xml:lang", &context).is_ok());
    }
}
