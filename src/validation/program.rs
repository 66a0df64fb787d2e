//! Binding a compiled program tree into executable form.
//!
//! The compile stage emits a tree; binding walks it once, compiles every
//! expression against the program's dialect and namespaces, and keeps the
//! result in plain structs that are cheap to share between threads.

use crate::core::error::ProgramError;
use crate::core::tree::{Document, NodeId, NodeKind};
use crate::pipeline::Dialect;
use crate::stages::PROGRAM_NS;
use crate::xpath::{StaticContext, XPath};

/// A named variable and its defining expression.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Variable name, without `$`
    pub name: String,
    /// Defining expression
    pub select: XPath,
}

/// Whether a check fires on a false or on a true test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Fires when the test is false
    Assert,
    /// Fires when the test is true
    Report,
}

/// A piece of an assertion message.
#[derive(Debug, Clone)]
pub enum MessagePart {
    /// Literal text
    Text(String),
    /// String value of an expression
    ValueOf(XPath),
    /// Name of the node selected by an expression
    Name(XPath),
}

/// One assert or report.
#[derive(Debug, Clone)]
pub struct Check {
    /// Assert or report
    pub kind: CheckKind,
    /// Test expression
    pub test: XPath,
    /// Optional identifier
    pub id: Option<String>,
    /// Optional role
    pub role: Option<String>,
    /// Optional flag
    pub flag: Option<String>,
    /// Message template
    pub message: Vec<MessagePart>,
}

/// A rule: a context pattern, local variables and checks.
#[derive(Debug, Clone)]
pub struct RuleProgram {
    /// Optional identifier
    pub id: Option<String>,
    /// Context as a selection from the root
    pub context: XPath,
    /// Optional role
    pub role: Option<String>,
    /// Optional flag
    pub flag: Option<String>,
    /// Rule-level variables, bound per context node
    pub variables: Vec<Binding>,
    /// Asserts and reports in declaration order
    pub checks: Vec<Check>,
}

/// An active pattern.
#[derive(Debug, Clone)]
pub struct PatternProgram {
    /// Optional identifier
    pub id: Option<String>,
    /// Optional title
    pub name: Option<String>,
    /// Pattern-level variables
    pub variables: Vec<Binding>,
    /// Rules in priority order
    pub rules: Vec<RuleProgram>,
}

/// An executable validation program.
#[derive(Debug, Clone)]
pub struct ValidationProgram {
    dialect: Dialect,
    phase: String,
    title: Option<String>,
    context: StaticContext,
    globals: Vec<Binding>,
    patterns: Vec<PatternProgram>,
}

impl ValidationProgram {
    /// Bind a program tree produced by the compile stage.
    pub fn bind(program: &Document) -> Result<Self, ProgramError> {
        let root = program
            .document_element()
            .filter(|&n| program.is_element(n, PROGRAM_NS, "program"))
            .ok_or_else(|| ProgramError::Malformed("document element must be a program".to_string()))?;

        let dialect = Dialect::from_query_binding(program.attribute(root, "dialect").unwrap_or_default())?;
        let mut context = StaticContext::new(dialect);
        for ns in children(program, root, "namespace") {
            let prefix = required(program, ns, "prefix")?;
            let uri = required(program, ns, "uri")?;
            context.declare(prefix, uri);
        }

        let binder = Binder {
            doc: program,
            context: &context,
        };
        let globals = binder.variables(root)?;
        let patterns = children(program, root, "pattern")
            .map(|p| binder.pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        let bound = Self {
            dialect,
            phase: program.attribute(root, "phase").unwrap_or("#ALL").to_string(),
            title: program.attribute(root, "title").map(str::to_string),
            context,
            globals,
            patterns,
        };
        log::debug!(
            "Bound validation program: {} pattern(s), {} rule(s), phase '{}'",
            bound.patterns.len(),
            bound.rule_count(),
            bound.phase
        );
        Ok(bound)
    }

    /// Dialect the expressions were compiled for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Phase the program was compiled for.
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Schema title, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Namespace bindings and dialect.
    pub fn static_context(&self) -> &StaticContext {
        &self.context
    }

    /// Schema- and phase-level variables.
    pub fn globals(&self) -> &[Binding] {
        &self.globals
    }

    /// Active patterns in schema order.
    pub fn patterns(&self) -> &[PatternProgram] {
        &self.patterns
    }

    /// Total number of rules across patterns.
    pub fn rule_count(&self) -> usize {
        self.patterns.iter().map(|p| p.rules.len()).sum()
    }
}

struct Binder<'a> {
    doc: &'a Document,
    context: &'a StaticContext,
}

impl Binder<'_> {
    fn compile(&self, source: &str) -> Result<XPath, ProgramError> {
        XPath::compile(source, self.context).map_err(|source_error| ProgramError::Expression {
            expression: source.to_string(),
            source: source_error,
        })
    }

    fn variables(&self, scope: NodeId) -> Result<Vec<Binding>, ProgramError> {
        children(self.doc, scope, "variable")
            .map(|v| {
                Ok(Binding {
                    name: required(self.doc, v, "name")?.to_string(),
                    select: self.compile(required(self.doc, v, "select")?)?,
                })
            })
            .collect()
    }

    fn pattern(&self, node: NodeId) -> Result<PatternProgram, ProgramError> {
        Ok(PatternProgram {
            id: optional(self.doc, node, "id"),
            name: optional(self.doc, node, "name"),
            variables: self.variables(node)?,
            rules: children(self.doc, node, "rule")
                .map(|r| self.rule(r))
                .collect::<Result<_, _>>()?,
        })
    }

    fn rule(&self, node: NodeId) -> Result<RuleProgram, ProgramError> {
        let context = required(self.doc, node, "context")?;
        let mut checks = Vec::new();
        for child in self.doc.child_elements(node) {
            let kind = if self.doc.is_element(child, PROGRAM_NS, "assert") {
                CheckKind::Assert
            } else if self.doc.is_element(child, PROGRAM_NS, "report") {
                CheckKind::Report
            } else {
                continue;
            };
            checks.push(self.check(child, kind)?);
        }

        Ok(RuleProgram {
            id: optional(self.doc, node, "id"),
            context: self.compile(context)?.as_pattern(),
            role: optional(self.doc, node, "role"),
            flag: optional(self.doc, node, "flag"),
            variables: self.variables(node)?,
            checks,
        })
    }

    fn check(&self, node: NodeId, kind: CheckKind) -> Result<Check, ProgramError> {
        let mut message = Vec::new();
        if let Some(m) = children(self.doc, node, "message").next() {
            for &part in self.doc.children(m) {
                match self.doc.kind(part) {
                    NodeKind::Text(text) => message.push(MessagePart::Text(text.clone())),
                    NodeKind::Element(_) if self.doc.is_element(part, PROGRAM_NS, "value-of") => {
                        message.push(MessagePart::ValueOf(self.compile(required(self.doc, part, "select")?)?));
                    }
                    NodeKind::Element(_) if self.doc.is_element(part, PROGRAM_NS, "name") => {
                        let path = self.doc.attribute(part, "path").unwrap_or(".");
                        message.push(MessagePart::Name(self.compile(path)?));
                    }
                    _ => {}
                }
            }
        }

        Ok(Check {
            kind,
            test: self.compile(required(self.doc, node, "test")?)?,
            id: optional(self.doc, node, "id"),
            role: optional(self.doc, node, "role"),
            flag: optional(self.doc, node, "flag"),
            message,
        })
    }
}

fn children<'a>(doc: &'a Document, node: NodeId, local: &'a str) -> impl Iterator<Item = NodeId> + 'a {
    doc.child_elements(node)
        .filter(move |&c| doc.is_element(c, PROGRAM_NS, local))
}

fn required<'a>(doc: &'a Document, node: NodeId, attribute: &str) -> Result<&'a str, ProgramError> {
    doc.attribute(node, attribute).ok_or_else(|| {
        let element = doc.name(node).map(|n| n.local.clone()).unwrap_or_default();
        ProgramError::Malformed(format!("<{}> is missing @{}", element, attribute))
    })
}

fn optional(doc: &Document, node: NodeId, attribute: &str) -> Option<String> {
    doc.attribute(node, attribute).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::XPathError;

    fn program(body: &str, dialect: &str) -> Document {
        Document::parse(
            &format!(
                r##"<program xmlns="{}" dialect="{}" phase="#ALL">{}</program>"##,
                PROGRAM_NS, dialect, body
            ),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_bind_program() {
        let doc = program(
            r#"<namespace prefix="x" uri="urn:x"/>
               <variable name="max" select="3"/>
               <pattern id="p">
                 <rule context="x:item" id="r">
                   <variable name="n" select="count(*)"/>
                   <assert test="$n &lt;= $max" id="a"><message>too many: <value-of select="$n"/> in <name/></message></assert>
                   <report test="@legacy"><message>legacy</message></report>
                 </rule>
               </pattern>"#,
            "xslt",
        );
        let bound = ValidationProgram::bind(&doc).unwrap();
        assert_eq!(bound.dialect(), Dialect::Legacy);
        assert_eq!(bound.globals().len(), 1);
        assert_eq!(bound.rule_count(), 1);

        let rule = &bound.patterns()[0].rules[0];
        assert_eq!(rule.variables[0].name, "n");
        assert_eq!(rule.checks.len(), 2);
        assert_eq!(rule.checks[0].kind, CheckKind::Assert);
        assert_eq!(rule.checks[1].kind, CheckKind::Report);
        assert_eq!(rule.checks[0].message.len(), 4);
    }

    #[test]
    fn test_bad_expression() {
        let doc = program(
            r#"<pattern><rule context="a"><assert test="count("><message/></assert></rule></pattern>"#,
            "xslt",
        );
        let err = ValidationProgram::bind(&doc).unwrap_err();
        assert!(matches!(err, ProgramError::Expression { ref expression, .. } if expression == "count("));
    }

    #[test]
    fn test_modern_function_in_legacy_program() {
        let body = r#"<pattern><rule context="a"><assert test="exists(@id)"><message/></assert></rule></pattern>"#;
        let err = ValidationProgram::bind(&program(body, "xslt")).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Expression {
                source: XPathError::UnknownFunction(_),
                ..
            }
        ));
        assert!(ValidationProgram::bind(&program(body, "xslt2")).is_ok());
    }

    #[test]
    fn test_wrong_root() {
        let doc = Document::parse("<schema/>", None).unwrap();
        assert!(matches!(
            ValidationProgram::bind(&doc),
            Err(ProgramError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_dialect() {
        let err = ValidationProgram::bind(&program("", "xquery")).unwrap_err();
        assert!(matches!(err, ProgramError::Configuration(_)));
    }
}
