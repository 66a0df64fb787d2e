//! Validation results and the SVRL report tree.

use crate::core::tree::{Document, NodeId, NodeKind, QName};
use crate::validation::program::{CheckKind, PatternProgram, RuleProgram, ValidationProgram};
use crate::xpath::NodeRef;
use serde::Serialize;
use std::time::Duration;

/// Namespace of SVRL report elements.
pub const SVRL_NS: &str = "http://purl.oclc.org/dsdl/svrl";

/// A check that fired: a failed assert or a successful report.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// Assert or report
    pub kind: CheckKind,
    /// Check identifier
    pub id: Option<String>,
    /// Check role
    pub role: Option<String>,
    /// Check flag
    pub flag: Option<String>,
    /// Test expression as written
    pub test: String,
    /// Location path of the context node
    pub location: String,
    /// Identifier of the enclosing pattern
    pub pattern: Option<String>,
    /// Identifier of the enclosing rule
    pub rule: Option<String>,
    /// Rendered, whitespace-normalized message
    pub message: String,
}

/// A rule that handled a context node.
#[derive(Debug, Clone, Serialize)]
pub struct FiredRule {
    /// Identifier of the enclosing pattern
    pub pattern: Option<String>,
    /// Rule identifier
    pub rule: Option<String>,
    /// Context pattern as written
    pub context: String,
    /// Location path of the context node
    pub location: String,
}

/// Outcome of validating one document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Locator of the validated document
    pub document: Option<String>,
    /// Phase the program was compiled for
    pub phase: String,
    /// Identifiers of the patterns that ran
    pub active_patterns: Vec<String>,
    /// Rules that fired, in evaluation order
    pub fired_rules: Vec<FiredRule>,
    /// Asserts whose test was false
    pub failed_asserts: Vec<Finding>,
    /// Reports whose test was true
    pub successful_reports: Vec<Finding>,
    /// Wall time spent validating
    pub duration_ms: u64,
    #[serde(skip)]
    svrl: Document,
}

impl ValidationResult {
    /// No failed asserts and no successful reports.
    pub fn is_valid(&self) -> bool {
        self.failed_asserts.is_empty() && self.successful_reports.is_empty()
    }

    /// All findings: failed asserts first, then successful reports.
    pub fn validation_messages(&self) -> impl Iterator<Item = &Finding> {
        self.failed_asserts.iter().chain(self.successful_reports.iter())
    }

    /// The report as an SVRL tree.
    pub fn svrl(&self) -> &Document {
        &self.svrl
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} fired rule(s), {} failed assert(s), {} successful report(s)",
            if self.is_valid() { "valid" } else { "invalid" },
            self.fired_rules.len(),
            self.failed_asserts.len(),
            self.successful_reports.len()
        )
    }
}

/// Accumulates findings and mirrors them into an SVRL tree.
pub(crate) struct ReportBuilder {
    svrl: Document,
    output: NodeId,
    document: Option<String>,
    phase: String,
    active_patterns: Vec<String>,
    fired_rules: Vec<FiredRule>,
    failed_asserts: Vec<Finding>,
    successful_reports: Vec<Finding>,
}

impl ReportBuilder {
    pub fn new(document: Option<&str>, program: &ValidationProgram) -> Self {
        let mut svrl = Document::new();
        let root = svrl.root();
        let output = svrl.append_element(root, svrl_name("schematron-output"));
        svrl.set_attribute(output, QName::local("phase"), program.phase());
        if let Some(title) = program.title() {
            svrl.set_attribute(output, QName::local("title"), title);
        }
        for (prefix, uri) in program.static_context().namespaces() {
            if prefix == "xml" {
                continue;
            }
            let ns = svrl.append_element(output, svrl_name("ns-prefix-in-attribute-values"));
            svrl.set_attribute(ns, QName::local("prefix"), prefix);
            svrl.set_attribute(ns, QName::local("uri"), uri);
        }

        Self {
            svrl,
            output,
            document: document.map(str::to_string),
            phase: program.phase().to_string(),
            active_patterns: Vec::new(),
            fired_rules: Vec::new(),
            failed_asserts: Vec::new(),
            successful_reports: Vec::new(),
        }
    }

    pub fn active_pattern(&mut self, pattern: &PatternProgram) {
        let el = self.svrl.append_element(self.output, svrl_name("active-pattern"));
        set_optional(&mut self.svrl, el, "id", pattern.id.as_deref());
        set_optional(&mut self.svrl, el, "name", pattern.name.as_deref());
        set_optional(&mut self.svrl, el, "document", self.document.as_deref());
        self.active_patterns.push(pattern.id.clone().unwrap_or_default());
    }

    pub fn fired_rule(&mut self, pattern: &PatternProgram, rule: &RuleProgram, location: String) {
        let el = self.svrl.append_element(self.output, svrl_name("fired-rule"));
        self.svrl.set_attribute(el, QName::local("context"), rule.context.source());
        set_optional(&mut self.svrl, el, "id", rule.id.as_deref());
        set_optional(&mut self.svrl, el, "role", rule.role.as_deref());
        set_optional(&mut self.svrl, el, "flag", rule.flag.as_deref());
        self.fired_rules.push(FiredRule {
            pattern: pattern.id.clone(),
            rule: rule.id.clone(),
            context: rule.context.source().to_string(),
            location,
        });
    }

    pub fn finding(&mut self, finding: Finding) {
        let local = match finding.kind {
            CheckKind::Assert => "failed-assert",
            CheckKind::Report => "successful-report",
        };
        let el = self.svrl.append_element(self.output, svrl_name(local));
        self.svrl.set_attribute(el, QName::local("test"), finding.test.as_str());
        self.svrl.set_attribute(el, QName::local("location"), finding.location.as_str());
        set_optional(&mut self.svrl, el, "id", finding.id.as_deref());
        set_optional(&mut self.svrl, el, "role", finding.role.as_deref());
        set_optional(&mut self.svrl, el, "flag", finding.flag.as_deref());
        let text = self.svrl.append_element(el, svrl_name("text"));
        self.svrl.append_text(text, &finding.message);

        match finding.kind {
            CheckKind::Assert => self.failed_asserts.push(finding),
            CheckKind::Report => self.successful_reports.push(finding),
        }
    }

    pub fn finish(self, elapsed: Duration) -> ValidationResult {
        ValidationResult {
            document: self.document,
            phase: self.phase,
            active_patterns: self.active_patterns,
            fired_rules: self.fired_rules,
            failed_asserts: self.failed_asserts,
            successful_reports: self.successful_reports,
            duration_ms: elapsed.as_millis() as u64,
            svrl: self.svrl,
        }
    }
}

fn svrl_name(local: &str) -> QName {
    QName::ns(SVRL_NS, Some("svrl"), local)
}

fn set_optional(doc: &mut Document, el: NodeId, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        doc.set_attribute(el, QName::local(name), value);
    }
}

/// Location path of a node, such as `/order[1]/item[2]/@qty`.
pub fn location(doc: &Document, node: NodeRef) -> String {
    let (element, attribute) = match node {
        NodeRef::Node(id) => (id, None),
        NodeRef::Attribute(id, index) => (id, Some(&doc.attributes(id)[index].name)),
    };

    let mut steps = Vec::new();
    let mut current = Some(element);
    while let Some(id) = current {
        let parent = doc.parent(id);
        if let Some(parent) = parent {
            steps.push(step(doc, parent, id));
        }
        current = parent;
    }
    steps.reverse();

    let mut path = String::new();
    for s in &steps {
        path.push('/');
        path.push_str(s);
    }
    if let Some(name) = attribute {
        path.push_str("/@");
        path.push_str(&name.qualified());
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

fn step(doc: &Document, parent: NodeId, id: NodeId) -> String {
    let same_kind = |other: NodeId| match (doc.kind(id), doc.kind(other)) {
        (NodeKind::Element(a), NodeKind::Element(b)) => a.name.local == b.name.local && a.name.namespace == b.name.namespace,
        (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
    };
    let position = doc
        .children(parent)
        .iter()
        .take_while(|&&c| c != id)
        .filter(|&&c| same_kind(c))
        .count()
        + 1;

    match doc.kind(id) {
        NodeKind::Element(e) => format!("{}[{}]", e.name.qualified(), position),
        NodeKind::Text(_) => format!("text()[{}]", position),
        NodeKind::Comment(_) => format!("comment()[{}]", position),
        NodeKind::ProcessingInstruction { .. } => format!("processing-instruction()[{}]", position),
        NodeKind::Document => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_paths() {
        let doc = Document::parse(r#"<order><item/><note/><item qty="2">t</item></order>"#, None).unwrap();
        let order = doc.document_element().unwrap();
        let items: Vec<_> = doc.child_elements(order).collect();

        assert_eq!(location(&doc, NodeRef::Node(doc.root())), "/");
        assert_eq!(location(&doc, NodeRef::Node(order)), "/order[1]");
        assert_eq!(location(&doc, NodeRef::Node(items[2])), "/order[1]/item[2]");
        assert_eq!(location(&doc, NodeRef::Attribute(items[2], 0)), "/order[1]/item[2]/@qty");
        let text = doc.children(items[2])[0];
        assert_eq!(location(&doc, NodeRef::Node(text)), "/order[1]/item[2]/text()[1]");
    }
}
