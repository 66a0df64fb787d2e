//! Final stage: turn an expanded schema into a validation program tree.
//!
//! The output is a document in [`PROGRAM_NS`]:
//!
//! ```text
//! <program dialect="xslt" phase="#ALL" title="...">
//!   <namespace prefix="x" uri="urn:x"/>
//!   <variable name="max" select="10"/>
//!   <pattern id="p" name="...">
//!     <rule context="item" id="r1">
//!       <variable name="n" select="@n"/>
//!       <assert test="@n &lt;= $max" id="a1"><message>too big: <value-of select="@n"/></message></assert>
//!       <report test="...">...</report>
//!     </rule>
//!   </pattern>
//! </program>
//! ```

use crate::core::error::StageError;
use crate::core::tree::{Document, NodeId, NodeKind, QName};
use crate::core::types::Parameters;
use crate::pipeline::stage::Stage;
use crate::pipeline::Dialect;
use crate::stages::{is_abstract, sch_children, PROGRAM_NS, SCHEMATRON_NS};

/// Phase name selecting every pattern.
pub const ALL_PHASE: &str = "#ALL";

/// Phase name deferring to the schema's `@defaultPhase`.
pub const DEFAULT_PHASE: &str = "#DEFAULT";

/// Compiles `sch:schema` into a validation program.
pub struct CompileStage {
    dialect: Dialect,
}

impl CompileStage {
    /// Create the compile stage for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Stage for CompileStage {
    fn name(&self) -> &str {
        match self.dialect {
            Dialect::Legacy => "compile (xslt)",
            Dialect::Modern => "compile (xslt2)",
        }
    }

    fn transform(&self, input: &Document, parameters: &Parameters) -> Result<Document, StageError> {
        let schema = input
            .document_element()
            .filter(|&n| input.is_element(n, SCHEMATRON_NS, "schema"))
            .ok_or_else(|| StageError::InvalidSchema("document element must be sch:schema".to_string()))?;

        let (phase, active) = resolve_phase(input, schema, parameters)?;

        let mut out = Document::new();
        let root = out.root();
        let program = out.append_element(root, program_name("program"));
        out.set_attribute(program, QName::local("dialect"), self.dialect.token());
        out.set_attribute(program, QName::local("phase"), phase.as_str());
        if let Some(title) = sch_children(input, schema, "title").next() {
            let title = normalize_space(&input.string_value(title));
            out.set_attribute(program, QName::local("title"), title);
        }

        for ns in sch_children(input, schema, "ns") {
            let prefix = required(input, ns, "prefix", "sch:ns")?;
            let uri = required(input, ns, "uri", "sch:ns")?;
            let el = out.append_element(program, program_name("namespace"));
            out.set_attribute(el, QName::local("prefix"), prefix);
            out.set_attribute(el, QName::local("uri"), uri);
        }

        emit_lets(input, schema, &mut out, program)?;
        if let Some(active) = &active {
            emit_lets(input, active.node, &mut out, program)?;
        }

        let mut emitted = 0;
        for pattern in sch_children(input, schema, "pattern") {
            if is_abstract(input, pattern) {
                continue;
            }
            if let Some(active) = &active {
                let id = input.attribute(pattern, "id").unwrap_or_default();
                if !active.patterns.iter().any(|p| p == id) {
                    continue;
                }
            }
            compile_pattern(input, pattern, &mut out, program)?;
            emitted += 1;
        }

        log::debug!("Compiled {} pattern(s) for phase '{}'", emitted, phase);
        Ok(out)
    }
}

struct ActivePhase {
    node: NodeId,
    patterns: Vec<String>,
}

/// Resolve the requested phase. `None` for the active set means every pattern.
fn resolve_phase(
    doc: &Document,
    schema: NodeId,
    parameters: &Parameters,
) -> Result<(String, Option<ActivePhase>), StageError> {
    let requested = parameters
        .phase()
        .filter(|p| !p.is_empty() && *p != DEFAULT_PHASE)
        .map(str::to_string);
    let phase = requested
        .or_else(|| doc.attribute(schema, "defaultPhase").map(str::to_string))
        .unwrap_or_else(|| ALL_PHASE.to_string());

    if phase == ALL_PHASE {
        return Ok((phase, None));
    }

    let node = sch_children(doc, schema, "phase")
        .find(|&p| doc.attribute(p, "id") == Some(phase.as_str()))
        .ok_or_else(|| StageError::UnknownPhase(phase.clone()))?;
    let patterns = sch_children(doc, node, "active")
        .filter_map(|a| doc.attribute(a, "pattern"))
        .map(str::to_string)
        .collect();

    Ok((phase, Some(ActivePhase { node, patterns })))
}

fn compile_pattern(doc: &Document, pattern: NodeId, out: &mut Document, parent: NodeId) -> Result<(), StageError> {
    let el = out.append_element(parent, program_name("pattern"));
    copy_attributes(doc, pattern, out, el, &["id"]);
    if let Some(title) = sch_children(doc, pattern, "title").next() {
        out.set_attribute(el, QName::local("name"), normalize_space(&doc.string_value(title)));
    }

    emit_lets(doc, pattern, out, el)?;
    for rule in sch_children(doc, pattern, "rule") {
        if is_abstract(doc, rule) {
            continue;
        }
        compile_rule(doc, rule, out, el)?;
    }
    Ok(())
}

fn compile_rule(doc: &Document, rule: NodeId, out: &mut Document, parent: NodeId) -> Result<(), StageError> {
    let context = required(doc, rule, "context", "sch:rule")?;
    let el = out.append_element(parent, program_name("rule"));
    out.set_attribute(el, QName::local("context"), context);
    copy_attributes(doc, rule, out, el, &["id", "role", "flag"]);

    emit_lets(doc, rule, out, el)?;
    for child in doc.child_elements(rule) {
        let kind = if doc.is_element(child, SCHEMATRON_NS, "assert") {
            "assert"
        } else if doc.is_element(child, SCHEMATRON_NS, "report") {
            "report"
        } else {
            continue;
        };

        let test = required(doc, child, "test", &format!("sch:{}", kind))?;
        let check = out.append_element(el, program_name(kind));
        out.set_attribute(check, QName::local("test"), test);
        copy_attributes(doc, child, out, check, &["id", "role", "flag"]);

        let message = out.append_element(check, program_name("message"));
        compile_message(doc, child, out, message)?;
    }
    Ok(())
}

/// Flatten assertion content into text, `value-of` and `name` parts.
fn compile_message(doc: &Document, node: NodeId, out: &mut Document, message: NodeId) -> Result<(), StageError> {
    for &child in doc.children(node) {
        match doc.kind(child) {
            NodeKind::Text(text) => {
                out.append_text(message, text);
            }
            NodeKind::Element(_) if doc.is_element(child, SCHEMATRON_NS, "value-of") => {
                let select = required(doc, child, "select", "sch:value-of")?;
                let el = out.append_element(message, program_name("value-of"));
                out.set_attribute(el, QName::local("select"), select);
            }
            NodeKind::Element(_) if doc.is_element(child, SCHEMATRON_NS, "name") => {
                let el = out.append_element(message, program_name("name"));
                out.set_attribute(el, QName::local("path"), doc.attribute(child, "path").unwrap_or("."));
            }
            // emph, dir, span and foreign markup contribute their text only.
            NodeKind::Element(_) => compile_message(doc, child, out, message)?,
            _ => {}
        }
    }
    Ok(())
}

fn emit_lets(doc: &Document, scope: NodeId, out: &mut Document, parent: NodeId) -> Result<(), StageError> {
    for let_node in sch_children(doc, scope, "let") {
        let name = required(doc, let_node, "name", "sch:let")?;
        let value = required(doc, let_node, "value", &format!("sch:let '{}'", name))?;
        let el = out.append_element(parent, program_name("variable"));
        out.set_attribute(el, QName::local("name"), name);
        out.set_attribute(el, QName::local("select"), value);
    }
    Ok(())
}

fn copy_attributes(doc: &Document, from: NodeId, out: &mut Document, to: NodeId, names: &[&str]) {
    for name in names {
        if let Some(value) = doc.attribute(from, name) {
            out.set_attribute(to, QName::local(*name), value);
        }
    }
}

fn required<'a>(doc: &'a Document, node: NodeId, attribute: &str, what: &str) -> Result<&'a str, StageError> {
    doc.attribute(node, attribute)
        .ok_or_else(|| StageError::InvalidSchema(format!("{} requires an @{} attribute", what, attribute)))
}

fn program_name(local: &str) -> QName {
    QName::ns(PROGRAM_NS, None, local)
}

pub(crate) fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
