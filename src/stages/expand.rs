//! Abstract pattern and abstract rule expansion.

use crate::core::error::StageError;
use crate::core::tree::{Document, NodeId, NodeKind};
use crate::core::types::Parameters;
use crate::pipeline::stage::Stage;
use crate::pipeline::Dialect;
use crate::stages::{is_abstract, sch_children, SCHEMATRON_NS};
use std::collections::HashMap;

/// Instantiates abstract patterns and inlines abstract rules.
///
/// - `sch:extends/@rule` is replaced by the children of the abstract rule with that id.
/// - `sch:pattern/@is-a` becomes a copy of the abstract pattern, with every
///   `$param` in attribute values replaced by the matching `sch:param/@value`.
/// - Abstract rules and patterns are dropped from the output.
pub struct ExpandStage {
    dialect: Dialect,
}

impl ExpandStage {
    /// Create the expand stage for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Stage for ExpandStage {
    fn name(&self) -> &str {
        match self.dialect {
            Dialect::Legacy => "expand (xslt)",
            Dialect::Modern => "expand (xslt2)",
        }
    }

    fn transform(&self, input: &Document, _parameters: &Parameters) -> Result<Document, StageError> {
        let expander = Expander::collect(input);
        let mut out = Document::new();
        let root = out.root();
        expander.copy(input.root(), &mut out, root, &[], &mut Vec::new())?;
        Ok(out)
    }
}

struct Expander<'a> {
    src: &'a Document,
    rules: HashMap<&'a str, NodeId>,
    patterns: HashMap<&'a str, NodeId>,
}

impl<'a> Expander<'a> {
    fn collect(src: &'a Document) -> Self {
        let mut rules = HashMap::new();
        let mut patterns = HashMap::new();
        for node in src.descendants(src.root()) {
            if !is_abstract(src, node) {
                continue;
            }
            let Some(id) = src.attribute(node, "id") else {
                continue;
            };
            if src.is_element(node, SCHEMATRON_NS, "rule") {
                rules.insert(id, node);
            } else if src.is_element(node, SCHEMATRON_NS, "pattern") {
                patterns.insert(id, node);
            }
        }
        Self { src, rules, patterns }
    }

    fn copy(
        &self,
        node: NodeId,
        out: &mut Document,
        parent: NodeId,
        params: &[(String, String)],
        active: &mut Vec<String>,
    ) -> Result<(), StageError> {
        let src = self.src;
        match src.kind(node) {
            NodeKind::Document => {
                for &child in src.children(node) {
                    self.copy(child, out, parent, params, active)?;
                }
            }
            NodeKind::Element(element) => {
                let is_sch = |local: &str| element.name.is(SCHEMATRON_NS, local);

                if (is_sch("rule") || is_sch("pattern")) && is_abstract(src, node) {
                    return Ok(());
                }
                if is_sch("pattern") && src.attribute(node, "is-a").is_some() {
                    return self.instantiate(node, out, parent, active);
                }
                if is_sch("extends") {
                    if let Some(rule) = src.attribute(node, "rule") {
                        return self.inline_rule(rule, out, parent, params, active);
                    }
                }

                let id = out.copy_node(parent, src, node);
                if !params.is_empty() {
                    for attr in &element.attributes {
                        out.set_attribute(id, attr.name.clone(), substitute(&attr.value, params));
                    }
                }
                for &child in src.children(node) {
                    self.copy(child, out, id, params, active)?;
                }
            }
            _ => {
                out.copy_node(parent, src, node);
            }
        }
        Ok(())
    }

    fn inline_rule(
        &self,
        rule: &str,
        out: &mut Document,
        parent: NodeId,
        params: &[(String, String)],
        active: &mut Vec<String>,
    ) -> Result<(), StageError> {
        let abstract_rule = *self
            .rules
            .get(rule)
            .ok_or_else(|| StageError::InvalidSchema(format!("no abstract rule with id '{}'", rule)))?;

        let key = format!("rule:{}", rule);
        if active.contains(&key) {
            return Err(StageError::Cycle(rule.to_string()));
        }
        active.push(key);
        for &child in self.src.children(abstract_rule) {
            self.copy(child, out, parent, params, active)?;
        }
        active.pop();
        Ok(())
    }

    fn instantiate(
        &self,
        node: NodeId,
        out: &mut Document,
        parent: NodeId,
        active: &mut Vec<String>,
    ) -> Result<(), StageError> {
        let src = self.src;
        let target = src.attribute(node, "is-a").unwrap_or_default();
        let abstract_pattern = *self.patterns.get(target).ok_or_else(|| {
            StageError::InvalidSchema(format!("no abstract pattern with id '{}'", target))
        })?;

        let key = format!("pattern:{}", target);
        if active.contains(&key) {
            return Err(StageError::Cycle(target.to_string()));
        }

        let mut params = Vec::new();
        for param in sch_children(src, node, "param") {
            let name = src.attribute(param, "name").ok_or_else(|| {
                StageError::InvalidSchema(format!("sch:param in pattern '{}' has no @name", target))
            })?;
            let value = src.attribute(param, "value").unwrap_or_default();
            params.push((name.to_string(), value.to_string()));
        }

        let pattern = out.copy_node(parent, src, node);
        out.remove_attribute(pattern, "is-a");

        active.push(key);
        for &child in src.children(node) {
            if !src.is_element(child, SCHEMATRON_NS, "param") {
                self.copy(child, out, pattern, &[], active)?;
            }
        }
        for &child in src.children(abstract_pattern) {
            self.copy(child, out, pattern, &params, active)?;
        }
        active.pop();
        Ok(())
    }
}

/// Replace `$name` references with parameter values.
///
/// A reference is `$` followed by a complete name; `$ab` is not touched by a
/// parameter called `a`.
fn substitute(text: &str, params: &[(String, String)]) -> String {
    if params.is_empty() || !text.contains('$') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let end = after
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let name = &after[..end];

        match params.iter().find(|(n, _)| n == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}
