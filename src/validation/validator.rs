//! Running a bound program against instance documents.

use crate::core::error::{ValidationError, XPathError};
use crate::core::source::Source;
use crate::core::tree::Document;
use crate::core::types::Parameters;
use crate::validation::program::{Binding, CheckKind, Check, MessagePart, PatternProgram, ValidationProgram};
use crate::validation::report::{location, Finding, ReportBuilder, ValidationResult};
use crate::xpath::{Evaluator, NodeRef, Variables, XPath};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// A reusable validator. Cloning shares the bound program.
#[derive(Debug, Clone)]
pub struct Validator {
    program: Arc<ValidationProgram>,
}

impl Validator {
    /// Wrap a bound program.
    pub fn new(program: ValidationProgram) -> Self {
        Self {
            program: Arc::new(program),
        }
    }

    /// The program this validator runs.
    pub fn program(&self) -> &ValidationProgram {
        &self.program
    }

    /// Load `source` and validate it.
    pub fn validate(&self, source: &Source, parameters: Option<&Parameters>) -> Result<ValidationResult, ValidationError> {
        let document = source.load()?;
        self.validate_document(&document, parameters)
    }

    /// Validate an already loaded document.
    ///
    /// `parameters` are visible to every expression as variables and are
    /// shadowed by schema variables of the same name.
    pub fn validate_document(
        &self,
        document: &Document,
        parameters: Option<&Parameters>,
    ) -> Result<ValidationResult, ValidationError> {
        let start = Instant::now();
        let evaluator = Evaluator::new(document);
        let root = NodeRef::Node(document.root());
        let mut report = ReportBuilder::new(document.origin(), &self.program);

        let mut variables = parameters.map(Variables::from_parameters).unwrap_or_default();
        bind_all(&evaluator, self.program.globals(), root, &mut variables)?;

        for pattern in self.program.patterns() {
            report.active_pattern(pattern);
            let mark = variables.len();
            bind_all(&evaluator, &pattern.variables, root, &mut variables)?;
            self.run_pattern(&evaluator, pattern, &mut variables, &mut report)?;
            variables.truncate(mark);
        }

        let result = report.finish(start.elapsed());
        log::debug!(
            "Validated {}: {}",
            result.document.as_deref().unwrap_or("<memory>"),
            result.summary()
        );
        Ok(result)
    }

    /// Validate several documents in parallel. Results keep input order.
    pub fn validate_all(
        &self,
        sources: &[Source],
        parameters: Option<&Parameters>,
    ) -> Vec<Result<ValidationResult, ValidationError>> {
        sources
            .par_iter()
            .map(|source| self.validate(source, parameters))
            .collect()
    }

    fn run_pattern(
        &self,
        evaluator: &Evaluator<'_>,
        pattern: &PatternProgram,
        variables: &mut Variables,
        report: &mut ReportBuilder,
    ) -> Result<(), ValidationError> {
        let root = NodeRef::Node(evaluator.document().root());

        // A node is handled by the first rule in the pattern whose context matches it.
        let mut handled = HashSet::new();
        let mut firings = Vec::new();
        for (index, rule) in pattern.rules.iter().enumerate() {
            for node in evaluator.select(&rule.context, root, variables).map_err(evaluation(&rule.context))? {
                if handled.insert(node) {
                    firings.push((node, index));
                }
            }
        }
        firings.sort_by(|a, b| evaluator.compare_order(a.0, b.0));

        for (node, index) in firings {
            let rule = &pattern.rules[index];
            report.fired_rule(pattern, rule, location(evaluator.document(), node));

            let mark = variables.len();
            bind_all(evaluator, &rule.variables, node, variables)?;
            for check in &rule.checks {
                let outcome = evaluator.test(&check.test, node, variables).map_err(evaluation(&check.test))?;
                let fires = match check.kind {
                    CheckKind::Assert => !outcome,
                    CheckKind::Report => outcome,
                };
                if fires {
                    let message = render(evaluator, check, node, variables)?;
                    report.finding(Finding {
                        kind: check.kind,
                        id: check.id.clone(),
                        role: check.role.clone().or_else(|| rule.role.clone()),
                        flag: check.flag.clone().or_else(|| rule.flag.clone()),
                        test: check.test.source().to_string(),
                        location: location(evaluator.document(), node),
                        pattern: pattern.id.clone(),
                        rule: rule.id.clone(),
                        message,
                    });
                }
            }
            variables.truncate(mark);
        }
        Ok(())
    }
}

fn bind_all(
    evaluator: &Evaluator<'_>,
    bindings: &[Binding],
    node: NodeRef,
    variables: &mut Variables,
) -> Result<(), ValidationError> {
    for binding in bindings {
        let value = evaluator
            .evaluate(&binding.select, node, variables)
            .map_err(evaluation(&binding.select))?;
        variables.push(binding.name.as_str(), value);
    }
    Ok(())
}

fn render(evaluator: &Evaluator<'_>, check: &Check, node: NodeRef, variables: &Variables) -> Result<String, ValidationError> {
    let mut text = String::new();
    for part in &check.message {
        match part {
            MessagePart::Text(t) => text.push_str(t),
            MessagePart::ValueOf(xpath) => {
                let value = evaluator.evaluate(xpath, node, variables).map_err(evaluation(xpath))?;
                text.push_str(&evaluator.string(&value));
            }
            MessagePart::Name(xpath) => {
                let nodes = evaluator.select(xpath, node, variables).map_err(evaluation(xpath))?;
                if let Some(name) = nodes.first().and_then(|&n| evaluator.node_name(n)) {
                    text.push_str(&name.qualified());
                }
            }
        }
    }
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn evaluation(xpath: &XPath) -> impl Fn(XPathError) -> ValidationError + '_ {
    move |source| ValidationError::Evaluation {
        expression: xpath.source().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::PROGRAM_NS;

    fn validator(body: &str) -> Validator {
        let doc = Document::parse(
            &format!(
                r##"<program xmlns="{}" dialect="xslt" phase="#ALL" title="Orders">{}</program>"##,
                PROGRAM_NS, body
            ),
            None,
        )
        .unwrap();
        Validator::new(ValidationProgram::bind(&doc).unwrap())
    }

    fn order_rules() -> Validator {
        validator(
            r#"<variable name="limit" select="10"/>
               <pattern id="totals">
                 <rule context="item[@qty &gt; $limit]" id="bulk">
                   <report test="true()" role="warning"><message>bulk order of <value-of select="@qty"/></message></report>
                 </rule>
                 <rule context="item" id="item">
                   <assert test="@qty" id="has-qty"><message>  <name/> needs
                       a quantity </message></assert>
                 </rule>
               </pattern>"#,
        )
    }

    #[test]
    fn test_valid_document() {
        let doc = Document::parse(r#"<order><item qty="1"/><item qty="2"/></order>"#, None).unwrap();
        let result = order_rules().validate_document(&doc, None).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.fired_rules.len(), 2);
        assert_eq!(result.active_patterns, vec!["totals".to_string()]);
    }

    #[test]
    fn test_failed_assert_and_first_rule_wins() {
        let doc = Document::parse(r#"<order><item qty="50"/><item/></order>"#, None).unwrap();
        let result = order_rules().validate_document(&doc, None).unwrap();
        assert!(!result.is_valid());

        // The bulk item is handled only by the first rule.
        assert_eq!(result.fired_rules.len(), 2);
        assert_eq!(result.fired_rules[0].rule.as_deref(), Some("bulk"));
        assert_eq!(result.fired_rules[1].rule.as_deref(), Some("item"));

        assert_eq!(result.successful_reports.len(), 1);
        assert_eq!(result.successful_reports[0].message, "bulk order of 50");
        assert_eq!(result.successful_reports[0].role.as_deref(), Some("warning"));

        assert_eq!(result.failed_asserts.len(), 1);
        let finding = &result.failed_asserts[0];
        assert_eq!(finding.message, "item needs a quantity");
        assert_eq!(finding.location, "/order[1]/item[2]");
        assert_eq!(finding.id.as_deref(), Some("has-qty"));
    }

    #[test]
    fn test_parameters_are_variables() {
        let doc = Document::parse(r#"<order><item qty="5"/></order>"#, None).unwrap();
        let v = validator(
            r#"<pattern><rule context="item"><assert test="@qty &lt;= $max"><message>over</message></assert></rule></pattern>"#,
        );
        let low = Parameters::new().with("max", 3i64);
        let high = Parameters::new().with("max", 9i64);
        assert!(!v.validate_document(&doc, Some(&low)).unwrap().is_valid());
        assert!(v.validate_document(&doc, Some(&high)).unwrap().is_valid());
    }

    #[test]
    fn test_unbound_variable_is_an_evaluation_error() {
        let doc = Document::parse("<order><item/></order>", None).unwrap();
        let v = validator(r#"<pattern><rule context="item"><assert test="$missing"><message/></assert></rule></pattern>"#);
        let err = v.validate_document(&doc, None).unwrap_err();
        assert!(matches!(err, ValidationError::Evaluation { ref expression, .. } if expression == "$missing"));
    }

    #[test]
    fn test_svrl_report() {
        let doc = Document::parse(r#"<order><item/></order>"#, None).unwrap();
        let result = order_rules().validate_document(&doc, None).unwrap();
        let xml = result.svrl().to_xml();
        assert!(xml.contains("svrl:schematron-output"));
        assert!(xml.contains(r#"title="Orders""#));
        assert!(xml.contains("svrl:failed-assert"));
        assert!(xml.contains("item needs a quantity"));
    }

    #[test]
    fn test_validate_all_keeps_order() {
        let sources = vec![
            Source::from_xml(r#"<order><item qty="1"/></order>"#),
            Source::from_xml("<order><item/></order>"),
            Source::from_xml("<order"),
        ];
        let results = order_rules().validate_all(&sources, None);
        assert!(results[0].as_ref().unwrap().is_valid());
        assert!(!results[1].as_ref().unwrap().is_valid());
        assert!(matches!(results[2], Err(ValidationError::Load(_))));
    }
}
