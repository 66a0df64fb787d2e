//! Sequential pipeline executor.

use crate::core::error::PipelineError;
use crate::core::tree::Document;
use crate::pipeline::stage::StageProgram;
use std::time::Instant;

/// Ordered chain of stage programs.
///
/// Runs each stage on the output of the previous one and returns the tree
/// produced by the last stage.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<StageProgram>,
}

impl Pipeline {
    /// Create a new pipeline with the given steps.
    pub fn new(steps: Vec<StageProgram>) -> Self {
        Self { steps }
    }

    /// Append a step.
    pub fn add_step(&mut self, step: StageProgram) {
        self.steps.push(step);
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[StageProgram] {
        &self.steps
    }

    /// Identifiers of the steps in execution order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run `input` through all steps.
    ///
    /// Before each stage runs, the origin of the previous source is attached to
    /// its input so relative references resolve against the schema location.
    /// The first failing stage aborts the run.
    pub fn run(&self, input: &Document) -> Result<Document, PipelineError> {
        let start = Instant::now();
        let mut current = input.clone();

        for (index, step) in self.steps.iter().enumerate() {
            let stage_start = Instant::now();
            let origin = current.origin().map(str::to_string);

            let mut output = step.apply(&current).map_err(|source| PipelineError {
                index,
                stage: step.id().to_string(),
                source,
            })?;
            output.set_origin(origin);

            log::debug!(
                "Stage {} '{}' ({}) finished in {}ms",
                index,
                step.id(),
                step.name(),
                stage_start.elapsed().as_millis()
            );
            current = output;
        }

        log::debug!(
            "Pipeline of {} stage(s) finished in {}ms",
            self.steps.len(),
            start.elapsed().as_millis()
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StageError;
    use crate::core::tree::QName;
    use crate::core::types::Parameters;
    use crate::pipeline::stage::Stage;
    use std::sync::Arc;

    /// Appends `<step n="..."/>` under the document element.
    struct Tag(&'static str);

    impl Stage for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn transform(&self, input: &Document, _parameters: &Parameters) -> Result<Document, StageError> {
            let mut out = input.clone();
            let root = out.document_element().ok_or_else(|| StageError::Failed("empty".into()))?;
            let step = out.append_element(root, QName::local("step"));
            out.set_attribute(step, QName::local("n"), self.0);
            out.set_origin(Some(format!("rewritten-by-{}", self.0)));
            Ok(out)
        }
    }

    struct Fail;

    impl Stage for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        fn transform(&self, _input: &Document, _parameters: &Parameters) -> Result<Document, StageError> {
            Err(StageError::Failed("broken stage".into()))
        }
    }

    /// Records the origin it sees as an attribute.
    struct SeeOrigin;

    impl Stage for SeeOrigin {
        fn name(&self) -> &str {
            "see-origin"
        }

        fn transform(&self, input: &Document, _parameters: &Parameters) -> Result<Document, StageError> {
            let mut out = input.clone();
            let root = out.document_element().ok_or_else(|| StageError::Failed("empty".into()))?;
            let seen = out.append_element(root, QName::local("seen"));
            out.set_attribute(seen, QName::local("origin"), input.origin().unwrap_or(""));
            Ok(out)
        }
    }

    fn program(id: &str, stage: impl Stage + 'static) -> StageProgram {
        StageProgram::new(id, Arc::new(stage))
    }

    #[test]
    fn test_steps_run_in_order() {
        let pipeline = Pipeline::new(vec![program("a", Tag("a")), program("b", Tag("b")), program("c", Tag("c"))]);
        let input = Document::parse("<r/>", None).unwrap();
        let out = pipeline.run(&input).unwrap();
        assert_eq!(out.to_xml(), r#"<r><step n="a"/><step n="b"/><step n="c"/></r>"#);
        assert_eq!(pipeline.step_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failure_names_stage() {
        let pipeline = Pipeline::new(vec![program("a", Tag("a")), program("bad", Fail), program("c", Tag("c"))]);
        let input = Document::parse("<r/>", None).unwrap();
        let err = pipeline.run(&input).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.stage, "bad");
    }

    #[test]
    fn test_origin_propagates_to_every_stage() {
        let pipeline = Pipeline::new(vec![
            program("a", Tag("a")),
            program("seen1", SeeOrigin),
            program("seen2", SeeOrigin),
        ]);
        let input = Document::parse("<r/>", Some("/schemas/main.sch")).unwrap();
        let out = pipeline.run(&input).unwrap();

        let root = out.document_element().unwrap();
        let origins: Vec<_> = out
            .child_elements(root)
            .filter_map(|n| out.attribute(n, "origin"))
            .collect();
        assert_eq!(origins, vec!["/schemas/main.sch", "/schemas/main.sch"]);
        assert_eq!(out.origin(), Some("/schemas/main.sch"));
    }

    #[test]
    fn test_empty_pipeline_returns_input() {
        let input = Document::parse("<r><x/></r>", Some("o")).unwrap();
        let out = Pipeline::default().run(&input).unwrap();
        assert_eq!(out.to_xml(), input.to_xml());
        assert_eq!(out.origin(), Some("o"));
    }
}
