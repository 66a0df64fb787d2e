//! The schema compiler.
//!
//! A [`Schematron`] loads a schema, picks the stage list for its query
//! binding, runs the stages once and keeps the compiled artifact. The
//! validator bound to that artifact is built lazily and shared.

use crate::core::error::{CompilationError, ConfigurationError, SchematronError};
use crate::core::source::Source;
use crate::core::tree::Document;
use crate::core::types::{CompilerOptions, Parameters, Value};
use crate::engine::TransformEngine;
use crate::pipeline::{select_steps, Dialect, Pipeline};
use crate::validation::{ValidationResult, Validator, ValidatorCache};
use std::sync::Arc;
use std::time::Instant;

/// A compiled schema.
///
/// # Example
///
/// ```
/// use schematron::core::Source;
/// use schematron::Schematron;
///
/// let schema = Source::from_xml(
///     r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
///          <pattern><rule context="item"><assert test="@qty">missing qty</assert></rule></pattern>
///        </schema>"#,
/// );
/// let compiled = Schematron::new(schema).unwrap();
/// let result = compiled.validate(&Source::from_xml("<order><item/></order>")).unwrap();
/// assert_eq!(result.failed_asserts.len(), 1);
/// ```
#[derive(Debug)]
pub struct Schematron {
    engine: Arc<TransformEngine>,
    options: CompilerOptions,
    schema: Document,
    dialect: Dialect,
    pipeline_steps: Vec<String>,
    stylesheet: Document,
    validator: ValidatorCache,
}

impl Schematron {
    /// Compile `schema` with default options.
    pub fn new(schema: Source) -> Result<Self, SchematronError> {
        Self::builder().schema(schema).build()
    }

    /// Compile `schema` for the given phase.
    pub fn with_phase(schema: Source, phase: &str) -> Result<Self, SchematronError> {
        Self::builder().schema(schema).phase(phase).build()
    }

    /// Start configuring a compiler.
    pub fn builder() -> SchematronBuilder {
        SchematronBuilder::default()
    }

    fn compile(
        engine: Arc<TransformEngine>,
        source: &Source,
        options: CompilerOptions,
    ) -> Result<Self, SchematronError> {
        let schema = engine.load(source).map_err(CompilationError::Load)?;
        let (dialect, pipeline_steps) = select_steps(&schema)?;
        let stylesheet = run_pipeline(&engine, &pipeline_steps, &options, &schema)?;

        Ok(Self {
            engine,
            options,
            schema,
            dialect,
            pipeline_steps,
            stylesheet,
            validator: ValidatorCache::new(),
        })
    }

    /// Validate a document with the cached validator.
    pub fn validate(&self, source: &Source) -> Result<ValidationResult, SchematronError> {
        let validator = self.create_validator()?;
        Ok(validator.validate(source, None)?)
    }

    /// Validate a document, exposing `parameters` as variables.
    pub fn validate_with(&self, source: &Source, parameters: &Parameters) -> Result<ValidationResult, SchematronError> {
        let validator = self.create_validator()?;
        Ok(validator.validate(source, Some(parameters))?)
    }

    /// The compiled artifact.
    pub fn validation_stylesheet(&self) -> &Document {
        &self.stylesheet
    }

    /// The validator bound to the compiled artifact, built on first use.
    pub fn create_validator(&self) -> Result<Arc<Validator>, CompilationError> {
        self.validator.get_or_try_init(|| {
            let program = self.engine.new_validation_program(&self.stylesheet)?;
            Ok(Validator::new(program))
        })
    }

    /// Run the stages again with the stored step list.
    ///
    /// The stored artifact and validator are left untouched.
    pub fn recompile(&self) -> Result<Document, CompilationError> {
        run_pipeline(&self.engine, &self.pipeline_steps, &self.options, &self.schema)
    }

    /// Dialect selected from the schema.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Stage identifiers in execution order.
    pub fn pipeline_steps(&self) -> &[String] {
        &self.pipeline_steps
    }

    /// Options every stage received.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The schema as loaded.
    pub fn schema(&self) -> &Document {
        &self.schema
    }

    /// The engine used for loading, resolution and binding.
    pub fn engine(&self) -> &Arc<TransformEngine> {
        &self.engine
    }
}

fn run_pipeline(
    engine: &TransformEngine,
    steps: &[String],
    options: &CompilerOptions,
    schema: &Document,
) -> Result<Document, CompilationError> {
    let start = Instant::now();
    let programs = steps
        .iter()
        .map(|id| {
            engine
                .new_stage_program(id, options)
                .map_err(|source| CompilationError::Resolution {
                    stage: id.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut artifact = Pipeline::new(programs).run(schema)?;
    artifact.set_origin(schema.origin().map(str::to_string));
    log::info!(
        "Compiled {} in {}ms",
        schema.origin().unwrap_or("<memory>"),
        start.elapsed().as_millis()
    );
    Ok(artifact)
}

/// Builder for [`Schematron`].
#[derive(Debug, Default)]
pub struct SchematronBuilder {
    schema: Option<Source>,
    engine: Option<Arc<TransformEngine>>,
    options: CompilerOptions,
    phase: Option<String>,
}

impl SchematronBuilder {
    /// Schema to compile. Required.
    pub fn schema(mut self, schema: Source) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Validation phase. Takes precedence over any `phase` entry in the options.
    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Engine to compile with.
    pub fn engine(mut self, engine: Arc<TransformEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set one compiler option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name, value);
        self
    }

    /// Merge a set of compiler options.
    pub fn options(mut self, options: &Parameters) -> Self {
        self.options.merge(options);
        self
    }

    /// Load, select, resolve and run the stages.
    pub fn build(self) -> Result<Schematron, SchematronError> {
        let schema = self.schema.ok_or(ConfigurationError::MissingSchema)?;
        let engine = self.engine.unwrap_or_default();
        engine.install_default_resolver();
        let mut options = self.options;
        if let Some(phase) = self.phase {
            options.insert(Parameters::PHASE, phase);
        }
        Schematron::compile(engine, &schema, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ProgramError, StageError};
    use crate::core::tree::QName;
    use crate::pipeline::Stage;
    use parking_lot::Mutex;

    const SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
        <pattern id="quantities">
          <rule context="item">
            <assert test="@qty &gt; 0">Item <value-of select="@sku"/> has no quantity</assert>
          </rule>
        </pattern>
      </schema>"#;

    /// Records the parameters it sees and tags the tree with its id.
    struct Recorder {
        id: String,
        seen: Arc<Mutex<Vec<(String, Parameters)>>>,
    }

    impl Stage for Recorder {
        fn name(&self) -> &str {
            &self.id
        }

        fn transform(&self, input: &Document, parameters: &Parameters) -> Result<Document, StageError> {
            self.seen.lock().push((self.id.clone(), parameters.clone()));
            let mut out = input.clone();
            let root = out.document_element().ok_or_else(|| StageError::Failed("empty".into()))?;
            let step = out.append_element(root, QName::local("step"));
            out.set_attribute(step, QName::local("id"), self.id.as_str());
            Ok(out)
        }
    }

    fn recording_engine() -> (Arc<TransformEngine>, Arc<Mutex<Vec<(String, Parameters)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&seen);
        let resolver = move |id: &str| -> Result<Arc<dyn Stage>, StageError> {
            Ok(Arc::new(Recorder {
                id: id.to_string(),
                seen: Arc::clone(&shared),
            }))
        };
        (Arc::new(TransformEngine::with_resolver(Arc::new(resolver))), seen)
    }

    #[test]
    fn test_schematron_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schematron>();
        assert_send_sync::<Validator>();
    }

    #[test]
    fn test_options_reach_every_stage_in_order() {
        let (engine, seen) = recording_engine();
        let compiled = Schematron::builder()
            .schema(Source::from_xml(SCHEMA).with_system_id("orders.sch"))
            .engine(engine)
            .phase("full")
            .option("strict", true)
            .build()
            .unwrap();

        let seen = seen.lock();
        let ids: Vec<&str> = seen.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, Dialect::Legacy.steps().to_vec());
        for (_, parameters) in seen.iter() {
            assert_eq!(parameters.phase(), Some("full"));
            assert_eq!(parameters.get("strict"), Some(&Value::Boolean(true)));
        }

        let artifact = compiled.validation_stylesheet();
        let root = artifact.document_element().unwrap();
        let tagged: Vec<&str> = artifact
            .child_elements(root)
            .filter(|&c| artifact.name(c).map_or(false, |n| n.local == "step"))
            .filter_map(|c| artifact.attribute(c, "id"))
            .collect();
        assert_eq!(tagged, Dialect::Legacy.steps().to_vec());
        assert_eq!(artifact.origin(), Some("orders.sch"));
    }

    #[test]
    fn test_explicit_phase_wins_over_options() {
        let (engine, seen) = recording_engine();
        let compiled = Schematron::builder()
            .schema(Source::from_xml(SCHEMA))
            .engine(Arc::clone(&engine))
            .phase("a")
            .options(&Parameters::new().with("phase", "b"))
            .build()
            .unwrap();
        assert_eq!(compiled.options().phase(), Some("a"));
        assert!(seen.lock().iter().all(|(_, parameters)| parameters.phase() == Some("a")));

        let compiled = Schematron::builder()
            .schema(Source::from_xml(SCHEMA))
            .engine(engine)
            .phase("a")
            .option("phase", "b")
            .build()
            .unwrap();
        assert_eq!(compiled.options().phase(), Some("a"));
    }

    #[test]
    fn test_modern_binding_selects_modern_steps() {
        let (engine, _) = recording_engine();
        let schema = SCHEMA.replace("<schema ", r#"<schema queryBinding="XSLT3" "#);
        let compiled = Schematron::builder()
            .schema(Source::from_xml(schema))
            .engine(engine)
            .build()
            .unwrap();
        assert_eq!(compiled.dialect(), Dialect::Modern);
        assert_eq!(compiled.pipeline_steps(), Dialect::Modern.steps());
    }

    #[test]
    fn test_unsupported_binding_is_a_configuration_error() {
        let schema = SCHEMA.replace("<schema ", r#"<schema queryBinding="xslt4" "#);
        let err = Schematron::new(Source::from_xml(schema)).unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Configuration(ConfigurationError::UnsupportedDialect { ref query_binding })
                if query_binding == "xslt4"
        ));
    }

    #[test]
    fn test_missing_schema() {
        let err = Schematron::builder().build().unwrap_err();
        assert!(matches!(err, SchematronError::Configuration(ConfigurationError::MissingSchema)));
    }

    #[test]
    fn test_load_failure() {
        let err = Schematron::new(Source::from_xml("<schema")).unwrap_err();
        assert!(matches!(err, SchematronError::Compilation(CompilationError::Load(_))));
    }

    #[test]
    fn test_unresolvable_stage() {
        let resolver = |id: &str| -> Result<Arc<dyn Stage>, StageError> { Err(StageError::NotFound { id: id.to_string() }) };
        let err = Schematron::builder()
            .schema(Source::from_xml(SCHEMA))
            .engine(Arc::new(TransformEngine::with_resolver(Arc::new(resolver))))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SchematronError::Compilation(CompilationError::Resolution { ref stage, .. })
                if stage == Dialect::Legacy.steps()[0]
        ));
    }

    #[test]
    fn test_engine_without_resolver_gets_default() {
        let engine = Arc::new(TransformEngine::new());
        let compiled = Schematron::builder()
            .schema(Source::from_xml(SCHEMA))
            .engine(Arc::clone(&engine))
            .build()
            .unwrap();
        assert!(engine.resolver().is_some());
        assert!(Arc::ptr_eq(compiled.engine(), &engine));
    }

    #[test]
    fn test_end_to_end() {
        let compiled = Schematron::new(Source::from_xml(SCHEMA)).unwrap();

        let good = compiled
            .validate(&Source::from_xml(r#"<order><item sku="a" qty="1"/></order>"#))
            .unwrap();
        assert_eq!(good.failed_asserts.len(), 0);
        assert!(good.is_valid());

        let bad = compiled
            .validate(&Source::from_xml(r#"<order><item sku="a" qty="1"/><item sku="b" qty="0"/></order>"#))
            .unwrap();
        assert_eq!(bad.failed_asserts.len(), 1);
        assert_eq!(bad.failed_asserts[0].message, "Item b has no quantity");
        assert_eq!(bad.failed_asserts[0].location, "/order[1]/item[2]");
    }

    #[test]
    fn test_validate_with_parameters() {
        let schema = SCHEMA.replace("@qty &gt; 0", "@qty &lt;= $max");
        let compiled = Schematron::new(Source::from_xml(schema)).unwrap();
        let doc = Source::from_xml(r#"<order><item sku="a" qty="7"/></order>"#);
        assert!(!compiled.validate_with(&doc, &Parameters::new().with("max", 5i64)).unwrap().is_valid());
        assert!(compiled.validate_with(&doc, &Parameters::new().with("max", 10i64)).unwrap().is_valid());
    }

    #[test]
    fn test_validation_error_keeps_validator() {
        let schema = SCHEMA.replace("@qty &gt; 0", "$undeclared");
        let compiled = Schematron::new(Source::from_xml(schema)).unwrap();
        let err = compiled.validate(&Source::from_xml("<order><item/></order>")).unwrap_err();
        assert!(matches!(err, SchematronError::Validation(_)));
        assert!(compiled.create_validator().is_ok());
    }

    #[test]
    fn test_concurrent_create_validator_builds_once() {
        let compiled = Schematron::new(Source::from_xml(SCHEMA)).unwrap();
        let validators: Vec<Arc<Validator>> = crossbeam::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|_| compiled.create_validator().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();

        assert!(validators.iter().all(|v| Arc::ptr_eq(v, &validators[0])));
        assert_eq!(compiled.validator.constructions(), 1);
    }

    #[test]
    fn test_binding_failure_leaves_cache_empty() {
        let schema = SCHEMA.replace("@qty &gt; 0", "exists(@qty)");
        let compiled = Schematron::new(Source::from_xml(schema)).unwrap();

        for _ in 0..2 {
            let err = compiled.create_validator().unwrap_err();
            assert!(matches!(err, CompilationError::Binding(ProgramError::Expression { .. })));
        }
        assert!(!compiled.validator.is_initialized());
        assert_eq!(compiled.validator.constructions(), 0);
    }

    #[test]
    fn test_recompile_reuses_step_list() {
        let (engine, seen) = recording_engine();
        let compiled = Schematron::builder()
            .schema(Source::from_xml(SCHEMA))
            .engine(engine)
            .build()
            .unwrap();
        let steps = compiled.pipeline_steps().to_vec();

        let again = compiled.recompile().unwrap();
        assert_eq!(compiled.pipeline_steps(), steps.as_slice());
        assert_eq!(again.to_xml(), compiled.validation_stylesheet().to_xml());
        assert_eq!(seen.lock().len(), 2 * steps.len());
    }

    #[test]
    fn test_phase_selects_patterns() {
        let schema = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
            <phase id="basic"><active pattern="a"/></phase>
            <pattern id="a"><rule context="item"><assert test="@sku">sku</assert></rule></pattern>
            <pattern id="b"><rule context="item"><assert test="@qty">qty</assert></rule></pattern>
          </schema>"#;
        let doc = Source::from_xml(r#"<order><item sku="x"/></order>"#);

        let all = Schematron::new(Source::from_xml(schema)).unwrap();
        assert_eq!(all.validate(&doc).unwrap().failed_asserts.len(), 1);

        let basic = Schematron::with_phase(Source::from_xml(schema), "basic").unwrap();
        let result = basic.validate(&doc).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.phase, "basic");
        assert_eq!(result.active_patterns, vec!["a".to_string()]);
    }
}
