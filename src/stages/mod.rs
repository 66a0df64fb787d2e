//! Built-in pipeline stages and the stage registry.
//!
//! Each dialect gets the same three ordered stages:
//! - include: inline `sch:include` and `sch:extends/@href` references
//! - expand: instantiate abstract patterns and inline abstract rules
//! - compile: turn the expanded schema into a validation program tree

pub mod compile;
pub mod expand;
pub mod include;
pub mod registry;

pub use compile::CompileStage;
pub use expand::ExpandStage;
pub use include::IncludeStage;
pub use registry::{RegistryBuilder, RegistryEntry, StageFactory, StageRegistry, StageResolver};

use crate::core::tree::{Document, NodeId};
use crate::pipeline::Dialect;
use std::sync::Arc;

/// ISO Schematron namespace.
pub const SCHEMATRON_NS: &str = "http://purl.oclc.org/dsdl/schematron";

/// Namespace of compiled validation programs.
pub const PROGRAM_NS: &str = "urn:schematron:validation-program";

/// Register the built-in stages of both dialects.
pub fn register_all(registry: &mut StageRegistry) {
    for dialect in [Dialect::Legacy, Dialect::Modern] {
        let [include, expand, compile] = dialect.steps() else {
            continue;
        };
        registry.register(*include, "Resolve sch:include and sch:extends references", move || {
            Arc::new(IncludeStage::new(dialect))
        });
        registry.register(*expand, "Expand abstract patterns and rules", move || {
            Arc::new(ExpandStage::new(dialect))
        });
        registry.register(*compile, "Compile to a validation program", move || {
            Arc::new(CompileStage::new(dialect))
        });
    }
}

/// Child elements of `node` with the given Schematron local name.
pub(crate) fn sch_children<'a>(
    doc: &'a Document,
    node: NodeId,
    local: &'a str,
) -> impl Iterator<Item = NodeId> + 'a {
    doc.child_elements(node)
        .filter(move |&c| doc.is_element(c, SCHEMATRON_NS, local))
}

/// True if the element carries `abstract="true"`.
pub(crate) fn is_abstract(doc: &Document, node: NodeId) -> bool {
    doc.attribute(node, "abstract") == Some("true")
}
