//! Include resolution stage.
//!
//! `sch:include` is replaced by the referenced element: the document element
//! of the target, or the element whose id matches the `#fragment`.
//! `sch:extends` with an `@href` is replaced by the children of the referenced
//! element. References resolve relative to the document that contains them,
//! and included documents are processed recursively.

use crate::core::error::StageError;
use crate::core::source::{resolve_locator, Source};
use crate::core::tree::{Document, NodeId, NodeKind};
use crate::core::types::Parameters;
use crate::pipeline::stage::Stage;
use crate::pipeline::Dialect;
use crate::stages::SCHEMATRON_NS;

/// Inlines external schema fragments.
pub struct IncludeStage {
    dialect: Dialect,
}

impl IncludeStage {
    /// Create the include stage for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Stage for IncludeStage {
    fn name(&self) -> &str {
        match self.dialect {
            Dialect::Legacy => "include (xslt)",
            Dialect::Modern => "include (xslt2)",
        }
    }

    fn transform(&self, input: &Document, _parameters: &Parameters) -> Result<Document, StageError> {
        let mut out = Document::new();
        let mut active: Vec<String> = input.origin().map(str::to_string).into_iter().collect();
        let root = out.root();
        copy_resolving(input, input.root(), &mut out, root, &mut active)?;
        Ok(out)
    }
}

fn copy_resolving(
    src: &Document,
    node: NodeId,
    out: &mut Document,
    parent: NodeId,
    active: &mut Vec<String>,
) -> Result<(), StageError> {
    match src.kind(node) {
        NodeKind::Document => {
            for &child in src.children(node) {
                copy_resolving(src, child, out, parent, active)?;
            }
        }
        NodeKind::Element(_) if src.is_element(node, SCHEMATRON_NS, "include") => {
            let href = src.attribute(node, "href").ok_or_else(|| {
                StageError::InvalidSchema("sch:include requires an @href attribute".to_string())
            })?;
            let (key, included, target) = load_reference(src, href, active)?;
            active.push(key);
            copy_resolving(&included, target, out, parent, active)?;
            active.pop();
        }
        NodeKind::Element(_)
            if src.is_element(node, SCHEMATRON_NS, "extends") && src.attribute(node, "href").is_some() =>
        {
            let href = src.attribute(node, "href").unwrap_or_default();
            let (key, included, target) = load_reference(src, href, active)?;
            active.push(key);
            for &child in included.children(target) {
                copy_resolving(&included, child, out, parent, active)?;
            }
            active.pop();
        }
        _ => {
            let copy = out.copy_node(parent, src, node);
            if src.element(node).is_some() {
                for &child in src.children(node) {
                    copy_resolving(src, child, out, copy, active)?;
                }
            }
        }
    }
    Ok(())
}

/// Load the target of `href` and locate the referenced element.
///
/// Returns the cycle-detection key together with the loaded document.
fn load_reference(
    src: &Document,
    href: &str,
    active: &[String],
) -> Result<(String, Document, NodeId), StageError> {
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };

    let document = if path.is_empty() {
        src.clone()
    } else {
        let locator = resolve_locator(src.origin(), path);
        Source::from_path(&locator)
            .load()
            .map_err(|e| StageError::Include {
                href: href.to_string(),
                reason: e.to_string(),
            })?
    };

    let locator = document.origin().unwrap_or_default().to_string();
    let key = match fragment {
        Some(f) => format!("{}#{}", locator, f),
        None => locator,
    };
    if active.contains(&key) {
        return Err(StageError::Cycle(href.to_string()));
    }

    let target = match fragment {
        Some(f) => document.element_by_id(f),
        None => document.document_element(),
    }
    .ok_or_else(|| StageError::Include {
        href: href.to_string(),
        reason: match fragment {
            Some(f) => format!("no element with id '{}'", f),
            None => "document has no element".to_string(),
        },
    })?;

    log::debug!("Including '{}' from {}", href, src.origin().unwrap_or("<memory>"));
    Ok((key, document, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

    fn run(doc: &Document) -> Result<Document, StageError> {
        IncludeStage::new(Dialect::Legacy).transform(doc, &Parameters::new())
    }

    #[test]
    fn test_without_includes_is_identity() {
        let doc = Document::parse(
            &format!(r#"<schema xmlns="{}"><pattern><rule context="a"/></pattern></schema>"#, SCH),
            None,
        )
        .unwrap();
        assert_eq!(run(&doc).unwrap().to_xml(), doc.to_xml());
    }

    #[test]
    fn test_include_relative_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::write(
            dir.path().join("parts/pattern.sch"),
            format!(r#"<pattern xmlns="{}" id="included"><include href="rule.sch"/></pattern>"#, SCH),
        )
        .unwrap();
        fs::write(
            dir.path().join("parts/rule.sch"),
            format!(r#"<rule xmlns="{}" context="x"><assert test="@id">id</assert></rule>"#, SCH),
        )
        .unwrap();

        let main = dir.path().join("main.sch");
        let doc = Document::parse(
            &format!(r#"<schema xmlns="{}"><include href="parts/pattern.sch"/></schema>"#, SCH),
            main.to_str(),
        )
        .unwrap();

        let out = run(&doc).unwrap();
        let xml = out.to_xml();
        assert!(xml.contains(r#"id="included""#));
        assert!(xml.contains(r#"context="x""#));
        assert!(!xml.contains("<include"));
    }

    #[test]
    fn test_fragment_and_extends_href() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lib.sch"),
            format!(
                r#"<schema xmlns="{}"><pattern id="p1"/><pattern id="p2"/></schema>"#,
                SCH
            ),
        )
        .unwrap();

        let main = dir.path().join("main.sch");
        let doc = Document::parse(
            &format!(
                r##"<schema xmlns="{}"><include href="lib.sch#p2"/><extends href="lib.sch"/></schema>"##,
                SCH
            ),
            main.to_str(),
        )
        .unwrap();

        let out = run(&doc).unwrap();
        let root = out.document_element().unwrap();
        let ids: Vec<_> = out.child_elements(root).filter_map(|n| out.attribute(n, "id")).collect();
        assert_eq!(ids, vec!["p2", "p1", "p2"]);
    }

    #[test]
    fn test_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.sch");
        fs::write(&a, format!(r#"<schema xmlns="{}"><include href="b.sch"/></schema>"#, SCH)).unwrap();
        fs::write(
            dir.path().join("b.sch"),
            format!(r#"<pattern xmlns="{}"><include href="a.sch"/></pattern>"#, SCH),
        )
        .unwrap();

        let doc = Source::from_path(&a).load().unwrap();
        assert!(matches!(run(&doc), Err(StageError::Cycle(_))));
    }

    #[test]
    fn test_missing_target() {
        let doc = Document::parse(
            &format!(r#"<schema xmlns="{}"><include href="nowhere.sch"/></schema>"#, SCH),
            Some("/tmp/does-not-exist/main.sch"),
        )
        .unwrap();
        assert!(matches!(run(&doc), Err(StageError::Include { .. })));
    }
}
