//! Document inputs and locator resolution.

use crate::core::error::TreeError;
use crate::core::tree::Document;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum Input {
    Text(String),
    File(PathBuf),
    Tree(Document),
}

/// A document to load: XML text, a file, or an already-built tree, optionally
/// tagged with a system id used for relative resolution.
#[derive(Debug, Clone)]
pub struct Source {
    input: Input,
    system_id: Option<String>,
}

impl Source {
    /// A source read from a file. The path becomes the system id.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            system_id: Some(path.to_string_lossy().into_owned()),
            input: Input::File(path),
        }
    }

    /// A source holding XML text, with no system id.
    pub fn from_xml(text: impl Into<String>) -> Self {
        Self {
            input: Input::Text(text.into()),
            system_id: None,
        }
    }

    /// A source wrapping a tree. The tree's origin becomes the system id.
    pub fn from_document(document: Document) -> Self {
        Self {
            system_id: document.origin().map(str::to_string),
            input: Input::Tree(document),
        }
    }

    /// Override the system id.
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// The system id, if any.
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Load into a tree tagged with this source's system id.
    pub fn load(&self) -> Result<Document, TreeError> {
        let origin = self.system_id.as_deref();
        let mut document = match &self.input {
            Input::Text(text) => Document::parse(text, origin)?,
            Input::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|error| TreeError::Read {
                    path: path.clone(),
                    error,
                })?;
                Document::parse(&text, origin)?
            }
            Input::Tree(doc) => doc.clone(),
        };
        document.set_origin(self.system_id.clone());
        Ok(document)
    }
}

/// Resolve `href` against the locator of the document that references it.
///
/// Locators are file paths, optionally prefixed with `file://` or `file:`.
/// Without a base the reference is taken relative to the working directory.
pub fn resolve_locator(base: Option<&str>, href: &str) -> PathBuf {
    let target = Path::new(strip_file_scheme(href));
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match base.map(strip_file_scheme).map(Path::new).and_then(Path::parent) {
        Some(dir) => dir.join(target),
        None => target.to_path_buf(),
    }
}

fn strip_file_scheme(locator: &str) -> &str {
    locator
        .strip_prefix("file://")
        .or_else(|| locator.strip_prefix("file:"))
        .unwrap_or(locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_text_tags_origin() {
        let doc = Source::from_xml("<a/>").with_system_id("mem:a").load().unwrap();
        assert_eq!(doc.origin(), Some("mem:a"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<doc><x/></doc>").unwrap();

        let source = Source::from_path(file.path());
        let doc = source.load().unwrap();
        assert_eq!(doc.origin(), source.system_id());
        assert!(doc.document_element().is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = Source::from_path("/definitely/not/here.sch").load().unwrap_err();
        assert!(matches!(err, TreeError::Read { .. }));
    }

    #[test]
    fn test_tree_source_keeps_origin() {
        let doc = Document::parse("<a/>", Some("orig.xml")).unwrap();
        let loaded = Source::from_document(doc).load().unwrap();
        assert_eq!(loaded.origin(), Some("orig.xml"));
    }

    #[test]
    fn test_resolve_locator() {
        assert_eq!(
            resolve_locator(Some("/schemas/main.sch"), "parts/rules.sch"),
            PathBuf::from("/schemas/parts/rules.sch")
        );
        assert_eq!(
            resolve_locator(Some("file:///schemas/main.sch"), "other.sch"),
            PathBuf::from("/schemas/other.sch")
        );
        assert_eq!(resolve_locator(None, "x.sch"), PathBuf::from("x.sch"));
        assert_eq!(resolve_locator(Some("/a/b.sch"), "/abs.sch"), PathBuf::from("/abs.sch"));
    }
}
