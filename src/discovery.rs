//! Expanding command-line inputs into instance documents.
//!
//! An input is either a file, a directory (walked for files whose name
//! matches the file pattern) or a glob pattern.

use crate::core::error::ConfigurationError;
use crate::core::source::Source;
use std::path::{Path, PathBuf};

/// Default file-name pattern used when walking directories.
pub const DEFAULT_FILE_PATTERN: &str = "*.xml";

/// Finds instance documents.
#[derive(Debug, Clone)]
pub struct DocumentDiscovery {
    pattern: glob::Pattern,
    recursive: bool,
}

impl Default for DocumentDiscovery {
    fn default() -> Self {
        Self {
            pattern: glob::Pattern::new(DEFAULT_FILE_PATTERN).unwrap_or_default(),
            recursive: true,
        }
    }
}

impl DocumentDiscovery {
    /// Discovery with the default pattern, walking directories recursively.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only pick up directory entries whose file name matches `pattern`.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ConfigurationError> {
        self.pattern = glob::Pattern::new(pattern)
            .map_err(|e| ConfigurationError::InvalidConfig(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(self)
    }

    /// Whether directories are walked below their top level.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Expand `inputs` into file paths, keeping input order.
    ///
    /// Directory contents are sorted by path. Paths that do not exist and
    /// contain no glob characters are passed through so loading reports them.
    pub fn discover<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<PathBuf>, ConfigurationError> {
        let mut found = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            let path = Path::new(input);
            if path.is_dir() {
                found.extend(self.walk(path));
            } else if path.exists() || !is_glob(input) {
                found.push(path.to_path_buf());
            } else {
                found.extend(self.expand(input)?);
            }
        }
        log::debug!("Discovered {} document(s)", found.len());
        Ok(found)
    }

    /// Like [`discover`](Self::discover), producing document sources.
    pub fn sources<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<Source>, ConfigurationError> {
        Ok(self.discover(inputs)?.into_iter().map(Source::from_path).collect())
    }

    fn walk(&self, dir: &Path) -> Vec<PathBuf> {
        let depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir).max_depth(depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_str().unwrap_or("");
            if self.pattern.matches(name) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        files
    }

    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>, ConfigurationError> {
        let paths = glob::glob(pattern)
            .map_err(|e| ConfigurationError::InvalidConfig(format!("Invalid pattern '{}': {}", pattern, e)))?;
        let mut files = Vec::new();
        for path in paths {
            match path {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping {}: {}", e.path().display(), e.error()),
            }
        }
        if files.is_empty() {
            log::warn!("Pattern '{}' matched no documents", pattern);
        }
        Ok(files)
    }
}

fn is_glob(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.xml"), "<a/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.xml"), "<b/>").unwrap();
        dir
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_walk_directory() {
        let dir = tree();
        let input = dir.path().to_string_lossy().into_owned();

        let all = DocumentDiscovery::new().discover(&[input.as_str()]).unwrap();
        assert_eq!(names(&all), vec!["a.xml", "b.xml"]);

        let flat = DocumentDiscovery::new().recursive(false).discover(&[input.as_str()]).unwrap();
        assert_eq!(names(&flat), vec!["a.xml"]);

        let txt = DocumentDiscovery::new().with_pattern("*.txt").unwrap().discover(&[input]).unwrap();
        assert_eq!(names(&txt), vec!["notes.txt"]);
    }

    #[test]
    fn test_glob_pattern() {
        let dir = tree();
        let pattern = format!("{}/**/*.xml", dir.path().display());
        let found = DocumentDiscovery::new().discover(&[pattern]).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_missing_file_passes_through() {
        let found = DocumentDiscovery::new().discover(&["does-not-exist.xml"]).unwrap();
        assert_eq!(found, vec![PathBuf::from("does-not-exist.xml")]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(DocumentDiscovery::new().with_pattern("[").is_err());
        assert!(DocumentDiscovery::new().discover(&["a/[b"]).is_err());
    }

    #[test]
    fn test_sources_carry_system_id() {
        let dir = tree();
        let file = dir.path().join("a.xml");
        let sources = DocumentDiscovery::new().sources(&[file.to_string_lossy()]).unwrap();
        assert_eq!(sources[0].system_id(), file.to_str());
        assert!(sources[0].load().is_ok());
    }
}
