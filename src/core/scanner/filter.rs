//! File filtering logic for the scanner.

use std::collections::HashSet;
use std::path::Path;

/// Extensions indexed when the configuration does not name any
pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".tif", ".tiff", ".webp"];

/// Lowercase an extension and give it a leading dot. Blank input yields `None`.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    Some(if lower.starts_with('.') { lower } else { format!(".{}", lower) })
}

/// Filters files to determine if they are supported images
#[derive(Debug, Clone)]
pub struct ImageFilter {
    /// Dotted, lowercase extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl ImageFilter {
    /// Create a new filter with default supported extensions
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS.iter().copied())
    }

    /// Accept exactly the given extensions (normalized on the way in)
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .filter_map(|e| normalize_extension(e.as_ref()))
                .collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Check if a file should be included
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden && is_hidden(path) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .and_then(normalize_extension)
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
