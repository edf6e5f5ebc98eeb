//! Directory walking implementation using walkdir.

use super::filter::{is_hidden, ImageFilter};
use super::LibraryScanner;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: ImageFilter,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig, filter: ImageFilter) -> Self {
        let filter = filter.with_hidden(config.include_hidden);
        Self { config, filter }
    }

    /// Files under one root, in walk order.
    fn walk_root<'a>(&'a self, root: &'a Path) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        if root.is_file() {
            let accepted = self.filter.should_include(root).then(|| root.to_path_buf());
            return Box::new(accepted.into_iter());
        }

        if !root.is_dir() {
            tracing::warn!(path = %root.display(), "Library path does not exist, skipping");
            return Box::new(std::iter::empty());
        }

        tracing::info!(path = %root.display(), "Processing directory");

        let include_hidden = self.config.include_hidden;
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            // Skip hidden directories unless configured otherwise; the root itself is always walked
            .filter_entry(move |entry| {
                include_hidden || entry.depth() == 0 || !entry.file_type().is_dir() || !is_hidden(entry.path())
            });

        Box::new(walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() || entry.path().is_file() => {
                self.filter.should_include(entry.path()).then(|| entry.into_path())
            }
            Ok(_) => None,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                tracing::warn!(path = %path, "Skipping unreadable entry: {}", e);
                None
            }
        }))
    }
}

impl LibraryScanner for WalkDirScanner {
    fn discover<'a>(&'a self, roots: &'a [PathBuf]) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
        Box::new(roots.iter().flat_map(move |root| self.walk_root(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_photo(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        // Write minimal JPEG header
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    fn scanner() -> WalkDirScanner {
        WalkDirScanner::new(ScanConfig::default(), ImageFilter::new())
    }

    #[test]
    fn scan_empty_directory_finds_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let roots = vec![temp_dir.path().to_path_buf()];

        assert_eq!(scanner().discover(&roots).count(), 0);
    }

    #[test]
    fn scan_traverses_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let subdir = temp_dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();
        create_test_photo(temp_dir.path(), "root.jpg");
        create_test_photo(&subdir, "nested.PNG");
        File::create(temp_dir.path().join("notes.txt")).unwrap();

        let roots = vec![temp_dir.path().to_path_buf()];
        let found: Vec<PathBuf> = scanner().discover(&roots).collect();

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("subdir/nested.PNG")));
    }

    #[test]
    fn scan_accepts_single_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let photo = create_test_photo(temp_dir.path(), "single.jpeg");
        let text = temp_dir.path().join("single.txt");
        File::create(&text).unwrap();

        let roots = vec![photo.clone(), text];
        let found: Vec<PathBuf> = scanner().discover(&roots).collect();

        assert_eq!(found, vec![photo]);
    }

    #[test]
    fn scan_skips_missing_roots() {
        let temp_dir = TempDir::new().unwrap();
        create_test_photo(temp_dir.path(), "photo.jpg");

        let roots = vec![PathBuf::from("/nonexistent/path/12345"), temp_dir.path().to_path_buf()];

        assert_eq!(scanner().discover(&roots).count(), 1);
    }

    #[test]
    fn scan_skips_hidden_directories_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let hidden = temp_dir.path().join(".thumbnails");
        fs::create_dir(&hidden).unwrap();
        create_test_photo(&hidden, "thumb.jpg");
        create_test_photo(temp_dir.path(), "visible.jpg");

        let roots = vec![temp_dir.path().to_path_buf()];
        assert_eq!(scanner().discover(&roots).count(), 1);

        let config = ScanConfig {
            include_hidden: true,
            ..Default::default()
        };
        let permissive = WalkDirScanner::new(config, ImageFilter::new());
        assert_eq!(permissive.discover(&roots).count(), 2);
    }
}
