//! Memory-mapped file reads for large images.
//!
//! Scans are often tens of megabytes; mapping them avoids a kernel copy.
//! Small files go through `fs::read`, which is cheaper at that size.

use crate::error::HashError;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Minimum file size to use memory-mapped I/O (1MB)
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Read a file, memory-mapping it when it is at least 1MB.
pub fn read_file_bytes(path: &Path) -> Result<FileBytes, HashError> {
    let io_error = |source| HashError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;

    if metadata.len() < MMAP_THRESHOLD {
        return std::fs::read(path).map(FileBytes::Vec).map_err(io_error);
    }

    let file = File::open(path).map_err(io_error)?;

    // SAFETY: the map is read-only and owns its own handle to the file.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;

    Ok(FileBytes::Mmap(mmap))
}

/// File bytes that may be either owned or memory-mapped.
pub enum FileBytes {
    Vec(Vec<u8>),
    Mmap(Mmap),
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            FileBytes::Vec(v) => v,
            FileBytes::Mmap(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn small_files_are_read_into_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let bytes = read_file_bytes(&path).unwrap();
        assert!(matches!(bytes, FileBytes::Vec(_)));
        assert_eq!(&*bytes, &[1, 2, 3]);
    }

    #[test]
    fn large_files_are_mapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![7u8; MMAP_THRESHOLD as usize]).unwrap();
        drop(file);

        let bytes = read_file_bytes(&path).unwrap();
        assert!(matches!(bytes, FileBytes::Mmap(_)));
        assert_eq!(bytes.len(), MMAP_THRESHOLD as usize);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = read_file_bytes(Path::new("/nonexistent/scan.tif"));
        assert!(matches!(result, Err(HashError::IoError { .. })));
    }
}
