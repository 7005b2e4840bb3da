use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sisxml_recon::error::ReconError;
use sisxml_recon::source::{DirectoryListing, DocumentSource};

/// Folders on local disk. Listings hold regular files only, sorted by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl DirectoryListing for FsSource {
    fn list(&self, location: &Path) -> Result<Vec<String>, ReconError> {
        let entries = std::fs::read_dir(location).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ReconError::MissingSource(location.to_path_buf()),
            _ => ReconError::io(location, e),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReconError::io(location, e))?;
            // follows symlinks
            if !entry.path().is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::debug!("skipping non-UTF-8 file name {raw:?} in {}", location.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, location: &Path) -> bool {
        location.is_dir()
    }
}

impl DocumentSource for FsSource {
    fn read(&self, location: &Path, name: &str) -> Result<Vec<u8>, ReconError> {
        let path = location.join(name);
        std::fs::read(&path).map_err(|e| ReconError::io(path, e))
    }

    fn read_prefix(&self, location: &Path, name: &str, limit: usize) -> Result<Vec<u8>, ReconError> {
        let path = location.join(name);
        let file = File::open(&path).map_err(|e| ReconError::io(&path, e))?;
        let mut bytes = Vec::with_capacity(limit.min(64 * 1024));
        file.take(limit as u64)
            .read_to_end(&mut bytes)
            .map_err(|e| ReconError::io(&path, e))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glob::Pattern;

    #[test]
    fn lists_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.xml"), "b").unwrap();
        std::fs::write(dir.path().join("a.xml"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub.xml")).unwrap();

        let names = FsSource.list(dir.path()).unwrap();
        assert_eq!(names, vec!["a.xml", "b.xml"]);
        assert!(FsSource.exists(dir.path()));
    }

    #[test]
    fn missing_directory_is_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        assert!(matches!(FsSource.list(&gone), Err(ReconError::MissingSource(_))));
        assert!(!FsSource.exists(&gone));
    }

    #[test]
    fn prefix_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ret-00000043.txt"), "0123456789").unwrap();
        std::fs::write(dir.path().join("ret-00000044.txt"), "x").unwrap();

        assert_eq!(
            FsSource.read_prefix(dir.path(), "ret-00000043.txt", 4).unwrap(),
            b"0123"
        );
        let pattern = Pattern::new("*00000043*.txt").unwrap();
        assert_eq!(
            FsSource.matching(dir.path(), &pattern).unwrap(),
            vec!["ret-00000043.txt"]
        );
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsSource.read(dir.path(), "nope.xml").unwrap_err();
        assert!(matches!(err, ReconError::Io { .. }));
    }
}
