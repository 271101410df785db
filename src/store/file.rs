//! Whole-document JSON persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Read and parse a JSON document. A missing file yields `T::default()`.
pub(crate) fn read_document<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Overwrite `path` with the pretty-printed document.
///
/// Writes a sibling temp file first and renames it into place, so readers
/// see either the old document or the new one, never a torn write.
pub(crate) fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(doc)?;
    let tmp = temp_path(path);
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Size of the file in bytes; 0 if it does not exist.
pub(crate) fn file_size(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheDocument;

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc: CacheDocument = read_document(&dir.path().join("absent.json")).unwrap();
        assert_eq!(doc, CacheDocument::default());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(read_document::<CacheDocument>(&path).is_err());
    }

    #[test]
    fn write_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        write_document(&path, &CacheDocument::default()).unwrap();

        let back: CacheDocument = read_document(&path).unwrap();
        assert_eq!(back, CacheDocument::default());

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn file_size_of_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_size(&dir.path().join("nope.json")).unwrap(), 0);
    }
}
