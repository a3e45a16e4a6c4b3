use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::store::{has_extension, read_document, DOCUMENT_EXTENSION};
use super::types::{DocumentError, DocumentGuid};

/// Maps document guids to their current on-disk paths.
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    root: PathBuf,
    paths_by_guid: BTreeMap<DocumentGuid, PathBuf>,
}

impl DocumentCatalog {
    /// Scans `documents_dir` recursively. Unreadable documents are skipped
    /// with a warning; on a duplicate guid the first path in sorted order wins.
    pub fn scan(documents_dir: &Path) -> Result<Self, DocumentError> {
        let mut files = Vec::<(String, PathBuf)>::new();
        if documents_dir.is_dir() {
            collect_recursive(documents_dir, documents_dir, &mut files)?;
        }
        files.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut paths_by_guid: BTreeMap<DocumentGuid, PathBuf> = BTreeMap::new();
        for (rel, path) in files {
            let guid = match read_document(&path) {
                Ok(document) => document.guid,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        error = %error,
                        "document_catalog_skip_unreadable"
                    );
                    continue;
                }
            };
            if guid.is_blank() {
                warn!(path = %rel, "document_catalog_skip_blank_guid");
                continue;
            }
            if let Some(existing) = paths_by_guid.get(&guid) {
                warn!(
                    guid = %guid,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "document_catalog_duplicate_guid"
                );
                continue;
            }
            paths_by_guid.insert(guid, path);
        }

        debug!(
            documents_dir = %documents_dir.display(),
            document_count = paths_by_guid.len(),
            "document_catalog_scanned"
        );
        Ok(Self {
            root: documents_dir.to_path_buf(),
            paths_by_guid,
        })
    }

    pub fn path_of(&self, guid: &DocumentGuid) -> Option<&Path> {
        self.paths_by_guid.get(guid).map(PathBuf::as_path)
    }

    /// Project-relative path with forward slashes, suitable for a link's
    /// advisory path cache.
    pub fn display_path(&self, guid: &DocumentGuid) -> Option<String> {
        let path = self.path_of(guid)?;
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        Some(normalize_rel_path(rel))
    }

    pub fn guids(&self) -> impl Iterator<Item = &DocumentGuid> {
        self.paths_by_guid.keys()
    }

    pub fn len(&self) -> usize {
        self.paths_by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths_by_guid.is_empty()
    }

    pub(crate) fn insert(&mut self, guid: DocumentGuid, path: PathBuf) {
        self.paths_by_guid.insert(guid, path);
    }
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), DocumentError> {
    let entries = fs::read_dir(current).map_err(|source| DocumentError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| DocumentError::ReadDir {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
            continue;
        }
        if !has_extension(&path, DOCUMENT_EXTENSION) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(&path);
        files.push((normalize_rel_path(rel), path.clone()));
    }
    Ok(())
}

pub(crate) fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::document::store::write_json;
    use crate::document::types::LevelDocument;

    fn write_doc(dir: &Path, rel: &str, guid: &str) {
        let doc = LevelDocument::new(DocumentGuid::new(guid), rel);
        write_json(&dir.join(rel), &doc).expect("write doc");
    }

    #[test]
    fn scan_maps_guids_and_skips_other_files() {
        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path();
        write_doc(dir, "s1.doc.json", "g1");
        write_doc(dir, "nested/s2.doc.json", "g2");
        fs::write(dir.join("notes.txt"), "ignore me").expect("write txt");
        fs::write(dir.join("broken.doc.json"), "{ not json").expect("write broken");

        let catalog = DocumentCatalog::scan(dir).expect("scan");
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.display_path(&DocumentGuid::new("g2")).as_deref(),
            Some("nested/s2.doc.json")
        );
        assert!(catalog.path_of(&DocumentGuid::new("missing")).is_none());
    }

    #[test]
    fn duplicate_guid_keeps_first_sorted_path() {
        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path();
        write_doc(dir, "b.doc.json", "same");
        write_doc(dir, "a.doc.json", "same");

        let catalog = DocumentCatalog::scan(dir).expect("scan");
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.display_path(&DocumentGuid::new("same")).as_deref(),
            Some("a.doc.json")
        );
    }

    #[test]
    fn missing_directory_is_an_empty_catalog() {
        let temp = TempDir::new().expect("tempdir");
        let catalog = DocumentCatalog::scan(&temp.path().join("nope")).expect("scan");
        assert!(catalog.is_empty());
    }
}
