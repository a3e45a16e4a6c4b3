use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::accessor::DocumentAccessor;
use super::catalog::DocumentCatalog;
use super::store::{read_document, write_json, DOCUMENT_EXTENSION};
use super::types::{DocumentError, DocumentGuid, DocumentRef, LevelDocument};

#[derive(Debug)]
struct LoadedDocument {
    path: PathBuf,
    document: LevelDocument,
    dirty: bool,
    authoring: bool,
}

/// The authoring environment's view of a project's level documents.
///
/// Documents opened with [`Workspace::open_for_authoring`] stay loaded until
/// the operator closes them; documents loaded through [`DocumentAccessor`]
/// are transient and are expected to be released by whoever loaded them.
#[derive(Debug)]
pub struct Workspace {
    documents_dir: PathBuf,
    catalog: DocumentCatalog,
    loaded: BTreeMap<DocumentGuid, LoadedDocument>,
}

impl Workspace {
    pub fn open(documents_dir: &Path) -> Result<Self, DocumentError> {
        let catalog = DocumentCatalog::scan(documents_dir)?;
        info!(
            documents_dir = %documents_dir.display(),
            document_count = catalog.len(),
            "workspace_opened"
        );
        Ok(Self {
            documents_dir: documents_dir.to_path_buf(),
            catalog,
            loaded: BTreeMap::new(),
        })
    }

    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    /// Creates `<documents_dir>/<file_stem>.doc.json` with a fresh guid and
    /// opens it for authoring. An existing file at that path is left alone.
    pub fn create_document(
        &mut self,
        file_stem: &str,
        name: &str,
    ) -> Result<DocumentGuid, DocumentError> {
        let guid = DocumentGuid::generate();
        let path = self
            .documents_dir
            .join(format!("{file_stem}{DOCUMENT_EXTENSION}"));
        if path.exists() {
            return Err(DocumentError::AlreadyExists { path });
        }
        let document = LevelDocument::new(guid.clone(), name);
        write_json(&path, &document)?;
        self.catalog.insert(guid.clone(), path.clone());
        self.loaded.insert(
            guid.clone(),
            LoadedDocument {
                path,
                document,
                dirty: false,
                authoring: true,
            },
        );
        info!(guid = %guid, name, "document_created");
        Ok(guid)
    }

    pub fn open_for_authoring(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError> {
        self.load(guid)?;
        if let Some(entry) = self.loaded.get_mut(guid) {
            entry.authoring = true;
        }
        Ok(())
    }

    /// Closes a loaded document. Unsaved changes are refused unless
    /// `discard_changes` is set.
    pub fn close(
        &mut self,
        guid: &DocumentGuid,
        discard_changes: bool,
    ) -> Result<(), DocumentError> {
        let Some(entry) = self.loaded.get(guid) else {
            return Err(DocumentError::NotLoaded { guid: guid.clone() });
        };
        if entry.dirty && !discard_changes {
            return Err(DocumentError::UnsavedChanges { guid: guid.clone() });
        }
        self.loaded.remove(guid);
        Ok(())
    }

    /// Saves every dirty loaded document, returning how many were written.
    pub fn save_all(&mut self) -> Result<usize, DocumentError> {
        let dirty = self
            .loaded
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(guid, _)| guid.clone())
            .collect::<Vec<_>>();
        for guid in &dirty {
            self.save(guid)?;
        }
        Ok(dirty.len())
    }

    /// A reference to `guid` carrying its current path as the advisory cache.
    pub fn document_ref(&self, guid: &DocumentGuid) -> Option<DocumentRef> {
        let path = self.catalog.display_path(guid)?;
        Some(DocumentRef::new(guid.clone(), path))
    }
}

impl DocumentAccessor for Workspace {
    fn all_documents(&self) -> Vec<DocumentGuid> {
        self.catalog.guids().cloned().collect()
    }

    fn loaded_documents(&self) -> Vec<DocumentGuid> {
        self.loaded.keys().cloned().collect()
    }

    fn resolve(&self, guid: &DocumentGuid) -> Option<&Path> {
        self.catalog.path_of(guid)
    }

    fn is_loaded(&self, guid: &DocumentGuid) -> bool {
        self.loaded.contains_key(guid)
    }

    fn load(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError> {
        if self.loaded.contains_key(guid) {
            return Ok(());
        }
        let path = self
            .catalog
            .path_of(guid)
            .ok_or_else(|| DocumentError::UnknownDocument { guid: guid.clone() })?
            .to_path_buf();
        let document = read_document(&path)?;
        debug!(guid = %guid, path = %path.display(), "document_loaded");
        self.loaded.insert(
            guid.clone(),
            LoadedDocument {
                path,
                document,
                dirty: false,
                authoring: false,
            },
        );
        Ok(())
    }

    fn unload(&mut self, guid: &DocumentGuid) {
        let Some(entry) = self.loaded.get(guid) else {
            return;
        };
        if entry.authoring {
            debug!(guid = %guid, "document_unload_skipped_authoring");
            return;
        }
        self.loaded.remove(guid);
        debug!(guid = %guid, "document_unloaded");
    }

    fn get(&self, guid: &DocumentGuid) -> Option<&LevelDocument> {
        self.loaded.get(guid).map(|entry| &entry.document)
    }

    fn get_mut(&mut self, guid: &DocumentGuid) -> Option<&mut LevelDocument> {
        self.loaded.get_mut(guid).map(|entry| &mut entry.document)
    }

    fn mark_dirty(&mut self, guid: &DocumentGuid) {
        if let Some(entry) = self.loaded.get_mut(guid) {
            entry.dirty = true;
        }
    }

    fn is_dirty(&self, guid: &DocumentGuid) -> bool {
        self.loaded.get(guid).is_some_and(|entry| entry.dirty)
    }

    fn save(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError> {
        let entry = self
            .loaded
            .get_mut(guid)
            .ok_or_else(|| DocumentError::NotLoaded { guid: guid.clone() })?;
        write_json(&entry.path, &entry.document)?;
        entry.dirty = false;
        debug!(guid = %guid, path = %entry.path.display(), "document_saved");
        Ok(())
    }
}
