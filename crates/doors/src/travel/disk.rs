use std::path::Path;

use tracing::{debug, info};

use super::{LevelHost, LoadPoll};
use crate::document::{read_document, DocumentCatalog, DocumentError, DocumentGuid, LevelDocument};

/// Runtime level host reading documents straight from the project catalog.
/// A load requested with `begin_load` completes on the following poll.
#[derive(Debug)]
pub struct DiskLevelHost {
    catalog: DocumentCatalog,
    active: Option<LevelDocument>,
    pending: Option<DocumentGuid>,
}

impl DiskLevelHost {
    pub fn open(documents_dir: &Path) -> Result<Self, DocumentError> {
        Ok(Self::with_catalog(DocumentCatalog::scan(documents_dir)?))
    }

    pub fn with_catalog(catalog: DocumentCatalog) -> Self {
        Self {
            catalog,
            active: None,
            pending: None,
        }
    }

    /// Makes `guid` the active document immediately.
    pub fn start(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError> {
        let document = self.read(guid)?;
        info!(guid = %guid, name = %document.name, "level_started");
        self.active = Some(document);
        self.pending = None;
        Ok(())
    }

    fn read(&self, guid: &DocumentGuid) -> Result<LevelDocument, DocumentError> {
        let path = self
            .catalog
            .path_of(guid)
            .ok_or_else(|| DocumentError::UnknownDocument { guid: guid.clone() })?;
        read_document(path)
    }
}

impl LevelHost for DiskLevelHost {
    fn active_guid(&self) -> Option<&DocumentGuid> {
        self.active.as_ref().map(|document| &document.guid)
    }

    fn active_document(&self) -> Option<&LevelDocument> {
        self.active.as_ref()
    }

    fn begin_load(&mut self, guid: &DocumentGuid) {
        debug!(guid = %guid, "level_load_requested");
        self.pending = Some(guid.clone());
    }

    fn poll_load(&mut self) -> LoadPoll {
        let Some(guid) = self.pending.take() else {
            return LoadPoll::Failed("no level load in progress".to_string());
        };
        match self.read(&guid) {
            Ok(document) => {
                info!(guid = %guid, name = %document.name, "level_loaded");
                self.active = Some(document);
                LoadPoll::Ready
            }
            Err(error) => LoadPoll::Failed(error.to_string()),
        }
    }
}
