use std::path::Path;

use tracing::debug;

use super::types::{DocumentError, DocumentGuid, LevelDocument};

/// Open-if-needed / iterate / close access to the project's level documents.
///
/// A document is "loaded" while it is held in memory, whether the operator
/// opened it or an operation opened it transiently. Mutations go through
/// `get_mut` and become durable only through `save`; `mark_dirty` records
/// that a loaded document diverges from disk without persisting it.
pub trait DocumentAccessor {
    /// Every document the project knows about, in guid order.
    fn all_documents(&self) -> Vec<DocumentGuid>;

    /// Documents currently loaded, in guid order.
    fn loaded_documents(&self) -> Vec<DocumentGuid>;

    /// Current on-disk location of `guid`, if the project contains it.
    fn resolve(&self, guid: &DocumentGuid) -> Option<&Path>;

    fn is_loaded(&self, guid: &DocumentGuid) -> bool;

    /// Loads `guid` from disk. Loading an already loaded document is a no-op.
    fn load(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError>;

    /// Drops a transiently loaded `guid` from memory, discarding unsaved
    /// changes. Documents the operator opened stay loaded.
    fn unload(&mut self, guid: &DocumentGuid);

    fn get(&self, guid: &DocumentGuid) -> Option<&LevelDocument>;

    fn get_mut(&mut self, guid: &DocumentGuid) -> Option<&mut LevelDocument>;

    fn mark_dirty(&mut self, guid: &DocumentGuid);

    fn is_dirty(&self, guid: &DocumentGuid) -> bool;

    fn save(&mut self, guid: &DocumentGuid) -> Result<(), DocumentError>;
}

/// Scoped acquisition of a document: loads it if needed and unloads it again
/// on drop, but only when this scope was the one that loaded it.
pub struct ScopedDocument<'a, A: DocumentAccessor + ?Sized> {
    accessor: &'a mut A,
    guid: DocumentGuid,
    opened_here: bool,
}

impl<'a, A: DocumentAccessor + ?Sized> ScopedDocument<'a, A> {
    pub fn open(accessor: &'a mut A, guid: &DocumentGuid) -> Result<Self, DocumentError> {
        let opened_here = !accessor.is_loaded(guid);
        if opened_here {
            accessor.load(guid)?;
            debug!(guid = %guid, "document_opened_transiently");
        }
        Ok(Self {
            accessor,
            guid: guid.clone(),
            opened_here,
        })
    }

    pub fn guid(&self) -> &DocumentGuid {
        &self.guid
    }

    pub fn opened_here(&self) -> bool {
        self.opened_here
    }

    pub fn document(&self) -> Result<&LevelDocument, DocumentError> {
        self.accessor
            .get(&self.guid)
            .ok_or_else(|| DocumentError::NotLoaded {
                guid: self.guid.clone(),
            })
    }

    pub fn document_mut(&mut self) -> Result<&mut LevelDocument, DocumentError> {
        let guid = &self.guid;
        self.accessor
            .get_mut(guid)
            .ok_or_else(|| DocumentError::NotLoaded { guid: guid.clone() })
    }

    pub fn save(&mut self) -> Result<(), DocumentError> {
        self.accessor.save(&self.guid)
    }

    /// The accessor behind this scope, for opening further documents while
    /// this one stays loaded.
    pub fn accessor(&mut self) -> &mut A {
        &mut *self.accessor
    }
}

impl<A: DocumentAccessor + ?Sized> Drop for ScopedDocument<'_, A> {
    fn drop(&mut self) {
        if self.opened_here {
            self.accessor.unload(&self.guid);
            debug!(guid = %self.guid, "document_closed_transiently");
        }
    }
}
