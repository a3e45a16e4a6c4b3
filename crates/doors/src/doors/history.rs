use tracing::debug;

use crate::document::{DocumentAccessor, DocumentError, DocumentGuid};

/// A reversible change of one door's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorIdEdit {
    pub document: DocumentGuid,
    pub entity_index: usize,
    pub previous: String,
    pub next: String,
}

/// Undo/redo record of door id edits. Only the door's own id is recorded;
/// link rewrites made while propagating a rename are not part of the record.
#[derive(Debug, Default)]
pub struct EditHistory {
    undo: Vec<DoorIdEdit>,
    redo: Vec<DoorIdEdit>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `edit` and records it. Clears the redo stack.
    pub fn record<A: DocumentAccessor + ?Sized>(
        &mut self,
        accessor: &mut A,
        edit: DoorIdEdit,
    ) -> Result<(), DocumentError> {
        set_door_id(accessor, &edit.document, edit.entity_index, &edit.next)?;
        debug!(
            guid = %edit.document,
            previous = %edit.previous,
            next = %edit.next,
            "door_id_edit_recorded"
        );
        self.undo.push(edit);
        self.redo.clear();
        Ok(())
    }

    pub fn undo<A: DocumentAccessor + ?Sized>(
        &mut self,
        accessor: &mut A,
    ) -> Result<Option<DoorIdEdit>, DocumentError> {
        let Some(edit) = self.undo.pop() else {
            return Ok(None);
        };
        if let Err(error) = set_door_id(accessor, &edit.document, edit.entity_index, &edit.previous)
        {
            self.undo.push(edit);
            return Err(error);
        }
        self.redo.push(edit.clone());
        Ok(Some(edit))
    }

    pub fn redo<A: DocumentAccessor + ?Sized>(
        &mut self,
        accessor: &mut A,
    ) -> Result<Option<DoorIdEdit>, DocumentError> {
        let Some(edit) = self.redo.pop() else {
            return Ok(None);
        };
        if let Err(error) = set_door_id(accessor, &edit.document, edit.entity_index, &edit.next) {
            self.redo.push(edit);
            return Err(error);
        }
        self.undo.push(edit.clone());
        Ok(Some(edit))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

fn set_door_id<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    guid: &DocumentGuid,
    entity_index: usize,
    id: &str,
) -> Result<(), DocumentError> {
    let document = accessor
        .get_mut(guid)
        .ok_or_else(|| DocumentError::NotLoaded { guid: guid.clone() })?;
    let door = document
        .entities
        .get_mut(entity_index)
        .and_then(|entity| entity.door_mut())
        .ok_or_else(|| DocumentError::NotADoor {
            guid: guid.clone(),
            entity_index,
        })?;
    door.id = id.to_string();
    accessor.mark_dirty(guid);
    Ok(())
}
