use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::authoring::is_id_unique_in_document;
use super::history::{DoorIdEdit, EditHistory};
use super::identity::{is_valid_id, DoorAddress};
use crate::cancel::CancellationToken;
use crate::document::{
    DocumentAccessor, DocumentError, DocumentGuid, Entity, ScopedDocument, TemplateId,
    TemplateRepository,
};

/// Which persistence domains a rename reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenameScope {
    /// Loaded documents and templates.
    #[default]
    OpenAndTemplates,
    /// Additionally sweeps every document on disk that is not loaded.
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub document: DocumentGuid,
    pub old_id: String,
    pub new_id: String,
    pub scope: RenameScope,
}

impl RenameRequest {
    pub fn new(
        document: DocumentGuid,
        old_id: impl Into<String>,
        new_id: impl Into<String>,
        scope: RenameScope,
    ) -> Self {
        Self {
            document,
            old_id: old_id.into(),
            new_id: new_id.into(),
            scope,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("'{id}' is not a valid door id")]
    InvalidNewId { id: String },
    #[error("door id '{id}' is already used in document '{document}'")]
    DuplicateNewId { id: String, document: DocumentGuid },
    #[error("document '{guid}' must be open to rename its doors")]
    DocumentNotLoaded { guid: DocumentGuid },
    #[error("document '{guid}' has no door '{id}'")]
    DoorNotFound { guid: DocumentGuid, id: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Progress of the on-disk sweep, reported before each document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepProgress {
    pub processed: usize,
    pub total: usize,
    pub current: DocumentGuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Loaded documents whose links changed; marked dirty, not saved.
    pub open_documents: Vec<(DocumentGuid, usize)>,
    /// Templates whose links changed; already saved.
    pub templates: Vec<(TemplateId, usize)>,
    /// On-disk documents whose links changed; already saved.
    pub swept_documents: Vec<(DocumentGuid, usize)>,
    /// Documents left to the open-document pass.
    pub skipped: Vec<DocumentGuid>,
    pub failed: Vec<(DocumentGuid, String)>,
    /// Templates that could not be loaded or saved; their links are unchanged.
    pub failed_templates: Vec<(TemplateId, String)>,
    pub cancelled: bool,
    /// Whether the door's own id was changed. False for a no-op request or a
    /// cancelled sweep.
    pub committed: bool,
}

impl RenameReport {
    pub fn links_changed(&self) -> usize {
        self.open_documents
            .iter()
            .chain(&self.swept_documents)
            .map(|(_, count)| count)
            .chain(self.templates.iter().map(|(_, count)| count))
            .sum()
    }
}

/// Cascading rename of one door id across loaded documents, templates and,
/// optionally, every other document on disk.
///
/// All checks run before anything is touched. Propagation is not
/// transactional: documents and templates that fail are recorded in the
/// report and skipped. The door's own id is committed through
/// [`EditHistory`] only when propagation ran to the end; a cancelled sweep
/// keeps what it already saved and leaves the id alone.
pub struct ReferenceRenamer<'a, A: DocumentAccessor + ?Sized, T: TemplateRepository + ?Sized> {
    accessor: &'a mut A,
    templates: &'a mut T,
}

impl<'a, A: DocumentAccessor + ?Sized, T: TemplateRepository + ?Sized> ReferenceRenamer<'a, A, T> {
    pub fn new(accessor: &'a mut A, templates: &'a mut T) -> Self {
        Self {
            accessor,
            templates,
        }
    }

    pub fn rename(
        &mut self,
        request: &RenameRequest,
        history: &mut EditHistory,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(&SweepProgress),
    ) -> Result<RenameReport, RenameError> {
        let new_id = request.new_id.trim();
        let old_id = request.old_id.as_str();
        let mut report = RenameReport::default();
        if new_id == old_id {
            debug!(guid = %request.document, id = old_id, "door_rename_noop");
            return Ok(report);
        }
        let entity_index = self.check(request, new_id)?;
        let target = DoorAddress::new(request.document.clone(), old_id);

        let loaded_at_start = self.accessor.loaded_documents();
        self.rename_in_open_documents(&loaded_at_start, &target, new_id, &mut report);
        self.rename_in_templates(&target, new_id, &mut report)?;
        if request.scope == RenameScope::Project {
            self.sweep_documents(
                &loaded_at_start,
                &target,
                new_id,
                cancel,
                &mut on_progress,
                &mut report,
            );
        }
        if report.cancelled {
            warn!(
                door = %target,
                new_id,
                links_changed = report.links_changed(),
                "door_rename_cancelled_before_commit"
            );
            return Ok(report);
        }

        history.record(
            &mut *self.accessor,
            DoorIdEdit {
                document: request.document.clone(),
                entity_index,
                previous: old_id.to_string(),
                next: new_id.to_string(),
            },
        )?;
        report.committed = true;
        info!(
            door = %target,
            new_id,
            links_changed = report.links_changed(),
            failed = report.failed.len(),
            failed_templates = report.failed_templates.len(),
            "door_rename_committed"
        );
        Ok(report)
    }

    fn check(&self, request: &RenameRequest, new_id: &str) -> Result<usize, RenameError> {
        if !is_valid_id(new_id) {
            return Err(RenameError::InvalidNewId {
                id: new_id.to_string(),
            });
        }
        let document = self.accessor.get(&request.document).ok_or_else(|| {
            RenameError::DocumentNotLoaded {
                guid: request.document.clone(),
            }
        })?;
        let (entity_index, _) =
            document
                .find_door(&request.old_id)
                .ok_or_else(|| RenameError::DoorNotFound {
                    guid: request.document.clone(),
                    id: request.old_id.clone(),
                })?;
        if !is_id_unique_in_document(document, Some(entity_index), new_id) {
            return Err(RenameError::DuplicateNewId {
                id: new_id.to_string(),
                document: request.document.clone(),
            });
        }
        Ok(entity_index)
    }

    fn rename_in_open_documents(
        &mut self,
        loaded: &[DocumentGuid],
        target: &DoorAddress,
        new_id: &str,
        report: &mut RenameReport,
    ) {
        for guid in loaded {
            let Some(document) = self.accessor.get_mut(guid) else {
                continue;
            };
            let changed = replace_links(&mut document.entities, target, new_id);
            if changed > 0 {
                self.accessor.mark_dirty(guid);
                debug!(guid = %guid, changed, "door_links_renamed_in_open_document");
                report.open_documents.push((guid.clone(), changed));
            }
        }
    }

    fn rename_in_templates(
        &mut self,
        target: &DoorAddress,
        new_id: &str,
        report: &mut RenameReport,
    ) -> Result<(), RenameError> {
        for id in self.templates.template_ids()? {
            let mut template = match self.templates.load(&id) {
                Ok(template) => template,
                Err(error) => {
                    warn!(template = %id, error = %error, "template_skipped");
                    report.failed_templates.push((id, error.to_string()));
                    continue;
                }
            };
            let changed = replace_links(&mut template.entities, target, new_id);
            if changed == 0 {
                continue;
            }
            match self.templates.save(&id, &template) {
                Ok(()) => {
                    debug!(template = %id, changed, "door_links_renamed_in_template");
                    report.templates.push((id, changed));
                }
                Err(error) => {
                    warn!(template = %id, error = %error, "template_save_failed");
                    report.failed_templates.push((id, error.to_string()));
                }
            }
        }
        Ok(())
    }

    fn sweep_documents(
        &mut self,
        loaded_at_start: &[DocumentGuid],
        target: &DoorAddress,
        new_id: &str,
        cancel: &CancellationToken,
        on_progress: &mut impl FnMut(&SweepProgress),
        report: &mut RenameReport,
    ) {
        let skip = loaded_at_start.iter().collect::<BTreeSet<_>>();
        let mut pending = Vec::new();
        for guid in self.accessor.all_documents() {
            if skip.contains(&guid) {
                report.skipped.push(guid);
            } else {
                pending.push(guid);
            }
        }

        let total = pending.len();
        for (processed, guid) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed, total, "door_rename_sweep_cancelled");
                report.cancelled = true;
                return;
            }
            on_progress(&SweepProgress {
                processed,
                total,
                current: guid.clone(),
            });
            match sweep_one(&mut *self.accessor, &guid, target, new_id) {
                Ok(0) => {}
                Ok(changed) => report.swept_documents.push((guid, changed)),
                Err(error) => {
                    warn!(guid = %guid, error = %error, "door_rename_sweep_document_failed");
                    report.failed.push((guid, error.to_string()));
                }
            }
        }
    }
}

fn sweep_one<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    guid: &DocumentGuid,
    target: &DoorAddress,
    new_id: &str,
) -> Result<usize, DocumentError> {
    let mut scope = ScopedDocument::open(accessor, guid)?;
    let changed = replace_links(&mut scope.document_mut()?.entities, target, new_id);
    if changed > 0 {
        scope.save()?;
        debug!(guid = %guid, changed, "door_links_renamed_on_disk");
    }
    Ok(changed)
}

fn replace_links(entities: &mut [Entity], target: &DoorAddress, new_id: &str) -> usize {
    let mut changed = 0;
    for door in entities.iter_mut().filter_map(Entity::door_mut) {
        if door.link.points_at(&target.document, &target.door_id) {
            door.link.target_door_id = new_id.to_string();
            changed += 1;
        }
    }
    changed
}
