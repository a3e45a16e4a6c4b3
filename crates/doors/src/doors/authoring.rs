use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::identity::generate_door_id;
use super::index::SceneDoorIndex;
use crate::document::{
    DocumentAccessor, DocumentError, DocumentGuid, DoorLink, LevelDocument, Template,
    TemplateRepository, TemplateSource,
};

/// True when no door other than the one at `except` (an entity index)
/// already uses `id`.
pub fn is_id_unique_in_document(document: &LevelDocument, except: Option<usize>, id: &str) -> bool {
    !document
        .doors()
        .any(|(index, _, door)| Some(index) != except && door.id == id)
}

/// Gives a fresh `Door_xxxxx` id to every door that has none, or that still
/// carries the id stored on the template entity it was instanced from.
/// Returns how many ids were assigned.
pub fn assign_missing_ids<T: TemplateRepository + ?Sized>(
    document: &mut LevelDocument,
    templates: &T,
) -> usize {
    let mut cache: HashMap<String, Option<Template>> = HashMap::new();
    let mut pending = Vec::new();
    for (index, entity, door) in document.doors() {
        let inherited = entity
            .source
            .as_ref()
            .and_then(|source| template_door_id(&mut cache, templates, source))
            .is_some_and(|stored| !stored.is_empty() && stored == door.id);
        if door.id.trim().is_empty() || inherited {
            pending.push(index);
        }
    }

    let mut taken = document
        .doors()
        .map(|(_, _, door)| door.id.clone())
        .collect::<HashSet<_>>();
    for &index in &pending {
        let mut id = generate_door_id();
        while taken.contains(&id) {
            id = generate_door_id();
        }
        taken.insert(id.clone());
        if let Some(door) = document.entities[index].door_mut() {
            door.id = id;
        }
    }

    if !pending.is_empty() {
        debug!(guid = %document.guid, assigned = pending.len(), "door_ids_assigned");
    }
    pending.len()
}

fn template_door_id<T: TemplateRepository + ?Sized>(
    cache: &mut HashMap<String, Option<Template>>,
    templates: &T,
    source: &TemplateSource,
) -> Option<String> {
    let template = cache
        .entry(source.template.clone())
        .or_insert_with(|| match templates.load(&source.template) {
            Ok(template) => Some(template),
            Err(error) => {
                warn!(template = %source.template, error = %error, "template_unavailable");
                None
            }
        })
        .as_ref()?;
    template
        .entity(&source.entity)
        .and_then(|entity| entity.door())
        .map(|door| door.id.clone())
}

/// Empties every door id in `template`. Returns how many were cleared.
pub fn clear_template_ids(template: &mut Template) -> usize {
    template.clear_door_ids()
}

/// Replaces the link of the door at `entity_index`. Marks the document dirty
/// when anything changed and drops the door index when the target document
/// changed. Returns whether the link changed.
pub fn set_door_link<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    guid: &DocumentGuid,
    entity_index: usize,
    link: DoorLink,
    index: &mut SceneDoorIndex,
) -> Result<bool, DocumentError> {
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
    if door.link == link {
        return Ok(false);
    }

    let target_changed = door.link.target_document.guid != link.target_document.guid;
    door.link = link;
    accessor.mark_dirty(guid);
    if target_changed {
        index.invalidate_all();
    }
    debug!(guid = %guid, entity_index, target_changed, "door_link_set");
    Ok(true)
}
