use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::document::{
    DocumentAccessor, DocumentError, DocumentGuid, DoorLink, LevelDocument, ScopedDocument,
};

use super::identity::is_valid_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    InvalidIdFormat,
    DuplicateId,
    EmptyTargetDocument,
    EmptyTargetDoorId,
    SelfLink,
    UnresolvedTargetDocument,
    UnresolvedTargetDoor,
}

/// Points at the door an error is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorRef {
    pub document: DocumentGuid,
    pub document_name: String,
    pub entity_index: usize,
    pub entity_name: String,
    pub door_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub door: DoorRef,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.door.document_name, self.message)
    }
}

#[derive(Debug, Clone)]
struct DoorRecord {
    door: DoorRef,
    link: DoorLink,
}

/// Read-only scan of a document's doors for id format, id uniqueness and
/// link integrity problems.
pub struct DoorValidator<'a, A: DocumentAccessor + ?Sized> {
    accessor: &'a mut A,
}

impl<'a, A: DocumentAccessor + ?Sized> DoorValidator<'a, A> {
    pub fn new(accessor: &'a mut A) -> Self {
        Self { accessor }
    }

    /// Validates every door of `guid`. Door problems come back as data in
    /// encounter order; `Err` only means `guid` itself could not be opened.
    pub fn validate(
        &mut self,
        guid: &DocumentGuid,
    ) -> Result<Vec<ValidationError>, DocumentError> {
        let mut scope = ScopedDocument::open(&mut *self.accessor, guid)?;
        let doors = door_records(scope.document()?);

        let mut errors = check_ids(&doors);
        let mut targets = HashMap::<DocumentGuid, Option<HashSet<String>>>::new();
        for record in &doors {
            if let Some(error) = check_link(scope.accessor(), guid, record, &mut targets) {
                errors.push(error);
            }
        }

        debug!(
            guid = %guid,
            door_count = doors.len(),
            error_count = errors.len(),
            "doors_validated"
        );
        Ok(errors)
    }
}

fn door_records(document: &LevelDocument) -> Vec<DoorRecord> {
    document
        .doors()
        .map(|(index, entity, door)| DoorRecord {
            door: DoorRef {
                document: document.guid.clone(),
                document_name: document.name.clone(),
                entity_index: index,
                entity_name: entity.name.clone(),
                door_id: door.id.clone(),
            },
            link: door.link.clone(),
        })
        .collect()
}

fn check_ids(doors: &[DoorRecord]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::<&str>::new();
    for record in doors {
        let id = record.door.door_id.as_str();
        if !is_valid_id(id) {
            errors.push(error(
                ValidationErrorKind::InvalidIdFormat,
                format!(
                    "Door '{}' has invalid id '{id}'. Allowed [0-9a-zA-Z_-], length 1..64.",
                    record.door.entity_name
                ),
                record,
            ));
            continue;
        }
        if !seen.insert(id) {
            errors.push(error(
                ValidationErrorKind::DuplicateId,
                format!(
                    "Duplicate door id '{id}' in document '{}'.",
                    record.door.document_name
                ),
                record,
            ));
        }
    }
    errors
}

fn check_link<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    own_document: &DocumentGuid,
    record: &DoorRecord,
    targets: &mut HashMap<DocumentGuid, Option<HashSet<String>>>,
) -> Option<ValidationError> {
    let link = &record.link;
    if link.is_unset() {
        return None;
    }

    let id = &record.door.door_id;
    if link.target_document.is_empty() {
        return Some(error(
            ValidationErrorKind::EmptyTargetDocument,
            format!("Door '{id}' has no target document."),
            record,
        ));
    }
    if link.target_door_id.trim().is_empty() {
        return Some(error(
            ValidationErrorKind::EmptyTargetDoorId,
            format!("Door '{id}' has empty target door id."),
            record,
        ));
    }
    if !own_document.is_blank() && link.points_at(own_document, id) {
        return Some(error(
            ValidationErrorKind::SelfLink,
            format!("Door '{id}' points to itself. Self-links are not allowed."),
            record,
        ));
    }

    let target = &link.target_document.guid;
    let door_ids = match targets.entry(target.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => entry.insert(target_door_ids(accessor, target)),
    };
    match door_ids {
        None => Some(error(
            ValidationErrorKind::UnresolvedTargetDocument,
            format!("Door '{id}' points to missing document guid '{target}'."),
            record,
        )),
        Some(ids) if !ids.contains(&link.target_door_id) => Some(error(
            ValidationErrorKind::UnresolvedTargetDoor,
            format!(
                "Door '{id}' points to missing target door '{}' in document '{}'.",
                link.target_door_id,
                describe_target(accessor, link)
            ),
            record,
        )),
        Some(_) => None,
    }
}

/// Door ids of `target`, or `None` when the document cannot be found or opened.
fn target_door_ids<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    target: &DocumentGuid,
) -> Option<HashSet<String>> {
    if !accessor.is_loaded(target) && accessor.resolve(target).is_none() {
        return None;
    }
    match ScopedDocument::open(accessor, target) {
        Ok(scope) => {
            let document = scope.document().ok()?;
            Some(
                document
                    .doors()
                    .map(|(_, _, door)| door.id.clone())
                    .filter(|id| !id.is_empty())
                    .collect(),
            )
        }
        Err(error) => {
            debug!(guid = %target, error = %error, "validation_target_unopenable");
            None
        }
    }
}

fn describe_target<A: DocumentAccessor + ?Sized>(accessor: &A, link: &DoorLink) -> String {
    let guid = &link.target_document.guid;
    match accessor.get(guid) {
        Some(document) => document.name.clone(),
        None if !link.target_document.cached_path.is_empty() => {
            link.target_document.cached_path.clone()
        }
        None => guid.to_string(),
    }
}

fn error(kind: ValidationErrorKind, message: String, record: &DoorRecord) -> ValidationError {
    ValidationError {
        kind,
        message,
        door: record.door.clone(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::document::{Door, DocumentRef, Entity, Vec2, Workspace};

    struct Project {
        _temp: TempDir,
        workspace: Workspace,
        s1: DocumentGuid,
        s2: DocumentGuid,
    }

    fn door(id: &str, target: Option<(&DocumentGuid, &str)>) -> Door {
        let link = match target {
            Some((guid, target_id)) => {
                DoorLink::new(DocumentRef::new(guid.clone(), ""), target_id)
            }
            None => DoorLink::default(),
        };
        Door::new(id, link)
    }

    fn push_door(workspace: &mut Workspace, guid: &DocumentGuid, name: &str, door: Door) {
        workspace
            .get_mut(guid)
            .expect("loaded")
            .entities
            .push(Entity::with_door(name, Vec2::default(), door));
        workspace.mark_dirty(guid);
    }

    /// S1: `start` -> S2/`entry`, plus two doors named `room`. S2: `entry`.
    fn scenario_project() -> Project {
        let temp = TempDir::new().expect("tempdir");
        let mut workspace = Workspace::open(temp.path()).expect("workspace");
        let s1 = workspace.create_document("s1", "S1").expect("s1");
        let s2 = workspace.create_document("s2", "S2").expect("s2");
        push_door(&mut workspace, &s1, "start", door("start", Some((&s2, "entry"))));
        push_door(&mut workspace, &s1, "room_a", door("room", None));
        push_door(&mut workspace, &s1, "room_b", door("room", None));
        push_door(&mut workspace, &s2, "entry", door("entry", None));
        workspace.save_all().expect("save");
        Project {
            _temp: temp,
            workspace,
            s1,
            s2,
        }
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|error| error.kind).collect()
    }

    #[test]
    fn scenario_duplicate_room_and_valid_link() {
        let mut project = scenario_project();
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s1)
            .expect("validate s1");
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::DuplicateId]);
        assert_eq!(errors[0].door.entity_name, "room_b");
        assert!(errors.iter().all(|error| error.door.door_id != "start"));

        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s2)
            .expect("validate s2");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn k_copies_of_an_id_yield_k_minus_one_duplicates() {
        let mut project = scenario_project();
        for name in ["room_c", "room_d"] {
            push_door(&mut project.workspace, &project.s1, name, door("room", None));
        }
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s1)
            .expect("validate");
        let duplicates = errors
            .iter()
            .filter(|error| error.kind == ValidationErrorKind::DuplicateId)
            .count();
        assert_eq!(duplicates, 3);
    }

    #[test]
    fn invalid_ids_are_reported_and_not_counted_as_duplicates() {
        let mut project = scenario_project();
        push_door(&mut project.workspace, &project.s2, "bad_a", door("no spaces", None));
        push_door(&mut project.workspace, &project.s2, "bad_b", door("no spaces", None));
        push_door(&mut project.workspace, &project.s2, "blank", door("", None));
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s2)
            .expect("validate");
        assert_eq!(
            kinds(&errors),
            vec![ValidationErrorKind::InvalidIdFormat; 3]
        );
    }

    #[test]
    fn self_link_is_reported_once_without_unresolved_door() {
        let mut project = scenario_project();
        let s2 = project.s2.clone();
        push_door(&mut project.workspace, &s2, "loop", door("loop", Some((&s2, "loop"))));
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&s2)
            .expect("validate");
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::SelfLink]);
    }

    #[test]
    fn link_to_another_door_in_same_document_resolves() {
        let mut project = scenario_project();
        let s2 = project.s2.clone();
        push_door(&mut project.workspace, &s2, "back", door("back", Some((&s2, "entry"))));
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&s2)
            .expect("validate");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn empty_target_document_is_the_only_link_error() {
        let mut project = scenario_project();
        let mut orphan = door("orphan", None);
        orphan.link.target_door_id = "entry".to_string();
        push_door(&mut project.workspace, &project.s2, "orphan", orphan);
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s2)
            .expect("validate");
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::EmptyTargetDocument]);
    }

    #[test]
    fn empty_target_door_id_is_reported() {
        let mut project = scenario_project();
        let s1 = project.s1.clone();
        push_door(&mut project.workspace, &project.s2, "half", door("half", Some((&s1, " "))));
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s2)
            .expect("validate");
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::EmptyTargetDoorId]);
    }

    #[test]
    fn unresolved_document_and_door_are_reported() {
        let mut project = scenario_project();
        let ghost = DocumentGuid::new("ghost");
        let s1 = project.s1.clone();
        let to_ghost = door("to_ghost", Some((&ghost, "x")));
        push_door(&mut project.workspace, &project.s2, "to_ghost", to_ghost);
        let to_gone = door("to_gone", Some((&s1, "gone")));
        push_door(&mut project.workspace, &project.s2, "to_gone", to_gone);
        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s2)
            .expect("validate");
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationErrorKind::UnresolvedTargetDocument,
                ValidationErrorKind::UnresolvedTargetDoor,
            ]
        );
        assert!(errors[1].message.contains("'gone'"));
    }

    #[test]
    fn validation_closes_documents_it_opened() {
        let mut project = scenario_project();
        project.workspace.close(&project.s1, false).expect("close s1");
        project.workspace.close(&project.s2, false).expect("close s2");

        let errors = DoorValidator::new(&mut project.workspace)
            .validate(&project.s1)
            .expect("validate");
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::DuplicateId]);
        assert!(project.workspace.loaded_documents().is_empty());
    }
}
