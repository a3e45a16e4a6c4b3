use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub(crate) const DOCUMENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Stable, content-independent identifier of a level document.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentGuid(String);

impl DocumentGuid {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DocumentGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentGuid {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Guid-based reference to a document. The cached path is advisory and may
/// be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "targetDocumentGuid", default)]
    pub guid: DocumentGuid,
    #[serde(rename = "targetDocumentPathCache", default)]
    pub cached_path: String,
}

impl DocumentRef {
    pub fn new(guid: DocumentGuid, cached_path: impl Into<String>) -> Self {
        Self {
            guid,
            cached_path: cached_path.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.guid.is_blank()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorLink {
    #[serde(flatten)]
    pub target_document: DocumentRef,
    #[serde(rename = "targetDoorId", default)]
    pub target_door_id: String,
}

impl DoorLink {
    pub fn new(target_document: DocumentRef, target_door_id: impl Into<String>) -> Self {
        Self {
            target_document,
            target_door_id: target_door_id.into(),
        }
    }

    /// A link with neither a target document nor a target door id set.
    pub fn is_unset(&self) -> bool {
        self.target_document.is_empty() && self.target_door_id.trim().is_empty()
    }

    pub fn points_at(&self, document: &DocumentGuid, door_id: &str) -> bool {
        self.target_document.guid == *document && self.target_door_id == door_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Door {
    #[serde(rename = "doorId", default)]
    pub id: String,
    #[serde(default)]
    pub link: DoorLink,
    #[serde(rename = "entryAnchor", default, skip_serializing_if = "Option::is_none")]
    pub entry_anchor: Option<Vec2>,
}

impl Door {
    pub fn new(id: impl Into<String>, link: DoorLink) -> Self {
        Self {
            id: id.into(),
            link,
            entry_anchor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interactable {
    Door(Door),
    Switch {
        #[serde(default)]
        active: bool,
    },
    Chest {
        #[serde(default)]
        opened: bool,
    },
}

/// Marks an entity as an instance of a template entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub template: String,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub position: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TemplateSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactable: Option<Interactable>,
}

impl Entity {
    pub fn new(name: impl Into<String>, position: Vec2) -> Self {
        Self {
            name: name.into(),
            position,
            source: None,
            interactable: None,
        }
    }

    pub fn with_door(name: impl Into<String>, position: Vec2, door: Door) -> Self {
        Self {
            interactable: Some(Interactable::Door(door)),
            ..Self::new(name, position)
        }
    }

    pub fn door(&self) -> Option<&Door> {
        match &self.interactable {
            Some(Interactable::Door(door)) => Some(door),
            _ => None,
        }
    }

    pub fn door_mut(&mut self) -> Option<&mut Door> {
        match &mut self.interactable {
            Some(Interactable::Door(door)) => Some(door),
            _ => None,
        }
    }

    /// Where an actor lands when arriving through this entity's door.
    pub fn entry_position(&self) -> Vec2 {
        self.door()
            .and_then(|door| door.entry_anchor)
            .unwrap_or(self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDocument {
    pub format_version: u32,
    pub guid: DocumentGuid,
    pub name: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl LevelDocument {
    pub fn new(guid: DocumentGuid, name: impl Into<String>) -> Self {
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            guid,
            name: name.into(),
            entities: Vec::new(),
        }
    }

    /// Doors in encounter order, paired with their entity index.
    pub fn doors(&self) -> impl Iterator<Item = (usize, &Entity, &Door)> {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(index, entity)| entity.door().map(|door| (index, entity, door)))
    }

    pub fn find_door(&self, door_id: &str) -> Option<(usize, &Entity)> {
        if door_id.is_empty() {
            return None;
        }
        self.doors()
            .find(|(_, _, door)| door.id == door_id)
            .map(|(index, entity, _)| (index, entity))
    }

    pub fn find_door_mut(&mut self, door_id: &str) -> Option<&mut Door> {
        if door_id.is_empty() {
            return None;
        }
        self.entities
            .iter_mut()
            .filter_map(Entity::door_mut)
            .find(|door| door.id == door_id)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },
    #[error("unsupported format_version {found} in {path} (expected {expected})")]
    FormatVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("no document with guid '{guid}' in the project")]
    UnknownDocument { guid: DocumentGuid },
    #[error("document '{guid}' is not loaded")]
    NotLoaded { guid: DocumentGuid },
    #[error("document '{guid}' has unsaved changes")]
    UnsavedChanges { guid: DocumentGuid },
    #[error("document '{guid}' has no door at entity {entity_index}")]
    NotADoor {
        guid: DocumentGuid,
        entity_index: usize,
    },
    #[error("no template with id '{id}'")]
    UnknownTemplate { id: String },
    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },
}
