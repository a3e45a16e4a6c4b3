use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::normalize_rel_path;
use super::store::{has_extension, read_json, write_json, TEMPLATE_EXTENSION};
use super::types::{DocumentError, Entity, DOCUMENT_FORMAT_VERSION};

/// Template identifier: the template's path under the templates directory,
/// without extension, using forward slashes.
pub type TemplateId = String;

/// A reusable entity group instantiated into many documents. Doors inside a
/// template carry empty ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub format_version: u32,
    pub name: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    /// Empties every door id. Returns how many were cleared.
    pub fn clear_door_ids(&mut self) -> usize {
        let mut cleared = 0;
        for door in self.entities.iter_mut().filter_map(Entity::door_mut) {
            if !door.id.is_empty() {
                door.id.clear();
                cleared += 1;
            }
        }
        cleared
    }
}

pub trait TemplateRepository {
    fn template_ids(&self) -> Result<Vec<TemplateId>, DocumentError>;

    fn load(&self, id: &str) -> Result<Template, DocumentError>;

    /// Persists `template` synchronously; there is no unsaved template state.
    /// Door ids are stored empty.
    fn save(&mut self, id: &str, template: &Template) -> Result<(), DocumentError>;
}

/// Templates stored as `<dir>/**/<id>.template.json`.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    dir: PathBuf,
}

impl TemplateLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{TEMPLATE_EXTENSION}"))
    }
}

impl TemplateRepository for TemplateLibrary {
    fn template_ids(&self) -> Result<Vec<TemplateId>, DocumentError> {
        let mut ids = Vec::new();
        if self.dir.is_dir() {
            collect_recursive(&self.dir, &self.dir, &mut ids)?;
        }
        ids.sort();
        Ok(ids)
    }

    fn load(&self, id: &str) -> Result<Template, DocumentError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(DocumentError::UnknownTemplate { id: id.to_string() });
        }
        read_json(&path)
    }

    fn save(&mut self, id: &str, template: &Template) -> Result<(), DocumentError> {
        let path = self.path_for(id);
        let mut stored = template.clone();
        let cleared = stored.clear_door_ids();
        if cleared > 0 {
            warn!(template = id, cleared, "template_door_ids_cleared");
        }
        write_json(&path, &stored)?;
        debug!(template = id, path = %path.display(), "template_saved");
        Ok(())
    }
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    ids: &mut Vec<TemplateId>,
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
            collect_recursive(root, &path, ids)?;
        } else if has_extension(&path, TEMPLATE_EXTENSION) {
            let rel = normalize_rel_path(path.strip_prefix(root).unwrap_or(&path));
            if let Some(id) = rel.strip_suffix(TEMPLATE_EXTENSION) {
                ids.push(id.to_string());
            }
        }
    }
    Ok(())
}
