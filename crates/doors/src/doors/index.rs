use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::document::{DocumentAccessor, DocumentGuid, ScopedDocument};

pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(2);

/// Where the host application is relative to running/simulated mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostMode {
    #[default]
    Authoring,
    EnteringRun,
    Running,
}

/// One door in a document listing, labelled as `"{id} ({entity name})"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorEntry {
    pub door_id: String,
    pub label: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    built_at: Duration,
    doors: Arc<[DoorEntry]>,
}

/// TTL cache of door listings per document, used by authoring tools to offer
/// target door choices. Times are durations since host start.
#[derive(Debug)]
pub struct SceneDoorIndex {
    ttl: Duration,
    mode: HostMode,
    entries: HashMap<DocumentGuid, CacheEntry>,
}

impl Default for SceneDoorIndex {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_TTL)
    }
}

impl SceneDoorIndex {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            mode: HostMode::Authoring,
            entries: HashMap::new(),
        }
    }

    pub fn host_mode(&self) -> HostMode {
        self.mode
    }

    pub fn set_host_mode(&mut self, mode: HostMode) {
        self.mode = mode;
    }

    /// Sorted door listing for `guid`. Served from cache while younger than
    /// the TTL, rebuilt otherwise. Empty outside authoring mode, for blank
    /// guids and for documents that cannot be opened.
    pub fn doors_for<A: DocumentAccessor + ?Sized>(
        &mut self,
        accessor: &mut A,
        guid: &DocumentGuid,
        now: Duration,
    ) -> Arc<[DoorEntry]> {
        if guid.is_blank() || self.mode != HostMode::Authoring {
            return Arc::from(Vec::new());
        }

        if let Some(entry) = self.entries.get(guid) {
            if now.saturating_sub(entry.built_at) < self.ttl {
                return Arc::clone(&entry.doors);
            }
        }

        let doors: Arc<[DoorEntry]> = Arc::from(build_listing(accessor, guid));
        debug!(guid = %guid, door_count = doors.len(), "door_index_rebuilt");
        self.entries.insert(
            guid.clone(),
            CacheEntry {
                built_at: now,
                doors: Arc::clone(&doors),
            },
        );
        doors
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn cached_documents(&self) -> usize {
        self.entries.len()
    }
}

fn build_listing<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
    guid: &DocumentGuid,
) -> Vec<DoorEntry> {
    if !accessor.is_loaded(guid) && accessor.resolve(guid).is_none() {
        return Vec::new();
    }
    let scope = match ScopedDocument::open(accessor, guid) {
        Ok(scope) => scope,
        Err(error) => {
            warn!(guid = %guid, error = %error, "door_index_open_failed");
            return Vec::new();
        }
    };
    let Ok(document) = scope.document() else {
        return Vec::new();
    };

    let mut doors = document
        .doors()
        .map(|(_, entity, door)| {
            let shown_id = if door.id.trim().is_empty() {
                "<empty>"
            } else {
                door.id.as_str()
            };
            DoorEntry {
                door_id: door.id.clone(),
                label: format!("{shown_id} ({})", entity.name),
            }
        })
        .collect::<Vec<_>>();
    doors.sort_by(|a, b| a.door_id.cmp(&b.door_id));
    doors
}
