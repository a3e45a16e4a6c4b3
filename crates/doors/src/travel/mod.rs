//! Runtime door travel: fade out, load or reuse the destination document,
//! teleport, settle, fade in, notify.

mod disk;
mod resolver;

pub use disk::DiskLevelHost;
pub use resolver::{
    DoorTravel, TravelConfig, TravelContext, TravelOutcome, TravelPhase, TravelStatus,
};

use crate::document::{DocumentGuid, LevelDocument, Vec2};
use crate::doors::DoorAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPoll {
    Pending,
    Ready,
    Failed(String),
}

/// The running level. At most one document is active; loading another one
/// replaces it once the load completes.
pub trait LevelHost {
    fn active_guid(&self) -> Option<&DocumentGuid>;

    fn active_document(&self) -> Option<&LevelDocument>;

    fn begin_load(&mut self, guid: &DocumentGuid);

    fn poll_load(&mut self) -> LoadPoll;
}

pub trait ScreenFader {
    /// `0.0` is fully transparent, `1.0` fully opaque.
    fn set_opacity(&mut self, opacity: f32);
}

pub trait TravelActor {
    fn teleport(&mut self, position: Vec2);
}

pub trait DoorEvents {
    fn door_entered(&mut self, door: &DoorAddress);
}
