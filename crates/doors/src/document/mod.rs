mod accessor;
mod atomic_io;
mod catalog;
mod store;
mod templates;
mod types;
mod workspace;

pub use accessor::{DocumentAccessor, ScopedDocument};
pub use catalog::DocumentCatalog;
pub use templates::{Template, TemplateId, TemplateLibrary, TemplateRepository};
pub use types::{
    DocumentError, DocumentGuid, DocumentRef, Door, DoorLink, Entity, Interactable,
    LevelDocument, TemplateSource, Vec2,
};
pub use workspace::Workspace;

pub(crate) use atomic_io::write_text_atomic;
pub(crate) use store::read_document;
