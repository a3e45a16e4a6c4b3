mod authoring;
mod history;
mod identity;
mod index;
mod renamer;
mod validator;

pub use authoring::{
    assign_missing_ids, clear_template_ids, is_id_unique_in_document, set_door_link,
};
pub use history::{DoorIdEdit, EditHistory};
pub use identity::{generate_id, is_valid_id, DoorAddress, MAX_ID_LENGTH, MIN_ID_LENGTH};
pub use index::{DoorEntry, HostMode, SceneDoorIndex, DEFAULT_INDEX_TTL};
pub use renamer::{
    ReferenceRenamer, RenameError, RenameReport, RenameRequest, RenameScope, SweepProgress,
};
pub use validator::{DoorRef, DoorValidator, ValidationError, ValidationErrorKind};
