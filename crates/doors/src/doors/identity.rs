//! Door id generation and format rules.
//!
//! Allowed characters are `[0-9A-Za-z_-]`, length `1..=64`.

use std::fmt;

use rand::Rng;

use crate::document::DocumentGuid;

pub const MIN_ID_LENGTH: usize = 1;
pub const MAX_ID_LENGTH: usize = 64;
pub(crate) const DEFAULT_GENERATED_LENGTH: usize = 5;
pub(crate) const GENERATED_PREFIX: &str = "Door_";

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A door named by its containing document and its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DoorAddress {
    pub document: DocumentGuid,
    pub door_id: String,
}

impl DoorAddress {
    pub fn new(document: DocumentGuid, door_id: impl Into<String>) -> Self {
        Self {
            document,
            door_id: door_id.into(),
        }
    }
}

impl fmt::Display for DoorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document, self.door_id)
    }
}

/// Random id from the lowercase alphanumeric alphabet, `length` clamped to
/// `1..=64`. Not cryptographically secure; collisions are left to the
/// validator.
pub fn generate_id(length: usize) -> String {
    let length = length.clamp(MIN_ID_LENGTH, MAX_ID_LENGTH);
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_id(id: &str) -> bool {
    (MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&id.len())
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-')
}

/// The id given to doors that have none yet, e.g. `Door_k3x9a`.
pub(crate) fn generate_door_id() -> String {
    format!("{GENERATED_PREFIX}{}", generate_id(DEFAULT_GENERATED_LENGTH))
}
