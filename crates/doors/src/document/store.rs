use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::atomic_io::write_text_atomic;
use super::types::{DocumentError, LevelDocument, DOCUMENT_FORMAT_VERSION};

pub(crate) const DOCUMENT_EXTENSION: &str = ".doc.json";
pub(crate) const TEMPLATE_EXTENSION: &str = ".template.json";

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DocumentError> {
    let raw = fs::read_to_string(path).map_err(|source| DocumentError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json(path, &raw)
}

pub(crate) fn parse_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, DocumentError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        let source = error.into_inner();
        let message = if at.is_empty() || at == "." {
            source.to_string()
        } else {
            format!("at {at}: {source}")
        };
        DocumentError::Parse {
            path: path.to_path_buf(),
            message,
        }
    })
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DocumentError> {
    let text = serde_json::to_string_pretty(value).map_err(|error| DocumentError::Encode {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    write_text_atomic(path, &text).map_err(|source| DocumentError::WriteFile {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_document(path: &Path) -> Result<LevelDocument, DocumentError> {
    let document = read_json::<LevelDocument>(path)?;
    if document.format_version != DOCUMENT_FORMAT_VERSION {
        return Err(DocumentError::FormatVersion {
            path: path.to_path_buf(),
            found: document.format_version,
            expected: DOCUMENT_FORMAT_VERSION,
        });
    }
    Ok(document)
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > extension.len() && name.ends_with(extension))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::document::types::{DocumentGuid, Door, DoorLink, Entity, Vec2};

    #[test]
    fn parse_error_names_json_path() {
        let raw = r#"{"format_version":1,"guid":"g","name":"n","entities":[{"name":"a","position":{"x":"oops","y":0}}]}"#;
        let err = parse_json::<LevelDocument>(Path::new("a.doc.json"), raw).expect_err("error");
        let DocumentError::Parse { message, .. } = err else {
            panic!("expected parse error");
        };
        assert!(message.contains("entities[0].position.x"), "{message}");
    }

    #[test]
    fn document_survives_disk_roundtrip() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("s1.doc.json");
        let mut doc = LevelDocument::new(DocumentGuid::new("s1"), "S1");
        doc.entities.push(Entity::with_door(
            "start",
            Vec2::new(1.0, 0.0),
            Door::new("start", DoorLink::default()),
        ));
        write_json(&path, &doc).expect("write");
        assert_eq!(read_document(&path).expect("read"), doc);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("old.doc.json");
        fs::write(&path, r#"{"format_version":0,"guid":"g","name":"old"}"#).expect("write");
        let err = read_document(&path).expect_err("error");
        assert!(matches!(err, DocumentError::FormatVersion { found: 0, .. }));
    }

    #[test]
    fn extension_match_requires_a_stem() {
        assert!(has_extension(Path::new("a/s1.doc.json"), DOCUMENT_EXTENSION));
        assert!(!has_extension(Path::new("a/.doc.json"), DOCUMENT_EXTENSION));
        assert!(!has_extension(Path::new("a/s1.json"), DOCUMENT_EXTENSION));
    }
}
