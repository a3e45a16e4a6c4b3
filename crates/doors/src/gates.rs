//! Validation gates run before packaging and before entering run mode.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::document::{write_text_atomic, DocumentAccessor, DocumentGuid};
use crate::doors::{DoorValidator, HostMode, SceneDoorIndex, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents_checked: usize,
    pub errors: Vec<ValidationError>,
    /// Documents that could not be opened for validation.
    pub unopenable: Vec<(DocumentGuid, String)>,
}

impl BuildReport {
    pub fn problem_count(&self) -> usize {
        self.errors.len() + self.unopenable.len()
    }

    /// One line per problem.
    pub fn aggregated_message(&self) -> String {
        let mut lines = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        lines.extend(
            self.unopenable
                .iter()
                .map(|(guid, reason)| format!("Document '{guid}' could not be opened: {reason}")),
        );
        lines.join("\n")
    }
}

#[derive(Debug, Error)]
pub enum BuildGateError {
    #[error("door validation failed ({count} errors):\n{report}")]
    ValidationFailed { count: usize, report: String },
}

/// Validates every document in the project. Any problem fails the build.
pub fn run_build_gate<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
) -> Result<BuildReport, BuildGateError> {
    info!("door_build_gate_started");
    let mut report = BuildReport::default();
    for guid in accessor.all_documents() {
        report.documents_checked += 1;
        match DoorValidator::new(&mut *accessor).validate(&guid) {
            Ok(errors) => report.errors.extend(errors),
            Err(error) => report.unopenable.push((guid, error.to_string())),
        }
    }

    let count = report.problem_count();
    if count > 0 {
        error!(
            documents = report.documents_checked,
            errors = count,
            "door_build_gate_failed"
        );
        return Err(BuildGateError::ValidationFailed {
            count,
            report: report.aggregated_message(),
        });
    }
    info!(documents = report.documents_checked, "door_build_gate_passed");
    Ok(report)
}

/// Validates the documents that are currently loaded.
pub fn validate_loaded_documents<A: DocumentAccessor + ?Sized>(
    accessor: &mut A,
) -> Vec<ValidationError> {
    let mut all = Vec::new();
    for guid in accessor.loaded_documents() {
        match DoorValidator::new(&mut *accessor).validate(&guid) {
            Ok(errors) => all.extend(errors),
            Err(error) => warn!(guid = %guid, error = %error, "validation_skipped_document"),
        }
    }
    all
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayGateDecision {
    Proceed { validated: bool },
    Cancelled { errors: Vec<ValidationError> },
}

/// Pre-run check, toggled by the `validation_on_play` preference.
#[derive(Debug, Clone, Default)]
pub struct PlayModeGate {
    prefs: UserPrefs,
}

impl PlayModeGate {
    pub fn new(prefs: UserPrefs) -> Self {
        Self { prefs }
    }

    pub fn enabled(&self) -> bool {
        self.prefs.validation_on_play
    }

    /// Moves `index` into run mode unless validation of the loaded documents
    /// finds errors, in which case it stays in authoring mode.
    pub fn try_enter_run<A: DocumentAccessor + ?Sized>(
        &self,
        accessor: &mut A,
        index: &mut SceneDoorIndex,
    ) -> PlayGateDecision {
        if !self.enabled() {
            index.set_host_mode(HostMode::Running);
            return PlayGateDecision::Proceed { validated: false };
        }

        index.set_host_mode(HostMode::EnteringRun);
        let errors = validate_loaded_documents(accessor);
        if errors.is_empty() {
            index.set_host_mode(HostMode::Running);
            return PlayGateDecision::Proceed { validated: true };
        }

        for error in &errors {
            error!(door = %error.door.door_id, "{error}");
        }
        warn!(errors = errors.len(), "run_mode_entry_cancelled");
        index.set_host_mode(HostMode::Authoring);
        PlayGateDecision::Cancelled { errors }
    }

    pub fn exit_run(&self, index: &mut SceneDoorIndex) {
        index.set_host_mode(HostMode::Authoring);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrefs {
    #[serde(default = "enabled_by_default")]
    pub validation_on_play: bool,
}

impl Default for UserPrefs {
    fn default() -> Self {
        Self {
            validation_on_play: true,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode preferences {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

enum PrefsReadState {
    Missing,
    Unreadable,
    Present(UserPrefs),
}

fn read_prefs(path: &Path) -> Result<PrefsReadState, PrefsError> {
    if !path.exists() {
        return Ok(PrefsReadState::Missing);
    }
    let raw = fs::read_to_string(path).map_err(|source| PrefsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<UserPrefs>(&raw) {
        Ok(prefs) => Ok(PrefsReadState::Present(prefs)),
        Err(_) => Ok(PrefsReadState::Unreadable),
    }
}

impl UserPrefs {
    /// Missing files yield defaults; files that do not parse yield defaults
    /// with a warning.
    pub fn load(path: &Path) -> Result<Self, PrefsError> {
        match read_prefs(path)? {
            PrefsReadState::Present(prefs) => Ok(prefs),
            PrefsReadState::Missing => Ok(Self::default()),
            PrefsReadState::Unreadable => {
                warn!(path = %path.display(), "prefs_unreadable_using_defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PrefsError> {
        let text = serde_json::to_string_pretty(self).map_err(|error| PrefsError::Encode {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        write_text_atomic(path, &text).map_err(|source| PrefsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::document::{Door, DoorLink, Entity, Vec2, Workspace};
    use crate::doors::ValidationErrorKind;

    fn workspace_with_duplicates(temp: &TempDir) -> (Workspace, DocumentGuid, DocumentGuid) {
        let mut workspace = Workspace::open(temp.path()).expect("workspace");
        let clean = workspace.create_document("clean", "Clean").expect("create");
        let broken = workspace.create_document("broken", "Broken").expect("create");
        for _ in 0..2 {
            workspace.get_mut(&broken).expect("doc").entities.push(Entity::with_door(
                "room",
                Vec2::default(),
                Door::new("room", DoorLink::default()),
            ));
        }
        workspace.mark_dirty(&broken);
        workspace.save_all().expect("save");
        (workspace, clean, broken)
    }

    #[test]
    fn build_gate_fails_with_aggregated_message() {
        let temp = TempDir::new().expect("tempdir");
        let (mut workspace, _, broken) = workspace_with_duplicates(&temp);
        workspace.close(&broken, false).expect("close");

        let err = run_build_gate(&mut workspace).expect_err("gate");
        let BuildGateError::ValidationFailed { count, report } = err;
        assert_eq!(count, 1);
        assert!(report.contains("Duplicate door id 'room'"));
        assert!(report.starts_with("[Broken]"));
        assert!(!workspace.is_loaded(&broken));
    }

    #[test]
    fn build_gate_passes_clean_project() {
        let temp = TempDir::new().expect("tempdir");
        let mut workspace = Workspace::open(temp.path()).expect("workspace");
        workspace.create_document("a", "A").expect("create");
        workspace.create_document("b", "B").expect("create");
        let report = run_build_gate(&mut workspace).expect("gate");
        assert_eq!(report.documents_checked, 2);
        assert_eq!(report.problem_count(), 0);
    }

    #[test]
    fn play_gate_cancels_and_returns_to_authoring() {
        let temp = TempDir::new().expect("tempdir");
        let (mut workspace, _, _) = workspace_with_duplicates(&temp);
        let mut index = SceneDoorIndex::default();

        let decision = PlayModeGate::default().try_enter_run(&mut workspace, &mut index);
        let PlayGateDecision::Cancelled { errors } = decision else {
            panic!("expected cancellation");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::DuplicateId);
        assert_eq!(index.host_mode(), HostMode::Authoring);
    }

    #[test]
    fn play_gate_enters_run_when_clean_or_disabled() {
        let temp = TempDir::new().expect("tempdir");
        let (mut workspace, _, broken) = workspace_with_duplicates(&temp);
        let mut index = SceneDoorIndex::default();

        let disabled = PlayModeGate::new(UserPrefs {
            validation_on_play: false,
        });
        assert_eq!(
            disabled.try_enter_run(&mut workspace, &mut index),
            PlayGateDecision::Proceed { validated: false }
        );
        assert_eq!(index.host_mode(), HostMode::Running);
        disabled.exit_run(&mut index);

        workspace.close(&broken, false).expect("close");
        assert_eq!(
            PlayModeGate::default().try_enter_run(&mut workspace, &mut index),
            PlayGateDecision::Proceed { validated: true }
        );
        assert_eq!(index.host_mode(), HostMode::Running);
    }

    #[test]
    fn prefs_default_on_missing_and_unreadable() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join(".doors").join("prefs.json");
        assert!(UserPrefs::load(&path).expect("missing").validation_on_play);

        fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        fs::write(&path, "not json").expect("write");
        assert!(UserPrefs::load(&path).expect("unreadable").validation_on_play);

        let prefs = UserPrefs {
            validation_on_play: false,
        };
        prefs.save(&path).expect("save");
        assert_eq!(UserPrefs::load(&path).expect("present"), prefs);

        fs::write(&path, "{}").expect("write");
        assert!(UserPrefs::load(&path).expect("partial").validation_on_play);
    }
}
