use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod cancel;
pub mod document;
pub mod doors;
pub mod gates;
pub mod travel;

pub use cancel::CancellationToken;
pub use document::{
    DocumentAccessor, DocumentCatalog, DocumentError, DocumentGuid, DocumentRef, Door,
    DoorLink, Entity, Interactable, LevelDocument, ScopedDocument, Template, TemplateId,
    TemplateLibrary, TemplateRepository, TemplateSource, Vec2, Workspace,
};
pub use doors::{
    assign_missing_ids, clear_template_ids, generate_id, is_id_unique_in_document, is_valid_id,
    set_door_link, DoorAddress, DoorEntry, DoorIdEdit, DoorRef, DoorValidator, EditHistory,
    HostMode, ReferenceRenamer, RenameError, RenameReport, RenameRequest, RenameScope,
    SceneDoorIndex, SweepProgress, ValidationError, ValidationErrorKind,
};
pub use gates::{
    run_build_gate, validate_loaded_documents, BuildGateError, BuildReport, PlayGateDecision,
    PlayModeGate, PrefsError, UserPrefs,
};
pub use travel::{
    DiskLevelHost, DoorEvents, DoorTravel, LevelHost, LoadPoll, ScreenFader, TravelActor,
    TravelConfig, TravelContext, TravelOutcome, TravelPhase, TravelStatus,
};

pub const ROOT_ENV_VAR: &str = "DOORS_PROJECT_ROOT";

const DOCUMENTS_DIR: &str = "documents";
const TEMPLATES_DIR: &str = "templates";
const USER_DIR: &str = ".doors";

#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub documents_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub user_dir: PathBuf,
}

impl ProjectPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            documents_dir: root.join(DOCUMENTS_DIR),
            templates_dir: root.join(TEMPLATES_DIR),
            user_dir: root.join(USER_DIR),
            root,
        }
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.user_dir.join("prefs.json")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("failed to create project layout at {path}: {source}")]
    CreateLayout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "{var} is set but does not point to a valid project root: {path}\n\
A valid root must contain a documents/ directory."
    )]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from: {start_dir}\n\
Expected a directory containing documents/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/project\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Resolves the project from `DOORS_PROJECT_ROOT`, or by walking upward from
/// the current directory.
pub fn resolve_project_paths() -> Result<ProjectPaths, StartupError> {
    let root = resolve_root()?;
    project_paths_at(&root)
}

/// Uses `root` as-is and makes sure the templates and user directories exist.
pub fn project_paths_at(root: &Path) -> Result<ProjectPaths, StartupError> {
    let paths = ProjectPaths::from_root(normalize_path(root));
    for dir in [&paths.documents_dir, &paths.templates_dir, &paths.user_dir] {
        fs::create_dir_all(dir).map_err(|source| StartupError::CreateLayout {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_project_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot {
                    var: ROOT_ENV_VAR,
                    path: normalized,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let start_dir = env::current_dir().map_err(StartupError::CurrentDir)?;
            for candidate in start_dir.ancestors() {
                if is_project_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&start_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_project_marker(path: &Path) -> bool {
    path.join(DOCUMENTS_DIR).is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
