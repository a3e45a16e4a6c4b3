use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use doors::{
    assign_missing_ids, generate_id, project_paths_at, resolve_project_paths, run_build_gate,
    CancellationToken, DiskLevelHost, DocumentAccessor, DocumentGuid, DoorAddress, DoorEvents,
    DoorTravel, DoorValidator, EditHistory, LevelHost, PlayGateDecision, PlayModeGate,
    ProjectPaths, ReferenceRenamer, RenameRequest, RenameScope, SceneDoorIndex, ScreenFader,
    TemplateLibrary, TravelActor, TravelConfig, TravelContext, TravelOutcome, TravelStatus,
    UserPrefs, Vec2, Workspace,
};
use tracing::debug;

pub const DEFAULT_ID_LENGTH: usize = 5;
pub const TRAVEL_TICKS_PER_SECOND: u32 = 60;
const MAX_TRAVEL_TICKS: u32 = 60 * TRAVEL_TICKS_PER_SECOND;

#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Validate,
    CheckOpen {
        documents: Vec<String>,
    },
    Doors {
        document: String,
    },
    Rename {
        document: String,
        old_id: String,
        new_id: String,
        project: bool,
    },
    GenId {
        length: usize,
    },
    AssignIds {
        document: String,
    },
    Travel {
        document: String,
        door: String,
    },
    Prefs {
        validation_on_play: Option<bool>,
    },
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    if let CommandKind::GenId { length } = kind {
        return emit(stdout, &generate_id(length));
    }

    let paths = match &opts.root {
        Some(root) => project_paths_at(root),
        None => resolve_project_paths(),
    }
    .map_err(|error| error.to_string())?;
    debug!(root = %paths.root.display(), "project_resolved");

    match kind {
        CommandKind::Validate => validate(&paths, stdout),
        CommandKind::CheckOpen { documents } => check_open(&paths, &documents, stdout),
        CommandKind::Doors { document } => list_doors(&paths, &document, stdout),
        CommandKind::Rename {
            document,
            old_id,
            new_id,
            project,
        } => rename(&paths, &document, old_id, new_id, project, stdout),
        CommandKind::AssignIds { document } => assign_ids(&paths, &document, stdout),
        CommandKind::Travel { document, door } => travel(&paths, &document, &door, stdout),
        CommandKind::Prefs { validation_on_play } => prefs(&paths, validation_on_play, stdout),
        CommandKind::GenId { .. } => Ok(()),
    }
}

fn open_workspace(paths: &ProjectPaths) -> Result<Workspace, String> {
    Workspace::open(&paths.documents_dir).map_err(|error| error.to_string())
}

/// Accepts a guid, a path relative to `documents/`, or that path without
/// the `.doc.json` extension.
pub fn find_document(workspace: &Workspace, selector: &str) -> Result<DocumentGuid, String> {
    let selector = selector.trim().replace('\\', "/");
    let catalog = workspace.catalog();
    catalog
        .guids()
        .find(|guid| {
            guid.as_str() == selector
                || catalog.display_path(guid).is_some_and(|path| {
                    path == selector || path.strip_suffix(".doc.json") == Some(selector.as_str())
                })
        })
        .cloned()
        .ok_or_else(|| format!("no document matches '{selector}'"))
}

fn open_document(workspace: &mut Workspace, selector: &str) -> Result<DocumentGuid, String> {
    let guid = find_document(workspace, selector)?;
    workspace
        .open_for_authoring(&guid)
        .map_err(|error| error.to_string())?;
    Ok(guid)
}

fn validate<W: Write>(paths: &ProjectPaths, stdout: &mut W) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    let report = run_build_gate(&mut workspace).map_err(|error| error.to_string())?;
    emit(
        stdout,
        &format!(
            "doors validation: OK ({} documents)",
            report.documents_checked
        ),
    )
}

fn check_open<W: Write>(
    paths: &ProjectPaths,
    documents: &[String],
    stdout: &mut W,
) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    for selector in documents {
        open_document(&mut workspace, selector)?;
    }
    let prefs = UserPrefs::load(&paths.prefs_path()).map_err(|error| error.to_string())?;
    let mut index = SceneDoorIndex::default();
    match PlayModeGate::new(prefs).try_enter_run(&mut workspace, &mut index) {
        PlayGateDecision::Proceed { validated: true } => {
            emit(stdout, "doors validation: OK (open documents)")
        }
        PlayGateDecision::Proceed { validated: false } => {
            emit(stdout, "doors validation: skipped (validation_on_play is off)")
        }
        PlayGateDecision::Cancelled { errors } => {
            for error in &errors {
                emit(stdout, &error.to_string())?;
            }
            Err(format!(
                "{} door errors in open documents; run mode entry cancelled",
                errors.len()
            ))
        }
    }
}

fn list_doors<W: Write>(
    paths: &ProjectPaths,
    selector: &str,
    stdout: &mut W,
) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    let guid = find_document(&workspace, selector)?;
    let mut index = SceneDoorIndex::default();
    for entry in index.doors_for(&mut workspace, &guid, Duration::ZERO).iter() {
        emit(stdout, &entry.label)?;
    }
    Ok(())
}

fn rename<W: Write>(
    paths: &ProjectPaths,
    selector: &str,
    old_id: String,
    new_id: String,
    project: bool,
    stdout: &mut W,
) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    let guid = open_document(&mut workspace, selector)?;
    let mut templates = TemplateLibrary::new(&paths.templates_dir);
    let scope = if project {
        RenameScope::Project
    } else {
        RenameScope::OpenAndTemplates
    };
    let request = RenameRequest::new(guid, old_id, new_id, scope);

    let mut history = EditHistory::new();
    let report = ReferenceRenamer::new(&mut workspace, &mut templates)
        .rename(&request, &mut history, &CancellationToken::new(), |progress| {
            debug!(
                processed = progress.processed,
                total = progress.total,
                guid = %progress.current,
                "rename_sweep_progress"
            );
        })
        .map_err(|error| error.to_string())?;
    let saved = workspace.save_all().map_err(|error| error.to_string())?;

    if !report.committed {
        return emit(stdout, "rename: nothing to do");
    }
    emit(
        stdout,
        &format!(
            "renamed '{}' -> '{}': {} links updated, {} documents saved, {} templates saved",
            request.old_id,
            request.new_id.trim(),
            report.links_changed(),
            saved + report.swept_documents.len(),
            report.templates.len()
        ),
    )?;
    for (guid, reason) in &report.failed {
        emit(stdout, &format!("skipped unreadable document {guid}: {reason}"))?;
    }
    for (id, reason) in &report.failed_templates {
        emit(stdout, &format!("skipped template {id}: {reason}"))?;
    }
    Ok(())
}

fn assign_ids<W: Write>(
    paths: &ProjectPaths,
    selector: &str,
    stdout: &mut W,
) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    let guid = open_document(&mut workspace, selector)?;
    let templates = TemplateLibrary::new(&paths.templates_dir);
    let document = workspace
        .get_mut(&guid)
        .ok_or_else(|| format!("document {guid} is not loaded"))?;
    let assigned = assign_missing_ids(document, &templates);
    if assigned > 0 {
        workspace.mark_dirty(&guid);
        workspace.save(&guid).map_err(|error| error.to_string())?;
    }
    emit(stdout, &format!("assigned {assigned} door ids"))
}

struct ConsoleFader;

impl ScreenFader for ConsoleFader {
    fn set_opacity(&mut self, opacity: f32) {
        debug!(opacity, "screen_fade");
    }
}

struct ConsoleActor(Vec<Vec2>);

impl TravelActor for ConsoleActor {
    fn teleport(&mut self, position: Vec2) {
        self.0.push(position);
    }
}

struct ConsoleEvents(Vec<DoorAddress>);

impl DoorEvents for ConsoleEvents {
    fn door_entered(&mut self, door: &DoorAddress) {
        self.0.push(door.clone());
    }
}

fn travel<W: Write>(
    paths: &ProjectPaths,
    selector: &str,
    door_id: &str,
    stdout: &mut W,
) -> Result<(), String> {
    let mut workspace = open_workspace(paths)?;
    let guid = find_document(&workspace, selector)?;
    let errors = DoorValidator::new(&mut workspace)
        .validate(&guid)
        .map_err(|error| error.to_string())?;
    if let Some(error) = errors.iter().find(|error| error.door.door_id == door_id) {
        return Err(format!("cannot travel through an invalid door: {error}"));
    }

    let mut host = DiskLevelHost::with_catalog(workspace.catalog().clone());
    host.start(&guid).map_err(|error| error.to_string())?;
    let source = host
        .active_document()
        .ok_or_else(|| format!("document {guid} did not start"))?;
    let mut door_travel = DoorTravel::through_door(
        source,
        door_id,
        TravelConfig::default(),
        CancellationToken::new(),
    )
    .ok_or_else(|| format!("no door '{door_id}' in {selector}"))?;

    let mut actor = ConsoleActor(Vec::new());
    let mut events = ConsoleEvents(Vec::new());
    let dt = 1.0 / TRAVEL_TICKS_PER_SECOND as f32;
    let mut outcome = None;
    {
        let mut ctx = TravelContext {
            host: &mut host,
            fader: &mut ConsoleFader,
            actor: &mut actor,
            events: &mut events,
        };
        for _ in 0..MAX_TRAVEL_TICKS {
            if let TravelStatus::Finished(done) = door_travel.tick(&mut ctx, dt) {
                outcome = Some(done);
                break;
            }
        }
    }
    for position in &actor.0 {
        emit(stdout, &format!("teleported to ({}, {})", position.x, position.y))?;
    }
    for door in &events.0 {
        emit(stdout, &format!("entered {door}"))?;
    }
    match outcome {
        Some(TravelOutcome::Arrived { destination }) => {
            let name = host
                .active_document()
                .map(|document| document.name.clone())
                .unwrap_or_default();
            emit(stdout, &format!("arrived at {} in {name}", destination.door_id))
        }
        Some(TravelOutcome::Cancelled) => Err("travel cancelled".to_string()),
        Some(TravelOutcome::LoadFailed { reason }) => Err(format!("travel failed: {reason}")),
        None => Err("travel did not finish".to_string()),
    }
}

fn prefs<W: Write>(
    paths: &ProjectPaths,
    validation_on_play: Option<bool>,
    stdout: &mut W,
) -> Result<(), String> {
    let path = paths.prefs_path();
    let mut prefs = UserPrefs::load(&path).map_err(|error| error.to_string())?;
    if let Some(enabled) = validation_on_play {
        prefs.validation_on_play = enabled;
        prefs.save(&path).map_err(|error| error.to_string())?;
    }
    emit(
        stdout,
        &format!("validation_on_play = {}", prefs.validation_on_play),
    )
}

fn emit<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
