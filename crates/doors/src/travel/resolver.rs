use std::time::Duration;

use tracing::{debug, info, warn};

use super::{DoorEvents, LevelHost, LoadPoll, ScreenFader, TravelActor};
use crate::cancel::CancellationToken;
use crate::document::{DocumentGuid, DoorLink, LevelDocument};
use crate::doors::DoorAddress;

#[derive(Debug, Clone, PartialEq)]
pub struct TravelConfig {
    pub fade_out: Duration,
    pub fade_in: Duration,
    pub settle_delay: Duration,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            fade_out: Duration::from_millis(350),
            fade_in: Duration::from_millis(350),
            settle_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelPhase {
    FadingOut,
    Loading,
    Teleporting,
    Settling,
    FadingIn,
    NotifyingEntered,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravelOutcome {
    Arrived { destination: DoorAddress },
    Cancelled,
    LoadFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravelStatus {
    Running(TravelPhase),
    Finished(TravelOutcome),
}

/// Collaborators a travel drives while it runs.
pub struct TravelContext<'a> {
    pub host: &'a mut dyn LevelHost,
    pub fader: &'a mut dyn ScreenFader,
    pub actor: &'a mut dyn TravelActor,
    pub events: &'a mut dyn DoorEvents,
}

/// One actor travelling through one door, advanced by fixed ticks.
///
/// The screen is fully opaque from the moment a load is issued until the
/// settle delay after the teleport has passed. Cancellation is only honoured
/// while fading out; once the destination is being loaded the travel runs to
/// completion.
#[derive(Debug)]
pub struct DoorTravel {
    source: DoorAddress,
    link: DoorLink,
    config: TravelConfig,
    cancel: CancellationToken,
    phase: TravelPhase,
    elapsed_seconds: f32,
    opacity: f32,
    destination: Option<DoorAddress>,
    outcome: Option<TravelOutcome>,
}

impl DoorTravel {
    pub fn new(
        source: DoorAddress,
        link: DoorLink,
        config: TravelConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            link,
            config,
            cancel,
            phase: TravelPhase::FadingOut,
            elapsed_seconds: 0.0,
            opacity: 0.0,
            destination: None,
            outcome: None,
        }
    }

    /// Travel through the door `door_id` of `document`, if it has one.
    pub fn through_door(
        document: &LevelDocument,
        door_id: &str,
        config: TravelConfig,
        cancel: CancellationToken,
    ) -> Option<Self> {
        let (_, entity) = document.find_door(door_id)?;
        let link = entity.door()?.link.clone();
        Some(Self::new(
            DoorAddress::new(document.guid.clone(), door_id),
            link,
            config,
            cancel,
        ))
    }

    pub fn phase(&self) -> TravelPhase {
        self.phase
    }

    pub fn source(&self) -> &DoorAddress {
        &self.source
    }

    /// Advances the travel by one fixed step.
    ///
    /// # Panics
    ///
    /// Panics when the destination door cannot be found in the target
    /// document once it is active. Links are expected to have passed
    /// validation before travel starts.
    pub fn tick(&mut self, ctx: &mut TravelContext<'_>, fixed_dt_seconds: f32) -> TravelStatus {
        match self.phase {
            TravelPhase::FadingOut => self.fade_out(ctx, fixed_dt_seconds),
            TravelPhase::Loading => self.poll_load(ctx),
            TravelPhase::Teleporting => self.teleport(ctx),
            TravelPhase::Settling => {
                self.elapsed_seconds += fixed_dt_seconds;
                if self.elapsed_seconds >= self.config.settle_delay.as_secs_f32() {
                    self.enter(TravelPhase::FadingIn);
                }
            }
            TravelPhase::FadingIn => self.fade_in(ctx, fixed_dt_seconds),
            TravelPhase::NotifyingEntered => self.notify(ctx),
            TravelPhase::Finished => {}
        }
        self.status()
    }

    pub fn status(&self) -> TravelStatus {
        match (self.phase, &self.outcome) {
            (TravelPhase::Finished, Some(outcome)) => TravelStatus::Finished(outcome.clone()),
            (phase, _) => TravelStatus::Running(phase),
        }
    }

    fn enter(&mut self, phase: TravelPhase) {
        debug!(door = %self.source, from = ?self.phase, to = ?phase, "door_travel_phase");
        self.phase = phase;
        self.elapsed_seconds = 0.0;
    }

    fn target(&self) -> &DocumentGuid {
        &self.link.target_document.guid
    }

    fn fade_out(&mut self, ctx: &mut TravelContext<'_>, dt: f32) {
        if self.cancel.is_cancelled() {
            info!(door = %self.source, "door_travel_cancelled");
            self.outcome = Some(TravelOutcome::Cancelled);
            self.enter(TravelPhase::FadingIn);
            return;
        }

        self.opacity = step_towards(self.opacity, 1.0, dt, self.config.fade_out);
        ctx.fader.set_opacity(self.opacity);
        if self.opacity < 1.0 {
            return;
        }

        if ctx.host.active_guid() == Some(self.target()) {
            self.enter(TravelPhase::Teleporting);
        } else {
            let target = self.target().clone();
            ctx.host.begin_load(&target);
            debug!(door = %self.source, target = %target, "door_travel_load_issued");
            self.enter(TravelPhase::Loading);
        }
    }

    fn poll_load(&mut self, ctx: &mut TravelContext<'_>) {
        match ctx.host.poll_load() {
            LoadPoll::Pending => {}
            LoadPoll::Ready => self.enter(TravelPhase::Teleporting),
            LoadPoll::Failed(reason) => {
                warn!(
                    door = %self.source,
                    target = %self.target(),
                    %reason,
                    "door_travel_load_failed"
                );
                self.outcome = Some(TravelOutcome::LoadFailed { reason });
                self.enter(TravelPhase::FadingIn);
            }
        }
    }

    fn teleport(&mut self, ctx: &mut TravelContext<'_>) {
        let door_id = self.link.target_door_id.as_str();
        let entity = ctx
            .host
            .active_document()
            .filter(|document| document.guid == *self.target())
            .and_then(|document| document.find_door(door_id))
            .map(|(_, entity)| entity);
        let Some(entity) = entity else {
            panic!(
                "door {} links to '{door_id}' in document '{}', which does not resolve",
                self.source,
                self.target()
            );
        };

        let position = entity.entry_position();
        ctx.actor.teleport(position);
        self.destination = Some(DoorAddress::new(self.target().clone(), door_id));
        self.enter(TravelPhase::Settling);
    }

    fn fade_in(&mut self, ctx: &mut TravelContext<'_>, dt: f32) {
        self.opacity = step_towards(self.opacity, 0.0, dt, self.config.fade_in);
        ctx.fader.set_opacity(self.opacity);
        if self.opacity > 0.0 {
            return;
        }
        if self.outcome.is_some() {
            self.enter(TravelPhase::Finished);
        } else {
            self.enter(TravelPhase::NotifyingEntered);
        }
    }

    fn notify(&mut self, ctx: &mut TravelContext<'_>) {
        if let Some(destination) = self.destination.take() {
            ctx.events.door_entered(&self.source);
            ctx.events.door_entered(&destination);
            info!(from = %self.source, to = %destination, "door_travel_finished");
            self.outcome = Some(TravelOutcome::Arrived { destination });
        }
        self.enter(TravelPhase::Finished);
    }
}

fn step_towards(current: f32, target: f32, dt: f32, duration: Duration) -> f32 {
    let seconds = duration.as_secs_f32();
    if seconds <= 0.0 {
        return target;
    }
    let step = dt / seconds;
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{DocumentRef, Door, Entity, Vec2};

    const DT: f32 = 1.0 / 60.0;

    #[derive(Default)]
    struct MockHost {
        documents: HashMap<DocumentGuid, LevelDocument>,
        active: Option<DocumentGuid>,
        pending: Option<DocumentGuid>,
        pending_polls: u32,
        loads: Vec<DocumentGuid>,
    }

    impl LevelHost for MockHost {
        fn active_guid(&self) -> Option<&DocumentGuid> {
            self.active.as_ref()
        }

        fn active_document(&self) -> Option<&LevelDocument> {
            self.documents.get(self.active.as_ref()?)
        }

        fn begin_load(&mut self, guid: &DocumentGuid) {
            self.loads.push(guid.clone());
            self.pending = Some(guid.clone());
            self.pending_polls = 2;
        }

        fn poll_load(&mut self) -> LoadPoll {
            if self.pending_polls > 0 {
                self.pending_polls -= 1;
                return LoadPoll::Pending;
            }
            match self.pending.take() {
                Some(guid) if self.documents.contains_key(&guid) => {
                    self.active = Some(guid);
                    LoadPoll::Ready
                }
                Some(guid) => LoadPoll::Failed(format!("unknown document {guid}")),
                None => LoadPoll::Failed("nothing requested".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        opacities: Vec<f32>,
        teleports: Vec<Vec2>,
        entered: Vec<DoorAddress>,
    }

    impl ScreenFader for Recorder {
        fn set_opacity(&mut self, opacity: f32) {
            self.opacities.push(opacity);
        }
    }

    struct Actor(Vec<Vec2>);

    impl TravelActor for Actor {
        fn teleport(&mut self, position: Vec2) {
            self.0.push(position);
        }
    }

    struct Events(Vec<DoorAddress>);

    impl DoorEvents for Events {
        fn door_entered(&mut self, door: &DoorAddress) {
            self.0.push(door.clone());
        }
    }

    fn document(guid: &str, doors: &[(&str, Vec2, Option<Vec2>, DoorLink)]) -> LevelDocument {
        let mut document = LevelDocument::new(DocumentGuid::new(guid), guid.to_uppercase());
        for (id, position, anchor, link) in doors {
            let mut door = Door::new(*id, link.clone());
            door.entry_anchor = *anchor;
            document
                .entities
                .push(Entity::with_door(*id, *position, door));
        }
        document
    }

    fn link(guid: &str, door: &str) -> DoorLink {
        DoorLink::new(DocumentRef::new(DocumentGuid::new(guid), ""), door)
    }

    fn host() -> MockHost {
        let s1 = document(
            "s1",
            &[
                ("start", Vec2::new(1.0, 1.0), None, link("s2", "entry")),
                ("back", Vec2::new(9.0, 9.0), None, link("s1", "start")),
            ],
        );
        let s2 = document(
            "s2",
            &[("entry", Vec2::new(4.0, 0.0), Some(Vec2::new(5.0, 0.0)), DoorLink::default())],
        );
        let mut host = MockHost::default();
        host.documents.insert(s1.guid.clone(), s1);
        host.documents.insert(s2.guid.clone(), s2);
        host.active = Some(DocumentGuid::new("s1"));
        host
    }

    fn travel(host: &MockHost, door: &str, cancel: CancellationToken) -> DoorTravel {
        let source = host.active_document().expect("active");
        DoorTravel::through_door(source, door, TravelConfig::default(), cancel).expect("door")
    }

    fn run(
        travel: &mut DoorTravel,
        host: &mut MockHost,
        recorder: &mut Recorder,
    ) -> TravelOutcome {
        let mut actor = Actor(Vec::new());
        let mut events = Events(Vec::new());
        let outcome = {
            let mut ctx = TravelContext {
                host: &mut *host,
                fader: &mut *recorder,
                actor: &mut actor,
                events: &mut events,
            };
            let mut outcome = None;
            for _ in 0..10_000 {
                if let TravelStatus::Finished(done) = travel.tick(&mut ctx, DT) {
                    outcome = Some(done);
                    break;
                }
            }
            outcome.expect("travel finished")
        };
        recorder.teleports = actor.0;
        recorder.entered = events.0;
        outcome
    }

    #[test]
    fn default_config_timings() {
        let config = TravelConfig::default();
        assert_eq!(config.fade_out, Duration::from_millis(350));
        assert_eq!(config.fade_in, Duration::from_millis(350));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn cross_document_travel_loads_teleports_and_notifies_in_order() {
        let mut host = host();
        let mut recorder = Recorder::default();
        let mut door_travel = travel(&host, "start", CancellationToken::new());

        let outcome = run(&mut door_travel, &mut host, &mut recorder);
        let destination = DoorAddress::new(DocumentGuid::new("s2"), "entry");
        assert_eq!(
            outcome,
            TravelOutcome::Arrived {
                destination: destination.clone()
            }
        );
        assert_eq!(host.loads, vec![DocumentGuid::new("s2")]);
        assert_eq!(recorder.teleports, vec![Vec2::new(5.0, 0.0)]);
        assert_eq!(
            recorder.entered,
            vec![DoorAddress::new(DocumentGuid::new("s1"), "start"), destination]
        );
        assert_eq!(recorder.opacities.last().copied(), Some(0.0));
        assert!(recorder.opacities.contains(&1.0));
    }

    #[test]
    fn load_is_issued_only_once_fully_opaque() {
        let mut host = host();
        let mut recorder = Recorder::default();
        let mut actor = Actor(Vec::new());
        let mut events = Events(Vec::new());
        let mut door_travel = travel(&host, "start", CancellationToken::new());
        let mut ctx = TravelContext {
            host: &mut host,
            fader: &mut recorder,
            actor: &mut actor,
            events: &mut events,
        };
        loop {
            let status = door_travel.tick(&mut ctx, DT);
            if status == TravelStatus::Running(TravelPhase::Loading) {
                break;
            }
            assert_eq!(status, TravelStatus::Running(TravelPhase::FadingOut));
        }
        drop(ctx);
        assert_eq!(recorder.opacities.last().copied(), Some(1.0));
        assert_eq!(host.loads.len(), 1);
    }

    #[test]
    fn same_document_travel_skips_loading() {
        let mut host = host();
        let mut recorder = Recorder::default();
        let mut door_travel = travel(&host, "back", CancellationToken::new());

        let outcome = run(&mut door_travel, &mut host, &mut recorder);
        assert!(matches!(outcome, TravelOutcome::Arrived { .. }));
        assert!(host.loads.is_empty());
        assert_eq!(recorder.teleports, vec![Vec2::new(1.0, 1.0)]);
    }

    #[test]
    fn cancellation_while_fading_out_fades_back_without_loading() {
        let mut host = host();
        let mut recorder = Recorder::default();
        let cancel = CancellationToken::new();
        let mut door_travel = travel(&host, "start", cancel.clone());
        {
            let mut actor = Actor(Vec::new());
            let mut events = Events(Vec::new());
            let mut ctx = TravelContext {
                host: &mut host,
                fader: &mut recorder,
                actor: &mut actor,
                events: &mut events,
            };
            for _ in 0..5 {
                door_travel.tick(&mut ctx, DT);
            }
        }
        cancel.cancel();

        let outcome = run(&mut door_travel, &mut host, &mut recorder);
        assert_eq!(outcome, TravelOutcome::Cancelled);
        assert!(host.loads.is_empty());
        assert!(recorder.teleports.is_empty());
        assert!(recorder.entered.is_empty());
        assert_eq!(recorder.opacities.last().copied(), Some(0.0));
    }

    #[test]
    fn load_failure_fades_back_in() {
        let mut host = host();
        host.documents.remove(&DocumentGuid::new("s2"));
        let mut recorder = Recorder::default();
        let mut door_travel = travel(&host, "start", CancellationToken::new());

        let outcome = run(&mut door_travel, &mut host, &mut recorder);
        assert!(matches!(outcome, TravelOutcome::LoadFailed { .. }));
        assert!(recorder.teleports.is_empty());
        assert_eq!(recorder.opacities.last().copied(), Some(0.0));
    }

    #[test]
    #[should_panic(expected = "does not resolve")]
    fn unresolved_destination_door_is_a_contract_violation() {
        let mut host = host();
        if let Some(s2) = host.documents.get_mut(&DocumentGuid::new("s2")) {
            s2.entities.clear();
        }
        let mut recorder = Recorder::default();
        let mut door_travel = travel(&host, "start", CancellationToken::new());
        run(&mut door_travel, &mut host, &mut recorder);
    }
}
