//! Playback Session - single-writer orchestrator for one engine
//!
//! Coordinates:
//! - Entity resolution through the repositories
//! - Format hypothesis search and pipeline rebuilds
//! - Live-edge recovery and reconnect-on-end
//! - Continue-watching restore / store
//! - Preference hot-reload
//!
//! # Architecture
//!
//! ```text
//!  PlaybackSession (handle, Clone)           SessionActor (one task)
//!  ┌──────────────────────────┐  requests   ┌─────────────────────────────┐
//!  │ play / replay / release  │ ──────────► │ SessionMachine (pure)       │
//!  │ pause_or_continue        │             │ engine: Box<dyn Engine>     │
//!  │ choose_track / clear     │ ◄────────── │ pipeline, current command   │
//!  │ watch::Receiver x6       │  observables└──────▲───────────▲──────────┘
//!  └──────────────────────────┘                    │           │
//!                                        engine events   preference changes
//! ```
//!
//! Every mutation happens on the actor task, one message at a time, so a
//! teardown-then-rebuild in `play()` can never interleave with another
//! caller, and hypothesis advancement is strictly sequential.

mod machine;

pub use machine::{Reaction, SessionMachine};

use crate::{
    cache::{self, MediaCache},
    config::SessionConfig,
    continue_watching::{resource_key, ContinueWatchingEntry, ContinueWatchingStore, PositionSnapshot},
    engine::{EngineEventSink, EngineFactory, EngineOptions, PlaybackEngine, TaggedEngineEvent},
    fault::{ErrorCode, PlaybackFault},
    format::{FormatHypothesis, FormatResolutionIterator},
    pipeline::{PipelineRequest, PlaybackPipeline, SourceFactorySelector},
    preferences::{PreferenceChange, PreferenceSnapshot, PreferenceSource, PreferenceWatcher, ReconnectMode},
    repository::{EntityRepository, ParentRepository},
    types::*,
    Error, Result,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Collaborators a session depends on
#[derive(Clone)]
pub struct SessionDeps {
    pub entities: Arc<dyn EntityRepository>,
    pub parents: Arc<dyn ParentRepository>,
    pub preferences: Arc<dyn PreferenceSource>,
    pub engines: Arc<dyn EngineFactory>,
    pub selector: SourceFactorySelector,
    pub store: Option<Arc<dyn ContinueWatchingStore>>,
    pub cache: Option<Arc<dyn MediaCache>>,
}

impl SessionDeps {
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        parents: Arc<dyn ParentRepository>,
        preferences: Arc<dyn PreferenceSource>,
        engines: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            entities,
            parents,
            preferences,
            engines,
            selector: SourceFactorySelector::default(),
            store: None,
            cache: None,
        }
    }

    pub fn with_selector(mut self, selector: SourceFactorySelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ContinueWatchingStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn MediaCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Play {
        command: PlaybackCommand,
        reply: Reply<Result<()>>,
    },
    Replay {
        reply: Reply<Result<()>>,
    },
    Release {
        reply: Reply<Result<()>>,
    },
    PauseOrContinue {
        resume: bool,
        reply: Reply<Result<()>>,
    },
    ChooseTrack {
        group_id: String,
        track_index: usize,
        reply: Reply<Result<()>>,
    },
    ClearTrack {
        track_type: TrackType,
        reply: Reply<Result<()>>,
    },
    PositionSnapshot {
        reply: Reply<Option<PositionSnapshot>>,
    },
    Shutdown {
        reply: Reply<Result<()>>,
    },
}

/// Handle to a running playback session
#[derive(Clone)]
pub struct PlaybackSession {
    id: SessionId,
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<PlaybackState>,
    last_error: watch::Receiver<Option<PlaybackFault>>,
    video_size: watch::Receiver<VideoSize>,
    tracks: watch::Receiver<Vec<TrackGroup>>,
    is_playing: watch::Receiver<bool>,
    hypothesis: watch::Receiver<Option<FormatHypothesis>>,
    cache: Option<Arc<dyn MediaCache>>,
}

impl PlaybackSession {
    /// Spawn the session actor on the current tokio runtime
    pub fn spawn(config: SessionConfig, deps: SessionDeps) -> Result<Self> {
        config.validate()?;

        let id = SessionId::new();
        let (requests_tx, requests_rx) = mpsc::channel(config.command_queue);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (changes_tx, changes_rx) = mpsc::channel(4);
        let observables = Observables::new();

        let handle = Self {
            id,
            requests: requests_tx,
            state: observables.state.subscribe(),
            last_error: observables.last_error.subscribe(),
            video_size: observables.video_size.subscribe(),
            tracks: observables.tracks.subscribe(),
            is_playing: observables.is_playing.subscribe(),
            hypothesis: observables.hypothesis.subscribe(),
            cache: deps.cache.clone(),
        };

        let actor = SessionActor {
            id,
            config,
            deps,
            requests: requests_rx,
            deferred: VecDeque::new(),
            events_tx,
            events: events_rx,
            changes_tx,
            changes: changes_rx,
            observables,
            machine: SessionMachine::new(),
            engine: None,
            pipeline: None,
            current: None,
            applied: PreferenceSnapshot::default(),
            generation: 0,
            watch_cancel: None,
        };
        tokio::spawn(actor.run());

        Ok(handle)
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Tear down whatever is playing and start `command` from a fresh format search
    pub async fn play(&self, command: PlaybackCommand) -> Result<()> {
        self.request(|reply| Request::Play { command, reply }).await?
    }

    /// Release and play the last command again. No-op without one.
    pub async fn replay(&self) -> Result<()> {
        self.request(|reply| Request::Replay { reply }).await?
    }

    /// Tear down the engine and clear every observable. Idempotent.
    pub async fn release(&self) -> Result<()> {
        self.request(|reply| Request::Release { reply }).await?
    }

    pub async fn pause_or_continue(&self, resume: bool) -> Result<()> {
        self.request(|reply| Request::PauseOrContinue { resume, reply })
            .await?
    }

    pub async fn choose_track(&self, group_id: &str, track_index: usize) -> Result<()> {
        let group_id = group_id.to_string();
        self.request(|reply| Request::ChooseTrack {
            group_id,
            track_index,
            reply,
        })
        .await?
    }

    pub async fn clear_track(&self, track_type: TrackType) -> Result<()> {
        self.request(|reply| Request::ClearTrack { track_type, reply })
            .await?
    }

    /// Capability/timing snapshot of the current item, for the persistence layer
    pub async fn position_snapshot(&self) -> Result<Option<PositionSnapshot>> {
        self.request(|reply| Request::PositionSnapshot { reply }).await
    }

    /// Release and stop the actor. Later calls fail with `SessionClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Request::Shutdown { reply }).await?
    }

    /// Bytes held by the media cache
    pub fn cache_space(&self) -> u64 {
        self.cache.as_ref().map(|c| c.bytes_used()).unwrap_or(0)
    }

    /// Drop every cached span, returning the bytes freed
    pub fn clear_cache(&self) -> u64 {
        self.cache.as_ref().map(|c| cache::clear(c.as_ref())).unwrap_or(0)
    }

    /// Subscribe to playback state changes
    pub fn playback_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Last terminal fault, cleared by the next `play()`
    pub fn last_error(&self) -> watch::Receiver<Option<PlaybackFault>> {
        self.last_error.clone()
    }

    pub fn video_size(&self) -> watch::Receiver<VideoSize> {
        self.video_size.clone()
    }

    pub fn tracks(&self) -> watch::Receiver<Vec<TrackGroup>> {
        self.tracks.clone()
    }

    pub fn is_playing(&self) -> watch::Receiver<bool> {
        self.is_playing.clone()
    }

    /// Current format hypothesis; `None` while released
    pub fn hypothesis(&self) -> watch::Receiver<Option<FormatHypothesis>> {
        self.hypothesis.clone()
    }
}

struct Observables {
    state: watch::Sender<PlaybackState>,
    last_error: watch::Sender<Option<PlaybackFault>>,
    video_size: watch::Sender<VideoSize>,
    tracks: watch::Sender<Vec<TrackGroup>>,
    is_playing: watch::Sender<bool>,
    hypothesis: watch::Sender<Option<FormatHypothesis>>,
}

impl Observables {
    fn new() -> Self {
        Self {
            state: watch::channel(PlaybackState::Idle).0,
            last_error: watch::channel(None).0,
            video_size: watch::channel(VideoSize::default()).0,
            tracks: watch::channel(Vec::new()).0,
            is_playing: watch::channel(false).0,
            hypothesis: watch::channel(None).0,
        }
    }

    fn publish(&self, machine: &SessionMachine) {
        set_if_changed(&self.state, machine.playback_state());
        set_if_changed(&self.last_error, machine.last_error().cloned());
        set_if_changed(&self.video_size, machine.video_size());
        set_if_changed(&self.tracks, machine.tracks().to_vec());
        set_if_changed(&self.is_playing, machine.is_playing());
        set_if_changed(&self.hypothesis, machine.hypothesis().cloned());
    }
}

fn set_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

/// A command resolved to something playable
struct Resolved {
    command: PlaybackCommand,
    entity: Entity,
    url: String,
    user_agent: Option<String>,
}

async fn resolve_command(
    entities: Arc<dyn EntityRepository>,
    parents: Arc<dyn ParentRepository>,
    command: PlaybackCommand,
    default_user_agent: Option<String>,
) -> Result<Resolved> {
    let id = command.entity_id();
    let entity = entities.get(id).await?.ok_or(Error::EntityNotFound(id))?;
    let parent = parents.get(&entity.parent_url).await?;

    let url = match &command {
        PlaybackCommand::ByEntityId { .. } => entity.url.clone(),
        PlaybackCommand::ByEpisode { episode, .. } => {
            let parent = parent
                .as_ref()
                .ok_or_else(|| Error::ParentNotFound(entity.parent_url.clone()))?;
            parent
                .episode_url(episode)
                .unwrap_or_else(|| entity.url.clone())
        }
    };

    let user_agent = parent
        .and_then(|p| p.user_agent)
        .filter(|ua| !ua.trim().is_empty())
        .or(default_user_agent);

    Ok(Resolved {
        command,
        entity,
        url,
        user_agent,
    })
}

struct SessionActor {
    id: SessionId,
    config: SessionConfig,
    deps: SessionDeps,
    requests: mpsc::Receiver<Request>,
    /// Requests received while a resolution was in flight
    deferred: VecDeque<Request>,
    events_tx: mpsc::UnboundedSender<TaggedEngineEvent>,
    events: mpsc::UnboundedReceiver<TaggedEngineEvent>,
    changes_tx: mpsc::Sender<PreferenceChange>,
    changes: mpsc::Receiver<PreferenceChange>,
    observables: Observables,
    machine: SessionMachine,
    engine: Option<Box<dyn PlaybackEngine>>,
    pipeline: Option<PlaybackPipeline>,
    current: Option<Resolved>,
    /// Preferences the current pipeline was built from
    applied: PreferenceSnapshot,
    /// Bumped for every engine; fences late events and watcher signals
    generation: u64,
    watch_cancel: Option<CancellationToken>,
}

impl SessionActor {
    async fn run(mut self) {
        info!(session_id = %self.id, "Playback session started");

        loop {
            let request = match self.deferred.pop_front() {
                Some(request) => Some(request),
                None => tokio::select! {
                    biased;
                    Some(event) = self.events.recv() => {
                        self.on_engine_event(event).await;
                        continue;
                    }
                    Some(change) = self.changes.recv() => {
                        self.on_preference_change(change).await;
                        continue;
                    }
                    request = self.requests.recv() => request,
                },
            };

            let Some(request) = request else {
                self.release().await;
                break;
            };
            if !self.dispatch(request).await {
                break;
            }
        }

        info!(session_id = %self.id, "Playback session stopped");
    }

    /// Returns false once the actor should stop
    async fn dispatch(&mut self, request: Request) -> bool {
        match request {
            Request::Play { command, reply } => {
                let result = self.play(command).await;
                let _ = reply.send(result);
            }
            Request::Replay { reply } => {
                let result = self.replay().await;
                let _ = reply.send(result);
            }
            Request::Release { reply } => {
                self.release().await;
                let _ = reply.send(Ok(()));
            }
            Request::PauseOrContinue { resume, reply } => {
                self.pause_or_continue(resume);
                self.publish();
                let _ = reply.send(Ok(()));
            }
            Request::ChooseTrack {
                group_id,
                track_index,
                reply,
            } => {
                let result = match self.engine.as_mut() {
                    Some(engine) => engine.select_track(&group_id, track_index),
                    None => Err(Error::precondition("no active playback")),
                };
                let _ = reply.send(result);
            }
            Request::ClearTrack { track_type, reply } => {
                let result = match self.engine.as_mut() {
                    Some(engine) => {
                        engine.clear_track(track_type);
                        Ok(())
                    }
                    None => Err(Error::precondition("no active playback")),
                };
                let _ = reply.send(result);
            }
            Request::PositionSnapshot { reply } => {
                let _ = reply.send(self.engine.as_ref().map(|e| e.position_snapshot()));
            }
            Request::Shutdown { reply } => {
                self.release().await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    fn publish(&self) {
        self.observables.publish(&self.machine);
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn play(&mut self, command: PlaybackCommand) -> Result<()> {
        self.release().await;

        let resolved = self.resolve(command).await?;
        if let Err(e) = self.deps.entities.report_played(resolved.entity.id).await {
            warn!(error = %e, entity = resolved.entity.id, "Failed to report played entity");
        }

        let mut preference_rx = self.deps.preferences.subscribe();
        let preferences = preference_rx.borrow_and_update().clone();
        self.generation += 1;
        let sink = EngineEventSink::new(self.generation, self.events_tx.clone());
        let mut engine = self.deps.engines.create(
            EngineOptions {
                tunneling: preferences.tunneling,
            },
            sink,
        )?;
        engine.set_repeat_one(preferences.reconnect_mode == ReconnectMode::Retry);

        let iterator = FormatResolutionIterator::for_url(
            &resolved.url,
            &self.config.format_priority,
            self.config.pre_guess,
        );
        let first = match self.machine.begin(&resolved.url, iterator) {
            Ok(first) => first,
            Err(e) => {
                engine.release();
                return Err(e);
            }
        };

        info!(
            entity = resolved.entity.id,
            url = %resolved.url,
            hypothesis = %first,
            generation = self.generation,
            "Starting playback"
        );

        self.engine = Some(engine);
        self.applied = preferences;
        self.current = Some(resolved);

        if matches!(first, FormatHypothesis::Trying(_)) {
            self.install(&first);
        }
        self.start_watcher(preference_rx);
        self.publish();
        Ok(())
    }

    /// Resolve a command while staying responsive to `release()`.
    ///
    /// Requests arriving meanwhile are queued in order. A release, shutdown
    /// or closed handle cancels the resolution; the queued release then runs
    /// after anything queued before it.
    async fn resolve(&mut self, command: PlaybackCommand) -> Result<Resolved> {
        let resolution = resolve_command(
            self.deps.entities.clone(),
            self.deps.parents.clone(),
            command,
            self.config.default_user_agent.clone(),
        );
        tokio::pin!(resolution);

        loop {
            tokio::select! {
                result = &mut resolution => return result,
                request = self.requests.recv() => match request {
                    Some(request @ (Request::Release { .. } | Request::Shutdown { .. })) => {
                        debug!("Resolution cancelled");
                        self.deferred.push_back(request);
                        return Err(Error::Cancelled);
                    }
                    Some(request) => self.deferred.push_back(request),
                    None => return Err(Error::Cancelled),
                },
            }
        }
    }

    /// Build and install the pipeline for `hypothesis` on the current engine
    fn install(&mut self, hypothesis: &FormatHypothesis) {
        self.pipeline = None;
        let (Some(current), Some(engine)) = (self.current.as_ref(), self.engine.as_mut()) else {
            return;
        };

        let request = PipelineRequest {
            url: &current.url,
            hypothesis,
            user_agent: current.user_agent.as_deref(),
            drm: current.entity.drm.as_ref(),
            preferences: &self.applied,
        };
        let result = self.deps.selector.build(request).and_then(|pipeline| {
            engine.set_pipeline(&pipeline)?;
            Ok(pipeline)
        });

        match result {
            Ok(pipeline) => {
                engine.set_play_when_ready(true);
                engine.prepare();
                self.pipeline = Some(pipeline);
                self.machine.installed();
                debug!(hypothesis = %hypothesis, attempt = self.machine.attempts(), "Pipeline installed");
            }
            Err(e) => {
                warn!(error = %e, hypothesis = %hypothesis, "Pipeline unavailable");
                self.machine
                    .fail(PlaybackFault::new(ErrorCode::SourceUnavailable, e.to_string()));
            }
        }
    }

    /// Watch `rx` for changes against the applied snapshot. `rx` must be the
    /// receiver the applied snapshot was read from.
    fn start_watcher(&mut self, rx: watch::Receiver<PreferenceSnapshot>) {
        let cancel = CancellationToken::new();
        PreferenceWatcher::new(self.generation, self.applied.clone(), rx, cancel.clone())
        .spawn(self.changes_tx.clone());
        self.watch_cancel = Some(cancel);
    }

    async fn replay(&mut self) -> Result<()> {
        let Some(command) = self.current.as_ref().map(|c| c.command.clone()) else {
            debug!("Nothing to replay");
            return Ok(());
        };
        self.play(command).await
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn release(&mut self) {
        if let Some(cancel) = self.watch_cancel.take() {
            cancel.cancel();
        }
        if let Some(mut engine) = self.engine.take() {
            let snapshot = engine.position_snapshot();
            engine.release();
            self.store_position(snapshot).await;
            debug!(generation = self.generation, "Engine released");
        }
        self.pipeline = None;
        self.current = None;
        self.machine.reset();
        self.publish();
    }

    fn pause_or_continue(&mut self, resume: bool) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if !resume {
            engine.set_play_when_ready(false);
            return;
        }
        engine.set_play_when_ready(true);
        if engine.state() == EngineState::Idle
            && self.machine.has_pipeline()
            && self.machine.last_error().is_none()
        {
            debug!("Engine lost its prepared state, preparing again");
            engine.prepare();
        }
    }

    async fn on_engine_event(&mut self, tagged: TaggedEngineEvent) {
        if tagged.generation != self.generation || self.engine.is_none() {
            debug!(generation = tagged.generation, "Dropping event from released engine");
            return;
        }

        let reconnect = self.deps.preferences.snapshot().reconnect_mode;
        let reaction = match self.machine.handle(&tagged.event, reconnect) {
            Ok(reaction) => reaction,
            Err(e) => {
                warn!(error = %e, "Engine event rejected");
                return;
            }
        };

        match reaction {
            Reaction::Retry(mime) => self.install(&FormatHypothesis::Trying(mime)),
            Reaction::RecoverLiveEdge => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.seek_to_default_position();
                    engine.prepare();
                }
            }
            Reaction::Replay => {
                if let Err(e) = self.replay().await {
                    warn!(error = %e, "Reconnect failed");
                }
            }
            Reaction::FirstReady => self.restore_position().await,
            Reaction::Terminal | Reaction::Nothing => {}
        }
        self.publish();
    }

    async fn on_preference_change(&mut self, change: PreferenceChange) {
        if change.generation != self.generation || self.current.is_none() {
            return;
        }
        if change.replay {
            info!(session_id = %self.id, "Replaying after preference change");
            if let Err(e) = self.replay().await {
                warn!(error = %e, "Replay after preference change failed");
            }
        } else if let Some(engine) = self.engine.as_mut() {
            let repeat = change.snapshot.reconnect_mode == ReconnectMode::Retry;
            engine.set_repeat_one(repeat);
            self.applied.reconnect_mode = change.snapshot.reconnect_mode;
            debug!(repeat_one = repeat, "Reconnect mode applied");
        }
        let _ = change.applied.send(());
    }

    async fn restore_position(&mut self) {
        let (Some(store), Some(current), Some(engine)) = (
            self.deps.store.clone(),
            self.current.as_ref(),
            self.engine.as_mut(),
        ) else {
            return;
        };
        let policy = &self.config.continue_watching;

        let snapshot = engine.position_snapshot();
        if !policy.is_restoring_supported(&snapshot) {
            return;
        }

        let key = resource_key(&current.url);
        let entry = match store.get(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read continue-watching entry");
                return;
            }
        };

        let at_entry = PositionSnapshot {
            position_ms: entry.position_ms,
            ..snapshot
        };
        if policy.is_resetting_supported(&at_entry) {
            debug!(position_ms = entry.position_ms, "Discarding stored position");
            if let Err(e) = store.remove(&key).await {
                warn!(error = %e, "Failed to remove continue-watching entry");
            }
        } else {
            info!(position_ms = entry.position_ms, "Restoring position");
            engine.seek_to(entry.position_ms);
        }
    }

    async fn store_position(&mut self, snapshot: PositionSnapshot) {
        let (Some(store), Some(current)) = (self.deps.store.clone(), self.current.as_ref()) else {
            return;
        };
        let policy = &self.config.continue_watching;

        if !policy.is_storing_supported(&snapshot) {
            return;
        }

        let result = if policy.is_resetting_supported(&snapshot) {
            store.remove(&resource_key(&current.url)).await
        } else {
            let mime_type = self.pipeline.as_ref().and_then(|p| p.mime_type);
            debug!(position_ms = snapshot.position_ms, "Storing position");
            store
                .put(ContinueWatchingEntry::new(&current.url, snapshot.position_ms, mime_type))
                .await
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to store continue-watching entry");
        }
    }
}
