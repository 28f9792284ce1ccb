//! Pure session state machine
//!
//! Every engine callback goes through [`SessionMachine::handle`], which
//! updates the observable state and returns the [`Reaction`] the actor must
//! carry out on the engine. Nothing here touches an engine, so the retry
//! rules are testable without one.

use crate::engine::EngineEvent;
use crate::fault::{ErrorCode, FaultClass, PlaybackFault};
use crate::format::{FormatHypothesis, FormatResolutionIterator, MimeType};
use crate::preferences::ReconnectMode;
use crate::types::{EngineState, PlaybackState, TrackGroup, VideoSize};
use crate::Result;
use tracing::{debug, info, warn};

/// What the actor must do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Observable state changed at most
    Nothing,
    /// Rebuild the pipeline for the next hypothesis on the same engine
    Retry(MimeType),
    /// Seek to the live edge and prepare the same pipeline again
    RecoverLiveEdge,
    /// Full replay of the current command
    Replay,
    /// First `Ready` of this command; resume point may be restored
    FirstReady,
    /// A terminal fault was published
    Terminal,
}

/// Observable and retry state of one session
#[derive(Debug, Clone)]
pub struct SessionMachine {
    iterator: FormatResolutionIterator,
    hypothesis: Option<FormatHypothesis>,
    has_pipeline: bool,
    attempts: usize,
    ready_seen: bool,
    playback_state: PlaybackState,
    last_error: Option<PlaybackFault>,
    video_size: VideoSize,
    tracks: Vec<TrackGroup>,
    is_playing: bool,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            iterator: FormatResolutionIterator::default(),
            hypothesis: None,
            has_pipeline: false,
            attempts: 0,
            ready_seen: false,
            playback_state: PlaybackState::Idle,
            last_error: None,
            video_size: VideoSize::default(),
            tracks: Vec::new(),
            is_playing: false,
        }
    }

    /// Start a fresh search for `url`. Returns the first hypothesis to build.
    pub fn begin(&mut self, url: &str, iterator: FormatResolutionIterator) -> Result<FormatHypothesis> {
        self.reset();
        self.iterator = iterator;
        let first = self
            .iterator
            .next(&FormatHypothesis::Unspecified(url.to_string()))?;
        self.hypothesis = Some(first.clone());
        if matches!(first, FormatHypothesis::Exhausted) {
            self.publish_terminal(PlaybackFault::new(
                ErrorCode::SourceUnavailable,
                "no format hypotheses configured",
            ));
        }
        Ok(first)
    }

    /// A pipeline for the current hypothesis is installed and preparing
    pub fn installed(&mut self) {
        self.has_pipeline = true;
        self.attempts += 1;
        self.playback_state = PlaybackState::Preparing;
    }

    /// Pipeline construction failed; nothing is playing
    pub fn fail(&mut self, fault: PlaybackFault) {
        self.has_pipeline = false;
        self.publish_terminal(fault);
    }

    /// Back to the released state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn handle(&mut self, event: &EngineEvent, reconnect: ReconnectMode) -> Result<Reaction> {
        match event {
            EngineEvent::StateChanged(state) => Ok(self.on_state(*state, reconnect)),
            EngineEvent::Fault(fault) => self.on_fault(fault),
            EngineEvent::VideoSizeChanged(size) => {
                self.video_size = *size;
                Ok(Reaction::Nothing)
            }
            EngineEvent::TracksChanged(tracks) => {
                self.tracks = tracks.clone();
                Ok(Reaction::Nothing)
            }
            EngineEvent::IsPlayingChanged(playing) => {
                self.is_playing = *playing;
                Ok(Reaction::Nothing)
            }
        }
    }

    fn on_state(&mut self, state: EngineState, reconnect: ReconnectMode) -> Reaction {
        if self.last_error.is_some() || self.hypothesis.is_none() {
            return Reaction::Nothing;
        }

        match state {
            EngineState::Idle => {
                self.playback_state = if self.has_pipeline {
                    PlaybackState::Preparing
                } else {
                    PlaybackState::Idle
                };
                Reaction::Nothing
            }
            EngineState::Buffering => {
                self.playback_state = PlaybackState::Buffering;
                Reaction::Nothing
            }
            EngineState::Ready => {
                self.playback_state = PlaybackState::Ready;
                if self.ready_seen {
                    Reaction::Nothing
                } else {
                    self.ready_seen = true;
                    Reaction::FirstReady
                }
            }
            EngineState::Ended if reconnect == ReconnectMode::Reconnect => {
                info!("Stream ended, reconnecting");
                Reaction::Replay
            }
            EngineState::Ended => {
                self.playback_state = PlaybackState::Ended;
                Reaction::Nothing
            }
        }
    }

    fn on_fault(&mut self, fault: &PlaybackFault) -> Result<Reaction> {
        if self.last_error.is_some() {
            debug!(code = %fault.code, "Fault after terminal error ignored");
            return Ok(Reaction::Nothing);
        }
        let Some(current) = self.hypothesis.clone() else {
            return Ok(Reaction::Nothing);
        };

        match fault.class() {
            FaultClass::Format if self.iterator.has_next(&current) => {
                let next = self.iterator.next(&current)?;
                self.hypothesis = Some(next.clone());
                match next {
                    FormatHypothesis::Trying(mime) => {
                        info!(
                            code = %fault.code,
                            from = %current,
                            to = %mime,
                            attempt = self.attempts + 1,
                            "Format rejected, trying next hypothesis"
                        );
                        self.playback_state = PlaybackState::Preparing;
                        Ok(Reaction::Retry(mime))
                    }
                    _ => {
                        warn!(code = %fault.code, attempts = self.attempts, "Format hypotheses exhausted");
                        self.publish_terminal(fault.clone());
                        Ok(Reaction::Terminal)
                    }
                }
            }
            FaultClass::Format => {
                self.publish_terminal(fault.clone());
                Ok(Reaction::Terminal)
            }
            FaultClass::BehindLiveWindow => {
                debug!("Behind live window, reseeking to live edge");
                self.playback_state = PlaybackState::Preparing;
                Ok(Reaction::RecoverLiveEdge)
            }
            FaultClass::UnspecifiedIo => {
                debug!(message = %fault.message, "Unspecified I/O fault ignored");
                Ok(Reaction::Nothing)
            }
            FaultClass::Terminal => {
                warn!(code = %fault.code, message = %fault.message, "Terminal playback fault");
                self.publish_terminal(fault.clone());
                Ok(Reaction::Terminal)
            }
        }
    }

    fn publish_terminal(&mut self, fault: PlaybackFault) {
        self.last_error = Some(fault);
        self.playback_state = PlaybackState::Failed;
        self.is_playing = false;
    }

    pub fn hypothesis(&self) -> Option<&FormatHypothesis> {
        self.hypothesis.as_ref()
    }

    pub fn has_pipeline(&self) -> bool {
        self.has_pipeline
    }

    /// Pipelines installed for the current command
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    pub fn last_error(&self) -> Option<&PlaybackFault> {
        self.last_error.as_ref()
    }

    pub fn video_size(&self) -> VideoSize {
        self.video_size
    }

    pub fn tracks(&self) -> &[TrackGroup] {
        &self.tracks
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }
}
