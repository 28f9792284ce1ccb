//! Scripted engine for `simulate`
//!
//! Each prepare consumes the next outcome of the script and emits the
//! engine callbacks that outcome implies.

use m3u_core::{
    DrmDescriptor, EngineEvent, EngineEventSink, EngineFactory, EngineOptions, EngineState,
    ErrorCode, PlaybackEngine, PlaybackFault, PlaybackPipeline, PositionSnapshot,
    PreferenceSnapshot, Result, TrackType, VideoSize,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What the engine does with one prepared pipeline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ready,
    Ended,
    Fault(ErrorCode),
}

/// A simulation script
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub url: String,
    #[serde(default)]
    pub drm: Option<DrmDescriptor>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub preferences: PreferenceSnapshot,
    pub outcomes: Vec<Outcome>,
}

type Outcomes = Arc<Mutex<VecDeque<Outcome>>>;

pub struct ScriptedFactory {
    outcomes: Outcomes,
}

impl ScriptedFactory {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
        }
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(
        &self,
        options: EngineOptions,
        events: EngineEventSink,
    ) -> Result<Box<dyn PlaybackEngine>> {
        debug!(tunneling = options.tunneling, generation = events.generation(), "Scripted engine created");
        Ok(Box::new(ScriptedEngine {
            outcomes: self.outcomes.clone(),
            events,
            state: EngineState::Idle,
            play_when_ready: false,
            position_ms: 0,
        }))
    }
}

struct ScriptedEngine {
    outcomes: Outcomes,
    events: EngineEventSink,
    state: EngineState,
    play_when_ready: bool,
    position_ms: u64,
}

impl ScriptedEngine {
    fn set_state(&mut self, state: EngineState) {
        self.state = state;
        self.events.emit(EngineEvent::StateChanged(state));
    }
}

impl PlaybackEngine for ScriptedEngine {
    fn set_pipeline(&mut self, _pipeline: &PlaybackPipeline) -> Result<()> {
        self.state = EngineState::Idle;
        Ok(())
    }

    fn prepare(&mut self) {
        let next = self.outcomes.lock().ok().and_then(|mut o| o.pop_front());
        let Some(outcome) = next else {
            return;
        };

        self.set_state(EngineState::Buffering);
        match outcome {
            Outcome::Ready => {
                self.set_state(EngineState::Ready);
                self.events.emit(EngineEvent::VideoSizeChanged(VideoSize::new(1920, 1080)));
                self.events.emit(EngineEvent::IsPlayingChanged(self.play_when_ready));
            }
            Outcome::Ended => {
                self.set_state(EngineState::Ready);
                self.set_state(EngineState::Ended);
            }
            Outcome::Fault(code) => {
                self.state = EngineState::Idle;
                self.events
                    .emit(EngineEvent::Fault(PlaybackFault::new(code, "scripted")));
            }
        }
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.play_when_ready = play_when_ready;
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.position_ms = position_ms;
    }

    fn seek_to_default_position(&mut self) {
        self.position_ms = 0;
    }

    fn set_repeat_one(&mut self, _repeat: bool) {}

    fn position_snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            position_ms: self.position_ms,
            ..Default::default()
        }
    }

    fn select_track(&mut self, _group_id: &str, _track_index: usize) -> Result<()> {
        Ok(())
    }

    fn clear_track(&mut self, _track_type: TrackType) {}

    fn release(&mut self) {
        self.state = EngineState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_parsing() {
        let script: Script = serde_json::from_str(
            r#"{
                "url": "http://cdn.example.com/live/1",
                "outcomes": [{"fault": "parsing_container_malformed"}, "ready"]
            }"#,
        )
        .unwrap();
        assert_eq!(
            script.outcomes,
            vec![
                Outcome::Fault(ErrorCode::ParsingContainerMalformed),
                Outcome::Ready
            ]
        );
        assert_eq!(script.preferences, PreferenceSnapshot::default());
    }
}
