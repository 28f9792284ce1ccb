//! Playback engine seam
//!
//! The engine is the decoder/renderer stack that actually plays a
//! [`PlaybackPipeline`]. The session owns exactly one engine at a time and
//! reuses it across format retries; only `play()` and `release()` create or
//! destroy it.

use crate::continue_watching::PositionSnapshot;
use crate::fault::PlaybackFault;
use crate::pipeline::PlaybackPipeline;
use crate::types::{EngineState, TrackGroup, TrackType, VideoSize};
use crate::Result;
use tokio::sync::mpsc;

/// Options fixed for the lifetime of one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineOptions {
    pub tunneling: bool,
}

/// Callbacks from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    Fault(PlaybackFault),
    VideoSizeChanged(VideoSize),
    TracksChanged(Vec<TrackGroup>),
    IsPlayingChanged(bool),
}

/// An event tagged with the engine generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEngineEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Where an engine delivers its callbacks.
///
/// Never blocks, so engines may emit from any thread or callback.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEngineEvent>,
}

impl EngineEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEngineEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns false once the session is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEngineEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// The decoder/renderer stack
pub trait PlaybackEngine: Send {
    /// Replace the media source. The engine instance itself is kept.
    fn set_pipeline(&mut self, pipeline: &PlaybackPipeline) -> Result<()>;

    fn prepare(&mut self);

    fn set_play_when_ready(&mut self, play_when_ready: bool);

    fn state(&self) -> EngineState;

    fn seek_to(&mut self, position_ms: u64);

    /// Jump to the default position, the live edge for live streams
    fn seek_to_default_position(&mut self);

    fn set_repeat_one(&mut self, repeat: bool);

    fn position_snapshot(&self) -> PositionSnapshot;

    fn select_track(&mut self, group_id: &str, track_index: usize) -> Result<()>;

    fn clear_track(&mut self, track_type: TrackType);

    fn release(&mut self);
}

/// Creates engines for the session
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        options: EngineOptions,
        events: EngineEventSink,
    ) -> Result<Box<dyn PlaybackEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EngineEventSink::new(7, tx);
        assert!(sink.emit(EngineEvent::IsPlayingChanged(true)));
        let tagged = rx.try_recv().unwrap();
        assert_eq!(tagged.generation, 7);
        assert_eq!(tagged.event, EngineEvent::IsPlayingChanged(true));

        drop(rx);
        assert!(!sink.emit(EngineEvent::IsPlayingChanged(false)));
    }
}
