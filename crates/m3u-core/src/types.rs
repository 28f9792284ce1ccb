//! Core types for M3U Core

use crate::drm::DrmDescriptor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a playable entity (a channel row in the playlist store)
pub type EntityId = i64;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to play. Consumed once per `play()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackCommand {
    ByEntityId { id: EntityId },
    ByEpisode {
        entity_id: EntityId,
        episode: EpisodeDescriptor,
    },
}

impl PlaybackCommand {
    pub fn entity(id: EntityId) -> Self {
        PlaybackCommand::ByEntityId { id }
    }

    pub fn episode(entity_id: EntityId, episode: EpisodeDescriptor) -> Self {
        PlaybackCommand::ByEpisode { entity_id, episode }
    }

    /// The entity this command resolves through
    pub fn entity_id(&self) -> EntityId {
        match self {
            PlaybackCommand::ByEntityId { id } => *id,
            PlaybackCommand::ByEpisode { entity_id, .. } => *entity_id,
        }
    }
}

/// A series episode inside an Xtream-sourced entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDescriptor {
    pub id: String,
    pub container_extension: String,
    pub title: Option<String>,
}

/// A playable entity as stored by the playlist layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub url: String,
    pub title: String,
    /// Locator of the playlist this entity belongs to
    pub parent_url: String,
    pub drm: Option<DrmDescriptor>,
}

/// Where a parent playlist came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParentSource {
    M3u,
    Xtream {
        base_url: String,
        username: String,
        password: String,
    },
}

/// A parent playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub url: String,
    pub title: String,
    pub user_agent: Option<String>,
    pub source: ParentSource,
}

impl Parent {
    /// Stream url of an episode under this parent, if the parent can address episodes
    pub fn episode_url(&self, episode: &EpisodeDescriptor) -> Option<String> {
        match &self.source {
            ParentSource::Xtream {
                base_url,
                username,
                password,
            } => Some(format!(
                "{}/series/{}/{}/{}.{}",
                base_url.trim_end_matches('/'),
                username,
                password,
                episode.id,
                episode.container_extension
            )),
            ParentSource::M3u => None,
        }
    }
}

/// Transport scheme of a stream locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportScheme {
    Http,
    Https,
    Rtmp,
    Rtsp,
    File,
    Other,
}

impl TransportScheme {
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => TransportScheme::Http,
            "https" => TransportScheme::Https,
            "rtmp" | "rtmps" => TransportScheme::Rtmp,
            "rtsp" | "rtsps" => TransportScheme::Rtsp,
            "file" => TransportScheme::File,
            _ => TransportScheme::Other,
        }
    }
}

impl std::fmt::Display for TransportScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportScheme::Http => write!(f, "http"),
            TransportScheme::Https => write!(f, "https"),
            TransportScheme::Rtmp => write!(f, "rtmp"),
            TransportScheme::Rtsp => write!(f, "rtsp"),
            TransportScheme::File => write!(f, "file"),
            TransportScheme::Other => write!(f, "other"),
        }
    }
}

/// Observable playback state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No pipeline installed
    Idle,
    /// Pipeline installed, engine preparing
    Preparing,
    /// Engine is loading data
    Buffering,
    /// Engine can play immediately
    Ready,
    /// End of stream reached
    Ended,
    /// A terminal fault was published
    Failed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Preparing => write!(f, "preparing"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// State reported by the underlying playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Decoded video geometry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    /// Display aspect ratio, if known
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.height == 0 {
            return None;
        }
        let ratio = if self.pixel_ratio > 0.0 { self.pixel_ratio } else { 1.0 };
        Some(self.width as f32 * ratio / self.height as f32)
    }
}

/// Track types that can be selected or cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
    Text,
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Video => write!(f, "video"),
            TrackType::Audio => write!(f, "audio"),
            TrackType::Text => write!(f, "text"),
        }
    }
}

/// A single track within a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub label: Option<String>,
    pub language: Option<String>,
    pub bitrate: Option<u64>,
    pub supported: bool,
    pub selected: bool,
}

/// A group of interchangeable tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackGroup {
    pub id: String,
    pub track_type: TrackType,
    pub tracks: Vec<Track>,
}

impl TrackGroup {
    /// Index of the selected track, if any
    pub fn selected_index(&self) -> Option<usize> {
        self.tracks.iter().position(|t| t.selected)
    }
}
