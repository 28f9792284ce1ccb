//! M3U Core - Playback resilience engine for IPTV clients
//!
//! This crate provides the playback core behind an M3U/Xtream player:
//! - Format hypothesis search for streams of unknown type
//! - Media pipeline construction (transport, caching, DRM)
//! - Fault classification and recovery
//! - Continue-watching position policy
//! - Preference hot-reload
//!
//! The decoder/renderer stack, repositories and stores are collaborator
//! traits; the crate ships in-memory implementations for tests and tools.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          M3U Core                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Format    │  │    Source    │  │     DRM      │           │
//! │  │   Iterator   │  │   Selector   │  │   Recipes    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │ ◄──── PlaybackEngine         │
//! │                    │   Session   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │  Preference  │  │  Continue   │  │ Repositories │            │
//! │  │   Watcher    │  │  Watching   │  │   & Cache    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod format;
pub mod fault;
pub mod drm;
pub mod pipeline;
pub mod engine;
pub mod preferences;
pub mod continue_watching;
pub mod repository;
pub mod cache;
pub mod config;
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use format::{FormatHypothesis, FormatResolutionIterator, MimeType, DEFAULT_PRIORITY};
pub use fault::{ErrorCode, FaultClass, PlaybackFault};
pub use drm::{DeviceDrm, DrmDescriptor, DrmScheme, DrmSessionRecipe, DrmSupport};
pub use pipeline::{PipelineRequest, PlaybackPipeline, SourceFactorySelector};
pub use engine::{EngineEvent, EngineEventSink, EngineFactory, EngineOptions, PlaybackEngine};
pub use preferences::{PreferenceSnapshot, PreferenceSource, PreferenceWatcher, Preferences, ReconnectMode};
pub use continue_watching::{
    ContinueWatchingEntry, ContinueWatchingPolicy, ContinueWatchingStore, MemoryStore,
    PositionSnapshot,
};
pub use repository::{EntityRepository, MemoryCatalog, ParentRepository};
pub use cache::{MediaCache, MemoryCache};
pub use config::SessionConfig;
pub use session::{PlaybackSession, SessionDeps};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "M3U Core initialized");
}
