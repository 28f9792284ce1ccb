//! Pipeline construction
//!
//! Maps a format hypothesis, the locator's transport scheme, the parent's
//! user agent and an optional DRM descriptor to a [`PlaybackPipeline`]: the
//! data source, media source family and DRM session manager the engine
//! should instantiate. Construction is pure; nothing here touches the
//! network.
//!
//! ```text
//!   hypothesis ──► media source strategy table ──┐
//!   scheme     ──► data source (rtmp | http[+cache])├──► PlaybackPipeline
//!   drm        ──► session manager recipe ─────────┘
//! ```

use crate::drm::{self, DrmDescriptor, DrmSessionRecipe, DrmSupport};
use crate::format::{FormatHypothesis, MimeType};
use crate::preferences::PreferenceSnapshot;
use crate::types::TransportScheme;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Plain http source settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpDataSource {
    pub user_agent: Option<String>,
    pub connect_timeout_ms: u64,
    pub allow_cross_protocol_redirects: bool,
}

/// Caching wrapper around the http source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDecorator {
    /// Bypass the cache after a read error instead of failing playback
    pub ignore_cache_on_error: bool,
}

/// How bytes are fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSourceRecipe {
    Rtmp,
    Http {
        http: HttpDataSource,
        cache: Option<CacheDecorator>,
    },
}

/// Which media source family parses the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSourceRecipe {
    Progressive,
    Hls {
        /// Prepare from chunk data instead of loading every media playlist
        allow_chunkless_preparation: bool,
    },
    Rtsp {
        force_tcp: bool,
        /// Accept self-signed certificates from cameras and NVRs
        trust_all_certificates: bool,
    },
    /// Generic factory that inspects the stream itself
    Adaptive,
}

/// Everything the engine needs for one playback attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPipeline {
    pub url: Url,
    pub transport: TransportScheme,
    pub mime_type: Option<MimeType>,
    pub data_source: DataSourceRecipe,
    pub media_source: MediaSourceRecipe,
    pub drm: Option<DrmSessionRecipe>,
}

/// Inputs to [`SourceFactorySelector::build`]
#[derive(Debug, Clone, Copy)]
pub struct PipelineRequest<'a> {
    pub url: &'a str,
    pub hypothesis: &'a FormatHypothesis,
    pub user_agent: Option<&'a str>,
    pub drm: Option<&'a DrmDescriptor>,
    pub preferences: &'a PreferenceSnapshot,
}

type MediaSourceStrategy = fn() -> MediaSourceRecipe;

fn progressive() -> MediaSourceRecipe {
    MediaSourceRecipe::Progressive
}

fn hls() -> MediaSourceRecipe {
    MediaSourceRecipe::Hls {
        allow_chunkless_preparation: false,
    }
}

fn rtsp() -> MediaSourceRecipe {
    MediaSourceRecipe::Rtsp {
        force_tcp: true,
        trust_all_certificates: true,
    }
}

fn adaptive() -> MediaSourceRecipe {
    MediaSourceRecipe::Adaptive
}

/// Media source family per MIME type; anything absent uses [`adaptive`]
const MEDIA_SOURCE_STRATEGIES: &[(MimeType, MediaSourceStrategy)] = &[
    (MimeType::SmoothStreaming, progressive),
    (MimeType::Progressive, progressive),
    (MimeType::Hls, hls),
    (MimeType::Rtsp, rtsp),
];

/// Media source family for a hypothesis
pub fn media_source_for(mime_type: Option<MimeType>) -> MediaSourceRecipe {
    mime_type
        .and_then(|mime| {
            MEDIA_SOURCE_STRATEGIES
                .iter()
                .find(|(m, _)| *m == mime)
                .map(|(_, strategy)| strategy())
        })
        .unwrap_or_else(adaptive)
}

/// Builds pipelines for the session
#[derive(Clone)]
pub struct SourceFactorySelector {
    drm_support: Arc<dyn DrmSupport>,
}

impl SourceFactorySelector {
    pub fn new(drm_support: Arc<dyn DrmSupport>) -> Self {
        Self { drm_support }
    }

    /// Build the pipeline for one attempt.
    ///
    /// Fails on an exhausted hypothesis, an unparsable locator or invalid
    /// DRM key material. An unsupported DRM scheme is not an error.
    pub fn build(&self, request: PipelineRequest<'_>) -> Result<PlaybackPipeline> {
        if matches!(request.hypothesis, FormatHypothesis::Exhausted) {
            return Err(Error::precondition(
                "cannot build a pipeline for an exhausted format search",
            ));
        }

        let url = Url::parse(request.url.trim()).map_err(|source| Error::InvalidUrl {
            url: request.url.to_string(),
            source,
        })?;
        let transport = TransportScheme::from_scheme(url.scheme());
        let mime_type = request.hypothesis.mime_type();

        let (data_source, media_source) = match transport {
            TransportScheme::Rtmp => (DataSourceRecipe::Rtmp, MediaSourceRecipe::Progressive),
            _ => {
                let http = HttpDataSource {
                    user_agent: request.user_agent.map(str::to_string),
                    connect_timeout_ms: request.preferences.connect_timeout_ms,
                    allow_cross_protocol_redirects: true,
                };
                let cache = request.preferences.cache_enabled.then_some(CacheDecorator {
                    ignore_cache_on_error: true,
                });
                (
                    DataSourceRecipe::Http { http, cache },
                    media_source_for(mime_type),
                )
            }
        };

        let drm = drm::session_recipe(request.drm, self.drm_support.as_ref())?;

        debug!(
            url = %url,
            transport = %transport,
            mime_type = ?mime_type,
            media_source = ?media_source,
            drm = ?drm.as_ref().map(|d| d.scheme),
            "Pipeline built"
        );

        Ok(PlaybackPipeline {
            url,
            transport,
            mime_type,
            data_source,
            media_source,
            drm,
        })
    }
}

impl Default for SourceFactorySelector {
    fn default() -> Self {
        Self::new(Arc::new(drm::DeviceDrm::all()))
    }
}
