//! CLI command implementations

use crate::output::{format_rows, OutputFormat};
use crate::scripted::{Script, ScriptedFactory};
use console::style;
use m3u_core::drm::LicenseCallback;
use m3u_core::pipeline::DataSourceRecipe;
use m3u_core::{
    DrmDescriptor, Entity, FormatHypothesis, FormatResolutionIterator, MemoryCatalog, MemoryStore,
    Parent, ParentSource, PipelineRequest, PlaybackCommand, PlaybackPipeline, PlaybackSession,
    PlaybackState, PreferenceSnapshot, Preferences, SessionConfig, SessionDeps,
    SourceFactorySelector,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

/// Simulation stops after this long without an observable change
const QUIET_PERIOD: Duration = Duration::from_millis(250);

const SCRIPT_PLAYLIST: &str = "script://playlist";
const SCRIPT_ENTITY: i64 = 1;

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    Ok(match path {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    })
}

#[derive(Debug, Serialize, Tabled)]
struct ProbeRow {
    attempt: usize,
    hypothesis: String,
    transport: String,
    data_source: String,
    media_source: String,
    drm: String,
}

impl ProbeRow {
    fn new(attempt: usize, hypothesis: &FormatHypothesis, pipeline: &PlaybackPipeline) -> Self {
        let data_source = match &pipeline.data_source {
            DataSourceRecipe::Rtmp => "rtmp".to_string(),
            DataSourceRecipe::Http { http, cache } => format!(
                "http timeout={}ms{}",
                http.connect_timeout_ms,
                if cache.is_some() { " +cache" } else { "" }
            ),
        };
        let drm = pipeline
            .drm
            .as_ref()
            .map(|d| match &d.callback {
                LicenseCallback::Local { .. } => format!("{} (local)", d.scheme),
                LicenseCallback::Http { license_url, .. } => format!("{} ({})", d.scheme, license_url),
            })
            .unwrap_or_else(|| "-".to_string());

        Self {
            attempt,
            hypothesis: hypothesis.to_string(),
            transport: pipeline.transport.to_string(),
            data_source,
            media_source: format!("{:?}", pipeline.media_source),
            drm,
        }
    }
}

/// Print the hypothesis order for a url and the pipeline each attempt builds
pub fn probe(
    url: &str,
    drm: Option<&str>,
    key: Option<&str>,
    config: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let iterator =
        FormatResolutionIterator::for_url(url, &config.format_priority, config.pre_guess);
    let descriptor = drm.map(|scheme| DrmDescriptor::new(scheme, key.unwrap_or_default()));
    let preferences = PreferenceSnapshot::default();
    let selector = SourceFactorySelector::default();

    let mut rows = Vec::new();
    let mut current = FormatHypothesis::Unspecified(url.to_string());
    while iterator.has_next(&current) {
        current = iterator.next(&current)?;
        if matches!(current, FormatHypothesis::Exhausted) {
            break;
        }
        let pipeline = selector.build(PipelineRequest {
            url,
            hypothesis: &current,
            user_agent: config.default_user_agent.as_deref(),
            drm: descriptor.as_ref(),
            preferences: &preferences,
        })?;
        rows.push(ProbeRow::new(rows.len() + 1, &current, &pipeline));
    }

    println!("{}", format_rows(&rows, format));
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct TimelineRow {
    step: usize,
    observable: &'static str,
    value: String,
}

#[derive(Default)]
struct Timeline {
    rows: Vec<TimelineRow>,
}

impl Timeline {
    fn push(&mut self, observable: &'static str, value: String) {
        self.rows.push(TimelineRow {
            step: self.rows.len() + 1,
            observable,
            value,
        });
    }
}

/// Play a scripted stream through a real session and print every observable change
pub async fn simulate(
    script_path: &Path,
    config: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let script: Script = serde_json::from_str(&std::fs::read_to_string(script_path)?)?;

    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert_parent(Parent {
            url: SCRIPT_PLAYLIST.to_string(),
            title: "script".to_string(),
            user_agent: script.user_agent.clone(),
            source: ParentSource::M3u,
        })
        .await;
    catalog
        .insert_entity(Entity {
            id: SCRIPT_ENTITY,
            url: script.url.clone(),
            title: script_path.display().to_string(),
            parent_url: SCRIPT_PLAYLIST.to_string(),
            drm: script.drm.clone(),
        })
        .await;

    let deps = SessionDeps::new(
        catalog.clone(),
        catalog,
        Arc::new(Preferences::new(script.preferences.clone())),
        Arc::new(ScriptedFactory::new(script.outcomes.clone())),
    )
    .with_store(Arc::new(MemoryStore::new()));
    let session = PlaybackSession::spawn(config, deps)?;

    let mut state = session.playback_state();
    let mut hypothesis = session.hypothesis();
    let mut last_error = session.last_error();
    let mut video_size = session.video_size();
    let mut is_playing = session.is_playing();

    session.play(PlaybackCommand::entity(SCRIPT_ENTITY)).await?;

    let mut timeline = Timeline::default();
    loop {
        tokio::select! {
            Ok(()) = hypothesis.changed() => {
                let value = hypothesis
                    .borrow_and_update()
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                timeline.push("hypothesis", value);
            }
            Ok(()) = state.changed() => {
                let value = state.borrow_and_update().to_string();
                timeline.push("state", value);
            }
            Ok(()) = last_error.changed() => {
                let value = last_error
                    .borrow_and_update()
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                timeline.push("last_error", value);
            }
            Ok(()) = video_size.changed() => {
                let size = *video_size.borrow_and_update();
                timeline.push("video_size", format!("{}x{}", size.width, size.height));
            }
            Ok(()) = is_playing.changed() => {
                let value = is_playing.borrow_and_update().to_string();
                timeline.push("is_playing", value);
            }
            _ = tokio::time::sleep(QUIET_PERIOD) => break,
        }
    }

    let final_state = *state.borrow();
    session.shutdown().await?;

    println!("{}", format_rows(&timeline.rows, format));
    if !matches!(OutputFormat::from(format), OutputFormat::Json) {
        let styled = match final_state {
            PlaybackState::Ready | PlaybackState::Ended => style(final_state).green(),
            PlaybackState::Failed => style(final_state).red(),
            _ => style(final_state).yellow(),
        };
        println!("\nFinal state: {}", styled);
    }

    Ok(())
}
