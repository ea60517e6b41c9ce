//! Shared, read-only delivery context.

use std::path::PathBuf;

use mediaforge_av::{
    locate_ffmpeg, ArgBuilder, FfmpegInvocation, FormatPresets, QuirkTable, SpawnOptions,
    TranscodeProcess, FFMPEG,
};

use super::StreamError;
use crate::config::{Config, StreamConfig};

/// Everything strategies share: the HTTP client, quirk tables and settings.
#[derive(Debug, Clone)]
pub struct Engine {
    client: reqwest::Client,
    quirks: QuirkTable,
    presets: FormatPresets,
    settings: StreamConfig,
    ffmpeg: PathBuf,
    spawn_options: SpawnOptions,
}

impl Engine {
    /// Build the engine from configuration.
    ///
    /// Config quirks and presets are layered over the built-in ones. A
    /// missing ffmpeg is not an error here: passthrough works without it and
    /// transcoding strategies fail at spawn time.
    pub fn new(config: &Config) -> Result<Self, StreamError> {
        let settings = config.stream.clone();
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()?;

        let ffmpeg = match locate_ffmpeg(config.tools.ffmpeg_path.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("{}; transcoding streams will fail", e);
                config
                    .tools
                    .ffmpeg_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(FFMPEG))
            }
        };

        let env = SpawnOptions::from_env();
        let spawn_options = SpawnOptions::default()
            .with_grace_period(settings.kill_grace())
            .with_priority(settings.processing_priority.or(env.priority));

        Ok(Self {
            client,
            quirks: config.quirk_table(),
            presets: config.format_presets(),
            settings,
            ffmpeg,
            spawn_options,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn quirks(&self) -> &QuirkTable {
        &self.quirks
    }

    pub fn settings(&self) -> &StreamConfig {
        &self.settings
    }

    pub fn ffmpeg_path(&self) -> &std::path::Path {
        &self.ffmpeg
    }

    /// Argument builder over this engine's tables.
    pub fn args(&self) -> ArgBuilder<'_> {
        ArgBuilder::new(&self.quirks, &self.presets, &self.settings.user_agent)
    }

    /// Start ffmpeg for an invocation.
    pub fn spawn(&self, invocation: &FfmpegInvocation) -> Result<TranscodeProcess, StreamError> {
        tracing::debug!(
            ffmpeg = %self.ffmpeg.display(),
            args = ?invocation.args,
            "Spawning transcoder"
        );
        let process = TranscodeProcess::spawn(
            &self.ffmpeg,
            &invocation.args,
            &invocation.channels,
            &self.spawn_options,
        )?;
        Ok(process)
    }
}
