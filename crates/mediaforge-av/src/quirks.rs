//! Per-platform and per-container quirk tables.
//!
//! Everything the argument builder does differently for a given platform or
//! output container lives here as data. Adding a platform quirk means adding
//! an entry (in code or in the `[quirks]` section of the config file), never a
//! new branch in the builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Preset applied to audio re-encodes before the format-specific preset.
pub const PRESET_AUDIO: &str = "audio";
/// Preset applied to audio when the descriptor asks for a stream copy.
pub const PRESET_COPY: &str = "copy";
/// Preset applied to every GIF conversion.
pub const PRESET_GIF: &str = "gif";

/// Quirks of a source platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceQuirks {
    /// The origin mishandles range probing; treat the input as non-seekable.
    pub non_seekable: bool,
    /// Referer the origin insists on, sent by both the engine and ffmpeg.
    pub referer: Option<String>,
    /// Audio bitstream filter needed when the video track is stream-copied.
    pub audio_bitstream_filter: Option<String>,
    /// Extra input options placed before `-i`.
    pub input_args: Vec<String>,
}

/// Quirks of an output container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerQuirks {
    /// Muxer name to pass to `-f` when it differs from the format token.
    pub muxer: Option<String>,
    /// Output options for this container.
    pub args: Vec<String>,
}

/// Mapping from platform and output container to their quirks.
///
/// `QuirkTable::default()` is empty, which is what the config file starts
/// from; [`QuirkTable::builtin`] holds the shipped entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuirkTable {
    /// Keyed by service identifier.
    pub services: BTreeMap<String, ServiceQuirks>,
    /// Keyed by output format token.
    pub containers: BTreeMap<String, ContainerQuirks>,
}

impl QuirkTable {
    /// The quirks shipped with mediaforge.
    pub fn builtin() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "twitter".to_string(),
            ServiceQuirks {
                non_seekable: true,
                ..Default::default()
            },
        );
        services.insert(
            "bilibili".to_string(),
            ServiceQuirks {
                referer: Some("https://www.bilibili.com/".to_string()),
                ..Default::default()
            },
        );
        for service in ["vimeo", "rutube", "dailymotion"] {
            services.insert(
                service.to_string(),
                ServiceQuirks {
                    audio_bitstream_filter: Some("aac_adtstoasc".to_string()),
                    ..Default::default()
                },
            );
        }

        let mut containers = BTreeMap::new();
        containers.insert(
            "mp4".to_string(),
            ContainerQuirks {
                muxer: None,
                args: strings(&["-movflags", "faststart+frag_keyframe+empty_moov"]),
            },
        );
        // ffmpeg only knows the m4a layout under its historical muxer name.
        containers.insert(
            "m4a".to_string(),
            ContainerQuirks {
                muxer: Some("ipod".to_string()),
                args: strings(&["-movflags", "frag_keyframe+empty_moov"]),
            },
        );

        Self {
            services,
            containers,
        }
    }

    /// Overlay `overrides` on top of this table.
    ///
    /// Entries in `overrides` replace entries with the same key.
    pub fn merged(mut self, overrides: QuirkTable) -> Self {
        self.services.extend(overrides.services);
        self.containers.extend(overrides.containers);
        self
    }

    /// Quirks for a service, if it has any.
    pub fn service(&self, service: &str) -> Option<&ServiceQuirks> {
        self.services.get(service)
    }

    /// Quirks for an output container, if it has any.
    pub fn container(&self, format: &str) -> Option<&ContainerQuirks> {
        self.containers.get(format)
    }

    /// Referer header required by a service.
    pub fn referer(&self, service: &str) -> Option<&str> {
        self.service(service).and_then(|q| q.referer.as_deref())
    }

    /// Muxer name for an output format.
    pub fn muxer<'a>(&'a self, format: &'a str) -> &'a str {
        self.container(format)
            .and_then(|q| q.muxer.as_deref())
            .unwrap_or(format)
    }
}

/// Named argument presets: the generic audio/copy/GIF presets plus one
/// encoder preset per audio format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatPresets(BTreeMap<String, Vec<String>>);

impl FormatPresets {
    /// The presets shipped with mediaforge.
    pub fn builtin() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(
            PRESET_AUDIO.to_string(),
            strings(&["-ar", "48000", "-ac", "2", "-b:a", "320k"]),
        );
        presets.insert(PRESET_COPY.to_string(), strings(&["-c:a", "copy"]));
        presets.insert(
            PRESET_GIF.to_string(),
            strings(&[
                "-vf",
                "scale=-1:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
                "-loop",
                "0",
            ]),
        );
        presets.insert("mp3".to_string(), strings(&["-c:a", "libmp3lame"]));
        presets.insert("opus".to_string(), strings(&["-c:a", "libopus"]));
        presets.insert("ogg".to_string(), strings(&["-c:a", "libvorbis"]));
        presets.insert("wav".to_string(), strings(&["-c:a", "pcm_s16le"]));
        presets.insert("m4a".to_string(), strings(&["-c:a", "aac"]));
        Self(presets)
    }

    /// Overlay `overrides` on top of these presets.
    pub fn merged(mut self, overrides: FormatPresets) -> Self {
        self.0.extend(overrides.0);
        self
    }

    /// Arguments of a preset; unknown names yield nothing.
    pub fn get(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, name: impl Into<String>, args: Vec<String>) {
        self.0.insert(name.into(), args);
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
