//! Stream descriptor and strategy types.
//!
//! A [`StreamDescriptor`] is produced by an extractor (outside this
//! workspace) and consumed, unchanged, by the delivery engine. Field names are
//! serialized in camelCase to match the JSON extractors emit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Audio format used when a descriptor asks for audio without naming one.
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Where the media lives: one playback URL, or several.
///
/// Only the live-remux strategy accepts more than one URL, and then exactly
/// two: the primary (handed to ffmpeg) and the secondary (fetched by the
/// engine and piped into ffmpeg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamUrls {
    /// A single playback URL.
    Single(String),
    /// An ordered list of URLs.
    Multiple(Vec<String>),
}

impl StreamUrls {
    /// Number of URLs carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(urls) => urls.len(),
        }
    }

    /// Whether no URL is carried at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The URL, if exactly one is carried.
    pub fn single(&self) -> Option<&str> {
        match self {
            Self::Single(url) => Some(url),
            Self::Multiple(urls) if urls.len() == 1 => Some(&urls[0]),
            Self::Multiple(_) => None,
        }
    }

    /// The `(primary, secondary)` pair, if exactly two URLs are carried.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match self {
            Self::Multiple(urls) if urls.len() == 2 => Some((&urls[0], &urls[1])),
            _ => None,
        }
    }
}

impl From<&str> for StreamUrls {
    fn from(url: &str) -> Self {
        Self::Single(url.to_string())
    }
}

impl From<String> for StreamUrls {
    fn from(url: String) -> Self {
        Self::Single(url)
    }
}

impl From<Vec<String>> for StreamUrls {
    fn from(urls: Vec<String>) -> Self {
        Self::Multiple(urls)
    }
}

/// How the extractor asked for the media to be packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Forward the origin response unchanged.
    #[default]
    Proxy,
    /// Mux a video URL and a separate audio URL into one file.
    Render,
    /// Stream-copy a single input into a new container.
    Remux,
    /// Stream-copy a single input, dropping its audio.
    Mute,
    /// Extract (and optionally re-encode) the audio track.
    Audio,
    /// Convert a short clip into an animated GIF.
    Gif,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy => write!(f, "proxy"),
            Self::Render => write!(f, "render"),
            Self::Remux => write!(f, "remux"),
            Self::Mute => write!(f, "mute"),
            Self::Audio => write!(f, "audio"),
            Self::Gif => write!(f, "gif"),
        }
    }
}

/// Delivery strategy selected for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Direct passthrough of the origin body.
    Passthrough,
    /// Two-source live remux.
    LiveRemux,
    /// Audio-only transcode or copy.
    AudioOnly,
    /// Video stream-copy remux.
    VideoOnly,
    /// Animated GIF conversion.
    Gif,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::LiveRemux => write!(f, "live-remux"),
            Self::AudioOnly => write!(f, "audio-only"),
            Self::VideoOnly => write!(f, "video-only"),
            Self::Gif => write!(f, "gif"),
        }
    }
}

/// Normalized description of what to fetch and how to package it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    /// Playback URL(s).
    pub urls: StreamUrls,
    /// Base output filename.
    pub filename: String,
    /// Platform identifier, only ever used as a quirk table key.
    #[serde(default)]
    pub service: String,
    /// Requested packaging.
    #[serde(default)]
    pub kind: StreamKind,
    /// Deliver only the audio track.
    #[serde(default)]
    pub is_audio_only: bool,
    /// Target audio format (`mp3`, `m4a`, `opus`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    /// Drop the audio track when remuxing.
    #[serde(default)]
    pub mute: bool,
    /// Stream-copy instead of re-encoding.
    #[serde(default)]
    pub copy: bool,
    /// Container metadata tags, forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl StreamDescriptor {
    /// Create a passthrough descriptor for a single URL.
    pub fn new(urls: impl Into<StreamUrls>, filename: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            filename: filename.into(),
            service: String::new(),
            kind: StreamKind::default(),
            is_audio_only: false,
            audio_format: None,
            mute: false,
            copy: false,
            metadata: None,
        }
    }

    /// Set the source platform.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Set the requested packaging.
    pub fn with_kind(mut self, kind: StreamKind) -> Self {
        self.kind = kind;
        self
    }

    /// Request audio-only delivery in the given format.
    pub fn with_audio(mut self, format: impl Into<String>, copy: bool) -> Self {
        self.is_audio_only = true;
        self.audio_format = Some(format.into());
        self.copy = copy;
        self
    }

    /// Drop the audio track.
    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    /// Add a metadata tag.
    pub fn with_tag(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(tag.into(), value.into());
        self
    }

    /// The audio format, falling back to [`DEFAULT_AUDIO_FORMAT`].
    pub fn audio_format(&self) -> &str {
        self.audio_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_AUDIO_FORMAT)
    }

    /// Whether the output should carry no audio: `mute` is set or the
    /// descriptor asks for the `mute` kind.
    pub fn drops_audio(&self) -> bool {
        self.mute || self.kind == StreamKind::Mute
    }

    /// The single playback URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless exactly one URL is carried.
    pub fn single_url(&self) -> Result<&str> {
        self.urls.single().ok_or_else(|| {
            Error::invalid_input(format!("expected 1 url, got {}", self.urls.len()))
        })
    }

    /// The `(primary, secondary)` URL pair used by live remux.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless exactly two URLs are carried.
    pub fn url_pair(&self) -> Result<(&str, &str)> {
        self.urls.pair().ok_or_else(|| {
            Error::invalid_input(format!("expected 2 urls, got {}", self.urls.len()))
        })
    }

    /// Pick the delivery strategy for this descriptor.
    ///
    /// `proxy` always forwards the origin body, even for audio; any other
    /// kind with `is_audio_only` set extracts audio.
    pub fn strategy(&self) -> Strategy {
        match self.kind {
            StreamKind::Proxy => Strategy::Passthrough,
            _ if self.is_audio_only => Strategy::AudioOnly,
            StreamKind::Audio => Strategy::AudioOnly,
            StreamKind::Render => Strategy::LiveRemux,
            StreamKind::Remux | StreamKind::Mute => Strategy::VideoOnly,
            StreamKind::Gif => Strategy::Gif,
        }
    }

    /// Check the fields every strategy relies on.
    ///
    /// URL counts are checked by the strategies themselves, since the valid
    /// count depends on the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty filename or an empty URL.
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::invalid_input("filename is empty"));
        }
        let empty_url = match &self.urls {
            StreamUrls::Single(url) => url.is_empty(),
            StreamUrls::Multiple(urls) => urls.is_empty() || urls.iter().any(String::is_empty),
        };
        if empty_url {
            return Err(Error::invalid_input("url is empty"));
        }
        Ok(())
    }
}
