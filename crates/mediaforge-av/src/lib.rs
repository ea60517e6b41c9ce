//! # mediaforge-av
//!
//! ffmpeg plumbing for the mediaforge delivery engine.
//!
//! This crate provides functionality for:
//! - Locating ffmpeg and reporting the tools the engine runs
//! - Per-platform and per-container quirks as data ([`QuirkTable`])
//! - Building deterministic ffmpeg argument lists per delivery strategy
//! - Spawning and supervising ffmpeg with extra pipe channels on
//!   descriptors 3, 4, ... and graceful-then-forced termination
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```
//! use mediaforge_av::{ArgBuilder, FormatPresets, QuirkTable};
//! use mediaforge_common::StreamDescriptor;
//!
//! let quirks = QuirkTable::builtin();
//! let presets = FormatPresets::builtin();
//! let builder = ArgBuilder::new(&quirks, &presets, "mediaforge");
//!
//! let descriptor = StreamDescriptor::new("https://cdn.example/a.webm", "song")
//!     .with_audio("mp3", false);
//! let invocation = builder.audio_only(&descriptor, "https://cdn.example/a.webm");
//! assert_eq!(invocation.filename, "song.mp3");
//! assert_eq!(invocation.args.last().map(String::as_str), Some("pipe:3"));
//! ```

pub mod args;
mod error;
pub mod process;
pub mod quirks;
pub mod tools;

// Re-exports
pub use args::{ArgBuilder, FfmpegInvocation};
pub use error::{Error, Result};
pub use process::{
    channel_url, ChannelRole, ExitReason, ProcessExit, SpawnOptions, TranscodeProcess,
    DEFAULT_GRACE_PERIOD,
};
pub use quirks::{ContainerQuirks, FormatPresets, QuirkTable, ServiceQuirks};
pub use tools::{check_tools, get_tool_path, locate_ffmpeg, ToolInfo, FFMPEG};
