//! ffmpeg argument building.
//!
//! One method per transcoding strategy. Each produces the full argument list
//! (without the program name), the resolved output format, the final output
//! filename and the extra channels the invocation reads from or writes to.
//! Building never fails: unknown services and formats simply contribute no
//! quirk arguments.

use mediaforge_common::filename::{audio_filename, gif_filename, remux_target};
use mediaforge_common::{StreamDescriptor, Strategy};

use crate::process::{channel_url, ChannelRole};
use crate::quirks::{FormatPresets, QuirkTable, PRESET_AUDIO, PRESET_COPY, PRESET_GIF};

/// A fully resolved ffmpeg command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegInvocation {
    /// Arguments, in order, without the program name.
    pub args: Vec<String>,
    /// Output format token (`mp4`, `mp3`, `gif`, ...).
    pub format: String,
    /// Filename the client should save the output as.
    pub filename: String,
    /// Extra channels, in descriptor order starting at fd 3.
    pub channels: Vec<ChannelRole>,
}

/// Builds ffmpeg invocations from descriptors.
#[derive(Debug, Clone, Copy)]
pub struct ArgBuilder<'a> {
    quirks: &'a QuirkTable,
    presets: &'a FormatPresets,
    user_agent: &'a str,
}

impl<'a> ArgBuilder<'a> {
    /// Create a builder over a quirk table and preset set.
    ///
    /// `user_agent` is the engine's own HTTP identity; ffmpeg presents the
    /// same one when it fetches inputs itself.
    pub fn new(quirks: &'a QuirkTable, presets: &'a FormatPresets, user_agent: &'a str) -> Self {
        Self {
            quirks,
            presets,
            user_agent,
        }
    }

    /// Build the invocation for a strategy, taking URLs from the descriptor.
    ///
    /// Returns `None` for passthrough, which has no subprocess, and when the
    /// descriptor carries the wrong number of URLs for the strategy.
    pub fn for_strategy(
        &self,
        descriptor: &StreamDescriptor,
        strategy: Strategy,
    ) -> Option<FfmpegInvocation> {
        match strategy {
            Strategy::Passthrough => None,
            Strategy::LiveRemux => {
                let (primary, _) = descriptor.urls.pair()?;
                Some(self.live_remux(descriptor, primary))
            }
            Strategy::AudioOnly => Some(self.audio_only(descriptor, descriptor.urls.single()?)),
            Strategy::VideoOnly => Some(self.video_only(descriptor, descriptor.urls.single()?)),
            Strategy::Gif => Some(self.gif(descriptor, descriptor.urls.single()?)),
        }
    }

    /// Mux `primary` (read by ffmpeg) with the secondary source arriving on
    /// the first extra channel. Output goes to the second extra channel.
    pub fn live_remux(&self, descriptor: &StreamDescriptor, primary: &str) -> FfmpegInvocation {
        let channels = vec![ChannelRole::ExtraInput, ChannelRole::ExtraOutput];
        let (format, filename) = remux_target(&descriptor.filename);

        let mut args = self.preamble(&descriptor.service);
        push(&mut args, &["-i", primary, "-i", &channel_url(0)]);
        push(
            &mut args,
            &["-map", "0:v", "-map", "1:a", "-c:v", "copy", "-c:a", "copy"],
        );
        self.push_bitstream_filter(&mut args, &descriptor.service);
        self.push_container(&mut args, &format);
        self.push_output(&mut args, descriptor, self.quirks.muxer(&format), 1);

        FfmpegInvocation {
            args,
            format,
            filename,
            channels,
        }
    }

    /// Stream-copy a single input into the container named by the filename.
    pub fn video_only(&self, descriptor: &StreamDescriptor, url: &str) -> FfmpegInvocation {
        let (format, filename) = remux_target(&descriptor.filename);

        let mut args = self.preamble(&descriptor.service);
        push(&mut args, &["-i", url, "-c", "copy"]);
        if descriptor.drops_audio() {
            args.push("-an".to_string());
        } else {
            self.push_bitstream_filter(&mut args, &descriptor.service);
        }
        self.push_container(&mut args, &format);
        self.push_output(&mut args, descriptor, self.quirks.muxer(&format), 0);

        FfmpegInvocation {
            args,
            format,
            filename,
            channels: vec![ChannelRole::ExtraOutput],
        }
    }

    /// Extract the audio track, copying or re-encoding it to the requested
    /// format.
    pub fn audio_only(&self, descriptor: &StreamDescriptor, url: &str) -> FfmpegInvocation {
        let format = descriptor.audio_format().to_string();
        let filename = audio_filename(&descriptor.filename, &format);

        let mut args = self.preamble(&descriptor.service);
        push(&mut args, &["-i", url, "-vn"]);
        if descriptor.copy {
            args.extend_from_slice(self.presets.get(PRESET_COPY));
        } else {
            args.extend_from_slice(self.presets.get(PRESET_AUDIO));
            args.extend_from_slice(self.presets.get(&format));
        }
        self.push_container(&mut args, &format);
        self.push_output(&mut args, descriptor, self.quirks.muxer(&format), 0);

        FfmpegInvocation {
            args,
            format,
            filename,
            channels: vec![ChannelRole::ExtraOutput],
        }
    }

    /// Re-encode a clip into an animated GIF. `copy` is ignored.
    pub fn gif(&self, descriptor: &StreamDescriptor, url: &str) -> FfmpegInvocation {
        let format = "gif".to_string();
        let filename = gif_filename(&descriptor.filename);

        let mut args = self.preamble(&descriptor.service);
        push(&mut args, &["-i", url]);
        args.extend_from_slice(self.presets.get(PRESET_GIF));
        self.push_output(&mut args, descriptor, &format, 0);

        FfmpegInvocation {
            args,
            format,
            filename,
            channels: vec![ChannelRole::ExtraOutput],
        }
    }

    /// Log level, user agent and the service's input options.
    fn preamble(&self, service: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(32);
        push(&mut args, &["-loglevel", "-8", "-user_agent", self.user_agent]);

        if let Some(quirks) = self.quirks.service(service) {
            if quirks.non_seekable {
                push(&mut args, &["-seekable", "0"]);
            }
            if let Some(referer) = &quirks.referer {
                args.push("-headers".to_string());
                args.push(format!("Referer: {referer}\r\n"));
            }
            args.extend(quirks.input_args.iter().cloned());
        }
        args
    }

    fn push_bitstream_filter(&self, args: &mut Vec<String>, service: &str) {
        if let Some(bsf) = self
            .quirks
            .service(service)
            .and_then(|q| q.audio_bitstream_filter.as_deref())
        {
            push(args, &["-bsf:a", bsf]);
        }
    }

    fn push_container(&self, args: &mut Vec<String>, format: &str) {
        if let Some(container) = self.quirks.container(format) {
            args.extend(container.args.iter().cloned());
        }
    }

    /// Metadata tags, then `-f <muxer> pipe:<fd>`.
    fn push_output(
        &self,
        args: &mut Vec<String>,
        descriptor: &StreamDescriptor,
        muxer: &str,
        channel: usize,
    ) {
        if let Some(tags) = &descriptor.metadata {
            for (tag, value) in tags {
                args.push("-metadata".to_string());
                args.push(format!("{tag}={value}"));
            }
        }
        push(args, &["-f", muxer, &channel_url(channel)]);
    }
}

fn push(args: &mut Vec<String>, values: &[&str]) {
    args.extend(values.iter().map(|s| s.to_string()));
}
