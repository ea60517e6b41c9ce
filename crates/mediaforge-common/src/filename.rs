//! Output filename utilities.
//!
//! Every strategy names its output differently: passthrough keeps the name,
//! audio appends the audio format, GIF forces `.gif`, and the remuxing
//! strategies read the target container from the extension. These helpers
//! keep those rules in one place, together with the `Content-Disposition`
//! encoding every response uses.

/// Container used when a remux target has no extension.
pub const DEFAULT_VIDEO_FORMAT: &str = "mp4";

/// Extension of a filename (text after the last dot), if any.
///
/// # Examples
///
/// ```
/// use mediaforge_common::filename::extension;
///
/// assert_eq!(extension("clip.mp4"), Some("mp4"));
/// assert_eq!(extension("a.b.webm"), Some("webm"));
/// assert_eq!(extension("clip"), None);
/// assert_eq!(extension("clip."), None);
/// ```
pub fn extension(filename: &str) -> Option<&str> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

/// Resolve the remux output format and the final filename.
///
/// The format is the lowercased extension; a filename without one gets
/// [`DEFAULT_VIDEO_FORMAT`] appended.
///
/// # Examples
///
/// ```
/// use mediaforge_common::filename::remux_target;
///
/// assert_eq!(remux_target("clip"), ("mp4".to_string(), "clip.mp4".to_string()));
/// assert_eq!(remux_target("clip.WEBM"), ("webm".to_string(), "clip.WEBM".to_string()));
/// ```
pub fn remux_target(filename: &str) -> (String, String) {
    match extension(filename) {
        Some(ext) => (ext.to_lowercase(), filename.to_string()),
        None => (
            DEFAULT_VIDEO_FORMAT.to_string(),
            format!("{filename}.{DEFAULT_VIDEO_FORMAT}"),
        ),
    }
}

/// Filename for audio output: the base name plus the audio format.
pub fn audio_filename(filename: &str, audio_format: &str) -> String {
    format!("{filename}.{audio_format}")
}

/// Filename for GIF output: everything before the first dot, plus `.gif`.
pub fn gif_filename(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    format!("{stem}.gif")
}

/// Build an `attachment` `Content-Disposition` value.
///
/// Plain printable ASCII names are sent as a quoted `filename`. Anything else
/// also gets an RFC 5987 `filename*` parameter, with the quoted fallback
/// having each offending character replaced by `?`.
///
/// # Examples
///
/// ```
/// use mediaforge_common::filename::content_disposition;
///
/// assert_eq!(
///     content_disposition("a \"b\".mp4"),
///     "attachment; filename=\"a \\\"b\\\".mp4\""
/// );
/// assert_eq!(
///     content_disposition("видео.mp4"),
///     "attachment; filename=\"?????.mp4\"; filename*=UTF-8''%D0%B2%D0%B8%D0%B4%D0%B5%D0%BE.mp4"
/// );
/// ```
pub fn content_disposition(filename: &str) -> String {
    let plain = filename.chars().all(|c| c.is_ascii() && !c.is_ascii_control());
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    let quoted = quote(&fallback);

    if plain {
        format!("attachment; filename=\"{quoted}\"")
    } else {
        format!(
            "attachment; filename=\"{quoted}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// MIME type for a muxer output format.
pub fn content_type(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
