//! Locating the programs the delivery engine runs.
//!
//! Transcoding strategies need ffmpeg; a configured processing priority
//! also needs `nice` on Unix. Passthrough needs neither, so a missing tool
//! is reported rather than treated as fatal.
//!
//! ```no_run
//! use std::path::Path;
//! use mediaforge_av::tools::{check_tools, locate_ffmpeg};
//!
//! let ffmpeg = locate_ffmpeg(Some(Path::new("/opt/ffmpeg/bin/ffmpeg")))?;
//! println!("using {}", ffmpeg.display());
//!
//! for tool in check_tools(None) {
//!     println!("{}: {:?}", tool.name, tool.version);
//! }
//! # Ok::<(), mediaforge_av::Error>(())
//! ```

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Program name of the transcoder.
pub const FFMPEG: &str = "ffmpeg";

/// Program name of the priority wrapper.
#[cfg(unix)]
pub const NICE: &str = "nice";

/// What [`check_tools`] found for one program.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line the program printed for its version flag.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolve a program, using `configured` when it names an existing file
/// and falling back to a `PATH` lookup.
pub fn get_tool_path(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured.filter(|p| p.is_file()) {
        return Ok(path.to_path_buf());
    }
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve ffmpeg. See [`get_tool_path`].
pub fn locate_ffmpeg(configured: Option<&Path>) -> Result<PathBuf> {
    get_tool_path(FFMPEG, configured)
}

/// Report ffmpeg (honouring `configured_ffmpeg`) and, on Unix, `nice`.
pub fn check_tools(configured_ffmpeg: Option<&Path>) -> Vec<ToolInfo> {
    let mut tools = vec![probe(FFMPEG, locate_ffmpeg(configured_ffmpeg).ok(), "-version")];
    #[cfg(unix)]
    tools.push(probe(NICE, get_tool_path(NICE, None).ok(), "--version"));
    tools
}

/// Run `path version_arg`. A resolved program that rejects the flag still
/// counts as available, just without a version.
fn probe(name: &str, path: Option<PathBuf>, version_arg: &str) -> ToolInfo {
    let Some(path) = path else {
        return ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        };
    };

    let version = match Command::new(&path).arg(version_arg).output() {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty()),
        Ok(_) => None,
        Err(_) => {
            return ToolInfo {
                name: name.to_string(),
                available: false,
                version: None,
                path: Some(path),
            }
        }
    };

    ToolInfo {
        name: name.to_string(),
        available: true,
        version,
        path: Some(path),
    }
}
