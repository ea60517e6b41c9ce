//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] whose ffmpeg
//! is a small shell script in a temp directory. The script records its
//! arguments and talks to the engine over the same extra channels real
//! ffmpeg would use, so delivery can be exercised end to end.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediaforge::config::Config;
use mediaforge::server::{create_router, AppContext};
use tempfile::TempDir;

/// How the fake ffmpeg behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFfmpeg {
    /// Copy the input channel to the output channel when there is one,
    /// otherwise write [`TRANSCODED`] to the output channel. Exits 0.
    Echo,
    /// Write a partial chunk, keep the output channel open and exit 1.
    Fail,
    /// Write chunks until terminated, recording the SIGTERM.
    Endless,
}

/// Body written by [`FakeFfmpeg::Echo`] when it has no input channel.
pub const TRANSCODED: &str = "transcoded-output";

/// Test harness wrapping a fully-constructed [`AppContext`] and the temp
/// directory holding the fake ffmpeg.
pub struct TestHarness {
    pub ctx: AppContext,
    pub dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new(mode: FakeFfmpeg) -> Self {
        Self::with_config(Config::default(), mode)
    }

    /// Create a new harness with a custom configuration. The fake ffmpeg
    /// replaces any configured one.
    pub fn with_config(mut config: Config, mode: FakeFfmpeg) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ffmpeg = write_fake_ffmpeg(dir.path(), mode);
        config.tools.ffmpeg_path = Some(ffmpeg);

        let ctx = AppContext::new(config).expect("failed to build app context");
        Self { ctx, dir }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server(mode: FakeFfmpeg) -> (Self, SocketAddr) {
        Self::with_server_config(Config::default(), mode).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config, mode: FakeFfmpeg) -> (Self, SocketAddr) {
        let harness = Self::with_config(config, mode);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// File the fake ffmpeg writes its arguments to, one per line.
    pub fn args_file(&self) -> PathBuf {
        self.dir.path().join("args")
    }

    /// File the fake ffmpeg writes when it receives SIGTERM.
    pub fn term_file(&self) -> PathBuf {
        self.dir.path().join("term")
    }

    /// Whether ffmpeg was started at all.
    pub fn spawned(&self) -> bool {
        self.args_file().exists()
    }

    /// The arguments ffmpeg was started with.
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.args_file())
            .expect("ffmpeg was not started")
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }
}

/// Register `descriptor` and return the full stream URL.
pub async fn register(addr: SocketAddr, descriptor: serde_json::Value) -> String {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/stream"))
        .json(&descriptor)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "stream");
    format!("http://{addr}{}", json["url"].as_str().unwrap())
}

/// Poll until `path` exists or `timeout` elapses.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    path.exists()
}

fn write_fake_ffmpeg(dir: &Path, mode: FakeFfmpeg) -> PathBuf {
    let args = dir.join("args");
    let term = dir.join("term");

    let body = match mode {
        FakeFfmpeg::Echo => format!(
            r#"for arg in "$@"; do last="$arg"; done
case "$last" in
  pipe:4) cat <&3 >&4 ;;
  *) printf '%s' '{TRANSCODED}' >&3 ;;
esac
exit 0"#
        ),
        FakeFfmpeg::Fail => r#"printf 'partial' >&3
sleep 5 >&3 &
exit 1"#
            .to_string(),
        FakeFfmpeg::Endless => format!(
            r#"trap '' PIPE
trap 'echo term > "{}"; exit 0' TERM
while :; do
  printf 'chunk-of-media-data' >&3 2>/dev/null
  sleep 0.05
done"#,
            term.display()
        ),
    };

    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"{}\"\n{}\n",
        args.display(),
        body
    );

    let path = dir.join("ffmpeg");
    std::fs::write(&path, script).expect("failed to write fake ffmpeg");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to make fake ffmpeg executable");
    path
}
