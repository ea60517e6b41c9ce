//! Transcoder subprocess supervision.
//!
//! [`TranscodeProcess::spawn`] starts ffmpeg with one anonymous pipe per
//! extra channel, bound to descriptors 3, 4, ... in the child in the order
//! given. A supervisor task owns the child: it reports the exit to every
//! waiter and carries out termination requests. Termination sends SIGTERM,
//! waits out the grace period, then sends SIGKILL. The supervisor stops the
//! timer as soon as the child exits, so a reaped PID is never signalled.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use crate::{Error, Result};

/// Descriptor number of the first extra channel in the child.
pub const FIRST_EXTRA_FD: i32 = 3;

/// Most extra channels a single process can carry.
pub const MAX_EXTRA_CHANNELS: usize = 4;

/// Time between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Environment variable holding the processing priority (a `nice` value).
pub const PRIORITY_ENV: &str = "PROCESSING_PRIORITY";

/// Direction of an extra channel, seen from the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// The child reads from it; the engine writes.
    ExtraInput,
    /// The child writes to it; the engine reads.
    ExtraOutput,
}

/// ffmpeg URL of the extra channel at `index` (`pipe:3` for index 0).
pub fn channel_url(index: usize) -> String {
    format!("pipe:{}", FIRST_EXTRA_FD as usize + index)
}

/// Engine end of an input channel.
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Engine end of an output channel.
pub type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;

/// How to launch and stop the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Time between the graceful and the forced stop.
    pub grace_period: Duration,
    /// Scheduling priority passed to `nice`, Unix only.
    pub priority: Option<i32>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            priority: None,
        }
    }
}

impl SpawnOptions {
    /// Defaults, with the priority read from `PROCESSING_PRIORITY`.
    pub fn from_env() -> Self {
        let priority = std::env::var(PRIORITY_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok());
        Self {
            priority,
            ..Default::default()
        }
    }

    /// Set the grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the processing priority.
    pub fn with_priority(mut self, priority: Option<i32>) -> Self {
        self.priority = priority;
        self
    }
}

/// Full command line, including the `nice` wrapper when a priority is set.
pub fn command_argv(program: &Path, args: &[String], options: &SpawnOptions) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(args.len() + 4);
    if let (true, Some(priority)) = (cfg!(unix), options.priority) {
        argv.push(OsString::from("nice"));
        argv.push(OsString::from("-n"));
        argv.push(OsString::from(priority.to_string()));
    }
    argv.push(program.as_os_str().to_os_string());
    argv.extend(args.iter().map(OsString::from));
    argv
}

/// Why the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// It exited without being asked to.
    Exited,
    /// It stopped after SIGTERM.
    Terminated,
    /// It ignored SIGTERM for the whole grace period and was killed.
    Killed,
}

/// Exit event of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit status, when the child could be reaped.
    pub status: Option<ExitStatus>,
    /// What ended it.
    pub reason: ExitReason,
}

impl ProcessExit {
    /// Whether the process exited on its own with status 0.
    pub fn success(&self) -> bool {
        self.reason == ExitReason::Exited && self.status.is_some_and(|s| s.success())
    }
}

enum Channel {
    Input(ChannelWriter),
    Output(ChannelReader),
    Taken,
}

/// A running transcoder under supervision.
///
/// Dropping the handle terminates the process.
pub struct TranscodeProcess {
    pid: Option<u32>,
    channels: Mutex<Vec<Channel>>,
    terminate_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
}

impl std::fmt::Debug for TranscodeProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeProcess")
            .field("pid", &self.pid)
            .field("exit", &*self.exit_rx.borrow())
            .finish()
    }
}

impl TranscodeProcess {
    /// Spawn `program` with `args` and the given extra channels.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpawnFailed`] if the process cannot be started, and
    /// [`Error::Unsupported`] when extra channels are requested on a platform
    /// without descriptor passing or more than [`MAX_EXTRA_CHANNELS`] are
    /// requested.
    pub fn spawn(
        program: &Path,
        args: &[String],
        roles: &[ChannelRole],
        options: &SpawnOptions,
    ) -> Result<Self> {
        if roles.len() > MAX_EXTRA_CHANNELS {
            return Err(Error::Unsupported(format!(
                "{} extra channels requested, at most {MAX_EXTRA_CHANNELS} allowed",
                roles.len()
            )));
        }

        let argv = command_argv(program, args, options);
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let (channels, child_ends) = attach_channels(&mut command, roles)?;
        let tool = program.display().to_string();
        let child = command
            .spawn()
            .map_err(|e| Error::spawn_failed(&tool, e.to_string()))?;
        // Close the parent's copies so the engine sees EOF when the child
        // closes its side.
        drop(child_ends);

        let pid = child.id();

        #[cfg(feature = "tracing")]
        tracing::debug!(pid = ?pid, channels = roles.len(), "Spawned {}", tool);

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(child, terminate_rx, options.grace_period, exit_tx));

        Ok(Self {
            pid,
            channels: Mutex::new(channels),
            terminate_tx: Mutex::new(Some(terminate_tx)),
            exit_rx,
        })
    }

    /// OS process id at spawn time.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Take the engine end of the input channel at `index`.
    ///
    /// Returns `None` if the channel is not an input or was already taken.
    pub fn take_input(&self, index: usize) -> Option<ChannelWriter> {
        let mut channels = self.channels.lock().ok()?;
        let slot = channels.get_mut(index)?;
        match std::mem::replace(slot, Channel::Taken) {
            Channel::Input(writer) => Some(writer),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Take the engine end of the output channel at `index`.
    ///
    /// Returns `None` if the channel is not an output or was already taken.
    pub fn take_output(&self, index: usize) -> Option<ChannelReader> {
        let mut channels = self.channels.lock().ok()?;
        let slot = channels.get_mut(index)?;
        match std::mem::replace(slot, Channel::Taken) {
            Channel::Output(reader) => Some(reader),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Ask the process to stop.
    ///
    /// Sends SIGTERM and, if the process is still alive after the grace
    /// period, SIGKILL. Only the first call has any effect.
    pub fn terminate(&self) {
        let sender = match self.terminate_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            #[cfg(feature = "tracing")]
            tracing::debug!(pid = ?self.pid, "Terminating transcoder");
            let _ = sender.send(());
        }
    }

    /// Wait for the process to end. Any number of callers may wait.
    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            Err(_) => None,
        };
        exit.unwrap_or(ProcessExit {
            status: None,
            reason: ExitReason::Exited,
        })
    }

    /// The exit event, if the process has already ended.
    pub fn try_exit(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }
}

async fn supervise(
    mut child: Child,
    mut terminate_rx: oneshot::Receiver<()>,
    grace_period: Duration,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let exit = tokio::select! {
        status = child.wait() => ProcessExit {
            status: status.ok(),
            reason: ExitReason::Exited,
        },
        // A dropped handle counts as a termination request.
        _ = &mut terminate_rx => stop(&mut child, grace_period).await,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(status = ?exit.status, reason = ?exit.reason, "Transcoder ended");

    exit_tx.send_replace(Some(exit));
}

async fn stop(child: &mut Child, grace_period: Duration) -> ProcessExit {
    if let Ok(Some(status)) = child.try_wait() {
        return ProcessExit {
            status: Some(status),
            reason: ExitReason::Exited,
        };
    }

    send_terminate(child);

    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(status) => ProcessExit {
            status: status.ok(),
            reason: ExitReason::Terminated,
        },
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(pid = ?child.id(), "Transcoder ignored SIGTERM, killing");
            let _ = child.start_kill();
            ProcessExit {
                status: child.wait().await.ok(),
                reason: ExitReason::Killed,
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id()` is None once the child has been reaped.
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
type ChildEnd = std::os::fd::OwnedFd;

#[cfg(not(unix))]
type ChildEnd = ();

/// Create the pipes and arrange for the child ends to land on fd 3, 4, ...
///
/// Returns the engine ends and the child ends, which must stay open until
/// the command has been spawned.
#[cfg(unix)]
fn attach_channels(
    command: &mut Command,
    roles: &[ChannelRole],
) -> Result<(Vec<Channel>, Vec<ChildEnd>)> {
    use std::os::fd::{AsRawFd, OwnedFd, RawFd};
    use tokio::net::unix::pipe;

    let mut channels = Vec::with_capacity(roles.len());
    let mut child_ends: Vec<OwnedFd> = Vec::with_capacity(roles.len());

    for role in roles {
        let (read_end, write_end) = pipe_cloexec()?;
        match role {
            ChannelRole::ExtraInput => {
                let sender = pipe::Sender::from_owned_fd(write_end)?;
                channels.push(Channel::Input(Box::new(sender)));
                child_ends.push(read_end);
            }
            ChannelRole::ExtraOutput => {
                let receiver = pipe::Receiver::from_owned_fd(read_end)?;
                channels.push(Channel::Output(Box::new(receiver)));
                child_ends.push(write_end);
            }
        }
    }

    if child_ends.is_empty() {
        return Ok((channels, child_ends));
    }

    let count = child_ends.len();
    let mut sources: [RawFd; MAX_EXTRA_CHANNELS] = [-1; MAX_EXTRA_CHANNELS];
    for (slot, fd) in sources.iter_mut().zip(&child_ends) {
        *slot = fd.as_raw_fd();
    }

    // SAFETY: the closure only calls async-signal-safe fcntl/dup2 on
    // descriptors that stay open until after spawn, and does not allocate.
    unsafe {
        command.pre_exec(move || {
            use nix::fcntl::{fcntl, FcntlArg};
            use nix::unistd::dup2;

            // Move every source above the target range first so that no
            // dup2 below clobbers a source that has not been placed yet.
            let floor = FIRST_EXTRA_FD + count as RawFd;
            let mut moved: [RawFd; MAX_EXTRA_CHANNELS] = [-1; MAX_EXTRA_CHANNELS];
            for i in 0..count {
                moved[i] = fcntl(sources[i], FcntlArg::F_DUPFD_CLOEXEC(floor))?;
            }
            for i in 0..count {
                dup2(moved[i], FIRST_EXTRA_FD + i as RawFd)?;
            }
            Ok(())
        });
    }

    Ok((channels, child_ends))
}

#[cfg(not(unix))]
fn attach_channels(
    _command: &mut Command,
    roles: &[ChannelRole],
) -> Result<(Vec<Channel>, Vec<ChildEnd>)> {
    if roles.is_empty() {
        Ok((Vec::new(), Vec::new()))
    } else {
        Err(Error::Unsupported(
            "extra channels need Unix descriptor passing".to_string(),
        ))
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn pipe_cloexec() -> Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    use nix::fcntl::OFlag;
    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn pipe_cloexec() -> Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read_end, write_end) = nix::unistd::pipe()?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read_end, write_end))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    async fn read_exact_str(reader: &mut ChannelReader, len: usize) -> String {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_channel_url() {
        assert_eq!(channel_url(0), "pipe:3");
        assert_eq!(channel_url(1), "pipe:4");
    }

    #[test]
    fn test_command_argv_with_priority() {
        let args = vec!["-i".to_string(), "x".to_string()];
        let plain = command_argv(Path::new("ffmpeg"), &args, &SpawnOptions::default());
        assert_eq!(plain, ["ffmpeg", "-i", "x"]);

        let options = SpawnOptions::default().with_priority(Some(10));
        let niced = command_argv(Path::new("ffmpeg"), &args, &options);
        assert_eq!(niced, ["nice", "-n", "10", "ffmpeg", "-i", "x"]);
    }

    #[tokio::test]
    async fn test_output_channel() {
        let process = TranscodeProcess::spawn(
            &sh(),
            &script("printf hello >&3"),
            &[ChannelRole::ExtraOutput],
            &SpawnOptions::default(),
        )
        .unwrap();

        assert!(process.take_input(0).is_none());
        let mut output = process.take_output(0).unwrap();
        assert!(process.take_output(0).is_none());

        let mut data = Vec::new();
        output.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"hello");

        let exit = process.wait().await;
        assert!(exit.success());
        assert_eq!(process.try_exit(), Some(exit));
    }

    #[tokio::test]
    async fn test_input_and_output_channels() {
        let process = TranscodeProcess::spawn(
            &sh(),
            &script("cat <&3 >&4"),
            &[ChannelRole::ExtraInput, ChannelRole::ExtraOutput],
            &SpawnOptions::default(),
        )
        .unwrap();

        let mut input = process.take_input(0).unwrap();
        let mut output = process.take_output(1).unwrap();

        input.write_all(b"muxed bytes").await.unwrap();
        input.shutdown().await.unwrap();
        drop(input);

        let mut data = Vec::new();
        output.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"muxed bytes");
        assert_eq!(process.wait().await.reason, ExitReason::Exited);
    }

    #[tokio::test]
    async fn test_failed_exit_is_not_success() {
        let process =
            TranscodeProcess::spawn(&sh(), &script("exit 3"), &[], &SpawnOptions::default())
                .unwrap();
        let exit = process.wait().await;
        assert_eq!(exit.reason, ExitReason::Exited);
        assert_eq!(exit.status.and_then(|s| s.code()), Some(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_terminate_is_graceful_and_idempotent() {
        let process = TranscodeProcess::spawn(
            &sh(),
            &script("echo ready >&3; exec sleep 30"),
            &[ChannelRole::ExtraOutput],
            &SpawnOptions::default(),
        )
        .unwrap();
        let mut output = process.take_output(0).unwrap();
        assert_eq!(read_exact_str(&mut output, 6).await, "ready\n");
        assert!(process.try_exit().is_none());

        process.terminate();
        process.terminate();
        process.terminate();

        let exit = process.wait().await;
        assert_eq!(exit.reason, ExitReason::Terminated);
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_escalates_to_kill_after_grace_period() {
        let grace = Duration::from_millis(300);
        let process = TranscodeProcess::spawn(
            &sh(),
            &script("trap '' TERM; echo ready >&3; exec 3>&-; while true; do sleep 1; done"),
            &[ChannelRole::ExtraOutput],
            &SpawnOptions::default().with_grace_period(grace),
        )
        .unwrap();
        let mut output = process.take_output(0).unwrap();
        assert_eq!(read_exact_str(&mut output, 6).await, "ready\n");

        let started = Instant::now();
        process.terminate();
        let exit = process.wait().await;

        assert_eq!(exit.reason, ExitReason::Killed);
        assert!(started.elapsed() >= grace);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_process() {
        let process = TranscodeProcess::spawn(
            &sh(),
            &script("echo ready >&3; exec sleep 30"),
            &[ChannelRole::ExtraOutput],
            &SpawnOptions::default(),
        )
        .unwrap();
        let mut output = process.take_output(0).unwrap();
        assert_eq!(read_exact_str(&mut output, 6).await, "ready\n");

        drop(process);
        // The write end closes once the child is gone.
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), output.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = TranscodeProcess::spawn(
            Path::new("/definitely/not/here/ffmpeg"),
            &[],
            &[ChannelRole::ExtraOutput],
            &SpawnOptions::default(),
        );
        assert!(matches!(result, Err(Error::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_too_many_channels() {
        let roles = [ChannelRole::ExtraOutput; MAX_EXTRA_CHANNELS + 1];
        let result = TranscodeProcess::spawn(&sh(), &[], &roles, &SpawnOptions::default());
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
