//! Child process launching with startup-notification environment.
//!
//! Each launch gets its own reaper thread which owns the `Child` until exit
//! is observed, so no zombie is left behind even when nobody looks at the
//! outcome. The completion callback runs exactly once per launch.
//!
//! Cancelling only withdraws interest in the result: a running child keeps
//! running and is still reaped, but its outcome is reported as `Cancelled`.

use std::{
    io,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::Notice;

pub const STARTUP_ID_VAR: &str = "DESKTOP_STARTUP_ID";
pub const BACKEND_HINT: (&str, &str) = ("GDK_BACKEND", "x11");
pub const A11Y_SUPPRESSION: [(&str, &str); 2] = [("NO_AT_BRIDGE", "1"), ("GTK_A11Y", "none")];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0} is not installed")]
    ExecutableNotFound(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {code}")]
    NonZeroExit { program: String, code: i32 },
    #[error("{program} was terminated by signal {signal}")]
    Signalled { program: String, signal: i32 },
    #[error("lost track of {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub enum LaunchOutcome {
    Success,
    Failed(LaunchError),
    Cancelled,
}

impl LaunchOutcome {
    pub fn into_notice(self) -> Option<Notice> {
        match self {
            Self::Success | Self::Cancelled => None,
            Self::Failed(LaunchError::ExecutableNotFound(name)) => Some(Notice::new(
                "Wallpaper Picker",
                format!("{name} was not found. Install it to ~/.local/bin or somewhere on PATH."),
            )),
            Self::Failed(err) => Some(Notice::new("Wallpaper Picker", err.to_string())),
        }
    }
}

/// Millisecond timestamps that never repeat or go backwards.
#[derive(Debug)]
pub struct EventClock {
    origin: Instant,
    last: AtomicU32,
}

impl Default for EventClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU32::new(0),
        }
    }
}

impl EventClock {
    pub fn now(&self) -> u32 {
        let elapsed = u32::try_from(self.origin.elapsed().as_millis()).unwrap_or(u32::MAX);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(elapsed.max(last.saturating_add(1)))
            })
            .unwrap_or_default();
        elapsed.max(previous.saturating_add(1))
    }
}

pub fn startup_token(app_name: &str, pid: u32, timestamp: u32) -> String {
    format!("{app_name}-{pid}-{timestamp}_TIME{timestamp}")
}

/// Variables layered over the inherited environment of every launched child.
pub fn startup_env(app_name: &str, pid: u32, timestamp: u32) -> Vec<(String, String)> {
    let mut env = vec![
        (STARTUP_ID_VAR.to_string(), startup_token(app_name, pid, timestamp)),
        (BACKEND_HINT.0.to_string(), BACKEND_HINT.1.to_string()),
    ];
    env.extend(
        A11Y_SUPPRESSION
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string())),
    );
    env
}

#[derive(Clone, Debug)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub token: String,
}

impl LaunchRequest {
    pub fn new(app_name: &str, program: PathBuf, args: Vec<String>, timestamp: u32) -> Self {
        let pid = std::process::id();
        Self {
            program,
            args,
            env: startup_env(app_name, pid, timestamp),
            token: startup_token(app_name, pid, timestamp),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null());
        cmd
    }

    fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct LaunchHandle {
    reaper: thread::JoinHandle<()>,
}

impl LaunchHandle {
    /// Blocks until the child is reaped and the callback has run.
    pub fn join(self) {
        if self.reaper.join().is_err() {
            warn!("launch reaper panicked");
        }
    }
}

/// Spawns `request` and reports its single outcome to `on_done` from the reaper thread.
pub fn launch<F>(request: LaunchRequest, cancel: Cancellation, on_done: F) -> LaunchHandle
where
    F: FnOnce(LaunchOutcome) + Send + 'static,
{
    let reaper = thread::spawn(move || {
        let outcome = run_to_completion(&request, &cancel);
        match &outcome {
            LaunchOutcome::Success => debug!(token = %request.token, "launch finished"),
            LaunchOutcome::Cancelled => debug!(token = %request.token, "launch cancelled"),
            LaunchOutcome::Failed(err) => warn!(token = %request.token, "launch failed: {err}"),
        }
        on_done(outcome);
    });
    LaunchHandle { reaper }
}

fn run_to_completion(request: &LaunchRequest, cancel: &Cancellation) -> LaunchOutcome {
    let program = request.display_name();
    if cancel.is_cancelled() {
        return LaunchOutcome::Cancelled;
    }
    let mut child = match request.command().spawn() {
        Ok(child) => child,
        Err(source) => return LaunchOutcome::Failed(LaunchError::Spawn { program, source }),
    };
    info!(
        pid = child.id(),
        program = %request.program.display(),
        args = ?request.args,
        "launched"
    );

    let waited = child.wait();
    if cancel.is_cancelled() {
        return LaunchOutcome::Cancelled;
    }
    match waited {
        Ok(status) => status_outcome(program, status),
        Err(source) => {
            kill_and_reap(&mut child, &program);
            LaunchOutcome::Failed(LaunchError::Wait { program, source })
        }
    }
}

fn kill_and_reap(child: &mut Child, program: &str) {
    if let Err(err) = child.kill() {
        warn!(program = %program, "could not kill child: {err}");
    }
    if let Err(err) = child.wait() {
        warn!(program = %program, "could not reap child: {err}");
    }
}

fn status_outcome(program: String, status: ExitStatus) -> LaunchOutcome {
    if status.success() {
        return LaunchOutcome::Success;
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => LaunchOutcome::Failed(LaunchError::NonZeroExit { program, code }),
        (None, Some(signal)) => LaunchOutcome::Failed(LaunchError::Signalled { program, signal }),
        (None, None) => LaunchOutcome::Failed(LaunchError::NonZeroExit { program, code: -1 }),
    }
}
