use anyhow::{Context, Result, anyhow};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::background::Gsettings;
use crate::config::{ConfigStore, SOCKET_NAME};
use crate::host::DesktopHost;
use crate::menu::{Completion, CompletionSink, Controller};
use crate::resolver::Resolver;
use crate::types::Action;

/// How long a client may take to send its command or read the reply.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum DaemonMsg {
    Activate {
        action: Action,
        timestamp: Option<u32>,
    },
    Finished(Completion),
    Stop,
}

pub fn run_daemon(config: ConfigStore) -> Result<()> {
    let (tx, rx) = mpsc::channel::<DaemonMsg>();
    let mut agent = Agent::start(runtime_socket_path(SOCKET_NAME), tx.clone())?;

    let finished = tx.clone();
    let sink: CompletionSink = Arc::new(move |completion| {
        let _ = finished.send(DaemonMsg::Finished(completion));
    });
    info!(config = %config.path().display(), "starting agent");
    let controller = Controller::new(
        DesktopHost::default(),
        config,
        Resolver::from_env(),
        Gsettings,
        sink,
    );

    info!(socket = %agent.socket_path().display(), "waiting for menu actions");
    for msg in rx.iter() {
        match msg {
            DaemonMsg::Activate { action, timestamp } => {
                // the reaper reports back through the sink
                let _ = controller.activate(action, timestamp);
            }
            DaemonMsg::Finished(completion) => controller.finish(completion),
            DaemonMsg::Stop => break,
        }
    }
    controller.detach();
    agent.stop();
    Ok(())
}

/// Attaches the control socket on `start` and detaches it on `stop`.
pub struct Agent {
    socket_path: PathBuf,
    stopping: Arc<AtomicBool>,
    listener: Option<thread::JoinHandle<()>>,
}

impl Agent {
    pub fn start(socket_path: PathBuf, tx: mpsc::Sender<DaemonMsg>) -> Result<Self> {
        let listener = bind_listener(&socket_path)?;
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = stopping.clone();
        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else {
                    continue;
                };
                // a slow client must not hold up accept or stop
                let tx = tx.clone();
                thread::spawn(move || {
                    if let Err(err) = serve(stream, &tx) {
                        warn!("control socket: {err:#}");
                    }
                });
            }
        });
        Ok(Self {
            socket_path,
            stopping,
            listener: Some(handle),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn stop(&mut self) {
        let Some(handle) = self.listener.take() else {
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);
        // wake the blocking accept
        let _ = UnixStream::connect(&self.socket_path);
        if handle.join().is_err() {
            warn!("control socket thread panicked");
        }
        let _ = std::fs::remove_file(&self.socket_path);
        debug!(socket = %self.socket_path.display(), "detached");
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(stream: UnixStream, tx: &mpsc::Sender<DaemonMsg>) -> Result<()> {
    stream
        .set_read_timeout(Some(CLIENT_TIMEOUT))
        .context("set read timeout")?;
    stream
        .set_write_timeout(Some(CLIENT_TIMEOUT))
        .context("set write timeout")?;
    let mut reader = BufReader::new(stream.try_clone().context("clone stream")?);
    let mut line = String::new();
    reader.read_line(&mut line).context("read command")?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let mut stream = stream;
    match parse_command(&line) {
        Ok(msg) => {
            tx.send(msg).map_err(|_| anyhow!("control loop has exited"))?;
            stream.write_all(b"ok\n").context("write reply")?;
        }
        Err(err) => {
            stream
                .write_all(format!("err {err}\n").as_bytes())
                .context("write reply")?;
        }
    }
    Ok(())
}

/// `<action> [timestamp]` or `stop`.
pub fn parse_command(line: &str) -> Result<DaemonMsg> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| anyhow!("empty command"))?;
    if verb == "stop" {
        return Ok(DaemonMsg::Stop);
    }
    let action = verb.parse::<Action>()?;
    let timestamp = match words.next() {
        Some(value) => Some(
            value
                .parse::<u32>()
                .with_context(|| format!("bad timestamp: {value}"))?,
        ),
        None => None,
    };
    Ok(DaemonMsg::Activate { action, timestamp })
}

pub fn send_command(socket_path: &Path, command: &str) -> Result<()> {
    let mut stream = UnixStream::connect(socket_path)
        .with_context(|| format!("connect {} (is the daemon running?)", socket_path.display()))?;
    stream
        .write_all(format!("{command}\n").as_bytes())
        .context("send command")?;
    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .context("read reply")?;
    match reply.trim() {
        "ok" => Ok(()),
        other => Err(anyhow!(
            "daemon refused {command}: {}",
            other.strip_prefix("err ").unwrap_or(other)
        )),
    }
}

pub fn send_action(action: Action, timestamp: Option<u32>) -> Result<()> {
    let command = match timestamp {
        Some(timestamp) => format!("{action} {timestamp}"),
        None => action.to_string(),
    };
    send_command(&runtime_socket_path(SOCKET_NAME), &command)
}

pub fn runtime_socket_path(name: &str) -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(name)
}

fn bind_listener(path: &Path) -> Result<UnixListener> {
    if UnixStream::connect(path).is_ok() {
        return Err(anyhow!("wallpicker-menu daemon already running"));
    }
    let _ = std::fs::remove_file(path);
    let listener =
        UnixListener::bind(path).with_context(|| format!("bind {}", path.display()))?;
    Ok(listener)
}
