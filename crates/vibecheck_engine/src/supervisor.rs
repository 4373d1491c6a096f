//! Analysis service child-process lifecycle.
//!
//! In development the service script runs under a Python interpreter found on
//! `PATH`; packaged builds run the frozen service executable shipped in the
//! application's resources directory.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use vibecheck_logging::{host_debug, host_error, host_info, host_warn, SidecarStream};

use crate::{ServiceProcessState, SupervisorEvent};

/// Environment variable pointing the service at the application's install directory.
pub const APP_DIR_ENV: &str = "VIBECHECK_APP_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("analysis service executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),
    #[error("failed to spawn analysis service {}: {message}", path.display())]
    SpawnFailed { path: PathBuf, message: String },
    #[error("analysis service is already running")]
    AlreadyRunning,
}

/// Interpreter used to run the service script in development mode.
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Run `script` with `interpreter`, resolved through `PATH`.
    Development { interpreter: String, script: PathBuf },
    /// Run `executable`, relative to `resource_dir`, which must exist on disk.
    Packaged {
        resource_dir: PathBuf,
        executable: PathBuf,
    },
}

/// Fully resolved command line and environment overlay for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarLaunch {
    pub executable: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub working_dir: Option<PathBuf>,
}

impl SidecarLaunch {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Resolves the executable for `mode` and injects the environment overlay.
    pub fn resolve(mode: &LaunchMode, app_dir: &Path) -> Result<Self, SupervisorError> {
        let launch = match mode {
            LaunchMode::Development {
                interpreter,
                script,
            } => {
                let mut launch = SidecarLaunch::new(interpreter).arg(script.as_os_str());
                if let Some(script_dir) = script.parent().filter(|dir| !dir.as_os_str().is_empty())
                {
                    launch = launch
                        .env("PYTHONPATH", script_dir.as_os_str())
                        .working_dir(script_dir);
                }
                launch
            }
            LaunchMode::Packaged {
                resource_dir,
                executable,
            } => {
                let path = resource_dir.join(executable);
                if !path.is_file() {
                    return Err(SupervisorError::ExecutableNotFound(path));
                }
                SidecarLaunch::new(path).working_dir(resource_dir)
            }
        };

        Ok(launch
            .env(APP_DIR_ENV, app_dir.as_os_str())
            .env("PYTHONUNBUFFERED", "1"))
    }
}

struct RunningChild {
    pid: Option<u32>,
    kill_tx: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

/// Owns the service child process and its state. Nothing else mutates either.
pub struct ProcessSupervisor {
    state: Arc<watch::Sender<ServiceProcessState>>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    running: Option<RunningChild>,
}

impl ProcessSupervisor {
    /// Creates a supervisor in `NotStarted` plus the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ServiceProcessState::NotStarted);
        let supervisor = Self {
            state: Arc::new(state),
            events,
            running: None,
        };
        (supervisor, events_rx)
    }

    pub fn state(&self) -> ServiceProcessState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceProcessState> {
        self.state.subscribe()
    }

    /// Spawns the service. Resolves as soon as the process exists; readiness is probed elsewhere.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, launch: &SidecarLaunch) -> Result<(), SupervisorError> {
        if self.running.is_some() && self.state().is_running() {
            return Err(SupervisorError::AlreadyRunning);
        }
        publish(&self.state, &self.events, ServiceProcessState::Starting);

        let mut command = Command::new(&launch.executable);
        command
            .args(&launch.args)
            .envs(launch.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &launch.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let error = spawn_error(&launch.executable, err);
                host_error!("Analysis service failed to start: {}", error);
                publish(
                    &self.state,
                    &self.events,
                    ServiceProcessState::Failed(error.to_string()),
                );
                return Err(error);
            }
        };

        let pid = child.id();
        host_info!(
            "Analysis service started pid={:?} executable={:?}",
            pid,
            launch.executable
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                stdout,
                SidecarStream::Stdout,
                self.events.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                SidecarStream::Stderr,
                self.events.clone(),
            ));
        }

        // Publish before the monitor exists so an instant exit cannot be overwritten.
        publish(&self.state, &self.events, ServiceProcessState::Running);

        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_child(
            child,
            kill_rx,
            self.state.clone(),
            self.events.clone(),
        ));
        self.running = Some(RunningChild {
            pid,
            kill_tx,
            monitor,
        });
        Ok(())
    }

    /// Terminates the service if it is alive. Safe to call any number of times.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            host_debug!("Stop requested but analysis service is not running");
            return;
        };
        host_info!("Stopping analysis service pid={:?}", running.pid);
        // The receiver is gone when the child already exited on its own.
        let _ = running.kill_tx.send(());
        if let Err(err) = running.monitor.await {
            host_warn!("Analysis service monitor ended abnormally: {}", err);
        }
    }
}

fn spawn_error(executable: &Path, err: io::Error) -> SupervisorError {
    if err.kind() == io::ErrorKind::NotFound {
        SupervisorError::ExecutableNotFound(executable.to_path_buf())
    } else {
        SupervisorError::SpawnFailed {
            path: executable.to_path_buf(),
            message: err.to_string(),
        }
    }
}

fn publish(
    state: &watch::Sender<ServiceProcessState>,
    events: &mpsc::UnboundedSender<SupervisorEvent>,
    next: ServiceProcessState,
) {
    host_debug!("Analysis service state -> {}", next);
    state.send_replace(next.clone());
    let _ = events.send(SupervisorEvent::StateChanged(next));
}

async fn forward_lines<R>(
    reader: R,
    stream: SidecarStream,
    events: mpsc::UnboundedSender<SupervisorEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if events.send(SupervisorEvent::Output { stream, line }).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                host_warn!("Reading analysis service {} failed: {}", stream, err);
                break;
            }
        }
    }
}

async fn monitor_child(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    state: Arc<watch::Sender<ServiceProcessState>>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
) {
    tokio::select! {
        status = child.wait() => {
            let reason = match status {
                Ok(status) => format!("analysis service exited unexpectedly ({status})"),
                Err(err) => format!("lost track of analysis service: {err}"),
            };
            host_error!("{}", reason);
            publish(&state, &events, ServiceProcessState::Failed(reason));
        }
        _ = kill_rx => {
            if let Err(err) = child.kill().await {
                host_warn!("Failed to kill analysis service: {}", err);
            }
            publish(&state, &events, ServiceProcessState::Stopped);
        }
    }
}
