//! The orchestrator the UI talks to. Owns the analysis service, the gateway
//! to it, and the update controller handle for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vibecheck_engine::{
    is_sensor_file, AnalysisFailureKind, AnalysisResult, Analyzer, FileAccessError,
    FileSelection, LaunchMode, ProcessInstaller, ProcessSupervisor, ReleaseSettings,
    ReqwestAnalyzer, ReqwestReleaseFeed, ServiceProcessState, SidecarLaunch, SupervisorError,
    SupervisorEvent,
};
use vibecheck_logging::{host_error, host_info, host_warn, sidecar_line};

use super::config::{AdmissionPolicy, HostConfig};
use super::persistence::PreferencesStore;
use super::ui::{FileFilter, UiEvent, UiSurface};
use super::updates::{UpdateController, UpdateHandle, UpdateSettings};

/// How long shutdown waits for the last supervisor events to reach the UI.
const FORWARDER_DRAIN: Duration = Duration::from_secs(1);

/// What `get_file_info` shows for a selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<FileSelection> for FileInfo {
    fn from(selection: FileSelection) -> Self {
        Self {
            name: selection.display_name,
            path: selection.absolute_path,
            size: selection.size_bytes,
            last_modified: selection.last_modified.map(DateTime::<Utc>::from),
        }
    }
}

/// Everything the orchestrator needs, already constructed.
pub struct HostParts {
    pub launch_mode: LaunchMode,
    pub app_dir: PathBuf,
    pub analyzer: Arc<dyn Analyzer>,
    pub updates: UpdateHandle,
    pub ui: Arc<dyn UiSurface>,
    pub events: UnboundedSender<UiEvent>,
    pub admission: AdmissionPolicy,
    /// Cancelled when the application should exit on its own.
    pub quit: CancellationToken,
}

pub struct HostOrchestrator {
    supervisor: ProcessSupervisor,
    service_state: watch::Receiver<ServiceProcessState>,
    forwarder: JoinHandle<()>,
    launch_mode: LaunchMode,
    app_dir: PathBuf,
    analyzer: Arc<dyn Analyzer>,
    updates: UpdateHandle,
    ui: Arc<dyn UiSurface>,
    admission: Option<Semaphore>,
    quit: CancellationToken,
}

impl HostOrchestrator {
    /// Builds the production wiring from `config`. Must run inside a tokio runtime.
    pub fn from_config(
        config: &HostConfig,
        ui: Arc<dyn UiSurface>,
        events: UnboundedSender<UiEvent>,
    ) -> anyhow::Result<Self> {
        let analyzer = ReqwestAnalyzer::new(config.gateway.clone())?;
        let feed = ReqwestReleaseFeed::new(ReleaseSettings::new(
            config.feed_url.clone(),
            config.staging_dir.clone(),
        ))?;
        let controller = UpdateController::new(
            UpdateSettings {
                current_version: config.current_version.clone(),
                check_interval: config.check_interval,
            },
            Arc::new(feed),
            Arc::new(ProcessInstaller::default()),
            ui.clone(),
            events.clone(),
            PreferencesStore::open(config.preferences_dir.clone()),
        );
        let quit = controller.quit_token();
        let updates = controller.spawn();

        Ok(Self::new(HostParts {
            launch_mode: config.launch_mode.clone(),
            app_dir: config.app_dir.clone(),
            analyzer: Arc::new(analyzer),
            updates,
            ui,
            events,
            admission: config.admission,
            quit,
        }))
    }

    pub fn new(parts: HostParts) -> Self {
        let (supervisor, supervisor_events) = ProcessSupervisor::new();
        let service_state = supervisor.subscribe();
        let forwarder = tokio::spawn(forward_supervisor_events(supervisor_events, parts.events));
        let admission = match parts.admission {
            AdmissionPolicy::Unbounded => None,
            AdmissionPolicy::SingleSlot => Some(Semaphore::new(1)),
        };
        Self {
            supervisor,
            service_state,
            forwarder,
            launch_mode: parts.launch_mode,
            app_dir: parts.app_dir,
            analyzer: parts.analyzer,
            updates: parts.updates,
            ui: parts.ui,
            admission,
            quit: parts.quit,
        }
    }

    /// Starts the analysis service, then the first update check.
    ///
    /// A launch failure is shown to the user once and returned; the host keeps
    /// running without the service and the update check still happens.
    pub async fn startup(&mut self) -> Result<(), SupervisorError> {
        let started = SidecarLaunch::resolve(&self.launch_mode, &self.app_dir)
            .and_then(|launch| self.supervisor.start(&launch));
        if let Err(err) = &started {
            host_error!("Analysis service could not be started: {}", err);
            self.ui
                .alert(
                    "Analysis service failed to start",
                    &format!("VibeCheck cannot analyze files in this session.\n\n{err}"),
                )
                .await;
        }
        self.updates.check_on_startup();
        started
    }

    pub fn service_state(&self) -> ServiceProcessState {
        self.service_state.borrow().clone()
    }

    /// Follows the service state, including the transitions made during shutdown.
    pub fn watch_service_state(&self) -> watch::Receiver<ServiceProcessState> {
        self.service_state.clone()
    }

    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// Opens the chooser filtered to sensor files. `None` when cancelled.
    pub async fn select_file(&self) -> Option<PathBuf> {
        let path = self.ui.choose_file(FileFilter::SENSOR_FILES).await?;
        self.accept_file(&path)
    }

    /// Same extension rule as the chooser, for paths dropped onto the window.
    pub fn accept_file(&self, path: &Path) -> Option<PathBuf> {
        if is_sensor_file(path) {
            Some(path.to_path_buf())
        } else {
            host_warn!("Ignoring {:?}: not a sensor data file", path);
            None
        }
    }

    pub async fn get_file_info(&self, path: &Path) -> Result<FileInfo, FileAccessError> {
        FileSelection::from_path(path).await.map(FileInfo::from)
    }

    /// Uploads the file to the analysis service. Never fails with anything but a result.
    pub async fn analyze_file(&self, path: &Path) -> AnalysisResult {
        let state = self.service_state();
        if !state.is_running() {
            host_warn!("Analyze requested while analysis service is {}", state);
            return AnalysisResult::failure(
                AnalysisFailureKind::ServiceNotRunning,
                "The analysis service is not running. Please restart VibeCheck.",
            );
        }

        let _permit = match &self.admission {
            None => None,
            Some(slots) => match slots.try_acquire() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    return AnalysisResult::failure(
                        AnalysisFailureKind::Busy,
                        "Another file is already being analyzed.",
                    );
                }
            },
        };

        let selection = match FileSelection::from_path(path).await {
            Ok(selection) => selection,
            Err(err) => {
                host_warn!("Cannot analyze {:?}: {}", path, err);
                return AnalysisResult::failure(AnalysisFailureKind::FileAccess, err.to_string());
            }
        };

        let result = self.analyzer.analyze(&selection).await;
        match &result {
            AnalysisResult::Success { report_path } => {
                host_info!("Analysis of {:?} finished: {}", selection.display_name, report_path)
            }
            AnalysisResult::Failure { kind, .. } => {
                host_warn!("Analysis of {:?} failed ({})", selection.display_name, kind)
            }
        }
        result
    }

    pub fn check_for_updates(&self) {
        self.updates.check_for_updates();
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.updates.set_auto_update(enabled);
    }

    pub fn updates(&self) -> &UpdateHandle {
        &self.updates
    }

    /// Stops the service first, then lets the update controller install on quit.
    pub async fn shutdown(self) {
        host_info!("Shutting down");
        let Self {
            mut supervisor,
            updates,
            mut forwarder,
            ..
        } = self;
        supervisor.stop().await;
        updates.shutdown().await;

        // The forwarder ends once every supervisor sender is gone.
        drop(supervisor);
        // Grandchildren of the service can keep its pipes open after the kill.
        if tokio::time::timeout(FORWARDER_DRAIN, &mut forwarder)
            .await
            .is_err()
        {
            host_warn!("Analysis service output still open after shutdown");
            forwarder.abort();
        }
    }
}

async fn forward_supervisor_events(
    mut events: UnboundedReceiver<SupervisorEvent>,
    ui: UnboundedSender<UiEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::Output { stream, line } => sidecar_line(stream, &line),
            SupervisorEvent::StateChanged(state) => {
                let _ = ui.send(UiEvent::ServiceState(state.to_string()));
            }
        }
    }
}
