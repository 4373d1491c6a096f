#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use vibecheck_app::{
    FileFilter, PreferencesStore, Preferences, Prompt, UiEvent, UiSurface, UpdateController,
    UpdateHandle, UpdateSettings,
};
use vibecheck_engine::{
    InstallMode, Installer, ProgressSink, ReleaseFeed, ReleaseManifest, ServiceProcessState,
    TransferProgress, UpdateError,
};

pub const CURRENT_VERSION: &str = "1.0.0";

pub fn init_logging() {
    vibecheck_logging::initialize_for_tests();
}

/// Scripted answers for every dialog, with a record of what was shown.
#[derive(Default)]
pub struct FakeUi {
    pub chosen_file: Mutex<Option<PathBuf>>,
    pub answers: Mutex<VecDeque<bool>>,
    pub prompts: Mutex<Vec<Prompt>>,
    pub alerts: Mutex<Vec<(String, String)>>,
}

impl FakeUi {
    pub fn answering(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        })
    }

    pub fn prompt_titles(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|prompt| prompt.title.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl UiSurface for FakeUi {
    async fn choose_file(&self, _filter: FileFilter) -> Option<PathBuf> {
        self.chosen_file.lock().unwrap().clone()
    }

    async fn confirm(&self, prompt: Prompt) -> bool {
        self.prompts.lock().unwrap().push(prompt);
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }

    async fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Release feed that serves a fixed manifest and writes a dummy artifact.
pub struct FakeFeed {
    pub latest_version: String,
    pub staging_dir: PathBuf,
    pub latest_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    /// When set, `latest()` waits for a notification before answering.
    pub gate: Option<Arc<Notify>>,
}

impl FakeFeed {
    pub fn new(latest_version: &str, staging_dir: &Path) -> Self {
        Self {
            latest_version: latest_version.to_string(),
            staging_dir: staging_dir.to_path_buf(),
            latest_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReleaseFeed for FakeFeed {
    async fn latest(&self) -> Result<ReleaseManifest, UpdateError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(ReleaseManifest {
            version: self.latest_version.clone(),
            url: format!("https://dl.example.com/VibeCheck-{}.exe", self.latest_version),
            sha256: None,
            notes: None,
        })
    }

    async fn download(
        &self,
        release: &ReleaseManifest,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, UpdateError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        sink.emit(TransferProgress {
            bytes_transferred: 0,
            bytes_total: Some(4),
        });
        let artifact = self
            .staging_dir
            .join(format!("VibeCheck-{}.exe", release.version));
        std::fs::write(&artifact, b"exe!")?;
        sink.emit(TransferProgress {
            bytes_transferred: 4,
            bytes_total: Some(4),
        });
        Ok(artifact)
    }
}

#[derive(Default)]
pub struct RecordingInstaller {
    pub launches: Mutex<Vec<(PathBuf, InstallMode)>>,
    /// When set, the service state at each launch is recorded too.
    pub service: Mutex<Option<watch::Receiver<ServiceProcessState>>>,
    pub service_at_launch: Mutex<Vec<ServiceProcessState>>,
}

impl RecordingInstaller {
    pub fn launches(&self) -> Vec<(PathBuf, InstallMode)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn watch_service(&self, state: watch::Receiver<ServiceProcessState>) {
        *self.service.lock().unwrap() = Some(state);
    }

    pub fn service_at_launch(&self) -> Vec<ServiceProcessState> {
        self.service_at_launch.lock().unwrap().clone()
    }
}

impl Installer for RecordingInstaller {
    fn launch(&self, artifact: &Path, mode: InstallMode) -> Result<(), UpdateError> {
        if let Some(state) = self.service.lock().unwrap().as_ref() {
            let current = state.borrow().clone();
            self.service_at_launch.lock().unwrap().push(current);
        }
        self.launches
            .lock()
            .unwrap()
            .push((artifact.to_path_buf(), mode));
        Ok(())
    }
}

pub struct UpdateRig {
    pub handle: UpdateHandle,
    pub quit: tokio_util::sync::CancellationToken,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
}

pub fn spawn_updates(
    feed: Arc<FakeFeed>,
    installer: Arc<RecordingInstaller>,
    ui: Arc<FakeUi>,
    auto_update: bool,
) -> UpdateRig {
    let (events_tx, events) = mpsc::unbounded_channel();
    let controller = UpdateController::new(
        UpdateSettings {
            current_version: CURRENT_VERSION.to_string(),
            check_interval: Duration::from_secs(3600),
        },
        feed,
        installer,
        ui,
        events_tx,
        PreferencesStore::in_memory(Preferences {
            auto_update,
            last_update_check_utc: None,
        }),
    );
    let quit = controller.quit_token();
    UpdateRig {
        handle: controller.spawn(),
        quit,
        events,
    }
}

/// Collects status lines until `predicate` matches one, or panics after a few seconds.
pub async fn wait_for_status<F>(events: &mut mpsc::UnboundedReceiver<UiEvent>, predicate: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let UiEvent::UpdateStatus(line) = event {
                let done = predicate(&line);
                seen.push(line);
                if done {
                    return;
                }
            }
        }
    })
    .await;
    assert!(result.is_ok(), "status never matched; saw {seen:?}");
    seen
}
