//! Drives the update state machine: feeds it messages, runs the effects it asks for.
//!
//! The controller runs as its own task. Network work and prompts are spawned
//! off the loop and report back through the outcome channel, so the loop only
//! ever touches `UpdateState` from one place.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vibecheck_core::{
    update, CheckOrigin, DownloadProgress, Effect, InstallPolicy, Msg, ReleaseInfo, UpdateInfo,
    UpdatePhase, UpdateState,
};
use vibecheck_engine::{
    InstallMode, Installer, ProgressSink, ReleaseFeed, ReleaseManifest, TransferProgress,
};
use vibecheck_logging::{host_debug, host_error, host_info, host_warn};

use super::persistence::PreferencesStore;
use super::ui::{Prompt, UiEvent, UiSurface};

/// Progress is forwarded at least this often even when the percentage is unchanged.
const PROGRESS_BYTES_STEP: u64 = 512 * 1024;

#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub current_version: String,
    pub check_interval: Duration,
}

enum UpdateCommand {
    Check(CheckOrigin),
    SetAutoUpdate(bool),
    Snapshot(oneshot::Sender<UpdateInfo>),
    Quit(oneshot::Sender<()>),
}

/// Cheap, cloneable way to talk to a running controller.
#[derive(Debug, Clone)]
pub struct UpdateHandle {
    commands: UnboundedSender<UpdateCommand>,
}

impl std::fmt::Debug for UpdateCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateCommand::Check(origin) => write!(f, "Check({origin:?})"),
            UpdateCommand::SetAutoUpdate(enabled) => write!(f, "SetAutoUpdate({enabled})"),
            UpdateCommand::Snapshot(_) => write!(f, "Snapshot"),
            UpdateCommand::Quit(_) => write!(f, "Quit"),
        }
    }
}

impl UpdateHandle {
    pub fn check_for_updates(&self) {
        self.send(UpdateCommand::Check(CheckOrigin::User));
    }

    pub fn check_on_startup(&self) {
        self.send(UpdateCommand::Check(CheckOrigin::Startup));
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.send(UpdateCommand::SetAutoUpdate(enabled));
    }

    /// Current view of the lifecycle, or `None` once the controller has stopped.
    pub async fn snapshot(&self) -> Option<UpdateInfo> {
        let (tx, rx) = oneshot::channel();
        self.send(UpdateCommand::Snapshot(tx));
        rx.await.ok()
    }

    /// Applies install-on-quit and stops the controller. Waits until both are done.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(UpdateCommand::Quit(tx));
        let _ = rx.await;
    }

    fn send(&self, command: UpdateCommand) {
        if self.commands.send(command).is_err() {
            host_debug!("Update controller already stopped");
        }
    }
}

pub struct UpdateController {
    state: UpdateState,
    feed: Arc<dyn ReleaseFeed>,
    installer: Arc<dyn Installer>,
    ui: Arc<dyn UiSurface>,
    events: UnboundedSender<UiEvent>,
    outcomes_tx: UnboundedSender<Msg>,
    outcomes_rx: Option<UnboundedReceiver<Msg>>,
    preferences: PreferencesStore,
    check_interval: Duration,
    quit: CancellationToken,
}

impl UpdateController {
    pub fn new(
        settings: UpdateSettings,
        feed: Arc<dyn ReleaseFeed>,
        installer: Arc<dyn Installer>,
        ui: Arc<dyn UiSurface>,
        events: UnboundedSender<UiEvent>,
        preferences: PreferencesStore,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let state = UpdateState::new(settings.current_version)
            .with_auto_update(preferences.get().auto_update);
        Self {
            state,
            feed,
            installer,
            ui,
            events,
            outcomes_tx,
            outcomes_rx: Some(outcomes_rx),
            preferences,
            check_interval: settings.check_interval,
            quit: CancellationToken::new(),
        }
    }

    /// Cancelled when an accepted update needs the application to exit.
    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// Starts the controller loop on the current runtime.
    pub fn spawn(self) -> UpdateHandle {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(commands_rx));
        UpdateHandle { commands }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<UpdateCommand>) {
        let Some(mut outcomes) = self.outcomes_rx.take() else {
            return;
        };
        let period = self.check_interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(UpdateCommand::Check(origin)) => {
                        self.dispatch(Msg::CheckRequested { origin });
                    }
                    Some(UpdateCommand::SetAutoUpdate(enabled)) => {
                        if self.preferences.set_auto_update(enabled) {
                            self.preferences.save_in_background();
                        }
                        self.dispatch(Msg::AutoUpdateChanged(enabled));
                    }
                    Some(UpdateCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.state.view());
                    }
                    Some(UpdateCommand::Quit(done)) => {
                        self.dispatch(Msg::QuitRequested);
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.dispatch(Msg::QuitRequested);
                        break;
                    }
                },
                Some(msg) = outcomes.recv() => self.dispatch(msg),
                _ = timer.tick() => {
                    self.dispatch(Msg::CheckRequested { origin: CheckOrigin::Timer });
                }
            }
        }
        host_info!("Update controller stopped");
    }

    fn dispatch(&mut self, msg: Msg) {
        if !matches!(msg, Msg::DownloadProgressed(_)) {
            host_debug!("Update msg: {:?}", msg);
        }
        let answers_check = matches!(msg, Msg::CheckCompleted { .. })
            && matches!(self.state.phase(), UpdatePhase::Checking { .. });

        let (mut state, effects) = update(self.state.clone(), msg);
        if answers_check {
            self.preferences.record_check(Utc::now());
            self.preferences.save_in_background();
        }
        if state.consume_dirty() {
            host_debug!("Update state: {}", state.view());
        }
        self.state = state;

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::FetchManifest => {
                let feed = self.feed.clone();
                let outcomes = self.outcomes_tx.clone();
                tokio::spawn(async move {
                    let msg = match feed.latest().await {
                        Ok(manifest) => Msg::CheckCompleted {
                            latest: release_info(manifest),
                        },
                        Err(err) => {
                            host_warn!("Update check failed: {}", err);
                            Msg::CheckFailed {
                                message: err.to_string(),
                            }
                        }
                    };
                    let _ = outcomes.send(msg);
                });
            }
            Effect::PromptDownload { release } => {
                let prompt = download_prompt(&release, self.state.current_version());
                self.ask(prompt, |accepted| Msg::DownloadAnswered { accepted });
            }
            Effect::StartDownload { release } => {
                let feed = self.feed.clone();
                let outcomes = self.outcomes_tx.clone();
                tokio::spawn(async move {
                    let sink = ChannelSink::new(outcomes.clone());
                    let msg = match feed.download(&release_manifest(&release), &sink).await {
                        Ok(artifact) => Msg::DownloadCompleted { artifact },
                        Err(err) => {
                            host_warn!("Update download failed: {}", err);
                            Msg::DownloadFailed {
                                message: err.to_string(),
                            }
                        }
                    };
                    let _ = outcomes.send(msg);
                });
            }
            Effect::PromptInstall { version } => {
                let prompt = install_prompt(&version);
                self.ask(prompt, |accepted| Msg::InstallAnswered { accepted });
            }
            Effect::Progress(progress) => {
                self.emit(UiEvent::UpdateProgress {
                    percent: progress.percent(),
                    bytes_transferred: progress.bytes_transferred,
                    bytes_total: progress.bytes_total,
                });
            }
            Effect::Notify(line) => {
                host_info!("{}", line);
                self.emit(UiEvent::UpdateStatus(line));
            }
            Effect::Install { artifact, policy } => {
                let mode = match policy {
                    InstallPolicy::RestartNow => InstallMode::Interactive,
                    InstallPolicy::OnQuit => InstallMode::Silent,
                };
                match (self.installer.launch(&artifact, mode), policy) {
                    (Ok(()), InstallPolicy::RestartNow) => self.quit.cancel(),
                    (Ok(()), InstallPolicy::OnQuit) => {}
                    (Err(err), InstallPolicy::RestartNow) => {
                        host_error!("Could not start installer {:?}: {}", artifact, err);
                        let _ = self.outcomes_tx.send(Msg::InstallFailed {
                            message: err.to_string(),
                        });
                    }
                    (Err(err), InstallPolicy::OnQuit) => {
                        host_error!("Could not install update on quit {:?}: {}", artifact, err);
                    }
                }
            }
        }
    }

    fn ask<F>(&self, prompt: Prompt, answer: F)
    where
        F: FnOnce(bool) -> Msg + Send + 'static,
    {
        let ui = self.ui.clone();
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let accepted = ui.confirm(prompt).await;
            let _ = outcomes.send(answer(accepted));
        });
    }

    fn emit(&self, event: UiEvent) {
        // The UI may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}

fn download_prompt(release: &ReleaseInfo, current_version: &str) -> Prompt {
    let mut message = format!(
        "VibeCheck v{} is available (you have v{}). Download it now?",
        release.version, current_version
    );
    if let Some(notes) = release.notes.as_deref().filter(|notes| !notes.trim().is_empty()) {
        message.push_str("\n\n");
        message.push_str(notes.trim());
    }
    Prompt::new("Update available", message).labels("Download", "Later")
}

fn install_prompt(version: &str) -> Prompt {
    Prompt::new(
        "Update ready",
        format!(
            "VibeCheck v{version} has been downloaded. Restart now to install it? \
             If you choose Later it will be installed when you quit."
        ),
    )
    .labels("Restart", "Later")
}

fn release_info(manifest: ReleaseManifest) -> ReleaseInfo {
    ReleaseInfo {
        version: manifest.version,
        url: manifest.url,
        sha256: manifest.sha256,
        notes: manifest.notes,
    }
}

fn release_manifest(release: &ReleaseInfo) -> ReleaseManifest {
    ReleaseManifest {
        version: release.version.clone(),
        url: release.url.clone(),
        sha256: release.sha256.clone(),
        notes: release.notes.clone(),
    }
}

/// Turns transfer callbacks into controller messages, dropping updates that show no change.
struct ChannelSink {
    outcomes: UnboundedSender<Msg>,
    last: Mutex<Option<(u8, u64)>>,
}

impl ChannelSink {
    fn new(outcomes: UnboundedSender<Msg>) -> Self {
        Self {
            outcomes,
            last: Mutex::new(None),
        }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, progress: TransferProgress) {
        let progress = DownloadProgress::new(progress.bytes_transferred, progress.bytes_total);
        let percent = progress.percent();
        let finished = progress.bytes_total == Some(progress.bytes_transferred);

        let Ok(mut last) = self.last.lock() else {
            return;
        };
        let due = match *last {
            None => true,
            Some((last_percent, last_bytes)) => {
                finished
                    || percent != last_percent
                    || progress.bytes_transferred.saturating_sub(last_bytes) >= PROGRESS_BYTES_STEP
            }
        };
        if due {
            *last = Some((percent, progress.bytes_transferred));
            let _ = self.outcomes.send(Msg::DownloadProgressed(progress));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use vibecheck_core::{CheckOrigin, Msg, ReleaseInfo, UpdatePhase};
    use vibecheck_engine::{
        InstallMode, Installer, ProgressSink, ReleaseFeed, ReleaseManifest, UpdateError,
    };

    use super::{UpdateController, UpdateSettings};
    use crate::platform::persistence::{Preferences, PreferencesStore};
    use crate::platform::ui::{FileFilter, Prompt, UiSurface};

    struct Unreachable;

    #[async_trait::async_trait]
    impl ReleaseFeed for Unreachable {
        async fn latest(&self) -> Result<ReleaseManifest, UpdateError> {
            Err(UpdateError::Timeout)
        }

        async fn download(
            &self,
            _release: &ReleaseManifest,
            _sink: &dyn ProgressSink,
        ) -> Result<PathBuf, UpdateError> {
            Err(UpdateError::Timeout)
        }
    }

    impl Installer for Unreachable {
        fn launch(&self, _artifact: &Path, _mode: InstallMode) -> Result<(), UpdateError> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl UiSurface for Unreachable {
        async fn choose_file(&self, _filter: FileFilter) -> Option<PathBuf> {
            None
        }

        async fn confirm(&self, _prompt: Prompt) -> bool {
            false
        }

        async fn alert(&self, _title: &str, _message: &str) {}
    }

    fn controller() -> UpdateController {
        let (events, _) = mpsc::unbounded_channel();
        UpdateController::new(
            UpdateSettings {
                current_version: "1.0.0".to_string(),
                check_interval: Duration::from_secs(3600),
            },
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            events,
            PreferencesStore::in_memory(Preferences::default()),
        )
    }

    fn release(version: &str) -> ReleaseInfo {
        ReleaseInfo {
            version: version.to_string(),
            url: format!("https://dl.example.com/VibeCheck-{version}.exe"),
            sha256: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn stale_feed_answer_is_not_recorded_as_a_check() {
        let mut controller = controller();
        controller.dispatch(Msg::CheckCompleted {
            latest: release("1.0.0"),
        });
        assert_eq!(controller.preferences.get().last_update_check_utc, None);
    }

    #[tokio::test]
    async fn answered_check_is_recorded() {
        let mut controller = controller();
        controller.dispatch(Msg::CheckRequested {
            origin: CheckOrigin::User,
        });
        assert!(matches!(
            controller.state.phase(),
            UpdatePhase::Checking { .. }
        ));
        controller.dispatch(Msg::CheckCompleted {
            latest: release("1.0.0"),
        });
        assert!(controller.preferences.get().last_update_check_utc.is_some());
    }
}
