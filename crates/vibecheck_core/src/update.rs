use crate::{
    is_newer, CheckOrigin, DownloadProgress, Effect, InstallPolicy, Msg, PendingInstall,
    UpdatePhase, UpdateState, UpdateStatus,
};

/// Pure update function: applies a message to state and returns any effects.
///
/// Messages that do not fit the current phase are ignored, which is what keeps
/// timer-driven checks from overlapping an active check or download.
pub fn update(mut state: UpdateState, msg: Msg) -> (UpdateState, Vec<Effect>) {
    let effects = match msg {
        Msg::CheckRequested { origin } => {
            if origin != CheckOrigin::User && !state.auto_update() {
                return (state, Vec::new());
            }
            if *state.phase() != UpdatePhase::Idle {
                return (state, Vec::new());
            }
            state.transition(
                UpdatePhase::Checking { origin },
                UpdateStatus::Checking,
                None,
            );
            vec![notify(&state), Effect::FetchManifest]
        }
        Msg::CheckCompleted { latest } => {
            if !matches!(state.phase(), UpdatePhase::Checking { .. }) {
                return (state, Vec::new());
            }
            let version = latest.version.clone();
            if !is_newer(&version, state.current_version()) {
                state.transition(UpdatePhase::Idle, UpdateStatus::NotAvailable, Some(version));
                vec![notify(&state)]
            } else if let Some(pending) = state
                .pending()
                .filter(|pending| !is_newer(&version, &pending.version))
                .cloned()
            {
                // Already downloaded and waiting for quit; do not offer it again.
                state.transition(
                    UpdatePhase::Idle,
                    UpdateStatus::Downloaded,
                    Some(pending.version),
                );
                vec![notify(&state)]
            } else {
                state.transition(
                    UpdatePhase::Available {
                        release: latest.clone(),
                    },
                    UpdateStatus::Available,
                    Some(version),
                );
                vec![notify(&state), Effect::PromptDownload { release: latest }]
            }
        }
        Msg::CheckFailed { message } => {
            if !matches!(state.phase(), UpdatePhase::Checking { .. }) {
                return (state, Vec::new());
            }
            fail(&mut state, message)
        }
        Msg::DownloadAnswered { accepted } => {
            let UpdatePhase::Available { release } = state.phase().clone() else {
                return (state, Vec::new());
            };
            if accepted {
                let progress = DownloadProgress::default();
                state.transition(
                    UpdatePhase::Downloading {
                        release: release.clone(),
                        progress,
                    },
                    UpdateStatus::Downloading(progress),
                    None,
                );
                vec![notify(&state), Effect::StartDownload { release }]
            } else {
                state.transition(UpdatePhase::Idle, UpdateStatus::Idle, None);
                vec![Effect::Notify(format!(
                    "Update v{} was not downloaded.",
                    release.version
                ))]
            }
        }
        Msg::DownloadProgressed(progress) => {
            if !matches!(state.phase(), UpdatePhase::Downloading { .. }) {
                return (state, Vec::new());
            }
            state.set_progress(progress);
            vec![Effect::Progress(progress)]
        }
        Msg::DownloadCompleted { artifact } => {
            let UpdatePhase::Downloading { release, .. } = state.phase().clone() else {
                return (state, Vec::new());
            };
            let version = release.version.clone();
            state.transition(
                UpdatePhase::Downloaded { release, artifact },
                UpdateStatus::Downloaded,
                None,
            );
            vec![notify(&state), Effect::PromptInstall { version }]
        }
        Msg::DownloadFailed { message } => {
            if !matches!(state.phase(), UpdatePhase::Downloading { .. }) {
                return (state, Vec::new());
            }
            fail(&mut state, message)
        }
        Msg::InstallAnswered { accepted } => {
            let UpdatePhase::Downloaded { release, artifact } = state.phase().clone() else {
                return (state, Vec::new());
            };
            if accepted {
                state.set_pending(None);
                state.transition(
                    UpdatePhase::Installing {
                        version: release.version,
                    },
                    UpdateStatus::Installing,
                    None,
                );
                vec![
                    notify(&state),
                    Effect::Install {
                        artifact,
                        policy: InstallPolicy::RestartNow,
                    },
                ]
            } else {
                state.set_pending(Some(PendingInstall {
                    version: release.version,
                    artifact,
                }));
                state.transition(UpdatePhase::Idle, UpdateStatus::Downloaded, None);
                vec![notify(&state)]
            }
        }
        Msg::InstallFailed { message } => {
            if !matches!(state.phase(), UpdatePhase::Installing { .. }) {
                return (state, Vec::new());
            }
            fail(&mut state, message)
        }
        Msg::AutoUpdateChanged(enabled) => {
            state.set_auto_update(enabled);
            Vec::new()
        }
        Msg::QuitRequested => {
            // An unanswered install prompt counts as a decline.
            let pending = match state.phase().clone() {
                UpdatePhase::Installing { .. } => None,
                UpdatePhase::Downloaded { release, artifact } => Some(PendingInstall {
                    version: release.version,
                    artifact,
                }),
                _ => state.pending().cloned(),
            };
            match pending {
                Some(pending) => {
                    state.set_pending(None);
                    state.transition(
                        UpdatePhase::Installing {
                            version: pending.version.clone(),
                        },
                        UpdateStatus::Installing,
                        Some(pending.version),
                    );
                    vec![Effect::Install {
                        artifact: pending.artifact,
                        policy: InstallPolicy::OnQuit,
                    }]
                }
                None => Vec::new(),
            }
        }
    };

    (state, effects)
}

fn notify(state: &UpdateState) -> Effect {
    Effect::Notify(state.view().status_line())
}

fn fail(state: &mut UpdateState, message: String) -> Vec<Effect> {
    state.transition(UpdatePhase::Idle, UpdateStatus::Error(message), None);
    vec![notify(state)]
}
