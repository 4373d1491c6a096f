use std::path::PathBuf;
use std::sync::Once;

use pretty_assertions::assert_eq;
use vibecheck_core::{
    update, CheckOrigin, DownloadProgress, Effect, InstallPolicy, Msg, ReleaseInfo, UpdatePhase,
    UpdateState, UpdateStatus,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(vibecheck_logging::initialize_for_tests);
}

fn release(version: &str) -> ReleaseInfo {
    ReleaseInfo {
        version: version.to_string(),
        url: format!("https://updates.example.com/VibeCheck-{version}.exe"),
        sha256: None,
        notes: None,
    }
}

fn checking(state: UpdateState) -> UpdateState {
    let (state, _) = update(
        state,
        Msg::CheckRequested {
            origin: CheckOrigin::User,
        },
    );
    state
}

fn downloaded(version: &str) -> UpdateState {
    let state = checking(UpdateState::new("1.0.0"));
    let (state, _) = update(
        state,
        Msg::CheckCompleted {
            latest: release(version),
        },
    );
    let (state, _) = update(state, Msg::DownloadAnswered { accepted: true });
    let (state, _) = update(
        state,
        Msg::DownloadCompleted {
            artifact: PathBuf::from("/tmp/VibeCheck-setup.exe"),
        },
    );
    state
}

fn has_prompt(effects: &[Effect]) -> bool {
    effects.iter().any(|effect| {
        matches!(
            effect,
            Effect::PromptDownload { .. } | Effect::PromptInstall { .. }
        )
    })
}

#[test]
fn check_request_moves_idle_to_checking_and_fetches() {
    init_logging();
    let (mut state, effects) = update(
        UpdateState::new("1.0.0"),
        Msg::CheckRequested {
            origin: CheckOrigin::Timer,
        },
    );

    assert_eq!(
        *state.phase(),
        UpdatePhase::Checking {
            origin: CheckOrigin::Timer
        }
    );
    assert_eq!(state.view().status, UpdateStatus::Checking);
    assert_eq!(
        effects,
        vec![
            Effect::Notify("Checking for updates...".to_string()),
            Effect::FetchManifest,
        ]
    );
    assert!(state.consume_dirty());
}

#[test]
fn no_newer_version_reports_not_available_then_idles() {
    init_logging();
    let state = checking(UpdateState::new("1.2.0"));
    let (state, effects) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.2.0"),
        },
    );

    assert_eq!(*state.phase(), UpdatePhase::Idle);
    assert_eq!(state.view().status, UpdateStatus::NotAvailable);
    assert!(!has_prompt(&effects));
    assert_eq!(
        effects,
        vec![Effect::Notify("VibeCheck is up to date (v1.2.0).".to_string())]
    );
}

#[test]
fn newer_version_waits_for_confirmation_before_downloading() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let (state, effects) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.1.0"),
        },
    );

    assert_eq!(
        *state.phase(),
        UpdatePhase::Available {
            release: release("1.1.0")
        }
    );
    assert!(effects.contains(&Effect::PromptDownload {
        release: release("1.1.0")
    }));
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::StartDownload { .. })));

    // Progress before confirmation is ignored.
    let (state, effects) = update(
        state,
        Msg::DownloadProgressed(DownloadProgress::new(10, Some(100))),
    );
    assert!(effects.is_empty());

    let (state, effects) = update(state, Msg::DownloadAnswered { accepted: true });
    assert!(matches!(state.phase(), UpdatePhase::Downloading { .. }));
    assert!(effects.contains(&Effect::StartDownload {
        release: release("1.1.0")
    }));
}

#[test]
fn declined_download_returns_to_idle_without_effects_beyond_notice() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let (state, _) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.1.0"),
        },
    );
    let (state, effects) = update(state, Msg::DownloadAnswered { accepted: false });

    assert_eq!(*state.phase(), UpdatePhase::Idle);
    assert_eq!(
        effects,
        vec![Effect::Notify("Update v1.1.0 was not downloaded.".to_string())]
    );
}

#[test]
fn check_while_checking_is_a_noop() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let before = state.clone();

    let (state, effects) = update(
        state,
        Msg::CheckRequested {
            origin: CheckOrigin::Timer,
        },
    );
    assert_eq!(state, before);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::CheckRequested {
            origin: CheckOrigin::User,
        },
    );
    assert_eq!(state, before);
    assert!(effects.is_empty());
}

#[test]
fn check_while_downloading_is_a_noop() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let (state, _) = update(
        state,
        Msg::CheckCompleted {
            latest: release("2.0.0"),
        },
    );
    let (state, _) = update(state, Msg::DownloadAnswered { accepted: true });
    let before = state.clone();

    let (state, effects) = update(
        state,
        Msg::CheckRequested {
            origin: CheckOrigin::Timer,
        },
    );
    assert_eq!(state, before);
    assert!(effects.is_empty());
}

#[test]
fn download_progress_is_forwarded_and_reflected_in_status() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let (state, _) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.5.0"),
        },
    );
    let (state, _) = update(state, Msg::DownloadAnswered { accepted: true });
    let progress = DownloadProgress::new(512, Some(1024));
    let (state, effects) = update(state, Msg::DownloadProgressed(progress));

    assert_eq!(effects, vec![Effect::Progress(progress)]);
    assert_eq!(state.view().status, UpdateStatus::Downloading(progress));
    assert_eq!(state.view().status_line(), "Downloading update v1.5.0: 50%");
}

#[test]
fn completed_download_prompts_for_install() {
    init_logging();
    let state = downloaded("1.3.0");

    assert!(matches!(state.phase(), UpdatePhase::Downloaded { .. }));
    assert_eq!(state.view().status, UpdateStatus::Downloaded);
}

#[test]
fn accepted_install_restarts_now() {
    init_logging();
    let state = downloaded("1.3.0");
    let (state, effects) = update(state, Msg::InstallAnswered { accepted: true });

    assert_eq!(
        *state.phase(),
        UpdatePhase::Installing {
            version: "1.3.0".to_string()
        }
    );
    assert!(effects.contains(&Effect::Install {
        artifact: PathBuf::from("/tmp/VibeCheck-setup.exe"),
        policy: InstallPolicy::RestartNow,
    }));
}

#[test]
fn declined_install_is_applied_on_quit() {
    init_logging();
    let state = downloaded("1.3.0");
    let (state, effects) = update(state, Msg::InstallAnswered { accepted: false });

    assert_eq!(*state.phase(), UpdatePhase::Idle);
    assert!(state.view().pending_install);
    assert_eq!(
        effects,
        vec![Effect::Notify(
            "Update v1.3.0 will be installed when you quit.".to_string()
        )]
    );

    let (state, effects) = update(state, Msg::QuitRequested);
    assert_eq!(
        effects,
        vec![Effect::Install {
            artifact: PathBuf::from("/tmp/VibeCheck-setup.exe"),
            policy: InstallPolicy::OnQuit,
        }]
    );
    assert!(state.pending().is_none());
}

#[test]
fn pending_update_is_not_offered_again() {
    init_logging();
    let state = downloaded("1.3.0");
    let (state, _) = update(state, Msg::InstallAnswered { accepted: false });
    let state = checking(state);
    let (state, effects) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.3.0"),
        },
    );

    assert_eq!(*state.phase(), UpdatePhase::Idle);
    assert!(!has_prompt(&effects));
    assert!(state.pending().is_some());
}

#[test]
fn quit_without_pending_update_does_nothing() {
    init_logging();
    let (state, effects) = update(UpdateState::new("1.0.0"), Msg::QuitRequested);
    assert!(effects.is_empty());
    assert_eq!(*state.phase(), UpdatePhase::Idle);
}

#[test]
fn failures_return_to_idle_and_surface_error() {
    init_logging();
    let state = checking(UpdateState::new("1.0.0"));
    let (state, effects) = update(
        state,
        Msg::CheckFailed {
            message: "feed unreachable".to_string(),
        },
    );
    assert_eq!(*state.phase(), UpdatePhase::Idle);
    assert_eq!(
        state.view().status,
        UpdateStatus::Error("feed unreachable".to_string())
    );
    assert_eq!(
        effects,
        vec![Effect::Notify("Update error: feed unreachable".to_string())]
    );

    let state = checking(state);
    let (state, _) = update(
        state,
        Msg::CheckCompleted {
            latest: release("1.1.0"),
        },
    );
    let (state, _) = update(state, Msg::DownloadAnswered { accepted: true });
    let (state, _) = update(
        state,
        Msg::DownloadFailed {
            message: "checksum mismatch".to_string(),
        },
    );
    assert_eq!(*state.phase(), UpdatePhase::Idle);

    // A fresh check is possible again after an error.
    let state = checking(state);
    assert!(matches!(state.phase(), UpdatePhase::Checking { .. }));
}

#[test]
fn disabled_auto_update_skips_background_checks_only() {
    init_logging();
    let (state, _) = update(UpdateState::new("1.0.0"), Msg::AutoUpdateChanged(false));
    assert!(!state.auto_update());

    for origin in [CheckOrigin::Timer, CheckOrigin::Startup] {
        let (next, effects) = update(state.clone(), Msg::CheckRequested { origin });
        assert_eq!(*next.phase(), UpdatePhase::Idle);
        assert!(effects.is_empty());
    }

    let (state, effects) = update(
        state,
        Msg::CheckRequested {
            origin: CheckOrigin::User,
        },
    );
    assert!(matches!(state.phase(), UpdatePhase::Checking { .. }));
    assert!(effects.contains(&Effect::FetchManifest));
}

#[test]
fn stale_results_are_ignored() {
    init_logging();
    let state = UpdateState::new("1.0.0");
    let (next, effects) = update(
        state.clone(),
        Msg::CheckCompleted {
            latest: release("9.0.0"),
        },
    );
    assert_eq!(next, state);
    assert!(effects.is_empty());

    let (next, effects) = update(
        state.clone(),
        Msg::DownloadCompleted {
            artifact: PathBuf::from("/tmp/x"),
        },
    );
    assert_eq!(next, state);
    assert!(effects.is_empty());
}
