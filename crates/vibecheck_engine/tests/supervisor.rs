use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use vibecheck_engine::{
    LaunchMode, ProcessSupervisor, ServiceProcessState, SidecarLaunch, SidecarStream,
    SupervisorError, SupervisorEvent, APP_DIR_ENV,
};

fn init_logging() {
    vibecheck_logging::initialize_for_tests();
}

fn drain(rx: &mut UnboundedReceiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[SupervisorEvent]) -> Vec<ServiceProcessState> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::StateChanged(state) => Some(state.clone()),
            SupervisorEvent::Output { .. } => None,
        })
        .collect()
}

async fn wait_for_state<F>(supervisor: &ProcessSupervisor, predicate: F) -> ServiceProcessState
where
    F: Fn(&ServiceProcessState) -> bool,
{
    let mut rx = supervisor.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| predicate(state)))
        .await
        .expect("state change in time")
        .expect("supervisor alive")
        .clone();
    state
}

#[tokio::test]
async fn missing_executable_fails_and_never_runs() {
    init_logging();
    let (mut supervisor, mut rx) = ProcessSupervisor::new();
    let launch = SidecarLaunch::new("/definitely/not/here/vibecheck-service");

    let err = supervisor.start(&launch).unwrap_err();
    assert!(matches!(err, SupervisorError::ExecutableNotFound(_)));
    assert!(matches!(supervisor.state(), ServiceProcessState::Failed(_)));

    let seen = states(&drain(&mut rx));
    assert_eq!(seen.first(), Some(&ServiceProcessState::Starting));
    assert!(!seen.contains(&ServiceProcessState::Running));
    assert!(matches!(seen.last(), Some(ServiceProcessState::Failed(_))));
}

#[test]
fn packaged_mode_requires_bundled_executable() {
    let temp = tempfile::TempDir::new().unwrap();
    let mode = LaunchMode::Packaged {
        resource_dir: temp.path().to_path_buf(),
        executable: PathBuf::from("analysis-service/flask_server"),
    };

    let err = SidecarLaunch::resolve(&mode, Path::new("/opt/vibecheck")).unwrap_err();
    assert_eq!(
        err,
        SupervisorError::ExecutableNotFound(temp.path().join("analysis-service/flask_server"))
    );
}

#[test]
fn development_mode_uses_interpreter_and_injects_environment() {
    let mode = LaunchMode::Development {
        interpreter: "python3".to_string(),
        script: PathBuf::from("/src/service/flask_server.py"),
    };

    let launch = SidecarLaunch::resolve(&mode, Path::new("/opt/vibecheck")).unwrap();
    assert_eq!(launch.executable, PathBuf::from("python3"));
    assert_eq!(launch.args, vec!["/src/service/flask_server.py"]);
    assert!(launch
        .env
        .iter()
        .any(|(key, value)| key == APP_DIR_ENV && value == "/opt/vibecheck"));
    assert!(launch
        .env
        .iter()
        .any(|(key, value)| key == "PYTHONPATH" && value == "/src/service"));
}

#[cfg(unix)]
#[tokio::test]
async fn output_lines_arrive_in_order_per_stream() {
    init_logging();
    let (mut supervisor, mut rx) = ProcessSupervisor::new();
    let launch = SidecarLaunch::new("sh")
        .arg("-c")
        .arg("echo one; echo two; echo oops >&2; echo three; echo \"$VIBECHECK_APP_DIR\"; sleep 30")
        .env(APP_DIR_ENV, "/opt/vibecheck");

    supervisor.start(&launch).unwrap();
    assert_eq!(supervisor.state(), ServiceProcessState::Running);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    while stdout.len() < 4 || stderr.is_empty() {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("output in time")
            .expect("channel open");
        if let SupervisorEvent::Output { stream, line } = event {
            match stream {
                SidecarStream::Stdout => stdout.push(line),
                SidecarStream::Stderr => stderr.push(line),
            }
        }
    }
    assert_eq!(stdout, vec!["one", "two", "three", "/opt/vibecheck"]);
    assert_eq!(stderr, vec!["oops"]);

    supervisor.stop().await;
    assert_eq!(supervisor.state(), ServiceProcessState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn unexpected_exit_is_surfaced_as_failure() {
    init_logging();
    let (mut supervisor, _rx) = ProcessSupervisor::new();
    let launch = SidecarLaunch::new("sh").arg("-c").arg("exit 3");

    supervisor.start(&launch).unwrap();
    let state = wait_for_state(&supervisor, |state| {
        matches!(state, ServiceProcessState::Failed(_))
    })
    .await;
    let ServiceProcessState::Failed(reason) = state else {
        unreachable!()
    };
    assert!(reason.contains("exited unexpectedly"));

    // Stopping after the crash keeps the failure visible.
    supervisor.stop().await;
    assert!(matches!(supervisor.state(), ServiceProcessState::Failed(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn stop_is_idempotent() {
    init_logging();
    let (mut supervisor, _rx) = ProcessSupervisor::new();
    supervisor.stop().await;
    assert_eq!(supervisor.state(), ServiceProcessState::NotStarted);

    let launch = SidecarLaunch::new("sh").arg("-c").arg("sleep 30");
    supervisor.start(&launch).unwrap();
    supervisor.stop().await;
    supervisor.stop().await;
    assert_eq!(supervisor.state(), ServiceProcessState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn second_start_while_running_is_rejected() {
    init_logging();
    let (mut supervisor, _rx) = ProcessSupervisor::new();
    let launch = SidecarLaunch::new("sh").arg("-c").arg("sleep 30");
    supervisor.start(&launch).unwrap();

    assert_eq!(
        supervisor.start(&launch).unwrap_err(),
        SupervisorError::AlreadyRunning
    );
    supervisor.stop().await;
}
