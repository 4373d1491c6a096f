use std::fmt;

use vibecheck_logging::SidecarStream;

/// Lifecycle of the analysis service child process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceProcessState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Failed(String),
    Stopped,
}

impl ServiceProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceProcessState::Running)
    }
}

impl fmt::Display for ServiceProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceProcessState::NotStarted => write!(f, "not started"),
            ServiceProcessState::Starting => write!(f, "starting"),
            ServiceProcessState::Running => write!(f, "running"),
            ServiceProcessState::Failed(reason) => write!(f, "failed: {reason}"),
            ServiceProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    StateChanged(ServiceProcessState),
    /// One line of sidecar output. Lines of a single stream arrive in order.
    Output { stream: SidecarStream, line: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisFailureKind {
    /// The sidecar is not in the `Running` state.
    ServiceNotRunning,
    /// Connection refused, reset, or an unexpected HTTP status.
    ServiceUnreachable,
    Timeout,
    /// The response was not the expected JSON shape.
    InvalidResponse,
    /// The sidecar answered but declined to analyze the file.
    Rejected,
    FileAccess,
    /// Another analysis is already running and the single-slot guard is on.
    Busy,
    TooLarge,
}

impl fmt::Display for AnalysisFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisFailureKind::ServiceNotRunning => "service not running",
            AnalysisFailureKind::ServiceUnreachable => "service unreachable",
            AnalysisFailureKind::Timeout => "timeout",
            AnalysisFailureKind::InvalidResponse => "invalid response",
            AnalysisFailureKind::Rejected => "rejected",
            AnalysisFailureKind::FileAccess => "file access",
            AnalysisFailureKind::Busy => "busy",
            AnalysisFailureKind::TooLarge => "too large",
        };
        f.write_str(label)
    }
}

/// Normalized outcome of one analysis upload. Transport errors never escape as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    Success {
        report_path: String,
    },
    Failure {
        kind: AnalysisFailureKind,
        error_message: String,
    },
}

impl AnalysisResult {
    pub fn success(report_path: impl Into<String>) -> Self {
        AnalysisResult::Success {
            report_path: report_path.into(),
        }
    }

    pub fn failure(kind: AnalysisFailureKind, error_message: impl Into<String>) -> Self {
        AnalysisResult::Failure {
            kind,
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }

    pub fn report_path(&self) -> Option<&str> {
        match self {
            AnalysisResult::Success { report_path } => Some(report_path),
            AnalysisResult::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AnalysisResult::Success { .. } => None,
            AnalysisResult::Failure { error_message, .. } => Some(error_message),
        }
    }

    pub fn failure_kind(&self) -> Option<AnalysisFailureKind> {
        match self {
            AnalysisResult::Success { .. } => None,
            AnalysisResult::Failure { kind, .. } => Some(*kind),
        }
    }
}
