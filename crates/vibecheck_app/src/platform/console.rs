//! Line-oriented terminal front end.
//!
//! One reader task owns stdin. A line goes to the open prompt when it is an
//! answer to it, otherwise it is parsed as a command. Prompts are asked one at
//! a time in the order they were raised.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use vibecheck_engine::AnalysisResult;
use vibecheck_logging::host_debug;

use super::host::HostOrchestrator;
use super::ui::{FileFilter, Prompt, UiEvent, UiSurface};

struct OpenPrompt {
    reply: oneshot::Sender<String>,
    accepts: fn(&str) -> bool,
}

#[derive(Default)]
pub struct ConsoleSurface {
    open: Mutex<Option<OpenPrompt>>,
    /// Held for the whole of a prompt so a second one waits its turn.
    turn: tokio::sync::Mutex<()>,
}

impl ConsoleSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hands `line` to the open prompt if it answers it. Returns the line back otherwise.
    fn route(&self, line: String) -> Option<String> {
        let Ok(mut slot) = self.open.lock() else {
            return Some(line);
        };
        match slot.take() {
            Some(prompt) if (prompt.accepts)(&line) => match prompt.reply.send(line) {
                Ok(()) => None,
                Err(line) => Some(line),
            },
            Some(prompt) => {
                *slot = Some(prompt);
                Some(line)
            }
            None => Some(line),
        }
    }

    async fn ask(&self, question: &str, accepts: fn(&str) -> bool) -> Option<String> {
        let _turn = self.turn.lock().await;
        let (reply, answer) = oneshot::channel();
        if let Ok(mut slot) = self.open.lock() {
            *slot = Some(OpenPrompt { reply, accepts });
        }
        say(question);
        answer.await.ok()
    }
}

fn any_line(_line: &str) -> bool {
    true
}

fn yes_or_no(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "n" | "no"
    )
}

#[async_trait::async_trait]
impl UiSurface for ConsoleSurface {
    async fn choose_file(&self, filter: FileFilter) -> Option<PathBuf> {
        let patterns: Vec<String> = filter
            .extensions
            .iter()
            .map(|ext| format!("*.{ext}"))
            .collect();
        let answer = self
            .ask(
                &format!(
                    "{} ({}) path, empty to cancel:",
                    filter.name,
                    patterns.join(", ")
                ),
                any_line,
            )
            .await?;
        let trimmed = answer.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    async fn confirm(&self, prompt: Prompt) -> bool {
        let question = format!(
            "== {} ==\n{}\n[y] {} / [n] {}",
            prompt.title, prompt.message, prompt.accept_label, prompt.decline_label
        );
        self.ask(&question, yes_or_no).await.is_some_and(|answer| {
            matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        })
    }

    async fn alert(&self, title: &str, message: &str) {
        eprintln!("!! {title}: {message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Select,
    Info(PathBuf),
    Analyze(PathBuf),
    Check,
    AutoUpdate(bool),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));
    match (word, rest) {
        ("select", "") => Ok(Command::Select),
        ("info", path) if !path.is_empty() => Ok(Command::Info(PathBuf::from(path))),
        ("analyze", path) if !path.is_empty() => Ok(Command::Analyze(PathBuf::from(path))),
        ("check", "") => Ok(Command::Check),
        ("auto", "on") => Ok(Command::AutoUpdate(true)),
        ("auto", "off") => Ok(Command::AutoUpdate(false)),
        ("status", "") => Ok(Command::Status),
        ("help", "") | ("?", "") => Ok(Command::Help),
        ("quit", "") | ("exit", "") => Ok(Command::Quit),
        _ => Err(format!("Unknown command {line:?}. Type `help` for a list.")),
    }
}

const HELP: &str = "\
select           choose a .ide file, show its info and analyze it
info <path>      show name, size and modification time
analyze <path>   send the file to the analysis service
check            check for updates now
auto on|off      enable or disable automatic update checks
status           show service and update status
quit             exit (installs a pending update)";

/// Spawns the stdin reader. Lines not claimed by a prompt come out of the returned channel.
pub fn spawn_reader(surface: Arc<ConsoleSurface>) -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_lines(surface, tx));
    rx
}

async fn read_lines(surface: Arc<ConsoleSurface>, commands: UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(line) = surface.route(line) {
            if commands.send(line).is_err() {
                break;
            }
        }
    }
    host_debug!("Console input closed");
}

/// Prints UI events as they arrive.
pub async fn print_events(mut events: UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UiEvent::UpdateStatus(line) => say(&format!("[update] {line}")),
            UiEvent::UpdateProgress {
                percent,
                bytes_transferred,
                bytes_total,
            } => match bytes_total {
                Some(total) => say(&format!(
                    "[update] {percent}% ({bytes_transferred}/{total} bytes)"
                )),
                None => say(&format!("[update] {bytes_transferred} bytes")),
            },
            UiEvent::ServiceState(state) => say(&format!("[service] {state}")),
        }
    }
}

/// Runs commands until `quit`, end of input, or the host asks to exit.
pub async fn run(host: &HostOrchestrator, mut lines: UnboundedReceiver<String>) {
    let quit = host.quit_token();
    say("VibeCheck is ready. Type `help` for commands.");
    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = quit.cancelled() => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(host, command).await,
            Err(message) => say(&message),
        }
    }
}

async fn execute(host: &HostOrchestrator, command: Command) {
    match command {
        Command::Select => {
            let Some(path) = host.select_file().await else {
                say("No sensor file selected.");
                return;
            };
            show_info(host, &path).await;
            show_result(host.analyze_file(&path).await);
        }
        Command::Info(path) => show_info(host, &path).await,
        Command::Analyze(path) => show_result(host.analyze_file(&path).await),
        Command::Check => host.check_for_updates(),
        Command::AutoUpdate(enabled) => {
            host.set_auto_update(enabled);
            say(&format!(
                "Automatic update checks {}.",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
        Command::Status => {
            say(&format!("[service] {}", host.service_state()));
            if let Some(info) = host.updates().snapshot().await {
                say(&format!("[update] {info}"));
            }
        }
        Command::Help => say(HELP),
        Command::Quit => {}
    }
}

async fn show_info(host: &HostOrchestrator, path: &std::path::Path) {
    match host.get_file_info(path).await {
        Ok(info) => {
            let modified = info
                .last_modified
                .map(|time| time.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            say(&format!(
                "{}: {} bytes, modified {}",
                info.name, info.size, modified
            ));
        }
        Err(err) => say(&format!("Cannot read file: {err}")),
    }
}

fn show_result(result: AnalysisResult) {
    match result {
        AnalysisResult::Success { report_path } => say(&format!("Report ready: {report_path}")),
        AnalysisResult::Failure {
            kind,
            error_message,
        } => say(&format!("Analysis failed ({kind}): {error_message}")),
    }
}

fn say(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{text}");
    let _ = stdout.flush();
}
