#![deny(missing_docs)]
//! Shared logging utilities for the host workspace.
//!
//! This crate provides the `host_*` logging macros used across the codebase,
//! the sink that sidecar process output is forwarded into, and a minimal test
//! initializer for the global logger.

use std::fmt;

#[doc(hidden)]
pub use log;

/// Log target used for lines captured from the analysis service process.
pub const SIDECAR_TARGET: &str = "sidecar";

/// Which pipe of the sidecar process a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SidecarStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for SidecarStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidecarStream::Stdout => write!(f, "stdout"),
            SidecarStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Forwards one line of sidecar output to the diagnostics log.
///
/// Stdout goes out at info level and stderr at warn level, both under the
/// [`SIDECAR_TARGET`] target so they can be filtered separately from host logs.
pub fn sidecar_line(stream: SidecarStream, line: &str) {
    if let Some((level, message)) = sidecar_record(stream, line) {
        log::log!(target: SIDECAR_TARGET, level, "{message}");
    }
}

/// Level and text for one sidecar line, or `None` when there is nothing to log.
fn sidecar_record(stream: SidecarStream, line: &str) -> Option<(log::Level, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }
    let level = match stream {
        SidecarStream::Stdout => log::Level::Info,
        SidecarStream::Stderr => log::Level::Warn,
    };
    Some((level, format!("[{stream}] {line}")))
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! host_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! host_info {
    ($($arg:tt)*) => {{
        $crate::log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! host_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! host_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! host_error {
    ($($arg:tt)*) => {{
        $crate::log::error!($($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
