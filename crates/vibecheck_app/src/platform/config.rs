//! Host configuration: built-in defaults overlaid with `VIBECHECK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use vibecheck_engine::{default_interpreter, GatewaySettings, LaunchMode};
use vibecheck_logging::{host_info, host_warn};

pub const DEFAULT_FEED_URL: &str = "https://downloads.vibecheck.app/releases/latest.json";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

const SERVICE_SCRIPT: &str = "flask_server.py";
const SERVICE_EXECUTABLE: &str = if cfg!(windows) {
    "vibecheck-service.exe"
} else {
    "vibecheck-service"
};

pub const ENV_PORT: &str = "VIBECHECK_PORT";
pub const ENV_FEED_URL: &str = "VIBECHECK_FEED_URL";
pub const ENV_DEV: &str = "VIBECHECK_DEV";
pub const ENV_SERVICE_SCRIPT: &str = "VIBECHECK_SERVICE_SCRIPT";
pub const ENV_RESOURCES: &str = "VIBECHECK_RESOURCES";
pub const ENV_SINGLE_UPLOAD: &str = "VIBECHECK_SINGLE_UPLOAD";

/// How many analyses may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    #[default]
    Unbounded,
    /// A second concurrent request is refused with `Busy`.
    SingleSlot,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Installation directory, handed to the service as `VIBECHECK_APP_DIR`.
    pub app_dir: PathBuf,
    pub launch_mode: LaunchMode,
    pub gateway: GatewaySettings,
    pub feed_url: String,
    pub staging_dir: PathBuf,
    /// `None` keeps preferences in memory only.
    pub preferences_dir: Option<PathBuf>,
    pub check_interval: Duration,
    pub admission: AdmissionPolicy,
    pub current_version: String,
}

impl HostConfig {
    pub fn defaults(app_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        let launch_mode = if cfg!(debug_assertions) {
            development_mode(&app_dir)
        } else {
            packaged_mode(&app_dir)
        };
        let staging_dir = dirs::cache_dir()
            .map(|dir| dir.join("vibecheck").join("updates"))
            .unwrap_or_else(|| std::env::temp_dir().join("vibecheck-updates"));

        Self {
            launch_mode,
            gateway: GatewaySettings::default(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            staging_dir,
            preferences_dir: dirs::config_dir().map(|dir| dir.join("vibecheck")),
            check_interval: DEFAULT_CHECK_INTERVAL,
            admission: AdmissionPolicy::default(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            app_dir,
        }
    }

    /// Defaults for the running executable with the process environment applied.
    pub fn from_env() -> Self {
        let app_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::defaults(app_dir);
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Applies environment overrides. Values that do not parse are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = lookup(ENV_PORT) {
            match raw.parse::<u16>() {
                Ok(port) if port != 0 => {
                    self.gateway.base_url = GatewaySettings::for_port(port).base_url;
                }
                _ => host_warn!("Ignoring {}={:?}: not a valid port", ENV_PORT, raw),
            }
        }

        if let Some(url) = lookup(ENV_FEED_URL) {
            if url.starts_with("http://") || url.starts_with("https://") {
                self.feed_url = url;
            } else {
                host_warn!("Ignoring {}={:?}: not an http(s) URL", ENV_FEED_URL, url);
            }
        }

        if let Some(raw) = lookup(ENV_DEV) {
            match parse_flag(&raw) {
                Some(true) => self.launch_mode = development_mode(&self.app_dir),
                Some(false) => self.launch_mode = packaged_mode(&self.app_dir),
                None => host_warn!("Ignoring {}={:?}: expected a boolean", ENV_DEV, raw),
            }
        }

        if let Some(script) = lookup(ENV_SERVICE_SCRIPT) {
            match &mut self.launch_mode {
                LaunchMode::Development { script: current, .. } => *current = script.into(),
                LaunchMode::Packaged { .. } => {
                    host_warn!("Ignoring {}: not in development mode", ENV_SERVICE_SCRIPT)
                }
            }
        }

        if let Some(resources) = lookup(ENV_RESOURCES) {
            match &mut self.launch_mode {
                LaunchMode::Packaged { resource_dir, .. } => *resource_dir = resources.into(),
                LaunchMode::Development { .. } => {
                    host_warn!("Ignoring {}: not in packaged mode", ENV_RESOURCES)
                }
            }
        }

        if let Some(raw) = lookup(ENV_SINGLE_UPLOAD) {
            match parse_flag(&raw) {
                Some(true) => self.admission = AdmissionPolicy::SingleSlot,
                Some(false) => self.admission = AdmissionPolicy::Unbounded,
                None => host_warn!("Ignoring {}={:?}: expected a boolean", ENV_SINGLE_UPLOAD, raw),
            }
        }

        host_info!(
            "Host config: service={} launch={:?} admission={:?}",
            self.gateway.base_url,
            self.launch_mode,
            self.admission
        );
    }
}

fn development_mode(app_dir: &Path) -> LaunchMode {
    LaunchMode::Development {
        interpreter: default_interpreter().to_string(),
        script: app_dir.join(SERVICE_SCRIPT),
    }
}

fn packaged_mode(app_dir: &Path) -> LaunchMode {
    LaunchMode::Packaged {
        resource_dir: app_dir.join("resources"),
        executable: PathBuf::from(SERVICE_EXECUTABLE),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
