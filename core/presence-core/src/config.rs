//! Daemon configuration.
//!
//! Loaded from `~/.presenced/config.toml` (or an explicit path). A missing file
//! yields the defaults below, which target VITURE Pro XR glasses and the
//! SpaceWalker app on macOS. Every section and field may be omitted.

use crate::command::CommandSpec;
use crate::error::{PresenceError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".presenced";
const CONFIG_FILE: &str = "config.toml";

/// Returns the default config file path (`~/.presenced/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Loads the config from `path`, or from the default location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(DaemonConfig::default()),
        },
    };

    if !config_path.exists() {
        return Ok(DaemonConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| PresenceError::Io {
        context: format!("reading config {}", config_path.display()),
        source,
    })?;
    toml::from_str::<DaemonConfig>(&content).map_err(|err| PresenceError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Display reconfiguration notifications, falling back to polling when
    /// the platform has none.
    #[default]
    Event,
    Poll,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub mode: SourceMode,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Substring markers and the inventory commands they are matched against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub product_marker: String,
    pub brand_marker: String,
    pub online_marker: String,
    pub usb_command: CommandSpec,
    pub display_command: CommandSpec,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            product_marker: "VITURE Pro XR Glasses".to_string(),
            brand_marker: "VITURE".to_string(),
            online_marker: "Online: Yes".to_string(),
            usb_command: CommandSpec::new("/usr/sbin/ioreg", ["-r", "-d0", "-c", "IOUSBDevice"]),
            display_command: CommandSpec::new("/usr/sbin/system_profiler", ["SPDisplaysDataType"]),
        }
    }
}

/// All intervals are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_debounce_ms: u64,
    pub disconnect_debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub restart_settle_ms: u64,
    /// Delay between confirming a connect and starting the application, so
    /// the new display finishes configuring first.
    pub connect_launch_delay_ms: u64,
    pub query_timeout_ms: u64,
    pub control_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_debounce_ms: 1_000,
            disconnect_debounce_ms: 1_000,
            poll_interval_ms: 2_000,
            restart_settle_ms: 2_000,
            connect_launch_delay_ms: 2_000,
            query_timeout_ms: 10_000,
            control_timeout_ms: 30_000,
        }
    }
}

impl TimingConfig {
    pub fn connect_debounce(&self) -> Duration {
        Duration::from_millis(self.connect_debounce_ms)
    }

    pub fn disconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.disconnect_debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn connect_launch_delay(&self) -> Duration {
        Duration::from_millis(self.connect_launch_delay_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

/// How to find, identify, and control the managed application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub install_path: PathBuf,
    /// Matched against process names and arguments.
    pub process_identity: String,
    pub interpreter: String,
    /// Checked in order; the first that exists is used.
    pub control_scripts: Vec<PathBuf>,
    /// Run to start the application when no control script exists. Cannot
    /// pass the session config.
    pub launch_command: Option<CommandSpec>,
    /// Run to stop the application when no control script exists.
    pub quit_command: Option<CommandSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut control_scripts = vec![PathBuf::from("/usr/local/bin/spacewalker_control.sh")];
        if let Some(home) = dirs::home_dir() {
            control_scripts.push(home.join(CONFIG_DIR).join("spacewalker_control.sh"));
        }
        control_scripts.push(PathBuf::from("./spacewalker_control.sh"));

        Self {
            install_path: PathBuf::from("/Applications/SpaceWalker.app"),
            process_identity: "SpaceWalker".to_string(),
            interpreter: "/bin/bash".to_string(),
            control_scripts,
            launch_command: Some(CommandSpec::new(
                "/usr/bin/open",
                ["-a", "/Applications/SpaceWalker.app"],
            )),
            quit_command: Some(CommandSpec::new("/usr/bin/pkill", ["-x", "SpaceWalker"])),
        }
    }
}

/// Display layout handed to the control script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Layout(String);

impl Layout {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn three_wide() -> Self {
        Self::new("threewide")
    }

    pub fn as_arg(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Refresh rate in Hz, rendered as `120hz` on the control script command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RefreshRate(u32);

impl RefreshRate {
    pub fn hz(hz: u32) -> Self {
        Self(hz)
    }

    pub fn as_arg(&self) -> String {
        format!("{}hz", self.0)
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Parameters the managed application is started with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub layout: Layout,
    pub refresh_rate: RefreshRate,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layout: Layout::three_wide(),
            refresh_rate: RefreshRate::hz(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            lock_file: tmp.join("presenced.lock"),
            log_file: tmp.join("presenced.log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(&path)).expect("load config");

        assert_eq!(config.mode, SourceMode::Event);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.detection.online_marker, "Online: Yes");
    }

    #[test]
    fn load_config_overrides_individual_fields() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
mode = "poll"

[detection]
brand_marker = "XREAL"

[detection.usb_command]
program = "lsusb"

[timing]
poll_interval_ms = 500

[session]
layout = "sidebyside"
refresh_rate = 90

[app]
control_scripts = ["/opt/control.sh"]

[app.launch_command]
program = "/usr/bin/open"
args = ["-a", "/opt/SpaceWalker.app"]
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.mode, SourceMode::Poll);
        assert_eq!(config.detection.brand_marker, "XREAL");
        assert_eq!(config.detection.product_marker, "VITURE Pro XR Glasses");
        assert_eq!(config.detection.usb_command.program, "lsusb");
        assert!(config.detection.usb_command.args.is_empty());
        assert_eq!(config.timing.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.timing.connect_debounce(), Duration::from_secs(1));
        assert_eq!(config.timing.connect_launch_delay(), Duration::from_secs(2));
        assert_eq!(config.session.layout.as_arg(), "sidebyside");
        assert_eq!(config.session.refresh_rate.as_arg(), "90hz");
        assert_eq!(config.app.control_scripts, vec![PathBuf::from("/opt/control.sh")]);
        assert_eq!(config.app.process_identity, "SpaceWalker");
        assert_eq!(
            config.app.launch_command,
            Some(CommandSpec::new("/usr/bin/open", ["-a", "/opt/SpaceWalker.app"]))
        );
        assert_eq!(config.app.quit_command, AppConfig::default().quit_command);
    }

    #[test]
    fn load_config_rejects_malformed_toml() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "mode = [").expect("write config");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, PresenceError::ConfigMalformed { .. }));
    }

    #[test]
    fn default_session_renders_script_arguments() {
        let session = SessionConfig::default();
        assert_eq!(session.layout.as_arg(), "threewide");
        assert_eq!(session.refresh_rate.as_arg(), "120hz");
    }
}
