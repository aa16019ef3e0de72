//! Settings file loading and merging with command-line flags.
//!
//! Every value is resolved as: command-line flag, then settings file, then
//! the built-in default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsbridge_runtime::{DEFAULT_CALL_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT, Endpoint, HandshakeConfig, LaunchOptions};
use serde::Deserialize;
use serde_json::Value;

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::shell::ShellKind;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "JSBRIDGE_SETTINGS_FILE";

/// Contents of a JSON settings file. Every field is optional.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	pub host: Option<String>,
	pub port: Option<u16>,
	pub debug: Option<bool>,
	pub shell: Option<bool>,
	pub plain: Option<bool>,
	pub binary: Option<PathBuf>,
	/// Listener wait, in seconds.
	pub timeout: Option<u64>,
	pub max_attempts: Option<u32>,
	/// Bound on the whole handshake phase, in seconds.
	pub deadline: Option<u64>,
	pub settle_ms: Option<u64>,
	pub retry_backoff_ms: Option<u64>,
	/// Per-call bridge timeout, in seconds.
	pub call_timeout: Option<u64>,
	pub addons: Vec<PathBuf>,
	pub preferences: BTreeMap<String, Value>,
	pub args: Vec<String>,
}

impl Settings {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|source| CliError::SettingsRead {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&raw).map_err(|source| CliError::SettingsParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Settings file named by `explicit`, else by `JSBRIDGE_SETTINGS_FILE`.
	pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
		explicit
			.map(Path::to_path_buf)
			.or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
	}

	/// Loads the located settings file, or defaults when none is configured.
	pub fn discover(explicit: Option<&Path>) -> Result<Self> {
		match Self::locate(explicit) {
			Some(path) => {
				tracing::debug!(target = "jsbridge", path = %path.display(), "loading settings");
				Self::load(&path)
			}
			None => Ok(Self::default()),
		}
	}
}

/// Fully resolved run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
	pub endpoint: Endpoint,
	pub handshake: HandshakeConfig,
	pub launch: LaunchOptions,
	pub call_timeout: Duration,
	pub shell: Option<ShellKind>,
}

impl RunConfig {
	/// Merges `cli` over `settings` over defaults.
	pub fn resolve(cli: &Cli, settings: Settings) -> Result<Self> {
		let host = cli
			.host
			.clone()
			.or(settings.host)
			.unwrap_or_else(|| DEFAULT_HOST.to_string());
		if host.trim().is_empty() {
			return Err(CliError::Config("host must not be empty".to_string()));
		}
		let port = cli.port.or(settings.port).unwrap_or(DEFAULT_PORT);
		if port == 0 {
			return Err(CliError::Config("port must be non-zero".to_string()));
		}
		let endpoint = Endpoint::new(host, port);

		let mut handshake = HandshakeConfig::default();
		if let Some(secs) = cli.timeout.or(settings.timeout) {
			handshake.connect_timeout = Duration::from_secs(secs);
		}
		if let Some(ms) = settings.settle_ms {
			handshake.settle_delay = Duration::from_millis(ms);
		}
		if let Some(ms) = settings.retry_backoff_ms {
			handshake.retry_backoff = Duration::from_millis(ms);
		}
		handshake.max_attempts = cli.max_attempts.or(settings.max_attempts);
		if handshake.max_attempts == Some(0) {
			return Err(CliError::Config("max attempts must be at least 1".to_string()));
		}
		handshake.deadline = settings.deadline.map(Duration::from_secs);

		let call_timeout = settings
			.call_timeout
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_CALL_TIMEOUT);

		let mut preferences = settings.preferences;
		preferences.extend(cli.prefs.iter().cloned());

		let mut addons = settings.addons;
		addons.extend(cli.addons.iter().cloned());

		let args = if cli.args.is_empty() {
			settings.args
		} else {
			cli.args.clone()
		};

		let launch = LaunchOptions {
			binary: cli.binary.clone().or(settings.binary),
			port,
			debug: cli.debug || settings.debug.unwrap_or(false),
			preferences,
			addons,
			args,
		};

		let plain = cli.plain || settings.plain.unwrap_or(false);
		let shell = cli.shell || settings.shell.unwrap_or(false);
		let shell = ShellKind::select(shell, plain);

		Ok(Self {
			endpoint,
			handshake,
			launch,
			call_timeout,
			shell,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use clap::Parser;
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	fn cli(args: &[&str]) -> Cli {
		let mut argv = vec!["jsbridge"];
		argv.extend_from_slice(args);
		Cli::try_parse_from(argv).unwrap()
	}

	fn write_settings(dir: &TempDir, body: &str) -> PathBuf {
		let path = dir.path().join("jsbridge.json");
		fs::write(&path, body).unwrap();
		path
	}

	#[test]
	fn defaults_without_flags_or_file() {
		let config = RunConfig::resolve(&cli(&[]), Settings::default()).unwrap();

		assert_eq!(config.endpoint, Endpoint::new(DEFAULT_HOST, DEFAULT_PORT));
		assert_eq!(config.handshake, HandshakeConfig::default());
		assert_eq!(config.launch, LaunchOptions::default());
		assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
		assert_eq!(config.shell, None);
	}

	#[test]
	fn settings_file_fills_in_missing_flags() {
		let dir = TempDir::new().unwrap();
		let path = write_settings(
			&dir,
			r#"{
				"port": 5000,
				"debug": true,
				"timeout": 10,
				"max_attempts": 4,
				"deadline": 30,
				"settle_ms": 250,
				"preferences": {"browser.startup.homepage": "about:blank"},
				"addons": ["/opt/jsbridge.xpi"],
				"args": ["about:blank"]
			}"#,
		);
		let settings = Settings::load(&path).unwrap();
		let config = RunConfig::resolve(&cli(&[]), settings).unwrap();

		assert_eq!(config.endpoint.port, 5000);
		assert_eq!(config.launch.port, 5000);
		assert!(config.launch.debug);
		assert_eq!(config.handshake.connect_timeout, Duration::from_secs(10));
		assert_eq!(config.handshake.max_attempts, Some(4));
		assert_eq!(config.handshake.deadline, Some(Duration::from_secs(30)));
		assert_eq!(config.handshake.settle_delay, Duration::from_millis(250));
		assert_eq!(config.launch.addons, vec![PathBuf::from("/opt/jsbridge.xpi")]);
		assert_eq!(config.launch.args, vec!["about:blank"]);
	}

	#[test]
	fn flags_override_the_settings_file() {
		let settings = Settings {
			port: Some(5000),
			host: Some("10.0.0.2".to_string()),
			max_attempts: Some(4),
			preferences: BTreeMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]),
			args: vec!["from-file".to_string()],
			..Settings::default()
		};
		let config = RunConfig::resolve(
			&cli(&["-P", "6000", "--max-attempts", "2", "--pref", "b=3", "--", "from-cli"]),
			settings,
		)
		.unwrap();

		assert_eq!(config.endpoint, Endpoint::new("10.0.0.2", 6000));
		assert_eq!(config.handshake.max_attempts, Some(2));
		assert_eq!(config.launch.preferences.get("a"), Some(&json!(1)));
		assert_eq!(config.launch.preferences.get("b"), Some(&json!(3)));
		assert_eq!(config.launch.args, vec!["from-cli"]);
	}

	#[test]
	fn shell_selection() {
		let none = RunConfig::resolve(&cli(&[]), Settings::default()).unwrap();
		let console = RunConfig::resolve(&cli(&["-s"]), Settings::default()).unwrap();
		let plain = RunConfig::resolve(&cli(&["--plain"]), Settings::default()).unwrap();

		assert_eq!(none.shell, None);
		assert_eq!(console.shell, Some(ShellKind::Console));
		assert_eq!(plain.shell, Some(ShellKind::Plain));
	}

	#[test]
	fn rejects_zero_port_and_zero_attempts() {
		let err = RunConfig::resolve(&cli(&["-P", "0"]), Settings::default()).unwrap_err();
		assert!(matches!(err, CliError::Config(_)));

		let err = RunConfig::resolve(&cli(&["--max-attempts", "0"]), Settings::default()).unwrap_err();
		assert!(err.to_string().contains("at least 1"));
	}

	#[test]
	fn unknown_settings_keys_are_rejected() {
		let dir = TempDir::new().unwrap();
		let path = write_settings(&dir, r#"{"prot": 5000}"#);
		let err = Settings::load(&path).unwrap_err();
		assert!(matches!(err, CliError::SettingsParse { .. }));
	}

	#[test]
	fn missing_settings_file_is_a_read_error() {
		let dir = TempDir::new().unwrap();
		let err = Settings::load(&dir.path().join("absent.json")).unwrap_err();
		assert!(matches!(err, CliError::SettingsRead { .. }));
	}

	#[test]
	fn explicit_settings_path_wins_over_environment() {
		let path = PathBuf::from("/explicit/settings.json");
		assert_eq!(Settings::locate(Some(&path)), Some(path));
	}
}
