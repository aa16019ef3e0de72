//! Browser process management.
//!
//! Locates a browser executable, prepares a throwaway profile, and launches
//! the browser with the `-jsbridge <port>` flag that makes the extension open
//! its listener.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use jsbridge_protocol::DEFAULT_PORT;
use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Environment variable naming the browser executable.
pub const BINARY_ENV: &str = "JSBRIDGE_BINARY";

/// Preference relaxing addon compatibility checks in debug runs.
const DEBUG_PREFERENCE: &str = "extensions.checkCompatibility";

/// Lifecycle of the external runtime hosting the bridge extension.
#[async_trait]
pub trait Launcher: Send {
	/// Starts the runtime. After this returns it is expected to open the bridge listener.
	async fn start(&mut self) -> Result<()>;

	/// Waits for the runtime to exit on its own.
	async fn wait(&mut self) -> Result<ExitStatus>;

	/// Terminates the runtime. A no-op if it is not running.
	async fn stop(&mut self) -> Result<()>;

	/// Deletes the profile created for this run. A no-op if there is none.
	fn cleanup_profile(&mut self) -> Result<()>;
}

/// How to launch the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
	/// Explicit executable; discovered when `None`.
	pub binary: Option<PathBuf>,
	pub port: u16,
	/// Opens the JS console and relaxes addon compatibility checks.
	pub debug: bool,
	pub preferences: BTreeMap<String, Value>,
	/// Packaged addon files installed into the profile.
	pub addons: Vec<PathBuf>,
	/// Extra arguments appended to the command line.
	pub args: Vec<String>,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self {
			binary: None,
			port: DEFAULT_PORT,
			debug: false,
			preferences: BTreeMap::new(),
			addons: Vec::new(),
			args: Vec::new(),
		}
	}
}

impl LaunchOptions {
	/// Preferences after applying debug-mode overrides.
	pub fn effective_preferences(&self) -> BTreeMap<String, Value> {
		let mut preferences = self.preferences.clone();
		if self.debug {
			preferences.insert(DEBUG_PREFERENCE.to_string(), Value::Bool(false));
		}
		preferences
	}

	/// Command-line arguments for a browser using `profile`.
	pub fn command_args(&self, profile: &Path) -> Vec<String> {
		let mut args = vec![
			"-profile".to_string(),
			profile.display().to_string(),
			"-no-remote".to_string(),
		];
		if self.debug {
			args.push("-jsconsole".to_string());
		}
		args.push("-jsbridge".to_string());
		args.push(self.port.to_string());
		args.extend(self.args.iter().cloned());
		args
	}
}

/// Launches a browser binary as a child process.
#[derive(Debug)]
pub struct BrowserRunner {
	options: LaunchOptions,
	binary: PathBuf,
	profile: Option<Profile>,
	child: Option<Child>,
}

impl BrowserRunner {
	/// Resolves the browser executable; fails with [`Error::BrowserNotFound`].
	pub fn new(options: LaunchOptions) -> Result<Self> {
		let binary = find_browser_executable(options.binary.as_deref())?;
		Ok(Self {
			options,
			binary,
			profile: None,
			child: None,
		})
	}

	pub fn binary(&self) -> &Path {
		&self.binary
	}

	pub fn options(&self) -> &LaunchOptions {
		&self.options
	}

	pub fn profile_path(&self) -> Option<&Path> {
		self.profile.as_ref().map(Profile::path)
	}

	pub fn is_running(&mut self) -> bool {
		match self.child.as_mut() {
			Some(child) => matches!(child.try_wait(), Ok(None)),
			None => false,
		}
	}
}

#[async_trait]
impl Launcher for BrowserRunner {
	async fn start(&mut self) -> Result<()> {
		if self.child.is_some() {
			return Err(Error::LaunchFailed("browser is already running".to_string()));
		}

		let profile = match self.profile.take() {
			Some(profile) => profile,
			None => Profile::create(&self.options.effective_preferences(), &self.options.addons)?,
		};
		let args = self.options.command_args(profile.path());
		self.profile = Some(profile);

		debug!(target = "jsbridge", binary = %self.binary.display(), ?args, "launching browser");

		let mut cmd = Command::new(&self.binary);
		cmd.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::inherit())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("failed to spawn {}: {e}", self.binary.display())))?;

		tokio::time::sleep(Duration::from_millis(100)).await;

		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(Error::LaunchFailed(format!(
					"browser exited immediately with status: {status}"
				)));
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!(
					"failed to check browser status: {e}"
				)));
			}
		}

		info!(target = "jsbridge", pid = child.id(), port = self.options.port, "browser started");
		self.child = Some(child);
		Ok(())
	}

	async fn wait(&mut self) -> Result<ExitStatus> {
		let child = self
			.child
			.as_mut()
			.ok_or_else(|| Error::LaunchFailed("browser was not started".to_string()))?;
		let status = child.wait().await?;
		self.child = None;
		info!(target = "jsbridge", %status, "browser exited");
		Ok(status)
	}

	async fn stop(&mut self) -> Result<()> {
		let Some(mut child) = self.child.take() else {
			return Ok(());
		};

		if let Err(e) = child.kill().await {
			warn!(target = "jsbridge", error = %e, "failed to kill browser");
		}
		let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
		info!(target = "jsbridge", "browser stopped");
		Ok(())
	}

	fn cleanup_profile(&mut self) -> Result<()> {
		match self.profile.take() {
			Some(profile) => profile.remove(),
			None => Ok(()),
		}
	}
}

/// Finds the browser executable.
///
/// Checked in order:
/// 1. `explicit` (a path, or a command name looked up on `PATH`)
/// 2. the `JSBRIDGE_BINARY` environment variable
/// 3. well-known Firefox commands and install locations
pub fn find_browser_executable(explicit: Option<&Path>) -> Result<PathBuf> {
	if let Some(path) = explicit {
		return resolve_candidate(path).ok_or(Error::BrowserNotFound);
	}

	if let Some(path) = std::env::var_os(BINARY_ENV) {
		return resolve_candidate(Path::new(&path)).ok_or(Error::BrowserNotFound);
	}

	browser_candidates()
		.iter()
		.find_map(|candidate| resolve_candidate(Path::new(candidate)))
		.ok_or(Error::BrowserNotFound)
}

fn resolve_candidate(candidate: &Path) -> Option<PathBuf> {
	if candidate.components().count() > 1 || candidate.is_absolute() {
		return candidate.is_file().then(|| candidate.to_path_buf());
	}
	which::which(candidate).ok()
}

fn browser_candidates() -> Vec<String> {
	let candidates: &[&str] = if cfg!(target_os = "macos") {
		&[
			"/Applications/Firefox.app/Contents/MacOS/firefox",
			"/Applications/Firefox Developer Edition.app/Contents/MacOS/firefox",
			"/Applications/Firefox Nightly.app/Contents/MacOS/firefox",
			"firefox",
		]
	} else if cfg!(target_os = "windows") {
		&[
			r"C:\Program Files\Mozilla Firefox\firefox.exe",
			r"C:\Program Files (x86)\Mozilla Firefox\firefox.exe",
			"firefox.exe",
		]
	} else {
		&[
			"firefox",
			"firefox-esr",
			"firefox-bin",
			"iceweasel",
			"/usr/bin/firefox",
			"/usr/lib/firefox/firefox",
			"/snap/bin/firefox",
		]
	};
	candidates.iter().map(|c| c.to_string()).collect()
}
