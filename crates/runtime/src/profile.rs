//! Throwaway browser profiles.
//!
//! A profile is a temporary directory holding a `user.js` preference file and
//! an `extensions/` directory with the addon files to install. Removing the
//! profile deletes the directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Temporary profile directory owned by one browser run.
#[derive(Debug)]
pub struct Profile {
	dir: TempDir,
}

impl Profile {
	/// Creates a profile with `preferences` written to `user.js` and `addons` copied in.
	pub fn create(preferences: &BTreeMap<String, Value>, addons: &[PathBuf]) -> Result<Self> {
		let dir = tempfile::Builder::new().prefix("jsbridge-profile-").tempdir()?;

		let mut user_js = String::new();
		for (key, value) in preferences {
			user_js.push_str(&format_pref(key, value)?);
			user_js.push('\n');
		}
		fs::write(dir.path().join("user.js"), user_js)?;

		let extensions = dir.path().join("extensions");
		fs::create_dir_all(&extensions)?;
		for addon in addons {
			install_addon(addon, &extensions)?;
		}

		debug!(target = "jsbridge", path = %dir.path().display(), "profile created");
		Ok(Self { dir })
	}

	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	/// Deletes the profile directory.
	pub fn remove(self) -> Result<()> {
		let path = self.dir.path().to_path_buf();
		self.dir.close()?;
		debug!(target = "jsbridge", path = %path.display(), "profile removed");
		Ok(())
	}
}

/// Renders one `user_pref(...)` line. Values must be booleans, numbers, or strings.
fn format_pref(key: &str, value: &Value) -> Result<String> {
	let rendered = match value {
		Value::Bool(_) | Value::Number(_) | Value::String(_) => serde_json::to_string(value)?,
		other => {
			return Err(Error::LaunchFailed(format!(
				"preference '{key}' must be a boolean, number, or string, got {other}"
			)));
		}
	};
	Ok(format!("user_pref({}, {rendered});", serde_json::to_string(key)?))
}

fn install_addon(addon: &Path, extensions: &Path) -> Result<()> {
	if !addon.is_file() {
		warn!(target = "jsbridge", addon = %addon.display(), "addon is not a packaged file");
		return Err(Error::LaunchFailed(format!(
			"addon {} is not a packaged .xpi file",
			addon.display()
		)));
	}
	let Some(name) = addon.file_name() else {
		return Err(Error::LaunchFailed(format!("addon {} has no file name", addon.display())));
	};
	fs::copy(addon, extensions.join(name))?;
	Ok(())
}
