#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use serde_json::Value;

/// Launch a browser with the jsbridge extension and connect to it.
#[derive(Parser, Debug)]
#[command(name = "jsbridge")]
#[command(about = "Launch a browser with the jsbridge extension and connect to it")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// TCP port the extension listens on [default: 24242]
	#[arg(short = 'P', long, value_name = "PORT")]
	pub port: Option<u16>,

	/// Host the extension listens on [default: 127.0.0.1]
	#[arg(long, value_name = "HOST")]
	pub host: Option<String>,

	/// Open the JS console and relax addon compatibility checks
	#[arg(short = 'D', long)]
	pub debug: bool,

	/// Start an interactive shell once the bridge is up
	#[arg(short, long)]
	pub shell: bool,

	/// Line-oriented shell without banner or prompt (implies --shell)
	#[arg(short = 'u', long, visible_alias = "usecode")]
	pub plain: bool,

	/// Browser executable (falls back to JSBRIDGE_BINARY, then PATH)
	#[arg(short, long, value_name = "PATH")]
	pub binary: Option<PathBuf>,

	/// Seconds to wait for the extension listener
	#[arg(long, value_name = "SECS")]
	pub timeout: Option<u64>,

	/// Give up after this many registration attempts
	#[arg(long, value_name = "N")]
	pub max_attempts: Option<u32>,

	/// Addon file to install into the profile (repeatable)
	#[arg(long = "addon", value_name = "PATH")]
	pub addons: Vec<PathBuf>,

	/// Profile preference (repeatable); values parse as JSON scalars, else strings
	#[arg(long = "pref", value_name = "KEY=VALUE", value_parser = parse_pref)]
	pub prefs: Vec<(String, Value)>,

	/// JSON settings file (falls back to JSBRIDGE_SETTINGS_FILE)
	#[arg(long, value_name = "FILE")]
	pub settings: Option<PathBuf>,

	/// Extra arguments passed to the browser
	#[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
	pub args: Vec<String>,
}

/// Parses `key=value` into a preference. Only booleans, numbers, and strings are accepted.
pub fn parse_pref(raw: &str) -> Result<(String, Value), String> {
	let (key, value) = raw
		.split_once('=')
		.ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("empty preference name in '{raw}'"));
	}

	let value = match serde_json::from_str::<Value>(value) {
		Ok(parsed @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => parsed,
		Ok(Value::Null | Value::Array(_) | Value::Object(_)) => {
			return Err(format!("preference '{key}' must be a boolean, number, or string"));
		}
		Err(_) => Value::String(value.to_string()),
	};
	Ok((key.to_string(), value))
}

/// Cargo-like help colours.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}
