use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("failed to read settings file {path}")]
	SettingsRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("malformed settings file {path}")]
	SettingsParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("interrupted before the bridge came up")]
	Interrupted,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Runtime(#[from] jsbridge_runtime::Error),
}

impl CliError {
	/// One-line hint printed under the error, if any applies.
	pub fn hint(&self) -> Option<&'static str> {
		match self {
			CliError::Runtime(jsbridge_runtime::Error::BrowserNotFound) => {
				Some("install Firefox, or point --binary / JSBRIDGE_BINARY at the executable")
			}
			CliError::Runtime(jsbridge_runtime::Error::ListenerTimeout { .. }) => {
				Some("is the jsbridge extension installed? pass it with --addon")
			}
			CliError::Runtime(jsbridge_runtime::Error::HandshakeTimeout { .. }) => {
				Some("raise --max-attempts or drop it to retry until registration succeeds")
			}
			CliError::Runtime(err) if err.is_fatal_bootstrap() => {
				Some("the browser was stopped and its temporary profile removed")
			}
			CliError::SettingsParse { .. } => Some("settings must be a JSON object; see --help"),
			_ => None,
		}
	}

	/// Full message including the source chain.
	pub fn report(&self) -> String {
		let mut message = self.to_string();
		let mut source = std::error::Error::source(self);
		while let Some(cause) = source {
			let text = cause.to_string();
			if !message.contains(&text) {
				message.push_str(": ");
				message.push_str(&text);
			}
			source = cause.source();
		}
		message
	}
}
