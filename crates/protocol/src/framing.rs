//! Newline-delimited JSON framing.
//!
//! Every message occupies exactly one line. Serialized JSON never contains a
//! raw newline, so `\n` is an unambiguous terminator; a trailing `\r` left by
//! CRLF peers is tolerated on decode.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while framing or unframing a line.
#[derive(Debug, Error)]
pub enum FrameError {
	#[error("empty frame")]
	Empty,

	#[error("malformed frame: {0}")]
	Json(#[from] serde_json::Error),
}

/// Serializes `message` into a single `\n`-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, FrameError> {
	let mut line = serde_json::to_string(message)?;
	line.push('\n');
	Ok(line)
}

/// Parses one line (with or without its terminator).
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, FrameError> {
	let trimmed = line.trim_end_matches(['\n', '\r']).trim();
	if trimmed.is_empty() {
		return Err(FrameError::Empty);
	}
	Ok(serde_json::from_str(trimmed)?)
}
