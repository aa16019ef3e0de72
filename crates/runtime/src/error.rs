//! Error types for the bridge runtime.

use std::time::Duration;

use jsbridge_protocol::{Endpoint, FrameError};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching, connecting to, or talking to the bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// The remote runtime never opened its listening socket.
	#[error("cannot connect to jsbridge extension on port {} after {}ms", endpoint.port, waited.as_millis())]
	ListenerTimeout { endpoint: Endpoint, waited: Duration },

	/// Registration never completed within the configured attempt or time bound.
	#[error("jsbridge registration did not complete after {attempts} attempt(s) in {}ms", elapsed.as_millis())]
	HandshakeTimeout { attempts: u32, elapsed: Duration },

	/// A channel could not be opened even though the listener was reachable.
	#[error("failed to open channel to {endpoint}: {source}")]
	ConnectionFailed {
		endpoint: Endpoint,
		#[source]
		source: std::io::Error,
	},

	/// No browser executable could be located.
	#[error("browser executable not found. Pass --binary or set JSBRIDGE_BINARY")]
	BrowserNotFound,

	/// Failed to launch the browser process.
	#[error("failed to launch browser: {0}")]
	LaunchFailed(String),

	/// Transport-level error on an established channel.
	#[error("transport error: {0}")]
	TransportError(String),

	/// Malformed message from the remote side.
	#[error("protocol error: {0}")]
	ProtocolError(String),

	/// The channel was closed while a request was outstanding.
	#[error("channel closed unexpectedly")]
	ChannelClosed,

	/// The remote side raised an exception while evaluating a request.
	#[error("remote exception: {message}")]
	Remote { message: String },

	/// Timeout waiting for a reply or event.
	#[error("timeout: {0}")]
	Timeout(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl From<FrameError> for Error {
	fn from(err: FrameError) -> Self {
		Error::ProtocolError(err.to_string())
	}
}

impl Error {
	/// Returns true for errors that abort the bootstrap sequence.
	pub fn is_fatal_bootstrap(&self) -> bool {
		matches!(
			self,
			Error::ListenerTimeout { .. }
				| Error::HandshakeTimeout { .. }
				| Error::ConnectionFailed { .. }
				| Error::BrowserNotFound
				| Error::LaunchFailed(_)
		)
	}
}
