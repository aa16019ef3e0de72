//! Addressing types shared by the runtime and the CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host the browser extension binds its listener to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port handed to the browser as `-jsbridge <port>` unless overridden.
pub const DEFAULT_PORT: u16 = 24242;

/// TCP address of the bridge listener opened by the remote runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
		}
	}

	/// Loopback endpoint on `port`.
	pub fn local(port: u16) -> Self {
		Self::new(DEFAULT_HOST, port)
	}
}

impl Default for Endpoint {
	fn default() -> Self {
		Self::local(DEFAULT_PORT)
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.host.contains(':') {
			write!(f, "[{}]:{}", self.host, self.port)
		} else {
			write!(f, "{}:{}", self.host, self.port)
		}
	}
}

/// Which side of the bridge a socket plays.
///
/// The extension keeps one socket of each kind per client and routes
/// asynchronous notifications to the back channel only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
	/// Command channel carrying evaluation requests.
	Bridge,
	/// Event channel carrying notifications, including registration.
	#[serde(rename = "backchannel")]
	BackChannel,
}

impl ChannelKind {
	pub fn as_str(self) -> &'static str {
		match self {
			ChannelKind::Bridge => "bridge",
			ChannelKind::BackChannel => "backchannel",
		}
	}
}

impl fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_endpoint_is_loopback_24242() {
		let endpoint = Endpoint::default();
		assert_eq!(endpoint.host, "127.0.0.1");
		assert_eq!(endpoint.port, 24242);
		assert_eq!(endpoint.to_string(), "127.0.0.1:24242");
	}

	#[test]
	fn ipv6_hosts_are_bracketed() {
		assert_eq!(Endpoint::new("::1", 9000).to_string(), "[::1]:9000");
	}

	#[test]
	fn channel_kind_wire_names() {
		assert_eq!(
			serde_json::to_string(&ChannelKind::BackChannel).unwrap(),
			"\"backchannel\""
		);
		assert_eq!(serde_json::to_string(&ChannelKind::Bridge).unwrap(), "\"bridge\"");
		assert_eq!(ChannelKind::BackChannel.to_string(), "backchannel");
	}
}
