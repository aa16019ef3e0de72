//! Channel seams used by the handshake supervisor.
//!
//! The supervisor only needs to open a pair of channels, read the event
//! channel's registration flag, and close both. Anything else the concrete
//! channels can do (evaluating scripts, streaming events) is invisible to it,
//! which keeps the retry logic testable with in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use jsbridge_protocol::Endpoint;

use crate::error::Result;
use crate::registry::SocketRegistry;

/// Event side of the bridge ("back channel").
pub trait EventChannel: Send {
	/// True once the remote side has acknowledged this channel's registration.
	fn is_registered(&self) -> bool;

	/// Releases the socket. Must be idempotent.
	fn close(&mut self);
}

/// Command side of the bridge.
pub trait CommandChannel: Send {
	/// Releases the socket. Must be idempotent.
	fn close(&mut self);
}

/// The two channels of one handshake attempt.
#[derive(Debug)]
pub struct ChannelPair<E, C> {
	pub event: E,
	pub command: C,
}

impl<E: EventChannel, C: CommandChannel> ChannelPair<E, C> {
	pub fn new(event: E, command: C) -> Self {
		Self { event, command }
	}

	pub fn is_registered(&self) -> bool {
		self.event.is_registered()
	}

	/// Closes both channels, event side first.
	pub fn close(&mut self) {
		self.event.close();
		self.command.close();
	}

	pub fn into_parts(self) -> (E, C) {
		(self.event, self.command)
	}
}

/// Opens a fresh channel pair against an endpoint.
///
/// Implementations register every socket they open in `registry` so that a
/// failed attempt can be torn down completely.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
	type Event: EventChannel;
	type Command: CommandChannel;

	async fn create(
		&self,
		endpoint: &Endpoint,
		registry: &Arc<SocketRegistry>,
	) -> Result<ChannelPair<Self::Event, Self::Command>>;
}
