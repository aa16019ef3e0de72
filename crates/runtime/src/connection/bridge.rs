//! The two channel roles and the factory that opens them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsbridge_protocol::{ChannelKind, Endpoint, EventMessage, Outbound};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::SocketChannel;
use crate::channel::{ChannelFactory, ChannelPair, CommandChannel, EventChannel};
use crate::error::{Error, Result};
use crate::registry::SocketRegistry;

/// Default upper bound on a single bridge request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Command channel: sends evaluation requests and awaits their replies.
#[derive(Debug)]
pub struct Bridge {
	socket: SocketChannel,
	call_timeout: Duration,
}

impl Bridge {
	pub async fn connect(endpoint: &Endpoint, registry: &Arc<SocketRegistry>) -> Result<Self> {
		let socket = SocketChannel::connect(ChannelKind::Bridge, endpoint, registry).await?;
		Ok(Self {
			socket,
			call_timeout: DEFAULT_CALL_TIMEOUT,
		})
	}

	pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
		self.call_timeout = call_timeout;
		self
	}

	pub fn socket(&self) -> &SocketChannel {
		&self.socket
	}

	/// Evaluates `expr` in the extension and returns the JSON result.
	pub async fn eval(&self, expr: &str) -> Result<Value> {
		let expr = expr.to_string();
		self.socket
			.request(|uuid| Outbound::Eval { uuid, expr }, self.call_timeout)
			.await
	}

	/// Calls the remote function `name` with `args`.
	pub async fn exec_function(&self, name: &str, args: Vec<Value>) -> Result<Value> {
		let name = name.to_string();
		self.socket
			.request(
				|uuid| Outbound::ExecFunction { uuid, name, args },
				self.call_timeout,
			)
			.await
	}
}

impl CommandChannel for Bridge {
	fn close(&mut self) {
		self.socket.close();
	}
}

/// Event channel: carries the registration ack and asynchronous notifications.
#[derive(Debug)]
pub struct BackChannel {
	socket: SocketChannel,
}

impl BackChannel {
	pub async fn connect(endpoint: &Endpoint, registry: &Arc<SocketRegistry>) -> Result<Self> {
		let socket = SocketChannel::connect(ChannelKind::BackChannel, endpoint, registry).await?;
		Ok(Self { socket })
	}

	pub fn socket(&self) -> &SocketChannel {
		&self.socket
	}

	pub fn registered(&self) -> bool {
		self.socket.is_registered()
	}

	/// Receiver for every event pushed on the back channel.
	pub fn subscribe(&self) -> broadcast::Receiver<EventMessage> {
		self.socket.subscribe()
	}

	/// Waits for the next event whose `eventType` is `event_type`.
	pub async fn wait_for_event(&self, event_type: &str, timeout: Duration) -> Result<EventMessage> {
		let mut events = self.subscribe();
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let next = tokio::time::timeout_at(deadline, events.recv()).await;
			match next {
				Ok(Ok(event)) if event.event_type == event_type => return Ok(event),
				Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
				Ok(Err(RecvError::Closed)) => return Err(Error::ChannelClosed),
				Err(_) => {
					return Err(Error::Timeout(format!(
						"no '{event_type}' event within {}ms",
						timeout.as_millis()
					)));
				}
			}
		}
	}
}

impl EventChannel for BackChannel {
	fn is_registered(&self) -> bool {
		self.registered()
	}

	fn close(&mut self) {
		self.socket.close();
	}
}

/// Opens a back channel and a bridge over TCP.
#[derive(Debug, Clone, Copy)]
pub struct TcpChannelFactory {
	call_timeout: Duration,
}

impl Default for TcpChannelFactory {
	fn default() -> Self {
		Self {
			call_timeout: DEFAULT_CALL_TIMEOUT,
		}
	}
}

impl TcpChannelFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
		self.call_timeout = call_timeout;
		self
	}
}

#[async_trait]
impl ChannelFactory for TcpChannelFactory {
	type Event = BackChannel;
	type Command = Bridge;

	async fn create(
		&self,
		endpoint: &Endpoint,
		registry: &Arc<SocketRegistry>,
	) -> Result<ChannelPair<BackChannel, Bridge>> {
		// A bridge failure drops (and thereby closes) the back channel.
		let back_channel = BackChannel::connect(endpoint, registry).await?;
		let bridge = Bridge::connect(endpoint, registry)
			.await?
			.with_call_timeout(self.call_timeout);
		Ok(ChannelPair::new(back_channel, bridge))
	}
}
