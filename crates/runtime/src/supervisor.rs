//! Handshake supervision: open the channel pair and wait for registration.
//!
//! # States
//!
//! ```text
//! Connecting ──listener up──▶ ChannelsCreated ──settle──▶ Verifying ──registered──▶ Established
//!     │                            ▲                          │
//!     │ ListenerTimeout            └──── backoff ◀── Retrying ◀┘ not registered
//!     ▼                                                  (close pair, clear registry)
//!   error
//! ```
//!
//! Only channel construction and verification are retried; the listener wait
//! runs once per [`HandshakeSupervisor::establish`] call.


use std::sync::Arc;
use std::time::Duration;

use jsbridge_protocol::Endpoint;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{ChannelFactory, ChannelPair, CommandChannel, EventChannel};
use crate::error::{Error, Result};
use crate::listener::{DEFAULT_CONNECT_TIMEOUT, ListenerWaiter, POLL_INTERVAL, PROBE_TIMEOUT};
use crate::registry::SocketRegistry;

/// Pause after opening a pair before the registration flag is read.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between a torn-down attempt and the next one.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Timing and bounds for [`HandshakeSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
	/// How long to wait for the listener to come up.
	pub connect_timeout: Duration,
	/// Pause between listener probes.
	pub poll_interval: Duration,
	/// Upper bound on a single listener probe.
	pub probe_timeout: Duration,
	pub settle_delay: Duration,
	pub retry_backoff: Duration,
	/// Give up after this many attempts. `None` retries forever.
	pub max_attempts: Option<u32>,
	/// Give up once another attempt could not finish within this long. `None` means no bound.
	pub deadline: Option<Duration>,
}

impl Default for HandshakeConfig {
	fn default() -> Self {
		Self {
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			poll_interval: POLL_INTERVAL,
			probe_timeout: PROBE_TIMEOUT,
			settle_delay: SETTLE_DELAY,
			retry_backoff: RETRY_BACKOFF,
			max_attempts: None,
			deadline: None,
		}
	}
}

impl HandshakeConfig {
	/// `elapsed` is measured at the end of an attempt. The next attempt would
	/// end no earlier than one backoff and one settle delay later.
	fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
		let by_count = self.max_attempts.is_some_and(|max| attempts >= max.max(1));
		let next_ends = elapsed + self.retry_backoff + self.settle_delay;
		let by_time = self.deadline.is_some_and(|deadline| next_ends > deadline);
		by_count || by_time
	}
}

/// Owns the channels of one attempt and closes them unless handed out.
struct AttemptGuard<E: EventChannel, C: CommandChannel> {
	pair: Option<ChannelPair<E, C>>,
}

impl<E: EventChannel, C: CommandChannel> AttemptGuard<E, C> {
	fn new(pair: ChannelPair<E, C>) -> Self {
		Self { pair: Some(pair) }
	}

	/// Hands the pair out if its registration has been acknowledged.
	fn take_registered(&mut self) -> Option<ChannelPair<E, C>> {
		self.pair.take_if(|pair| pair.is_registered())
	}
}

impl<E: EventChannel, C: CommandChannel> Drop for AttemptGuard<E, C> {
	fn drop(&mut self) {
		if let Some(mut pair) = self.pair.take() {
			pair.close();
		}
	}
}

/// Builds a registered channel pair, tearing down and retrying failed attempts.
pub struct HandshakeSupervisor<F: ChannelFactory> {
	factory: F,
	config: HandshakeConfig,
	registry: Arc<SocketRegistry>,
}

impl<F: ChannelFactory> HandshakeSupervisor<F> {
	pub fn new(factory: F) -> Self {
		Self::with_config(factory, HandshakeConfig::default())
	}

	pub fn with_config(factory: F, config: HandshakeConfig) -> Self {
		Self {
			factory,
			config,
			registry: Arc::new(SocketRegistry::new()),
		}
	}

	pub fn config(&self) -> &HandshakeConfig {
		&self.config
	}

	/// Registry of the sockets opened by the current or last `establish` call.
	pub fn registry(&self) -> &Arc<SocketRegistry> {
		&self.registry
	}

	/// Waits for the listener, then retries the handshake until it is acknowledged.
	///
	/// The returned pair always reports `is_registered() == true`. Without
	/// `max_attempts` or `deadline` this only returns on success or on a
	/// fatal error. Dropping the future closes the in-flight pair.
	pub async fn establish(&mut self, endpoint: &Endpoint) -> Result<ChannelPair<F::Event, F::Command>> {
		let waiter = ListenerWaiter::new()
			.with_poll_interval(self.config.poll_interval)
			.with_probe_timeout(self.config.probe_timeout);
		waiter.wait(endpoint, self.config.connect_timeout).await?;

		// Sockets of a pair handed out earlier stay with that pair's registry.
		if !self.registry.is_empty() {
			self.registry = Arc::new(SocketRegistry::new());
		}

		let started = Instant::now();
		let mut attempts: u32 = 0;

		loop {
			attempts += 1;
			debug!(target = "jsbridge", %endpoint, attempt = attempts, "opening channel pair");

			let pair = match self.factory.create(endpoint, &self.registry).await {
				Ok(pair) => pair,
				Err(err) => {
					self.registry.clear();
					return Err(err);
				}
			};
			let mut guard = AttemptGuard::new(pair);

			tokio::time::sleep(self.config.settle_delay).await;

			if let Some(pair) = guard.take_registered() {
				info!(
					target = "jsbridge",
					%endpoint,
					attempts,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"bridge registered"
				);
				return Ok(pair);
			}

			drop(guard);
			let stale = self.registry.clear();
			warn!(
				target = "jsbridge",
				%endpoint,
				attempt = attempts,
				stale_sockets = stale,
				"registration not acknowledged; retrying"
			);

			let elapsed = started.elapsed();
			if self.config.exhausted(attempts, elapsed) {
				return Err(Error::HandshakeTimeout { attempts, elapsed });
			}

			tokio::time::sleep(self.config.retry_backoff).await;
		}
	}
}
