//! Polls a TCP endpoint until the remote runtime is accepting connections.
//!
//! Waiting time is accumulated from the poll quanta actually slept, so a
//! failure is never reported before `timeout` worth of sleeping has passed.

use std::io;
use std::time::Duration;

use jsbridge_protocol::Endpoint;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Pause between two connection probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long to wait for the listener before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a single probe connect.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Probes an endpoint at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct ListenerWaiter {
	poll_interval: Duration,
	probe_timeout: Duration,
}

impl Default for ListenerWaiter {
	fn default() -> Self {
		Self {
			poll_interval: POLL_INTERVAL,
			probe_timeout: PROBE_TIMEOUT,
		}
	}
}

impl ListenerWaiter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
		self.probe_timeout = probe_timeout;
		self
	}

	pub fn poll_interval(&self) -> Duration {
		self.poll_interval
	}

	/// Waits until `endpoint` accepts a connection.
	///
	/// Returns the accumulated waiting time (zero if the listener was already
	/// up). Fails with [`Error::ListenerTimeout`] once `timeout` has been
	/// waited and a final probe still fails.
	pub async fn wait(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Duration> {
		let step = self.poll_interval.max(Duration::from_millis(1));
		let mut waited = Duration::ZERO;

		loop {
			match self.probe(endpoint).await {
				Ok(()) => {
					debug!(
						target = "jsbridge",
						%endpoint,
						waited_ms = waited.as_millis() as u64,
						"bridge listener is accepting connections"
					);
					return Ok(waited);
				}
				Err(err) => {
					trace!(target = "jsbridge", %endpoint, error = %err, "listener probe failed");
				}
			}

			if waited >= timeout {
				return Err(Error::ListenerTimeout {
					endpoint: endpoint.clone(),
					waited,
				});
			}

			tokio::time::sleep(step).await;
			waited += step;
		}
	}

	/// Opens and immediately closes one connection.
	async fn probe(&self, endpoint: &Endpoint) -> io::Result<()> {
		let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
		let stream = tokio::time::timeout(self.probe_timeout, connect)
			.await
			.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "probe connect timed out"))??;
		drop(stream);
		Ok(())
	}
}

/// Waits for `endpoint` with the default 250 ms poll interval.
pub async fn await_listener(endpoint: &Endpoint, timeout: Duration) -> Result<Duration> {
	ListenerWaiter::default().wait(endpoint, timeout).await
}

#[cfg(test)]
mod tests {
	use std::time::Instant;

	use tokio::net::TcpListener;

	use super::*;

	/// Port that refuses connections: bound once, then released.
	async fn closed_port() -> u16 {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);
		port
	}

	#[tokio::test]
	async fn returns_immediately_when_listener_is_up() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let endpoint = Endpoint::local(listener.local_addr().unwrap().port());

		let started = Instant::now();
		let waited = await_listener(&endpoint, Duration::from_secs(5)).await.unwrap();

		assert_eq!(waited, Duration::ZERO);
		assert!(started.elapsed() < POLL_INTERVAL);
	}

	#[tokio::test]
	async fn times_out_no_earlier_than_the_bound() {
		let endpoint = Endpoint::local(closed_port().await);
		let timeout = Duration::from_millis(750);

		let started = Instant::now();
		let err = await_listener(&endpoint, timeout).await.unwrap_err();
		let elapsed = started.elapsed();

		match err {
			Error::ListenerTimeout {
				endpoint: failed,
				waited,
			} => {
				assert_eq!(failed.port, endpoint.port);
				assert_eq!(waited, timeout);
			}
			other => panic!("expected ListenerTimeout, got {other:?}"),
		}
		assert!(elapsed >= timeout, "gave up early after {elapsed:?}");
		assert!(
			elapsed < timeout + POLL_INTERVAL + Duration::from_millis(200),
			"took too long: {elapsed:?}"
		);
	}

	#[tokio::test]
	async fn picks_up_a_listener_that_appears_later() {
		let port = closed_port().await;
		let endpoint = Endpoint::local(port);

		let opener = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(120)).await;
			let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
			tokio::time::sleep(Duration::from_secs(2)).await;
			drop(listener);
		});

		let waiter = ListenerWaiter::new().with_poll_interval(Duration::from_millis(50));
		let waited = waiter.wait(&endpoint, Duration::from_secs(2)).await.unwrap();

		assert!(waited >= Duration::from_millis(100));
		assert!(waited < Duration::from_secs(1));
		opener.abort();
	}

	#[tokio::test]
	async fn zero_timeout_probes_once() {
		let endpoint = Endpoint::local(closed_port().await);
		let err = await_listener(&endpoint, Duration::ZERO).await.unwrap_err();
		assert!(matches!(err, Error::ListenerTimeout { waited, .. } if waited.is_zero()));
	}
}
