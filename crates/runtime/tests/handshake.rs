//! End-to-end handshake against an in-process fake extension.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsbridge_protocol::{ChannelKind, Inbound, Outbound, decode_line, encode_line};
use jsbridge_runtime::{
	ChannelPair, Endpoint, Error, HandshakeConfig, HandshakeSupervisor, TcpChannelFactory,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SETTLE: Duration = Duration::from_millis(100);
const BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct Observed {
	back_channel_registrations: u32,
	closed_connections: u32,
}

/// Fake extension withholding the back channel ack for the first `withhold` registrations.
struct FakeExtension {
	withhold: u32,
	observed: Arc<Mutex<Observed>>,
}

impl FakeExtension {
	async fn start(withhold: u32) -> (Endpoint, Arc<Mutex<Observed>>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let endpoint = Endpoint::local(listener.local_addr().unwrap().port());
		let observed = Arc::new(Mutex::new(Observed::default()));
		let extension = Arc::new(FakeExtension {
			withhold,
			observed: Arc::clone(&observed),
		});

		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				tokio::spawn(Arc::clone(&extension).serve(stream));
			}
		});

		(endpoint, observed)
	}

	async fn serve(self: Arc<Self>, stream: TcpStream) {
		let (read_half, mut write_half) = stream.into_split();
		let mut lines = BufReader::new(read_half).lines();
		let mut opened = false;

		while let Ok(Some(line)) = lines.next_line().await {
			let reply = match decode_line::<Outbound>(&line) {
				Ok(Outbound::Register { uuid, kind }) => {
					opened = true;
					let ack = match kind {
						ChannelKind::BackChannel => {
							let mut observed = self.observed.lock();
							observed.back_channel_registrations += 1;
							observed.back_channel_registrations > self.withhold
						}
						ChannelKind::Bridge => true,
					};
					if !ack {
						continue;
					}
					encode_line(&Inbound::registration_ack(uuid)).unwrap()
				}
				Ok(Outbound::Eval { uuid, expr }) => {
					encode_line(&json!({"uuid": uuid, "result": format!("evaluated {expr}")})).unwrap()
				}
				Ok(Outbound::ExecFunction { uuid, .. }) => {
					encode_line(&json!({"uuid": uuid, "result": null})).unwrap()
				}
				Err(_) => continue,
			};
			if write_half.write_all(reply.as_bytes()).await.is_err() {
				break;
			}
		}

		// Listener probes never register and are not counted.
		if opened {
			self.observed.lock().closed_connections += 1;
		}
	}
}

fn config() -> HandshakeConfig {
	HandshakeConfig {
		connect_timeout: Duration::from_secs(2),
		poll_interval: Duration::from_millis(50),
		settle_delay: SETTLE,
		retry_backoff: BACKOFF,
		..HandshakeConfig::default()
	}
}

async fn settle_observations() {
	tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn registers_on_first_attempt() {
	let (endpoint, observed) = FakeExtension::start(0).await;
	let mut supervisor = HandshakeSupervisor::with_config(TcpChannelFactory::new(), config());

	let started = Instant::now();
	let pair = supervisor.establish(&endpoint).await.unwrap();
	let elapsed = started.elapsed();

	assert!(pair.is_registered());
	assert!(elapsed >= SETTLE);
	assert!(elapsed < SETTLE + BACKOFF, "took {elapsed:?}");

	settle_observations().await;
	let observed = observed.lock();
	assert_eq!(observed.back_channel_registrations, 1);
	assert_eq!(observed.closed_connections, 0);
}

#[tokio::test]
async fn retries_until_the_third_back_channel_is_acknowledged() {
	let (endpoint, observed) = FakeExtension::start(2).await;
	let mut supervisor = HandshakeSupervisor::with_config(TcpChannelFactory::new(), config());

	let started = Instant::now();
	let pair = supervisor.establish(&endpoint).await.unwrap();
	let elapsed = started.elapsed();

	let expected = SETTLE + 2 * (BACKOFF + SETTLE);
	assert!(elapsed >= expected, "returned early after {elapsed:?}");
	assert!(elapsed < expected + Duration::from_millis(500), "took {elapsed:?}");

	// Only the surviving pair remains registered.
	assert_eq!(supervisor.registry().len(), 2);
	assert!(supervisor.registry().contains(pair.event.socket().id()));
	assert!(supervisor.registry().contains(pair.command.socket().id()));

	settle_observations().await;
	let observed = observed.lock();
	assert_eq!(observed.back_channel_registrations, 3);
	// Two teardown cycles, each closing a back channel and a bridge.
	assert_eq!(observed.closed_connections, 4);
}

#[tokio::test]
async fn established_bridge_accepts_commands() {
	let (endpoint, _observed) = FakeExtension::start(1).await;
	let mut supervisor = HandshakeSupervisor::with_config(TcpChannelFactory::new(), config());

	let ChannelPair {
		event: back_channel,
		command: bridge,
	} = supervisor.establish(&endpoint).await.unwrap();

	assert!(back_channel.registered());
	assert_eq!(bridge.eval("1 + 1").await.unwrap(), json!("evaluated 1 + 1"));
}

#[tokio::test]
async fn bounded_supervisor_reports_handshake_timeout() {
	let (endpoint, observed) = FakeExtension::start(u32::MAX).await;
	let mut supervisor = HandshakeSupervisor::with_config(
		TcpChannelFactory::new(),
		HandshakeConfig {
			max_attempts: Some(2),
			..config()
		},
	);

	let err = supervisor.establish(&endpoint).await.unwrap_err();

	assert!(matches!(err, Error::HandshakeTimeout { attempts: 2, .. }), "got {err:?}");
	assert!(supervisor.registry().is_empty());
	settle_observations().await;
	assert_eq!(observed.lock().closed_connections, 4);
}

#[tokio::test]
async fn nothing_listening_is_a_listener_timeout() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let endpoint = Endpoint::local(listener.local_addr().unwrap().port());
	drop(listener);

	let mut supervisor = HandshakeSupervisor::with_config(
		TcpChannelFactory::new(),
		HandshakeConfig {
			connect_timeout: Duration::from_millis(300),
			..config()
		},
	);

	let started = Instant::now();
	let err = supervisor.establish(&endpoint).await.unwrap_err();

	assert!(matches!(err, Error::ListenerTimeout { .. }), "got {err:?}");
	assert!(started.elapsed() >= Duration::from_millis(300));
	assert!(err.to_string().contains(&endpoint.port.to_string()));
}
