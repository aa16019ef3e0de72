//! TCP socket channels to the browser extension.
//!
//! Each [`SocketChannel`] owns one TCP connection and two background tasks:
//!
//! - a writer draining an unbounded queue of encoded lines into the socket
//! - a reader decoding inbound lines and dispatching them
//!
//! Both tasks are registered in the owning [`SocketRegistry`]; removing the
//! entry (on close, on EOF, or when the supervisor clears the registry)
//! aborts them.
//!
//! # Message Flow
//!
//! 1. The channel connects and queues [`Outbound::Register`] with a unique token
//! 2. The reader flips the registration flag when the matching ack arrives
//! 3. Requests get a fresh uuid and a oneshot parked in `callbacks`
//! 4. Responses are correlated by uuid and complete the oneshot
//! 5. Events are broadcast to every subscriber

mod bridge;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use jsbridge_protocol::{
	ChannelKind, Endpoint, EventMessage, Inbound, Outbound, ResponseMessage, decode_line,
	encode_line,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

pub use bridge::{BackChannel, Bridge, DEFAULT_CALL_TIMEOUT, TcpChannelFactory};

use crate::error::{Error, Result};
use crate::registry::{SocketId, SocketRegistry};

/// Capacity of the per-channel event broadcast.
const EVENT_BUFFER: usize = 256;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

type Callback = oneshot::Sender<Result<Value>>;

/// State shared between a channel handle and its reader task.
struct Shared {
	token: String,
	registered: AtomicBool,
	closed: AtomicBool,
	callbacks: Mutex<HashMap<String, Callback>>,
	events: Mutex<Option<broadcast::Sender<EventMessage>>>,
}

impl Shared {
	fn new(token: String) -> Self {
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		Self {
			token,
			registered: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			callbacks: Mutex::new(HashMap::new()),
			events: Mutex::new(Some(events)),
		}
	}

	fn dispatch(&self, kind: ChannelKind, line: &str) {
		let message = match decode_line::<Inbound>(line) {
			Ok(message) => message,
			Err(err) => {
				warn!(target = "jsbridge", %kind, error = %err, "dropping unreadable message");
				return;
			}
		};

		match message {
			Inbound::Event(event) => {
				if event.acknowledges(&self.token) {
					debug!(target = "jsbridge", %kind, token = %self.token, "registration acknowledged");
					self.registered.store(true, Ordering::SeqCst);
				}
				if let Some(events) = self.events.lock().as_ref() {
					// No subscribers is fine.
					let _ = events.send(event);
				}
			}
			Inbound::Response(response) => self.complete(response),
		}
	}

	fn complete(&self, response: ResponseMessage) {
		let Some(callback) = self.callbacks.lock().remove(&response.uuid) else {
			trace!(target = "jsbridge", uuid = %response.uuid, "response without pending request");
			return;
		};
		let result = response.into_result().map_err(|exception| Error::Remote {
			message: exception_message(&exception),
		});
		let _ = callback.send(result);
	}

	/// Marks the channel dead and fails everything still waiting on it.
	fn shut(&self) {
		self.shut_with(|| Error::ChannelClosed);
	}

	/// Like [`Shared::shut`], failing pending requests with `reason()`.
	fn shut_with(&self, reason: impl Fn() -> Error) {
		self.closed.store(true, Ordering::SeqCst);
		for (_, callback) in self.callbacks.lock().drain() {
			let _ = callback.send(Err(reason()));
		}
		self.events.lock().take();
	}
}

/// Human-readable text of a remote exception payload.
fn exception_message(exception: &Value) -> String {
	match exception {
		Value::String(text) => text.clone(),
		Value::Object(map) => match map.get("message") {
			Some(Value::String(text)) => text.clone(),
			_ => exception.to_string(),
		},
		other => other.to_string(),
	}
}

/// One registered TCP connection to the extension.
pub struct SocketChannel {
	kind: ChannelKind,
	id: SocketId,
	peer: Option<SocketAddr>,
	registry: Arc<SocketRegistry>,
	outbound: Option<mpsc::UnboundedSender<String>>,
	shared: Arc<Shared>,
	next_request: AtomicU64,
}

impl SocketChannel {
	/// Connects to `endpoint`, starts the servicing tasks, and sends the registration.
	pub async fn connect(
		kind: ChannelKind,
		endpoint: &Endpoint,
		registry: &Arc<SocketRegistry>,
	) -> Result<Self> {
		let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
			.await
			.map_err(|source| Error::ConnectionFailed {
				endpoint: endpoint.clone(),
				source,
			})?;
		let peer = stream.peer_addr().ok();
		stream.set_nodelay(true)?;
		let (read_half, write_half) = stream.into_split();

		let id = registry.allocate_id();
		let token = format!(
			"{kind}-{}-{}",
			std::process::id(),
			NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
		);
		let shared = Arc::new(Shared::new(token.clone()));
		let (outbound, queue) = mpsc::unbounded_channel();
		let (start, started) = oneshot::channel();

		let writer = tokio::spawn(write_loop(kind, write_half, queue));
		let reader = tokio::spawn(read_loop(
			kind,
			id,
			read_half,
			Arc::clone(&shared),
			Arc::clone(registry),
			started,
		));

		// The reader waits for `start` so it cannot deregister before it is registered.
		registry.insert(id, kind, peer, vec![reader.abort_handle(), writer.abort_handle()]);
		let _ = start.send(());

		let channel = Self {
			kind,
			id,
			peer,
			registry: Arc::clone(registry),
			outbound: Some(outbound),
			shared,
			next_request: AtomicU64::new(1),
		};
		channel.send(&Outbound::Register { uuid: token, kind })?;
		debug!(target = "jsbridge", %kind, %id, %endpoint, "channel opened");

		Ok(channel)
	}

	pub fn kind(&self) -> ChannelKind {
		self.kind
	}

	pub fn id(&self) -> SocketId {
		self.id
	}

	pub fn peer(&self) -> Option<SocketAddr> {
		self.peer
	}

	/// Token sent in this channel's registration message.
	pub fn token(&self) -> &str {
		&self.shared.token
	}

	pub fn is_registered(&self) -> bool {
		self.shared.registered.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::SeqCst)
	}

	/// Queues one message for the writer task.
	pub fn send(&self, message: &Outbound) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}
		let line = encode_line(message)?;
		self.outbound
			.as_ref()
			.ok_or(Error::ChannelClosed)?
			.send(line)
			.map_err(|_| Error::ChannelClosed)
	}

	/// Sends a request built around a fresh uuid and waits for its response.
	pub async fn request<F>(&self, build: F, timeout: Duration) -> Result<Value>
	where
		F: FnOnce(String) -> Outbound,
	{
		let uuid = self.next_request.fetch_add(1, Ordering::Relaxed).to_string();
		let message = build(uuid.clone());

		let (tx, rx) = oneshot::channel();
		self.shared.callbacks.lock().insert(uuid.clone(), tx);

		if let Err(err) = self.send(&message) {
			self.shared.callbacks.lock().remove(&uuid);
			return Err(err);
		}

		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.shared.callbacks.lock().remove(&uuid);
				Err(Error::Timeout(format!(
					"no reply to request {uuid} on {} within {}ms",
					self.kind,
					timeout.as_millis()
				)))
			}
		}
	}

	/// Receiver for every event arriving on this socket.
	///
	/// On a closed channel the receiver reports `Closed` straight away.
	pub fn subscribe(&self) -> broadcast::Receiver<EventMessage> {
		match self.shared.events.lock().as_ref() {
			Some(events) => events.subscribe(),
			None => broadcast::channel(1).1,
		}
	}

	/// Releases the socket: stops both tasks and fails outstanding requests.
	pub fn close(&mut self) {
		if self.outbound.take().is_none() && self.is_closed() {
			return;
		}
		self.registry.deregister(self.id);
		self.shared.shut();
		debug!(target = "jsbridge", kind = %self.kind, id = %self.id, "channel closed");
	}
}

impl fmt::Debug for SocketChannel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SocketChannel")
			.field("kind", &self.kind)
			.field("id", &self.id)
			.field("peer", &self.peer)
			.field("registered", &self.is_registered())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl Drop for SocketChannel {
	fn drop(&mut self) {
		self.close();
	}
}

async fn write_loop(
	kind: ChannelKind,
	mut socket: OwnedWriteHalf,
	mut queue: mpsc::UnboundedReceiver<String>,
) {
	while let Some(line) = queue.recv().await {
		if let Err(err) = socket.write_all(line.as_bytes()).await {
			warn!(target = "jsbridge", %kind, error = %err, "write failed");
			return;
		}
	}
	let _ = socket.shutdown().await;
}

async fn read_loop(
	kind: ChannelKind,
	id: SocketId,
	socket: OwnedReadHalf,
	shared: Arc<Shared>,
	registry: Arc<SocketRegistry>,
	started: oneshot::Receiver<()>,
) {
	if started.await.is_err() {
		return;
	}

	let mut reader = BufReader::new(socket);
	let mut buf = Vec::new();
	let failure = loop {
		buf.clear();
		match reader.read_until(b'\n', &mut buf).await {
			Ok(0) => {
				debug!(target = "jsbridge", %kind, %id, "remote closed the socket");
				break None;
			}
			Ok(_) => match std::str::from_utf8(&buf) {
				Ok(line) if line.trim().is_empty() => {}
				Ok(line) => shared.dispatch(kind, line),
				Err(err) => {
					warn!(target = "jsbridge", %kind, %id, error = %err, "dropping non-UTF-8 line");
				}
			},
			Err(err) => {
				warn!(target = "jsbridge", %kind, %id, error = %err, "read failed");
				break Some(err);
			}
		}
	};

	match failure {
		Some(err) => shared.shut_with(|| Error::TransportError(err.to_string())),
		None => shared.shut(),
	}
	registry.deregister(id);
}
