//! jsbridge runtime - browser launch, handshake supervision, and channels
//!
//! This crate brings a scripting bridge to a freshly launched browser up to
//! the point where commands can be sent:
//!
//! - **Runner**: locating and launching the browser with a throwaway profile
//! - **Listener**: waiting for the extension to open its TCP listener
//! - **Supervisor**: opening the channel pair and retrying until registered
//! - **Connection**: the TCP bridge and back channel themselves
//! - **Registry**: the sockets currently serviced by background tasks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  jsbridge    │  CLI: options, shell, wait loop
//! └──────┬───────┘
//!        │ bootstrap()
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Runner │  │  Process + profile
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Superv │  │  Listener wait, handshake retry
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Conn   │  │  Bridge / BackChannel over TCP
//! │  └────────┘  │
//! └──────────────┘
//! ```
//!
//! # Decoupling via ChannelFactory
//!
//! The supervisor opens channels through the [`ChannelFactory`] trait and only
//! observes [`EventChannel::is_registered`] and the two `close` methods, so
//! the retry logic runs unchanged against in-memory fakes.

pub mod channel;
pub mod connection;
pub mod error;
pub mod listener;
pub mod profile;
pub mod registry;
pub mod runner;
pub mod session;
pub mod supervisor;

pub use channel::{ChannelFactory, ChannelPair, CommandChannel, EventChannel};
pub use connection::{BackChannel, Bridge, DEFAULT_CALL_TIMEOUT, SocketChannel, TcpChannelFactory};
pub use error::{Error, Result};
pub use jsbridge_protocol::{ChannelKind, DEFAULT_HOST, DEFAULT_PORT, Endpoint, EventMessage};
pub use listener::{ListenerWaiter, await_listener};
pub use profile::Profile;
pub use registry::{SocketId, SocketRegistry};
pub use runner::{BrowserRunner, LaunchOptions, Launcher, find_browser_executable};
pub use session::bootstrap;
pub use supervisor::{HandshakeConfig, HandshakeSupervisor};

/// Channel pair produced by the TCP factory.
pub type BridgePair = ChannelPair<BackChannel, Bridge>;
