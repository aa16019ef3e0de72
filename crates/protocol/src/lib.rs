//! Wire types for the jsbridge channels.
//!
//! Both channels speak newline-delimited JSON over a plain TCP socket:
//!
//! - [`Outbound`] messages are written by the controlling process
//! - [`Inbound`] messages are pushed back by the browser extension
//! - [`framing`] turns either side into a single `\n`-terminated line
//!
//! Types in this crate carry no behaviour beyond serialization; the
//! connection logic lives in `jsbridge-runtime`.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{FrameError, decode_line, encode_line};
pub use message::*;
pub use types::*;
