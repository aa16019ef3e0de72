//! Messages exchanged with the browser extension.
//!
//! The exchange is deliberately small:
//!
//! 1. Each socket sends [`Outbound::Register`] right after connecting, tagged
//!    with its [`ChannelKind`] and a token unique to that socket
//! 2. The extension answers on the same socket with an [`EventMessage`] whose
//!    `eventType` is [`REGISTER_EVENT`] and whose `uuid` echoes the token
//! 3. The bridge then sends [`Outbound::Eval`] / [`Outbound::ExecFunction`]
//!    requests, each answered by a [`ResponseMessage`] carrying the same uuid
//! 4. The back channel receives further [`EventMessage`]s at any time

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChannelKind;

/// `eventType` of the acknowledgement that completes registration.
pub const REGISTER_EVENT: &str = "register";

/// Message written by the controlling process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Outbound {
	/// Announces a freshly connected socket and its role.
	Register {
		uuid: String,
		kind: ChannelKind,
	},
	/// Evaluates a script expression in the extension's scope.
	Eval {
		uuid: String,
		expr: String,
	},
	/// Calls a named function with JSON arguments.
	ExecFunction {
		uuid: String,
		name: String,
		args: Vec<Value>,
	},
}

impl Outbound {
	/// Correlation token of this message.
	pub fn uuid(&self) -> &str {
		match self {
			Outbound::Register { uuid, .. }
			| Outbound::Eval { uuid, .. }
			| Outbound::ExecFunction { uuid, .. } => uuid,
		}
	}
}

/// Message pushed by the browser extension.
///
/// Events are recognised by their `eventType` field; anything else carrying
/// a `uuid` is a response to an earlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
	Event(EventMessage),
	Response(ResponseMessage),
}

impl Inbound {
	/// Acknowledgement the extension sends once `uuid` is registered.
	pub fn registration_ack(uuid: impl Into<String>) -> Self {
		Inbound::Event(EventMessage {
			event_type: REGISTER_EVENT.to_string(),
			uuid: Some(uuid.into()),
			result: Some(Value::Bool(true)),
			exception: None,
		})
	}
}

/// Asynchronous notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
	#[serde(rename = "eventType")]
	pub event_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub uuid: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception: Option<Value>,
}

impl EventMessage {
	/// True if this event acknowledges the registration token `uuid`.
	pub fn acknowledges(&self, uuid: &str) -> bool {
		self.event_type == REGISTER_EVENT
			&& self.uuid.as_deref() == Some(uuid)
			&& self.exception.is_none()
	}
}

/// Reply to an [`Outbound::Eval`] or [`Outbound::ExecFunction`] request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
	pub uuid: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception: Option<Value>,
}

impl ResponseMessage {
	/// Splits the reply into the evaluated value or the remote exception.
	///
	/// A reply with neither field evaluates to `null`.
	pub fn into_result(self) -> Result<Value, Value> {
		match self.exception {
			Some(exception) => Err(exception),
			None => Ok(self.result.unwrap_or(Value::Null)),
		}
	}
}
