//! Registry of sockets currently serviced by background tasks.
//!
//! Each open channel registers its socket together with the abort handles of
//! the tasks reading and writing it. Removing an entry aborts those tasks, so
//! nothing keeps servicing a socket once it has left the table.
//!
//! A registry belongs to one [`HandshakeSupervisor`](crate::HandshakeSupervisor)
//! and the channels it creates; clearing it cannot touch sockets of any other
//! supervisor.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use jsbridge_protocol::ChannelKind;
use tokio::task::AbortHandle;
use tracing::trace;

/// Registry-local socket identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl fmt::Display for SocketId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "socket#{}", self.0)
	}
}

/// A registered socket and the tasks servicing it.
#[derive(Debug)]
pub struct SocketEntry {
	pub kind: ChannelKind,
	pub peer: Option<SocketAddr>,
	tasks: Vec<AbortHandle>,
}

impl SocketEntry {
	fn abort(&self) {
		for task in &self.tasks {
			task.abort();
		}
	}
}

/// Thread-safe table of live sockets.
pub struct SocketRegistry {
	sockets: DashMap<SocketId, SocketEntry>,
	next_id: AtomicU64,
}

impl Default for SocketRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for SocketRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SocketRegistry")
			.field("sockets", &self.ids())
			.finish()
	}
}

impl SocketRegistry {
	pub fn new() -> Self {
		Self {
			sockets: DashMap::new(),
			next_id: AtomicU64::new(1),
		}
	}

	/// Reserves an id before the servicing tasks exist.
	pub fn allocate_id(&self) -> SocketId {
		SocketId(self.next_id.fetch_add(1, Ordering::Relaxed))
	}

	/// Records `id` as serviced by `tasks`.
	pub fn insert(
		&self,
		id: SocketId,
		kind: ChannelKind,
		peer: Option<SocketAddr>,
		tasks: Vec<AbortHandle>,
	) {
		trace!(target = "jsbridge", %id, %kind, "socket registered");
		self.sockets.insert(id, SocketEntry { kind, peer, tasks });
	}

	/// Allocates an id and records it in one step.
	pub fn register(
		&self,
		kind: ChannelKind,
		peer: Option<SocketAddr>,
		tasks: Vec<AbortHandle>,
	) -> SocketId {
		let id = self.allocate_id();
		self.insert(id, kind, peer, tasks);
		id
	}

	/// Removes `id` and aborts its tasks. Returns false if it was not present.
	pub fn deregister(&self, id: SocketId) -> bool {
		match self.sockets.remove(&id) {
			Some((_, entry)) => {
				entry.abort();
				trace!(target = "jsbridge", %id, "socket deregistered");
				true
			}
			None => false,
		}
	}

	/// Drops every entry, aborting all servicing tasks. Returns how many were removed.
	pub fn clear(&self) -> usize {
		let mut removed = 0;
		self.sockets.retain(|_, entry| {
			entry.abort();
			removed += 1;
			false
		});
		removed
	}

	pub fn contains(&self, id: SocketId) -> bool {
		self.sockets.contains_key(&id)
	}

	pub fn kind_of(&self, id: SocketId) -> Option<ChannelKind> {
		self.sockets.get(&id).map(|entry| entry.kind)
	}

	pub fn len(&self) -> usize {
		self.sockets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sockets.is_empty()
	}

	/// Snapshot of registered ids in allocation order.
	pub fn ids(&self) -> Vec<SocketId> {
		let mut ids: Vec<SocketId> = self.sockets.iter().map(|entry| *entry.key()).collect();
		ids.sort();
		ids
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	fn idle_task() -> tokio::task::JoinHandle<()> {
		tokio::spawn(async {
			tokio::time::sleep(Duration::from_secs(3600)).await;
		})
	}

	#[tokio::test]
	async fn deregister_aborts_servicing_tasks() {
		let registry = SocketRegistry::new();
		let task = idle_task();
		let id = registry.register(ChannelKind::Bridge, None, vec![task.abort_handle()]);

		assert!(registry.contains(id));
		assert_eq!(registry.kind_of(id), Some(ChannelKind::Bridge));
		assert!(registry.deregister(id));
		assert!(!registry.deregister(id));

		let err = task.await.unwrap_err();
		assert!(err.is_cancelled());
		assert!(registry.is_empty());
	}

	#[tokio::test]
	async fn clear_empties_the_table_and_cancels_everything() {
		let registry = SocketRegistry::new();
		let a = idle_task();
		let b = idle_task();
		registry.register(ChannelKind::BackChannel, None, vec![a.abort_handle()]);
		registry.register(ChannelKind::Bridge, None, vec![b.abort_handle()]);

		assert_eq!(registry.len(), 2);
		assert_eq!(registry.clear(), 2);
		assert!(registry.is_empty());
		assert!(a.await.unwrap_err().is_cancelled());
		assert!(b.await.unwrap_err().is_cancelled());
	}

	#[test]
	fn ids_are_unique_and_ordered() {
		let registry = SocketRegistry::new();
		let first = registry.register(ChannelKind::BackChannel, None, Vec::new());
		let second = registry.register(ChannelKind::Bridge, None, Vec::new());

		assert_ne!(first, second);
		assert_eq!(registry.ids(), vec![first, second]);
		assert_eq!(first.to_string(), "socket#1");
	}
}
