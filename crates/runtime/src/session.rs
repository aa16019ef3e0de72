//! Bootstrap sequence: launch the runtime, then establish the bridge.

use jsbridge_protocol::Endpoint;
use tracing::{info, warn};

use crate::channel::{ChannelFactory, ChannelPair};
use crate::error::Result;
use crate::runner::Launcher;
use crate::supervisor::HandshakeSupervisor;

/// Starts `launcher` and returns a registered channel pair.
///
/// On any failure the launched runtime is stopped and its profile removed
/// before the error is returned, so no command channel is ever handed out
/// for a runtime that is left running unsupervised.
pub async fn bootstrap<L, F>(
	launcher: &mut L,
	supervisor: &mut HandshakeSupervisor<F>,
	endpoint: &Endpoint,
) -> Result<ChannelPair<F::Event, F::Command>>
where
	L: Launcher + ?Sized,
	F: ChannelFactory,
{
	let outcome = match launcher.start().await {
		Ok(()) => supervisor.establish(endpoint).await,
		Err(err) => Err(err),
	};

	match outcome {
		Ok(pair) => {
			info!(target = "jsbridge", %endpoint, "bridge ready");
			Ok(pair)
		}
		Err(err) => {
			warn!(target = "jsbridge", %endpoint, error = %err, "bootstrap failed; stopping browser");
			if let Err(stop_err) = launcher.stop().await {
				warn!(target = "jsbridge", error = %stop_err, "failed to stop browser");
			}
			if let Err(cleanup_err) = launcher.cleanup_profile() {
				warn!(target = "jsbridge", error = %cleanup_err, "failed to remove profile");
			}
			Err(err)
		}
	}
}
