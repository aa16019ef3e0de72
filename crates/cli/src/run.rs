//! Top-level flow: launch, bridge up, shell or wait, tear down.

use std::future::Future;
use std::pin::Pin;

use jsbridge_runtime::{
	BridgePair, BrowserRunner, ChannelFactory, Endpoint, HandshakeSupervisor, Launcher,
	TcpChannelFactory, bootstrap,
};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::{RunConfig, Settings};
use crate::error::{CliError, Result};
use crate::shell::{Shell, ShellBindings};

pub async fn run(cli: Cli) -> Result<()> {
	let settings = Settings::discover(cli.settings.as_deref())?;
	let config = RunConfig::resolve(&cli, settings)?;

	let RunConfig {
		endpoint,
		handshake,
		launch,
		call_timeout,
		shell,
	} = config;

	let mut runner = BrowserRunner::new(launch)?;
	info!(target = "jsbridge", binary = %runner.binary().display(), %endpoint, "using browser");

	let factory = TcpChannelFactory::new().with_call_timeout(call_timeout);
	let mut supervisor = HandshakeSupervisor::with_config(factory, handshake);
	let shell = shell.map(|kind| kind.into_shell());

	drive(&mut runner, &mut supervisor, &endpoint, shell, interrupted()).await
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be watched.
async fn interrupted() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		warn!(target = "jsbridge", error = %err, "cannot listen for Ctrl-C");
		std::future::pending::<()>().await;
	}
}

/// Bootstraps the bridge, hands it to `shell` or waits for the browser, then cleans up.
///
/// With a shell the browser is stopped when the shell returns. Without one
/// the browser runs until it exits. `interrupt` resolving at any point stops
/// the browser; during bootstrap it fails with [`CliError::Interrupted`]. The
/// profile is removed in every case.
pub async fn drive<L, F, I>(
	launcher: &mut L,
	supervisor: &mut HandshakeSupervisor<F>,
	endpoint: &Endpoint,
	shell: Option<Box<dyn Shell>>,
	interrupt: I,
) -> Result<()>
where
	L: Launcher + ?Sized,
	F: ChannelFactory<Event = jsbridge_runtime::BackChannel, Command = jsbridge_runtime::Bridge>,
	I: Future<Output = ()>,
{
	tokio::pin!(interrupt);

	let pair: BridgePair = tokio::select! {
		pair = bootstrap(launcher, supervisor, endpoint) => pair?,
		() = interrupt.as_mut() => {
			info!(target = "jsbridge", "interrupted during bootstrap; stopping browser");
			if let Err(err) = launcher.stop().await {
				warn!(target = "jsbridge", error = %err, "failed to stop browser");
			}
			if let Err(err) = launcher.cleanup_profile() {
				warn!(target = "jsbridge", error = %err, "failed to remove profile");
			}
			return Err(CliError::Interrupted);
		}
	};

	let outcome = match shell {
		Some(mut shell) => {
			let result = tokio::select! {
				result = shell.run(ShellBindings::new(pair)) => result,
				() = interrupt.as_mut() => {
					info!(target = "jsbridge", "interrupted; leaving shell");
					Ok(())
				}
			};
			let stopped = launcher.stop().await;
			result.and(stopped.map_err(CliError::from))
		}
		None => wait_for_exit(launcher, pair, interrupt.as_mut()).await,
	};

	if let Err(err) = launcher.cleanup_profile() {
		warn!(target = "jsbridge", error = %err, "failed to remove profile");
	}
	outcome
}

async fn wait_for_exit<L, I>(launcher: &mut L, pair: BridgePair, interrupt: Pin<&mut I>) -> Result<()>
where
	L: Launcher + ?Sized,
	I: Future<Output = ()>,
{
	let exited = tokio::select! {
		status = launcher.wait() => Some(status?),
		() = interrupt => None,
	};
	match exited {
		Some(status) => info!(target = "jsbridge", %status, "browser exited"),
		None => {
			info!(target = "jsbridge", "interrupted; stopping browser");
			launcher.stop().await?;
		}
	}
	drop(pair);
	Ok(())
}
