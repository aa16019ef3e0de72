//! Interactive shells over an established bridge.


use async_trait::async_trait;
use colored::Colorize;
use jsbridge_protocol::REGISTER_EVENT;
use jsbridge_runtime::{BackChannel, Bridge, BridgePair, Error as RuntimeError, EventMessage};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::error::{CliError, Result};

/// Expression resolving to the most recently focused browser window.
pub const WINDOW_EXPR: &str = "Components.classes['@mozilla.org/appshell/window-mediator;1']\
	.getService(Components.interfaces.nsIWindowMediator).getMostRecentWindow('')";

const HELP: &str = "\
:help      show this help
:window    evaluate the most recent browser window
:events    print back channel events received since the last :events
:quit      leave the shell (also Ctrl-D)
anything else is evaluated in the browser and printed as JSON";

/// Which shell to run after the bridge comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
	Console,
	Plain,
}

impl ShellKind {
	/// `plain` implies a shell.
	pub fn select(shell: bool, plain: bool) -> Option<Self> {
		match (shell, plain) {
			(_, true) => Some(ShellKind::Plain),
			(true, false) => Some(ShellKind::Console),
			(false, false) => None,
		}
	}

	/// Shell bound to the process's stdin and stdout.
	pub fn into_shell(self) -> Box<dyn Shell> {
		match self {
			ShellKind::Console => Box::new(ConsoleShell::stdio()),
			ShellKind::Plain => Box::new(PlainShell::stdio()),
		}
	}
}

/// What a shell can reach: the bridge, the back channel, and its buffered events.
pub struct ShellBindings {
	pub bridge: Bridge,
	pub back_channel: BackChannel,
	events: broadcast::Receiver<EventMessage>,
}

impl ShellBindings {
	pub fn new(pair: BridgePair) -> Self {
		let (back_channel, bridge) = pair.into_parts();
		let events = back_channel.subscribe();
		Self {
			bridge,
			back_channel,
			events,
		}
	}

	/// Events received since the last call, minus registration acks.
	pub fn drain_events(&mut self) -> Vec<EventMessage> {
		let mut drained = Vec::new();
		loop {
			match self.events.try_recv() {
				Ok(event) if event.event_type == REGISTER_EVENT => {}
				Ok(event) => drained.push(event),
				Err(TryRecvError::Lagged(skipped)) => {
					tracing::warn!(target = "jsbridge", skipped, "dropped back channel events");
				}
				Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
			}
		}
	}
}

#[async_trait]
pub trait Shell: Send {
	/// Runs until the user quits or input ends.
	async fn run(&mut self, bindings: ShellBindings) -> Result<()>;
}

/// Splits eval failures into ones the user can retry and ones that end the session.
fn recoverable(err: RuntimeError) -> Result<String> {
	match err {
		RuntimeError::ChannelClosed | RuntimeError::TransportError(_) => Err(CliError::Runtime(err)),
		other => Ok(other.to_string()),
	}
}

/// Coloured shell with banner, prompt, and `:` commands.
pub struct ConsoleShell<R, W> {
	input: R,
	output: W,
}

impl ConsoleShell<BufReader<Stdin>, Stdout> {
	pub fn stdio() -> Self {
		Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
	}
}

impl<R, W> ConsoleShell<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	pub fn new(input: R, output: W) -> Self {
		Self { input, output }
	}

	pub fn into_output(self) -> W {
		self.output
	}

	async fn print(&mut self, text: &str) -> Result<()> {
		self.output.write_all(text.as_bytes()).await?;
		self.output.write_all(b"\n").await?;
		Ok(())
	}

	async fn print_value(&mut self, value: &Value) -> Result<()> {
		let rendered = serde_json::to_string_pretty(value)?;
		self.print(&rendered).await
	}

	async fn evaluate(&mut self, bridge: &Bridge, expr: &str) -> Result<()> {
		match bridge.eval(expr).await {
			Ok(value) => self.print_value(&value).await,
			Err(err) => {
				let message = recoverable(err)?;
				self.print(&format!("{} {message}", "error:".red().bold())).await
			}
		}
	}

	async fn banner(&mut self, bindings: &ShellBindings) -> Result<()> {
		let peer = bindings
			.bridge
			.socket()
			.peer()
			.map(|addr| addr.to_string())
			.unwrap_or_else(|| "extension".to_string());
		let title = format!("{} connected to {peer}", "jsbridge".green().bold());
		self.print(&title).await?;
		self.print(&format!("type {} for commands", ":help".cyan())).await
	}
}

#[async_trait]
impl<R, W> Shell for ConsoleShell<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	async fn run(&mut self, mut bindings: ShellBindings) -> Result<()> {
		self.banner(&bindings).await?;
		let mut line = String::new();

		loop {
			self.output.write_all("js> ".cyan().to_string().as_bytes()).await?;
			self.output.flush().await?;

			line.clear();
			if self.input.read_line(&mut line).await? == 0 {
				self.print("").await?;
				break;
			}

			let command = line.trim();
			match command {
				"" => continue,
				":quit" | ":q" | ":exit" => break,
				":help" => self.print(HELP).await?,
				":window" => self.evaluate(&bindings.bridge, WINDOW_EXPR).await?,
				":events" => {
					let events = bindings.drain_events();
					if events.is_empty() {
						self.print(&"(no events)".dimmed().to_string()).await?;
					}
					for event in events {
						let value = serde_json::to_value(&event)?;
						self.print_value(&value).await?;
					}
				}
				meta if meta.starts_with(':') => {
					self.print(&format!("unknown command {meta}, try :help")).await?;
				}
				expr => self.evaluate(&bindings.bridge, expr).await?,
			}
		}

		self.output.flush().await?;
		Ok(())
	}
}

/// One evaluation per input line, one JSON result per output line.
///
/// Failures are written in place as `{"error": "..."}` so output lines stay
/// aligned with input lines.
pub struct PlainShell<R, W> {
	input: R,
	output: W,
}

impl PlainShell<BufReader<Stdin>, Stdout> {
	pub fn stdio() -> Self {
		Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
	}
}

impl<R, W> PlainShell<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	pub fn new(input: R, output: W) -> Self {
		Self { input, output }
	}

	pub fn into_output(self) -> W {
		self.output
	}
}

#[async_trait]
impl<R, W> Shell for PlainShell<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	async fn run(&mut self, bindings: ShellBindings) -> Result<()> {
		let mut line = String::new();

		loop {
			line.clear();
			if self.input.read_line(&mut line).await? == 0 {
				break;
			}
			let expr = line.trim();
			if expr.is_empty() {
				continue;
			}

			let value = match bindings.bridge.eval(expr).await {
				Ok(value) => value,
				Err(err) => json!({ "error": recoverable(err)? }),
			};
			let mut rendered = serde_json::to_string(&value)?;
			rendered.push('\n');
			self.output.write_all(rendered.as_bytes()).await?;
			self.output.flush().await?;
		}

		Ok(())
	}
}
