use campulse::{ChannelConfig, ChannelEvent, ChannelState, Error, SessionChannel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info};

use crate::error::Result;
use crate::output::Printer;
use crate::settings;

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input {
	Send(String),
	Join(String),
	Leave,
	Quit,
	Empty,
	Unknown(String),
}

fn parse_input(line: &str) -> Input {
	let trimmed = line.trim();
	if trimmed.is_empty() {
		return Input::Empty;
	}
	let Some(command) = trimmed.strip_prefix('/') else {
		return Input::Send(line.trim_end().to_string());
	};

	let (name, arg) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
	match (name, arg.trim()) {
		("join", group) if !group.is_empty() => Input::Join(group.to_string()),
		("leave", "") => Input::Leave,
		("quit" | "exit", "") => Input::Quit,
		_ => Input::Unknown(trimmed.to_string()),
	}
}

pub async fn execute(mut config: ChannelConfig, group: &str, printer: Printer) -> Result<()> {
	settings::require_user(&mut config)?;
	let printer = printer.with_user(&config.user);
	info!(target = "campulse.cli", endpoint = %config.endpoint, user = %config.user, %group, "chat");

	let channel = SessionChannel::connect_websocket(config)?;
	let mut events = channel.events();

	channel.connect().await?;
	join(&channel, &mut events, group, &printer).await?;

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let outcome = loop {
		tokio::select! {
			line = lines.next_line() => {
				let Some(line) = line? else {
					debug!(target = "campulse.cli", "stdin closed");
					break Ok(());
				};
				match parse_input(&line) {
					Input::Empty => {}
					Input::Quit => break Ok(()),
					Input::Send(text) => {
						if let Err(err) = channel.send(&text).await {
							printer.error(&send_failure(&err));
						}
					}
					Input::Join(next) => match join(&channel, &mut events, &next, &printer).await {
						Ok(()) => {}
						Err(err) if err.is_terminal() => break Err(err),
						Err(err) => printer.error(&format!("could not join {next}: {err}")),
					},
					Input::Leave => match channel.leave_group().await {
						Ok(()) => printer.notice("left the group; /join <group> to continue"),
						Err(err) => printer.error(&err.to_string()),
					},
					Input::Unknown(command) => {
						printer.error(&format!("unknown command `{command}` (try /join <group>, /leave, /quit)"));
					}
				}
			}
			event = events.recv() => match event {
				Ok(event) => {
					if let Err(err) = on_event(&printer, event) {
						break Err(err);
					}
				}
				Err(RecvError::Lagged(missed)) => printer.error(&format!("output fell behind; {missed} events skipped")),
				Err(RecvError::Closed) => break Ok(()),
			}
		}
	};

	channel.close().await?;
	Ok(outcome?)
}

/// Joins `group` and prints its log. Events queued before the snapshot are
/// already reflected in it, so their messages are not printed twice.
async fn join(channel: &SessionChannel, events: &mut broadcast::Receiver<ChannelEvent>, group: &str, printer: &Printer) -> campulse::Result<()> {
	channel.join_group(group).await?;
	let log = channel.messages().await?;

	let mut queued = Vec::new();
	loop {
		match events.try_recv() {
			Ok(ChannelEvent::Message(_)) => {}
			Ok(event) => queued.push(event),
			Err(TryRecvError::Lagged(_)) => continue,
			Err(TryRecvError::Empty | TryRecvError::Closed) => break,
		}
	}
	for event in queued {
		on_event(printer, event)?;
	}

	printer.notice(&format!("joined {group} ({} earlier messages)", log.len()));
	for message in &log {
		printer.message(message);
	}
	Ok(())
}

/// Prints one channel event. Returns the error that ends the session, if any.
fn on_event(printer: &Printer, event: ChannelEvent) -> campulse::Result<()> {
	match event {
		ChannelEvent::Message(message) => printer.message(&message),
		ChannelEvent::StateChanged(ChannelState::Connecting) => printer.notice("connecting"),
		ChannelEvent::StateChanged(ChannelState::Ready) => printer.notice("connected"),
		ChannelEvent::StateChanged(ChannelState::Suspended) => printer.notice("connection lost; reconnecting (sending is disabled)"),
		ChannelEvent::StateChanged(_) | ChannelEvent::HistoryLoaded { .. } => {}
		ChannelEvent::Error(err @ Error::Exhausted { .. }) => {
			printer.error(&format!("{err}; run campulse-chat again to retry"));
			return Err(err);
		}
		ChannelEvent::Error(Error::HistoryUnavailable { reason, .. }) => {
			printer.error(&format!("history unavailable ({reason}); showing live messages only"));
		}
		ChannelEvent::Error(err) => printer.error(&err.to_string()),
	}
	Ok(())
}

fn send_failure(err: &Error) -> String {
	match err {
		Error::InvalidState {
			state: ChannelState::Suspended | ChannelState::Connecting,
			..
		} => "not connected; message not sent".to_string(),
		Error::InvalidState { op, .. } if op.contains("group") => "join a group first: /join <group>".to_string(),
		other => format!("message not sent: {other}"),
	}
}
