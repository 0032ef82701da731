//! Session channel scenarios driven through the in-memory connector.

use std::sync::Arc;
use std::time::Duration;

use campulse::transport::fake::FakeConnectorBuilder;
use campulse::{
	ChannelConfig, ChannelEvent, ChannelState, ChatMessage, CloseCause, ConnectionState, Endpoint, Error, FakeController, MessageKind,
	OpenOutcome, ReconnectPolicy, SessionChannel, StaticHistory, WireFormat,
};
use campulse_protocol::{Command, Frame};
use tokio::sync::broadcast;
use tokio::time::Instant;

struct Harness {
	channel: SessionChannel,
	controller: FakeController,
	history: Arc<StaticHistory>,
	events: broadcast::Receiver<ChannelEvent>,
}

fn config() -> ChannelConfig {
	ChannelConfig {
		reconnect: ReconnectPolicy::new(3, 1_000),
		connect_timeout_ms: 2_000,
		..ChannelConfig::for_user(Endpoint::parse("ws://chat.test:8081/ws-chat").unwrap(), "asha")
	}
}

fn harness_with(config: ChannelConfig, builder: FakeConnectorBuilder, history: StaticHistory) -> Harness {
	let (connector, controller) = builder.build();
	let history = Arc::new(history);
	let channel = SessionChannel::spawn(config, Arc::new(connector), history.clone()).unwrap();
	let events = channel.events();
	Harness {
		channel,
		controller,
		history,
		events,
	}
}

fn harness(history: StaticHistory) -> Harness {
	harness_with(config(), FakeConnectorBuilder::new(), history)
}

fn hist(sender: &str, content: &str, timestamp: &str) -> ChatMessage {
	ChatMessage::new(MessageKind::Chat, "", sender, content, timestamp)
}

fn live(sender: &str, content: &str, timestamp: &str) -> String {
	format!(r#"{{"sender":"{sender}","content":"{content}","timestamp":"{timestamp}"}}"#)
}

fn contents(messages: &[ChatMessage]) -> Vec<String> {
	messages.iter().map(|m| format!("{}@{}", m.content(), m.timestamp())).collect()
}

async fn next_matching(events: &mut broadcast::Receiver<ChannelEvent>, mut pred: impl FnMut(&ChannelEvent) -> bool) -> ChannelEvent {
	tokio::time::timeout(Duration::from_secs(60), async {
		loop {
			let event = events.recv().await.expect("event stream open");
			if pred(&event) {
				return event;
			}
		}
	})
	.await
	.expect("timed out waiting for channel event")
}

async fn next_message(events: &mut broadcast::Receiver<ChannelEvent>) -> ChatMessage {
	match next_matching(events, |e| matches!(e, ChannelEvent::Message(_))).await {
		ChannelEvent::Message(message) => message,
		_ => unreachable!(),
	}
}

async fn wait_for_state(events: &mut broadcast::Receiver<ChannelEvent>, state: ChannelState) {
	next_matching(events, |e| *e == ChannelEvent::StateChanged(state)).await;
}

fn drain(events: &mut broadcast::Receiver<ChannelEvent>) -> Vec<ChannelEvent> {
	let mut out = Vec::new();
	while let Ok(event) = events.try_recv() {
		out.push(event);
	}
	out
}

#[tokio::test]
async fn history_then_live_messages_in_arrival_order() {
	let mut h = harness(StaticHistory::new().with_group("teamA", vec![hist("x", "hi", "T1")]));

	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["hi@T1"]);
	assert_eq!(h.channel.active_group().await.unwrap().as_deref(), Some("teamA"));
	assert_eq!(h.controller.subscriptions(), vec![("sub-0".to_string(), "/topic/group/teamA".to_string())]);

	h.controller.deliver(&live("y", "yo", "T2"));
	let message = next_message(&mut h.events).await;
	assert_eq!(message.group_name(), "teamA");

	let log = h.channel.messages().await.unwrap();
	assert_eq!(contents(&log), ["hi@T1", "yo@T2"]);
	assert!(log.iter().all(|m| m.group_name() == "teamA"));
}

#[tokio::test]
async fn switching_groups_keeps_only_the_new_group() {
	let history = StaticHistory::new()
		.with_group("g1", vec![hist("x", "a1", "T1")])
		.with_group("g2", vec![hist("y", "b1", "T2"), hist("z", "b2", "T3")]);
	let mut h = harness(history);

	h.channel.connect().await.unwrap();
	h.channel.join_group("g1").await.unwrap();
	h.controller.deliver(&live("x", "a2", "T4"));
	next_message(&mut h.events).await;

	h.channel.join_group("g2").await.unwrap();
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["b1@T2", "b2@T3"]);

	let unsubscribed = h.controller.sent_frames(Command::Unsubscribe);
	assert_eq!(unsubscribed.len(), 1);
	assert_eq!(unsubscribed[0].get("id"), Some("sub-0"));
	assert_eq!(h.controller.subscriptions(), vec![("sub-1".to_string(), "/topic/group/g2".to_string())]);

	// Late frame for the old subscription, then a frame naming another group.
	h.controller.inject(Frame::message("/topic/group/g1", "sub-0", "m-old", live("x", "late", "T5")).encode());
	h.controller.deliver(r#"{"groupName":"g1","sender":"x","content":"wrong room","timestamp":"T6"}"#);
	h.controller.deliver(&live("y", "b3", "T7"));
	let message = next_message(&mut h.events).await;
	assert_eq!(message.content(), "b3");

	let log = h.channel.messages().await.unwrap();
	assert_eq!(contents(&log), ["b1@T2", "b2@T3", "b3@T7"]);
	assert!(log.iter().all(|m| m.group_name() == "g2"));
}

#[tokio::test(start_paused = true)]
async fn stale_history_is_discarded() {
	let history = StaticHistory::new()
		.with_group("a", vec![hist("x", "from a", "T1")])
		.with_group("b", vec![hist("y", "from b", "T2")]);
	history.hold("a");
	let h = harness(history);
	h.channel.connect().await.unwrap();

	let first = tokio::spawn({
		let channel = h.channel.clone();
		async move { channel.join_group("a").await }
	});
	while h.history.requests().is_empty() {
		tokio::task::yield_now().await;
	}

	h.channel.join_group("b").await.unwrap();
	assert_eq!(first.await.unwrap(), Err(Error::Superseded { group: "a".to_string() }));

	h.history.release("a");
	tokio::time::sleep(Duration::from_millis(50)).await;

	let log = h.channel.messages().await.unwrap();
	assert_eq!(contents(&log), ["from b@T2"]);
	assert!(log.iter().all(|m| m.group_name() == "b"));
	assert_eq!(h.channel.active_group().await.unwrap().as_deref(), Some("b"));
	assert_eq!(h.controller.subscriptions(), vec![("sub-0".to_string(), "/topic/group/b".to_string())]);
}

#[tokio::test]
async fn history_failure_degrades_to_empty_log() {
	let history = StaticHistory::new();
	history.fail("teamA");
	let mut h = harness(history);

	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert!(matches!(event, ChannelEvent::Error(Error::HistoryUnavailable { group, .. }) if group == "teamA"));
	assert_eq!(
		next_matching(&mut h.events, |e| matches!(e, ChannelEvent::HistoryLoaded { .. })).await,
		ChannelEvent::HistoryLoaded {
			group: "teamA".to_string(),
			count: 0
		}
	);
	assert!(h.channel.messages().await.unwrap().is_empty());
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Ready);

	h.controller.deliver(&live("y", "yo", "T2"));
	next_message(&mut h.events).await;
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["yo@T2"]);
}

#[tokio::test]
async fn echoed_send_appears_exactly_once() {
	let mut h = harness_with(config(), FakeConnectorBuilder::new().echo(true), StaticHistory::new());

	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	let sent = h.channel.send("hello").await.unwrap();
	assert_eq!(sent.sender(), "asha");
	assert_eq!(sent.group_name(), "teamA");
	assert_eq!(sent.kind(), MessageKind::Chat);

	let echoed = next_message(&mut h.events).await;
	assert_eq!(echoed, sent);

	let log = h.channel.messages().await.unwrap();
	assert_eq!(log, vec![sent]);

	let frames = h.controller.sent_frames(Command::Send);
	assert_eq!(frames.len(), 1);
	assert_eq!(frames[0].get("destination"), Some("/app/chat.sendMessage"));
}

#[tokio::test(start_paused = true)]
async fn send_is_rejected_outside_ready() {
	let (connector, controller) = FakeConnectorBuilder::new().fallback(OpenOutcome::Hang).build();
	let channel = SessionChannel::spawn(
		ChannelConfig {
			connect_timeout_ms: 60_000,
			..config()
		},
		Arc::new(connector),
		Arc::new(StaticHistory::new()),
	)
	.unwrap();

	assert_eq!(
		channel.send("hi").await,
		Err(Error::InvalidState {
			op: "send",
			state: ChannelState::Idle
		})
	);

	let connecting = tokio::spawn({
		let channel = channel.clone();
		async move { channel.connect().await }
	});
	while channel.state().await.unwrap() != ChannelState::Connecting {
		tokio::task::yield_now().await;
	}
	assert_eq!(
		channel.send("hi").await,
		Err(Error::InvalidState {
			op: "send",
			state: ChannelState::Connecting
		})
	);

	channel.close().await.unwrap();
	assert!(connecting.await.unwrap().is_err());
	assert_eq!(
		channel.send("hi").await,
		Err(Error::InvalidState {
			op: "send",
			state: ChannelState::Closed(CloseCause::Requested)
		})
	);

	assert!(controller.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_is_rejected_while_suspended() {
	let mut h = harness(StaticHistory::new());
	h.controller.set_fallback(OpenOutcome::Refuse);

	let connecting = tokio::spawn({
		let channel = h.channel.clone();
		async move { channel.connect().await }
	});
	wait_for_state(&mut h.events, ChannelState::Suspended).await;

	assert_eq!(
		h.channel.send("hi").await,
		Err(Error::InvalidState {
			op: "send",
			state: ChannelState::Suspended
		})
	);
	assert_eq!(h.channel.connection_state().await.unwrap(), ConnectionState::Reconnecting);
	assert!(h.controller.sent().is_empty());

	h.channel.close().await.unwrap();
	assert!(connecting.await.unwrap().is_err());
}

#[tokio::test]
async fn send_requires_a_group_and_content() {
	let h = harness(StaticHistory::new());
	h.channel.connect().await.unwrap();

	assert!(matches!(h.channel.send("hi").await, Err(Error::InvalidState { state: ChannelState::Ready, .. })));

	h.channel.join_group("teamA").await.unwrap();
	assert_eq!(h.channel.send("   ").await, Err(Error::EmptyContent));
	assert!(h.controller.sent_frames(Command::Send).is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_exactly_max_attempts_retries() {
	let h = harness(StaticHistory::new());
	h.controller.set_fallback(OpenOutcome::Refuse);

	let started = Instant::now();
	let result = h.channel.connect().await;

	assert_eq!(result, Err(Error::Exhausted { attempts: 3 }));
	assert_eq!(h.controller.opens(), 4);
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_millis(3_000) && elapsed < Duration::from_millis(3_100), "{elapsed:?}");
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Closed(CloseCause::Exhausted));
	assert_eq!(h.channel.connection_state().await.unwrap(), ConnectionState::Failed);

	tokio::time::sleep(Duration::from_secs(30)).await;
	assert_eq!(h.controller.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_closes_immediately() {
	let mut h = harness_with(
		ChannelConfig {
			reconnect: ReconnectPolicy::never(),
			..config()
		},
		FakeConnectorBuilder::new().fallback(OpenOutcome::Refuse),
		StaticHistory::new(),
	);

	let started = Instant::now();
	assert_eq!(h.channel.connect().await, Err(Error::Exhausted { attempts: 0 }));
	assert!(started.elapsed() < Duration::from_millis(1));
	assert_eq!(h.controller.opens(), 1);

	let events = drain(&mut h.events);
	assert_eq!(events.len(), 4, "{events:?}");
	assert_eq!(events[0], ChannelEvent::StateChanged(ChannelState::Connecting));
	assert!(matches!(events[1], ChannelEvent::Error(Error::Connect { .. })));
	assert_eq!(events[2], ChannelEvent::StateChanged(ChannelState::Closed(CloseCause::Exhausted)));
	assert_eq!(events[3], ChannelEvent::Error(Error::Exhausted { attempts: 0 }));
}

#[tokio::test(start_paused = true)]
async fn hanging_open_times_out() {
	let mut h = harness_with(
		ChannelConfig {
			reconnect: ReconnectPolicy::never(),
			..config()
		},
		FakeConnectorBuilder::new().fallback(OpenOutcome::Hang),
		StaticHistory::new(),
	);

	let started = Instant::now();
	assert_eq!(h.channel.connect().await, Err(Error::Exhausted { attempts: 0 }));
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_millis(2_000) && elapsed < Duration::from_millis(2_100), "{elapsed:?}");

	let timeout = drain(&mut h.events)
		.into_iter()
		.find(|e| matches!(e, ChannelEvent::Error(Error::Connect { .. })));
	assert!(matches!(timeout, Some(ChannelEvent::Error(Error::Connect { reason, .. })) if reason.contains("timed out")));
}

#[tokio::test(start_paused = true)]
async fn recovers_after_refused_opens() {
	let h = harness(StaticHistory::new());
	h.controller.script([OpenOutcome::Refuse, OpenOutcome::Refuse]);

	h.channel.connect().await.unwrap();
	assert_eq!(h.controller.opens(), 3);
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Ready);
}

#[tokio::test(start_paused = true)]
async fn reconnect_resubscribes_and_keeps_log() {
	let mut h = harness(StaticHistory::new().with_group("teamA", vec![hist("x", "hi", "T1")]));
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();
	h.controller.deliver(&live("y", "yo", "T2"));
	next_message(&mut h.events).await;

	h.controller.drop_link(Some("server restart"));
	wait_for_state(&mut h.events, ChannelState::Suspended).await;
	assert!(h.channel.send("lost").await.is_err());
	wait_for_state(&mut h.events, ChannelState::Ready).await;

	assert_eq!(h.controller.opens(), 2);
	assert_eq!(h.controller.subscriptions(), vec![("sub-1".to_string(), "/topic/group/teamA".to_string())]);
	assert_eq!(h.history.requests(), vec!["teamA"]);

	h.controller.deliver(&live("z", "back", "T3"));
	next_message(&mut h.events).await;
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["hi@T1", "yo@T2", "back@T3"]);
}

#[tokio::test(start_paused = true)]
async fn lost_link_exhausts_when_server_stays_down() {
	let mut h = harness_with(
		ChannelConfig {
			reconnect: ReconnectPolicy::new(2, 500),
			..config()
		},
		FakeConnectorBuilder::new(),
		StaticHistory::new(),
	);
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	h.controller.set_fallback(OpenOutcome::Refuse);
	h.controller.fail_link("connection reset");

	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(Error::Exhausted { .. }))).await;
	assert_eq!(event, ChannelEvent::Error(Error::Exhausted { attempts: 2 }));
	assert_eq!(h.controller.opens(), 3);
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Closed(CloseCause::Exhausted));
	assert_eq!(
		h.channel.connect().await,
		Err(Error::InvalidState {
			op: "connect",
			state: ChannelState::Closed(CloseCause::Exhausted)
		})
	);
}

#[tokio::test(start_paused = true)]
async fn link_loss_is_reported_before_reconnecting() {
	let mut h = harness(StaticHistory::new());
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();
	drain(&mut h.events);

	h.controller.fail_link("connection reset by peer");
	let mut seen = Vec::new();
	next_matching(&mut h.events, |e| {
		seen.push(e.clone());
		*e == ChannelEvent::StateChanged(ChannelState::Ready)
	})
	.await;
	assert_eq!(
		seen,
		[
			ChannelEvent::Error(Error::Disconnected("connection reset by peer".to_string())),
			ChannelEvent::StateChanged(ChannelState::Suspended),
			ChannelEvent::StateChanged(ChannelState::Ready),
		]
	);

	h.controller.drop_link(None);
	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert_eq!(event, ChannelEvent::Error(Error::Disconnected("closed by peer".to_string())));
}

#[tokio::test(start_paused = true)]
async fn join_on_a_dead_link_suspends_without_keeping_history() {
	let history = StaticHistory::new()
		.with_group("a", vec![hist("x", "old-a", "T1")])
		.with_group("b", vec![hist("y", "old-b", "T2")]);
	let mut h = harness(history);
	h.channel.connect().await.unwrap();
	h.channel.join_group("a").await.unwrap();

	// Writes fail before the reader notices anything.
	h.controller.sever();
	assert_eq!(h.channel.join_group("b").await, Err(Error::NotConnected));
	assert!(h.channel.messages().await.unwrap().is_empty());
	assert_eq!(h.channel.active_group().await.unwrap(), None);

	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(Error::Disconnected(_)))).await;
	assert!(matches!(event, ChannelEvent::Error(Error::Disconnected(reason)) if reason.contains("not connected")));
	wait_for_state(&mut h.events, ChannelState::Suspended).await;
	wait_for_state(&mut h.events, ChannelState::Ready).await;

	assert_eq!(h.controller.opens(), 2);
	assert!(h.controller.subscriptions().is_empty());
	assert!(h.channel.messages().await.unwrap().is_empty());

	h.channel.join_group("b").await.unwrap();
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["old-b@T2"]);
	assert_eq!(h.controller.subscriptions(), vec![("sub-2".to_string(), "/topic/group/b".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn send_on_a_dead_link_suspends_and_resubscribes() {
	let mut h = harness(StaticHistory::new().with_group("teamA", vec![hist("x", "hi", "T1")]));
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	h.controller.sever();
	assert_eq!(h.channel.send("anyone?").await, Err(Error::NotConnected));
	next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(Error::Disconnected(_)))).await;
	wait_for_state(&mut h.events, ChannelState::Suspended).await;
	wait_for_state(&mut h.events, ChannelState::Ready).await;

	assert_eq!(h.controller.subscriptions(), vec![("sub-1".to_string(), "/topic/group/teamA".to_string())]);
	assert_eq!(contents(&h.channel.messages().await.unwrap()), ["hi@T1"]);
	assert_eq!(h.history.requests(), vec!["teamA"]);
}

#[tokio::test]
async fn malformed_frames_are_reported_not_fatal() {
	let mut h = harness(StaticHistory::new());
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	h.controller.deliver("not json");
	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert!(matches!(event, ChannelEvent::Error(Error::Parse(_))));

	h.controller.deliver(r#"{"sender":"","content":"x","timestamp":"T"}"#);
	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert!(matches!(event, ChannelEvent::Error(Error::Parse(_))));

	h.controller.inject("GARBAGE\n\n\0");
	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert!(matches!(event, ChannelEvent::Error(Error::Parse(_))));

	h.controller.inject(Frame::error("quota exceeded").encode());
	let event = next_matching(&mut h.events, |e| matches!(e, ChannelEvent::Error(_))).await;
	assert_eq!(event, ChannelEvent::Error(Error::Server("quota exceeded".to_string())));

	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Ready);
	assert!(h.channel.messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn close_sends_leave_then_unsubscribe_then_disconnect() {
	let h = harness(StaticHistory::new());
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();
	h.controller.take_sent();

	h.channel.close().await.unwrap();

	let frames: Vec<Frame> = h.controller.sent().iter().map(|t| Frame::decode(t).unwrap()).collect();
	let commands: Vec<Command> = frames.iter().map(|f| f.command).collect();
	assert_eq!(commands, [Command::Send, Command::Unsubscribe, Command::Disconnect]);

	let leave = ChatMessage::decode(&frames[0].body).unwrap();
	assert_eq!(leave.kind(), MessageKind::Leave);
	assert_eq!(leave.content(), "asha left the chat");
	assert_eq!(leave.group_name(), "teamA");

	assert!(!h.controller.is_linked());
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Closed(CloseCause::Requested));
	assert_eq!(h.channel.connection_state().await.unwrap(), ConnectionState::Disconnected);

	h.channel.close().await.unwrap();
	assert_eq!(h.controller.sent().len(), 3);
	assert!(matches!(h.channel.connect().await, Err(Error::InvalidState { op: "connect", .. })));
	assert_eq!(h.channel.join_group("teamB").await, Err(Error::NotConnected));
}

#[tokio::test]
async fn leave_group_keeps_transport_open() {
	let h = harness(StaticHistory::new().with_group("teamA", vec![hist("x", "hi", "T1")]));
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	h.channel.leave_group().await.unwrap();

	assert!(h.channel.messages().await.unwrap().is_empty());
	assert_eq!(h.channel.active_group().await.unwrap(), None);
	assert!(h.controller.subscriptions().is_empty());
	assert_eq!(h.channel.state().await.unwrap(), ChannelState::Ready);

	let sends = h.controller.sent_frames(Command::Send);
	assert_eq!(sends.len(), 1);
	assert_eq!(ChatMessage::decode(&sends[0].body).unwrap().kind(), MessageKind::Leave);
	assert!(matches!(h.channel.send("hi").await, Err(Error::InvalidState { .. })));
}

#[tokio::test]
async fn announce_join_publishes_notice_after_subscribe() {
	let h = harness_with(
		ChannelConfig {
			announce_join: true,
			..config()
		},
		FakeConnectorBuilder::new(),
		StaticHistory::new(),
	);
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	let commands: Vec<Command> = h
		.controller
		.sent()
		.iter()
		.map(|t| Frame::decode(t).unwrap().command)
		.collect();
	assert_eq!(commands, [Command::Connect, Command::Subscribe, Command::Send]);

	let notice = ChatMessage::decode(&h.controller.sent_frames(Command::Send)[0].body).unwrap();
	assert_eq!(notice.kind(), MessageKind::Join);
	assert_eq!(notice.content(), "asha joined the chat");
}

#[tokio::test]
async fn join_requires_ready_and_a_name() {
	let h = harness(StaticHistory::new());
	assert_eq!(h.channel.join_group("teamA").await, Err(Error::NotConnected));
	assert_eq!(h.channel.join_group("  ").await, Err(Error::EmptyGroup));
	assert_eq!(h.channel.leave_group().await, Err(Error::NotConnected));
}

#[tokio::test]
async fn concurrent_connects_share_one_open() {
	let h = harness(StaticHistory::new());

	let (a, b) = tokio::join!(h.channel.connect(), h.channel.connect());
	assert_eq!(a, Ok(()));
	assert_eq!(b, Ok(()));
	assert_eq!(h.controller.opens(), 1);
	assert_eq!(h.channel.connect().await, Ok(()));
}

#[tokio::test]
async fn json_wire_routes_by_group_name() {
	let mut h = harness_with(
		ChannelConfig {
			wire: WireFormat::Json,
			..config()
		},
		FakeConnectorBuilder::new().echo(true),
		StaticHistory::new(),
	);
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();
	assert!(h.controller.sent().is_empty());

	h.controller.inject(r#"{"groupName":"teamB","sender":"x","content":"elsewhere","timestamp":"T1"}"#);
	let sent = h.channel.send("hello").await.unwrap();
	assert_eq!(h.controller.sent(), vec![sent.encode()]);

	assert_eq!(next_message(&mut h.events).await, sent);
	assert_eq!(h.channel.messages().await.unwrap(), vec![sent]);
}

#[tokio::test]
async fn dropping_every_handle_closes_the_channel() {
	let h = harness(StaticHistory::new());
	h.channel.connect().await.unwrap();
	h.channel.join_group("teamA").await.unwrap();

	let controller = h.controller.clone();
	drop(h);

	tokio::time::timeout(Duration::from_secs(5), async {
		while controller.sent_frames(Command::Disconnect).is_empty() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();
	assert!(!controller.is_linked());
	assert_eq!(controller.sent_frames(Command::Unsubscribe).len(), 1);
}
