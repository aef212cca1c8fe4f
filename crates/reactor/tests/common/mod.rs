// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![allow(dead_code)]

use std::{
	sync::{Arc, OnceLock, Weak},
	thread,
	time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use reifydb_reactor::{HandlerResult, Reactor, WorkerContext};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
		)
		.with_test_writer()
		.try_init();
}

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if condition() {
			return true;
		}
		thread::sleep(Duration::from_millis(5));
	}
	condition()
}

/// Message vocabulary shared by the behavioral tests.
pub enum Msg {
	/// Record a value.
	Record(u64),
	/// Sleep, then record a value.
	SlowRecord(u64, Duration),
	/// Park the worker until the receiver yields (or disconnects).
	Block(Receiver<()>),
	/// Defer a `Record` of the value.
	Defer(u64),
	/// Defer a `Record` of each value, then flush in place.
	DeferAndFlush(Vec<u64>),
	/// Defer each message as is.
	DeferAll(Vec<Msg>),
	/// Reply on the channel once reached.
	Ping(Sender<()>),
	/// Return an error from the handler.
	Fail,
	/// Panic in the handler.
	Panic,
	/// Call back into the owning reactor.
	Reenter(Box<dyn FnOnce(&Reactor<Msg>) + Send>),
}

/// Everything the handler observed, in delivery order.
#[derive(Clone, Default)]
pub struct Log {
	entries: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl Log {
	pub fn values(&self) -> Vec<u64> {
		self.entries.lock().iter().map(|(value, _)| *value).collect()
	}

	pub fn entries(&self) -> Vec<(u64, usize)> {
		self.entries.lock().clone()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	fn push(&self, value: u64, lane: usize) {
		self.entries.lock().push((value, lane));
	}
}

/// Late-bound back reference from the handler to its reactor.
pub type SelfRef = Arc<OnceLock<Weak<Reactor<Msg>>>>;

pub struct Recorder {
	pub log: Log,
	pub reactor: SelfRef,
}

impl reifydb_reactor::Handler<Msg> for Recorder {
	fn handle(&self, msg: Msg, lane: usize, ctx: &WorkerContext<'_, Msg>) -> HandlerResult {
		match msg {
			Msg::Record(value) => self.log.push(value, lane),
			Msg::SlowRecord(value, pause) => {
				thread::sleep(pause);
				self.log.push(value, lane);
			}
			Msg::Block(rx) => {
				let _ = rx.recv_timeout(TIMEOUT);
			}
			Msg::Defer(value) => ctx.defer(Msg::Record(value)),
			Msg::DeferAndFlush(values) => {
				for value in values {
					ctx.defer(Msg::Record(value));
				}
				ctx.flush();
			}
			Msg::DeferAll(msgs) => {
				for msg in msgs {
					ctx.defer(msg);
				}
			}
			Msg::Ping(tx) => {
				let _ = tx.send(());
			}
			Msg::Fail => return Err("rejected message".into()),
			Msg::Panic => panic!("handler exploded"),
			Msg::Reenter(f) => {
				if let Some(reactor) = self.reactor.get().and_then(Weak::upgrade) {
					f(&reactor);
				}
			}
		}
		Ok(())
	}
}

/// Build a reactor driven by a [`Recorder`], wired with a back reference to itself.
pub fn recorder(config: reifydb_reactor::ReactorConfig) -> (Arc<Reactor<Msg>>, Log) {
	init_tracing();
	let log = Log::default();
	let slot: SelfRef = Arc::new(OnceLock::new());
	let reactor = Arc::new(Reactor::new(
		config,
		Recorder {
			log: log.clone(),
			reactor: slot.clone(),
		},
	));
	let _ = slot.set(Arc::downgrade(&reactor));
	(reactor, log)
}

/// Park the worker; the returned sender releases it when dropped or sent to.
pub fn block(reactor: &Reactor<Msg>) -> Sender<()> {
	let (tx, rx) = crossbeam_channel::bounded(1);
	assert!(reactor.post(Msg::Block(rx)));
	tx
}

/// Wait until every lane-0 message posted before this call has been handled.
pub fn settle(reactor: &Reactor<Msg>) {
	let (tx, rx) = crossbeam_channel::bounded(1);
	assert!(reactor.post(Msg::Ping(tx)));
	rx.recv_timeout(TIMEOUT).expect("reactor did not reach ping");
}
