// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The reactor engine.
//!
//! A [`Reactor`] owns one dedicated worker thread. Producer threads submit work through
//! [`post`](Reactor::post), [`post_at`](Reactor::post_at) and
//! [`synchronize`](Reactor::synchronize); the worker repeatedly picks the highest-priority
//! ready item and runs it:
//! 1. Commands (oldest first)
//! 2. Pending flush requests (drain the deferred lane)
//! 3. A due scheduled entry, delivered on lane 0
//! 4. The front of the first non-empty lane
//! 5. Otherwise, wait for a signal, the scheduled deadline, or the idle timeout
//!
//! All handler invocations and command bodies run on the worker thread, one at a time.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::{
		Arc, OnceLock,
		atomic::{AtomicU8, Ordering},
	},
	thread::{self, JoinHandle, ThreadId},
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use crate::{
	command::{Command, completion},
	config::ReactorConfig,
	diagnostics::{Diagnostics, StallMonitor, timed},
	error::{ReactorError, panic_message},
	handler::{Handler, WorkerContext},
	queue::{Step, WorkQueues},
	stats::{ReactorStats, StatsSnapshot},
};

/// Lifecycle of a reactor: `Created -> Running -> Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReactorState {
	Created = 0,
	Running = 1,
	Stopped = 2,
}

impl ReactorState {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => ReactorState::Created,
			1 => ReactorState::Running,
			_ => ReactorState::Stopped,
		}
	}
}

/// State shared between the reactor handle and its worker thread.
pub(crate) struct Shared<M: Send + 'static> {
	config: ReactorConfig,
	state: AtomicU8,
	queues: Mutex<WorkQueues<M>>,
	wake: Condvar,
	worker: OnceLock<ThreadId>,
	handler: Box<dyn Handler<M>>,
	diagnostics: Arc<dyn Diagnostics>,
	stats: ReactorStats,
}

impl<M: Send + 'static> Shared<M> {
	pub(crate) fn name(&self) -> &str {
		&self.config.name
	}

	fn state(&self) -> ReactorState {
		ReactorState::from_u8(self.state.load(Ordering::SeqCst))
	}

	fn is_active(&self) -> bool {
		self.state() == ReactorState::Running
	}

	fn is_worker_thread(&self) -> bool {
		self.worker.get().is_some_and(|id| *id == thread::current().id())
	}

	pub(crate) fn defer(&self, msg: M) {
		self.queues.lock().push_deferred(msg);
	}

	pub(crate) fn pending_deferred(&self) -> usize {
		self.queues.lock().pending_deferred()
	}

	/// Handle deferred messages until the lane is empty, including any deferred while draining.
	///
	/// Stops early once the reactor is no longer running; what is left is dropped by the
	/// shutdown drain.
	pub(crate) fn drain_deferred(&self) {
		loop {
			let next = {
				let mut queues = self.queues.lock();
				if self.is_active() {
					queues.pop_deferred()
				} else {
					None
				}
			};
			let Some(msg) = next else {
				break;
			};
			timed(&*self.diagnostics, &self.stats, "deferred", self.config.message_budget, || {
				self.deliver(msg, 0)
			});
			self.stats.record_deferred();
		}
	}

	fn deliver(&self, msg: M, lane: usize) {
		let ctx = WorkerContext::new(self, lane);
		match catch_unwind(AssertUnwindSafe(|| self.handler.handle(msg, lane, &ctx))) {
			Ok(Ok(())) => {}
			Ok(Err(err)) => {
				self.stats.record_failure();
				error!(reactor = %self.name(), lane, error = %err, "handler failed");
			}
			Err(payload) => {
				self.stats.record_failure();
				error!(
					reactor = %self.name(),
					lane,
					panic = %panic_message(payload.as_ref()),
					"handler panicked"
				);
			}
		}
	}

	fn run_command(&self, command: Command) {
		timed(&*self.diagnostics, &self.stats, "command", self.config.command_budget, || command.run());
		self.stats.record_command();
	}

	/// Worker main loop.
	fn run(&self) {
		let _ = self.worker.set(thread::current().id());
		debug!(reactor = %self.name(), "reactor worker starting");

		let exit = catch_unwind(AssertUnwindSafe(|| {
			while let Some(step) = self.next_step() {
				self.dispatch(step);
			}
		}));
		if let Err(payload) = exit {
			// nothing will serve the queues any more: refuse new work and release every waiter
			self.state.store(ReactorState::Stopped as u8, Ordering::SeqCst);
			error!(
				reactor = %self.name(),
				panic = %panic_message(payload.as_ref()),
				"reactor worker panicked, shutting down"
			);
		}

		self.shutdown_drain();
		debug!(reactor = %self.name(), "reactor worker stopped");
	}

	/// Block until a step is ready. Returns `None` once the reactor is no longer active.
	fn next_step(&self) -> Option<Step<M>> {
		let mut queues = self.queues.lock();
		loop {
			if !self.is_active() {
				return None;
			}

			if let Some(step) = queues.next_step(Instant::now(), self.config.coalesce_scheduled) {
				return Some(step);
			}

			let limit = Instant::now().checked_add(self.config.idle_timeout);
			let until = match (queues.deadline(), limit) {
				(Some(deadline), Some(limit)) => Some(deadline.min(limit)),
				(deadline, limit) => deadline.or(limit),
			};
			timed(&*self.diagnostics, &self.stats, "idle", self.config.idle_budget, || match until {
				Some(until) => {
					self.wake.wait_until(&mut queues, until);
				}
				None => self.wake.wait(&mut queues),
			});
		}
	}

	fn dispatch(&self, step: Step<M>) {
		match step {
			Step::Command(command) => {
				trace!(reactor = %self.name(), "running command");
				self.run_command(command);
			}
			Step::Flush => {
				trace!(reactor = %self.name(), "flushing deferred lane");
				self.drain_deferred();
				let waiters = self.queues.lock().take_flush_waiters();
				for waiter in waiters {
					waiter.complete(());
				}
			}
			Step::Scheduled {
				payload,
				coalesced,
			} => {
				if coalesced > 0 {
					warn!(
						reactor = %self.name(),
						dropped = coalesced,
						"dropped scheduled entries sharing the delivered timestamp"
					);
				}
				trace!(reactor = %self.name(), "delivering scheduled entry");
				timed(&*self.diagnostics, &self.stats, "scheduled", self.config.scheduled_budget, || {
					self.deliver(payload, 0)
				});
				self.stats.record_scheduled();
			}
			Step::Message {
				payload,
				lane,
			} => {
				trace!(reactor = %self.name(), lane, "delivering message");
				timed(&*self.diagnostics, &self.stats, "message", self.config.message_budget, || {
					self.deliver(payload, lane)
				});
				self.stats.record_message();
			}
		}
	}

	/// Run every queued command, drop all pending messages, release flush waiters.
	///
	/// Safe to call repeatedly; later calls find nothing to do.
	fn shutdown_drain(&self) {
		loop {
			let commands = self.queues.lock().take_commands();
			if commands.is_empty() {
				break;
			}
			for command in commands {
				// a command dropped by a failing hook still settles its caller as discarded
				if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.run_command(command))) {
					error!(
						reactor = %self.name(),
						panic = %panic_message(payload.as_ref()),
						"command failed during shutdown"
					);
				}
			}
		}

		let (cleared, waiters) = {
			let mut queues = self.queues.lock();
			(queues.clear(), queues.take_flush_waiters())
		};

		let released = waiters.len();
		for waiter in waiters {
			waiter.complete(());
		}

		if cleared.total() > 0 || released > 0 {
			self.stats.record_dropped(cleared.total());
			debug!(
				reactor = %self.name(),
				messages = cleared.messages,
				deferred = cleared.deferred,
				scheduled = cleared.scheduled,
				flush_waiters = released,
				"discarded pending work on shutdown"
			);
		}
	}
}

/// Single-threaded active object.
///
/// # Example
///
/// ```ignore
/// let reactor = Reactor::new(
///     ReactorConfig::new().name("notary").lanes(2),
///     handler_fn(|msg: Request, lane, _ctx| process(msg, lane)),
/// );
/// reactor.start();
/// reactor.post(Request::Ping);
/// let depth = reactor.synchronize(|| inspect_state())?;
/// reactor.stop();
/// ```
///
/// A handler that keeps a reference back to its own reactor should hold a `Weak`: the reactor
/// owns the handler.
pub struct Reactor<M: Send + 'static> {
	shared: Arc<Shared<M>>,
	join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> Reactor<M> {
	/// Create a reactor reporting stalls through a [`StallMonitor`] named after the config.
	pub fn new(config: ReactorConfig, handler: impl Handler<M>) -> Self {
		let diagnostics = Arc::new(StallMonitor::new(config.name.as_str()));
		Self::with_diagnostics(config, handler, diagnostics)
	}

	/// Create a reactor with an injected [`Diagnostics`] hook.
	pub fn with_diagnostics(
		config: ReactorConfig,
		handler: impl Handler<M>,
		diagnostics: Arc<dyn Diagnostics>,
	) -> Self {
		let queues = WorkQueues::new(config.lanes, !config.gate_commands);
		Self {
			shared: Arc::new(Shared {
				config,
				state: AtomicU8::new(ReactorState::Created as u8),
				queues: Mutex::new(queues),
				wake: Condvar::new(),
				worker: OnceLock::new(),
				handler: Box::new(handler),
				diagnostics,
				stats: ReactorStats::default(),
			}),
			join_handle: Mutex::new(None),
		}
	}

	/// Spawn the worker thread. Fails if the reactor was already started or stopped.
	pub fn start(&self) -> bool {
		// held across the spawn so a concurrent stop() always finds the handle to join
		let mut join_handle = self.join_handle.lock();

		if self
			.shared
			.state
			.compare_exchange(
				ReactorState::Created as u8,
				ReactorState::Running as u8,
				Ordering::SeqCst,
				Ordering::SeqCst,
			)
			.is_err()
		{
			debug!(reactor = %self.name(), state = ?self.state(), "start rejected");
			return false;
		}

		let shared = self.shared.clone();
		match thread::Builder::new().name(self.shared.config.name.clone()).spawn(move || shared.run()) {
			Ok(handle) => {
				*join_handle = Some(handle);
				debug!(reactor = %self.name(), lanes = self.lanes(), "reactor started");
				true
			}
			Err(err) => {
				let err = ReactorError::Spawn(err);
				error!(reactor = %self.name(), error = %err, "reactor failed to start");
				self.shared.state.store(ReactorState::Stopped as u8, Ordering::SeqCst);
				self.shared.shutdown_drain();
				false
			}
		}
	}

	/// Stop the reactor.
	///
	/// Queued commands are still run, pending messages are dropped, and every `flush` waiter is
	/// released. When called from another thread, returns after the worker has exited.
	/// Returns `false` if the reactor was already stopped.
	pub fn stop(&self) -> bool {
		let previous = ReactorState::from_u8(self.shared.state.swap(ReactorState::Stopped as u8, Ordering::SeqCst));
		if previous == ReactorState::Stopped {
			return false;
		}

		{
			// taking the lock orders the flip before the worker's next idle check
			let _queues = self.shared.queues.lock();
			self.shared.wake.notify_all();
		}

		debug!(reactor = %self.name(), from = ?previous, "reactor stopping");

		if previous == ReactorState::Created || self.shared.is_worker_thread() {
			self.shared.shutdown_drain();
			return true;
		}

		let handle = self.join_handle.lock().take();
		if let Some(handle) = handle {
			if handle.join().is_err() {
				error!(reactor = %self.name(), "reactor worker terminated by panic");
			}
		}
		self.shared.shutdown_drain();
		debug!(reactor = %self.name(), "reactor stopped");
		true
	}

	/// Post a message to lane 0.
	pub fn post(&self, msg: M) -> bool {
		self.post_lane(msg, 0)
	}

	/// Post a message to `lane`. Fails if the reactor is not running or the lane does not exist.
	pub fn post_lane(&self, msg: M, lane: usize) -> bool {
		if !self.shared.is_active() {
			debug!(reactor = %self.name(), lane, "message rejected, reactor not running");
			return false;
		}

		{
			let mut queues = self.shared.queues.lock();
			if !self.shared.is_active() {
				return false;
			}
			if queues.push_message(msg, lane).is_err() {
				debug!(reactor = %self.name(), lane, lanes = queues.lane_count(), "message for unknown lane rejected");
				return false;
			}
		}

		self.shared.wake.notify_one();
		true
	}

	/// Schedule a message for delivery on lane 0 at `at`.
	///
	/// Only one scheduled entry may be outstanding: fails while a previous one is undelivered.
	pub fn post_at(&self, msg: M, at: Instant) -> bool {
		if !self.shared.is_active() {
			debug!(reactor = %self.name(), "scheduled entry rejected, reactor not running");
			return false;
		}

		{
			let mut queues = self.shared.queues.lock();
			if !self.shared.is_active() {
				return false;
			}
			if queues.push_scheduled(msg, at).is_err() {
				debug!(reactor = %self.name(), "scheduled entry rejected, timer slot busy");
				return false;
			}
		}

		self.shared.wake.notify_one();
		true
	}

	/// Schedule a message for delivery after `delay`. Fails if `delay` is beyond what an
	/// [`Instant`] can represent.
	pub fn post_after(&self, msg: M, delay: Duration) -> bool {
		match Instant::now().checked_add(delay) {
			Some(at) => self.post_at(msg, at),
			None => {
				debug!(reactor = %self.name(), delay_ms = delay.as_millis() as u64, "scheduled entry rejected, delay out of range");
				false
			}
		}
	}

	/// Run `f` on the reactor thread and return its result.
	///
	/// Runs `f` inline when called from the reactor thread itself or when the reactor is not
	/// running, so calling this from inside a handler never deadlocks. Otherwise `f` is queued
	/// ahead of all messages and the caller blocks until it has run. A panic in `f` is returned
	/// as [`ReactorError::Panicked`].
	pub fn synchronize<F, R>(&self, f: F) -> Result<R, ReactorError>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		let (command, handle) = Command::new(f);

		if !self.shared.is_worker_thread() && self.shared.is_active() {
			let mut queues = self.shared.queues.lock();
			if self.shared.is_active() {
				queues.push_command(command);
				drop(queues);
				self.shared.wake.notify_one();
				return handle.wait().into_result();
			}
		}

		command.run();
		handle.wait().into_result()
	}

	/// Drain the deferred lane.
	///
	/// From the reactor thread the lane is drained in place. From any other thread the caller
	/// blocks until the worker has drained it, or until the reactor stops (in which case the
	/// deferred messages are dropped, not handled).
	pub fn flush(&self) {
		if self.shared.is_worker_thread() {
			self.shared.drain_deferred();
			return;
		}
		if !self.shared.is_active() {
			return;
		}

		let (waiter, handle) = completion();
		{
			let mut queues = self.shared.queues.lock();
			if !self.shared.is_active() {
				return;
			}
			queues.push_flush_waiter(waiter);
		}

		self.shared.wake.notify_one();
		let _ = handle.wait();
	}

	/// Open the command gate configured with [`ReactorConfig::gate_commands`].
	pub fn release_commands(&self) {
		let opened = self.shared.queues.lock().open_commands();
		if opened {
			debug!(reactor = %self.name(), "command processing released");
			self.shared.wake.notify_one();
		}
	}

	pub fn is_active(&self) -> bool {
		self.shared.is_active()
	}

	pub fn state(&self) -> ReactorState {
		self.shared.state()
	}

	/// Whether the caller is running on this reactor's worker thread.
	pub fn is_worker_thread(&self) -> bool {
		self.shared.is_worker_thread()
	}

	pub fn name(&self) -> &str {
		self.shared.name()
	}

	pub fn lanes(&self) -> usize {
		self.shared.config.lanes
	}

	pub fn stats(&self) -> StatsSnapshot {
		self.shared.stats.snapshot()
	}
}

impl<M: Send + 'static> Drop for Reactor<M> {
	fn drop(&mut self) {
		self.stop();
		if !self.shared.is_worker_thread() {
			if let Some(handle) = self.join_handle.get_mut().take() {
				let _ = handle.join();
			}
		}
	}
}
