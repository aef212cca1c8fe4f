// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Message handling on the reactor thread.

use crate::{error::HandlerResult, reactor::Shared};

/// The business logic of an owning component (notary loop, socket handler, wallet worker).
///
/// `handle` is only ever invoked on the reactor's worker thread and never concurrently with
/// itself or with a command body, so implementations need no locking of their own beyond what
/// `Sync` demands. `Sync` is required because [`WorkerContext::flush`] re-enters the handler
/// while an outer `handle` call is still on the stack: keep `RefCell`-style borrows short.
///
/// # Example
///
/// ```ignore
/// struct Notary {
///     processed: AtomicU64,
/// }
///
/// impl Handler<Request> for Notary {
///     fn handle(&self, msg: Request, lane: usize, ctx: &WorkerContext<'_, Request>) -> HandlerResult {
///         if msg.needs_followup() {
///             ctx.defer(msg.followup());
///         }
///         self.processed.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
pub trait Handler<M: Send + 'static>: Send + Sync + 'static {
	/// Handle one message delivered on `lane`.
	///
	/// Scheduled and deferred messages arrive on lane 0. Returning `Err` (or panicking) is logged
	/// by the reactor; the loop carries on with the next message.
	fn handle(&self, msg: M, lane: usize, ctx: &WorkerContext<'_, M>) -> HandlerResult;
}

impl<M, F> Handler<M> for F
where
	M: Send + 'static,
	F: Fn(M, usize, &WorkerContext<'_, M>) -> HandlerResult + Send + Sync + 'static,
{
	fn handle(&self, msg: M, lane: usize, ctx: &WorkerContext<'_, M>) -> HandlerResult {
		self(msg, lane, ctx)
	}
}

/// Pin a closure to the [`Handler`] signature so its arguments need no annotations.
pub fn handler_fn<M, F>(f: F) -> F
where
	M: Send + 'static,
	F: Fn(M, usize, &WorkerContext<'_, M>) -> HandlerResult + Send + Sync + 'static,
{
	f
}

/// Capabilities available only while running on the reactor thread.
///
/// A context is created by the worker for each delivery and cannot be obtained elsewhere, which
/// makes "defer only from inside the handler" a property of the types rather than of callers.
pub struct WorkerContext<'a, M: Send + 'static> {
	shared: &'a Shared<M>,
	lane: usize,
}

impl<'a, M: Send + 'static> WorkerContext<'a, M> {
	pub(crate) fn new(shared: &'a Shared<M>, lane: usize) -> Self {
		Self {
			shared,
			lane,
		}
	}

	/// Re-submit a message to the deferred lane.
	///
	/// Deferred messages are not dispatched by the loop on their own; they are handled on the
	/// next [`flush`](Self::flush) or [`Reactor::flush`](crate::Reactor::flush).
	pub fn defer(&self, msg: M) {
		self.shared.defer(msg);
	}

	/// Drain the deferred lane in place, handling each entry before returning.
	///
	/// Once the reactor has been stopped the remaining entries are left for shutdown to drop.
	pub fn flush(&self) {
		self.shared.drain_deferred();
	}

	/// Lane of the message being handled.
	pub fn lane(&self) -> usize {
		self.lane
	}

	pub fn reactor_name(&self) -> &str {
		self.shared.name()
	}

	/// Messages currently waiting in the deferred lane.
	pub fn pending_deferred(&self) -> usize {
		self.shared.pending_deferred()
	}
}
