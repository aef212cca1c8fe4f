// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the worker. Relaxed ordering: these are metrics, not synchronization.
#[derive(Debug, Default)]
pub struct ReactorStats {
	messages: AtomicU64,
	scheduled: AtomicU64,
	deferred: AtomicU64,
	commands: AtomicU64,
	handler_failures: AtomicU64,
	dropped_on_shutdown: AtomicU64,
	stalls: AtomicU64,
}

/// Point-in-time copy of [`ReactorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
	/// Immediate messages delivered to the handler.
	pub messages: u64,
	/// Scheduled entries delivered to the handler.
	pub scheduled: u64,
	/// Deferred messages delivered to the handler.
	pub deferred: u64,
	/// Commands run, including those run during shutdown.
	pub commands: u64,
	/// Deliveries where the handler returned an error or panicked.
	pub handler_failures: u64,
	/// Messages discarded by `stop()` without delivery.
	pub dropped_on_shutdown: u64,
	/// Dispatch steps that exceeded their budget.
	pub stalls: u64,
}

impl ReactorStats {
	pub(crate) fn record_message(&self) {
		self.messages.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_scheduled(&self) {
		self.scheduled.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_deferred(&self) {
		self.deferred.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_command(&self) {
		self.commands.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.handler_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_dropped(&self, count: usize) {
		self.dropped_on_shutdown.fetch_add(count as u64, Ordering::Relaxed);
	}

	pub(crate) fn record_stall(&self) {
		self.stalls.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			messages: self.messages.load(Ordering::Relaxed),
			scheduled: self.scheduled.load(Ordering::Relaxed),
			deferred: self.deferred.load(Ordering::Relaxed),
			commands: self.commands.load(Ordering::Relaxed),
			handler_failures: self.handler_failures.load(Ordering::Relaxed),
			dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
			stalls: self.stalls.load(Ordering::Relaxed),
		}
	}
}
