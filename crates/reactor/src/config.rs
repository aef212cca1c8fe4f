// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Reactor configuration.

use std::time::Duration;

/// Configuration for a [`Reactor`](crate::Reactor).
///
/// Built in code by the owning component; every field has a default.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
	/// Worker thread name, also attached to every log event.
	///
	/// Default: "reactor"
	pub name: String,

	/// Number of immediate-message lanes. Lane 0 is always present.
	///
	/// Default: 1
	pub lanes: usize,

	/// Stall budget for running one command.
	pub command_budget: Duration,

	/// Stall budget for delivering one scheduled entry.
	pub scheduled_budget: Duration,

	/// Stall budget for delivering one immediate or deferred message.
	pub message_budget: Duration,

	/// Stall budget for one idle wait.
	pub idle_budget: Duration,

	/// Upper bound on a single idle wait, so a missed wake-up cannot stall the worker.
	/// A value too large to add to an `Instant` leaves the wait bounded only by the scheduled
	/// deadline and wake-ups.
	///
	/// Default: 10s
	pub idle_timeout: Duration,

	/// Drop, without delivery, further scheduled entries sharing the exact timestamp of the
	/// entry just delivered.
	///
	/// Default: false (every due entry is delivered)
	pub coalesce_scheduled: bool,

	/// Hold queued commands until [`Reactor::release_commands`](crate::Reactor::release_commands).
	///
	/// Default: false
	pub gate_commands: bool,
}

impl Default for ReactorConfig {
	fn default() -> Self {
		Self {
			name: "reactor".to_string(),
			lanes: 1,
			command_budget: Duration::from_secs(1),
			scheduled_budget: Duration::from_secs(1),
			message_budget: Duration::from_secs(1),
			idle_budget: Duration::from_secs(15),
			idle_timeout: Duration::from_secs(10),
			coalesce_scheduled: false,
			gate_commands: false,
		}
	}
}

impl ReactorConfig {
	/// Create a new config with default values.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the worker name.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();
		self
	}

	/// Set the number of lanes. Values below 1 are clamped to 1.
	pub fn lanes(mut self, lanes: usize) -> Self {
		self.lanes = lanes.max(1);
		self
	}

	pub fn command_budget(mut self, budget: Duration) -> Self {
		self.command_budget = budget;
		self
	}

	pub fn scheduled_budget(mut self, budget: Duration) -> Self {
		self.scheduled_budget = budget;
		self
	}

	pub fn message_budget(mut self, budget: Duration) -> Self {
		self.message_budget = budget;
		self
	}

	pub fn idle_budget(mut self, budget: Duration) -> Self {
		self.idle_budget = budget;
		self
	}

	/// Set the idle wait bound. A zero timeout is raised to 1ms to keep the worker from spinning.
	pub fn idle_timeout(mut self, timeout: Duration) -> Self {
		self.idle_timeout = timeout.max(Duration::from_millis(1));
		self
	}

	pub fn coalesce_scheduled(mut self, coalesce: bool) -> Self {
		self.coalesce_scheduled = coalesce;
		self
	}

	pub fn gate_commands(mut self, gate: bool) -> Self {
		self.gate_commands = gate;
		self
	}
}
