// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Stall detection around dispatch steps.
//!
//! Every step the worker performs (running a command, delivering a scheduled entry, delivering a
//! message, waiting idle) is wrapped by a [`Diagnostics`] implementation together with a
//! category-specific budget. Overrunning a budget is an observability event only: the step is
//! never interrupted.

use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use tracing::warn;

use crate::stats::ReactorStats;

/// Hook wrapping each dispatch step with an elapsed-time check.
pub trait Diagnostics: Send + Sync + 'static {
	/// Run `action`, reporting when it takes longer than `budget`.
	fn time_it(&self, label: &'static str, budget: Duration, action: &mut dyn FnMut());
}

/// Default [`Diagnostics`]: logs a warning naming the reactor when a step overruns its budget.
#[derive(Debug, Clone)]
pub struct StallMonitor {
	name: Arc<str>,
}

impl StallMonitor {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl Diagnostics for StallMonitor {
	fn time_it(&self, label: &'static str, budget: Duration, action: &mut dyn FnMut()) {
		let started = Instant::now();
		action();
		let elapsed = started.elapsed();
		if elapsed > budget {
			warn!(
				reactor = %self.name,
				label,
				elapsed_ms = elapsed.as_millis() as u64,
				budget_ms = budget.as_millis() as u64,
				"reactor step exceeded its time budget"
			);
		}
	}
}

/// Run a value-returning step through a [`Diagnostics`] hook, counting overruns in `stats`.
pub(crate) fn timed<T>(
	diagnostics: &dyn Diagnostics,
	stats: &ReactorStats,
	label: &'static str,
	budget: Duration,
	f: impl FnOnce() -> T,
) -> T {
	let mut f = Some(f);
	let mut out = None;
	let started = Instant::now();
	diagnostics.time_it(label, budget, &mut || {
		if let Some(f) = f.take() {
			out = Some(f());
		}
	});
	if started.elapsed() > budget {
		stats.record_stall();
	}
	match (out, f) {
		(Some(value), _) => value,
		// a hook that skipped the action must not drop work
		(None, Some(f)) => f(),
		(None, None) => unreachable!("dispatch step taken without producing a value"),
	}
}
