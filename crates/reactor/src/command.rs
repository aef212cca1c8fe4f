// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Commands: caller-supplied functions executed on the reactor thread.
//!
//! A [`Command`] owns its body and the write side of a one-shot completion. The completion is
//! settled exactly once:
//! - [`Command::run`] executes the body and settles [`Outcome::Completed`] or
//!   [`Outcome::Panicked`]
//! - dropping the command settles [`Outcome::Discarded`] without running the body
//!
//! Settling consumes the [`Completion`], and an unsettled [`Completion`] settles itself on drop,
//! so a waiter can never be left hanging.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::error::{ReactorError, panic_message};

/// How a completion was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
	/// The body ran and returned a value.
	Completed(R),
	/// The body ran and panicked.
	Panicked(String),
	/// The body never ran.
	Discarded,
}

impl<R> Outcome<R> {
	pub fn into_result(self) -> Result<R, ReactorError> {
		match self {
			Outcome::Completed(value) => Ok(value),
			Outcome::Panicked(msg) => Err(ReactorError::Panicked(msg)),
			Outcome::Discarded => Err(ReactorError::Discarded),
		}
	}
}

/// Write side of a one-shot completion.
pub struct Completion<R> {
	tx: Option<Sender<Outcome<R>>>,
}

/// Read side of a one-shot completion.
pub struct CompletionHandle<R> {
	rx: Receiver<Outcome<R>>,
}

/// Create a connected completion pair.
pub fn completion<R>() -> (Completion<R>, CompletionHandle<R>) {
	let (tx, rx) = bounded(1);
	(
		Completion {
			tx: Some(tx),
		},
		CompletionHandle {
			rx,
		},
	)
}

impl<R> Completion<R> {
	/// Settle with `outcome`. The waiter may already be gone, which is not an error.
	pub fn settle(mut self, outcome: Outcome<R>) {
		if let Some(tx) = self.tx.take() {
			let _ = tx.send(outcome);
		}
	}

	pub fn complete(self, value: R) {
		self.settle(Outcome::Completed(value));
	}
}

impl<R> Drop for Completion<R> {
	fn drop(&mut self) {
		if let Some(tx) = self.tx.take() {
			let _ = tx.send(Outcome::Discarded);
		}
	}
}

impl<R> CompletionHandle<R> {
	/// Block until the completion is settled.
	pub fn wait(self) -> Outcome<R> {
		// Completion always sends before its sender drops; a bare disconnect still means "not run".
		self.rx.recv().unwrap_or(Outcome::Discarded)
	}

	/// Block until settled or `timeout` elapses. Returns `None` on timeout.
	pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<R>> {
		match self.rx.recv_timeout(timeout) {
			Ok(outcome) => Some(outcome),
			Err(RecvTimeoutError::Timeout) => None,
			Err(RecvTimeoutError::Disconnected) => Some(Outcome::Discarded),
		}
	}

	/// Non-blocking check.
	pub fn try_wait(&self) -> Option<Outcome<R>> {
		self.rx.try_recv().ok()
	}
}

/// A queued unit of work for the reactor thread.
pub(crate) struct Command {
	body: Box<dyn FnOnce() + Send>,
}

impl Command {
	/// Wrap `f`, returning the command and the handle its result is delivered to.
	pub(crate) fn new<F, R>(f: F) -> (Self, CompletionHandle<R>)
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		let (slot, handle) = completion();
		let body = move || {
			let outcome = match catch_unwind(AssertUnwindSafe(f)) {
				Ok(value) => Outcome::Completed(value),
				Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
			};
			slot.settle(outcome);
		};
		(
			Self {
				body: Box::new(body),
			},
			handle,
		)
	}

	pub(crate) fn run(self) {
		(self.body)();
	}
}
