// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::any::Any;

/// Error returned by a [`Handler`](crate::Handler) for a single message.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of handling a single message.
pub type HandlerResult = Result<(), HandlerError>;

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
	/// The command was abandoned before it ran.
	#[error("command discarded before execution")]
	Discarded,

	/// The command body panicked on the reactor thread.
	#[error("command panicked: {0}")]
	Panicked(String),

	/// The worker thread could not be spawned.
	#[error("failed to spawn reactor worker: {0}")]
	Spawn(#[source] std::io::Error),
}

/// Render a panic payload for logs and errors.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		msg.to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"unknown panic payload".to_string()
	}
}
