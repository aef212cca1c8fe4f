// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Single-threaded active-object scheduler.
//!
//! Long-lived service components (the notary server loop, socket handlers, wallet workers) are
//! built on a [`Reactor`]: one dedicated worker thread that runs all of the component's handling
//! code, fed by:
//! - fire-and-forget messages on indexed lanes ([`Reactor::post`], [`Reactor::post_lane`])
//! - a single-slot scheduled message ([`Reactor::post_at`])
//! - self-deferred messages, drained on flush ([`WorkerContext::defer`], [`Reactor::flush`])
//! - synchronous cross-thread calls ([`Reactor::synchronize`])
//!
//! Handling code never runs concurrently with itself, and every blocked caller is released by
//! the time [`Reactor::stop`] returns.

pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handler;
mod queue;
pub mod reactor;
pub mod stats;

pub use command::{Completion, CompletionHandle, Outcome, completion};
pub use config::ReactorConfig;
pub use diagnostics::{Diagnostics, StallMonitor};
pub use error::{HandlerError, HandlerResult, ReactorError};
pub use handler::{Handler, WorkerContext, handler_fn};
pub use reactor::{Reactor, ReactorState};
pub use stats::{ReactorStats, StatsSnapshot};
