// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Pending work of a reactor.
//!
//! All queues live in one [`WorkQueues`] value guarded by a single mutex, so the scheduled heap
//! and its `deadline` mirror are never observed out of step.

use std::{
	cmp::Ordering,
	collections::{BinaryHeap, VecDeque},
	time::Instant,
};

use crate::command::{Command, Completion};

/// A message waiting for its scheduled time.
pub(crate) struct TimedEntry<M> {
	pub payload: M,
	pub at: Instant,
	/// Insertion sequence, breaks ties FIFO.
	seq: u64,
}

impl<M> Eq for TimedEntry<M> {}

impl<M> PartialEq for TimedEntry<M> {
	fn eq(&self, other: &Self) -> bool {
		self.at == other.at && self.seq == other.seq
	}
}

impl<M> Ord for TimedEntry<M> {
	// BinaryHeap is a max-heap, so we reverse the ordering to get a min-heap by time.
	fn cmp(&self, other: &Self) -> Ordering {
		other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
	}
}

impl<M> PartialOrd for TimedEntry<M> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// The next thing the worker should do, chosen under the lock.
pub(crate) enum Step<M> {
	Command(Command),
	Flush,
	Scheduled {
		payload: M,
		/// Entries dropped by coalescing.
		coalesced: usize,
	},
	Message {
		payload: M,
		lane: usize,
	},
}

/// Counts of work discarded by [`WorkQueues::clear`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cleared {
	pub messages: usize,
	pub deferred: usize,
	pub scheduled: usize,
}

impl Cleared {
	pub fn total(&self) -> usize {
		self.messages + self.deferred + self.scheduled
	}
}

pub(crate) struct WorkQueues<M> {
	lanes: Vec<VecDeque<M>>,
	deferred: VecDeque<M>,
	scheduled: BinaryHeap<TimedEntry<M>>,
	/// Earliest scheduled time. `None` iff `scheduled` is empty.
	deadline: Option<Instant>,
	next_seq: u64,
	commands: VecDeque<Command>,
	commands_open: bool,
	flush_waiters: Vec<Completion<()>>,
}

impl<M> WorkQueues<M> {
	pub fn new(lanes: usize, commands_open: bool) -> Self {
		Self {
			lanes: (0..lanes.max(1)).map(|_| VecDeque::new()).collect(),
			deferred: VecDeque::new(),
			scheduled: BinaryHeap::new(),
			deadline: None,
			next_seq: 0,
			commands: VecDeque::new(),
			commands_open,
			flush_waiters: Vec::new(),
		}
	}

	pub fn lane_count(&self) -> usize {
		self.lanes.len()
	}

	/// Append to `lane`. Returns the message back if the lane does not exist.
	pub fn push_message(&mut self, msg: M, lane: usize) -> Result<(), M> {
		match self.lanes.get_mut(lane) {
			Some(queue) => {
				queue.push_back(msg);
				Ok(())
			}
			None => Err(msg),
		}
	}

	/// Accept a scheduled entry only when no other entry is outstanding.
	pub fn push_scheduled(&mut self, msg: M, at: Instant) -> Result<(), M> {
		if !self.scheduled.is_empty() {
			return Err(msg);
		}
		let seq = self.next_seq;
		self.next_seq += 1;
		self.scheduled.push(TimedEntry {
			payload: msg,
			at,
			seq,
		});
		self.deadline = Some(self.deadline.map_or(at, |deadline| deadline.min(at)));
		Ok(())
	}

	pub fn push_deferred(&mut self, msg: M) {
		self.deferred.push_back(msg);
	}

	pub fn pop_deferred(&mut self) -> Option<M> {
		self.deferred.pop_front()
	}

	pub fn push_command(&mut self, command: Command) {
		self.commands.push_back(command);
	}

	pub fn take_commands(&mut self) -> VecDeque<Command> {
		std::mem::take(&mut self.commands)
	}

	pub fn open_commands(&mut self) -> bool {
		!std::mem::replace(&mut self.commands_open, true)
	}

	pub fn push_flush_waiter(&mut self, waiter: Completion<()>) {
		self.flush_waiters.push(waiter);
	}

	pub fn take_flush_waiters(&mut self) -> Vec<Completion<()>> {
		std::mem::take(&mut self.flush_waiters)
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn pending_scheduled(&self) -> usize {
		self.scheduled.len()
	}

	pub fn pending_deferred(&self) -> usize {
		self.deferred.len()
	}

	/// Pick the highest-priority ready step: commands, flush requests, a due scheduled entry,
	/// then the first non-empty lane.
	pub fn next_step(&mut self, now: Instant, coalesce: bool) -> Option<Step<M>> {
		if self.commands_open {
			if let Some(command) = self.commands.pop_front() {
				return Some(Step::Command(command));
			}
		}

		if !self.flush_waiters.is_empty() {
			return Some(Step::Flush);
		}

		if let Some((payload, coalesced)) = self.pop_due(now, coalesce) {
			return Some(Step::Scheduled {
				payload,
				coalesced,
			});
		}

		for (lane, queue) in self.lanes.iter_mut().enumerate() {
			if let Some(payload) = queue.pop_front() {
				return Some(Step::Message {
					payload,
					lane,
				});
			}
		}

		None
	}

	fn pop_due(&mut self, now: Instant, coalesce: bool) -> Option<(M, usize)> {
		if self.scheduled.peek().is_none_or(|entry| entry.at > now) {
			return None;
		}
		let entry = self.scheduled.pop()?;

		let mut coalesced = 0;
		if coalesce {
			while self.scheduled.peek().is_some_and(|next| next.at == entry.at) {
				self.scheduled.pop();
				coalesced += 1;
			}
		}

		self.deadline = self.scheduled.peek().map(|next| next.at);
		Some((entry.payload, coalesced))
	}

	/// Drop every pending message, deferred message and scheduled entry.
	pub fn clear(&mut self) -> Cleared {
		let messages = self.lanes.iter_mut().map(|queue| queue.drain(..).count()).sum();
		let deferred = self.deferred.drain(..).count();
		let scheduled = self.scheduled.drain().count();
		self.deadline = None;
		Cleared {
			messages,
			deferred,
			scheduled,
		}
	}

	#[cfg(test)]
	fn force_scheduled(&mut self, msg: M, at: Instant) {
		let seq = self.next_seq;
		self.next_seq += 1;
		self.scheduled.push(TimedEntry {
			payload: msg,
			at,
			seq,
		});
		self.deadline = self.scheduled.peek().map(|next| next.at);
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::command::{Outcome, completion};

	fn message<M>(step: Option<Step<M>>) -> (M, usize) {
		match step {
			Some(Step::Message {
				payload,
				lane,
			}) => (payload, lane),
			_ => panic!("expected an immediate message"),
		}
	}

	#[test]
	fn test_lane_fifo() {
		let mut queues = WorkQueues::new(1, true);
		queues.push_message(1, 0).unwrap();
		queues.push_message(2, 0).unwrap();

		let now = Instant::now();
		assert_eq!(message(queues.next_step(now, false)), (1, 0));
		assert_eq!(message(queues.next_step(now, false)), (2, 0));
		assert!(queues.next_step(now, false).is_none());
	}

	#[test]
	fn test_lanes_scanned_in_index_order() {
		let mut queues = WorkQueues::new(3, true);
		queues.push_message("low", 2).unwrap();
		queues.push_message("mid", 1).unwrap();
		queues.push_message("top", 0).unwrap();

		let now = Instant::now();
		assert_eq!(message(queues.next_step(now, false)), ("top", 0));
		assert_eq!(message(queues.next_step(now, false)), ("mid", 1));
		assert_eq!(message(queues.next_step(now, false)), ("low", 2));
	}

	#[test]
	fn test_unknown_lane_rejected() {
		let mut queues = WorkQueues::new(2, true);
		assert_eq!(queues.push_message(9, 2), Err(9));
		assert_eq!(queues.lane_count(), 2);
	}

	#[test]
	fn test_single_scheduled_slot() {
		let mut queues = WorkQueues::new(1, true);
		let at = Instant::now() + Duration::from_secs(60);

		assert!(queues.push_scheduled("first", at).is_ok());
		assert_eq!(queues.push_scheduled("second", at), Err("second"));
		assert_eq!(queues.deadline(), Some(at));
		assert_eq!(queues.pending_scheduled(), 1);
	}

	#[test]
	fn test_scheduled_not_due_is_skipped() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.push_scheduled("later", now + Duration::from_secs(60)).unwrap();
		queues.push_message("now", 0).unwrap();

		assert_eq!(message(queues.next_step(now, false)), ("now", 0));
		assert!(queues.next_step(now, false).is_none());
		assert!(queues.deadline().is_some());
	}

	#[test]
	fn test_due_scheduled_beats_messages_and_clears_deadline() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.push_message("message", 0).unwrap();
		queues.push_scheduled("timer", now).unwrap();

		match queues.next_step(now, false) {
			Some(Step::Scheduled {
				payload,
				coalesced,
			}) => {
				assert_eq!(payload, "timer");
				assert_eq!(coalesced, 0);
			}
			_ => panic!("expected the scheduled entry"),
		}
		assert_eq!(queues.deadline(), None);
		assert_eq!(message(queues.next_step(now, false)), ("message", 0));
	}

	#[test]
	fn test_equal_deadlines_delivered_individually() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.force_scheduled(1, now);
		queues.force_scheduled(2, now);

		let mut delivered = Vec::new();
		while let Some(Step::Scheduled {
			payload,
			..
		}) = queues.next_step(now, false)
		{
			delivered.push(payload);
		}
		assert_eq!(delivered, vec![1, 2]);
		assert_eq!(queues.deadline(), None);
	}

	#[test]
	fn test_coalescing_drops_equal_deadlines() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		let later = now + Duration::from_secs(60);
		queues.force_scheduled(1, now);
		queues.force_scheduled(2, now);
		queues.force_scheduled(3, later);

		match queues.next_step(now, true) {
			Some(Step::Scheduled {
				payload,
				coalesced,
			}) => {
				assert_eq!(payload, 1);
				assert_eq!(coalesced, 1);
			}
			_ => panic!("expected the scheduled entry"),
		}
		assert_eq!(queues.deadline(), Some(later));
		assert_eq!(queues.pending_scheduled(), 1);
	}

	#[test]
	fn test_heap_orders_by_time() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.force_scheduled("second", now - Duration::from_millis(1));
		queues.force_scheduled("first", now - Duration::from_millis(5));
		assert_eq!(queues.deadline(), Some(now - Duration::from_millis(5)));

		match queues.next_step(now, false) {
			Some(Step::Scheduled {
				payload,
				..
			}) => assert_eq!(payload, "first"),
			_ => panic!("expected the scheduled entry"),
		}
		assert_eq!(queues.deadline(), Some(now - Duration::from_millis(1)));
	}

	#[test]
	fn test_commands_preempt_everything() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.push_message("message", 0).unwrap();
		queues.push_scheduled("timer", now).unwrap();
		let (command, _handle) = Command::new(|| ());
		queues.push_command(command);

		assert!(matches!(queues.next_step(now, false), Some(Step::Command(_))));
	}

	#[test]
	fn test_gated_commands_wait_for_release() {
		let mut queues = WorkQueues::<u8>::new(1, false);
		let now = Instant::now();
		let (command, _handle) = Command::new(|| ());
		queues.push_command(command);

		assert!(queues.next_step(now, false).is_none());
		assert!(queues.open_commands());
		assert!(!queues.open_commands());
		assert!(matches!(queues.next_step(now, false), Some(Step::Command(_))));
	}

	#[test]
	fn test_flush_waiter_reported_before_messages() {
		let mut queues = WorkQueues::new(1, true);
		let now = Instant::now();
		queues.push_message("message", 0).unwrap();
		let (waiter, handle) = completion();
		queues.push_flush_waiter(waiter);

		assert!(matches!(queues.next_step(now, false), Some(Step::Flush)));

		for waiter in queues.take_flush_waiters() {
			waiter.complete(());
		}
		assert_eq!(handle.wait(), Outcome::Completed(()));
		assert_eq!(message(queues.next_step(now, false)), ("message", 0));
	}

	#[test]
	fn test_deferred_is_not_dispatched_without_flush() {
		let mut queues = WorkQueues::new(1, true);
		queues.push_deferred("later");
		assert!(queues.next_step(Instant::now(), false).is_none());
		assert_eq!(queues.pending_deferred(), 1);
		assert_eq!(queues.pop_deferred(), Some("later"));
	}

	#[test]
	fn test_clear_counts_and_resets_deadline() {
		let mut queues = WorkQueues::new(2, true);
		queues.push_message(1, 0).unwrap();
		queues.push_message(2, 1).unwrap();
		queues.push_deferred(3);
		queues.push_scheduled(4, Instant::now()).unwrap();

		let cleared = queues.clear();
		assert_eq!(
			cleared,
			Cleared {
				messages: 2,
				deferred: 1,
				scheduled: 1,
			}
		);
		assert_eq!(cleared.total(), 4);
		assert_eq!(queues.deadline(), None);
		assert!(queues.next_step(Instant::now(), false).is_none());
	}
}
