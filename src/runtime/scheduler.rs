use {
	super::LogTime,
	core::cmp::{Ordering, Reverse},
	std::collections::BinaryHeap,
};

/// Deterministic timer queue driven by the state machine's logical clock.
///
/// Timers fire in (deadline, schedule-order) order, so two timers scheduled
/// for the same logical instant fire in the order they were scheduled. The
/// queue holds only timer payloads by value; validating that the timer is
/// still relevant when it fires is the state machine's job.
pub(crate) struct Scheduler<T> {
	queue: BinaryHeap<Reverse<Entry<T>>>,
	seq: u64,
}

impl<T> Default for Scheduler<T> {
	fn default() -> Self {
		Self {
			queue: BinaryHeap::new(),
			seq: 0,
		}
	}
}

impl<T> Scheduler<T> {
	/// Schedules a timer to fire at the given logical time.
	pub(crate) fn schedule(&mut self, at: LogTime, timer: T) {
		self.seq += 1;
		self.queue.push(Reverse(Entry {
			at,
			seq: self.seq,
			timer,
		}));
	}

	/// Returns the logical time of the earliest pending timer.
	pub(crate) fn next_deadline(&self) -> Option<LogTime> {
		self.queue.peek().map(|Reverse(entry)| entry.at)
	}

	/// Pops the earliest timer that is due at the given logical time.
	pub(crate) fn pop_due(&mut self, now: LogTime) -> Option<T> {
		if self.queue.peek().is_some_and(|Reverse(entry)| entry.at <= now) {
			self.queue.pop().map(|Reverse(entry)| entry.timer)
		} else {
			None
		}
	}
}

struct Entry<T> {
	at: LogTime,
	seq: u64,
	timer: T,
}

impl<T> PartialEq for Entry<T> {
	fn eq(&self, other: &Self) -> bool {
		self.at == other.at && self.seq == other.seq
	}
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for Entry<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
	}
}
