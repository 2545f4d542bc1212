use {
	crate::{
		group::{Error, client::Group},
		primitives,
		runtime::Index,
	},
	dashmap::{DashMap, mapref::entry::Entry},
	futures::future::try_join_all,
	itertools::Itertools,
	serde::Serialize,
	tokio::sync::oneshot,
};

/// Completes task futures from the receipts observed on the event stream.
///
/// A submission registers interest from the caller context while receipts
/// arrive on the event-processing context, and nothing orders the two: a fast
/// target can be acknowledged before the submitter's command future has even
/// resolved with the task index. The slot map makes the rendezvous atomic:
/// whichever side arrives first parks its half, the other side completes it.
pub(crate) struct TaskSlots {
	slots: DashMap<Index, Slot>,
}

enum Slot {
	/// The submitter is waiting for the receipt.
	Waiting(oneshot::Sender<bool>),

	/// The receipt arrived before the submitter registered.
	Done(bool),
}

impl Default for TaskSlots {
	fn default() -> Self {
		Self {
			slots: DashMap::new(),
		}
	}
}

impl TaskSlots {
	/// Registers interest in the task's receipt. The receiver resolves with
	/// `true` for an ack and `false` for a fail.
	pub(crate) fn wait(&self, task: Index) -> oneshot::Receiver<bool> {
		let (reply_tx, reply_rx) = oneshot::channel();

		match self.slots.entry(task) {
			Entry::Occupied(mut entry) => match entry.get() {
				Slot::Done(succeeded) => {
					let _ = reply_tx.send(*succeeded);
					entry.remove();
				}
				Slot::Waiting(_) => {
					// a newer waiter for the same index replaces the stale one
					entry.insert(Slot::Waiting(reply_tx));
				}
			},
			Entry::Vacant(entry) => {
				entry.insert(Slot::Waiting(reply_tx));
			}
		}

		reply_rx
	}

	/// Completes the slot for the given task with the receipt's outcome.
	pub(crate) fn complete(&self, task: Index, succeeded: bool) {
		match self.slots.entry(task) {
			Entry::Occupied(entry) => {
				if let Slot::Waiting(reply_tx) = entry.remove() {
					let _ = reply_tx.send(succeeded);
				}
			}
			Entry::Vacant(entry) => {
				entry.insert(Slot::Done(succeeded));
			}
		}
	}

	/// Drops every parked slot. Waiting submitters observe `SessionClosed`.
	pub(crate) fn abort(&self) {
		self.slots.clear();
	}
}

/// Group-wide task fan-out.
///
/// A convenience over per-member submissions: the same task is submitted to
/// every current member and the returned future resolves once every member
/// has acknowledged it.
#[derive(Clone)]
pub struct TaskQueue {
	group: Group,
}

impl TaskQueue {
	pub(crate) const fn new(group: Group) -> Self {
		Self { group }
	}

	/// Submits a task to every current member, in member creation order.
	///
	/// Fails with `TaskFailed` if any member reports failure or leaves before
	/// acknowledging.
	pub async fn submit<T: Serialize + ?Sized>(
		&self,
		task: &T,
	) -> Result<(), Error> {
		let payload = primitives::encode(task);
		let members = self.group.members();

		try_join_all(
			members
				.values()
				.sorted_by_key(|member| member.index())
				.map(|member| {
					self.group.submit_bytes(member.id().clone(), payload.clone())
				}),
		)
		.await
		.map(|_| ())
	}
}
