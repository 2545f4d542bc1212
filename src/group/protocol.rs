//! Wire types exchanged between the client plane and the group state machine.
//!
//! Commands are replicated in the log and applied in strict commit order;
//! events are published back to listening sessions as side effects of apply.
//! Payload bytes are opaque to the protocol; see
//! [`encode`](crate::primitives::encode) for the codec used by the typed
//! client APIs.

use {
	crate::{
		primitives::MemberId,
		runtime::{Index, SessionId},
	},
	bytes::Bytes,
	core::net::SocketAddr,
	serde::{Deserialize, Serialize},
};

/// Value envelope describing a member in all cross-plane messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
	/// Log index of the command that created the member. Unique and monotonic,
	/// which makes it the natural ordering of the member set.
	pub index: Index,

	/// The member's unique id within the group.
	pub member: MemberId,

	/// Optional direct-message endpoint advertised by the member's process.
	pub address: Option<SocketAddr>,
}

/// Replicated commands applied by the group state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupCommand {
	/// Adds a member to the group, or re-binds an existing persistent member
	/// to the submitting session.
	Join {
		member: MemberId,
		address: Option<SocketAddr>,
		persistent: bool,
	},

	/// Removes a member and releases its resources.
	Leave { member: MemberId },

	/// Registers the submitting session as a listener and returns a snapshot
	/// of the active member set.
	Listen,

	/// Sets a property, scoped to a member when one is named, otherwise
	/// group-global. Last writer wins by log order.
	SetProperty {
		member: Option<MemberId>,
		name: String,
		value: Bytes,
	},

	/// Removes a property in the given scope.
	RemoveProperty {
		member: Option<MemberId>,
		name: String,
	},

	/// Enqueues a task on the named member's queue.
	Submit { member: MemberId, payload: Bytes },

	/// Acknowledges the member's task in flight. A `task` index that does not
	/// match the task in flight is ignored as a duplicate or late ack.
	Ack {
		member: MemberId,
		task: Index,
		succeeded: bool,
	},
}

/// Results returned from applying group commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupCommandOutput {
	/// Reply to `Join`: the joined member's info, carrying the authoritative
	/// creation index.
	Joined(MemberInfo),

	/// Reply to `Listen`: the currently active members, ordered by creation
	/// index.
	Snapshot(Vec<MemberInfo>),

	/// Reply to `Submit`: the log index that identifies the task until it is
	/// acknowledged.
	Submitted(Index),

	/// Reply to commands without a payload.
	Done,
}

/// Read-only queries against the group state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupQuery {
	/// Reads a property in the given scope.
	Property {
		member: Option<MemberId>,
		name: String,
	},
}

/// Events published to sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupEvent {
	/// A member joined, or a persistent member re-bound to a new session.
	///
	/// Carries the session the member is now bound to, so the client whose
	/// command caused the event can recognize it as its own by an exact
	/// session match instead of guessing by member id.
	Join { info: MemberInfo, session: SessionId },

	/// A member left the group or its session expired.
	Leave(MemberId),

	/// A task is ready for processing; sent only to the session that owns the
	/// target member.
	Task(TaskDelivery),

	/// The receipt for a successfully processed task; sent only to the
	/// session that submitted it.
	Ack(TaskReceipt),

	/// The receipt for a failed task; sent only to the session that
	/// submitted it.
	Fail(TaskReceipt),
}

/// A task handed to the member that should process it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDelivery {
	/// Log index of the submit command; the task's identity in acks.
	pub index: Index,

	/// The member the task is addressed to.
	pub member: MemberId,

	/// Opaque task payload.
	pub payload: Bytes,
}

/// Identifies an outstanding submission in receipts sent back to the
/// submitter. `(task, submitting session)` is the reply address of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReceipt {
	/// The member the task was addressed to.
	pub member: MemberId,

	/// Log index of the original submit command.
	pub task: Index,
}

/// Deterministic timers scheduled by the group state machine. Timers carry
/// their target by value and validate it when they fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupTimer {
	/// Declares a persistent member gone if it is still session-less when the
	/// expiration window closes.
	Expire { member: MemberId },
}
