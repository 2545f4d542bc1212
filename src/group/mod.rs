//! Coordination Groups
//!
//! A group is a dynamic, consistently-replicated set of named members sharing
//! a namespace. Its state lives in a deterministic state machine applied
//! atop a replicated command log; clients mirror that state through a session
//! event stream and derive everything else from the mirror:
//!
//! - **Membership**: members are ephemeral (die with their session) or
//!   persistent (survive session loss up to a configurable expiration, and
//!   can be revived by re-joining under the same id from anywhere).
//!
//! - **Leader election**: the leader is the oldest surviving member, ordered
//!   by the log index that created it. The rule is deterministic, so every
//!   client observing the same member set agrees on the leader without any
//!   extra coordination, and the choice is stable across joins.
//!
//! - **Task queues**: every member has a queue of tasks submitted to it, with
//!   at most one task in flight at a time. Each task is acknowledged exactly
//!   once and the submitter's future resolves with the outcome; tasks whose
//!   target leaves before acknowledging fail back to their submitters before
//!   the departure is announced.
//!
//! - **Derived views**: consistent-hash and partitioned views compose over
//!   the member set and are fed membership changes in event order.

mod client;
mod config;
mod election;
mod error;
mod hash;
mod member;
mod partition;
mod protocol;
mod state;
mod subgroup;
mod task;
mod when;

pub use {
	client::{Group, GroupChange, Mirror},
	config::{GroupConfig, GroupConfigBuilder},
	election::Term,
	error::Error,
	hash::{Blake3Hasher, ConsistentHashGroup, KeyHasher},
	member::{GroupMember, LocalMember, Task},
	partition::{
		HashPartitioner,
		PartitionGroup,
		PartitionMigration,
		Partitioner,
	},
	protocol::{
		GroupCommand,
		GroupCommandOutput,
		GroupEvent,
		GroupQuery,
		GroupTimer,
		MemberInfo,
		TaskDelivery,
		TaskReceipt,
	},
	state::GroupStateMachine,
	task::TaskQueue,
	when::When,
};
