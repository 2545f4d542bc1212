use {
	crate::{primitives::MemberId, runtime},
	serde::{Deserialize, Serialize},
};

/// Errors surfaced by the group coordination core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
	/// A non-persistent member cannot be recreated under the same id while its
	/// creating session is alive.
	#[error("cannot recreate ephemeral member {0}")]
	EphemeralExists(MemberId),

	/// A task or ack named a member that is not in the group.
	#[error("unknown member: {0}")]
	UnknownMember(MemberId),

	/// A direct message targeted a member that this process does not own.
	#[error("member {0} is not owned by this process")]
	NotLocalMember(MemberId),

	/// The task completed with failure, or was cancelled because its target
	/// left the group.
	#[error("task failed or its target left the group")]
	TaskFailed,

	/// The underlying replication runtime session ended. Transient; higher
	/// layers may retry through a new session.
	#[error("session to the replication runtime closed")]
	SessionClosed,
}

impl From<runtime::Error> for Error {
	fn from(_: runtime::Error) -> Self {
		Self::SessionClosed
	}
}

impl From<runtime::CommandError<Error>> for Error {
	fn from(error: runtime::CommandError<Error>) -> Self {
		match error {
			runtime::CommandError::Runtime(_) => Self::SessionClosed,
			runtime::CommandError::Rejected(error) => error,
		}
	}
}
