pub mod group;
pub mod primitives;
pub mod runtime;

pub mod prelude {
	pub use super::{
		group::{
			ConsistentHashGroup,
			Error,
			Group,
			GroupChange,
			GroupConfig,
			GroupMember,
			GroupStateMachine,
			LocalMember,
			PartitionGroup,
			Task,
			Term,
		},
		primitives::MemberId,
		runtime::{Index, Local, SessionId},
	};
}
