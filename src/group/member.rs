use {
	crate::{
		group::{
			Error,
			client::Group,
			protocol::{GroupCommand, MemberInfo, TaskDelivery},
		},
		primitives::{self, MemberId},
		runtime::Index,
	},
	bytes::Bytes,
	core::net::SocketAddr,
	futures::StreamExt,
	serde::de::DeserializeOwned,
	tokio::sync::mpsc::UnboundedReceiver,
	tokio_stream::wrappers::UnboundedReceiverStream,
};

/// A member of the group as seen from this client's mirror.
///
/// Cheap to clone; a plain value snapshot of the member's info plus whether
/// this process owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
	info: MemberInfo,
	local: bool,
}

impl GroupMember {
	pub(crate) const fn new(info: MemberInfo, local: bool) -> Self {
		Self { info, local }
	}

	/// The member's unique id within the group.
	pub const fn id(&self) -> &MemberId {
		&self.info.member
	}

	/// Log index of the command that created the member. The member set's
	/// natural order, and the ordering used for leader election.
	pub const fn index(&self) -> Index {
		self.info.index
	}

	/// The member's advertised direct-message endpoint, if any.
	pub const fn address(&self) -> Option<SocketAddr> {
		self.info.address
	}

	pub const fn info(&self) -> &MemberInfo {
		&self.info
	}

	/// Returns `true` if this member is owned by this process.
	pub const fn is_local(&self) -> bool {
		self.local
	}
}

/// A group member owned by this process.
///
/// Obtained from the join APIs on [`Group`]. Holds the member's task and
/// direct-message streams; both run dry once the member leaves the group or
/// its session closes.
pub struct LocalMember {
	info: MemberInfo,
	group: Group,
	tasks: UnboundedReceiverStream<TaskDelivery>,
	messages: UnboundedReceiverStream<Bytes>,
}

impl LocalMember {
	pub(crate) fn new(
		info: MemberInfo,
		group: Group,
		tasks: UnboundedReceiver<TaskDelivery>,
		messages: UnboundedReceiver<Bytes>,
	) -> Self {
		Self {
			info,
			group,
			tasks: UnboundedReceiverStream::new(tasks),
			messages: UnboundedReceiverStream::new(messages),
		}
	}

	/// The member's unique id within the group.
	pub const fn id(&self) -> &MemberId {
		&self.info.member
	}

	/// Log index of the command that created the member.
	pub const fn index(&self) -> Index {
		self.info.index
	}

	pub const fn info(&self) -> &MemberInfo {
		&self.info
	}

	/// Receives the next task addressed to this member.
	///
	/// Tasks arrive one at a time: the next task is delivered only after the
	/// current one has been acknowledged. Returns `None` once the member is no
	/// longer owned by this process.
	pub async fn task(&mut self) -> Option<Task> {
		let delivery = self.tasks.next().await?;
		Some(Task {
			delivery,
			group: self.group.clone(),
		})
	}

	/// Receives the next direct message addressed to this member.
	pub async fn message(&mut self) -> Option<Bytes> {
		self.messages.next().await
	}

	/// Leaves the group, removing the member and releasing its resources.
	///
	/// Resolves after this client has observed its own leave event, so the
	/// local mirror no longer contains the member when the future completes.
	pub async fn leave(self) -> Result<(), Error> {
		let left = self.group.when().member_left(self.info.member.clone());

		self
			.group
			.command(GroupCommand::Leave {
				member: self.info.member.clone(),
			})
			.await?;

		left.await;
		Ok(())
	}
}

impl core::fmt::Debug for LocalMember {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("LocalMember")
			.field("member", &self.info.member)
			.field("index", &self.info.index)
			.finish_non_exhaustive()
	}
}

/// A task delivered to a local member.
///
/// Every task must be acknowledged exactly once, with [`ack`](Task::ack) or
/// [`fail`](Task::fail); the submitter's future resolves with the outcome,
/// and the member's next queued task is released by the acknowledgement.
#[must_use = "the submitter is blocked until this task is acknowledged"]
pub struct Task {
	delivery: TaskDelivery,
	group: Group,
}

impl Task {
	/// Log index identifying this task.
	pub const fn index(&self) -> Index {
		self.delivery.index
	}

	/// The member the task was addressed to.
	pub const fn member(&self) -> &MemberId {
		&self.delivery.member
	}

	/// The raw task payload.
	pub const fn payload(&self) -> &Bytes {
		&self.delivery.payload
	}

	/// Decodes the payload into a typed value.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, postcard::Error> {
		primitives::decode(&self.delivery.payload)
	}

	/// Acknowledges successful processing of the task.
	pub async fn ack(self) -> Result<(), Error> {
		self.complete(true).await
	}

	/// Reports the task as failed; the submitter observes `TaskFailed`.
	pub async fn fail(self) -> Result<(), Error> {
		self.complete(false).await
	}

	async fn complete(self, succeeded: bool) -> Result<(), Error> {
		self
			.group
			.command(GroupCommand::Ack {
				member: self.delivery.member,
				task: self.delivery.index,
				succeeded,
			})
			.await?;
		Ok(())
	}
}

impl core::fmt::Debug for Task {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Task")
			.field("index", &self.delivery.index)
			.field("member", &self.delivery.member)
			.finish_non_exhaustive()
	}
}
