//! The group state machine.
//!
//! Applied identically on every replica, in strict log order. Owns the
//! authoritative member table, the property tables and the per-member task
//! queues, and publishes membership and task events to listening sessions as
//! side effects of apply.
//!
//! Fan-out iterates listeners in session-id order and emits deferred leave
//! events in member-index order, so replays produce identical event streams
//! on every replica.

use {
	crate::{
		group::{
			Error,
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
		},
		primitives::MemberId,
		runtime::{Context, Index, LogTime, SessionId, StateMachine},
	},
	bytes::Bytes,
	core::net::SocketAddr,
	std::collections::{BTreeMap, BTreeSet, VecDeque},
	tracing::{debug, trace},
};

/// Deterministic state machine for one group.
pub struct GroupStateMachine {
	/// Grace period before a session-less persistent member is declared gone.
	expiration: LogTime,

	/// Sessions that registered for membership events via `Listen`.
	listeners: BTreeSet<SessionId>,

	/// The authoritative member table, keyed by member id.
	members: BTreeMap<MemberId, Member>,

	/// Group-global properties. Member-scoped properties live on the member.
	properties: BTreeMap<String, Bytes>,
}

impl GroupStateMachine {
	/// Creates a group state machine with the given persistent-member
	/// expiration window.
	pub fn new(expiration: LogTime) -> Self {
		Self {
			expiration,
			listeners: BTreeSet::new(),
			members: BTreeMap::new(),
			properties: BTreeMap::new(),
		}
	}

	/// Releases the whole group: force-fails every queued task to its
	/// submitter and drops all members and properties. Used when the group
	/// resource itself is deleted.
	pub fn wipe(&mut self, ctx: &mut Context<'_, Self>) {
		let members = core::mem::take(&mut self.members);

		let mut closing: Vec<Member> = members.into_values().collect();
		closing.sort_by_key(|member| member.index);

		for mut member in closing {
			fail_tasks(&mut member, ctx);
		}

		self.properties.clear();
		debug!("group wiped");
	}
}

impl StateMachine for GroupStateMachine {
	type Command = GroupCommand;
	type CommandOutput = GroupCommandOutput;
	type Error = Error;
	type Event = GroupEvent;
	type Query = GroupQuery;
	type QueryOutput = Option<Bytes>;
	type Timer = GroupTimer;

	fn apply(
		&mut self,
		ctx: &mut Context<'_, Self>,
		command: GroupCommand,
	) -> Result<GroupCommandOutput, Error> {
		match command {
			GroupCommand::Join {
				member,
				address,
				persistent,
			} => self
				.join(ctx, member, address, persistent)
				.map(GroupCommandOutput::Joined),

			GroupCommand::Leave { member } => {
				self.leave(ctx, &member);
				Ok(GroupCommandOutput::Done)
			}

			GroupCommand::Listen => Ok(GroupCommandOutput::Snapshot(self.listen(ctx))),

			GroupCommand::SetProperty {
				member,
				name,
				value,
			} => {
				self.set_property(member, name, value);
				Ok(GroupCommandOutput::Done)
			}

			GroupCommand::RemoveProperty { member, name } => {
				self.remove_property(member, &name);
				Ok(GroupCommandOutput::Done)
			}

			GroupCommand::Submit { member, payload } => self
				.submit(ctx, member, payload)
				.map(GroupCommandOutput::Submitted),

			GroupCommand::Ack {
				member,
				task,
				succeeded,
			} => {
				self.ack(ctx, &member, task, succeeded)?;
				Ok(GroupCommandOutput::Done)
			}
		}
	}

	fn query(&self, query: GroupQuery) -> Option<Bytes> {
		match query {
			GroupQuery::Property { member, name } => match member {
				Some(member) => self
					.members
					.get(&member)
					.and_then(|member| member.properties.get(&name).cloned()),
				None => self.properties.get(&name).cloned(),
			},
		}
	}

	fn session_closed(&mut self, ctx: &mut Context<'_, Self>, session: SessionId) {
		self.listeners.remove(&session);

		// sweep members bound to the closing session; BTreeMap iteration keeps
		// the sweep order identical across replicas
		let bound: Vec<MemberId> = self
			.members
			.values()
			.filter(|member| member.session == Some(session))
			.map(|member| member.id.clone())
			.collect();

		let mut left: Vec<Member> = Vec::new();

		for id in bound {
			let Some(member) = self.members.get_mut(&id) else {
				continue;
			};

			if member.persistent {
				// persistent members survive session loss; only the binding is
				// cleared and the leave announcement is made (or deferred)
				member.session = None;

				if self.expiration.is_zero() {
					debug!(member = %id, "persistent member detached");
					fan_out(&self.listeners, ctx, &GroupEvent::Leave(id));
				} else {
					debug!(
						member = %id,
						expiration = ?self.expiration,
						"persistent member detached, expiration scheduled",
					);
					ctx.schedule(self.expiration, GroupTimer::Expire { member: id });
				}
			} else if let Some(member) = self.members.remove(&id) {
				left.push(member);
			}
		}

		// ephemeral members are failed and announced after the sweep so every
		// session observes task fails before leaves, in member-index order
		left.sort_by_key(|member| member.index);

		for mut member in left {
			debug!(member = %member.id, "ephemeral member removed with its session");
			fail_tasks(&mut member, ctx);
			fan_out(&self.listeners, ctx, &GroupEvent::Leave(member.id));
		}
	}

	fn timer_fired(&mut self, ctx: &mut Context<'_, Self>, timer: GroupTimer) {
		match timer {
			GroupTimer::Expire { member: id } => {
				// the member may have re-bound or left since the timer was
				// scheduled; announce only if it is still detached
				let expired = self
					.members
					.get(&id)
					.is_some_and(|member| member.session.is_none());

				if expired {
					debug!(member = %id, "persistent member expired");
					fan_out(&self.listeners, ctx, &GroupEvent::Leave(id));
				}
			}
		}
	}
}

/// Command handlers.
impl GroupStateMachine {
	fn join(
		&mut self,
		ctx: &mut Context<'_, Self>,
		id: MemberId,
		address: Option<SocketAddr>,
		persistent: bool,
	) -> Result<MemberInfo, Error> {
		if let Some(member) = self.members.get_mut(&id) {
			if !member.persistent {
				return Err(Error::EphemeralExists(id));
			}

			// re-bind the persistent member to the submitting session; the
			// original creation index is retained
			member.session = Some(ctx.session());
			debug!(member = %id, session = ctx.session(), "persistent member re-bound");

			// replay the task in flight to the new session so the member can
			// resume processing where its predecessor stopped
			if let Some(task) = &member.pending {
				deliver(ctx, member, task);
			}

			let info = member.info();
			let joined = GroupEvent::Join {
				info: info.clone(),
				session: ctx.session(),
			};
			fan_out(&self.listeners, ctx, &joined);
			return Ok(info);
		}

		let member = Member {
			index: ctx.index(),
			id: id.clone(),
			address,
			persistent,
			session: Some(ctx.session()),
			properties: BTreeMap::new(),
			pending: None,
			backlog: VecDeque::new(),
		};

		let info = member.info();
		self.members.insert(id.clone(), member);

		debug!(
			member = %id,
			index = info.index,
			persistent,
			"member joined",
		);

		let joined = GroupEvent::Join {
			info: info.clone(),
			session: ctx.session(),
		};
		fan_out(&self.listeners, ctx, &joined);
		Ok(info)
	}

	fn leave(&mut self, ctx: &mut Context<'_, Self>, id: &MemberId) {
		// leaving an unknown member is a no-op; the member may have been
		// removed with its session before the command committed
		if let Some(mut member) = self.members.remove(id) {
			debug!(member = %id, "member left");

			// fail outstanding tasks before announcing the leave so every
			// submitter observes the fail first
			fail_tasks(&mut member, ctx);
			fan_out(&self.listeners, ctx, &GroupEvent::Leave(member.id));
		}
	}

	fn listen(&mut self, ctx: &mut Context<'_, Self>) -> Vec<MemberInfo> {
		self.listeners.insert(ctx.session());
		trace!(session = ctx.session(), "listener registered");

		let mut snapshot: Vec<MemberInfo> = self
			.members
			.values()
			.filter(|member| member.session.is_some_and(|s| ctx.is_active(s)))
			.map(Member::info)
			.collect();

		snapshot.sort_by_key(|info| info.index);
		snapshot
	}

	fn set_property(
		&mut self,
		member: Option<MemberId>,
		name: String,
		value: Bytes,
	) {
		match member {
			Some(member) => {
				// setting a property on an unknown member is a no-op
				if let Some(member) = self.members.get_mut(&member) {
					member.properties.insert(name, value);
				}
			}
			None => {
				self.properties.insert(name, value);
			}
		}
	}

	fn remove_property(&mut self, member: Option<MemberId>, name: &str) {
		match member {
			Some(member) => {
				if let Some(member) = self.members.get_mut(&member) {
					member.properties.remove(name);
				}
			}
			None => {
				self.properties.remove(name);
			}
		}
	}

	fn submit(
		&mut self,
		ctx: &mut Context<'_, Self>,
		id: MemberId,
		payload: Bytes,
	) -> Result<Index, Error> {
		let Some(member) = self.members.get_mut(&id) else {
			return Err(Error::UnknownMember(id));
		};

		let task = Task {
			index: ctx.index(),
			submitter: ctx.session(),
			payload,
		};

		trace!(member = %id, task = task.index, "task submitted");

		if member.pending.is_none() {
			// no task in flight, promote immediately
			deliver(ctx, member, &task);
			member.pending = Some(task);
		} else {
			member.backlog.push_back(task);
		}

		Ok(ctx.index())
	}

	fn ack(
		&mut self,
		ctx: &mut Context<'_, Self>,
		id: &MemberId,
		task: Index,
		succeeded: bool,
	) -> Result<(), Error> {
		let Some(member) = self.members.get_mut(id) else {
			return Err(Error::UnknownMember(id.clone()));
		};

		match member.pending.take() {
			Some(pending) if pending.index == task => {
				trace!(member = %id, task, succeeded, "task acknowledged");

				let receipt = TaskReceipt {
					member: id.clone(),
					task: pending.index,
				};
				let receipt = if succeeded {
					GroupEvent::Ack(receipt)
				} else {
					GroupEvent::Fail(receipt)
				};

				if ctx.is_active(pending.submitter) {
					ctx.publish(pending.submitter, receipt);
				}

				// promote the next task in submission order
				if let Some(next) = member.backlog.pop_front() {
					deliver(ctx, member, &next);
					member.pending = Some(next);
				}
			}
			other => {
				// duplicate or late ack, ignore
				trace!(member = %id, task, "ignoring ack for a task not in flight");
				member.pending = other;
			}
		}

		Ok(())
	}
}

/// Represents a member of the group.
struct Member {
	/// Log index of the command that created the member.
	index: Index,

	id: MemberId,
	address: Option<SocketAddr>,

	/// Persistent members survive session loss, up to the expiration window.
	persistent: bool,

	/// The session currently bound to the member. Always set for ephemeral
	/// members; cleared for persistent members whose session dropped.
	session: Option<SessionId>,

	/// Member-scoped properties, destroyed with the member.
	properties: BTreeMap<String, Bytes>,

	/// The unique head-of-line task, already delivered to the bound session
	/// if one was active.
	pending: Option<Task>,

	/// Tasks queued behind the one in flight, in submission order.
	backlog: VecDeque<Task>,
}

impl Member {
	fn info(&self) -> MemberInfo {
		MemberInfo {
			index: self.index,
			member: self.id.clone(),
			address: self.address,
		}
	}
}

/// A task queued on a member.
struct Task {
	/// Log index of the submit command; identifies the task in acks and
	/// receipts.
	index: Index,

	/// The session to which the receipt is sent.
	submitter: SessionId,

	payload: Bytes,
}

/// Publishes an event to every listening session, in session-id order.
fn fan_out(
	listeners: &BTreeSet<SessionId>,
	ctx: &Context<'_, GroupStateMachine>,
	event: &GroupEvent,
) {
	for session in listeners {
		ctx.publish(*session, event.clone());
	}
}

/// Hands a task to the member's bound session, if it is active. Detached and
/// inactive members keep the task queued until they re-bind.
fn deliver(ctx: &Context<'_, GroupStateMachine>, member: &Member, task: &Task) {
	if let Some(session) = member.session {
		if ctx.is_active(session) {
			ctx.publish(
				session,
				GroupEvent::Task(TaskDelivery {
					index: task.index,
					member: member.id.clone(),
					payload: task.payload.clone(),
				}),
			);
		}
	}
}

/// Force-fails the member's pending task and backlog to their submitters, in
/// submission order, and drops its properties.
fn fail_tasks(member: &mut Member, ctx: &mut Context<'_, GroupStateMachine>) {
	let pending = member.pending.take();
	let backlog = core::mem::take(&mut member.backlog);

	for task in pending.into_iter().chain(backlog) {
		if ctx.is_active(task.submitter) {
			ctx.publish(
				task.submitter,
				GroupEvent::Fail(TaskReceipt {
					member: member.id.clone(),
					task: task.index,
				}),
			);
		}
	}

	member.properties.clear();
}
