use {
	crate::{
		group::{
			Error,
			config::GroupConfig,
			election::{Election, Term},
			hash::{Blake3Hasher, ConsistentHashGroup, HashView, KeyHasher, Ring},
			member::{GroupMember, LocalMember},
			partition::{HashPartitioner, PartitionGroup, PartitionView, Partitioner},
			protocol::{
				GroupCommand,
				GroupCommandOutput,
				GroupEvent,
				GroupQuery,
				MemberInfo,
				TaskDelivery,
			},
			state::GroupStateMachine,
			subgroup::SubGroup,
			task::{TaskQueue, TaskSlots},
			when::When,
		},
		primitives::{self, MemberId, Short},
		runtime::{Events, Local, Session, SessionId},
	},
	bytes::Bytes,
	core::{net::SocketAddr, pin::pin},
	futures::{StreamExt, stream::FuturesUnordered},
	itertools::Itertools,
	serde::Serialize,
	std::{collections::HashMap, pin::Pin, sync::Arc},
	tokio::sync::{
		mpsc::{self, UnboundedReceiver, UnboundedSender},
		oneshot,
		watch,
	},
	tokio_util::sync::{
		CancellationToken,
		DropGuard,
		WaitForCancellationFutureOwned,
	},
	tracing::{debug, trace, warn},
};

/// The client-side mirror of the member set, keyed by member id. An immutable
/// map, so snapshots handed out of the event-processing context are O(1)
/// structural clones.
pub type Mirror = im::HashMap<MemberId, GroupMember>;

/// Membership change notifications delivered to subscribers of
/// [`Group::changes`].
#[derive(Debug, Clone)]
pub enum GroupChange {
	/// A member joined the group, or re-bound with updated info.
	Joined(GroupMember),

	/// A member left the group.
	Left(GroupMember),
}

/// A client's view of one coordination group.
///
/// The group mirrors the replicated member set through the runtime's event
/// stream, elects a leader deterministically from the mirror, and routes
/// tasks to members. Cheap to clone; all clones share the same view.
///
/// Dropping the last clone closes the underlying session, which removes every
/// ephemeral member owned by this client from the group.
#[derive(Clone)]
pub struct Group(Arc<GroupCore>);

struct GroupCore {
	config: GroupConfig,
	session: Session<GroupStateMachine>,
	commands_tx: UnboundedSender<ClientCommand>,
	members: watch::Receiver<Mirror>,
	term: watch::Receiver<Option<Term>>,
	tasks: Arc<TaskSlots>,
	_cancel_on_drop: DropGuard,
}

/// Public API
impl Group {
	/// Connects to the group through the given runtime.
	///
	/// Opens a session, registers it as a listener and seeds the local mirror
	/// from the returned snapshot before any events are processed.
	pub async fn connect(
		runtime: &Local<GroupStateMachine>,
		config: GroupConfig,
	) -> Result<Self, Error> {
		let (session, events) = runtime.connect().await?;

		let snapshot = match session
			.command(GroupCommand::Listen)
			.await
			.map_err(Error::from)?
		{
			GroupCommandOutput::Snapshot(snapshot) => snapshot,
			_ => unreachable!("listen replies with a membership snapshot"),
		};

		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let members_tx = watch::Sender::new(Mirror::default());
		let members_rx = members_tx.subscribe();
		let election = Election::new();
		let term_rx = election.subscribe();
		let tasks = Arc::new(TaskSlots::default());

		let cancellation = CancellationToken::new();

		let mut worker = Worker {
			session: session.clone(),
			address: config.address,
			members: members_tx,
			election,
			tasks: Arc::clone(&tasks),
			locals: HashMap::new(),
			joining: HashMap::new(),
			views: Vec::new(),
			subscribers: Vec::new(),
			pending_work: FuturesUnordered::new(),
		};

		// merge the bootstrap snapshot before the worker processes live
		// events, so the returned group already reflects it
		for info in snapshot {
			worker.on_join(info, None);
		}

		tokio::spawn(worker.run(
			events,
			commands_rx,
			cancellation.clone().cancelled_owned(),
		));

		Ok(Self(Arc::new(GroupCore {
			config,
			session,
			commands_tx,
			members: members_rx,
			term: term_rx,
			tasks,
			_cancel_on_drop: cancellation.drop_guard(),
		})))
	}

	/// Configuration this client was connected with.
	pub fn config(&self) -> &GroupConfig {
		&self.0.config
	}

	/// A snapshot of the current member set.
	pub fn members(&self) -> Mirror {
		self.0.members.borrow().clone()
	}

	/// Looks up a member in the mirror.
	pub fn member(&self, id: &MemberId) -> Option<GroupMember> {
		self.0.members.borrow().get(id).cloned()
	}

	/// The current leadership term, if a leader is elected.
	pub fn term(&self) -> Option<Term> {
		self.0.term.borrow().clone()
	}

	/// The current leader's mirror entry, if one is elected.
	pub fn leader(&self) -> Option<GroupMember> {
		let term = self.term()?;
		self.member(&term.leader().member)
	}

	/// Awaits changes to the group's state.
	pub fn when(&self) -> When {
		When::new(self.0.members.clone(), self.0.term.clone())
	}

	/// Subscribes to membership change notifications.
	pub async fn changes(&self) -> Result<UnboundedReceiver<GroupChange>, Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.send(ClientCommand::Subscribe { reply: reply_tx })?;
		reply_rx.await.map_err(|_| Error::SessionClosed)
	}

	/// Joins the group anonymously with a random member id.
	///
	/// The member is ephemeral: it is removed from the group when this
	/// client's session closes.
	pub async fn join(&self) -> Result<LocalMember, Error> {
		self.join_with(MemberId::random(), false).await
	}

	/// Joins the group under a caller-chosen id.
	///
	/// The member is ephemeral. Joining an id that is already present fails
	/// with `EphemeralExists`.
	pub async fn join_as(
		&self,
		member: impl Into<MemberId>,
	) -> Result<LocalMember, Error> {
		self.join_with(member.into(), false).await
	}

	/// Joins the group under a caller-chosen persistent id.
	///
	/// Persistent members survive session loss: re-joining the same id from
	/// any client re-binds the member instead of recreating it, and the group
	/// announces the member's departure only after it stays unbound for the
	/// configured expiration.
	pub async fn join_persistent(
		&self,
		member: impl Into<MemberId>,
	) -> Result<LocalMember, Error> {
		self.join_with(member.into(), true).await
	}

	/// Submits a task to the named member.
	///
	/// Resolves once the member acknowledged the task; fails with
	/// `TaskFailed` if the member reports failure or leaves the group before
	/// acknowledging.
	pub async fn submit<T: Serialize + ?Sized>(
		&self,
		member: &MemberId,
		task: &T,
	) -> Result<(), Error> {
		self
			.submit_bytes(member.clone(), primitives::encode(task))
			.await
	}

	/// Group-wide task fan-out.
	pub fn tasks(&self) -> TaskQueue {
		TaskQueue::new(self.clone())
	}

	/// Delivers a direct message to a member owned by this process.
	///
	/// Direct messages bypass the replicated log; delivering to a member this
	/// process does not own fails with `NotLocalMember`.
	pub async fn message(
		&self,
		member: &MemberId,
		payload: impl Into<Bytes>,
	) -> Result<(), Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.send(ClientCommand::Message {
			member: member.clone(),
			payload: payload.into(),
			reply: reply_tx,
		})?;
		reply_rx.await.map_err(|_| Error::SessionClosed)?
	}

	/// Sets a group-global property. Last writer wins by log order.
	pub async fn set_property(
		&self,
		name: impl Into<String>,
		value: impl Into<Bytes>,
	) -> Result<(), Error> {
		self
			.command(GroupCommand::SetProperty {
				member: None,
				name: name.into(),
				value: value.into(),
			})
			.await
			.map(|_| ())
	}

	/// Reads a group-global property.
	pub async fn property(
		&self,
		name: impl Into<String>,
	) -> Result<Option<Bytes>, Error> {
		self
			.0
			.session
			.query(GroupQuery::Property {
				member: None,
				name: name.into(),
			})
			.await
			.map_err(Error::from)
	}

	/// Removes a group-global property.
	pub async fn remove_property(
		&self,
		name: impl Into<String>,
	) -> Result<(), Error> {
		self
			.command(GroupCommand::RemoveProperty {
				member: None,
				name: name.into(),
			})
			.await
			.map(|_| ())
	}

	/// Sets a property scoped to the given member. Member-scoped properties
	/// are destroyed with the member.
	pub async fn set_member_property(
		&self,
		member: &MemberId,
		name: impl Into<String>,
		value: impl Into<Bytes>,
	) -> Result<(), Error> {
		self
			.command(GroupCommand::SetProperty {
				member: Some(member.clone()),
				name: name.into(),
				value: value.into(),
			})
			.await
			.map(|_| ())
	}

	/// Reads a property scoped to the given member.
	pub async fn member_property(
		&self,
		member: &MemberId,
		name: impl Into<String>,
	) -> Result<Option<Bytes>, Error> {
		self
			.0
			.session
			.query(GroupQuery::Property {
				member: Some(member.clone()),
				name: name.into(),
			})
			.await
			.map_err(Error::from)
	}

	/// Removes a property scoped to the given member.
	pub async fn remove_member_property(
		&self,
		member: &MemberId,
		name: impl Into<String>,
	) -> Result<(), Error> {
		self
			.command(GroupCommand::RemoveProperty {
				member: Some(member.clone()),
				name: name.into(),
			})
			.await
			.map(|_| ())
	}

	/// Composes a consistent-hash view over the member set with the default
	/// hasher and ring resolution.
	pub async fn hash(&self) -> Result<ConsistentHashGroup, Error> {
		self.hash_with(Blake3Hasher, 100).await
	}

	/// Composes a consistent-hash view with a custom hasher and number of
	/// virtual nodes per member.
	pub async fn hash_with(
		&self,
		hasher: impl KeyHasher,
		virtual_nodes: usize,
	) -> Result<ConsistentHashGroup, Error> {
		let (ring_tx, ring_rx) =
			watch::channel(Ring::new(Arc::new(hasher), virtual_nodes));
		self.compose(Box::new(HashView::new(ring_tx))).await?;
		Ok(ConsistentHashGroup::new(ring_rx))
	}

	/// Composes a partitioned view with the default partitioner and a
	/// replication factor of one.
	pub async fn partition(
		&self,
		partitions: usize,
	) -> Result<PartitionGroup, Error> {
		self.partition_with(partitions, 1, HashPartitioner).await
	}

	/// Composes a partitioned view with a custom replication factor and
	/// partitioner.
	pub async fn partition_with(
		&self,
		partitions: usize,
		replication_factor: usize,
		partitioner: impl Partitioner,
	) -> Result<PartitionGroup, Error> {
		let (assignments_tx, assignments_rx) =
			watch::channel(vec![Vec::new(); partitions]);
		let (migrations_tx, migrations_rx) = mpsc::unbounded_channel();

		let view = PartitionView::new(
			partitions,
			replication_factor,
			assignments_tx,
			migrations_tx,
		);
		self.compose(Box::new(view)).await?;

		Ok(PartitionGroup::new(
			partitions,
			Arc::new(partitioner),
			assignments_rx,
			migrations_rx,
		))
	}
}

/// Internal API
impl Group {
	/// Submits a command to the replication runtime.
	pub(crate) async fn command(
		&self,
		command: GroupCommand,
	) -> Result<GroupCommandOutput, Error> {
		self.0.session.command(command).await.map_err(Error::from)
	}

	pub(crate) async fn submit_bytes(
		&self,
		member: MemberId,
		payload: Bytes,
	) -> Result<(), Error> {
		let index = match self
			.command(GroupCommand::Submit { member, payload })
			.await?
		{
			GroupCommandOutput::Submitted(index) => index,
			_ => unreachable!("submit replies with a task index"),
		};

		// the receipt may have been observed before the command future
		// resolved; the slot map resolves the race either way
		match self.0.tasks.wait(index).await {
			Ok(true) => Ok(()),
			Ok(false) => Err(Error::TaskFailed),
			Err(_) => Err(Error::SessionClosed),
		}
	}

	async fn join_with(
		&self,
		member: MemberId,
		persistent: bool,
	) -> Result<LocalMember, Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.send(ClientCommand::Join {
			member,
			persistent,
			reply: reply_tx,
		})?;

		// resolves only after this client has observed its own join event, so
		// the mirror already contains the member
		let joined = reply_rx.await.map_err(|_| Error::SessionClosed)??;

		Ok(LocalMember::new(
			joined.info,
			self.clone(),
			joined.tasks,
			joined.messages,
		))
	}

	async fn compose(&self, view: Box<dyn SubGroup>) -> Result<(), Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.send(ClientCommand::Compose {
			view,
			reply: reply_tx,
		})?;
		reply_rx.await.map_err(|_| Error::SessionClosed)
	}

	fn send(&self, command: ClientCommand) -> Result<(), Error> {
		self
			.0
			.commands_tx
			.send(command)
			.map_err(|_| Error::SessionClosed)
	}
}

/// Local ownership wiring handed to a resolved join.
struct JoinedLocal {
	info: MemberInfo,
	tasks: UnboundedReceiver<TaskDelivery>,
	messages: UnboundedReceiver<Bytes>,
}

/// Commands sent to the event-processing worker loop.
enum ClientCommand {
	/// Joins the group. The waiter is registered before the command is
	/// submitted so the resulting join event cannot be missed, and resolves
	/// only once the event bound to this client's session has been
	/// processed.
	Join {
		member: MemberId,
		persistent: bool,
		reply: oneshot::Sender<Result<JoinedLocal, Error>>,
	},

	/// Subscribes to membership change notifications.
	Subscribe {
		reply: oneshot::Sender<UnboundedReceiver<GroupChange>>,
	},

	/// Registers a derived view, seeding it with the current membership.
	Compose {
		view: Box<dyn SubGroup>,
		reply: oneshot::Sender<()>,
	},

	/// Delivers a direct message to a locally owned member.
	Message {
		member: MemberId,
		payload: Bytes,
		reply: oneshot::Sender<Result<(), Error>>,
	},
}

/// Completions of asynchronous work driven by the worker loop.
enum WorkItem {
	/// A join command committed; the waiter resolves via the join event.
	JoinCommitted,

	/// A join command was rejected; the waiter fails immediately.
	JoinFailed { member: MemberId, error: Error },
}

/// Task and message channels for one locally owned member.
struct LocalHandles {
	tasks: UnboundedSender<TaskDelivery>,
	messages: UnboundedSender<Bytes>,
}

/// The event-processing context of the group client.
///
/// All mutation of the member mirror, election, derived views and listener
/// dispatch happens here, serialized. Events from the runtime are processed
/// in commit order.
struct Worker {
	session: Session<GroupStateMachine>,
	address: Option<SocketAddr>,
	members: watch::Sender<Mirror>,
	election: Election,
	tasks: Arc<TaskSlots>,

	/// Channels of members owned by this client, keyed by member id.
	locals: HashMap<MemberId, LocalHandles>,

	/// Waiters for in-flight joins issued by this client.
	joining: HashMap<MemberId, oneshot::Sender<Result<JoinedLocal, Error>>>,

	/// Derived views fed after the base mirror updates.
	views: Vec<Box<dyn SubGroup>>,

	/// Membership change subscribers.
	subscribers: Vec<UnboundedSender<GroupChange>>,

	/// In-flight command submissions driven alongside event processing.
	pending_work:
		FuturesUnordered<Pin<Box<dyn Future<Output = WorkItem> + Send>>>,
}

impl Worker {
	async fn run(
		mut self,
		mut events: Events<GroupStateMachine>,
		mut commands: UnboundedReceiver<ClientCommand>,
		cancel: WaitForCancellationFutureOwned,
	) {
		let mut cancelled = pin!(cancel);

		loop {
			tokio::select! {
				_ = &mut cancelled => {
					trace!("group worker terminated");
					break;
				}

				event = events.recv() => {
					match event {
						Some(event) => self.on_event(event),
						None => {
							trace!("group session event stream ended");
							break;
						}
					}
				}

				Some(command) = commands.recv() => {
					self.on_command(command);
				}

				Some(item) = self.pending_work.next() => {
					self.on_work_item(item);
				}
			}
		}

		// fail parked submissions so callers observe the session closure
		self.tasks.abort();
	}

	fn on_event(&mut self, event: GroupEvent) {
		match event {
			GroupEvent::Join { info, session } => self.on_join(info, Some(session)),
			GroupEvent::Leave(member) => self.on_leave(&member),
			GroupEvent::Task(delivery) => self.on_task(delivery),
			GroupEvent::Ack(receipt) => self.tasks.complete(receipt.task, true),
			GroupEvent::Fail(receipt) => self.tasks.complete(receipt.task, false),
		}
	}

	/// Handles a join event, or a bootstrap snapshot entry when the binding
	/// session is unknown.
	fn on_join(&mut self, info: MemberInfo, bound: Option<SessionId>) {
		let id = info.member.clone();

		// a pending join waiter resolves only on the event caused by this
		// client's own command, recognized by an exact session match; a
		// foreign join under the same id must not satisfy it
		let expected = if bound == Some(self.session.id()) {
			self.joining.remove(&id)
		} else {
			// a foreign re-bind moves ownership of the member away from here
			if bound.is_some() && self.locals.remove(&id).is_some() {
				debug!(member = %Short(&id), "member re-bound by another client");
				self.members.send_if_modified(|mirror| {
					let Some(existing) = mirror.get(&id) else {
						return false;
					};
					if !existing.is_local() {
						return false;
					}
					let demoted = GroupMember::new(existing.info().clone(), false);
					mirror.insert(id.clone(), demoted);
					true
				});
			}
			None
		};

		let local = expected.is_some() || self.locals.contains_key(&id);

		// merge idempotently: a member already present is replaced only by a
		// newer incarnation, or by our own (re-)join of the same id
		let stale = self
			.members
			.borrow()
			.get(&id)
			.is_some_and(|existing| info.index <= existing.index())
			&& expected.is_none();
		if stale {
			trace!(member = %id, index = info.index, "ignoring stale join event");
			return;
		}

		let member = GroupMember::new(info.clone(), local);
		self.members.send_modify(|mirror| {
			mirror.insert(id.clone(), member.clone());
		});

		if let Some(reply) = expected {
			// our own join: wire up local ownership before resolving the caller
			let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
			let (messages_tx, messages_rx) = mpsc::unbounded_channel();
			self.locals.insert(id.clone(), LocalHandles {
				tasks: tasks_tx,
				messages: messages_tx,
			});
			let _ = reply.send(Ok(JoinedLocal {
				info: info.clone(),
				tasks: tasks_rx,
				messages: messages_rx,
			}));
		}

		debug!(member = %Short(&id), index = info.index, local, "member joined");

		// fan out after the mirror update: subscribers, election, then the
		// derived views
		self.notify(GroupChange::Joined(member.clone()));
		self.reconcile_election();
		for view in &mut self.views {
			view.on_join(&member);
		}
	}

	fn on_leave(&mut self, id: &MemberId) {
		let mut removed = None;
		self.members.send_if_modified(|mirror| {
			removed = mirror.remove(id);
			removed.is_some()
		});

		let Some(member) = removed else {
			trace!(member = %id, "ignoring leave event for an unknown member");
			return;
		};

		self.locals.remove(id);
		debug!(member = %Short(id), "member left");

		// derived views observe the leave before the base listeners, so
		// members leave children before parents
		for view in &mut self.views {
			view.on_leave(&member);
		}
		self.reconcile_election();
		self.notify(GroupChange::Left(member));
	}

	fn on_task(&mut self, delivery: TaskDelivery) {
		match self.locals.get(&delivery.member) {
			Some(handles) => {
				let _ = handles.tasks.send(delivery);
			}
			None => warn!(
				member = %delivery.member,
				task = delivery.index,
				"dropping task for a member not owned by this client",
			),
		}
	}

	fn on_command(&mut self, command: ClientCommand) {
		match command {
			ClientCommand::Join {
				member,
				persistent,
				reply,
			} => {
				// register the waiter first, then drive the command alongside
				// event processing so the two stay ordered
				self.joining.insert(member.clone(), reply);

				let session = self.session.clone();
				let address = self.address;

				self.pending_work.push(Box::pin(async move {
					let command = GroupCommand::Join {
						member: member.clone(),
						address,
						persistent,
					};
					match session.command(command).await {
						Ok(_) => WorkItem::JoinCommitted,
						Err(error) => WorkItem::JoinFailed {
							member,
							error: error.into(),
						},
					}
				}));
			}

			ClientCommand::Subscribe { reply } => {
				let (changes_tx, changes_rx) = mpsc::unbounded_channel();
				self.subscribers.push(changes_tx);
				let _ = reply.send(changes_rx);
			}

			ClientCommand::Compose { mut view, reply } => {
				// seed the view with the current membership in creation order
				let mirror = self.members.borrow().clone();
				for member in mirror.values().sorted_by_key(|member| member.index()) {
					view.on_join(member);
				}
				self.views.push(view);
				let _ = reply.send(());
			}

			ClientCommand::Message {
				member,
				payload,
				reply,
			} => {
				let result = match self.locals.get(&member) {
					Some(handles) => {
						let _ = handles.messages.send(payload);
						Ok(())
					}
					None => Err(Error::NotLocalMember(member)),
				};
				let _ = reply.send(result);
			}
		}
	}

	fn on_work_item(&mut self, item: WorkItem) {
		match item {
			// the waiter resolves when the join event is processed
			WorkItem::JoinCommitted => {}

			WorkItem::JoinFailed { member, error } => {
				if let Some(reply) = self.joining.remove(&member) {
					let _ = reply.send(Err(error));
				}
			}
		}
	}

	fn reconcile_election(&mut self) {
		let mirror = self.members.borrow().clone();
		self.election.reconcile(mirror.values());
	}

	fn notify(&mut self, change: GroupChange) {
		self
			.subscribers
			.retain(|subscriber| subscriber.send(change.clone()).is_ok());
	}
}
