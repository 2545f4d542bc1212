use {
	super::{Context, Index, Scheduler, SessionId, Sessions, StateMachine},
	core::pin::pin,
	std::sync::Arc,
	tokio::sync::{
		mpsc::{self, UnboundedReceiver, UnboundedSender},
		oneshot,
	},
	tokio_util::sync::{
		CancellationToken,
		DropGuard,
		WaitForCancellationFutureOwned,
	},
	tracing::trace,
};

/// Failures of the runtime itself, as opposed to rejections issued by the
/// state machine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	#[error("replication runtime terminated")]
	Terminated,
}

/// Failure mode of a submitted command: either the runtime went away, or the
/// state machine rejected the command. A rejected command causes no state
/// change and is never retried by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum CommandError<E: core::error::Error> {
	#[error(transparent)]
	Runtime(#[from] Error),

	#[error(transparent)]
	Rejected(E),
}

/// An in-process replication runtime.
///
/// Commands are applied one at a time in submission order by a single
/// background runloop, which makes the runtime linearizable by construction.
/// Timers are driven by the runtime's logical clock, measured from the start
/// of the runloop.
///
/// Dropping the runtime terminates the runloop; sessions observe this as
/// [`Error::Terminated`] on their next command.
pub struct Local<M: StateMachine> {
	requests: UnboundedSender<Request<M>>,
	_cancel_on_drop: DropGuard,
}

impl<M: StateMachine> Local<M> {
	/// Spawns a runtime runloop around the given state machine.
	pub fn new(machine: M) -> Self {
		let (requests_tx, requests_rx) = mpsc::unbounded_channel();
		let cancellation = CancellationToken::new();
		let cancel_signal = cancellation.clone().cancelled_owned();

		let worker = Worker {
			machine,
			sessions: Sessions::default(),
			timers: Scheduler::default(),
			applied: 0,
			epoch: tokio::time::Instant::now(),
		};

		tokio::spawn(worker.run(requests_rx, cancel_signal));

		Self {
			requests: requests_tx,
			_cancel_on_drop: cancellation.drop_guard(),
		}
	}

	/// Opens a new client session.
	///
	/// Returns the command-submission handle and the session's event stream.
	/// The session stays registered until every clone of the returned
	/// [`Session`] has been dropped.
	pub async fn connect(&self) -> Result<(Session<M>, Events<M>), Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.requests
			.send(Request::Connect { reply: reply_tx })
			.map_err(|_| Error::Terminated)?;

		let (id, events_rx) = reply_rx.await.map_err(|_| Error::Terminated)?;

		let session = Session {
			id,
			requests: self.requests.clone(),
			close_on_drop: Arc::new(CloseGuard {
				id,
				requests: self.requests.clone(),
			}),
		};

		Ok((session, Events(events_rx)))
	}
}

/// Command-submission handle for one client session.
///
/// Cheap to clone; all clones refer to the same session. The session is
/// closed when the last clone is dropped.
pub struct Session<M: StateMachine> {
	id: SessionId,
	requests: UnboundedSender<Request<M>>,
	close_on_drop: Arc<CloseGuard<M>>,
}

impl<M: StateMachine> Clone for Session<M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			requests: self.requests.clone(),
			close_on_drop: Arc::clone(&self.close_on_drop),
		}
	}
}

impl<M: StateMachine> Session<M> {
	/// The runtime-assigned id of this session.
	pub const fn id(&self) -> SessionId {
		self.id
	}

	/// Submits a command and resolves once it has been applied.
	///
	/// Dropping the returned future detaches it but does not retract the
	/// command; it is still applied in order.
	pub async fn command(
		&self,
		command: M::Command,
	) -> Result<M::CommandOutput, CommandError<M::Error>> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.requests
			.send(Request::Command {
				session: self.id,
				command,
				reply: reply_tx,
			})
			.map_err(|_| Error::Terminated)?;

		reply_rx
			.await
			.map_err(|_| Error::Terminated)?
			.map_err(CommandError::Rejected)
	}

	/// Executes a read-only query against the current state.
	pub async fn query(&self, query: M::Query) -> Result<M::QueryOutput, Error> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.requests
			.send(Request::Query {
				query,
				reply: reply_tx,
			})
			.map_err(|_| Error::Terminated)?;

		reply_rx.await.map_err(|_| Error::Terminated)
	}
}

/// Receiving half of a session's event stream. Events arrive in commit order
/// and must be processed in that order.
pub struct Events<M: StateMachine>(UnboundedReceiver<M::Event>);

impl<M: StateMachine> Events<M> {
	/// Receives the next event, or `None` once the session is gone.
	pub async fn recv(&mut self) -> Option<M::Event> {
		self.0.recv().await
	}
}

/// Closes the session when the last clone of its [`Session`] is dropped.
struct CloseGuard<M: StateMachine> {
	id: SessionId,
	requests: UnboundedSender<Request<M>>,
}

impl<M: StateMachine> Drop for CloseGuard<M> {
	fn drop(&mut self) {
		let _ = self.requests.send(Request::Close { session: self.id });
	}
}

enum Request<M: StateMachine> {
	/// Registers a new session and returns its id and event stream.
	Connect {
		reply: oneshot::Sender<(SessionId, UnboundedReceiver<M::Event>)>,
	},

	/// Appends a command to the log and applies it.
	Command {
		session: SessionId,
		command: M::Command,
		reply: oneshot::Sender<Result<M::CommandOutput, M::Error>>,
	},

	/// Executes a read-only query.
	Query {
		query: M::Query,
		reply: oneshot::Sender<M::QueryOutput>,
	},

	/// Removes a session and runs the state machine's close hook.
	Close { session: SessionId },
}

struct Worker<M: StateMachine> {
	machine: M,
	sessions: Sessions<M::Event>,
	timers: Scheduler<M::Timer>,
	applied: Index,
	epoch: tokio::time::Instant,
}

impl<M: StateMachine> Worker<M> {
	async fn run(
		mut self,
		mut requests: UnboundedReceiver<Request<M>>,
		cancel: WaitForCancellationFutureOwned,
	) {
		let mut cancelled = pin!(cancel);

		loop {
			let deadline = self.timers.next_deadline().map(|at| self.epoch + at);

			tokio::select! {
				_ = &mut cancelled => {
					trace!("runtime runloop terminated");
					break;
				}

				request = requests.recv() => {
					match request {
						Some(request) => self.on_request(request),
						None => break,
					}
				}

				// fires the earliest pending deterministic timer
				() = tokio::time::sleep_until(
					deadline.unwrap_or_else(tokio::time::Instant::now),
				), if deadline.is_some() => {
					self.on_timers();
				}
			}
		}
	}

	fn on_request(&mut self, request: Request<M>) {
		match request {
			Request::Connect { reply } => {
				let (id, events_rx) = self.sessions.open();
				trace!(session = id, "session opened");
				let _ = reply.send((id, events_rx));
			}

			Request::Command {
				session,
				command,
				reply,
			} => {
				// the index is allocated before apply so it names the commit
				// position of this command
				self.applied += 1;
				let now = self.epoch.elapsed();
				let mut ctx = Context::new(
					self.applied,
					session,
					now,
					&self.sessions,
					&mut self.timers,
				);
				let result = self.machine.apply(&mut ctx, command);
				let _ = reply.send(result);
			}

			Request::Query { query, reply } => {
				let _ = reply.send(self.machine.query(query));
			}

			Request::Close { session } => {
				// the session is removed from the table first so the close hook
				// publishes only to the surviving sessions
				if self.sessions.close(session) {
					let now = self.epoch.elapsed();
					let mut ctx = Context::new(
						self.applied,
						session,
						now,
						&self.sessions,
						&mut self.timers,
					);
					self.machine.session_closed(&mut ctx, session);
					trace!(session, "session closed");
				}
			}
		}
	}

	fn on_timers(&mut self) {
		let now = self.epoch.elapsed();

		// drain due timers before firing so the hooks can schedule new ones
		let mut due = Vec::new();
		while let Some(timer) = self.timers.pop_due(now) {
			due.push(timer);
		}

		for timer in due {
			let mut ctx = Context::new(
				self.applied,
				0,
				now,
				&self.sessions,
				&mut self.timers,
			);
			self.machine.timer_fired(&mut ctx, timer);
		}
	}
}
