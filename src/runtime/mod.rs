//! Replication runtime contract consumed by the group core.
//!
//! The group state machine is a deterministic state machine applied atop a
//! replicated, linearizable command log. This module defines the contract
//! between the two: the [`StateMachine`] trait implemented by the group core,
//! and the [`Context`] through which an applying command reaches its log
//! index, the submitting session, the logical clock, deterministic timers and
//! per-session event publication.
//!
//! The consensus protocol itself is out of scope. [`Local`] provides an
//! in-process, strictly serial runtime that is linearizable by construction;
//! it is the runtime used by the integration tests and by single-process
//! deployments. Replicated deployments plug the same state machine into an
//! external log.

use serde::{Serialize, de::DeserializeOwned};

mod local;
mod scheduler;
mod session;

pub use local::{CommandError, Error, Events, Local, Session};
pub(crate) use {scheduler::Scheduler, session::Sessions};

/// Log index, increases monotonically with every applied command.
pub type Index = u64;

/// Identifies a client session registered with the runtime.
pub type SessionId = u64;

/// The logical clock of the state machine, measured from the start of the
/// log. Timers are scheduled against this clock, never against wall time, so
/// that replays are identical on every replica.
pub type LogTime = core::time::Duration;

/// A deterministic state machine replicated by the runtime.
///
/// Commands are applied one at a time in strict log order; no suspension
/// occurs inside a command and all side effects (event publication, timer
/// scheduling) are synchronous with apply. The state machine therefore needs
/// no interior locking.
pub trait StateMachine: Sized + Send + 'static {
	/// Commands mutate the state machine and are replicated in the log.
	type Command: Message;

	/// Queries are read-only and are not replicated in the log.
	type Query: Message;

	/// The result returned from applying a command.
	type CommandOutput: Message;

	/// The result returned from executing a query.
	type QueryOutput: Message;

	/// Events published to listening sessions as a side effect of applying
	/// commands.
	type Event: Message;

	/// Payload carried by deterministic timers. Timers carry values, never
	/// references into the state machine, and validate their target on fire.
	type Timer: Message;

	/// The error type with which a command can be rejected. A rejected command
	/// fails the originating future and causes no state change.
	type Error: core::error::Error + Clone + Send + Sync + 'static;

	/// Applies a committed command, mutating the state machine.
	fn apply(
		&mut self,
		ctx: &mut Context<'_, Self>,
		command: Self::Command,
	) -> Result<Self::CommandOutput, Self::Error>;

	/// Executes a read-only query against the current state.
	fn query(&self, query: Self::Query) -> Self::QueryOutput;

	/// Called when a client session closes, before the session is removed
	/// from the runtime's session table.
	fn session_closed(&mut self, ctx: &mut Context<'_, Self>, session: SessionId);

	/// Called when a timer scheduled through [`Context::schedule`] fires.
	fn timer_fired(&mut self, ctx: &mut Context<'_, Self>, timer: Self::Timer);
}

/// Bounds for every message that crosses the runtime boundary.
pub trait Message: Clone + Send + Serialize + DeserializeOwned + 'static {}

impl<T> Message for T where T: Clone + Send + Serialize + DeserializeOwned + 'static
{}

/// Execution context handed to the state machine while a command, session
/// close or timer is being applied.
pub struct Context<'a, M: StateMachine> {
	index: Index,
	session: SessionId,
	now: LogTime,
	sessions: &'a Sessions<M::Event>,
	timers: &'a mut Scheduler<M::Timer>,
}

impl<'a, M: StateMachine> Context<'a, M> {
	pub(crate) fn new(
		index: Index,
		session: SessionId,
		now: LogTime,
		sessions: &'a Sessions<M::Event>,
		timers: &'a mut Scheduler<M::Timer>,
	) -> Self {
		Self {
			index,
			session,
			now,
			sessions,
			timers,
		}
	}

	/// The committed log index of the command being applied. For session close
	/// and timer callbacks this is the index of the last applied command.
	pub const fn index(&self) -> Index {
		self.index
	}

	/// The session that submitted the command being applied.
	pub const fn session(&self) -> SessionId {
		self.session
	}

	/// The state machine's logical clock.
	pub const fn now(&self) -> LogTime {
		self.now
	}

	/// Returns `true` if the given session is registered and active.
	pub fn is_active(&self, session: SessionId) -> bool {
		self.sessions.is_active(session)
	}

	/// Publishes an event to the given session. Delivery is reliable and
	/// in-order while the session is active; events published to an inactive
	/// or unknown session are silently dropped.
	pub fn publish(&self, session: SessionId, event: M::Event) {
		self.sessions.publish(session, event);
	}

	/// Schedules a deterministic timer to fire `after` the current logical
	/// time.
	pub fn schedule(&mut self, after: LogTime, timer: M::Timer) {
		self.timers.schedule(self.now + after, timer);
	}
}
