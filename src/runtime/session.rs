use {
	super::SessionId,
	std::collections::HashMap,
	tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

/// Tracks the client sessions currently registered with the runtime and fans
/// events out to them.
///
/// A session receives events only while it is registered here; publication to
/// a closed or unknown session is a silent no-op. The registry never reorders
/// events, each session observes its subset in publication order.
pub(crate) struct Sessions<E> {
	next_id: SessionId,
	active: HashMap<SessionId, UnboundedSender<E>>,
}

impl<E> Default for Sessions<E> {
	fn default() -> Self {
		Self {
			next_id: 1,
			active: HashMap::new(),
		}
	}
}

impl<E> Sessions<E> {
	/// Registers a new session and returns its id together with the receiving
	/// half of its event channel.
	pub(crate) fn open(&mut self) -> (SessionId, UnboundedReceiver<E>) {
		let id = self.next_id;
		self.next_id += 1;

		let (events_tx, events_rx) = mpsc::unbounded_channel();
		self.active.insert(id, events_tx);
		(id, events_rx)
	}

	/// Removes a session. Returns `true` if the session was registered.
	pub(crate) fn close(&mut self, session: SessionId) -> bool {
		self.active.remove(&session).is_some()
	}

	/// Returns `true` if the given session is registered and its client is
	/// still receiving events.
	pub(crate) fn is_active(&self, session: SessionId) -> bool {
		self
			.active
			.get(&session)
			.is_some_and(|events| !events.is_closed())
	}

	/// Publishes an event to the given session if it is active.
	pub(crate) fn publish(&self, session: SessionId, event: E) {
		if let Some(events) = self.active.get(&session) {
			// a send error means the client went away before its close was
			// processed; the event is dropped like for any inactive session
			let _ = events.send(event);
		}
	}
}
