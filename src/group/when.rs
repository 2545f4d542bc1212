use {
	crate::{
		group::{client::Mirror, election::Term, member::GroupMember},
		primitives::MemberId,
	},
	tokio::sync::watch,
};

/// Awaits changes to the group's state.
#[derive(Debug, Clone)]
pub struct When {
	members: watch::Receiver<Mirror>,
	term: watch::Receiver<Option<Term>>,
}

/// Public API
impl When {
	/// Returns a future that resolves once the given member is part of the
	/// group. Resolves immediately if it already is.
	pub fn member_joined(
		&self,
		member: MemberId,
	) -> impl Future<Output = GroupMember> + Send + 'static {
		let mut members = self.members.clone();

		async move {
			members.mark_changed();

			loop {
				{
					let mirror = members.borrow_and_update();
					if let Some(found) = mirror.get(&member) {
						return found.clone();
					}
				}

				if members.changed().await.is_err() {
					// if the watch channel is closed, consider the member will
					// never join and never resolve this future
					core::future::pending::<()>().await;
				}
			}
		}
	}

	/// Returns a future that resolves once the given member is no longer part
	/// of the group. Resolves immediately if it already is not.
	pub fn member_left(
		&self,
		member: MemberId,
	) -> impl Future<Output = ()> + Send + 'static {
		let mut members = self.members.clone();

		async move {
			members.mark_changed();

			let absent = members.wait_for(|mirror| !mirror.contains_key(&member));
			if absent.await.is_err() {
				// if the watch channel is closed, consider the member will never
				// leave and never resolve this future
				core::future::pending::<()>().await;
			}
		}
	}

	/// Returns a future that resolves when a group leader is elected.
	/// Resolves immediately if a leader is already elected.
	pub fn leader_elected(
		&self,
	) -> impl Future<Output = Term> + Send + 'static {
		let mut term = self.term.clone();

		async move {
			term.mark_changed();

			loop {
				{
					let value = term.borrow_and_update();
					if let Some(term) = value.as_ref() {
						return term.clone();
					}
				}

				if term.changed().await.is_err() {
					// if the watch channel is closed, consider no leader will be
					// elected and never resolve this future
					core::future::pending::<()>().await;
				}
			}
		}
	}

	/// Returns a future that resolves with the next term whose number differs
	/// from the current one. Does not resolve immediately.
	pub fn term_changed(&self) -> impl Future<Output = Term> + Send + 'static {
		let mut term = self.term.clone();
		let current = term.borrow().as_ref().map(Term::term);

		async move {
			loop {
				if term.changed().await.is_err() {
					core::future::pending::<()>().await;
				}

				let next = term.borrow_and_update().clone();
				if let Some(next) = next {
					if Some(next.term()) != current {
						return next;
					}
				}
			}
		}
	}
}

/// Internal API
impl When {
	pub(crate) const fn new(
		members: watch::Receiver<Mirror>,
		term: watch::Receiver<Option<Term>>,
	) -> Self {
		Self { members, term }
	}
}
