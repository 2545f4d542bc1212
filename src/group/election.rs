//! Deterministic leader election over the client's member mirror.
//!
//! The leader is chosen client-side, but the rule is deterministic and
//! universal: the member with the lowest creation index wins. Since indices
//! are unique log positions, every client observing the same member set
//! derives the same leader, and the choice is stable: the leader is the
//! oldest surviving member.

use {
	crate::group::{member::GroupMember, protocol::MemberInfo},
	tokio::sync::watch,
	tracing::debug,
};

/// A leadership term observed by a client.
///
/// The term number is a client-local view sequence, incremented whenever the
/// elected leader changes identity. It is not derived from any replication
/// term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
	term: u64,
	leader: MemberInfo,
}

impl Term {
	/// The view sequence number; increases on every leader change.
	pub const fn term(&self) -> u64 {
		self.term
	}

	/// The member currently holding leadership.
	pub const fn leader(&self) -> &MemberInfo {
		&self.leader
	}
}

/// Tracks the elected leader and reissues terms as membership changes.
pub(crate) struct Election {
	term: watch::Sender<Option<Term>>,
	counter: u64,
}

impl Election {
	pub(crate) fn new() -> Self {
		Self {
			term: watch::Sender::new(None),
			counter: 0,
		}
	}

	pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Term>> {
		self.term.subscribe()
	}

	/// Recomputes the leader after a membership change and publishes a new
	/// term if the leader's identity changed. An empty member set clears the
	/// leader without issuing a term; the next join elects at the next term
	/// number.
	pub(crate) fn reconcile<'a>(
		&mut self,
		members: impl IntoIterator<Item = &'a GroupMember>,
	) {
		let next = elect(members).map(|member| member.info().clone());
		let current = self
			.term
			.borrow()
			.as_ref()
			.map(|term| term.leader().member.clone());

		match next {
			Some(leader) if current.as_ref() != Some(&leader.member) => {
				self.counter += 1;
				debug!(
					leader = %leader.member,
					term = self.counter,
					"leader elected",
				);
				self.term.send_replace(Some(Term {
					term: self.counter,
					leader,
				}));
			}
			None if current.is_some() => {
				self.term.send_replace(None);
			}
			_ => {}
		}
	}
}

/// Deterministic leader choice: the member created at the lowest log index.
/// Indices are unique log positions, so ties are impossible.
pub(crate) fn elect<'a>(
	members: impl IntoIterator<Item = &'a GroupMember>,
) -> Option<&'a GroupMember> {
	members.into_iter().min_by_key(|member| member.index())
}
