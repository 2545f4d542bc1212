use {
	crate::{
		group::{member::GroupMember, subgroup::SubGroup},
		primitives::MemberId,
	},
	std::{
		collections::{BTreeMap, HashMap},
		sync::Arc,
	},
	tokio::sync::watch,
};

/// Pluggable hasher that places members and keys on the ring.
pub trait KeyHasher: Send + Sync + 'static {
	/// Hashes a key to a position on the ring.
	fn position(&self, key: &[u8]) -> u64;
}

/// Default [`KeyHasher`] backed by blake3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl KeyHasher for Blake3Hasher {
	fn position(&self, key: &[u8]) -> u64 {
		let digest = blake3::hash(key);
		let mut bytes = [0u8; 8];
		bytes.copy_from_slice(&digest.as_bytes()[..8]);
		u64::from_le_bytes(bytes)
	}
}

/// A derived view that routes keys to members with a consistent-hash ring.
///
/// Each member occupies `virtual_nodes` positions on the ring; a key is
/// routed to the member owning the first position at or after the key's own
/// position, wrapping around at the end of the ring. Membership changes move
/// only the keys adjacent to the affected positions.
///
/// Cheap to clone; all clones observe the same ring.
#[derive(Clone)]
pub struct ConsistentHashGroup {
	ring: watch::Receiver<Ring>,
}

impl ConsistentHashGroup {
	pub(crate) const fn new(ring: watch::Receiver<Ring>) -> Self {
		Self { ring }
	}

	/// Returns the member responsible for the given key, or `None` while the
	/// view is empty.
	pub fn member_for(&self, key: impl AsRef<[u8]>) -> Option<GroupMember> {
		self.ring.borrow().member_for(key.as_ref())
	}

	/// Number of members currently on the ring.
	pub fn len(&self) -> usize {
		self.ring.borrow().members.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ring.borrow().members.is_empty()
	}
}

/// The ring itself: a sorted map of positions to member ids.
pub(crate) struct Ring {
	hasher: Arc<dyn KeyHasher>,
	virtual_nodes: usize,
	positions: BTreeMap<u64, MemberId>,
	members: HashMap<MemberId, GroupMember>,
}

impl Ring {
	pub(crate) fn new(hasher: Arc<dyn KeyHasher>, virtual_nodes: usize) -> Self {
		Self {
			hasher,
			virtual_nodes,
			positions: BTreeMap::new(),
			members: HashMap::new(),
		}
	}

	fn insert(&mut self, member: GroupMember) {
		for vnode in 0..self.virtual_nodes {
			let position = self.position_of(member.id(), vnode);
			self.positions.insert(position, member.id().clone());
		}
		self.members.insert(member.id().clone(), member);
	}

	fn remove(&mut self, member: &GroupMember) {
		for vnode in 0..self.virtual_nodes {
			let position = self.position_of(member.id(), vnode);
			// only vacate positions still owned by this member; a colliding
			// position may have been claimed by a later insert
			if self.positions.get(&position) == Some(member.id()) {
				self.positions.remove(&position);
			}
		}
		self.members.remove(member.id());
	}

	fn position_of(&self, member: &MemberId, vnode: usize) -> u64 {
		self
			.hasher
			.position(format!("{member}/{vnode}").as_bytes())
	}

	pub(crate) fn member_for(&self, key: &[u8]) -> Option<GroupMember> {
		let position = self.hasher.position(key);

		let id = self
			.positions
			.range(position..)
			.next()
			.or_else(|| self.positions.iter().next())
			.map(|(_, id)| id)?;

		self.members.get(id).cloned()
	}
}

/// [`SubGroup`] adapter publishing ring updates to the view's handles.
pub(crate) struct HashView {
	ring: watch::Sender<Ring>,
}

impl HashView {
	pub(crate) const fn new(ring: watch::Sender<Ring>) -> Self {
		Self { ring }
	}
}

impl SubGroup for HashView {
	fn on_join(&mut self, member: &GroupMember) {
		self
			.ring
			.send_modify(|ring| ring.insert(member.clone()));
	}

	fn on_leave(&mut self, member: &GroupMember) {
		self.ring.send_modify(|ring| ring.remove(member));
	}
}
