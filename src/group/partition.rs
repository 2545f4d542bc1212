use {
	crate::group::{
		hash::{Blake3Hasher, KeyHasher},
		member::GroupMember,
		subgroup::SubGroup,
	},
	std::sync::Arc,
	tokio::sync::{
		mpsc::{UnboundedReceiver, UnboundedSender},
		watch,
	},
};

/// Pluggable assignment of keys to partitions.
pub trait Partitioner: Send + Sync + 'static {
	/// Maps a key to a partition in `0..partitions`.
	fn partition(&self, key: &[u8], partitions: usize) -> usize;
}

/// Default [`Partitioner`]: blake3 position modulo the partition count.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
	fn partition(&self, key: &[u8], partitions: usize) -> usize {
		if partitions == 0 {
			return 0;
		}
		(Blake3Hasher.position(key) % partitions as u64) as usize
	}
}

/// Emitted when a membership change moves a partition replica between
/// members.
#[derive(Debug, Clone)]
pub struct PartitionMigration {
	/// The member the replica is moving away from; `None` when the replica
	/// slot was previously unassigned.
	pub source: Option<GroupMember>,

	/// The member the replica is moving to; `None` when the slot becomes
	/// unassigned.
	pub target: Option<GroupMember>,

	/// The partition being reassigned.
	pub partition: usize,
}

/// A derived view that spreads a fixed number of partitions over the member
/// set.
///
/// Assignment is a pure function of the membership ordered by creation index:
/// replica `r` of partition `p` is held by member `(p + r) mod |members|`.
/// Every client therefore derives the same assignment from the same member
/// set. Membership changes that reassign replicas are reported as
/// [`PartitionMigration`] events.
pub struct PartitionGroup {
	partitions: usize,
	partitioner: Arc<dyn Partitioner>,
	assignments: watch::Receiver<Assignments>,
	migrations: UnboundedReceiver<PartitionMigration>,
}

/// Replica sets per partition, primaries first.
type Assignments = Vec<Vec<GroupMember>>;

impl PartitionGroup {
	pub(crate) fn new(
		partitions: usize,
		partitioner: Arc<dyn Partitioner>,
		assignments: watch::Receiver<Assignments>,
		migrations: UnboundedReceiver<PartitionMigration>,
	) -> Self {
		Self {
			partitions,
			partitioner,
			assignments,
			migrations,
		}
	}

	/// Number of partitions in this view.
	pub const fn partitions(&self) -> usize {
		self.partitions
	}

	/// The members currently assigned to the given partition, primary first.
	/// Empty while the group has no members.
	pub fn replicas(&self, partition: usize) -> Vec<GroupMember> {
		self
			.assignments
			.borrow()
			.get(partition)
			.cloned()
			.unwrap_or_default()
	}

	/// The members responsible for the given key.
	pub fn members_for(&self, key: impl AsRef<[u8]>) -> Vec<GroupMember> {
		let partition = self.partitioner.partition(key.as_ref(), self.partitions);
		self.replicas(partition)
	}

	/// The primary member for the given key, or `None` while the group has no
	/// members.
	pub fn primary_for(&self, key: impl AsRef<[u8]>) -> Option<GroupMember> {
		self.members_for(key).into_iter().next()
	}

	/// Receives the next partition migration caused by a membership change.
	pub async fn migration(&mut self) -> Option<PartitionMigration> {
		self.migrations.recv().await
	}
}

/// [`SubGroup`] adapter recomputing assignments on membership changes.
pub(crate) struct PartitionView {
	partitions: usize,
	replication_factor: usize,

	/// Current membership ordered by creation index.
	members: Vec<GroupMember>,

	assignments: watch::Sender<Assignments>,
	migrations: UnboundedSender<PartitionMigration>,
}

impl PartitionView {
	pub(crate) fn new(
		partitions: usize,
		replication_factor: usize,
		assignments: watch::Sender<Assignments>,
		migrations: UnboundedSender<PartitionMigration>,
	) -> Self {
		Self {
			partitions,
			replication_factor,
			members: Vec::new(),
			assignments,
			migrations,
		}
	}

	fn reassign(&mut self) {
		let next = assign(&self.members, self.partitions, self.replication_factor);
		let previous = self.assignments.borrow().clone();

		for partition in 0..self.partitions {
			for slot in 0..self.replication_factor {
				let source = previous.get(partition).and_then(|r| r.get(slot));
				let target = next.get(partition).and_then(|r| r.get(slot));

				if source.map(GroupMember::id) != target.map(GroupMember::id) {
					let _ = self.migrations.send(PartitionMigration {
						source: source.cloned(),
						target: target.cloned(),
						partition,
					});
				}
			}
		}

		self.assignments.send_replace(next);
	}
}

impl SubGroup for PartitionView {
	fn on_join(&mut self, member: &GroupMember) {
		self.members.retain(|m| m.id() != member.id());
		let at = self
			.members
			.partition_point(|m| m.index() < member.index());
		self.members.insert(at, member.clone());
		self.reassign();
	}

	fn on_leave(&mut self, member: &GroupMember) {
		self.members.retain(|m| m.id() != member.id());
		self.reassign();
	}
}

/// Deterministic round-robin assignment over the member set ordered by
/// creation index.
fn assign(
	members: &[GroupMember],
	partitions: usize,
	replication_factor: usize,
) -> Assignments {
	if members.is_empty() {
		return vec![Vec::new(); partitions];
	}

	(0..partitions)
		.map(|partition| {
			(0..replication_factor.min(members.len()))
				.map(|replica| members[(partition + replica) % members.len()].clone())
				.collect()
		})
		.collect()
}
