use crate::group::member::GroupMember;

/// A derived, filtered view of the base group's membership.
///
/// The base group fans every membership change into its registered views from
/// the event-processing context, after its own mirror has been updated and
/// before the event handler returns. On registration a view is seeded by
/// replaying the current membership through `on_join` in member creation
/// order, so views composed at any point observe the same history.
pub(crate) trait SubGroup: Send + 'static {
	/// A member joined the group, or re-bound with updated info.
	fn on_join(&mut self, member: &GroupMember);

	/// A member left the group.
	fn on_leave(&mut self, member: &GroupMember);
}
