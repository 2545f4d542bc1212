use {core::time::Duration, muster::prelude::*};

mod election;
mod expiration;
mod membership;
mod properties;
mod subgroups;
mod tasks;

/// Spawns an in-process runtime hosting one group state machine.
fn runtime(expiration: Duration) -> Local<GroupStateMachine> {
	Local::new(GroupStateMachine::new(expiration))
}

/// Connects a client to the group with default options.
async fn client(runtime: &Local<GroupStateMachine>) -> anyhow::Result<Group> {
	Ok(Group::connect(runtime, GroupConfig::default()).await?)
}
