use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

#[tokio::test]
async fn ephemeral_member_dies_with_its_session() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);

	let c1 = client(&runtime).await?;
	let m1 = c1.join_as("m1").await?;

	// a second client bootstraps its mirror from the listen snapshot
	let c2 = client(&runtime).await?;
	let mirrored = timeout_s(5, c2.when().member_joined("m1".into())).await?;
	assert!(!mirrored.is_local());
	assert_eq!(c2.members().len(), 1);

	// closing the owning session removes the member everywhere
	drop(m1);
	drop(c1);
	timeout_s(5, c2.when().member_left("m1".into())).await?;
	assert!(c2.members().is_empty());

	Ok(())
}

#[tokio::test]
async fn anonymous_members_get_unique_ids() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let a = c1.join().await?;
	let b = c1.join().await?;

	assert_ne!(a.id(), b.id());
	assert_eq!(c1.members().len(), 2);
	assert!(c1.member(a.id()).unwrap().is_local());
	assert!(c1.member(b.id()).unwrap().is_local());

	Ok(())
}

#[tokio::test]
async fn ephemeral_member_cannot_be_recreated() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	let _m1 = c1.join_as("m1").await?;
	timeout_s(5, c2.when().member_joined("m1".into())).await?;

	let error = c2.join_as("m1").await.unwrap_err();
	assert_eq!(error, Error::EphemeralExists("m1".into()));

	// the failed join left no trace on either client
	assert_eq!(c2.members().len(), 1);
	assert!(!c2.member(&"m1".into()).unwrap().is_local());

	Ok(())
}

#[tokio::test]
async fn join_resolves_after_the_mirror_contains_the_member() -> anyhow::Result<()>
{
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let member = c1.join_as("m1").await?;

	// by the time the join future resolves, this client has observed its own
	// join event
	let mirrored = c1.member(member.id()).expect("member is mirrored");
	assert!(mirrored.is_local());
	assert_eq!(mirrored.index(), member.index());

	Ok(())
}

#[tokio::test]
async fn explicit_leave_removes_the_member() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	let m1 = c1.join_as("m1").await?;
	timeout_s(5, c2.when().member_joined("m1".into())).await?;

	m1.leave().await?;
	assert!(c1.members().is_empty());

	timeout_s(5, c2.when().member_left("m1".into())).await?;
	Ok(())
}

#[tokio::test]
async fn change_subscribers_observe_joins_and_leaves() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	let mut changes = c2.changes().await?;

	let m1 = c1.join_as("m1").await?;
	let change = timeout_s(5, changes.recv()).await?.unwrap();
	assert!(
		matches!(&change, GroupChange::Joined(member) if member.id() == &"m1".into()),
		"unexpected change: {change:?}",
	);

	m1.leave().await?;
	let change = timeout_s(5, changes.recv()).await?.unwrap();
	assert!(
		matches!(&change, GroupChange::Left(member) if member.id() == &"m1".into()),
		"unexpected change: {change:?}",
	);

	Ok(())
}

#[tokio::test]
async fn direct_messages_reach_only_local_members() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	let mut m1 = c1.join_as("m1").await?;
	timeout_s(5, c2.when().member_joined("m1".into())).await?;

	c1.message(&"m1".into(), "hi").await?;
	let message = timeout_s(5, m1.message()).await?.unwrap();
	assert_eq!(message.as_ref(), b"hi");

	// a client that does not own the member cannot reach it directly
	let error = c2.message(&"m1".into(), "hi").await.unwrap_err();
	assert_eq!(error, Error::NotLocalMember("m1".into()));

	Ok(())
}
