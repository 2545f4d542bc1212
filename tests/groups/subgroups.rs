use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

#[tokio::test]
async fn hash_view_routes_keys_to_members() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let _a = c1.join_as("a").await?;
	let _b = c1.join_as("b").await?;

	let view = c1.hash().await?;
	assert_eq!(view.len(), 2);

	let owner = view.member_for("some-key").expect("non-empty view");
	assert!(c1.member(owner.id()).is_some());

	// routing is a pure function of the membership
	let again = view.member_for("some-key").expect("non-empty view");
	assert_eq!(owner.id(), again.id());

	Ok(())
}

#[tokio::test]
async fn hash_view_follows_membership_changes() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let _a = c1.join_as("a").await?;
	let b = c1.join_as("b").await?;

	let view = c1.hash().await?;
	assert_eq!(view.len(), 2);

	// by the time leave() resolves, the mirror and every composed view have
	// processed the departure
	b.leave().await?;
	assert_eq!(view.len(), 1);

	for key in ["alpha", "beta", "gamma"] {
		assert_eq!(view.member_for(key).unwrap().id(), &"a".into());
	}

	// views composed late observe the same membership
	let _c = c1.join_as("c").await?;
	let late = c1.hash().await?;
	assert_eq!(late.len(), 2);

	Ok(())
}

#[tokio::test]
async fn partition_view_spreads_partitions_over_members() -> anyhow::Result<()>
{
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let _a = c1.join_as("a").await?;
	let mut view = c1.partition(4).await?;
	assert_eq!(view.partitions(), 4);

	// seeding assigns every partition to the only member
	for _ in 0..4 {
		let migration = timeout_s(5, view.migration()).await?.unwrap();
		assert!(migration.source.is_none());
		assert_eq!(migration.target.unwrap().id(), &"a".into());
	}

	for partition in 0..4 {
		assert_eq!(view.replicas(partition).len(), 1);
	}
	assert!(view.primary_for("some-key").is_some());

	// a second member takes over every other partition
	let _b = c1.join_as("b").await?;
	for _ in 0..2 {
		let migration = timeout_s(5, view.migration()).await?.unwrap();
		assert_eq!(migration.source.unwrap().id(), &"a".into());
		assert_eq!(migration.target.unwrap().id(), &"b".into());
	}

	let primaries: std::collections::HashSet<MemberId> = (0..4)
		.map(|partition| view.replicas(partition)[0].id().clone())
		.collect();
	assert_eq!(primaries.len(), 2);

	Ok(())
}

#[tokio::test]
async fn partition_replicas_follow_departures() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let _a = c1.join_as("a").await?;
	let b = c1.join_as("b").await?;

	let view = c1.partition(2).await?;

	b.leave().await?;

	for partition in 0..2 {
		let replicas = view.replicas(partition);
		assert_eq!(replicas.len(), 1);
		assert_eq!(replicas[0].id(), &"a".into());
	}

	Ok(())
}
