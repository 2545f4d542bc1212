use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

#[tokio::test]
async fn global_properties_roundtrip() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	c1.set_property("region", "eu").await?;

	let value = c2.property("region").await?;
	assert_eq!(value.as_deref(), Some(b"eu".as_slice()));

	c1.remove_property("region").await?;
	assert_eq!(c2.property("region").await?, None);

	Ok(())
}

#[tokio::test]
async fn last_writer_wins() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	c1.set_property("epoch", "1").await?;
	c1.set_property("epoch", "2").await?;

	let value = c1.property("epoch").await?;
	assert_eq!(value.as_deref(), Some(b"2".as_slice()));

	Ok(())
}

#[tokio::test]
async fn member_properties_die_with_the_member() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let c2 = client(&runtime).await?;

	let m1 = c1.join_as("m1").await?;
	let m1_id: MemberId = "m1".into();
	timeout_s(5, c2.when().member_joined(m1_id.clone())).await?;

	c1.set_member_property(&m1_id, "slot", "3").await?;

	let value = c2.member_property(&m1_id, "slot").await?;
	assert_eq!(value.as_deref(), Some(b"3".as_slice()));

	// scoping: the global namespace is untouched
	assert_eq!(c2.property("slot").await?, None);

	m1.leave().await?;
	assert_eq!(c2.member_property(&m1_id, "slot").await?, None);

	Ok(())
}
