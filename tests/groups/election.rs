use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

#[tokio::test]
async fn oldest_member_leads_and_terms_advance() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let observer = client(&runtime).await?;

	let a = c1.join_as("a").await?;
	let _b = c1.join_as("b").await?;
	let _c = c1.join_as("c").await?;

	// the first member to join leads
	let term = timeout_s(5, observer.when().leader_elected()).await?;
	assert_eq!(term.term(), 1);
	assert_eq!(term.leader().member, "a".into());

	// the leader leaving hands leadership to the next oldest member
	let changed = observer.when().term_changed();
	a.leave().await?;

	let term = timeout_s(5, changed).await?;
	assert_eq!(term.term(), 2);
	assert_eq!(term.leader().member, "b".into());

	// the old leader returns with a fresh index and does not displace b
	let _a2 = c1.join_as("a").await?;
	timeout_s(5, observer.when().member_joined("a".into())).await?;

	let term = observer.term().unwrap();
	assert_eq!(term.term(), 2);
	assert_eq!(term.leader().member, "b".into());
	assert_eq!(observer.leader().unwrap().id(), &"b".into());

	Ok(())
}

#[tokio::test]
async fn clients_converge_on_the_same_leader() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let _x = c1.join_as("x").await?;
	let _y = c1.join_as("y").await?;

	let o1 = client(&runtime).await?;
	let o2 = client(&runtime).await?;

	let t1 = timeout_s(5, o1.when().leader_elected()).await?;
	let t2 = timeout_s(5, o2.when().leader_elected()).await?;

	assert_eq!(t1.leader().member, t2.leader().member);
	assert_eq!(t1.term(), t2.term());

	Ok(())
}

#[tokio::test]
async fn last_leave_clears_the_leader() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;

	let only = c1.join_as("only").await?;
	assert_eq!(c1.term().unwrap().term(), 1);

	only.leave().await?;
	assert!(c1.term().is_none());
	assert!(c1.leader().is_none());

	// the next join starts a fresh term
	let _again = c1.join_as("again").await?;
	let term = c1.term().unwrap();
	assert_eq!(term.term(), 2);
	assert_eq!(term.leader().member, "again".into());

	Ok(())
}
