use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

#[tokio::test]
async fn submit_ack_roundtrip() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let w1_id: MemberId = "w1".into();
	timeout_s(5, submitter.when().member_joined(w1_id.clone())).await?;

	let submit = submitter.submit(&w1_id, "hello");
	let work = async {
		let task = w1.task().await.expect("task delivered");
		assert_eq!(task.decode::<String>().unwrap(), "hello");
		task.ack().await
	};

	let (submitted, acked) = tokio::join!(submit, work);
	submitted?;
	acked?;
	Ok(())
}

#[tokio::test]
async fn failed_task_reports_to_the_submitter() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let w1_id: MemberId = "w1".into();
	timeout_s(5, submitter.when().member_joined(w1_id.clone())).await?;

	let submit = submitter.submit(&w1_id, "doomed");
	let work = async {
		let task = w1.task().await.expect("task delivered");
		task.fail().await
	};

	let (submitted, failed) = tokio::join!(submit, work);
	assert_eq!(submitted.unwrap_err(), Error::TaskFailed);
	failed?;
	Ok(())
}

#[tokio::test]
async fn tasks_deliver_in_order_with_one_in_flight() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let w1_id: MemberId = "w1".into();
	timeout_s(5, submitter.when().member_joined(w1_id.clone())).await?;

	// the submit commands are issued in declaration order on the first poll,
	// so the queue holds t1, t2, t3 in that order
	let t1 = submitter.submit(&w1_id, "t1");
	let t2 = submitter.submit(&w1_id, "t2");
	let t3 = submitter.submit(&w1_id, "t3");

	let work = async {
		let task = w1.task().await.expect("first task");
		assert_eq!(task.decode::<String>().unwrap(), "t1");
		task.ack().await.unwrap();

		let task = w1.task().await.expect("second task");
		assert_eq!(task.decode::<String>().unwrap(), "t2");
		task.fail().await.unwrap();

		let task = w1.task().await.expect("third task");
		assert_eq!(task.decode::<String>().unwrap(), "t3");
		task.ack().await.unwrap();
	};

	let (r1, r2, r3, ()) = tokio::join!(t1, t2, t3, work);
	assert!(r1.is_ok());
	assert_eq!(r2.unwrap_err(), Error::TaskFailed);
	assert!(r3.is_ok());
	Ok(())
}

#[tokio::test]
async fn submit_to_unknown_member_fails() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let submitter = client(&runtime).await?;

	let error = submitter
		.submit(&"nobody".into(), "x")
		.await
		.unwrap_err();
	assert_eq!(error, Error::UnknownMember("nobody".into()));

	Ok(())
}

#[tokio::test]
async fn tasks_fail_before_the_leave_is_announced() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let w1_id: MemberId = "w1".into();
	timeout_s(5, submitter.when().member_joined(w1_id.clone())).await?;

	let mut changes = submitter.changes().await?;

	let submit = submitter.submit(&w1_id, "t");
	let work = async move {
		// take the task but never acknowledge it; the owning session dies
		let _task = w1.task().await.expect("task delivered");
		drop(w1);
		drop(owner);
	};

	let (result, ()) = tokio::join!(submit, work);
	assert_eq!(result.unwrap_err(), Error::TaskFailed);

	// the departure is announced only after the forced failure
	let change = timeout_s(5, changes.recv()).await?.unwrap();
	assert!(
		matches!(&change, GroupChange::Left(member) if member.id() == &w1_id),
		"unexpected change: {change:?}",
	);

	Ok(())
}

#[tokio::test]
async fn broadcast_resolves_after_every_member_acks() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let mut w2 = owner.join_as("w2").await?;
	timeout_s(5, submitter.when().member_joined("w1".into())).await?;
	timeout_s(5, submitter.when().member_joined("w2".into())).await?;

	let tasks = submitter.tasks();
	let broadcast = tasks.submit("ping");
	let work = async {
		let task = w1.task().await.expect("task for w1");
		task.ack().await.unwrap();
		let task = w2.task().await.expect("task for w2");
		task.ack().await.unwrap();
	};

	let (result, ()) = tokio::join!(broadcast, work);
	result?;
	Ok(())
}

#[tokio::test]
async fn broadcast_fails_if_any_member_fails() -> anyhow::Result<()> {
	let runtime = runtime(Duration::ZERO);
	let owner = client(&runtime).await?;
	let submitter = client(&runtime).await?;

	let mut w1 = owner.join_as("w1").await?;
	let mut w2 = owner.join_as("w2").await?;
	timeout_s(5, submitter.when().member_joined("w1".into())).await?;
	timeout_s(5, submitter.when().member_joined("w2".into())).await?;

	let tasks = submitter.tasks();
	let broadcast = tasks.submit("ping");
	let work = async {
		let task = w1.task().await.expect("task for w1");
		task.ack().await.unwrap();
		let task = w2.task().await.expect("task for w2");
		task.fail().await.unwrap();
	};

	let (result, ()) = tokio::join!(broadcast, work);
	assert_eq!(result.unwrap_err(), Error::TaskFailed);
	Ok(())
}
