use {
	super::{client, runtime},
	crate::utils::timeout_s,
	core::time::Duration,
	muster::prelude::*,
};

/// Clients of a group with a non-zero expiration window. The window must be
/// identical on every client since it parametrizes the state machine.
fn expiring_config() -> GroupConfig {
	GroupConfig::builder()
		.with_expiration(Duration::from_secs(5))
		.build()
		.expect("valid config")
}

#[tokio::test]
async fn zero_expiration_announces_departure_immediately() -> anyhow::Result<()>
{
	let runtime = runtime(Duration::ZERO);
	let c1 = client(&runtime).await?;
	let observer = client(&runtime).await?;

	let p1 = c1.join_persistent("p1").await?;
	timeout_s(5, observer.when().member_joined("p1".into())).await?;

	drop(p1);
	drop(c1);

	timeout_s(5, observer.when().member_left("p1".into())).await?;
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_member_revives_within_the_expiration_window()
-> anyhow::Result<()> {
	let config = expiring_config();
	let runtime = runtime(config.expiration);
	let c1 = Group::connect(&runtime, config.clone()).await?;
	let observer = Group::connect(&runtime, config.clone()).await?;

	let p1 = c1.join_persistent("p1").await?;
	timeout_s(5, observer.when().member_joined("p1".into())).await?;

	let mut changes = observer.changes().await?;

	// the owning session drops, starting the expiration window
	drop(p1);
	drop(c1);

	// a new client revives the member inside the window
	tokio::time::sleep(Duration::from_secs(3)).await;
	let c1b = Group::connect(&runtime, config).await?;
	let _p1 = c1b.join_persistent("p1").await?;

	// well past the original window: the revived member is still here and no
	// departure was ever announced
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert!(observer.member(&"p1".into()).is_some());
	assert!(changes.try_recv().is_err());

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn detached_persistent_member_expires() -> anyhow::Result<()> {
	let config = expiring_config();
	let runtime = runtime(config.expiration);
	let c1 = Group::connect(&runtime, config.clone()).await?;
	let observer = Group::connect(&runtime, config).await?;

	let p1 = c1.join_persistent("p1").await?;
	timeout_s(5, observer.when().member_joined("p1".into())).await?;

	drop(p1);
	drop(c1);

	// still present while the window is open
	tokio::time::sleep(Duration::from_secs(3)).await;
	assert!(observer.member(&"p1".into()).is_some());

	// the expiration announces the departure
	timeout_s(10, observer.when().member_left("p1".into())).await?;
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn revived_member_resumes_its_task_queue() -> anyhow::Result<()> {
	let config = expiring_config();
	let runtime = runtime(config.expiration);
	let c1 = Group::connect(&runtime, config.clone()).await?;
	let submitter = Group::connect(&runtime, config.clone()).await?;

	let p1 = c1.join_persistent("p1").await?;
	let p1_id: MemberId = "p1".into();
	timeout_s(5, submitter.when().member_joined(p1_id.clone())).await?;

	// the owner dies before the task is delivered anywhere
	drop(p1);
	drop(c1);

	let submit = submitter.submit(&p1_id, "work");
	let revive = async {
		tokio::time::sleep(Duration::from_secs(1)).await;
		let c1b = Group::connect(&runtime, config)
			.await
			.expect("revived client");
		let mut p1 = c1b
			.join_persistent("p1")
			.await
			.expect("revived member");

		// the queued task is replayed to the revived session
		let task = p1.task().await.expect("replayed task");
		assert_eq!(task.decode::<String>().unwrap(), "work");
		task.ack().await.unwrap();

		// keep the session alive until the receipt has been delivered
		(c1b, p1)
	};

	let (submitted, _guard) = tokio::join!(submit, revive);
	submitted?;
	Ok(())
}
