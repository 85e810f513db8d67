//! Integration tests for `DieselLoginAttemptRepository` against embedded
//! PostgreSQL.
//!
//! Covers the per-key serialisation of failure counting, the lock reset rule
//! and the retention predicate used by pruning.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use inventory::domain::ports::LoginAttemptRepository;
use inventory::domain::{LoginAttemptKey, ThrottlePolicy};
use inventory::outbound::persistence::{DbPool, DieselLoginAttemptRepository, PoolConfig};
use pg_embedded_setup_unpriv::TestCluster;
use postgres::Client;
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;

#[path = "support/pg_embed.rs"]
mod pg_embed;

mod support;

use pg_embed::test_cluster;
use support::{
    connect, create_database, format_postgres_error, handle_cluster_setup_failure, migrate_schema,
};

const TEST_DB: &str = "diesel_login_attempt_repository_test";

struct TestContext {
    runtime: Runtime,
    repository: DieselLoginAttemptRepository,
    client: Client,
    _cluster: TestCluster,
}

fn setup_context() -> Result<TestContext, String> {
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let cluster = test_cluster()?;
    let database_url = create_database(&cluster, TEST_DB)?;
    migrate_schema(&database_url)?;

    let config = PoolConfig::new(database_url.as_str())
        .with_max_size(4)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(async { DbPool::new(config).await })
        .map_err(|err| err.to_string())?;
    let client = connect(&database_url)?;

    Ok(TestContext {
        runtime,
        repository: DieselLoginAttemptRepository::new(pool),
        client,
        _cluster: cluster,
    })
}

#[fixture]
fn repo_context() -> Option<TestContext> {
    match setup_context() {
        Ok(ctx) => Some(ctx),
        Err(reason) => handle_cluster_setup_failure(reason),
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn key(identity: &str) -> LoginAttemptKey {
    LoginAttemptKey::new(identity, "198.51.100.7").expect("valid key")
}

fn seed(
    client: &mut Client,
    identity: &str,
    locked_until: Option<DateTime<Utc>>,
    last_attempt: DateTime<Utc>,
) {
    client
        .execute(
            concat!(
                "INSERT INTO login_attempts (identity, origin, attempts, locked_until, last_attempt) ",
                "VALUES ($1, '198.51.100.7', 2, $2, $3)"
            ),
            &[&identity, &locked_until, &last_attempt],
        )
        .map_err(|err| format_postgres_error(&err))
        .expect("seed row");
}

#[rstest]
fn concurrent_failures_are_serialised_per_key(repo_context: Option<TestContext>) {
    let Some(mut context) = repo_context else {
        eprintln!("SKIP-TEST-CLUSTER: concurrent_failures_are_serialised_per_key skipped");
        return;
    };
    let now = start();
    let curator = key("curator");

    let (locked_outcomes, stored) = context.runtime.block_on(async {
        let mut failures = Vec::new();
        for _ in 0..8 {
            let repository = context.repository.clone();
            let curator = curator.clone();
            failures.push(tokio::spawn(async move {
                repository
                    .register_failure(&curator, now, ThrottlePolicy::default())
                    .await
            }));
        }
        let mut locked = 0;
        for failure in failures {
            let record = failure.await.expect("task completes").expect("recorded");
            if record.locked_until.is_some() {
                locked += 1;
            }
        }
        let stored = context.repository.find(&curator).await.expect("find");
        (locked, stored)
    });

    let stored = stored.expect("counter stored");
    assert_eq!(stored.attempts, 8);
    assert_eq!(stored.locked_until, Some(now + TimeDelta::minutes(15)));
    assert_eq!(stored.last_attempt, now);
    assert_eq!(locked_outcomes, 4);
    let rows: i64 = context
        .client
        .query_one("SELECT count(*) FROM login_attempts", &[])
        .expect("count query")
        .get(0);
    assert_eq!(rows, 1);
}

#[rstest]
fn an_elapsed_lock_restarts_the_count(repo_context: Option<TestContext>) {
    let Some(context) = repo_context else {
        eprintln!("SKIP-TEST-CLUSTER: an_elapsed_lock_restarts_the_count skipped");
        return;
    };
    let repository = context.repository.clone();
    let curator = key("curator");
    let policy = ThrottlePolicy::default();

    let (fifth, after_expiry, cleared, cleared_again) = context.runtime.block_on(async {
        let mut fifth = None;
        for _ in 0..5 {
            fifth = Some(
                repository
                    .register_failure(&curator, start(), policy)
                    .await
                    .expect("recorded"),
            );
        }
        let after_expiry = repository
            .register_failure(&curator, start() + TimeDelta::minutes(16), policy)
            .await
            .expect("recorded");
        let cleared = repository.delete(&curator).await.expect("delete");
        let cleared_again = repository.delete(&curator).await.expect("delete");
        (fifth, after_expiry, cleared, cleared_again)
    });

    let fifth = fifth.expect("five failures recorded");
    assert_eq!(fifth.attempts, 5);
    assert!(fifth.is_locked(start()));
    assert_eq!(after_expiry.attempts, 1);
    assert_eq!(after_expiry.locked_until, None);
    assert!(cleared);
    assert!(!cleared_again);
}

#[rstest]
fn delete_stale_spares_locked_and_recent_rows(repo_context: Option<TestContext>) {
    let Some(mut context) = repo_context else {
        eprintln!("SKIP-TEST-CLUSTER: delete_stale_spares_locked_and_recent_rows skipped");
        return;
    };
    let now = start();
    let cutoff = now - TimeDelta::days(30);
    seed(&mut context.client, "stale", None, now - TimeDelta::days(31));
    seed(
        &mut context.client,
        "locked",
        Some(now + TimeDelta::minutes(5)),
        now - TimeDelta::days(40),
    );
    seed(
        &mut context.client,
        "lapsed",
        Some(now - TimeDelta::days(39)),
        now - TimeDelta::days(40),
    );
    seed(&mut context.client, "boundary", None, cutoff);
    seed(&mut context.client, "recent", None, now - TimeDelta::days(1));
    let repository = context.repository.clone();

    let (removed, removed_again, remaining) = context.runtime.block_on(async {
        let removed = repository.delete_stale(cutoff, now).await.expect("pruned");
        let removed_again = repository.delete_stale(cutoff, now).await.expect("pruned");
        let remaining = repository.list_all().await.expect("listed");
        (removed, removed_again, remaining)
    });

    assert_eq!(removed, 2);
    assert_eq!(removed_again, 0);
    let identities: Vec<&str> = remaining
        .iter()
        .map(|record| record.key.identity())
        .collect();
    assert_eq!(identities, vec!["recent", "boundary", "locked"]);
}
