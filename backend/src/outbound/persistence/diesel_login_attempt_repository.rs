//! PostgreSQL-backed `LoginAttemptRepository` implementation using Diesel ORM.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, RunQueryDsl};

use crate::domain::ports::{LoginAttemptRepository, LoginAttemptRepositoryError};
use crate::domain::{LoginAttemptKey, LoginAttemptRecord, ThrottlePolicy};

use super::diesel_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{LoginAttemptRow, NewLoginAttemptRow};
use super::pool::{DbPool, PoolError};
use super::schema::login_attempts;

/// Diesel-backed implementation of the `LoginAttemptRepository` port.
#[derive(Clone)]
pub struct DieselLoginAttemptRepository {
    pool: DbPool,
}

impl DieselLoginAttemptRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run one store access under the pool's query timeout.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, LoginAttemptRepositoryError>> + Send,
    ) -> Result<T, LoginAttemptRepositoryError> {
        self.pool.bounded(operation).await.map_err(map_pool_error)?
    }
}

fn map_pool_error(error: PoolError) -> LoginAttemptRepositoryError {
    map_basic_pool_error(error, |message| LoginAttemptRepositoryError::connection(message))
}

fn map_diesel_error(error: diesel::result::Error) -> LoginAttemptRepositoryError {
    map_basic_diesel_error(
        error,
        LoginAttemptRepositoryError::query,
        LoginAttemptRepositoryError::connection,
    )
}

/// Failure of the counting transaction: a database error, or a stored row the
/// domain cannot represent.
#[derive(Debug)]
enum FailureTxError {
    Diesel(diesel::result::Error),
    Corrupt(LoginAttemptRepositoryError),
}

impl From<diesel::result::Error> for FailureTxError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn row_to_record(row: LoginAttemptRow) -> Result<LoginAttemptRecord, LoginAttemptRepositoryError> {
    let key = LoginAttemptKey::new(row.identity, row.origin).map_err(|err| {
        LoginAttemptRepositoryError::query(format!("corrupted login attempt key: {err}"))
    })?;
    let attempts = u32::try_from(row.attempts).map_err(|_| {
        LoginAttemptRepositoryError::query("negative attempt count in database")
    })?;
    Ok(LoginAttemptRecord {
        key,
        attempts,
        locked_until: row.locked_until,
        last_attempt: row.last_attempt,
    })
}

#[async_trait]
impl LoginAttemptRepository for DieselLoginAttemptRepository {
    async fn find(
        &self,
        key: &LoginAttemptKey,
    ) -> Result<Option<LoginAttemptRecord>, LoginAttemptRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let row: Option<LoginAttemptRow> = login_attempts::table
                .filter(login_attempts::identity.eq(key.identity()))
                .filter(login_attempts::origin.eq(key.origin()))
                .select(LoginAttemptRow::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn register_failure(
        &self,
        key: &LoginAttemptKey,
        now: DateTime<Utc>,
        policy: ThrottlePolicy,
    ) -> Result<LoginAttemptRecord, LoginAttemptRepositoryError> {
        self.bounded(async {
            let placeholder = NewLoginAttemptRow {
                identity: key.identity(),
                origin: key.origin(),
                attempts: 0,
                locked_until: None,
                last_attempt: now,
            };
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;

            let outcome = conn
                .transaction::<_, FailureTxError, _>(|conn| {
                    async move {
                        // Make sure a row exists, then hold it until commit so
                        // concurrent failures for the key queue behind this one.
                        diesel::insert_into(login_attempts::table)
                            .values(&placeholder)
                            .on_conflict((login_attempts::identity, login_attempts::origin))
                            .do_nothing()
                            .execute(conn)
                            .await?;
                        let current: LoginAttemptRow = login_attempts::table
                            .filter(login_attempts::identity.eq(key.identity()))
                            .filter(login_attempts::origin.eq(key.origin()))
                            .select(LoginAttemptRow::as_select())
                            .for_update()
                            .first(conn)
                            .await?;
                        let current = row_to_record(current).map_err(FailureTxError::Corrupt)?;

                        let next =
                            LoginAttemptRecord::register_failure(Some(current), key, now, &policy);
                        let attempts = i32::try_from(next.attempts).map_err(|_| {
                            FailureTxError::Corrupt(LoginAttemptRepositoryError::query(
                                "attempt count out of range",
                            ))
                        })?;
                        diesel::update(
                            login_attempts::table
                                .filter(login_attempts::identity.eq(key.identity()))
                                .filter(login_attempts::origin.eq(key.origin())),
                        )
                        .set((
                            login_attempts::attempts.eq(attempts),
                            login_attempts::locked_until.eq(next.locked_until),
                            login_attempts::last_attempt.eq(next.last_attempt),
                        ))
                        .execute(conn)
                        .await?;
                        Ok(next)
                    }
                    .scope_boxed()
                })
                .await;

            match outcome {
                Ok(record) => Ok(record),
                Err(FailureTxError::Diesel(error)) => Err(map_diesel_error(error)),
                Err(FailureTxError::Corrupt(error)) => Err(error),
            }
        })
        .await
    }

    async fn delete(&self, key: &LoginAttemptKey) -> Result<bool, LoginAttemptRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let removed = diesel::delete(
                login_attempts::table
                    .filter(login_attempts::identity.eq(key.identity()))
                    .filter(login_attempts::origin.eq(key.origin())),
            )
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LoginAttemptRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let removed = diesel::delete(
                login_attempts::table
                    .filter(login_attempts::last_attempt.lt(cutoff))
                    .filter(
                        login_attempts::locked_until
                            .is_null()
                            .or(login_attempts::locked_until.le(now)),
                    ),
            )
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<LoginAttemptRecord>, LoginAttemptRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let rows: Vec<LoginAttemptRow> = login_attempts::table
                .order((login_attempts::last_attempt.desc(), login_attempts::id.desc()))
                .select(LoginAttemptRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(attempts: i32) -> LoginAttemptRow {
        LoginAttemptRow {
            identity: "curator".to_owned(),
            origin: "192.0.2.10".to_owned(),
            attempts,
            locked_until: None,
            last_attempt: Utc::now(),
        }
    }

    #[rstest]
    fn valid_rows_convert() {
        let record = row_to_record(row(3)).expect("valid row");
        assert_eq!(record.key.identity(), "curator");
        assert_eq!(record.attempts, 3);
    }

    #[rstest]
    fn negative_counts_are_rejected() {
        let error = row_to_record(row(-2)).expect_err("corrupt");
        assert!(matches!(error, LoginAttemptRepositoryError::Query { .. }));
    }

    #[rstest]
    fn blank_identity_is_rejected() {
        let mut bad = row(1);
        bad.identity = " ".to_owned();
        assert!(row_to_record(bad).is_err());
    }
}
