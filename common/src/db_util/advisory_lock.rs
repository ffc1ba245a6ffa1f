use super::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool};
use log::warn;

#[derive(QueryableByName)]
struct LockResult {
    #[diesel(sql_type = Bool)]
    acquired: bool,
}

/// A Postgres session-level advisory lock. Works across hosts, as long as
/// every cron shares the database. The lock belongs to a dedicated connection,
/// so it goes away with the session if the process dies.
pub struct AdvisoryLock {
    database_url: String,
    key: i64,
}

/// Holds the connection that owns an [`AdvisoryLock`] until dropped.
pub struct AdvisoryLockGuard {
    conn: PgConnection,
    key: i64,
}

impl AdvisoryLock {
    pub fn new(database_url: &str, key: i64) -> Self {
        AdvisoryLock {
            database_url: database_url.to_string(),
            key,
        }
    }
}

impl CronLock for AdvisoryLock {
    type Guard = AdvisoryLockGuard;

    fn try_acquire(&self) -> Result<Option<AdvisoryLockGuard>> {
        let mut conn = get_database_connection(&self.database_url)?;
        let result = sql_query("SELECT pg_try_advisory_lock($1) AS acquired;")
            .bind::<BigInt, _>(self.key)
            .get_result::<LockResult>(&mut conn)
            .context("Failed to query the advisory lock")?;
        if result.acquired {
            Ok(Some(AdvisoryLockGuard {
                conn,
                key: self.key,
            }))
        } else {
            Ok(None)
        }
    }

    fn holder(&self) -> Option<String> {
        Some(format!("another session on advisory key {}", self.key))
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        let released = sql_query("SELECT pg_advisory_unlock($1) AS acquired;")
            .bind::<BigInt, _>(self.key)
            .get_result::<LockResult>(&mut self.conn);
        match released {
            Ok(LockResult { acquired: true }) => {}
            Ok(_) => warn!("Advisory lock {} was not held at release", self.key),
            Err(err) => warn!("Failed to release advisory lock {}: {err}", self.key),
        }
    }
}
