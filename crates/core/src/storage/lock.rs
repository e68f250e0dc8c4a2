use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the guard pins the connection that took
// the lock until it is released.
const LOCK_NAMESPACE: i64 = 0x5749_5348_4C53; // "WISHLS"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    PriceCheck,
    ConvertPrices,
}

impl Job {
    pub fn as_str(self) -> &'static str {
        match self {
            Job::PriceCheck => "price_check",
            Job::ConvertPrices => "convert_prices",
        }
    }
}

fn lock_key_for_job(job: Job) -> i64 {
    let discriminant = match job {
        Job::PriceCheck => 1,
        Job::ConvertPrices => 2,
    };
    LOCK_NAMESPACE ^ discriminant
}

#[derive(Debug)]
pub struct JobLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

/// Returns `None` when another session already holds the lock for `job`.
pub async fn try_acquire_job_lock(pool: &sqlx::PgPool, job: Job) -> anyhow::Result<Option<JobLock>> {
    let key = lock_key_for_job(job);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(JobLock { conn, key }))
}

impl JobLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_get_distinct_keys() {
        assert_ne!(
            lock_key_for_job(Job::PriceCheck),
            lock_key_for_job(Job::ConvertPrices)
        );
        assert_eq!(Job::PriceCheck.as_str(), "price_check");
    }
}
