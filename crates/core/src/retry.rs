use std::future::Future;
use std::time::Duration;

const MAX_BACKOFF_SHIFT: u32 = 5;

/// Runs `op` up to `attempts` times, sleeping 1s, 2s, 4s... between failures.
pub async fn with_backoff<T, F, Fut>(what: &'static str, attempts: u32, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                let backoff = Duration::from_secs(1 << (attempt - 1).min(MAX_BACKOFF_SHIFT));
                tracing::warn!(what, attempt, ?backoff, error = %err, "request failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = with_backoff("test", 3, move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                anyhow::bail!("attempt {n} failed");
            }
            Ok(n)
        })
        .await
        .unwrap();

        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let res: anyhow::Result<()> = with_backoff("test", 2, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("always fails")
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
