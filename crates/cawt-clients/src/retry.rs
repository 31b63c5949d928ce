use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Run `op` up to `attempts` times with exponential backoff and jitter.
///
/// Backoff doubles from `base` per attempt and each sleep is jittered by up
/// to +50% so a burst of retries from independent jobs does not re-align.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = base;
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt < attempts {
                    let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
                    tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> =
            retry_with_backoff(3, Duration::from_millis(1), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let result: Result<(), String> =
            retry_with_backoff(2, Duration::from_millis(1), |attempt| async move {
                Err(format!("attempt {attempt}"))
            })
            .await;
        assert_eq!(result.unwrap_err(), "attempt 2");
    }
}
