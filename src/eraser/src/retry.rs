use std::future::Future;
use std::time::Duration;

use rand::Rng;

use common::StoreError;
use common::config::RetryConfig;

/// Run `op`, retrying [`StoreError::Transient`] failures with bounded
/// exponential backoff. Quota rejections and other store errors pass
/// through on the first attempt; they have their own recovery paths.
pub async fn with_backoff<T, F, Fut>(policy: &RetryConfig, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(StoreError::Transient(reason)) if attempt < policy.max_retries => {
                let delay = backoff_delay(policy.base_delay, attempt);
                log::warn!(
                    "transient store failure ({reason}), retry {} of {} in {delay:?}",
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// `base * 2^attempt` plus up to one `base` of jitter, so concurrent workers
/// hitting the same brownout do not retry in lockstep.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
    exponential.saturating_add(Duration::from_millis(jitter_ms))
}
