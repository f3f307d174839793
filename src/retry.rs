/// Retries transient bar-store reads. Evaluator errors are never routed
/// through here; they abort the task on the first failure.
macro_rules! retry_data_fetch {
    ($context:expr, $operation:expr) => {{
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY_MS: u64 = 500;

        let context_value: String = $context.into();
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= MAX_ATTEMPTS => break Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {}/{} at {} failed: {}. Retrying in {}ms.",
                        attempt,
                        MAX_ATTEMPTS,
                        context_value,
                        err,
                        RETRY_DELAY_MS
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_data_fetch;

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use std::cell::Cell;

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let attempts = Cell::new(0u32);
        let result: Result<u32> = retry_data_fetch!("loading bars for 0838", async {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(anyhow!("connection reset"))
            } else {
                Ok(attempts.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_final_attempt() {
        let attempts = Cell::new(0u32);
        let result: Result<u32> = retry_data_fetch!("loading bars for 0838", async {
            attempts.set(attempts.get() + 1);
            Err::<u32, _>(anyhow!("database unreachable"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }
}
