use crate::errors::{AppError, AppResult};
use rand::Rng;
use std::time::Duration;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_FAILURE_RATE: f64 = 0.1;

/// Simulated network call: suspends cooperatively for the delay, then fails
/// with the given probability. Callers must tolerate an engine reload being
/// triggered while they are parked at the await point.
pub async fn simulate_api_call(delay: Duration, failure_rate: f64) -> AppResult<()> {
    tokio::time::sleep(delay).await;
    if rand::rng().random::<f64>() < failure_rate {
        return Err(AppError::Internal(
            "simulated network failure".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::simulate_api_call;
    use crate::errors::AppError;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_failure_rate_always_succeeds() {
        for _ in 0..20 {
            simulate_api_call(Duration::ZERO, 0.0)
                .await
                .expect("no failure at rate 0");
        }
    }

    #[tokio::test]
    async fn certain_failure_rate_always_fails() {
        let err = simulate_api_call(Duration::ZERO, 1.0)
            .await
            .expect_err("failure at rate 1");
        assert!(matches!(err, AppError::Internal(_)));
    }
}
