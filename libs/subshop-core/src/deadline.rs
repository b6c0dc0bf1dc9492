use std::future::Future;
use std::time::Duration;

use crate::error::{PaymentError, Result};

/// Runs `fut` under `limit`, mapping both its error and an elapsed deadline into
/// [`PaymentError`].
pub async fn bounded<T, E, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<PaymentError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(PaymentError::Timeout {
            operation,
            timeout: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let res: Result<()> = bounded("find_customer", Duration::from_secs(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>(())
        })
        .await;
        assert!(matches!(
            res,
            Err(PaymentError::Timeout {
                operation: "find_customer",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn storage_error_is_wrapped() {
        let res: Result<()> = bounded("create_purchase", Duration::from_secs(1), async {
            Err(anyhow::anyhow!("connection refused"))
        })
        .await;
        assert!(matches!(res, Err(PaymentError::Storage(_))));
    }
}
