//! Task racing.

use std::future::Future;

use anyhow::{Result, anyhow, bail};
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Run `tasks` concurrently and return the outcome of the first to finish.
///
/// The remaining tasks are aborted and joined before returning. Their
/// failures are logged; only the winner's result is propagated.
pub async fn wait_for_tasks<T, F, I>(tasks: I) -> Result<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task);
    }

    let Some(first) = set.join_next().await else {
        bail!("no tasks to wait for");
    };

    set.abort_all();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Err(e)) => warn!(error = %e, "Cancelled task had already failed"),
            Err(e) if e.is_panic() => error!(error = %e, "Cancelled task panicked"),
            _ => {}
        }
    }

    let outcome = first.map_err(|e| anyhow!("task did not complete: {e}"))?;
    if let Err(e) = &outcome {
        error!(error = %e, "Task failed");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    type Task = std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>;

    fn after(ms: u64, value: u32) -> Task {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        })
    }

    #[tokio::test]
    async fn test_first_to_finish_wins() {
        let value = wait_for_tasks(vec![after(200, 1), after(5, 2), after(100, 3)])
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_losers_are_cancelled() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow: Task = Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        });

        wait_for_tasks(vec![slow, after(1, 2)]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_winner_error_is_propagated() {
        let failing: Task = Box::pin(async { Err(anyhow!("link lost")) });
        let err = wait_for_tasks(vec![failing, after(200, 1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("link lost"));
    }

    #[tokio::test]
    async fn test_empty_set_is_an_error() {
        let tasks: Vec<Task> = Vec::new();
        assert!(wait_for_tasks(tasks).await.is_err());
    }
}
