//! Restart supervision for long-lived tasks.
//!
//! Connections, group drivers and partition workers are independent
//! tasks; when one dies of an error or a panic its parent restarts it
//! with exponential backoff. A task that keeps dying is given up on:
//! more than [`MAX_RESTARTS`] restarts inside [`RESTART_WINDOW`] stops
//! the supervision loop.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};

pub const MAX_RESTARTS: usize = 10;
pub const RESTART_WINDOW: Duration = Duration::from_secs(60);

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Run `factory`'s future until it completes cleanly, restarting it on
/// error or panic.
///
/// A clean `Ok(())` or an explicit [`Error::Shutdown`] ends
/// supervision; anything else is a crash that earns a restart after
/// backoff.
pub fn supervise<F, Fut>(name: &'static str, mut factory: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: VecDeque<Instant> = VecDeque::new();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            // each attempt gets its own task so a panic is contained
            let attempt = tokio::spawn(factory());
            match attempt.await {
                Ok(Ok(())) => {
                    tracing::debug!("Task {} completed", name);
                    return;
                }
                Ok(Err(Error::Shutdown)) => {
                    tracing::debug!("Task {} shut down", name);
                    return;
                }
                Ok(Err(err)) => {
                    tracing::error!("ERROR: Task {} failed: {:?}", name, err);
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!("ERROR: Task {} panicked", name);
                }
                Err(_) => {
                    // cancelled from outside
                    return;
                }
            }

            let now = Instant::now();
            restarts.push_back(now);
            while let Some(first) = restarts.front() {
                if now.duration_since(*first) > RESTART_WINDOW {
                    restarts.pop_front();
                } else {
                    break;
                }
            }
            if restarts.len() > MAX_RESTARTS {
                tracing::error!(
                    "ERROR: Task {} restarted {} times in {:?}, giving up",
                    name,
                    restarts.len(),
                    RESTART_WINDOW
                );
                return;
            }

            tracing::warn!("Restarting task {} in {:?}", name, backoff);
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
        }
    })
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn restarts_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();

        let handle = supervise("flaky", move || {
            let attempts = counted.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::ConnectionClosed)
                } else {
                    Ok(())
                }
            }
        });

        handle.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_not_restarted() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();

        let handle = supervise("stopping", move || {
            let attempts = counted.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::Shutdown)
            }
        });

        handle.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_crash_loop_is_given_up_on() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();

        let handle = supervise("doomed", move || {
            let attempts = counted.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::ConnectionClosed)
            }
        });

        handle.await.unwrap();
        // the first run plus the restart budget
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RESTARTS + 1);
    }
}
