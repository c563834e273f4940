use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run a fallible unit repeatedly until shutdown, with exponential backoff.
///
/// `Ok(())` from the unit is a clean stop. Each `Err` is logged and the unit
/// is restarted after a delay that starts at 100 ms and doubles up to 30 s.
/// A run that stayed up for at least [`MAX_BACKOFF`] counts as healthy and
/// starts the delay over.
pub async fn supervise<F, Fut>(
    name: String,
    mut run_once: F,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut restarts: u64 = 0;
    loop {
        let started = Instant::now();
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            res = run_once() => {
                match res {
                    Ok(()) => {
                        tracing::info!(unit = %name, restarts, "supervise.stopped");
                        return Ok(());
                    }
                    Err(e) => {
                        restarts += 1;
                        backoff = after_run(backoff, started.elapsed());
                        tracing::warn!(
                            unit = %name,
                            error = ?e,
                            restarts,
                            backoff_ms = backoff.as_millis() as u64,
                            "supervise.restarting"
                        );
                        tokio::select! {
                            _ = shutdown.recv() => return Ok(()),
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = next_backoff(backoff);
                    }
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn after_run(current: Duration, ran_for: Duration) -> Duration {
    if ran_for >= MAX_BACKOFF {
        INITIAL_BACKOFF
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut d = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(d);
            d = next_backoff(d);
        }
        assert_eq!(seen[0], Duration::from_millis(100));
        assert_eq!(seen[1], Duration::from_millis(200));
        assert_eq!(seen[3], Duration::from_millis(800));
        assert_eq!(*seen.last().unwrap(), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn restarts_until_the_unit_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let (_tx, rx) = broadcast::channel(1);

        supervise(
            "flaky".into(),
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::ensure!(n >= 2, "attempt {n} failed");
                    Ok(())
                }
            },
            rx,
        )
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn a_long_run_resets_the_delay() {
        assert_eq!(after_run(MAX_BACKOFF, Duration::from_secs(45)), INITIAL_BACKOFF);
        assert_eq!(after_run(MAX_BACKOFF, Duration::from_secs(2)), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_quickly_after_a_healthy_run() {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = starts.clone();
        let (_tx, rx) = broadcast::channel(1);

        supervise(
            "broker".into(),
            move || {
                let log = log.clone();
                async move {
                    let n = {
                        let mut log = log.lock().unwrap();
                        log.push(Instant::now());
                        log.len()
                    };
                    match n {
                        1..=3 => anyhow::bail!("connection refused"),
                        4 => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            anyhow::bail!("connection reset")
                        }
                        _ => Ok(()),
                    }
                }
            },
            rx,
        )
        .await
        .unwrap();

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 5);
        let before_healthy_run = starts[3] - starts[2];
        let after_healthy_run = starts[4] - starts[3] - Duration::from_secs(60);
        assert!(before_healthy_run >= Duration::from_millis(400));
        assert!(after_healthy_run >= INITIAL_BACKOFF);
        assert!(after_healthy_run < Duration::from_millis(200), "{after_healthy_run:?}");
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_running_unit() {
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(supervise(
            "forever".into(),
            || std::future::pending::<Result<()>>(),
            rx,
        ));
        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
