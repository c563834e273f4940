use crate::actor::{spawn_actor_with_shutdown, Actor, Addr};
use crate::supervise::supervise;
use anyhow::Result;
use std::future::Future;
use tokio::{sync::broadcast, task::JoinSet};

/// Wires a worker process: spawned actors and supervised units share one
/// shutdown signal and are awaited together on exit.
pub struct Builder {
    tasks: JoinSet<Result<()>>,
    shutdown: broadcast::Sender<()>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(8);
        Self {
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Spawn an actor whose task ends with the rest of the process.
    pub fn spawn<A: Actor>(&mut self, name: &str, mailbox: usize, actor: A) -> Addr<A> {
        let handle = spawn_actor_with_shutdown(actor, mailbox, Some(self.shutdown.subscribe()));
        let task = handle.task;
        self.tasks
            .spawn(async move { task.await.map_err(anyhow::Error::from).and_then(|r| r) });
        tracing::debug!(name, mailbox, "builder.spawned");
        handle.addr
    }

    /// Run `run_once` under [`supervise`] until shutdown.
    pub fn supervise<F, Fut>(&mut self, name: &str, run_once: F) -> &mut Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let rx = self.shutdown.subscribe();
        self.tasks.spawn(supervise(name.to_string(), run_once, rx));
        self
    }

    /// Wait for `signal` or for any task to exit, then broadcast shutdown
    /// and join everything. The first task error wins.
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let early = tokio::select! {
            _ = signal => None,
            Some(res) = self.tasks.join_next() => Some(res),
        };
        if early.is_some() {
            tracing::warn!(remaining = self.tasks.len(), "builder.task_exited");
        }

        let _ = self.shutdown.send(());
        let mut outcome = match early {
            Some(res) => res.map_err(anyhow::Error::from).and_then(|r| r),
            None => Ok(()),
        };
        while let Some(res) = self.tasks.join_next().await {
            let res = res.map_err(anyhow::Error::from).and_then(|r| r);
            if outcome.is_ok() {
                outcome = res;
            }
        }
        outcome
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "builder.signal_failed");
            }
            tracing::info!("builder.ctrl_c");
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    struct Tally(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Actor for Tally {
        type Msg = usize;

        async fn handle(&mut self, msg: usize, _ctx: &mut Context<Self>) -> Result<()> {
            anyhow::ensure!(msg != 0, "empty tally");
            self.0.fetch_add(msg, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn actors_and_units_stop_together_on_signal() {
        let total = Arc::new(AtomicUsize::new(0));
        let mut builder = Builder::new();
        let addr = builder.spawn("tally", 4, Tally(total.clone()));

        addr.send(2).await.unwrap();
        addr.send(3).await.unwrap();

        let units = Arc::new(AtomicUsize::new(0));
        let started = units.clone();
        builder.supervise("idle", move || {
            started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<()>>()
        });

        let (stop, stopped) = oneshot::channel::<()>();
        let run = tokio::spawn(builder.run_until(async {
            let _ = stopped.await;
        }));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stop.send(()).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(total.load(Ordering::SeqCst), 5);
        assert_eq!(units.load(Ordering::SeqCst), 1);
        assert!(addr.is_closed());
    }

    #[tokio::test]
    async fn a_failed_actor_ends_the_run_with_its_error() {
        let mut builder = Builder::new();
        let addr = builder.spawn("tally", 4, Tally(Arc::new(AtomicUsize::new(0))));
        builder.supervise("idle", || std::future::pending::<Result<()>>());

        addr.send(0).await.unwrap();
        let err = builder
            .run_until(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty tally"));
    }
}
