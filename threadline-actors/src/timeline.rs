//! The timeline worker: a queue consumer feeding a single pipeline actor.
//!
//! [`JobConsumer`] takes one delivery at a time (prefetch 1), hands its
//! payload to [`TimelineActor`], waits for the outcome and settles the
//! delivery from it. Jobs therefore never overlap. Losing the broker ends a
//! consumer run with an error so the supervisor can reconnect.
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use threadline_queue::{Disposition, QueueConnection};
use threadline_social::SocialData;
use tokio::sync::{oneshot, Mutex};

use crate::actor::{Actor, Addr, Context};
use crate::pipeline::{JobPipeline, PipelineError, ResultSink};
use crate::{JobMsg, JobReport, JobResult};

pub const CONSUMER_TAG: &str = "threadline-timeline";

pub struct TimelineActor<S: ?Sized, K: ?Sized> {
    pipeline: JobPipeline<S, K>,
    jobs: u64,
}

impl<S, K> TimelineActor<S, K>
where
    S: SocialData + ?Sized,
    K: ResultSink + ?Sized,
{
    pub fn new(pipeline: JobPipeline<S, K>) -> Self {
        Self { pipeline, jobs: 0 }
    }
}

#[async_trait]
impl<S, K> Actor for TimelineActor<S, K>
where
    S: SocialData + ?Sized + 'static,
    K: ResultSink + ?Sized + 'static,
{
    type Msg = JobMsg;

    async fn handle(&mut self, msg: JobMsg, _ctx: &mut Context<Self>) -> Result<()> {
        self.jobs += 1;
        let outcome = self.pipeline.run(&msg.payload).await;
        if let Err(e) = &outcome {
            tracing::warn!(job = self.jobs, error = %e, "timeline.job.failed");
        }
        if msg.reply.send(outcome).is_err() {
            tracing::debug!(job = self.jobs, "timeline.reply.dropped");
        }
        Ok(())
    }
}

/// How a job's delivery is settled given the pipeline outcome.
///
/// A publish failure means the result queue was unavailable, so the job is
/// always handed back. A retryable upstream failure (transport, 429/5xx) or a
/// timeout gets one more attempt on first delivery; a redelivered job that
/// fails again is dropped. Malformed payloads are dropped immediately.
pub fn disposition(outcome: &Result<JobReport, PipelineError>, redelivered: bool) -> Disposition {
    match outcome {
        Ok(_) => Disposition::Ack,
        Err(PipelineError::Publish { .. }) => Disposition::Requeue,
        Err(PipelineError::Threads { source, .. }) if source.is_retryable() && !redelivered => {
            Disposition::Requeue
        }
        Err(PipelineError::Timeout { .. }) if !redelivered => Disposition::Requeue,
        Err(PipelineError::Decode(_))
        | Err(PipelineError::Threads { .. })
        | Err(PipelineError::Timeout { .. }) => Disposition::Reject,
    }
}

/// Send one payload to the actor and wait for its outcome.
pub async fn forward<A>(addr: &Addr<A>, payload: Vec<u8>) -> Result<Result<JobReport, PipelineError>>
where
    A: Actor<Msg = JobMsg>,
{
    let (reply, rx) = oneshot::channel();
    addr.send(JobMsg { payload, reply })
        .await
        .map_err(|_| anyhow!("timeline actor mailbox closed"))?;
    rx.await.context("timeline actor dropped the job")
}

pub struct JobConsumer<A: Actor<Msg = JobMsg>> {
    timeline: Addr<A>,
    amqp_uri: String,
    queue: String,
}

impl<A: Actor<Msg = JobMsg>> Clone for JobConsumer<A> {
    fn clone(&self) -> Self {
        Self {
            timeline: self.timeline.clone(),
            amqp_uri: self.amqp_uri.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<A: Actor<Msg = JobMsg>> JobConsumer<A> {
    pub fn new(timeline: Addr<A>, amqp_uri: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            timeline,
            amqp_uri: amqp_uri.into(),
            queue: queue.into(),
        }
    }

    /// One connection's worth of consuming. Returns `Err` when the broker
    /// goes away; `Ok` only once the actor is gone.
    pub fn run_once(self) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let conn = QueueConnection::connect(&self.amqp_uri).await?;
            conn.declare(&self.queue).await?;
            let mut deliveries = conn.consumer(&self.queue, CONSUMER_TAG, 1).await?;
            tracing::info!(queue = %self.queue, "timeline.consumer.ready");

            while let Some(delivery) = deliveries.next().await {
                let delivery = delivery?;
                let outcome = match forward(&self.timeline, delivery.payload.clone()).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::info!(error = %e, "timeline.consumer.stopping");
                        delivery.settle(Disposition::Requeue).await?;
                        return Ok(());
                    }
                };
                let disposition = disposition(&outcome, delivery.redelivered);
                tracing::debug!(
                    delivery_tag = delivery.delivery_tag,
                    redelivered = delivery.redelivered,
                    ?disposition,
                    "timeline.delivery.settle"
                );
                delivery.settle(disposition).await?;
            }

            Err(anyhow!("job queue {} stopped delivering", self.queue))
        }
    }
}

/// Result sink backed by the result queue. The connection is opened on
/// first use and dropped after a failure so the next job reconnects.
pub struct QueueSink {
    amqp_uri: String,
    queue: String,
    conn: Mutex<Option<QueueConnection>>,
}

impl QueueSink {
    pub fn new(amqp_uri: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            amqp_uri: amqp_uri.into(),
            queue: queue.into(),
            conn: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ResultSink for QueueSink {
    async fn publish(&self, result: &JobResult) -> threadline_common::Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = match guard.take() {
            Some(conn) => conn,
            None => {
                let conn = QueueConnection::connect(&self.amqp_uri).await?;
                conn.declare(&self.queue).await?;
                conn
            }
        };
        let res = conn.publisher(&self.queue).publish_json(result).await;
        if res.is_ok() {
            *guard = Some(conn);
        } else {
            tracing::warn!(queue = %self.queue, "queue.reconnect");
        }
        res
    }
}

pub type DynSocial = dyn SocialData + Send + Sync + 'static;
pub type DynSink = dyn ResultSink + Send + Sync + 'static;

/// Shared pipeline type used by the worker binary.
pub type Timeline = TimelineActor<DynSocial, DynSink>;

pub fn timeline(
    social: Arc<DynSocial>,
    sink: Arc<DynSink>,
    concurrency: usize,
    job_timeout: Option<std::time::Duration>,
) -> Timeline {
    TimelineActor::new(
        JobPipeline::new(social, sink)
            .with_concurrency(concurrency)
            .with_job_timeout(job_timeout),
    )
}
