//! The per-job core of the timeline worker.
//!
//! A run decodes one job payload, lists the threads for its keyword, fetches
//! each distinct author once (at most `concurrency` requests in flight), and
//! then publishes one [`JobResult`] per enriched thread in listing order.
//! Results are accumulated in a value local to the run, so nothing leaks from
//! one job into the next.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use threadline_common::ThreadlineError;
use threadline_queue::QueuePublisher;
use threadline_social::{AccountInfo, SocialData};

use crate::{HashtagJob, JobReport, JobResult, ThreadFailure};

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Where enriched results go.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, result: &JobResult) -> threadline_common::Result<()>;
}

#[async_trait]
impl ResultSink for QueuePublisher {
    async fn publish(&self, result: &JobResult) -> threadline_common::Result<()> {
        self.publish_json(result).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed job payload: {0}")]
    Decode(String),
    #[error("listing threads for {keyword:?} failed: {source}")]
    Threads {
        keyword: String,
        #[source]
        source: ThreadlineError,
    },
    #[error("publishing result for thread {thread_id} failed: {source}")]
    Publish {
        thread_id: String,
        #[source]
        source: ThreadlineError,
    },
    #[error("job for {keyword:?} exceeded {timeout:?}")]
    Timeout { keyword: String, timeout: Duration },
}

/// Parse a job payload. The keyword must be present and not blank.
pub fn decode_job(payload: &[u8]) -> Result<HashtagJob, PipelineError> {
    let job: HashtagJob =
        serde_json::from_slice(payload).map_err(|e| PipelineError::Decode(e.to_string()))?;
    if job.keyword.trim().is_empty() {
        return Err(PipelineError::Decode("keyword is blank".into()));
    }
    Ok(job)
}

pub struct JobPipeline<S: ?Sized, K: ?Sized> {
    social: Arc<S>,
    sink: Arc<K>,
    concurrency: usize,
    job_timeout: Option<Duration>,
}

impl<S, K> JobPipeline<S, K>
where
    S: SocialData + ?Sized,
    K: ResultSink + ?Sized,
{
    pub fn new(social: Arc<S>, sink: Arc<K>) -> Self {
        Self {
            social,
            sink,
            concurrency: DEFAULT_CONCURRENCY,
            job_timeout: None,
        }
    }

    /// Cap on in-flight account fetches; clamped to at least 1.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub async fn run(&self, payload: &[u8]) -> Result<JobReport, PipelineError> {
        let job = decode_job(payload)?;
        let started = std::time::Instant::now();
        tracing::info!(keyword = %job.keyword, id = ?job.id, "pipeline.job.start");

        let report = match self.job_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.process(&job))
                .await
                .map_err(|_| PipelineError::Timeout {
                    keyword: job.keyword.clone(),
                    timeout,
                })??,
            None => self.process(&job).await?,
        };

        tracing::info!(
            keyword = %report.keyword,
            threads = report.threads,
            published = report.published,
            failed = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline.job.done"
        );
        Ok(report)
    }

    async fn process(&self, job: &HashtagJob) -> Result<JobReport, PipelineError> {
        let page = self
            .social
            .list_threads(&job.keyword)
            .await
            .map_err(|source| PipelineError::Threads {
                keyword: job.keyword.clone(),
                source,
            })?;
        let threads = page.data;

        let user_ids: Vec<String> = {
            let mut seen = HashSet::new();
            threads
                .iter()
                .filter(|t| seen.insert(t.user_id.as_str()))
                .map(|t| t.user_id.clone())
                .collect()
        };
        let accounts = self.fetch_accounts(user_ids).await;

        let mut report = JobReport {
            keyword: job.keyword.clone(),
            threads: threads.len(),
            ..JobReport::default()
        };
        let mut results = Vec::with_capacity(threads.len());
        for thread in threads {
            match accounts.get(&thread.user_id) {
                Some(Ok(account)) if account.id == thread.user_id => results.push(JobResult {
                    account: account.clone(),
                    thread,
                }),
                Some(Ok(account)) => report.failures.push(ThreadFailure {
                    reason: format!("account lookup returned id {}", account.id),
                    thread_id: thread.id,
                    user_id: thread.user_id,
                }),
                Some(Err(reason)) => report.failures.push(ThreadFailure {
                    reason: reason.clone(),
                    thread_id: thread.id,
                    user_id: thread.user_id,
                }),
                None => report.failures.push(ThreadFailure {
                    reason: "account was not fetched".into(),
                    thread_id: thread.id,
                    user_id: thread.user_id,
                }),
            }
        }

        for failure in &report.failures {
            tracing::warn!(
                keyword = %job.keyword,
                thread_id = %failure.thread_id,
                user_id = %failure.user_id,
                reason = %failure.reason,
                "pipeline.thread.failed"
            );
        }

        for result in &results {
            self.sink
                .publish(result)
                .await
                .map_err(|source| PipelineError::Publish {
                    thread_id: result.thread.id.clone(),
                    source,
                })?;
            report.published += 1;
        }

        Ok(report)
    }

    /// Fetch each user's account; failures are kept as their message.
    async fn fetch_accounts(
        &self,
        user_ids: Vec<String>,
    ) -> HashMap<String, Result<AccountInfo, String>> {
        stream::iter(user_ids)
            .map(|id| async move {
                let res = self
                    .social
                    .get_account_info(&id)
                    .await
                    .map_err(|e| e.to_string());
                (id, res)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}
