//! One-shot hashtag publisher: every stored hashtag becomes one job message.
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use threadline_queue::QueuePublisher;
use threadline_store::{Hashtag, HashtagRepository};

use crate::HashtagJob;

#[async_trait]
pub trait HashtagSource: Send + Sync {
    async fn all_hashtags(&self) -> threadline_common::Result<Vec<Hashtag>>;
}

#[async_trait]
impl HashtagSource for HashtagRepository {
    async fn all_hashtags(&self) -> threadline_common::Result<Vec<Hashtag>> {
        self.get_all().await
    }
}

#[async_trait]
pub trait JobSink: Send + Sync {
    async fn publish_job(&self, job: &HashtagJob) -> threadline_common::Result<()>;
}

#[async_trait]
impl JobSink for QueuePublisher {
    async fn publish_job(&self, job: &HashtagJob) -> threadline_common::Result<()> {
        self.publish_json(job).await
    }
}

impl From<Hashtag> for HashtagJob {
    fn from(tag: Hashtag) -> Self {
        Self {
            id: tag.id_string(),
            keyword: tag.keyword,
        }
    }
}

/// Publish one job per stored hashtag, in read order, waiting for each
/// confirm before sending the next. Returns how many were published.
pub async fn publish_hashtags(source: &dyn HashtagSource, sink: &dyn JobSink) -> Result<usize> {
    let hashtags = source
        .all_hashtags()
        .await
        .context("failed to load hashtags")?;
    let total = hashtags.len();

    for (i, tag) in hashtags.into_iter().enumerate() {
        let job = HashtagJob::from(tag);
        sink.publish_job(&job)
            .await
            .with_context(|| format!("failed to publish job for {:?}", job.keyword))?;
        tracing::debug!(keyword = %job.keyword, index = i, total, "publisher.job.sent");
    }

    tracing::info!(published = total, "publisher.done");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use threadline_common::ThreadlineError;

    struct Stored(Vec<serde_json::Value>);

    #[async_trait]
    impl HashtagSource for Stored {
        async fn all_hashtags(&self) -> threadline_common::Result<Vec<Hashtag>> {
            self.0
                .iter()
                .map(|v| {
                    serde_json::from_value(v.clone())
                        .map_err(|e| ThreadlineError::Decode(e.to_string()))
                })
                .collect()
        }
    }

    struct Unreachable;

    #[async_trait]
    impl HashtagSource for Unreachable {
        async fn all_hashtags(&self) -> threadline_common::Result<Vec<Hashtag>> {
            Err(ThreadlineError::Timeout)
        }
    }

    #[derive(Default)]
    struct Sent {
        jobs: Mutex<Vec<HashtagJob>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl JobSink for Sent {
        async fn publish_job(&self, job: &HashtagJob) -> threadline_common::Result<()> {
            if self.fail_on == Some(job.keyword.as_str()) {
                return Err(ThreadlineError::Transport("channel closed".into()));
            }
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_job_per_hashtag_in_order() {
        let source = Stored(vec![
            serde_json::json!({"_id": "h1", "keyword": "golang"}),
            serde_json::json!({"_id": "h2", "keyword": "rust"}),
        ]);
        let sink = Sent::default();

        let n = publish_hashtags(&source, &sink).await.unwrap();

        assert_eq!(n, 2);
        let jobs = sink.jobs.lock().unwrap().clone();
        assert_eq!(
            jobs,
            [
                HashtagJob {
                    id: Some("h1".into()),
                    keyword: "golang".into()
                },
                HashtagJob {
                    id: Some("h2".into()),
                    keyword: "rust".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn duplicates_are_published_as_stored() {
        let source = Stored(vec![
            serde_json::json!({"keyword": "rust"}),
            serde_json::json!({"keyword": "rust"}),
        ]);
        let sink = Sent::default();

        assert_eq!(publish_hashtags(&source, &sink).await.unwrap(), 2);
        assert!(sink.jobs.lock().unwrap().iter().all(|j| j.id.is_none()));
    }

    #[tokio::test]
    async fn failures_are_errors_not_panics() {
        let sink = Sent::default();
        let err = publish_hashtags(&Unreachable, &sink).await.unwrap_err();
        assert!(err.to_string().contains("failed to load hashtags"));

        let source = Stored(vec![
            serde_json::json!({"keyword": "golang"}),
            serde_json::json!({"keyword": "rust"}),
            serde_json::json!({"keyword": "zig"}),
        ]);
        let sink = Sent {
            fail_on: Some("rust"),
            ..Sent::default()
        };
        let err = publish_hashtags(&source, &sink).await.unwrap_err();
        assert!(err.to_string().contains("rust"));
        assert_eq!(sink.jobs.lock().unwrap().len(), 1);
    }
}
