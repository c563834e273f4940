pub mod actor;
pub mod builder;
pub mod pipeline;
pub mod publisher;
pub mod supervise;
pub mod timeline;

use serde::{Deserialize, Serialize};
use threadline_social::{AccountInfo, Thread};
use tokio::sync::oneshot;

pub use pipeline::{JobPipeline, PipelineError, ResultSink};

/// One unit of work on the job queue: fetch and enrich the threads for `keyword`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashtagJob {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub keyword: String,
}

/// A thread paired with its author. `thread.user_id == account.id` always holds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobResult {
    #[serde(rename = "timeline")]
    pub thread: Thread,
    pub account: AccountInfo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadFailure {
    pub thread_id: String,
    pub user_id: String,
    pub reason: String,
}

/// Outcome of one pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobReport {
    pub keyword: String,
    pub threads: usize,
    pub published: usize,
    pub failures: Vec<ThreadFailure>,
}

/// Raw job payload plus the channel the outcome is reported on.
pub struct JobMsg {
    pub payload: Vec<u8>,
    pub reply: oneshot::Sender<Result<JobReport, PipelineError>>,
}
