use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::pipeline::{GenerationJob, Pipeline, PublishedVideo, Stage};
use crate::progress::{ProgressEvent, ProgressLog};

/// What a host sees when it polls a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub stage: Stage,
    pub progress_events: Vec<ProgressEvent>,
    pub is_complete: bool,
    pub is_error: bool,
    pub result_ref: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
enum JobState {
    Running,
    Completed(PublishedVideo),
    Failed(String),
}

#[derive(Debug)]
struct JobEntry {
    log: ProgressLog,
    state: JobState,
}

/// Runs jobs in the background and answers status polls.
///
/// Finished jobs stay queryable for the retention period; after that the
/// published file and the entry are both removed.
#[derive(Clone)]
pub struct JobRegistry {
    pipeline: Arc<Pipeline>,
    retention: Duration,
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
}

pub fn new_job_id() -> String {
    format!(
        "job-{}-{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

impl JobRegistry {
    pub fn new(pipeline: Arc<Pipeline>, retention: Duration) -> Self {
        Self {
            pipeline,
            retention,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Starts a job and returns its id immediately.
    pub async fn submit(&self, config: GenerationConfig) -> String {
        let (id, _handle) = self.spawn(config).await;
        id
    }

    /// Runs a job and waits for it to reach a terminal stage.
    pub async fn run_to_completion(&self, config: GenerationConfig) -> JobStatus {
        let (id, handle) = self.spawn(config).await;
        if let Err(err) = handle.await {
            self.finish(&id, JobState::Failed(format!("Job task aborted: {}", err)))
                .await;
        }
        match self.status(&id, None).await {
            Some(status) => status,
            None => JobStatus {
                job_id: id,
                stage: Stage::Failed,
                progress_events: Vec::new(),
                is_complete: false,
                is_error: true,
                result_ref: None,
                error: Some("Job expired before it could be read".to_string()),
            },
        }
    }

    /// Events with id greater than `after`, plus the job's current outcome.
    /// `None` for unknown or expired jobs.
    pub async fn status(&self, job_id: &str, after: Option<u64>) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id)?;

        let progress_events = entry.log.since(after);
        let stage = match &entry.state {
            JobState::Completed(_) => Stage::Completed,
            JobState::Failed(_) => Stage::Failed,
            JobState::Running => entry
                .log
                .snapshot()
                .last()
                .map(|e| e.stage)
                .unwrap_or(Stage::Validating),
        };
        let (is_complete, is_error, result_ref, error) = match &entry.state {
            JobState::Running => (false, false, None, None),
            JobState::Completed(video) => (true, false, Some(video.url.clone()), None),
            JobState::Failed(msg) => (false, true, None, Some(msg.clone())),
        };

        Some(JobStatus {
            job_id: job_id.to_string(),
            stage,
            progress_events,
            is_complete,
            is_error,
            result_ref,
            error,
        })
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    async fn spawn(&self, config: GenerationConfig) -> (String, JoinHandle<()>) {
        let id = new_job_id();
        let log = ProgressLog::new(&id);
        self.jobs.write().await.insert(
            id.clone(),
            JobEntry {
                log: log.clone(),
                state: JobState::Running,
            },
        );
        info!("Job {} submitted: {}", id, config.project_title);

        let registry = self.clone();
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            let mut job = GenerationJob::with_log(job_id.clone(), config, log);
            let (state, published) = match registry.pipeline.run(&mut job).await {
                Ok(video) => {
                    let path = video.path.clone();
                    (JobState::Completed(video), Some(path))
                }
                Err(err) => (JobState::Failed(err.user_message()), None),
            };
            registry.finish(&job_id, state).await;
            registry.schedule_expiry(job_id, published);
        });
        (id, handle)
    }

    async fn finish(&self, job_id: &str, state: JobState) {
        if let Some(entry) = self.jobs.write().await.get_mut(job_id) {
            entry.state = state;
        }
    }

    fn schedule_expiry(&self, job_id: String, published: Option<PathBuf>) {
        let jobs = self.jobs.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(path) = published {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => info!("Expired result {}", path.display()),
                    Err(err) => debug!("Could not remove {}: {}", path.display(), err),
                }
            }
            jobs.write().await.remove(&job_id);
        });
    }
}
