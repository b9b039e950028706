pub mod api;
pub mod assembler;
pub mod config;
pub mod director;
pub mod error;
pub mod ffmpeg;
pub mod footage;
pub mod init;
pub mod jobs;
pub mod keys;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod scene_plan;
pub mod speech;

pub use config::{AppConfig, GenerationConfig, StorageMode};
pub use error::{PipelineError, PipelineResult};
pub use jobs::{JobRegistry, JobStatus};
pub use pipeline::{GenerationJob, Pipeline, PipelineSettings, PublishedVideo, Services, Stage};
pub use progress::{ProgressEvent, ProgressLog, Severity};
