use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::api::gemini::GeminiClient;
use crate::api::pexels::PexelsClient;
use crate::api::{FootageService, SpeechService, TextService, build_http_client};
use crate::assembler;
use crate::config::{AppConfig, GenerationConfig, StorageMode};
use crate::director::{plan_scenes, translate_script};
use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{EncodeProgress, FfmpegEncoder, VideoEncoder};
use crate::footage::fetch_footage;
use crate::media::{AssetStore, MediaAsset};
use crate::progress::ProgressLog;
use crate::speech::synthesize_speech;

/// Stages of a job, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    PlanningScript,
    Translating,
    Synthesizing,
    FetchingFootage,
    Concatenating,
    Muxing,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::PlanningScript => "planning",
            Stage::Translating => "translating",
            Stage::Synthesizing => "synthesizing",
            Stage::FetchingFootage => "fetching",
            Stage::Concatenating => "concatenating",
            Stage::Muxing => "muxing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextService>,
    pub speech: Arc<dyn SpeechService>,
    pub footage: Arc<dyn FootageService>,
    pub encoder: Arc<dyn VideoEncoder>,
}

impl Services {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let client = build_http_client(cfg.http_timeout())?;
        let gemini = Arc::new(GeminiClient::new(client.clone(), &cfg.gemini_base_url));
        let pexels = Arc::new(PexelsClient::new(client, &cfg.pexels_base_url));
        let encoder = Arc::new(FfmpegEncoder::new(&cfg.ffmpeg_path, cfg.encode_timeout()));
        Ok(Self {
            text: gemini.clone(),
            speech: gemini,
            footage: pexels,
            encoder,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub results_dir: PathBuf,
    pub storage: StorageMode,
    pub default_text_model: String,
    pub default_voice_model: String,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            work_dir: cfg.work_dir.clone(),
            results_dir: cfg.results_dir.clone(),
            storage: cfg.storage,
            default_text_model: cfg.default_text_model.clone(),
            default_voice_model: cfg.default_voice_model.clone(),
        }
    }
}

/// Final video moved out of the job scratch area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedVideo {
    pub path: PathBuf,
    /// Reference handed to the host, e.g. `/results/Demo_job-....mp4`.
    pub url: String,
}

/// One run: request, its event log, and where it currently is.
#[derive(Debug)]
pub struct GenerationJob {
    pub id: String,
    pub config: GenerationConfig,
    pub log: ProgressLog,
    stage: Stage,
}

impl GenerationJob {
    pub fn new(id: impl Into<String>, config: GenerationConfig) -> Self {
        let id = id.into();
        let log = ProgressLog::new(&id);
        Self::with_log(id, config, log)
    }

    pub fn with_log(id: impl Into<String>, config: GenerationConfig, log: ProgressLog) -> Self {
        Self {
            id: id.into(),
            config,
            log,
            stage: Stage::Validating,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(!self.stage.is_terminal(), "job already finished");
        self.stage = stage;
    }
}

pub struct Pipeline {
    services: Services,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(services: Services, settings: PipelineSettings) -> Self {
        Self { services, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Drives `job` to `Completed` or `Failed`. Failures leave a warning
    /// event with the user-facing message.
    pub async fn run(&self, job: &mut GenerationJob) -> PipelineResult<PublishedVideo> {
        match self.run_stages(job).await {
            Ok(video) => {
                job.enter(Stage::Completed);
                Ok(video)
            }
            Err(err) => {
                job.log
                    .warning(job.stage, format!("Error: {}", err.user_message()));
                job.enter(Stage::Failed);
                Err(err)
            }
        }
    }

    async fn run_stages(&self, job: &mut GenerationJob) -> PipelineResult<PublishedVideo> {
        let log = job.log.clone();
        let cfg = job.config.clone();

        job.enter(Stage::Validating);
        log.success(Stage::Validating, "Validating inputs...");
        cfg.validate()?;
        let language = cfg
            .primary_language()
            .ok_or_else(|| PipelineError::validation("At least one language must be selected"))?
            .to_string();
        if cfg.languages.len() > 1 {
            warn!(
                job = %job.id,
                "Only the first language is processed; ignoring {:?}",
                &cfg.languages[1..]
            );
        }
        let text_keys = cfg.text_credentials();
        let footage_keys = cfg.footage_credentials();
        let text_model = cfg.text_model_or(&self.settings.default_text_model).to_string();
        let voice_model = cfg.voice_model_or(&self.settings.default_voice_model).to_string();
        log.success(Stage::Validating, "Inputs validated");

        let store = AssetStore::create(&self.settings.work_dir, &job.id, self.settings.storage)?;

        job.enter(Stage::PlanningScript);
        log.processing(
            Stage::PlanningScript,
            format!("Generating cinematic script with {}...", text_model),
        );
        let plan = plan_scenes(self.services.text.as_ref(), &text_model, &cfg.main_prompt, &text_keys).await?;
        log.success(
            Stage::PlanningScript,
            format!(
                "Scene plan ready: {} scenes, {:.0}s total",
                plan.scenes.len(),
                plan.total_duration
            ),
        );

        job.enter(Stage::Translating);
        log.processing(Stage::Translating, format!("Translating script to {}...", language));
        let script = translate_script(
            self.services.text.as_ref(),
            &text_model,
            &plan.script(),
            &language,
            &text_keys,
        )
        .await;
        log.success(Stage::Translating, format!("Script ready in {}", language));

        job.enter(Stage::Synthesizing);
        log.processing(Stage::Synthesizing, format!("Generating voiceover for {}...", language));
        let audio = synthesize_speech(
            self.services.speech.as_ref(),
            &store,
            &script,
            &voice_model,
            &text_keys,
        )
        .await?;
        log.success(Stage::Synthesizing, "Voiceover ready");

        job.enter(Stage::FetchingFootage);
        let total = plan.scenes.len();
        let mut clips: Vec<MediaAsset> = Vec::with_capacity(total);
        for (idx, scene) in plan.scenes.iter().enumerate() {
            log.processing(
                Stage::FetchingFootage,
                format!("Fetching video {}/{}: {}", idx + 1, total, scene.search_keywords),
            );
            let footage = self.services.footage.as_ref();
            let clip = match fetch_footage(footage, &store, &scene.search_keywords, &footage_keys).await {
                Ok(clip) => clip,
                Err(err) => {
                    warn!(job = %job.id, "Scene {} footage failed: {}", idx + 1, err);
                    log.warning(
                        Stage::FetchingFootage,
                        "Scene-specific video not found, using main prompt...",
                    );
                    fetch_footage(footage, &store, &cfg.main_prompt, &footage_keys).await?
                }
            };
            clips.push(clip);
        }
        log.success(Stage::FetchingFootage, format!("Fetched {} clips", clips.len()));

        job.enter(Stage::Concatenating);
        log.processing(Stage::Concatenating, "Stitching videos with cinematic transitions...");
        let stitch_progress = |p: EncodeProgress| match p {
            EncodeProgress::Percent(pct) => {
                log.processing(Stage::Concatenating, format!("Processing: {}% complete", pct));
            }
            EncodeProgress::Phase(name) => {
                log.processing(Stage::Concatenating, format!("Stitching: {}", name));
            }
        };
        let silent = assembler::concatenate(
            self.services.encoder.as_ref(),
            &store,
            &clips,
            &stitch_progress,
        )
        .await?;
        let silent_seconds = assembler::stitched_seconds(clips.len());
        for clip in clips {
            if clip != silent {
                store.discard(clip).await;
            }
        }
        log.success(Stage::Concatenating, "Clips stitched");

        job.enter(Stage::Muxing);
        log.processing(Stage::Muxing, "Merging video with voiceover...");
        let mux_progress = |p: EncodeProgress| match p {
            EncodeProgress::Percent(pct) => {
                log.processing(Stage::Muxing, format!("Finalizing: {}% complete", pct));
            }
            EncodeProgress::Phase(name) => {
                log.processing(Stage::Muxing, format!("Merging: {}", name));
            }
        };
        let finished = assembler::mux(
            self.services.encoder.as_ref(),
            &store,
            &silent,
            &audio,
            Some(silent_seconds),
            &mux_progress,
        )
        .await?;
        store.discard(silent).await;
        store.discard(audio).await;
        log.success(Stage::Muxing, "Voiceover merged");

        let dest = self
            .settings
            .results_dir
            .join(result_file_name(&cfg.project_title, &job.id));
        let path = store.publish(&finished, &dest).await?;
        let url = result_url(&self.settings.results_dir, &path);

        log.success(Stage::Completed, format!("Video for {} is ready!", language));
        Ok(PublishedVideo { path, url })
    }
}

/// `<title with non-alphanumerics replaced by _>_<job id>.mp4`
pub fn result_file_name(title: &str, job_id: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.mp4", safe, job_id)
}

fn result_url(results_dir: &Path, path: &Path) -> String {
    let rel = pathdiff::diff_paths(path, results_dir)
        .unwrap_or_else(|| PathBuf::from(path.file_name().unwrap_or_default()));
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/results/{}", rel)
}
