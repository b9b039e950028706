use ai_video_shorts::api::{FootageService, SpeechPayload, SpeechService, TextService};
use ai_video_shorts::ffmpeg::{EncodeJob, EncodeProgress, ProgressSink, VideoEncoder};
use ai_video_shorts::{
    GenerationConfig, JobRegistry, Pipeline, PipelineResult, PipelineSettings, Services, Severity, Stage,
    StorageMode,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct FakeText {
    calls: AtomicUsize,
}

#[async_trait]
impl TextService for FakeText {
    async fn generate_text(&self, _key: &str, _model: &str, prompt: &str) -> PipelineResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.starts_with("Translate") {
            return Ok(Some("Un viaje por los agujeros negros.".to_string()));
        }
        let scenes: Vec<String> = (1..=6)
            .map(|i| {
                format!(
                    r#"{{"description":"Scene {i} narration.","searchKeywords":"scene{i}","duration":5}}"#
                )
            })
            .collect();
        Ok(Some(format!(
            "Here is your plan:\n```json\n{{\"scenes\":[{}],\"totalDuration\":30}}\n```",
            scenes.join(",")
        )))
    }
}

#[derive(Default)]
struct FakeSpeech {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn generate_speech(&self, _key: &str, _model: &str, _text: &str) -> PipelineResult<Option<SpeechPayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(SpeechPayload {
            data_base64: "SUQz".to_string(),
            mime_type: Some("audio/mpeg".to_string()),
        }))
    }
}

#[derive(Default)]
struct FakeFootage {
    missing: HashSet<&'static str>,
    searches: AtomicUsize,
}

#[async_trait]
impl FootageService for FakeFootage {
    async fn search_video(&self, _key: &str, query: &str) -> PipelineResult<Option<String>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(query) {
            return Ok(None);
        }
        Ok(Some(format!("https://videos.example/{}.mp4", query.replace(' ', "-"))))
    }

    async fn download(&self, _url: &str) -> PipelineResult<Vec<u8>> {
        Ok(b"clip-bytes".to_vec())
    }
}

#[derive(Default)]
struct FakeEncoder {
    calls: AtomicUsize,
    scratch: PathBuf,
    files_seen: Mutex<Vec<usize>>,
}

fn files_under(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, job: &EncodeJob, progress: ProgressSink<'_>) -> PipelineResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files_seen.lock().unwrap().push(files_under(&self.scratch));
        for input in &job.inputs {
            assert!(Path::new(input).exists(), "encoder input missing: {}", input.display());
        }
        progress(EncodeProgress::Percent(100));
        tokio::fs::write(&job.output, b"encoded").await?;
        Ok(())
    }
}

struct Harness {
    text: Arc<FakeText>,
    speech: Arc<FakeSpeech>,
    footage: Arc<FakeFootage>,
    encoder: Arc<FakeEncoder>,
    work: TempDir,
    results: TempDir,
    registry: JobRegistry,
}

impl Harness {
    fn new(missing: &[&'static str], storage: StorageMode, retention: Duration) -> Self {
        let text = Arc::new(FakeText::default());
        let speech = Arc::new(FakeSpeech::default());
        let footage = Arc::new(FakeFootage {
            missing: missing.iter().copied().collect(),
            ..Default::default()
        });
        let work = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder {
            scratch: work.path().to_path_buf(),
            ..Default::default()
        });
        let results = tempfile::tempdir().unwrap();

        let services = Services {
            text: text.clone(),
            speech: speech.clone(),
            footage: footage.clone(),
            encoder: encoder.clone(),
        };
        let settings = PipelineSettings {
            work_dir: work.path().to_path_buf(),
            results_dir: results.path().to_path_buf(),
            storage,
            default_text_model: "gemini-test".to_string(),
            default_voice_model: "tts-test".to_string(),
        };
        let registry = JobRegistry::new(Arc::new(Pipeline::new(services, settings)), retention);

        Self {
            text,
            speech,
            footage,
            encoder,
            work,
            results,
            registry,
        }
    }

    fn external_calls(&self) -> usize {
        self.text.calls.load(Ordering::SeqCst)
            + self.speech.calls.load(Ordering::SeqCst)
            + self.footage.searches.load(Ordering::SeqCst)
            + self.encoder.calls.load(Ordering::SeqCst)
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.work.path()).unwrap().next().is_none()
    }
}

fn demo_request() -> GenerationConfig {
    GenerationConfig {
        project_title: "Demo".to_string(),
        main_prompt: "black holes".to_string(),
        languages: vec!["English".to_string()],
        google_api_keys: "g-key-1".to_string(),
        pexels_api_keys: "p-key-1".to_string(),
        ..Default::default()
    }
}

const STAGE_ORDER: [Stage; 8] = [
    Stage::Validating,
    Stage::PlanningScript,
    Stage::Translating,
    Stage::Synthesizing,
    Stage::FetchingFootage,
    Stage::Concatenating,
    Stage::Muxing,
    Stage::Completed,
];

fn rank(stage: Stage) -> usize {
    STAGE_ORDER
        .iter()
        .position(|s| *s == stage)
        .unwrap_or(STAGE_ORDER.len())
}

#[tokio::test]
async fn happy_path_publishes_a_video_and_reports_every_stage() {
    let h = Harness::new(&[], StorageMode::Disk, Duration::from_secs(3600));
    let status = h.registry.run_to_completion(demo_request()).await;

    assert!(status.is_complete, "failed: {:?}", status.error);
    assert!(!status.is_error);
    assert_eq!(status.stage, Stage::Completed);

    let result = status.result_ref.expect("result reference");
    assert!(result.starts_with("/results/Demo_job-"), "{}", result);
    let file = result.trim_start_matches("/results/");
    assert_eq!(std::fs::read(h.results.path().join(file)).unwrap(), b"encoded");

    let events = &status.progress_events;
    assert_eq!(events[0].stage, Stage::Validating);
    assert_eq!(events[0].message, "Validating inputs...");
    assert_eq!(events[0].severity, Severity::Success);
    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Completed);
    assert_eq!(last.severity, Severity::Success);
    assert_eq!(last.message, "Video for English is ready!");

    for pair in events.windows(2) {
        assert!(pair[0].id < pair[1].id);
        assert!(rank(pair[0].stage) <= rank(pair[1].stage), "{:?} after {:?}", pair[1].stage, pair[0].stage);
    }
    for stage in &STAGE_ORDER[..7] {
        let of_stage: Vec<_> = events.iter().filter(|e| e.stage == *stage).collect();
        assert!(of_stage.len() >= 2, "stage {} has {} events", stage, of_stage.len());
        assert_eq!(of_stage.last().unwrap().severity, Severity::Success);
    }
    let fetches = events
        .iter()
        .filter(|e| e.stage == Stage::FetchingFootage && e.severity == Severity::Processing)
        .count();
    assert_eq!(fetches, 6);
    assert!(events.iter().all(|e| e.severity != Severity::Warning));

    assert_eq!(h.text.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.footage.searches.load(Ordering::SeqCst), 6);
    assert_eq!(h.encoder.calls.load(Ordering::SeqCst), 2);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn empty_prompt_fails_validation_without_external_calls() {
    let h = Harness::new(&[], StorageMode::Disk, Duration::from_secs(3600));
    let request = GenerationConfig {
        main_prompt: String::new(),
        ..demo_request()
    };
    let status = h.registry.run_to_completion(request).await;

    assert!(status.is_error);
    assert!(!status.is_complete);
    assert_eq!(status.stage, Stage::Failed);
    assert_eq!(status.error.as_deref(), Some("Project title and prompt are required"));
    assert!(status.result_ref.is_none());
    assert_eq!(h.external_calls(), 0);
    assert!(h.scratch_is_empty());

    let last = status.progress_events.last().unwrap();
    assert_eq!(last.severity, Severity::Warning);
    assert_eq!(last.message, "Error: Project title and prompt are required");
}

#[tokio::test]
async fn missing_scene_footage_falls_back_to_the_main_prompt() {
    let h = Harness::new(&["scene3"], StorageMode::Disk, Duration::from_secs(3600));
    let status = h.registry.run_to_completion(demo_request()).await;

    assert!(status.is_complete, "failed: {:?}", status.error);
    assert_eq!(h.footage.searches.load(Ordering::SeqCst), 7);
    let warnings: Vec<_> = status
        .progress_events
        .iter()
        .filter(|e| e.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].stage, Stage::FetchingFootage);
}

#[tokio::test]
async fn failed_fallback_fails_the_job_and_cleans_up() {
    let h = Harness::new(&["scene3", "black holes"], StorageMode::Disk, Duration::from_secs(3600));
    let status = h.registry.run_to_completion(demo_request()).await;

    assert!(status.is_error);
    assert_eq!(status.error.as_deref(), Some("No video found for \"black holes\""));
    assert_eq!(h.encoder.calls.load(Ordering::SeqCst), 0);
    assert!(h.scratch_is_empty());
    assert!(std::fs::read_dir(h.results.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn in_memory_storage_still_produces_a_file() {
    let h = Harness::new(&[], StorageMode::Memory, Duration::from_secs(3600));
    let status = h.registry.run_to_completion(demo_request()).await;

    assert!(status.is_complete, "failed: {:?}", status.error);
    assert_eq!(h.encoder.calls.load(Ordering::SeqCst), 2);
    let seen = h.encoder.files_seen.lock().unwrap().clone();
    // Concat sees the six spilled clips; mux only the silent video and audio.
    assert_eq!(seen[0], 6);
    assert!(seen[1] <= 2, "files on disk while muxing: {}", seen[1]);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn polling_with_a_cursor_returns_only_new_events() {
    let h = Harness::new(&[], StorageMode::Disk, Duration::from_secs(3600));
    let done = h.registry.run_to_completion(demo_request()).await;
    let all = &done.progress_events;
    let cursor = all[4].id;

    let delta = h.registry.status(&done.job_id, Some(cursor)).await.unwrap();
    assert_eq!(delta.progress_events.len(), all.len() - 5);
    assert!(delta.progress_events.iter().all(|e| e.id > cursor));
    assert!(delta.is_complete);

    let last = all.last().unwrap().id;
    let empty = h.registry.status(&done.job_id, Some(last)).await.unwrap();
    assert!(empty.progress_events.is_empty());

    assert!(h.registry.status("job-unknown", None).await.is_none());
}

#[tokio::test]
async fn submitted_jobs_finish_in_the_background() {
    let h = Harness::new(&[], StorageMode::Disk, Duration::from_secs(3600));
    let id = h.registry.submit(demo_request()).await;

    let mut status = h.registry.status(&id, None).await.unwrap();
    for _ in 0..200 {
        if status.is_complete || status.is_error {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = h.registry.status(&id, None).await.unwrap();
    }
    assert!(status.is_complete, "failed: {:?}", status.error);
}

#[tokio::test]
async fn results_expire_after_retention() {
    let h = Harness::new(&[], StorageMode::Disk, Duration::from_millis(50));
    let status = h.registry.run_to_completion(demo_request()).await;
    assert!(status.is_complete);
    let file = h
        .results
        .path()
        .join(status.result_ref.unwrap().trim_start_matches("/results/"));
    assert!(file.exists());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!file.exists());
    assert!(h.registry.status(&status.job_id, None).await.is_none());
    assert_eq!(h.registry.len().await, 0);
}
