use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;

use ai_video_shorts::api::build_http_client;
use ai_video_shorts::api::gemini::{GeminiClient, VOICE_MODELS};
use ai_video_shorts::keys::CredentialSet;
use ai_video_shorts::{AppConfig, GenerationConfig, JobRegistry, Pipeline, PipelineSettings, Services, init};

const DEFAULT_CONFIG: &str = "config.json";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  ai-video-shorts run <job.json> [config.json]");
    eprintln!("  ai-video-shorts models <google-api-keys> [config.json]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, target, config_path) = match args.as_slice() {
        [cmd, target] => (cmd.as_str(), target.as_str(), DEFAULT_CONFIG),
        [cmd, target, cfg] => (cmd.as_str(), target.as_str(), cfg.as_str()),
        _ => usage(),
    };

    let config = AppConfig::load_or_default(config_path).await?;
    match command {
        "run" => {
            let code = run_job(&config, target).await?;
            std::process::exit(code);
        }
        "models" => list_models(&config, target).await,
        _ => usage(),
    }
}

async fn run_job(config: &AppConfig, job_path: &str) -> Result<i32> {
    init::ensure_directories(config).await?;
    if !init::check_ffmpeg(&config.ffmpeg_path).await {
        tracing::warn!("FFmpeg not found at '{}'. Please install FFmpeg.", config.ffmpeg_path);
    }
    init::purge_stale_results(&config.results_dir, config.retention());

    let request = GenerationConfig::load(job_path).await?;
    let services = Services::from_config(config)?;
    let pipeline = Arc::new(Pipeline::new(services, PipelineSettings::from(config)));
    let registry = JobRegistry::new(pipeline, config.retention());

    let job_id = registry.submit(request).await;
    let mut last_seen = None;
    loop {
        let status = registry
            .status(&job_id, last_seen)
            .await
            .context("job disappeared while running")?;
        for event in &status.progress_events {
            println!("[{}] {:<10} {}", event.timestamp, format!("{:?}", event.severity).to_uppercase(), event.message);
            last_seen = Some(event.id);
        }
        if status.is_complete {
            println!("Result: {}", status.result_ref.unwrap_or_default());
            return Ok(0);
        }
        if status.is_error {
            eprintln!("Failed: {}", status.error.unwrap_or_default());
            return Ok(1);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn list_models(config: &AppConfig, raw_keys: &str) -> Result<()> {
    let credentials = CredentialSet::parse(raw_keys);
    if credentials.is_empty() {
        bail!("at least one Google API key is required");
    }
    let client = build_http_client(config.http_timeout())?;
    let gemini = GeminiClient::new(client, &config.gemini_base_url);
    let models = gemini.list_text_models(&credentials).await?;

    println!("Text models:");
    for model in models {
        println!("  {}", model);
    }
    println!("Voice models:");
    for model in VOICE_MODELS {
        println!("  {}", model);
    }
    Ok(())
}
