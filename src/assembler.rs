use std::path::PathBuf;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{CrossfadeGraph, EncodeJob, EncodeProgress, VideoEncoder};
use crate::media::{AssetStore, MediaAsset, MediaKind};

/// Nominal length of every fetched clip.
pub const CLIP_SECONDS: f64 = 5.0;
pub const FADE_SECONDS: f64 = 0.5;

const VIDEO_ENCODE_ARGS: &[&str] = &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "fast", "-crf", "23"];
const MUX_ARGS: &[&str] = &[
    "-c:v",
    "copy",
    "-c:a",
    "aac",
    "-b:a",
    "192k",
    "-shortest",
    "-movflags",
    "+faststart",
];

/// Builds the crossfade encode for `inputs`, `None` when there is at most
/// one clip.
pub fn concat_job(inputs: &[PathBuf], output: PathBuf) -> Option<EncodeJob> {
    let graph = CrossfadeGraph::for_clips(inputs.len(), CLIP_SECONDS, FADE_SECONDS)?;
    let job = inputs
        .iter()
        .fold(EncodeJob::new(output), |job, path| job.input(path))
        .filter_complex(graph.render())
        .map(format!("[{}]", graph.output_label()))
        .output_args(VIDEO_ENCODE_ARGS.iter().copied())
        .expected_seconds(graph.output_seconds(CLIP_SECONDS));
    Some(job)
}

/// `video_seconds` bounds the output length because of `-shortest`.
pub fn mux_job(video: PathBuf, audio: PathBuf, output: PathBuf, video_seconds: Option<f64>) -> EncodeJob {
    let job = EncodeJob::new(output)
        .input(video)
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .output_args(MUX_ARGS.iter().copied());
    match video_seconds {
        Some(seconds) => job.expected_seconds(seconds),
        None => job,
    }
}

/// Length of `count` clips after crossfading.
pub fn stitched_seconds(count: usize) -> f64 {
    CrossfadeGraph::for_clips(count, CLIP_SECONDS, FADE_SECONDS)
        .map(|graph| graph.output_seconds(CLIP_SECONDS))
        .unwrap_or(CLIP_SECONDS)
}

/// Stitches clips with crossfades. A single clip is returned as-is.
pub async fn concatenate(
    encoder: &dyn VideoEncoder,
    store: &AssetStore,
    clips: &[MediaAsset],
    progress: &(dyn Fn(EncodeProgress) + Send + Sync),
) -> PipelineResult<MediaAsset> {
    match clips {
        [] => return Err(PipelineError::NoClips),
        [only] => return Ok(only.clone()),
        _ => {}
    }

    let mut inputs = Vec::with_capacity(clips.len());
    for clip in clips {
        match store.materialize(clip).await {
            Ok(path) => inputs.push(path),
            Err(err) => {
                release_all(store, &clips[..inputs.len()], &inputs).await;
                return Err(err.into());
            }
        }
    }
    let output = store.reserve_path(MediaKind::Video, "mp4");
    let encoded = match concat_job(&inputs, output.clone()) {
        Some(job) => {
            info!("Crossfading {} clips -> {}", clips.len(), output.display());
            encoder.encode(&job, progress).await
        }
        None => Err(PipelineError::NoClips),
    };
    release_all(store, clips, &inputs).await;

    encoded?;
    Ok(MediaAsset::file(MediaKind::Video, output))
}

/// Puts narration under the video, cutting to the shorter stream.
pub async fn mux(
    encoder: &dyn VideoEncoder,
    store: &AssetStore,
    video: &MediaAsset,
    audio: &MediaAsset,
    video_seconds: Option<f64>,
    progress: &(dyn Fn(EncodeProgress) + Send + Sync),
) -> PipelineResult<MediaAsset> {
    let video_path = store.materialize(video).await?;
    let audio_path = match store.materialize(audio).await {
        Ok(path) => path,
        Err(err) => {
            store.release(video, &video_path).await;
            return Err(err.into());
        }
    };
    let output = store.reserve_path(MediaKind::Video, "mp4");

    info!("Muxing {} + {} -> {}", video_path.display(), audio_path.display(), output.display());
    let job = mux_job(video_path.clone(), audio_path.clone(), output.clone(), video_seconds);
    let encoded = encoder.encode(&job, progress).await;
    store.release(video, &video_path).await;
    store.release(audio, &audio_path).await;

    encoded?;
    Ok(MediaAsset::file(MediaKind::Video, output))
}

/// Drops disk copies made for in-memory inputs once the encoder is done.
async fn release_all(store: &AssetStore, assets: &[MediaAsset], paths: &[PathBuf]) {
    for (asset, path) in assets.iter().zip(paths) {
        store.release(asset, path).await;
    }
}
