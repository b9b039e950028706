use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

const PERCENT_MILESTONES: &[u8] = &[25, 50, 75, 100];
const STDERR_TAIL_CHARS: usize = 2000;

/// One `xfade` step: `[left][right]xfade=...[output]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossfadeStep {
    pub left: String,
    pub right: String,
    pub duration: f64,
    pub offset: f64,
    pub output: String,
}

impl fmt::Display for CrossfadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}][{}]xfade=transition=fade:duration={}:offset={}[{}]",
            self.left, self.right, self.duration, self.offset, self.output
        )
    }
}

/// Chain of pairwise fades over `n` inputs of equal nominal length.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossfadeGraph {
    steps: Vec<CrossfadeStep>,
}

impl CrossfadeGraph {
    /// `None` for fewer than two clips; there is nothing to blend.
    pub fn for_clips(count: usize, clip_seconds: f64, fade_seconds: f64) -> Option<Self> {
        if count < 2 {
            return None;
        }

        let mut steps = Vec::with_capacity(count - 1);
        let mut current = "0:v".to_string();
        for i in 1..count {
            let output = format!("v{}", i);
            steps.push(CrossfadeStep {
                left: current,
                right: format!("{}:v", i),
                duration: fade_seconds,
                offset: (i - 1) as f64 * clip_seconds + (clip_seconds - fade_seconds),
                output: output.clone(),
            });
            current = output;
        }
        Some(Self { steps })
    }

    pub fn steps(&self) -> &[CrossfadeStep] {
        &self.steps
    }

    pub fn output_label(&self) -> &str {
        self.steps.last().map(|s| s.output.as_str()).unwrap_or("0:v")
    }

    /// Length of the blended output in seconds.
    pub fn output_seconds(&self, clip_seconds: f64) -> f64 {
        self.steps
            .last()
            .map(|s| s.offset + clip_seconds)
            .unwrap_or(clip_seconds)
    }

    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Everything needed for one encoder invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeJob {
    pub inputs: Vec<PathBuf>,
    pub filter_complex: Option<String>,
    pub maps: Vec<String>,
    pub output_args: Vec<String>,
    pub output: PathBuf,
    /// Known output length, enables percentage progress.
    pub expected_seconds: Option<f64>,
}

impl EncodeJob {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    pub fn filter_complex(mut self, graph: impl Into<String>) -> Self {
        self.filter_complex = Some(graph.into());
        self
    }

    pub fn map(mut self, spec: impl Into<String>) -> Self {
        self.maps.push(spec.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn expected_seconds(mut self, seconds: f64) -> Self {
        self.expected_seconds = Some(seconds);
        self
    }

    /// Arguments after the program name. Progress goes to stdout as
    /// `key=value` lines.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ];
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.display().to_string());
        }
        if let Some(graph) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(graph.clone());
        }
        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeProgress {
    Phase(&'static str),
    Percent(u8),
}

pub type ProgressSink<'a> = &'a (dyn Fn(EncodeProgress) + Send + Sync);

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob, progress: ProgressSink<'_>) -> PipelineResult<()>;
}

/// Runs the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob, progress: ProgressSink<'_>) -> PipelineResult<()> {
        progress(EncodeProgress::Phase("preparing"));
        let args = job.to_args();
        debug!("Running: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::encode(format!("could not start {}: {}", self.program, e), None))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let stdout = child.stdout.take();
        let run = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                let mut tracker = MilestoneTracker::new(job.expected_seconds);
                let mut announced_encoding = false;
                while let Ok(Some(line)) = lines.next_line().await {
                    if !announced_encoding {
                        progress(EncodeProgress::Phase("encoding"));
                        announced_encoding = true;
                    }
                    if let Some(pct) = tracker.observe(&line) {
                        progress(EncodeProgress::Percent(pct));
                    }
                }
            }
            child.wait().await
        };

        let status = match tokio::time::timeout(self.timeout, run).await {
            Ok(status) => status.map_err(|e| wait_failed(&self.program, e))?,
            Err(_) => {
                warn!("{} timed out after {:?}", self.program, self.timeout);
                return Err(PipelineError::encode(
                    format!("timed out after {} seconds", self.timeout.as_secs()),
                    None,
                ));
            }
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let tail = tail_chars(stderr.trim(), STDERR_TAIL_CHARS);
            let message = if tail.is_empty() {
                format!("{} exited with {}", self.program, status)
            } else {
                tail.clone()
            };
            return Err(PipelineError::encode(message, Some(tail)));
        }

        progress(EncodeProgress::Phase("finalizing"));
        Ok(())
    }
}

fn wait_failed(program: &str, err: std::io::Error) -> PipelineError {
    PipelineError::encode(format!("waiting for {} failed: {}", program, err), None)
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}

/// Turns `-progress` output into discrete percentage milestones.
#[derive(Debug)]
struct MilestoneTracker {
    total_us: Option<f64>,
    next: usize,
}

impl MilestoneTracker {
    fn new(expected_seconds: Option<f64>) -> Self {
        Self {
            total_us: expected_seconds.filter(|s| *s > 0.0).map(|s| s * 1_000_000.0),
            next: 0,
        }
    }

    fn observe(&mut self, line: &str) -> Option<u8> {
        let total = self.total_us?;
        let (key, value) = line.trim().split_once('=')?;
        let pct = match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds.
                let us = value.parse::<f64>().ok()?;
                (us / total * 100.0).clamp(0.0, 100.0)
            }
            "progress" if value == "end" => 100.0,
            _ => return None,
        };

        let mut reached = None;
        while self.next < PERCENT_MILESTONES.len() && pct >= PERCENT_MILESTONES[self.next] as f64 {
            reached = Some(PERCENT_MILESTONES[self.next]);
            self.next += 1;
        }
        reached
    }
}
