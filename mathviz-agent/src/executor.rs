//! Renderer subprocess execution.
//!
//! [`ManimExecutor`] sanitizes a program, rejects it early when the source
//! checker finds a structural problem, then runs the renderer in a fresh
//! temporary directory under a wall-clock timeout and looks up the video.

use crate::sanitize::sanitize;
use mathviz_error::{Error, Result};
use mathviz_scene::{check_source, scene_class_name};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Longest stderr tail kept in an error message
const STDERR_TAIL_CHARS: usize = 3000;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];

/// Result of one render attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered { video_path: PathBuf },
    Failed { error_message: String, timed_out: bool },
}

impl RenderOutcome {
    pub fn failed(error_message: impl Into<String>) -> Self {
        RenderOutcome::Failed {
            error_message: error_message.into(),
            timed_out: false,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }
}

/// Turns a program into a video
#[allow(async_fn_in_trait)]
pub trait RendererExecutor: Send + Sync {
    async fn execute(&self, source: &str) -> RenderOutcome;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderQuality {
    #[default]
    Low,
    Medium,
    High,
}

impl RenderQuality {
    pub fn flag(&self) -> &'static str {
        match self {
            RenderQuality::Low => "-ql",
            RenderQuality::Medium => "-qm",
            RenderQuality::High => "-qh",
        }
    }
}

impl std::str::FromStr for RenderQuality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.strip_suffix("_quality").unwrap_or(&s) {
            "low" | "l" => Ok(RenderQuality::Low),
            "medium" | "m" => Ok(RenderQuality::Medium),
            "high" | "h" => Ok(RenderQuality::High),
            other => Err(Error::invalid_argument(format!("unknown render quality '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Interpreter used to launch the renderer
    pub program: String,
    /// Arguments placed before the quality flag
    pub args: Vec<String>,
    pub quality: RenderQuality,
    /// Media root handed to the renderer
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["-m".into(), "manim".into()],
            quality: RenderQuality::Low,
            output_dir: PathBuf::from("media"),
            timeout: Duration::from_secs(180),
        }
    }
}

pub struct ManimExecutor {
    config: ExecutorConfig,
}

impl ManimExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn render(&self, code: &str) -> Result<RenderOutcome> {
        let code = sanitize(code);

        if let Err(issue) = check_source(&code) {
            warn!(%issue, "rejected before rendering");
            return Ok(RenderOutcome::failed(format!("Syntax error: {}", issue)));
        }

        let Some(scene) = scene_class_name(&code) else {
            return Ok(RenderOutcome::failed("Could not find Scene class in code"));
        };

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| Error::from(e).with_operation("executor::output_dir"))?;

        let workdir = tempfile::Builder::new()
            .prefix("mathviz_")
            .tempdir()
            .map_err(|e| Error::from(e).with_operation("executor::tempdir"))?;
        let stem = workdir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".into());
        let script = workdir.path().join(format!("{}.py", stem));
        tokio::fs::write(&script, code.as_bytes())
            .await
            .map_err(|e| Error::from(e).with_operation("executor::write_script"))?;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(self.config.quality.flag())
            .arg(format!("--media_dir={}", self.config.output_dir.display()))
            .arg(&script)
            .arg(scene)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(scene, script = %script.display(), "rendering");

        let output = match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| {
                Error::render_failed(format!("failed to launch {}: {}", self.config.program, e))
                    .with_operation("executor::spawn")
                    .set_source(e)
            })?,
            Err(_) => {
                let err = Error::render_timeout(self.config.timeout.as_secs());
                warn!(error = %err, "renderer killed");
                return Ok(RenderOutcome::Failed {
                    error_message: err.message().to_string(),
                    timed_out: true,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                stderr.into_owned()
            };
            debug!(status = ?output.status, "renderer exited with failure");
            return Ok(RenderOutcome::failed(format!(
                "Execution error: {}",
                tail(detail.trim(), STDERR_TAIL_CHARS)
            )));
        }

        let search_root = self.config.output_dir.join("videos").join(&stem);
        let fallback_root = self.config.output_dir.clone();
        let scene_name = scene.to_string();
        let found = tokio::task::spawn_blocking(move || {
            find_video(&search_root, &scene_name).or_else(|| find_video(&fallback_root, &scene_name))
        })
        .await
        .map_err(|e| Error::unexpected(format!("video search panicked: {}", e)))?;

        match found {
            Some(video_path) => {
                info!(video = %video_path.display(), "video generated");
                Ok(RenderOutcome::Rendered { video_path })
            }
            None => Ok(RenderOutcome::failed("Video file not found after execution")),
        }
    }
}

impl RendererExecutor for ManimExecutor {
    async fn execute(&self, source: &str) -> RenderOutcome {
        match self.render(source).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "render attempt failed");
                RenderOutcome::failed(err.message().to_string())
            }
        }
    }
}

/// Newest video under `root` whose file name contains `scene`
fn find_video(root: &Path, scene: &str) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                pending.push(path);
                continue;
            }
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e));
            let matches_scene = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(scene));
            if !(is_video && matches_scene) {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
                newest = Some((modified, path));
            }
        }
    }

    newest.map(|(_, path)| path)
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
