use super::CaptionBurner;
use crate::captions::srt;
use crate::error::{PipelineError, Result};
use crate::tool;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub struct FfmpegBurner {
    timeout: Duration,
    /// libass 的 force_style，例如 `FontName=Noto Sans CJK SC,FontSize=18`
    force_style: Option<String>,
}

impl FfmpegBurner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            force_style: None,
        }
    }

    pub fn with_force_style(mut self, style: Option<String>) -> Self {
        self.force_style = style.filter(|s| !s.trim().is_empty());
        self
    }

    /// subtitles 滤镜参数，ffmpeg 在视频所在目录运行，只需要文件名。
    /// 参数值先按滤镜选项转义，整段再按滤镜图转义。
    fn filter(&self, captions_file: &str) -> String {
        let mut filter = format!("subtitles={}", escape_option_value(captions_file));
        if let Some(style) = &self.force_style {
            filter.push_str(&format!(":force_style={}", escape_option_value(style)));
        }
        escape_filtergraph(&filter)
    }
}

/// 滤镜选项层：`\`、`'` 和选项分隔符 `:`
fn escape_option_value(value: &str) -> String {
    escape_chars(value, &['\\', '\'', ':'])
}

/// 滤镜图层：`\`、`'`、`[`、`]`、`,`、`;`
fn escape_filtergraph(description: &str) -> String {
    escape_chars(description, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn burned_path(video_path: &Path) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video_path.with_file_name(format!("{}_subbed.mp4", stem))
}

#[async_trait]
impl CaptionBurner for FfmpegBurner {
    async fn burn_captions(&self, video_path: &Path, captions_path: &Path) -> Result<PathBuf> {
        let captions = tokio::fs::read_to_string(captions_path).await?;
        if srt::parse(&captions).is_empty() {
            warn!(
                "{} has no cues, keeping the original video",
                captions_path.display()
            );
            return Ok(video_path.to_path_buf());
        }

        info!("Burning subtitles into {}...", video_path.display());

        let work_dir = video_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = |p: &Path| -> Result<String> {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PipelineError::BurnInError(format!("invalid path {}", p.display())))
        };
        let input_name = file_name(video_path)?;
        let captions_name = if captions_path.parent() == video_path.parent() {
            file_name(captions_path)?
        } else {
            captions_path.to_string_lossy().into_owned()
        };
        let output_path = burned_path(video_path);
        let output_name = file_name(&output_path)?;
        let filter = self.filter(&captions_name);

        let output = tool::run(
            "ffmpeg",
            [
                "-y",
                "-i",
                input_name.as_str(),
                "-vf",
                filter.as_str(),
                "-c:a",
                "copy",
                output_name.as_str(),
            ],
            Some(work_dir),
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            tokio::fs::remove_file(&output_path).await.ok();
            return Err(PipelineError::BurnInError(format!(
                "FFmpeg burn-in failed: {}",
                tool::stderr_tail(&output)
            )));
        }

        info!("Burned subtitles: {}", output_path.display());
        Ok(output_path)
    }
}
