pub mod srt;
mod whisper;

pub use whisper::WhisperCaptioner;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 语音识别并翻译成英文字幕
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// 为视频生成英文 SRT 字幕，返回字幕文件路径
    async fn generate(&self, video_path: &Path) -> Result<PathBuf>;
}
