mod burner;

pub use burner::FfmpegBurner;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 把字幕烧录进画面
#[async_trait]
pub trait CaptionBurner: Send + Sync {
    /// 返回新生成的视频路径
    async fn burn_captions(&self, video_path: &Path, captions_path: &Path) -> Result<PathBuf>;
}
