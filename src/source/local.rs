use crate::error::Result;
use crate::item::{CandidateItem, VideoMetadata, METADATA_FILE, VIDEO_FILE};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

/// 扫描本地目录：每个子目录包含一个视频和 metadata.json
pub struct LocalSource {
    videos_dir: PathBuf,
}

impl LocalSource {
    pub fn new(videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
        }
    }

    /// 包含视频和 metadata.json 的子目录，按目录名排序
    async fn video_folders(&self) -> Vec<(String, PathBuf, PathBuf)> {
        let mut entries = match tokio::fs::read_dir(&self.videos_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Videos directory {} is not readable: {}",
                    self.videos_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut folders = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();

            let metadata_path = path.join(METADATA_FILE);
            let has_metadata = tokio::fs::metadata(&metadata_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            match find_video_file(&path).await {
                Some(video_path) if has_metadata => folders.push((name, path, video_path)),
                _ => debug!("Skipping invalid folder: {}", name),
            }
        }

        folders.sort_by(|a, b| a.0.cmp(&b.0));
        folders
    }

    pub async fn enumerate_candidates(
        &self,
        exclude: &IndexSet<String>,
        limit: usize,
    ) -> Vec<CandidateItem> {
        let mut candidates = Vec::new();

        for (name, folder, video_path) in self.video_folders().await {
            if candidates.len() >= limit {
                break;
            }
            if exclude.contains(&name) {
                debug!("Skipping processed video: {}", name);
                continue;
            }

            match VideoMetadata::from_file(&folder.join(METADATA_FILE)).await {
                Ok(metadata) => {
                    info!("Found unprocessed video: {} - {}", name, metadata.title);
                    candidates.push(CandidateItem {
                        id: name,
                        video_path,
                        folder,
                        metadata,
                        disposable: false,
                    });
                }
                Err(e) => error!("Invalid metadata in {}: {}", name, e),
            }
        }

        candidates
    }

    /// 创建一个示例目录：metadata.json 模板加说明文件
    pub async fn create_sample(&self, folder_name: &str) -> Result<PathBuf> {
        let sample_path = self.videos_dir.join(folder_name);
        tokio::fs::create_dir_all(&sample_path).await?;

        VideoMetadata::template()
            .write_to(&sample_path.join(METADATA_FILE))
            .await?;
        tokio::fs::write(
            sample_path.join("README.txt"),
            format!(
                "Place your downloaded {} file here\n\
                 Edit {} with the video's Chinese title and description\n",
                VIDEO_FILE, METADATA_FILE
            ),
        )
        .await?;

        info!("Created sample folder: {}", sample_path.display());
        Ok(sample_path)
    }
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
        .unwrap_or(false)
}

/// 优先 video.mp4，否则按文件名取第一个视频文件；跳过之前生成的 *_subbed 文件
pub(crate) async fn find_video_file(folder: &Path) -> Option<PathBuf> {
    let preferred = folder.join(VIDEO_FILE);
    if tokio::fs::metadata(&preferred)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return Some(preferred);
    }

    let mut entries = tokio::fs::read_dir(folder).await.ok()?;
    let mut videos = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let generated = path
            .file_stem()
            .map(|s| s.to_string_lossy().ends_with("_subbed"))
            .unwrap_or(false);
        if is_file && !generated && is_video_file(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    videos.into_iter().next()
}
