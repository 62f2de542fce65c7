use super::local::find_video_file;
use super::{claim_folder_name, discard_folder, fresh_folder};
use crate::error::{PipelineError, Result};
use crate::item::{safe_folder_name, CandidateItem, VideoMetadata, METADATA_FILE};
use crate::tool;
use indexmap::IndexSet;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const YT_DLP: &str = "yt-dlp";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com/";
const FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
const MAX_FILESIZE: &str = "500M";

/// 频道列表中的一个视频
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
}

impl ChannelEntry {
    fn page_url(&self) -> String {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .filter(|u| u.starts_with("http"))
            .unwrap_or_else(|| format!("https://www.bilibili.com/video/{}", self.id))
    }

    /// 没有标题时用视频 id 代替，保证标题之间仍可区分
    fn to_metadata(&self) -> VideoMetadata {
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.id.as_str());
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(title);

        let mut metadata = VideoMetadata::new(title, description, self.page_url());
        metadata.author = self.uploader.clone().filter(|u| !u.is_empty());
        if self.id.starts_with("BV") {
            metadata.bv_id = Some(self.id.clone());
        }
        metadata
    }
}

#[derive(Debug, Deserialize)]
struct Playlist {
    #[serde(default)]
    entries: Vec<Option<serde_json::Value>>,
}

/// 解析 `yt-dlp --dump-single-json` 的输出，保留平台给出的顺序
pub fn parse_playlist(json: &str) -> Result<Vec<ChannelEntry>> {
    let playlist: Playlist = serde_json::from_str(json)?;
    Ok(playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|value| serde_json::from_value::<ChannelEntry>(value).ok())
        .filter(|entry| !entry.id.trim().is_empty())
        .collect())
}

/// 通过 yt-dlp 抓取创作者频道的最新视频
pub struct ChannelSource {
    channel_url: String,
    download_dir: PathBuf,
    scan_window: usize,
    timeout: Duration,
}

impl ChannelSource {
    pub fn new(
        channel_url: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        scan_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            channel_url: channel_url.into(),
            download_dir: download_dir.into(),
            scan_window,
            timeout,
        }
    }

    fn header_args() -> [String; 4] {
        [
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
            "--referer".to_string(),
            REFERER.to_string(),
        ]
    }

    pub async fn list_entries(&self) -> Result<Vec<ChannelEntry>> {
        info!(
            "Fetching latest {} videos from {}",
            self.scan_window, self.channel_url
        );
        let mut args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--playlist-end".to_string(),
            self.scan_window.to_string(),
        ];
        args.extend(Self::header_args());
        args.push(self.channel_url.clone());

        let output = tool::run(YT_DLP, &args, None, self.timeout).await?;
        if !output.status.success() {
            return Err(PipelineError::SourceError(format!(
                "yt-dlp listing failed: {}",
                tool::stderr_tail(&output)
            )));
        }

        let mut entries = parse_playlist(&String::from_utf8_lossy(&output.stdout))?;
        entries.truncate(self.scan_window);
        info!("Found {} channel videos", entries.len());
        Ok(entries)
    }

    async fn download(&self, entry: &ChannelEntry, folder: &Path) -> Result<PathBuf> {
        fresh_folder(folder).await?;

        let template = folder.join("video.%(ext)s");
        let mut args = vec![
            "-f".to_string(),
            FORMAT.to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--max-filesize".to_string(),
            MAX_FILESIZE.to_string(),
            "--no-playlist".to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
        ];
        args.extend(Self::header_args());
        args.push(entry.page_url());

        info!("Downloading video: {} - {}", entry.id, entry.title.as_deref().unwrap_or(""));
        let output = tool::run(YT_DLP, &args, None, self.timeout).await?;
        if !output.status.success() {
            return Err(PipelineError::SourceError(format!(
                "yt-dlp download failed: {}",
                tool::stderr_tail(&output)
            )));
        }

        // --max-filesize 超限时 yt-dlp 仍然返回成功，但不会留下文件
        find_video_file(folder).await.ok_or_else(|| {
            PipelineError::SourceError(format!("No video file produced for {}", entry.id))
        })
    }

    async fn prepare(&self, entry: &ChannelEntry, folder: &Path) -> Result<CandidateItem> {
        let video_path = self.download(entry, folder).await?;
        let metadata = entry.to_metadata();
        metadata.write_to(&folder.join(METADATA_FILE)).await?;

        Ok(CandidateItem {
            id: entry.id.clone(),
            video_path,
            folder: folder.to_path_buf(),
            metadata,
            disposable: true,
        })
    }

    pub async fn enumerate_candidates(
        &self,
        exclude: &IndexSet<String>,
        limit: usize,
    ) -> Vec<CandidateItem> {
        let entries = match self.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list channel videos: {}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        let mut used_folders = HashSet::new();
        for entry in entries {
            if candidates.len() >= limit {
                break;
            }
            if exclude.contains(&entry.id) {
                debug!("Skipping processed: {}", entry.id);
                continue;
            }

            let safe_name = safe_folder_name(&entry.id);
            if safe_name.is_empty() {
                warn!("Cannot derive a folder name from {:?}, skipping", entry.id);
                continue;
            }

            let folder = self
                .download_dir
                .join(claim_folder_name(&mut used_folders, &safe_name));
            match self.prepare(&entry, &folder).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    error!("Error downloading video {}: {}", entry.id, e);
                    discard_folder(&folder).await;
                }
            }
        }

        candidates
    }
}
