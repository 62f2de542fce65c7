use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";
pub const VIDEO_FILE: &str = "video.mp4";

/// 视频附带的 metadata.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// 原始（中文）标题
    pub title: String,
    /// 原始描述
    pub description: String,
    /// 原视频链接
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bv_id: Option<String>,
}

impl VideoMetadata {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            url: url.into(),
            author: None,
            tags: Vec::new(),
            bv_id: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// 解析并校验；缺字段、类型错误或必填字段为空都会报错
    pub fn parse(content: &str) -> Result<Self> {
        let metadata: Self = serde_json::from_str(content)
            .map_err(|e| PipelineError::MetadataError(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::MetadataError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("url", &self.url),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::MetadataError(format!(
                    "field '{}' must be a non-empty string",
                    field
                )));
            }
        }
        Ok(())
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// 手动整理视频目录时使用的模板
    pub fn template() -> Self {
        Self {
            title: "视频标题 (Chinese Title)".to_string(),
            description: "视频描述 (Chinese Description)".to_string(),
            url: "https://www.xiaohongshu.com/explore/xxxxx".to_string(),
            author: Some("作者名 (Optional)".to_string()),
            tags: vec!["标签1".to_string(), "标签2".to_string(), "标签3".to_string()],
            bv_id: None,
        }
    }
}

/// 一个待处理的视频
#[derive(Debug, Clone)]
pub struct CandidateItem {
    /// 写入历史记录的 id
    pub id: String,
    pub video_path: PathBuf,
    /// 视频和中间文件所在目录
    pub folder: PathBuf,
    pub metadata: VideoMetadata,
    /// 目录由程序创建，处理结束后删除
    pub disposable: bool,
}

/// 只保留字母、数字和空格，并去掉末尾空白
pub fn safe_folder_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim_end()
        .to_string()
}
