mod youtube;

pub use youtube::{OAuthCredentials, YouTubeUploader};

use crate::error::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        };
        f.write_str(s)
    }
}

/// 一次上传所需的全部信息
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub video_path: &'a Path,
    pub title: &'a str,
    pub description: &'a str,
    pub tags: &'a [String],
    pub privacy: PrivacyStatus,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// 上传成功后返回平台上的视频 id
    async fn upload(&self, request: &UploadRequest<'_>) -> Result<String>;
}
