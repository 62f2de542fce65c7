use super::{UploadRequest, Uploader};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::info;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
/// People & Blogs
const CATEGORY_ID: &str = "22";

/// 用 refresh token 换取 access token 所需的凭据
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl OAuthCredentials {
    /// `client_secrets` 为 Google Cloud 下载的 JSON，
    /// 客户端信息可以在 `installed`、`web` 下或者直接位于顶层
    pub fn from_client_secrets(client_secrets: &str, refresh_token: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(client_secrets).map_err(|e| {
            PipelineError::ConfigError(format!("Invalid JSON in YOUTUBE_CLIENT_SECRET: {}", e))
        })?;
        let section = value
            .get("installed")
            .or_else(|| value.get("web"))
            .unwrap_or(&value);

        let field = |name: &str| -> Result<String> {
            section
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    PipelineError::ConfigError(format!(
                        "YOUTUBE_CLIENT_SECRET is missing '{}'",
                        name
                    ))
                })
        };

        if refresh_token.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "YOUTUBE_REFRESH_TOKEN is empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: field("client_id")?,
            client_secret: field("client_secret")?,
            refresh_token: refresh_token.trim().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

pub struct YouTubeUploader {
    credentials: OAuthCredentials,
    client: Client,
}

impl YouTubeUploader {
    pub fn new(credentials: OAuthCredentials, client: Client) -> Self {
        Self {
            credentials,
            client,
        }
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadError(format!(
                "Failed to refresh YouTube access token: {}",
                error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

fn video_resource(request: &UploadRequest<'_>) -> Value {
    json!({
        "snippet": {
            "title": request.title,
            "description": request.description,
            "tags": request.tags,
            "categoryId": CATEGORY_ID
        },
        "status": {
            "privacyStatus": request.privacy,
            "selfDeclaredMadeForKids": false
        }
    })
}

/// 以流的形式读取视频文件，同时返回文件大小
async fn video_body(path: &Path) -> Result<(Body, u64)> {
    let size = tokio::fs::metadata(path).await?.len();
    let file = tokio::fs::File::open(path).await?;
    Ok((Body::wrap_stream(ReaderStream::new(file)), size))
}

#[async_trait]
impl Uploader for YouTubeUploader {
    async fn upload(&self, request: &UploadRequest<'_>) -> Result<String> {
        let (body, size) = video_body(request.video_path).await?;
        let access_token = self.access_token().await?;

        info!(
            "Uploading {} ({} bytes) to YouTube...",
            request.video_path.display(),
            size
        );

        // 1. 创建可续传上传会话
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&video_resource(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadError(format!(
                "Upload session rejected: {}",
                error_text
            )));
        }

        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::UploadError("No Location header in upload session".to_string())
            })?;

        // 2. 上传视频内容
        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&access_token)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadError(format!(
                "Video upload failed ({}): {}",
                status, error_text
            )));
        }

        let resource: VideoResource = response.json().await?;
        info!("Upload complete! Video ID: {}", resource.id);
        Ok(resource.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::PrivacyStatus;
    use tempfile::tempdir;

    #[test]
    fn reads_installed_web_and_flat_secrets() {
        let installed = r#"{"installed": {"client_id": "id1", "client_secret": "s1"}}"#;
        let web = r#"{"web": {"client_id": "id2", "client_secret": "s2"}}"#;
        let flat = r#"{"client_id": "id3", "client_secret": "s3"}"#;

        let creds = OAuthCredentials::from_client_secrets(installed, "rt").unwrap();
        assert_eq!((creds.client_id.as_str(), creds.client_secret.as_str()), ("id1", "s1"));
        assert_eq!(OAuthCredentials::from_client_secrets(web, "rt").unwrap().client_id, "id2");
        assert_eq!(OAuthCredentials::from_client_secrets(flat, "rt").unwrap().client_id, "id3");
    }

    #[test]
    fn rejects_bad_secrets() {
        assert!(matches!(
            OAuthCredentials::from_client_secrets("{not json", "rt"),
            Err(PipelineError::ConfigError(_))
        ));
        assert!(OAuthCredentials::from_client_secrets(r#"{"installed": {}}"#, "rt").is_err());
        assert!(OAuthCredentials::from_client_secrets(
            r#"{"client_id": "a", "client_secret": "b"}"#,
            " "
        )
        .is_err());
    }

    #[test]
    fn builds_video_resource() {
        let tags = vec!["xiaohongshu".to_string()];
        let request = UploadRequest {
            video_path: Path::new("video.mp4"),
            title: "猫咪 | Cute cat",
            description: "desc",
            tags: &tags,
            privacy: PrivacyStatus::Unlisted,
        };
        let body = video_resource(&request);
        assert_eq!(body["snippet"]["title"], "猫咪 | Cute cat");
        assert_eq!(body["snippet"]["tags"][0], "xiaohongshu");
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["status"]["privacyStatus"], "unlisted");
        assert_eq!(body["status"]["selfDeclaredMadeForKids"], false);
    }

    #[tokio::test]
    async fn video_body_streams_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        tokio::fs::write(&path, vec![7u8; 4096]).await.unwrap();

        let (body, size) = video_body(&path).await.unwrap();
        assert_eq!(size, 4096);
        // 流式 body 不持有整段字节
        assert!(body.as_bytes().is_none());

        assert!(matches!(
            video_body(&dir.path().join("missing.mp4")).await,
            Err(PipelineError::IoError(_))
        ));
    }
}
