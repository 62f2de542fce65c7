use crate::error::{PipelineError, Result};
use crate::history::DEFAULT_THRESHOLD;
use crate::upload::{OAuthCredentials, PrivacyStatus};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// 本地整理好的视频目录
    Local,
    /// 远程目录列表
    Remote,
    /// 创作者频道（yt-dlp）
    Channel,
}

#[derive(Parser, Debug)]
#[command(name = "auto-reshare")]
#[command(
    about = "Re-publish short videos with English captions and bilingual metadata",
    long_about = None
)]
pub struct Args {
    /// Where to take videos from
    #[arg(long, value_enum, default_value = "local")]
    pub source: SourceKind,

    /// Root folder with one subfolder per video (local source)
    #[arg(long, env = "LOCAL_VIDEO_DIR", default_value = "videos")]
    pub videos_dir: PathBuf,

    /// Directory listing URL (remote source)
    #[arg(long, env = "REMOTE_VIDEO_URL")]
    pub remote_url: Option<String>,

    /// Creator channel URL (channel source)
    #[arg(long, env = "CHANNEL_URL")]
    pub channel_url: Option<String>,

    /// Working directory for downloaded videos
    #[arg(long, default_value = "downloads")]
    pub download_dir: PathBuf,

    /// History ledger file
    #[arg(long, default_value = "history.json")]
    pub history: PathBuf,

    /// Maximum number of videos handled per run
    #[arg(short, long, default_value_t = 1)]
    pub limit: usize,

    /// Title similarity at or above which a video counts as a duplicate
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,

    /// Privacy status of uploaded videos
    #[arg(long, value_enum, default_value = "public")]
    pub privacy: PrivacyStatus,

    /// Run every stage except upload and history updates
    #[arg(long)]
    pub dry_run: bool,

    /// Create a sample folder under the videos dir and exit
    #[arg(long, value_name = "NAME")]
    pub create_sample: Option<String>,

    /// How many of the newest channel videos to look at
    #[arg(long, default_value_t = 10)]
    pub scan_window: usize,

    /// Tags added to every upload
    #[arg(long, value_delimiter = ',', default_value = "xiaohongshu,automation")]
    pub tags: Vec<String>,

    /// Speech model used for captions
    #[arg(long, default_value = "whisper-1")]
    pub whisper_model: String,

    /// Qwen model used when DASHSCOPE_API_KEY is set
    #[arg(long, default_value = "qwen-plus")]
    pub qwen_model: String,

    /// ASS style override for burned-in captions, e.g. "FontSize=20"
    #[arg(long)]
    pub force_style: Option<String>,

    /// Timeout for HTTP requests, in seconds
    #[arg(long, default_value_t = 600)]
    pub http_timeout: u64,

    /// Timeout for ffmpeg / yt-dlp runs, in seconds
    #[arg(long, default_value_t = 1800)]
    pub tool_timeout: u64,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_API_BASE")]
    pub openai_api_base: Option<String>,

    /// Enables Qwen translation instead of Google translate
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub dashscope_api_key: Option<String>,

    /// Contents of the Google OAuth client secrets JSON
    #[arg(long, env = "YOUTUBE_CLIENT_SECRET", hide_env_values = true)]
    pub youtube_client_secret: Option<String>,

    #[arg(long, env = "YOUTUBE_REFRESH_TOKEN", hide_env_values = true)]
    pub youtube_refresh_token: Option<String>,
}

/// 已选定的视频来源及其参数
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Local { videos_dir: PathBuf },
    Remote { url: String },
    Channel { url: String, scan_window: usize },
}

/// 校验后的运行配置
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub download_dir: PathBuf,
    pub history_path: PathBuf,
    pub limit: usize,
    pub threshold: f64,
    pub privacy: PrivacyStatus,
    pub dry_run: bool,
    pub default_tags: Vec<String>,
    pub whisper_model: String,
    pub qwen_model: String,
    pub force_style: Option<String>,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub dashscope_api_key: Option<String>,
    /// dry-run 时为 None
    pub youtube: Option<OAuthCredentials>,
    pub http_timeout: Duration,
    pub tool_timeout: Duration,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value)
        .ok_or_else(|| PipelineError::ConfigError(format!("{} is not set", name)))
}

impl Config {
    /// 在开始任何工作之前校验参数，缺少必需项直接报错
    pub fn from_args(args: Args) -> Result<Self> {
        if args.limit == 0 {
            return Err(PipelineError::ConfigError(
                "--limit must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&args.threshold) {
            return Err(PipelineError::ConfigError(format!(
                "--threshold must be between 0 and 1, got {}",
                args.threshold
            )));
        }
        if args.http_timeout == 0 || args.tool_timeout == 0 {
            return Err(PipelineError::ConfigError(
                "timeouts must be positive".to_string(),
            ));
        }

        let source = match args.source {
            SourceKind::Local => SourceConfig::Local {
                videos_dir: args.videos_dir,
            },
            SourceKind::Remote => SourceConfig::Remote {
                url: required(args.remote_url, "REMOTE_VIDEO_URL (--remote-url)")?,
            },
            SourceKind::Channel => {
                if args.scan_window == 0 {
                    return Err(PipelineError::ConfigError(
                        "--scan-window must be at least 1".to_string(),
                    ));
                }
                SourceConfig::Channel {
                    url: required(args.channel_url, "CHANNEL_URL (--channel-url)")?,
                    scan_window: args.scan_window,
                }
            }
        };

        let openai_api_key = required(args.openai_api_key, "OPENAI_API_KEY")?;

        let youtube = if args.dry_run {
            None
        } else {
            let secrets = required(args.youtube_client_secret, "YOUTUBE_CLIENT_SECRET")?;
            let refresh_token = required(args.youtube_refresh_token, "YOUTUBE_REFRESH_TOKEN")?;
            Some(OAuthCredentials::from_client_secrets(&secrets, &refresh_token)?)
        };

        Ok(Self {
            source,
            download_dir: args.download_dir,
            history_path: args.history,
            limit: args.limit,
            threshold: args.threshold,
            privacy: args.privacy,
            dry_run: args.dry_run,
            default_tags: args
                .tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            whisper_model: args.whisper_model,
            qwen_model: args.qwen_model,
            force_style: non_empty(args.force_style),
            openai_api_key,
            openai_api_base: non_empty(args.openai_api_base),
            dashscope_api_key: non_empty(args.dashscope_api_key),
            youtube,
            http_timeout: Duration::from_secs(args.http_timeout),
            tool_timeout: Duration::from_secs(args.tool_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRETS: &str = r#"{"installed": {"client_id": "id", "client_secret": "secret"}}"#;

    fn parse(extra: &[&str]) -> Result<Config> {
        let mut argv = vec!["auto-reshare", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn dry_run_needs_no_youtube_credentials() {
        let config = parse(&["--dry-run", "--videos-dir", "my-videos"]).unwrap();
        assert!(config.dry_run);
        assert!(config.youtube.is_none());
        assert_eq!(
            config.source,
            SourceConfig::Local {
                videos_dir: PathBuf::from("my-videos")
            }
        );
        assert_eq!(config.limit, 1);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.default_tags, vec!["xiaohongshu", "automation"]);
        assert_eq!(config.tool_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn upload_requires_youtube_credentials() {
        let err = parse(&["--youtube-client-secret", SECRETS]).unwrap_err();
        assert!(err.to_string().contains("YOUTUBE_REFRESH_TOKEN"));

        let config = parse(&[
            "--youtube-client-secret",
            SECRETS,
            "--youtube-refresh-token",
            "rt",
            "--privacy",
            "unlisted",
        ])
        .unwrap();
        assert_eq!(config.youtube.unwrap().client_id, "id");
        assert_eq!(config.privacy, PrivacyStatus::Unlisted);
    }

    #[test]
    fn source_specific_settings() {
        let err = parse(&["--dry-run", "--source", "remote"]).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));

        let config = parse(&[
            "--dry-run",
            "--source",
            "channel",
            "--channel-url",
            "https://space.bilibili.com/1",
            "--scan-window",
            "5",
        ])
        .unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Channel {
                url: "https://space.bilibili.com/1".to_string(),
                scan_window: 5
            }
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--dry-run", "--limit", "0"]).is_err());
        assert!(parse(&["--dry-run", "--threshold", "1.5"]).is_err());
        assert!(parse(&["--dry-run", "--tool-timeout", "0"]).is_err());
    }

    #[test]
    fn custom_tags_are_trimmed() {
        let config = parse(&["--dry-run", "--tags", " cats, ,pets"]).unwrap();
        assert_eq!(config.default_tags, vec!["cats", "pets"]);
    }
}
