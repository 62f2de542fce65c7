use super::srt::{self, Cue};
use super::CaptionGenerator;
use crate::error::{PipelineError, Result};
use crate::tool;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    start: f64,
    end: f64,
    text: String,
}

/// 通过 Whisper 翻译接口把中文语音直接转成英文字幕
#[derive(Debug, Clone)]
pub struct WhisperCaptioner {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
    tool_timeout: Duration,
}

impl WhisperCaptioner {
    pub fn new(api_key: String, model: String, client: Client, tool_timeout: Duration) -> Self {
        Self {
            api_key,
            api_base: OPENAI_API_BASE.to_string(),
            model,
            client,
            tool_timeout,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// 抽取 16kHz 单声道音频，控制上传体积
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        let output = tool::run(
            "ffmpeg",
            [
                OsStr::new("-y"),
                OsStr::new("-i"),
                video_path.as_os_str(),
                OsStr::new("-vn"),
                OsStr::new("-ac"),
                OsStr::new("1"),
                OsStr::new("-ar"),
                OsStr::new("16000"),
                OsStr::new("-b:a"),
                OsStr::new("64k"),
                audio_path.as_os_str(),
            ],
            None,
            self.tool_timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(PipelineError::CaptionError(format!(
                "FFmpeg audio extraction failed: {}",
                tool::stderr_tail(&output)
            )));
        }
        Ok(())
    }

    async fn translate_audio(&self, audio_path: &Path) -> Result<Vec<Segment>> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(format!("{}/audio/translations", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::CaptionError(format!(
                "Whisper API error {}: {}",
                status, error_text
            )));
        }

        let transcription: VerboseTranscription = response.json().await?;
        Ok(transcription.segments)
    }
}

fn segments_to_cues(segments: &[Segment]) -> Vec<Cue> {
    segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| Cue {
            start_ms: srt::seconds_to_ms(s.start),
            end_ms: srt::seconds_to_ms(s.end),
            text: s.text.trim().to_string(),
        })
        .collect()
}

#[async_trait]
impl CaptionGenerator for WhisperCaptioner {
    async fn generate(&self, video_path: &Path) -> Result<PathBuf> {
        info!("Transcribing {}...", video_path.display());

        let audio_path = video_path.with_extension("caption.mp3");
        self.extract_audio(video_path, &audio_path).await?;
        let segments = self.translate_audio(&audio_path).await;
        tokio::fs::remove_file(&audio_path).await.ok();
        let cues = segments_to_cues(&segments?);

        if cues.is_empty() {
            warn!("No speech found in {}", video_path.display());
        }

        let srt_path = video_path.with_extension("srt");
        tokio::fs::write(&srt_path, srt::render(&cues)).await?;
        info!("Generated subtitles: {} ({} cues)", srt_path.display(), cues.len());
        Ok(srt_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbose_json_and_drops_blank_segments() {
        let body = r#"{
            "task": "translate",
            "language": "chinese",
            "duration": 4.2,
            "text": "Hello. The cat is cute.",
            "segments": [
                {"id": 0, "start": 0.0, "end": 1.5, "text": " Hello."},
                {"id": 1, "start": 1.5, "end": 2.0, "text": "   "},
                {"id": 2, "start": 2.0, "end": 4.2, "text": " The cat is cute."}
            ]
        }"#;
        let parsed: VerboseTranscription = serde_json::from_str(body).unwrap();
        let cues = segments_to_cues(&parsed.segments);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello.");
        assert_eq!(cues[1].start_ms, 2000);
        assert_eq!(cues[1].end_ms, 4200);
        assert_eq!(cues[1].text, "The cat is cute.");
    }

    #[test]
    fn missing_segments_means_no_cues() {
        let parsed: VerboseTranscription = serde_json::from_str(r#"{"text": ""}"#).unwrap();
        assert!(segments_to_cues(&parsed.segments).is_empty());
    }
}
