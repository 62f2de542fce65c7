use super::Translator;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

const QWEN_TEXT_API: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

#[derive(Debug, Clone)]
pub struct QwenClient {
    api_key: String,
    api_url: String,
    model: String,
    client: Client,
}

impl QwenClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            api_key,
            api_url: QWEN_TEXT_API.to_string(),
            model: "qwen-plus".to_string(),
            client,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_prompt(text: &str) -> String {
        format!(
            r#"请把以下小红书/B站视频的文字翻译成自然流畅的英文。
保留原有的换行和话题标签（#...），表情符号原样保留。
只返回译文，不要任何解释。

原文：
{}"#,
            text
        )
    }
}

/// 模型偶尔会加上 markdown 代码块或引号，去掉它们
fn clean_completion(text: &str) -> String {
    let trimmed = text
        .trim()
        .trim_start_matches("```text")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[async_trait]
impl Translator for QwenClient {
    async fn translate(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        info!("Translating {} characters with Qwen...", text.chars().count());

        let request_body = json!({
            "model": self.model,
            "input": {
                "messages": [
                    {
                        "role": "user",
                        "content": Self::build_prompt(text)
                    }
                ]
            },
            "parameters": {
                "result_format": "message"
            }
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(PipelineError::TranslationError(format!(
                "Qwen API error: {}",
                error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await?;

        let generated_text = response_json["output"]["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                PipelineError::TranslationError("Failed to extract generated text".to_string())
            })?;
        debug!("Qwen translation: {}", generated_text);

        let translated = clean_completion(generated_text);
        if translated.is_empty() {
            return Err(PipelineError::TranslationError(
                "Qwen returned an empty translation".to_string(),
            ));
        }
        Ok(translated)
    }
}
