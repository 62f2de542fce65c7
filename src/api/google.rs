use super::Translator;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const GOOGLE_TRANSLATE_API: &str = "https://translate.googleapis.com/translate_a/single";
/// 单次请求的字符上限
const MAX_CHUNK_CHARS: usize = 4500;

/// 免密钥的 Google 翻译接口，未配置 DashScope 时使用
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    api_url: String,
    target: String,
    client: Client,
}

impl GoogleTranslator {
    pub fn new(client: Client) -> Self {
        Self {
            api_url: GOOGLE_TRANSLATE_API.to_string(),
            target: "en".to_string(),
            client,
        }
    }

    async fn translate_chunk(&self, chunk: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", chunk),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::TranslationError(format!(
                "Google translate error {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await?;
        parse_response(&body)
    }
}

/// 响应形如 `[[["译文", "原文", ...], ...], ...]`
fn parse_response(body: &Value) -> Result<String> {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::TranslationError("unexpected response shape".to_string()))?;

    Ok(sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(Value::as_str))
        .collect())
}

/// 按行切分，单行过长时按字符硬切
fn chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let mut translated = String::new();
        for chunk in chunks(text, MAX_CHUNK_CHARS) {
            translated.push_str(&self.translate_chunk(&chunk).await?);
        }
        Ok(translated.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_translated_sentences() {
        let body = json!([
            [
                ["Cats are cute. ", "猫咪很可爱。", null, null, 10],
                ["Share today!", "今天分享！", null, null, 10]
            ],
            null,
            "zh-CN"
        ]);
        assert_eq!(parse_response(&body).unwrap(), "Cats are cute. Share today!");
    }

    #[test]
    fn rejects_unexpected_shape() {
        assert!(parse_response(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn splits_long_text_on_lines() {
        let text = "aaaa\nbbbb\ncc";
        assert_eq!(chunks(text, 10), vec!["aaaa\nbbbb\n", "cc"]);
        assert_eq!(chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunks("短文本", 10), vec!["短文本"]);
    }
}
