mod google;
mod qwen;

pub use google::GoogleTranslator;
pub use qwen::QwenClient;

use crate::error::Result;
use async_trait::async_trait;

/// 文本翻译成英文
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;
}
