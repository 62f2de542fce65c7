use crate::item::VideoMetadata;

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;
pub const MAX_TAGS_CHARS: usize = 500;

/// 标题和描述的英文译文
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub title: String,
    pub description: String,
}

/// 最终上传使用的双语元数据
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// 生成上传用的标题、描述和标签；没有译文时保留原文并在标题后标注字幕
pub fn compose(
    original: &VideoMetadata,
    translation: Option<&Translation>,
    default_tags: &[String],
) -> PublishMetadata {
    let (title, description) = match translation {
        Some(t) => (
            format!("{} | {}", original.title.trim(), t.title.trim()),
            format!(
                "{}\n\n--- English Translation ---\n{}\n\nOriginal: {}",
                original.description.trim(),
                t.description.trim(),
                original.url
            ),
        ),
        None => (
            format!("{} [Eng Sub]", original.title.trim()),
            format!("{}\n\nOriginal: {}", original.description.trim(), original.url),
        ),
    };

    PublishMetadata {
        title: truncate_chars(&strip_angle_brackets(&title), MAX_TITLE_CHARS),
        description: truncate_chars(&strip_angle_brackets(&description), MAX_DESCRIPTION_CHARS),
        tags: merge_tags(&original.tags, default_tags),
    }
}

/// 上传平台拒绝标题和描述中的尖括号
fn strip_angle_brackets(text: &str) -> String {
    text.chars().filter(|c| *c != '<' && *c != '>').collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// 条目自带标签在前，默认标签在后；忽略大小写去重，总长度不超过上限
fn merge_tags(item_tags: &[String], default_tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut total = 0;
    let mut tags = Vec::new();

    for tag in item_tags.iter().chain(default_tags) {
        let tag = strip_angle_brackets(tag.trim().trim_start_matches('#'));
        if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
            continue;
        }
        let len = tag.chars().count();
        if total + len > MAX_TAGS_CHARS {
            break;
        }
        total += len;
        tags.push(tag);
    }
    tags
}
