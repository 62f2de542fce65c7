mod similarity;

pub use similarity::{check_similarity, SimilarMatch, DEFAULT_THRESHOLD};

use crate::error::Result;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 已处理条目保留的元数据，用于后续标题相似度比对
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMetadata {
    pub title: String,
    #[serde(default)]
    pub url: String,
}

impl ProcessedMetadata {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// 持久化的处理历史
///
/// 两个集合都保持插入顺序：相似度检查按最早处理的顺序遍历 `processed_metadata`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub downloaded_ids: IndexSet<String>,
    #[serde(default)]
    pub processed_metadata: IndexMap<String, ProcessedMetadata>,
}

impl HistoryRecord {
    pub fn is_processed(&self, id: &str) -> bool {
        self.downloaded_ids.contains(id)
    }

    /// 记录 `id`，提供 `metadata` 时覆盖写入；有任何变化时返回 true
    pub fn mark(&mut self, id: &str, metadata: Option<ProcessedMetadata>) -> bool {
        let mut changed = self.downloaded_ids.insert(id.to_string());
        if let Some(metadata) = metadata {
            let previous = self.processed_metadata.insert(id.to_string(), metadata.clone());
            changed |= previous.as_ref() != Some(&metadata);
        }
        changed
    }

    /// 元数据中的每个 id 都必须出现在 `downloaded_ids` 中，返回补上的 id
    fn repair(&mut self) -> Vec<String> {
        let missing: Vec<String> = self
            .processed_metadata
            .keys()
            .filter(|id| !self.downloaded_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &missing {
            self.downloaded_ids.insert(id.clone());
        }
        missing
    }
}

/// 基于文件的已处理条目账本
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    record: HistoryRecord,
}

impl HistoryLedger {
    /// 从 `path` 加载账本，文件缺失或无法读取时从空记录开始
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = Self::load(&path);
        Self { path, record }
    }

    /// 不会失败：文件缺失或损坏时返回空记录
    pub fn load(path: &Path) -> HistoryRecord {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No history at {}, starting fresh", path.display());
                return HistoryRecord::default();
            }
            Err(e) => {
                warn!("Failed to read {}: {}. Starting fresh.", path.display(), e);
                return HistoryRecord::default();
            }
        };

        let mut record: HistoryRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("{} is corrupted ({}). Starting fresh.", path.display(), e);
                return HistoryRecord::default();
            }
        };

        let repaired = record.repair();
        if !repaired.is_empty() {
            warn!(
                "History had metadata for {} unknown id(s), added them: {:?}",
                repaired.len(),
                repaired
            );
        }

        debug!(
            "Loaded history: {} ids, {} metadata entries",
            record.downloaded_ids.len(),
            record.processed_metadata.len()
        );
        record
    }

    /// 先写同目录临时文件再重命名覆盖，写入中途崩溃时保留旧版本
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.record.serialize(&mut serializer)?;
        buf.push(b'\n');

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.record.is_processed(id)
    }

    /// 对 id 集合幂等；提供 `metadata` 时总是覆盖写入，随后立即落盘
    pub fn mark_processed(&mut self, id: &str, metadata: Option<ProcessedMetadata>) -> Result<()> {
        self.record.mark(id, metadata);
        self.save()?;
        info!("Marked {} as processed", id);
        Ok(())
    }

    pub fn record(&self) -> &HistoryRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty_default() {
        let dir = tempdir().unwrap();
        let ledger = HistoryLedger::open(dir.path().join("history.json"));
        assert_eq!(ledger.record(), &HistoryRecord::default());
    }

    #[test]
    fn corrupt_file_loads_empty_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ \"downloaded_ids\": [\"a\", ").unwrap();

        let record = HistoryLedger::load(&path);
        assert!(record.downloaded_ids.is_empty());
        assert!(record.processed_metadata.is_empty());
    }

    #[test]
    fn wrong_shape_loads_empty_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert_eq!(HistoryLedger::load(&path), HistoryRecord::default());
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut ledger = HistoryLedger::open(dir.path().join("history.json"));

        assert!(!ledger.is_processed("note-1"));
        ledger.mark_processed("note-1", None).unwrap();
        assert!(ledger.is_processed("note-1"));
        ledger.mark_processed("note-1", None).unwrap();
        assert!(ledger.is_processed("note-1"));
        assert_eq!(ledger.record().downloaded_ids.len(), 1);
    }

    #[test]
    fn ids_only_grow() {
        let dir = tempdir().unwrap();
        let mut ledger = HistoryLedger::open(dir.path().join("history.json"));

        let mut previous = 0;
        for id in ["b", "a", "b", "c", "a"] {
            ledger
                .mark_processed(id, Some(ProcessedMetadata::new(id, "")))
                .unwrap();
            let len = ledger.record().downloaded_ids.len();
            assert!(len >= previous);
            previous = len;
        }
        let ids: Vec<&str> = ledger.record().downloaded_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn metadata_is_upserted_for_known_ids() {
        let dir = tempdir().unwrap();
        let mut ledger = HistoryLedger::open(dir.path().join("history.json"));

        ledger.mark_processed("x", None).unwrap();
        assert!(ledger.record().processed_metadata.get("x").is_none());

        ledger
            .mark_processed("x", Some(ProcessedMetadata::new("旧标题", "https://a")))
            .unwrap();
        ledger
            .mark_processed("x", Some(ProcessedMetadata::new("新标题", "https://b")))
            .unwrap();

        let meta = &ledger.record().processed_metadata["x"];
        assert_eq!(meta.title, "新标题");
        assert_eq!(meta.url, "https://b");
        assert_eq!(ledger.record().downloaded_ids.len(), 1);
    }

    #[test]
    fn save_then_load_is_a_fixed_point() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut ledger = HistoryLedger::open(&path);
        ledger
            .mark_processed("a", Some(ProcessedMetadata::new("猫咪很可爱的视频", "https://x/a")))
            .unwrap();
        ledger.mark_processed("b", None).unwrap();

        let first = fs::read_to_string(&path).unwrap();
        let reopened = HistoryLedger::open(&path);
        assert_eq!(reopened.record(), ledger.record());
        reopened.save().unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn saved_file_is_readable_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.json");
        let mut ledger = HistoryLedger::open(&path);
        ledger
            .mark_processed("a", Some(ProcessedMetadata::new("今天的美食分享", "u")))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("今天的美食分享"));
        assert!(content.contains("\n    \"downloaded_ids\""));
        assert!(!dir.path().join("state").join("history.json.tmp").exists());

        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["downloaded_ids"], serde_json::json!(["a"]));
        assert_eq!(value["processed_metadata"]["a"]["url"], "u");
    }

    #[test]
    fn legacy_file_without_metadata_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, r#"{"downloaded_ids": ["a", "b", "a"]}"#).unwrap();

        let record = HistoryLedger::load(&path);
        assert_eq!(record.downloaded_ids.len(), 2);
        assert!(record.processed_metadata.is_empty());
    }

    #[test]
    fn load_adds_ids_missing_for_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"{"downloaded_ids": ["a"], "processed_metadata": {"b": {"title": "t", "url": "u"}}}"#,
        )
        .unwrap();

        let record = HistoryLedger::load(&path);
        assert!(record.is_processed("a"));
        assert!(record.is_processed("b"));
    }
}
