mod channel;
mod local;
mod remote;

pub use channel::ChannelSource;
pub use local::LocalSource;
pub use remote::RemoteSource;

use crate::item::CandidateItem;
use indexmap::IndexSet;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// 视频来源，启动时根据配置选定一种
pub enum Source {
    Local(LocalSource),
    Remote(RemoteSource),
    Channel(ChannelSource),
}

impl Source {
    /// 按稳定顺序返回最多 `limit` 个不在 `exclude` 中的候选视频。
    /// 单个条目失败只会被跳过。
    pub async fn enumerate_candidates(
        &self,
        exclude: &IndexSet<String>,
        limit: usize,
    ) -> Vec<CandidateItem> {
        if limit == 0 {
            return Vec::new();
        }
        match self {
            Source::Local(source) => source.enumerate_candidates(exclude, limit).await,
            Source::Remote(source) => source.enumerate_candidates(exclude, limit).await,
            Source::Channel(source) => source.enumerate_candidates(exclude, limit).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Source::Local(_) => "local",
            Source::Remote(_) => "remote",
            Source::Channel(_) => "channel",
        }
    }
}

/// 在本次枚举中为条目分配独占的目录名，重名时追加 `_2`、`_3`。
/// `safe_folder_name` 的结果不含 `_`，追加后的名字不会与其他条目撞上。
pub(crate) fn claim_folder_name(used: &mut HashSet<String>, safe_name: &str) -> String {
    let mut name = safe_name.to_string();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{}_{}", safe_name, n);
        n += 1;
    }
    name
}

/// 清空并重建工作目录
pub(crate) async fn fresh_folder(folder: &Path) -> std::io::Result<()> {
    if tokio::fs::metadata(folder).await.is_ok() {
        tokio::fs::remove_dir_all(folder).await?;
    }
    tokio::fs::create_dir_all(folder).await
}

/// 删除程序创建的工作目录，失败只记日志
pub(crate) async fn discard_folder(folder: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(folder).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", folder.display(), e);
        }
    }
}
