use super::{claim_folder_name, discard_folder, fresh_folder};
use crate::error::{PipelineError, Result};
use crate::item::{safe_folder_name, CandidateItem, VideoMetadata, METADATA_FILE, VIDEO_FILE};
use indexmap::IndexSet;
use regex::Regex;
use reqwest::{Client, Url};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

const LISTING_TIMEOUT: Duration = Duration::from_secs(30);
const FOLDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
    pub url: String,
}

fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("anchor pattern is valid")
    })
}

/// 页面中所有链接的 href，按出现顺序
fn anchor_hrefs(html: &str) -> Vec<String> {
    anchor_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|href| !href.is_empty())
        .collect()
}

fn is_navigation(href: &str) -> bool {
    matches!(href, "../" | "./" | "/") || href.starts_with('?')
}

/// 解析 HTTP 服务器生成的目录列表页面。
///
/// 以 `/` 结尾的链接是目录，`.mp4` 链接是视频文件，其余忽略。
/// 指向 `base` 之外的绝对链接会被跳过。结果按名字排序。
pub fn parse_listing(html: &str, base: &str) -> Vec<ListingEntry> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for href in anchor_hrefs(html) {
        if is_navigation(&href) {
            continue;
        }

        let relative = if href.starts_with("http://") || href.starts_with("https://") {
            match href.strip_prefix(base) {
                Some(rest) => rest.to_string(),
                None => continue,
            }
        } else {
            href.clone()
        };
        let name = relative.trim_end_matches('/');
        if name.is_empty() {
            continue;
        }

        let Ok(url) = base_url.join(&href) else {
            continue;
        };

        if href.ends_with('/') {
            entries.push(ListingEntry {
                name: name.to_string(),
                kind: EntryKind::Dir,
                url: url.to_string(),
            });
        } else if href.to_lowercase().ends_with(".mp4") {
            let mut decoded = percent_decode(name);
            if decoded.to_lowercase().ends_with(".mp4") {
                decoded.truncate(decoded.len() - 4);
            }
            entries.push(ListingEntry {
                name: decoded,
                kind: EntryKind::File,
                url: url.to_string(),
            });
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// `%XX` 转义解码；非法序列原样保留
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// 从带目录列表的 HTTP 服务器上取视频，下载到本地工作目录
pub struct RemoteSource {
    base_url: String,
    download_dir: PathBuf,
    client: Client,
}

impl RemoteSource {
    pub fn new(base_url: &str, download_dir: impl Into<PathBuf>, client: Client) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Self {
            base_url,
            download_dir: download_dir.into(),
            client,
        }
    }

    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::SourceError(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    pub async fn list_entries(&self) -> Result<Vec<ListingEntry>> {
        info!("Fetching directory listing from {}", self.base_url);
        let html = self.fetch_page(&self.base_url, LISTING_TIMEOUT).await?;
        let entries = parse_listing(&html, &self.base_url);
        info!("Found {} remote items", entries.len());
        Ok(entries)
    }

    /// 子目录中第一个 mp4 链接
    async fn find_folder_video(&self, folder_url: &str) -> Option<String> {
        let html = match self.fetch_page(folder_url, FOLDER_TIMEOUT).await {
            Ok(html) => html,
            Err(e) => {
                debug!("Sub-listing {} unavailable: {}", folder_url, e);
                return None;
            }
        };
        let base = Url::parse(folder_url).ok()?;
        anchor_hrefs(&html)
            .into_iter()
            .filter(|href| !is_navigation(href))
            .filter_map(|href| base.join(&href).ok())
            .map(|url| url.to_string())
            .find(|url| url.to_lowercase().ends_with(".mp4"))
    }

    async fn fetch_metadata(&self, folder_url: &str) -> Option<VideoMetadata> {
        let url = Url::parse(folder_url).ok()?.join(METADATA_FILE).ok()?;
        let content = self.fetch_page(url.as_str(), FOLDER_TIMEOUT).await.ok()?;
        match VideoMetadata::parse(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring remote metadata at {}: {}", url, e);
                None
            }
        }
    }

    /// 分块写入，避免整个视频留在内存里
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::SourceError(format!(
                "Download of {} returned {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn prepare(&self, entry: &ListingEntry, folder: &Path) -> Result<CandidateItem> {
        fresh_folder(folder).await?;

        let (video_url, metadata) = match entry.kind {
            EntryKind::File => {
                let metadata = VideoMetadata::new(
                    entry.name.as_str(),
                    format!("{} - Video shared from {}", entry.name, self.base_url),
                    self.base_url.as_str(),
                )
                .with_tags(["video", "auto-upload"]);
                (entry.url.clone(), metadata)
            }
            EntryKind::Dir => {
                let video_url = self.find_folder_video(&entry.url).await.ok_or_else(|| {
                    PipelineError::SourceError(format!("No MP4 found in folder {}", entry.name))
                })?;
                let metadata = match self.fetch_metadata(&entry.url).await {
                    Some(metadata) => metadata,
                    None => {
                        info!(
                            "No metadata found for {}, generating from folder name",
                            entry.name
                        );
                        VideoMetadata::new(
                            entry.name.as_str(),
                            entry.name.as_str(),
                            entry.url.as_str(),
                        )
                        .with_tags(["video"])
                    }
                };
                (video_url, metadata)
            }
        };

        metadata.write_to(&folder.join(METADATA_FILE)).await?;

        info!("Downloading video for {}...", entry.name);
        let video_path = folder.join(VIDEO_FILE);
        let size = self.download(&video_url, &video_path).await?;
        info!("Downloaded {} ({:.1} MB)", entry.name, size as f64 / 1_048_576.0);

        Ok(CandidateItem {
            id: entry.name.clone(),
            video_path,
            folder: folder.to_path_buf(),
            metadata,
            disposable: true,
        })
    }

    pub async fn enumerate_candidates(
        &self,
        exclude: &IndexSet<String>,
        limit: usize,
    ) -> Vec<CandidateItem> {
        let entries = match self.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list remote items: {}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        let mut used_folders = HashSet::new();
        for entry in entries {
            if candidates.len() >= limit {
                break;
            }
            if exclude.contains(&entry.name) {
                debug!("Skipping processed: {}", entry.name);
                continue;
            }

            let safe_name = safe_folder_name(&entry.name);
            if safe_name.is_empty() {
                warn!("Cannot derive a folder name from {:?}, skipping", entry.name);
                continue;
            }
            info!("Process candidate: {} ({:?})", entry.name, entry.kind);

            let folder = self
                .download_dir
                .join(claim_folder_name(&mut used_folders, &safe_name));
            match self.prepare(&entry, &folder).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    error!("Processing failed for {}: {}", entry.name, e);
                    discard_folder(&folder).await;
                }
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    const LISTING: &str = r#"<html><body><h1>Index of /vdos/</h1><pre>
<a href="../">../</a>
<a href="?C=N;O=D">Name</a>
<a href="cat%20video.mp4">cat video.mp4</a>
<a href="B-folder/">B-folder/</a>
<a HREF='notes.txt'>notes.txt</a>
<a href="https://cdn.example.com/other.mp4">external</a>
<a href="http://host/vdos/Abs.MP4">absolute</a>
</pre></body></html>"#;

    #[test]
    fn parses_directory_listing() {
        let entries = parse_listing(LISTING, "http://host/vdos/");
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    name: "Abs".to_string(),
                    kind: EntryKind::File,
                    url: "http://host/vdos/Abs.MP4".to_string(),
                },
                ListingEntry {
                    name: "B-folder".to_string(),
                    kind: EntryKind::Dir,
                    url: "http://host/vdos/B-folder/".to_string(),
                },
                ListingEntry {
                    name: "cat video".to_string(),
                    kind: EntryKind::File,
                    url: "http://host/vdos/cat%20video.mp4".to_string(),
                },
            ]
        );
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(percent_decode("%E7%8C%AB%20a"), "猫 a");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz%4"), "%zz%4");
    }

    #[test]
    fn bad_base_yields_nothing() {
        assert!(parse_listing(LISTING, "not a url").is_empty());
    }

    /// 按路径返回固定内容的简易 HTTP 服务器
    fn spawn_server(routes: HashMap<String, Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = match routes.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"missing".to_vec()),
                };
                let headers = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(headers.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{addr}")
    }

    fn test_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn downloads_unseen_entries_with_metadata() {
        let mut routes = HashMap::new();
        routes.insert(
            "/vdos/".to_string(),
            br#"<a href="a%20clip.mp4">a</a> <a href="b-dir/">b</a> <a href="c-dir/">c</a> <a href="d-dir/">d</a>"#.to_vec(),
        );
        routes.insert("/vdos/a%20clip.mp4".to_string(), b"AAAA".to_vec());
        routes.insert("/vdos/b-dir/".to_string(), br#"<a href="movie.mp4">m</a>"#.to_vec());
        routes.insert("/vdos/b-dir/movie.mp4".to_string(), b"BBBB".to_vec());
        routes.insert(
            "/vdos/b-dir/metadata.json".to_string(),
            r#"{"title": "猫咪", "description": "可爱", "url": "https://x/b"}"#.as_bytes().to_vec(),
        );
        routes.insert("/vdos/c-dir/".to_string(), b"no videos here".to_vec());
        routes.insert("/vdos/d-dir/".to_string(), br#"<a href="v.mp4">v</a>"#.to_vec());
        routes.insert("/vdos/d-dir/v.mp4".to_string(), b"DDDD".to_vec());
        let base = format!("{}/vdos", spawn_server(routes));

        let dir = tempdir().unwrap();
        let source = RemoteSource::new(&base, dir.path(), test_client());
        let candidates = source.enumerate_candidates(&IndexSet::new(), 10).await;

        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a clip", "b-dir", "d-dir"]);
        assert!(candidates.iter().all(|c| c.disposable));

        let file = &candidates[0];
        assert_eq!(file.folder, dir.path().join("a clip"));
        assert_eq!(std::fs::read(&file.video_path).unwrap(), b"AAAA");
        assert_eq!(file.metadata.tags, vec!["video", "auto-upload"]);
        assert!(file.metadata.description.starts_with("a clip - Video shared from"));

        assert_eq!(candidates[1].metadata.title, "猫咪");
        assert_eq!(candidates[1].folder, dir.path().join("bdir"));
        let sidecar = std::fs::read_to_string(candidates[1].folder.join(METADATA_FILE)).unwrap();
        assert!(sidecar.contains("猫咪"));

        assert_eq!(candidates[2].metadata.title, "d-dir");
        assert_eq!(candidates[2].metadata.tags, vec!["video"]);

        // 没有视频的目录不会留下工作目录
        assert!(!dir.path().join("cdir").exists());
    }

    #[tokio::test]
    async fn skips_processed_and_respects_limit() {
        let mut routes = HashMap::new();
        routes.insert(
            "/".to_string(),
            br#"<a href="one.mp4">1</a><a href="two.mp4">2</a><a href="three.mp4">3</a>"#.to_vec(),
        );
        routes.insert("/three.mp4".to_string(), b"3".to_vec());
        routes.insert("/two.mp4".to_string(), b"2".to_vec());
        let base = spawn_server(routes);

        let dir = tempdir().unwrap();
        let source = RemoteSource::new(&base, dir.path(), test_client());
        let exclude: IndexSet<String> = ["one".to_string()].into_iter().collect();
        let candidates = source.enumerate_candidates(&exclude, 1).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "three");
    }

    #[tokio::test]
    async fn colliding_names_get_separate_folders() {
        let mut routes = HashMap::new();
        routes.insert(
            "/".to_string(),
            br#"<a href="a-b.mp4">1</a><a href="ab.mp4">2</a>"#.to_vec(),
        );
        routes.insert("/a-b.mp4".to_string(), b"FIRST".to_vec());
        routes.insert("/ab.mp4".to_string(), b"SECOND".to_vec());
        let base = spawn_server(routes);

        let dir = tempdir().unwrap();
        let source = RemoteSource::new(&base, dir.path(), test_client());
        let candidates = source.enumerate_candidates(&IndexSet::new(), 2).await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "a-b");
        assert_eq!(candidates[0].folder, dir.path().join("ab"));
        assert_eq!(candidates[1].id, "ab");
        assert_eq!(candidates[1].folder, dir.path().join("ab_2"));
        assert_eq!(std::fs::read(&candidates[0].video_path).unwrap(), b"FIRST");
        assert_eq!(std::fs::read(&candidates[1].video_path).unwrap(), b"SECOND");
    }

    #[tokio::test]
    async fn failed_download_discards_folder() {
        let mut routes = HashMap::new();
        routes.insert("/".to_string(), br#"<a href="gone.mp4">x</a>"#.to_vec());
        let base = spawn_server(routes);

        let dir = tempdir().unwrap();
        let source = RemoteSource::new(&base, dir.path(), test_client());
        assert!(source.enumerate_candidates(&IndexSet::new(), 1).await.is_empty());
        assert!(!dir.path().join("gone").exists());
    }

    #[tokio::test]
    async fn unreachable_listing_yields_nothing() {
        let dir = tempdir().unwrap();
        let source = RemoteSource::new("http://127.0.0.1:9/", dir.path(), test_client());
        assert!(source.enumerate_candidates(&IndexSet::new(), 1).await.is_empty());
    }
}
