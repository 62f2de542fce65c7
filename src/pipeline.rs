use crate::api::Translator;
use crate::captions::CaptionGenerator;
use crate::error::{PipelineError, Result};
use crate::history::{check_similarity, HistoryLedger, ProcessedMetadata, SimilarMatch};
use crate::item::{CandidateItem, VideoMetadata};
use crate::publish::{self, Translation};
use crate::source::{self, Source};
use crate::upload::{PrivacyStatus, UploadRequest, Uploader};
use crate::video::CaptionBurner;
use indexmap::IndexSet;
use tracing::{error, info, warn};

/// 流水线的运行参数
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub limit: usize,
    pub threshold: f64,
    pub privacy: PrivacyStatus,
    pub dry_run: bool,
    pub default_tags: Vec<String>,
}

/// 单个视频的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 已上传，附带平台返回的视频 id
    Uploaded(String),
    Duplicate(SimilarMatch),
    /// dry-run 模式下走完了上传以外的所有步骤
    DryRun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub duplicates: usize,
    pub failed: usize,
}

pub struct Pipeline {
    source: Source,
    ledger: HistoryLedger,
    captioner: Box<dyn CaptionGenerator>,
    burner: Box<dyn CaptionBurner>,
    translator: Box<dyn Translator>,
    uploader: Option<Box<dyn Uploader>>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        source: Source,
        ledger: HistoryLedger,
        captioner: Box<dyn CaptionGenerator>,
        burner: Box<dyn CaptionBurner>,
        translator: Box<dyn Translator>,
        uploader: Option<Box<dyn Uploader>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            ledger,
            captioner,
            burner,
            translator,
            uploader,
            options,
        }
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// 依次处理直到成功 `limit` 个新视频或来源再无新条目。
    /// 重复和失败不占名额；单个视频失败不会中断整个运行。
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut attempted: IndexSet<String> = IndexSet::new();

        info!(
            "Looking for up to {} new video(s) from the {} source ({} already processed)",
            self.options.limit,
            self.source.name(),
            self.ledger.record().downloaded_ids.len()
        );

        while summary.processed < self.options.limit {
            // dry-run 不写账本，本次已尝试过的 id 也要排除
            let mut exclude = self.ledger.record().downloaded_ids.clone();
            exclude.extend(attempted.iter().cloned());

            let wanted = self.options.limit - summary.processed;
            let candidates = self.source.enumerate_candidates(&exclude, wanted).await;
            if candidates.is_empty() {
                break;
            }
            attempted.extend(candidates.iter().map(|c| c.id.clone()));
            self.process_batch(candidates, &mut summary).await;
        }

        if summary == RunSummary::default() {
            info!("No new videos to process.");
        }
        summary
    }

    async fn process_batch(&mut self, candidates: Vec<CandidateItem>, summary: &mut RunSummary) {
        let total = candidates.len();
        for (idx, candidate) in candidates.iter().enumerate() {
            info!(
                "[{}/{}] Processing {}: {}",
                idx + 1,
                total,
                candidate.id,
                candidate.metadata.title
            );

            match self.process_candidate(candidate).await {
                Ok(Outcome::Uploaded(video_id)) => {
                    info!("Published {} as {}", candidate.id, video_id);
                    summary.processed += 1;
                }
                Ok(Outcome::DryRun) => summary.processed += 1,
                Ok(Outcome::Duplicate(similar)) => {
                    info!("Skipped {} as a duplicate of {}", candidate.id, similar.id);
                    summary.duplicates += 1;
                }
                Err(e) => {
                    error!("Skipping {}: {}", candidate.id, e);
                    summary.failed += 1;
                }
            }

            if candidate.disposable {
                source::discard_folder(&candidate.folder).await;
            }
        }
    }

    /// 单个视频依次经过去重、字幕、烧录、翻译和上传。
    /// 只有判定重复或上传成功才会写入处理历史。
    pub async fn process_candidate(&mut self, candidate: &CandidateItem) -> Result<Outcome> {
        let metadata = &candidate.metadata;

        // 1. 标题去重
        if let Some(similar) =
            check_similarity(&metadata.title, self.ledger.record(), self.options.threshold)
        {
            warn!(
                "Duplicate detected: '{}' is {:.0}% similar to '{}' ({})",
                metadata.title,
                similar.similarity * 100.0,
                similar.title,
                similar.id
            );
            if !self.options.dry_run {
                self.ledger.mark_processed(&candidate.id, None)?;
            }
            return Ok(Outcome::Duplicate(similar));
        }

        // 2. 生成英文字幕
        info!("Generating English captions...");
        let captions_path = self.captioner.generate(&candidate.video_path).await?;

        // 3. 烧录字幕
        info!("Burning captions into video...");
        let upload_path = self
            .burner
            .burn_captions(&candidate.video_path, &captions_path)
            .await?;

        // 4. 翻译标题和描述，失败时退回原文
        let translation = match self.translate(metadata).await {
            Ok(translation) => Some(translation),
            Err(e) => {
                warn!("Translation failed: {}. Using original metadata.", e);
                None
            }
        };
        let published = publish::compose(metadata, translation.as_ref(), &self.options.default_tags);

        if self.options.dry_run {
            info!(
                "Dry run: would upload {} as '{}' with tags {:?}",
                upload_path.display(),
                published.title,
                published.tags
            );
            return Ok(Outcome::DryRun);
        }

        // 5. 上传
        let uploader = self.uploader.as_ref().ok_or_else(|| {
            PipelineError::ConfigError("no uploader configured".to_string())
        })?;
        let request = UploadRequest {
            video_path: &upload_path,
            title: &published.title,
            description: &published.description,
            tags: &published.tags,
            privacy: self.options.privacy,
        };
        let video_id = uploader.upload(&request).await?;

        let processed = ProcessedMetadata::new(metadata.title.as_str(), metadata.url.as_str());
        if let Err(e) = self.ledger.mark_processed(&candidate.id, Some(processed)) {
            error!(
                "Uploaded {} as {} but could not record it in {}: {}",
                candidate.id,
                video_id,
                self.ledger.path().display(),
                e
            );
            return Err(e);
        }
        Ok(Outcome::Uploaded(video_id))
    }

    async fn translate(&self, metadata: &VideoMetadata) -> Result<Translation> {
        let title = self.translator.translate(&metadata.title).await?;
        if title.trim().is_empty() {
            return Err(PipelineError::TranslationError(
                "empty title translation".to_string(),
            ));
        }
        let description = self.translator.translate(&metadata.description).await?;
        Ok(Translation { title, description })
    }
}
