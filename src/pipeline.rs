//! Request orchestration shared by the HTTP server and the CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::clip::{ClipExtractor, ClipStore, FfmpegTrimmer, Trimmer, VideoSource};
use crate::config::Config;
use crate::error::PipelineError;
use crate::matcher::match_keywords;
use crate::playlist::{PlaylistService, expand};
use crate::transcript::{TranscriptService, resolve};
use crate::youtube::YouTubeCaptions;
use crate::ytdlp::YtDlp;
use crate::{
    MatchedSegment, Segment, SkippedVideo, TimeRange, Timestamp, extract_video_id, is_playlist_url,
    require_video_id,
};

/// Keyword hits per video
#[derive(Debug, Default, Serialize)]
pub struct Analysis {
    pub results: BTreeMap<String, Vec<MatchedSegment>>,
    pub skipped: Vec<SkippedVideo>,
}

/// Full transcripts per video
#[derive(Debug, Default, Serialize)]
pub struct TranscriptSet {
    pub transcripts: BTreeMap<String, Vec<Segment>>,
    pub skipped: Vec<SkippedVideo>,
}

/// Paths of the clips produced by one request, relative to the server root
#[derive(Debug, Default, Serialize)]
pub struct ClipList {
    pub clips: Vec<String>,
}

/// How the source video reaches the trimming tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// Download the whole video once, then trim locally
    #[default]
    Download,
    /// Trim straight from a directly seekable remote URL
    Remote,
}

pub struct Pipeline {
    transcripts: Arc<dyn TranscriptService>,
    playlists: Arc<dyn PlaylistService>,
    extractor: ClipExtractor,
    store: ClipStore,
    language: String,
}

impl Pipeline {
    pub fn new(
        transcripts: Arc<dyn TranscriptService>,
        playlists: Arc<dyn PlaylistService>,
        extractor: ClipExtractor,
        store: ClipStore,
        language: impl Into<String>,
    ) -> Self {
        Self {
            transcripts,
            playlists,
            extractor,
            store,
            language: language.into(),
        }
    }

    /// Wire the YouTube, yt-dlp and ffmpeg backed services from `config`
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.http_timeout()).build()?;
        let ytdlp = Arc::new(YtDlp::new(
            config.yt_dlp.clone(),
            config.cookie_file.clone(),
            config.external_timeout(),
        ));
        let trimmer: Arc<dyn Trimmer> = Arc::new(FfmpegTrimmer::new(
            config.ffmpeg.clone(),
            config.video_codec.clone(),
            config.audio_codec.clone(),
            config.external_timeout(),
        ));
        let source: Arc<dyn VideoSource> = ytdlp.clone();

        Ok(Self::new(
            Arc::new(YouTubeCaptions::new(client)),
            ytdlp,
            ClipExtractor::new(source, trimmer, config.work_dir.clone(), config.clip_extension.clone()),
            ClipStore::new(config.clip_dir.clone(), config.clip_retention()),
            config.default_lang.clone(),
        ))
    }

    pub fn clip_store(&self) -> &ClipStore {
        &self.store
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Search the transcripts of every video (or playlist member) for `keywords`.
    ///
    /// Videos without a transcript are listed under `skipped` instead of failing the request.
    pub async fn analyze(&self, urls: &[String], keywords: &[String]) -> Result<Analysis, PipelineError> {
        if urls.is_empty() || keywords.is_empty() {
            return Err(PipelineError::Validation("URLs and keywords are required.".to_string()));
        }

        let mut analysis = Analysis::default();
        for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if is_playlist_url(url) {
                match expand(self.playlists.as_ref(), self.transcripts.as_ref(), url, &self.language).await {
                    Ok(expansion) => {
                        for t in &expansion.transcripts {
                            analysis
                                .results
                                .insert(t.video_id.clone(), match_keywords(&t.segments, keywords));
                        }
                        analysis.skipped.extend(expansion.skipped);
                    }
                    Err(e) => {
                        warn!("Error fetching playlist transcripts for {url}: {e}");
                        analysis
                            .skipped
                            .push(SkippedVideo::new(url, format!("playlist lookup failed: {e}")));
                    }
                }
                continue;
            }

            let Some(video_id) = extract_video_id(url) else {
                warn!("Skipping URL with no recognizable video ID: {url}");
                analysis
                    .skipped
                    .push(SkippedVideo::new(url, "no recognizable video ID"));
                continue;
            };

            match resolve(self.transcripts.as_ref(), &video_id, &self.language).await {
                Ok(t) => {
                    let hits = match_keywords(&t.segments, keywords);
                    info!("{video_id}: {} matching segment(s)", hits.len());
                    analysis.results.insert(video_id, hits);
                }
                Err(e) => analysis.skipped.push(SkippedVideo::new(video_id, e)),
            }
        }

        Ok(analysis)
    }

    /// Cut one clip per timestamp from a single video into a fresh batch directory.
    ///
    /// Any failure fails the whole request and discards clips already cut.
    pub async fn extract_clips(
        &self,
        url: &str,
        timestamps: &[Timestamp],
        mode: ClipMode,
    ) -> Result<ClipList, PipelineError> {
        if url.trim().is_empty() {
            return Err(PipelineError::Validation("A video URL is required.".to_string()));
        }
        let video_id = require_video_id(url)?;
        let ranges = timestamps
            .iter()
            .map(|ts| TimeRange::try_from(*ts))
            .collect::<Result<Vec<_>, _>>()?;

        if ranges.is_empty() {
            return Ok(ClipList::default());
        }

        let batch = self.store.create_batch().await?;
        let url = url.trim();
        let result = match mode {
            ClipMode::Download => self.extractor.extract(url, &video_id, &ranges, &batch).await,
            ClipMode::Remote => self.extractor.extract_remote(url, &video_id, &ranges, &batch).await,
        };

        match result {
            Ok(paths) => Ok(ClipList {
                clips: paths.iter().map(|p| batch.public_path(p)).collect(),
            }),
            Err(e) => {
                warn!("Clip extraction failed for {video_id}: {e}");
                if let Err(rm) = tokio::fs::remove_dir_all(&batch.dir).await {
                    warn!("Failed to discard clip batch {}: {rm}", batch.dir.display());
                }
                Err(e.into())
            }
        }
    }

    /// Full transcripts for individual video URLs, resolved one by one
    pub async fn playlist_transcripts(&self, urls: &[String]) -> Result<TranscriptSet, PipelineError> {
        if urls.is_empty() {
            return Err(PipelineError::Validation("Playlist URLs are required.".to_string()));
        }

        let mut set = TranscriptSet::default();
        for url in urls {
            let Some(video_id) = extract_video_id(url) else {
                warn!("Skipping URL with no recognizable video ID: {url}");
                set.skipped
                    .push(SkippedVideo::new(url.trim(), "no recognizable video ID"));
                continue;
            };
            match resolve(self.transcripts.as_ref(), &video_id, &self.language).await {
                Ok(t) => {
                    set.transcripts.insert(video_id, t.segments);
                }
                Err(e) => set.skipped.push(SkippedVideo::new(video_id, e)),
            }
        }
        Ok(set)
    }

    /// Expand a playlist and return the transcripts of its members.
    ///
    /// Unlike [`Pipeline::analyze`], a listing failure is an error here.
    pub async fn expand_playlist(&self, playlist_ref: &str) -> Result<TranscriptSet, PipelineError> {
        let expansion = expand(
            self.playlists.as_ref(),
            self.transcripts.as_ref(),
            playlist_ref,
            &self.language,
        )
        .await?;
        let skipped = expansion.skipped.clone();
        Ok(TranscriptSet {
            transcripts: expansion.into_map(),
            skipped,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use crate::clip::fake::FakeTrimmer;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn watch(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={id}")
    }

    #[tokio::test]
    async fn test_analyze_requires_urls_and_keywords() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        assert!(matches!(
            p.analyze(&[], &strings(&["cat"])).await,
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            p.analyze(&[watch(CATS)], &[]).await,
            Err(PipelineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_analyze_single_video() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let analysis = p.analyze(&[watch(CATS)], &strings(&["cat"])).await.unwrap();
        assert_eq!(
            analysis.results[CATS],
            vec![MatchedSegment {
                text: "about cats".to_string(),
                start: 5.0,
                end: 9.0,
            }]
        );
        assert!(analysis.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_playlist_mixes_hits_and_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let urls = strings(&[
            "https://www.youtube.com/playlist?list=PLpets",
            "https://www.youtube.com/playlist?list=PLgone",
            "https://example.com/not-a-video",
        ]);
        let analysis = p.analyze(&urls, &strings(&["KATZE", "cat"])).await.unwrap();

        assert_eq!(analysis.results.len(), 2);
        assert_eq!(analysis.results[CATS].len(), 1);
        assert_eq!(analysis.results[DOGS][0].text, "Hunde und Katzen");

        let skipped: Vec<&str> = analysis.skipped.iter().map(|s| s.video_id.as_str()).collect();
        assert_eq!(
            skipped,
            vec![
                MUTE,
                "https://www.youtube.com/playlist?list=PLgone",
                "https://example.com/not-a-video"
            ]
        );
    }

    #[tokio::test]
    async fn test_analyze_video_without_hits_still_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let analysis = p.analyze(&[watch(CATS)], &strings(&["zebra"])).await.unwrap();
        assert!(analysis.results[CATS].is_empty());
    }

    #[tokio::test]
    async fn test_extract_clips_returns_public_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let list = p
            .extract_clips(
                &watch(CATS),
                &[Timestamp { start: 1.5, end: Some(3.0) }, Timestamp { start: 10.0, end: None }],
                ClipMode::Download,
            )
            .await
            .unwrap();
        assert_eq!(list.clips.len(), 2);
        assert!(list.clips[0].starts_with("clips/"));
        assert!(list.clips[0].ends_with("/clip_aaaaaaaaaaa_1.50-3.00.mp4"));
        assert!(list.clips[1].ends_with("/clip_aaaaaaaaaaa_10.00-15.00.mp4"));

        let on_disk = tmp.path().join(&list.clips[0]);
        assert!(on_disk.exists());
    }

    #[tokio::test]
    async fn test_extract_clips_is_all_or_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(
            tmp.path(),
            FakeTrimmer {
                fail_on_call: Some(2),
                ..Default::default()
            },
        );
        let ts = [
            Timestamp { start: 0.0, end: Some(1.0) },
            Timestamp { start: 2.0, end: Some(3.0) },
            Timestamp { start: 4.0, end: Some(5.0) },
        ];
        let err = p.extract_clips(&watch(CATS), &ts, ClipMode::Download).await.unwrap_err();
        assert!(matches!(err, PipelineError::External(ref m) if m.contains("Conversion failed")));

        // The failed batch leaves nothing behind
        let leftovers = std::fs::read_dir(tmp.path().join("clips")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_extract_clips_validates_input() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let ts = [Timestamp { start: 1.0, end: None }];
        assert!(matches!(
            p.extract_clips("https://example.com/x", &ts, ClipMode::Download).await,
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            p.extract_clips(&watch(CATS), &[Timestamp { start: 4.0, end: Some(1.0) }], ClipMode::Download)
                .await,
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            p.extract_clips("  ", &ts, ClipMode::Download).await,
            Err(PipelineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_playlist_transcripts_resolves_each_id() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let set = p
            .playlist_transcripts(&[watch(CATS), watch(MUTE), "https://example.com/x".to_string()])
            .await
            .unwrap();
        assert_eq!(set.transcripts.len(), 1);
        assert_eq!(set.transcripts[CATS].len(), 3);
        assert_eq!(set.skipped.len(), 2);

        assert!(matches!(
            p.playlist_transcripts(&[]).await,
            Err(PipelineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_expand_playlist_surfaces_listing_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), FakeTrimmer::default());
        let empty = p
            .expand_playlist("https://www.youtube.com/playlist?list=PLempty")
            .await
            .unwrap();
        assert!(empty.transcripts.is_empty());
        assert!(matches!(
            p.expand_playlist("https://www.youtube.com/playlist?list=PLgone").await,
            Err(PipelineError::External(_))
        ));
    }
}
