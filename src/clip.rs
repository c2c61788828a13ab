//! Clip extraction: fetch the source video once, then cut one file per
//! time range with ffmpeg.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::TimeRange;
use crate::error::{MediaError, MediaResult};
use crate::process::{run_tool, tool_name};

/// URL prefix under which clip batches are served
pub const CLIPS_URL_PREFIX: &str = "clips";

/// External video retrieval
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Download `url` to `dest`, overwriting whatever is there
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<PathBuf>;

    /// Resolve `url` to a directly seekable media URL
    async fn resolve_direct_url(&self, url: &str) -> MediaResult<String>;
}

/// External trimming tool
#[async_trait]
pub trait Trimmer: Send + Sync {
    /// Write `range` of `input` (a path or URL) to `dest`
    async fn trim(&self, input: &str, range: TimeRange, dest: &Path) -> MediaResult<PathBuf>;
}

/// Re-encoding trimmer backed by the ffmpeg CLI
#[derive(Debug, Clone)]
pub struct FfmpegTrimmer {
    program: String,
    video_codec: String,
    audio_codec: String,
    timeout: Duration,
}

impl FfmpegTrimmer {
    pub fn new(
        program: impl Into<String>,
        video_codec: impl Into<String>,
        audio_codec: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            video_codec: video_codec.into(),
            audio_codec: audio_codec.into(),
            timeout,
        }
    }

    fn build_args(&self, input: &str, range: TimeRange, dest: &Path) -> Vec<String> {
        vec![
            "-ss".to_string(),
            range.start.to_string(),
            "-to".to_string(),
            range.end.to_string(),
            "-i".to_string(),
            input.to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-strict".to_string(),
            "experimental".to_string(),
            "-y".to_string(),
            dest.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Trimmer for FfmpegTrimmer {
    async fn trim(&self, input: &str, range: TimeRange, dest: &Path) -> MediaResult<PathBuf> {
        let args = self.build_args(input, range, dest);
        run_tool(&self.program, &args, self.timeout).await?;

        if !dest.exists() {
            return Err(MediaError::OutputMissing {
                tool: tool_name(&self.program),
                path: dest.to_path_buf(),
            });
        }
        Ok(dest.to_path_buf())
    }
}

/// `clip_<videoId>_<start>-<end>.<ext>` with two-decimal times
pub fn clip_filename(video_id: &str, range: TimeRange, extension: &str) -> String {
    format!("clip_{video_id}_{:.2}-{:.2}.{extension}", range.start, range.end)
}

/// Cuts clips for one source video into a caller-supplied directory
#[derive(Clone)]
pub struct ClipExtractor {
    source: Arc<dyn VideoSource>,
    trimmer: Arc<dyn Trimmer>,
    work_dir: PathBuf,
    extension: String,
}

impl ClipExtractor {
    pub fn new(
        source: Arc<dyn VideoSource>,
        trimmer: Arc<dyn Trimmer>,
        work_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            source,
            trimmer,
            work_dir: work_dir.into(),
            extension: extension.into(),
        }
    }

    /// Download `url` once and cut every range from the local copy.
    ///
    /// Stops at the first failing range; no partial list is returned.
    pub async fn extract(
        &self,
        url: &str,
        video_id: &str,
        ranges: &[TimeRange],
        batch: &ClipBatch,
    ) -> MediaResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let temp = self
            .work_dir
            .join(format!("temp_video_{video_id}_{}.{}", batch.id, self.extension));

        info!("Downloading {url} to {}", temp.display());
        let local = self.source.download(url, &temp).await?;
        let input = local.to_string_lossy().to_string();

        let result = self.trim_all(&input, video_id, ranges, batch).await;

        if let Err(e) = tokio::fs::remove_file(&local).await {
            warn!("Failed to remove downloaded source {}: {e}", local.display());
        }
        result
    }

    /// Cut every range straight from a remote, seekable media URL
    pub async fn extract_remote(
        &self,
        url: &str,
        video_id: &str,
        ranges: &[TimeRange],
        batch: &ClipBatch,
    ) -> MediaResult<Vec<PathBuf>> {
        let direct = self.source.resolve_direct_url(url).await?;
        debug!("Resolved direct media URL for {video_id}");
        self.trim_all(&direct, video_id, ranges, batch).await
    }

    async fn trim_all(
        &self,
        input: &str,
        video_id: &str,
        ranges: &[TimeRange],
        batch: &ClipBatch,
    ) -> MediaResult<Vec<PathBuf>> {
        let mut clips = Vec::with_capacity(ranges.len());
        for range in ranges {
            let dest = batch.dir.join(clip_filename(video_id, *range, &self.extension));
            debug!("Trimming {:.2}-{:.2} into {}", range.start, range.end, dest.display());
            clips.push(self.trimmer.trim(input, *range, &dest).await?);
        }
        info!("Extracted {} clip(s) for {video_id}", clips.len());
        Ok(clips)
    }
}

type ActiveBatches = Arc<Mutex<HashSet<String>>>;

/// One request's private output directory under the clip root
#[derive(Debug, Clone)]
pub struct ClipBatch {
    pub id: String,
    pub dir: PathBuf,
    _lease: Arc<BatchLease>,
}

/// Keeps a batch out of the sweep until the last handle is dropped
#[derive(Debug)]
struct BatchLease {
    id: String,
    active: ActiveBatches,
}

impl Drop for BatchLease {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.id);
        }
    }
}

impl ClipBatch {
    /// Path relative to the server root, e.g. `clips/<batch>/clip_x_1.00-2.00.mp4`
    pub fn public_path(&self, clip: &Path) -> String {
        let name = clip
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{CLIPS_URL_PREFIX}/{}/{name}", self.id)
    }
}

/// Root directory holding clip batches, with age-based cleanup
#[derive(Debug, Clone)]
pub struct ClipStore {
    root: PathBuf,
    retention: Duration,
    active: ActiveBatches,
}

impl ClipStore {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
            active: ActiveBatches::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sweep expired batches, then create a fresh, empty batch directory
    pub async fn create_batch(&self) -> MediaResult<ClipBatch> {
        tokio::fs::create_dir_all(&self.root).await?;
        match self.sweep_expired().await {
            Ok(0) => {}
            Ok(n) => info!("Removed {n} expired clip batch(es)"),
            Err(e) => warn!("Failed to sweep clip directory {}: {e}", self.root.display()),
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.root.join(&id);
        tokio::fs::create_dir(&dir).await?;
        if let Ok(mut active) = self.active.lock() {
            active.insert(id.clone());
        }
        Ok(ClipBatch {
            _lease: Arc::new(BatchLease {
                id: id.clone(),
                active: self.active.clone(),
            }),
            id,
            dir,
        })
    }

    /// Remove entries under the root last modified longer ago than the retention window.
    ///
    /// Batches still held by an in-flight extraction of this store are never removed.
    pub async fn sweep_expired(&self) -> MediaResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if self.is_active(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let meta = entry.metadata().await?;
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= self.retention {
                continue;
            }

            let path = entry.path();
            debug!("Removing expired clip entry {}", path.display());
            if meta.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    fn is_active(&self, id: &str) -> bool {
        self.active.lock().map(|active| active.contains(id)).unwrap_or(false)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeSource, FakeTrimmer};
    use super::*;

    const VID: &str = "dQw4w9WgXcQ";

    fn range(start: f64, end: f64) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    fn extractor(
        source: Arc<FakeSource>,
        trimmer: Arc<FakeTrimmer>,
        work_dir: &Path,
    ) -> ClipExtractor {
        ClipExtractor::new(source, trimmer, work_dir, "mp4")
    }

    #[test]
    fn test_clip_filename() {
        assert_eq!(
            clip_filename(VID, range(1.5, 3.0), "mp4"),
            "clip_dQw4w9WgXcQ_1.50-3.00.mp4"
        );
        assert_eq!(clip_filename("x", range(0.0, 65.126), "mkv"), "clip_x_0.00-65.13.mkv");
    }

    #[test]
    fn test_ffmpeg_args() {
        let trimmer = FfmpegTrimmer::new("ffmpeg", "libx264", "aac", Duration::from_secs(5));
        let args = trimmer.build_args("/tmp/in.mp4", range(1.5, 3.0), Path::new("/tmp/out.mp4"));
        assert_eq!(
            args,
            vec![
                "-ss", "1.5", "-to", "3", "-i", "/tmp/in.mp4", "-c:v", "libx264", "-c:a", "aac", "-strict",
                "experimental", "-y", "/tmp/out.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn test_single_range_produces_one_named_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path().join("clips"), Duration::from_secs(3600));
        let batch = store.create_batch().await.unwrap();
        let source = Arc::new(FakeSource::default());
        let trimmer = Arc::new(FakeTrimmer::default());
        let ex = extractor(source.clone(), trimmer.clone(), &tmp.path().join("work"));

        let clips = ex
            .extract("https://www.youtube.com/watch?v=dQw4w9WgXcQ", VID, &[range(1.5, 3.0)], &batch)
            .await
            .unwrap();

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0], batch.dir.join("clip_dQw4w9WgXcQ_1.50-3.00.mp4"));
        assert!(clips[0].exists());
        assert_eq!(source.downloads.lock().unwrap().len(), 1);

        // The downloaded source is cleaned up after the batch
        let downloaded = source.downloads.lock().unwrap()[0].clone();
        assert!(!downloaded.exists());
        assert_eq!(trimmer.calls.lock().unwrap()[0].0, downloaded.to_string_lossy());
    }

    #[tokio::test]
    async fn test_failure_on_second_range_aborts_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path().join("clips"), Duration::from_secs(3600));
        let batch = store.create_batch().await.unwrap();
        let trimmer = Arc::new(FakeTrimmer {
            fail_on_call: Some(2),
            ..Default::default()
        });
        let ex = extractor(Arc::new(FakeSource::default()), trimmer.clone(), tmp.path());

        let result = ex
            .extract(VID, VID, &[range(0.0, 1.0), range(2.0, 3.0), range(4.0, 5.0)], &batch)
            .await;

        assert!(matches!(result, Err(MediaError::ToolFailed { .. })));
        assert_eq!(trimmer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_download_failure_skips_trimming() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path().join("clips"), Duration::from_secs(3600));
        let batch = store.create_batch().await.unwrap();
        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });
        let trimmer = Arc::new(FakeTrimmer::default());
        let ex = extractor(source, trimmer.clone(), tmp.path());

        assert!(ex.extract(VID, VID, &[range(0.0, 1.0)], &batch).await.is_err());
        assert!(trimmer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_variant_trims_from_direct_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path().join("clips"), Duration::from_secs(3600));
        let batch = store.create_batch().await.unwrap();
        let source = Arc::new(FakeSource::default());
        let trimmer = Arc::new(FakeTrimmer::default());
        let ex = extractor(source.clone(), trimmer.clone(), tmp.path());

        let clips = ex.extract_remote(VID, VID, &[range(3.0, 8.0)], &batch).await.unwrap();
        assert_eq!(clips.len(), 1);
        assert!(source.downloads.lock().unwrap().is_empty());
        assert_eq!(trimmer.calls.lock().unwrap()[0].0, "https://media.example/direct.mp4");
    }

    #[tokio::test]
    async fn test_batches_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path(), Duration::from_secs(3600));
        let first = store.create_batch().await.unwrap();
        let second = store.create_batch().await.unwrap();
        assert_ne!(first.dir, second.dir);
        assert!(first.dir.exists());
        assert!(second.dir.exists());
        assert!(
            second
                .public_path(&second.dir.join("clip_a_1.00-2.00.mp4"))
                .starts_with(&format!("clips/{}/", second.id))
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let keep = ClipStore::new(tmp.path(), Duration::from_secs(3600));
        let batch = keep.create_batch().await.unwrap();
        assert_eq!(keep.sweep_expired().await.unwrap(), 0);
        assert!(batch.dir.exists());

        let dir = batch.dir.clone();
        drop(batch);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let eager = ClipStore::new(tmp.path(), Duration::ZERO);
        assert_eq!(eager.sweep_expired().await.unwrap(), 1);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_sweep_spares_batch_in_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClipStore::new(tmp.path(), Duration::ZERO);
        let running = store.create_batch().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A second request sweeps while the first is still trimming
        let next = store.create_batch().await.unwrap();
        assert!(running.dir.exists());
        assert_eq!(store.sweep_expired().await.unwrap(), 0);

        let dir = running.dir.clone();
        drop(running);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(!dir.exists());
        assert!(next.dir.exists());
    }

    #[cfg(unix)]
    mod ffmpeg_script {
        use std::os::unix::fs::PermissionsExt;

        use super::*;

        fn script(dir: &Path, body: &str) -> String {
            let path = dir.join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_reported() {
            let tmp = tempfile::tempdir().unwrap();
            let program = script(tmp.path(), "echo 'Invalid data found' >&2\nexit 1");
            let trimmer = FfmpegTrimmer::new(program, "libx264", "aac", Duration::from_secs(10));
            let err = trimmer
                .trim("in.mp4", range(0.0, 1.0), &tmp.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "fake-ffmpeg exited with status 1: Invalid data found");
        }

        #[tokio::test]
        async fn test_missing_output_is_reported() {
            let tmp = tempfile::tempdir().unwrap();
            let program = script(tmp.path(), "exit 0");
            let trimmer = FfmpegTrimmer::new(program, "libx264", "aac", Duration::from_secs(10));
            let err = trimmer
                .trim("in.mp4", range(0.0, 1.0), &tmp.path().join("out.mp4"))
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::OutputMissing { .. }));
        }

        #[tokio::test]
        async fn test_output_written_by_tool() {
            let tmp = tempfile::tempdir().unwrap();
            // Last argument is the output path
            let program = script(tmp.path(), "for last; do :; done\ntouch \"$last\"");
            let trimmer = FfmpegTrimmer::new(program, "libx264", "aac", Duration::from_secs(10));
            let dest = tmp.path().join("out.mp4");
            let clip = trimmer.trim("in.mp4", range(0.0, 1.0), &dest).await.unwrap();
            assert_eq!(clip, dest);
        }
    }
}
