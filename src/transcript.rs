//! Transcript resolution with language fallback.

use async_trait::async_trait;
use log::{info, warn};

use crate::error::TranscriptError;
use crate::{Segment, Transcript};

/// A transcript track a video offers
#[derive(Debug, Clone, PartialEq)]
pub struct AvailableTranscript {
    pub language_code: String,
    pub language: String,
    pub generated: bool,
    /// Service-specific locator used by [`TranscriptService::fetch_track`]
    pub locator: String,
}

/// External transcript provider
#[async_trait]
pub trait TranscriptService: Send + Sync {
    /// Fetch the transcript of `video_id` in exactly `language`
    async fn fetch(&self, video_id: &str, language: &str) -> Result<Vec<Segment>, TranscriptError>;

    /// Enumerate every transcript track the video offers
    async fn list_available(&self, video_id: &str) -> Result<Vec<AvailableTranscript>, TranscriptError>;

    /// Fetch one track returned by [`TranscriptService::list_available`]
    async fn fetch_track(&self, video_id: &str, track: &AvailableTranscript) -> Result<Vec<Segment>, TranscriptError>;
}

/// Fetch a transcript in `language`, falling back to the first listed track
/// in any other language.
///
/// Every failure is logged before it is returned.
pub async fn resolve(
    service: &dyn TranscriptService,
    video_id: &str,
    language: &str,
) -> Result<Transcript, TranscriptError> {
    let result = try_resolve(service, video_id, language).await;
    if let Err(ref e) = result {
        match e {
            TranscriptError::Disabled(_) => warn!("Transcripts are disabled for video ID: {video_id}"),
            TranscriptError::NotFoundInLanguage { .. } => {
                warn!("No usable transcript in any language for video ID: {video_id}")
            }
            TranscriptError::Other(msg) => {
                warn!("Unexpected error fetching transcript for video ID {video_id}: {msg}")
            }
        }
    }
    result
}

/// [`resolve`], collapsing every failure into `None`
pub async fn resolve_or_none(service: &dyn TranscriptService, video_id: &str, language: &str) -> Option<Transcript> {
    resolve(service, video_id, language).await.ok()
}

async fn try_resolve(
    service: &dyn TranscriptService,
    video_id: &str,
    language: &str,
) -> Result<Transcript, TranscriptError> {
    match service.fetch(video_id, language).await {
        Ok(segments) => Ok(Transcript {
            video_id: video_id.to_string(),
            language: language.to_string(),
            segments,
        }),
        Err(TranscriptError::NotFoundInLanguage { .. }) => {
            info!("No transcript found in the requested language '{language}' for video ID: {video_id}");
            let tracks = service.list_available(video_id).await?;
            let Some(track) = tracks.iter().find(|t| t.language_code != language) else {
                return Err(TranscriptError::NotFoundInLanguage {
                    video_id: video_id.to_string(),
                    language: language.to_string(),
                });
            };
            info!("Falling back to language: {} ({})", track.language, track.language_code);
            let segments = service.fetch_track(video_id, track).await?;
            Ok(Transcript {
                video_id: video_id.to_string(),
                language: track.language_code.clone(),
                segments,
            })
        }
        Err(e) => Err(e),
    }
}
