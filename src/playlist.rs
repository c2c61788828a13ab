//! Playlist expansion: list the members of a playlist and resolve a
//! transcript for each of them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::MediaResult;
use crate::transcript::{TranscriptService, resolve};
use crate::{Segment, SkippedVideo, Transcript, extract_video_id};

/// External playlist listing provider
#[async_trait]
pub trait PlaylistService: Send + Sync {
    /// Member video URLs of `playlist_ref`, in playlist order, without downloading media
    async fn list_members(&self, playlist_ref: &str) -> MediaResult<Vec<String>>;
}

/// Outcome of expanding one playlist
#[derive(Debug, Default)]
pub struct Expansion {
    pub transcripts: Vec<Transcript>,
    pub skipped: Vec<SkippedVideo>,
}

impl Expansion {
    /// Video id -> segments, for callers that only need the found transcripts
    pub fn into_map(self) -> BTreeMap<String, Vec<Segment>> {
        self.transcripts
            .into_iter()
            .map(|t| (t.video_id, t.segments))
            .collect()
    }
}

/// List the members of `playlist_ref` and resolve each one sequentially.
///
/// An empty playlist is `Ok` with nothing in it; a listing failure is `Err`.
/// Members without a transcript are recorded in [`Expansion::skipped`].
pub async fn expand(
    playlists: &dyn PlaylistService,
    transcripts: &dyn TranscriptService,
    playlist_ref: &str,
    language: &str,
) -> MediaResult<Expansion> {
    let members = playlists.list_members(playlist_ref).await?;
    let mut expansion = Expansion::default();

    if members.is_empty() {
        info!("No videos found in the playlist: {playlist_ref}");
        return Ok(expansion);
    }

    for member in &members {
        let Some(video_id) = extract_video_id(member) else {
            warn!("Skipping playlist entry with no recognizable video ID: {member}");
            expansion
                .skipped
                .push(SkippedVideo::new(member.as_str(), "no recognizable video ID"));
            continue;
        };

        info!("Fetching transcript for video ID: {video_id}");
        match resolve(transcripts, &video_id, language).await {
            Ok(t) => expansion.transcripts.push(t),
            Err(e) => {
                info!("No transcript available for video ID: {video_id}");
                expansion.skipped.push(SkippedVideo::new(video_id, e));
            }
        }
    }

    Ok(expansion)
}
