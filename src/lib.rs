pub mod clip;
pub mod config;
pub mod error;
pub mod matcher;
pub mod output;
pub mod pipeline;
pub mod playlist;
pub mod process;
pub mod server;
pub mod transcript;
pub mod youtube;
pub mod ytdlp;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Clip length used when a timestamp carries no explicit end
pub const DEFAULT_CLIP_SECONDS: f64 = 5.0;

/// A single captioned segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl Segment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A segment that matched a keyword search, with its end time materialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl From<&Segment> for MatchedSegment {
    fn from(segment: &Segment) -> Self {
        Self {
            text: segment.text.clone(),
            start: segment.start,
            end: segment.end(),
        }
    }
}

/// Complete transcript for a video
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: String,
    pub language: String,
    pub segments: Vec<Segment>,
}

/// A video left out of a batch result, with the reason it was dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedVideo {
    pub video_id: String,
    pub reason: String,
}

impl SkippedVideo {
    pub fn new(video_id: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            video_id: video_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Timestamp as supplied by a caller; `end` is optional
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Timestamp {
    pub start: f64,
    #[serde(default)]
    pub end: Option<f64>,
}

/// A validated `[start, end]` window in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Result<Self, PipelineError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(PipelineError::Validation(format!(
                "timestamps must be finite numbers (got {start}-{end})"
            )));
        }
        if start < 0.0 {
            return Err(PipelineError::Validation(format!("start must not be negative (got {start})")));
        }
        if end < start {
            return Err(PipelineError::Validation(format!("end {end} is before start {start}")));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl TryFrom<Timestamp> for TimeRange {
    type Error = PipelineError;

    fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
        TimeRange::new(ts.start, ts.end.unwrap_or(ts.start + DEFAULT_CLIP_SECONDS))
    }
}

/// Parse `START[-END]` (seconds) as used on the command line
pub fn parse_timestamp(input: &str) -> Result<Timestamp, String> {
    let input = input.trim();
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid time '{s}': {e}"))
    };
    match input.split_once('-') {
        Some((start, end)) => Ok(Timestamp {
            start: parse(start)?,
            end: Some(parse(end)?),
        }),
        None => Ok(Timestamp {
            start: parse(input)?,
            end: None,
        }),
    }
}

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("valid regex"));

static VIDEO_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // youtube.com/watch?v=ID
        r"youtube\.com/watch\?(?:.*&)?v=([a-zA-Z0-9_-]{11})(?:[&#]|$)",
        // youtu.be/ID
        r"youtu\.be/([a-zA-Z0-9_-]{11})(?:[?&#/]|$)",
        // youtube.com/embed/ID
        r"youtube\.com/embed/([a-zA-Z0-9_-]{11})(?:[?&#/]|$)",
        // youtube.com/shorts/ID
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})(?:[?&#/]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/playlist\?(?:.*&)?list=([a-zA-Z0-9_-]+)").expect("valid regex")
});

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    VIDEO_URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(input))
        .map(|caps| caps[1].to_string())
}

/// Like [`extract_video_id`], but malformed input is a validation error
pub fn require_video_id(input: &str) -> Result<String, PipelineError> {
    extract_video_id(input).ok_or_else(|| {
        PipelineError::Validation(format!(
            "could not extract a video ID from '{}'; expected a watch, youtu.be, embed or shorts URL, or an 11-character ID",
            input.trim()
        ))
    })
}

/// Extract the list ID from a `youtube.com/playlist?list=...` URL
pub fn extract_playlist_id(input: &str) -> Option<String> {
    PLAYLIST_URL
        .captures(input.trim())
        .map(|caps| caps[1].to_string())
}

/// Whether the URL designates a playlist rather than a single video
pub fn is_playlist_url(input: &str) -> bool {
    extract_playlist_id(input).is_some()
}
