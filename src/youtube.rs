use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::Segment;
use crate::error::TranscriptError;
use crate::transcript::{AvailableTranscript, TranscriptService};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
    captions: Option<CaptionsData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<CaptionTrack>>,
}

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    name: Option<TrackName>,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackName {
    #[serde(rename = "simpleText")]
    simple_text: Option<String>,
    runs: Option<Vec<TextRun>>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    text: String,
}

impl TrackName {
    fn text(&self) -> Option<String> {
        self.simple_text.clone().or_else(|| {
            self.runs
                .as_ref()
                .map(|runs| runs.iter().map(|r| r.text.as_str()).collect::<String>())
        })
    }
}

static API_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).expect("valid regex"));

static API_KEY_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#).expect("valid regex"));

/// Track list seen by a `fetch` that missed its language, handed to the
/// `list_available` call that follows so the player API is hit once
#[derive(Debug, Default)]
struct TrackMemo {
    last: Mutex<Option<(String, Vec<AvailableTranscript>)>>,
}

impl TrackMemo {
    fn remember(&self, video_id: &str, tracks: Vec<AvailableTranscript>) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some((video_id.to_string(), tracks));
        }
    }

    /// Consume the remembered list if it belongs to `video_id`
    fn take(&self, video_id: &str) -> Option<Vec<AvailableTranscript>> {
        let mut last = self.last.lock().ok()?;
        match last.take() {
            Some((id, tracks)) if id == video_id => Some(tracks),
            other => {
                *last = other;
                None
            }
        }
    }
}

/// Caption tracks served by YouTube's InnerTube player API
pub struct YouTubeCaptions {
    client: reqwest::Client,
    memo: TrackMemo,
}

impl YouTubeCaptions {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            memo: TrackMemo::default(),
        }
    }

    async fn player_response(&self, video_id: &str) -> Result<InnerTubePlayerResponse, TranscriptError> {
        // Step 1: Fetch the watch page to get the InnerTube API key
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        debug!("Fetching watch page: {watch_url}");

        let page_html = self
            .client
            .get(&watch_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let api_key = extract_api_key(&page_html)?;
        debug!("Extracted InnerTube API key: {api_key}");

        // Step 2: Call InnerTube player endpoint
        let player_url = format!("https://www.youtube.com/youtubei/v1/player?key={api_key}&prettyPrint=false");

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": "en",
                    "gl": "US",
                    "clientName": "WEB",
                    "clientVersion": "2.20241126.01.00"
                }
            },
            "videoId": video_id
        });

        let resp = self
            .client
            .post(&player_url)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }
}

#[async_trait]
impl TranscriptService for YouTubeCaptions {
    async fn fetch(&self, video_id: &str, language: &str) -> Result<Vec<Segment>, TranscriptError> {
        let resp = self.player_response(video_id).await?;
        let tracks = available_tracks(resp, video_id)?;
        let Some(track) = find_track(&tracks, language) else {
            self.memo.remember(video_id, tracks);
            return Err(TranscriptError::NotFoundInLanguage {
                video_id: video_id.to_string(),
                language: language.to_string(),
            });
        };
        self.fetch_track(video_id, track).await
    }

    async fn list_available(&self, video_id: &str) -> Result<Vec<AvailableTranscript>, TranscriptError> {
        if let Some(tracks) = self.memo.take(video_id) {
            debug!("Reusing caption track list for {video_id}");
            return Ok(tracks);
        }
        let resp = self.player_response(video_id).await?;
        available_tracks(resp, video_id)
    }

    async fn fetch_track(&self, video_id: &str, track: &AvailableTranscript) -> Result<Vec<Segment>, TranscriptError> {
        debug!("Fetching caption track for {video_id}: lang={}", track.language_code);

        let caption_xml = self
            .client
            .get(&track.locator)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_caption_xml(&caption_xml)
    }
}

/// Manually created tracks win over auto-generated ones for the same language
fn find_track<'a>(tracks: &'a [AvailableTranscript], language: &str) -> Option<&'a AvailableTranscript> {
    tracks
        .iter()
        .filter(|t| t.language_code == language)
        .min_by_key(|t| t.generated)
}

fn available_tracks(resp: InnerTubePlayerResponse, video_id: &str) -> Result<Vec<AvailableTranscript>, TranscriptError> {
    let renderer = resp.captions.and_then(|c| c.player_captions_tracklist_renderer);

    let Some(renderer) = renderer else {
        if let Some(status) = resp.playability_status {
            if status.status.as_deref().is_some_and(|s| s != "OK") {
                let reason = status.reason.unwrap_or_else(|| "unknown reason".to_string());
                return Err(TranscriptError::Other(format!("video {video_id} is unplayable: {reason}")));
            }
        }
        return Err(TranscriptError::Disabled(video_id.to_string()));
    };

    let tracks = renderer.caption_tracks.unwrap_or_default();
    if tracks.is_empty() {
        return Err(TranscriptError::Disabled(video_id.to_string()));
    }

    let mut available: Vec<AvailableTranscript> = tracks
        .into_iter()
        .map(|t| AvailableTranscript {
            language: t
                .name
                .as_ref()
                .and_then(TrackName::text)
                .unwrap_or_else(|| t.language_code.clone()),
            generated: t.kind.as_deref() == Some("asr"),
            locator: t.base_url.replace("&fmt=srv3", ""),
            language_code: t.language_code,
        })
        .collect();

    // Stable: manual tracks first, then generated, each in service order
    available.sort_by_key(|t| t.generated);
    Ok(available)
}

fn extract_api_key(html: &str) -> Result<String, TranscriptError> {
    API_KEY
        .captures(html)
        .or_else(|| API_KEY_FALLBACK.captures(html))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| TranscriptError::Other("could not extract InnerTube API key from watch page".to_string()))
}

fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>, TranscriptError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut current_start: Option<f64> = None;
    let mut current_dur: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                let mut start = None;
                let mut dur = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"start" => {
                            start = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        b"dur" => {
                            dur = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        _ => {}
                    }
                }
                current_start = start;
                // Some tracks omit dur on the final line
                current_dur = dur.or(Some(0.0));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => {
                // An empty element must not lend its timing to the next text event
                current_start = None;
                current_dur = None;
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(start), Some(dur)) = (current_start.take(), current_dur.take()) {
                    let raw_text = e.unescape().unwrap_or_default().to_string();
                    let text = html_escape::decode_html_entities(&raw_text).to_string();
                    if !text.is_empty() {
                        segments.push(Segment {
                            text,
                            start,
                            duration: dur,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TranscriptError::Other(format!("error parsing caption XML: {e}"))),
            _ => {}
        }
    }

    Ok(segments)
}
