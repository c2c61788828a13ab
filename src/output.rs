use crate::SkippedVideo;
use crate::pipeline::{Analysis, TranscriptSet};

/// `m:ss.ss`, or `h:mm:ss.ss` past the hour
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0).floor() as u64;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
    let secs = seconds % 60.0;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:05.2}")
    } else {
        format!("{minutes}:{secs:05.2}")
    }
}

/// Render analysis results, one block per video with one line per hit
pub fn render_analysis_text(analysis: &Analysis) -> String {
    let mut lines = Vec::new();
    for (video_id, hits) in &analysis.results {
        lines.push(format!("{video_id} ({} match{})", hits.len(), if hits.len() == 1 { "" } else { "es" }));
        for hit in hits {
            lines.push(format!("  [{} - {}] {}", format_time(hit.start), format_time(hit.end), hit.text));
        }
    }
    push_skipped(&mut lines, &analysis.skipped);
    lines.join("\n")
}

/// Render full transcripts, one block per video
pub fn render_transcripts_text(set: &TranscriptSet) -> String {
    let mut lines = Vec::new();
    for (video_id, segments) in &set.transcripts {
        lines.push(video_id.clone());
        for seg in segments {
            lines.push(format!("  [{}] {}", format_time(seg.start), seg.text));
        }
    }
    push_skipped(&mut lines, &set.skipped);
    lines.join("\n")
}

fn push_skipped(lines: &mut Vec<String>, skipped: &[SkippedVideo]) {
    for s in skipped {
        lines.push(format!("skipped {}: {}", s.video_id, s.reason));
    }
}

pub fn render_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
