//! yt-dlp adapter: playlist listing, video download and direct URL lookup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::clip::VideoSource;
use crate::error::{MediaError, MediaResult};
use crate::playlist::PlaylistService;
use crate::process::{run_tool, tool_name};

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    url: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    cookie_file: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, cookie_file: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            cookie_file,
            timeout,
        }
    }

    fn tool(&self) -> String {
        tool_name(&self.program)
    }

    fn download_args(&self, url: &str, dest: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-f", "mp4", "--no-playlist", "--force-overwrites", "--quiet", "--no-warnings", "-o"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(dest.to_string_lossy().to_string());
        if let Some(ref cookies) = self.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl PlaylistService for YtDlp {
    async fn list_members(&self, playlist_ref: &str) -> MediaResult<Vec<String>> {
        debug!("Listing playlist via yt-dlp: {playlist_ref}");
        let args: Vec<String> = [
            "--flat-playlist",
            "--dump-single-json",
            "--quiet",
            "--no-warnings",
            playlist_ref,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = run_tool(&self.program, &args, self.timeout).await?;
        let members = parse_flat_playlist(&String::from_utf8_lossy(&output.stdout)).map_err(|e| MediaError::Parse {
            tool: self.tool(),
            message: e.to_string(),
        })?;
        info!("Playlist {playlist_ref} has {} entries", members.len());
        Ok(members)
    }
}

#[async_trait]
impl VideoSource for YtDlp {
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_tool(&self.program, &self.download_args(url, dest), self.timeout).await?;

        if !dest.exists() {
            return Err(MediaError::OutputMissing {
                tool: self.tool(),
                path: dest.to_path_buf(),
            });
        }
        Ok(dest.to_path_buf())
    }

    async fn resolve_direct_url(&self, url: &str) -> MediaResult<String> {
        let args: Vec<String> = ["-f", "mp4", "-g", "--no-playlist", "--quiet", "--no-warnings", url]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = run_tool(&self.program, &args, self.timeout).await?;

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| MediaError::Parse {
                tool: self.tool(),
                message: format!("no direct media URL for {url}"),
            })
    }
}

/// Member URLs from `yt-dlp --flat-playlist --dump-single-json` output
fn parse_flat_playlist(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let playlist: FlatPlaylist = serde_json::from_str(json)?;
    Ok(playlist
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|entry| match (entry.url, entry.id) {
            (Some(url), _) => Some(url),
            (None, Some(id)) => Some(format!("https://www.youtube.com/watch?v={id}")),
            (None, None) => None,
        })
        .collect())
}
