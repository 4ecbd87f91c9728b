use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::OnceLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::{MusicSource, SourceError, SourceKind, TrackInfo};

/// Cliente para interactuar con YouTube vía yt-dlp
pub struct YouTubeClient {
    program: String,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpInfo {
    fn into_track_info(self, fallback_url: &str) -> TrackInfo {
        TrackInfo {
            title: self.title,
            url: self
                .webpage_url
                .or(self.url)
                .unwrap_or_else(|| fallback_url.to_string()),
            author: self.uploader.or(self.channel),
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(Duration::from_secs_f64),
            thumbnail: self.thumbnail,
            is_live: self.is_live.unwrap_or(false),
        }
    }
}

impl YouTubeClient {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        static YOUTUBE_REGEX: OnceLock<Regex> = OnceLock::new();
        YOUTUBE_REGEX
            .get_or_init(|| {
                Regex::new(
                    r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
                )
                .expect("youtube regex is valid")
            })
            .is_match(url)
    }

    /// Ejecuta yt-dlp y devuelve el primer objeto JSON de la salida
    async fn dump_json(&self, target: &str) -> Result<Option<YtDlpInfo>, SourceError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| SourceError::Unsupported(e.to_string()))?;

        debug!("📊 Consultando yt-dlp: {}", target);

        let output = Command::new(&self.program)
            .args([
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                target,
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::Process {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().find(|line| !line.trim().is_empty()) {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str) -> Result<Option<TrackInfo>, SourceError> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch1:{}", query);
        let info = self.dump_json(&search_query).await?;
        Ok(info.map(|info| info.into_track_info("")).filter(|t| !t.url.is_empty()))
    }

    async fn lookup(&self, url: &Url) -> Result<Option<TrackInfo>, SourceError> {
        let info = self.dump_json(url.as_str()).await?;
        Ok(info.map(|info| info.into_track_info(url.as_str())))
    }

    fn supports_url(&self, _url: &Url) -> bool {
        // yt-dlp reconoce cientos de sitios
        true
    }

    fn kind(&self) -> SourceKind {
        SourceKind::YouTube
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
    }

    #[test]
    fn parses_ytdlp_json() {
        let line = r#"{"id":"abc","title":"Song","duration":213.5,"uploader":"Band",
            "thumbnail":"https://i.ytimg.com/vi/abc/hq.jpg",
            "webpage_url":"https://www.youtube.com/watch?v=abc","is_live":false}"#
            .replace('\n', "");
        let info: YtDlpInfo = serde_json::from_str(&line).unwrap();
        let track = info.into_track_info("fallback");

        assert_eq!(track.title.as_deref(), Some("Song"));
        assert_eq!(track.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.author.as_deref(), Some("Band"));
        assert_eq!(track.duration, Some(Duration::from_secs_f64(213.5)));
    }

    #[test]
    fn missing_webpage_url_falls_back_to_query_url() {
        let info: YtDlpInfo = serde_json::from_str(r#"{"title":"Clip"}"#).unwrap();
        let track = info.into_track_info("https://example.com/clip");
        assert_eq!(track.url, "https://example.com/clip");
        assert_eq!(track.author, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let client = YouTubeClient::new("definitely-not-a-real-ytdlp", Duration::from_secs(5));
        let err = client.search("anything").await.unwrap_err();
        assert!(matches!(err, SourceError::Spawn { .. }));
    }
}
