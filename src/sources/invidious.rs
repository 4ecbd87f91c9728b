use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
    time::Duration,
};
use tracing::{info, warn};
use url::Url;

use super::{MusicSource, SourceError, SourceKind, TrackInfo, YouTubeClient};

/// Cliente para Invidious API (alternativa pública a YouTube)
pub struct InvidiousClient {
    client: reqwest::Client,
    instances: Vec<String>,
    current_instance: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    #[serde(rename = "videoId")]
    video_id: String,
    title: Option<String>,
    #[serde(rename = "lengthSeconds")]
    length_seconds: Option<u64>,
    author: Option<String>,
    #[serde(rename = "videoThumbnails")]
    video_thumbnails: Option<Vec<Thumbnail>>,
    #[serde(rename = "liveNow", default)]
    live_now: bool,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    width: u32,
}

impl InvidiousVideo {
    fn into_track_info(self) -> TrackInfo {
        let thumbnail = self
            .video_thumbnails
            .and_then(|thumbs| thumbs.into_iter().find(|t| t.width >= 320))
            .map(|t| t.url);

        TrackInfo {
            title: self.title,
            url: format!("https://www.youtube.com/watch?v={}", self.video_id),
            author: self.author,
            duration: self.length_seconds.map(Duration::from_secs),
            thumbnail,
            is_live: self.live_now,
        }
    }
}

impl InvidiousClient {
    pub fn new(instances: Vec<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            instances,
            current_instance: AtomicUsize::new(0),
        })
    }

    /// Extrae el ID de video de una URL de YouTube
    pub fn extract_video_id(url: &str) -> Option<String> {
        static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
        VIDEO_ID
            .get_or_init(|| {
                Regex::new(r"(?:v=|youtu\.be/|embed/|shorts/)([A-Za-z0-9_-]{11})")
                    .expect("video id regex is valid")
            })
            .captures(url)
            .map(|caps| caps[1].to_string())
    }

    /// Instancias en orden de rotación, empezando por la siguiente
    fn rotation(&self) -> Vec<&str> {
        let start = self.current_instance.fetch_add(1, Ordering::SeqCst);
        (0..self.instances.len())
            .map(|offset| self.instances[(start + offset) % self.instances.len()].as_str())
            .collect()
    }

    /// Prueba cada instancia hasta que una responda
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let mut last_error = SourceError::Unsupported("sin instancias de Invidious".to_string());

        for instance in self.rotation() {
            let url = format!("{}{}", instance, path);
            let response = match self.client.get(&url).query(query).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("❌ Falló request a {}: {}", instance, e);
                    last_error = e.into();
                    continue;
                }
            };

            if !response.status().is_success() {
                warn!("⚠️ {} devolvió {}", instance, response.status());
                last_error = SourceError::Status(response.status());
                continue;
            }

            match response.json::<T>().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("❌ Respuesta inválida de {}: {}", instance, e);
                    last_error = e.into();
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl MusicSource for InvidiousClient {
    async fn search(&self, query: &str) -> Result<Option<TrackInfo>, SourceError> {
        info!("🔍 Buscando en Invidious: {}", query);
        let results: Vec<InvidiousVideo> = self
            .get_json(
                "/api/v1/search",
                &[("q", query), ("type", "video"), ("page", "1")],
            )
            .await?;

        Ok(results.into_iter().next().map(InvidiousVideo::into_track_info))
    }

    async fn lookup(&self, url: &Url) -> Result<Option<TrackInfo>, SourceError> {
        let Some(video_id) = Self::extract_video_id(url.as_str()) else {
            return Ok(None);
        };

        let video: InvidiousVideo = self
            .get_json(&format!("/api/v1/videos/{}", video_id), &[])
            .await?;
        Ok(Some(video.into_track_info()))
    }

    fn supports_url(&self, url: &Url) -> bool {
        YouTubeClient::is_youtube_url(url.as_str())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::YouTube
    }

    fn name(&self) -> &'static str {
        "Invidious"
    }
}
