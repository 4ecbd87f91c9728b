use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{MusicSource, SourceError, SourceKind, TrackInfo};

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".opus", ".flac", ".m4a", ".aac"];

/// Cliente para URLs de audio directas (archivos o radios)
pub struct DirectUrlClient {
    client: reqwest::Client,
}

impl DirectUrlClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn has_audio_extension(url: &Url) -> bool {
        let path = url.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Nombre del archivo sin extensión, usado como título
    fn title_from_path(url: &Url) -> Option<String> {
        let file = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
        let decoded = file.replace("%20", " ");
        let title = decoded
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(decoded);
        (!title.is_empty()).then_some(title)
    }
}

#[async_trait]
impl MusicSource for DirectUrlClient {
    async fn search(&self, _query: &str) -> Result<Option<TrackInfo>, SourceError> {
        // Una URL directa no admite búsquedas por texto
        Ok(None)
    }

    async fn lookup(&self, url: &Url) -> Result<Option<TrackInfo>, SourceError> {
        let response = self.client.head(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        debug!("📦 {} -> {}", url, content_type);

        if !content_type.starts_with("audio/") && !Self::has_audio_extension(url) {
            return Ok(None);
        }

        Ok(Some(TrackInfo {
            title: Self::title_from_path(url),
            url: url.to_string(),
            author: url.host_str().map(str::to_string),
            duration: None,
            thumbnail: None,
            is_live: false,
        }))
    }

    fn supports_url(&self, url: &Url) -> bool {
        Self::has_audio_extension(url)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Direct
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
