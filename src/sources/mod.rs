pub mod direct_url;
pub mod invidious;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use direct_url::DirectUrlClient;
pub use invidious::InvidiousClient;
pub use youtube::YouTubeClient;

/// Valor mostrado cuando un backend no entrega título o autor
pub const UNKNOWN: &str = "Unknown";

/// Error de un backend individual
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no se pudo ejecutar {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} terminó con error: {stderr}")]
    Process { program: String, stderr: String },
    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("estado HTTP inesperado: {0}")]
    Status(reqwest::StatusCode),
    #[error("respuesta inválida: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tiempo de espera agotado tras {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Unsupported(String),
}

/// Resultado fallido de una resolución completa
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("la búsqueda está vacía")]
    EmptyQuery,
    #[error("no se encontraron resultados para: {0}")]
    NotFound(String),
    #[error("ninguna fuente respondió correctamente: {0}")]
    Backend(String),
}

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTube,
    Direct,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::Direct => "URL directa",
        }
    }
}

/// Metadata entregada por un backend, antes de asignar solicitante
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub is_live: bool,
}

/// Pista resuelta e inmutable.
///
/// Fields missing from the backend fall back to [`UNKNOWN`], an empty
/// thumbnail and a zero duration (live or unknown length).
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    url: String,
    author: String,
    duration: Duration,
    thumbnail: String,
    source_kind: SourceKind,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn from_info(info: TrackInfo, source_kind: SourceKind, requested_by: UserId) -> Self {
        Self {
            title: non_empty(info.title).unwrap_or_else(|| UNKNOWN.to_string()),
            url: info.url,
            author: non_empty(info.author).unwrap_or_else(|| UNKNOWN.to_string()),
            duration: if info.is_live {
                Duration::ZERO
            } else {
                info.duration.unwrap_or_default()
            },
            thumbnail: info.thumbnail.unwrap_or_default(),
            source_kind,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    /// `true` si la duración es desconocida (transmisión en vivo)
    pub fn is_live(&self) -> bool {
        self.duration.is_zero()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        (!self.thumbnail.is_empty()).then_some(self.thumbnail.as_str())
    }
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca y devuelve el primer resultado
    async fn search(&self, query: &str) -> Result<Option<TrackInfo>, SourceError>;

    /// Obtiene la metadata exacta de una URL
    async fn lookup(&self, url: &Url) -> Result<Option<TrackInfo>, SourceError>;

    /// Verifica si la URL es válida para esta fuente
    fn supports_url(&self, url: &Url) -> bool;

    /// Tipo de fuente de las pistas devueltas
    fn kind(&self) -> SourceKind;

    /// Nombre de la fuente
    fn name(&self) -> &'static str;
}

/// Resolvedor de pistas con backends en orden de prioridad.
///
/// Each backend is tried once; a failing backend falls through to the next
/// one silently. Only when every backend has been tried does resolution
/// fail, with [`ResolveError::NotFound`] if some backend answered "no
/// results" and [`ResolveError::Backend`] if all of them errored.
pub struct TrackResolver {
    backends: Vec<Arc<dyn MusicSource>>,
}

impl TrackResolver {
    pub fn new(backends: Vec<Arc<dyn MusicSource>>) -> Self {
        Self { backends }
    }

    pub async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        let direct = parse_absolute_url(query);
        let mut answered_empty = false;
        let mut last_error: Option<String> = None;

        for backend in &self.backends {
            let attempt = match &direct {
                Some(url) if !backend.supports_url(url) => {
                    debug!("⏭️ {} no soporta {}", backend.name(), url);
                    continue;
                }
                Some(url) => backend.lookup(url).await,
                None => backend.search(query).await,
            };

            match attempt {
                Ok(Some(info)) => {
                    info!("✅ Resuelto con {}: {:?}", backend.name(), info.title);
                    return Ok(Track::from_info(info, backend.kind(), requested_by));
                }
                Ok(None) => {
                    debug!("📭 {} sin resultados para {}", backend.name(), query);
                    answered_empty = true;
                }
                Err(e) => {
                    warn!("❌ {} falló, probando siguiente fuente: {}", backend.name(), e);
                    last_error = Some(format!("{}: {}", backend.name(), e));
                }
            }
        }

        match last_error {
            Some(error) if !answered_empty => Err(ResolveError::Backend(error)),
            _ => Err(ResolveError::NotFound(query.to_string())),
        }
    }
}

/// Interpreta la consulta como URL absoluta con host
pub fn parse_absolute_url(query: &str) -> Option<Url> {
    let url = Url::parse(query).ok()?;
    if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
        Some(url)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn info(title: &str, url: &str) -> TrackInfo {
        TrackInfo {
            title: Some(title.to_string()),
            url: url.to_string(),
            author: Some("Autor".to_string()),
            duration: Some(Duration::from_secs(200)),
            thumbnail: None,
            is_live: false,
        }
    }

    fn backend(name: &'static str) -> MockMusicSource {
        let mut mock = MockMusicSource::new();
        mock.expect_name().return_const(name);
        mock.expect_kind().return_const(SourceKind::YouTube);
        mock.expect_supports_url().return_const(true);
        mock
    }

    #[test]
    fn url_detection() {
        assert!(parse_absolute_url("https://valid/track").is_some());
        assert!(parse_absolute_url("https://www.youtube.com/watch?v=abc").is_some());
        assert!(parse_absolute_url("never gonna give you up").is_none());
        assert!(parse_absolute_url("mailto:someone@example.com").is_none());
    }

    #[test]
    fn missing_fields_use_placeholders() {
        let track = Track::from_info(
            TrackInfo {
                url: "https://example.com/a.mp3".to_string(),
                ..TrackInfo::default()
            },
            SourceKind::Direct,
            UserId::new(1),
        );
        assert_eq!(track.title(), UNKNOWN);
        assert_eq!(track.author(), UNKNOWN);
        assert_eq!(track.thumbnail(), None);
        assert!(track.is_live());
    }

    #[tokio::test]
    async fn falls_through_to_second_backend_on_failure() {
        let mut first = backend("primary");
        first.expect_lookup().times(1).returning(|_| {
            Err(SourceError::Process {
                program: "yt-dlp".to_string(),
                stderr: "boom".to_string(),
            })
        });
        let mut second = backend("secondary");
        second
            .expect_lookup()
            .times(1)
            .returning(|url| Ok(Some(info("Track", url.as_str()))));

        let resolver = TrackResolver::new(vec![Arc::new(first), Arc::new(second)]);
        let track = resolver
            .resolve("https://valid/track", UserId::new(7))
            .await
            .unwrap();

        assert_eq!(track.title(), "Track");
        assert_eq!(track.url(), "https://valid/track");
        assert_eq!(track.requested_by(), UserId::new(7));
    }

    #[tokio::test]
    async fn search_terms_use_search_not_lookup() {
        let mut only = backend("primary");
        only.expect_search()
            .with(eq("lofi beats"))
            .times(1)
            .returning(|_| Ok(Some(info("Lofi", "https://example.com/lofi"))));
        only.expect_lookup().never();

        let resolver = TrackResolver::new(vec![Arc::new(only)]);
        let track = resolver.resolve("  lofi beats ", UserId::new(1)).await.unwrap();
        assert_eq!(track.title(), "Lofi");
    }

    #[tokio::test]
    async fn not_found_is_distinct_from_backend_error() {
        let mut empty = backend("primary");
        empty.expect_search().returning(|_| Ok(None));
        let mut broken = backend("secondary");
        broken
            .expect_search()
            .returning(|_| Err(SourceError::Timeout(Duration::from_secs(1))));

        let resolver = TrackResolver::new(vec![Arc::new(empty), Arc::new(broken)]);
        let err = resolver.resolve("nada", UserId::new(1)).await.unwrap_err();
        assert_eq!(err, ResolveError::NotFound("nada".to_string()));

        let mut broken = backend("only");
        broken
            .expect_search()
            .returning(|_| Err(SourceError::Timeout(Duration::from_secs(1))));
        let resolver = TrackResolver::new(vec![Arc::new(broken)]);
        let err = resolver.resolve("nada", UserId::new(1)).await.unwrap_err();
        assert!(matches!(err, ResolveError::Backend(_)));
    }

    #[tokio::test]
    async fn unsupported_urls_skip_backend() {
        let mut picky = MockMusicSource::new();
        picky.expect_name().return_const("picky");
        picky.expect_supports_url().return_const(false);
        picky.expect_lookup().never();

        let resolver = TrackResolver::new(vec![Arc::new(picky)]);
        let err = resolver
            .resolve("https://example.com/page", UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let resolver = TrackResolver::new(Vec::new());
        assert_eq!(
            resolver.resolve("   ", UserId::new(1)).await.unwrap_err(),
            ResolveError::EmptyQuery
        );
    }
}
