use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::{process::Stdio, str::FromStr, time::Duration};
use tokio::{io::AsyncRead, process::Child, process::Command};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::error::PipelineError;
use crate::sources::Track;

/// Cómo se obtiene el audio de pistas de YouTube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// stdout de yt-dlp conectado a stdin de ffmpeg
    Pipe,
    /// yt-dlp resuelve una URL directa que ffmpeg abre
    Url,
}

impl FromStr for FetchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pipe" => Ok(FetchMode::Pipe),
            "url" => Ok(FetchMode::Url),
            other => anyhow::bail!("Estrategia de descarga desconocida: {}", other),
        }
    }
}

/// Entrada del transcodificador producida por una estrategia
pub enum FetchedInput {
    /// Bytes que se copian a stdin del transcodificador
    Stream {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        process: Option<Child>,
    },
    /// URL que el transcodificador abre por sí mismo
    Url(String),
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn open(&self, track: &Track) -> Result<FetchedInput, PipelineError>;

    /// Si se puede pausar sin perder datos
    fn supports_pause(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Descarga con un subproceso yt-dlp escribiendo a stdout
pub struct SubprocessFetch {
    program: String,
}

impl SubprocessFetch {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FetchStrategy for SubprocessFetch {
    async fn open(&self, track: &Track) -> Result<FetchedInput, PipelineError> {
        debug!("📥 yt-dlp -> pipe para {}", track.url());

        let mut child = Command::new(&self.program)
            .args([
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                "-o",
                "-",
                track.url(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Fetch("yt-dlp sin stdout".to_string()))?;

        Ok(FetchedInput::Stream {
            reader: Box::new(stdout),
            process: Some(child),
        })
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "subprocess-pipe"
    }
}

/// Descarga HTTP en streaming (URLs de audio directas)
pub struct HttpFetch {
    client: reqwest::Client,
    /// Espera máxima por las cabeceras de la respuesta
    response_timeout: Duration,
}

impl HttpFetch {
    pub fn new(client: reqwest::Client, response_timeout: Duration) -> Self {
        Self {
            client,
            response_timeout,
        }
    }
}

#[async_trait]
impl FetchStrategy for HttpFetch {
    async fn open(&self, track: &Track) -> Result<FetchedInput, PipelineError> {
        debug!("🌐 GET en streaming: {}", track.url());

        let request = self.client.get(track.url()).send();
        let response = tokio::time::timeout(self.response_timeout, request)
            .await
            .map_err(|_| PipelineError::Fetch("el servidor no respondió a tiempo".to_string()))?
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "estado HTTP {}",
                response.status()
            )));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(FetchedInput::Stream {
            reader: Box::new(StreamReader::new(Box::pin(stream))),
            process: None,
        })
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "http-stream"
    }
}

/// Resuelve una URL directa con `yt-dlp -g` y deja que ffmpeg la abra
pub struct ResolvedUrlFetch {
    program: String,
    timeout: Duration,
}

impl ResolvedUrlFetch {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FetchStrategy for ResolvedUrlFetch {
    async fn open(&self, track: &Track) -> Result<FetchedInput, PipelineError> {
        let output = Command::new(&self.program)
            .args([
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                "-g",
                track.url(),
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| PipelineError::Fetch("yt-dlp tardó demasiado".to_string()))?
            .map_err(|source| PipelineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PipelineError::Fetch(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| PipelineError::Fetch("yt-dlp no devolvió URL".to_string()))?;

        info!("🎯 URL directa obtenida para {}", track.title());
        Ok(FetchedInput::Url(url.to_string()))
    }

    fn supports_pause(&self) -> bool {
        // La URL firmada expira si la conexión queda inactiva
        false
    }

    fn name(&self) -> &'static str {
        "resolved-url"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{SourceKind, TrackInfo};
    use serenity::model::id::UserId;

    #[test]
    fn parses_fetch_modes() {
        assert_eq!("pipe".parse::<FetchMode>().unwrap(), FetchMode::Pipe);
        assert_eq!(" URL ".parse::<FetchMode>().unwrap(), FetchMode::Url);
        assert!("torrent".parse::<FetchMode>().is_err());
    }

    #[tokio::test]
    async fn http_fetch_gives_up_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Acepta conexiones y nunca responde
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let fetch = HttpFetch::new(reqwest::Client::new(), Duration::from_millis(300));
        let track = Track::from_info(
            TrackInfo {
                url: format!("http://{}/song.mp3", addr),
                ..TrackInfo::default()
            },
            SourceKind::Direct,
            UserId::new(1),
        );

        let result = tokio::time::timeout(Duration::from_secs(10), fetch.open(&track))
            .await
            .expect("open must not hang");
        assert!(matches!(result, Err(PipelineError::Fetch(_))));
    }

    #[test]
    fn pause_capabilities() {
        assert!(SubprocessFetch::new("yt-dlp").supports_pause());
        assert!(!ResolvedUrlFetch::new("yt-dlp", Duration::from_secs(1)).supports_pause());
    }
}
