use std::time::Duration;
use thiserror::Error;

use crate::sources::ResolveError;

/// Fallos del transporte de voz
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VoiceError {
    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),
    #[error("no se pudo abrir el canal de audio: {0}")]
    Sink(String),
    #[error("el canal de audio está cerrado")]
    SinkClosed,
    #[error("no se pudo desconectar: {0}")]
    Disconnect(String),
}

/// Fallos al arrancar un pipeline de audio
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no se pudo iniciar {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no se pudo obtener el audio: {0}")]
    Fetch(String),
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error("el audio no arrancó en {}", human_duration(.after))]
    StartTimeout { after: Duration },
}

/// Uso incorrecto de un comando, reportado al solicitante sin cambiar estado
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MisuseError {
    #[error("No hay nada reproduciéndose")]
    NotPlaying,
    #[error("La reproducción no está pausada")]
    NotPaused,
    #[error("La reproducción ya está pausada")]
    AlreadyPaused,
    #[error("Esta fuente no permite pausar")]
    PauseUnsupported,
    #[error("La cola está vacía")]
    QueueEmpty,
    #[error("Se necesitan al menos 2 canciones en la cola para mezclar")]
    NotEnoughTracks,
    #[error("Posición {index} fuera de rango (la cola tiene {len} canciones)")]
    InvalidIndex { index: usize, len: usize },
    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },
    #[error("No estoy conectado a un canal de voz")]
    NotConnected,
    #[error("La canción supera la duración máxima de {}", human_duration(.max))]
    TrackTooLong { max: Duration },
    #[error("Debes estar en un canal de voz")]
    NotInVoiceChannel,
}

fn human_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// Error devuelto por cualquier comando de una sesión de guild
#[derive(Debug, Error)]
pub enum MusicError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error("No se pudo iniciar la reproducción: {0}")]
    PipelineStart(#[from] PipelineError),
    #[error(transparent)]
    Misuse(#[from] MisuseError),
}

impl From<VoiceError> for MusicError {
    fn from(e: VoiceError) -> Self {
        MusicError::PipelineStart(PipelineError::Voice(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misuse_messages_are_readable() {
        let err = MusicError::from(MisuseError::InvalidIndex { index: 5, len: 2 });
        assert_eq!(
            err.to_string(),
            "Posición 5 fuera de rango (la cola tiene 2 canciones)"
        );
        let err = MisuseError::TrackTooLong {
            max: Duration::from_secs(3600),
        };
        assert_eq!(err.to_string(), "La canción supera la duración máxima de 1h");
    }
}
