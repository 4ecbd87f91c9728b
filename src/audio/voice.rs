//! Voice transport seam.
//!
//! The session never talks to the Discord voice driver directly: it joins a
//! channel through a [`VoiceGateway`], keeps the resulting
//! [`VoiceConnection`] for as long as it stays in the channel, and opens a
//! fresh [`VoiceSink`] for every pipeline. Sinks accept interleaved stereo
//! 16-bit little-endian PCM at 48kHz.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use super::error::VoiceError;

/// Frecuencia de muestreo del PCM entregado al sink
pub const SAMPLE_RATE: u32 = 48_000;
/// Canales del PCM entregado al sink
pub const CHANNELS: u32 = 2;
/// Bytes de un frame de 20ms (960 muestras * 2 canales * 2 bytes)
pub const FRAME_BYTES: usize = 960 * CHANNELS as usize * 2;

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, VoiceError>;

    async fn disconnect(&self) -> Result<(), VoiceError>;
}

#[async_trait]
pub trait VoiceSink: Send {
    /// Escribe PCM; espera si el driver va atrasado
    async fn write(&mut self, pcm: &[u8]) -> Result<(), VoiceError>;

    /// Espera a que el driver consuma todo lo escrito
    async fn flush(&mut self) -> Result<(), VoiceError>;

    /// Cierra el lado de escritura; no falla
    async fn close(&mut self);
}
