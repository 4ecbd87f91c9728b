//! Songbird implementation of the voice transport.
//!
//! A sink is a bounded `flume` channel: the pipeline task writes converted
//! PCM into it and songbird's mixer reads it through [`PcmReceiver`], a
//! blocking `Read` wrapped in a [`RawAdapter`]. `RawAdapter` expects
//! interleaved `f32` samples, so [`SongbirdSink::write`] converts the s16le
//! frames on the way in.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut, BufMut};
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Call, Songbird,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
    time::Duration,
};
use symphonia_core::io::MediaSource;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info};

use crate::audio::{
    error::VoiceError,
    voice::{VoiceConnection, VoiceGateway, VoiceSink, CHANNELS, SAMPLE_RATE},
};

/// Frames de 20ms en tránsito (~2s de audio)
const SINK_BUFFER_FRAMES: usize = 100;
/// Espera máxima del mezclador antes de rellenar con silencio
const UNDERRUN_WAIT: Duration = Duration::from_millis(20);
/// Bytes de silencio f32 por lectura vacía (20ms estéreo)
const SILENCE_BYTES: usize = 960 * CHANNELS as usize * 4;
/// Bytes de una muestra estéreo en f32
const F32_FRAME: usize = CHANNELS as usize * 4;
const FLUSH_POLL: Duration = Duration::from_millis(20);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
            channel_id,
            call,
        }))
    }
}

pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, VoiceError> {
        let (tx, rx) = flume::bounded(SINK_BUFFER_FRAMES);
        let input: Input = RawAdapter::new(PcmReceiver::new(rx), SAMPLE_RATE, CHANNELS).into();

        let track = self.call.lock().await.play_only_input(input);
        debug!("🎚️ Nuevo sink de audio en guild {}", self.guild_id);

        Ok(Box::new(SongbirdSink {
            tx: Some(tx),
            track,
        }))
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::Disconnect(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

pub struct SongbirdSink {
    tx: Option<flume::Sender<Bytes>>,
    track: TrackHandle,
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), VoiceError> {
        let tx = self.tx.as_ref().ok_or(VoiceError::SinkClosed)?;
        tx.send_async(s16le_to_f32le(pcm))
            .await
            .map_err(|_| VoiceError::SinkClosed)
    }

    async fn flush(&mut self) -> Result<(), VoiceError> {
        let tx = self.tx.as_ref().ok_or(VoiceError::SinkClosed)?;
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        while !tx.is_empty() && !tx.is_disconnected() && Instant::now() < deadline {
            tokio::time::sleep(FLUSH_POLL).await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.tx = None;
        if let Err(e) = self.track.stop() {
            debug!("Track ya detenido: {}", e);
        }
    }
}

/// Convierte PCM s16le intercalado a f32le intercalado
fn s16le_to_f32le(pcm: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(pcm.len() * 2);
    for sample in pcm.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        out.put_f32_le(f32::from(value) / 32768.0);
    }
    out.freeze()
}

/// Lado de lectura del sink, consumido por el mezclador de songbird
pub struct PcmReceiver {
    rx: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl PcmReceiver {
    fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for PcmReceiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            // Silencio solo en frames completos para no desalinear muestras
            let silence = buf.len().min(SILENCE_BYTES) / F32_FRAME * F32_FRAME;
            let next = if silence == 0 {
                self.rx.recv().map_err(|_| ())
            } else {
                match self.rx.recv_timeout(UNDERRUN_WAIT) {
                    Ok(chunk) => Ok(chunk),
                    Err(flume::RecvTimeoutError::Timeout) => {
                        buf[..silence].fill(0);
                        return Ok(silence);
                    }
                    Err(flume::RecvTimeoutError::Disconnected) => Err(()),
                }
            };
            match next {
                Ok(chunk) => self.pending = chunk,
                Err(()) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Seek for PcmReceiver {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "el audio en vivo no admite seek",
        ))
    }
}

impl MediaSource for PcmReceiver {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
