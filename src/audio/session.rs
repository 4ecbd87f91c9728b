//! Per-guild playback state machine.
//!
//! Every command and every background event (pipeline completion, grace
//! timer expiry, voice occupancy) goes through the same `tokio::sync::Mutex`
//! around [`SessionState`], so commands for one guild apply in arrival order.
//! The lock is held across voice join and pipeline launch; pipeline playback
//! itself runs in its own task and reports back through
//! [`GuildSession::on_pipeline_end`].
//!
//! Each launched pipeline gets a generation number. A completion is only
//! acted on if its generation is still the active one, which is what keeps
//! `skip` from double-advancing and makes a pipeline cancelled by `stop`
//! harmless when it finally reports.
//!
//! Out-of-band notifications are collected while the lock is held and sent
//! after it is released.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use super::{
    error::{MisuseError, MusicError, PipelineError, VoiceError},
    pipeline::{PipelineControl, PipelineLauncher, PipelineOutcome},
    queue::{MusicQueue, QueueInfo},
    supervisor::{DisconnectReason, GraceKind, GraceTimer},
    voice::{VoiceConnection, VoiceGateway},
};
use crate::{config::Config, sources::Track};

/// Volumen máximo aceptado (200%)
pub const MAX_VOLUME: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Sin conexión de voz ni pista actual
    Idle,
    /// Uniéndose al canal de voz
    Connecting,
    Playing,
    Paused,
    /// Conectado, cola vacía, esperando el periodo de gracia
    Standby,
}

/// Eventos enviados al canal de texto fuera del ciclo de un comando
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TrackStarted { track: Track, loop_enabled: bool },
    TrackFailed { track: Track, reason: String },
    QueueEnded,
    Disconnected(DisconnectReason),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, guild_id: GuildId, channel_id: ChannelId, notification: Notification);
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    pub max_track_duration: Duration,
    pub idle_grace: Duration,
    pub alone_grace: Duration,
    pub default_volume: f32,
    /// Límite para unirse al canal o arrancar un pipeline
    pub start_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_track_duration: config.max_track_duration(),
            idle_grace: config.idle_grace(),
            alone_grace: config.alone_grace(),
            default_volume: config.default_volume,
            start_timeout: config.backend_timeout() * 2,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_track_duration: Duration::from_secs(7200),
            idle_grace: Duration::from_secs(60),
            alone_grace: Duration::from_secs(30),
            default_volume: 1.0,
            start_timeout: Duration::from_secs(30),
        }
    }
}

/// Colaboradores compartidos por todas las sesiones
pub struct SessionDeps {
    pub gateway: Arc<dyn VoiceGateway>,
    pub launcher: Arc<dyn PipelineLauncher>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: SessionSettings,
}

/// Resultado de `request_play`
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started(Track),
    Enqueued { track: Track, position: usize },
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Track,
    pub paused: bool,
    pub loop_enabled: bool,
    pub volume: f32,
    pub queued: usize,
}

struct ActivePipeline {
    generation: u64,
    control: PipelineControl,
    skipped: bool,
}

struct SessionState {
    playback: PlaybackState,
    current: Option<Track>,
    queue: MusicQueue,
    loop_enabled: bool,
    volume: f32,
    connection: Option<Arc<dyn VoiceConnection>>,
    text_channel: Option<ChannelId>,
    active: Option<ActivePipeline>,
    generation: u64,
    timer_seq: u64,
    idle_timer: Option<GraceTimer>,
    alone_timer: Option<GraceTimer>,
}

impl SessionState {
    fn new(settings: &SessionSettings) -> Self {
        Self {
            playback: PlaybackState::Idle,
            current: None,
            queue: MusicQueue::new(settings.max_queue_size),
            loop_enabled: false,
            volume: settings.default_volume,
            connection: None,
            text_channel: None,
            active: None,
            generation: 0,
            timer_seq: 0,
            idle_timer: None,
            alone_timer: None,
        }
    }

    fn timer_slot(&mut self, kind: GraceKind) -> &mut Option<GraceTimer> {
        match kind {
            GraceKind::Idle => &mut self.idle_timer,
            GraceKind::Alone => &mut self.alone_timer,
        }
    }
}

pub struct GuildSession {
    guild_id: GuildId,
    deps: Arc<SessionDeps>,
    state: Mutex<SessionState>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, deps: Arc<SessionDeps>) -> Self {
        let state = SessionState::new(&deps.settings);
        Self {
            guild_id,
            deps,
            state: Mutex::new(state),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Reproduce `track` o lo agrega a la cola si ya hay algo sonando.
    ///
    /// From `Idle` this joins `voice_channel` first. A join or pipeline start
    /// failure leaves the session `Idle` and disconnected.
    pub async fn request_play(
        self: &Arc<Self>,
        track: Track,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<PlayOutcome, MusicError> {
        let max = self.deps.settings.max_track_duration;
        if track.duration() > max {
            return Err(MisuseError::TrackTooLong { max }.into());
        }

        let mut state = self.state.lock().await;
        state.text_channel = Some(text_channel);

        match state.playback {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Connecting => {
                let position = state.queue.enqueue(track.clone())?;
                info!(
                    "📝 [{}] En cola #{}: {}",
                    self.guild_id,
                    position,
                    track.title()
                );
                return Ok(PlayOutcome::Enqueued { track, position });
            }
            PlaybackState::Standby => {
                state.idle_timer = None;
            }
            PlaybackState::Idle => {
                state.playback = PlaybackState::Connecting;
                let limit = self.deps.settings.start_timeout;
                let joined = tokio::time::timeout(
                    limit,
                    self.deps.gateway.join(self.guild_id, voice_channel),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(VoiceError::Join(format!(
                        "sin respuesta tras {}",
                        humantime::format_duration(limit)
                    )))
                });
                match joined {
                    Ok(connection) => {
                        info!("🔊 [{}] Conectado a {}", self.guild_id, voice_channel);
                        state.connection = Some(connection);
                    }
                    Err(e) => {
                        warn!("❌ [{}] No se pudo conectar: {}", self.guild_id, e);
                        state.playback = PlaybackState::Idle;
                        return Err(e.into());
                    }
                }
            }
        }

        match self.start_track(&mut state, track.clone()).await {
            Ok(()) => Ok(PlayOutcome::Started(track)),
            Err(e) => {
                warn!("❌ [{}] No se pudo iniciar {}: {}", self.guild_id, track.title(), e);
                self.shutdown(&mut state).await;
                Err(e.into())
            }
        }
    }

    /// Termina la pista actual; el avance lo hace `on_pipeline_end`
    pub async fn skip(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        let current = state.current.clone().ok_or(MisuseError::NotPlaying)?;
        let active = state.active.as_mut().ok_or(MisuseError::NotPlaying)?;
        if active.skipped {
            return Err(MisuseError::NotPlaying.into());
        }

        active.skipped = true;
        active.control.cancel();
        info!("⏭️ [{}] Saltando: {}", self.guild_id, current.title());
        Ok(current)
    }

    pub async fn pause(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        match state.playback {
            PlaybackState::Playing => {}
            PlaybackState::Paused => return Err(MisuseError::AlreadyPaused.into()),
            _ => return Err(MisuseError::NotPlaying.into()),
        }
        let current = state.current.clone().ok_or(MisuseError::NotPlaying)?;
        let active = state.active.as_ref().ok_or(MisuseError::NotPlaying)?;

        active.control.set_paused(true)?;
        state.playback = PlaybackState::Paused;
        info!("⏸️ [{}] Pausado", self.guild_id);
        Ok(current)
    }

    pub async fn resume(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        match state.playback {
            PlaybackState::Paused => {}
            PlaybackState::Playing => return Err(MisuseError::NotPaused.into()),
            _ => return Err(MisuseError::NotPlaying.into()),
        }
        let current = state.current.clone().ok_or(MisuseError::NotPlaying)?;
        let active = state.active.as_ref().ok_or(MisuseError::NotPlaying)?;

        active.control.set_paused(false)?;
        state.playback = PlaybackState::Playing;
        info!("▶️ [{}] Reanudado", self.guild_id);
        Ok(current)
    }

    /// Detiene todo, vacía la cola y sale del canal de voz.
    ///
    /// Returns how many queued tracks were dropped.
    pub async fn stop(&self) -> Result<usize, MusicError> {
        let mut state = self.state.lock().await;
        if state.connection.is_none() && state.playback == PlaybackState::Idle {
            return Err(MisuseError::NotConnected.into());
        }
        Ok(self.shutdown(&mut state).await)
    }

    /// Igual que `stop`
    pub async fn leave(&self) -> Result<usize, MusicError> {
        self.stop().await
    }

    pub async fn toggle_loop(&self) -> bool {
        let mut state = self.state.lock().await;
        state.loop_enabled = !state.loop_enabled;
        info!("🔁 [{}] Loop: {}", self.guild_id, state.loop_enabled);
        state.loop_enabled
    }

    /// Mezcla la cola sin tocar la pista actual; devuelve su tamaño
    pub async fn shuffle(&self) -> Result<usize, MusicError> {
        let mut state = self.state.lock().await;
        state.queue.shuffle()?;
        Ok(state.queue.len())
    }

    /// Elimina la canción en `position` (1-based)
    pub async fn remove(&self, position: usize) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        Ok(state.queue.remove(position)?)
    }

    pub async fn clear(&self) -> Result<usize, MusicError> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            return Err(MisuseError::QueueEmpty.into());
        }
        Ok(state.queue.clear())
    }

    pub async fn queue_info(&self) -> QueueInfo {
        let state = self.state.lock().await;
        QueueInfo {
            current: state.current.clone(),
            items: state.queue.snapshot(),
            loop_enabled: state.loop_enabled,
            paused: state.playback == PlaybackState::Paused,
            total_duration: state.queue.total_duration(),
        }
    }

    pub async fn now_playing(&self) -> Result<NowPlaying, MusicError> {
        let state = self.state.lock().await;
        let track = state.current.clone().ok_or(MisuseError::NotPlaying)?;
        Ok(NowPlaying {
            track,
            paused: state.playback == PlaybackState::Paused,
            loop_enabled: state.loop_enabled,
            volume: state.volume,
            queued: state.queue.len(),
        })
    }

    /// Cambia el volumen de las próximas pistas; devuelve el valor aplicado
    pub async fn set_volume(&self, volume: f32) -> f32 {
        let mut state = self.state.lock().await;
        state.volume = volume.clamp(0.0, MAX_VOLUME);
        info!("🔊 [{}] Volumen: {:.0}%", self.guild_id, state.volume * 100.0);
        state.volume
    }

    /// Volumen que usará la próxima pista
    pub async fn volume(&self) -> f32 {
        self.state.lock().await.volume
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.state.lock().await.playback
    }

    pub async fn voice_channel(&self) -> Option<ChannelId> {
        let state = self.state.lock().await;
        state.connection.as_ref().map(|c| c.channel_id())
    }

    /// Arranca o cancela el periodo de gracia por quedarse solo
    pub async fn set_alone(self: &Arc<Self>, alone: bool) {
        let mut state = self.state.lock().await;
        if !alone {
            if state.alone_timer.take().is_some() {
                debug!("👥 [{}] Alguien volvió al canal", self.guild_id);
            }
            return;
        }
        if state.connection.is_none() || state.alone_timer.is_some() {
            return;
        }
        info!("👤 [{}] Solo en el canal de voz", self.guild_id);
        self.arm_timer(&mut state, GraceKind::Alone);
    }

    /// La conexión de voz se perdió desde fuera
    pub async fn connection_lost(&self) {
        let channel = {
            let mut state = self.state.lock().await;
            if state.connection.take().is_none() {
                return;
            }
            warn!("🔌 [{}] Desconectado externamente", self.guild_id);
            self.shutdown(&mut state).await;
            state.text_channel
        };
        self.dispatch(
            channel,
            vec![Notification::Disconnected(DisconnectReason::External)],
        )
        .await;
    }

    /// Procesa el fin de un pipeline: loop, siguiente en cola o espera
    pub async fn on_pipeline_end(self: &Arc<Self>, generation: u64, outcome: PipelineOutcome) {
        let mut outbox = Vec::new();
        let channel = {
            let mut state = self.state.lock().await;
            let is_active = state
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            if !is_active {
                debug!(
                    "🗑️ [{}] Fin de pipeline obsoleto #{} ignorado",
                    self.guild_id, generation
                );
                return;
            }
            let skipped = state.active.take().is_some_and(|active| active.skipped);
            let finished = state.current.take();

            let replay = match (outcome, finished) {
                (PipelineOutcome::Failed(reason), Some(track)) => {
                    warn!("💥 [{}] Falló {}: {}", self.guild_id, track.title(), reason);
                    outbox.push(Notification::TrackFailed { track, reason });
                    None
                }
                (PipelineOutcome::Finished, Some(track)) if state.loop_enabled && !skipped => {
                    Some(track)
                }
                _ => None,
            };

            self.advance(&mut state, replay, &mut outbox).await;
            state.text_channel
        };
        self.dispatch(channel, outbox).await;
    }

    /// Inicia la siguiente pista posible o pasa a `Standby`
    async fn advance(
        self: &Arc<Self>,
        state: &mut SessionState,
        replay: Option<Track>,
        outbox: &mut Vec<Notification>,
    ) {
        if let Some(track) = replay {
            match self.start_track(state, track.clone()).await {
                Ok(()) => {
                    debug!("🔁 [{}] Repitiendo: {}", self.guild_id, track.title());
                    return;
                }
                Err(e) => outbox.push(Notification::TrackFailed {
                    track,
                    reason: e.to_string(),
                }),
            }
        }

        while let Some(track) = state.queue.dequeue() {
            match self.start_track(state, track.clone()).await {
                Ok(()) => {
                    outbox.push(Notification::TrackStarted {
                        track,
                        loop_enabled: state.loop_enabled,
                    });
                    return;
                }
                Err(e) => {
                    warn!("❌ [{}] No se pudo iniciar {}: {}", self.guild_id, track.title(), e);
                    outbox.push(Notification::TrackFailed {
                        track,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("📭 [{}] Cola terminada", self.guild_id);
        state.playback = PlaybackState::Standby;
        outbox.push(Notification::QueueEnded);
        self.arm_timer(state, GraceKind::Idle);
    }

    async fn start_track(
        self: &Arc<Self>,
        state: &mut SessionState,
        track: Track,
    ) -> Result<(), PipelineError> {
        let connection = state
            .connection
            .clone()
            .ok_or(PipelineError::Voice(VoiceError::SinkClosed))?;
        let volume = state.volume;
        let start = async {
            let sink = connection.open_sink().await?;
            let handle = self.deps.launcher.launch(&track, volume, sink).await?;
            Ok::<_, PipelineError>(handle)
        };
        // Se ejecuta con el lock tomado: nunca esperar sin límite
        let after = self.deps.settings.start_timeout;
        let handle = tokio::time::timeout(after, start)
            .await
            .map_err(|_| PipelineError::StartTimeout { after })??;

        state.generation += 1;
        let generation = state.generation;
        state.active = Some(ActivePipeline {
            generation,
            control: handle.control,
            skipped: false,
        });
        info!("🎵 [{}] Reproduciendo: {}", self.guild_id, track.title());
        state.current = Some(track);
        state.playback = PlaybackState::Playing;
        state.idle_timer = None;

        self.watch_pipeline(generation, handle.completion);
        Ok(())
    }

    fn watch_pipeline(self: &Arc<Self>, generation: u64, completion: oneshot::Receiver<PipelineOutcome>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = completion.await.unwrap_or_else(|_| {
                PipelineOutcome::Failed("el pipeline terminó sin reportar resultado".to_string())
            });
            session.on_pipeline_end(generation, outcome).await;
        });
    }

    fn arm_timer(self: &Arc<Self>, state: &mut SessionState, kind: GraceKind) {
        state.timer_seq += 1;
        let id = state.timer_seq;
        let delay = match kind {
            GraceKind::Idle => self.deps.settings.idle_grace,
            GraceKind::Alone => self.deps.settings.alone_grace,
        };
        let session = Arc::clone(self);
        let timer = GraceTimer::arm(id, delay, move || async move {
            session.on_grace_expired(kind, id).await;
        });
        *state.timer_slot(kind) = Some(timer);
    }

    async fn on_grace_expired(&self, kind: GraceKind, id: u64) {
        let channel = {
            let mut state = self.state.lock().await;
            let armed = state.timer_slot(kind).as_ref().map(GraceTimer::id);
            if armed != Some(id) {
                debug!("⏱️ [{}] Timer {:?} #{} ya no aplica", self.guild_id, kind, id);
                return;
            }
            *state.timer_slot(kind) = None;

            if kind == GraceKind::Idle
                && (state.playback != PlaybackState::Standby || !state.queue.is_empty())
            {
                return;
            }

            info!("⏏️ [{}] Periodo de gracia {:?} vencido, desconectando", self.guild_id, kind);
            self.shutdown(&mut state).await;
            state.text_channel
        };
        self.dispatch(channel, vec![Notification::Disconnected(kind.into())])
            .await;
    }

    /// Vuelve a `Idle`: cancela el pipeline, vacía la cola, desconecta
    async fn shutdown(&self, state: &mut SessionState) -> usize {
        if let Some(active) = state.active.take() {
            active.control.cancel();
        }
        state.current = None;
        let cleared = state.queue.clear();
        state.idle_timer = None;
        state.alone_timer = None;
        state.loop_enabled = false;
        state.playback = PlaybackState::Idle;

        if let Some(connection) = state.connection.take() {
            if let Err(e) = connection.disconnect().await {
                warn!("⚠️ [{}] Error al desconectar: {}", self.guild_id, e);
            }
        }
        info!("⏹️ [{}] Sesión en reposo", self.guild_id);
        cleared
    }

    async fn dispatch(&self, channel: Option<ChannelId>, outbox: Vec<Notification>) {
        if outbox.is_empty() {
            return;
        }
        let Some(channel) = channel else {
            debug!("[{}] Sin canal de texto para notificar", self.guild_id);
            return;
        };
        for notification in outbox {
            self.deps
                .notifier
                .notify(self.guild_id, channel, notification)
                .await;
        }
    }
}
