//! Idle/disconnect supervision.
//!
//! Two grace periods end a guild's voice connection: the bot being left
//! alone in its channel, and the queue running dry. Both are [`GraceTimer`]s
//! owned by the guild session. A timer carries an id; when it fires, the
//! session only acts if that same id is still armed, so a timer replaced or
//! cancelled by later activity can never disconnect an active session.

use serenity::model::id::{ChannelId, GuildId};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::SessionRegistry;

/// Qué periodo de gracia venció
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceKind {
    /// Cola vacía sin nuevas peticiones
    Idle,
    /// El bot quedó solo en el canal
    Alone,
}

/// Motivo de una desconexión no solicitada por comando
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Idle,
    Alone,
    /// Alguien desconectó al bot del canal
    External,
}

impl From<GraceKind> for DisconnectReason {
    fn from(kind: GraceKind) -> Self {
        match kind {
            GraceKind::Idle => DisconnectReason::Idle,
            GraceKind::Alone => DisconnectReason::Alone,
        }
    }
}

/// Temporizador cancelable; se cancela al soltarlo
#[derive(Debug)]
pub struct GraceTimer {
    id: u64,
    token: CancellationToken,
}

impl GraceTimer {
    /// Ejecuta `on_expire` tras `delay` salvo que el timer se cancele antes
    pub fn arm<F, Fut>(id: u64, delay: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("⏱️ Timer {} cancelado", id);
                }
                _ = tokio::time::sleep(delay) => on_expire().await,
            }
        });

        Self { id, token }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for GraceTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Conecta los eventos de ocupación de voz con las sesiones
pub struct IdleSupervisor {
    registry: Arc<SessionRegistry>,
}

impl IdleSupervisor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Canal de voz del bot en la guild, si hay sesión conectada
    pub async fn watched_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry.get(guild_id)?.voice_channel().await
    }

    /// `listeners` = usuarios (no bots) en el canal del bot
    pub async fn occupancy_changed(&self, guild_id: GuildId, listeners: usize) {
        if let Some(session) = self.registry.get(guild_id) {
            session.set_alone(listeners == 0).await;
        }
    }

    /// El bot salió del canal sin pasar por `stop`/`leave`
    pub async fn bot_disconnected(&self, guild_id: GuildId) {
        if let Some(session) = self.registry.get(guild_id) {
            session.connection_lost().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        pipeline::PipelineOutcome,
        session::{Notification, PlaybackState},
        testing::{settle, text, track, voice, Harness},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _timer = GraceTimer::arm(1, Duration::from_secs(30), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = GraceTimer::arm(7, Duration::from_secs(30), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(timer.id(), 7);
        drop(timer);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn occupancy_reaches_the_session_through_the_registry() {
        let harness = Harness::new();
        let registry = Arc::new(SessionRegistry::new(harness.deps()));
        let supervisor = IdleSupervisor::new(registry.clone());
        let guild = GuildId::new(1);

        // Sin sesión no se crea ninguna
        supervisor.occupancy_changed(guild, 0).await;
        assert!(supervisor.watched_channel(guild).await.is_none());
        assert!(registry.is_empty());

        let session = registry.get_or_create(guild);
        session.request_play(track("a"), voice(), text()).await.unwrap();
        assert_eq!(supervisor.watched_channel(guild).await, Some(voice()));

        supervisor.occupancy_changed(guild, 0).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        supervisor.occupancy_changed(guild, 2).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(session.playback_state().await, PlaybackState::Playing);

        supervisor.occupancy_changed(guild, 0).await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        assert_eq!(session.playback_state().await, PlaybackState::Idle);
        assert!(supervisor.watched_channel(guild).await.is_none());
        assert_eq!(harness.gateway.disconnects(), 1);
        assert_eq!(
            harness.notifier.events(),
            vec![Notification::Disconnected(DisconnectReason::Alone)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bot_disconnect_stops_the_session_once() {
        let harness = Harness::new();
        let registry = Arc::new(SessionRegistry::new(harness.deps()));
        let supervisor = IdleSupervisor::new(registry.clone());
        let guild = GuildId::new(1);

        let session = registry.get_or_create(guild);
        session.request_play(track("a"), voice(), text()).await.unwrap();
        session.request_play(track("b"), voice(), text()).await.unwrap();

        supervisor.bot_disconnected(guild).await;
        // El evento de voz puede repetirse
        supervisor.bot_disconnected(guild).await;
        settle().await;

        assert_eq!(session.playback_state().await, PlaybackState::Idle);
        assert!(session.queue_info().await.items.is_empty());
        assert_eq!(harness.gateway.disconnects(), 0);
        assert_eq!(
            harness.notifier.events(),
            vec![Notification::Disconnected(DisconnectReason::External)]
        );

        harness.launcher.finish_latest(PipelineOutcome::Finished);
        settle().await;
        assert_eq!(harness.notifier.events().len(), 1);
    }
}
