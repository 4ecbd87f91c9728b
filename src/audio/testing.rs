//! Dobles de prueba para el transporte de voz, el lanzador de pipelines y
//! el notificador.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::oneshot;

use super::{
    error::{PipelineError, VoiceError},
    pipeline::{PipelineControl, PipelineHandle, PipelineLauncher, PipelineOutcome},
    session::{GuildSession, Notification, Notifier, SessionDeps, SessionSettings},
    voice::{VoiceConnection, VoiceGateway, VoiceSink},
};
use crate::sources::{SourceKind, Track, TrackInfo};

pub fn voice() -> ChannelId {
    ChannelId::new(100)
}

pub fn text() -> ChannelId {
    ChannelId::new(200)
}

pub fn track(name: &str) -> Track {
    Track::from_info(
        TrackInfo {
            title: Some(name.to_string()),
            url: format!("https://example.com/{}", name),
            duration: Some(Duration::from_secs(180)),
            ..TrackInfo::default()
        },
        SourceKind::YouTube,
        UserId::new(7),
    )
}

/// Deja correr las tareas pendientes
pub async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub struct NullSink;

#[async_trait]
impl VoiceSink for NullSink {
    async fn write(&mut self, _pcm: &[u8]) -> Result<(), VoiceError> {
        Ok(())
    }
    async fn flush(&mut self) -> Result<(), VoiceError> {
        Ok(())
    }
    async fn close(&mut self) {}
}

pub struct FakeConnection {
    channel: ChannelId,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, VoiceError> {
        Ok(Box::new(NullSink))
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    joins: AtomicUsize,
    disconnects: Arc<AtomicUsize>,
    fail_join: AtomicBool,
}

impl FakeGateway {
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn fail_joins(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(VoiceError::Join("canal lleno".to_string()));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            channel: channel_id,
            disconnects: self.disconnects.clone(),
        }))
    }
}

struct Launch {
    url: String,
    volume: f32,
    finish: Option<oneshot::Sender<PipelineOutcome>>,
}

/// Lanzador que no reproduce nada: cada pipeline termina cuando el test
/// lo indica o cuando se cancela
#[derive(Default)]
pub struct FakeLauncher {
    launches: Mutex<Vec<Launch>>,
    failing: Mutex<HashSet<String>>,
    stalling: Mutex<HashSet<String>>,
    unpausable: AtomicBool,
}

impl FakeLauncher {
    pub fn fail_on(&self, track: &Track) {
        self.failing.lock().unwrap().insert(track.url().to_string());
    }

    /// `launch` no vuelve nunca para esta pista
    pub fn stall_on(&self, track: &Track) {
        self.stalling.lock().unwrap().insert(track.url().to_string());
    }

    pub fn set_pausable(&self, pausable: bool) {
        self.unpausable.store(!pausable, Ordering::SeqCst);
    }

    pub fn urls(&self) -> Vec<String> {
        self.launches.lock().unwrap().iter().map(|l| l.url.clone()).collect()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.launches.lock().unwrap().iter().map(|l| l.volume).collect()
    }

    /// Termina el último pipeline lanzado con `outcome`
    pub fn finish_latest(&self, outcome: PipelineOutcome) {
        let mut launches = self.launches.lock().unwrap();
        let latest = launches.last_mut().expect("no pipeline launched");
        if let Some(finish) = latest.finish.take() {
            let _ = finish.send(outcome);
        }
    }
}

#[async_trait]
impl PipelineLauncher for FakeLauncher {
    async fn launch(
        &self,
        track: &Track,
        volume: f32,
        mut sink: Box<dyn VoiceSink>,
    ) -> Result<PipelineHandle, PipelineError> {
        let stalls = self.stalling.lock().unwrap().contains(track.url());
        if stalls {
            std::future::pending::<()>().await;
        }

        let fails = self.failing.lock().unwrap().contains(track.url());
        if fails {
            sink.close().await;
            return Err(PipelineError::Fetch("fallo simulado".to_string()));
        }

        let pausable = !self.unpausable.load(Ordering::SeqCst);
        let (control, cancel, _pause) = PipelineControl::new(pausable);
        let (done_tx, done_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => PipelineOutcome::Cancelled,
                outcome = finish_rx => outcome.unwrap_or(PipelineOutcome::Cancelled),
            };
            sink.close().await;
            let _ = done_tx.send(outcome);
        });

        self.launches.lock().unwrap().push(Launch {
            url: track.url().to_string(),
            volume,
            finish: Some(finish_tx),
        });

        Ok(PipelineHandle {
            control,
            completion: done_rx,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|n| predicate(n)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _guild_id: GuildId, _channel_id: ChannelId, notification: Notification) {
        self.events.lock().unwrap().push(notification);
    }
}

/// Conjunto de dobles compartidos por una sesión de prueba
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub launcher: Arc<FakeLauncher>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: SessionSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            gateway: Arc::new(FakeGateway::default()),
            launcher: Arc::new(FakeLauncher::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            settings: SessionSettings::default(),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            gateway: self.gateway.clone(),
            launcher: self.launcher.clone(),
            notifier: self.notifier.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn session(&self) -> Arc<GuildSession> {
        Arc::new(GuildSession::new(GuildId::new(1), Arc::new(self.deps())))
    }
}
