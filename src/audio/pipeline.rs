//! Fetch → transcode → voice sink streaming chain.
//!
//! One [`AudioPipeline::launch`] call produces one running pipeline: the
//! fetch stage (a [`FetchStrategy`]) feeds the transcoder's stdin from its
//! own task, while the pipeline task copies fixed-format PCM from the
//! transcoder's stdout into the [`VoiceSink`]. The copy is the long-lived
//! suspension point and races against the pipeline's cancellation token.
//!
//! Every exit path (natural end, cancellation, failure, or a failed start)
//! runs [`Stages::teardown`], which kills both subprocesses, aborts the
//! feeder and closes the sink. Teardown problems are logged, never returned.
//! The outcome is sent exactly once, after teardown has finished.

use async_trait::async_trait;
use std::{io, process::Stdio, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    error::{MisuseError, PipelineError},
    fetch::{FetchMode, FetchStrategy, FetchedInput, HttpFetch, ResolvedUrlFetch, SubprocessFetch},
    voice::{VoiceSink, CHANNELS, FRAME_BYTES, SAMPLE_RATE},
};
use crate::{
    config::Config,
    sources::{SourceKind, Track},
};

/// Tiempo máximo esperando a que un subproceso muera
const KILL_TIMEOUT: Duration = Duration::from_secs(5);
/// Bytes de stderr conservados para el mensaje de error
const STDERR_TAIL: usize = 2048;

/// Cómo terminó un pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Finished,
    Cancelled,
    Failed(String),
}

/// Control de un pipeline en ejecución
#[derive(Debug)]
pub struct PipelineControl {
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
    pausable: bool,
}

impl PipelineControl {
    pub fn new(pausable: bool) -> (Self, CancellationToken, watch::Receiver<bool>) {
        let cancel = CancellationToken::new();
        let (pause, pause_rx) = watch::channel(false);
        let control = Self {
            cancel: cancel.clone(),
            pause,
            pausable,
        };
        (control, cancel, pause_rx)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn set_paused(&self, paused: bool) -> Result<(), MisuseError> {
        if !self.pausable {
            return Err(MisuseError::PauseUnsupported);
        }
        self.pause.send_replace(paused);
        Ok(())
    }
}

/// Pipeline recién lanzado: control + señal de fin (se dispara una vez)
pub struct PipelineHandle {
    pub control: PipelineControl,
    pub completion: oneshot::Receiver<PipelineOutcome>,
}

#[async_trait]
pub trait PipelineLauncher: Send + Sync {
    /// Arranca un pipeline para `track` escribiendo en `sink`.
    ///
    /// On error the sink has already been closed.
    async fn launch(
        &self,
        track: &Track,
        volume: f32,
        sink: Box<dyn VoiceSink>,
    ) -> Result<PipelineHandle, PipelineError>;
}

#[derive(Debug, Clone, PartialEq)]
enum TranscoderKind {
    Ffmpeg,
    #[cfg(test)]
    Passthrough,
    /// Script de `sh -c`
    #[cfg(test)]
    Script(String),
}

/// Subproceso que convierte la entrada a PCM s16le estéreo 48kHz
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
    kind: TranscoderKind,
}

impl Transcoder {
    pub fn ffmpeg(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            kind: TranscoderKind::Ffmpeg,
        }
    }

    /// `cat` como transcodificador: copia stdin a stdout sin tocar nada
    #[cfg(test)]
    pub fn passthrough() -> Self {
        Self {
            program: "cat".to_string(),
            kind: TranscoderKind::Passthrough,
        }
    }

    #[cfg(test)]
    pub fn script(script: &str) -> Self {
        Self {
            program: "sh".to_string(),
            kind: TranscoderKind::Script(script.to_string()),
        }
    }

    fn command(&self, input: &str, streaming: bool, volume: f32) -> Command {
        let mut command = Command::new(&self.program);

        match &self.kind {
            TranscoderKind::Ffmpeg => {
                command.args(["-hide_banner", "-loglevel", "error"]);
                if !streaming {
                    command.args(["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"]);
                }
                command
                    .args(["-i", input, "-vn", "-af"])
                    .arg(format!("volume={:.2}", volume))
                    .args(["-f", "s16le", "-ar"])
                    .arg(SAMPLE_RATE.to_string())
                    .arg("-ac")
                    .arg(CHANNELS.to_string())
                    .arg("pipe:1");
            }
            #[cfg(test)]
            TranscoderKind::Passthrough => {}
            #[cfg(test)]
            TranscoderKind::Script(script) => {
                command.arg("-c").arg(script);
            }
        }

        command
            .stdin(if streaming { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Lanzador real: estrategia de descarga según la fuente + transcodificador
pub struct AudioPipeline {
    youtube: Arc<dyn FetchStrategy>,
    direct: Arc<dyn FetchStrategy>,
    transcoder: Transcoder,
}

impl AudioPipeline {
    pub fn new(
        youtube: Arc<dyn FetchStrategy>,
        direct: Arc<dyn FetchStrategy>,
        transcoder: Transcoder,
    ) -> Self {
        Self {
            youtube,
            direct,
            transcoder,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let youtube: Arc<dyn FetchStrategy> = match config.fetch_mode {
            FetchMode::Pipe => Arc::new(SubprocessFetch::new(config.ytdlp_path.clone())),
            FetchMode::Url => Arc::new(ResolvedUrlFetch::new(
                config.ytdlp_path.clone(),
                config.backend_timeout(),
            )),
        };
        let client = reqwest::Client::builder()
            .connect_timeout(config.backend_timeout())
            .build()?;

        Ok(Self::new(
            youtube,
            Arc::new(HttpFetch::new(client, config.backend_timeout())),
            Transcoder::ffmpeg(config.ffmpeg_path.clone()),
        ))
    }

    fn strategy_for(&self, track: &Track) -> Arc<dyn FetchStrategy> {
        match track.source_kind() {
            SourceKind::YouTube => self.youtube.clone(),
            SourceKind::Direct => self.direct.clone(),
        }
    }

    /// Abre la descarga y arranca el transcodificador
    async fn start_stages(
        &self,
        strategy: &dyn FetchStrategy,
        track: &Track,
        volume: f32,
        stages: &mut Stages,
    ) -> Result<ChildStdout, PipelineError> {
        let (input, reader) = match strategy.open(track).await? {
            FetchedInput::Stream { reader, process } => {
                stages.fetch_process = process;
                ("pipe:0".to_string(), Some(reader))
            }
            FetchedInput::Url(url) => (url, None),
        };

        let mut child = self
            .transcoder
            .command(&input, reader.is_some(), volume)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: self.transcoder.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stdin = child.stdin.take();
        // stderr se vacía en paralelo: un pipe lleno detendría al transcodificador
        stages.stderr = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));
        stages.transcoder = Some(child);

        let stdout =
            stdout.ok_or_else(|| PipelineError::Fetch("transcodificador sin stdout".to_string()))?;

        if let Some(reader) = reader {
            let stdin =
                stdin.ok_or_else(|| PipelineError::Fetch("transcodificador sin stdin".to_string()))?;
            stages.feeder = Some(tokio::spawn(feed(reader, stdin)));
        }

        Ok(stdout)
    }
}

#[async_trait]
impl PipelineLauncher for AudioPipeline {
    async fn launch(
        &self,
        track: &Track,
        volume: f32,
        sink: Box<dyn VoiceSink>,
    ) -> Result<PipelineHandle, PipelineError> {
        let strategy = self.strategy_for(track);
        let mut stages = Stages::new(sink, track.title());

        let stdout = match self.start_stages(&*strategy, track, volume, &mut stages).await {
            Ok(stdout) => stdout,
            Err(e) => {
                stages.teardown().await;
                return Err(e);
            }
        };

        info!("▶️ Pipeline {} iniciado para: {}", strategy.name(), track.title());

        let (control, cancel, pause_rx) = PipelineControl::new(strategy.supports_pause());
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => PipelineOutcome::Cancelled,
                outcome = stream_to_sink(&mut stages, stdout, pause_rx) => outcome,
            };
            stages.teardown().await;
            debug!("🏁 Pipeline terminado: {:?}", outcome);
            let _ = done_tx.send(outcome);
        });

        Ok(PipelineHandle {
            control,
            completion: done_rx,
        })
    }
}

/// Copia la descarga a stdin del transcodificador; cerrar stdin marca EOF
async fn feed(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    mut stdin: tokio::process::ChildStdin,
) -> io::Result<u64> {
    let copied = tokio::io::copy(&mut reader, &mut stdin).await;
    drop(stdin);
    copied
}

/// Recursos de un pipeline; liberados siempre por `teardown`
struct Stages {
    label: String,
    fetch_process: Option<Child>,
    transcoder: Option<Child>,
    stderr: Option<JoinHandle<String>>,
    feeder: Option<JoinHandle<io::Result<u64>>>,
    sink: Option<Box<dyn VoiceSink>>,
}

impl Stages {
    fn new(sink: Box<dyn VoiceSink>, label: &str) -> Self {
        Self {
            label: label.to_string(),
            fetch_process: None,
            transcoder: None,
            stderr: None,
            feeder: None,
            sink: Some(sink),
        }
    }

    async fn teardown(&mut self) {
        let mut problems = Vec::new();

        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }

        for (stage, child) in [
            ("descarga", self.fetch_process.take()),
            ("transcodificador", self.transcoder.take()),
        ] {
            if let Some(mut child) = child {
                if let Err(e) = terminate(&mut child).await {
                    problems.push(format!("{}: {}", stage, e));
                }
            }
        }

        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }

        if problems.is_empty() {
            debug!("🧹 Pipeline liberado: {}", self.label);
        } else {
            warn!("⚠️ Problemas liberando pipeline {}: {}", self.label, problems.join("; "));
        }
    }

    /// Últimos bytes de stderr del transcodificador
    async fn stderr_tail(&mut self) -> String {
        let Some(mut stderr) = self.stderr.take() else {
            return String::new();
        };
        match tokio::time::timeout(KILL_TIMEOUT, &mut stderr).await {
            Ok(Ok(tail)) => tail,
            _ => {
                stderr.abort();
                String::new()
            }
        }
    }
}

/// Lee stderr hasta EOF conservando solo los últimos `STDERR_TAIL` bytes
async fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(STDERR_TAIL * 2);
    let mut buf = [0u8; 1024];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL {
                    let excess = tail.len() - STDERR_TAIL;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

/// Mata un subproceso si sigue vivo y espera su salida
async fn terminate(child: &mut Child) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    child.start_kill()?;
    match tokio::time::timeout(KILL_TIMEOUT, child.wait()).await {
        Ok(status) => status.map(|_| ()),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "el subproceso no terminó a tiempo",
        )),
    }
}

/// Llena `buf` salvo EOF; devuelve los bytes leídos
async fn read_frame(stdout: &mut ChildStdout, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stdout.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn stream_to_sink(
    stages: &mut Stages,
    mut stdout: ChildStdout,
    mut pause: watch::Receiver<bool>,
) -> PipelineOutcome {
    let mut buf = vec![0u8; FRAME_BYTES];
    let mut total: u64 = 0;

    loop {
        loop {
            let paused = *pause.borrow_and_update();
            if !paused {
                break;
            }
            if pause.changed().await.is_err() {
                break;
            }
        }

        let n = match read_frame(&mut stdout, &mut buf).await {
            Ok(n) => n,
            Err(e) => return PipelineOutcome::Failed(format!("error leyendo audio: {}", e)),
        };
        // Solo frames completos (4 bytes por muestra estéreo)
        let n = n - n % 4;
        if n == 0 {
            break;
        }

        let Some(sink) = stages.sink.as_mut() else {
            return PipelineOutcome::Failed("el canal de audio no existe".to_string());
        };
        if let Err(e) = sink.write(&buf[..n]).await {
            return PipelineOutcome::Failed(e.to_string());
        }
        total += n as u64;
    }

    if let Some(outcome) = check_exit(stages, total).await {
        return outcome;
    }

    if let Some(sink) = stages.sink.as_mut() {
        if let Err(e) = sink.flush().await {
            return PipelineOutcome::Failed(e.to_string());
        }
    }

    debug!("📤 {} bytes de PCM enviados", total);
    PipelineOutcome::Finished
}

/// Revisa cómo terminaron los subprocesos tras el EOF
async fn check_exit(stages: &mut Stages, total: u64) -> Option<PipelineOutcome> {
    if let Some(transcoder) = stages.transcoder.as_mut() {
        match transcoder.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => {
                let detail = stages.stderr_tail().await;
                return Some(PipelineOutcome::Failed(format!(
                    "el transcodificador terminó con {}: {}",
                    status, detail
                )));
            }
            Err(e) => return Some(PipelineOutcome::Failed(e.to_string())),
        }
    }

    let feed_result = match stages.feeder.take() {
        Some(feeder) => feeder.await.ok(),
        None => None,
    };
    if let Some(Err(e)) = feed_result {
        if total == 0 {
            return Some(PipelineOutcome::Failed(format!("la descarga falló: {}", e)));
        }
        debug!("Descarga terminó con error tras enviar audio: {}", e);
    }

    if let Some(fetch) = stages.fetch_process.as_mut() {
        if let Ok(status) = fetch.wait().await {
            if !status.success() && total == 0 {
                return Some(PipelineOutcome::Failed(format!(
                    "la descarga terminó con {}",
                    status
                )));
            }
        }
    }

    if total == 0 {
        return Some(PipelineOutcome::Failed(
            "el stream no contenía audio".to_string(),
        ));
    }

    None
}
