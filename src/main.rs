use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{
    pipeline::AudioPipeline,
    registry::SessionRegistry,
    session::{SessionDeps, SessionSettings},
};
use crate::bot::{events::ChannelNotifier, voice::SongbirdGateway, JukeboxBot};
use crate::config::Config;
use crate::sources::{DirectUrlClient, InvidiousClient, MusicSource, TrackResolver, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Backends de resolución, en orden de preferencia
    let backends: Vec<Arc<dyn MusicSource>> = vec![
        Arc::new(YouTubeClient::new(
            config.ytdlp_path.clone(),
            config.backend_timeout(),
        )),
        Arc::new(InvidiousClient::new(
            config.invidious_instances.clone(),
            config.backend_timeout(),
        )?),
        Arc::new(DirectUrlClient::new(config.backend_timeout())?),
    ];
    let resolver = Arc::new(TrackResolver::new(backends));

    // Transporte de voz y pipeline de audio
    let manager = Songbird::serenity();
    let pipeline = AudioPipeline::from_config(&config)?;
    info!("🎚️ Estrategia de descarga: {:?}", config.fetch_mode);

    let notifier = ChannelNotifier::new(
        Arc::new(Http::new(&config.discord_token)),
        config.idle_grace(),
    );

    let registry = Arc::new(SessionRegistry::new(SessionDeps {
        gateway: Arc::new(SongbirdGateway::new(manager.clone())),
        launcher: Arc::new(pipeline),
        notifier: Arc::new(notifier),
        settings: SessionSettings::from_config(&config),
    }));

    // Intents mínimos: comandos y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), resolver, registry);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("No se pudo escuchar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
