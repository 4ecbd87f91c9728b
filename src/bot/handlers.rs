use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        error::{MisuseError, MusicError},
        queue::{QueueInfo, ITEMS_PER_PAGE},
        session::PlayOutcome,
    },
    bot::JukeboxBot,
    ui::{
        buttons::{self, ButtonAction},
        embeds,
    },
};

/// Respuesta de un comando ya renderizada
enum Reply {
    Text(String),
    Embed(CreateEmbed, Vec<CreateActionRow>),
    Failure(MusicError),
}

impl Reply {
    fn from_result(result: Result<String, MusicError>) -> Self {
        match result {
            Ok(text) => Reply::Text(text),
            Err(e) => Reply::Failure(e),
        }
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        match self {
            Reply::Text(text) => CreateInteractionResponseMessage::new()
                .embed(embeds::create_success_embed("🎵 Jukebox", &text)),
            Reply::Embed(embed, components) => CreateInteractionResponseMessage::new()
                .embed(embed)
                .components(components),
            Reply::Failure(e) => CreateInteractionResponseMessage::new()
                .content(format!("❌ {}", e))
                .ephemeral(true),
        }
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id).await;
    }

    let session = bot.registry.get_or_create(guild_id);

    let reply = match command.data.name.as_str() {
        "pause" => Reply::from_result(
            session
                .pause()
                .await
                .map(|t| format!("⏸️ Pausado: **{}**", t.title())),
        ),
        "resume" => Reply::from_result(
            session
                .resume()
                .await
                .map(|t| format!("▶️ Reanudado: **{}**", t.title())),
        ),
        "skip" => Reply::from_result(
            session
                .skip()
                .await
                .map(|t| format!("⏭️ Saltada: **{}**", t.title())),
        ),
        "stop" => Reply::from_result(
            session
                .stop()
                .await
                .map(|n| format!("⏹️ Reproducción detenida ({} canciones eliminadas de la cola)", n)),
        ),
        "leave" => Reply::from_result(
            session
                .leave()
                .await
                .map(|_| "👋 Desconectado del canal de voz".to_string()),
        ),
        "queue" => {
            let page = int_option(&command, "page").unwrap_or(1).max(1) as usize;
            queue_reply(&session.queue_info().await, page)
        }
        "nowplaying" => match session.now_playing().await {
            Ok(now) => Reply::Embed(
                embeds::create_now_playing_embed(&now),
                buttons::create_player_buttons(now.paused, now.loop_enabled),
            ),
            Err(e) => Reply::Failure(e),
        },
        "shuffle" => Reply::from_result(
            session
                .shuffle()
                .await
                .map(|n| format!("🔀 Cola mezclada ({} canciones)", n)),
        ),
        "loop" => {
            let enabled = session.toggle_loop().await;
            Reply::Text(if enabled {
                "🔂 Repetir canción activado".to_string()
            } else {
                "➡️ Repetición desactivada".to_string()
            })
        }
        "remove" => {
            // Posición 0 cae fuera de rango y la rechaza la cola
            let position = int_option(&command, "position").unwrap_or(0).max(0) as usize;
            Reply::from_result(
                session
                    .remove(position)
                    .await
                    .map(|t| format!("🗑️ Eliminada de la cola: **{}**", t.title())),
            )
        }
        "clear" => Reply::from_result(
            session
                .clear()
                .await
                .map(|n| format!("🗑️ Cola limpiada: {} canciones eliminadas", n)),
        ),
        "volume" => match int_option(&command, "level") {
            Some(level) => {
                let applied = session.set_volume(level as f32 / 100.0).await;
                Reply::Text(format!(
                    "🔊 Volumen ajustado a {:.0}% (se aplica desde la próxima canción)",
                    applied * 100.0
                ))
            }
            None => {
                let current = session.volume().await;
                Reply::Text(format!("🔊 Volumen actual: {:.0}%", current * 100.0))
            }
        },
        _ => Reply::Text("❌ Comando no reconocido".to_string()),
    };

    if let Reply::Failure(e) = &reply {
        warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
    }

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_message()))
        .await?;

    Ok(())
}

/// Maneja interacciones con componentes (botones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ButtonAction::parse(&component.data.custom_id) else {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Acción no reconocida")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    let session = bot.registry.get_or_create(guild_id);

    let reply = match action {
        ButtonAction::QueuePage(page) => {
            let response = match queue_reply(&session.queue_info().await, page) {
                Reply::Embed(embed, components) => CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .embed(embed)
                        .components(components),
                ),
                other => CreateInteractionResponse::Message(other.into_message()),
            };
            component.create_response(&ctx.http, response).await?;
            return Ok(());
        }
        ButtonAction::PlayPause => {
            let paused = session.now_playing().await.map(|now| now.paused);
            match paused {
                Ok(true) => Reply::from_result(session.resume().await.map(|_| "▶️ Reanudado".to_string())),
                Ok(false) => Reply::from_result(session.pause().await.map(|_| "⏸️ Pausado".to_string())),
                Err(e) => Reply::Failure(e),
            }
        }
        ButtonAction::Skip => Reply::from_result(
            session
                .skip()
                .await
                .map(|t| format!("⏭️ Saltada: **{}**", t.title())),
        ),
        ButtonAction::Stop => Reply::from_result(
            session
                .stop()
                .await
                .map(|_| "⏹️ Detenido".to_string()),
        ),
        ButtonAction::Shuffle => Reply::from_result(
            session
                .shuffle()
                .await
                .map(|_| "🔀 Cola mezclada".to_string()),
        ),
        ButtonAction::Loop => {
            let enabled = session.toggle_loop().await;
            Reply::Text(if enabled { "🔂 Loop activado" } else { "➡️ Loop desactivado" }.to_string())
        }
    };

    // Las respuestas a botones solo las ve quien los presionó
    let message = reply.into_message().ephemeral(true);
    component
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match play(ctx, command, bot, guild_id, &query).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /play falló en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    query: &str,
) -> Result<CreateEmbed, MusicError> {
    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)
        .ok_or(MisuseError::NotInVoiceChannel)?;

    let track = bot.resolver.resolve(query, command.user.id).await?;
    let session = bot.registry.get_or_create(guild_id);

    let embed = match session
        .request_play(track, voice_channel, command.channel_id)
        .await?
    {
        PlayOutcome::Started(track) => embeds::create_track_playing_embed(&track),
        PlayOutcome::Enqueued { track, position } => {
            embeds::create_track_added_embed(&track, position)
        }
    };

    Ok(embed)
}

fn queue_reply(info: &QueueInfo, page: usize) -> Reply {
    let queue_page = info.get_page(page, ITEMS_PER_PAGE);
    Reply::Embed(
        embeds::create_queue_embed(info, queue_page.current_page),
        buttons::create_queue_pagination(queue_page.current_page, queue_page.total_pages),
    )
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

// Funciones auxiliares

/// Canal de voz del usuario según la caché
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
