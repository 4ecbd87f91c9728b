//! # Bot Module
//!
//! Serenity side of the jukebox: slash-command registration, interaction
//! dispatch and the voice-state events that feed the idle supervisor.
//!
//! The [`JukeboxBot`] handler owns no playback state of its own. Every command
//! is routed to the guild's [`GuildSession`](crate::audio::session::GuildSession)
//! through the [`SessionRegistry`], and voice-channel occupancy changes are
//! reported to the [`IdleSupervisor`].

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{registry::SessionRegistry, supervisor::IdleSupervisor},
    config::Config,
    sources::TrackResolver,
};

/// Event handler del bot.
///
/// ## Fields
///
/// - `config`: configuración cargada del entorno
/// - `resolver`: resolución de consultas a tracks
/// - `registry`: una sesión por guild
/// - `supervisor`: desconexión por inactividad o canal vacío
pub struct JukeboxBot {
    pub(crate) config: Arc<Config>,
    pub(crate) resolver: Arc<TrackResolver>,
    pub(crate) registry: Arc<SessionRegistry>,
    supervisor: IdleSupervisor,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<TrackResolver>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let supervisor = IdleSupervisor::new(registry.clone());
        Self {
            config,
            resolver,
            registry,
            supervisor,
        }
    }

    /// Registra los comandos slash, por guild si `GUILD_ID` está definido
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta desconexiones externas del bot y cambios de ocupación del
    /// canal de voz que vigila cada sesión.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id && old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.supervisor.bot_disconnected(guild_id).await;
            return;
        }

        let Some(channel_id) = self.supervisor.watched_channel(guild_id).await else {
            return;
        };

        let Some(listeners) = count_listeners(&ctx, guild_id, channel_id) else {
            debug!("Guild {} no está en caché, se ignora el cambio de voz", guild_id);
            return;
        };

        self.supervisor.occupancy_changed(guild_id, listeners).await;
    }
}

/// Usuarios humanos en el canal de voz, según la caché
fn count_listeners(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
    let current_user_id = ctx.cache.current_user().id;
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let listeners = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| state.user_id != current_user_id)
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count();

    Some(listeners)
}
