use serenity::{
    async_trait,
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

use crate::{
    audio::session::{Notification, Notifier},
    ui::{buttons, embeds},
};

/// Publica los eventos de las sesiones en el canal de texto de la guild
pub struct ChannelNotifier {
    http: Arc<Http>,
    idle_grace: Duration,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, idle_grace: Duration) -> Self {
        Self { http, idle_grace }
    }

    fn render(&self, notification: &Notification) -> CreateMessage {
        match notification {
            Notification::TrackStarted {
                track,
                loop_enabled,
            } => CreateMessage::new()
                .embed(embeds::create_track_started_embed(track))
                .components(buttons::create_player_buttons(false, *loop_enabled)),
            Notification::TrackFailed { track, reason } => {
                CreateMessage::new().embed(embeds::create_track_failed_embed(track, reason))
            }
            Notification::QueueEnded => {
                CreateMessage::new().embed(embeds::create_queue_ended_embed(self.idle_grace))
            }
            Notification::Disconnected(reason) => {
                CreateMessage::new().embed(embeds::create_disconnected_embed(*reason))
            }
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, guild_id: GuildId, channel_id: ChannelId, notification: Notification) {
        debug!("📨 Notificación para guild {}: {:?}", guild_id, notification);

        let message = self.render(&notification);
        if let Err(e) = channel_id.send_message(&*self.http, message).await {
            error!(
                "Error al enviar notificación en guild {}: {:?}",
                guild_id, e
            );
        }
    }
}
