use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{
    audio::{
        queue::{QueueInfo, ITEMS_PER_PAGE},
        session::NowPlaying,
        supervisor::DisconnectReason,
    },
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

fn track_embed(title: &str, track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .field("🎤 Artista", track.author(), true)
        .field("⏱️ Duración", duration_label(track), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true)
        .field("🕒 Pedida", requested_label(track.requested_at()), true)
        .field("🔗 Fuente", track.source_kind().as_str(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de la canción actual con su estado
pub fn create_now_playing_embed(now: &NowPlaying) -> CreateEmbed {
    let status = match (now.paused, now.loop_enabled) {
        (true, _) => "⏸️ En pausa",
        (false, true) => "🔂 Repitiendo",
        (false, false) => "▶️ Reproduciendo",
    };

    track_embed("🎵 Reproduciendo Ahora", &now.track)
        .color(colors::SUCCESS_GREEN)
        .field("📊 Estado", status, true)
        .field("🔊 Volumen", format!("{:.0}%", now.volume * 100.0), true)
        .field("📋 En cola", now.queued.to_string(), true)
}

/// Embed enviado al canal cuando la cola avanza sola
pub fn create_track_started_embed(track: &Track) -> CreateEmbed {
    track_embed("🎵 Reproduciendo Ahora", track).color(colors::MUSIC_PURPLE)
}

/// Embed de respuesta a `/play` cuando la canción empezó de inmediato
pub fn create_track_playing_embed(track: &Track) -> CreateEmbed {
    track_embed("▶️ Reproduciendo", track).color(colors::SUCCESS_GREEN)
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    track_embed("✅ Canción Agregada", track)
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", format!("#{}", position), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando llegue su turno",
        ))
}

pub fn create_track_failed_embed(track: &Track, reason: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("💥 Error de Reproducción")
        .description(format!("No se pudo reproducir **{}**", track.title()))
        .field("Motivo", truncate(reason, 1000), false)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("⏭️ Continuando con la siguiente canción"))
}

pub fn create_queue_ended_embed(grace: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("📭 Cola Terminada")
        .description(format!(
            "No quedan canciones. Me desconectaré en {} si nadie agrega música.",
            humantime::format_duration(grace)
        ))
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_disconnected_embed(reason: DisconnectReason) -> CreateEmbed {
    let description = match reason {
        DisconnectReason::Idle => "⏱️ Desconectado por inactividad",
        DisconnectReason::Alone => "👤 Desconectado: me quedé solo en el canal",
        DisconnectReason::External => "🔌 Me desconectaron del canal de voz; cola limpiada",
    };

    CreateEmbed::default()
        .title("👋 Desconectado")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.items.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        let status = match (queue_info.paused, queue_info.loop_enabled) {
            (true, _) => "⏸️",
            (false, true) => "🔂",
            (false, false) => "▶️",
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}** - {}", current.title(), current.author()),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "**{}**. {} - {} `[{}]`\n",
                    queue_page.first_position + i,
                    item.title(),
                    item.author(),
                    duration_label(item)
                )
            })
            .collect();

        embed = embed.field("Próximas canciones", truncate(&description, 1024), false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones", queue_info.items.len());

    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }

    if queue_info.loop_enabled {
        info.push_str(" • 🔂 **Loop**");
    }

    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
}

fn duration_label(track: &Track) -> String {
    if track.is_live() {
        "🔴 En vivo".to_string()
    } else {
        format_duration(track.duration())
    }
}

fn requested_label(at: DateTime<Utc>) -> String {
    at.format("%H:%M UTC").to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
