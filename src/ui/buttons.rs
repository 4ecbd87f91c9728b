use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const LOOP_TRACK: &str = "music_loop";
    /// Prefijo; el número de página va después de `:`
    pub const QUEUE_PAGE: &str = "queue_page";
}

/// Acción de un botón ya interpretada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PlayPause,
    Skip,
    Stop,
    Shuffle,
    Loop,
    QueuePage(usize),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::SHUFFLE => Some(Self::Shuffle),
            button_ids::LOOP_TRACK => Some(Self::Loop),
            other => {
                let (prefix, page) = other.split_once(':')?;
                if prefix != button_ids::QUEUE_PAGE {
                    return None;
                }
                page.parse().ok().filter(|p| *p >= 1).map(Self::QueuePage)
            }
        }
    }
}

/// Controles principales del reproductor
pub fn create_player_buttons(paused: bool, loop_enabled: bool) -> Vec<CreateActionRow> {
    let play_pause_emoji = if paused { '▶' } else { '⏸' };
    let loop_style = if loop_enabled {
        ButtonStyle::Success
    } else {
        ButtonStyle::Secondary
    };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(play_pause_emoji)
        .style(ButtonStyle::Primary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let shuffle_btn = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary);

    let loop_btn = CreateButton::new(button_ids::LOOP_TRACK)
        .emoji('🔁')
        .style(loop_style);

    vec![CreateActionRow::Buttons(vec![
        play_pause_btn,
        skip_btn,
        stop_btn,
        shuffle_btn,
        loop_btn,
    ])]
}

/// Botones de paginación de `/queue` (páginas 1-based)
pub fn create_queue_pagination(current_page: usize, total_pages: usize) -> Vec<CreateActionRow> {
    if total_pages <= 1 {
        return Vec::new();
    }

    let prev_btn = CreateButton::new(format!(
        "{}:{}",
        button_ids::QUEUE_PAGE,
        current_page.saturating_sub(1).max(1)
    ))
    .emoji('◀')
    .style(ButtonStyle::Primary)
    .disabled(current_page <= 1);

    let next_btn = CreateButton::new(format!(
        "{}:{}",
        button_ids::QUEUE_PAGE,
        (current_page + 1).min(total_pages)
    ))
    .emoji('▶')
    .style(ButtonStyle::Primary)
    .disabled(current_page >= total_pages);

    vec![CreateActionRow::Buttons(vec![prev_btn, next_btn])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_button_ids() {
        assert_eq!(ButtonAction::parse("music_skip"), Some(ButtonAction::Skip));
        assert_eq!(ButtonAction::parse("queue_page:3"), Some(ButtonAction::QueuePage(3)));
        assert_eq!(ButtonAction::parse("queue_page:0"), None);
        assert_eq!(ButtonAction::parse("queue_page:x"), None);
        assert_eq!(ButtonAction::parse("playlist_load"), None);
    }

    #[test]
    fn single_page_has_no_pagination() {
        assert!(create_queue_pagination(1, 1).is_empty());
        assert_eq!(create_queue_pagination(2, 3).len(), 1);
    }
}
