use rand::{seq::SliceRandom, Rng};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::error::MisuseError;
use crate::sources::Track;

/// Canciones mostradas por página en `/queue`
pub const ITEMS_PER_PAGE: usize = 10;

/// Cola FIFO de una guild
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición (1-based)
    pub fn enqueue(&mut self, track: Track) -> Result<usize, MisuseError> {
        if self.items.len() >= self.max_size {
            return Err(MisuseError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn dequeue(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        if let Some(ref track) = next {
            debug!("➡️ Siguiente en cola: {}", track.title());
        }
        next
    }

    /// Elimina la canción en la posición indicada (1-based)
    pub fn remove(&mut self, position: usize) -> Result<Track, MisuseError> {
        let len = self.items.len();
        if position == 0 || position > len {
            return Err(MisuseError::InvalidIndex { index: position, len });
        }

        let removed = self
            .items
            .remove(position - 1)
            .ok_or(MisuseError::InvalidIndex { index: position, len })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    /// Mezcla la cola con Fisher–Yates
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MisuseError> {
        if self.items.len() < 2 {
            return Err(MisuseError::NotEnoughTracks);
        }

        self.items.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
        Ok(())
    }

    pub fn shuffle(&mut self) -> Result<(), MisuseError> {
        self.shuffle_with(&mut rand::thread_rng())
    }

    /// Limpia la cola y devuelve cuántas canciones se eliminaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Copia de solo lectura para mostrar
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(Track::duration).sum()
    }
}

/// Estado de la cola para mostrar al usuario
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub loop_enabled: bool,
    pub paused: bool,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.items.len().div_ceil(items_per_page).max(1);
        let safe_page = page.clamp(1, total_pages);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: self.items[start..end].to_vec(),
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{SourceKind, TrackInfo};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serenity::model::id::UserId;

    fn track(name: &str) -> Track {
        Track::from_info(
            TrackInfo {
                title: Some(name.to_string()),
                url: format!("https://example.com/{}", name),
                duration: Some(Duration::from_secs(60)),
                ..TrackInfo::default()
            },
            SourceKind::YouTube,
            UserId::new(1),
        )
    }

    fn urls(queue: &MusicQueue) -> Vec<String> {
        queue.snapshot().iter().map(|t| t.url().to_string()).collect()
    }

    #[test]
    fn enqueue_is_fifo_and_reports_position() {
        let mut queue = MusicQueue::new(10);
        assert_eq!(queue.enqueue(track("a")).unwrap(), 1);
        assert_eq!(queue.enqueue(track("b")).unwrap(), 2);
        assert_eq!(queue.enqueue(track("c")).unwrap(), 3);

        assert_eq!(queue.dequeue().unwrap().title(), "a");
        assert_eq!(queue.dequeue().unwrap().title(), "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn full_queue_rejects_tracks() {
        let mut queue = MusicQueue::new(1);
        queue.enqueue(track("a")).unwrap();
        assert_eq!(
            queue.enqueue(track("b")).unwrap_err(),
            MisuseError::QueueFull { max: 1 }
        );
    }

    #[test]
    fn remove_out_of_range_leaves_queue_unchanged() {
        let mut queue = MusicQueue::new(10);
        queue.enqueue(track("a")).unwrap();
        queue.enqueue(track("b")).unwrap();
        let before = urls(&queue);

        for position in [0, 3, 100] {
            assert_eq!(
                queue.remove(position).unwrap_err(),
                MisuseError::InvalidIndex { index: position, len: 2 }
            );
        }
        assert_eq!(urls(&queue), before);

        assert_eq!(queue.remove(2).unwrap().title(), "b");
        assert_eq!(urls(&queue), vec!["https://example.com/a"]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut queue = MusicQueue::new(100);
        for i in 0..20 {
            queue.enqueue(track(&format!("t{}", i))).unwrap();
        }
        let mut before = urls(&queue);

        let mut rng = StdRng::seed_from_u64(42);
        queue.shuffle_with(&mut rng).unwrap();
        let mut after = urls(&queue);

        assert_eq!(after.len(), before.len());
        before.sort();
        after.sort();
        assert_eq!(after, before);
    }

    #[test]
    fn shuffle_needs_two_tracks() {
        let mut queue = MusicQueue::new(10);
        queue.enqueue(track("solo")).unwrap();
        assert_eq!(queue.shuffle().unwrap_err(), MisuseError::NotEnoughTracks);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pages_are_clamped() {
        let items: Vec<Track> = (0..25).map(|i| track(&format!("t{}", i))).collect();
        let info = QueueInfo {
            current: None,
            total_duration: Duration::ZERO,
            items,
            loop_enabled: false,
            paused: false,
        };

        let page = info.get_page(3, ITEMS_PER_PAGE);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.first_position, 21);

        let page = info.get_page(99, ITEMS_PER_PAGE);
        assert_eq!(page.current_page, 3);

        let empty = QueueInfo {
            items: Vec::new(),
            ..info
        };
        let page = empty.get_page(1, ITEMS_PER_PAGE);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }
}
