use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::session::{GuildSession, SessionDeps};

/// Sesiones por guild, creadas bajo demanda y nunca eliminadas
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    deps: Arc<SessionDeps>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps: Arc::new(deps),
        }
    }

    /// Obtiene la sesión de la guild o la crea; dos llamadas concurrentes
    /// para la misma guild reciben la misma instancia
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Nueva sesión para guild {}", guild_id);
                Arc::new(GuildSession::new(guild_id, self.deps.clone()))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::Harness;

    #[test]
    fn creation_is_idempotent() {
        let registry = SessionRegistry::new(Harness::new().deps());
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(1));
        registry.get_or_create(GuildId::new(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(GuildId::new(3)).is_none());
    }

    #[test]
    fn concurrent_creation_yields_one_session() {
        let registry = Arc::new(SessionRegistry::new(Harness::new().deps()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_or_create(GuildId::new(42)))
            })
            .collect();
        let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }
}
