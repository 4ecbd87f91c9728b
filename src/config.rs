use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::fetch::FetchMode;

/// Instancias públicas de Invidious usadas si no se configura ninguna
const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://yewtu.be",
    "https://inv.nadeko.net",
    "https://invidious.nerdvpn.de",
    "https://invidious.protokolla.fi",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub fetch_mode: FetchMode,

    // Binarios externos
    pub ytdlp_path: String,
    pub ffmpeg_path: String,

    // Backends de resolución
    pub invidious_instances: Vec<String>,
    pub resolve_timeout: u64, // En segundos

    // Límites
    pub max_song_duration: u64, // En segundos
    pub idle_timeout: u64,      // En segundos
    pub alone_timeout: u64,     // En segundos
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|id| *id != 0),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            fetch_mode: std::env::var("FETCH_STRATEGY")
                .unwrap_or_else(|_| "pipe".to_string())
                .parse()?,

            // Binarios
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),

            // Backends
            invidious_instances: match std::env::var("INVIDIOUS_INSTANCES") {
                Ok(val) if !val.trim().is_empty() => parse_instance_list(&val),
                _ => DEFAULT_INVIDIOUS_INSTANCES.iter().map(|s| s.to_string()).collect(),
            },
            resolve_timeout: std::env::var("RESOLVE_TIMEOUT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            // Límites
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "7200".to_string()) // 2 horas
                .parse()?,
            idle_timeout: std::env::var("IDLE_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            alone_timeout: std::env::var("ALONE_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and every timeout must be greater than zero
    /// - At least one Invidious instance must be configured
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.idle_timeout == 0 || self.alone_timeout == 0 {
            anyhow::bail!("Idle and alone timeouts must be greater than 0");
        }

        if self.resolve_timeout == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.invidious_instances.is_empty() {
            anyhow::bail!("At least one Invidious instance is required");
        }

        Ok(())
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn alone_grace(&self) -> Duration {
        Duration::from_secs(self.alone_timeout)
    }

    pub fn max_track_duration(&self) -> Duration {
        Duration::from_secs(self.max_song_duration)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, fetch={:?}, queue max {}\n  \
            Binaries: yt-dlp={}, ffmpeg={}\n  \
            Resolver: {} Invidious instances, {} per backend\n  \
            Limits: {} max duration, {} idle, {} alone",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.fetch_mode,
            self.max_queue_size,
            self.ytdlp_path,
            self.ffmpeg_path,
            self.invidious_instances.len(),
            humantime::format_duration(self.backend_timeout()),
            humantime::format_duration(self.max_track_duration()),
            humantime::format_duration(self.idle_grace()),
            humantime::format_duration(self.alone_grace()),
        )
    }
}

fn parse_instance_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 1.0,
            max_queue_size: 1000,
            fetch_mode: FetchMode::Pipe,

            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),

            invidious_instances: DEFAULT_INVIDIOUS_INSTANCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resolve_timeout: 20,

            max_song_duration: 7200, // 2 hours
            idle_timeout: 60,
            alone_timeout: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = Config {
            default_volume: 2.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = Config {
            idle_timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn instance_list_is_trimmed() {
        let instances = parse_instance_list(" https://a.example/ ,, https://b.example");
        assert_eq!(instances, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "secret-token".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("secret-token"));
    }
}
