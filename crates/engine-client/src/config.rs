//! Engine configuration from environment variables

use std::env;
use std::time::Duration;

use crate::types::GoMode;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the UCI engine binary
    pub path: String,

    /// `Threads` option sent during the handshake
    pub threads: u32,

    /// `Hash` option (MB) sent during the handshake
    pub hash_mb: u32,

    /// How long `uci`/`isready` may take before the engine counts as unavailable
    pub init_timeout: Duration,

    /// Bounded wait for `bestmove` on depth searches, and the grace added to movetime searches
    pub bestmove_timeout: Duration,

    /// Extra `setoption` pairs sent after the handshake
    pub extra_options: Vec<(String, String)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            threads: 1,
            hash_mb: 64,
            init_timeout: Duration::from_millis(5_000),
            bestmove_timeout: Duration::from_millis(30_000),
            extra_options: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables from `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let path = var("STOCKFISH_PATH").unwrap_or(defaults.path);

        let threads = var("ENGINE_THREADS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.threads);

        let hash_mb = var("ENGINE_HASH_MB")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hash_mb);

        let init_timeout = var("ENGINE_INIT_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.init_timeout);

        let bestmove_timeout = var("ENGINE_BESTMOVE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.bestmove_timeout);

        Self {
            path,
            threads,
            hash_mb,
            init_timeout,
            bestmove_timeout,
            extra_options: Vec::new(),
        }
    }

    /// All options sent right after `uciok`.
    pub fn handshake_options(&self) -> Vec<(String, String)> {
        let mut options = vec![
            ("Threads".to_string(), self.threads.to_string()),
            ("Hash".to_string(), self.hash_mb.to_string()),
        ];
        options.extend(self.extra_options.iter().cloned());
        options
    }

    /// How long to wait for `bestmove` after `go`. `None` for infinite searches.
    pub fn bestmove_wait(&self, go: &GoMode) -> Option<Duration> {
        match go {
            GoMode::Depth(_) => Some(self.bestmove_timeout),
            GoMode::MoveTime(ms) => Some(Duration::from_millis(*ms) + self.bestmove_timeout),
            GoMode::Infinite => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bestmove_wait() {
        let config = EngineConfig {
            bestmove_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        assert_eq!(
            config.bestmove_wait(&GoMode::Depth(12)),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            config.bestmove_wait(&GoMode::MoveTime(500)),
            Some(Duration::from_millis(2_500))
        );
        assert_eq!(config.bestmove_wait(&GoMode::Infinite), None);
    }

    #[test]
    fn test_from_lookup() {
        let config = EngineConfig::from_lookup(|name| match name {
            "ENGINE_THREADS" => Some("4".into()),
            "ENGINE_BESTMOVE_TIMEOUT_MS" => Some("1500".into()),
            "ENGINE_HASH_MB" => Some("lots".into()),
            _ => None,
        });
        assert_eq!(config.threads, 4);
        assert_eq!(config.hash_mb, 64);
        assert_eq!(config.bestmove_timeout, Duration::from_millis(1_500));
        assert_eq!(config.path, "/usr/local/bin/stockfish");
    }

    #[test]
    fn test_handshake_options_include_extras() {
        let config = EngineConfig {
            extra_options: vec![("Skill Level".into(), "5".into())],
            ..EngineConfig::default()
        };
        let options = config.handshake_options();
        assert_eq!(options[0], ("Threads".to_string(), "1".to_string()));
        assert_eq!(options[2], ("Skill Level".to_string(), "5".to_string()));
    }
}
