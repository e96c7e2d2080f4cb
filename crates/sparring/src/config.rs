//! App configuration from environment variables

use std::env;
use std::str::FromStr;

use shakmaty::Color;

use engine_client::{EngineConfig, SearchParams};

use crate::analysis::DEFAULT_MIN_STABLE_DEPTH;
use crate::clock::TimeControl;
use crate::driver::DriverConfig;
use crate::error::ConfigError;
use crate::game::{GameConfig, Opponent};

/// Highest `Skill Level` Stockfish accepts.
const MAX_SKILL_LEVEL: u8 = 20;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub game: GameConfig,
    pub driver: DriverConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut engine = EngineConfig::from_lookup(&var);
        if let Some(level) = parsed::<u8>(&var, "ENGINE_SKILL_LEVEL") {
            let level = level.min(MAX_SKILL_LEVEL);
            engine
                .extra_options
                .push(("Skill Level".to_string(), level.to_string()));
        }

        let time_control = match var("TIME_CONTROL") {
            Some(value) => TimeControl::parse(&value).ok_or(ConfigError::Invalid {
                name: "TIME_CONTROL",
                value,
                expected: "`unlimited`, `<base_s>+<inc_s>` or `<white>/<black>`",
            })?,
            None => TimeControl::Unlimited,
        };

        let human_side = match var("HUMAN_SIDE") {
            Some(value) => parse_side(&value).ok_or(ConfigError::Invalid {
                name: "HUMAN_SIDE",
                value,
                expected: "`white` or `black`",
            })?,
            None => Color::White,
        };

        // Movetime wins over depth when both are set
        let opponent_search = match parsed::<u64>(&var, "ENGINE_MOVETIME_MS") {
            Some(ms) => SearchParams::movetime(ms),
            None => SearchParams::depth(parsed(&var, "ENGINE_DEPTH").unwrap_or(12)),
        };

        let analysis_search = SearchParams::depth(parsed(&var, "ANALYSIS_DEPTH").unwrap_or(18))
            .with_multipv(parsed(&var, "ANALYSIS_MULTIPV").unwrap_or(3));

        let driver = DriverConfig {
            opponent_search,
            analysis_search,
            min_stable_depth: parsed(&var, "ANALYSIS_MIN_STABLE_DEPTH")
                .unwrap_or(DEFAULT_MIN_STABLE_DEPTH),
            analysis_enabled: parsed(&var, "ANALYSIS_ENABLED").unwrap_or(true),
        };

        Ok(Self {
            engine,
            game: GameConfig {
                start_fen: var("START_FEN"),
                human_side,
                opponent: Opponent::Engine,
                time_control,
            },
            driver,
        })
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

fn parse_side(s: &str) -> Option<Color> {
    match s.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Some(Color::White),
        "black" | "b" => Some(Color::Black),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_client::GoMode;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.game.time_control, TimeControl::Unlimited);
        assert_eq!(config.game.human_side, Color::White);
        assert_eq!(config.driver.opponent_search, SearchParams::depth(12));
        assert_eq!(config.driver.analysis_search.go, GoMode::Depth(18));
        assert_eq!(config.driver.analysis_search.multipv, 3);
        assert_eq!(config.driver.min_stable_depth, 8);
        assert!(config.driver.analysis_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TIME_CONTROL", "180+2"),
            ("HUMAN_SIDE", "Black"),
            ("ENGINE_SKILL_LEVEL", "35"),
            ("ENGINE_DEPTH", "6"),
            ("ENGINE_MOVETIME_MS", "250"),
            ("STOCKFISH_PATH", "/opt/sf"),
        ])
        .unwrap();
        assert_eq!(config.game.time_control, TimeControl::symmetric(180_000, 2_000));
        assert_eq!(config.game.human_side, Color::Black);
        assert_eq!(config.driver.opponent_search.go, GoMode::MoveTime(250));
        assert_eq!(config.engine.path, "/opt/sf");
        assert!(config
            .engine
            .extra_options
            .contains(&("Skill Level".to_string(), "20".to_string())));
    }

    #[test]
    fn test_invalid_time_control() {
        let err = load(&[("TIME_CONTROL", "fast")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "TIME_CONTROL",
                ..
            }
        ));
    }
}
