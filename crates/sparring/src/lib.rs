//! Play against a UCI engine, solve puzzles, watch live analysis.
//!
//! The session types ([`GameSession`], [`PuzzleSession`], [`ClockController`],
//! [`AnalysisCoordinator`]) are synchronous state machines. [`GameDriver`]
//! runs them on a single tokio task together with the engine and the clock.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod game;
pub mod puzzle;

pub use analysis::{AnalysisCoordinator, DisplayedEvaluation, DisplayedLine};
pub use clock::{ClockController, ClockEvent, ClockState, SideTime, TimeControl};
pub use config::AppConfig;
pub use driver::{DriverConfig, DriverEvent, GameDriver, SessionHandle};
pub use error::{ConfigError, SessionError};
pub use game::{
    DrawReason, GameConfig, GameSession, GameSnapshot, GameStatus, MoveOutcome, Navigation,
    Opponent, Premove, SessionEvent,
};
pub use puzzle::{PuzzleRecord, PuzzleSession, PuzzleStatus};
