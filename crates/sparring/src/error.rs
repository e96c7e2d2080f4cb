//! Session error types

use chess_core::RulesError;
use thiserror::Error;

/// Why a session call was refused. None of these change session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Game is not in progress")]
    NotInProgress,

    #[error("Viewing history; jump to the live position first")]
    NotAtLiveTip,

    #[error("Illegal move: {0}")]
    InvalidMove(String),

    #[error("Abort only allowed before the fourth move (game has {0} moves)")]
    AbortNotAllowed(usize),

    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] RulesError),

    #[error("Not the engine's turn")]
    NotEngineTurn,

    #[error("Not the player's turn")]
    NotPlayerTurn,

    #[error("Puzzle is not being played")]
    PuzzleNotPlaying,

    #[error("Null move")]
    NullMove,

    #[error("Puzzle solution has no more moves")]
    SolutionExhausted,

    #[error("Invalid puzzle solution: {0}")]
    InvalidSolution(String),

    #[error("Session driver has shut down")]
    DriverClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration error: {name}={value:?} is not {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}
