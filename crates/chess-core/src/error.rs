//! Rules-layer error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("Illegal move {san} at ply {ply}")]
    IllegalPgnMove { san: String, ply: usize },
}
