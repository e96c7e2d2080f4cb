//! Chess rules for the sparring app.
//!
//! Everything the play sessions need to know about chess goes through the
//! [`PositionRules`] trait; [`StandardRules`] implements it with shakmaty.

pub mod error;
pub mod pgn;
pub mod position;
pub mod rules;

pub use error::RulesError;
pub use pgn::PgnGame;
pub use position::{
    parse_coordinate_move, MoveFlags, MoveRecord, PositionSnapshot, ValidatedMove,
    STANDARD_START_FEN,
};
pub use rules::{PositionRules, StandardRules};

pub use shakmaty::{Color, Role, Square};
