//! Immutable move and position records produced by the rules layer.

use serde::{Serialize, Serializer};
use shakmaty::{Color, Role, Square};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A position snapshot: FEN plus the flags derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub fen: String,
    #[serde(serialize_with = "serialize_color")]
    pub turn: Color,
    pub check: bool,
    pub checkmate: bool,
    pub stalemate: bool,
    /// Fifty-move rule or insufficient material. Repetition is tracked by the session.
    pub draw: bool,
    pub insufficient_material: bool,
}

impl PositionSnapshot {
    /// The standard starting position, without going through the rules.
    pub fn initial() -> Self {
        Self {
            fen: STANDARD_START_FEN.to_string(),
            turn: Color::White,
            check: false,
            checkmate: false,
            stalemate: false,
            draw: false,
            insufficient_material: false,
        }
    }

    /// FEN without the halfmove clock and fullmove number, used for repetition checks.
    pub fn repetition_key(&self) -> String {
        self.fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
    }

    pub fn is_game_over(&self) -> bool {
        self.checkmate || self.stalemate || self.draw
    }
}

/// A move that has been validated against a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    #[serde(serialize_with = "serialize_square")]
    pub from: Square,
    #[serde(serialize_with = "serialize_square")]
    pub to: Square,
    #[serde(serialize_with = "serialize_role")]
    pub promotion: Option<Role>,
    pub san: String,
    pub uci: String,
}

/// Side effects of a move, as reported by the rules layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFlags {
    pub capture: bool,
    pub check: bool,
    pub checkmate: bool,
    pub stalemate: bool,
    pub draw: bool,
    pub insufficient_material: bool,
}

/// Result of a successful `validate_move`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMove {
    pub record: MoveRecord,
    pub position: PositionSnapshot,
    pub flags: MoveFlags,
}

/// Split a coordinate move (`e2e4`, `e7e8q`) into its parts.
/// Returns `None` for null moves and anything that is not well-formed.
pub fn parse_coordinate_move(uci: &str) -> Option<(Square, Square, Option<Role>)> {
    let uci = uci.trim();
    if uci.len() != 4 && uci.len() != 5 {
        return None;
    }
    let from: Square = uci.get(0..2)?.parse().ok()?;
    let to: Square = uci.get(2..4)?.parse().ok()?;
    let promotion = match uci.get(4..5) {
        Some(c) => Some(Role::from_char(c.chars().next()?)?),
        None => None,
    };
    if from == to {
        return None;
    }
    Some((from, to, promotion))
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

pub fn serialize_color<S: Serializer>(color: &Color, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(color_name(*color))
}

pub fn serialize_square<S: Serializer>(square: &Square, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(square)
}

pub fn serialize_role<S: Serializer>(role: &Option<Role>, s: S) -> Result<S::Ok, S::Error> {
    match role {
        Some(r) => s.serialize_some(&r.char().to_string()),
        None => s.serialize_none(),
    }
}
