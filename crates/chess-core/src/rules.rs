//! Move legality and position flags behind a substitutable trait.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position, Role, Square};

use crate::error::RulesError;
use crate::pgn::{self, PgnGame};
use crate::position::{MoveFlags, MoveRecord, PositionSnapshot, ValidatedMove};

/// Halfmove clock value at which the fifty-move rule applies.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Pure rules capability: everything the sessions need to know about chess.
pub trait PositionRules: Send + Sync {
    /// Validate a move in `fen`. `None` means the move is illegal (or the FEN is bad).
    fn validate_move(
        &self,
        fen: &str,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Option<ValidatedMove>;

    fn load_fen(&self, fen: &str) -> Result<PositionSnapshot, RulesError>;

    fn load_pgn(&self, pgn: &str) -> Result<PgnGame, RulesError>;
}

/// Standard chess rules backed by shakmaty.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl StandardRules {
    pub fn new() -> Self {
        Self
    }
}

impl PositionRules for StandardRules {
    fn validate_move(
        &self,
        fen: &str,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Option<ValidatedMove> {
        let mut pos = parse_position(fen).ok()?;
        let uci = UciMove::Normal {
            from,
            to,
            promotion,
        };
        let legal = uci.to_move(&pos).ok()?;
        Some(play_validated(&mut pos, &legal))
    }

    fn load_fen(&self, fen: &str) -> Result<PositionSnapshot, RulesError> {
        let pos = parse_position(fen)?;
        Ok(snapshot(&pos))
    }

    fn load_pgn(&self, pgn: &str) -> Result<PgnGame, RulesError> {
        pgn::replay_pgn(pgn)
    }
}

pub(crate) fn parse_position(fen: &str) -> Result<Chess, RulesError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))
}

/// Play an already-legal move and describe the result.
pub(crate) fn play_validated(pos: &mut Chess, legal: &shakmaty::Move) -> ValidatedMove {
    let san = San::from_move(&*pos, legal.clone());
    let uci = legal.to_uci(CastlingMode::Standard).to_string();
    let capture = legal.is_capture();
    pos.play_unchecked(legal.clone());

    let position = snapshot(pos);
    let suffix = if position.checkmate {
        "#"
    } else if position.check {
        "+"
    } else {
        ""
    };

    let (from, to, promotion) = match crate::position::parse_coordinate_move(&uci) {
        Some(parts) => parts,
        None => (legal.from().unwrap_or(legal.to()), legal.to(), legal.promotion()),
    };

    let flags = MoveFlags {
        capture,
        check: position.check,
        checkmate: position.checkmate,
        stalemate: position.stalemate,
        draw: position.draw,
        insufficient_material: position.insufficient_material,
    };

    ValidatedMove {
        record: MoveRecord {
            from,
            to,
            promotion,
            san: format!("{san}{suffix}"),
            uci,
        },
        position,
        flags,
    }
}

pub(crate) fn snapshot(pos: &Chess) -> PositionSnapshot {
    let insufficient_material = pos.is_insufficient_material();
    PositionSnapshot {
        fen: Fen::from_position(pos, EnPassantMode::Legal).to_string(),
        turn: pos.turn(),
        check: pos.is_check(),
        checkmate: pos.is_checkmate(),
        stalemate: pos.is_stalemate(),
        draw: insufficient_material || pos.halfmoves() >= FIFTY_MOVE_HALFMOVES,
        insufficient_material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::STANDARD_START_FEN;
    use shakmaty::Color;

    #[test]
    fn test_validate_legal_move() {
        let rules = StandardRules::new();
        let mv = rules
            .validate_move(STANDARD_START_FEN, Square::E2, Square::E4, None)
            .unwrap();
        assert_eq!(mv.record.san, "e4");
        assert_eq!(mv.record.uci, "e2e4");
        assert_eq!(mv.position.turn, Color::Black);
        assert!(!mv.flags.capture);
    }

    #[test]
    fn test_validate_illegal_move() {
        let rules = StandardRules::new();
        assert!(rules
            .validate_move(STANDARD_START_FEN, Square::E2, Square::E5, None)
            .is_none());
        assert!(rules
            .validate_move("not a fen", Square::E2, Square::E4, None)
            .is_none());
    }

    #[test]
    fn test_checkmate_flags() {
        // Fool's mate, black to deliver Qh4#
        let fen = "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2";
        let mv = StandardRules
            .validate_move(fen, Square::D8, Square::H4, None)
            .unwrap();
        assert!(mv.flags.checkmate);
        assert!(mv.flags.check);
        assert_eq!(mv.record.san, "Qh4#");
    }

    #[test]
    fn test_castling_uses_standard_notation() {
        let fen = "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1";
        let mv = StandardRules
            .validate_move(fen, Square::E1, Square::G1, None)
            .unwrap();
        assert_eq!(mv.record.uci, "e1g1");
        assert_eq!(mv.record.san, "O-O");
    }

    #[test]
    fn test_promotion() {
        let fen = "8/P7/8/8/8/8/8/k6K w - - 0 1";
        let mv = StandardRules
            .validate_move(fen, Square::A7, Square::A8, Some(Role::Queen))
            .unwrap();
        assert_eq!(mv.record.uci, "a7a8q");
        assert_eq!(mv.record.promotion, Some(Role::Queen));
    }

    #[test]
    fn test_insufficient_material_is_draw() {
        let snap = StandardRules.load_fen("8/8/8/8/8/8/8/k6K w - - 0 1").unwrap();
        assert!(snap.insufficient_material);
        assert!(snap.draw);
    }

    #[test]
    fn test_initial_snapshot_matches_loaded_start() {
        let loaded = StandardRules.load_fen(STANDARD_START_FEN).unwrap();
        assert_eq!(loaded, PositionSnapshot::initial());
    }

    #[test]
    fn test_load_fen_rejects_garbage() {
        assert!(matches!(
            StandardRules.load_fen("garbage"),
            Err(RulesError::InvalidFen(_))
        ));
    }
}
