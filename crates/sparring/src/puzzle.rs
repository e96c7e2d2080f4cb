//! Puzzle solving on top of a game session.
//!
//! The solution alternates `[opponent, solver, opponent, solver, ...]`, starting
//! with the opponent's move from the puzzle FEN. The solver plays the other side.

use serde::{Deserialize, Serialize};
use shakmaty::{Color, Role, Square};
use tracing::info;

use chess_core::{parse_coordinate_move, MoveRecord, PositionRules};

use crate::clock::TimeControl;
use crate::error::SessionError;
use crate::game::{GameConfig, GameSession, MoveOutcome, Opponent};

/// One puzzle as supplied by the puzzle source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub fen: String,
    /// Expected moves in coordinate notation, opponent first
    #[serde(alias = "solutionUci", alias = "moves")]
    pub solution: Vec<String>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PuzzleStatus {
    Idle,
    Playing,
    Success,
    Failed,
}

pub struct PuzzleSession<R> {
    session: GameSession<R>,
    puzzle: Option<PuzzleRecord>,
    solved_index: usize,
    player_turn: bool,
    status: PuzzleStatus,
}

impl<R: PositionRules> PuzzleSession<R> {
    pub fn new(rules: R) -> Self {
        Self {
            session: GameSession::new(rules),
            puzzle: None,
            solved_index: 0,
            player_turn: false,
            status: PuzzleStatus::Idle,
        }
    }

    pub fn status(&self) -> PuzzleStatus {
        self.status
    }

    pub fn solved_index(&self) -> usize {
        self.solved_index
    }

    pub fn player_turn(&self) -> bool {
        self.player_turn
    }

    pub fn puzzle(&self) -> Option<&PuzzleRecord> {
        self.puzzle.as_ref()
    }

    /// The board, history and navigation of the underlying game.
    pub fn session(&self) -> &GameSession<R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession<R> {
        &mut self.session
    }

    /// Load a puzzle. The opponent's first move is played by `opponent_step`.
    pub fn load(&mut self, record: PuzzleRecord) -> Result<(), SessionError> {
        // Opponent and solver alternate, and only a solver move can finish the puzzle
        if record.solution.is_empty() {
            return Err(SessionError::InvalidSolution("solution is empty".into()));
        }
        if record.solution.len() % 2 != 0 {
            return Err(SessionError::InvalidSolution(format!(
                "{} moves, last one is not the solver's",
                record.solution.len()
            )));
        }
        let start = self.session.rules().load_fen(&record.fen)?;
        self.session.start(GameConfig {
            start_fen: Some(record.fen.clone()),
            human_side: !start.turn,
            opponent: Opponent::Engine,
            time_control: TimeControl::Unlimited,
        })?;
        info!(
            id = record.id.as_deref().unwrap_or("-"),
            moves = record.solution.len(),
            "Puzzle loaded"
        );
        self.puzzle = Some(record);
        self.solved_index = 0;
        self.player_turn = false;
        self.status = PuzzleStatus::Playing;
        Ok(())
    }

    pub fn load_puzzle(&mut self, fen: &str, solution: Vec<String>) -> Result<(), SessionError> {
        self.load(PuzzleRecord {
            id: None,
            fen: fen.to_string(),
            solution,
            rating: None,
            themes: Vec::new(),
        })
    }

    /// Reload the current puzzle from scratch.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        let record = self.puzzle.clone().ok_or(SessionError::PuzzleNotPlaying)?;
        self.load(record)
    }

    fn expected(&self) -> Option<&str> {
        self.puzzle
            .as_ref()
            .and_then(|p| p.solution.get(self.solved_index))
            .map(String::as_str)
    }

    /// Play the opponent's next solution move.
    pub fn opponent_step(&mut self) -> Result<MoveRecord, SessionError> {
        if self.status != PuzzleStatus::Playing {
            return Err(SessionError::PuzzleNotPlaying);
        }
        if self.player_turn {
            return Err(SessionError::NotEngineTurn);
        }
        let uci = self
            .expected()
            .ok_or(SessionError::SolutionExhausted)?
            .to_string();
        let record = self
            .session
            .play_engine_move(&uci)
            .map_err(|_| SessionError::InvalidSolution(uci))?;
        self.solved_index += 1;
        self.player_turn = true;
        Ok(record)
    }

    /// Attempt the solver's move.
    ///
    /// The move must be legal. A legal move that differs from the solution fails
    /// the puzzle but stays on the board.
    pub fn player_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<PuzzleStatus, SessionError> {
        if self.status != PuzzleStatus::Playing {
            return Err(SessionError::PuzzleNotPlaying);
        }
        if !self.player_turn {
            return Err(SessionError::NotPlayerTurn);
        }
        if from == to {
            return Err(SessionError::NullMove);
        }
        let expected = self
            .expected()
            .ok_or(SessionError::SolutionExhausted)?
            .to_string();

        let record = match self.session.apply_move(from, to, promotion)? {
            MoveOutcome::Accepted(record) => record,
            MoveOutcome::Deferred => return Err(SessionError::NotPlayerTurn),
        };

        if record.uci == expected {
            self.solved_index += 1;
            let exhausted = self
                .puzzle
                .as_ref()
                .is_some_and(|p| self.solved_index >= p.solution.len());
            if exhausted {
                self.status = PuzzleStatus::Success;
                info!(moves = self.solved_index, "Puzzle solved");
            } else {
                self.player_turn = false;
            }
        } else {
            self.status = PuzzleStatus::Failed;
            info!(played = %record.uci, expected = %expected, "Puzzle failed");
        }
        Ok(self.status)
    }

    /// Origin square of the expected move, while the solver is on move.
    pub fn hint(&self) -> Option<Square> {
        if self.status != PuzzleStatus::Playing || !self.player_turn {
            return None;
        }
        parse_coordinate_move(self.expected()?).map(|(from, _, _)| from)
    }

    /// The side the solver plays.
    pub fn solver_side(&self) -> Color {
        self.session.config().human_side
    }
}
