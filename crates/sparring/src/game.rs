//! Turn-based game session: move list, position history, premoves, clock.
//!
//! A `GameSession` is a plain synchronous state machine. It must be driven by a
//! single writer (see `driver`), because turn, tip and status checks are only
//! meaningful when nothing else mutates the session in between.

use std::collections::VecDeque;

use serde::Serialize;
use shakmaty::{Color, Role, Square};
use tracing::{info, warn};

use chess_core::pgn::write_pgn;
use chess_core::position::{color_name, serialize_color, serialize_role, serialize_square};
use chess_core::{
    parse_coordinate_move, MoveRecord, PositionRules, PositionSnapshot, ValidatedMove,
    STANDARD_START_FEN,
};

use crate::clock::{ClockController, ClockEvent, ClockState, TimeControl};
use crate::error::SessionError;

/// Abort is only offered while fewer than this many moves have been played.
pub const ABORT_MOVE_LIMIT: usize = 4;

/// Occurrences of one position that make a repetition draw.
const REPETITION_DRAW_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrawReason {
    InsufficientMaterial,
    FiftyMoves,
    Repetition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GameStatus {
    Idle,
    InProgress,
    Checkmate {
        #[serde(serialize_with = "serialize_color")]
        winner: Color,
    },
    Stalemate,
    Draw {
        reason: DrawReason,
    },
    Resigned {
        #[serde(serialize_with = "serialize_color")]
        winner: Color,
    },
    Aborted,
    TimedOut {
        #[serde(serialize_with = "serialize_color")]
        winner: Color,
    },
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Idle | GameStatus::InProgress)
    }

    /// PGN result tag.
    pub fn result_tag(&self) -> &'static str {
        match self {
            GameStatus::Checkmate { winner }
            | GameStatus::Resigned { winner }
            | GameStatus::TimedOut { winner } => match winner {
                Color::White => "1-0",
                Color::Black => "0-1",
            },
            GameStatus::Stalemate | GameStatus::Draw { .. } => "1/2-1/2",
            GameStatus::Idle | GameStatus::InProgress | GameStatus::Aborted => "*",
        }
    }
}

/// Who plays the side the human does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opponent {
    Engine,
    /// Both sides are played locally; there are no premoves.
    Human,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// `None` for the standard starting position
    pub start_fen: Option<String>,
    pub human_side: Color,
    pub opponent: Opponent,
    pub time_control: TimeControl,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_fen: None,
            human_side: Color::White,
            opponent: Opponent::Engine,
            time_control: TimeControl::Unlimited,
        }
    }
}

/// A move entered while it was not the human's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Premove {
    #[serde(serialize_with = "serialize_square")]
    pub from: Square,
    #[serde(serialize_with = "serialize_square")]
    pub to: Square,
    #[serde(serialize_with = "serialize_role")]
    pub promotion: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Accepted(MoveRecord),
    /// Queued as a premove
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Start,
    Prev,
    Next,
    End,
    Move(usize),
}

/// Change notifications, drained with [`GameSession::take_events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Started {
        fen: String,
    },
    MoveApplied {
        record: MoveRecord,
        /// Index of the resulting position in the history
        ply: usize,
    },
    PremoveQueued {
        premove: Premove,
    },
    PremovesDiscarded {
        count: usize,
    },
    ViewChanged {
        index: usize,
    },
    StatusChanged {
        status: GameStatus,
    },
    LowTime {
        #[serde(serialize_with = "serialize_color")]
        side: Color,
    },
    /// The automated opponent is gone; both sides are now played locally.
    LocalPlay,
}

/// Immutable copy of everything a UI needs to draw the game.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub status: GameStatus,
    #[serde(serialize_with = "serialize_color")]
    pub human_side: Color,
    pub moves: Vec<MoveRecord>,
    pub positions: Vec<PositionSnapshot>,
    pub viewing_index: usize,
    pub premoves: Vec<Premove>,
    pub clock: ClockState,
}

impl GameSnapshot {
    pub fn viewed(&self) -> &PositionSnapshot {
        &self.positions[self.viewing_index]
    }

    pub fn live(&self) -> &PositionSnapshot {
        &self.positions[self.positions.len() - 1]
    }

    pub fn is_at_live_tip(&self) -> bool {
        self.viewing_index + 1 == self.positions.len()
    }
}

pub struct GameSession<R> {
    rules: R,
    config: GameConfig,
    status: GameStatus,
    moves: Vec<MoveRecord>,
    /// Always `moves.len() + 1` entries; `[0]` is the start position
    positions: Vec<PositionSnapshot>,
    viewing_index: usize,
    premoves: VecDeque<Premove>,
    clock: ClockController,
    events: Vec<SessionEvent>,
}

impl<R: PositionRules> GameSession<R> {
    pub fn new(rules: R) -> Self {
        let config = GameConfig::default();
        Self {
            rules,
            clock: ClockController::new(config.time_control),
            config,
            status: GameStatus::Idle,
            moves: Vec::new(),
            positions: vec![PositionSnapshot::initial()],
            viewing_index: 0,
            premoves: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn positions(&self) -> &[PositionSnapshot] {
        &self.positions
    }

    pub fn viewing_index(&self) -> usize {
        self.viewing_index
    }

    pub fn premoves(&self) -> impl Iterator<Item = &Premove> {
        self.premoves.iter()
    }

    pub fn clock(&self) -> &ClockController {
        &self.clock
    }

    /// Position at the end of the move list.
    pub fn live_position(&self) -> &PositionSnapshot {
        &self.positions[self.tip()]
    }

    pub fn viewed_position(&self) -> &PositionSnapshot {
        &self.positions[self.viewing_index]
    }

    pub fn is_at_live_tip(&self) -> bool {
        self.viewing_index == self.tip()
    }

    fn tip(&self) -> usize {
        self.positions.len() - 1
    }

    /// Whether the side to move is played by the human at this board.
    pub fn is_human_turn(&self) -> bool {
        match self.config.opponent {
            Opponent::Human => true,
            Opponent::Engine => self.live_position().turn == self.config.human_side,
        }
    }

    /// The game is live and waiting on the automated opponent.
    pub fn needs_engine_move(&self) -> bool {
        self.status == GameStatus::InProgress
            && self.config.opponent == Opponent::Engine
            && !self.is_human_turn()
    }

    /// Begin a new game, discarding everything from the previous one.
    pub fn start(&mut self, config: GameConfig) -> Result<(), SessionError> {
        let fen = config.start_fen.as_deref().unwrap_or(STANDARD_START_FEN);
        let start = self.rules.load_fen(fen)?;
        self.reset(config, start, Vec::new());
        Ok(())
    }

    /// Begin a game from a PGN, continuing from its last position.
    pub fn start_from_pgn(&mut self, config: GameConfig, pgn: &str) -> Result<(), SessionError> {
        let game = self.rules.load_pgn(pgn)?;
        self.reset(config, game.start, game.moves);
        Ok(())
    }

    fn reset(&mut self, config: GameConfig, start: PositionSnapshot, replay: Vec<ValidatedMove>) {
        self.clock = ClockController::new(config.time_control);
        self.config = config;
        self.moves.clear();
        self.positions.clear();
        self.positions.push(start);
        self.premoves.clear();
        self.status = GameStatus::InProgress;
        self.events.push(SessionEvent::Started {
            fen: self.positions[0].fen.clone(),
        });

        for mv in replay {
            self.moves.push(mv.record);
            self.positions.push(mv.position);
        }
        self.viewing_index = self.tip();

        // A loaded game may already be over
        if let Some(status) = self.terminal_status() {
            self.finish(status);
            return;
        }
        self.clock.start(self.live_position().turn);
        info!(
            fen = %self.live_position().fen,
            human = color_name(self.config.human_side),
            moves = self.moves.len(),
            "Game started"
        );
        self.events.push(SessionEvent::StatusChanged {
            status: self.status,
        });
    }

    /// Play a move for the human.
    ///
    /// Out of turn the move is queued as a premove instead. On turn it must be
    /// made from the live position and be legal there.
    pub fn apply_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<MoveOutcome, SessionError> {
        if self.status != GameStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if from == to {
            return Err(SessionError::NullMove);
        }
        if !self.is_human_turn() {
            let premove = Premove {
                from,
                to,
                promotion,
            };
            self.premoves.push_back(premove);
            self.events.push(SessionEvent::PremoveQueued { premove });
            return Ok(MoveOutcome::Deferred);
        }
        if !self.is_at_live_tip() {
            return Err(SessionError::NotAtLiveTip);
        }

        let validated = self
            .rules
            .validate_move(&self.live_position().fen, from, to, promotion)
            .ok_or_else(|| SessionError::InvalidMove(format!("{from}{to}")))?;
        let record = validated.record.clone();
        self.commit(validated);
        Ok(MoveOutcome::Accepted(record))
    }

    /// Play the automated opponent's reply (coordinate notation), then try one premove.
    pub fn play_engine_move(&mut self, uci: &str) -> Result<MoveRecord, SessionError> {
        if self.status != GameStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if !self.needs_engine_move() {
            return Err(SessionError::NotEngineTurn);
        }
        let (from, to, promotion) = parse_coordinate_move(uci).ok_or(SessionError::NullMove)?;
        let validated = self
            .rules
            .validate_move(&self.live_position().fen, from, to, promotion)
            .ok_or_else(|| SessionError::InvalidMove(uci.to_string()))?;
        let record = validated.record.clone();
        self.commit(validated);
        self.try_premove();
        Ok(record)
    }

    /// Dequeue one premove if the human is on move. A failed premove discards the whole queue.
    fn try_premove(&mut self) {
        if self.status != GameStatus::InProgress || !self.is_human_turn() {
            return;
        }
        let Some(premove) = self.premoves.pop_front() else {
            return;
        };
        let validated = self.rules.validate_move(
            &self.live_position().fen,
            premove.from,
            premove.to,
            premove.promotion,
        );
        match validated {
            Some(validated) => self.commit(validated),
            None => {
                let count = self.premoves.len() + 1;
                self.premoves.clear();
                warn!(
                    from = %premove.from,
                    to = %premove.to,
                    discarded = count,
                    "Premove illegal in live position, queue discarded"
                );
                self.events.push(SessionEvent::PremovesDiscarded { count });
            }
        }
    }

    /// Append a validated move and handle everything that follows from it.
    fn commit(&mut self, validated: ValidatedMove) {
        let record = validated.record;
        self.moves.push(record.clone());
        self.positions.push(validated.position);
        self.viewing_index = self.tip();
        self.events.push(SessionEvent::MoveApplied {
            record,
            ply: self.tip(),
        });

        match self.terminal_status() {
            Some(status) => self.finish(status),
            None => self.clock.switch_active(self.live_position().turn),
        }
    }

    /// Terminal state implied by the live position, if any.
    fn terminal_status(&self) -> Option<GameStatus> {
        let live = self.live_position();
        if live.checkmate {
            return Some(GameStatus::Checkmate { winner: !live.turn });
        }
        if live.stalemate {
            return Some(GameStatus::Stalemate);
        }
        if live.insufficient_material {
            return Some(GameStatus::Draw {
                reason: DrawReason::InsufficientMaterial,
            });
        }
        if live.draw {
            return Some(GameStatus::Draw {
                reason: DrawReason::FiftyMoves,
            });
        }
        let key = live.repetition_key();
        let occurrences = self
            .positions
            .iter()
            .filter(|p| p.repetition_key() == key)
            .count();
        if occurrences >= REPETITION_DRAW_COUNT {
            return Some(GameStatus::Draw {
                reason: DrawReason::Repetition,
            });
        }
        None
    }

    /// Enter a terminal state. The clock stops in the same step.
    fn finish(&mut self, status: GameStatus) {
        self.clock.stop();
        self.premoves.clear();
        self.status = status;
        info!(result = status.result_tag(), ?status, "Game over");
        self.events.push(SessionEvent::StatusChanged { status });
    }

    pub fn resign(&mut self) -> Result<(), SessionError> {
        if self.status != GameStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        let loser = match self.config.opponent {
            Opponent::Engine => self.config.human_side,
            Opponent::Human => self.live_position().turn,
        };
        self.finish(GameStatus::Resigned { winner: !loser });
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), SessionError> {
        if self.status != GameStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if self.moves.len() >= ABORT_MOVE_LIMIT {
            return Err(SessionError::AbortNotAllowed(self.moves.len()));
        }
        self.finish(GameStatus::Aborted);
        Ok(())
    }

    /// Drop the automated opponent and let the human play both sides.
    pub fn switch_to_local_play(&mut self) {
        if self.config.opponent == Opponent::Human {
            return;
        }
        self.config.opponent = Opponent::Human;
        if !self.premoves.is_empty() {
            let count = self.premoves.len();
            self.premoves.clear();
            self.events.push(SessionEvent::PremovesDiscarded { count });
        }
        self.events.push(SessionEvent::LocalPlay);
    }

    /// Move the view. Clamps to the history and never touches it.
    pub fn navigate(&mut self, nav: Navigation) -> usize {
        let target = match nav {
            Navigation::Start => 0,
            Navigation::Prev => self.viewing_index.saturating_sub(1),
            Navigation::Next => self.viewing_index + 1,
            Navigation::End => self.tip(),
            Navigation::Move(n) => n,
        }
        .min(self.tip());

        if target != self.viewing_index {
            self.viewing_index = target;
            self.events.push(SessionEvent::ViewChanged { index: target });
        }
        self.viewing_index
    }

    pub fn go_to_start(&mut self) -> usize {
        self.navigate(Navigation::Start)
    }

    pub fn go_to_prev(&mut self) -> usize {
        self.navigate(Navigation::Prev)
    }

    pub fn go_to_next(&mut self) -> usize {
        self.navigate(Navigation::Next)
    }

    pub fn go_to_end(&mut self) -> usize {
        self.navigate(Navigation::End)
    }

    pub fn jump_to_live(&mut self) -> usize {
        self.navigate(Navigation::End)
    }

    /// Position index `n` (0 is the start position).
    pub fn go_to_move(&mut self, n: usize) -> usize {
        self.navigate(Navigation::Move(n))
    }

    /// One clock tick. A flag fall ends the game.
    pub fn tick_clock(&mut self) {
        if self.status != GameStatus::InProgress {
            return;
        }
        for event in self.clock.tick() {
            match event {
                ClockEvent::LowTime(side) => self.events.push(SessionEvent::LowTime { side }),
                ClockEvent::Timeout(side) => self.finish(GameStatus::TimedOut { winner: !side }),
            }
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            status: self.status,
            human_side: self.config.human_side,
            moves: self.moves.clone(),
            positions: self.positions.clone(),
            viewing_index: self.viewing_index,
            premoves: self.premoves.iter().copied().collect(),
            clock: self.clock.state(),
        }
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn export_pgn(&self) -> String {
        let (white, black) = match (self.config.opponent, self.config.human_side) {
            (Opponent::Human, _) => ("Human", "Human"),
            (Opponent::Engine, Color::White) => ("Human", "Engine"),
            (Opponent::Engine, Color::Black) => ("Engine", "Human"),
        };
        let result = self.status.result_tag();
        let mut headers = vec![
            ("Event".to_string(), "Sparring game".to_string()),
            (
                "Date".to_string(),
                chrono::Local::now().format("%Y.%m.%d").to_string(),
            ),
            ("White".to_string(), white.to_string()),
            ("Black".to_string(), black.to_string()),
            ("Result".to_string(), result.to_string()),
        ];
        let start = &self.positions[0];
        if start.fen != STANDARD_START_FEN {
            headers.push(("SetUp".to_string(), "1".to_string()));
            headers.push(("FEN".to_string(), start.fen.clone()));
        }
        write_pgn(&headers, start, &self.moves, result)
    }
}
