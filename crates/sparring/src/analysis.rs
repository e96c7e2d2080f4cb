//! Always-on analysis with shallow-depth smoothing.
//!
//! Lines below `min_stable_depth` are buffered but never shown. Until the
//! first stable line for a new position arrives, the previous position's
//! evaluation stays on display instead of dropping back to neutral.

use std::collections::BTreeMap;

use serde::Serialize;
use shakmaty::Color;

use engine_client::{EngineLine, RequestId, Score, NO_REQUEST};

pub const DEFAULT_MIN_STABLE_DEPTH: u32 = 8;

/// One line as shown to the user. Scores are from White's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedLine {
    pub variation: u32,
    pub score: Score,
    pub pv: Vec<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedEvaluation {
    /// Position the lines belong to
    pub fen: String,
    /// Best lines first
    pub lines: Vec<DisplayedLine>,
}

impl DisplayedEvaluation {
    pub fn best(&self) -> Option<&DisplayedLine> {
        self.lines.first()
    }

    pub fn depth(&self) -> u32 {
        self.lines.iter().map(|l| l.depth).max().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct AnalysisCoordinator {
    enabled: bool,
    min_stable_depth: u32,
    request: RequestId,
    fen: Option<String>,
    turn: Color,
    /// Latest line per variation for the current request
    buffer: BTreeMap<u32, EngineLine>,
    stable: bool,
    displayed: Option<DisplayedEvaluation>,
}

impl Default for AnalysisCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STABLE_DEPTH)
    }
}

impl AnalysisCoordinator {
    pub fn new(min_stable_depth: u32) -> Self {
        Self {
            enabled: true,
            min_stable_depth,
            request: NO_REQUEST,
            fen: None,
            turn: Color::White,
            buffer: BTreeMap::new(),
            stable: false,
            displayed: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning analysis off forgets everything, including the displayed value.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.request = NO_REQUEST;
            self.fen = None;
            self.buffer.clear();
            self.stable = false;
            self.displayed = None;
        }
    }

    /// A new analysis request is live for `fen`.
    pub fn begin(&mut self, request: RequestId, fen: &str, turn: Color) {
        if self.fen.as_deref() != Some(fen) {
            self.stable = false;
            self.fen = Some(fen.to_string());
            self.turn = turn;
        }
        self.request = request;
        self.buffer.clear();
    }

    /// The live request finished or was superseded by non-analysis work.
    pub fn end(&mut self, request: RequestId) {
        if self.request == request {
            self.request = NO_REQUEST;
        }
    }

    pub fn current_request(&self) -> RequestId {
        self.request
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn displayed(&self) -> Option<&DisplayedEvaluation> {
        self.displayed.as_ref()
    }

    /// Feed one line. Returns the new display when it changed.
    pub fn on_line(&mut self, request: RequestId, line: &EngineLine) -> Option<&DisplayedEvaluation> {
        if !self.enabled || request == NO_REQUEST || request != self.request {
            return None;
        }
        self.buffer.insert(line.variation, line.clone());
        if line.depth < self.min_stable_depth {
            return None;
        }
        self.stable = true;

        let fen = self.fen.clone()?;
        let turn = self.turn;
        let lines = self
            .buffer
            .values()
            .filter(|l| l.depth >= self.min_stable_depth)
            .map(|l| DisplayedLine {
                variation: l.variation,
                score: white_relative(l.score, turn),
                pv: l.pv.clone(),
                depth: l.depth,
            })
            .collect();
        let next = DisplayedEvaluation { fen, lines };
        if self.displayed.as_ref() == Some(&next) {
            return None;
        }
        self.displayed = Some(next);
        self.displayed.as_ref()
    }
}

/// Engine scores are side-to-move relative.
fn white_relative(score: Score, turn: Color) -> Score {
    match turn {
        Color::White => score,
        Color::Black => score.negate(),
    }
}
