//! Request, line and event types shared by engine consumers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Identifies one `submit`. Monotonically increasing, starting at 1.
pub type RequestId = u64;

/// Sentinel for "no outstanding request".
pub const NO_REQUEST: RequestId = 0;

/// Engine score from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Score {
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates)
    Mate(i32),
}

impl Score {
    /// The same score seen from the other side.
    pub fn negate(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Score::Mate(n) if *n >= 0 => write!(f, "#{n}"),
            Score::Mate(n) => write!(f, "#-{}", n.abs()),
        }
    }
}

/// One principal variation from an `info` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineLine {
    /// 1-based MultiPV index
    pub variation: u32,
    pub score: Score,
    /// Principal variation in UCI notation, never empty
    pub pv: Vec<String>,
    pub depth: u32,
}

/// Search limit for a `go` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c", rename_all = "camelCase")]
pub enum GoMode {
    Depth(u32),
    MoveTime(u64),
    Infinite,
}

impl fmt::Display for GoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoMode::Depth(d) => write!(f, "depth {d}"),
            GoMode::MoveTime(ms) => write!(f, "movetime {ms}"),
            GoMode::Infinite => write!(f, "infinite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub go: GoMode,
    /// Number of lines to report (`MultiPV` option)
    pub multipv: u32,
}

impl SearchParams {
    pub fn depth(depth: u32) -> Self {
        Self {
            go: GoMode::Depth(depth),
            multipv: 1,
        }
    }

    pub fn movetime(ms: u64) -> Self {
        Self {
            go: GoMode::MoveTime(ms),
            multipv: 1,
        }
    }

    pub fn with_multipv(mut self, multipv: u32) -> Self {
        self.multipv = multipv.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEventKind {
    Info(EngineLine),
    /// Terminates the request. `best` is `None` when the side to move has no legal reply.
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    /// The request ended without a bestmove (timeout or a dead process).
    Failed(EngineError),
}

/// Engine output scoped to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub request_id: RequestId,
    pub kind: EngineEventKind,
}
