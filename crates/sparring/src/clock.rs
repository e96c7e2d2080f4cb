//! Per-side countdown clock with Fischer increment.
//!
//! The clock does not own a timer. Whoever drives it calls [`ClockController::tick`]
//! once per [`TICK_MS`]; that keeps ticks on the same sequencer as the moves, so a
//! game-ending move always stops the clock before the next tick can land.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

use chess_core::position::serialize_color;

/// Tick resolution.
pub const TICK_MS: u64 = 1_000;

/// At or below this, a side gets its low-time cue.
pub const LOW_TIME_MS: u64 = 10_000;

/// Starting time and increment for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideTime {
    pub initial_ms: u64,
    pub increment_ms: u64,
}

impl SideTime {
    pub fn new(initial_ms: u64, increment_ms: u64) -> Self {
        Self {
            initial_ms,
            increment_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimeControl {
    Unlimited,
    Timed { white: SideTime, black: SideTime },
}

impl TimeControl {
    /// Same base and increment for both sides.
    pub fn symmetric(initial_ms: u64, increment_ms: u64) -> Self {
        let side = SideTime::new(initial_ms, increment_ms);
        TimeControl::Timed {
            white: side,
            black: side,
        }
    }

    /// Parse `unlimited`, `<base_s>+<inc_s>`, or `<white>/<black>` for asymmetric clocks.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") || s == "-" {
            return Some(TimeControl::Unlimited);
        }
        let (white, black) = match s.split_once('/') {
            Some((w, b)) => (parse_side(w)?, parse_side(b)?),
            None => {
                let side = parse_side(s)?;
                (side, side)
            }
        };
        Some(TimeControl::Timed { white, black })
    }
}

fn parse_side(s: &str) -> Option<SideTime> {
    let mut parts = s.trim().splitn(2, '+');
    let base: u64 = parts.next()?.trim().parse().ok()?;
    let increment: u64 = match parts.next() {
        Some(inc) => inc.trim().parse().ok()?,
        None => 0,
    };
    if base == 0 {
        return None;
    }
    Some(SideTime::new(base * 1_000, increment * 1_000))
}

/// Observable clock state. `active == None` means paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    #[serde(serialize_with = "serialize_active")]
    pub active: Option<Color>,
    pub white_increment_ms: u64,
    pub black_increment_ms: u64,
}

impl ClockState {
    pub fn remaining_ms(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_remaining_ms,
            Color::Black => self.black_remaining_ms,
        }
    }

    fn remaining_mut(&mut self, side: Color) -> &mut u64 {
        match side {
            Color::White => &mut self.white_remaining_ms,
            Color::Black => &mut self.black_remaining_ms,
        }
    }

    fn increment_ms(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_increment_ms,
            Color::Black => self.black_increment_ms,
        }
    }
}

fn serialize_active<S: serde::Serializer>(active: &Option<Color>, s: S) -> Result<S::Ok, S::Error> {
    match active {
        Some(color) => serialize_color(color, s),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    LowTime(Color),
    Timeout(Color),
}

#[derive(Debug, Clone)]
pub struct ClockController {
    control: TimeControl,
    state: ClockState,
    /// Low-time cue armed, indexed by `Color as usize`
    low_time_armed: [bool; 2],
    /// Side to resume after `pause`
    paused_side: Option<Color>,
    flagged: bool,
}

impl ClockController {
    pub fn new(control: TimeControl) -> Self {
        let (white, black) = match control {
            TimeControl::Unlimited => (SideTime::new(0, 0), SideTime::new(0, 0)),
            TimeControl::Timed { white, black } => (white, black),
        };
        let state = ClockState {
            white_remaining_ms: white.initial_ms,
            black_remaining_ms: black.initial_ms,
            active: None,
            white_increment_ms: white.increment_ms,
            black_increment_ms: black.increment_ms,
        };
        Self {
            control,
            state,
            low_time_armed: [true, true],
            paused_side: None,
            flagged: false,
        }
    }

    pub fn time_control(&self) -> TimeControl {
        self.control
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.active.is_some()
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self.control, TimeControl::Unlimited)
    }

    /// Back to the initial times, paused.
    pub fn reset(&mut self) {
        *self = Self::new(self.control);
    }

    /// Start `side`'s countdown without crediting anyone.
    pub fn start(&mut self, side: Color) {
        if self.is_unlimited() || self.flagged {
            return;
        }
        self.paused_side = None;
        self.state.active = Some(side);
    }

    /// Stop the running side, credit its increment, start `side`.
    pub fn switch_active(&mut self, side: Color) {
        if self.is_unlimited() || self.flagged {
            return;
        }
        if let Some(mover) = self.state.active {
            if mover != side {
                let increment = self.state.increment_ms(mover);
                let remaining = self.state.remaining_mut(mover);
                *remaining = remaining.saturating_add(increment);
                if *remaining > LOW_TIME_MS {
                    self.low_time_armed[mover as usize] = true;
                }
            }
        }
        self.paused_side = None;
        self.state.active = Some(side);
    }

    /// Freeze both sides; `resume` restarts the side that was running.
    pub fn pause(&mut self) {
        if let Some(side) = self.state.active.take() {
            self.paused_side = Some(side);
        }
    }

    pub fn resume(&mut self) {
        if let Some(side) = self.paused_side.take() {
            self.start(side);
        }
    }

    /// Stop for good (game over). Nothing ticks afterwards.
    pub fn stop(&mut self) {
        self.state.active = None;
        self.paused_side = None;
    }

    /// One tick of the active side's countdown.
    pub fn tick(&mut self) -> Vec<ClockEvent> {
        let Some(side) = self.state.active else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let remaining = self.state.remaining_mut(side);
        *remaining = remaining.saturating_sub(TICK_MS);
        let now = *remaining;

        if now <= LOW_TIME_MS && self.low_time_armed[side as usize] {
            self.low_time_armed[side as usize] = false;
            events.push(ClockEvent::LowTime(side));
        }
        if now == 0 {
            self.flagged = true;
            self.state.active = None;
            events.push(ClockEvent::Timeout(side));
        }
        events
    }
}
