//! Single-writer session driver.
//!
//! One tokio task owns the [`GameSession`], the [`AnalysisCoordinator`], the
//! engine subscription and the clock ticker. UI calls arrive over a command
//! channel and are answered on a oneshot; every change goes out on a broadcast
//! channel as a [`DriverEvent`]. Because moves, engine replies and clock ticks
//! are all handled by this one loop, a game-ending move stops the clock before
//! another tick can be processed.

use std::sync::Arc;
use std::time::Duration;

use shakmaty::{Color, Role, Square};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use chess_core::PositionRules;
use engine_client::{
    EngineError, EngineEvent, EngineEventKind, EngineSubscription, RequestId, SearchEngine,
    SearchParams,
};

use crate::analysis::{AnalysisCoordinator, DisplayedEvaluation, DEFAULT_MIN_STABLE_DEPTH};
use crate::clock::{ClockState, TICK_MS};
use crate::error::SessionError;
use crate::game::{
    GameConfig, GameSession, GameSnapshot, GameStatus, MoveOutcome, Navigation, SessionEvent,
};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Search used for the automated opponent's moves
    pub opponent_search: SearchParams,
    /// Search used for always-on analysis
    pub analysis_search: SearchParams,
    pub min_stable_depth: u32,
    pub analysis_enabled: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            opponent_search: SearchParams::depth(12),
            analysis_search: SearchParams::depth(18).with_multipv(3),
            min_stable_depth: DEFAULT_MIN_STABLE_DEPTH,
            analysis_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DriverEvent {
    Session(SessionEvent),
    /// Clock after each tick of a running clock
    Clock(ClockState),
    Analysis(DisplayedEvaluation),
    AnalysisCleared,
    /// The engine is gone; play continues locally without opponent or analysis.
    EngineDegraded(EngineError),
}

enum DriverCommand {
    Start {
        config: GameConfig,
        pgn: Option<String>,
        reply: oneshot::Sender<Result<GameSnapshot, SessionError>>,
    },
    Move {
        from: Square,
        to: Square,
        promotion: Option<Role>,
        reply: oneshot::Sender<Result<MoveOutcome, SessionError>>,
    },
    Resign {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Abort {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Navigate {
        nav: Navigation,
        reply: oneshot::Sender<usize>,
    },
    SetAnalysis {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<GameSnapshot>,
    },
    ExportPgn {
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

/// Cloneable handle to a running driver.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<DriverCommand>,
    events: broadcast::Sender<DriverEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> DriverCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SessionError::DriverClosed)?;
        response.await.map_err(|_| SessionError::DriverClosed)
    }

    pub async fn start(&self, config: GameConfig) -> Result<GameSnapshot, SessionError> {
        self.request(|reply| DriverCommand::Start {
            config,
            pgn: None,
            reply,
        })
        .await?
    }

    pub async fn start_from_pgn(
        &self,
        config: GameConfig,
        pgn: &str,
    ) -> Result<GameSnapshot, SessionError> {
        let pgn = Some(pgn.to_string());
        self.request(|reply| DriverCommand::Start { config, pgn, reply })
            .await?
    }

    pub async fn apply_move(
        &self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<MoveOutcome, SessionError> {
        self.request(|reply| DriverCommand::Move {
            from,
            to,
            promotion,
            reply,
        })
        .await?
    }

    pub async fn resign(&self) -> Result<(), SessionError> {
        self.request(|reply| DriverCommand::Resign { reply }).await?
    }

    pub async fn abort(&self) -> Result<(), SessionError> {
        self.request(|reply| DriverCommand::Abort { reply }).await?
    }

    pub async fn navigate(&self, nav: Navigation) -> Result<usize, SessionError> {
        self.request(|reply| DriverCommand::Navigate { nav, reply })
            .await
    }

    pub async fn go_to_move(&self, n: usize) -> Result<usize, SessionError> {
        self.navigate(Navigation::Move(n)).await
    }

    pub async fn set_analysis(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| DriverCommand::SetAnalysis { enabled, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, SessionError> {
        self.request(|reply| DriverCommand::Snapshot { reply }).await
    }

    pub async fn export_pgn(&self) -> Result<String, SessionError> {
        self.request(|reply| DriverCommand::ExportPgn { reply })
            .await
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(DriverCommand::Shutdown);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Opponent,
    Analysis,
}

/// The one engine request the driver currently cares about.
#[derive(Debug)]
struct EngineJob {
    id: RequestId,
    kind: JobKind,
    fen: String,
    /// `bestmove` arrived; nothing left to cancel
    finished: bool,
}

pub struct GameDriver<R, E> {
    session: GameSession<R>,
    analysis: AnalysisCoordinator,
    engine: Option<Arc<E>>,
    subscription: Option<EngineSubscription>,
    job: Option<EngineJob>,
    config: DriverConfig,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    events: broadcast::Sender<DriverEvent>,
}

impl<R, E> GameDriver<R, E>
where
    R: PositionRules + 'static,
    E: SearchEngine,
{
    /// Start the driver task. Without an engine the driver runs in local-play mode.
    pub fn spawn(rules: R, engine: Option<Arc<E>>, config: DriverConfig) -> SessionHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let mut analysis = AnalysisCoordinator::new(config.min_stable_depth);
        analysis.set_enabled(config.analysis_enabled);

        let driver = Self {
            session: GameSession::new(rules),
            analysis,
            subscription: engine.as_ref().map(|e| e.subscribe()),
            engine,
            job: None,
            config,
            commands: command_rx,
            events: events.clone(),
        };
        tokio::spawn(driver.run());

        SessionHandle { commands, events }
    }

    async fn run(mut self) {
        let period = Duration::from_millis(TICK_MS);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let plies = self.session.moves().len();
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(DriverCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                event = next_engine_event(self.subscription.as_mut()) => match event {
                    Some(event) => self.handle_engine_event(event),
                    None => self.degrade(EngineError::Unavailable("engine event stream closed".into())),
                },
                _ = ticker.tick() => {
                    let running = self.session.clock().is_running();
                    self.session.tick_clock();
                    if running {
                        self.broadcast(DriverEvent::Clock(self.session.clock().state()));
                    }
                }
            }

            // Each side's second starts when its turn does
            if self.session.moves().len() != plies {
                ticker.reset();
            }
            self.flush_session_events();
            self.schedule_engine();
        }

        self.cancel_job();
        debug!("Session driver stopped");
    }

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Start { config, pgn, reply } => {
                self.cancel_job();
                let result = match pgn {
                    Some(pgn) => self.session.start_from_pgn(config, &pgn),
                    None => self.session.start(config),
                };
                if result.is_ok() {
                    self.prepare_engine_for_new_game();
                }
                let _ = reply.send(result.map(|()| self.session.snapshot()));
            }
            DriverCommand::Move {
                from,
                to,
                promotion,
                reply,
            } => {
                let _ = reply.send(self.session.apply_move(from, to, promotion));
            }
            DriverCommand::Resign { reply } => {
                let _ = reply.send(self.session.resign());
            }
            DriverCommand::Abort { reply } => {
                let _ = reply.send(self.session.abort());
            }
            DriverCommand::Navigate { nav, reply } => {
                let _ = reply.send(self.session.navigate(nav));
            }
            DriverCommand::SetAnalysis { enabled, reply } => {
                let was_enabled = self.analysis.is_enabled();
                self.analysis.set_enabled(enabled);
                if was_enabled && !enabled {
                    self.broadcast(DriverEvent::AnalysisCleared);
                }
                let _ = reply.send(());
            }
            DriverCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            DriverCommand::ExportPgn { reply } => {
                let _ = reply.send(self.session.export_pgn());
            }
            DriverCommand::Shutdown => {}
        }
    }

    fn prepare_engine_for_new_game(&mut self) {
        let Some(engine) = self.engine.clone() else {
            self.session.switch_to_local_play();
            return;
        };
        if let Err(e) = engine.new_game() {
            self.degrade(e);
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        let Some(job) = self.job.as_ref() else {
            return;
        };
        if job.id != event.request_id || job.finished {
            return;
        }
        let (id, kind) = (job.id, job.kind);

        match (kind, event.kind) {
            // The opponent's own search doubles as analysis of the live position
            (kind, EngineEventKind::Info(line)) => {
                if kind == JobKind::Opponent {
                    debug!(depth = line.depth, score = %line.score, "Opponent thinking");
                }
                if let Some(display) = self.analysis.on_line(id, &line).cloned() {
                    self.broadcast(DriverEvent::Analysis(display));
                }
            }
            (JobKind::Analysis, EngineEventKind::BestMove { .. }) => {
                self.analysis.end(id);
                if let Some(job) = self.job.as_mut() {
                    job.finished = true;
                }
            }
            (JobKind::Opponent, EngineEventKind::BestMove { best, .. }) => {
                self.job = None;
                self.analysis.end(id);
                let Some(uci) = best else {
                    self.degrade(EngineError::MalformedOutput(
                        "no bestmove in a live position".into(),
                    ));
                    return;
                };
                match self.session.play_engine_move(&uci) {
                    Ok(record) => info!(san = %record.san, uci = %record.uci, "Engine moved"),
                    Err(e) => self.degrade(EngineError::MalformedOutput(format!(
                        "unplayable bestmove {uci}: {e}"
                    ))),
                }
            }
            (_, EngineEventKind::Failed(error)) => {
                self.job = None;
                self.degrade(error);
            }
        }
    }

    /// What the engine should be doing right now, given the session.
    fn wanted_job(&self) -> Option<(JobKind, String, Color)> {
        if self.session.needs_engine_move() {
            let live = self.session.live_position();
            return Some((JobKind::Opponent, live.fen.clone(), live.turn));
        }
        if self.analysis.is_enabled() && self.session.status() != GameStatus::Idle {
            let viewed = self.session.viewed_position();
            return Some((JobKind::Analysis, viewed.fen.clone(), viewed.turn));
        }
        None
    }

    /// Bring the engine in line with `wanted_job`: keep, supersede or cancel.
    fn schedule_engine(&mut self) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        let wanted = self.wanted_job();
        if let (Some(job), Some((kind, fen, _))) = (&self.job, &wanted) {
            if job.kind == *kind && job.fen == *fen {
                return;
            }
        }

        let Some((kind, fen, turn)) = wanted else {
            self.cancel_job();
            return;
        };
        if let Some(previous) = self.job.take() {
            self.analysis.end(previous.id);
        }

        let params = match kind {
            JobKind::Opponent => &self.config.opponent_search,
            JobKind::Analysis => &self.config.analysis_search,
        };
        match engine.submit(&fen, params) {
            Ok(id) => {
                debug!(request_id = id, ?kind, fen = %fen, "Engine request submitted");
                self.analysis.begin(id, &fen, turn);
                self.job = Some(EngineJob {
                    id,
                    kind,
                    fen,
                    finished: false,
                });
            }
            Err(e) => self.degrade(e),
        }
    }

    fn cancel_job(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        self.analysis.end(job.id);
        if !job.finished {
            if let Some(engine) = &self.engine {
                engine.cancel(job.id);
            }
        }
    }

    /// Drop the engine for the rest of the session.
    fn degrade(&mut self, error: EngineError) {
        warn!(error = %error, "Engine unavailable, continuing with local play");
        self.cancel_job();
        self.engine = None;
        self.subscription = None;
        self.session.switch_to_local_play();
        self.broadcast(DriverEvent::EngineDegraded(error));
    }

    fn flush_session_events(&mut self) {
        for event in self.session.take_events() {
            self.broadcast(DriverEvent::Session(event));
        }
    }

    fn broadcast(&self, event: DriverEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn next_engine_event(subscription: Option<&mut EngineSubscription>) -> Option<EngineEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
