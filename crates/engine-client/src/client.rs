//! UCI engine client (async I/O).
//!
//! One external process, one outstanding search. Every `submit` stops the
//! previous search and mints a fresh request id; output is attributed to the
//! search that produced it (the engine answers `go` commands strictly in
//! order) and anything belonging to a superseded request is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::protocol::{parse_line, EngineOutput};
use crate::types::{EngineEvent, EngineEventKind, RequestId, SearchParams, NO_REQUEST};

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 256;

/// Capability interface for anything that can search positions on request.
pub trait SearchEngine: Send + Sync + 'static {
    /// Stop whatever is running and start searching `fen`. Returns the new request id.
    fn submit(&self, fen: &str, params: &SearchParams) -> Result<RequestId, EngineError>;

    /// Cancel `request_id` if it is still the outstanding request.
    fn cancel(&self, request_id: RequestId);

    /// Stream of events for the outstanding request only.
    fn subscribe(&self) -> EngineSubscription;

    fn new_game(&self) -> Result<(), EngineError>;

    fn set_option(&self, name: &str, value: &str) -> Result<(), EngineError>;
}

/// A subscriber's view of engine output. Never yields events for a request
/// other than the one outstanding when the event is received.
pub struct EngineSubscription {
    events: broadcast::Receiver<EngineEvent>,
    current: Arc<AtomicU64>,
}

impl EngineSubscription {
    pub fn new(events: broadcast::Receiver<EngineEvent>, current: Arc<AtomicU64>) -> Self {
        Self { events, current }
    }

    /// Next event for the outstanding request. `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    if event.request_id == self.current.load(Ordering::SeqCst) {
                        return Some(event);
                    }
                    debug!(request_id = event.request_id, "Dropping stale engine event");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Engine subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

enum TaskCommand {
    Search {
        id: RequestId,
        fen: String,
        params: SearchParams,
    },
    Cancel(RequestId),
    NewGame,
    SetOption {
        name: String,
        value: String,
    },
    Quit,
}

/// Handle to the engine task. Cheap operations only: every call just queues a
/// command for the task that owns the process.
pub struct EngineClient {
    commands: mpsc::UnboundedSender<TaskCommand>,
    /// The task owns the only strong sender, so the stream closes when it stops
    events: broadcast::WeakSender<EngineEvent>,
    current: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl EngineClient {
    /// Spawn the engine binary and complete the UCI handshake.
    pub async fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut process = tokio::process::Command::new(&config.path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("Failed to spawn {}: {e}", config.path))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".into()))?;

        let client = Self::connect(stdout, stdin, Some(process), config).await?;
        info!(path = %config.path, "Engine ready");
        Ok(client)
    }

    /// Run the client over an arbitrary line transport (a child's pipes, or an
    /// in-process fake). Performs the handshake before returning.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        process: Option<Child>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut io = EngineIo {
            lines: BufReader::new(reader).lines(),
            writer,
        };

        match tokio::time::timeout(config.init_timeout, io.handshake(config)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Unavailable(e.to_string())),
            Err(_) => {
                return Err(EngineError::Unavailable(format!(
                    "no handshake within {:?}",
                    config.init_timeout
                )))
            }
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let weak_events = events.downgrade();

        let task = EngineTask {
            io,
            commands: command_rx,
            events,
            pending: VecDeque::new(),
            live: None,
            deadline: None,
            multipv: 1,
            config: config.clone(),
            process,
        };
        tokio::spawn(task.run());

        Ok(Self {
            commands,
            events: weak_events,
            current: Arc::new(AtomicU64::new(NO_REQUEST)),
            next_id: AtomicU64::new(NO_REQUEST),
        })
    }

    /// The id of the outstanding request, or `NO_REQUEST`.
    pub fn current_request(&self) -> RequestId {
        self.current.load(Ordering::SeqCst)
    }

    /// Send `quit` and let the process exit.
    pub fn quit(&self) {
        self.current.store(NO_REQUEST, Ordering::SeqCst);
        let _ = self.commands.send(TaskCommand::Quit);
    }

    fn send(&self, command: TaskCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Unavailable("engine task has stopped".into()))
    }
}

impl SearchEngine for EngineClient {
    fn submit(&self, fen: &str, params: &SearchParams) -> Result<RequestId, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(id, Ordering::SeqCst);
        self.send(TaskCommand::Search {
            id,
            fen: fen.to_string(),
            params: params.clone(),
        })?;
        Ok(id)
    }

    fn cancel(&self, request_id: RequestId) {
        if self
            .current
            .compare_exchange(request_id, NO_REQUEST, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.commands.send(TaskCommand::Cancel(request_id));
        }
    }

    fn subscribe(&self) -> EngineSubscription {
        let events = match self.events.upgrade() {
            Some(sender) => sender.subscribe(),
            // Task already gone: hand out a stream that is over
            None => broadcast::channel(1).1,
        };
        EngineSubscription::new(events, self.current.clone())
    }

    fn new_game(&self) -> Result<(), EngineError> {
        self.send(TaskCommand::NewGame)
    }

    fn set_option(&self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(TaskCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

struct EngineIo<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
}

impl<R, W> EngineIo<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Send a command to the engine
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "engine <");
        self.writer
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Io(format!("Failed to write to engine: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| EngineError::Io(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), EngineError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .ok_or_else(|| EngineError::Unavailable("engine closed its output".into()))?;
            let trimmed = line.trim();
            debug!(line = trimmed, "engine >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    async fn handshake(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        self.send("uci").await?;
        self.wait_for("uciok").await?;
        for (name, value) in config.handshake_options() {
            self.send(&format!("setoption name {name} value {value}"))
                .await?;
        }
        self.send("isready").await?;
        self.wait_for("readyok").await
    }
}

/// Owns the process and both pipe ends; the only place engine I/O happens.
struct EngineTask<R, W> {
    io: EngineIo<R, W>,
    commands: mpsc::UnboundedReceiver<TaskCommand>,
    events: broadcast::Sender<EngineEvent>,
    /// Searches sent with `go` whose `bestmove` has not arrived yet, oldest first
    pending: VecDeque<RequestId>,
    /// The most recent search, while nobody has superseded or cancelled it
    live: Option<RequestId>,
    /// When the live search times out, and the wait that deadline represents
    deadline: Option<(Instant, Duration)>,
    multipv: u32,
    config: EngineConfig,
    process: Option<Child>,
}

impl<R, W> EngineTask<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        let _ = self.io.send("quit").await;
                        break;
                    };
                    let quitting = matches!(command, TaskCommand::Quit);
                    if let Err(e) = self.handle_command(command).await {
                        self.fail(e);
                        break;
                    }
                    if quitting {
                        break;
                    }
                }
                line = self.io.lines.next_line() => {
                    match line {
                        Ok(Some(line)) => self.handle_line(&line),
                        Ok(None) => {
                            self.fail(EngineError::Unavailable("engine process exited".into()));
                            break;
                        }
                        Err(e) => {
                            self.fail(e.into());
                            break;
                        }
                    }
                }
                _ = wait_until(self.deadline.map(|(at, _)| at)) => self.handle_timeout().await,
            }
        }

        if let Some(mut process) = self.process.take() {
            let _ = process.wait().await;
        }
        debug!("Engine task stopped");
    }

    async fn handle_command(&mut self, command: TaskCommand) -> Result<(), EngineError> {
        match command {
            TaskCommand::Search { id, fen, params } => {
                if !self.pending.is_empty() {
                    self.io.send("stop").await?;
                }
                if params.multipv != self.multipv {
                    self.io
                        .send(&format!("setoption name MultiPV value {}", params.multipv))
                        .await?;
                    self.multipv = params.multipv;
                }
                self.io.send(&format!("position fen {fen}")).await?;
                self.io.send(&format!("go {}", params.go)).await?;

                self.pending.push_back(id);
                self.live = Some(id);
                self.deadline = self
                    .config
                    .bestmove_wait(&params.go)
                    .map(|wait| (Instant::now() + wait, wait));
            }
            TaskCommand::Cancel(id) => {
                if self.live == Some(id) {
                    self.live = None;
                    self.deadline = None;
                    self.io.send("stop").await?;
                }
            }
            TaskCommand::NewGame => {
                self.io.send("ucinewgame").await?;
                self.io.send("isready").await?;
            }
            TaskCommand::SetOption { name, value } => {
                self.io
                    .send(&format!("setoption name {name} value {value}"))
                    .await?;
            }
            TaskCommand::Quit => {
                self.live = None;
                self.deadline = None;
                if !self.pending.is_empty() {
                    self.io.send("stop").await?;
                }
                self.io.send("quit").await?;
            }
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        let trimmed = line.trim();
        debug!(line = trimmed, "engine >");

        match parse_line(trimmed) {
            EngineOutput::Info(engine_line) => {
                let Some(&owner) = self.pending.front() else {
                    return;
                };
                if self.live == Some(owner) {
                    self.publish(owner, EngineEventKind::Info(engine_line));
                }
            }
            EngineOutput::BestMove { best, ponder } => match self.pending.pop_front() {
                Some(owner) if self.live == Some(owner) => {
                    self.live = None;
                    self.deadline = None;
                    self.publish(owner, EngineEventKind::BestMove { best, ponder });
                }
                Some(owner) => debug!(request_id = owner, "Dropping bestmove of superseded search"),
                None => warn!(line = trimmed, "bestmove without an outstanding search"),
            },
            EngineOutput::Ignored => {}
        }
    }

    async fn handle_timeout(&mut self) {
        let waited = self
            .deadline
            .take()
            .map(|(_, wait)| wait)
            .unwrap_or(Duration::ZERO);
        let Some(id) = self.live.take() else {
            return;
        };
        warn!(request_id = id, "Engine search timed out");
        self.publish(id, EngineEventKind::Failed(EngineError::Timeout(waited)));
        // The bestmove this provokes belongs to a dead request and is dropped.
        if let Err(e) = self.io.send("stop").await {
            warn!(error = %e, "Failed to stop timed-out search");
        }
    }

    fn fail(&mut self, error: EngineError) {
        warn!(error = %error, "Engine failed");
        if let Some(id) = self.live.take() {
            self.publish(id, EngineEventKind::Failed(error));
        }
        self.deadline = None;
    }

    fn publish(&self, request_id: RequestId, kind: EngineEventKind) {
        // No receivers is fine: nobody is listening right now.
        let _ = self.events.send(EngineEvent { request_id, kind });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
