#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_core::{parse_coordinate_move, PositionRules, StandardRules, STANDARD_START_FEN};
use engine_client::{EngineClient, EngineConfig, EngineError};
use sparring::DriverEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::broadcast;

/// How the fake engine behaves.
#[derive(Clone, Default)]
pub struct Script {
    /// Best move to report per position (full FEN). Unlisted positions get `e2e4`.
    pub replies: HashMap<String, String>,
    /// Score reported from depth 8 on; shallower lines are noisy.
    pub score_cp: i32,
    /// Depth and movetime searches never finish on their own, only on `stop`.
    pub hang: bool,
    /// Never answer `uci`.
    pub no_handshake: bool,
    /// Close the output as soon as a search starts.
    pub die_on_go: bool,
    /// Pause before answering a finite search.
    pub think: Option<Duration>,
}

impl Script {
    pub fn reply(mut self, fen: &str, best: &str) -> Self {
        self.replies.insert(fen.to_string(), best.to_string());
        self
    }
}

/// Everything the client sent to the fake, in order.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines().iter().any(|l| l == line)
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines().iter().filter(|l| *l == line).count()
    }

    fn push(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

/// Config with short timeouts suitable for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        path: "fake".to_string(),
        init_timeout: Duration::from_millis(500),
        bestmove_timeout: Duration::from_millis(2_000),
        ..EngineConfig::default()
    }
}

/// Connect an `EngineClient` to an in-process fake engine.
pub async fn connect_fake(
    script: Script,
    config: &EngineConfig,
) -> Result<(EngineClient, CommandLog), EngineError> {
    let (client_side, engine_side) = tokio::io::duplex(1 << 20);
    let (client_reader, client_writer) = tokio::io::split(client_side);
    let (engine_reader, engine_writer) = tokio::io::split(engine_side);

    let log = CommandLog::default();
    tokio::spawn(run_fake(script, engine_reader, engine_writer, log.clone()));

    let client = EngineClient::connect(client_reader, client_writer, None, config).await?;
    Ok((client, log))
}

async fn run_fake(
    script: Script,
    reader: ReadHalf<DuplexStream>,
    mut writer: WriteHalf<DuplexStream>,
    log: CommandLog,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut fen = STANDARD_START_FEN.to_string();
    let mut multipv: u32 = 1;
    let mut held: Option<String> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        log.push(&line);

        let mut out: Vec<String> = Vec::new();
        if line == "uci" {
            if script.no_handshake {
                continue;
            }
            out.push("id name FakeFish".into());
            out.push("uciok".into());
        } else if line == "isready" {
            out.push("readyok".into());
        } else if let Some(value) = line.strip_prefix("setoption name MultiPV value ") {
            multipv = value.parse().unwrap_or(1);
        } else if let Some(position) = line.strip_prefix("position fen ") {
            fen = position.to_string();
        } else if let Some(mode) = line.strip_prefix("go ") {
            if script.die_on_go {
                return;
            }
            let best = script
                .replies
                .get(&fen)
                .cloned()
                .unwrap_or_else(|| "e2e4".to_string());
            let words: Vec<&str> = mode.split_whitespace().collect();
            let (depth, finite): (u32, bool) = match words.as_slice() {
                ["depth", d] => (d.parse().unwrap_or(10), true),
                ["movetime", _] => (10, true),
                _ => (10, false),
            };
            for d in 1..=depth {
                for pv in 1..=multipv {
                    let score = if d < 8 {
                        script.score_cp + if d % 2 == 0 { 400 } else { -400 }
                    } else {
                        script.score_cp - (pv as i32 - 1) * 20
                    };
                    out.push(format!(
                        "info depth {d} seldepth {d} multipv {pv} score cp {score} nodes 1000 pv {best} e7e5"
                    ));
                }
            }
            if finite && !script.hang {
                if let Some(think) = script.think {
                    write_lines(&mut writer, &out).await;
                    out.clear();
                    tokio::time::sleep(think).await;
                }
                out.push(format!("bestmove {best}"));
            } else {
                held = Some(best);
            }
        } else if line == "stop" {
            if let Some(best) = held.take() {
                out.push(format!("bestmove {best}"));
            }
        } else if line == "quit" {
            return;
        }

        if !write_lines(&mut writer, &out).await {
            return;
        }
    }
}

async fn write_lines(writer: &mut WriteHalf<DuplexStream>, lines: &[String]) -> bool {
    for line in lines {
        if writer.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            return false;
        }
    }
    writer.flush().await.is_ok()
}

/// FEN after playing `moves` from the standard start.
pub fn fen_after(moves: &[&str]) -> String {
    let rules = StandardRules;
    let mut fen = STANDARD_START_FEN.to_string();
    for uci in moves {
        let (from, to, promotion) = parse_coordinate_move(uci).unwrap();
        fen = rules
            .validate_move(&fen, from, to, promotion)
            .unwrap()
            .position
            .fen;
    }
    fen
}

/// Wait for the first driver event matching `pred`, panicking after a few seconds.
pub async fn wait_for(
    events: &mut broadcast::Receiver<DriverEvent>,
    mut pred: impl FnMut(&DriverEvent) -> bool,
) -> DriverEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("driver closed"),
            Err(_) => panic!("timed out waiting for driver event"),
        }
    }
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
