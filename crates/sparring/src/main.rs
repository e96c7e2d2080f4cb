//! Terminal front end.
//!
//! `sparring play [--pgn FILE]` plays a game against the configured engine.
//! `sparring puzzle FILE.json` solves puzzles from a JSON file.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing::{info, warn};

use chess_core::{parse_coordinate_move, StandardRules};
use engine_client::EngineClient;
use sparring::{
    AppConfig, DriverEvent, GameDriver, GameStatus, MoveOutcome, Navigation, PuzzleRecord,
    PuzzleSession, PuzzleStatus, SessionEvent, SessionHandle,
};

const PLAY_HELP: &str = "moves as e2e4 / e7e8q | start prev next end | goto N | resign | abort | analysis on|off | pgn | fen | quit";
const PUZZLE_HELP: &str = "moves as e2e4 | hint | retry | skip | quit";

enum Mode {
    Play { pgn: Option<String> },
    Puzzle { path: String },
}

/// Parse `play [--pgn FILE]` or `puzzle FILE` from CLI args
fn parse_args() -> anyhow::Result<Mode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("play") => {
            let mut pgn = None;
            for i in 0..args.len() {
                if args[i] == "--pgn" {
                    let path = args.get(i + 1).context("--pgn needs a file")?;
                    pgn = Some(
                        std::fs::read_to_string(path)
                            .with_context(|| format!("Failed to read {path}"))?,
                    );
                }
            }
            Ok(Mode::Play { pgn })
        }
        Some("puzzle") => {
            let path = args.get(1).context("usage: sparring puzzle FILE.json")?;
            Ok(Mode::Puzzle { path: path.clone() })
        }
        Some(other) => bail!("unknown command {other:?}; expected `play` or `puzzle`"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let mode = parse_args()?;
    let config = AppConfig::from_env()?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match mode {
        Mode::Play { pgn } => play(config, pgn, &mut input).await,
        Mode::Puzzle { path } => puzzles(&path, &mut input).await,
    }
}

async fn play(
    config: AppConfig,
    pgn: Option<String>,
    input: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    let engine = match EngineClient::spawn(&config.engine).await {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            warn!(error = %e, "Engine unavailable, playing both sides locally");
            None
        }
    };

    let handle =
        GameDriver::<StandardRules, EngineClient>::spawn(StandardRules, engine.clone(), config.driver);
    tokio::spawn(print_events(handle.subscribe()));

    let snapshot = match pgn {
        Some(pgn) => handle.start_from_pgn(config.game, &pgn).await?,
        None => handle.start(config.game).await?,
    };
    println!("{PLAY_HELP}");
    println!("position: {}", snapshot.live().fen);

    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if let Err(e) = play_command(&handle, line).await {
            println!("! {e}");
        }
    }

    handle.shutdown();
    if let Some(engine) = engine {
        engine.quit();
    }
    info!("Bye");
    Ok(())
}

async fn play_command(handle: &SessionHandle, line: &str) -> anyhow::Result<()> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("resign"), _) => handle.resign().await?,
        (Some("abort"), _) => handle.abort().await?,
        (Some("start"), _) => println!("view {}", handle.navigate(Navigation::Start).await?),
        (Some("prev"), _) => println!("view {}", handle.navigate(Navigation::Prev).await?),
        (Some("next"), _) => println!("view {}", handle.navigate(Navigation::Next).await?),
        (Some("end"), _) => println!("view {}", handle.navigate(Navigation::End).await?),
        (Some("goto"), Some(n)) => {
            let n: usize = n.parse().context("goto needs a number")?;
            println!("view {}", handle.go_to_move(n).await?);
        }
        (Some("analysis"), Some(state)) => handle.set_analysis(state == "on").await?,
        (Some("pgn"), _) => println!("{}", handle.export_pgn().await?),
        (Some("fen"), _) => {
            let snapshot = handle.snapshot().await?;
            println!("{}", snapshot.viewed().fen);
        }
        (Some(mv), None) => {
            let (from, to, promotion) =
                parse_coordinate_move(mv).with_context(|| format!("not a move: {mv}"))?;
            match handle.apply_move(from, to, promotion).await? {
                MoveOutcome::Accepted(_) => {}
                MoveOutcome::Deferred => println!("premove queued"),
            }
        }
        _ => println!("{PLAY_HELP}"),
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<DriverEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            DriverEvent::Session(SessionEvent::MoveApplied { record, ply }) => {
                println!("{}. {}", (ply + 1) / 2, record.san);
            }
            DriverEvent::Session(SessionEvent::StatusChanged { status }) => {
                if status.is_terminal() {
                    println!("game over: {} ({status:?})", status.result_tag());
                } else if status == GameStatus::InProgress {
                    println!("game on");
                }
            }
            DriverEvent::Session(SessionEvent::PremovesDiscarded { count }) => {
                println!("premove illegal, {count} discarded");
            }
            DriverEvent::Session(SessionEvent::LowTime { side }) => {
                println!("low time: {side:?}");
            }
            DriverEvent::Session(SessionEvent::LocalPlay) => {
                println!("engine gone, you play both sides");
            }
            DriverEvent::Analysis(evaluation) => {
                if let Some(best) = evaluation.best() {
                    println!(
                        "eval {} d{} {}",
                        best.score,
                        best.depth,
                        best.pv.iter().take(6).cloned().collect::<Vec<_>>().join(" ")
                    );
                }
            }
            DriverEvent::EngineDegraded(error) => println!("engine: {error}"),
            _ => {}
        }
    }
}

async fn puzzles(path: &str, input: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    let records: Vec<PuzzleRecord> = match serde_json::from_str(&text) {
        Ok(records) => records,
        Err(_) => vec![serde_json::from_str(&text).context("Invalid puzzle JSON")?],
    };
    info!(count = records.len(), "Puzzles loaded");
    println!("{PUZZLE_HELP}");

    let mut solved = 0;
    let mut session = PuzzleSession::new(StandardRules);
    'puzzles: for record in &records {
        if let Err(e) = session.load(record.clone()) {
            warn!(error = %e, fen = %record.fen, "Skipping unplayable puzzle");
            continue;
        }
        if let Err(e) = opponent_reply(&mut session) {
            warn!(error = %e, id = ?record.id, "Skipping puzzle with a bad solution");
            continue;
        }

        while session.status() == PuzzleStatus::Playing {
            let Some(line) = input.next_line().await? else {
                break 'puzzles;
            };
            match line.trim() {
                "" => {}
                "quit" => break 'puzzles,
                "skip" => continue 'puzzles,
                "hint" => match session.hint() {
                    Some(square) => println!("hint: {square}"),
                    None => println!("no hint"),
                },
                "retry" => {
                    session.retry()?;
                    opponent_reply(&mut session)?;
                }
                mv => {
                    let Some((from, to, promotion)) = parse_coordinate_move(mv) else {
                        println!("{PUZZLE_HELP}");
                        continue;
                    };
                    match session.player_move(from, to, promotion) {
                        Ok(PuzzleStatus::Playing) => opponent_reply(&mut session)?,
                        Ok(PuzzleStatus::Success) => {
                            solved += 1;
                            println!("solved!");
                        }
                        Ok(PuzzleStatus::Failed) => println!("wrong move; `retry` or `skip`"),
                        Ok(PuzzleStatus::Idle) => {}
                        Err(e) => println!("! {e}"),
                    }
                }
            }
            if session.status() == PuzzleStatus::Failed {
                let Some(line) = input.next_line().await? else {
                    break 'puzzles;
                };
                match line.trim() {
                    "retry" => {
                        session.retry()?;
                        opponent_reply(&mut session)?;
                    }
                    "quit" => break 'puzzles,
                    _ => {}
                }
            }
        }
    }

    println!("{solved}/{} solved", records.len());
    Ok(())
}

fn opponent_reply(session: &mut PuzzleSession<StandardRules>) -> anyhow::Result<()> {
    let record = session.opponent_step()?;
    println!(
        "opponent plays {}; you are {:?} in {}",
        record.san,
        session.solver_side(),
        session.session().live_position().fen
    );
    Ok(())
}
