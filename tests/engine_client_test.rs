/// Engine client behaviour against a scripted in-process UCI engine.
///
/// The fake answers `go depth N` with N info lines and an immediate bestmove,
/// so output for superseded requests really does arrive and must be dropped.
mod common;

use std::time::Duration;

use common::{connect_fake, fen_after, test_config, Script};
use engine_client::{
    EngineClient, EngineConfig, EngineError, EngineEvent, EngineEventKind, EngineSubscription,
    GoMode, Score, SearchEngine, SearchParams,
};

async fn next_event(subscription: &mut EngineSubscription) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("engine event stream closed")
}

/// Collect events up to and including the first terminal one.
async fn until_done(subscription: &mut EngineSubscription) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(subscription).await;
        let done = !matches!(event.kind, EngineEventKind::Info(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

async fn assert_quiet(subscription: &mut EngineSubscription, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, subscription.recv()).await {
        panic!("unexpected engine event: {event:?}");
    }
}

#[tokio::test]
async fn test_handshake_sends_options() {
    let config = EngineConfig {
        threads: 2,
        extra_options: vec![("Skill Level".into(), "3".into())],
        ..test_config()
    };
    let (_client, log) = connect_fake(Script::default(), &config).await.unwrap();

    let lines = log.lines();
    assert_eq!(lines[0], "uci");
    assert!(log.contains("setoption name Threads value 2"));
    assert!(log.contains("setoption name Hash value 64"));
    assert!(log.contains("setoption name Skill Level value 3"));
    assert_eq!(lines.last().map(String::as_str), Some("isready"));
}

#[tokio::test]
async fn test_handshake_timeout_is_unavailable() {
    let config = EngineConfig {
        init_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let script = Script {
        no_handshake: true,
        ..Script::default()
    };
    let err = connect_fake(script, &config).await.err().unwrap();
    assert!(matches!(err, EngineError::Unavailable(_)));
}

#[tokio::test]
async fn test_missing_binary_is_unavailable() {
    let config = EngineConfig {
        path: "/nonexistent/stockfish-binary".into(),
        ..test_config()
    };
    let err = EngineClient::spawn(&config).await.err().unwrap();
    assert!(matches!(err, EngineError::Unavailable(_)));
}

#[tokio::test]
async fn test_depth_search_streams_lines_then_bestmove() {
    let fen = fen_after(&["e2e4"]);
    let script = Script {
        score_cp: 35,
        ..Script::default()
    }
    .reply(&fen, "e7e5");
    let (client, log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    let id = client.submit(&fen, &SearchParams::depth(10)).unwrap();
    assert_eq!(id, 1);
    assert_eq!(client.current_request(), 1);

    let events = until_done(&mut subscription).await;
    assert!(events.iter().all(|e| e.request_id == id));
    assert_eq!(events.len(), 11);

    match &events[9].kind {
        EngineEventKind::Info(line) => {
            assert_eq!(line.depth, 10);
            assert_eq!(line.score, Score::Centipawns(35));
            assert_eq!(line.pv, vec!["e7e5", "e7e5"]);
        }
        other => panic!("expected info, got {other:?}"),
    }
    assert_eq!(
        events[10].kind,
        EngineEventKind::BestMove {
            best: Some("e7e5".into()),
            ponder: None
        }
    );
    assert!(log.contains(&format!("position fen {fen}")));
    assert!(log.contains("go depth 10"));
}

#[tokio::test]
async fn test_rapid_submits_only_surface_the_last_request() {
    let positions = [
        fen_after(&["e2e4"]),
        fen_after(&["d2d4"]),
        fen_after(&["c2c4"]),
        fen_after(&["g1f3"]),
        fen_after(&["b2b3"]),
    ];
    let mut script = Script::default();
    for (i, fen) in positions.iter().enumerate() {
        script = script.reply(fen, ["e7e5", "d7d5", "c7c5", "g8f6", "e7e6"][i]);
    }
    let (client, _log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    let mut last = 0;
    for fen in &positions {
        last = client.submit(fen, &SearchParams::depth(6)).unwrap();
    }
    assert_eq!(last, 5);

    let events = until_done(&mut subscription).await;
    assert!(
        events.iter().all(|e| e.request_id == last),
        "stale request surfaced: {events:?}"
    );
    assert_eq!(
        events.last().unwrap().kind,
        EngineEventKind::BestMove {
            best: Some("e7e6".into()),
            ponder: None
        }
    );
    assert_quiet(&mut subscription, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_cancel_silences_request() {
    let script = Script {
        hang: true,
        ..Script::default()
    };
    let (client, log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    let id = client.submit(&fen_after(&[]), &SearchParams::depth(4)).unwrap();
    // Info lines arrive before the search is cancelled
    let first = next_event(&mut subscription).await;
    assert_eq!(first.request_id, id);

    client.cancel(id);
    assert_eq!(client.current_request(), engine_client::NO_REQUEST);
    assert!(common::eventually(|| log.contains("stop")).await);
    // The bestmove that `stop` provokes belongs to a cancelled request
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut leftovers = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), subscription.recv()).await
    {
        leftovers.push(event);
    }
    assert!(leftovers
        .iter()
        .all(|e| !matches!(e.kind, EngineEventKind::BestMove { .. })));
}

#[tokio::test]
async fn test_cancel_of_superseded_request_is_ignored() {
    let fen = fen_after(&["e2e4"]);
    let script = Script {
        think: Some(Duration::from_millis(100)),
        ..Script::default()
    }
    .reply(&fen, "c7c5");
    let (client, _log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    let first = client.submit(&fen_after(&[]), &SearchParams::depth(2)).unwrap();
    let second = client.submit(&fen, &SearchParams::depth(2)).unwrap();
    client.cancel(first);
    assert_eq!(client.current_request(), second);

    let events = until_done(&mut subscription).await;
    assert_eq!(
        events.last().unwrap().kind,
        EngineEventKind::BestMove {
            best: Some("c7c5".into()),
            ponder: None
        }
    );
}

#[tokio::test]
async fn test_missing_bestmove_times_out() {
    let config = EngineConfig {
        bestmove_timeout: Duration::from_millis(150),
        ..test_config()
    };
    let script = Script {
        hang: true,
        ..Script::default()
    };
    let (client, log) = connect_fake(script, &config).await.unwrap();
    let mut subscription = client.subscribe();

    let id = client.submit(&fen_after(&[]), &SearchParams::depth(3)).unwrap();
    let events = until_done(&mut subscription).await;
    let last = events.last().unwrap();
    assert_eq!(last.request_id, id);
    assert_eq!(
        last.kind,
        EngineEventKind::Failed(EngineError::Timeout(Duration::from_millis(150)))
    );
    assert!(common::eventually(|| log.contains("stop")).await);
}

#[tokio::test]
async fn test_engine_exit_is_unavailable() {
    let script = Script {
        die_on_go: true,
        ..Script::default()
    };
    let (client, _log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    client.submit(&fen_after(&[]), &SearchParams::depth(3)).unwrap();
    let event = next_event(&mut subscription).await;
    assert!(matches!(
        event.kind,
        EngineEventKind::Failed(EngineError::Unavailable(_))
    ));

    // Once the task has stopped, submits fail outright
    let mut refused = false;
    for _ in 0..50 {
        if client
            .submit(&fen_after(&[]), &SearchParams::depth(3))
            .is_err()
        {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused);
}

#[tokio::test]
async fn test_multipv_option_sent_only_on_change() {
    let (client, log) = connect_fake(Script::default(), &test_config())
        .await
        .unwrap();
    let mut subscription = client.subscribe();
    let params = SearchParams::depth(2).with_multipv(3);

    client.submit(&fen_after(&[]), &params).unwrap();
    let events = until_done(&mut subscription).await;
    let variations: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EngineEventKind::Info(line) => Some(line.variation),
            _ => None,
        })
        .collect();
    assert_eq!(variations, vec![1, 2, 3, 1, 2, 3]);

    client.submit(&fen_after(&["e2e4"]), &params).unwrap();
    until_done(&mut subscription).await;
    assert_eq!(log.count("setoption name MultiPV value 3"), 1);

    client.submit(&fen_after(&[]), &SearchParams::depth(2)).unwrap();
    until_done(&mut subscription).await;
    assert_eq!(log.count("setoption name MultiPV value 1"), 1);
}

#[tokio::test]
async fn test_infinite_search_runs_until_superseded() {
    let fen = fen_after(&["d2d4"]);
    let script = Script::default().reply(&fen, "g8f6");
    let (client, log) = connect_fake(script, &test_config()).await.unwrap();
    let mut subscription = client.subscribe();

    let infinite = SearchParams {
        go: GoMode::Infinite,
        multipv: 1,
    };
    let first = client.submit(&fen_after(&[]), &infinite).unwrap();
    let event = next_event(&mut subscription).await;
    assert_eq!(event.request_id, first);
    assert!(log.contains("go infinite"));

    let second = client.submit(&fen, &SearchParams::depth(3)).unwrap();
    let events = until_done(&mut subscription).await;
    // Leftover infinite-search lines were already queued; none may surface now
    assert!(events.iter().all(|e| e.request_id == second));
    assert_eq!(
        events.last().unwrap().kind,
        EngineEventKind::BestMove {
            best: Some("g8f6".into()),
            ponder: None
        }
    );
}

#[tokio::test]
async fn test_new_game_and_set_option() {
    let (client, log) = connect_fake(Script::default(), &test_config())
        .await
        .unwrap();
    client.new_game().unwrap();
    client.set_option("UCI_LimitStrength", "true").unwrap();
    assert!(common::eventually(|| log.contains("ucinewgame")).await);
    assert!(common::eventually(|| log.contains("setoption name UCI_LimitStrength value true")).await);

    client.quit();
    assert!(common::eventually(|| log.contains("quit")).await);
}

#[tokio::test]
async fn test_event_stream_ends_when_engine_stops() {
    let (client, _log) = connect_fake(Script::default(), &test_config())
        .await
        .unwrap();
    let mut subscription = client.subscribe();

    // Nothing is searching, so no Failed event precedes the end
    client.quit();
    let end = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("event stream stayed open after quit");
    assert_eq!(end, None);

    let mut late = client.subscribe();
    let end = tokio::time::timeout(Duration::from_secs(5), late.recv())
        .await
        .expect("late subscription stayed open");
    assert_eq!(end, None);
}
