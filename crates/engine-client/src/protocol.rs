//! UCI output parsing

use crate::types::{EngineLine, Score};

/// Tokens that can follow a PV on the same info line.
const INFO_KEYWORDS: &[&str] = &[
    "depth",
    "seldepth",
    "multipv",
    "score",
    "nodes",
    "nps",
    "hashfull",
    "tbhits",
    "time",
    "currmove",
    "currmovenumber",
    "cpuload",
    "refutation",
    "currline",
    "string",
    "bmc",
];

/// What a single line of engine output means to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    Info(EngineLine),
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    /// `uciok`, `readyok`, `info string`, incomplete info lines, noise
    Ignored,
}

/// Classify one line of engine output.
pub fn parse_line(line: &str) -> EngineOutput {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.first() {
        Some(&"info") => parse_info(&parts).map_or(EngineOutput::Ignored, EngineOutput::Info),
        Some(&"bestmove") => parse_bestmove(&parts),
        _ => EngineOutput::Ignored,
    }
}

/// An info line only counts with a depth, a cp-or-mate score and a non-empty PV.
fn parse_info(parts: &[&str]) -> Option<EngineLine> {
    if parts.get(1) == Some(&"string") {
        return None;
    }
    let depth = parse_after(parts, "depth")?;
    let score = parse_score(parts)?;
    let pv = parse_pv(parts);
    if pv.is_empty() {
        return None;
    }
    let variation = parse_multipv_index(parts).unwrap_or(1).max(1);
    Some(EngineLine {
        variation,
        score,
        pv,
        depth,
    })
}

fn parse_bestmove(parts: &[&str]) -> EngineOutput {
    let best = parts
        .get(1)
        .filter(|m| **m != "(none)" && **m != "0000")
        .map(|m| m.to_string());
    let ponder = match (parts.get(2), parts.get(3)) {
        (Some(&"ponder"), Some(m)) => Some(m.to_string()),
        _ => None,
    };
    EngineOutput::BestMove { best, ponder }
}

fn parse_after<T: std::str::FromStr>(parts: &[&str], key: &str) -> Option<T> {
    let i = parts.iter().position(|p| *p == key)?;
    parts.get(i + 1)?.parse().ok()
}

/// Parse `score cp <n>` or `score mate <n>`
fn parse_score(parts: &[&str]) -> Option<Score> {
    let i = parts.iter().position(|p| *p == "score")?;
    match parts.get(i + 1)? {
        &"cp" => parse_cp(&parts[i..]).map(Score::Centipawns),
        &"mate" => parse_mate(&parts[i..]).map(Score::Mate),
        _ => None,
    }
}

/// Parse centipawn score from info tokens
fn parse_cp(parts: &[&str]) -> Option<i32> {
    parse_after(parts, "cp")
}

/// Parse mate score from info tokens
fn parse_mate(parts: &[&str]) -> Option<i32> {
    parse_after(parts, "mate")
}

/// Parse multipv index from info tokens
fn parse_multipv_index(parts: &[&str]) -> Option<u32> {
    parse_after(parts, "multipv")
}

/// Parse PV moves from info tokens
fn parse_pv(parts: &[&str]) -> Vec<String> {
    let Some(start) = parts.iter().position(|p| *p == "pv") else {
        return Vec::new();
    };
    parts[start + 1..]
        .iter()
        .take_while(|p| !INFO_KEYWORDS.contains(*p))
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        match parse_line(line) {
            EngineOutput::Info(l) => {
                assert_eq!(l.depth, 20);
                assert_eq!(l.score, Score::Centipawns(35));
                assert_eq!(l.variation, 1);
            }
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        match parse_line(line) {
            EngineOutput::Info(l) => assert_eq!(l.score, Score::Mate(-3)),
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 multipv 2 score cp 35 lowerbound pv e2e4 e7e5 g1f3 bmc 0.5";
        match parse_line(line) {
            EngineOutput::Info(l) => {
                assert_eq!(l.pv, vec!["e2e4", "e7e5", "g1f3"]);
                assert_eq!(l.variation, 2);
            }
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_info_is_ignored() {
        assert_eq!(
            parse_line("info depth 5 currmove e2e4 currmovenumber 1"),
            EngineOutput::Ignored
        );
        assert_eq!(
            parse_line("info depth 5 score cp 10 pv"),
            EngineOutput::Ignored
        );
        assert_eq!(
            parse_line("info string NNUE evaluation using nn.nnue score cp 3 pv x"),
            EngineOutput::Ignored
        );
        assert_eq!(parse_line("info depth x score cp 1 pv e2e4"), EngineOutput::Ignored);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            EngineOutput::BestMove {
                best: Some("e2e4".into()),
                ponder: Some("e7e5".into())
            }
        );
        assert_eq!(
            parse_line("bestmove (none)"),
            EngineOutput::BestMove {
                best: None,
                ponder: None
            }
        );
    }

    #[test]
    fn test_handshake_lines_are_ignored() {
        assert_eq!(parse_line("uciok"), EngineOutput::Ignored);
        assert_eq!(parse_line("readyok"), EngineOutput::Ignored);
        assert_eq!(parse_line(""), EngineOutput::Ignored);
    }
}
