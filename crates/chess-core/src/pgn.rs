//! PGN reading (regex tokenizer, replayed through the rules) and writing.

use regex::Regex;
use shakmaty::san::San;
use shakmaty::Color;

use crate::error::RulesError;
use crate::position::{MoveRecord, PositionSnapshot, ValidatedMove, STANDARD_START_FEN};
use crate::rules::{parse_position, play_validated, snapshot};

/// A PGN game replayed through the rules.
#[derive(Debug, Clone)]
pub struct PgnGame {
    /// Tag pairs in file order
    pub headers: Vec<(String, String)>,
    /// Position before the first move (`[FEN]` tag or the standard start)
    pub start: PositionSnapshot,
    pub moves: Vec<ValidatedMove>,
    /// "1-0", "0-1", "1/2-1/2" or "*"
    pub result: String,
}

impl PgnGame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn regex(pattern: &str) -> Result<Regex, RulesError> {
    Regex::new(pattern).map_err(|e| RulesError::InvalidPgn(e.to_string()))
}

/// Parse a PGN string and replay its mainline from the start position.
pub fn replay_pgn(pgn: &str) -> Result<PgnGame, RulesError> {
    let header_re = regex(r#"\[(\w+)\s+"([^"]*)"\]"#)?;

    let headers: Vec<(String, String)> = header_re
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect();

    let start_fen = headers
        .iter()
        .find(|(k, _)| k == "FEN")
        .map(|(_, v)| v.as_str())
        .unwrap_or(STANDARD_START_FEN);

    let mut pos = parse_position(start_fen)?;
    let start = snapshot(&pos);

    let tokens = extract_moves(pgn)?;
    if tokens.is_empty() && headers.is_empty() {
        return Err(RulesError::InvalidPgn("no tags and no moves".into()));
    }

    let mut moves = Vec::with_capacity(tokens.len());
    for (ply, token) in tokens.iter().enumerate() {
        let bare = token.trim_end_matches(['+', '#']);
        let san: San = bare.parse().map_err(|_| RulesError::IllegalPgnMove {
            san: token.clone(),
            ply,
        })?;
        let legal = san.to_move(&pos).map_err(|_| RulesError::IllegalPgnMove {
            san: token.clone(),
            ply,
        })?;
        moves.push(play_validated(&mut pos, &legal));
    }

    let result = headers
        .iter()
        .find(|(k, _)| k == "Result")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| "*".to_string());

    Ok(PgnGame {
        headers,
        start,
        moves,
        result,
    })
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Result<Vec<String>, RulesError> {
    let no_headers = regex(r"\[[^\]]*\]")?.replace_all(pgn, "").into_owned();
    let no_comments = regex(r"\{[^}]*\}")?.replace_all(&no_headers, "").into_owned();
    let no_variations = regex(r"\([^)]*\)")?
        .replace_all(&no_comments, "")
        .into_owned();

    let move_re = regex(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O[+#]?|O-O[+#]?")?;

    Ok(move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect())
}

/// Write a game as PGN: tag pairs, then numbered SAN movetext ending in `result`.
pub fn write_pgn(
    headers: &[(String, String)],
    start: &PositionSnapshot,
    moves: &[MoveRecord],
    result: &str,
) -> String {
    let mut out = String::new();
    for (key, value) in headers {
        out.push_str(&format!("[{key} \"{}\"]\n", value.replace('"', "'")));
    }
    if !headers.is_empty() {
        out.push('\n');
    }

    let mut move_number: u32 = start
        .fen
        .split_whitespace()
        .nth(5)
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);
    let mut turn = start.turn;
    let mut tokens: Vec<String> = Vec::with_capacity(moves.len() + 1);

    for (i, mv) in moves.iter().enumerate() {
        match turn {
            Color::White => tokens.push(format!("{move_number}. {}", mv.san)),
            Color::Black if i == 0 => tokens.push(format!("{move_number}... {}", mv.san)),
            Color::Black => tokens.push(mv.san.clone()),
        }
        if turn == Color::Black {
            move_number += 1;
        }
        turn = !turn;
    }
    tokens.push(result.to_string());

    out.push_str(&tokens.join(" "));
    out.push('\n');
    out
}
