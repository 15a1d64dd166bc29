//! The built-in benchmark: a fixed list of royal-variant positions searched
//! under a configurable limit, for reproducible node counts.

use std::fs;

use anyhow::{Context, Result};

/// Recorded positions covering the variant's special rules: the start
/// position, royal endgames, princess-rights middlegames and promotion
/// races.
pub const DEFAULT_FENS: [&str; 11] = [
    "rnbskqtbnr/pppppppppp/55/55/55/55/55/55/PPPPPPPPPP/RNBSKQTBNR w KQkq Ss - 0 1",
    "5k4/55/55/55/55/55/55/55/p9/4K5 w - Ss - 0 1",
    "5q4/55/55/55/55/55/55/5k4/55/4K5 w - Ss - 0 1",
    "55/55/55/55/55/55/55/5sk4/55/4K5 w - Ss - 0 1",
    "55/55/55/55/55/55/55/5tk4/55/4K5 w - Ss - 0 1",
    "rnbsk1111r/pppppqtppp/11111ppn11/1111b11111/1111111111/1111111111/1111111111/PPPPPPP111/1111111PPP/RNBSKQTBNR b KQkq Ss - 0 7",
    "11kr1qtbnr/pppspppppp/11np111111/11111b1111/1111111111/1111111111/1111111111/PPPPP11111/11111PPPPP/RNBSKQTBNR w KQ Ss - 1 6",
    "qqqk6/55/55/55/55/55/55/55/55/5KT3 b - Ss - 0 1",
    "rnbskqtbnr/1111111111/11S1111111/1111111111/1111111111/1111111111/1111111111/1111111111/PPPPPPPPPP/RNB1KQTBNR w KQkq Ss - 0 1",
    "k8q/55/55/55/PPP7/55/55/55/55/KQ8 w - Ss - 0 1",
    "4skq3/55/55/55/37/55/55/55/55/4SKQ3 w - Ss - 0 1",
];

/// Expands `bench [ttMB threads limit fenFile {depth|nodes|movetime|perft|eval}]`
/// into the UCI commands the engine replays. A missing FEN file is fatal.
pub fn setup_bench(current_fen: &str, args: &[&str]) -> Result<Vec<String>> {
    let tt_size = args.first().copied().unwrap_or("16");
    let threads = args.get(1).copied().unwrap_or("1");
    let limit = args.get(2).copied().unwrap_or("13");
    let fen_file = args.get(3).copied().unwrap_or("default");
    let limit_type = args.get(4).copied().unwrap_or("depth");

    let go = if limit_type == "eval" {
        "eval".to_string()
    } else {
        format!("go {} {}", limit_type, limit)
    };

    let fens: Vec<String> = match fen_file {
        "default" => DEFAULT_FENS.iter().map(|s| s.to_string()).collect(),
        "current" => vec![current_fen.to_string()],
        path => fs::read_to_string(path)
            .with_context(|| format!("Unable to open file {}", path))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect(),
    };

    let mut list = vec![
        format!("setoption name Threads value {}", threads),
        format!("setoption name Hash value {}", tt_size),
        "ucinewgame".to_string(),
    ];

    for fen in fens {
        if fen.contains("setoption") {
            list.push(fen);
        } else {
            list.push(format!("position fen {}", fen));
            list.push(go.clone());
        }
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::Position;

    #[test]
    fn every_default_fen_parses() {
        for fen in DEFAULT_FENS {
            assert!(Position::from_fen(fen).is_some(), "bad FEN: {}", fen);
        }
    }

    #[test]
    fn default_bench_searches_all_positions_at_depth_13() {
        let commands = setup_bench("ignored", &[]).unwrap();
        assert_eq!(commands[0], "setoption name Threads value 1");
        assert_eq!(commands[1], "setoption name Hash value 16");
        assert_eq!(commands[2], "ucinewgame");
        assert_eq!(
            commands.iter().filter(|c| c.as_str() == "go depth 13").count(),
            DEFAULT_FENS.len()
        );
    }

    #[test]
    fn bench_arguments_override_the_defaults() {
        let commands = setup_bench("FEN", &["64", "4", "5000", "current", "movetime"]).unwrap();
        assert_eq!(commands[0], "setoption name Threads value 4");
        assert_eq!(commands[1], "setoption name Hash value 64");
        assert!(commands.contains(&"position fen FEN".to_string()));
        assert!(commands.contains(&"go movetime 5000".to_string()));
    }

    #[test]
    fn missing_fen_file_is_an_error() {
        assert!(setup_bench("x", &["16", "1", "13", "/no/such/file.fen"]).is_err());
    }
}
