//! The UCI-family text protocol. Commands arrive on stdin; searches run on
//! a dedicated thread so `stop` and `ponderhit` stay responsive.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::board::bitboard::{algebraic_to_square, square_to_algebraic, Square};
use crate::board::position::{Move, MoveType, PieceType, Position};
use crate::eval::evaluate::{evaluate, Value, PAWN_VALUE_EG, VALUE_MATE};
use crate::movegen::moves::{generate, GenType};
use crate::search::alphabeta::MAX_PLY;
use crate::search::thread::ThreadPool;
use crate::search::time_management::Limits;
use crate::uci::bench::setup_bench;

const ENGINE_NAME: &str = "Royal100";
const ENGINE_VERSION: &str = "1.0";
const ENGINE_AUTHOR: &str = "the Royal100 developers";

const DEFAULT_TT_SIZE_MB: usize = 16;
const MIN_TT_SIZE_MB: usize = 1;
const MAX_TT_SIZE_MB: usize = 32768;
const DEFAULT_THREADS: usize = 1;
const MAX_THREADS: usize = 256;
const MAX_MULTI_PV: usize = 500;

/// Wire format of a move: from-square, to-square, an optional promotion
/// letter and `=S` when the move also promotes the princess.
pub fn uci_move(m: Move) -> String {
    if m == Move::NONE {
        return "(none)".to_string();
    }
    if m == Move::NULL {
        return "0000".to_string();
    }

    let mut s = format!(
        "{}{}",
        square_to_algebraic(m.from()),
        square_to_algebraic(m.to())
    );

    if m.move_type() == MoveType::Promotion {
        s.push(match m.promotion_type() {
            PieceType::Queen => 'q',
            PieceType::Rook => 'r',
            PieceType::Bishop => 'b',
            _ => 'n',
        });
    }

    if m.promote_princess() {
        s.push_str("=S");
    }

    s
}

/// Scores in centipawns normalised to the endgame pawn value, or mate
/// distance in moves.
pub fn uci_value(v: Value) -> String {
    if v.abs() >= VALUE_MATE - MAX_PLY {
        let moves = if v > 0 {
            (VALUE_MATE - v + 1) / 2
        } else {
            -(VALUE_MATE + v) / 2
        };
        format!("mate {}", moves)
    } else {
        format!("cp {}", v * 100 / PAWN_VALUE_EG)
    }
}

/// Splits one square off the front of a wire move, accepting the
/// two-character rank 10.
fn parse_square(text: &str) -> Option<(Square, &str)> {
    let mut chars = text.char_indices();
    let (_, file_ch) = chars.next()?;
    if !('a'..='j').contains(&file_ch) {
        return None;
    }

    let digits_end = text[1..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |i| i + 1);
    let square = algebraic_to_square(&text[..digits_end])?;
    Some((square, &text[digits_end..]))
}

/// Matches a wire move against the position's legal move list.
pub fn parse_move(pos: &Position, text: &str) -> Option<Move> {
    let (promote_princess, body) = match text.strip_suffix("=S") {
        Some(body) => (true, body),
        None => (false, text),
    };

    let (from, rest) = parse_square(body)?;
    let (to, rest) = parse_square(rest)?;

    let promotion = match rest {
        "" => None,
        "q" => Some(PieceType::Queen),
        "r" => Some(PieceType::Rook),
        "b" => Some(PieceType::Bishop),
        "n" => Some(PieceType::Knight),
        _ => return None,
    };

    generate(pos, GenType::Legal).into_iter().find(|m| {
        m.from() == from
            && m.to() == to
            && m.promote_princess() == promote_princess
            && match promotion {
                Some(pt) => m.move_type() == MoveType::Promotion && m.promotion_type() == pt,
                None => m.move_type() != MoveType::Promotion,
            }
    })
}

pub struct Engine {
    position: Position,
    pool: Arc<Mutex<ThreadPool>>,
    search_thread: Option<thread::JoinHandle<()>>,

    stop: Arc<AtomicBool>,
    ponder: Arc<AtomicBool>,
    stop_on_ponderhit: Arc<AtomicBool>,

    debug_mode: bool,
    tt_size_mb: usize,
    thread_count: usize,
    move_overhead: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        crate::init();

        Engine {
            position: Position::startpos(),
            pool: Arc::new(Mutex::new(ThreadPool::new(DEFAULT_THREADS, DEFAULT_TT_SIZE_MB))),
            search_thread: None,
            stop: Arc::new(AtomicBool::new(false)),
            ponder: Arc::new(AtomicBool::new(false)),
            stop_on_ponderhit: Arc::new(AtomicBool::new(false)),
            debug_mode: false,
            tt_size_mb: DEFAULT_TT_SIZE_MB,
            thread_count: DEFAULT_THREADS,
            move_overhead: 50,
        }
    }

    /// Processes a single command line given on the command line, or the
    /// stdin loop when none was given.
    pub fn run(&mut self, args: &str) {
        if !args.trim().is_empty() {
            self.handle_command(args.trim());
            self.ensure_search_stopped();
            return;
        }

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !self.handle_command(trimmed) {
                break;
            }
            let _ = io::stdout().flush();
        }

        self.ensure_search_stopped();
    }

    /// Returns false when the engine should exit.
    fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.split_whitespace().collect();

        match parts[0] {
            "uci" => self.uci_command(),
            "debug" => self.debug_mode = parts.get(1) == Some(&"on"),
            "isready" => {
                println!("readyok");
            }
            "setoption" => self.setoption_command(&parts),
            "ucinewgame" => {
                self.ensure_search_stopped();
                self.pool.lock().unwrap().clear();
            }
            "position" => self.position_command(&parts),
            "go" => self.go_command(&parts),
            "stop" => self.stop.store(true, Ordering::SeqCst),
            "ponderhit" => {
                self.ponder.store(false, Ordering::SeqCst);
                if self.stop_on_ponderhit.load(Ordering::SeqCst) {
                    self.stop.store(true, Ordering::SeqCst);
                }
            }
            "bench" => self.bench_command(&parts[1..]),
            "d" | "display" => print!("{}", self.position.pretty()),
            "eval" => {
                println!("info string static eval {}", uci_value(evaluate(&self.position)))
            }
            "quit" => {
                self.ensure_search_stopped();
                return false;
            }
            _ => eprintln!("Unknown command: {}", command),
        }

        true
    }

    fn uci_command(&self) {
        println!("id name {} {}", ENGINE_NAME, ENGINE_VERSION);
        println!("id author {}", ENGINE_AUTHOR);
        println!(
            "option name Hash type spin default {} min {} max {}",
            DEFAULT_TT_SIZE_MB, MIN_TT_SIZE_MB, MAX_TT_SIZE_MB
        );
        println!(
            "option name Threads type spin default {} min 1 max {}",
            DEFAULT_THREADS, MAX_THREADS
        );
        println!("option name MultiPV type spin default 1 min 1 max {}", MAX_MULTI_PV);
        println!("option name Ponder type check default false");
        println!("option name Move Overhead type spin default 50 min 0 max 5000");
        println!("option name Clear Hash type button");
        println!("uciok");
    }

    fn setoption_command(&mut self, parts: &[&str]) {
        self.ensure_search_stopped();

        let mut name = Vec::new();
        let mut value = Vec::new();
        let mut target: Option<&mut Vec<&str>> = None;

        for &part in &parts[1..] {
            match part {
                "name" => target = Some(&mut name),
                "value" => target = Some(&mut value),
                _ => {
                    if let Some(ref mut t) = target {
                        t.push(part);
                    }
                }
            }
        }

        let name = name.join(" ");
        let value = value.join(" ");

        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.tt_size_mb = mb.clamp(MIN_TT_SIZE_MB, MAX_TT_SIZE_MB);
                    self.pool
                        .lock()
                        .unwrap()
                        .reconfigure(self.thread_count, self.tt_size_mb);
                }
            }
            "Threads" => {
                if let Ok(threads) = value.parse::<usize>() {
                    self.thread_count = threads.clamp(1, MAX_THREADS);
                    self.pool
                        .lock()
                        .unwrap()
                        .reconfigure(self.thread_count, self.tt_size_mb);
                }
            }
            "MultiPV" => {
                if let Ok(multi_pv) = value.parse::<usize>() {
                    self.pool.lock().unwrap().multi_pv = multi_pv.clamp(1, MAX_MULTI_PV);
                }
            }
            "Ponder" => {}
            "Move Overhead" => {
                if let Ok(overhead) = value.parse::<u64>() {
                    self.move_overhead = overhead.min(5000);
                }
            }
            "Clear Hash" => self.pool.lock().unwrap().clear_hash(),
            _ => eprintln!("Unknown option: {}", name),
        }
    }

    fn position_command(&mut self, parts: &[&str]) {
        self.ensure_search_stopped();

        let moves_idx = parts.iter().position(|&p| p == "moves");

        let new_position = match parts.get(1) {
            Some(&"startpos") => Some(Position::startpos()),
            Some(&"fen") => {
                let end = moves_idx.unwrap_or(parts.len());
                let fen = parts[2..end].join(" ");
                match Position::from_fen(&fen) {
                    Some(pos) => Some(pos),
                    None => {
                        eprintln!("Invalid FEN: {}", fen);
                        return;
                    }
                }
            }
            _ => {
                eprintln!("Invalid position command");
                return;
            }
        };

        let mut pos = match new_position {
            Some(pos) => pos,
            None => return,
        };

        if let Some(idx) = moves_idx {
            for &move_str in &parts[idx + 1..] {
                match parse_move(&pos, move_str) {
                    Some(m) => pos.do_move(m),
                    None => {
                        eprintln!("Illegal move: {}", move_str);
                        return;
                    }
                }
            }
        }

        self.position = pos;
    }

    fn parse_go_limits(&self, parts: &[&str]) -> Limits {
        let mut limits = Limits {
            start_time: Instant::now(),
            ..Limits::default()
        };

        let mut i = 1;
        while i < parts.len() {
            let argument = |i: usize| parts.get(i + 1).and_then(|v| v.parse().ok());
            match parts[i] {
                "wtime" => {
                    limits.time[0] = argument(i);
                    i += 1;
                }
                "btime" => {
                    limits.time[1] = argument(i);
                    i += 1;
                }
                "winc" => {
                    limits.inc[0] = argument(i).unwrap_or(0);
                    i += 1;
                }
                "binc" => {
                    limits.inc[1] = argument(i).unwrap_or(0);
                    i += 1;
                }
                "movestogo" => {
                    limits.movestogo = parts.get(i + 1).and_then(|v| v.parse().ok());
                    i += 1;
                }
                "depth" => {
                    limits.depth = parts
                        .get(i + 1)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    i += 1;
                }
                "nodes" => {
                    limits.nodes = argument(i).unwrap_or(0);
                    i += 1;
                }
                "movetime" => {
                    let requested: u64 = argument(i).unwrap_or(0);
                    limits.movetime = requested.saturating_sub(self.move_overhead).max(1);
                    i += 1;
                }
                "perft" => {
                    limits.perft = parts
                        .get(i + 1)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(1);
                    i += 1;
                }
                "infinite" => limits.infinite = true,
                "ponder" => limits.ponder = true,
                _ => {}
            }
            i += 1;
        }

        limits
    }

    fn go_command(&mut self, parts: &[&str]) {
        self.ensure_search_stopped();

        let limits = self.parse_go_limits(parts);
        if self.debug_mode {
            println!("info string searching {}", self.position.fen());
        }

        self.stop.store(false, Ordering::SeqCst);
        self.stop_on_ponderhit.store(false, Ordering::SeqCst);
        self.ponder.store(limits.ponder, Ordering::SeqCst);

        let pool = Arc::clone(&self.pool);
        let position = self.position.clone();
        let stop = Arc::clone(&self.stop);
        let ponder = Arc::clone(&self.ponder);
        let stop_on_ponderhit = Arc::clone(&self.stop_on_ponderhit);

        self.search_thread = Some(thread::spawn(move || {
            let mut pool = pool.lock().unwrap();
            pool.go(&position, limits, stop, ponder, stop_on_ponderhit);
            let _ = io::stdout().flush();
        }));
    }

    fn ensure_search_stopped(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            self.stop.store(true, Ordering::SeqCst);
            self.ponder.store(false, Ordering::SeqCst);
            let _ = handle.join();
        }
    }

    /// `bench [ttMB threads limit fenFile type]`: runs the recorded
    /// positions through `go` synchronously and reports totals.
    fn bench_command(&mut self, args: &[&str]) {
        self.ensure_search_stopped();

        let commands = match setup_bench(&self.position.fen(), args) {
            Ok(commands) => commands,
            Err(err) => {
                eprintln!("{}", err);
                std::process::exit(1);
            }
        };

        let started = Instant::now();
        let mut total_nodes = 0u64;

        for command in &commands {
            let parts: Vec<&str> = command.split_whitespace().collect();
            eprintln!("\nRunning: {}", command);

            match parts[0] {
                "go" => {
                    let limits = self.parse_go_limits(&parts);
                    self.stop.store(false, Ordering::SeqCst);
                    self.stop_on_ponderhit.store(false, Ordering::SeqCst);
                    self.ponder.store(false, Ordering::SeqCst);

                    total_nodes += self.pool.lock().unwrap().go(
                        &self.position,
                        limits,
                        Arc::clone(&self.stop),
                        Arc::clone(&self.ponder),
                        Arc::clone(&self.stop_on_ponderhit),
                    );
                }
                "eval" => {
                    println!(
                        "info string static eval {}",
                        uci_value(evaluate(&self.position))
                    );
                }
                _ => {
                    self.handle_command(command);
                }
            }
        }

        let elapsed = started.elapsed().as_millis().max(1) as u64;
        eprintln!("\n===========================");
        eprintln!("Total time (ms) : {}", elapsed);
        eprintln!("Nodes searched  : {}", total_nodes);
        eprintln!("Nodes/second    : {}", total_nodes * 1000 / elapsed);
    }
}

pub fn run_uci(args: &str) {
    let mut engine = Engine::new();
    println!("{} {} by {}", ENGINE_NAME, ENGINE_VERSION, ENGINE_AUTHOR);
    engine.run(args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::Color;

    fn sq(name: &str) -> Square {
        algebraic_to_square(name).unwrap()
    }

    #[test]
    fn move_round_trips_through_wire_format() {
        let pos = Position::startpos();
        for m in generate(&pos, GenType::Legal) {
            let text = uci_move(m);
            assert_eq!(parse_move(&pos, &text), Some(m), "wire {}", text);
        }
    }

    #[test]
    fn rank_ten_moves_parse() {
        let pos = Position::from_fen("4k5/55/55/55/55/55/55/55/55/R3K5 w - - - 0 1")
            .unwrap();
        let m = parse_move(&pos, "a1a10").unwrap();
        assert_eq!(m.from(), sq("a1"));
        assert_eq!(m.to(), sq("a10"));
        assert_eq!(uci_move(m), "a1a10");
    }

    #[test]
    fn promotion_and_princess_suffixes() {
        // White pawn on e9 promotes; the =S suffix marks flagged moves.
        let pos = Position::from_fen("2k7/4P5/55/55/55/55/55/55/55/4K5 w - - - 0 1")
            .unwrap();
        let m = parse_move(&pos, "e9e10q").unwrap();
        assert_eq!(m.move_type(), MoveType::Promotion);
        assert_eq!(m.promotion_type(), PieceType::Queen);
        assert_eq!(uci_move(m), "e9e10q");

        let flagged = Move::new(sq("j10"), sq("j9")).with_promote_princess();
        assert_eq!(uci_move(flagged), "j10j9=S");
    }

    #[test]
    fn flagged_moves_parse_against_the_position() {
        let mut pos =
            Position::from_fen("3sq4k/55/55/55/55/4Q5/55/55/55/K9 w - s - 0 1").unwrap();
        let capture = parse_move(&pos, "e5e10").unwrap();
        pos.do_move(capture);
        assert!(pos.queen_captured());

        let flagged = parse_move(&pos, "j10j9=S").unwrap();
        assert!(flagged.promote_princess());
        let plain = parse_move(&pos, "j10j9").unwrap();
        assert!(!plain.promote_princess());
        assert_ne!(flagged, plain);
    }

    #[test]
    fn mate_scores_format_as_moves() {
        assert_eq!(uci_value(VALUE_MATE - 1), "mate 1");
        assert_eq!(uci_value(VALUE_MATE - 3), "mate 2");
        assert_eq!(uci_value(-(VALUE_MATE - 2)), "mate -1");
        assert_eq!(uci_value(PAWN_VALUE_EG), "cp 100");
    }

    #[test]
    fn position_command_applies_moves() {
        let mut engine = Engine::new();
        let parts: Vec<&str> = "position startpos moves e2e5 e9e6"
            .split_whitespace()
            .collect();
        engine.position_command(&parts);
        assert_eq!(engine.position.side_to_move(), Color::White);
        assert_eq!(engine.position.game_ply(), 2);
        // Both triple pushes happened.
        assert!(engine.position.empty(sq("e2")));
        assert!(engine.position.empty(sq("e9")));
    }
}
