//! Worker pool. Workers are OS threads spawned per search; they share only
//! the atomic control flags, the node counters and the transposition table.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::board::position::{Move, Position};
use crate::eval::evaluate::{VALUE_DRAW, VALUE_MATE};
use crate::movegen::moves::{generate, perft, GenType};
use crate::search::alphabeta::{build_reductions, is_mated_root, SearchWorker};
use crate::search::time_management::{Limits, TimeManager};
use crate::search::transposition::TranspositionTable;
use crate::uci::protocol::{uci_move, uci_value};

/// State shared by every worker of one search.
pub struct SharedSearch {
    pub stop: Arc<AtomicBool>,
    pub ponder: Arc<AtomicBool>,
    pub stop_on_ponderhit: Arc<AtomicBool>,
    pub increase_depth: AtomicBool,
    pub limits: Limits,
    pub time: TimeManager,
    pub multi_pv: usize,
    pub reductions: Vec<i32>,
    pub node_counters: Vec<Arc<AtomicU64>>,
    pub best_move_change_counters: Vec<AtomicU64>,
}

impl SharedSearch {
    fn idle(threads: usize) -> Arc<SharedSearch> {
        Arc::new(SharedSearch {
            stop: Arc::new(AtomicBool::new(true)),
            ponder: Arc::new(AtomicBool::new(false)),
            stop_on_ponderhit: Arc::new(AtomicBool::new(false)),
            increase_depth: AtomicBool::new(true),
            limits: Limits::default(),
            time: TimeManager::infinite(),
            multi_pv: 1,
            reductions: build_reductions(threads),
            node_counters: (0..threads).map(|_| Arc::new(AtomicU64::new(0))).collect(),
            best_move_change_counters: (0..threads).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    pub fn nodes_searched(&self) -> u64 {
        self.node_counters
            .iter()
            .map(|n| n.load(Ordering::Relaxed))
            .sum()
    }
}

pub struct ThreadPool {
    workers: Vec<SearchWorker>,
    tt: Arc<TranspositionTable>,
    pub multi_pv: usize,
}

impl ThreadPool {
    pub fn new(threads: usize, tt_size_mb: usize) -> Self {
        let threads = threads.max(1);
        let tt = Arc::new(TranspositionTable::new(tt_size_mb));
        let shared = SharedSearch::idle(threads);

        let workers = (0..threads)
            .map(|id| SearchWorker::new(id, shared.clone(), tt.clone()))
            .collect();

        ThreadPool {
            workers,
            tt,
            multi_pv: 1,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Rebuilds the pool for a new Threads/Hash option pair.
    pub fn reconfigure(&mut self, threads: usize, tt_size_mb: usize) {
        let multi_pv = self.multi_pv;
        *self = ThreadPool::new(threads, tt_size_mb);
        self.multi_pv = multi_pv;
    }

    pub fn clear_hash(&self) {
        self.tt.clear();
    }

    /// `ucinewgame`: wipe the table and every worker's heuristics.
    pub fn clear(&mut self) {
        self.tt.clear();
        for w in &mut self.workers {
            w.clear();
        }
    }

    /// Runs a search to completion and emits `bestmove`. Blocks the calling
    /// thread; the UCI layer runs it on a dedicated thread so `stop` and
    /// `ponderhit` stay responsive through the shared flags.
    pub fn go(
        &mut self,
        pos: &Position,
        limits: Limits,
        stop: Arc<AtomicBool>,
        ponder: Arc<AtomicBool>,
        stop_on_ponderhit: Arc<AtomicBool>,
    ) -> u64 {
        if limits.perft > 0 {
            let nodes = perft_divide(&mut pos.clone(), limits.perft);
            println!("\nNodes searched: {}\n", nodes);
            return nodes;
        }

        let us = pos.side_to_move();
        let time = TimeManager::init(&limits, us, pos.game_ply());
        let threads = self.workers.len();

        let root_moves = generate(pos, GenType::Legal);
        if root_moves.is_empty() {
            let value = if is_mated_root(pos) {
                -VALUE_MATE
            } else {
                VALUE_DRAW
            };
            println!("info depth 0 score {}", uci_value(value));
            println!("bestmove (none)");
            return 0;
        }

        let infinite = limits.infinite;
        let shared = Arc::new(SharedSearch {
            stop,
            ponder,
            stop_on_ponderhit,
            increase_depth: AtomicBool::new(true),
            limits,
            time,
            multi_pv: self.multi_pv,
            reductions: build_reductions(threads),
            node_counters: (0..threads).map(|_| Arc::new(AtomicU64::new(0))).collect(),
            best_move_change_counters: (0..threads).map(|_| AtomicU64::new(0)).collect(),
        });

        self.tt.new_search();

        let root_move_list: Vec<Move> = root_moves.clone();
        for w in &mut self.workers {
            w.prepare(pos, &root_move_list, shared.clone(), self.tt.clone());
        }

        let (main, helpers) = self.workers.split_at_mut(1);
        std::thread::scope(|s| {
            for w in helpers.iter_mut() {
                s.spawn(move || w.iterative_deepening());
            }

            main[0].iterative_deepening();

            // A finished main thread may not answer yet: while pondering or
            // in an infinite search we wait for the GUI's stop/ponderhit.
            while !shared.stop.load(Ordering::SeqCst)
                && (shared.ponder.load(Ordering::SeqCst) || infinite)
            {
                std::thread::sleep(Duration::from_millis(1));
            }

            shared.stop.store(true, Ordering::SeqCst);
        });

        // The main thread's list is the answer.
        let main_worker = &mut self.workers[0];
        let best = main_worker.root_moves[0].clone();
        main_worker.best_previous_score = best.score;

        let mut line = format!("bestmove {}", uci_move(best.mv));
        if best.pv.len() > 1 {
            line.push_str(&format!(" ponder {}", uci_move(best.pv[1])));
        }
        println!("{}", line);

        shared.nodes_searched()
    }
}

/// Per-root-move subtree counts, then the sum; `go perft N`.
pub fn perft_divide(pos: &mut Position, depth: i32) -> u64 {
    let moves = generate(pos, GenType::Legal);
    let mut nodes = 0;

    for m in moves {
        let cnt = if depth <= 1 {
            1
        } else {
            pos.do_move(m);
            let cnt = perft(pos, depth - 1);
            pos.undo_move(m);
            cnt
        };
        nodes += cnt;
        println!("{}: {}", uci_move(m), cnt);
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn run_search(fen: &str, depth: i32) -> ThreadPool {
        let mut pool = ThreadPool::new(1, 4);
        let pos = Position::from_fen(fen).unwrap();
        let limits = Limits {
            depth,
            start_time: Instant::now(),
            ..Limits::default()
        };
        pool.go(
            &pos,
            limits,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        );
        pool
    }

    #[test]
    fn fixed_depth_search_finds_a_root_move() {
        let pool = run_search(Position::START_FEN, 2);
        let best = &pool.workers[0].root_moves[0];
        assert!(best.mv.is_ok());
        assert!(best.score > -VALUE_MATE);
        assert!(pool.workers[0].completed_depth >= 2);
    }

    #[test]
    fn search_prefers_capturing_a_hanging_queen() {
        // White rook on d1 can take the undefended queen on d10.
        let pool = run_search("3q5k/55/55/55/55/55/55/55/55/3R4K1 w - - - 0 1", 3);
        let best = &pool.workers[0].root_moves[0];
        assert_eq!(uci_move(best.mv), "d1d10");
    }

    #[test]
    fn multithreaded_search_completes() {
        let mut pool = ThreadPool::new(3, 4);
        let pos = Position::startpos();
        let limits = Limits {
            depth: 3,
            start_time: Instant::now(),
            ..Limits::default()
        };
        pool.go(
            &pos,
            limits,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(pool.workers[0].root_moves[0].mv.is_ok());
    }

    #[test]
    fn perft_divide_matches_plain_perft() {
        let mut pos = Position::startpos();
        let divided = perft_divide(&mut pos.clone(), 2);
        assert_eq!(divided, perft(&mut pos, 2));
    }
}
