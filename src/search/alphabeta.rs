//! Iterative-deepening alpha-beta search.
//!
//! Each worker owns its position clone, search stack and history tables;
//! the only cross-thread state is the stop/ponder flags and the node
//! counters. The main worker (id 0) additionally polls the clock and is the
//! one whose root move list answers the search.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::board::bitboard::Square;
use crate::board::position::{type_of, Move, MoveType, PieceType, Position, NO_PIECE};
use crate::eval::evaluate::{
    evaluate, mate_in, mated_in, piece_value_mg, Value, PAWN_VALUE_EG, PAWN_VALUE_MG,
    ROOK_VALUE_MG, VALUE_DRAW, VALUE_INFINITE, VALUE_KNOWN_WIN, VALUE_NONE, VALUE_ZERO,
};
use crate::search::history::{
    piece_id, stat_bonus, CaptureHistory, ContinuationHistory, CounterMoves, LowPlyHistory,
    MainHistory, MAX_LPH,
};
use crate::search::movepick::MovePicker;
use crate::search::thread::SharedSearch;
use crate::search::transposition::{
    value_from_tt, value_to_tt, TranspositionTable, TT_BOUND_EXACT, TT_BOUND_LOWER,
    TT_BOUND_UPPER,
};
use crate::uci::protocol::{uci_move, uci_value};

pub const MAX_PLY: i32 = 128;
pub const MAX_MOVES: usize = 256;

/// One root move with its running scores and principal variation.
#[derive(Debug, Clone)]
pub struct RootMove {
    pub mv: Move,
    pub score: Value,
    pub previous_score: Value,
    pub sel_depth: i32,
    pub best_move_count: i32,
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> Self {
        RootMove {
            mv,
            score: -VALUE_INFINITE,
            previous_score: -VALUE_INFINITE,
            sel_depth: 0,
            best_move_count: 0,
            pv: vec![mv],
        }
    }
}

fn sort_root_moves(moves: &mut [RootMove]) {
    moves.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.previous_score.cmp(&a.previous_score))
    });
}

/// Triangular principal-variation collector.
pub struct PvTable {
    table: Box<[[Move; MAX_PLY as usize]; MAX_PLY as usize]>,
    length: [usize; MAX_PLY as usize],
}

impl PvTable {
    pub fn new() -> Self {
        PvTable {
            table: Box::new([[Move::NONE; MAX_PLY as usize]; MAX_PLY as usize]),
            length: [0; MAX_PLY as usize],
        }
    }

    #[inline(always)]
    fn init_ply(&mut self, ply: usize) {
        self.length[ply] = 0;
        if ply + 1 < MAX_PLY as usize {
            self.length[ply + 1] = 0;
        }
    }

    fn update(&mut self, ply: usize, mv: Move) {
        self.table[ply][0] = mv;
        let child_len = if ply + 1 < MAX_PLY as usize {
            self.length[ply + 1].min(MAX_PLY as usize - ply - 2)
        } else {
            0
        };
        for i in 0..child_len {
            self.table[ply][i + 1] = self.table[ply + 1][i];
        }
        self.length[ply] = 1 + child_len;
    }

    fn line(&self, ply: usize) -> &[Move] {
        &self.table[ply][..self.length[ply]]
    }
}

impl Default for PvTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One frame of the search stack. The stack is oversized by a seven-frame
/// sentinel head so continuation-history lookups at -6 stay in bounds near
/// the root.
#[derive(Clone)]
struct Frame {
    ply: i32,
    current_move: Move,
    killers: [Move; 2],
    static_eval: Value,
    stat_score: i32,
    move_count: i32,
    in_check: bool,
    cont_hist_slot: usize,
}

impl Frame {
    fn new() -> Self {
        Frame {
            ply: 0,
            current_move: Move::NONE,
            killers: [Move::NONE; 2],
            static_eval: VALUE_ZERO,
            stat_score: 0,
            move_count: 0,
            in_check: false,
            cont_hist_slot: ContinuationHistory::sentinel(),
        }
    }
}

const STACK_OFFSET: usize = 7;

#[inline(always)]
fn futility_move_count(improving: bool, depth: i32) -> i32 {
    (3 + depth * depth) / (2 - improving as i32)
}

pub struct SearchWorker {
    pub id: usize,
    pub pos: Position,
    pub root_moves: Vec<RootMove>,
    pub completed_depth: i32,
    pub best_previous_score: Value,
    pub previous_time_reduction: f64,

    shared: Arc<SharedSearch>,
    tt: Arc<TranspositionTable>,

    main_history: MainHistory,
    low_ply_history: LowPlyHistory,
    capture_history: CaptureHistory,
    counter_moves: CounterMoves,
    cont_history: ContinuationHistory,

    stack: Vec<Frame>,
    pv_table: PvTable,

    root_depth: i32,
    sel_depth: i32,
    pv_idx: usize,
    pv_last: usize,
    calls_cnt: i32,
    iter_values: [Value; 4],
}

impl SearchWorker {
    pub fn new(id: usize, shared: Arc<SharedSearch>, tt: Arc<TranspositionTable>) -> Self {
        SearchWorker {
            id,
            pos: Position::startpos(),
            root_moves: Vec::new(),
            completed_depth: 0,
            best_previous_score: VALUE_INFINITE,
            previous_time_reduction: 1.0,
            shared,
            tt,
            main_history: MainHistory::new(),
            low_ply_history: LowPlyHistory::new(),
            capture_history: CaptureHistory::new(),
            counter_moves: CounterMoves::new(),
            cont_history: ContinuationHistory::new(),
            stack: Vec::new(),
            pv_table: PvTable::new(),
            root_depth: 0,
            sel_depth: 0,
            pv_idx: 0,
            pv_last: 0,
            calls_cnt: 0,
            iter_values: [VALUE_ZERO; 4],
        }
    }

    /// Clears the heuristic state `ucinewgame` is supposed to reset.
    pub fn clear(&mut self) {
        self.main_history.clear();
        self.low_ply_history.clear();
        self.capture_history.clear();
        self.counter_moves.clear();
        self.cont_history.clear();
        self.best_previous_score = VALUE_INFINITE;
        self.previous_time_reduction = 1.0;
    }

    /// Installs the root position and shared state for one `go`.
    pub fn prepare(
        &mut self,
        pos: &Position,
        root_moves: &[Move],
        shared: Arc<SharedSearch>,
        tt: Arc<TranspositionTable>,
    ) {
        self.pos = pos.clone();
        self.root_moves = root_moves.iter().map(|&m| RootMove::new(m)).collect();
        self.shared = shared;
        self.tt = tt;
        self.root_depth = 0;
        self.completed_depth = 0;
        self.sel_depth = 0;
        self.pv_idx = 0;
        self.pv_last = 0;
        self.calls_cnt = 0;
    }

    #[inline(always)]
    fn nodes(&self) -> u64 {
        self.shared.node_counters[self.id].load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn bump_nodes(&self) {
        self.shared.node_counters[self.id].fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    /// Small random component on draw scores to avoid threefold blindness.
    #[inline(always)]
    fn value_draw(&self) -> Value {
        VALUE_DRAW + 2 * (self.nodes() & 1) as Value - 1
    }

    fn reduction(&self, improving: bool, depth: i32, move_count: i32) -> i32 {
        let d = (depth as usize).min(MAX_MOVES - 1);
        let mc = (move_count as usize).min(MAX_MOVES - 1);
        let r = self.shared.reductions[d] * self.shared.reductions[mc];
        (r + 570) / 1024 + (!improving && r > 1018) as i32
    }

    fn best_move_count(&self, mv: Move) -> i32 {
        self.root_moves
            .iter()
            .find(|rm| rm.mv == mv)
            .map_or(0, |rm| rm.best_move_count)
    }

    /// Periodic clock/node-budget poll; main worker only.
    fn check_time(&mut self) {
        self.calls_cnt -= 1;
        if self.calls_cnt > 0 {
            return;
        }

        self.calls_cnt = if self.shared.limits.nodes > 0 {
            (self.shared.limits.nodes / 1024).min(1024) as i32
        } else {
            1024
        };

        if self.shared.ponder.load(Ordering::Relaxed) {
            return;
        }

        let elapsed = self.shared.time.elapsed();
        let limits = &self.shared.limits;

        if (self.shared.time.is_managed()
            && (elapsed + 10 > self.shared.time.maximum()
                || self.shared.stop_on_ponderhit.load(Ordering::Relaxed)))
            || (limits.movetime > 0 && elapsed >= limits.movetime)
            || (limits.nodes > 0 && self.shared.nodes_searched() >= limits.nodes)
        {
            self.shared.stop.store(true, Ordering::SeqCst);
        }
    }

    /// The iterative-deepening driver; one call per `go` per worker.
    pub fn iterative_deepening(&mut self) {
        self.stack = vec![Frame::new(); MAX_PLY as usize + 10];
        self.pv_table = PvTable::new();

        let main_thread = self.id == 0;
        let mut last_best_move = Move::NONE;
        let mut last_best_move_depth = 0;
        let mut time_reduction = 1.0;
        let mut tot_best_move_changes = 0.0;
        let mut iter_idx = 0;
        let mut search_again_counter = 0;
        let mut best_value = -VALUE_INFINITE;

        if main_thread {
            let seed = if self.best_previous_score == VALUE_INFINITE {
                VALUE_ZERO
            } else {
                self.best_previous_score
            };
            self.iter_values = [seed; 4];
        }

        self.low_ply_history.age();

        let multi_pv = self.shared.multi_pv.min(self.root_moves.len());

        loop {
            self.root_depth += 1;
            if self.root_depth >= MAX_PLY
                || self.stopped()
                || (self.shared.limits.depth > 0
                    && main_thread
                    && self.root_depth > self.shared.limits.depth)
            {
                break;
            }

            if main_thread {
                tot_best_move_changes /= 2.0;
            }

            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }
            self.pv_last = self.root_moves.len();

            if !self.shared.increase_depth.load(Ordering::Relaxed) {
                search_again_counter += 1;
            }

            for pv_idx in 0..multi_pv {
                if self.stopped() {
                    break;
                }
                self.pv_idx = pv_idx;
                self.sel_depth = 0;

                let mut delta = VALUE_INFINITE;
                let mut alpha = -VALUE_INFINITE;
                let mut beta = VALUE_INFINITE;

                if self.root_depth >= 4 {
                    let prev = self.root_moves[pv_idx].previous_score;
                    delta = 19;
                    alpha = (prev - delta).max(-VALUE_INFINITE);
                    beta = (prev + delta).min(VALUE_INFINITE);
                }

                let mut failed_high_cnt = 0;
                loop {
                    let adjusted_depth =
                        (self.root_depth - failed_high_cnt - search_again_counter).max(1);
                    best_value =
                        self.search(true, STACK_OFFSET, alpha, beta, adjusted_depth, false);

                    // Keep the new best in front; a stable sort preserves
                    // the order of everything set to -infinite.
                    let pv_last = self.pv_last;
                    sort_root_moves(&mut self.root_moves[pv_idx..pv_last]);

                    if self.stopped() {
                        break;
                    }

                    if main_thread
                        && multi_pv == 1
                        && (best_value <= alpha || best_value >= beta)
                        && self.shared.time.elapsed() > 3000
                    {
                        self.print_pv(self.root_depth, alpha, beta);
                    }

                    if best_value <= alpha {
                        beta = (alpha + beta) / 2;
                        alpha = (best_value - delta).max(-VALUE_INFINITE);
                        failed_high_cnt = 0;
                        if main_thread {
                            self.shared
                                .stop_on_ponderhit
                                .store(false, Ordering::SeqCst);
                        }
                    } else if best_value >= beta {
                        beta = (best_value + delta).min(VALUE_INFINITE);
                        failed_high_cnt += 1;
                    } else {
                        self.root_moves[pv_idx].best_move_count += 1;
                        break;
                    }

                    delta += delta / 4 + 5;
                }

                sort_root_moves(&mut self.root_moves[..=pv_idx]);

                if main_thread
                    && (self.stopped()
                        || pv_idx + 1 == multi_pv
                        || self.shared.time.elapsed() > 3000)
                {
                    self.print_pv(self.root_depth, alpha, beta);
                }
            }

            if !self.stopped() {
                self.completed_depth = self.root_depth;
            }

            if self.root_moves[0].mv != last_best_move {
                last_best_move = self.root_moves[0].mv;
                last_best_move_depth = self.root_depth;
            }

            if !main_thread {
                continue;
            }

            // Soft time control: scale the optimum by how the eval is
            // falling, how stable the best move is, and how often it
            // changed across the worker pool.
            if self.shared.time.is_managed()
                && !self.stopped()
                && !self.shared.stop_on_ponderhit.load(Ordering::Relaxed)
            {
                let falling_eval = ((296
                    + 6 * (self.best_previous_score - best_value)
                    + 6 * (self.iter_values[iter_idx] - best_value))
                    as f64
                    / 725.0)
                    .clamp(0.5, 1.5);

                time_reduction = if last_best_move_depth + 10 < self.completed_depth {
                    1.92
                } else {
                    0.95
                };
                let reduction =
                    (1.47 + self.previous_time_reduction) / (2.22 * time_reduction);

                for counter in self.shared.best_move_change_counters.iter() {
                    tot_best_move_changes += counter.swap(0, Ordering::Relaxed) as f64;
                }
                let best_move_instability = 1.0
                    + tot_best_move_changes / self.shared.best_move_change_counters.len() as f64;

                let total_time = if self.root_moves.len() == 1 {
                    0.0
                } else {
                    self.shared.time.optimum() as f64
                        * falling_eval
                        * reduction
                        * best_move_instability
                };

                if self.shared.time.elapsed() as f64 > total_time {
                    if self.shared.ponder.load(Ordering::Relaxed) {
                        self.shared.stop_on_ponderhit.store(true, Ordering::SeqCst);
                    } else {
                        self.shared.stop.store(true, Ordering::SeqCst);
                    }
                } else if !self.shared.ponder.load(Ordering::Relaxed)
                    && self.shared.time.elapsed() as f64 > total_time * 0.56
                {
                    self.shared.increase_depth.store(false, Ordering::SeqCst);
                } else {
                    self.shared.increase_depth.store(true, Ordering::SeqCst);
                }
            }

            self.iter_values[iter_idx] = best_value;
            iter_idx = (iter_idx + 1) & 3;
        }

        if main_thread {
            self.previous_time_reduction = time_reduction;
        }
    }

    /// The alpha-beta node, shared between PV and non-PV searches.
    #[allow(clippy::too_many_arguments)]
    fn search(
        &mut self,
        is_pv: bool,
        ss: usize,
        mut alpha: Value,
        mut beta: Value,
        depth: i32,
        cut_node: bool,
    ) -> Value {
        // Leaf: the evaluation stands in for a quiescence layer.
        if depth <= 0 {
            return evaluate(&self.pos);
        }

        let root_node = is_pv && self.stack[ss].ply == 0;
        let ply = self.stack[ss].ply;
        let in_check = self.pos.checkers() != 0;
        self.stack[ss].in_check = in_check;
        let prior_capture = self.pos.captured_piece() != NO_PIECE;
        let us = self.pos.side_to_move();

        let mut move_count = 0;
        let mut capture_count = 0;
        let mut quiet_count = 0;
        self.stack[ss].move_count = 0;
        let mut best_value = -VALUE_INFINITE;
        let mut best_move = Move::NONE;
        let mut captures_searched = [Move::NONE; 32];
        let mut quiets_searched = [Move::NONE; 64];

        if self.id == 0 {
            self.check_time();
        }

        if is_pv && self.sel_depth < ply + 1 {
            self.sel_depth = ply + 1;
        }

        if !root_node {
            // Aborted search, draws and the ply ceiling.
            if self.stopped() || self.pos.is_draw(ply) || ply >= MAX_PLY {
                return if ply >= MAX_PLY && !in_check {
                    evaluate(&self.pos)
                } else {
                    self.value_draw()
                };
            }

            // Mate distance pruning.
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        if is_pv {
            self.pv_table.init_ply(ply as usize);
        }

        self.stack[ss + 1].ply = ply + 1;
        self.stack[ss + 2].killers = [Move::NONE; 2];
        let prev_sq = self.stack[ss - 1].current_move.to();

        // statScore is shared between grandchildren; only the first one
        // starts from zero.
        if root_node {
            self.stack[ss + 4].stat_score = 0;
        } else {
            self.stack[ss + 2].stat_score = 0;
        }

        // Transposition lookup: cutoffs outside the PV, a hash move always.
        let mut tt_move = Move::NONE;
        if let Some(tte) = self.tt.probe(self.pos.key()) {
            if tte.mv != Move::NONE && self.pos.pseudo_legal(tte.mv) {
                tt_move = tte.mv;
            }
            if !is_pv && !root_node && tte.depth as i32 >= depth {
                let tt_value = value_from_tt(tte.score, ply);
                let cutoff = match tte.bound {
                    TT_BOUND_EXACT => true,
                    TT_BOUND_LOWER => tt_value >= beta,
                    TT_BOUND_UPPER => tt_value <= alpha,
                    _ => false,
                };
                if cutoff {
                    return tt_value;
                }
            }
        }

        // Static evaluation; skipped (with early pruning) while in check.
        let improving;
        if in_check {
            self.stack[ss].static_eval = VALUE_NONE;
            improving = false;
        } else {
            let bonus = -self.stack[ss - 1].stat_score / 512;
            let eval = evaluate(&self.pos) + bonus;
            self.stack[ss].static_eval = eval;

            improving = if self.stack[ss - 2].static_eval == VALUE_NONE {
                self.stack[ss].static_eval > self.stack[ss - 4].static_eval
                    || self.stack[ss - 4].static_eval == VALUE_NONE
            } else {
                self.stack[ss].static_eval > self.stack[ss - 2].static_eval
            };

            // Futility: a quiet position comfortably above beta.
            if !is_pv
                && depth < 6
                && eval - 227 * (depth - improving as i32) >= beta
                && eval < VALUE_KNOWN_WIN
            {
                return eval;
            }
        }

        let counter_move = self
            .counter_moves
            .get(piece_id(self.pos.piece_on(prev_sq)), prev_sq);
        let killers = self.stack[ss].killers;
        let cont_slots = [
            self.stack[ss - 1].cont_hist_slot,
            self.stack[ss - 2].cont_hist_slot,
            self.stack[ss - 4].cont_hist_slot,
            self.stack[ss - 6].cont_hist_slot,
        ];

        let mut picker = MovePicker::new(
            &self.pos,
            tt_move,
            &self.main_history,
            &self.low_ply_history,
            &self.capture_history,
            &self.cont_history,
            cont_slots,
            counter_move,
            killers,
            ply,
        );

        let mut move_count_pruning = false;

        while let Some(m) = picker.next(move_count_pruning) {
            debug_assert!(m.is_ok());

            // At root only the moves of the current MultiPV window count.
            if root_node
                && !self.root_moves[self.pv_idx..self.pv_last]
                    .iter()
                    .any(|rm| rm.mv == m)
            {
                continue;
            }

            move_count += 1;
            self.stack[ss].move_count = move_count;

            if root_node && self.id == 0 && self.shared.time.elapsed() > 3000 {
                println!(
                    "info depth {} currmove {} currmovenumber {}",
                    depth,
                    uci_move(m),
                    move_count + self.pv_idx as i32
                );
            }

            let capture_or_promotion = self.pos.capture_or_promotion(m);
            let moved_piece = self.pos.moved_piece(m);
            let moved_id = piece_id(moved_piece);
            let gives_check = self.pos.gives_check(m);
            let mut new_depth = depth - 1;

            // Shallow-depth pruning, once one real score is on the board.
            if !root_node
                && self.pos.non_pawn_material(us) > 0
                && best_value > mated_in(MAX_PLY)
            {
                move_count_pruning = move_count >= futility_move_count(improving, depth);

                let lmr_depth =
                    (new_depth - self.reduction(improving, depth, move_count)).max(0);

                if !capture_or_promotion && !gives_check {
                    // Countermove-history pruning.
                    let threshold_depth = 4
                        + (self.stack[ss - 1].stat_score > 0
                            || self.stack[ss - 1].move_count == 1)
                            as i32;
                    if lmr_depth < threshold_depth
                        && self.cont_history.get(cont_slots[0], moved_id, m.to()) < 0
                        && self.cont_history.get(cont_slots[1], moved_id, m.to()) < 0
                    {
                        continue;
                    }

                    // Futility at the parent.
                    if lmr_depth < 6
                        && !in_check
                        && self.stack[ss].static_eval + 284 + 188 * lmr_depth <= alpha
                        && self.cont_history.get(cont_slots[0], moved_id, m.to())
                            + self.cont_history.get(cont_slots[1], moved_id, m.to())
                            + self.cont_history.get(cont_slots[2], moved_id, m.to())
                            + self.cont_history.get(cont_slots[3], moved_id, m.to()) / 2
                            < 28388
                    {
                        continue;
                    }

                    // Losing quiets by SEE.
                    if !self
                        .pos
                        .see_ge(m, -(29 - lmr_depth.min(17)) * lmr_depth * lmr_depth)
                    {
                        continue;
                    }
                } else {
                    let captured = self.pos.captured_by(m);

                    if !gives_check
                        && lmr_depth < 1
                        && self.capture_history.get(moved_id, m.to(), captured) < 0
                    {
                        continue;
                    }

                    // Futility for captures.
                    if !gives_check
                        && lmr_depth < 6
                        && !(is_pv && best_value.abs() < 2)
                        && piece_value_mg(type_of(moved_piece)) >= piece_value_mg(captured)
                        && !in_check
                        && self.stack[ss].static_eval
                            + 267
                            + 391 * lmr_depth
                            + piece_value_mg(captured)
                            <= alpha
                    {
                        continue;
                    }

                    // Losing captures by SEE.
                    if !self.pos.see_ge(m, -202 * depth) {
                        continue;
                    }
                }
            }

            // Extensions, capped by construction at +2.
            let mut extension = 0;
            if gives_check
                && (self.pos.is_discovery_check_on_king(!us, m) || self.pos.see_ge_zero(m))
            {
                extension = 1;
            } else if m == killers[0]
                && self.pos.advanced_pawn_push(m)
                && self.pos.pawn_passed(us, m.to())
            {
                extension = 1;
            } else if self.pos.captured_value_eg() > PAWN_VALUE_EG
                && self.pos.non_pawn_material_total() <= 2 * ROOK_VALUE_MG
            {
                extension = 1;
            }

            if m.move_type() == MoveType::Castling {
                extension = 1;
            }

            // Near the fifty-move horizon an irreversible move resets the
            // count and deserves a longer look.
            if self.pos.rule50_count() > 80
                && (capture_or_promotion || type_of(moved_piece) == PieceType::Pawn)
            {
                extension = 2;
            }

            new_depth += extension;

            // The picker yields pseudo-legal moves; root moves are already
            // legal.
            if !root_node && !self.pos.legal(m) {
                move_count -= 1;
                self.stack[ss].move_count = move_count;
                continue;
            }

            self.stack[ss].current_move = m;
            self.stack[ss].cont_hist_slot = ContinuationHistory::slot(
                in_check,
                capture_or_promotion,
                moved_id,
                m.to(),
            );

            self.pos.do_move(m);
            self.bump_nodes();

            let mut value;
            let do_full_depth_search;
            let mut did_lmr = false;

            // Late move reduction: search reduced with a null window, and
            // only re-search at full depth on promise.
            if depth >= 3
                && move_count > 1 + 2 * root_node as i32
                && (!root_node || self.best_move_count(m) == 0)
                && (!capture_or_promotion
                    || move_count_pruning
                    || self.stack[ss].static_eval + self.pos.captured_value_eg() <= alpha
                    || cut_node)
            {
                let mut r = self.reduction(improving, depth, move_count);

                if move_count_pruning {
                    r += 1;
                }

                if self.stack[ss - 1].move_count > 13 {
                    r -= 1;
                }

                if !capture_or_promotion {
                    if cut_node {
                        r += 2;
                    } else if m.move_type() == MoveType::Normal
                        && !self.pos.see_ge_zero(m.reverse())
                    {
                        // The move escapes a capture.
                        r -= 2 - (type_of(moved_piece) == PieceType::Pawn) as i32;
                    }

                    self.stack[ss].stat_score = self.main_history.get(us as usize, m.from_to())
                        + self.cont_history.get(cont_slots[0], moved_id, m.to())
                        + self.cont_history.get(cont_slots[1], moved_id, m.to())
                        + self.cont_history.get(cont_slots[2], moved_id, m.to())
                        - 4826;

                    if self.stack[ss].stat_score >= -100
                        && self.stack[ss - 1].stat_score < -112
                    {
                        r -= 1;
                    } else if self.stack[ss - 1].stat_score >= -125
                        && self.stack[ss].stat_score < -138
                    {
                        r += 1;
                    }

                    r -= self.stack[ss].stat_score / 14615;
                } else {
                    if depth < 8 && move_count > 2 {
                        r += 1;
                    }

                    if !gives_check
                        && self.stack[ss].static_eval
                            + self.pos.captured_value_eg()
                            + 211 * depth
                            <= alpha
                    {
                        r += 1;
                    }
                }

                let d = (new_depth - r).clamp(1, new_depth);
                value = -self.search(false, ss + 1, -(alpha + 1), -alpha, d, true);

                do_full_depth_search = value > alpha && d != new_depth;
                did_lmr = true;
            } else {
                value = -VALUE_INFINITE;
                do_full_depth_search = !is_pv || move_count > 1;
            }

            if do_full_depth_search {
                value = -self.search(false, ss + 1, -(alpha + 1), -alpha, new_depth, !cut_node);

                if did_lmr && !capture_or_promotion {
                    let mut bonus = if value > alpha {
                        stat_bonus(new_depth)
                    } else {
                        -stat_bonus(new_depth)
                    };
                    if m == killers[0] {
                        bonus += bonus / 4;
                    }
                    self.update_continuation_histories(ss, moved_id, m.to(), bonus);
                }
            }

            // Full PV window for the first move and for moves that raise
            // alpha.
            if is_pv && (move_count == 1 || (value > alpha && (root_node || value < beta))) {
                value = -self.search(true, ss + 1, -beta, -alpha, new_depth, false);
            }

            self.pos.undo_move(m);

            debug_assert!(value > -VALUE_INFINITE && value < VALUE_INFINITE);

            // A stopped search leaves partial results; discard them.
            if self.stopped() {
                return VALUE_ZERO;
            }

            if root_node {
                let pv_line: Vec<Move> = std::iter::once(m)
                    .chain(self.pv_table.line(1).iter().copied())
                    .collect();
                let sel_depth = self.sel_depth;
                let changed = move_count > 1;
                let rm = self
                    .root_moves
                    .iter_mut()
                    .find(|rm| rm.mv == m)
                    .expect("root move list contains every searched root move");

                if move_count == 1 || value > alpha {
                    rm.score = value;
                    rm.sel_depth = sel_depth;
                    rm.pv = pv_line;
                    if changed {
                        self.shared.best_move_change_counters[self.id]
                            .fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    // Preserve sort stability for everything but the PV.
                    rm.score = -VALUE_INFINITE;
                }
            }

            if value > best_value {
                best_value = value;

                if value > alpha {
                    best_move = m;

                    if is_pv && !root_node {
                        self.pv_table.update(ply as usize, m);
                    }

                    if is_pv && value < beta {
                        alpha = value;
                    } else {
                        self.stack[ss].stat_score = 0;
                        break;
                    }
                }
            }

            if m != best_move {
                if capture_or_promotion && capture_count < 32 {
                    captures_searched[capture_count] = m;
                    capture_count += 1;
                } else if !capture_or_promotion && quiet_count < 64 {
                    quiets_searched[quiet_count] = m;
                    quiet_count += 1;
                }
            }
        }

        // No legal move searched: mate, the forced-king-capture mate, or
        // stalemate.
        if move_count == 0 {
            best_value = if in_check {
                mated_in(ply)
            } else if self
                .pos
                .attackers_to_sq(self.pos.king_square(!us))
                & self.pos.pieces_c(us)
                != 0
            {
                mated_in(ply)
            } else {
                VALUE_DRAW
            };
        } else if best_move != Move::NONE {
            self.update_all_stats(
                ss,
                best_move,
                best_value,
                beta,
                prev_sq,
                &quiets_searched,
                quiet_count,
                &captures_searched,
                capture_count,
                depth,
            );
        } else if (depth >= 3 || is_pv) && !prior_capture {
            // The prior countermove caused this fail low.
            let bonus = stat_bonus(depth);
            self.update_continuation_histories(
                ss - 1,
                piece_id(self.pos.piece_on(prev_sq)),
                prev_sq,
                bonus,
            );
        }

        if !self.stopped() {
            let bound = if best_value >= beta {
                TT_BOUND_LOWER
            } else if is_pv && best_move != Move::NONE {
                TT_BOUND_EXACT
            } else {
                TT_BOUND_UPPER
            };
            self.tt.store(
                self.pos.key(),
                best_move,
                value_to_tt(best_value, ply),
                self.stack[ss].static_eval,
                depth.clamp(0, 127) as u8,
                bound,
            );
        }

        debug_assert!(best_value > -VALUE_INFINITE && best_value < VALUE_INFINITE);

        best_value
    }

    /// Updates all move-ordering statistics once a best move is known.
    #[allow(clippy::too_many_arguments)]
    fn update_all_stats(
        &mut self,
        ss: usize,
        best_move: Move,
        best_value: Value,
        beta: Value,
        prev_sq: Square,
        quiets: &[Move; 64],
        quiet_count: usize,
        captures: &[Move; 32],
        capture_count: usize,
        depth: i32,
    ) {
        let us = self.pos.side_to_move() as usize;
        let moved_id = piece_id(self.pos.moved_piece(best_move));
        let captured = self.pos.captured_by(best_move);

        let bonus1 = stat_bonus(depth + 1);
        let bonus2 = if best_value > beta + PAWN_VALUE_MG {
            bonus1
        } else {
            stat_bonus(depth)
        };

        if !self.pos.capture_or_promotion(best_move) {
            self.update_quiet_stats(ss, best_move, bonus2, depth);

            for &quiet in quiets.iter().take(quiet_count) {
                self.main_history.update(us, quiet.from_to(), -bonus2);
                self.update_continuation_histories(
                    ss,
                    piece_id(self.pos.moved_piece(quiet)),
                    quiet.to(),
                    -bonus2,
                );
            }
        } else {
            self.capture_history
                .update(moved_id, best_move.to(), captured, bonus1);
        }

        // Extra penalty for the refuted move of the previous ply.
        if (self.stack[ss - 1].move_count == 1
            || self.stack[ss - 1].current_move == self.stack[ss - 1].killers[0])
            && self.pos.captured_piece() == NO_PIECE
        {
            self.update_continuation_histories(
                ss - 1,
                piece_id(self.pos.piece_on(prev_sq)),
                prev_sq,
                -bonus1,
            );
        }

        for &capture in captures.iter().take(capture_count) {
            self.capture_history.update(
                piece_id(self.pos.moved_piece(capture)),
                capture.to(),
                self.pos.captured_by(capture),
                -bonus1,
            );
        }
    }

    fn update_quiet_stats(&mut self, ss: usize, mv: Move, bonus: i32, depth: i32) {
        if self.stack[ss].killers[0] != mv {
            self.stack[ss].killers[1] = self.stack[ss].killers[0];
            self.stack[ss].killers[0] = mv;
        }

        let us = self.pos.side_to_move() as usize;
        let moved_id = piece_id(self.pos.moved_piece(mv));
        self.main_history.update(us, mv.from_to(), bonus);
        self.update_continuation_histories(ss, moved_id, mv.to(), bonus);

        if type_of(self.pos.moved_piece(mv)) != PieceType::Pawn {
            self.main_history
                .update(us, mv.reverse().from_to(), -bonus);
        }

        if self.stack[ss - 1].current_move.is_ok() {
            let prev_sq = self.stack[ss - 1].current_move.to();
            self.counter_moves
                .set(piece_id(self.pos.piece_on(prev_sq)), prev_sq, mv);
        }

        let ply = self.stack[ss].ply;
        if depth > 11 && (ply as usize) < MAX_LPH {
            self.low_ply_history
                .update(ply as usize, mv.from_to(), stat_bonus(depth - 6));
        }
    }

    /// Feeds the move-pair tables at plies -1, -2, -4 and -6.
    fn update_continuation_histories(&mut self, ss: usize, piece: usize, to: Square, bonus: i32) {
        for i in [1usize, 2, 4, 6] {
            if self.stack[ss].in_check && i > 2 {
                break;
            }
            if self.stack[ss - i].current_move.is_ok() {
                let slot = self.stack[ss - i].cont_hist_slot;
                self.cont_history.update(slot, piece, to, bonus);
            }
        }
    }

    /// One `info` line per MultiPV entry, UCI formatted.
    pub fn print_pv(&self, depth: i32, alpha: Value, beta: Value) {
        let elapsed = self.shared.time.elapsed() + 1;
        let nodes = self.shared.nodes_searched();
        let multi_pv = self.shared.multi_pv.min(self.root_moves.len());

        for i in 0..multi_pv {
            let rm = &self.root_moves[i];
            let updated = rm.score != -VALUE_INFINITE;

            if depth == 1 && !updated {
                continue;
            }

            let d = if updated { depth } else { depth - 1 };
            let v = if updated { rm.score } else { rm.previous_score };

            let mut line = format!(
                "info depth {} seldepth {} multipv {} score {}",
                d,
                rm.sel_depth,
                i + 1,
                uci_value(v)
            );

            if i == self.pv_idx {
                if v >= beta {
                    line.push_str(" lowerbound");
                } else if v <= alpha {
                    line.push_str(" upperbound");
                }
            }

            line.push_str(&format!(
                " nodes {} nps {} hashfull {} time {} pv",
                nodes,
                nodes * 1000 / elapsed as u64,
                self.tt.hashfull(),
                elapsed
            ));

            for m in &rm.pv {
                line.push(' ');
                line.push_str(&uci_move(*m));
            }

            println!("{}", line);
        }
    }
}

/// Root check used when the move list is empty: checkmate, the losing
/// forced-king-capture position, or stalemate.
pub fn is_mated_root(pos: &Position) -> bool {
    let us = pos.side_to_move();
    pos.checkers() != 0
        || pos.attackers_to_sq(pos.king_square(!us)) & pos.pieces_c(us) != 0
}

/// Reductions table: `(24.8 + ln(threads)) * ln(i)`.
pub fn build_reductions(threads: usize) -> Vec<i32> {
    let mut reductions = vec![0i32; MAX_MOVES];
    for (i, r) in reductions.iter_mut().enumerate().skip(1) {
        *r = ((24.8 + (threads as f64).ln()) * (i as f64).ln()) as i32;
    }
    reductions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::moves::{generate, perft, GenType};

    #[test]
    fn reductions_grow_with_move_number() {
        let r = build_reductions(1);
        assert_eq!(r[0], 0);
        assert_eq!(r[1], 0);
        assert!(r[10] > r[2]);
        assert!(r[255] > r[64]);
        // More threads search wider.
        let r8 = build_reductions(8);
        assert!(r8[100] > r[100]);
    }

    #[test]
    fn futility_move_count_improving_doubles_budget() {
        assert_eq!(futility_move_count(false, 4), (3 + 16) / 2);
        assert_eq!(futility_move_count(true, 4), 3 + 16);
    }

    #[test]
    fn root_move_sort_is_stable_for_unsearched_moves() {
        let mut moves: Vec<RootMove> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut rm = RootMove::new(Move::new(i as u8, 50 + i as u8));
                rm.score = -VALUE_INFINITE;
                rm.previous_score = -VALUE_INFINITE;
                rm
            })
            .collect();
        moves[2].score = 100;
        let third = moves[3].mv;
        sort_root_moves(&mut moves);
        assert_eq!(moves[0].score, 100);
        // Unsearched moves keep their relative order.
        assert_eq!(moves[3].mv, third);
    }

    #[test]
    fn pv_table_collects_child_lines() {
        let mut pv = PvTable::new();
        pv.init_ply(1);
        pv.update(1, Move::new(10, 20));
        pv.init_ply(0);
        // Re-update after the child line exists.
        pv.update(1, Move::new(10, 20));
        pv.update(0, Move::new(1, 2));
        let line = pv.line(0);
        assert_eq!(line.len(), 2);
        assert_eq!(line[0], Move::new(1, 2));
        assert_eq!(line[1], Move::new(10, 20));
    }

    #[test]
    fn perft_recursion_law_holds_on_a_sparse_position() {
        let mut pos =
            Position::from_fen("5q4/55/55/55/55/55/55/5k4/55/4K5 w - Ss - 0 1").unwrap();
        let moves = generate(&pos, GenType::Legal);
        let total: u64 = moves
            .iter()
            .map(|&m| {
                pos.do_move(m);
                let n = perft(&mut pos, 1);
                pos.undo_move(m);
                n
            })
            .sum();
        assert_eq!(total, perft(&mut pos, 2));
    }
}
