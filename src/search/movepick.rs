//! Move ordering cursor. Scores the pseudo-legal moves once up front and
//! yields them by selection, leaving legality to the caller.

use crate::board::position::{type_of, Move, Position};
use crate::eval::evaluate::piece_value_mg;
use crate::movegen::moves::{generate, GenType};
use crate::search::history::{
    piece_id, CaptureHistory, ContinuationHistory, LowPlyHistory, MainHistory, MAX_LPH,
};

const TT_SCORE: i32 = 10_000_000;
const GOOD_CAPTURE_BASE: i32 = 2_000_000;
const PROMOTION_SCORE: i32 = 1_900_000;
const KILLER1_SCORE: i32 = 1_700_000;
const KILLER2_SCORE: i32 = 1_650_000;
const COUNTER_SCORE: i32 = 1_600_000;
const BAD_CAPTURE_BASE: i32 = -2_000_000;

struct ScoredMove {
    mv: Move,
    score: i32,
    quiet: bool,
}

pub struct MovePicker {
    moves: Vec<ScoredMove>,
    current: usize,
}

impl MovePicker {
    /// Scores evasions when in check, all pseudo-legal moves otherwise.
    /// History tables are read once here; no borrow outlives construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pos: &Position,
        tt_move: Move,
        main_history: &MainHistory,
        low_ply_history: &LowPlyHistory,
        capture_history: &CaptureHistory,
        cont_history: &ContinuationHistory,
        cont_slots: [usize; 4],
        counter_move: Move,
        killers: [Move; 2],
        ply: i32,
    ) -> Self {
        let gen = if pos.checkers() != 0 {
            GenType::Evasions
        } else {
            GenType::NonEvasions
        };

        let list = generate(pos, gen);
        let mut moves = Vec::with_capacity(list.len());
        let us = pos.side_to_move() as usize;

        for mv in list {
            let capture_or_promo = pos.capture_or_promotion(mv);
            let score = if mv == tt_move {
                TT_SCORE
            } else if pos.is_capture(mv) {
                let captured = pos.captured_by(mv);
                let mover = piece_id(pos.moved_piece(mv));
                if pos.see_ge_zero(mv) {
                    GOOD_CAPTURE_BASE
                        + 16 * piece_value_mg(captured)
                        - piece_value_mg(type_of(pos.moved_piece(mv)))
                        + capture_history.get(mover, mv.to(), captured)
                } else {
                    BAD_CAPTURE_BASE + piece_value_mg(captured)
                }
            } else if mv.move_type() == crate::board::position::MoveType::Promotion {
                PROMOTION_SCORE + piece_value_mg(mv.promotion_type())
            } else if mv == killers[0] {
                KILLER1_SCORE
            } else if mv == killers[1] {
                KILLER2_SCORE
            } else if mv == counter_move {
                COUNTER_SCORE
            } else {
                Self::quiet_score(
                    pos,
                    mv,
                    us,
                    main_history,
                    low_ply_history,
                    cont_history,
                    cont_slots,
                    ply,
                )
            };

            moves.push(ScoredMove {
                mv,
                score,
                quiet: !capture_or_promo,
            });
        }

        MovePicker { moves, current: 0 }
    }

    #[allow(clippy::too_many_arguments)]
    fn quiet_score(
        pos: &Position,
        mv: Move,
        us: usize,
        main_history: &MainHistory,
        low_ply_history: &LowPlyHistory,
        cont_history: &ContinuationHistory,
        cont_slots: [usize; 4],
        ply: i32,
    ) -> i32 {
        let pc = piece_id(pos.moved_piece(mv));
        let to = mv.to();
        let from_to = mv.from_to();

        let mut score = main_history.get(us, from_to)
            + 2 * cont_history.get(cont_slots[0], pc, to)
            + 2 * cont_history.get(cont_slots[1], pc, to)
            + cont_history.get(cont_slots[2], pc, to)
            + cont_history.get(cont_slots[3], pc, to);

        if (ply as usize) < MAX_LPH {
            score += 4 * low_ply_history.get(ply as usize, from_to);
        }

        score
    }

    /// Yields the best remaining move; with `skip_quiets` only captures,
    /// promotions and killer-class moves are returned.
    pub fn next(&mut self, skip_quiets: bool) -> Option<Move> {
        loop {
            if self.current >= self.moves.len() {
                return None;
            }

            let mut best = self.current;
            for i in self.current + 1..self.moves.len() {
                if self.moves[i].score > self.moves[best].score {
                    best = i;
                }
            }
            self.moves.swap(self.current, best);

            let picked = &self.moves[self.current];
            self.current += 1;

            if skip_quiets && picked.quiet && picked.score < COUNTER_SCORE {
                continue;
            }

            return Some(picked.mv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::bitboard::algebraic_to_square;
    use crate::search::history::CounterMoves;

    fn picker_for(pos: &Position, tt_move: Move, killers: [Move; 2]) -> MovePicker {
        let main = MainHistory::new();
        let low = LowPlyHistory::new();
        let caps = CaptureHistory::new();
        let cont = ContinuationHistory::new();
        let _counters = CounterMoves::new();
        let sentinel = ContinuationHistory::sentinel();
        MovePicker::new(
            pos,
            tt_move,
            &main,
            &low,
            &caps,
            &cont,
            [sentinel; 4],
            Move::NONE,
            killers,
            0,
        )
    }

    #[test]
    fn tt_move_comes_first() {
        let pos = Position::startpos();
        let tt = Move::new(
            algebraic_to_square("e2").unwrap(),
            algebraic_to_square("e5").unwrap(),
        );
        let mut mp = picker_for(&pos, tt, [Move::NONE; 2]);
        assert_eq!(mp.next(false), Some(tt));
    }

    #[test]
    fn winning_capture_precedes_quiets() {
        // White queen can take an undefended rook.
        let pos = Position::from_fen("4k5/55/55/55/3r6/55/3Q6/55/55/4K5 w - - - 0 1")
            .unwrap();
        let mut mp = picker_for(&pos, Move::NONE, [Move::NONE; 2]);
        let first = mp.next(false).unwrap();
        assert_eq!(first.to(), algebraic_to_square("d6").unwrap());
        assert!(pos.is_capture(first));
    }

    #[test]
    fn skip_quiets_filters_plain_moves() {
        let pos = Position::startpos();
        let mut mp = picker_for(&pos, Move::NONE, [Move::NONE; 2]);
        assert_eq!(mp.next(true), None);

        let mut mp = picker_for(&pos, Move::NONE, [Move::NONE; 2]);
        let mut count = 0;
        while mp.next(false).is_some() {
            count += 1;
        }
        assert_eq!(count, 34);
    }

    #[test]
    fn killers_rank_above_history_quiets() {
        let pos = Position::startpos();
        let killer = Move::new(
            algebraic_to_square("b1").unwrap(),
            algebraic_to_square("c3").unwrap(),
        );
        let mut mp = picker_for(&pos, Move::NONE, [killer, Move::NONE]);
        assert_eq!(mp.next(false), Some(killer));
    }
}
