//! Pseudo-legal move generation by mode, plus the legal filter.
//!
//! The princess-promotion rule duplicates the generated list: one move after
//! the side to move lost its queen, every move is also offered with the
//! promote-princess flag, and the would-be queen's moves from the princess
//! square are generated as flagged normal moves.

use crate::board::bitboard::*;
use crate::board::position::{
    castling_rights_of, pawn_push, type_of, Color, Move, MoveType, PieceType, Position,
    BLACK_OO, BLACK_OOO, WHITE_OO, WHITE_OOO,
};
use crate::movegen::attacks::{attacks_bb, between_bb, line_bb, pseudo_attacks, royal_wall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    Captures,
    Quiets,
    QuietChecks,
    Evasions,
    NonEvasions,
    Legal,
}

pub type MoveList = Vec<Move>;

/// Squares a non-king move may end on to address the check from `checksq`.
/// For royal straight-line checks the single open wall square is a valid
/// block; with more than one open wall square no block helps.
pub fn evasion_target(pos: &Position, checksq: Square, ksq: Square) -> Bitboard {
    let mut target = square_bb(checksq);
    let checker_bb = square_bb(checksq);

    if pos.pieces_pp(PieceType::Bishop, PieceType::Rook) & checker_bb != 0
        || pos.pieces_p(PieceType::Queen) & checker_bb != 0
    {
        target |= between_bb(ksq, checksq);
    } else if pos.pieces_pp(PieceType::Prince, PieceType::Princess) & checker_bb != 0 {
        if pseudo_attacks(PieceType::Bishop, checksq) & square_bb(ksq) != 0 {
            target |= between_bb(ksq, checksq);
        } else if distance(checksq, ksq) == 2 {
            let wall = royal_wall(checksq, ksq);
            let openblocks = wall & !pos.pieces();
            // A fully blocked wall would mean there is no check at all.
            debug_assert!(openblocks != 0);
            if !more_than_one(openblocks) {
                target |= openblocks;
            }
        }
    }

    target
}

fn make_promotions(list: &mut MoveList, gen: GenType, up: Direction, to: Square, ksq: Square) {
    let from = (to as i16 - up as i16) as Square;

    if matches!(gen, GenType::Captures | GenType::Evasions | GenType::NonEvasions) {
        list.push(Move::make_promotion(from, to, PieceType::Queen));
    }

    if matches!(gen, GenType::Quiets | GenType::Evasions | GenType::NonEvasions) {
        list.push(Move::make_promotion(from, to, PieceType::Rook));
        list.push(Move::make_promotion(from, to, PieceType::Bishop));
        list.push(Move::make_promotion(from, to, PieceType::Knight));
    }

    // Knight underpromotion is the only promotion that can give a direct
    // check not already covered by the queen promotion.
    if gen == GenType::QuietChecks
        && pseudo_attacks(PieceType::Knight, to) & square_bb(ksq) != 0
    {
        list.push(Move::make_promotion(from, to, PieceType::Knight));
    }
}

fn generate_pawn_moves(
    pos: &Position,
    us: Color,
    gen: GenType,
    target: Bitboard,
    list: &mut MoveList,
) {
    let them = !us;
    let white = us.is_white();

    let t_rank9 = if white { RANK_9_BB } else { RANK_2_BB };
    let t_rank3 = if white { RANK_3_BB } else { RANK_8_BB };
    let t_rank4 = if white { RANK_4_BB } else { RANK_7_BB };
    let up = pawn_push(us);
    let up_right = if white { NORTH_EAST } else { SOUTH_WEST };
    let up_left = if white { NORTH_WEST } else { SOUTH_EAST };

    let ksq = pos.king_square(them);

    let pawns_on9 = pos.pieces_cp(us, PieceType::Pawn) & t_rank9;
    let pawns_not_on9 = pos.pieces_cp(us, PieceType::Pawn) & !t_rank9;

    let enemies = match gen {
        GenType::Evasions => pos.pieces_c(them) & target,
        GenType::Captures => target,
        _ => pos.pieces_c(them),
    };

    let mut empty_squares = EMPTY;

    // Pushes: single always, double from the start ranks, triple through the
    // fourth relative rank. Every intermediate square must be empty.
    if gen != GenType::Captures {
        empty_squares = if matches!(gen, GenType::Quiets | GenType::QuietChecks) {
            target
        } else {
            ALL_SQUARES & !pos.pieces()
        };

        let mut b1 = shift(up, pawns_not_on9) & empty_squares;
        let mut b2 = shift(up, b1 & (t_rank3 | t_rank4)) & empty_squares;
        let mut b3 = shift(up, b2 & t_rank4) & empty_squares;

        if gen == GenType::Evasions {
            b1 &= target;
            b2 &= target;
            b3 &= target;
        }

        if gen == GenType::QuietChecks {
            let front = pawn_attacks_bb(them.is_white(), square_bb(ksq));
            b1 &= front;
            b2 &= front;
            b3 &= front;

            // Pawn pushes that give a discovered check. Only possible off
            // the king's file, since captures are not generated here.
            let dc_candidates = pos.blockers_for_king(them) & pawns_not_on9;
            if dc_candidates != 0 {
                let dc1 = shift(up, dc_candidates) & empty_squares & !file_bb(file_of(ksq));
                let dc2 = shift(up, dc1 & t_rank3) & empty_squares;
                let dc3 = shift(up, dc2 & t_rank4) & empty_squares;

                b1 |= dc1;
                b2 |= dc2;
                b3 |= dc3;
            }
        }

        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            list.push(Move::new((to as i16 - up as i16) as Square, to));
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            list.push(Move::new((to as i16 - 2 * up as i16) as Square, to));
        }
        while b3 != 0 {
            let to = pop_lsb(&mut b3);
            list.push(Move::new((to as i16 - 3 * up as i16) as Square, to));
        }
    }

    if pawns_on9 != 0 {
        if gen == GenType::Captures {
            empty_squares = ALL_SQUARES & !pos.pieces();
        }
        if gen == GenType::Evasions {
            empty_squares &= target;
        }

        let mut b1 = shift(up_right, pawns_on9) & enemies;
        let mut b2 = shift(up_left, pawns_on9) & enemies;
        let mut b3 = shift(up, pawns_on9) & empty_squares;

        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            make_promotions(list, gen, up_right, to, ksq);
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            make_promotions(list, gen, up_left, to, ksq);
        }
        while b3 != 0 {
            let to = pop_lsb(&mut b3);
            make_promotions(list, gen, up, to, ksq);
        }
    }

    if matches!(gen, GenType::Captures | GenType::Evasions | GenType::NonEvasions) {
        let mut b1 = shift(up_right, pawns_not_on9) & enemies;
        let mut b2 = shift(up_left, pawns_not_on9) & enemies;

        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            list.push(Move::new((to as i16 - up_right as i16) as Square, to));
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            list.push(Move::new((to as i16 - up_left as i16) as Square, to));
        }

        if pos.ep_square() != SQ_NONE {
            debug_assert!(matches!(
                relative_rank(white, rank_of(pos.ep_square())),
                RANK_6 | RANK_7
            ));

            // An en-passant capture evades a check only when the pushed
            // pawn itself is the checker.
            if gen == GenType::Evasions && target & square_bb(pos.ep_square()) == 0 {
                return;
            }

            let mut ep_targets = forward_file_bb(white, pos.ep_square()) & EP_RANKS;
            while ep_targets != 0 {
                let to = pop_lsb(&mut ep_targets);
                let mut b =
                    pawns_not_on9 & pawn_attacks_bb(them.is_white(), square_bb(to));
                while b != 0 {
                    let from = pop_lsb(&mut b);
                    list.push(Move::make(MoveType::EnPassant, from, to));
                }
            }
        }
    }
}

fn generate_piece_moves(
    pos: &Position,
    us: Color,
    pt: PieceType,
    checks: bool,
    target: Bitboard,
    list: &mut MoveList,
) {
    debug_assert!(pt != PieceType::King && pt != PieceType::Pawn);

    let them = !us;
    let mut squares = pos.pieces_cp(us, pt);

    while squares != 0 {
        let from = pop_lsb(&mut squares);

        if checks {
            // A slider whose full range misses every checking square
            // cannot give a quiet check from here.
            if matches!(pt, PieceType::Bishop | PieceType::Rook | PieceType::Queen)
                && pseudo_attacks(pt, from)
                    & target
                    & attacks_bb(pt, pos.king_square(them), pos.pieces())
                    == 0
            {
                continue;
            }

            // Discovered checks were generated separately.
            if pos.blockers_for_king(them) & square_bb(from) != 0 {
                continue;
            }
        }

        let mut b = attacks_bb(pt, from, pos.pieces()) & target;
        if checks {
            b &= attacks_bb(pt, pos.king_square(them), pos.pieces());
        }

        while b != 0 {
            list.push(Move::new(from, pop_lsb(&mut b)));
        }
    }
}

fn mode_target(pos: &Position, us: Color, gen: GenType) -> Bitboard {
    match gen {
        GenType::Captures => pos.pieces_c(!us),
        GenType::Quiets | GenType::QuietChecks => ALL_SQUARES & !pos.pieces(),
        GenType::Evasions => evasion_target(pos, lsb(pos.checkers()), pos.king_square(us)),
        _ => ALL_SQUARES & !pos.pieces_c(us),
    }
}

fn generate_all(pos: &Position, us: Color, gen: GenType, list: &mut MoveList) {
    debug_assert!(gen != GenType::Legal);

    let checks = gen == GenType::QuietChecks;
    let target = mode_target(pos, us, gen);

    generate_pawn_moves(pos, us, gen, target, list);
    for pt in [
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Princess,
        PieceType::Prince,
        PieceType::Queen,
    ] {
        generate_piece_moves(pos, us, pt, checks, target, list);
    }

    if gen != GenType::QuietChecks && gen != GenType::Evasions {
        let ksq = pos.king_square(us);
        let mut b = pseudo_attacks(PieceType::King, ksq) & target;
        while b != 0 {
            list.push(Move::new(ksq, pop_lsb(&mut b)));
        }

        if gen != GenType::Captures && pos.can_castle(castling_rights_of(us)) {
            let (oo, ooo) = if us.is_white() {
                (WHITE_OO, WHITE_OOO)
            } else {
                (BLACK_OO, BLACK_OOO)
            };
            for cr in [oo, ooo] {
                if !pos.castling_impeded(cr) && pos.can_castle(cr) {
                    list.push(Move::make(
                        MoveType::Castling,
                        ksq,
                        pos.castling_rook_square(cr),
                    ));
                }
            }
        }
    }
}

/// The variant's two list rewrites, applied to the complete move list of a
/// generation mode.
fn royal_post_pass(pos: &Position, us: Color, gen: GenType, list: &mut MoveList) {
    let them = !us;

    // An attackable enemy king must be captured: drop everything else.
    let their_ksq = pos.king_square(them);
    if pos.attackers_to_sq(their_ksq) & pos.pieces_c(us) != 0 {
        list.retain(|m| m.to() == their_ksq);
    }

    // The queen fell last move: offer every move again with the
    // promote-princess flag, plus the promoted queen's own moves.
    if pos.queen_captured() && pos.pieces_cp(us, PieceType::Princess) != 0 {
        let princess_sq = pos.square_of(us, PieceType::Princess);

        let end = list.len();
        for i in 0..end {
            let m = list[i];
            if m.from() != princess_sq {
                list.push(m.with_promote_princess());
            }
        }

        let checks = gen == GenType::QuietChecks;
        let target = mode_target(pos, us, gen);

        if checks {
            if pseudo_attacks(PieceType::Queen, princess_sq)
                & target
                & attacks_bb(PieceType::Queen, pos.king_square(them), pos.pieces())
                == 0
            {
                return;
            }
            if pos.blockers_for_king(them) & square_bb(princess_sq) != 0 {
                return;
            }
        }

        let mut b = attacks_bb(PieceType::Queen, princess_sq, pos.pieces()) & target;
        if checks {
            b &= attacks_bb(PieceType::Queen, pos.king_square(them), pos.pieces());
        }
        while b != 0 {
            list.push(Move::new(princess_sq, pop_lsb(&mut b)).with_promote_princess());
        }
    }
}

/// Generates moves of the requested mode. `Captures`, `Quiets` and
/// `NonEvasions` assume the side to move is not in check; `Evasions`
/// assumes it is; `Legal` dispatches and filters.
pub fn generate(pos: &Position, gen: GenType) -> MoveList {
    let us = pos.side_to_move();
    let mut list = MoveList::with_capacity(64);

    match gen {
        GenType::Captures | GenType::Quiets | GenType::NonEvasions => {
            debug_assert!(pos.checkers() == 0);
            generate_all(pos, us, gen, &mut list);
            royal_post_pass(pos, us, gen, &mut list);
        }

        GenType::QuietChecks => {
            debug_assert!(pos.checkers() == 0);

            let them = !us;
            let mut dc =
                pos.blockers_for_king(them) & pos.pieces_c(us) & !pos.pieces_p(PieceType::Pawn);

            while dc != 0 {
                let from = pop_lsb(&mut dc);
                let pt = type_of(pos.piece_on(from));

                let mut b = attacks_bb(pt, from, pos.pieces()) & !pos.pieces();
                if pt == PieceType::King {
                    b &= !pseudo_attacks(PieceType::Queen, pos.king_square(them));
                }

                while b != 0 {
                    list.push(Move::new(from, pop_lsb(&mut b)));
                }
            }

            generate_all(pos, us, gen, &mut list);
            royal_post_pass(pos, us, gen, &mut list);
        }

        GenType::Evasions => {
            debug_assert!(pos.checkers() != 0);

            let ksq = pos.king_square(us);
            let mut slider_attacks = EMPTY;

            // Remove the rays of slider-like checkers so the king does not
            // step along the checking line.
            let mut sliders =
                pos.checkers() & !pos.pieces_pp(PieceType::Knight, PieceType::Pawn);
            while sliders != 0 {
                slider_attacks |= line_bb(ksq, pop_lsb(&mut sliders)) & !pos.checkers();
            }

            let mut b = pseudo_attacks(PieceType::King, ksq) & !pos.pieces_c(us) & !slider_attacks;
            while b != 0 {
                list.push(Move::new(ksq, pop_lsb(&mut b)));
            }

            // Double check: only king moves can help.
            if !more_than_one(pos.checkers()) {
                generate_all(pos, us, gen, &mut list);
            }
            royal_post_pass(pos, us, gen, &mut list);
        }

        GenType::Legal => {
            let mut pseudo = if pos.checkers() != 0 {
                generate(pos, GenType::Evasions)
            } else {
                generate(pos, GenType::NonEvasions)
            };
            pseudo.retain(|m| pos.legal(*m));
            return pseudo;
        }
    }

    list
}

/// Leaf count of the legal move tree; the move generator's ground truth.
pub fn perft(pos: &mut Position, depth: i32) -> u64 {
    let moves = generate(pos, GenType::Legal);
    if depth <= 1 {
        return moves.len() as u64;
    }

    let mut nodes = 0;
    for m in moves {
        pos.do_move(m);
        nodes += perft(pos, depth - 1);
        pos.undo_move(m);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::make_piece;

    fn sq(name: &str) -> Square {
        algebraic_to_square(name).unwrap()
    }

    fn uci_set(moves: &MoveList) -> Vec<(Square, Square, bool)> {
        moves.iter().map(|m| (m.from(), m.to(), m.promote_princess())).collect()
    }

    #[test]
    fn startpos_perft_counts() {
        let mut pos = Position::startpos();
        // Ten files of single/double/triple pushes plus four knight jumps.
        assert_eq!(perft(&mut pos, 1), 34);
        // No interaction between the sides at depth two.
        assert_eq!(perft(&mut pos, 2), 34 * 34);
    }

    #[test]
    fn bare_kings_and_queen_position_has_three_king_moves() {
        let pos =
            Position::from_fen("5q4/55/55/55/55/55/55/5k4/55/4K5 w - Ss - 0 1").unwrap();
        let moves = generate(&pos, GenType::Legal);
        assert_eq!(moves.len(), 3);
        assert!(moves.iter().all(|m| m.from() == sq("e1")));
        let targets: Vec<Square> = moves.iter().map(|m| m.to()).collect();
        for t in ["d1", "f1", "d2"] {
            assert!(targets.contains(&sq(t)), "missing Ke1-{}", t);
        }
    }

    #[test]
    fn captures_and_quiets_partition_non_evasions() {
        let pos = Position::from_fen(
            "11kr1qtbnr/pppspppppp/11np111111/11111b1111/1111111111/1111111111/1111111111/PPPPP11111/11111PPPPP/RNBSKQTBNR w KQ Ss - 1 6",
        )
        .unwrap();
        let captures = generate(&pos, GenType::Captures);
        let quiets = generate(&pos, GenType::Quiets);
        let all = generate(&pos, GenType::NonEvasions);
        assert_eq!(captures.len() + quiets.len(), all.len());
        for m in &captures {
            assert!(pos.is_capture(*m) || m.move_type() == MoveType::Promotion);
        }
        for m in &quiets {
            assert!(!pos.is_capture(*m));
        }
    }

    #[test]
    fn royal_wall_check_with_single_open_square_allows_the_block() {
        let pos = Position::from_fen(
            "9k/55/55/55/55/55/55/4s5/3P1P4/4K1N3 w - - - 0 1",
        )
        .unwrap();
        assert_ne!(pos.checkers(), 0);

        let moves = generate(&pos, GenType::Legal);
        let set = uci_set(&moves);
        assert!(set.contains(&(sq("e1"), sq("d1"), false)));
        assert!(set.contains(&(sq("e1"), sq("f1"), false)));
        assert!(set.contains(&(sq("g1"), sq("e2"), false)), "block on the open wall square");
        assert!(set.contains(&(sq("d2"), sq("e3"), false)), "capture the princess");
        assert!(set.contains(&(sq("f2"), sq("e3"), false)));
        assert_eq!(moves.len(), 5);
    }

    #[test]
    fn royal_wall_check_with_open_wall_offers_no_block() {
        // Same check, but all three wall squares empty: the princess
        // attacks through any of them, so no single interposition helps.
        let pos =
            Position::from_fen("9k/55/55/55/55/55/55/4s5/55/4K1N3 w - - - 0 1").unwrap();
        assert_ne!(pos.checkers(), 0);

        let moves = generate(&pos, GenType::Legal);
        assert!(moves.iter().all(|m| m.from() == sq("e1")));
        let targets: Vec<Square> = moves.iter().map(|m| m.to()).collect();
        assert!(targets.contains(&sq("d1")));
        assert!(targets.contains(&sq("f1")));
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn quiet_checks_include_rook_file_check() {
        let pos =
            Position::from_fen("4k5/55/55/55/55/55/55/55/K9/R9 w - - - 0 1").unwrap();
        let checks = generate(&pos, GenType::QuietChecks);
        assert!(checks
            .iter()
            .any(|m| m.from() == sq("a1") && m.to() == sq("e1")));
        for m in &checks {
            assert!(!pos.is_capture(*m));
        }
    }

    #[test]
    fn queen_capture_offers_flagged_duplicates_next_ply() {
        let mut pos = Position::from_fen(
            "3sq4k/55/55/55/55/4Q5/55/55/55/K9 w - s - 0 1",
        )
        .unwrap();
        let m = *generate(&pos, GenType::Legal)
            .iter()
            .find(|m| m.from() == sq("e5") && m.to() == sq("e10"))
            .unwrap();
        pos.do_move(m);
        assert!(pos.queen_captured());
        assert!(pos.princess_rights(Color::Black));

        let moves = generate(&pos, GenType::Legal);
        let unflagged: Vec<&Move> = moves.iter().filter(|m| !m.promote_princess()).collect();
        let princess_sq = sq("d10");

        // Every unflagged move not played by the princess has a flagged twin.
        for m in &unflagged {
            if m.from() != princess_sq {
                assert!(
                    moves
                        .iter()
                        .any(|f| f.promote_princess()
                            && f.from() == m.from()
                            && f.to() == m.to()),
                    "missing flagged twin of {}->{}",
                    m.from(),
                    m.to()
                );
            }
        }

        // The would-be queen's capture of the checking queen is offered.
        assert!(moves
            .iter()
            .any(|m| m.promote_princess() && m.from() == princess_sq && m.to() == sq("e10")));

        // Playing a flagged king move promotes the princess in place.
        let flagged = *moves
            .iter()
            .find(|m| m.promote_princess() && m.from() == sq("j10"))
            .unwrap();
        pos.do_move(flagged);
        assert_eq!(
            pos.piece_on(princess_sq),
            make_piece(Color::Black, PieceType::Queen)
        );
        assert!(!pos.princess_rights(Color::Black));
        pos.undo_move(flagged);
        assert_eq!(
            pos.piece_on(princess_sq),
            make_piece(Color::Black, PieceType::Princess)
        );
        assert!(pos.princess_rights(Color::Black));

        // An unflagged move forfeits the right and keeps the princess.
        let plain = **unflagged.iter().find(|m| m.from() == sq("j10")).unwrap();
        pos.do_move(plain);
        assert_eq!(
            pos.piece_on(princess_sq),
            make_piece(Color::Black, PieceType::Princess)
        );
        assert!(!pos.princess_rights(Color::Black));
        pos.undo_move(plain);
    }

    #[test]
    fn queen_capture_enabling_princess_check_is_illegal_without_a_prince() {
        // After Qxe10 the black princess could promote on d10 and hit the
        // white king down the d-file: the capture is forbidden.
        let pos = Position::from_fen(
            "3sq4k/55/55/55/55/4Q5/55/55/55/3K6 w - s - 0 1",
        )
        .unwrap();
        assert!(!generate(&pos, GenType::Legal)
            .iter()
            .any(|m| m.from() == sq("e5") && m.to() == sq("e10")));

        // A spare prince lifts the restriction.
        let pos = Position::from_fen(
            "3sq4k/55/55/55/55/4Q5/55/55/55/3K1T4 w - s - 0 1",
        )
        .unwrap();
        assert!(generate(&pos, GenType::Legal)
            .iter()
            .any(|m| m.from() == sq("e5") && m.to() == sq("e10")));
    }

    #[test]
    fn legal_move_list_matches_per_move_legality() {
        for fen in [
            Position::START_FEN,
            "rnbsk1111r/pppppqtppp/11111ppn11/1111b11111/1111111111/1111111111/1111111111/PPPPPPP111/1111111PPP/RNBSKQTBNR b KQkq Ss - 0 7",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            let legal = generate(&pos, GenType::Legal);
            let pseudo = generate(&pos, GenType::NonEvasions);
            for m in pseudo {
                let in_legal = legal.contains(&m);
                assert_eq!(in_legal, pos.legal(m), "move {}->{}", m.from(), m.to());
            }
        }
    }
}
