use once_cell::sync::Lazy;

use super::bitboard::SQUARE_NB;

/// Dense hash index space: 8 white piece kinds then 8 black ones.
pub const PIECE_INDEX_NB: usize = 16;
pub const CASTLING_RIGHT_NB: usize = 16;

pub struct ZobristKeys {
    pub psq: [[u64; SQUARE_NB]; PIECE_INDEX_NB],
    pub en_passant: [u64; SQUARE_NB],
    pub castling: [u64; CASTLING_RIGHT_NB],
    pub side: u64,
    pub no_pawns: u64,
}

struct FastRng {
    state: u64,
}

impl FastRng {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }
}

// The seed is fixed so keys are identical across runs; transposition entries
// and bench node counts stay reproducible.
static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = FastRng::new(0x0010_5644_D1C3_A971);

    let mut keys = ZobristKeys {
        psq: [[0; SQUARE_NB]; PIECE_INDEX_NB],
        en_passant: [0; SQUARE_NB],
        castling: [0; CASTLING_RIGHT_NB],
        side: 0,
        no_pawns: 0,
    };

    for piece in 0..PIECE_INDEX_NB {
        for sq in 0..SQUARE_NB {
            keys.psq[piece][sq] = rng.next();
        }
    }

    for sq in 0..SQUARE_NB {
        keys.en_passant[sq] = rng.next();
    }

    // A combined-rights key is the XOR of its single-right keys, so removing
    // one right from a combination toggles exactly that right's key.
    for cr in 0..CASTLING_RIGHT_NB {
        let mut b = cr;
        while b != 0 {
            let bit = b & b.wrapping_neg();
            b &= b - 1;
            let single = keys.castling[bit];
            keys.castling[cr] ^= if single != 0 { single } else { rng.next() };
        }
    }

    keys.side = rng.next();
    keys.no_pawns = rng.next();
    keys
});

pub fn init_zobrist() {
    Lazy::force(&ZOBRIST);
}

#[inline(always)]
pub fn psq_key(piece_index: usize, square: u8) -> u64 {
    ZOBRIST.psq[piece_index][square as usize]
}

#[inline(always)]
pub fn en_passant_key(square: u8) -> u64 {
    ZOBRIST.en_passant[square as usize]
}

#[inline(always)]
pub fn castling_key(rights: u8) -> u64 {
    ZOBRIST.castling[rights as usize]
}

#[inline(always)]
pub fn side_key() -> u64 {
    ZOBRIST.side
}

#[inline(always)]
pub fn no_pawns_key() -> u64 {
    ZOBRIST.no_pawns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic_and_distinct() {
        init_zobrist();
        assert_ne!(psq_key(0, 0), psq_key(0, 1));
        assert_ne!(psq_key(0, 0), psq_key(1, 0));
        assert_ne!(side_key(), 0);
        // Same process, same call, same key.
        assert_eq!(psq_key(3, 42), psq_key(3, 42));
    }

    #[test]
    fn castling_keys_compose_by_xor() {
        init_zobrist();
        assert_eq!(castling_key(0), 0);
        assert_eq!(castling_key(0b0011), castling_key(0b0001) ^ castling_key(0b0010));
        assert_eq!(
            castling_key(0b1111),
            castling_key(0b0001)
                ^ castling_key(0b0010)
                ^ castling_key(0b0100)
                ^ castling_key(0b1000)
        );
    }
}
