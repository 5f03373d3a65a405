//! Merkle level mask of a cell
//!
//! Bit `i` is set when the cell has a distinct hash at Merkle level `i + 1`.

use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct LevelMask(u8);

impl LevelMask {
    pub const EMPTY: Self = LevelMask(0);

    /// Creates a mask, truncating extra bits
    pub const fn new(mask: u8) -> Self {
        Self(mask & 0b111)
    }

    /// Creates the smallest mask covering the given level
    pub const fn from_level(level: u8) -> Self {
        Self(match level {
            0 => 0,
            1 => 1,
            2 => 3,
            _ => 7,
        })
    }

    /// Number of levels present in the mask
    pub const fn level(self) -> u8 {
        (self.0 & 1) + ((self.0 >> 1) & 1) + ((self.0 >> 2) & 1)
    }

    /// Index of the stored hash which answers for `level`
    pub const fn hash_index(self, level: u8) -> u8 {
        Self(self.0 & Self::from_level(level).0).level()
    }

    /// Whether the hash at `level` is distinct from the one below it
    pub const fn is_significant(self, level: u8) -> bool {
        level == 0 || (self.0 >> (level - 1)) & 1 != 0
    }

    /// Keeps only the bits visible at `level`
    pub const fn apply(self, level: u8) -> Self {
        Self(self.0 & Self::from_level(level).0)
    }

    /// Highest level present in the mask
    pub const fn top_level(self) -> u8 {
        8 - self.0.leading_zeros() as u8
    }

    /// Drops the lowest `offset` levels (used by Merkle cells)
    pub const fn virtualize(self, offset: u8) -> Self {
        Self(self.0 >> offset)
    }

    pub const fn to_byte(self) -> u8 {
        self.0
    }
}

impl BitOr for LevelMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LevelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
