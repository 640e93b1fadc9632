//! Common constants and small value types for the pallet grid.
//!
//! The pallet is a fixed 4×4 cell grid. Its occupancy fits into a single
//! `u16`, one bit per cell, which keeps placement checks to a single AND.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

/// Number of cells along the `x` axis of a pallet (spanned by a box's length).
pub const PALLET_WIDTH: u8 = 4;

/// Number of cells along the `y` axis of a pallet (spanned by a box's width).
pub const PALLET_LENGTH: u8 = 4;

/// Total number of cells on a pallet.
pub const PALLET_AREA: u8 = PALLET_WIDTH * PALLET_LENGTH;

/// Reserved truck id of the end-of-stream sentinel.
pub const ID_LAST_TRUCK: i64 = 0;

/// Every box area that can occur on a 4×4 pallet, largest first.
///
/// The packers walk the area buckets in exactly this order.
pub const AREAS_DESC: [u8; 9] = [16, 12, 9, 8, 6, 4, 3, 2, 1];

/// Occupancy map of a pallet.
///
/// Cell `(i, j)` maps to bit `i * PALLET_LENGTH + j`, where `i` runs along
/// `x` and `j` along `y`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid(u16);

impl Grid {
    /// An empty pallet.
    pub const EMPTY: Grid = Grid(0);

    /// A pallet with every cell taken.
    pub const FULL: Grid = Grid(u16::MAX);

    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Bit of a single cell, or `None` if the cell lies off the pallet.
    #[inline]
    pub fn cell(i: u8, j: u8) -> Option<Grid> {
        if i >= PALLET_WIDTH || j >= PALLET_LENGTH {
            return None;
        }
        Some(Grid(1 << (i * PALLET_LENGTH + j)))
    }

    /// Mask of the rectangle spanning `x..x + l` and `y..y + w`.
    ///
    /// Returns `None` if any part of the rectangle is off the pallet.
    pub fn rect(x: u8, y: u8, w: u8, l: u8) -> Option<Grid> {
        let mut mask = Grid::EMPTY;
        for i in x..x.checked_add(l)? {
            for j in y..y.checked_add(w)? {
                mask = mask | Grid::cell(i, j)?;
            }
        }
        Some(mask)
    }

    #[inline]
    pub const fn is_disjoint(self, other: Grid) -> bool {
        self.0 & other.0 == 0
    }

    #[inline]
    pub const fn is_full(self) -> bool {
        self.0 == u16::MAX
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of occupied cells.
    #[inline]
    pub const fn used(self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    pub const fn free(self) -> u32 {
        self.0.count_zeros()
    }
}

impl BitOr for Grid {
    type Output = Grid;

    #[inline]
    fn bitor(self, rhs: Grid) -> Grid {
        Grid(self.0 | rhs.0)
    }
}

impl BitAnd for Grid {
    type Output = Grid;

    #[inline]
    fn bitand(self, rhs: Grid) -> Grid {
        Grid(self.0 & rhs.0)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..PALLET_WIDTH {
            for j in 0..PALLET_LENGTH {
                let taken = Grid::cell(i, j).is_some_and(|c| !self.is_disjoint(c));
                f.write_str(if taken { "#" } else { "." })?;
            }
            if i + 1 < PALLET_WIDTH {
                f.write_str("\n")?;
            }
        }
        Ok(())
    }
}

/// Anything with a rectangular footprint on the pallet grid.
pub trait Footprint {
    /// Extent along `y`.
    fn width(&self) -> u8;

    /// Extent along `x`.
    fn length(&self) -> u8;

    fn area(&self) -> u8 {
        self.width() * self.length()
    }

    /// Whether the footprint fits on an empty pallet in some orientation.
    fn fits_pallet(&self) -> bool {
        let (w, l) = (self.width(), self.length());
        (1..=PALLET_LENGTH).contains(&w.min(l)) && w.max(l) <= PALLET_WIDTH.max(PALLET_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn areas_cover_every_box_size() {
        for w in 1..=PALLET_LENGTH {
            for l in 1..=PALLET_WIDTH {
                assert!(AREAS_DESC.contains(&(w * l)), "area {} missing", w * l);
            }
        }
        assert!(AREAS_DESC.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn rect_masks() {
        assert_eq!(Grid::rect(0, 0, 4, 4), Some(Grid::FULL));
        assert_eq!(Grid::rect(0, 0, 1, 1), Some(Grid::from_bits(1)));
        // x spans the length, so a 1×4 strip at y=0 takes bits 0, 4, 8 and 12
        assert_eq!(Grid::rect(0, 0, 1, 4), Some(Grid::from_bits(0b0001_0001_0001_0001)));
        assert_eq!(Grid::rect(3, 0, 1, 2), None);
        assert_eq!(Grid::rect(0, 3, 2, 1), None);
    }

    #[test]
    fn grid_counts() {
        let g = Grid::rect(1, 1, 2, 2).unwrap();
        assert_eq!(g.used(), 4);
        assert_eq!(g.free(), 12);
        assert!(!g.is_full());
        assert!(g.is_disjoint(Grid::rect(0, 0, 1, 4).unwrap()));
        assert!(!g.is_disjoint(Grid::rect(2, 2, 1, 1).unwrap()));
        assert!(Grid::FULL.is_full());
        assert!(Grid::EMPTY.is_empty());
    }

    #[test]
    fn grid_display() {
        let g = Grid::rect(0, 0, 2, 1).unwrap();
        assert_eq!(g.to_string(), "##..\n....\n....\n....");
    }
}
