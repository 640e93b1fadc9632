//! Placement table and fit checks for the 4×4 pallet grid.
//!
//! Every legal placement of every box size is enumerated once, up front, as an
//! occupancy mask plus the positioned box. A fit check is then a linear scan
//! for the first mask disjoint from the pallet's occupancy.
//!
//! Enumeration order is part of the contract: the given orientation first,
//! then the rotated one (only if `w != l`); within one orientation `x` is the
//! outer loop and `y` the inner one. The first legal placement wins, so repack
//! results are reproducible.

use std::sync::OnceLock;

use crate::model::{Box2D, Pallet};
use crate::types::{Grid, PALLET_LENGTH, PALLET_WIDTH};

/// A legal placement: the cells it takes and where the box ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub mask: Grid,
    pub x: u8,
    pub y: u8,
    pub w: u8,
    pub l: u8,
}

impl Placement {
    /// Applies this placement to `b`, keeping its id.
    #[inline]
    pub fn position(&self, b: &Box2D) -> Box2D {
        Box2D {
            x: self.x,
            y: self.y,
            w: self.w,
            l: self.l,
            id: b.id,
        }
    }
}

const SIZES: usize = (PALLET_WIDTH as usize) * (PALLET_LENGTH as usize);

/// All legal placements, indexed by box size.
#[derive(Debug)]
pub struct PlacementTable {
    entries: [Vec<Placement>; SIZES],
}

static PLACEMENT_TABLE: OnceLock<PlacementTable> = OnceLock::new();

/// The process-wide placement table, built on first use.
pub fn placement_table() -> &'static PlacementTable {
    PLACEMENT_TABLE.get_or_init(PlacementTable::build)
}

impl PlacementTable {
    fn build() -> Self {
        let mut entries: [Vec<Placement>; SIZES] = std::array::from_fn(|_| Vec::new());
        for w in 1..=PALLET_LENGTH {
            for l in 1..=PALLET_WIDTH {
                let slot = &mut entries[Self::index(w, l)];
                push_orientation(slot, w, l);
                if w != l {
                    push_orientation(slot, l, w);
                }
            }
        }
        Self { entries }
    }

    #[inline]
    fn index(w: u8, l: u8) -> usize {
        (w as usize - 1) * PALLET_WIDTH as usize + (l as usize - 1)
    }

    /// Placements for a box of size `w × l`; empty for sizes off the grid.
    pub fn placements(&self, w: u8, l: u8) -> &[Placement] {
        if w == 0 || l == 0 || w > PALLET_LENGTH || l > PALLET_WIDTH {
            return &[];
        }
        &self.entries[Self::index(w, l)]
    }

    /// First placement of `b` that does not collide with `grid`.
    #[inline]
    pub fn find(&self, grid: Grid, b: &Box2D) -> Option<&Placement> {
        self.placements(b.w, b.l)
            .iter()
            .find(|p| p.mask.is_disjoint(grid))
    }
}

fn push_orientation(slot: &mut Vec<Placement>, w: u8, l: u8) {
    // Rotated sizes can exceed one axis when the pallet is not square.
    if w > PALLET_LENGTH || l > PALLET_WIDTH {
        return;
    }
    for x in 0..=PALLET_WIDTH - l {
        for y in 0..=PALLET_LENGTH - w {
            if let Some(mask) = Grid::rect(x, y, w, l) {
                slot.push(Placement { mask, x, y, w, l });
            }
        }
    }
}

/// Reports whether `b` fits somewhere on a pallet with occupancy `grid`.
pub fn fit_box(grid: Grid, b: &Box2D) -> bool {
    placement_table().find(grid, b).is_some()
}

/// Places `b` on `pallet` at its first legal position.
///
/// `grid` must be the pallet's current occupancy. On success the positioned
/// box (same id, possibly rotated) is appended and the new occupancy is
/// returned; otherwise the pallet is left untouched.
pub fn fit_box_with_grid(pallet: &mut Pallet, grid: Grid, b: &Box2D) -> Option<Grid> {
    let placement = placement_table().find(grid, b)?;
    pallet.boxes.push(placement.position(b));
    Some(grid | placement.mask)
}

/// A pallet is full when every cell is taken.
#[inline]
pub fn is_full(grid: Grid) -> bool {
    grid.is_full()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_counts() {
        let table = placement_table();
        assert_eq!(table.placements(4, 4).len(), 1);
        assert_eq!(table.placements(1, 1).len(), 16);
        // 1×4: four rows plus four columns
        assert_eq!(table.placements(1, 4).len(), 8);
        // 2×3: 3·2 placements per orientation
        assert_eq!(table.placements(2, 3).len(), 12);
        assert!(table.placements(0, 3).is_empty());
        assert!(table.placements(5, 1).is_empty());
    }

    #[test]
    fn table_order_is_x_outer_then_rotation() {
        let table = placement_table();
        let p = table.placements(1, 2);
        assert_eq!((p[0].x, p[0].y, p[0].w, p[0].l), (0, 0, 1, 2));
        assert_eq!((p[1].x, p[1].y), (0, 1));
        assert_eq!((p[4].x, p[4].y), (1, 0));
        // 3·4 placements in the given orientation, then the rotated ones
        assert_eq!((p[12].x, p[12].y, p[12].w, p[12].l), (0, 0, 2, 1));
    }

    #[test]
    fn every_mask_matches_its_box() {
        let table = placement_table();
        for w in 1..=4 {
            for l in 1..=4 {
                for p in table.placements(w, l) {
                    let b = Box2D { x: p.x, y: p.y, w: p.w, l: p.l, id: 1 };
                    assert!(b.in_bounds());
                    assert_eq!(b.mask(), Some(p.mask));
                    assert_eq!(p.mask.used(), (w * l) as u32);
                }
            }
        }
    }

    #[test]
    fn fit_box_on_partial_pallet() {
        let b = Box2D { x: 0, y: 0, w: 2, l: 2, id: 5 };
        assert!(fit_box(Grid::EMPTY, &b));
        assert!(!fit_box(Grid::FULL, &b));

        // only a 1-wide column at x=3 is left
        let grid = Grid::rect(0, 0, 4, 3).unwrap();
        assert!(!fit_box(grid, &b));
        assert!(fit_box(grid, &Box2D { x: 0, y: 0, w: 1, l: 4, id: 6 }));
    }

    #[test]
    fn fit_box_with_grid_positions_and_rotates() {
        let mut pallet = Pallet::default();
        let grid = Grid::rect(0, 0, 4, 3).unwrap();
        let b = Box2D { x: 0, y: 0, w: 1, l: 4, id: 6 };
        let grid = fit_box_with_grid(&mut pallet, grid, &b).unwrap();
        assert!(is_full(grid));
        assert_eq!(pallet.boxes, vec![Box2D { x: 3, y: 0, w: 4, l: 1, id: 6 }]);

        let before = pallet.clone();
        assert_eq!(fit_box_with_grid(&mut pallet, grid, &b), None);
        assert_eq!(pallet, before);
    }

    #[test]
    fn first_fit_fills_pallet_row_by_row() {
        let mut pallet = Pallet::default();
        let mut grid = Grid::EMPTY;
        for id in 1..=16 {
            let b = Box2D { x: 0, y: 0, w: 1, l: 1, id };
            grid = fit_box_with_grid(&mut pallet, grid, &b).unwrap();
        }
        assert!(is_full(grid));
        assert_eq!(pallet.validate(), Ok(()));
        assert_eq!(pallet.boxes[1], Box2D { x: 0, y: 1, w: 1, l: 1, id: 2 });
        assert_eq!(pallet.boxes[4], Box2D { x: 1, y: 0, w: 1, l: 1, id: 5 });
    }
}
