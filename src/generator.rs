//! Seeded generation of loosely packed trucks.
//!
//! Used by the demo driver and by tests to produce reproducible input
//! streams. Every pallet gets a few random boxes placed first-fit, up to a
//! cap on occupied cells, so there is always room to consolidate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::placement_table;
use crate::model::{Box2D, Pallet, Truck};
use crate::types::{Grid, PALLET_AREA, PALLET_LENGTH, PALLET_WIDTH};

#[derive(Debug)]
pub struct TruckGenerator {
    rng: StdRng,
    next_box_id: u32,
    next_truck_id: i64,
    pallet_fill: u8,
    max_pallets: usize,
}

impl TruckGenerator {
    pub const DEFAULT_MAX_PALLETS: usize = 18;
    const MAX_ATTEMPTS: u8 = 4;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_box_id: 1,
            next_truck_id: 1,
            pallet_fill: PALLET_AREA,
            max_pallets: Self::DEFAULT_MAX_PALLETS,
        }
    }

    /// Caps the occupied cells per pallet (1 to 16).
    pub fn with_pallet_fill(mut self, fill: u8) -> Self {
        self.pallet_fill = fill.clamp(1, PALLET_AREA);
        self
    }

    /// Caps the pallets per truck (at least 1).
    pub fn with_max_pallets(mut self, max: usize) -> Self {
        self.max_pallets = max.max(1);
        self
    }

    fn next_box(&mut self, w: u8, l: u8) -> Box2D {
        let id = self.next_box_id;
        self.next_box_id += 1;
        Box2D { x: 0, y: 0, w, l, id }
    }

    /// A pallet with at least one box.
    pub fn pallet(&mut self) -> Pallet {
        let table = placement_table();
        let mut pallet = Pallet::default();
        let mut grid = Grid::EMPTY;

        let attempts = self.rng.gen_range(1..=Self::MAX_ATTEMPTS);
        for _ in 0..attempts {
            let w = self.rng.gen_range(1..=PALLET_LENGTH);
            let l = self.rng.gen_range(1..=PALLET_WIDTH);
            if grid.used() + u32::from(w * l) > u32::from(self.pallet_fill) {
                continue;
            }
            let probe = Box2D { x: 0, y: 0, w, l, id: 0 };
            let Some(placement) = table.find(grid, &probe) else {
                continue;
            };
            let b = self.next_box(w, l);
            grid = grid | placement.mask;
            pallet.boxes.push(placement.position(&b));
        }

        if pallet.items() == 0 {
            let b = self.next_box(1, 1);
            pallet.boxes.push(b);
        }
        pallet
    }

    pub fn truck(&mut self) -> Truck {
        let id = self.next_truck_id;
        self.next_truck_id += 1;
        let pallets = self.rng.gen_range(1..=self.max_pallets);
        Truck::new(id, (0..pallets).map(|_| self.pallet()).collect())
    }

    pub fn trucks(&mut self, n: usize) -> Vec<Truck> {
        (0..n).map(|_| self.truck()).collect()
    }
}

impl Iterator for TruckGenerator {
    type Item = Truck;

    fn next(&mut self) -> Option<Truck> {
        Some(self.truck())
    }
}
