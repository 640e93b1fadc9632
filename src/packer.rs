//! 2D bin-packing strategies over the pallet grid.
//!
//! Both strategies walk the boxes of a batch bucket by bucket, largest area
//! first, and put each box on the first pallet it fits on:
//! - `Ffd`: plain First-Fit-Decreasing, every scan starts at pallet 0
//! - `Mffd`: the same placements, but pallets that provably cannot take the
//!   next box are skipped (full pallets, and earlier pallets for buckets
//!   holding a single box shape)

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{fit_box_with_grid, is_full};
use crate::model::{Box2D, Pallet};
use crate::types::{AREAS_DESC, Footprint, Grid, PALLET_AREA, PALLET_WIDTH};

/// Canonical boxes bucketed by area, in arrival order within each bucket.
#[derive(Clone, Debug, Default)]
pub struct BoxBuckets {
    buckets: [Vec<Box2D>; PALLET_AREA as usize + 1],
    len: usize,
}

impl BoxBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes `b` and appends it to the bucket of its area.
    pub fn push(&mut self, b: &Box2D) {
        let b = b.canon();
        self.buckets[b.area() as usize].push(b);
        self.len += 1;
    }

    pub fn bucket(&self, area: u8) -> &[Box2D] {
        self.buckets
            .get(area as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of boxes across all buckets.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All boxes in packing order: descending area, then arrival.
    pub fn iter(&self) -> impl Iterator<Item = &Box2D> {
        AREAS_DESC.iter().flat_map(|&area| self.bucket(area).iter())
    }
}

/// A packing strategy.
///
/// `pack` distributes every bucketed box over `pallets` and returns how many
/// boxes it placed. Callers treat a short count as lost boxes.
pub trait Packer: Send + Sync + fmt::Debug {
    fn pack(&self, buckets: &BoxBuckets, pallets: &mut [Pallet]) -> usize;
}

/// First-Fit-Decreasing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ffd;

impl Packer for Ffd {
    fn pack(&self, buckets: &BoxBuckets, pallets: &mut [Pallet]) -> usize {
        let mut grids: Vec<Grid> = pallets.iter().map(Pallet::occupancy).collect();
        let mut packed = 0;

        for b in buckets.iter() {
            for (pallet, grid) in pallets.iter_mut().zip(grids.iter_mut()) {
                if let Some(next) = fit_box_with_grid(pallet, *grid, b) {
                    *grid = next;
                    packed += 1;
                    break;
                }
            }
        }
        packed
    }
}

/// Modified First-Fit-Decreasing with per-bucket pruning.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mffd;

impl Mffd {
    /// Buckets whose boxes all share one shape: a pallet rejecting one of
    /// them rejects the rest of the bucket too.
    #[inline]
    fn single_shape(area: u8) -> bool {
        area > PALLET_WIDTH || area <= 2
    }
}

impl Packer for Mffd {
    fn pack(&self, buckets: &BoxBuckets, pallets: &mut [Pallet]) -> usize {
        let mut grids: Vec<Grid> = pallets.iter().map(Pallet::occupancy).collect();
        // None marks a full pallet
        let mut slots: Vec<Option<usize>> = grids
            .iter()
            .enumerate()
            .map(|(i, grid)| (!is_full(*grid)).then_some(i))
            .collect();
        let mut first_open = 0;
        let mut packed = 0;

        for area in AREAS_DESC {
            let mut last_pallet = 0;
            for b in buckets.bucket(area) {
                while first_open < slots.len() && slots[first_open].is_none() {
                    first_open += 1;
                }
                for s in last_pallet.max(first_open)..slots.len() {
                    let Some(i) = slots[s] else { continue };
                    let Some(next) = fit_box_with_grid(&mut pallets[i], grids[i], b) else {
                        continue;
                    };
                    grids[i] = next;
                    packed += 1;
                    if Self::single_shape(area) {
                        last_pallet = s;
                    }
                    if is_full(next) {
                        slots[s] = None;
                    }
                    break;
                }
            }
        }
        packed
    }
}

/// Selectable packing strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackStrategy {
    Ffd,
    #[default]
    Mffd,
}

impl PackStrategy {
    pub fn packer(self) -> Arc<dyn Packer> {
        match self {
            PackStrategy::Ffd => Arc::new(Ffd),
            PackStrategy::Mffd => Arc::new(Mffd),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PackStrategy::Ffd => "ffd",
            PackStrategy::Mffd => "mffd",
        }
    }
}

impl fmt::Display for PackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ffd" => Ok(PackStrategy::Ffd),
            "mffd" => Ok(PackStrategy::Mffd),
            other => Err(format!("unknown packing strategy '{other}'")),
        }
    }
}
