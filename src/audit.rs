//! Consumer-side accounting of a repacking run.
//!
//! The ledger records every box and truck that enters the pipeline and
//! checks every truck that leaves it. Only correctly packed pallets count
//! towards the repacked items; the profit of a truck is the number of
//! pallets it no longer needs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Box2D, PalletError, Truck};

/// Outcome of checking one outgoing truck.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckAudit {
    pub truck: i64,
    pub pallets: usize,
    /// Boxes on correctly packed pallets.
    pub items: usize,
    /// Input pallets minus output pallets; negative for a loss.
    pub profit: i64,
    pub unknown_truck: bool,
    pub unknown_boxes: Vec<u32>,
    pub duplicate_boxes: Vec<u32>,
    /// Boxes whose dimensions differ from the ones they arrived with.
    pub altered_boxes: Vec<u32>,
    pub invalid_pallets: Vec<(usize, PalletError)>,
}

impl TruckAudit {
    pub fn is_ok(&self) -> bool {
        !self.unknown_truck
            && self.unknown_boxes.is_empty()
            && self.duplicate_boxes.is_empty()
            && self.altered_boxes.is_empty()
            && self.invalid_pallets.is_empty()
    }
}

/// Totals once the output stream has ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReport {
    pub trucks_in: usize,
    pub trucks_out: usize,
    pub boxes_in: usize,
    pub pallets_in: usize,
    pub pallets_out: usize,
    pub items: usize,
    pub profit: i64,
    pub failed_trucks: usize,
    pub missing_trucks: Vec<i64>,
    pub missing_boxes: Vec<u32>,
}

impl LedgerReport {
    /// Every truck and box came back and every outgoing truck checked out.
    pub fn is_clean(&self) -> bool {
        self.failed_trucks == 0 && self.missing_trucks.is_empty() && self.missing_boxes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ConservationLedger {
    /// Pallet count per incoming truck id, removed once the truck is back.
    trucks: HashMap<i64, usize>,
    /// Canonical form of every box still expected on the output.
    boxes: HashMap<u32, Box2D>,
    seen: HashSet<u32>,
    report: LedgerReport,
}

impl ConservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an incoming truck. The sentinel is not accounted for.
    pub fn record_input(&mut self, truck: &Truck) {
        if truck.is_sentinel() {
            return;
        }
        self.report.trucks_in += 1;
        self.report.pallets_in += truck.pallets.len();
        if self.trucks.insert(truck.id, truck.pallets.len()).is_some() {
            warn!(truck = truck.id, "truck id seen twice on the input");
        }
        for b in truck.boxes() {
            self.report.boxes_in += 1;
            if self.boxes.insert(b.id, b.canon()).is_some() {
                warn!(truck = truck.id, b = b.id, "box id seen twice on the input");
            }
        }
    }

    /// Checks an outgoing truck against everything recorded so far.
    pub fn check_output(&mut self, truck: &Truck) -> TruckAudit {
        let mut audit = TruckAudit {
            truck: truck.id,
            pallets: truck.pallets.len(),
            ..TruckAudit::default()
        };

        for (pn, pallet) in truck.pallets.iter().enumerate() {
            for b in &pallet.boxes {
                match self.boxes.remove(&b.id) {
                    Some(expected) if expected == b.canon() => {}
                    Some(_) => audit.altered_boxes.push(b.id),
                    None if self.seen.contains(&b.id) => audit.duplicate_boxes.push(b.id),
                    None => audit.unknown_boxes.push(b.id),
                }
                self.seen.insert(b.id);
            }
            match pallet.validate() {
                Ok(()) => audit.items += pallet.items(),
                Err(err) => {
                    warn!(truck = truck.id, pallet = pn, %err, "pallet is not correctly packed");
                    audit.invalid_pallets.push((pn, err));
                }
            }
        }

        match self.trucks.remove(&truck.id) {
            Some(pallets_in) => audit.profit = pallets_in as i64 - truck.pallets.len() as i64,
            None => {
                warn!(truck = truck.id, "truck unknown");
                audit.unknown_truck = true;
            }
        }
        for id in audit.unknown_boxes.iter().chain(&audit.duplicate_boxes) {
            warn!(truck = truck.id, b = id, "box was not in the input");
        }

        self.report.trucks_out += 1;
        self.report.pallets_out += truck.pallets.len();
        self.report.items += audit.items;
        self.report.profit += audit.profit;
        if !audit.is_ok() {
            self.report.failed_trucks += 1;
        }
        audit
    }

    /// Closes the books: whatever was not seen on the output is missing.
    pub fn finish(mut self) -> LedgerReport {
        let mut missing_trucks: Vec<i64> = self.trucks.into_keys().collect();
        missing_trucks.sort_unstable();
        let mut missing_boxes: Vec<u32> = self.boxes.into_keys().collect();
        missing_boxes.sort_unstable();
        if !missing_boxes.is_empty() {
            warn!(count = missing_boxes.len(), "boxes not seen in the departing trucks");
        }
        self.report.missing_trucks = missing_trucks;
        self.report.missing_boxes = missing_boxes;
        self.report
    }
}
