//! Accumulates boxes from several trucks before one packing pass.
//!
//! A batch unpacks every truck it is given into area buckets, remembers how
//! many pallets arrived with them, repacks everything onto that many fresh
//! pallets and finally rebuilds one outgoing truck per absorbed truck.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::RepackConfig;
use crate::error::{RepackError, Result};
use crate::model::{Pallet, Truck};
use crate::packer::{BoxBuckets, Mffd, Packer};

pub struct Batch {
    buckets: BoxBuckets,
    open_pallets: usize,
    box_count: usize,
    trucks: Vec<i64>,
    skipped_trucks: usize,
    pallets: Vec<Pallet>,
    packer: Arc<dyn Packer>,
    max_box_count: usize,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(Arc::new(Mffd), RepackConfig::DEFAULT_MAX_BOX_COUNT)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("trucks", &self.trucks.len())
            .field("open_pallets", &self.open_pallets)
            .field("box_count", &self.box_count)
            .field("packer", &self.packer)
            .finish()
    }
}

impl Batch {
    pub fn new(packer: Arc<dyn Packer>, max_box_count: usize) -> Self {
        Self {
            buckets: BoxBuckets::new(),
            open_pallets: 0,
            box_count: 0,
            trucks: Vec::new(),
            skipped_trucks: 0,
            pallets: Vec::new(),
            packer,
            max_box_count,
        }
    }

    /// A fresh, empty batch with the same packer and threshold.
    pub fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.packer), self.max_box_count)
    }

    /// Absorbs a truck: its pallets become open slots, its boxes go into
    /// the area buckets.
    ///
    /// A truck carrying a malformed box is not unpacked at all. It is still
    /// recorded so that exactly one (empty) truck leaves for it. Where a box
    /// sits on arrival does not matter, it is repacked from scratch.
    pub fn unpack_truck(&mut self, truck: Truck) {
        self.trucks.push(truck.id);

        if let Err(err) = truck.validate_shapes() {
            warn!(truck = truck.id, %err, "skipping truck with malformed boxes");
            self.skipped_trucks += 1;
            return;
        }

        self.open_pallets += truck.pallets.len();
        for b in truck.boxes() {
            self.buckets.push(b);
        }
        self.box_count += truck.box_count();
    }

    /// Whether the batch holds more boxes than its threshold.
    pub fn is_full(&self) -> bool {
        self.box_count > self.max_box_count
    }

    /// Packs every absorbed box onto `open_pallets` fresh pallets.
    ///
    /// Losing a box or producing a badly packed pallet is fatal.
    pub fn repack_pallets(&mut self) -> Result<usize> {
        self.pallets = vec![Pallet::default(); self.open_pallets];
        let packed = self.packer.pack(&self.buckets, &mut self.pallets);

        if packed != self.box_count {
            return Err(RepackError::BoxesLost {
                lost: self.box_count.saturating_sub(packed),
                total: self.box_count,
            });
        }

        for (pallet, p) in self.pallets.iter().enumerate() {
            p.validate()
                .map_err(|source| RepackError::Placement { pallet, source })?;
        }

        debug!(
            trucks = self.trucks.len(),
            boxes = packed,
            pallets_in = self.open_pallets,
            pallets_out = self.packed_pallets(),
            "repacked batch"
        );
        Ok(packed)
    }

    /// Sends one truck per absorbed truck. All non-empty pallets travel on
    /// the first one, the others leave empty.
    ///
    /// Returns the number of trucks sent.
    pub async fn send_trucks(&mut self, out: &mpsc::Sender<Truck>) -> Result<usize> {
        let mut pallets = Some(
            std::mem::take(&mut self.pallets)
                .into_iter()
                .filter(|p| p.items() > 0)
                .collect::<Vec<_>>(),
        );

        let mut sent = 0;
        for id in std::mem::take(&mut self.trucks) {
            let truck = Truck::new(id, pallets.take().unwrap_or_default());
            out.send(truck)
                .await
                .map_err(|_| RepackError::OutputClosed { truck: id })?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn box_count(&self) -> usize {
        self.box_count
    }

    pub fn open_pallets(&self) -> usize {
        self.open_pallets
    }

    pub fn truck_count(&self) -> usize {
        self.trucks.len()
    }

    pub fn skipped_trucks(&self) -> usize {
        self.skipped_trucks
    }

    pub fn is_empty(&self) -> bool {
        self.trucks.is_empty()
    }

    pub fn buckets(&self) -> &BoxBuckets {
        &self.buckets
    }

    /// Pallets produced by the last repack.
    pub fn pallets(&self) -> &[Pallet] {
        &self.pallets
    }

    /// Number of non-empty pallets produced by the last repack.
    pub fn packed_pallets(&self) -> usize {
        self.pallets.iter().filter(|p| p.items() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Box2D, PalletError};
    use crate::packer::Ffd;

    fn pallet(boxes: &[(u8, u8, u8, u8, u32)]) -> Pallet {
        Pallet::new(
            boxes
                .iter()
                .map(|&(x, y, w, l, id)| Box2D { x, y, w, l, id })
                .collect(),
        )
    }

    /// Drops every box it is given.
    #[derive(Debug)]
    struct Lossy;

    impl Packer for Lossy {
        fn pack(&self, buckets: &BoxBuckets, _pallets: &mut [Pallet]) -> usize {
            buckets.len().saturating_sub(1)
        }
    }

    /// Stacks everything on pallet 0 at the origin.
    #[derive(Debug)]
    struct Stacker;

    impl Packer for Stacker {
        fn pack(&self, buckets: &BoxBuckets, pallets: &mut [Pallet]) -> usize {
            pallets[0].boxes.extend(buckets.iter().copied());
            buckets.len()
        }
    }

    #[test]
    fn unpack_counts_pallets_and_boxes() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(
            1,
            vec![
                pallet(&[(0, 0, 4, 1, 1), (1, 0, 2, 2, 2)]),
                pallet(&[(0, 0, 1, 1, 3)]),
            ],
        ));
        batch.unpack_truck(Truck::new(2, vec![pallet(&[(2, 2, 2, 2, 4)])]));

        assert_eq!(batch.truck_count(), 2);
        assert_eq!(batch.open_pallets(), 3);
        assert_eq!(batch.box_count(), 4);
        assert_eq!(batch.buckets().len(), 4);
        // the 4×1 box was canonicalized into the same bucket as the 2×2s
        let ids: Vec<u32> = batch.buckets().bucket(4).iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert!(batch.buckets().bucket(4).iter().all(|b| b.w <= b.l));
    }

    #[test]
    fn is_full_above_threshold() {
        let mut batch = Batch::new(Arc::new(Ffd), 2);
        batch.unpack_truck(Truck::new(1, vec![pallet(&[(0, 0, 1, 1, 1), (1, 0, 1, 1, 2)])]));
        assert!(!batch.is_full());
        batch.unpack_truck(Truck::new(2, vec![pallet(&[(0, 0, 1, 1, 3)])]));
        assert!(batch.is_full());
    }

    #[test]
    fn malformed_truck_is_kept_but_not_unpacked() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(7, vec![pallet(&[(0, 0, 1, 1, 1), (0, 0, 5, 1, 2)])]));
        assert_eq!(batch.truck_count(), 1);
        assert_eq!(batch.skipped_trucks(), 1);
        assert_eq!(batch.open_pallets(), 0);
        assert_eq!(batch.box_count(), 0);
    }

    #[test]
    fn arrival_position_is_irrelevant() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(1, vec![pallet(&[(0, 0, 2, 2, 1), (3, 0, 1, 2, 2)])]));
        assert_eq!(batch.skipped_trucks(), 0);
        assert_eq!(batch.box_count(), 2);
        assert_eq!(batch.repack_pallets().unwrap(), 2);
        assert_eq!(batch.pallets()[0].validate(), Ok(()));
        assert_eq!(batch.pallets()[0].items(), 2);
    }

    #[tokio::test]
    async fn empty_truck_passes_through() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(5, Vec::new()));
        assert!(!batch.is_empty());
        assert_eq!(batch.repack_pallets().unwrap(), 0);

        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(batch.send_trucks(&tx).await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), Truck::new(5, Vec::new()));
    }

    #[test]
    fn empty_batch_repacks_nothing() {
        let mut batch = Batch::default();
        assert_eq!(batch.repack_pallets().unwrap(), 0);
        assert!(batch.pallets().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut batch = Batch::default();
        batch.repack_pallets().unwrap();
        assert_eq!(batch.send_trucks(&tx).await.unwrap(), 0);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pallets_travel_on_the_first_truck() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(1, vec![pallet(&[(0, 0, 1, 1, 1)])]));
        batch.unpack_truck(Truck::new(2, vec![pallet(&[(3, 3, 1, 1, 2)])]));
        assert_eq!(batch.repack_pallets().unwrap(), 2);
        assert_eq!(batch.packed_pallets(), 1);

        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(batch.send_trucks(&tx).await.unwrap(), 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(
            first.pallets,
            vec![pallet(&[(0, 0, 1, 1, 1), (0, 1, 1, 1, 2)])]
        );
        assert_eq!(second.id, 2);
        assert!(second.pallets.is_empty());
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn malformed_truck_leaves_empty() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(3, vec![pallet(&[(0, 0, 1, 1, 0)])]));
        batch.repack_pallets().unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(batch.send_trucks(&tx).await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), Truck::new(3, Vec::new()));
    }

    #[tokio::test]
    async fn closed_output_is_reported() {
        let mut batch = Batch::default();
        batch.unpack_truck(Truck::new(5, vec![pallet(&[(0, 0, 1, 1, 1)])]));
        batch.repack_pallets().unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = batch.send_trucks(&tx).await.unwrap_err();
        assert!(matches!(err, RepackError::OutputClosed { truck: 5 }));
    }

    #[test]
    fn lost_boxes_are_fatal() {
        let mut batch = Batch::new(Arc::new(Lossy), 10);
        batch.unpack_truck(Truck::new(1, vec![pallet(&[(0, 0, 1, 1, 1), (1, 1, 1, 1, 2)])]));
        let err = batch.repack_pallets().unwrap_err();
        assert!(matches!(err, RepackError::BoxesLost { lost: 1, total: 2 }));
        assert_eq!(err.to_string(), "1 of 2 boxes lost");
    }

    #[test]
    fn overlapping_placements_are_fatal() {
        let mut batch = Batch::new(Arc::new(Stacker), 10);
        batch.unpack_truck(Truck::new(1, vec![pallet(&[(0, 0, 1, 1, 1), (1, 1, 1, 1, 2)])]));
        let err = batch.repack_pallets().unwrap_err();
        assert!(matches!(
            err,
            RepackError::Placement {
                pallet: 0,
                source: PalletError::Overlap(1)
            }
        ));
    }
}
